//! Encrypted literal provider (`enc://aes256/...`).
//!
//! Two layouts are accepted:
//!
//! - `enc://aes256/<cipher>?iv=<iv>`
//! - `enc://aes256/<iv>/<cipher>`
//!
//! When both carry an IV the query parameter wins.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use latchkey_core::{Error, Result, SecretReference};
use tracing::debug;

use super::{ResolutionContext, SecretProvider, ensure_scheme};
use crate::crypto::{EncryptedValue, EncryptionService, IV_SIZE};

const ALGORITHM: &str = "aes256";

/// Decrypts `enc://` references with the configured key.
#[derive(Debug)]
pub struct EncryptedProvider {
    service: EncryptionService,
}

impl EncryptedProvider {
    pub fn new(service: EncryptionService) -> Self {
        Self { service }
    }

    /// Build an `enc://` reference from encryption output.
    ///
    /// URL-safe base64 keeps `/` out of the path so the cipher stays a single
    /// segment.
    pub fn reference_for(value: &EncryptedValue) -> Result<String> {
        let cipher = STANDARD
            .decode(&value.cipher_text)
            .map_err(|e| Error::Encryption(format!("cipher text is not base64: {}", e)))?;
        let iv = STANDARD
            .decode(&value.iv)
            .map_err(|e| Error::Encryption(format!("IV is not base64: {}", e)))?;

        Ok(format!(
            "enc://{}/{}?iv={}",
            ALGORITHM,
            URL_SAFE.encode(cipher),
            URL_SAFE.encode(iv)
        ))
    }
}

fn decode_base64(what: &str, value: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(value)
        .or_else(|_| URL_SAFE.decode(value))
        .map_err(|e| Error::invalid_reference("enc", format!("{} is not valid base64: {}", what, e)))
}

#[async_trait]
impl SecretProvider for EncryptedProvider {
    fn name(&self) -> &str {
        "encrypted"
    }

    fn schemes(&self) -> &'static [&'static str] {
        &["enc"]
    }

    async fn resolve(
        &self,
        reference: &SecretReference,
        context: &ResolutionContext,
    ) -> Result<Option<String>> {
        ensure_scheme(self, reference)?;

        let segments = reference.segments();
        match segments.first() {
            Some(algorithm) if algorithm.eq_ignore_ascii_case(ALGORITHM) => {}
            Some(algorithm) => {
                return Err(Error::invalid_reference(
                    "enc",
                    format!("unsupported algorithm '{}', expected '{}'", algorithm, ALGORITHM),
                ));
            }
            None => {
                return Err(Error::invalid_reference(
                    "enc",
                    format!("reference must start with '{}'", ALGORITHM),
                ));
            }
        }

        let query_iv = reference.parameter("iv");
        let (iv, cipher) = match (segments.len(), query_iv) {
            (2, Some(iv)) => (iv, segments[1]),
            (3, Some(iv)) => (iv, segments[2]),
            (3, None) => (segments[1], segments[2]),
            (2, None) => {
                return Err(Error::invalid_reference(
                    "enc",
                    "missing IV: pass it as ?iv= or as a path segment",
                ));
            }
            (count, _) => {
                return Err(Error::invalid_reference(
                    "enc",
                    format!(
                        "expected aes256/<cipher> or aes256/<iv>/<cipher>, got {} segments",
                        count
                    ),
                ));
            }
        };

        let iv = decode_base64("IV", iv)?;
        if iv.len() != IV_SIZE {
            return Err(Error::invalid_reference(
                "enc",
                format!("IV must be {} bytes, got {}", IV_SIZE, iv.len()),
            ));
        }
        let cipher = decode_base64("cipher text", cipher)?;

        debug!(setting = %context.describe(reference), "Decrypting enc:// reference");
        self.service.decrypt(&cipher, &iv).map(Some)
    }
}
