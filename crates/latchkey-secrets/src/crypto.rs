//! AES-256-CBC encryption service backing `enc://` references.
//!
//! The key is supplied as base64 of exactly 32 bytes. Every call to
//! [`EncryptionService::encrypt`] draws a fresh random IV.

use aes::Aes256;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use latchkey_core::{Error, Result};
use tracing::debug;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Size of an AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;

/// Size of an AES block (and CBC IV) in bytes.
pub const IV_SIZE: usize = 16;

/// Output of a single encryption, both fields standard base64.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedValue {
    pub cipher_text: String,
    pub iv: String,
}

/// Symmetric encryption with a fixed 256-bit key.
#[derive(Clone)]
pub struct EncryptionService {
    key: [u8; KEY_SIZE],
}

impl EncryptionService {
    /// Create a service from a base64-encoded 32-byte key.
    pub fn new(key_base64: &str) -> Result<Self> {
        let key_bytes = STANDARD
            .decode(key_base64.trim())
            .map_err(|e| Error::InvalidKey(format!("key is not valid base64: {}", e)))?;

        let key: [u8; KEY_SIZE] = key_bytes.as_slice().try_into().map_err(|_| {
            Error::InvalidKey(format!(
                "key must be {} bytes (256 bits), got {} bytes",
                KEY_SIZE,
                key_bytes.len()
            ))
        })?;

        debug!("Encryption service initialized");
        Ok(Self { key })
    }

    /// Generate a random key suitable for [`EncryptionService::new`].
    pub fn generate_key() -> String {
        let key: [u8; KEY_SIZE] = rand::random();
        STANDARD.encode(key)
    }

    /// Encrypt UTF-8 text with a fresh IV.
    pub fn encrypt(&self, plaintext: &str) -> EncryptedValue {
        let iv: [u8; IV_SIZE] = rand::random();
        let cipher_text = Aes256CbcEnc::new(&self.key.into(), &iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

        EncryptedValue {
            cipher_text: STANDARD.encode(cipher_text),
            iv: STANDARD.encode(iv),
        }
    }

    /// Decrypt cipher bytes back into UTF-8 text.
    pub fn decrypt(&self, cipher_text: &[u8], iv: &[u8]) -> Result<String> {
        let iv: [u8; IV_SIZE] = iv.try_into().map_err(|_| {
            Error::Decryption(format!(
                "IV must be {} bytes, got {} bytes",
                IV_SIZE,
                iv.len()
            ))
        })?;

        let plaintext = Aes256CbcDec::new(&self.key.into(), &iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(cipher_text)
            .map_err(|_| Error::Decryption("invalid padding or wrong key".to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|e| Error::Decryption(format!("plaintext is not UTF-8: {}", e)))
    }
}

impl std::fmt::Debug for EncryptionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionService").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zero_key() -> String {
        STANDARD.encode([0u8; 32])
    }

    #[test]
    fn test_zero_key_hello_roundtrip() {
        let service = EncryptionService::new(&zero_key()).unwrap();
        let encrypted = service.encrypt("hello");

        let cipher = STANDARD.decode(&encrypted.cipher_text).unwrap();
        let iv = STANDARD.decode(&encrypted.iv).unwrap();
        assert_eq!(iv.len(), IV_SIZE);
        assert_eq!(cipher.len(), 16);
        assert_eq!(service.decrypt(&cipher, &iv).unwrap(), "hello");
    }

    #[test]
    fn test_iv_is_fresh_per_call() {
        let service = EncryptionService::new(&EncryptionService::generate_key()).unwrap();
        let first = service.encrypt("same plaintext");
        let second = service.encrypt("same plaintext");
        assert_ne!(first.iv, second.iv);
        assert_ne!(first.cipher_text, second.cipher_text);
    }

    #[test]
    fn test_roundtrip_multi_block_and_empty() {
        let service = EncryptionService::new(&EncryptionService::generate_key()).unwrap();
        for plaintext in ["", "exactly sixteen!", "p@ssw0rd with ünïcödé and more than one block"] {
            let encrypted = service.encrypt(plaintext);
            let cipher = STANDARD.decode(&encrypted.cipher_text).unwrap();
            let iv = STANDARD.decode(&encrypted.iv).unwrap();
            assert_eq!(service.decrypt(&cipher, &iv).unwrap(), plaintext);
        }
    }

    #[test]
    fn test_rejects_wrong_key_length() {
        for len in [31usize, 33] {
            let key = STANDARD.encode(vec![7u8; len]);
            let result = EncryptionService::new(&key);
            assert!(matches!(result, Err(Error::InvalidKey(_))), "len {}", len);
        }
    }

    #[test]
    fn test_rejects_invalid_base64_key() {
        let result = EncryptionService::new("not base64 at all!!");
        assert!(matches!(result, Err(Error::InvalidKey(_))));
    }

    #[test]
    fn test_decrypt_rejects_short_iv() {
        let service = EncryptionService::new(&zero_key()).unwrap();
        let result = service.decrypt(&[0u8; 16], &[0u8; 12]);
        assert!(matches!(result, Err(Error::Decryption(_))));
    }

    #[test]
    fn test_decrypt_with_wrong_key_fails() {
        let service = EncryptionService::new(&EncryptionService::generate_key()).unwrap();
        let other = EncryptionService::new(&EncryptionService::generate_key()).unwrap();
        let encrypted = service.encrypt("top secret value");
        let cipher = STANDARD.decode(&encrypted.cipher_text).unwrap();
        let iv = STANDARD.decode(&encrypted.iv).unwrap();

        // Wrong key yields garbage: either bad padding or a different plaintext
        match other.decrypt(&cipher, &iv) {
            Ok(text) => assert_ne!(text, "top secret value"),
            Err(err) => assert!(matches!(err, Error::Decryption(_))),
        }
    }
}
