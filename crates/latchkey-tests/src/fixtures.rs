//! Keys and references shared by integration tests.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use latchkey_secrets::{EncryptedProvider, EncryptionService};
use ring::rand::SystemRandom;
use ring::signature::{ECDSA_P256_SHA256_FIXED_SIGNING, EcdsaKeyPair, KeyPair};

/// Base64 of 32 zero bytes.
pub const ZERO_KEY: &str = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=";

/// Bearer token accepted by [`crate::VaultContext`].
pub const TEST_ACCESS_TOKEN: &str = "test-access-token";

/// Encrypt `plaintext` under `key` and return its `enc://` reference.
pub fn encrypted_reference(key: &str, plaintext: &str) -> String {
    let service = EncryptionService::new(key).expect("valid test key");
    EncryptedProvider::reference_for(&service.encrypt(plaintext)).expect("reference")
}

/// A freshly generated P-256 key.
pub struct Es256KeyFixture {
    /// PKCS#8 PEM text.
    pub pem: String,
    /// Uncompressed public point for verification.
    pub public_key: Vec<u8>,
}

impl Es256KeyFixture {
    pub fn generate() -> Self {
        let rng = SystemRandom::new();
        let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, &rng)
            .expect("generate P-256 key");
        let key_pair =
            EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, pkcs8.as_ref(), &rng)
                .expect("parse generated key");

        Self {
            pem: pem_armor("PRIVATE KEY", pkcs8.as_ref()),
            public_key: key_pair.public_key().as_ref().to_vec(),
        }
    }

    /// The PEM with newlines escaped, as stored in single-line settings.
    pub fn escaped_pem(&self) -> String {
        self.pem.replace('\n', "\\n")
    }
}

fn pem_armor(label: &str, der: &[u8]) -> String {
    let body = STANDARD.encode(der);
    let mut pem = format!("-----BEGIN {}-----\n", label);
    for chunk in body.as_bytes().chunks(64) {
        pem.push_str(std::str::from_utf8(chunk).expect("base64 is ascii"));
        pem.push('\n');
    }
    pem.push_str(&format!("-----END {}-----\n", label));
    pem
}
