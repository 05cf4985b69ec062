//! Error types for Latchkey.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Lifecycle errors
    #[error("Secret manager is not initialized")]
    NotInitialized,

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    // Dispatch errors
    #[error("No secret provider registered for scheme '{0}'")]
    UnregisteredScheme(String),

    #[error("Provider '{provider}' cannot resolve references with scheme '{scheme}'")]
    SchemeMismatch { provider: String, scheme: String },

    // Reference format errors
    #[error("Invalid {scheme}:// reference: {reason}")]
    InvalidReference { scheme: String, reason: String },

    // Resolution errors
    #[error("Secret not found: {0}")]
    SecretNotFound(String),

    #[error("Secret '{0}' resolved to an empty value")]
    EmptySecret(String),

    #[error("Vault request failed with status {status}: {body}")]
    VaultStatus { status: u16, body: String },

    #[error("Credential acquisition failed: {0}")]
    Credential(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    // Crypto errors
    #[error("Invalid encryption key: {0}")]
    InvalidKey(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Decryption failed: {0}")]
    Decryption(String),

    // Wrapping
    #[error("Failed to resolve setting '{setting}': {source}")]
    Setting {
        setting: String,
        #[source]
        source: Box<Error>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a reference format error.
    pub fn invalid_reference(scheme: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidReference {
            scheme: scheme.into(),
            reason: reason.into(),
        }
    }

    /// Attach the logical setting name to an error.
    pub fn for_setting(self, setting: impl Into<String>) -> Self {
        Self::Setting {
            setting: setting.into(),
            source: Box::new(self),
        }
    }

    /// Errors that indicate a malformed configuration or a dispatch bug.
    ///
    /// These are never downgraded by the plaintext fallback policy.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::NotInitialized
            | Error::Configuration(_)
            | Error::UnregisteredScheme(_)
            | Error::SchemeMismatch { .. }
            | Error::InvalidReference { .. }
            | Error::InvalidKey(_)
            | Error::Internal(_) => true,
            Error::Setting { source, .. } => source.is_fatal(),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_errors_are_fatal() {
        assert!(Error::invalid_reference("enc", "bad base64").is_fatal());
        assert!(Error::UnregisteredScheme("foo".into()).is_fatal());
        assert!(!Error::SecretNotFound("db".into()).is_fatal());
        assert!(
            !Error::VaultStatus {
                status: 503,
                body: "unavailable".into()
            }
            .is_fatal()
        );
    }

    #[test]
    fn test_setting_wrapper_keeps_classification() {
        let err = Error::UnregisteredScheme("foo".into()).for_setting("Database:Password");
        assert!(err.is_fatal());
        assert_eq!(
            err.to_string(),
            "Failed to resolve setting 'Database:Password': No secret provider registered for scheme 'foo'"
        );

        let err = Error::Timeout(Duration::from_secs(5)).for_setting("Api:Key");
        assert!(!err.is_fatal());
    }
}
