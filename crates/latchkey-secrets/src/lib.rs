//! Secret reference resolution for Latchkey.
//!
//! Configuration values are either literals or references of the form
//! `scheme://identifier?params`. The [`SecretManager`] parses each value,
//! dispatches references to the provider registered for their scheme and
//! caches the result:
//!
//! - `env://VAR_NAME` - process environment ([`EnvProvider`])
//! - `enc://aes256/<cipher>?iv=<iv>` - AES-256-CBC encrypted literal ([`EncryptedProvider`])
//! - `kv://name?version=..` / `keyvault://name` - remote vault over HTTPS ([`VaultProvider`])
//!
//! # Example
//!
//! ```rust,ignore
//! use latchkey_secrets::{SecretManager, SecretManagerOptions};
//!
//! let options = SecretManagerOptions::from_env()?.resolve_bootstrap()?;
//! let manager = SecretManager::with_options(options).await?;
//! let password = manager.resolve_required("kv://db-password", "Database:Password").await?;
//! ```

pub mod credential;
pub mod crypto;
pub mod manager;
pub mod options;
pub mod providers;
pub mod settings;

pub use credential::{AccessToken, TokenCredential};
pub use crypto::{EncryptedValue, EncryptionService};
pub use manager::SecretManager;
pub use options::SecretManagerOptions;
pub use providers::{
    EncryptedProvider, EnvProvider, ResolutionContext, SecretProvider, VaultProvider,
};
pub use settings::SettingsResolver;
