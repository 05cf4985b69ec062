//! Secret provider trait and implementations.

pub mod encrypted;
pub mod env;
pub mod vault;

pub use encrypted::EncryptedProvider;
pub use env::EnvProvider;
pub use vault::VaultProvider;

use async_trait::async_trait;
use latchkey_core::{Error, Result, SecretReference};

/// Per-call information passed to providers.
#[derive(Debug, Clone, Default)]
pub struct ResolutionContext {
    /// Logical configuration key the value was read from, if known.
    pub setting: Option<String>,
}

impl ResolutionContext {
    pub fn new(setting: Option<&str>) -> Self {
        Self {
            setting: setting.map(str::to_string),
        }
    }

    /// Name to use in messages: the setting if known, otherwise the reference.
    pub fn describe<'a>(&'a self, reference: &'a SecretReference) -> &'a str {
        self.setting.as_deref().unwrap_or(reference.original())
    }
}

/// Trait for secret providers.
///
/// A provider resolves references for one or more schemes. Providers must be
/// read-only: the manager may call `resolve` more than once for the same
/// reference when two callers race on a cold cache.
#[async_trait]
pub trait SecretProvider: Send + Sync {
    /// Provider name for logging.
    fn name(&self) -> &str;

    /// Schemes this provider is registered under.
    fn schemes(&self) -> &'static [&'static str];

    /// Resolve a reference. `Ok(None)` means the secret does not exist.
    async fn resolve(
        &self,
        reference: &SecretReference,
        context: &ResolutionContext,
    ) -> Result<Option<String>>;

    /// Release any resources held by the provider.
    async fn dispose(&self) {}
}

/// Reject references dispatched to the wrong provider.
pub fn ensure_scheme(provider: &dyn SecretProvider, reference: &SecretReference) -> Result<()> {
    if provider.schemes().contains(&reference.scheme()) {
        Ok(())
    } else {
        Err(Error::SchemeMismatch {
            provider: provider.name().to_string(),
            scheme: reference.scheme().to_string(),
        })
    }
}
