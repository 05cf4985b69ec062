//! Environment variable provider (`env://VAR_NAME`).

use async_trait::async_trait;
use latchkey_core::{Error, Result, SecretReference};

use super::{ResolutionContext, SecretProvider, ensure_scheme};

/// Reads secrets from the process environment.
#[derive(Debug, Default)]
pub struct EnvProvider;

impl EnvProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SecretProvider for EnvProvider {
    fn name(&self) -> &str {
        "env"
    }

    fn schemes(&self) -> &'static [&'static str] {
        &["env"]
    }

    async fn resolve(
        &self,
        reference: &SecretReference,
        _context: &ResolutionContext,
    ) -> Result<Option<String>> {
        ensure_scheme(self, reference)?;

        let var_name = reference.identifier();
        if var_name.is_empty() {
            return Err(Error::invalid_reference(
                "env",
                "reference must name an environment variable",
            ));
        }

        Ok(std::env::var(var_name).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(raw: &str) -> SecretReference {
        SecretReference::try_parse(raw).unwrap()
    }

    #[tokio::test]
    async fn test_env_provider() {
        // SAFETY: unique variable name, not read by other tests
        unsafe { std::env::set_var("LATCHKEY_TEST_ENV_PROVIDER", "secret_value") };
        let provider = EnvProvider::new();
        let context = ResolutionContext::default();

        let value = provider
            .resolve(&reference("env://LATCHKEY_TEST_ENV_PROVIDER"), &context)
            .await
            .unwrap();
        assert_eq!(value.as_deref(), Some("secret_value"));

        let missing = provider
            .resolve(&reference("env://LATCHKEY_TEST_NONEXISTENT"), &context)
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_env_provider_rejects_foreign_scheme() {
        let provider = EnvProvider::new();
        let result = provider
            .resolve(&reference("kv://db-password"), &ResolutionContext::default())
            .await;
        assert!(matches!(result, Err(Error::SchemeMismatch { .. })));
    }

    #[tokio::test]
    async fn test_env_provider_requires_name() {
        let provider = EnvProvider::new();
        let result = provider
            .resolve(&reference("env://"), &ResolutionContext::default())
            .await;
        assert!(matches!(result, Err(Error::InvalidReference { .. })));
    }
}
