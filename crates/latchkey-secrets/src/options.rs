//! Secret manager configuration.

use latchkey_core::{Error, Result, SecretReference};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable prefix used by [`SecretManagerOptions::from_env`].
pub const ENV_PREFIX: &str = "LATCHKEY_";

/// Process-wide secret manager configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct SecretManagerOptions {
    /// Base address of the vault, e.g. `https://my-vault.vault.azure.net`.
    #[serde(default)]
    pub vault_uri: Option<String>,
    /// Client id of a user-assigned managed identity.
    #[serde(default)]
    pub managed_identity_client_id: Option<String>,
    /// Directory (tenant) used with a client secret.
    #[serde(default)]
    pub tenant_id: Option<String>,
    /// Client secret for the service principal named by `managed_identity_client_id`.
    #[serde(default)]
    pub client_secret: Option<String>,
    /// Pre-acquired bearer token, used verbatim.
    #[serde(default)]
    pub access_token: Option<String>,
    /// Managed identity token endpoint override.
    #[serde(default)]
    pub identity_endpoint: Option<String>,
    /// Identity authority for client secret flows.
    #[serde(default = "default_authority_host")]
    pub authority_host: String,
    /// Audience scope requested for vault tokens.
    #[serde(default = "default_vault_scope")]
    pub vault_scope: String,
    /// Permit literal values and degrade failed lookups to the literal input.
    #[serde(default)]
    pub allow_plaintext_fallback: bool,
    /// Base64 32-byte AES key, or an `env://` reference to one.
    #[serde(default)]
    pub encryption_key: Option<String>,
    /// Network timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_authority_host() -> String {
    "https://login.microsoftonline.com".to_string()
}

fn default_vault_scope() -> String {
    "https://vault.azure.net/.default".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for SecretManagerOptions {
    fn default() -> Self {
        Self {
            vault_uri: None,
            managed_identity_client_id: None,
            tenant_id: None,
            client_secret: None,
            access_token: None,
            identity_endpoint: None,
            authority_host: default_authority_host(),
            vault_scope: default_vault_scope(),
            allow_plaintext_fallback: false,
            encryption_key: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl SecretManagerOptions {
    /// Load options from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&contents).map_err(|e| {
            Error::Configuration(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    /// Load options from `LATCHKEY_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(format!("{}{}", ENV_PREFIX, name)).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut options = Self {
            vault_uri: get("VAULT_URI"),
            managed_identity_client_id: get("MANAGED_IDENTITY_CLIENT_ID"),
            tenant_id: get("TENANT_ID"),
            client_secret: get("CLIENT_SECRET"),
            access_token: get("ACCESS_TOKEN"),
            identity_endpoint: get("IDENTITY_ENDPOINT"),
            encryption_key: get("ENCRYPTION_KEY"),
            ..Self::default()
        };

        if let Some(host) = get("AUTHORITY_HOST") {
            options.authority_host = host;
        }
        if let Some(scope) = get("VAULT_SCOPE") {
            options.vault_scope = scope;
        }
        if let Some(flag) = get("ALLOW_PLAINTEXT_FALLBACK") {
            options.allow_plaintext_fallback = parse_bool(&flag).ok_or_else(|| {
                Error::Configuration(format!(
                    "{}ALLOW_PLAINTEXT_FALLBACK must be true or false, got '{}'",
                    ENV_PREFIX, flag
                ))
            })?;
        }
        if let Some(timeout) = get("TIMEOUT_SECS") {
            options.timeout_secs = timeout.trim().parse().map_err(|_| {
                Error::Configuration(format!(
                    "{}TIMEOUT_SECS must be a whole number of seconds, got '{}'",
                    ENV_PREFIX, timeout
                ))
            })?;
        }

        Ok(options)
    }

    /// Set the vault address.
    pub fn with_vault_uri(mut self, uri: impl Into<String>) -> Self {
        self.vault_uri = Some(uri.into());
        self
    }

    /// Set the encryption key (base64, or an `env://` reference).
    pub fn with_encryption_key(mut self, key: impl Into<String>) -> Self {
        self.encryption_key = Some(key.into());
        self
    }

    /// Allow or forbid plaintext fallback.
    pub fn with_plaintext_fallback(mut self, allow: bool) -> Self {
        self.allow_plaintext_fallback = allow;
        self
    }

    /// Use a fixed bearer token for vault requests.
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Set the network timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs().max(1);
        self
    }

    /// Network timeout as a [`Duration`], never below one second.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    /// Resolve an `env://` indirection in the encryption key.
    ///
    /// The key must be known before the manager exists, so only environment
    /// references are supported here.
    pub fn resolve_bootstrap(mut self) -> Result<Self> {
        let Some(raw) = self.encryption_key.as_deref() else {
            return Ok(self);
        };
        let Some(reference) = SecretReference::try_parse(raw) else {
            return Ok(self);
        };

        if reference.scheme() != "env" {
            return Err(Error::Configuration(format!(
                "encryption key may only reference env://, got {}://",
                reference.scheme()
            )));
        }

        let value = std::env::var(reference.identifier()).map_err(|_| {
            Error::Configuration(format!(
                "encryption key variable '{}' is not set",
                reference.identifier()
            ))
        })?;
        self.encryption_key = Some(value);
        Ok(self)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn redact(value: &Option<String>) -> Option<&'static str> {
    value.as_ref().map(|_| "<redacted>")
}

impl std::fmt::Debug for SecretManagerOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretManagerOptions")
            .field("vault_uri", &self.vault_uri)
            .field("managed_identity_client_id", &self.managed_identity_client_id)
            .field("tenant_id", &self.tenant_id)
            .field("client_secret", &redact(&self.client_secret))
            .field("access_token", &redact(&self.access_token))
            .field("identity_endpoint", &self.identity_endpoint)
            .field("authority_host", &self.authority_host)
            .field("vault_scope", &self.vault_scope)
            .field("allow_plaintext_fallback", &self.allow_plaintext_fallback)
            .field("encryption_key", &redact(&self.encryption_key))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let options = SecretManagerOptions::default();
        assert!(!options.allow_plaintext_fallback);
        assert_eq!(options.timeout(), Duration::from_secs(30));
        assert_eq!(options.vault_scope, "https://vault.azure.net/.default");
    }

    #[test]
    fn test_from_lookup() {
        let options = SecretManagerOptions::from_lookup(lookup(&[
            ("VAULT_URI", "https://example.vault.azure.net"),
            ("ALLOW_PLAINTEXT_FALLBACK", "TRUE"),
            ("TIMEOUT_SECS", "5"),
            ("TENANT_ID", "  "),
        ]))
        .unwrap();

        assert_eq!(
            options.vault_uri.as_deref(),
            Some("https://example.vault.azure.net")
        );
        assert!(options.allow_plaintext_fallback);
        assert_eq!(options.timeout_secs, 5);
        assert!(options.tenant_id.is_none());
    }

    #[test]
    fn test_from_lookup_rejects_bad_values() {
        let result =
            SecretManagerOptions::from_lookup(lookup(&[("ALLOW_PLAINTEXT_FALLBACK", "maybe")]));
        assert!(matches!(result, Err(Error::Configuration(_))));

        let result = SecretManagerOptions::from_lookup(lookup(&[("TIMEOUT_SECS", "soon")]));
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_zero_timeout_is_clamped() {
        let options =
            SecretManagerOptions::from_lookup(lookup(&[("TIMEOUT_SECS", "0")])).unwrap();
        assert_eq!(options.timeout(), Duration::from_secs(1));

        let options: SecretManagerOptions = serde_yaml::from_str("timeout_secs: 0").unwrap();
        assert_eq!(options.timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "vault_uri: https://example.vault.azure.net\nallow_plaintext_fallback: true"
        )
        .unwrap();

        let options = SecretManagerOptions::from_file(file.path()).unwrap();
        assert!(options.allow_plaintext_fallback);
        assert_eq!(options.timeout_secs, 30);
    }

    #[test]
    fn test_resolve_bootstrap_env_key() {
        // SAFETY: unique variable name, not read by other tests
        unsafe { std::env::set_var("LATCHKEY_TEST_BOOTSTRAP_KEY", "a2V5") };

        let options = SecretManagerOptions::default()
            .with_encryption_key("env://LATCHKEY_TEST_BOOTSTRAP_KEY")
            .resolve_bootstrap()
            .unwrap();
        assert_eq!(options.encryption_key.as_deref(), Some("a2V5"));

        let literal = SecretManagerOptions::default()
            .with_encryption_key("bGl0ZXJhbA==")
            .resolve_bootstrap()
            .unwrap();
        assert_eq!(literal.encryption_key.as_deref(), Some("bGl0ZXJhbA=="));
    }

    #[test]
    fn test_resolve_bootstrap_rejects_other_schemes() {
        let result = SecretManagerOptions::default()
            .with_encryption_key("kv://encryption-key")
            .resolve_bootstrap();
        assert!(matches!(result, Err(Error::Configuration(_))));

        let result = SecretManagerOptions::default()
            .with_encryption_key("env://LATCHKEY_TEST_DEFINITELY_UNSET_KEY")
            .resolve_bootstrap();
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let options = SecretManagerOptions::default()
            .with_encryption_key("c2VjcmV0")
            .with_access_token("token-value");
        let rendered = format!("{:?}", options);
        assert!(!rendered.contains("c2VjcmV0"));
        assert!(!rendered.contains("token-value"));
        assert!(rendered.contains("<redacted>"));
    }
}
