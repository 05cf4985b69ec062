//! CLI configuration management.

use latchkey_secrets::SecretManagerOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable overriding the configuration file location.
pub const CONFIG_ENV: &str = "LATCHKEY_CONFIG";

/// CLI configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CliConfig {
    /// Secret manager settings.
    #[serde(default)]
    pub secrets: SecretManagerOptions,
    /// Defaults for `latchkey token`.
    #[serde(default)]
    pub token: TokenDefaults,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenDefaults {
    pub algorithm: Option<String>,
    /// Reference to the signing key, e.g. `kv://token-signing-key`.
    pub key_ref: Option<String>,
    pub key_id: Option<String>,
    pub issuer: Option<String>,
    pub audience: Option<String>,
    pub lifetime_minutes: Option<i64>,
}

impl CliConfig {
    /// Load the configuration file, or fall back to `LATCHKEY_*` variables
    /// when no file exists.
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Ok(serde_yaml::from_str(&content)?)
        } else {
            Ok(Self {
                secrets: SecretManagerOptions::from_env()?,
                token: TokenDefaults::default(),
            })
        }
    }

    /// Get the configuration file path.
    pub fn config_path() -> Result<PathBuf, Box<dyn std::error::Error>> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Ok(PathBuf::from(path));
        }
        let dirs = directories::ProjectDirs::from("dev", "latchkey", "latchkey")
            .ok_or("Could not determine config directory")?;
        Ok(dirs.config_dir().join("config.yaml"))
    }

    /// Copy suitable for display: inline credentials are masked, references
    /// are shown as written.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        for value in [
            &mut copy.secrets.client_secret,
            &mut copy.secrets.access_token,
            &mut copy.secrets.encryption_key,
        ] {
            if let Some(v) = value.as_mut() {
                if latchkey_core::SecretReference::try_parse(v).is_none() {
                    *v = "***".to_string();
                }
            }
        }
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
secrets:
  vault_uri: https://example.vault.azure.net
  encryption_key: env://APP_KEY
  client_secret: hunter2
token:
  algorithm: ES256
  key_ref: kv://signing-key
  lifetime_minutes: 15
"#
        )
        .unwrap();

        let config = CliConfig::load_from(file.path()).unwrap();
        assert_eq!(
            config.secrets.vault_uri.as_deref(),
            Some("https://example.vault.azure.net")
        );
        assert_eq!(config.secrets.timeout_secs, 30);
        assert_eq!(config.token.algorithm.as_deref(), Some("ES256"));
        assert_eq!(config.token.lifetime_minutes, Some(15));

        let redacted = config.redacted();
        assert_eq!(redacted.secrets.client_secret.as_deref(), Some("***"));
        assert_eq!(
            redacted.secrets.encryption_key.as_deref(),
            Some("env://APP_KEY")
        );
    }
}
