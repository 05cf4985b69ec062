//! Command handlers.

use crate::config::CliConfig;
use console::style;
use latchkey_auth::{JwtAlgorithm, LocalJwtOptions, create_token};
use latchkey_secrets::{
    EncryptedProvider, EncryptionService, SecretManager, SecretManagerOptions, SettingsResolver,
};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Arguments of `latchkey token`.
pub struct TokenArgs {
    pub algorithm: Option<String>,
    pub key_file: Option<PathBuf>,
    pub key_ref: Option<String>,
    pub issuer: Option<String>,
    pub audience: Option<String>,
    pub subject: Option<String>,
    pub name: Option<String>,
    pub role: Option<String>,
    pub client_id: Option<String>,
    pub kid: Option<String>,
    pub lifetime: Option<i64>,
    pub claims: Vec<String>,
}

async fn manager(options: &SecretManagerOptions) -> Result<SecretManager, Box<dyn std::error::Error>> {
    let options = options.clone().resolve_bootstrap()?;
    Ok(SecretManager::with_options(options).await?)
}

/// Print a fresh encryption key.
pub fn keygen() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", EncryptionService::generate_key());
    eprintln!(
        "{} Store this key outside source control, e.g. as LATCHKEY_ENCRYPTION_KEY",
        style("!").yellow()
    );
    Ok(())
}

/// Encrypt a plaintext into an `enc://` reference.
pub fn encrypt(
    config: &CliConfig,
    plaintext: &str,
    key: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let key = match key {
        Some(key) => key,
        None => config
            .secrets
            .clone()
            .resolve_bootstrap()?
            .encryption_key
            .ok_or("No encryption key: pass --key or set LATCHKEY_ENCRYPTION_KEY")?,
    };

    let service = EncryptionService::new(&key)?;
    let reference = EncryptedProvider::reference_for(&service.encrypt(plaintext))?;
    println!("{}", reference);
    Ok(())
}

/// Resolve a single value.
pub async fn resolve(
    config: &CliConfig,
    value: &str,
    name: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let manager = manager(&config.secrets).await?;
    let result = manager.resolve(value, name.as_deref(), true).await;
    manager.shutdown().await;

    match result? {
        Some(resolved) => println!("{}", resolved),
        None => eprintln!("{} Resolved to an empty value", style("i").blue()),
    }
    Ok(())
}

/// Resolve a YAML settings file and print the result.
pub async fn resolve_file(config: &CliConfig, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let manager = manager(&config.secrets).await?;
    let result = SettingsResolver::new(&manager).resolve_file(path).await;
    manager.shutdown().await;

    print!("{}", serde_yaml::to_string(&result?)?);
    Ok(())
}

/// Issue a locally signed token.
pub async fn token(config: &CliConfig, args: TokenArgs) -> Result<(), Box<dyn std::error::Error>> {
    let defaults = &config.token;

    let algorithm: JwtAlgorithm = args
        .algorithm
        .or_else(|| defaults.algorithm.clone())
        .as_deref()
        .unwrap_or("RS256")
        .parse()?;

    let private_key = match (args.key_file, args.key_ref.or_else(|| defaults.key_ref.clone())) {
        (Some(path), _) => tokio::fs::read_to_string(&path).await?,
        (None, Some(reference)) => {
            debug!(reference = %reference, "Resolving signing key");
            let manager = manager(&config.secrets).await?;
            let key = manager.resolve_required(&reference, "token.key_ref").await;
            manager.shutdown().await;
            key?
        }
        (None, None) => return Err("No signing key: pass --key-file or --key-ref".into()),
    };

    let mut options = LocalJwtOptions::new(algorithm, private_key);
    options.key_id = args.kid.or_else(|| defaults.key_id.clone());
    options.issuer = args
        .issuer
        .or_else(|| defaults.issuer.clone())
        .unwrap_or_default();
    options.audience = args
        .audience
        .or_else(|| defaults.audience.clone())
        .unwrap_or_default();
    options.subject = args.subject.unwrap_or_default();
    options.name = args.name.unwrap_or_default();
    options.role = args.role;
    options.client_id = args.client_id;
    if let Some(lifetime) = args.lifetime.or(defaults.lifetime_minutes) {
        options.lifetime_minutes = lifetime;
    }
    for claim in &args.claims {
        let (key, value) = parse_claim(claim)?;
        options.extra_claims.insert(key, value);
    }

    println!("{}", create_token(&options)?);
    Ok(())
}

/// Parse `key=value`; the value is read as JSON when possible, otherwise as a string.
fn parse_claim(raw: &str) -> Result<(String, serde_json::Value), String> {
    let (key, value) = raw
        .split_once('=')
        .filter(|(key, _)| !key.trim().is_empty())
        .ok_or_else(|| format!("Invalid claim '{}', expected KEY=VALUE", raw))?;
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.trim().to_string(), value))
}

/// Show configuration.
pub fn show_config(config: &CliConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("Current configuration:");
    print!("{}", serde_yaml::to_string(&config.redacted())?);

    if let Ok(path) = CliConfig::config_path() {
        let note = if path.exists() {
            style("(loaded)").green()
        } else {
            style("(not found, using environment)").dim()
        };
        println!("\nConfig file: {} {}", path.display(), note);
    }

    Ok(())
}

/// Print the configuration file path.
pub fn config_path() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", CliConfig::config_path()?.display());
    Ok(())
}
