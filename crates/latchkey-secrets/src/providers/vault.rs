//! Vault provider (`kv://name` and `keyvault://name`).
//!
//! Supported parameters:
//!
//! - `version` - fetch a specific secret version
//! - `vault` - absolute URL overriding the configured vault address

use async_trait::async_trait;
use latchkey_core::{Error, Result, SecretReference};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};
use url::Url;

use super::{ResolutionContext, SecretProvider, ensure_scheme};
use crate::credential::{TokenCredential, credential_from_options};
use crate::options::SecretManagerOptions;

/// Vault REST API version.
pub const API_VERSION: &str = "7.3";

#[derive(Debug, Deserialize)]
struct SecretBundle {
    value: Option<String>,
}

/// Fetches secrets over HTTPS with bearer-token authentication.
pub struct VaultProvider {
    vault_uri: Url,
    scope: String,
    timeout: Duration,
    credential: Arc<dyn TokenCredential>,
    client: RwLock<Option<reqwest::Client>>,
}

impl VaultProvider {
    /// Create a provider from manager options. Requires `vault_uri`.
    pub fn from_options(options: &SecretManagerOptions) -> Result<Self> {
        let raw = options
            .vault_uri
            .as_deref()
            .ok_or_else(|| Error::Configuration("vault_uri is not configured".to_string()))?;
        let vault_uri = parse_vault_uri(raw)
            .map_err(|reason| Error::Configuration(format!("vault_uri {}", reason)))?;

        let credential = credential_from_options(options)?;
        Self::new(vault_uri, credential, options.vault_scope.clone(), options.timeout())
    }

    /// Create a provider with an explicit credential.
    pub fn new(
        vault_uri: Url,
        credential: Arc<dyn TokenCredential>,
        scope: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(format!("failed to build HTTP client: {}", e)))?;

        info!(
            vault = %vault_uri,
            credential = credential.kind(),
            "Vault provider configured"
        );

        Ok(Self {
            vault_uri,
            scope: scope.into(),
            timeout,
            credential,
            client: RwLock::new(Some(client)),
        })
    }

    /// Build the request URL for a secret.
    fn secret_url(&self, reference: &SecretReference) -> Result<Url> {
        let name = reference.identifier();
        if name.is_empty() {
            return Err(Error::invalid_reference(
                reference.scheme(),
                "reference must name a secret",
            ));
        }

        let mut url = match reference.parameter("vault") {
            Some(raw) => parse_vault_uri(raw).map_err(|reason| {
                Error::invalid_reference(reference.scheme(), format!("vault override {}", reason))
            })?,
            None => self.vault_uri.clone(),
        };

        url.set_query(None);
        url.set_fragment(None);
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                Error::invalid_reference(reference.scheme(), "vault address cannot be a base URL")
            })?;
            segments.pop_if_empty().push("secrets").push(name);
            if let Some(version) = reference.parameter("version").filter(|v| !v.is_empty()) {
                segments.push(version);
            }
        }
        url.query_pairs_mut().append_pair("api-version", API_VERSION);

        Ok(url)
    }

    fn request_error(&self, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::Timeout(self.timeout)
        } else {
            Error::Network(err.to_string())
        }
    }
}

fn parse_vault_uri(raw: &str) -> std::result::Result<Url, String> {
    let url = Url::parse(raw).map_err(|e| format!("'{}' is not an absolute URL: {}", raw, e))?;
    if url.cannot_be_a_base() || !url.has_host() {
        return Err(format!("'{}' is not a hierarchical URL with a host", raw));
    }
    Ok(url)
}

#[async_trait]
impl SecretProvider for VaultProvider {
    fn name(&self) -> &str {
        "vault"
    }

    fn schemes(&self) -> &'static [&'static str] {
        &["kv", "keyvault"]
    }

    async fn resolve(
        &self,
        reference: &SecretReference,
        context: &ResolutionContext,
    ) -> Result<Option<String>> {
        ensure_scheme(self, reference)?;
        let url = self.secret_url(reference)?;

        let client = self
            .client
            .read()
            .await
            .clone()
            .ok_or_else(|| Error::Internal("vault provider has been disposed".to_string()))?;

        let token = self.credential.get_token(&client, &self.scope).await?;

        debug!(
            setting = %context.describe(reference),
            secret = %reference.identifier(),
            "Fetching secret from vault"
        );

        let response = client
            .get(url)
            .bearer_auth(&token.token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::VaultStatus {
                status: status.as_u16(),
                body,
            });
        }

        let bundle: SecretBundle = response
            .json()
            .await
            .map_err(|e| Error::Network(format!("invalid vault response: {}", e)))?;
        Ok(bundle.value)
    }

    async fn dispose(&self) {
        if self.client.write().await.take().is_some() {
            debug!("Vault HTTP client released");
        }
    }
}
