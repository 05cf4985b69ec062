//! Bearer token acquisition for vault requests.
//!
//! Three sources are supported, chosen from [`SecretManagerOptions`]:
//!
//! - a pre-acquired `access_token`, used verbatim
//! - a service principal (`tenant_id` + `managed_identity_client_id` + `client_secret`)
//!   exchanged at the identity authority's token endpoint
//! - a managed identity, queried through the instance metadata endpoint
//!
//! Acquired tokens are cached until shortly before they expire.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use latchkey_core::{Error, Result};
use serde::{Deserialize, Deserializer};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::options::SecretManagerOptions;

/// Default managed identity token endpoint.
pub const IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";

const IMDS_API_VERSION: &str = "2018-02-01";

/// A bearer token with an optional expiry.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    /// Check if the token is expired or about to expire.
    pub fn is_expired(&self) -> bool {
        let buffer = Duration::minutes(5);
        self.expires_at
            .map(|exp| Utc::now() + buffer > exp)
            .unwrap_or(false)
    }
}

/// Source of bearer tokens.
#[async_trait]
pub trait TokenCredential: Send + Sync {
    /// Acquire a token for `scope` using the caller's HTTP client.
    async fn get_token(&self, client: &reqwest::Client, scope: &str) -> Result<AccessToken>;

    /// Credential kind for logging.
    fn kind(&self) -> &'static str;
}

/// Build the credential described by `options`.
pub fn credential_from_options(
    options: &SecretManagerOptions,
) -> Result<Arc<dyn TokenCredential>> {
    if let Some(token) = &options.access_token {
        return Ok(Arc::new(StaticTokenCredential::new(token.clone())));
    }

    let credential: Box<dyn TokenCredential> = match &options.client_secret {
        Some(secret) => {
            let (Some(tenant_id), Some(client_id)) =
                (&options.tenant_id, &options.managed_identity_client_id)
            else {
                return Err(Error::Configuration(
                    "client_secret requires tenant_id and managed_identity_client_id".to_string(),
                ));
            };
            Box::new(ClientSecretCredential::new(
                &options.authority_host,
                tenant_id,
                client_id,
                secret,
            ))
        }
        None => Box::new(ManagedIdentityCredential::new(
            options.identity_endpoint.as_deref(),
            options.managed_identity_client_id.clone(),
        )),
    };

    Ok(Arc::new(CachedCredential::new(credential)))
}

/// A fixed token.
pub struct StaticTokenCredential {
    token: String,
}

impl StaticTokenCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenCredential for StaticTokenCredential {
    async fn get_token(&self, _client: &reqwest::Client, _scope: &str) -> Result<AccessToken> {
        Ok(AccessToken {
            token: self.token.clone(),
            expires_at: None,
        })
    }

    fn kind(&self) -> &'static str {
        "static"
    }
}

/// Service principal client credentials grant.
pub struct ClientSecretCredential {
    authority_host: String,
    tenant_id: String,
    client_id: String,
    client_secret: String,
}

impl ClientSecretCredential {
    pub fn new(authority_host: &str, tenant_id: &str, client_id: &str, client_secret: &str) -> Self {
        Self {
            authority_host: authority_host.trim_end_matches('/').to_string(),
            tenant_id: tenant_id.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
        }
    }

    fn token_endpoint(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority_host, self.tenant_id
        )
    }
}

#[async_trait]
impl TokenCredential for ClientSecretCredential {
    async fn get_token(&self, client: &reqwest::Client, scope: &str) -> Result<AccessToken> {
        debug!(
            client_id = %self.client_id,
            tenant_id = %self.tenant_id,
            "Requesting client credentials token"
        );

        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", scope),
            ("grant_type", "client_credentials"),
        ];

        let response = client
            .post(self.token_endpoint())
            .form(&params)
            .send()
            .await
            .map_err(request_error)?;

        read_token_response(response).await
    }

    fn kind(&self) -> &'static str {
        "client_secret"
    }
}

/// Managed identity via the instance metadata service.
pub struct ManagedIdentityCredential {
    endpoint: String,
    client_id: Option<String>,
}

impl ManagedIdentityCredential {
    pub fn new(endpoint: Option<&str>, client_id: Option<String>) -> Self {
        Self {
            endpoint: endpoint.unwrap_or(IMDS_ENDPOINT).to_string(),
            client_id,
        }
    }
}

#[async_trait]
impl TokenCredential for ManagedIdentityCredential {
    async fn get_token(&self, client: &reqwest::Client, scope: &str) -> Result<AccessToken> {
        let resource = scope.trim_end_matches("/.default");
        debug!(
            resource = %resource,
            client_id = ?self.client_id,
            "Requesting managed identity token"
        );

        let mut query = vec![("api-version", IMDS_API_VERSION), ("resource", resource)];
        if let Some(client_id) = &self.client_id {
            query.push(("client_id", client_id.as_str()));
        }

        let response = client
            .get(&self.endpoint)
            .query(&query)
            .header("Metadata", "true")
            .send()
            .await
            .map_err(request_error)?;

        read_token_response(response).await
    }

    fn kind(&self) -> &'static str {
        "managed_identity"
    }
}

/// Reuses a token until it is about to expire.
pub struct CachedCredential {
    inner: Box<dyn TokenCredential>,
    cached: Mutex<Option<AccessToken>>,
}

impl CachedCredential {
    pub fn new(inner: Box<dyn TokenCredential>) -> Self {
        Self {
            inner,
            cached: Mutex::new(None),
        }
    }
}

#[async_trait]
impl TokenCredential for CachedCredential {
    async fn get_token(&self, client: &reqwest::Client, scope: &str) -> Result<AccessToken> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref()
            && !token.is_expired()
        {
            return Ok(token.clone());
        }

        let token = self.inner.get_token(client, scope).await?;
        *cached = Some(token.clone());
        Ok(token)
    }

    fn kind(&self) -> &'static str {
        self.inner.kind()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default, deserialize_with = "seconds")]
    expires_in: Option<i64>,
}

/// Token endpoints disagree on whether `expires_in` is a number or a string.
fn seconds<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_i64(),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

async fn read_token_response(response: reqwest::Response) -> Result<AccessToken> {
    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await.unwrap_or_default();
        return Err(Error::Credential(format!(
            "token endpoint returned {}: {}",
            status.as_u16(),
            error_text
        )));
    }

    let body: TokenResponse = response
        .json()
        .await
        .map_err(|e| Error::Credential(format!("invalid token response: {}", e)))?;

    Ok(AccessToken {
        token: body.access_token,
        expires_at: body
            .expires_in
            .map(|secs| Utc::now() + Duration::seconds(secs)),
    })
}

fn request_error(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::Credential(format!("token request timed out: {}", err))
    } else {
        Error::Credential(format!("token request failed: {}", err))
    }
}
