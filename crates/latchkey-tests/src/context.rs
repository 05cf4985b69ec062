//! Mock vault context.

use latchkey_secrets::{SecretManager, SecretManagerOptions};
use wiremock::matchers::{header, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::fixtures::{TEST_ACCESS_TOKEN, ZERO_KEY};

/// A wiremock server speaking the vault secrets API.
///
/// Drop this to stop the server.
pub struct VaultContext {
    pub server: MockServer,
}

impl VaultContext {
    pub async fn start() -> Self {
        crate::init_test_logging();
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    /// Options pointing at this vault with a static bearer token.
    pub fn options(&self) -> SecretManagerOptions {
        SecretManagerOptions::default()
            .with_vault_uri(self.uri())
            .with_access_token(TEST_ACCESS_TOKEN)
            .with_encryption_key(ZERO_KEY)
    }

    /// Initialized manager using [`VaultContext::options`].
    pub async fn manager(&self) -> latchkey_core::Result<SecretManager> {
        SecretManager::with_options(self.options()).await
    }

    /// Serve the latest version of a secret.
    pub async fn mount_secret(&self, name: &str, value: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/secrets/{}", name)))
            .and(header("Authorization", format!("Bearer {}", TEST_ACCESS_TOKEN).as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "value": value,
                "id": format!("{}/secrets/{}/latest", self.uri(), name),
            })))
            .mount(&self.server)
            .await;
    }

    /// Serve a secret that must be fetched exactly `times` times.
    pub async fn mount_secret_expecting(&self, name: &str, value: &str, times: u64) {
        Mock::given(method("GET"))
            .and(path(format!("/secrets/{}", name)))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "value": value })),
            )
            .expect(times)
            .mount(&self.server)
            .await;
    }

    /// Answer every secret request with an error status.
    pub async fn mount_status(&self, status: u16, body: &str) {
        Mock::given(method("GET"))
            .and(path_regex(r"^/secrets/.+"))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(&self.server)
            .await;
    }

    /// Number of requests the vault has received.
    pub async fn request_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map(|requests| requests.len())
            .unwrap_or(0)
    }
}
