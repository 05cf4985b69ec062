//! Integration test infrastructure for Latchkey.
//!
//! Provides a wiremock-backed vault, counting providers and key fixtures for
//! exercising the secret manager end to end without real cloud services.
//!
//! # Usage
//!
//! ```ignore
//! use latchkey_tests::VaultContext;
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let vault = VaultContext::start().await;
//!     vault.mount_secret("db-password", "hunter2").await;
//!     let manager = vault.manager().await.unwrap();
//! }
//! ```

pub mod context;
pub mod fixtures;
pub mod helpers;

pub use context::VaultContext;
pub use fixtures::*;
pub use helpers::*;

/// Initialize test logging (call once per test binary).
pub fn init_test_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,latchkey_secrets=debug")),
        )
        .with_test_writer()
        .try_init();
}
