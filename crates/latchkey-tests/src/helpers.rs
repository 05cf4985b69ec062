//! Test helper providers and utilities.

use async_trait::async_trait;
use latchkey_core::{Error, Result, SecretReference};
use latchkey_secrets::{ResolutionContext, SecretProvider};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// In-memory provider that counts calls.
///
/// Identifiers missing from the map resolve to `SecretNotFound`.
pub struct CountingProvider {
    schemes: &'static [&'static str],
    values: HashMap<String, String>,
    delay: Duration,
    calls: AtomicUsize,
    disposals: AtomicUsize,
}

impl CountingProvider {
    pub fn new(schemes: &'static [&'static str]) -> Self {
        Self {
            schemes,
            values: HashMap::new(),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            disposals: AtomicUsize::new(0),
        }
    }

    pub fn with_value(mut self, identifier: &str, value: &str) -> Self {
        self.values.insert(identifier.to_string(), value.to_string());
        self
    }

    /// Sleep before answering, to widen race windows.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn disposals(&self) -> usize {
        self.disposals.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SecretProvider for CountingProvider {
    fn name(&self) -> &str {
        "counting"
    }

    fn schemes(&self) -> &'static [&'static str] {
        self.schemes
    }

    async fn resolve(
        &self,
        reference: &SecretReference,
        context: &ResolutionContext,
    ) -> Result<Option<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.values.get(reference.identifier()) {
            Some(value) => Ok(Some(value.clone())),
            None => Err(Error::SecretNotFound(
                context.describe(reference).to_string(),
            )),
        }
    }

    async fn dispose(&self) {
        self.disposals.fetch_add(1, Ordering::SeqCst);
    }
}

/// Assert that a future completes within a timeout.
pub async fn assert_completes_within<F, T>(future: F, timeout: Duration) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(timeout, future)
        .await
        .expect("Operation timed out")
}
