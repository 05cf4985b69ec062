//! Secret manager for resolving and caching secret references.

use crate::crypto::EncryptionService;
use crate::options::SecretManagerOptions;
use crate::providers::{
    EncryptedProvider, EnvProvider, ResolutionContext, SecretProvider, VaultProvider,
};
use latchkey_core::{Error, Result, SecretReference};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Providers and policy fixed at initialization.
struct Registry {
    options: SecretManagerOptions,
    providers: HashMap<String, Arc<dyn SecretProvider>>,
}

impl Registry {
    fn register(&mut self, provider: Arc<dyn SecretProvider>) {
        for scheme in provider.schemes() {
            info!(provider = %provider.name(), scheme = %scheme, "Registering secret provider");
            self.providers.insert(scheme.to_string(), provider.clone());
        }
    }
}

/// Resolves secret references through registered providers.
///
/// The manager starts uninitialized. [`SecretManager::initialize`] builds the
/// provider registry once; [`SecretManager::shutdown`] tears it down again.
/// Resolved values are cached by the exact reference string for as long as
/// the manager stays initialized.
pub struct SecretManager {
    state: RwLock<Option<Registry>>,
    cache: RwLock<HashMap<String, Option<String>>>,
}

impl SecretManager {
    /// Create an uninitialized secret manager.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(None),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Create and initialize a manager in one step.
    pub async fn with_options(options: SecretManagerOptions) -> Result<Self> {
        let manager = Self::new();
        manager.initialize(options).await?;
        Ok(manager)
    }

    /// Build the provider registry.
    ///
    /// Returns `false` without touching anything if the manager is already
    /// initialized.
    pub async fn initialize(&self, options: SecretManagerOptions) -> Result<bool> {
        let mut state = self.state.write().await;
        if state.is_some() {
            debug!("Secret manager already initialized");
            return Ok(false);
        }

        let mut registry = Registry {
            options,
            providers: HashMap::new(),
        };

        registry.register(Arc::new(EnvProvider::new()));

        if registry.options.vault_uri.is_some() {
            let vault = VaultProvider::from_options(&registry.options)?;
            registry.register(Arc::new(vault));
        }

        match registry.options.encryption_key.as_deref() {
            Some(key) => {
                let service = EncryptionService::new(key).map_err(|e| {
                    Error::Configuration(format!("encryption key rejected: {}", e))
                })?;
                registry.register(Arc::new(EncryptedProvider::new(service)));
            }
            None => {
                warn!("No encryption key configured; enc:// references are unavailable");
            }
        }

        info!(
            providers = registry.providers.len(),
            allow_plaintext_fallback = registry.options.allow_plaintext_fallback,
            "Secret manager initialized"
        );
        *state = Some(registry);
        Ok(true)
    }

    /// Register an additional provider for each of its schemes.
    pub async fn register_provider(&self, provider: Arc<dyn SecretProvider>) -> Result<()> {
        let mut state = self.state.write().await;
        let registry = state.as_mut().ok_or(Error::NotInitialized)?;
        registry.register(provider);
        Ok(())
    }

    /// Whether [`SecretManager::initialize`] has run.
    pub async fn is_initialized(&self) -> bool {
        self.state.read().await.is_some()
    }

    /// Whether a provider is registered for `scheme`.
    ///
    /// Always `false` before initialization.
    pub async fn supports(&self, scheme: &str) -> bool {
        let scheme = scheme.to_ascii_lowercase();
        self.state
            .read()
            .await
            .as_ref()
            .is_some_and(|registry| registry.providers.contains_key(&scheme))
    }

    /// Resolve a raw configuration value.
    ///
    /// Literal values are returned unchanged. References are resolved through
    /// the provider registered for their scheme and cached. `Ok(None)` means a
    /// reference resolved to nothing and the fallback policy allowed it.
    pub async fn resolve(
        &self,
        value: &str,
        logical_name: Option<&str>,
        warn_on_plaintext: bool,
    ) -> Result<Option<String>> {
        if value.trim().is_empty() {
            return Ok(Some(value.to_string()));
        }

        let state = self.state.read().await;

        let Some(reference) = SecretReference::try_parse(value) else {
            let allow_fallback = state
                .as_ref()
                .map(|registry| registry.options.allow_plaintext_fallback)
                .unwrap_or(false);
            if state.is_some() && !allow_fallback && warn_on_plaintext {
                warn!(
                    setting = logical_name.unwrap_or("<unnamed>"),
                    "Plaintext value used where a secret reference is expected"
                );
            }
            return Ok(Some(value.to_string()));
        };

        if let Some(cached) = self.cache.read().await.get(reference.original()) {
            debug!(scheme = %reference.scheme(), "Secret cache hit");
            return Ok(cached.clone());
        }

        let wrap = |err: Error| match logical_name {
            Some(name) => err.for_setting(name),
            None => err,
        };

        let registry = state.as_ref().ok_or(Error::NotInitialized).map_err(wrap)?;
        let provider = registry
            .providers
            .get(reference.scheme())
            .ok_or_else(|| Error::UnregisteredScheme(reference.scheme().to_string()))
            .map_err(wrap)?;

        let allow_fallback = registry.options.allow_plaintext_fallback;
        let context = ResolutionContext::new(logical_name);

        match provider.resolve(&reference, &context).await {
            Ok(resolved) => {
                let empty = resolved.as_deref().is_none_or(str::is_empty);
                if empty && !allow_fallback {
                    let original = reference.original().to_string();
                    return Err(wrap(Error::EmptySecret(original)));
                }

                let mut cache = self.cache.write().await;
                let stored = cache
                    .entry(reference.original().to_string())
                    .or_insert(resolved);
                debug!(
                    scheme = %reference.scheme(),
                    provider = %provider.name(),
                    "Secret resolved"
                );
                Ok(stored.clone())
            }
            Err(err) if err.is_fatal() || !allow_fallback => Err(wrap(err)),
            Err(err) => {
                warn!(
                    setting = %context.describe(&reference),
                    scheme = %reference.scheme(),
                    error = %err,
                    "Secret resolution failed; falling back to the literal value"
                );
                Ok(Some(value.to_string()))
            }
        }
    }

    /// Resolve a value that must produce something.
    pub async fn resolve_required(&self, value: &str, logical_name: &str) -> Result<String> {
        self.resolve(value, Some(logical_name), true)
            .await?
            .ok_or_else(|| Error::EmptySecret(value.to_string()).for_setting(logical_name))
    }

    /// Dispose providers, clear the cache and return to the uninitialized state.
    pub async fn shutdown(&self) {
        let mut state = self.state.write().await;
        let Some(registry) = state.take() else {
            return;
        };

        // A provider registered under several schemes is disposed once
        let mut disposed: Vec<Arc<dyn SecretProvider>> = Vec::new();
        for provider in registry.providers.into_values() {
            if disposed.iter().any(|p| Arc::ptr_eq(p, &provider)) {
                continue;
            }
            provider.dispose().await;
            disposed.push(provider);
        }

        self.cache.write().await.clear();
        info!(providers = disposed.len(), "Secret manager shut down");
    }

    /// Number of cached references.
    pub async fn cache_size(&self) -> usize {
        self.cache.read().await.len()
    }
}

impl Default for SecretManager {
    fn default() -> Self {
        Self::new()
    }
}
