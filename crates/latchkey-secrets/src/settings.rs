//! Resolve secret references embedded in configuration documents.

use crate::manager::SecretManager;
use latchkey_core::{Error, Result, SecretReference};
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Walks configuration values and resolves secret references through a manager.
///
/// Values whose scheme has no registered provider, such as `https://` or
/// `postgres://` addresses, are ordinary settings and pass through unchanged.
/// The dotted key path of each value (`database.password`, `hosts.0`) is used
/// as the logical setting name in warnings and errors.
pub struct SettingsResolver<'a> {
    manager: &'a SecretManager,
    warn_on_plaintext: bool,
}

impl<'a> SettingsResolver<'a> {
    pub fn new(manager: &'a SecretManager) -> Self {
        Self {
            manager,
            warn_on_plaintext: true,
        }
    }

    /// Control warnings for literal values.
    pub fn warn_on_plaintext(mut self, warn: bool) -> Self {
        self.warn_on_plaintext = warn;
        self
    }

    /// Resolve a flat map of settings.
    pub async fn resolve_map(
        &self,
        settings: &BTreeMap<String, String>,
    ) -> Result<BTreeMap<String, Option<String>>> {
        let mut resolved = BTreeMap::new();
        for (key, value) in settings {
            resolved.insert(key.clone(), self.resolve_leaf(value, Some(key)).await?);
        }
        Ok(resolved)
    }

    /// Resolve every string leaf of a YAML document.
    pub async fn resolve_value(&self, value: &Value) -> Result<Value> {
        self.resolve_at(String::new(), value).await
    }

    /// Read a YAML file and resolve it.
    pub async fn resolve_file(&self, path: &Path) -> Result<Value> {
        let contents = tokio::fs::read_to_string(path).await?;
        let document: Value = serde_yaml::from_str(&contents).map_err(|e| {
            Error::Configuration(format!("failed to parse {}: {}", path.display(), e))
        })?;
        self.resolve_value(&document).await
    }

    async fn resolve_leaf(&self, raw: &str, name: Option<&str>) -> Result<Option<String>> {
        // Before initialization the manager reports NotInitialized for references
        if let Some(reference) = SecretReference::try_parse(raw) {
            if self.manager.is_initialized().await
                && !self.manager.supports(reference.scheme()).await
            {
                debug!(
                    setting = name.unwrap_or("<unnamed>"),
                    scheme = %reference.scheme(),
                    "No provider for scheme; keeping value as-is"
                );
                return Ok(Some(raw.to_string()));
            }
        }
        self.manager.resolve(raw, name, self.warn_on_plaintext).await
    }

    fn resolve_at<'b>(
        &'b self,
        path: String,
        value: &'b Value,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Value>> + Send + 'b>> {
        Box::pin(async move {
            match value {
                Value::String(raw) => {
                    let name = if path.is_empty() { None } else { Some(path.as_str()) };
                    let resolved = self.resolve_leaf(raw, name).await?;
                    Ok(resolved.map(Value::String).unwrap_or(Value::Null))
                }
                Value::Mapping(mapping) => {
                    let mut out = Mapping::new();
                    for (key, child) in mapping {
                        let child_path = join_path(&path, &key_name(key));
                        out.insert(key.clone(), self.resolve_at(child_path, child).await?);
                    }
                    Ok(Value::Mapping(out))
                }
                Value::Sequence(items) => {
                    let mut out = Vec::with_capacity(items.len());
                    for (index, child) in items.iter().enumerate() {
                        let child_path = join_path(&path, &index.to_string());
                        out.push(self.resolve_at(child_path, child).await?);
                    }
                    Ok(Value::Sequence(out))
                }
                Value::Tagged(tagged) => self.resolve_at(path, &tagged.value).await,
                other => Ok(other.clone()),
            }
        })
    }
}

fn key_name(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    }
}

fn join_path(parent: &str, child: &str) -> String {
    if parent.is_empty() {
        child.to_string()
    } else {
        format!("{}.{}", parent, child)
    }
}
