//! File provider registry
//!
//! Providers are selected by the `type` key of the `[provider]` section; the
//! remaining keys of that section are handed to the provider's factory.

mod arch;
mod simple;

pub use arch::ArchProvider;
pub use simple::SimpleProvider;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use netflash_core::{FatalError, FileProvider, FileRef, ProviderError};
use tracing::debug;

use crate::config::ProviderConfig;

/// Builds a provider from its configuration options
pub type ProviderFactory =
    Box<dyn Fn(&toml::Table) -> Result<Arc<dyn FileProvider>, ProviderError> + Send + Sync>;

/// Maps configuration keys to provider factories
pub struct ProviderRegistry {
    factories: BTreeMap<String, ProviderFactory>,
}

impl ProviderRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Registry holding the `simple` and `arch` providers
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register("simple", |options| {
            Ok(Arc::new(SimpleProvider::from_options(options)?) as Arc<dyn FileProvider>)
        });
        registry.register("arch", |options| {
            Ok(Arc::new(ArchProvider::from_options(options)?) as Arc<dyn FileProvider>)
        });
        registry
    }

    /// Register a factory; an existing entry with the same key is replaced
    pub fn register<F>(&mut self, key: impl Into<String>, factory: F)
    where
        F: Fn(&toml::Table) -> Result<Arc<dyn FileProvider>, ProviderError> + Send + Sync + 'static,
    {
        self.factories.insert(key.into(), Box::new(factory));
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.factories.contains_key(key)
    }

    /// Construct the configured provider
    ///
    /// Any failure here leaves the flasher without a way to pick files, so it
    /// is fatal.
    pub fn build(&self, config: &ProviderConfig) -> Result<Arc<dyn FileProvider>, FatalError> {
        let fatal = |source| FatalError::Provider {
            provider: config.kind.clone(),
            source,
        };

        let factory = self
            .factories
            .get(&config.kind)
            .ok_or_else(|| fatal(ProviderError::Unknown(config.kind.clone())))?;

        let provider = factory(&config.options).map_err(fatal)?;
        debug!(provider = %config.kind, name = provider.name(), "Built file provider");
        Ok(provider)
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn required_str(options: &toml::Table, key: &str) -> Result<String, ProviderError> {
    optional_str(options, key)?.ok_or_else(|| ProviderError::MissingOption(key.to_string()))
}

fn optional_str(options: &toml::Table, key: &str) -> Result<Option<String>, ProviderError> {
    match options.get(key) {
        None => Ok(None),
        Some(toml::Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(toml::Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(ProviderError::InvalidOption {
            key: key.to_string(),
            reason: format!("expected a string, found {}", other.type_str()),
        }),
    }
}

/// Classify a configured location; local paths must exist
async fn locate(location: &str) -> Result<FileRef, ProviderError> {
    let reference = FileRef::from_location(location);
    if let FileRef::Path(path) = &reference {
        if !exists(path).await {
            return Err(ProviderError::NotFound(path.display().to_string()));
        }
    }
    Ok(reference)
}

async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}
