//! Vendor adapters and the process-wide provider registry.
//!
//! Grounded on `fluent-engines`'s `create_engine` dispatcher
//! (`fluent-engines/src/lib.rs`), which matches an `EngineType` to a
//! constructor; generalized here into a registry that is populated once,
//! lazily, the first time a provider is needed, rather than constructed
//! fresh per call.

pub mod anthropic;
pub mod google_gemini;
pub mod mistral;
pub mod openai;
pub mod provider;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use cascade_core::types::Provider as ProviderKind;
use once_cell::sync::OnceCell;
use tokio::sync::RwLock;

pub use provider::{GenerationResult, Provider, Usage};

/// Where an adapter's API key comes from. The registry never reads the
/// environment itself — credentials are resolved once by
/// `cascade_core::config` and handed in here.
#[derive(Debug, Clone, Default)]
pub struct ProviderCredentials {
    pub api_keys: HashMap<ProviderKind, String>,
}

/// Lazily-constructed, process-wide table of provider adapters. Built once
/// on first use and never torn down — engine clients are cheap to share
/// and expensive to rebuild per request (connection pools, TLS handshakes).
pub struct ProviderRegistry {
    providers: RwLock<HashMap<ProviderKind, Arc<dyn Provider>>>,
    credentials: ProviderCredentials,
}

static REGISTRY: OnceCell<ProviderRegistry> = OnceCell::new();

impl ProviderRegistry {
    fn new(credentials: ProviderCredentials) -> Self {
        Self {
            providers: RwLock::new(HashMap::new()),
            credentials,
        }
    }

    /// Returns the process-wide registry, initializing it with the given
    /// credentials on first call. Subsequent calls ignore `credentials` and
    /// return the already-initialized instance — matching the Design Notes'
    /// guidance that the registry is the one legitimate piece of global
    /// state in the engine.
    pub fn global(credentials: ProviderCredentials) -> &'static ProviderRegistry {
        REGISTRY.get_or_init(|| ProviderRegistry::new(credentials))
    }

    /// Returns the adapter for `kind`, constructing and caching it on
    /// first request.
    pub async fn get(&self, kind: ProviderKind) -> Result<Arc<dyn Provider>> {
        if let Some(provider) = self.providers.read().await.get(&kind) {
            return Ok(provider.clone());
        }

        let mut providers = self.providers.write().await;
        if let Some(provider) = providers.get(&kind) {
            return Ok(provider.clone());
        }

        let api_key = self
            .credentials
            .api_keys
            .get(&kind)
            .cloned()
            .ok_or_else(|| anyhow!("no API key configured for provider {kind}"))?;

        let provider: Arc<dyn Provider> = match kind {
            ProviderKind::Anthropic => Arc::new(
                anthropic::AnthropicProvider::new(api_key).context("constructing anthropic provider")?,
            ),
            ProviderKind::OpenAi => {
                Arc::new(openai::OpenAiProvider::new(api_key).context("constructing openai provider")?)
            }
            ProviderKind::Google => Arc::new(
                google_gemini::GoogleGeminiProvider::new(api_key)
                    .context("constructing google provider")?,
            ),
            ProviderKind::Mistral => {
                Arc::new(mistral::MistralProvider::new(api_key).context("constructing mistral provider")?)
            }
        };

        providers.insert(kind, provider.clone());
        Ok(provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn registry_errors_without_credentials() {
        let registry = ProviderRegistry::new(ProviderCredentials::default());
        let result = registry.get(ProviderKind::OpenAi).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn registry_caches_constructed_provider() {
        let mut api_keys = HashMap::new();
        api_keys.insert(ProviderKind::OpenAi, "sk-test".to_string());
        let registry = ProviderRegistry::new(ProviderCredentials { api_keys });

        let first = registry.get(ProviderKind::OpenAi).await.unwrap();
        let second = registry.get(ProviderKind::OpenAi).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
