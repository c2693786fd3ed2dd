//! Engine-wide configuration: the model cost table, the credit table, and
//! environment/credential resolution for provider API keys.
//!
//! Grounded on `fluent_core::config`'s `EngineConfig`/`VariableResolverProcessor`
//! (recursive `serde_json::Value` walker resolving `CREDENTIAL_`/`ENV_`/
//! `${VAR}` placeholders), generalized from one engine's config to the
//! whole pipeline engine's config.

use std::collections::HashMap;
use std::env;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::cost_calculator::{CostLimits, CreditTable, OperationCreditConfig};
use crate::types::{ModelConfig, OperationAIConfig, QualityLevel};

/// Top-level configuration for a running engine: per-operation model
/// menus, the credit price book, cost guardrails, and provider
/// credentials (resolved, never serialized back out).
#[derive(Debug, Clone, Default)]
pub struct PipelineEngineConfig {
    pub operations: HashMap<String, OperationAIConfig>,
    pub usd_per_credit: f64,
    pub credit_prices: HashMap<String, OperationCreditConfig>,
    pub cost_limits: CostLimits,
}

impl PipelineEngineConfig {
    pub fn model_for(&self, operation_id: &str, quality: QualityLevel) -> Option<&ModelConfig> {
        self.operations.get(operation_id)?.models.get(&quality)
    }

    pub fn credit_table(&self) -> CreditTable {
        CreditTable {
            usd_per_credit: self.usd_per_credit,
            operations: self.credit_prices.clone(),
        }
    }
}

/// On-disk representation of [`PipelineEngineConfig`], loaded from YAML or
/// JSON and resolved through [`VariableResolverProcessor`] before use.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct RawEngineConfig {
    pub operations: HashMap<String, OperationAIConfig>,
    pub usd_per_credit: f64,
    #[serde(default)]
    pub credit_prices: HashMap<String, RawCreditConfig>,
    #[serde(default)]
    pub cost_limits: Option<RawCostLimits>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct RawCreditConfig {
    #[serde(default)]
    pub by_quality: HashMap<QualityLevel, u64>,
    #[serde(default)]
    pub default: Option<u64>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RawCostLimits {
    pub max_single_request_usd: f64,
    pub max_daily_total_usd: f64,
    pub warn_threshold_usd: f64,
}

/// Resolves `${VAR}`/`ENV_*`/`CREDENTIAL_*` placeholders found anywhere in
/// a config document, recursively.
pub trait VariableResolver: Send + Sync {
    fn is_resolvable(&self, key: &str) -> bool;
    fn resolve(&self, key: &str) -> Result<String>;
}

pub struct EnvVarResolver;

impl VariableResolver for EnvVarResolver {
    fn is_resolvable(&self, key: &str) -> bool {
        key.starts_with("ENV_") || (key.starts_with("${") && key.ends_with('}'))
    }

    fn resolve(&self, key: &str) -> Result<String> {
        let env_key = if let Some(rest) = key.strip_prefix("ENV_") {
            rest
        } else if key.starts_with("${") && key.ends_with('}') {
            &key[2..key.len() - 1]
        } else {
            return Err(anyhow!("invalid environment variable reference: {key}"));
        };
        env::var(env_key).with_context(|| format!("environment variable '{env_key}' not set"))
    }
}

pub struct CredentialResolver {
    credentials: HashMap<String, String>,
}

impl CredentialResolver {
    pub fn new(credentials: HashMap<String, String>) -> Self {
        Self { credentials }
    }
}

impl VariableResolver for CredentialResolver {
    fn is_resolvable(&self, key: &str) -> bool {
        key.starts_with("CREDENTIAL_")
    }

    fn resolve(&self, key: &str) -> Result<String> {
        let credential_key = &key[11..];
        self.credentials
            .get(credential_key)
            .cloned()
            .ok_or_else(|| anyhow!("credential '{credential_key}' not found"))
    }
}

/// Walks a parsed config document, replacing any resolvable string leaf
/// with the value its resolver produces. Resolved values never get written
/// back into the process environment.
pub struct VariableResolverProcessor {
    resolvers: Vec<Arc<dyn VariableResolver>>,
}

impl VariableResolverProcessor {
    pub fn new(credentials: &HashMap<String, String>) -> Self {
        Self {
            resolvers: vec![
                Arc::new(EnvVarResolver),
                Arc::new(CredentialResolver::new(credentials.clone())),
            ],
        }
    }

    pub fn resolve(&self, value: &mut Value) -> Result<()> {
        match value {
            Value::String(s) => {
                for resolver in &self.resolvers {
                    if resolver.is_resolvable(s) {
                        debug!(key = %s, "resolving config variable");
                        *s = resolver.resolve(s)?;
                        return Ok(());
                    }
                }
                Ok(())
            }
            Value::Object(map) => {
                for (_, v) in map.iter_mut() {
                    self.resolve(v)?;
                }
                Ok(())
            }
            Value::Array(items) => {
                for item in items.iter_mut() {
                    self.resolve(item)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// Loads and resolves a [`PipelineEngineConfig`] from a YAML or JSON
/// document, given a set of credential values pulled from wherever the
/// caller keeps secrets (a keychain, a secrets manager, CLI flags).
pub fn load_engine_config(
    document: &str,
    credentials: &HashMap<String, String>,
) -> Result<PipelineEngineConfig> {
    let yaml_value: serde_yaml::Value = serde_yaml::from_str(document)
        .context("config document is neither valid YAML nor valid JSON")?;
    let mut json_value = serde_json::to_value(yaml_value)?;

    VariableResolverProcessor::new(credentials).resolve(&mut json_value)?;

    let raw: RawEngineConfig =
        serde_json::from_value(json_value).context("config did not match expected schema")?;

    let credit_prices = raw
        .credit_prices
        .into_iter()
        .map(|(op, cfg)| {
            (
                op,
                OperationCreditConfig {
                    by_quality: cfg.by_quality,
                    default: cfg.default,
                },
            )
        })
        .collect();

    let cost_limits = raw
        .cost_limits
        .map(|l| CostLimits {
            max_single_request_usd: l.max_single_request_usd,
            max_daily_total_usd: l.max_daily_total_usd,
            warn_threshold_usd: l.warn_threshold_usd,
        })
        .unwrap_or_default();

    Ok(PipelineEngineConfig {
        operations: raw.operations,
        usd_per_credit: raw.usd_per_credit,
        credit_prices,
        cost_limits,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_resolver_handles_both_syntaxes() {
        std::env::set_var("CASCADE_TEST_KEY", "secret-value");
        let resolver = EnvVarResolver;
        assert_eq!(resolver.resolve("ENV_CASCADE_TEST_KEY").unwrap(), "secret-value");
        assert_eq!(resolver.resolve("${CASCADE_TEST_KEY}").unwrap(), "secret-value");
        std::env::remove_var("CASCADE_TEST_KEY");
    }

    #[test]
    fn credential_resolver_looks_up_by_suffix() {
        let mut creds = HashMap::new();
        creds.insert("OPENAI_API_KEY".to_string(), "sk-test".to_string());
        let resolver = CredentialResolver::new(creds);
        assert_eq!(
            resolver.resolve("CREDENTIAL_OPENAI_API_KEY").unwrap(),
            "sk-test"
        );
    }

    #[test]
    fn load_engine_config_resolves_nested_placeholders() {
        std::env::set_var("CASCADE_USD_PER_CREDIT_TEST", "0.1");
        let doc = r#"
usd_per_credit: 0.1
operations: {}
credit_prices:
  generate_text:
    default: 5
"#;
        let config = load_engine_config(doc, &HashMap::new()).unwrap();
        assert_eq!(config.usd_per_credit, 0.1);
        assert_eq!(
            config.credit_prices.get("generate_text").unwrap().default,
            Some(5)
        );
        std::env::remove_var("CASCADE_USD_PER_CREDIT_TEST");
    }
}
