//! One module per subcommand, mirroring `fluent-cli`'s
//! one-handler-per-subcommand `commands/` layout.

pub mod describe;
pub mod run;
pub mod validate;

use std::collections::HashMap;

use cascade_core::types::Provider;
use cascade_providers::ProviderCredentials;

/// Picks up vendor API keys from the process environment. The engine
/// itself never reads the environment (see
/// `cascade_core::config::EnvVarResolver` for config-file-level
/// resolution); this is the one place the CLI boundary does.
pub fn credentials_from_env() -> ProviderCredentials {
    let mut api_keys = HashMap::new();
    for (provider, var) in [
        (Provider::Anthropic, "ANTHROPIC_API_KEY"),
        (Provider::OpenAi, "OPENAI_API_KEY"),
        (Provider::Google, "GOOGLE_API_KEY"),
        (Provider::Mistral, "MISTRAL_API_KEY"),
    ] {
        if let Ok(key) = std::env::var(var) {
            api_keys.insert(provider, key);
        }
    }
    ProviderCredentials { api_keys }
}
