//! Anthropic adapter. Grounded on `fluent-engines`'s `AnthropicEngine` (pooled
//! `reqwest::Client`, `x-api-key`/`anthropic-version` headers, the
//! `{model, max_tokens, system, messages}` payload shape).

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use cascade_core::types::{ModelConfig, Provider as ProviderKind};
use reqwest::Client;
use tracing::debug;

use crate::provider::{with_json_instruction, GenerationResult, Provider, Usage};

const DEFAULT_MAX_TOKENS: u32 = 4096;
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl AnthropicProvider {
    pub fn new(api_key: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .connect_timeout(std::time::Duration::from_secs(10))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(std::time::Duration::from_secs(90))
            .build()
            .context("failed to build anthropic http client")?;

        Ok(Self {
            client,
            api_key,
            base_url: "https://api.anthropic.com/v1/messages".to_string(),
        })
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    async fn generate(
        &self,
        model: &ModelConfig,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<GenerationResult> {
        let effective_system = if model.supports_json_mode {
            with_json_instruction(system_prompt)
        } else {
            system_prompt.to_string()
        };

        let mut payload = serde_json::json!({
            "model": model.model,
            "max_tokens": model.max_output_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "temperature": model.temperature,
            "system": effective_system,
            "messages": [
                { "role": "user", "content": user_prompt }
            ],
        });
        if let Some(top_p) = model.top_p {
            payload["top_p"] = serde_json::json!(top_p);
        }

        let response = self
            .client
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&payload)
            .send()
            .await
            .context("anthropic request failed")?;

        let body: serde_json::Value = response.json().await.context("invalid anthropic response body")?;
        debug!(?body, "anthropic response");

        if let Some(error) = body.get("error") {
            return Err(anyhow!("anthropic API error: {error}"));
        }

        let content = body["content"][0]["text"]
            .as_str()
            .ok_or_else(|| anyhow!("anthropic response missing content[0].text"))?
            .to_string();

        let usage = Usage {
            input_tokens: body["usage"]["input_tokens"].as_u64().unwrap_or(0),
            output_tokens: body["usage"]["output_tokens"].as_u64().unwrap_or(0),
        };

        Ok(GenerationResult { content, usage })
    }
}
