//! Mistral adapter. Mistral's chat-completions API is OpenAI-compatible,
//! grounded the same way as [`crate::openai::OpenAiProvider`] with Mistral's
//! own host and no native JSON-mode response format — the JSON contract is
//! carried entirely by a system-prompt instruction instead.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use cascade_core::types::{ModelConfig, Provider as ProviderKind};
use reqwest::Client;
use tracing::debug;

use crate::provider::{with_json_instruction, GenerationResult, Provider, Usage};

pub struct MistralProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl MistralProvider {
    pub fn new(api_key: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .connect_timeout(std::time::Duration::from_secs(10))
            .pool_max_idle_per_host(10)
            .build()
            .context("failed to build mistral http client")?;

        Ok(Self {
            client,
            api_key,
            base_url: "https://api.mistral.ai/v1/chat/completions".to_string(),
        })
    }
}

#[async_trait]
impl Provider for MistralProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Mistral
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
            "temperature": model.temperature,
            "messages": [
                { "role": "system", "content": effective_system },
                { "role": "user", "content": user_prompt },
            ],
        });
        if let Some(max_tokens) = model.max_output_tokens {
            payload["max_tokens"] = serde_json::json!(max_tokens);
        }
        if let Some(top_p) = model.top_p {
            payload["top_p"] = serde_json::json!(top_p);
        }

        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
            .json(&payload)
            .send()
            .await
            .context("mistral request failed")?;

        let body: serde_json::Value = response.json().await.context("invalid mistral response body")?;
        debug!(?body, "mistral response");

        if let Some(error) = body.get("error") {
            return Err(anyhow!("mistral API error: {error}"));
        }

        let content = body["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| anyhow!("mistral response missing choices[0].message.content"))?
            .to_string();

        let usage = Usage {
            input_tokens: body["usage"]["prompt_tokens"].as_u64().unwrap_or(0),
            output_tokens: body["usage"]["completion_tokens"].as_u64().unwrap_or(0),
        };

        Ok(GenerationResult { content, usage })
    }
}
