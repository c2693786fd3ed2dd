//! Google Gemini adapter. Grounded on `fluent-engines`'s `GoogleGeminiEngine`
//! (pooled `reqwest::Client`, API key passed as a query parameter, the
//! `{contents, systemInstruction}` `generateContent` payload shape).

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use cascade_core::types::{ModelConfig, Provider as ProviderKind};
use reqwest::Client;
use tracing::debug;

use crate::provider::{GenerationResult, Provider, Usage};

pub struct GoogleGeminiProvider {
    client: Client,
    api_key: String,
}

impl GoogleGeminiProvider {
    pub fn new(api_key: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .connect_timeout(std::time::Duration::from_secs(10))
            .pool_max_idle_per_host(10)
            .build()
            .context("failed to build gemini http client")?;

        Ok(Self { client, api_key })
    }
}

#[async_trait]
impl Provider for GoogleGeminiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Google
    }

    fn has_native_json_mode(&self) -> bool {
        true
    }

    async fn generate(
        &self,
        model: &ModelConfig,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<GenerationResult> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            model.model, self.api_key
        );

        let mut payload = serde_json::json!({
            "system_instruction": { "parts": [{ "text": system_prompt }] },
            "contents": [
                { "role": "user", "parts": [{ "text": user_prompt }] }
            ],
            "generationConfig": { "temperature": model.temperature },
        });
        if model.supports_json_mode {
            payload["generationConfig"]["responseMimeType"] = serde_json::json!("application/json");
        }
        if let Some(top_p) = model.top_p {
            payload["generationConfig"]["topP"] = serde_json::json!(top_p);
        }

        let response = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .json(&payload)
            .send()
            .await
            .context("gemini request failed")?;

        let body: serde_json::Value = response.json().await.context("invalid gemini response body")?;
        debug!(?body, "gemini response");

        if let Some(error) = body.get("error") {
            return Err(anyhow!("gemini API error: {error}"));
        }

        let content = body["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .ok_or_else(|| anyhow!("gemini response missing candidates[0].content.parts[0].text"))?
            .to_string();

        let usage = Usage {
            input_tokens: body["usageMetadata"]["promptTokenCount"].as_u64().unwrap_or(0),
            output_tokens: body["usageMetadata"]["candidatesTokenCount"].as_u64().unwrap_or(0),
        };

        Ok(GenerationResult { content, usage })
    }
}
