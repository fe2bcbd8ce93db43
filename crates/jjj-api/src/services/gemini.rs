//! Gemini client for chat replies.
//!
//! Tries the configured model first and falls back to a lighter model when
//! the primary one errors. Credential and quota errors are not retried on
//! another model.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::ProviderConfig;
use crate::services::providers::{
    error_message, observe, ChatModel, ChatPrompt, ProviderError, ProviderResult,
};

const PROVIDER: &str = "gemini";
const FALLBACK_MODEL: &str = "gemini-2.5-flash-lite";

/// Gemini API client.
pub struct GeminiClient {
    api_key: Option<String>,
    base_url: String,
    models: Vec<String>,
    client: Client,
}

/// Gemini API request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    system_instruction: Content<'a>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
}

/// Gemini API response.
#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

impl GeminiClient {
    pub fn new(client: Client, config: &ProviderConfig) -> Self {
        let mut models = vec![config.gemini_model.clone()];
        if config.gemini_model != FALLBACK_MODEL {
            models.push(FALLBACK_MODEL.to_string());
        }
        Self {
            api_key: config.gemini_api_key.clone(),
            base_url: config.gemini_base_url.trim_end_matches('/').to_string(),
            models,
            client,
        }
    }

    async fn generate(&self, prompt: &ChatPrompt) -> ProviderResult<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(ProviderError::NotConfigured("Gemini"))?;

        let mut last_error = None;
        for model in &self.models {
            match self.call_gemini_api(api_key, model, prompt).await {
                Ok(text) => {
                    info!(model = %model, "Gemini reply generated");
                    return Ok(text);
                }
                Err(e @ (ProviderError::Unauthorized(_) | ProviderError::RateLimited(_))) => {
                    return Err(e);
                }
                Err(e) => {
                    warn!(model = %model, error = %e, "Gemini model failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| ProviderError::InvalidResponse("no Gemini model configured".into())))
    }

    async fn call_gemini_api(
        &self,
        api_key: &str,
        model: &str,
        prompt: &ChatPrompt,
    ) -> ProviderResult<String> {
        let url = format!("{}/models/{}:generateContent", self.base_url, model);
        let system = prompt.system_instruction();

        let request = GeminiRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part { text: &system }],
            },
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part {
                    text: &prompt.message,
                }],
            }],
            generation_config: GenerationConfig {
                max_output_tokens: prompt.max_tokens,
            },
        };

        let response = self
            .client
            .post(&url)
            .query(&[("key", api_key)])
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = error_message(response).await;
            return Err(ProviderError::from_status(status, message));
        }

        let gemini_response: GeminiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        let text: String = gemini_response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();

        let text = text.trim();
        if text.is_empty() {
            return Err(ProviderError::InvalidResponse("no content in Gemini response".into()));
        }
        Ok(text.to_string())
    }
}

#[async_trait]
impl ChatModel for GeminiClient {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn complete(&self, prompt: &ChatPrompt) -> ProviderResult<String> {
        observe(PROVIDER, "chat", self.generate(prompt)).await
    }
}
