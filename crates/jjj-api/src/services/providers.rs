//! Inference provider seam.
//!
//! Tool handlers talk to [`ChatModel`] and [`MediaModel`] trait objects so the
//! HTTP clients can be swapped for fakes in tests.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use jjj_models::{ImageSize, Voice};
use thiserror::Error;

use crate::config::{ChatProvider, ProviderConfig};
use crate::metrics;
use crate::services::gemini::GeminiClient;
use crate::services::openai::OpenAiClient;

pub type ProviderResult<T> = Result<T, ProviderError>;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{0} API key is not configured")]
    NotConfigured(&'static str),

    #[error("provider rejected credentials: {0}")]
    Unauthorized(String),

    #[error("provider rate limited: {0}")]
    RateLimited(String),

    #[error("provider returned {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ProviderError {
    /// Classify a non-success HTTP status from a provider.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => ProviderError::Unauthorized(message),
            429 => ProviderError::RateLimited(message),
            _ => ProviderError::Upstream { status, message },
        }
    }
}

/// A chat completion request after plan limits have been applied.
#[derive(Debug, Clone)]
pub struct ChatPrompt {
    pub message: String,
    pub max_tokens: u32,
    pub language: Option<String>,
}

impl ChatPrompt {
    pub fn system_instruction(&self) -> String {
        let mut prompt = String::from(
            "You are the JJJ AI Studio assistant. Answer clearly and concisely.",
        );
        if let Some(lang) = self.language.as_deref().filter(|l| !l.trim().is_empty()) {
            prompt.push_str(&format!(" Reply in {} unless the user writes in another language.", lang.trim()));
        }
        prompt
    }
}

/// An uploaded audio file for transcription.
#[derive(Debug, Clone)]
pub struct AudioUpload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    fn name(&self) -> &'static str;

    async fn complete(&self, prompt: &ChatPrompt) -> ProviderResult<String>;
}

#[async_trait]
pub trait MediaModel: Send + Sync {
    fn name(&self) -> &'static str;

    /// Synthesize speech. Returns MP3 bytes.
    async fn speech(&self, text: &str, voice: Voice) -> ProviderResult<Vec<u8>>;

    /// Generate an image. Returns a URL or a `data:` URL.
    async fn image(&self, prompt: &str, size: ImageSize) -> ProviderResult<String>;

    async fn transcribe(&self, audio: AudioUpload) -> ProviderResult<String>;
}

/// The providers a server instance routes tool calls to.
#[derive(Clone)]
pub struct Providers {
    pub chat: Arc<dyn ChatModel>,
    pub media: Arc<dyn MediaModel>,
}

impl Providers {
    /// Build HTTP clients from configuration. Missing keys surface per call.
    pub fn from_config(config: &ProviderConfig) -> ProviderResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()?;

        let openai = Arc::new(OpenAiClient::new(http.clone(), config));
        let chat: Arc<dyn ChatModel> = match config.chat_provider {
            ChatProvider::OpenAi => openai.clone() as Arc<dyn ChatModel>,
            ChatProvider::Gemini => Arc::new(GeminiClient::new(http, config)),
        };

        Ok(Self { chat, media: openai })
    }

    /// Route every tool to one implementation.
    pub fn single<P>(provider: Arc<P>) -> Self
    where
        P: ChatModel + MediaModel + 'static,
    {
        Self {
            chat: provider.clone(),
            media: provider,
        }
    }
}

/// Run a provider call and record its outcome and latency.
pub async fn observe<T, F>(provider: &str, operation: &str, call: F) -> ProviderResult<T>
where
    F: std::future::Future<Output = ProviderResult<T>>,
{
    let start = Instant::now();
    let result = call.await;
    metrics::record_provider_call(
        provider,
        operation,
        result.is_ok(),
        start.elapsed().as_secs_f64(),
    );
    if let Err(e) = &result {
        tracing::warn!(provider, operation, error = %e, "Provider call failed");
    }
    result
}

/// Read an error body for logging, trimmed to something readable.
pub(crate) async fn error_message(response: reqwest::Response) -> String {
    let text = response.text().await.unwrap_or_default();
    text.chars().take(500).collect()
}
