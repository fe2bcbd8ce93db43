//! API configuration.

use std::time::Duration;

use jjj_models::QuotaConfig;

/// Which inference backend answers chat requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChatProvider {
    #[default]
    OpenAi,
    Gemini,
}

impl ChatProvider {
    pub fn from_str_lossy(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "gemini" | "google" => ChatProvider::Gemini,
            _ => ChatProvider::OpenAi,
        }
    }
}

/// Backing store for user records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    #[default]
    Firestore,
    Memory,
}

impl StoreBackend {
    pub fn from_str_lossy(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "memory" | "mem" => StoreBackend::Memory,
            _ => StoreBackend::Firestore,
        }
    }
}

/// Inference provider settings.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub gemini_api_key: Option<String>,
    pub gemini_base_url: String,
    pub chat_provider: ChatProvider,
    pub openai_chat_model: String,
    pub openai_tts_model: String,
    pub openai_image_model: String,
    pub openai_stt_model: String,
    pub gemini_model: String,
    /// Upper bound on a single provider call
    pub timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            openai_base_url: "https://api.openai.com/v1".to_string(),
            gemini_api_key: None,
            gemini_base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            chat_provider: ChatProvider::OpenAi,
            openai_chat_model: "gpt-4o-mini".to_string(),
            openai_tts_model: "tts-1".to_string(),
            openai_image_model: "dall-e-2".to_string(),
            openai_stt_model: "whisper-1".to_string(),
            gemini_model: "gemini-2.5-flash".to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

impl ProviderConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            openai_api_key: non_empty_var("OPENAI_API_KEY"),
            openai_base_url: std::env::var("OPENAI_BASE_URL").unwrap_or(d.openai_base_url),
            gemini_api_key: non_empty_var("GEMINI_API_KEY"),
            gemini_base_url: std::env::var("GEMINI_BASE_URL").unwrap_or(d.gemini_base_url),
            chat_provider: std::env::var("CHAT_PROVIDER")
                .map(|s| ChatProvider::from_str_lossy(&s))
                .unwrap_or_default(),
            openai_chat_model: std::env::var("OPENAI_CHAT_MODEL").unwrap_or(d.openai_chat_model),
            openai_tts_model: std::env::var("OPENAI_TTS_MODEL").unwrap_or(d.openai_tts_model),
            openai_image_model: std::env::var("OPENAI_IMAGE_MODEL").unwrap_or(d.openai_image_model),
            openai_stt_model: std::env::var("OPENAI_STT_MODEL").unwrap_or(d.openai_stt_model),
            gemini_model: std::env::var("GEMINI_MODEL").unwrap_or(d.gemini_model),
            timeout: Duration::from_secs(
                std::env::var("PROVIDER_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            ),
        }
    }
}

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Rate limit requests per second
    pub rate_limit_rps: u32,
    /// Request timeout
    pub request_timeout: Duration,
    /// Max request body size
    pub max_body_size: usize,
    /// Environment (development/production)
    pub environment: String,
    /// Shared secret for `/api/admin/*`. Unset disables the admin surface.
    pub admin_api_key: Option<String>,
    pub razorpay_webhook_secret: Option<String>,
    pub store_backend: StoreBackend,
    pub providers: ProviderConfig,
    pub quota: QuotaConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec!["*".to_string()],
            rate_limit_rps: 10,
            request_timeout: Duration::from_secs(90),
            max_body_size: 10 * 1024 * 1024, // 10MB
            environment: "development".to_string(),
            admin_api_key: None,
            razorpay_webhook_secret: None,
            store_backend: StoreBackend::Firestore,
            providers: ProviderConfig::default(),
            quota: QuotaConfig::default(),
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("API_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(8000),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_else(|_| vec!["*".to_string()]),
            rate_limit_rps: std::env::var("RATE_LIMIT_RPS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            request_timeout: Duration::from_secs(
                std::env::var("REQUEST_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(90),
            ),
            max_body_size: std::env::var("MAX_BODY_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10 * 1024 * 1024),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            admin_api_key: non_empty_var("ADMIN_API_KEY"),
            razorpay_webhook_secret: non_empty_var("RAZORPAY_WEBHOOK_SECRET"),
            store_backend: std::env::var("STORE_BACKEND")
                .map(|s| StoreBackend::from_str_lossy(&s))
                .unwrap_or_default(),
            providers: ProviderConfig::from_env(),
            quota: QuotaConfig::from_env(),
        }
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "production"
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
