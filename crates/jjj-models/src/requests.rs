//! Request payloads accepted by the HTTP API.
//!
//! Bodies are deserialized into these types and then checked with
//! [`validator::Validate`] before any business logic runs.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Requested length of a chat reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ReplyLength {
    Short,
    #[default]
    Medium,
    Long,
}

#[derive(Debug, Clone, Deserialize, Validate, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[validate(length(min = 1, message = "message is required"))]
    pub message: String,
    #[serde(default)]
    pub reply_length: ReplyLength,
    #[serde(default)]
    #[validate(length(max = 32))]
    pub default_language: Option<String>,
}

/// Voices offered by the speech provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Voice {
    #[default]
    Alloy,
    Echo,
    Fable,
    Onyx,
    Nova,
    Shimmer,
}

impl Voice {
    pub fn as_str(&self) -> &'static str {
        match self {
            Voice::Alloy => "alloy",
            Voice::Echo => "echo",
            Voice::Fable => "fable",
            Voice::Onyx => "onyx",
            Voice::Nova => "nova",
            Voice::Shimmer => "shimmer",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate, JsonSchema)]
pub struct TtsRequest {
    #[validate(length(min = 1, message = "text is required"))]
    pub text: String,
    #[serde(default)]
    pub voice: Voice,
}

/// Output sizes supported by the image provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub enum ImageSize {
    #[serde(rename = "256x256")]
    Small,
    #[serde(rename = "512x512")]
    #[default]
    Medium,
    #[serde(rename = "1024x1024")]
    Large,
}

impl ImageSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageSize::Small => "256x256",
            ImageSize::Medium => "512x512",
            ImageSize::Large => "1024x1024",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate, JsonSchema)]
pub struct ImageRequest {
    #[validate(length(min = 1, max = 4000, message = "prompt is required"))]
    pub prompt: String,
    #[serde(default)]
    pub size: ImageSize,
}

#[derive(Debug, Clone, Deserialize, Validate, JsonSchema)]
pub struct SignUpRequest {
    #[validate(email(message = "a valid email is required"))]
    pub email: String,
    #[validate(length(min = 8, max = 128, message = "password must be 8 to 128 characters"))]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Validate, JsonSchema)]
pub struct SignInRequest {
    #[validate(email(message = "a valid email is required"))]
    pub email: String,
    #[validate(length(min = 1, max = 128))]
    pub password: String,
}

/// Admin plan change. `plan` is parsed strictly by the handler.
#[derive(Debug, Clone, Deserialize, Validate, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdminPlanUpdate {
    #[validate(length(min = 1, message = "plan is required"))]
    pub plan: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize, Validate, JsonSchema)]
pub struct CoinAdjustRequest {
    pub delta: i64,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, JsonSchema)]
pub struct ListUsersQuery {
    #[serde(default)]
    #[validate(range(min = 1, max = 200))]
    pub limit: Option<u32>,
    #[serde(default)]
    pub page_token: Option<String>,
}
