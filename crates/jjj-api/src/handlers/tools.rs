//! AI tool handlers.
//!
//! Metered tools follow one sequence: resolve the caller, gate the call
//! through the ledger, call the provider, then record usage. A provider
//! error returns before anything is recorded.

use axum::extract::{Multipart, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use tracing::info;

use jjj_models::{
    chat_token_cap, estimate_speech_seconds, ChatRequest, ImageRequest, TtsRequest, UsageDelta,
};

use crate::error::{ApiError, ApiResult};
use crate::extract::ValidatedJson;
use crate::identity::Caller;
use crate::services::{AudioUpload, ChatPrompt};
use crate::state::AppState;

pub const TTS_PLAN_HEADER: &str = "x-tts-plan";
pub const TTS_TODAY_HEADER: &str = "x-tts-today";
pub const TTS_DAILY_LIMIT_HEADER: &str = "x-tts-dailylimit";

#[derive(Serialize)]
pub struct ChatResponse {
    pub reply: String,
}

#[derive(Serialize)]
pub struct ImageResponse {
    pub image: String,
}

#[derive(Serialize)]
pub struct TranscriptResponse {
    pub text: String,
}

/// POST /api/chat
pub async fn chat(
    State(state): State<AppState>,
    Caller(user): Caller,
    ValidatedJson(req): ValidatedJson<ChatRequest>,
) -> ApiResult<Json<ChatResponse>> {
    let now = Utc::now();
    let delta = UsageDelta::chat_message();
    let plan = state.ledger.guard(&user, &delta, req.message.chars().count(), now)?;

    let prompt = ChatPrompt {
        message: req.message,
        max_tokens: chat_token_cap(plan, req.reply_length),
        language: req.default_language,
    };
    let reply = state.providers.chat.complete(&prompt).await?;

    state.ledger.record_usage(&user, &delta, now).await;
    info!(user_id = %user.user_id, tool = "chat", plan = %plan.as_str(), "Chat reply served");

    Ok(Json(ChatResponse { reply }))
}

/// POST /api/tts
pub async fn tts(
    State(state): State<AppState>,
    Caller(user): Caller,
    ValidatedJson(req): ValidatedJson<TtsRequest>,
) -> ApiResult<Response> {
    let now = Utc::now();
    let seconds = estimate_speech_seconds(&req.text);
    let delta = UsageDelta::tts_clip(seconds);
    let plan = state.ledger.guard(&user, &delta, req.text.chars().count(), now)?;

    let audio = state.providers.media.speech(&req.text, req.voice).await?;

    state.ledger.record_usage(&user, &delta, now).await;
    let today = state.ledger.tts_clips_today(&user.record, now).saturating_add(1);
    let daily_limit = state.ledger.config().tts_daily_clips(plan);
    info!(user_id = %user.user_id, tool = "tts", plan = %plan.as_str(), seconds, "Speech synthesized");

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("audio/mpeg"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(
        HeaderName::from_static(TTS_PLAN_HEADER),
        HeaderValue::from_static(plan.as_str()),
    );
    headers.insert(HeaderName::from_static(TTS_TODAY_HEADER), HeaderValue::from(today));
    headers.insert(
        HeaderName::from_static(TTS_DAILY_LIMIT_HEADER),
        HeaderValue::from(daily_limit),
    );

    Ok((headers, audio).into_response())
}

/// POST /api/image
pub async fn image(
    State(state): State<AppState>,
    Caller(user): Caller,
    ValidatedJson(req): ValidatedJson<ImageRequest>,
) -> ApiResult<Json<ImageResponse>> {
    let now = Utc::now();
    let delta = UsageDelta::image();
    let plan = state.ledger.guard(&user, &delta, req.prompt.chars().count(), now)?;

    let image = state.providers.media.image(&req.prompt, req.size).await?;

    state.ledger.record_usage(&user, &delta, now).await;
    info!(user_id = %user.user_id, tool = "image", plan = %plan.as_str(), size = req.size.as_str(), "Image generated");

    Ok(Json(ImageResponse { image }))
}

/// POST /api/stt
///
/// Resolves the caller but is neither gated nor metered.
pub async fn stt(
    State(state): State<AppState>,
    Caller(user): Caller,
    mut multipart: Multipart,
) -> ApiResult<Json<TranscriptResponse>> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or("audio.webm").to_string();
        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        upload = Some(AudioUpload {
            file_name,
            content_type,
            bytes: bytes.to_vec(),
        });
        break;
    }

    let upload = upload
        .filter(|u| !u.bytes.is_empty())
        .ok_or_else(|| ApiError::bad_request("Audio file is required"))?;

    let size = upload.bytes.len();
    let text = state.providers.media.transcribe(upload).await?;
    info!(user_id = %user.user_id, tool = "stt", bytes = size, "Audio transcribed");

    Ok(Json(TranscriptResponse { text }))
}
