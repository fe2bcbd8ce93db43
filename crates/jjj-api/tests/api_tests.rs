//! API integration tests.
//!
//! The router runs against the in-memory user store and a fake provider, so
//! no network or credentials are needed.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, Response, StatusCode};
use axum::Router;
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use jjj_api::config::StoreBackend;
use jjj_api::services::billing::sign_payload;
use jjj_api::services::{
    AudioUpload, ChatModel, ChatPrompt, MediaModel, ProviderError, Providers,
};
use jjj_api::{create_router, ApiConfig, AppState};
use jjj_firestore::{MemoryUserStore, UserStore};
use jjj_models::{ImageSize, PlanTier, PeriodKeys, UserRecord, Voice};

const ADMIN_KEY: &str = "test-admin-key";
const WEBHOOK_SECRET: &str = "test-webhook-secret";

/// Provider fake that counts calls and can be switched to fail.
#[derive(Default)]
struct FakeProvider {
    calls: AtomicUsize,
    failing: AtomicBool,
}

impl FakeProvider {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn begin(&self) -> Result<(), ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(ProviderError::from_status(500, "boom"));
        }
        Ok(())
    }
}

#[async_trait]
impl ChatModel for FakeProvider {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn complete(&self, prompt: &ChatPrompt) -> Result<String, ProviderError> {
        self.begin()?;
        Ok(format!("echo: {}", prompt.message))
    }
}

#[async_trait]
impl MediaModel for FakeProvider {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn speech(&self, _text: &str, _voice: Voice) -> Result<Vec<u8>, ProviderError> {
        self.begin()?;
        Ok(vec![0xFF, 0xFB, 0x90, 0x00])
    }

    async fn image(&self, _prompt: &str, _size: ImageSize) -> Result<String, ProviderError> {
        self.begin()?;
        Ok("https://images.test/generated.png".to_string())
    }

    async fn transcribe(&self, audio: AudioUpload) -> Result<String, ProviderError> {
        self.begin()?;
        Ok(format!("heard {} bytes", audio.bytes.len()))
    }
}

struct TestApp {
    router: Router,
    store: Arc<MemoryUserStore>,
    provider: Arc<FakeProvider>,
}

impl TestApp {
    fn new() -> Self {
        Self::with_environment("development")
    }

    fn with_environment(environment: &str) -> Self {
        let config = ApiConfig {
            environment: environment.to_string(),
            admin_api_key: Some(ADMIN_KEY.to_string()),
            razorpay_webhook_secret: Some(WEBHOOK_SECRET.to_string()),
            store_backend: StoreBackend::Memory,
            ..ApiConfig::default()
        };
        let store = Arc::new(MemoryUserStore::new());
        let provider = Arc::new(FakeProvider::default());
        let state = AppState::with_components(
            config,
            store.clone() as Arc<dyn UserStore>,
            Providers::single(provider.clone()),
        );

        Self {
            router: create_router(state, None),
            store,
            provider,
        }
    }

    async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    async fn account(&self, user_id: &str, plan: PlanTier) -> UserRecord {
        let mut user = UserRecord::new_guest(user_id, Utc::now());
        user.is_guest = false;
        user.email = Some(format!("{}@example.com", user_id));
        user.plan = plan;
        if plan == PlanTier::Pro {
            user.plan_expires_at = Some(Utc::now() + Duration::days(10));
        }
        self.store.insert(user.clone()).await;
        user
    }

    async fn record(&self, user_id: &str) -> UserRecord {
        self.store.get_user(user_id).await.unwrap().unwrap()
    }
}

fn post_json(uri: &str, user_id: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("x-user-id", user_id)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_as(uri: &str, user_id: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("x-user-id", user_id)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn webhook_request(body: &str, signature: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/billing/webhook")
        .header("x-razorpay-signature", signature)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn captured_payment(user_id: &str) -> String {
    json!({
        "event": "payment.captured",
        "payload": {
            "payment": {
                "entity": {
                    "id": "pay_123",
                    "status": "captured",
                    "amount": 49900,
                    "currency": "INR",
                    "notes": { "userId": user_id }
                }
            }
        }
    })
    .to_string()
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = TestApp::new();
    let response = app
        .send(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("x-content-type-options").unwrap(),
        "nosniff"
    );
}

#[tokio::test]
async fn test_ready_reflects_store_availability() {
    let app = TestApp::new();
    let ready = || Request::builder().uri("/ready").body(Body::empty()).unwrap();

    assert_eq!(app.send(ready()).await.status(), StatusCode::OK);

    app.store.set_available(false);
    let response = app.send(ready()).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["checks"]["store"]["status"], "error");
}

#[tokio::test]
async fn test_first_contact_issues_cookie_and_creates_guest() {
    let app = TestApp::new();
    let response = app
        .send(Request::builder().uri("/api/me").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap()
        .to_string();
    assert!(cookie.starts_with("jjj_device_id="));
    assert!(cookie.contains("HttpOnly"));

    let profile = body_json(response).await;
    let user_id = profile["userId"].as_str().unwrap().to_string();
    assert_eq!(profile["isGuest"], true);
    assert_eq!(profile["plan"], "free");
    assert!(cookie.contains(&user_id));
    assert_eq!(app.store.len().await, 1);
}

#[tokio::test]
async fn test_resolver_is_idempotent() {
    let app = TestApp::new();
    for _ in 0..3 {
        let response = app.send(get_as("/api/me", "device-1")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(header::SET_COOKIE).is_none());
        assert_eq!(body_json(response).await["userId"], "device-1");
    }
    assert_eq!(app.store.len().await, 1);
}

#[tokio::test]
async fn test_guest_cannot_use_metered_tools() {
    let app = TestApp::new();
    let response = app
        .send(post_json("/api/chat", "guest-1", json!({ "message": "hi" })))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "Sign in required");
    assert_eq!(app.provider.calls(), 0);
}

#[tokio::test]
async fn test_free_chat_allows_thirty_messages_per_day() {
    let app = TestApp::new();
    app.account("free-1", PlanTier::Free).await;

    for i in 0..30 {
        let response = app
            .send(post_json("/api/chat", "free-1", json!({ "message": format!("hello {}", i) })))
            .await;
        assert_eq!(response.status(), StatusCode::OK, "message {} should pass", i + 1);
    }

    let response = app
        .send(post_json("/api/chat", "free-1", json!({ "message": "one more" })))
        .await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let error = body_json(response).await["error"].as_str().unwrap().to_string();
    assert!(error.contains("Daily chat limit"), "{}", error);

    assert_eq!(app.provider.calls(), 30);
    let keys = PeriodKeys::at(Utc::now());
    let user = app.record("free-1").await;
    assert_eq!(user.chat_daily[&keys.day].messages, 30);
    assert_eq!(user.chat_monthly[&keys.month].messages, 30);
}

#[tokio::test]
async fn test_chat_reply_shape() {
    let app = TestApp::new();
    app.account("free-2", PlanTier::Free).await;

    let response = app
        .send(post_json(
            "/api/chat",
            "free-2",
            json!({ "message": "ping", "replyLength": "short", "defaultLanguage": "Hindi" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["reply"], "echo: ping");
}

#[tokio::test]
async fn test_free_tts_rejects_long_text_before_provider_call() {
    let app = TestApp::new();
    app.account("free-3", PlanTier::Free).await;

    let response = app
        .send(post_json("/api/tts", "free-3", json!({ "text": "a".repeat(301) })))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.provider.calls(), 0);
    assert_eq!(app.store.increment_calls(), 0);
}

#[tokio::test]
async fn test_tts_returns_audio_with_quota_headers() {
    let app = TestApp::new();
    app.account("free-4", PlanTier::Free).await;

    let response = app
        .send(post_json("/api/tts", "free-4", json!({ "text": "Hello there", "voice": "nova" })))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), "audio/mpeg");
    assert_eq!(headers.get("x-tts-plan").unwrap(), "free");
    assert_eq!(headers.get("x-tts-today").unwrap(), "1");
    assert!(headers.get("x-tts-dailylimit").is_some());

    let status = body_json(app.send(get_as("/api/usage/tts", "free-4")).await).await;
    assert_eq!(status["ok"], true);
    assert_eq!(status["todayClips"], 1);
    assert_eq!(status["maxChars"], 300);
}

#[tokio::test]
async fn test_provider_failure_records_no_usage() {
    let app = TestApp::new();
    app.account("free-5", PlanTier::Free).await;
    app.provider.set_failing(true);

    let response = app
        .send(post_json("/api/image", "free-5", json!({ "prompt": "a red fox" })))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(app.provider.calls(), 1);
    assert_eq!(app.store.increment_calls(), 0);
    assert!(app.record("free-5").await.image_daily.is_empty());
}

#[tokio::test]
async fn test_pro_image_is_metered_monthly() {
    let app = TestApp::new();
    app.account("pro-1", PlanTier::Pro).await;

    let response = app
        .send(post_json("/api/image", "pro-1", json!({ "prompt": "a lighthouse", "size": "512x512" })))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["image"], "https://images.test/generated.png");

    let summary = body_json(app.send(get_as("/api/usage", "pro-1")).await).await;
    assert_eq!(summary["plan"], "pro");
    assert_eq!(summary["usage"]["image"]["used"], 1);
    assert_eq!(summary["usage"]["image"]["period"], "month");
}

#[tokio::test]
async fn test_usage_summary_shape_for_guest() {
    let app = TestApp::new();
    let summary = body_json(app.send(get_as("/api/usage", "guest-2")).await).await;
    assert_eq!(summary["plan"], "free");
    for tool in ["chat", "tts", "image"] {
        assert_eq!(summary["usage"][tool]["used"], 0, "{}", tool);
        assert!(summary["usage"][tool]["limit"].as_u64().unwrap() > 0, "{}", tool);
    }
}

#[tokio::test]
async fn test_stt_is_not_metered() {
    let app = TestApp::new();
    let boundary = "X-BOUNDARY";
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"clip.webm\"\r\nContent-Type: audio/webm\r\n\r\nabcdef\r\n--{b}--\r\n",
        b = boundary
    );
    let request = Request::builder()
        .method("POST")
        .uri("/api/stt")
        .header("x-user-id", "guest-3")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", boundary),
        )
        .body(Body::from(body))
        .unwrap();

    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["text"], "heard 6 bytes");
    assert_eq!(app.store.increment_calls(), 0);
}

#[tokio::test]
async fn test_degraded_store_allows_in_development() {
    let app = TestApp::new();
    app.store.set_available(false);

    let response = app
        .send(post_json("/api/chat", "anyone", json!({ "message": "hi" })))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.provider.calls(), 1);
}

#[tokio::test]
async fn test_degraded_store_fails_closed_in_production() {
    let app = TestApp::with_environment("production");
    app.store.set_available(false);

    let response = app
        .send(post_json("/api/chat", "anyone", json!({ "message": "hi" })))
        .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(app.provider.calls(), 0);
}

#[tokio::test]
async fn test_signup_keeps_user_id_coins_and_counters() {
    let app = TestApp::new();
    let mut guest = UserRecord::new_guest("device-9", Utc::now());
    guest.coins = 42;
    let keys = PeriodKeys::at(Utc::now());
    guest.chat_daily.entry(keys.day.clone()).or_default().messages = 5;
    app.store.insert(guest).await;

    let response = app
        .send(post_json(
            "/api/auth/signup",
            "device-9",
            json!({ "email": "New.User@Example.com", "password": "correct horse" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let profile = body_json(response).await;
    assert_eq!(profile["userId"], "device-9");
    assert_eq!(profile["isGuest"], false);
    assert_eq!(profile["email"], "new.user@example.com");
    assert_eq!(profile["coins"], 42);

    let user = app.record("device-9").await;
    assert_eq!(user.chat_daily[&keys.day].messages, 5);
    assert!(user.password_hash.is_some());

    // A second sign-up on the same record is a conflict.
    let response = app
        .send(post_json(
            "/api/auth/signup",
            "device-9",
            json!({ "email": "other@example.com", "password": "correct horse" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_signin_switches_identity_cookie() {
    let app = TestApp::new();
    let response = app
        .send(post_json(
            "/api/auth/signup",
            "laptop",
            json!({ "email": "owner@example.com", "password": "hunter22!" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .send(post_json(
            "/api/auth/signin",
            "phone",
            json!({ "email": "owner@example.com", "password": "hunter22!" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let cookies: Vec<String> = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok().map(str::to_string))
        .collect();
    assert_eq!(cookies.len(), 1);
    assert!(cookies[0].starts_with("jjj_device_id=laptop"));
    assert_eq!(body_json(response).await["userId"], "laptop");

    let response = app
        .send(post_json(
            "/api/auth/signin",
            "phone",
            json!({ "email": "owner@example.com", "password": "wrong-password" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_delete_account_removes_record() {
    let app = TestApp::new();
    app.account("leaving", PlanTier::Free).await;

    let response = app
        .send(
            Request::builder()
                .method("DELETE")
                .uri("/api/account")
                .header("x-user-id", "leaving")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(app.store.get_user("leaving").await.unwrap().is_none());
}

#[tokio::test]
async fn test_webhook_rejects_tampered_body() {
    let app = TestApp::new();
    let body = captured_payment("buyer-1");
    let signature = sign_payload(WEBHOOK_SECRET, body.as_bytes());
    let tampered = body.replace("buyer-1", "buyer-2");

    let response = app.send(webhook_request(&tampered, &signature)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(app.store.is_empty().await);

    let response = app
        .send(
            Request::builder()
                .method("POST")
                .uri("/api/billing/webhook")
                .body(Body::from(body))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_webhook_upgrades_user_to_pro() {
    let app = TestApp::new();
    app.account("buyer-1", PlanTier::Free).await;
    let body = captured_payment("buyer-1");
    let signature = sign_payload(WEBHOOK_SECRET, body.as_bytes());

    let before = Utc::now();
    let response = app.send(webhook_request(&body, &signature)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({ "ok": true }));

    let user = app.record("buyer-1").await;
    assert_eq!(user.plan, PlanTier::Pro);
    assert_eq!(user.pro_source.as_deref(), Some("razorpay:pay_123"));
    let expires = user.plan_expires_at.unwrap();
    assert!(expires >= before + Duration::days(30));
    assert!(expires <= Utc::now() + Duration::days(30));
}

#[tokio::test]
async fn test_webhook_redelivery_is_acknowledged_once() {
    let app = TestApp::new();
    app.account("buyer-1", PlanTier::Free).await;
    let body = captured_payment("buyer-1");
    let signature = sign_payload(WEBHOOK_SECRET, body.as_bytes());

    let response = app.send(webhook_request(&body, &signature)).await;
    assert_eq!(body_json(response).await, json!({ "ok": true }));
    let first_expiry = app.record("buyer-1").await.plan_expires_at;

    let response = app.send(webhook_request(&body, &signature)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({ "ok": true, "duplicate": true }));

    let user = app.record("buyer-1").await;
    assert_eq!(user.plan_expires_at, first_expiry);
    assert_eq!(user.applied_payments, vec!["pay_123".to_string()]);
}

#[tokio::test]
async fn test_webhook_ignores_unrelated_events() {
    let app = TestApp::new();
    let body = json!({ "event": "refund.created", "payload": {} }).to_string();
    let signature = sign_payload(WEBHOOK_SECRET, body.as_bytes());

    let response = app.send(webhook_request(&body, &signature)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({ "ok": true, "ignored": true }));
}

#[tokio::test]
async fn test_admin_requires_key() {
    let app = TestApp::new();
    let response = app
        .send(Request::builder().uri("/api/admin/users").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .send(
            Request::builder()
                .uri("/api/admin/users")
                .header("x-admin-key", "wrong")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_admin_plan_and_coin_updates() {
    let app = TestApp::new();
    app.account("managed", PlanTier::Free).await;

    let admin = |method: &str, uri: &str, body: Value| {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("x-admin-key", ADMIN_KEY)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    };

    let response = app
        .send(admin("PATCH", "/api/admin/users/managed/plan", json!({ "plan": "pro" })))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["plan"], "pro");
    assert_eq!(app.record("managed").await.pro_source.as_deref(), Some("admin"));

    let response = app
        .send(admin("PATCH", "/api/admin/users/managed/plan", json!({ "plan": "gold" })))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .send(admin("POST", "/api/admin/users/managed/coins", json!({ "delta": 25 })))
        .await;
    assert_eq!(body_json(response).await["coins"], 25);

    let response = app
        .send(admin("POST", "/api/admin/users/managed/coins", json!({ "delta": -100 })))
        .await;
    assert_eq!(body_json(response).await["coins"], 0);

    let response = app
        .send(admin("GET", "/api/admin/users/missing", json!({})))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
