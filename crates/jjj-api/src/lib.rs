//! Axum HTTP API server for JJJ AI Studio.
//!
//! This crate provides:
//! - Chat, text-to-speech, image and transcription tools behind a usage ledger
//! - Guest identities that upgrade in place on sign-up
//! - Payment webhook handling and admin user management
//! - Rate limiting, security headers and Prometheus metrics

pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod identity;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use services::{UsageLedger, UserService};
pub use state::AppState;
