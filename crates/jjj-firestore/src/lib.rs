//! Document store adapter for user records.
//!
//! This crate provides:
//! - A Firestore REST client (service-account auth, token cache, retry, metrics)
//! - The `UserStore` trait used by the API
//! - Firestore, lazily-initialised and in-memory store implementations
//! - Atomic usage counters via commit field transforms

pub mod client;
pub mod error;
pub mod lazy;
pub mod memory;
pub mod metrics;
pub mod retry;
pub mod store;
pub mod token_cache;
pub mod types;
pub mod user_fields;
pub mod user_repo;

#[cfg(test)]
mod client_tests;

pub use client::{FirestoreClient, FirestoreConfig};
pub use error::{FirestoreError, FirestoreResult};
pub use lazy::LazyFirestoreStore;
pub use memory::MemoryUserStore;
pub use retry::RetryConfig;
pub use store::{UserPage, UserStore};
pub use types::{Document, FromFirestoreValue, ToFirestoreValue, Value};
pub use user_repo::FirestoreUserStore;
