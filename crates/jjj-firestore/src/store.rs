//! The user document store seam.
//!
//! Everything above the adapter talks to a `dyn UserStore`; the Firestore,
//! lazily-initialised and in-memory implementations are interchangeable.

use async_trait::async_trait;
use jjj_models::{CounterIncrement, UserPatch, UserRecord};
use serde::Serialize;

use crate::error::FirestoreResult;

/// One page of users from [`UserStore::list_users`].
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPage {
    pub users: Vec<UserRecord>,
    pub next_page_token: Option<String>,
}

/// Per-user record storage keyed by opaque user id.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fetch a record. `Ok(None)` if it does not exist.
    async fn get_user(&self, user_id: &str) -> FirestoreResult<Option<UserRecord>>;

    /// Create a record. Fails with `AlreadyExists` if the id is taken.
    async fn create_user(&self, user: &UserRecord) -> FirestoreResult<()>;

    /// Merge the set fields of `patch` into an existing record.
    async fn merge_user(&self, user_id: &str, patch: &UserPatch) -> FirestoreResult<()>;

    /// Apply counter increments atomically with the store's native increment.
    async fn increment_usage(
        &self,
        user_id: &str,
        increments: &[CounterIncrement],
    ) -> FirestoreResult<()>;

    /// Add `delta` to the coin balance, saturating at zero. Returns the new balance.
    async fn adjust_coins(&self, user_id: &str, delta: i64) -> FirestoreResult<u64>;

    /// Delete a record. Deleting a missing record succeeds.
    async fn delete_user(&self, user_id: &str) -> FirestoreResult<()>;

    async fn list_users(&self, limit: u32, page_token: Option<&str>) -> FirestoreResult<UserPage>;

    /// Look up an account by its (lower-cased) email.
    async fn find_by_email(&self, email: &str) -> FirestoreResult<Option<UserRecord>>;

    /// Cheap reachability check for the readiness endpoint.
    async fn ping(&self) -> FirestoreResult<()>;
}
