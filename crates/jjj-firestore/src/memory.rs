//! In-process [`UserStore`] for local development and tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use jjj_models::{apply_coin_delta, CounterIncrement, UserPatch, UserRecord};
use tokio::sync::RwLock;

use crate::error::{FirestoreError, FirestoreResult};
use crate::store::{UserPage, UserStore};

/// Map-backed store. Can be switched "offline" to exercise degraded paths.
#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<BTreeMap<String, UserRecord>>,
    offline: AtomicBool,
    increment_calls: AtomicUsize,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// When unavailable, every operation fails with [`FirestoreError::Unavailable`].
    pub fn set_available(&self, available: bool) {
        self.offline.store(!available, Ordering::SeqCst);
    }

    /// Number of `increment_usage` calls received (including failed ones).
    pub fn increment_calls(&self) -> usize {
        self.increment_calls.load(Ordering::SeqCst)
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }

    /// Insert or replace a record directly.
    pub async fn insert(&self, user: UserRecord) {
        self.users.write().await.insert(user.user_id.clone(), user);
    }

    fn check(&self) -> FirestoreResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(FirestoreError::Unavailable("memory store offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn get_user(&self, user_id: &str) -> FirestoreResult<Option<UserRecord>> {
        self.check()?;
        Ok(self.users.read().await.get(user_id).cloned())
    }

    async fn create_user(&self, user: &UserRecord) -> FirestoreResult<()> {
        self.check()?;
        let mut users = self.users.write().await;
        if users.contains_key(&user.user_id) {
            return Err(FirestoreError::AlreadyExists(format!("users/{}", user.user_id)));
        }
        users.insert(user.user_id.clone(), user.clone());
        Ok(())
    }

    async fn merge_user(&self, user_id: &str, patch: &UserPatch) -> FirestoreResult<()> {
        self.check()?;
        let mut users = self.users.write().await;
        let user = users
            .get_mut(user_id)
            .ok_or_else(|| FirestoreError::not_found(format!("users/{}", user_id)))?;
        user.apply_patch(patch, Utc::now());
        Ok(())
    }

    async fn increment_usage(
        &self,
        user_id: &str,
        increments: &[CounterIncrement],
    ) -> FirestoreResult<()> {
        self.increment_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let mut users = self.users.write().await;
        let user = users
            .get_mut(user_id)
            .ok_or_else(|| FirestoreError::not_found(format!("users/{}", user_id)))?;
        for inc in increments {
            user.apply_increment(inc);
        }
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn adjust_coins(&self, user_id: &str, delta: i64) -> FirestoreResult<u64> {
        self.check()?;
        let mut users = self.users.write().await;
        let user = users
            .get_mut(user_id)
            .ok_or_else(|| FirestoreError::not_found(format!("users/{}", user_id)))?;
        user.coins = apply_coin_delta(user.coins, delta);
        user.updated_at = Utc::now();
        Ok(user.coins)
    }

    async fn delete_user(&self, user_id: &str) -> FirestoreResult<()> {
        self.check()?;
        self.users.write().await.remove(user_id);
        Ok(())
    }

    async fn list_users(&self, limit: u32, page_token: Option<&str>) -> FirestoreResult<UserPage> {
        self.check()?;
        let users = self.users.read().await;
        let limit = limit.max(1) as usize;

        let mut page: Vec<UserRecord> = users
            .range::<str, _>((
                page_token.map_or(std::ops::Bound::Unbounded, std::ops::Bound::Excluded),
                std::ops::Bound::Unbounded,
            ))
            .map(|(_, u)| u.clone())
            .take(limit + 1)
            .collect();

        let next_page_token = if page.len() > limit {
            page.truncate(limit);
            page.last().map(|u| u.user_id.clone())
        } else {
            None
        };

        Ok(UserPage {
            users: page,
            next_page_token,
        })
    }

    async fn find_by_email(&self, email: &str) -> FirestoreResult<Option<UserRecord>> {
        self.check()?;
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.email.as_deref() == Some(email))
            .cloned())
    }

    async fn ping(&self) -> FirestoreResult<()> {
        self.check()
    }
}
