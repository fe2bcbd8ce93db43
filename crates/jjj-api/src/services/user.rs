//! User resolution, accounts and admin operations on user records.

use std::sync::Arc;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use jjj_firestore::{FirestoreError, UserPage, UserStore};
use jjj_models::{AdminPlanUpdate, PlanTier, SignInRequest, SignUpRequest, UserPatch, UserRecord};

use crate::error::{ApiError, ApiResult};
use crate::metrics;

/// The caller's record as seen by a handler.
#[derive(Debug, Clone)]
pub struct ResolvedUser {
    pub user_id: String,
    pub record: UserRecord,
    /// The record was created by this request.
    pub created: bool,
    /// The store could not be reached; `record` is an unsaved default.
    pub degraded: bool,
}

/// Public view of the caller's account.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub user_id: String,
    pub email: Option<String>,
    pub is_guest: bool,
    pub plan: PlanTier,
    pub coins: u64,
    pub plan_expires_at: Option<DateTime<Utc>>,
}

impl From<&UserRecord> for Profile {
    fn from(user: &UserRecord) -> Self {
        Self {
            user_id: user.user_id.clone(),
            email: user.email.clone(),
            is_guest: user.is_guest,
            plan: user.plan,
            coins: user.coins,
            plan_expires_at: user.plan_expires_at,
        }
    }
}

/// User service over the document store.
#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn UserStore>,
}

impl UserService {
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn UserStore> {
        &self.store
    }

    /// Load or lazily create the record for `user_id`.
    ///
    /// Never fails: store errors yield an unsaved guest default with
    /// `degraded` set.
    pub async fn resolve(&self, user_id: &str) -> ResolvedUser {
        let now = Utc::now();
        match self.load_or_create(user_id, now).await {
            Ok((record, created)) => ResolvedUser {
                user_id: user_id.to_string(),
                record,
                created,
                degraded: false,
            },
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "User store unavailable, using default record");
                metrics::record_resolver_degraded();
                ResolvedUser {
                    user_id: user_id.to_string(),
                    record: UserRecord::new_guest(user_id, now),
                    created: false,
                    degraded: true,
                }
            }
        }
    }

    async fn load_or_create(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(UserRecord, bool), FirestoreError> {
        if let Some(user) = self.store.get_user(user_id).await? {
            return Ok((user, false));
        }

        let user = UserRecord::new_guest(user_id, now);
        match self.store.create_user(&user).await {
            Ok(()) => {
                info!(user_id = %user_id, "Created guest user");
                metrics::record_user_created();
                Ok((user, true))
            }
            Err(FirestoreError::AlreadyExists(_)) => {
                // Lost a creation race; the winner's record is authoritative.
                debug!(user_id = %user_id, "User created concurrently, re-reading");
                let existing = self
                    .store
                    .get_user(user_id)
                    .await?
                    .ok_or_else(|| FirestoreError::not_found(format!("users/{}", user_id)))?;
                Ok((existing, false))
            }
            Err(e) => Err(e),
        }
    }

    /// Turn the caller's guest record into an email/password account in place.
    pub async fn sign_up(&self, caller: &ResolvedUser, req: &SignUpRequest) -> ApiResult<UserRecord> {
        if caller.degraded {
            return Err(ApiError::internal("User store unavailable"));
        }
        if !caller.record.is_guest {
            return Err(ApiError::conflict("Already signed in to an account"));
        }

        let email = normalize_email(&req.email);
        if let Some(existing) = self.store.find_by_email(&email).await? {
            if existing.user_id != caller.user_id {
                return Err(ApiError::conflict("Email already registered"));
            }
        }

        let hash = hash_password(&req.password)?;
        let patch = UserPatch::attach_account(email.clone(), hash);
        self.store.merge_user(&caller.user_id, &patch).await?;

        let mut user = caller.record.clone();
        user.apply_patch(&patch, Utc::now());
        info!(user_id = %caller.user_id, "Guest upgraded to account");
        Ok(user)
    }

    /// Check credentials and return the matching account.
    pub async fn sign_in(&self, req: &SignInRequest) -> ApiResult<UserRecord> {
        let email = normalize_email(&req.email);
        let user = self.store.find_by_email(&email).await?;

        match user {
            Some(user)
                if user
                    .password_hash
                    .as_deref()
                    .is_some_and(|hash| verify_password(&req.password, hash)) =>
            {
                info!(user_id = %user.user_id, "User signed in");
                Ok(user)
            }
            _ => Err(ApiError::unauthorized("Invalid email or password")),
        }
    }

    /// Delete a record. Store failures propagate.
    pub async fn delete(&self, user_id: &str) -> ApiResult<()> {
        self.store.delete_user(user_id).await?;
        info!(user_id = %user_id, "User deleted");
        Ok(())
    }

    pub async fn get(&self, user_id: &str) -> ApiResult<UserRecord> {
        self.store
            .get_user(user_id)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("User {} not found", user_id)))
    }

    pub async fn list(&self, limit: u32, page_token: Option<&str>) -> ApiResult<UserPage> {
        Ok(self.store.list_users(limit, page_token).await?)
    }

    /// Set a user's plan. Granting pro without an expiry never lapses.
    pub async fn set_plan(&self, user_id: &str, update: &AdminPlanUpdate) -> ApiResult<UserRecord> {
        let plan = PlanTier::parse(&update.plan).map_err(|e| ApiError::bad_request(e.to_string()))?;
        let mut user = self.get(user_id).await?;
        let now = Utc::now();

        let patch = match plan {
            PlanTier::Pro => UserPatch {
                plan: Some(PlanTier::Pro),
                plan_expires_at: Some(update.expires_at),
                pro_since: Some(user.pro_since.unwrap_or(now)),
                pro_source: Some("admin".to_string()),
                ..UserPatch::default()
            },
            PlanTier::Free => UserPatch {
                plan: Some(PlanTier::Free),
                plan_expires_at: Some(None),
                ..UserPatch::default()
            },
        };

        self.store.merge_user(user_id, &patch).await.map_err(not_found_as_404)?;
        user.apply_patch(&patch, now);
        info!(user_id = %user_id, plan = %plan.as_str(), "Admin updated plan");
        Ok(user)
    }

    /// Apply a signed coin delta. Returns the new balance.
    pub async fn adjust_coins(&self, user_id: &str, delta: i64) -> ApiResult<u64> {
        let balance = self
            .store
            .adjust_coins(user_id, delta)
            .await
            .map_err(not_found_as_404)?;
        info!(user_id = %user_id, delta, balance, "Admin adjusted coins");
        Ok(balance)
    }
}

fn not_found_as_404(err: FirestoreError) -> ApiError {
    match err {
        FirestoreError::NotFound(what) => ApiError::not_found(format!("{} not found", what)),
        other => ApiError::from(other),
    }
}

/// Emails are compared and stored lower-cased.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Hash a password into an Argon2id PHC string.
pub fn hash_password(password: &str) -> ApiResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiError::internal(format!("Failed to hash password: {}", e)))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}
