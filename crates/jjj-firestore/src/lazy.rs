//! Store handle that builds its Firestore client on first use.
//!
//! The server starts even when credentials are missing; calls then fail with
//! `NotConfigured` and the caller decides how to degrade. Initialisation
//! runs at most once successfully and is retried on the next call after a
//! failure.

use async_trait::async_trait;
use jjj_models::{CounterIncrement, UserPatch, UserRecord};
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::client::{FirestoreClient, FirestoreConfig};
use crate::error::FirestoreResult;
use crate::store::{UserPage, UserStore};
use crate::user_repo::FirestoreUserStore;

pub struct LazyFirestoreStore {
    config: Option<FirestoreConfig>,
    cell: OnceCell<FirestoreUserStore>,
}

impl LazyFirestoreStore {
    /// Read the configuration from the environment at first use.
    pub fn from_env() -> Self {
        Self {
            config: None,
            cell: OnceCell::new(),
        }
    }

    pub fn with_config(config: FirestoreConfig) -> Self {
        Self {
            config: Some(config),
            cell: OnceCell::new(),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.initialized()
    }

    async fn inner(&self) -> FirestoreResult<&FirestoreUserStore> {
        self.cell
            .get_or_try_init(|| async {
                let config = match &self.config {
                    Some(config) => config.clone(),
                    None => FirestoreConfig::from_env()?,
                };
                let project = config.project_id.clone();
                match FirestoreClient::new(config).await {
                    Ok(client) => {
                        info!(project_id = %project, "Firestore client initialised");
                        Ok(FirestoreUserStore::new(client))
                    }
                    Err(e) => {
                        warn!(error = %e, "Firestore client initialisation failed");
                        Err(e)
                    }
                }
            })
            .await
    }
}

#[async_trait]
impl UserStore for LazyFirestoreStore {
    async fn get_user(&self, user_id: &str) -> FirestoreResult<Option<UserRecord>> {
        self.inner().await?.get_user(user_id).await
    }

    async fn create_user(&self, user: &UserRecord) -> FirestoreResult<()> {
        self.inner().await?.create_user(user).await
    }

    async fn merge_user(&self, user_id: &str, patch: &UserPatch) -> FirestoreResult<()> {
        self.inner().await?.merge_user(user_id, patch).await
    }

    async fn increment_usage(
        &self,
        user_id: &str,
        increments: &[CounterIncrement],
    ) -> FirestoreResult<()> {
        self.inner().await?.increment_usage(user_id, increments).await
    }

    async fn adjust_coins(&self, user_id: &str, delta: i64) -> FirestoreResult<u64> {
        self.inner().await?.adjust_coins(user_id, delta).await
    }

    async fn delete_user(&self, user_id: &str) -> FirestoreResult<()> {
        self.inner().await?.delete_user(user_id).await
    }

    async fn list_users(&self, limit: u32, page_token: Option<&str>) -> FirestoreResult<UserPage> {
        self.inner().await?.list_users(limit, page_token).await
    }

    async fn find_by_email(&self, email: &str) -> FirestoreResult<Option<UserRecord>> {
        self.inner().await?.find_by_email(email).await
    }

    async fn ping(&self) -> FirestoreResult<()> {
        self.inner().await?.ping().await
    }
}
