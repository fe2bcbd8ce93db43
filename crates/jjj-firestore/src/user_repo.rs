//! Firestore-backed [`UserStore`].

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use jjj_models::{apply_coin_delta, CounterIncrement, UserPatch, UserRecord};
use tracing::{debug, info, warn};

use crate::client::FirestoreClient;
use crate::error::{FirestoreError, FirestoreResult};
use crate::metrics::record_conflict;
use crate::store::{UserPage, UserStore};
use crate::types::{
    field_path, Document, DocumentMask, FieldTransform, FromFirestoreValue, Precondition,
    StructuredQuery, ToFirestoreValue, Write,
};
use crate::user_fields::{parse_user_document, patch_to_fields, user_to_fields, USERS_COLLECTION};

/// Maximum attempts for an optimistic coin update.
const MAX_COIN_RETRIES: u32 = 5;

/// Base delay between optimistic retries (milliseconds).
const RETRY_BASE_DELAY_MS: u64 = 50;

/// User records in the `users` collection.
#[derive(Clone)]
pub struct FirestoreUserStore {
    client: FirestoreClient,
}

impl FirestoreUserStore {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &FirestoreClient {
        &self.client
    }

    /// Commit write bumping `updatedAt` and applying `increments` as transforms.
    ///
    /// The `exists` precondition keeps a deleted account from being recreated
    /// by a late usage write.
    fn increment_write(&self, user_id: &str, increments: &[CounterIncrement]) -> Write {
        let name = self.client.full_document_name(USERS_COLLECTION, user_id);
        let fields = HashMap::from([("updatedAt".to_string(), Utc::now().to_firestore_value())]);
        Write {
            update: Some(Document::named(name, fields)),
            update_mask: Some(DocumentMask {
                field_paths: vec!["updatedAt".to_string()],
            }),
            update_transforms: Some(
                increments
                    .iter()
                    .map(|inc| FieldTransform::increment(field_path(&inc.segments()), inc.by))
                    .collect(),
            ),
            current_document: Some(Precondition::exists()),
            ..Write::default()
        }
    }
}

#[async_trait]
impl UserStore for FirestoreUserStore {
    async fn get_user(&self, user_id: &str) -> FirestoreResult<Option<UserRecord>> {
        match self.client.get_document(USERS_COLLECTION, user_id).await? {
            Some(doc) => Ok(Some(parse_user_document(&doc)?)),
            None => Ok(None),
        }
    }

    async fn create_user(&self, user: &UserRecord) -> FirestoreResult<()> {
        self.client
            .create_document(USERS_COLLECTION, &user.user_id, user_to_fields(user))
            .await?;
        info!(user_id = %user.user_id, guest = user.is_guest, "Created user record");
        Ok(())
    }

    async fn merge_user(&self, user_id: &str, patch: &UserPatch) -> FirestoreResult<()> {
        let (fields, mask) = patch_to_fields(patch, Utc::now());
        self.client
            .update_document(USERS_COLLECTION, user_id, fields, Some(mask))
            .await?;
        Ok(())
    }

    async fn increment_usage(
        &self,
        user_id: &str,
        increments: &[CounterIncrement],
    ) -> FirestoreResult<()> {
        if increments.is_empty() {
            return Ok(());
        }
        self.client
            .commit(vec![self.increment_write(user_id, increments)])
            .await?;
        debug!(user_id = %user_id, count = increments.len(), "Recorded usage increments");
        Ok(())
    }

    async fn adjust_coins(&self, user_id: &str, delta: i64) -> FirestoreResult<u64> {
        let mut last_error = None;

        for attempt in 0..MAX_COIN_RETRIES {
            let doc = self
                .client
                .get_document(USERS_COLLECTION, user_id)
                .await?
                .ok_or_else(|| FirestoreError::not_found(format!("users/{}", user_id)))?;

            let current = doc
                .fields
                .as_ref()
                .and_then(|f| f.get("coins"))
                .and_then(u64::from_firestore_value)
                .unwrap_or(0);
            let balance = apply_coin_delta(current, delta);

            let fields = HashMap::from([
                ("coins".to_string(), balance.to_firestore_value()),
                ("updatedAt".to_string(), Utc::now().to_firestore_value()),
            ]);
            let mask = vec!["coins".to_string(), "updatedAt".to_string()];

            match self
                .client
                .update_document_with_precondition(
                    USERS_COLLECTION,
                    user_id,
                    fields,
                    Some(mask),
                    doc.update_time.as_deref(),
                )
                .await
            {
                Ok(_) => {
                    info!(user_id = %user_id, delta, balance, "Adjusted coins");
                    return Ok(balance);
                }
                Err(e) if e.is_precondition_failed() => {
                    debug!(user_id = %user_id, attempt = attempt + 1, "Coin update conflicted, retrying");
                    record_conflict("adjust_coins");
                    last_error = Some(e);
                    let delay = Duration::from_millis(RETRY_BASE_DELAY_MS * (attempt as u64 + 1));
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    warn!(user_id = %user_id, error = %e, "Failed to adjust coins");
                    return Err(e);
                }
            }
        }

        warn!(
            user_id = %user_id,
            retries = MAX_COIN_RETRIES,
            error = ?last_error,
            "Coin update failed after retries"
        );
        Err(FirestoreError::request_failed(
            "Failed to adjust coins due to concurrent updates",
        ))
    }

    async fn delete_user(&self, user_id: &str) -> FirestoreResult<()> {
        self.client.delete_document(USERS_COLLECTION, user_id).await?;
        info!(user_id = %user_id, "Deleted user record");
        Ok(())
    }

    async fn list_users(&self, limit: u32, page_token: Option<&str>) -> FirestoreResult<UserPage> {
        let page = self
            .client
            .list_documents(USERS_COLLECTION, Some(limit), page_token)
            .await?;

        let users = page
            .documents
            .unwrap_or_default()
            .iter()
            .filter_map(|doc| match parse_user_document(doc) {
                Ok(user) => Some(user),
                Err(e) => {
                    warn!(name = ?doc.name, error = %e, "Skipping unreadable user document");
                    None
                }
            })
            .collect();

        Ok(UserPage {
            users,
            next_page_token: page.next_page_token.filter(|t| !t.is_empty()),
        })
    }

    async fn find_by_email(&self, email: &str) -> FirestoreResult<Option<UserRecord>> {
        let query = StructuredQuery::field_equals(
            USERS_COLLECTION,
            "email",
            email.to_firestore_value(),
            1,
        );
        let docs = self.client.run_query("", query).await?;
        docs.first().map(parse_user_document).transpose()
    }

    async fn ping(&self) -> FirestoreResult<()> {
        self.client
            .list_documents(USERS_COLLECTION, Some(1), None)
            .await
            .map(|_| ())
    }
}
