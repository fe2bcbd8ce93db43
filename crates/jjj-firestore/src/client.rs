//! Firestore REST API client.
//!
//! Production-grade client with:
//! - Token caching with refresh margin
//! - HTTP client tuning (pooling, timeouts)
//! - Exponential backoff with jitter
//! - Observability (tracing spans, metrics)
//! - Emulator support for local development and tests

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use gcp_auth::{CustomServiceAccount, TokenProvider};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::{debug, info_span, Instrument};

use crate::error::{FirestoreError, FirestoreResult};
use crate::metrics::{names as metric_names, record_request};
use crate::retry::RetryConfig;
use crate::token_cache::TokenCache;
use crate::types::{
    CommitRequest, CommitResponse, Document, ListDocumentsResponse, RunQueryRequest,
    RunQueryResponse, StructuredQuery, Value, Write,
};

// =============================================================================
// Configuration
// =============================================================================

/// Firestore client configuration.
#[derive(Debug, Clone)]
pub struct FirestoreConfig {
    /// GCP project ID
    pub project_id: String,
    /// Database ID (usually "(default)")
    pub database_id: String,
    /// `host:port` of a Firestore emulator; bypasses service-account auth
    pub emulator_host: Option<String>,
    /// Request timeout
    pub timeout: Duration,
    /// Connect timeout
    pub connect_timeout: Duration,
    /// Retry configuration
    pub retry: RetryConfig,
}

impl FirestoreConfig {
    /// Create config from environment variables.
    pub fn from_env() -> FirestoreResult<Self> {
        let project_id = std::env::var("GCP_PROJECT_ID")
            .or_else(|_| std::env::var("FIREBASE_PROJECT_ID"))
            .map_err(|_| {
                FirestoreError::NotConfigured(
                    "GCP_PROJECT_ID or FIREBASE_PROJECT_ID must be set to access Firestore"
                        .to_string(),
                )
            })?;

        if project_id.is_empty() {
            return Err(FirestoreError::NotConfigured(
                "GCP_PROJECT_ID or FIREBASE_PROJECT_ID cannot be empty".to_string(),
            ));
        }

        let connect_timeout_secs: u64 = std::env::var("FIRESTORE_CONNECT_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);

        Ok(Self {
            project_id,
            database_id: std::env::var("FIRESTORE_DATABASE_ID")
                .unwrap_or_else(|_| "(default)".to_string()),
            emulator_host: std::env::var("FIRESTORE_EMULATOR_HOST")
                .ok()
                .filter(|h| !h.is_empty()),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(connect_timeout_secs),
            retry: RetryConfig::from_env(),
        })
    }

    /// Config pointing at an emulator (or a mock server) on `host`.
    pub fn emulator(project_id: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            database_id: "(default)".to_string(),
            emulator_host: Some(host.into()),
            timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(2),
            retry: RetryConfig::default(),
        }
    }
}

// =============================================================================
// Client
// =============================================================================

#[derive(Clone)]
enum Auth {
    ServiceAccount(Arc<TokenCache>),
    /// The emulator accepts this fixed token and skips security rules.
    Emulator,
}

/// Firestore REST API client.
#[derive(Clone)]
pub struct FirestoreClient {
    http: Client,
    config: FirestoreConfig,
    base_url: String,
    auth: Auth,
}

impl FirestoreClient {
    /// Create a new Firestore client.
    pub async fn new(config: FirestoreConfig) -> FirestoreResult<Self> {
        let (auth, origin) = match &config.emulator_host {
            Some(host) => (Auth::Emulator, format!("http://{}", host)),
            None => (
                Auth::ServiceAccount(Arc::new(TokenCache::new(Self::create_auth_provider()?))),
                "https://firestore.googleapis.com".to_string(),
            ),
        };

        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .user_agent(concat!("jjj-firestore/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(FirestoreError::Network)?;

        let base_url = format!(
            "{}/v1/projects/{}/databases/{}/documents",
            origin, config.project_id, config.database_id
        );

        Ok(Self {
            http,
            config,
            base_url,
            auth,
        })
    }

    fn create_auth_provider() -> FirestoreResult<Arc<dyn TokenProvider>> {
        let service_account = CustomServiceAccount::from_env().map_err(|e| {
            FirestoreError::auth_error(format!("Failed to load service account: {}", e))
        })?;

        match service_account {
            Some(sa) => Ok(Arc::new(sa)),
            None => Err(FirestoreError::NotConfigured(
                "GOOGLE_APPLICATION_CREDENTIALS not set. \
                 Set it to the path of your service account JSON file."
                    .to_string(),
            )),
        }
    }

    /// Create from environment variables.
    pub async fn from_env() -> FirestoreResult<Self> {
        let config = FirestoreConfig::from_env()?;
        Self::new(config).await
    }

    pub fn config(&self) -> &FirestoreConfig {
        &self.config
    }

    /// Get an access token.
    async fn get_token(&self) -> FirestoreResult<String> {
        match &self.auth {
            Auth::ServiceAccount(cache) => cache.get_token().await,
            Auth::Emulator => Ok("owner".to_string()),
        }
    }

    async fn invalidate_token(&self) {
        if let Auth::ServiceAccount(cache) = &self.auth {
            cache.invalidate().await;
        }
    }

    fn is_access_token_expired(body: &str) -> bool {
        body.contains("ACCESS_TOKEN_EXPIRED") || body.contains("\"UNAUTHENTICATED\"")
    }

    /// Send an authorized request, refreshing the token once if it expired mid-flight.
    async fn send_authorized<F>(&self, url: &str, build: F) -> FirestoreResult<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let token = self.get_token().await?;
        let response = build().bearer_auth(&token).send().await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        if !Self::is_access_token_expired(&body) {
            return Err(FirestoreError::from_http_status(
                StatusCode::UNAUTHORIZED.as_u16(),
                format!("{} failed: {}", url, body),
            ));
        }

        debug!("Firestore access token expired, refreshing");
        self.invalidate_token().await;
        let token = self.get_token().await?;
        Ok(build().bearer_auth(&token).send().await?)
    }

    /// Build document path.
    fn document_path(&self, collection: &str, doc_id: &str) -> String {
        format!("{}/{}/{}", self.base_url, collection, urlencoding::encode(doc_id))
    }

    /// Build full document name for commit writes.
    pub fn full_document_name(&self, collection: &str, doc_id: &str) -> String {
        format!(
            "projects/{}/databases/{}/documents/{}/{}",
            self.config.project_id, self.config.database_id, collection, doc_id
        )
    }

    fn mask_params(mask: &[String]) -> Vec<String> {
        mask.iter()
            .map(|f| format!("updateMask.fieldPaths={}", urlencoding::encode(f)))
            .collect()
    }

    // =========================================================================
    // CRUD Operations
    // =========================================================================

    /// Get a document.
    pub async fn get_document(
        &self,
        collection: &str,
        doc_id: &str,
    ) -> FirestoreResult<Option<Document>> {
        let url = self.document_path(collection, doc_id);
        let url = url.as_str();

        self.execute_request("get_document", collection, Some(doc_id), true, move || async move {
            let response = self.send_authorized(url, || self.http.get(url)).await?;
            match response.status() {
                StatusCode::OK => Ok(Some(response.json::<Document>().await?)),
                StatusCode::NOT_FOUND => Ok(None),
                status => Err(Self::handle_error_response(status, url, response).await),
            }
        })
        .await
    }

    /// Create a document. Fails with `AlreadyExists` if the id is taken.
    pub async fn create_document(
        &self,
        collection: &str,
        doc_id: &str,
        fields: HashMap<String, Value>,
    ) -> FirestoreResult<Document> {
        let url = format!(
            "{}/{}?documentId={}",
            self.base_url,
            collection,
            urlencoding::encode(doc_id)
        );
        let url = url.as_str();
        let body = Document::new(fields);
        let body = &body;

        self.execute_request("create_document", collection, Some(doc_id), true, move || async move {
            let response = self
                .send_authorized(url, || self.http.post(url).json(body))
                .await?;
            match response.status() {
                StatusCode::OK | StatusCode::CREATED => Ok(response.json::<Document>().await?),
                StatusCode::CONFLICT => Err(FirestoreError::AlreadyExists(format!(
                    "{}/{}",
                    collection, doc_id
                ))),
                status => Err(Self::handle_error_response(status, url, response).await),
            }
        })
        .await
    }

    /// Update the masked fields of an existing document.
    pub async fn update_document(
        &self,
        collection: &str,
        doc_id: &str,
        fields: HashMap<String, Value>,
        update_mask: Option<Vec<String>>,
    ) -> FirestoreResult<Document> {
        self.update_document_with_precondition(collection, doc_id, fields, update_mask, None)
            .await
    }

    /// Update with optimistic concurrency control.
    ///
    /// Without `update_time` the document must still exist.
    pub async fn update_document_with_precondition(
        &self,
        collection: &str,
        doc_id: &str,
        fields: HashMap<String, Value>,
        update_mask: Option<Vec<String>>,
        update_time: Option<&str>,
    ) -> FirestoreResult<Document> {
        let mut params = update_mask
            .as_deref()
            .map(Self::mask_params)
            .unwrap_or_default();
        match update_time {
            Some(ts) => params.push(format!(
                "currentDocument.updateTime={}",
                urlencoding::encode(ts)
            )),
            None => params.push("currentDocument.exists=true".to_string()),
        }
        let url = format!("{}?{}", self.document_path(collection, doc_id), params.join("&"));
        let url = url.as_str();
        let body = Document::new(fields);
        let body = &body;
        // A stale updateTime precondition must not be retried blindly.
        let retryable = update_time.is_none();

        self.execute_request("update_document", collection, Some(doc_id), retryable, move || async move {
            let response = self
                .send_authorized(url, || self.http.patch(url).json(body))
                .await?;
            match response.status() {
                StatusCode::OK => Ok(response.json::<Document>().await?),
                StatusCode::PRECONDITION_FAILED | StatusCode::CONFLICT => {
                    let body_text = response.text().await.unwrap_or_default();
                    Err(FirestoreError::PreconditionFailed(body_text))
                }
                StatusCode::NOT_FOUND => Err(FirestoreError::not_found(format!(
                    "{}/{}",
                    collection, doc_id
                ))),
                status => Err(Self::handle_error_response(status, url, response).await),
            }
        })
        .await
    }

    /// Delete a document. Deleting a missing document succeeds.
    pub async fn delete_document(&self, collection: &str, doc_id: &str) -> FirestoreResult<()> {
        let url = self.document_path(collection, doc_id);
        let url = url.as_str();

        self.execute_request("delete_document", collection, Some(doc_id), true, move || async move {
            let response = self.send_authorized(url, || self.http.delete(url)).await?;
            match response.status() {
                StatusCode::OK | StatusCode::NO_CONTENT => Ok(()),
                StatusCode::NOT_FOUND => {
                    debug!("Document {}/{} already deleted (idempotent)", collection, doc_id);
                    Ok(())
                }
                status => Err(Self::handle_error_response(status, url, response).await),
            }
        })
        .await
    }

    /// List documents in a collection.
    pub async fn list_documents(
        &self,
        collection: &str,
        page_size: Option<u32>,
        page_token: Option<&str>,
    ) -> FirestoreResult<ListDocumentsResponse> {
        let mut url = format!("{}/{}", self.base_url, collection);
        let mut params = Vec::new();
        if let Some(size) = page_size {
            params.push(format!("pageSize={}", size));
        }
        if let Some(token) = page_token {
            params.push(format!("pageToken={}", urlencoding::encode(token)));
        }
        if !params.is_empty() {
            url = format!("{}?{}", url, params.join("&"));
        }
        let url = url.as_str();

        self.execute_request("list_documents", collection, None, true, move || async move {
            let response = self.send_authorized(url, || self.http.get(url)).await?;
            match response.status() {
                StatusCode::OK => {
                    let list: ListDocumentsResponse = response.json().await?;
                    let returned = list.documents.as_ref().map(|d| d.len()).unwrap_or(0) as u64;
                    metrics::counter!(
                        metric_names::LIST_DOCUMENTS_RETURNED_TOTAL,
                        "collection" => collection.to_string()
                    )
                    .increment(returned);
                    Ok(list)
                }
                status => Err(Self::handle_error_response(status, url, response).await),
            }
        })
        .await
    }

    // =========================================================================
    // Commit
    // =========================================================================

    /// Commit writes atomically.
    ///
    /// Not retried: increment transforms are not idempotent.
    pub async fn commit(&self, writes: Vec<Write>) -> FirestoreResult<CommitResponse> {
        if writes.is_empty() {
            return Ok(CommitResponse {
                write_results: Some(vec![]),
                commit_time: None,
            });
        }
        if writes.len() > 500 {
            return Err(FirestoreError::request_failed("Commit exceeds 500 write limit"));
        }

        let url = format!("{}:commit", self.base_url);
        let url = url.as_str();
        let request = CommitRequest { writes };
        let request = &request;

        self.execute_request("commit", "commit", None, false, move || async move {
            let response = self
                .send_authorized(url, || self.http.post(url).json(request))
                .await?;
            match response.status() {
                StatusCode::OK => Ok(response.json::<CommitResponse>().await?),
                StatusCode::NOT_FOUND => Err(FirestoreError::not_found(
                    "commit target document does not exist",
                )),
                StatusCode::PRECONDITION_FAILED => Err(FirestoreError::PreconditionFailed(
                    "Commit precondition failed".to_string(),
                )),
                status => Err(Self::handle_error_response(status, url, response).await),
            }
        })
        .await
    }

    // =========================================================================
    // Query Operations
    // =========================================================================

    /// Run a structured query.
    ///
    /// `parent_path` is the document containing the collection, e.g.
    /// "users/USER_ID", or empty for a root collection.
    pub async fn run_query(
        &self,
        parent_path: &str,
        query: StructuredQuery,
    ) -> FirestoreResult<Vec<Document>> {
        let url = if parent_path.is_empty() {
            format!("{}:runQuery", self.base_url)
        } else {
            format!("{}/{}:runQuery", self.base_url, parent_path)
        };
        let url = url.as_str();
        let request = RunQueryRequest {
            structured_query: query,
        };
        let request = &request;
        let scope = if parent_path.is_empty() { "root" } else { parent_path };

        self.execute_request("run_query", scope, None, true, move || async move {
            let response = self
                .send_authorized(url, || self.http.post(url).json(request))
                .await?;
            match response.status() {
                StatusCode::OK => {
                    let body = response.text().await.unwrap_or_default();
                    // runQuery returns a JSON array of RunQueryResponse objects
                    let responses: Vec<RunQueryResponse> =
                        serde_json::from_str(&body).map_err(|e| {
                            FirestoreError::InvalidResponse(format!(
                                "Failed to parse runQuery response: {} (body prefix: {})",
                                e,
                                body.chars().take(200).collect::<String>()
                            ))
                        })?;

                    Ok(responses.into_iter().filter_map(|r| r.document).collect())
                }
                status => Err(Self::handle_error_response(status, url, response).await),
            }
        })
        .await
    }

    // =========================================================================
    // Internal Helpers
    // =========================================================================

    /// Execute a request with tracing, metrics and (optionally) retry.
    async fn execute_request<T, F, Fut>(
        &self,
        operation: &str,
        collection: &str,
        doc_id: Option<&str>,
        retryable: bool,
        op: F,
    ) -> FirestoreResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = FirestoreResult<T>>,
    {
        let span = if let Some(id) = doc_id {
            info_span!("firestore_request", operation = %operation, collection = %collection, doc_id = %id)
        } else {
            info_span!("firestore_request", operation = %operation, collection = %collection)
        };

        let start = Instant::now();
        let result = async {
            if retryable {
                crate::retry::with_retry(&self.config.retry, operation, &op).await
            } else {
                op().await
            }
        }
        .instrument(span)
        .await;
        let latency_ms = start.elapsed().as_millis() as f64;

        let status = match &result {
            Ok(_) => 200,
            Err(e) => e.http_status().unwrap_or(500),
        };
        record_request(operation, status, latency_ms);

        result
    }

    async fn handle_error_response(status: StatusCode, url: &str, response: Response) -> FirestoreError {
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_ms = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(|secs| secs * 1000)
                .unwrap_or(1000);
            return FirestoreError::RateLimited(retry_after_ms);
        }
        let body = response.text().await.unwrap_or_default();
        FirestoreError::from_http_status(status.as_u16(), format!("{} failed: {}", url, body))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_config_from_env_validates_project_id() {
        std::env::remove_var("GCP_PROJECT_ID");
        std::env::remove_var("FIREBASE_PROJECT_ID");
        let result = FirestoreConfig::from_env();
        assert!(matches!(result, Err(FirestoreError::NotConfigured(_))));
    }

    #[test]
    #[serial]
    fn test_config_default_values() {
        std::env::set_var("GCP_PROJECT_ID", "test-project");
        std::env::remove_var("FIRESTORE_CONNECT_TIMEOUT_SECS");
        std::env::remove_var("FIRESTORE_EMULATOR_HOST");
        let config = FirestoreConfig::from_env().unwrap();
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.database_id, "(default)");
        assert!(config.emulator_host.is_none());
    }

    #[tokio::test]
    async fn test_emulator_client_paths() {
        let client = FirestoreClient::new(FirestoreConfig::emulator("demo", "127.0.0.1:8080"))
            .await
            .unwrap();
        assert_eq!(
            client.document_path("users", "a b"),
            "http://127.0.0.1:8080/v1/projects/demo/databases/(default)/documents/users/a%20b"
        );
        assert_eq!(
            client.full_document_name("users", "u1"),
            "projects/demo/databases/(default)/documents/users/u1"
        );
    }
}
