//! Firestore-compatible REST client for the warm identity-registry tier (§4.3).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use gcp_auth::TokenProvider;
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use crate::error::{RegistryError, RegistryResult};
use crate::types::{BatchWriteRequest, BatchWriteResponse, Document, ListDocumentsResponse, Value, Write};

/// Warm-tier client configuration.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// GCP project ID
    pub project_id: String,
    /// Database ID (usually "(default)")
    pub database_id: String,
    /// Request timeout
    pub timeout: Duration,
    /// Max retries for transient errors
    pub max_retries: u32,
}

impl RegistryConfig {
    /// Create config from environment variables.
    pub fn from_env() -> RegistryResult<Self> {
        Ok(Self {
            project_id: std::env::var("GCP_PROJECT_ID")
                .or_else(|_| std::env::var("FIREBASE_PROJECT_ID"))
                .map_err(|_| RegistryError::auth_error("GCP_PROJECT_ID not set"))?,
            database_id: std::env::var("FIRESTORE_DATABASE_ID")
                .unwrap_or_else(|_| "(default)".to_string()),
            timeout: Duration::from_secs(30),
            max_retries: 3,
        })
    }
}

/// Warm-tier REST client: a durable document store keyed by track id (§4.3).
pub struct RegistryClient {
    http: Client,
    auth: Arc<dyn TokenProvider>,
    config: RegistryConfig,
    base_url: String,
}

impl Clone for RegistryClient {
    fn clone(&self) -> Self {
        Self {
            http: self.http.clone(),
            auth: Arc::clone(&self.auth),
            config: self.config.clone(),
            base_url: self.base_url.clone(),
        }
    }
}

impl RegistryClient {
    /// Create a new warm-tier client.
    pub async fn new(config: RegistryConfig) -> RegistryResult<Self> {
        let auth = gcp_auth::provider()
            .await
            .map_err(|e| RegistryError::auth_error(e.to_string()))?;

        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(RegistryError::Network)?;

        let base_url = format!(
            "https://firestore.googleapis.com/v1/projects/{}/databases/{}/documents",
            config.project_id, config.database_id
        );

        Ok(Self {
            http,
            auth,
            config,
            base_url,
        })
    }

    /// Create from environment variables.
    pub async fn from_env() -> RegistryResult<Self> {
        let config = RegistryConfig::from_env()?;
        Self::new(config).await
    }

    /// Get an access token.
    async fn get_token(&self) -> RegistryResult<String> {
        let token = self.auth
            .token(&["https://www.googleapis.com/auth/datastore"])
            .await
            .map_err(|e| RegistryError::auth_error(e.to_string()))?;
        Ok(token.as_str().to_string())
    }

    /// Build document path.
    fn document_path(&self, collection: &str, doc_id: &str) -> String {
        format!("{}/{}/{}", self.base_url, collection, doc_id)
    }

    /// Get a document.
    pub async fn get_document(
        &self,
        collection: &str,
        doc_id: &str,
    ) -> RegistryResult<Option<Document>> {
        let url = self.document_path(collection, doc_id);
        let token = self.get_token().await?;

        let response = self
            .http
            .get(&url)
            .bearer_auth(&token)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                let doc: Document = response.json().await?;
                Ok(Some(doc))
            }
            StatusCode::NOT_FOUND => Ok(None),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(RegistryError::request_failed(format!(
                    "GET {} failed with {}: {}",
                    url, status, body
                )))
            }
        }
    }

    /// Create a document.
    pub async fn create_document(
        &self,
        collection: &str,
        doc_id: &str,
        fields: HashMap<String, Value>,
    ) -> RegistryResult<Document> {
        let url = format!("{}/{}?documentId={}", self.base_url, collection, doc_id);
        let token = self.get_token().await?;

        let body = Document {
            name: None,
            fields: Some(fields),
            create_time: None,
            update_time: None,
        };

        let response = self
            .http
            .post(&url)
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK | StatusCode::CREATED => {
                let doc: Document = response.json().await?;
                Ok(doc)
            }
            StatusCode::CONFLICT => Err(RegistryError::AlreadyExists(format!(
                "{}/{}",
                collection, doc_id
            ))),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(RegistryError::request_failed(format!(
                    "POST {} failed with {}: {}",
                    url, status, body
                )))
            }
        }
    }

    /// Update a document (merge).
    pub async fn update_document(
        &self,
        collection: &str,
        doc_id: &str,
        fields: HashMap<String, Value>,
        update_mask: Option<Vec<String>>,
    ) -> RegistryResult<Document> {
        let mut url = self.document_path(collection, doc_id);

        if let Some(mask) = update_mask {
            let mask_params: Vec<String> = mask.iter().map(|f| format!("updateMask.fieldPaths={}", f)).collect();
            url = format!("{}?{}", url, mask_params.join("&"));
        }

        let token = self.get_token().await?;

        let body = Document {
            name: None,
            fields: Some(fields),
            create_time: None,
            update_time: None,
        };

        let response = self
            .http
            .patch(&url)
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                let doc: Document = response.json().await?;
                Ok(doc)
            }
            StatusCode::NOT_FOUND => Err(RegistryError::not_found(format!(
                "{}/{}",
                collection, doc_id
            ))),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(RegistryError::request_failed(format!(
                    "PATCH {} failed with {}: {}",
                    url, status, body
                )))
            }
        }
    }

    /// Update a document with an updateTime precondition to avoid lost updates.
    ///
    /// Used by warm upserts that must not clobber a concurrent reprocessor
    /// write to the same track (§4.3, §4.7).
    pub async fn update_document_with_precondition(
        &self,
        collection: &str,
        doc_id: &str,
        fields: HashMap<String, Value>,
        update_mask: Option<Vec<String>>,
        update_time: Option<&str>,
    ) -> RegistryResult<Document> {
        let mut url = self.document_path(collection, doc_id);
        let mut params: Vec<String> = Vec::new();

        if let Some(mask) = update_mask {
            params.extend(
                mask.iter()
                    .map(|f| format!("updateMask.fieldPaths={}", f)),
            );
        }

        if let Some(ts) = update_time {
            params.push(format!(
                "currentDocument.updateTime={}",
                urlencoding::encode(ts)
            ));
        }

        if !params.is_empty() {
            url = format!("{}?{}", url, params.join("&"));
        }

        let token = self.get_token().await?;

        let body = Document {
            name: None,
            fields: Some(fields),
            create_time: None,
            update_time: None,
        };

        let response = self
            .http
            .patch(&url)
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                let doc: Document = response.json().await?;
                Ok(doc)
            }
            StatusCode::PRECONDITION_FAILED | StatusCode::CONFLICT => {
                let body = response.text().await.unwrap_or_default();
                Err(RegistryError::PreconditionFailed(format!(
                    "PATCH {} precondition failed: {}",
                    url, body
                )))
            }
            StatusCode::NOT_FOUND => Err(RegistryError::not_found(format!(
                "{}/{}",
                collection, doc_id
            ))),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(RegistryError::request_failed(format!(
                    "PATCH {} failed with {}: {}",
                    url, status, body
                )))
            }
        }
    }

    /// Delete a document.
    pub async fn delete_document(&self, collection: &str, doc_id: &str) -> RegistryResult<()> {
        let url = self.document_path(collection, doc_id);
        let token = self.get_token().await?;

        let response = self.http.delete(&url).bearer_auth(&token).send().await?;

        match response.status() {
            StatusCode::OK | StatusCode::NO_CONTENT => Ok(()),
            StatusCode::NOT_FOUND => {
                debug!("Document {}/{} already deleted", collection, doc_id);
                Ok(())
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(RegistryError::request_failed(format!(
                    "DELETE {} failed with {}: {}",
                    url, status, body
                )))
            }
        }
    }

    /// List documents in a collection.
    pub async fn list_documents(
        &self,
        collection: &str,
        page_size: Option<u32>,
        page_token: Option<&str>,
    ) -> RegistryResult<ListDocumentsResponse> {
        let mut url = format!("{}/{}", self.base_url, collection);

        let mut params = Vec::new();
        if let Some(size) = page_size {
            params.push(format!("pageSize={}", size));
        }
        if let Some(token) = page_token {
            params.push(format!("pageToken={}", token));
        }
        if !params.is_empty() {
            url = format!("{}?{}", url, params.join("&"));
        }

        let token = self.get_token().await?;

        let response = self.http.get(&url).bearer_auth(&token).send().await?;

        match response.status() {
            StatusCode::OK => {
                let list: ListDocumentsResponse = response.json().await?;
                Ok(list)
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(RegistryError::request_failed(format!(
                    "LIST {} failed with {}: {}",
                    url, status, body
                )))
            }
        }
    }

    /// List every document in a collection, following pagination.
    pub async fn list_all_documents(&self, collection: &str) -> RegistryResult<Vec<Document>> {
        let mut out = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let page = self
                .list_documents(collection, Some(300), page_token.as_deref())
                .await?;
            out.extend(page.documents.unwrap_or_default());
            page_token = page.next_page_token;
            if page_token.is_none() {
                break;
            }
        }
        Ok(out)
    }

    /// Execute with retry.
    pub async fn with_retry<T, F, Fut>(&self, operation: F) -> RegistryResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = RegistryResult<T>>,
    {
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = Duration::from_millis(100 * 2u64.pow(attempt));
                    warn!(
                        "Registry warm-tier operation failed (attempt {}), retrying in {:?}: {}",
                        attempt + 1,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| RegistryError::request_failed("Unknown error")))
    }

    // ========================================================================
    // Batch Write Operations (Atomic multi-document writes)
    // ========================================================================

    /// Build full document name for batch operations.
    pub fn full_document_name(&self, collection: &str, doc_id: &str) -> String {
        format!(
            "projects/{}/databases/{}/documents/{}/{}",
            self.config.project_id, self.config.database_id, collection, doc_id
        )
    }

    /// Execute a batch write (atomic multi-document operation).
    ///
    /// Used by `SaveBarn` (§4.3) so a chunk's whole identity snapshot lands
    /// or fails together, never half-applied.
    pub async fn batch_write(&self, writes: Vec<Write>) -> RegistryResult<BatchWriteResponse> {
        if writes.is_empty() {
            return Ok(BatchWriteResponse::empty());
        }

        if writes.len() > 500 {
            return Err(RegistryError::request_failed(
                "Batch write exceeds 500 document limit",
            ));
        }

        let url = format!(
            "https://firestore.googleapis.com/v1/projects/{}/databases/{}/documents:batchWrite",
            self.config.project_id, self.config.database_id
        );
        let token = self.get_token().await?;

        let request = BatchWriteRequest { writes };

        let response = self
            .http
            .post(&url)
            .bearer_auth(&token)
            .json(&request)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                let batch_response: BatchWriteResponse = response.json().await?;
                batch_response.check_for_errors()?;
                Ok(batch_response)
            }
            StatusCode::CONFLICT => Err(RegistryError::AlreadyExists(
                "Batch write conflict: document already exists".to_string(),
            )),
            StatusCode::PRECONDITION_FAILED => Err(RegistryError::PreconditionFailed(
                "Batch write precondition failed".to_string(),
            )),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(RegistryError::request_failed(format!(
                    "Batch write failed with {}: {}",
                    status, body
                )))
            }
        }
    }
}
