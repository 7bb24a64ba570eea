//! Remote document-store backend (HTTP).
//!
//! Talks to a small document API:
//!
//! ```text
//! GET    /health
//! GET    /v1/{project}/{collection}
//! GET    /v1/{project}/{collection}/{key}
//! PUT    /v1/{project}/{collection}/{key}     set (replace)
//! PATCH  /v1/{project}/{collection}/{key}     merge
//! DELETE /v1/{project}/{collection}/{key}
//! POST   /v1/{project}:batch                  set / merge / delete writes
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, header};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use geosip_types::{LandRecord, RecordId, User};

use crate::config::RemoteConfig;
use crate::ops::{BackendKind, RecordStore};
use crate::{StoreError, StoreResult};

const RECORDS: &str = "landRecords";
const USERS: &str = "users";

/// Largest number of writes sent in one batch request.
pub const MAX_BATCH_WRITES: usize = 500;

#[derive(Debug, Deserialize)]
struct DocumentList<T> {
    documents: Vec<T>,
}

/// One write in a batch request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub(crate) enum BatchWrite {
    Set {
        collection: &'static str,
        key: String,
        document: serde_json::Value,
    },
    Merge {
        collection: &'static str,
        key: String,
        document: serde_json::Value,
    },
    Delete {
        collection: &'static str,
        key: String,
    },
}

#[derive(Debug, Serialize)]
struct BatchRequest<'a> {
    writes: &'a [BatchWrite],
}

/// HTTP client for the remote document store.
pub struct RemoteBackend {
    config: RemoteConfig,
    client: Client,
}

impl std::fmt::Debug for RemoteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteBackend")
            .field("base_url", &self.config.base_url)
            .field("project", &self.config.project)
            .finish_non_exhaustive()
    }
}

impl RemoteBackend {
    /// Build a client. Does not touch the network.
    pub fn new(config: RemoteConfig) -> StoreResult<Self> {
        let mut headers = header::HeaderMap::new();
        if !config.api_key.is_empty() {
            let value = header::HeaderValue::from_str(&format!("Bearer {}", config.api_key))
                .map_err(|_| StoreError::Config("api_key is not a valid header value".into()))?;
            headers.insert(header::AUTHORIZATION, value);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| StoreError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    /// True when `/health` answers with a success status.
    pub async fn health_check(&self) -> bool {
        let url = format!("{}/health", self.base_url());
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(error = %e, "remote health check failed");
                false
            }
        }
    }

    fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    fn collection_url(&self, collection: &str) -> String {
        format!(
            "{}/v1/{}/{}",
            self.base_url(),
            urlencoding::encode(&self.config.project),
            collection
        )
    }

    fn document_url(&self, collection: &str, key: &str) -> String {
        format!(
            "{}/{}",
            self.collection_url(collection),
            urlencoding::encode(key)
        )
    }

    fn batch_url(&self) -> String {
        format!(
            "{}/v1/{}:batch",
            self.base_url(),
            urlencoding::encode(&self.config.project)
        )
    }

    async fn list<T: DeserializeOwned>(&self, collection: &str) -> StoreResult<Vec<T>> {
        let response = self.client.get(self.collection_url(collection)).send().await?;
        let list: DocumentList<T> = handle_response(response).await?;
        Ok(list.documents)
    }

    async fn get<T: DeserializeOwned>(&self, collection: &str, key: &str) -> StoreResult<Option<T>> {
        let response = self
            .client
            .get(self.document_url(collection, key))
            .send()
            .await?;
        match handle_response(response).await {
            Ok(doc) => Ok(Some(doc)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn set<T: Serialize + Sync>(&self, collection: &str, key: &str, doc: &T) -> StoreResult<()> {
        let response = self
            .client
            .put(self.document_url(collection, key))
            .json(doc)
            .send()
            .await?;
        check_status(response).await
    }

    async fn merge<T: Serialize + Sync>(&self, collection: &str, key: &str, doc: &T) -> StoreResult<()> {
        let response = self
            .client
            .patch(self.document_url(collection, key))
            .json(doc)
            .send()
            .await?;
        check_status(response).await
    }

    async fn delete(&self, collection: &str, key: &str) -> StoreResult<()> {
        let response = self
            .client
            .delete(self.document_url(collection, key))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        check_status(response).await
    }

    /// Send writes in chunks of [`MAX_BATCH_WRITES`]. Chunks already sent stay
    /// committed when a later one fails.
    async fn batch(&self, writes: &[BatchWrite]) -> StoreResult<()> {
        for chunk in writes.chunks(MAX_BATCH_WRITES) {
            let response = self
                .client
                .post(self.batch_url())
                .json(&BatchRequest { writes: chunk })
                .send()
                .await?;
            check_status(response).await?;
            debug!(writes = chunk.len(), "remote batch committed");
        }
        Ok(())
    }
}

/// Full document for a record. Every field is present, absent ones as
/// `null`, so a merge overwrites (and clears) each of them.
fn record_document(record: &LandRecord) -> StoreResult<serde_json::Value> {
    Ok(serde_json::to_value(record)?)
}

fn set_writes(records: &[LandRecord]) -> StoreResult<Vec<BatchWrite>> {
    records
        .iter()
        .map(|record| {
            Ok(BatchWrite::Set {
                collection: RECORDS,
                key: record.id.to_string(),
                document: record_document(record)?,
            })
        })
        .collect()
}

async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> StoreResult<T> {
    if response.status() == StatusCode::NOT_FOUND {
        return Err(StoreError::not_found(response.url().path().to_string()));
    }

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        return Err(StoreError::Remote { status, message });
    }

    Ok(response.json().await?)
}

async fn check_status(response: reqwest::Response) -> StoreResult<()> {
    if response.status().is_success() {
        return Ok(());
    }
    let status = response.status().as_u16();
    let message = response.text().await.unwrap_or_default();
    Err(StoreError::Remote { status, message })
}

#[async_trait]
impl RecordStore for RemoteBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Remote
    }

    async fn list_records(&self) -> StoreResult<Vec<LandRecord>> {
        self.list(RECORDS).await
    }

    async fn get_record(&self, id: &RecordId) -> StoreResult<Option<LandRecord>> {
        self.get(RECORDS, id.as_str()).await
    }

    async fn create_record(&self, record: &LandRecord) -> StoreResult<()> {
        self.set(RECORDS, record.id.as_str(), record).await
    }

    async fn create_records(&self, records: &[LandRecord]) -> StoreResult<()> {
        self.batch(&set_writes(records)?).await
    }

    async fn put_records(&self, records: &[LandRecord]) -> StoreResult<()> {
        self.batch(&set_writes(records)?).await
    }

    async fn update_record(&self, record: &LandRecord) -> StoreResult<()> {
        self.merge(RECORDS, record.id.as_str(), &record_document(record)?)
            .await
    }

    async fn delete_record(&self, id: &RecordId) -> StoreResult<()> {
        self.delete(RECORDS, id.as_str()).await
    }

    async fn clear_records(&self) -> StoreResult<()> {
        let records: Vec<LandRecord> = self.list(RECORDS).await?;
        let writes: Vec<BatchWrite> = records
            .into_iter()
            .map(|record| BatchWrite::Delete {
                collection: RECORDS,
                key: record.id.into(),
            })
            .collect();
        self.batch(&writes).await
    }

    async fn set_file_link_for_drawing(
        &self,
        drawing_number: &str,
        link: &str,
    ) -> StoreResult<usize> {
        let drawing_number = drawing_number.trim();
        let records: Vec<LandRecord> = self.list(RECORDS).await?;
        let writes: Vec<BatchWrite> = records
            .into_iter()
            .filter(|record| record.survey_drawing_number.trim() == drawing_number)
            .map(|record| BatchWrite::Merge {
                collection: RECORDS,
                key: record.id.into(),
                document: serde_json::json!({ "fileLink": link }),
            })
            .collect();
        self.batch(&writes).await?;
        Ok(writes.len())
    }

    async fn get_user(&self, username: &str) -> StoreResult<Option<User>> {
        self.get(USERS, username).await
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        self.list(USERS).await
    }

    async fn put_user(&self, user: &User) -> StoreResult<()> {
        self.set(USERS, &user.username, user).await
    }

    async fn delete_user(&self, username: &str) -> StoreResult<()> {
        self.delete(USERS, username).await
    }
}
