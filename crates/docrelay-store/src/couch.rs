//! HTTP client for a CouchDB-compatible database.

use std::time::Duration;

use async_trait::async_trait;
use docrelay_core::{Chunk, Document};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, StoreError};
use crate::traits::{Change, ChangeFeed, DocStore, PutResult, StoreInfo, WriteOutcome};

const FEED_BUFFER: usize = 64;

/// Connection settings for one database.
#[derive(Debug, Clone)]
pub struct CouchConfig {
    /// Database URL, e.g. `https://couch.example.com/vault`.
    pub uri: String,
    pub username: String,
    pub password: String,
    /// Timeout for ordinary requests.
    pub request_timeout: Duration,
    /// How long the server may hold a long-poll `_changes` request open.
    pub poll_timeout: Duration,
}

impl CouchConfig {
    pub fn new(uri: impl Into<String>, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            username: username.into(),
            password: password.into(),
            request_timeout: Duration::from_secs(30),
            poll_timeout: Duration::from_secs(60),
        }
    }
}

/// A database reached over HTTP.
#[derive(Clone)]
pub struct CouchStore {
    config: CouchConfig,
    client: Client,
}

impl CouchStore {
    /// Create a client for the configured database.
    pub fn new(config: CouchConfig) -> Result<Self> {
        let client = Client::builder().build()?;
        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.uri.trim_end_matches('/'), path)
    }

    fn doc_url(&self, id: &str) -> String {
        self.url(&urlencoding::encode(id))
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, url)
            .timeout(self.config.request_timeout);
        if self.config.username.is_empty() {
            builder
        } else {
            builder.basic_auth(&self.config.username, Some(&self.config.password))
        }
    }

    async fn fetch_changes(&self, since: &str) -> Result<ChangesResponse> {
        let url = format!(
            "{}?feed=longpoll&include_docs=true&style=all_docs&timeout={}&since={}",
            self.url("_changes"),
            self.config.poll_timeout.as_millis(),
            urlencoding::encode(since)
        );
        let response = self
            .request(Method::GET, &url)
            .timeout(self.config.poll_timeout + self.config.request_timeout)
            .send()
            .await?;
        handle_response(response).await
    }

    async fn run_feed(
        self,
        mut since: String,
        prefix: String,
        tx: tokio::sync::mpsc::Sender<Result<Change>>,
    ) {
        loop {
            let batch = match self.fetch_changes(&since).await {
                Ok(batch) => batch,
                Err(e) => {
                    let _ = tx.send(Err(StoreError::Feed(e.to_string()))).await;
                    return;
                }
            };

            for row in batch.results {
                let Some(raw) = row.doc else { continue };
                let doc: Document = match serde_json::from_value(raw) {
                    Ok(doc) => doc,
                    Err(e) => {
                        tracing::debug!(id = %row.id, error = %e, "skipping undecodable change");
                        continue;
                    }
                };
                if !doc.id.starts_with(&prefix) {
                    continue;
                }
                let change = Change {
                    position: position_token(&row.seq),
                    doc,
                };
                if tx.send(Ok(change)).await.is_err() {
                    return;
                }
            }

            since = position_token(&batch.last_seq);
        }
    }
}

#[async_trait]
impl DocStore for CouchStore {
    async fn info(&self) -> Result<StoreInfo> {
        let url = self.url("");
        let response = self.request(Method::GET, &url).send().await?;
        let info: InfoResponse = handle_response(response).await?;
        Ok(StoreInfo {
            db_name: info.db_name,
            doc_count: info.doc_count,
            update_seq: position_token(&info.update_seq),
        })
    }

    async fn changes(&self, since: &str, prefix: &str) -> Result<ChangeFeed> {
        let (tx, feed) = ChangeFeed::channel(FEED_BUFFER);
        let task = tokio::spawn(self.clone().run_feed(since.to_string(), prefix.to_string(), tx));
        Ok(feed.with_task(task))
    }

    async fn get(&self, id: &str) -> Result<Option<Document>> {
        let response = self.request(Method::GET, &self.doc_url(id)).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        handle_response(response).await.map(Some)
    }

    async fn get_chunks(&self, ids: &[String]) -> Result<Vec<Option<Chunk>>> {
        let url = format!("{}?include_docs=true", self.url("_all_docs"));
        let response = self
            .request(Method::POST, &url)
            .json(&KeysRequest { keys: ids })
            .send()
            .await?;
        let body: AllDocsResponse = handle_response(response).await?;

        Ok(body
            .rows
            .into_iter()
            .map(|row| row.doc.and_then(|doc| serde_json::from_value(doc).ok()))
            .collect())
    }

    async fn bulk_write_chunks(&self, chunks: &[Chunk]) -> Result<Vec<WriteOutcome>> {
        let response = self
            .request(Method::POST, &self.url("_bulk_docs"))
            .json(&BulkDocsRequest { docs: chunks })
            .send()
            .await?;
        let items: Vec<BulkItem> = handle_response(response).await?;

        Ok(items
            .into_iter()
            .map(|item| match item.error.as_deref() {
                None => WriteOutcome::Written,
                Some("conflict") => WriteOutcome::Conflict,
                Some(error) => WriteOutcome::Failed(format!(
                    "{}: {} ({})",
                    item.id.unwrap_or_default(),
                    error,
                    item.reason.unwrap_or_default()
                )),
            })
            .collect())
    }

    async fn put(&self, doc: &Document) -> Result<PutResult> {
        let response = self
            .request(Method::PUT, &self.doc_url(&doc.id))
            .json(doc)
            .send()
            .await?;
        if response.status() == StatusCode::CONFLICT {
            return Ok(PutResult::Conflict);
        }
        let written: PutResponse = handle_response(response).await?;
        Ok(PutResult::Written {
            id: written.id,
            rev: written.rev,
        })
    }
}

async fn handle_response<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(StoreError::Status {
            status: status.as_u16(),
            body,
        });
    }
    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Feed positions are strings on CouchDB 2+ and integers on 1.x.
fn position_token(seq: &Value) -> String {
    match seq {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[derive(Deserialize)]
struct InfoResponse {
    db_name: String,
    #[serde(default)]
    doc_count: u64,
    #[serde(default)]
    update_seq: Value,
}

#[derive(Deserialize)]
struct ChangesResponse {
    results: Vec<ChangeRow>,
    last_seq: Value,
}

#[derive(Deserialize)]
struct ChangeRow {
    seq: Value,
    #[serde(default)]
    id: String,
    #[serde(default)]
    doc: Option<Value>,
}

#[derive(Serialize)]
struct KeysRequest<'a> {
    keys: &'a [String],
}

#[derive(Deserialize)]
struct AllDocsResponse {
    rows: Vec<AllDocsRow>,
}

#[derive(Deserialize)]
struct AllDocsRow {
    #[serde(default)]
    doc: Option<Value>,
}

#[derive(Serialize)]
struct BulkDocsRequest<'a> {
    docs: &'a [Chunk],
}

#[derive(Deserialize)]
struct BulkItem {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Deserialize)]
struct PutResponse {
    id: String,
    rev: String,
}
