//! Blocking REST client for the hosted Pinecone vector database.
//!
//! The control plane (`api.pinecone.io`) manages indexes; every index also
//! has its own data-plane host that serves upserts and queries.

use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::embeddings::{EmbeddedPassage, ScoredPassage};
use crate::http::{send_with_retry, status_of};
use crate::vector_store::{IndexName, VectorIndex};

const API_VERSION: &str = "2024-07";

/// Largest number of vectors sent in one upsert request.
pub const MAX_UPSERT_BATCH: usize = 100;

/// Placement of a serverless index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerlessSpec {
    /// Cloud provider (aws, gcp, azure).
    pub cloud: String,
    /// Provider region.
    pub region: String,
}

/// Index description returned by the control plane.
#[derive(Debug, Clone, Deserialize)]
pub struct IndexDescription {
    /// Index name.
    pub name: String,
    /// Vector length.
    pub dimension: usize,
    /// Similarity metric.
    pub metric: String,
    /// Data-plane host, usually without scheme.
    pub host: String,
    /// Readiness state.
    #[serde(default)]
    pub status: IndexStatus,
}

/// Readiness reported for an index.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IndexStatus {
    /// True once the index accepts reads and writes.
    #[serde(default)]
    pub ready: bool,
    /// Provider state label (e.g. `Initializing`, `Ready`).
    #[serde(default)]
    pub state: String,
}

/// Control-plane client.
#[derive(Clone)]
pub struct PineconeClient {
    client: Client,
    controller_url: String,
    max_attempts: usize,
    poll_interval: Duration,
}

impl PineconeClient {
    /// Builds a new client.
    pub fn new(
        api_key: String,
        controller_url: String,
        timeout: Duration,
        max_attempts: usize,
    ) -> Result<Self> {
        anyhow::ensure!(!api_key.trim().is_empty(), "missing Pinecone API key");
        anyhow::ensure!(
            controller_url.starts_with("http://") || controller_url.starts_with("https://"),
            "Pinecone controller must be an http(s) URL"
        );
        let mut headers = HeaderMap::new();
        headers.insert(
            "Api-Key",
            HeaderValue::from_str(api_key.trim()).context("invalid Pinecone API key")?,
        );
        headers.insert(
            "X-Pinecone-API-Version",
            HeaderValue::from_static(API_VERSION),
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("failed to build Pinecone HTTP client")?;
        Ok(Self {
            client,
            controller_url: controller_url.trim_end_matches('/').to_string(),
            max_attempts: max_attempts.max(1),
            poll_interval: Duration::from_secs(2),
        })
    }

    /// Overrides how often the `wait_until_*` helpers poll.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Names of all indexes in the project.
    pub fn list_indexes(&self) -> Result<Vec<String>> {
        let url = format!("{}/indexes", self.controller_url);
        let resp = send_with_retry("Pinecone list indexes", self.max_attempts, || {
            self.client.get(&url)
        })?;
        let parsed: IndexList = resp.json().context("failed to parse Pinecone index list")?;
        Ok(parsed.indexes.into_iter().map(|index| index.name).collect())
    }

    /// Describes `name`, or `None` when it does not exist.
    pub fn describe_index(&self, name: &IndexName) -> Result<Option<IndexDescription>> {
        let url = format!("{}/indexes/{}", self.controller_url, name);
        match send_with_retry("Pinecone describe index", self.max_attempts, || {
            self.client.get(&url)
        }) {
            Ok(resp) => {
                let parsed = resp
                    .json()
                    .with_context(|| format!("failed to parse description of index '{name}'"))?;
                Ok(Some(parsed))
            }
            Err(err) if status_of(&err) == Some(StatusCode::NOT_FOUND) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Creates a serverless cosine index.
    pub fn create_index(
        &self,
        name: &IndexName,
        dimension: usize,
        spec: &ServerlessSpec,
    ) -> Result<IndexDescription> {
        anyhow::ensure!(dimension > 0, "index dimension must be positive");
        let url = format!("{}/indexes", self.controller_url);
        let body = CreateIndexRequest {
            name: name.as_str(),
            dimension,
            metric: "cosine",
            spec: CreateIndexSpec { serverless: spec },
        };
        info!(index = %name, dimension, cloud = %spec.cloud, region = %spec.region, "creating index");
        let resp = send_with_retry("Pinecone create index", self.max_attempts, || {
            self.client.post(&url).json(&body)
        })?;
        resp.json()
            .with_context(|| format!("failed to parse creation response for index '{name}'"))
    }

    /// Deletes `name`. Deleting a missing index is not an error.
    pub fn delete_index(&self, name: &IndexName) -> Result<()> {
        let url = format!("{}/indexes/{}", self.controller_url, name);
        info!(index = %name, "deleting index");
        match send_with_retry("Pinecone delete index", self.max_attempts, || {
            self.client.delete(&url)
        }) {
            Ok(_) => Ok(()),
            Err(err) if status_of(&err) == Some(StatusCode::NOT_FOUND) => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Polls until the index reports ready or `timeout` elapses.
    pub fn wait_until_ready(&self, name: &IndexName, timeout: Duration) -> Result<IndexDescription> {
        let started = Instant::now();
        loop {
            match self.describe_index(name)? {
                Some(description) if description.status.ready => return Ok(description),
                Some(description) => {
                    debug!(index = %name, state = %description.status.state, "index not ready yet");
                }
                None => debug!(index = %name, "index not visible yet"),
            }
            if started.elapsed() >= timeout {
                anyhow::bail!(
                    "index '{}' was not ready after {}s",
                    name,
                    timeout.as_secs()
                );
            }
            thread::sleep(self.poll_interval);
        }
    }

    /// Polls until `name` no longer exists or `timeout` elapses.
    pub fn wait_until_deleted(&self, name: &IndexName, timeout: Duration) -> Result<()> {
        let started = Instant::now();
        while self.describe_index(name)?.is_some() {
            if started.elapsed() >= timeout {
                anyhow::bail!(
                    "index '{}' still exists {}s after deletion",
                    name,
                    timeout.as_secs()
                );
            }
            debug!(index = %name, "waiting for index deletion");
            thread::sleep(self.poll_interval);
        }
        Ok(())
    }

    /// Data-plane handle for an index described by the control plane.
    pub fn index(&self, description: &IndexDescription, namespace: &str) -> PineconeIndex {
        let host = if description.host.starts_with("http://")
            || description.host.starts_with("https://")
        {
            description.host.trim_end_matches('/').to_string()
        } else {
            format!("https://{}", description.host.trim_end_matches('/'))
        };
        PineconeIndex {
            client: self.client.clone(),
            host,
            namespace: namespace.to_string(),
            dimension: description.dimension,
            max_attempts: self.max_attempts,
        }
    }
}

/// Data-plane handle for one index and namespace.
#[derive(Clone)]
pub struct PineconeIndex {
    client: Client,
    host: String,
    namespace: String,
    dimension: usize,
    max_attempts: usize,
}

impl PineconeIndex {
    fn upsert_batch(&self, records: &[EmbeddedPassage]) -> Result<usize> {
        let vectors: Vec<UpsertVector<'_>> = records
            .iter()
            .map(|record| UpsertVector {
                id: &record.passage.id,
                values: &record.embedding,
                metadata: PassageMetadata {
                    text: &record.passage.text,
                    source: &record.passage.source,
                    chunk_index: record.passage.chunk_index,
                    byte_start: record.passage.byte_start,
                    byte_end: record.passage.byte_end,
                    token_estimate: record.passage.token_estimate,
                    checksum: record.passage.checksum,
                },
            })
            .collect();
        let body = UpsertRequest {
            vectors,
            namespace: &self.namespace,
        };
        let url = format!("{}/vectors/upsert", self.host);
        let resp = send_with_retry("Pinecone upsert", self.max_attempts, || {
            self.client.post(&url).json(&body)
        })?;
        let parsed: UpsertResponse = resp.json().context("failed to parse Pinecone upsert response")?;
        anyhow::ensure!(
            parsed.upserted_count == records.len(),
            "Pinecone acknowledged {} of {} vectors",
            parsed.upserted_count,
            records.len()
        );
        Ok(parsed.upserted_count)
    }
}

impl VectorIndex for PineconeIndex {
    fn upsert(&self, records: &[EmbeddedPassage]) -> Result<usize> {
        if let Some(bad) = records.iter().find(|r| r.embedding.len() != self.dimension) {
            anyhow::bail!(
                "vector for '{}' has {} dimensions; index expects {}",
                bad.passage.id,
                bad.embedding.len(),
                self.dimension
            );
        }
        let mut written = 0usize;
        for batch in records.chunks(MAX_UPSERT_BATCH) {
            written += self.upsert_batch(batch)?;
        }
        Ok(written)
    }

    fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<ScoredPassage>> {
        anyhow::ensure!(
            vector.len() == self.dimension,
            "query vector has {} dimensions; index expects {}",
            vector.len(),
            self.dimension
        );
        let body = QueryRequest {
            namespace: &self.namespace,
            vector,
            top_k: top_k.max(1),
            include_metadata: true,
            include_values: false,
        };
        let url = format!("{}/query", self.host);
        let resp = send_with_retry("Pinecone query", self.max_attempts, || {
            self.client.post(&url).json(&body)
        })?;
        let parsed: QueryResponse = resp.json().context("failed to parse Pinecone query response")?;
        Ok(parsed
            .matches
            .into_iter()
            .map(|m| {
                let metadata = m.metadata.unwrap_or_default();
                ScoredPassage {
                    id: m.id,
                    score: m.score,
                    text: metadata.text.unwrap_or_default(),
                    source: metadata.source,
                    chunk_index: metadata.chunk_index.map(|v| v as usize),
                }
            })
            .collect())
    }

    fn vector_count(&self) -> Result<usize> {
        let url = format!("{}/describe_index_stats", self.host);
        let resp = send_with_retry("Pinecone index stats", self.max_attempts, || {
            self.client.post(&url).json(&serde_json::json!({}))
        })?;
        let parsed: StatsResponse = resp.json().context("failed to parse Pinecone index stats")?;
        Ok(parsed
            .namespaces
            .get(&self.namespace)
            .map(|ns| ns.vector_count)
            .unwrap_or(0))
    }
}

#[derive(Debug, Deserialize)]
struct IndexList {
    #[serde(default)]
    indexes: Vec<IndexDescription>,
}

#[derive(Serialize)]
struct CreateIndexRequest<'a> {
    name: &'a str,
    dimension: usize,
    metric: &'a str,
    spec: CreateIndexSpec<'a>,
}

#[derive(Serialize)]
struct CreateIndexSpec<'a> {
    serverless: &'a ServerlessSpec,
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    vectors: Vec<UpsertVector<'a>>,
    namespace: &'a str,
}

#[derive(Serialize)]
struct UpsertVector<'a> {
    id: &'a str,
    values: &'a [f32],
    metadata: PassageMetadata<'a>,
}

#[derive(Serialize)]
struct PassageMetadata<'a> {
    text: &'a str,
    source: &'a str,
    chunk_index: usize,
    byte_start: usize,
    byte_end: usize,
    token_estimate: usize,
    checksum: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    #[serde(default)]
    upserted_count: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    namespace: &'a str,
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    include_values: bool,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Debug, Deserialize)]
struct QueryMatch {
    id: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: Option<MatchMetadata>,
}

// numeric metadata comes back as JSON floats
#[derive(Debug, Default, Deserialize)]
struct MatchMetadata {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    chunk_index: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct StatsResponse {
    #[serde(default)]
    namespaces: std::collections::HashMap<String, NamespaceStats>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NamespaceStats {
    #[serde(default)]
    vector_count: usize,
}
