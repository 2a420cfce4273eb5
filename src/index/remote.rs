//! Managed vector service backend (Pinecone-compatible REST API).
//!
//! Each vector is stored under its position as a decimal id, with the
//! document id and source as metadata, so query matches map straight back
//! onto docstore positions. Queries ask for that metadata back, and the
//! retriever rejects any match whose `doc_id` differs from the docstore
//! entry at its position (for example after a rebuild that failed
//! partway). The API key comes from `PINECONE_API_KEY`.
//!
//! | Operation | Endpoint |
//! |-----------|----------|
//! | stats | `POST {host}/describe_index_stats` |
//! | clear | `POST {host}/vectors/delete` (`deleteAll`) |
//! | write | `POST {host}/vectors/upsert` |
//! | search | `POST {host}/query` |

use async_trait::async_trait;
use tracing::{debug, info};

use super::{rank, Hit, VectorIndex};
use crate::config::IndexConfig;
use crate::error::{Result, RetrievalError};
use crate::http::{self, HttpError};
use crate::models::Document;

pub struct RemoteIndex {
    host: String,
    namespace: String,
    api_key: String,
    upsert_batch: usize,
    max_retries: u32,
    client: reqwest::Client,
    dims: usize,
    count: usize,
}

impl RemoteIndex {
    /// Validate credentials and build a client without touching the network.
    fn client_for(config: &IndexConfig, dims: usize) -> Result<Self> {
        let host = config
            .host
            .clone()
            .filter(|h| !h.trim().is_empty())
            .ok_or_else(|| {
                RetrievalError::Configuration("index.host required for the remote backend".into())
            })?;
        let api_key = std::env::var("PINECONE_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| RetrievalError::Configuration("PINECONE_API_KEY not set".into()))?;
        let client = http::client(config.timeout_secs).map_err(RetrievalError::Configuration)?;

        Ok(Self {
            host: host.trim_end_matches('/').to_string(),
            namespace: config.namespace.clone().unwrap_or_default(),
            api_key,
            upsert_batch: config.upsert_batch.max(1),
            max_retries: config.max_retries,
            client,
            dims,
            count: 0,
        })
    }

    /// Connect to an index populated by a previous ingestion run.
    ///
    /// An index holding no vectors is reported as
    /// [`RetrievalError::NotFound`]; a dimension different from `dims`
    /// (the query embedder's) as [`RetrievalError::Corruption`].
    pub async fn connect(config: &IndexConfig, dims: usize) -> Result<Self> {
        let mut index = Self::client_for(config, dims)?;
        let stats = index.post("describe_index_stats", &serde_json::json!({})).await?;

        let (remote_dims, count) = parse_stats(&stats, &index.namespace)?;
        if count == 0 {
            return Err(RetrievalError::NotFound {
                what: "remote vector index",
                location: index.host.clone(),
            });
        }
        if remote_dims != 0 && remote_dims != dims {
            return Err(RetrievalError::Corruption(format!(
                "remote index has dimension {}, embedder produces {}",
                remote_dims, dims
            )));
        }
        index.count = count;
        Ok(index)
    }

    /// Replace the index contents with `vectors`, aligned with `docs`.
    pub async fn rebuild(
        config: &IndexConfig,
        vectors: &[Vec<f32>],
        docs: &[Document],
    ) -> Result<Self> {
        if vectors.len() != docs.len() {
            return Err(RetrievalError::Corruption(format!(
                "{} vectors for {} documents",
                vectors.len(),
                docs.len()
            )));
        }
        let dims = vectors.first().map(|v| v.len()).unwrap_or(0);
        let mut index = Self::client_for(config, dims)?;

        let mut clear = serde_json::json!({ "deleteAll": true });
        if !index.namespace.is_empty() {
            clear["namespace"] = serde_json::json!(index.namespace);
        }
        match index.request("vectors/delete", &clear).await {
            Ok(_) => {}
            // A namespace that was never written answers 404.
            Err(e) if e.status == Some(404) => {
                debug!(namespace = %index.namespace, "nothing to clear before rebuild");
            }
            Err(e) => {
                return Err(RetrievalError::Remote(format!(
                    "could not clear index before rebuild: {}",
                    e
                )));
            }
        }

        let records: Vec<serde_json::Value> = vectors
            .iter()
            .zip(docs)
            .enumerate()
            .map(|(position, (values, doc))| {
                serde_json::json!({
                    "id": position.to_string(),
                    "values": values,
                    "metadata": { "doc_id": doc.id, "source": doc.source },
                })
            })
            .collect();

        for (i, batch) in records.chunks(index.upsert_batch).enumerate() {
            let mut body = serde_json::json!({ "vectors": batch });
            if !index.namespace.is_empty() {
                body["namespace"] = serde_json::json!(index.namespace);
            }
            index.post("vectors/upsert", &body).await?;
            info!(batch = i, size = batch.len(), "upserted vectors");
        }

        index.count = vectors.len();
        Ok(index)
    }

    async fn request(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> std::result::Result<serde_json::Value, HttpError> {
        let url = format!("{}/{}", self.host, path);
        http::post_json(
            &self.client,
            &url,
            &[("Api-Key", self.api_key.as_str())],
            body,
            self.max_retries,
        )
        .await
    }

    async fn post(&self, path: &str, body: &serde_json::Value) -> Result<serde_json::Value> {
        self.request(path, body)
            .await
            .map_err(|e| RetrievalError::Remote(e.to_string()))
    }
}

#[async_trait]
impl VectorIndex for RemoteIndex {
    fn backend(&self) -> &'static str {
        "remote"
    }

    fn len(&self) -> usize {
        self.count
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<Hit>> {
        if query.len() != self.dims {
            return Err(RetrievalError::InvalidQuery(format!(
                "query has dimension {}, index has {}",
                query.len(),
                self.dims
            )));
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut body = serde_json::json!({
            "vector": query,
            "topK": k,
            "includeValues": false,
            "includeMetadata": true,
        });
        if !self.namespace.is_empty() {
            body["namespace"] = serde_json::json!(self.namespace);
        }
        let json = self.post("query", &body).await?;
        Ok(rank(parse_matches(&json)?, k))
    }
}

/// Returns `(dimension, vector count)` for `namespace` (or the whole index
/// when `namespace` is empty).
fn parse_stats(json: &serde_json::Value, namespace: &str) -> Result<(usize, usize)> {
    let dims = json.get("dimension").and_then(|d| d.as_u64()).unwrap_or(0) as usize;
    let count = if namespace.is_empty() {
        json.get("totalVectorCount").and_then(|c| c.as_u64())
    } else {
        json.get("namespaces")
            .and_then(|n| n.get(namespace))
            .and_then(|n| n.get("vectorCount"))
            .and_then(|c| c.as_u64())
            .or(Some(0))
    }
    .ok_or_else(|| RetrievalError::Remote("index stats missing totalVectorCount".into()))?;
    Ok((dims, count as usize))
}

fn parse_matches(json: &serde_json::Value) -> Result<Vec<Hit>> {
    let matches = match json.get("matches").and_then(|m| m.as_array()) {
        Some(m) => m,
        None => return Ok(Vec::new()),
    };

    matches
        .iter()
        .map(|m| {
            let id = m.get("id").and_then(|i| i.as_str()).unwrap_or_default();
            let position = id.parse::<usize>().map_err(|_| {
                RetrievalError::Corruption(format!("remote match id '{}' is not a position", id))
            })?;
            let score = m.get("score").and_then(|s| s.as_f64()).unwrap_or(0.0) as f32;
            let doc_id = m
                .pointer("/metadata/doc_id")
                .and_then(|d| d.as_str())
                .map(str::to_string);
            Ok(Hit {
                position,
                score,
                doc_id,
            })
        })
        .collect()
}
