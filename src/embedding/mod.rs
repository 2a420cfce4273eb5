//! Embedding provider abstraction and implementations.
//!
//! Defines the [`Embedder`] trait and concrete implementations:
//! - **`LocalEmbedder`**: runs a sentence-embedding model in-process via fastembed; no network calls after model download.
//! - **[`OpenAIEmbedder`]**: calls the OpenAI embeddings API with batching, retry, and backoff.
//! - **[`OllamaEmbedder`]**: calls a local Ollama instance's `/api/embed` endpoint.
//! - **[`HashEmbedder`]**: deterministic feature hashing; offline and dependency-free.
//!
//! Embedders may return un-normalized vectors. The pipeline applies
//! [`normalize_l2`] to document and query vectors alike, so similarity
//! scores are comparable.
//!
//! # Provider Selection
//!
//! Use [`create_embedder`] to instantiate the appropriate provider based
//! on the configuration:
//!
//! ```rust,no_run
//! # use credit_risk_analyzer::config::EmbeddingConfig;
//! # use credit_risk_analyzer::embedding::create_embedder;
//! # async fn example() -> credit_risk_analyzer::error::Result<()> {
//! let config = EmbeddingConfig { provider: "hash".into(), ..Default::default() };
//! let embedder = create_embedder(&config).await?;
//! assert_eq!(embedder.model_name(), "feature-hash");
//! # Ok(())
//! # }
//! ```

mod hash;
#[cfg(feature = "local-embeddings")]
mod local;
mod remote;

use async_trait::async_trait;
use tracing::debug;

use crate::config::EmbeddingConfig;
use crate::error::{Result, RetrievalError};

pub use hash::HashEmbedder;
#[cfg(feature = "local-embeddings")]
pub use local::LocalEmbedder;
pub use remote::{OllamaEmbedder, OpenAIEmbedder};

/// Maps text to fixed-dimension dense vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"all-minilm-l6-v2"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `384`).
    fn dims(&self) -> usize;

    /// Embed `texts`, returning one vector per input in the same order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query text.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed(&[text.to_string()]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| RetrievalError::Embedding("empty embedding response".into()))
    }
}

/// Create the [`Embedder`] named by `config.provider`.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"local"` | `LocalEmbedder` (requires the `local-embeddings` feature) |
/// | `"openai"` | [`OpenAIEmbedder`] |
/// | `"ollama"` | [`OllamaEmbedder`] |
/// | `"hash"` | [`HashEmbedder`] |
///
/// Loading a local model can take seconds (and downloads it on first use),
/// so callers should construct one embedder and reuse it.
///
/// # Errors
///
/// [`RetrievalError::Configuration`] for unknown providers, missing
/// credentials, or a model that cannot be loaded.
pub async fn create_embedder(config: &EmbeddingConfig) -> Result<Box<dyn Embedder>> {
    match config.provider.as_str() {
        "hash" => Ok(Box::new(HashEmbedder::new(
            config.dims.unwrap_or(hash::DEFAULT_DIMS),
        ))),
        "openai" => Ok(Box::new(OpenAIEmbedder::new(config)?)),
        "ollama" => Ok(Box::new(OllamaEmbedder::new(config)?)),
        #[cfg(feature = "local-embeddings")]
        "local" => Ok(Box::new(LocalEmbedder::load(config).await?)),
        #[cfg(not(feature = "local-embeddings"))]
        "local" => Err(RetrievalError::Configuration(
            "local embedding provider requires --features local-embeddings".into(),
        )),
        other => Err(RetrievalError::Configuration(format!(
            "unknown embedding provider: {}",
            other
        ))),
    }
}

/// Embed `texts` in fixed-size batches and check the provider's output.
///
/// The result is identical to a single `embed` call; batching only bounds
/// memory and request size.
pub async fn embed_batched(
    embedder: &dyn Embedder,
    texts: &[String],
    batch_size: usize,
) -> Result<Vec<Vec<f32>>> {
    let batch_size = batch_size.max(1);
    let mut vectors = Vec::with_capacity(texts.len());

    for (i, batch) in texts.chunks(batch_size).enumerate() {
        let embedded = embedder.embed(batch).await?;
        if embedded.len() != batch.len() {
            return Err(RetrievalError::Embedding(format!(
                "batch {} returned {} vectors for {} texts",
                i,
                embedded.len(),
                batch.len()
            )));
        }
        debug!(batch = i, size = batch.len(), "embedded batch");
        vectors.extend(embedded);
    }

    check_dims(&vectors, embedder.dims())?;
    Ok(vectors)
}

/// Every vector must have exactly `dims` components.
pub fn check_dims(vectors: &[Vec<f32>], dims: usize) -> Result<()> {
    if let Some((i, v)) = vectors.iter().enumerate().find(|(_, v)| v.len() != dims) {
        return Err(RetrievalError::Embedding(format!(
            "vector {} has dimension {}, expected {}",
            i,
            v.len(),
            dims
        )));
    }
    Ok(())
}

/// Scale `v` to unit L2 length. Zero vectors are returned unchanged.
pub fn normalize_l2(mut v: Vec<f32>) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 1e-12 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}
