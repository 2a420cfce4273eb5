//! In-process sentence embeddings via fastembed.
//!
//! Models are downloaded on first use from Hugging Face and cached. After
//! that no network calls are needed. The model is loaded once per
//! [`LocalEmbedder`] and shared across calls behind a mutex; inference runs
//! on the blocking thread pool.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use super::Embedder;
use crate::config::EmbeddingConfig;
use crate::error::{Result, RetrievalError};

const DEFAULT_MODEL: &str = "all-minilm-l6-v2";

pub struct LocalEmbedder {
    model_name: String,
    dims: usize,
    batch_size: usize,
    model: Arc<Mutex<fastembed::TextEmbedding>>,
}

impl LocalEmbedder {
    /// Resolve the configured model and load it.
    pub async fn load(config: &EmbeddingConfig) -> Result<Self> {
        let model_name = canonical_model_name(config.model.as_deref().unwrap_or(DEFAULT_MODEL));
        let fastembed_model = config_to_fastembed_model(&model_name)?;
        let dims = config.dims.unwrap_or_else(|| default_dims(&model_name));

        let model = tokio::task::spawn_blocking(move || {
            fastembed::TextEmbedding::try_new(
                fastembed::InitOptions::new(fastembed_model).with_show_download_progress(true),
            )
        })
        .await
        .map_err(|e| RetrievalError::Configuration(format!("model loader panicked: {}", e)))?
        .map_err(|e| {
            RetrievalError::Configuration(format!(
                "failed to initialize local embedding model '{}': {}",
                model_name, e
            ))
        })?;

        tracing::info!(model = %model_name, dims, "loaded local embedding model");

        Ok(Self {
            model_name,
            dims,
            batch_size: config.batch_size,
            model: Arc::new(Mutex::new(model)),
        })
    }
}

#[async_trait]
impl Embedder for LocalEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let model = Arc::clone(&self.model);
        let batch_size = self.batch_size;
        let texts = texts.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut guard = model
                .lock()
                .map_err(|_| RetrievalError::Embedding("embedding model lock poisoned".into()))?;
            guard
                .embed(texts, Some(batch_size))
                .map_err(|e| RetrievalError::Embedding(format!("local embedding failed: {}", e)))
        })
        .await
        .map_err(|e| RetrievalError::Embedding(format!("embedding task panicked: {}", e)))?
    }
}

/// Accept Hugging Face repo ids (`sentence-transformers/all-MiniLM-L6-v2`)
/// as well as the short names used in config files.
fn canonical_model_name(name: &str) -> String {
    let short = name.rsplit('/').next().unwrap_or(name);
    short.to_lowercase()
}

fn default_dims(model_name: &str) -> usize {
    match model_name {
        "all-minilm-l6-v2" => 384,
        "bge-small-en-v1.5" => 384,
        "bge-base-en-v1.5" => 768,
        "bge-large-en-v1.5" => 1024,
        "nomic-embed-text-v1" | "nomic-embed-text-v1.5" => 768,
        "multilingual-e5-small" => 384,
        "multilingual-e5-base" => 768,
        "multilingual-e5-large" => 1024,
        _ => 384,
    }
}

fn config_to_fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
        "nomic-embed-text-v1" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV1),
        "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
        "multilingual-e5-small" => Ok(fastembed::EmbeddingModel::MultilingualE5Small),
        "multilingual-e5-base" => Ok(fastembed::EmbeddingModel::MultilingualE5Base),
        "multilingual-e5-large" => Ok(fastembed::EmbeddingModel::MultilingualE5Large),
        other => Err(RetrievalError::Configuration(format!(
            "unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
             nomic-embed-text-v1, nomic-embed-text-v1.5, \
             multilingual-e5-small, multilingual-e5-base, multilingual-e5-large",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repo_id_maps_to_short_name() {
        assert_eq!(
            canonical_model_name("sentence-transformers/all-MiniLM-L6-v2"),
            "all-minilm-l6-v2"
        );
        assert_eq!(canonical_model_name("bge-base-en-v1.5"), "bge-base-en-v1.5");
    }

    #[test]
    fn test_unknown_model_rejected() {
        assert!(config_to_fastembed_model("gpt-embed-9000").is_err());
        assert_eq!(default_dims("bge-large-en-v1.5"), 1024);
    }
}
