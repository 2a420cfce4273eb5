//! Network embedding providers: OpenAI and Ollama.

use async_trait::async_trait;

use super::Embedder;
use crate::config::EmbeddingConfig;
use crate::error::{Result, RetrievalError};
use crate::http;

const OPENAI_EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";
const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

// ============ OpenAI ============

/// Embedding provider using the OpenAI API.
///
/// Calls `POST /v1/embeddings` with the configured model. Requires the
/// `OPENAI_API_KEY` environment variable at construction time.
pub struct OpenAIEmbedder {
    model: String,
    dims: usize,
    api_key: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAIEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config.model.clone().ok_or_else(|| {
            RetrievalError::Configuration("embedding.model required for OpenAI provider".into())
        })?;
        let dims = config.dims.ok_or_else(|| {
            RetrievalError::Configuration("embedding.dims required for OpenAI provider".into())
        })?;
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            RetrievalError::Configuration("OPENAI_API_KEY environment variable not set".into())
        })?;
        let client = http::client(config.timeout_secs).map_err(RetrievalError::Configuration)?;

        Ok(Self {
            model,
            dims,
            api_key,
            max_retries: config.max_retries,
            client,
        })
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let auth = format!("Bearer {}", self.api_key);
        let json = http::post_json(
            &self.client,
            OPENAI_EMBEDDINGS_URL,
            &[("Authorization", auth.as_str())],
            &body,
            self.max_retries,
        )
        .await
        .map_err(|e| RetrievalError::Embedding(e.to_string()))?;

        parse_openai_response(&json)
    }
}

/// Extract `data[].embedding`, ordered by each item's `index`.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| RetrievalError::Embedding("OpenAI response missing data array".into()))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (pos, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(pos);
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| RetrievalError::Embedding("OpenAI response missing embedding".into()))?;
        indexed.push((index, json_floats(embedding)?));
    }

    indexed.sort_by_key(|(i, _)| *i);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Ollama ============

/// Embedding provider using a local Ollama instance.
///
/// Calls `POST /api/embed` on the configured URL (default `http://localhost:11434`).
pub struct OllamaEmbedder {
    model: String,
    dims: usize,
    url: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config.model.clone().ok_or_else(|| {
            RetrievalError::Configuration("embedding.model required for Ollama provider".into())
        })?;
        let dims = config.dims.ok_or_else(|| {
            RetrievalError::Configuration("embedding.dims required for Ollama provider".into())
        })?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());
        let client = http::client(config.timeout_secs).map_err(RetrievalError::Configuration)?;

        Ok(Self {
            model,
            dims,
            url,
            max_retries: config.max_retries,
            client,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let endpoint = format!("{}/api/embed", self.url.trim_end_matches('/'));
        let json = http::post_json(&self.client, &endpoint, &[], &body, self.max_retries)
            .await
            .map_err(|e| {
                RetrievalError::Embedding(format!("{} (is Ollama running at {}?)", e, self.url))
            })?;

        parse_ollama_response(&json)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| {
            RetrievalError::Embedding("Ollama response missing embeddings array".into())
        })?;

    embeddings
        .iter()
        .map(|e| {
            let arr = e.as_array().ok_or_else(|| {
                RetrievalError::Embedding("Ollama embedding is not an array".into())
            })?;
            json_floats(arr)
        })
        .collect()
}

fn json_floats(values: &[serde_json::Value]) -> Result<Vec<f32>> {
    values
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| RetrievalError::Embedding("non-numeric embedding value".into()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_response_reordered_by_index() {
        let json = serde_json::json!({
            "data": [
                {"index": 1, "embedding": [0.0, 1.0]},
                {"index": 0, "embedding": [1.0, 0.0]}
            ]
        });
        let vectors = parse_openai_response(&json).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_openai_response_missing_data() {
        let json = serde_json::json!({"error": "nope"});
        assert!(parse_openai_response(&json).is_err());
    }

    #[test]
    fn test_ollama_response() {
        let json = serde_json::json!({"embeddings": [[0.5, 0.25], [1.0, 2.0]]});
        let vectors = parse_ollama_response(&json).unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[1], vec![1.0, 2.0]);
    }

    #[test]
    fn test_ollama_rejects_non_numeric() {
        let json = serde_json::json!({"embeddings": [["a"]]});
        assert!(parse_ollama_response(&json).is_err());
    }

    #[test]
    fn test_ollama_requires_model() {
        let config = EmbeddingConfig {
            provider: "ollama".into(),
            dims: Some(768),
            ..Default::default()
        };
        assert!(matches!(
            OllamaEmbedder::new(&config),
            Err(RetrievalError::Configuration(_))
        ));
    }
}
