//! Feature-hashing embedder.
//!
//! Lower-cases the text, splits it into alphanumeric tokens, and adds a
//! signed count for each token to the bucket chosen by its SHA-256 digest.
//! No model, no network: useful on air-gapped machines and in tests. It
//! captures lexical overlap only, not meaning.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::Embedder;
use crate::error::Result;

pub(super) const DEFAULT_DIMS: usize = 256;

pub struct HashEmbedder {
    dims: usize,
}

impl HashEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        let lowered = text.to_lowercase();
        for token in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let digest = Sha256::digest(token.as_bytes());
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dims as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            v[bucket] += sign;
        }
        v
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        "feature-hash"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic() {
        let e = HashEmbedder::new(128);
        assert_eq!(e.embed_one("Verify income"), e.embed_one("Verify income"));
    }

    #[test]
    fn test_case_and_punctuation_insensitive() {
        let e = HashEmbedder::new(128);
        assert_eq!(e.embed_one("Income, verified!"), e.embed_one("income verified"));
    }

    #[test]
    fn test_empty_text_is_zero() {
        let e = HashEmbedder::new(16);
        assert!(e.embed_one("   ").iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_zero_dims_clamped() {
        let e = HashEmbedder::new(0);
        assert_eq!(e.dims(), 1);
    }
}
