//! Exact in-process vector index.
//!
//! Vectors are stored row-major in one contiguous `Vec<f32>` and searched by
//! brute-force inner product, which equals cosine similarity because every
//! stored vector and query is unit-normalized upstream.
//!
//! # Artifact format
//!
//! ```text
//! offset  size            field
//! 0       4               magic  b"CRVI"
//! 4       4               version (u32 LE, currently 2)
//! 8       4               dims    (u32 LE)
//! 12      8               count   (u64 LE)
//! 20      32              docs    (SHA-256 of the ordered document ids)
//! 52      count*dims*4    vectors (f32 LE, row-major)
//! ```
//!
//! Version 1 files carried no document fingerprint and are rejected; a
//! fresh `cra ingest` rewrites them.

use async_trait::async_trait;
use std::path::Path;

use super::{rank, Hit, VectorIndex};
use crate::artifact::{self, Staged};
use crate::docstore::DocStore;
use crate::error::{Result, RetrievalError};
use crate::models::Document;

const MAGIC: &[u8; 4] = b"CRVI";
const VERSION: u32 = 2;
const FINGERPRINT_LEN: usize = 32;
const HEADER_LEN: usize = 20 + FINGERPRINT_LEN;

#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    dims: usize,
    count: usize,
    docs_fingerprint: [u8; FINGERPRINT_LEN],
    data: Vec<f32>,
}

impl FlatIndex {
    /// Build an index over exactly `vectors`, assigning positions `0..n-1`
    /// in input order. `vectors[i]` must be the embedding of `docs[i]`, and
    /// all vectors must share one dimension.
    pub fn build(vectors: &[Vec<f32>], docs: &[Document]) -> Result<Self> {
        if vectors.len() != docs.len() {
            return Err(RetrievalError::Corruption(format!(
                "{} vectors for {} documents",
                vectors.len(),
                docs.len()
            )));
        }
        let dims = vectors.first().map(|v| v.len()).unwrap_or(0);
        let mut data = Vec::with_capacity(vectors.len() * dims);
        for (i, v) in vectors.iter().enumerate() {
            if v.len() != dims {
                return Err(RetrievalError::Embedding(format!(
                    "vector {} has dimension {}, expected {}",
                    i,
                    v.len(),
                    dims
                )));
            }
            data.extend_from_slice(v);
        }
        Ok(Self {
            dims,
            count: vectors.len(),
            docs_fingerprint: DocStore::fingerprint(docs),
            data,
        })
    }

    /// The vector stored at `position`.
    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        if position >= self.count {
            return None;
        }
        let start = position * self.dims;
        Some(&self.data[start..start + self.dims])
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_LEN + self.data.len() * 4);
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&VERSION.to_le_bytes());
        bytes.extend_from_slice(&(self.dims as u32).to_le_bytes());
        bytes.extend_from_slice(&(self.count as u64).to_le_bytes());
        bytes.extend_from_slice(&self.docs_fingerprint);
        bytes.extend_from_slice(&vec_to_blob(&self.data));
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(RetrievalError::Corruption(format!(
                "vector index is {} bytes, shorter than its header",
                bytes.len()
            )));
        }
        if &bytes[0..4] != MAGIC {
            return Err(RetrievalError::Corruption(
                "vector index has an unknown file signature".into(),
            ));
        }
        let version = u32::from_le_bytes(le_array(&bytes[4..8]));
        if version != VERSION {
            return Err(RetrievalError::Corruption(format!(
                "unsupported vector index version {} (expected {}). Re-run `cra ingest`",
                version, VERSION
            )));
        }
        let dims = u32::from_le_bytes(le_array(&bytes[8..12])) as usize;
        let count = u64::from_le_bytes(le_array(&bytes[12..20])) as usize;
        let docs_fingerprint = le_array(&bytes[20..HEADER_LEN]);

        let expected = count
            .checked_mul(dims)
            .and_then(|n| n.checked_mul(4))
            .and_then(|n| n.checked_add(HEADER_LEN));
        if expected != Some(bytes.len()) {
            return Err(RetrievalError::Corruption(format!(
                "vector index declares {} vectors of dimension {} but holds {} bytes",
                count,
                dims,
                bytes.len()
            )));
        }

        Ok(Self {
            dims,
            count,
            docs_fingerprint,
            data: blob_to_vec(&bytes[HEADER_LEN..]),
        })
    }

    /// Write the index to a temp file beside `path`; see [`artifact::stage`].
    pub fn stage(&self, path: &Path) -> Result<Staged> {
        artifact::stage(path, &self.to_bytes())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        artifact::write_atomic(path, &self.to_bytes())
    }

    /// Fails with [`RetrievalError::NotFound`] if no index was ever saved.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RetrievalError::not_found("vector index", path));
            }
            Err(e) => return Err(RetrievalError::io(path, e)),
        };
        Self::from_bytes(&bytes)
    }

    fn search_exact(&self, query: &[f32], k: usize) -> Result<Vec<Hit>> {
        if query.len() != self.dims {
            return Err(RetrievalError::InvalidQuery(format!(
                "query has dimension {}, index has {}",
                query.len(),
                self.dims
            )));
        }
        if k == 0 || self.count == 0 {
            return Ok(Vec::new());
        }

        let hits = self
            .data
            .chunks_exact(self.dims.max(1))
            .take(self.count)
            .enumerate()
            .map(|(position, row)| Hit {
                position,
                score: dot(query, row),
                doc_id: None,
            })
            .collect();
        Ok(rank(hits, k))
    }
}

#[async_trait]
impl VectorIndex for FlatIndex {
    fn backend(&self) -> &'static str {
        "flat"
    }

    fn len(&self) -> usize {
        self.count
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn verify_docs(&self, docs: &[Document]) -> Result<()> {
        if DocStore::fingerprint(docs) != self.docs_fingerprint {
            return Err(RetrievalError::Corruption(
                "vector index was built for a different document list or order. \
                 Re-run `cra ingest`"
                    .into(),
            ));
        }
        Ok(())
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<Hit>> {
        self.search_exact(query, k)
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn le_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}

/// Encode floats as little-endian bytes.
fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Reverses [`vec_to_blob`].
fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn docs(n: usize) -> Vec<Document> {
        (0..n)
            .map(|i| Document {
                id: format!("policies/{}.txt", i),
                source: format!("policies/{}.txt", i),
                text: format!("policy {}", i),
            })
            .collect()
    }

    fn sample() -> FlatIndex {
        FlatIndex::build(
            &[
                vec![1.0, 0.0, 0.0],
                vec![0.0, 1.0, 0.0],
                vec![0.6, 0.8, 0.0],
            ],
            &docs(3),
        )
        .unwrap()
    }

    #[test]
    fn test_build_assigns_input_positions() {
        let index = sample();
        assert_eq!(index.len(), 3);
        assert_eq!(index.dims(), 3);
        assert_eq!(index.vector(2), Some(&[0.6f32, 0.8, 0.0][..]));
        assert_eq!(index.vector(3), None);
    }

    #[test]
    fn test_build_rejects_ragged() {
        assert!(FlatIndex::build(&[vec![1.0, 0.0], vec![1.0]], &docs(2)).is_err());
    }

    #[test]
    fn test_build_rejects_count_mismatch() {
        assert!(matches!(
            FlatIndex::build(&[vec![1.0, 0.0]], &docs(2)),
            Err(RetrievalError::Corruption(_))
        ));
    }

    #[test]
    fn test_verify_docs_detects_reorder() {
        let index = sample();
        let mut reordered = docs(3);
        assert!(index.verify_docs(&reordered).is_ok());

        reordered.swap(0, 2);
        assert!(matches!(
            index.verify_docs(&reordered),
            Err(RetrievalError::Corruption(_))
        ));
    }

    #[test]
    fn test_fingerprint_survives_save_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("vector_index.bin");
        sample().save(&path).unwrap();

        let loaded = FlatIndex::load(&path).unwrap();
        assert!(loaded.verify_docs(&docs(3)).is_ok());
        assert!(loaded.verify_docs(&docs(2)).is_err());
    }

    #[test]
    fn test_old_version_is_corruption() {
        let mut bytes = sample().to_bytes();
        bytes[4..8].copy_from_slice(&1u32.to_le_bytes());
        let err = FlatIndex::from_bytes(&bytes).unwrap_err();
        assert!(err.to_string().contains("cra ingest"));
    }

    #[tokio::test]
    async fn test_search_orders_by_score() {
        let index = sample();
        let hits = index.search(&[1.0, 0.0, 0.0], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].position, 0);
        assert_eq!(hits[1].position, 2);
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn test_k_larger_than_index_returns_all() {
        let hits = sample().search(&[0.0, 1.0, 0.0], 10).await.unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].position, 1);
    }

    #[tokio::test]
    async fn test_ties_broken_by_position() {
        let index = FlatIndex::build(
            &[vec![0.0, 1.0], vec![1.0, 0.0], vec![1.0, 0.0]],
            &docs(3),
        )
        .unwrap();
        let hits = index.search(&[1.0, 0.0], 3).await.unwrap();
        let positions: Vec<usize> = hits.iter().map(|h| h.position).collect();
        assert_eq!(positions, vec![1, 2, 0]);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected() {
        let err = sample().search(&[1.0, 0.0], 1).await.unwrap_err();
        assert!(matches!(err, RetrievalError::InvalidQuery(_)));
    }

    #[tokio::test]
    async fn test_save_load_is_search_equivalent() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("vector_index.bin");
        let index = sample();
        index.save(&path).unwrap();

        let loaded = FlatIndex::load(&path).unwrap();
        assert_eq!(loaded, index);
        let q = [0.6, 0.8, 0.0];
        assert_eq!(
            loaded.search(&q, 3).await.unwrap(),
            index.search(&q, 3).await.unwrap()
        );
    }

    #[test]
    fn test_load_missing_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let err = FlatIndex::load(&tmp.path().join("absent.bin")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_truncated_artifact_is_corruption() {
        let mut bytes = sample().to_bytes();
        bytes.truncate(bytes.len() - 3);
        assert!(matches!(
            FlatIndex::from_bytes(&bytes),
            Err(RetrievalError::Corruption(_))
        ));
    }

    #[test]
    fn test_bad_magic_is_corruption() {
        let mut bytes = sample().to_bytes();
        bytes[0] = b'X';
        assert!(matches!(
            FlatIndex::from_bytes(&bytes),
            Err(RetrievalError::Corruption(_))
        ));
    }

    #[test]
    fn test_blob_roundtrip() {
        let v = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        assert_eq!(blob_to_vec(&vec_to_blob(&v)), v);
    }
}
