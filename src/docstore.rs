//! Persisted, position-aligned document list.
//!
//! The docstore is a pretty-printed JSON array of [`Document`] records.
//! Element `i` is the document whose embedding sits at position `i` of the
//! vector index. Saves go through [`crate::artifact`], so a concurrent
//! reader never observes a partially written file.

use sha2::{Digest, Sha256};
use std::path::Path;

use crate::artifact::{self, Staged};
use crate::error::{Result, RetrievalError};
use crate::models::Document;

pub struct DocStore;

impl DocStore {
    pub fn to_bytes(docs: &[Document]) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(docs)?)
    }

    /// Serialize `docs` to a temp file beside `path` without replacing it.
    pub fn stage(path: &Path, docs: &[Document]) -> Result<Staged> {
        artifact::stage(path, &Self::to_bytes(docs)?)
    }

    pub fn save(path: &Path, docs: &[Document]) -> Result<()> {
        artifact::write_atomic(path, &Self::to_bytes(docs)?)
    }

    /// Load the ordered document list.
    ///
    /// An absent file is [`RetrievalError::NotFound`]; a present file that
    /// does not parse is [`RetrievalError::Corruption`]. `[]` loads as an
    /// empty list.
    pub fn load(path: &Path) -> Result<Vec<Document>> {
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RetrievalError::not_found("docstore", path));
            }
            Err(e) => return Err(RetrievalError::io(path, e)),
        };
        serde_json::from_slice(&bytes).map_err(|e| {
            RetrievalError::Corruption(format!("docstore {}: {}", path.display(), e))
        })
    }

    pub fn exists(path: &Path) -> bool {
        path.is_file()
    }

    /// SHA-256 over the ordered document ids.
    ///
    /// The local index records this at build time, so a docstore that was
    /// reordered or swapped for another run's is caught even when the
    /// lengths still agree.
    pub fn fingerprint(docs: &[Document]) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update((docs.len() as u64).to_le_bytes());
        for doc in docs {
            hasher.update((doc.id.len() as u64).to_le_bytes());
            hasher.update(doc.id.as_bytes());
        }
        hasher.finalize().into()
    }
}
