//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait is the only thing the retriever knows about
//! vector storage. Two backends implement it:
//!
//! | Backend | Type | Storage |
//! |---------|------|---------|
//! | `local` | [`FlatIndex`] | binary file under `artifacts/`, exact in-process search |
//! | `remote` | [`RemoteIndex`] | managed nearest-neighbour service over HTTPS |
//!
//! Positions are the contract between an index and the docstore: the
//! vector at position `i` was embedded from `docstore[i].text`. Each
//! backend can also say which documents it was built for, so the retriever
//! refuses a docstore from a different run instead of joining positions
//! against the wrong documents.

mod flat;
mod remote;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::Document;

pub use flat::FlatIndex;
pub use remote::RemoteIndex;

/// A single nearest-neighbour match.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    /// Position of the vector, i.e. its index into the docstore.
    pub position: usize,
    /// Cosine similarity to the query.
    pub score: f32,
    /// Id of the document the vector was stored for, when the backend
    /// keeps it alongside the vector.
    pub doc_id: Option<String>,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Short backend name for logs (`"flat"`, `"remote"`).
    fn backend(&self) -> &'static str;

    /// Number of indexed vectors.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Vector dimensionality.
    fn dims(&self) -> usize;

    /// Check that the index was built for exactly `docs`, in this order.
    ///
    /// Backends that cannot tell up front return `Ok` and report
    /// [`Hit::doc_id`] instead, which the retriever checks per hit.
    fn verify_docs(&self, _docs: &[Document]) -> Result<()> {
        Ok(())
    }

    /// Return up to `k` nearest neighbours of `query`, by descending score
    /// with ties broken by ascending position. Never mutates the index.
    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<Hit>>;
}

/// Order hits by descending score, then ascending position, and keep `k`.
pub(crate) fn rank(mut hits: Vec<Hit>, k: usize) -> Vec<Hit> {
    hits.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then(a.position.cmp(&b.position))
    });
    hits.truncate(k);
    hits
}
