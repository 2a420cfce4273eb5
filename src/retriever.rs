//! Query-time retrieval.
//!
//! A [`Retriever`] owns the three pieces ingestion produced (the vector
//! index, the docstore, and an embedder matching the one used to build
//! them) and turns a free-text query into ranked [`RetrievalResult`]s:
//!
//! 1. embed the query and L2-normalize it
//! 2. search the index for the `top_k` nearest positions
//! 3. join each position against the docstore
//! 4. build a result with a whitespace-collapsed preview
//!
//! Construction validates that the index and docstore agree in length and
//! order and that the index dimension matches the embedder, so a model
//! change since the last ingestion is reported up front instead of
//! producing meaningless scores. A backend that cannot vouch for order up
//! front tags each hit with its document id, and a hit whose id disagrees
//! with the docstore fails the search as corruption.
//!
//! Building a retriever is expensive (it may load a model), so long-lived
//! callers hold a [`SharedRetriever`], which constructs one on first use
//! and hands out the same instance afterwards.

use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::config::Config;
use crate::docstore::DocStore;
use crate::embedding::{create_embedder, normalize_l2, Embedder};
use crate::error::{Result, RetrievalError};
use crate::index::{FlatIndex, RemoteIndex, VectorIndex};
use crate::models::{make_preview, Document, RetrievalResult};

pub struct Retriever {
    index: Box<dyn VectorIndex>,
    docs: Vec<Document>,
    embedder: Box<dyn Embedder>,
}

impl Retriever {
    /// Load the artifacts named in `config` and the configured embedder.
    ///
    /// # Errors
    ///
    /// - [`RetrievalError::NotFound`] if ingestion has never run
    /// - [`RetrievalError::Corruption`] if the artifacts disagree with each
    ///   other or with the embedder
    /// - [`RetrievalError::Configuration`] for missing credentials
    pub async fn open(config: &Config) -> Result<Self> {
        let docstore_path = config.artifacts.docstore_path();
        if !DocStore::exists(&docstore_path) {
            return Err(RetrievalError::not_found("docstore", &docstore_path));
        }
        let index_path = config.artifacts.index_path();
        if !config.index.is_remote() && !index_path.is_file() {
            return Err(RetrievalError::not_found("vector index", &index_path));
        }

        let docs = DocStore::load(&docstore_path)?;
        let embedder = create_embedder(&config.embedding).await?;

        let index: Box<dyn VectorIndex> = if config.index.is_remote() {
            Box::new(RemoteIndex::connect(&config.index, embedder.dims()).await?)
        } else {
            Box::new(FlatIndex::load(&index_path)?)
        };

        let retriever = Self::from_parts(index, docs, embedder)?;
        info!(
            backend = retriever.index.backend(),
            documents = retriever.docs.len(),
            model = retriever.embedder.model_name(),
            "retriever ready"
        );
        Ok(retriever)
    }

    /// Assemble a retriever from components that are already loaded.
    ///
    /// The index and docstore lengths must match, and the index must accept
    /// the docstore's order ([`VectorIndex::verify_docs`]). For the remote
    /// backend the stored count is eventually consistent, so only a count
    /// larger than the docstore is rejected there.
    pub fn from_parts(
        index: Box<dyn VectorIndex>,
        docs: Vec<Document>,
        embedder: Box<dyn Embedder>,
    ) -> Result<Self> {
        let aligned = if index.backend() == "remote" {
            index.len() <= docs.len()
        } else {
            index.len() == docs.len()
        };
        if !aligned {
            return Err(RetrievalError::Corruption(format!(
                "vector index has {} entries but docstore has {}. Re-run `cra ingest`",
                index.len(),
                docs.len()
            )));
        }
        index.verify_docs(&docs)?;
        if index.dims() != embedder.dims() && !index.is_empty() {
            return Err(RetrievalError::Corruption(format!(
                "vector index has dimension {} but embedder '{}' produces {}. \
                 The model changed since ingestion; re-run `cra ingest`",
                index.dims(),
                embedder.model_name(),
                embedder.dims()
            )));
        }
        Ok(Self {
            index,
            docs,
            embedder,
        })
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn backend(&self) -> &'static str {
        self.index.backend()
    }

    /// Return up to `top_k` documents most similar to `query`, best first.
    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<RetrievalResult>> {
        if top_k == 0 {
            return Err(RetrievalError::InvalidQuery(
                "top_k must be at least 1".into(),
            ));
        }

        let query_vec = normalize_l2(self.embedder.embed_query(query).await?);
        let hits = self.index.search(&query_vec, top_k).await?;
        debug!(query, hits = hits.len(), "index search");

        hits.into_iter()
            .map(|hit| {
                let doc = self.docs.get(hit.position).ok_or_else(|| {
                    RetrievalError::Corruption(format!(
                        "index returned position {} but docstore has {} documents",
                        hit.position,
                        self.docs.len()
                    ))
                })?;
                if let Some(id) = hit.doc_id.as_deref() {
                    if id != doc.id {
                        return Err(RetrievalError::Corruption(format!(
                            "index position {} holds '{}' but docstore has '{}'. \
                             Re-run `cra ingest`",
                            hit.position, id, doc.id
                        )));
                    }
                }
                Ok(RetrievalResult {
                    source: doc.source.clone(),
                    preview: make_preview(&doc.text),
                    score: hit.score,
                    text: doc.text.clone(),
                })
            })
            .collect()
    }
}

/// Lazily constructed, process-wide retriever handle.
///
/// Clone the `Arc<SharedRetriever>` into every call site. The first
/// successful [`get`](SharedRetriever::get) builds the retriever; a failed
/// attempt leaves the cell empty so a later call (for example after
/// `cra ingest` has run) can try again.
pub struct SharedRetriever {
    config: Arc<Config>,
    cell: OnceCell<Arc<Retriever>>,
}

impl SharedRetriever {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            cell: OnceCell::new(),
        }
    }

    /// Wrap a retriever that is already built.
    pub fn from_retriever(config: Arc<Config>, retriever: Retriever) -> Self {
        Self {
            config,
            cell: OnceCell::new_with(Some(Arc::new(retriever))),
        }
    }

    pub async fn get(&self) -> Result<Arc<Retriever>> {
        self.cell
            .get_or_try_init(|| async { Retriever::open(&self.config).await.map(Arc::new) })
            .await
            .cloned()
    }

    pub fn is_ready(&self) -> bool {
        self.cell.initialized()
    }
}
