//! Ingestion pipeline orchestration.
//!
//! Rebuilds both artifacts from scratch: corpus → embedding →
//! normalization → vector index + docstore. There is no incremental mode;
//! every run replaces the previous snapshot wholesale.
//!
//! Nothing is written unless the whole pipeline succeeds. With the local
//! backend both artifacts are staged to temp files first and only renamed
//! into place once both are fully on disk. The two renames are separate
//! steps, so the index also records a fingerprint of the document order;
//! if the second rename fails, the next `open` reports the mismatch.
//!
//! The remote backend is cleared and rewritten before the docstore is
//! saved. A rebuild that fails partway leaves vectors tagged with the new
//! document ids next to the old docstore, which the retriever detects.

use std::path::PathBuf;
use tracing::info;

use crate::config::Config;
use crate::corpus::load_corpus;
use crate::docstore::DocStore;
use crate::embedding::{create_embedder, embed_batched, normalize_l2, Embedder};
use crate::error::{Result, RetrievalError};
use crate::index::{FlatIndex, RemoteIndex, VectorIndex};

/// Summary of a completed ingestion run.
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub documents: usize,
    pub dims: usize,
    pub model: String,
    pub backend: &'static str,
    /// `None` for the remote backend.
    pub index_path: Option<PathBuf>,
    pub docstore_path: PathBuf,
}

/// Run ingestion with the embedder named in `config.embedding`.
pub async fn run_ingest(config: &Config) -> Result<IngestReport> {
    let embedder = create_embedder(&config.embedding).await?;
    ingest_with(config, embedder.as_ref()).await
}

/// Run ingestion with an already constructed embedder.
pub async fn ingest_with(config: &Config, embedder: &dyn Embedder) -> Result<IngestReport> {
    let docs = load_corpus(&config.corpus)?;
    info!(documents = docs.len(), "loaded corpus");

    let texts: Vec<String> = docs.iter().map(|d| d.text.clone()).collect();
    let vectors: Vec<Vec<f32>> = embed_batched(embedder, &texts, config.embedding.batch_size)
        .await?
        .into_iter()
        .map(normalize_l2)
        .collect();
    if vectors.len() != docs.len() {
        return Err(RetrievalError::Embedding(format!(
            "{} vectors for {} documents",
            vectors.len(),
            docs.len()
        )));
    }
    info!(
        model = embedder.model_name(),
        dims = embedder.dims(),
        "embedded corpus"
    );

    let docstore_path = config.artifacts.docstore_path();

    if config.index.is_remote() {
        let index = RemoteIndex::rebuild(&config.index, &vectors, &docs).await?;
        DocStore::save(&docstore_path, &docs)?;
        info!(backend = "remote", vectors = index.len(), "ingestion complete");
        return Ok(IngestReport {
            documents: docs.len(),
            dims: embedder.dims(),
            model: embedder.model_name().to_string(),
            backend: "remote",
            index_path: None,
            docstore_path,
        });
    }

    let index = FlatIndex::build(&vectors, &docs)?;
    let index_path = config.artifacts.index_path();

    let staged_index = index.stage(&index_path)?;
    let staged_docs = DocStore::stage(&docstore_path, &docs)?;
    staged_index.commit()?;
    staged_docs.commit()?;

    info!(
        backend = "flat",
        vectors = index.len(),
        index = %index_path.display(),
        docstore = %docstore_path.display(),
        "ingestion complete"
    );

    Ok(IngestReport {
        documents: docs.len(),
        dims: embedder.dims(),
        model: embedder.model_name().to_string(),
        backend: "flat",
        index_path: Some(index_path),
        docstore_path,
    })
}

/// Print an [`IngestReport`] the way `cra ingest` shows it.
pub fn print_report(report: &IngestReport) {
    println!("ingest");
    println!("  documents: {}", report.documents);
    println!("  model: {} ({} dims)", report.model, report.dims);
    match &report.index_path {
        Some(p) => println!("  index: {}", p.display()),
        None => println!("  index: remote"),
    }
    println!("  docstore: {}", report.docstore_path.display());
    println!("ok");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use std::path::Path;
    use tempfile::TempDir;

    fn config_for(root: &Path) -> Config {
        parse_config(
            r#"
[corpus]
dirs = ["data/regulations", "data/policies", "data/cases"]

[embedding]
provider = "hash"
dims = 64
batch_size = 2
"#,
            root,
        )
        .unwrap()
    }

    fn write(root: &Path, rel: &str, text: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, text).unwrap();
    }

    #[tokio::test]
    async fn test_ingest_writes_aligned_artifacts() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "data/regulations/a.txt", "Lenders must verify income.");
        write(tmp.path(), "data/regulations/b.txt", "Cap EMI at half of income.");
        write(tmp.path(), "data/cases/c.txt", "Borrower missed three payments.");
        let config = config_for(tmp.path());

        let report = run_ingest(&config).await.unwrap();
        assert_eq!(report.documents, 3);
        assert_eq!(report.dims, 64);

        let docs = DocStore::load(&config.artifacts.docstore_path()).unwrap();
        let index = FlatIndex::load(&config.artifacts.index_path()).unwrap();
        assert_eq!(index.len(), docs.len());

        let embedder = create_embedder(&config.embedding).await.unwrap();
        for (i, doc) in docs.iter().enumerate() {
            let expected = normalize_l2(embedder.embed_query(&doc.text).await.unwrap());
            assert_eq!(index.vector(i).unwrap(), expected.as_slice());
        }
    }

    #[tokio::test]
    async fn test_empty_corpus_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("data/regulations")).unwrap();
        write(tmp.path(), "data/regulations/notes.md", "not a txt file");
        let config = config_for(tmp.path());

        let err = run_ingest(&config).await.unwrap_err();
        assert!(matches!(err, RetrievalError::EmptyCorpus { .. }));
        assert!(!config.artifacts.index_path().exists());
        assert!(!config.artifacts.docstore_path().exists());
    }
}
