//! Corpus loader.
//!
//! Walks each configured directory in order, visiting entries in lexical
//! order so two runs over an unchanged tree produce the same document
//! sequence. That sequence is what aligns the vector index with the
//! docstore, so it must never depend on filesystem iteration order.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::CorpusConfig;
use crate::error::{Result, RetrievalError};
use crate::models::Document;

/// Load every matching file under `config.dirs`.
///
/// Missing directories are skipped. Files that cannot be read are logged
/// and skipped. A file holding only whitespace becomes a document with
/// empty text. Fails with [`RetrievalError::EmptyCorpus`] when nothing
/// was loaded, and with [`RetrievalError::Configuration`] when two files
/// map to the same id (a root listed twice, or two roots sharing a
/// directory name).
pub fn load_corpus(config: &CorpusConfig) -> Result<Vec<Document>> {
    let include_set = build_globset(&config.include_globs)?;
    let mut documents = Vec::new();

    for dir in &config.dirs {
        if !dir.is_dir() {
            debug!(dir = %dir.display(), "corpus directory missing, skipping");
            continue;
        }
        let before = documents.len();
        scan_dir(dir, &include_set, &mut documents);
        debug!(
            dir = %dir.display(),
            documents = documents.len() - before,
            "scanned corpus directory"
        );
    }

    if documents.is_empty() {
        let dirs = config
            .dirs
            .iter()
            .map(|d| d.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        return Err(RetrievalError::EmptyCorpus { dirs });
    }

    let mut seen = HashSet::with_capacity(documents.len());
    for doc in &documents {
        if !seen.insert(doc.id.as_str()) {
            return Err(RetrievalError::Configuration(format!(
                "corpus file '{}' is reachable from more than one of corpus.dirs; \
                 each root must have a distinct directory name",
                doc.id
            )));
        }
    }

    Ok(documents)
}

fn scan_dir(root: &Path, include_set: &GlobSet, out: &mut Vec<Document>) {
    // Ids are relative to the root's parent so the category directory
    // (regulations/, policies/, ...) is part of the source label.
    let label_base = root.parent().unwrap_or(root);

    let walker = WalkDir::new(root).sort_by_file_name();
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "skipping unreadable corpus entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let within_root = path.strip_prefix(root).unwrap_or(path);
        if !include_set.is_match(within_root) {
            continue;
        }

        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read corpus file, skipping");
                continue;
            }
        };
        let text = String::from_utf8_lossy(&bytes).trim().to_string();

        let relative = path.strip_prefix(label_base).unwrap_or(path);
        let label = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        out.push(Document {
            id: label.clone(),
            source: label,
            text,
        });
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| {
            RetrievalError::Configuration(format!("invalid include glob '{}': {}", pattern, e))
        })?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| RetrievalError::Configuration(format!("invalid include globs: {}", e)))
}
