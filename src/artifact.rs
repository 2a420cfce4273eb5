//! Atomic artifact writes.
//!
//! Bytes are written to a temporary file in the destination directory and
//! renamed over the target only on [`Staged::commit`]. A reader therefore
//! sees either the previous artifact or the complete new one, never a
//! truncated file. Dropping a [`Staged`] without committing deletes the
//! temporary file.

use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::error::{Result, RetrievalError};

pub struct Staged {
    file: NamedTempFile,
    target: PathBuf,
}

/// Write `bytes` next to `target` without touching `target` itself.
pub fn stage(target: &Path, bytes: &[u8]) -> Result<Staged> {
    let dir = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(|e| RetrievalError::io(&dir, e))?;

    let mut file = NamedTempFile::new_in(&dir).map_err(|e| RetrievalError::io(&dir, e))?;
    file.write_all(bytes)
        .and_then(|_| file.as_file().sync_all())
        .map_err(|e| RetrievalError::io(file.path(), e))?;

    Ok(Staged {
        file,
        target: target.to_path_buf(),
    })
}

impl Staged {
    /// Atomically replace the target with the staged bytes.
    pub fn commit(self) -> Result<()> {
        let target = self.target;
        self.file
            .persist(&target)
            .map_err(|e| RetrievalError::io(&target, e.error))?;
        Ok(())
    }
}

/// Stage and commit in one step.
pub fn write_atomic(target: &Path, bytes: &[u8]) -> Result<()> {
    stage(target, bytes)?.commit()
}
