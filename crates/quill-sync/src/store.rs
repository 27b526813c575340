//! On-disk notebook store.
//!
//! One `.ipynb` file per notebook id under a single directory.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{SyncError, SyncResult};
use crate::ipynb::{self, IpynbDocument};
use crate::notebook::{Notebook, NotebookSummary};

const EXTENSION: &str = "ipynb";

/// Notebook documents keyed by id.
#[derive(Debug, Clone)]
pub struct NotebookStore {
    dir: PathBuf,
}

impl NotebookStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn new(dir: impl AsRef<Path>) -> SyncResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the document for `id`.
    pub fn path(&self, id: &str) -> SyncResult<PathBuf> {
        validate_id(id)?;
        Ok(self.dir.join(format!("{}.{}", id, EXTENSION)))
    }

    /// Load a notebook. `None` when no document exists for `id`.
    pub fn load(&self, id: &str) -> SyncResult<Option<Notebook>> {
        let path = self.path(id)?;
        if !path.exists() {
            return Ok(None);
        }
        let document = IpynbDocument::read_from_file(&path)?;
        Ok(Some(ipynb::decode(id, &document)))
    }

    /// Save a notebook under `id`, stamping its timestamps.
    pub fn save(&self, id: &str, notebook: &mut Notebook) -> SyncResult<PathBuf> {
        let path = self.path(id)?;

        let now = chrono::Utc::now().to_rfc3339();
        if notebook.created.is_none() {
            notebook.created = Some(now.clone());
        }
        notebook.modified = Some(now);
        notebook.id = id.to_string();

        ipynb::encode(notebook).write_to_file(&path)?;

        tracing::info!(
            "Saved notebook {} → {} ({} cells)",
            id,
            path.display(),
            notebook.cells.len()
        );
        Ok(path)
    }

    /// Delete a notebook. `false` when it did not exist.
    pub fn delete(&self, id: &str) -> SyncResult<bool> {
        let path = self.path(id)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(SyncError::WriteError {
                path,
                message: e.to_string(),
            }),
        }
    }

    /// Summaries of every readable notebook, most recently modified first.
    pub fn list(&self) -> SyncResult<Vec<NotebookSummary>> {
        let mut summaries = Vec::new();

        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if !path.extension().is_some_and(|e| e == EXTENSION) {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            match IpynbDocument::read_from_file(&path) {
                Ok(document) => {
                    let metadata = document.metadata;
                    summaries.push(NotebookSummary {
                        id: id.to_string(),
                        title: metadata.title.unwrap_or_else(|| id.to_string()),
                        created: metadata.created,
                        modified: metadata.modified,
                    });
                }
                Err(e) => tracing::warn!("Skipping unreadable notebook {}: {}", path.display(), e),
            }
        }

        // Missing timestamps sort last.
        summaries.sort_by(|a, b| b.modified.cmp(&a.modified));
        Ok(summaries)
    }
}

fn validate_id(id: &str) -> SyncResult<()> {
    if id.is_empty() || id.contains('/') || id.contains('\\') || id.contains("..") {
        return Err(SyncError::InvalidId(id.to_string()));
    }
    Ok(())
}
