//! # Document loader
//!
//! Turns a file on disk into ordered page texts. PDFs go through `pdf-extract`; anything else
//! is read as UTF-8 text and treated as a single page.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::{RagError, Result};

/// Form feed, which `pdf-extract` emits between pages.
const PAGE_BREAK: char = '\u{c}';

#[async_trait]
pub trait DocumentLoader: Send + Sync {
    /// Page texts in document order.
    async fn load(&self, path: &Path) -> Result<Vec<String>>;
}

/// Loads `.pdf` files (any letter case) with `pdf-extract` and everything else as text.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileLoader;

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

#[async_trait]
impl DocumentLoader for FileLoader {
    async fn load(&self, path: &Path) -> Result<Vec<String>> {
        let owned: PathBuf = path.to_path_buf();
        let pdf = is_pdf(path);

        let pages = tokio::task::spawn_blocking(move || -> Result<Vec<String>> {
            if pdf {
                let bytes = std::fs::read(&owned).map_err(|e| {
                    RagError::DocumentLoad(format!("failed to read {}: {e}", owned.display()))
                })?;
                let text = pdf_extract::extract_text_from_mem(&bytes).map_err(|e| {
                    RagError::DocumentLoad(format!("PDF extraction error: {e}"))
                })?;
                Ok(text.split(PAGE_BREAK).map(str::to_string).collect())
            } else {
                let text = std::fs::read_to_string(&owned).map_err(|e| {
                    RagError::DocumentLoad(format!("failed to read {}: {e}", owned.display()))
                })?;
                Ok(vec![text])
            }
        })
        .await
        .map_err(|e| RagError::DocumentLoad(format!("Task join error: {e}")))??;

        debug!("Loaded {} pages from {}", pages.len(), path.display());
        Ok(pages)
    }
}

/// Document identifier: the file name without its directory.
pub fn document_id(path: &Path) -> Result<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| RagError::DocumentLoad(format!("{} has no file name", path.display())))
}

/// The full text of one ingested document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub id: String,
    pub text: String,
    /// blake3 hex digest of `text`.
    pub fingerprint: String,
}

impl Document {
    pub fn from_pages(id: impl Into<String>, pages: &[String]) -> Self {
        let text = pages.join("\n");
        let fingerprint = blake3::hash(text.as_bytes()).to_hex().to_string();
        Self {
            id: id.into(),
            text,
            fingerprint,
        }
    }
}
