//! # Awful RAG (library root)
//!
//! This crate provides the plumbing for the **Awful RAG** CLI and library: chat with a single
//! document by retrieving its most relevant passages and handing them to a language model.
//!
//! The pipeline, leaves first:
//! - Document intake ([`loader`]) turns a file into plain page text.
//! - Structure-aware splitting ([`segmenter`]) cuts the text into bounded [`segmenter::Chunk`]s.
//! - Embedding backends ([`embedder`]) map chunks to fixed-dimension vectors.
//! - An exact L2 index ([`vector_store`]) stores vectors and chunk payloads and persists them.
//! - Retrieval ([`retriever`]) and prompt composition ([`composer`]) answer questions through a
//!   chat model ([`api`]) using a prompt [`template`].
//! - The [`service`] owns the single active index and the document-scoped [`session`].
//!
//! Configuration ([`config`]) and the CLI surface ([`commands`]) round it out.
//!
//! ## Configuration directory
//! Config, templates, the default index and the session database live under the per-platform
//! config directory returned by [`config_dir`]:
//!
//! - macOS: `~/Library/Application Support/com.awful-sec.arag`
//! - Linux (XDG): `~/.config/arag`
//! - Windows: `C:\Users\<you>\AppData\Roaming\awful-sec\arag\config`

use directories::ProjectDirs;
use std::path::PathBuf;
use thiserror::Error;

pub mod api;
pub mod commands;
pub mod composer;
pub mod config;
pub mod embedder;
pub mod loader;
pub mod models;
pub mod retriever;
pub mod schema;
pub mod segmenter;
pub mod service;
pub mod session;
pub mod template;
pub mod vector_store;

#[cfg(test)]
pub(crate) mod testing;

pub type Result<T> = std::result::Result<T, RagError>;

/// Every failure the retrieval pipeline can surface.
///
/// Nothing in this crate retries; each variant reaches the caller unchanged.
#[derive(Error, Debug)]
pub enum RagError {
    #[error("Segmentation error: {0}")]
    Segmentation(String),

    #[error("Embedding backend returned {actual} vectors for {expected} inputs")]
    EmbeddingCountMismatch { expected: usize, actual: usize },

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Cannot build an index from zero entries")]
    EmptyIndex,

    #[error("Vector dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("No index found at {}. Did you ingest a document first?", .0.display())]
    IndexNotFound(PathBuf),

    #[error("Index at {} is corrupt: {reason}", .path.display())]
    IndexCorrupt { path: PathBuf, reason: String },

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Document load error: {0}")]
    DocumentLoad(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<diesel::result::Error> for RagError {
    fn from(err: diesel::result::Error) -> Self {
        RagError::Session(err.to_string())
    }
}

impl From<diesel::ConnectionError> for RagError {
    fn from(err: diesel::ConnectionError) -> Self {
        RagError::Session(err.to_string())
    }
}

impl From<serde_yaml::Error> for RagError {
    fn from(err: serde_yaml::Error) -> Self {
        RagError::Serialization(err.to_string())
    }
}

/// Return the per-platform configuration directory used by Awful RAG.
///
/// This uses [`directories::ProjectDirs`] with the application triple
/// `("com", "awful-sec", "arag")`. The directory is **not** created here; callers that
/// write into it should `fs::create_dir_all` first.
///
/// # Errors
/// Returns an error if the platform configuration directory cannot be determined
/// (rare, but possible in heavily sandboxed environments).
///
/// # Examples
/// ```rust
/// let cfg = awful_rag::config_dir().expect("has a config dir");
/// println!("config at {}", cfg.display());
/// ```
pub fn config_dir() -> Result<PathBuf> {
    let proj_dirs = ProjectDirs::from("com", "awful-sec", "arag")
        .ok_or_else(|| RagError::Config("Unable to determine config directory".into()))?;
    Ok(proj_dirs.config_dir().to_path_buf())
}
