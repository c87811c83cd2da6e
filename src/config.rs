//! This module provides functionality for loading and handling the application's configuration.
//!
//! It defines the [`RagConfig`] struct, which holds every tunable of the retrieval pipeline,
//! and a [`load_config`] function to load it from a YAML file.
//!
//! # Examples
//!
//! ```no_run
//! use awful_rag::config::{RagConfig, load_config};
//!
//! let config_file_path = std::path::Path::new("/path/to/config.yaml");
//! let config: RagConfig = load_config(config_file_path).unwrap();
//! println!("{}", config.describe());
//! ```

use serde::{Deserialize, Serialize};
use std::{
    error::Error,
    fs,
    path::{Path, PathBuf},
};

use tracing::*;

use crate::embedder::{DEFAULT_JINA_API_BASE, DEFAULT_JINA_MODEL, DEFAULT_LOCAL_MODEL};
use crate::retriever::DEFAULT_TOP_K;
use crate::segmenter::{
    DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE, SegmentationStrategy, Segmenter,
};
use crate::{RagError, Result};

pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// Where embeddings are computed.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// A Jina-compatible HTTP embeddings service.
    #[default]
    Jina,
    /// An in-process BERT sentence model.
    Local,
}

/// Represents the application's configuration.
///
/// Only `index_path` and `session_db_url` are required in the YAML file; every other field
/// falls back to its default.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct RagConfig {
    #[serde(default)]
    pub embedding_backend: EmbeddingBackend,

    #[serde(default = "default_embedding_api_base")]
    pub embedding_api_base: String,

    /// Usually supplied through `ARAG_EMBEDDING_API_KEY` or `JINA_API_KEY` instead.
    #[serde(default)]
    pub embedding_api_key: String,

    /// For the local backend this is a Hugging Face model id. Unset means the backend's
    /// default, see [`RagConfig::embedding_model`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,

    #[serde(default = "default_embedding_batch_size")]
    pub embedding_batch_size: usize,

    /// The base URL of the OpenAI-compatible chat API.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// The API key used to authenticate chat requests.
    #[serde(default = "default_api_key")]
    pub api_key: String,

    /// The name of the model to be used for generating answers.
    #[serde(default = "default_model")]
    pub model: String,

    /// Directory holding the persisted index.
    pub index_path: PathBuf,

    // Session database url (SQLite)
    pub session_db_url: String,

    #[serde(default)]
    pub segmentation: SegmentationStrategy,

    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    #[serde(default = "default_top_k")]
    pub top_k: usize,

    // Prompt template name; the built-in template when unset
    #[serde(default)]
    pub template: Option<String>,
}

fn default_embedding_api_base() -> String {
    DEFAULT_JINA_API_BASE.to_string()
}

fn default_embedding_batch_size() -> usize {
    64
}

fn default_api_base() -> String {
    "http://localhost:11434/v1".to_string()
}

fn default_api_key() -> String {
    "ollama".to_string()
}

fn default_model() -> String {
    "deepseek-r1:1.5b".to_string()
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_chunk_overlap() -> usize {
    DEFAULT_CHUNK_OVERLAP
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

impl RagConfig {
    /// Default configuration storing its index and database under `base_dir`.
    pub fn with_defaults(base_dir: &Path) -> Self {
        Self {
            embedding_backend: EmbeddingBackend::default(),
            embedding_api_base: default_embedding_api_base(),
            embedding_api_key: String::new(),
            embedding_model: None,
            embedding_batch_size: default_embedding_batch_size(),
            api_base: default_api_base(),
            api_key: default_api_key(),
            model: default_model(),
            index_path: base_dir.join("index"),
            session_db_url: base_dir.join("arag.db").to_string_lossy().into_owned(),
            segmentation: SegmentationStrategy::default(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            top_k: default_top_k(),
            template: None,
        }
    }

    /// The configured embedding model, or the default for the selected backend.
    pub fn embedding_model(&self) -> &str {
        match (&self.embedding_model, self.embedding_backend) {
            (Some(model), _) => model.as_str(),
            (None, EmbeddingBackend::Jina) => DEFAULT_JINA_MODEL,
            (None, EmbeddingBackend::Local) => DEFAULT_LOCAL_MODEL,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::Config("chunk_size must be positive".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::Config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(RagError::Config("top_k must be positive".into()));
        }
        if self.embedding_batch_size == 0 {
            return Err(RagError::Config("embedding_batch_size must be positive".into()));
        }
        Ok(())
    }

    pub fn segmenter(&self) -> Result<Segmenter> {
        Segmenter::new(self.chunk_size, self.chunk_overlap, self.segmentation)
    }

    /// Human-readable summary with secrets left out.
    pub fn describe(&self) -> String {
        let backend = match self.embedding_backend {
            EmbeddingBackend::Jina => format!("jina ({})", self.embedding_api_base),
            EmbeddingBackend::Local => "local".to_string(),
        };
        let segmentation = match self.segmentation {
            SegmentationStrategy::Flat => "flat",
            SegmentationStrategy::Headings => "headings",
        };
        [
            format!("Chat model:        {} ({})", self.model, self.api_base),
            format!("Embedding backend: {backend}"),
            format!(
                "Embedding model:   {} (batches of {})",
                self.embedding_model(),
                self.embedding_batch_size
            ),
            format!("Index path:        {}", self.index_path.display()),
            format!("Session database:  {}", self.session_db_url),
            format!(
                "Segmentation:      {segmentation}, {} chars with {} overlap",
                self.chunk_size, self.chunk_overlap
            ),
            format!("Top k:             {}", self.top_k),
            format!(
                "Template:          {}",
                self.template.as_deref().unwrap_or("built-in")
            ),
        ]
        .join("\n")
    }
}

/// Loads the application's configuration from a YAML file and validates it.
///
/// # Examples
///
/// ```no_run
/// use awful_rag::config::load_config;
///
/// match load_config(std::path::Path::new("/path/to/config.yaml")) {
///     Ok(config) => println!("{:?}", config),
///     Err(err) => eprintln!("Error loading config: {}", err),
/// }
/// ```
pub fn load_config(file: &Path) -> std::result::Result<RagConfig, Box<dyn Error>> {
    debug!("Loading config from {}", file.display());
    let content = fs::read_to_string(file)?;
    let config: RagConfig = serde_yaml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}
