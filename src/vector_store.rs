//! # VectorStore
//!
//! Exact nearest-neighbour index over chunk embeddings for Awful RAG.
//!
//! Every vector is paired with the [`Chunk`] it was computed from. Ids are dense positions
//! `0..n`, assigned in insertion order. Search is a brute-force L2 scan, which is exact and
//! deterministic: results are sorted by ascending distance and ties break on the smaller id.
//!
//! ## On-disk layout
//! An index is persisted as a directory holding two artifacts:
//! - `index.bin`: the dimension and all vectors, `bincode` encoded.
//! - `payloads.yaml`: the indexed document's [`IndexSource`] and every `{id, chunk}` payload.
//!
//! Writes are staged in a sibling temporary directory and swapped into place, so a reader
//! never observes a half-written index.
//!
//! ## Quick Example
//! ```no_run
//! use awful_rag::segmenter::Chunk;
//! use awful_rag::vector_store::VectorIndex;
//!
//! # fn main() -> awful_rag::Result<()> {
//! let chunk = Chunk { heading: None, text: "Rust is great!".into(), sequence_index: 0 };
//! let index = VectorIndex::build(vec![(chunk, vec![1.0, 0.0])])?;
//! let hits = index.search(&[0.9, 0.1], 1)?;
//! println!("Top match: {:?}", hits.hits[0].chunk.text);
//! index.persist(std::path::Path::new("/tmp/arag-index"))?;
//! # Ok(()) }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::embedder::EmbeddingVector;
use crate::segmenter::Chunk;
use crate::{RagError, Result};

pub const INDEX_FILE: &str = "index.bin";
pub const PAYLOAD_FILE: &str = "payloads.yaml";

/// Which document an index was built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSource {
    pub document_id: String,
    /// blake3 digest of the document text.
    pub fingerprint: String,
    pub indexed_at: DateTime<Utc>,
}

/// An in-memory vector index with chunk payloads.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    dimension: usize,
    vectors: Vec<EmbeddingVector>,
    payloads: Vec<Chunk>,
    source: Option<IndexSource>,
}

/// Borrowed view of one stored entry.
#[derive(Debug, Clone, Copy)]
pub struct VectorIndexEntry<'a> {
    pub id: usize,
    pub vector: &'a [f32],
    pub chunk: &'a Chunk,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub id: usize,
    pub distance: f32,
    pub chunk: Chunk,
}

/// Ranked search hits, nearest first.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RetrievalResult {
    pub hits: Vec<ScoredChunk>,
}

impl RetrievalResult {
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// Drop the scores and keep the chunks in rank order.
    pub fn into_chunks(self) -> Vec<Chunk> {
        self.hits.into_iter().map(|hit| hit.chunk).collect()
    }
}

#[derive(Serialize, Deserialize)]
struct StoredVectors {
    dimension: usize,
    vectors: Vec<EmbeddingVector>,
}

#[derive(Serialize, Deserialize)]
struct StoredPayload {
    id: usize,
    chunk: Chunk,
}

#[derive(Serialize, Deserialize)]
struct StoredPayloads {
    source: Option<IndexSource>,
    payloads: Vec<StoredPayload>,
}

impl VectorIndex {
    /// Build an index from `(chunk, vector)` pairs. Ids follow the input order.
    ///
    /// # Errors
    /// - [`RagError::EmptyIndex`] when `entries` is empty.
    /// - [`RagError::DimensionMismatch`] when a vector's length differs from the first one's.
    pub fn build(entries: Vec<(Chunk, EmbeddingVector)>) -> Result<Self> {
        let dimension = match entries.first() {
            Some((_, vector)) => vector.len(),
            None => return Err(RagError::EmptyIndex),
        };

        let mut vectors = Vec::with_capacity(entries.len());
        let mut payloads = Vec::with_capacity(entries.len());
        for (chunk, vector) in entries {
            if vector.len() != dimension {
                return Err(RagError::DimensionMismatch {
                    expected: dimension,
                    actual: vector.len(),
                });
            }
            vectors.push(vector);
            payloads.push(chunk);
        }

        debug!("Built index with {} vectors of dimension {}", vectors.len(), dimension);
        Ok(Self {
            dimension,
            vectors,
            payloads,
            source: None,
        })
    }

    pub fn with_source(mut self, source: IndexSource) -> Self {
        self.source = Some(source);
        self
    }

    pub fn source(&self) -> Option<&IndexSource> {
        self.source.as_ref()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = VectorIndexEntry<'_>> {
        self.vectors
            .iter()
            .zip(&self.payloads)
            .enumerate()
            .map(|(id, (vector, chunk))| VectorIndexEntry {
                id,
                vector,
                chunk,
            })
    }

    pub fn get(&self, id: usize) -> Option<&Chunk> {
        self.payloads.get(id)
    }

    /// Return the `k` entries nearest to `query` by Euclidean distance.
    ///
    /// `k` larger than the index returns every entry; `k == 0` returns nothing.
    pub fn search(&self, query: &[f32], k: usize) -> Result<RetrievalResult> {
        if query.len() != self.dimension {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut scored: Vec<(f32, usize)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(id, vector)| (euclidean_distance(query, vector), id))
            .collect();
        scored.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        scored.truncate(k);

        let hits = scored
            .into_iter()
            .map(|(distance, id)| ScoredChunk {
                id,
                distance,
                chunk: self.payloads[id].clone(),
            })
            .collect();
        Ok(RetrievalResult { hits })
    }

    /// Write the index to the directory `path`, replacing whatever was there.
    pub fn persist(&self, path: &Path) -> Result<()> {
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)?;

        let staging = tempfile::Builder::new()
            .prefix(".arag-index-")
            .tempdir_in(&parent)?;

        let stored = StoredVectors {
            dimension: self.dimension,
            vectors: self.vectors.clone(),
        };
        let bytes = bincode::serde::encode_to_vec(&stored, bincode::config::standard())
            .map_err(|e| RagError::Serialization(e.to_string()))?;
        fs::write(staging.path().join(INDEX_FILE), bytes)?;

        let payloads = StoredPayloads {
            source: self.source.clone(),
            payloads: self
                .payloads
                .iter()
                .enumerate()
                .map(|(id, chunk)| StoredPayload {
                    id,
                    chunk: chunk.clone(),
                })
                .collect(),
        };
        fs::write(
            staging.path().join(PAYLOAD_FILE),
            serde_yaml::to_string(&payloads)?,
        )?;

        let staged = staging.keep();
        if let Err(e) = swap_into_place(&staged, path) {
            if staged.exists() {
                let _ = fs::remove_dir_all(&staged);
            }
            return Err(e);
        }

        info!("Persisted {} vectors to {}", self.len(), path.display());
        Ok(())
    }

    /// Read an index previously written by [`persist`](Self::persist).
    ///
    /// # Errors
    /// - [`RagError::IndexNotFound`] if the directory or `index.bin` is missing.
    /// - [`RagError::IndexCorrupt`] if the artifacts cannot be decoded or disagree.
    pub fn load(path: &Path) -> Result<Self> {
        let index_file = path.join(INDEX_FILE);
        if !path.is_dir() || !index_file.is_file() {
            return Err(RagError::IndexNotFound(path.to_path_buf()));
        }
        let corrupt = |reason: String| RagError::IndexCorrupt {
            path: path.to_path_buf(),
            reason,
        };

        let bytes = fs::read(&index_file)?;
        let (stored, _): (StoredVectors, usize) =
            bincode::serde::decode_from_slice(&bytes, bincode::config::standard())
                .map_err(|e| corrupt(format!("{INDEX_FILE}: {e}")))?;

        let payload_file = path.join(PAYLOAD_FILE);
        if !payload_file.is_file() {
            return Err(corrupt(format!("{PAYLOAD_FILE} is missing")));
        }
        let yaml = fs::read_to_string(&payload_file)?;
        let payloads: StoredPayloads =
            serde_yaml::from_str(&yaml).map_err(|e| corrupt(format!("{PAYLOAD_FILE}: {e}")))?;

        if payloads.payloads.len() != stored.vectors.len() {
            return Err(corrupt(format!(
                "{} vectors but {} payloads",
                stored.vectors.len(),
                payloads.payloads.len()
            )));
        }
        if let Some(bad) = stored.vectors.iter().find(|v| v.len() != stored.dimension) {
            return Err(corrupt(format!(
                "vector of length {} in an index of dimension {}",
                bad.len(),
                stored.dimension
            )));
        }

        let mut chunks = Vec::with_capacity(payloads.payloads.len());
        for (position, payload) in payloads.payloads.into_iter().enumerate() {
            if payload.id != position {
                return Err(corrupt(format!(
                    "payload id {} found at position {}",
                    payload.id, position
                )));
            }
            chunks.push(payload.chunk);
        }

        debug!("Loaded {} vectors from {}", chunks.len(), path.display());
        Ok(Self {
            dimension: stored.dimension,
            vectors: stored.vectors,
            payloads: chunks,
            source: payloads.source,
        })
    }
}

/// Move the directory `staged` to `path`. An existing `path` is set aside first and put back
/// if the move fails, so `path` always holds a complete index.
fn swap_into_place(staged: &Path, path: &Path) -> Result<()> {
    if !path.exists() {
        fs::rename(staged, path)?;
        return Ok(());
    }

    let backup = backup_path(path);
    if backup.exists() {
        fs::remove_dir_all(&backup)?;
    }
    fs::rename(path, &backup)?;
    if let Err(e) = fs::rename(staged, path) {
        if let Err(restore) = fs::rename(&backup, path) {
            warn!(
                "Could not restore {} from {}: {}",
                path.display(),
                backup.display(),
                restore
            );
        }
        return Err(e.into());
    }
    if let Err(e) = fs::remove_dir_all(&backup) {
        warn!("Could not remove {}: {}", backup.display(), e);
    }
    Ok(())
}

fn backup_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "index".to_string());
    path.with_file_name(format!(".{name}.previous"))
}

/// Straight-line distance between two vectors of equal length.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}
