//! # Retriever
//!
//! Embeds a query and returns the nearest chunks from a [`VectorIndex`].

use tracing::debug;

use crate::embedder::Embedder;
use crate::segmenter::Chunk;
use crate::vector_store::{RetrievalResult, VectorIndex};
use crate::Result;

/// Number of chunks retrieved per question unless configured otherwise.
pub const DEFAULT_TOP_K: usize = 4;

pub struct Retriever<'a> {
    embedder: &'a dyn Embedder,
    index: &'a VectorIndex,
    top_k: usize,
}

impl<'a> Retriever<'a> {
    pub fn new(embedder: &'a dyn Embedder, index: &'a VectorIndex) -> Self {
        Self {
            embedder,
            index,
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Chunks for `query` using the configured `top_k`, nearest first.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<Chunk>> {
        self.retrieve_top(query, self.top_k).await
    }

    pub async fn retrieve_top(&self, query: &str, k: usize) -> Result<Vec<Chunk>> {
        Ok(self.search(query, k).await?.into_chunks())
    }

    /// Like [`retrieve_top`](Self::retrieve_top) but keeps ids and distances.
    pub async fn search(&self, query: &str, k: usize) -> Result<RetrievalResult> {
        let vector = self.embedder.embed(query).await?;
        let result = self.index.search(&vector, k)?;
        debug!(
            "Retrieved {} of {} chunks for query ({} chars)",
            result.len(),
            self.index.len(),
            query.chars().count()
        );
        Ok(result)
    }
}
