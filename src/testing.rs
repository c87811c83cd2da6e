//! Deterministic stand-ins for the embedding and generation backends, shared by unit tests.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use crate::api::LanguageModel;
use crate::embedder::{Embedder, EmbeddingVector};
use crate::{RagError, Result};

/// Bag-of-keywords embedder: one dimension per vocabulary word, L2-normalized.
///
/// Text containing none of the keywords maps to the zero vector.
#[derive(Debug, Clone)]
pub struct KeywordEmbedder {
    vocabulary: Vec<&'static str>,
}

impl KeywordEmbedder {
    pub fn new(vocabulary: Vec<&'static str>) -> Self {
        Self { vocabulary }
    }

    pub fn animals() -> Self {
        Self::new(vec![
            "cat", "dog", "mat", "sat", "hello", "world", "barked", "mailman", "bird", "sang",
        ])
    }

    pub fn dimension(&self) -> usize {
        self.vocabulary.len()
    }

    pub fn vector_for(&self, text: &str) -> EmbeddingVector {
        let lowered = text.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        let mut vector: Vec<f32> = self
            .vocabulary
            .iter()
            .map(|keyword| words.iter().filter(|w| *w == keyword).count() as f32)
            .collect();
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed_many(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>> {
        Ok(texts.iter().map(|text| self.vector_for(text)).collect())
    }
}

/// Always returns one vector fewer than requested.
#[derive(Debug, Clone, Copy)]
pub struct ShortEmbedder;

#[async_trait]
impl Embedder for ShortEmbedder {
    async fn embed_many(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>> {
        Ok(texts
            .iter()
            .skip(1)
            .map(|_| vec![1.0, 0.0])
            .collect())
    }
}

/// Records every prompt it receives and replies with a fixed answer or failure.
#[derive(Debug, Clone)]
pub struct ScriptedModel {
    reply: std::result::Result<String, String>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl ScriptedModel {
    pub fn answering(reply: &str) -> Self {
        Self {
            reply: Ok(reply.to_string()),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            reply: Err(message.to_string()),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.reply.clone().map_err(RagError::Generation)
    }
}
