//! # Embedder
//!
//! Maps text to fixed-dimension vectors. The [`Embedder`] trait is the capability the rest of
//! the pipeline depends on; two backends implement it:
//!
//! - [`JinaEmbedder`]: a remote, Jina-compatible `/embeddings` HTTP endpoint.
//! - [`LocalEmbedder`]: an in-process BERT sentence model (`all-MiniLM-L6-v2` by default)
//!   fetched from the Hugging Face Hub and run with Candle, mean pooled and L2-normalized.
//!
//! Backends are not trusted to return one vector per input. Callers go through
//! [`embed_batch`], which fails with [`RagError::EmbeddingCountMismatch`] when the counts differ.

use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config, DTYPE};
use hf_hub::{Repo, RepoType, api::sync::Api};
use serde::{Deserialize, Serialize};
use tokenizers::Tokenizer;
use tracing::{debug, info};

use crate::config::{EmbeddingBackend, RagConfig};
use crate::{RagError, Result};

/// One embedding. Every vector in an index has the same length.
pub type EmbeddingVector = Vec<f32>;

pub const DEFAULT_JINA_API_BASE: &str = "https://api.jina.ai/v1";
pub const DEFAULT_JINA_MODEL: &str = "jina-embeddings-v2-base-en";
pub const DEFAULT_LOCAL_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";

/// Text in, fixed-dimension vector out.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed `texts`, ideally returning one vector per input in input order.
    async fn embed_many(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>>;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<EmbeddingVector> {
        let mut vectors = self.embed_many(&[text.to_string()]).await?;
        if vectors.len() != 1 {
            return Err(RagError::EmbeddingCountMismatch {
                expected: 1,
                actual: vectors.len(),
            });
        }
        Ok(vectors.remove(0))
    }
}

/// Embed `texts` and verify the backend returned exactly one vector per input.
pub async fn embed_batch(
    embedder: &dyn Embedder,
    texts: &[String],
) -> Result<Vec<EmbeddingVector>> {
    let vectors = embedder.embed_many(texts).await?;
    if vectors.len() != texts.len() {
        return Err(RagError::EmbeddingCountMismatch {
            expected: texts.len(),
            actual: vectors.len(),
        });
    }
    Ok(vectors)
}

/// Build the embedding backend selected in the configuration.
pub fn from_config(config: &RagConfig) -> Result<Box<dyn Embedder>> {
    match config.embedding_backend {
        EmbeddingBackend::Jina => Ok(Box::new(JinaEmbedder::new(
            &config.embedding_api_base,
            &config.embedding_api_key,
            config.embedding_model(),
        ))),
        EmbeddingBackend::Local => Ok(Box::new(LocalEmbedder::load(config.embedding_model())?)),
    }
}

fn backend_error(context: &str, err: impl std::fmt::Display) -> RagError {
    RagError::Embedding(format!("{context}: {err}"))
}

/// Client for a Jina-compatible embeddings endpoint.
#[derive(Debug, Clone)]
pub struct JinaEmbedder {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

impl JinaEmbedder {
    pub fn new(api_base: &str, api_key: &str, model: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl Embedder for JinaEmbedder {
    async fn embed_many(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/embeddings", self.api_base);
        debug!("Embedding {} texts with {} at {}", texts.len(), self.model, url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await
            .map_err(|e| backend_error("embedding request failed", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::Embedding(format!(
                "embedding service returned {status}: {body}"
            )));
        }

        let mut body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| backend_error("invalid embedding response", e))?;
        body.data.sort_by_key(|data| data.index);
        if let Some((position, data)) = body
            .data
            .iter()
            .enumerate()
            .find(|(position, data)| data.index != *position)
        {
            return Err(RagError::Embedding(format!(
                "embedding response has index {} at position {}",
                data.index, position
            )));
        }

        Ok(body.data.into_iter().map(|data| data.embedding).collect())
    }
}

/// BERT sentence embeddings computed in-process with Candle.
pub struct LocalEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
}

impl LocalEmbedder {
    /// Download (or reuse the cached copy of) `model_id` from the Hugging Face Hub.
    pub fn load(model_id: &str) -> Result<Self> {
        let device = Device::Cpu;
        info!("Loading sentence embedding model {}", model_id);

        let repo = Repo::with_revision(model_id.to_string(), RepoType::Model, "main".to_string());
        let api = Api::new().map_err(|e| backend_error("hub unavailable", e))?;
        let api_repo = api.repo(repo);

        let config_filename = api_repo
            .get("config.json")
            .map_err(|e| backend_error("config.json", e))?;
        let tokenizer_filename = api_repo
            .get("tokenizer.json")
            .map_err(|e| backend_error("tokenizer.json", e))?;
        let weights_filename = api_repo
            .get("model.safetensors")
            .map_err(|e| backend_error("model.safetensors", e))?;

        let config = std::fs::read_to_string(config_filename)?;
        let config: Config =
            serde_json::from_str(&config).map_err(|e| backend_error("model config", e))?;

        let tokenizer = Tokenizer::from_file(tokenizer_filename)
            .map_err(|e| backend_error("failed to load tokenizer", e))?;

        // SAFETY: the safetensors file is owned by the hub cache and not modified while mapped.
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_filename], DTYPE, &device)
                .map_err(|e| backend_error("failed to map weights", e))?
        };
        let model = BertModel::load(vb, &config).map_err(|e| backend_error("bert", e))?;

        Ok(Self {
            model,
            tokenizer,
            device,
        })
    }

    fn encode(&self, text: &str) -> Result<EmbeddingVector> {
        let tokens = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| backend_error("tokenization error", e))?;

        self.forward(tokens.get_ids(), tokens.get_type_ids(), tokens.get_attention_mask())
            .map_err(|e| backend_error("inference error", e))
    }

    fn forward(
        &self,
        ids: &[u32],
        type_ids: &[u32],
        attention_mask: &[u32],
    ) -> candle_core::Result<EmbeddingVector> {
        let token_ids = Tensor::new(ids, &self.device)?.unsqueeze(0)?;
        let token_type_ids = Tensor::new(type_ids, &self.device)?.unsqueeze(0)?;

        // [1, seq_len, hidden]
        let output = self.model.forward(&token_ids, &token_type_ids, None)?;

        // Mean pooling over unmasked tokens, mask shaped [1, seq_len, 1].
        let mask = Tensor::new(attention_mask, &self.device)?
            .to_dtype(DType::F32)?
            .unsqueeze(0)?
            .unsqueeze(2)?;
        let sum = output.broadcast_mul(&mask)?.sum(1)?;
        let count = mask.sum(1)?.clamp(1f32, f32::INFINITY)?;
        let mean = sum.broadcast_div(&count)?.squeeze(0)?;

        let norm = mean.sqr()?.sum_all()?.sqrt()?;
        mean.broadcast_div(&norm)?.to_vec1::<f32>()
    }
}

#[async_trait]
impl Embedder for LocalEmbedder {
    async fn embed_many(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>> {
        texts.iter().map(|text| self.encode(text)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{KeywordEmbedder, ShortEmbedder};
    use httpmock::prelude::*;
    use serde_json::json;

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn jina_embedder_orders_vectors_by_index() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/embeddings")
                    .header("authorization", "Bearer test-key")
                    .json_body(json!({
                        "model": "jina-test",
                        "input": ["first", "second"]
                    }));
                then.status(200).json_body(json!({
                    "model": "jina-test",
                    "object": "list",
                    "usage": { "total_tokens": 4, "prompt_tokens": 4 },
                    "data": [
                        { "object": "embedding", "index": 1, "embedding": [0.0, 1.0] },
                        { "object": "embedding", "index": 0, "embedding": [1.0, 0.0] }
                    ]
                }));
            })
            .await;

        let embedder = JinaEmbedder::new(&server.base_url(), "test-key", "jina-test");
        let vectors = embed_batch(&embedder, &texts(&["first", "second"]))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[tokio::test]
    async fn short_backend_response_is_a_count_mismatch() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/embeddings");
                then.status(200).json_body(json!({
                    "data": [ { "index": 0, "embedding": [1.0, 0.0] } ]
                }));
            })
            .await;

        let embedder = JinaEmbedder::new(&format!("{}/", server.base_url()), "k", "m");
        let err = embed_batch(&embedder, &texts(&["a", "b", "c"]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RagError::EmbeddingCountMismatch {
                expected: 3,
                actual: 1
            }
        ));
    }

    #[tokio::test]
    async fn duplicate_response_indices_are_rejected() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/embeddings");
                then.status(200).json_body(json!({
                    "data": [
                        { "index": 0, "embedding": [1.0, 0.0] },
                        { "index": 0, "embedding": [0.0, 1.0] }
                    ]
                }));
            })
            .await;

        let embedder = JinaEmbedder::new(&server.base_url(), "k", "m");
        let err = embed_batch(&embedder, &texts(&["a", "b"])).await.unwrap_err();
        match err {
            RagError::Embedding(message) => assert!(message.contains("index 0 at position 1")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn http_errors_surface_as_embedding_errors() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/embeddings");
                then.status(401).body("invalid api key");
            })
            .await;

        let embedder = JinaEmbedder::new(&server.base_url(), "bad", "m");
        let err = embedder.embed("hello").await.unwrap_err();
        match err {
            RagError::Embedding(message) => assert!(message.contains("invalid api key")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_batch_makes_no_request() {
        let embedder = JinaEmbedder::new("http://127.0.0.1:9", "k", "m");
        assert!(embed_batch(&embedder, &[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn single_embed_checks_count() {
        let err = ShortEmbedder.embed("anything").await.unwrap_err();
        assert!(matches!(
            err,
            RagError::EmbeddingCountMismatch {
                expected: 1,
                actual: 0
            }
        ));

        let vector = KeywordEmbedder::animals().embed("cat").await.unwrap();
        assert_eq!(vector.len(), KeywordEmbedder::animals().dimension());
    }

    #[tokio::test]
    #[ignore = "downloads model weights from the Hugging Face Hub"]
    async fn local_embedder_produces_normalized_vectors() {
        let embedder = LocalEmbedder::load(DEFAULT_LOCAL_MODEL).unwrap();
        let vectors = embed_batch(&embedder, &texts(&["Rust is cool.", "I love programming."]))
            .await
            .unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[0].len(), 384);
        let norm: f32 = vectors[0].iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-3);
    }
}
