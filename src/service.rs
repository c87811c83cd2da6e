//! # Service
//!
//! [`DocChat`] is the one object a process builds to chat with a document. It owns the
//! embedding backend, the language model, the document loader and the prompt template, plus
//! the mutable state they act on: the single active [`VectorIndex`] and the document-scoped
//! [`Session`].
//!
//! Both operations that touch that state, [`DocChat::ingest`] and [`DocChat::ask`], hold one
//! async mutex for their whole duration, so a question never runs against a half-replaced
//! index and two uploads never interleave.
//!
//! ```no_run
//! use awful_rag::config::load_config;
//! use awful_rag::service::DocChat;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config(std::path::Path::new("config.yaml"))?;
//! let chat = DocChat::from_config(&config)?;
//! chat.ingest(std::path::Path::new("paper.pdf")).await?;
//! let answer = chat.ask("What is the main result?").await?;
//! println!("{}", answer.text);
//! # Ok(()) }
//! ```

use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::api::{LanguageModel, OpenAiLanguageModel};
use crate::composer::AnswerComposer;
use crate::config::RagConfig;
use crate::embedder::{self, Embedder, EmbeddingVector, embed_batch};
use crate::loader::{self, Document, DocumentLoader, FileLoader};
use crate::models::Conversation;
use crate::retriever::Retriever;
use crate::segmenter::{Chunk, Segmenter};
use crate::session::{ConversationTurn, Session};
use crate::template::{self, PromptTemplate};
use crate::vector_store::{IndexSource, VectorIndex};
use crate::{RagError, Result};

/// Everything the pipeline needs besides its backends.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub segmenter: Segmenter,
    pub index_path: PathBuf,
    pub top_k: usize,
    pub embedding_batch_size: usize,
    pub session_db_url: String,
}

impl PipelineSettings {
    pub fn from_config(config: &RagConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            segmenter: config.segmenter()?,
            index_path: config.index_path.clone(),
            top_k: config.top_k,
            embedding_batch_size: config.embedding_batch_size,
            session_db_url: config.session_db_url.clone(),
        })
    }
}

/// Progress of one question through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    QueryReceived,
    Retrieving,
    Composing,
    Answered,
    Failed,
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TurnState::Idle => "idle",
            TurnState::QueryReceived => "query received",
            TurnState::Retrieving => "retrieving",
            TurnState::Composing => "composing",
            TurnState::Answered => "answered",
            TurnState::Failed => "failed",
        };
        f.write_str(name)
    }
}

fn advance(turn: &mut TurnState, next: TurnState) {
    debug!("Turn: {} -> {}", turn, next);
    *turn = next;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub document_id: String,
    pub chunk_count: usize,
    pub dimension: usize,
    pub index_path: PathBuf,
    /// `true` when the upload started a new conversation.
    pub history_reset: bool,
}

/// Generated answer plus the chunks it was grounded on, nearest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub text: String,
    pub context: Vec<Chunk>,
}

struct ActiveState {
    index: Option<VectorIndex>,
    session: Session,
}

pub struct DocChat {
    embedder: Box<dyn Embedder>,
    model: Box<dyn LanguageModel>,
    loader: Box<dyn DocumentLoader>,
    template: PromptTemplate,
    settings: PipelineSettings,
    state: Mutex<ActiveState>,
}

/// Point the session at the document an index was built from, if it isn't already.
fn sync_session(session: &mut Session, index: &VectorIndex) -> Result<()> {
    let Some(source) = index.source() else {
        return Ok(());
    };
    let in_sync = session
        .active_document()
        .map(|active| active.document_id == source.document_id)
        .unwrap_or(false);
    if !in_sync {
        session.on_new_upload(&source.document_id, &source.fingerprint)?;
    }
    Ok(())
}

impl DocChat {
    /// Assemble a service from explicit backends and restore any persisted state.
    ///
    /// A missing index is not an error; an unreadable one is logged and ignored until the next
    /// successful ingest.
    pub fn open(
        settings: PipelineSettings,
        embedder: Box<dyn Embedder>,
        model: Box<dyn LanguageModel>,
        loader: Box<dyn DocumentLoader>,
        template: PromptTemplate,
    ) -> Result<Self> {
        template.validate()?;
        let mut session = Session::open(&settings.session_db_url)?;

        let index = match VectorIndex::load(&settings.index_path) {
            Ok(index) => Some(index),
            Err(RagError::IndexNotFound(_)) => None,
            Err(e) => {
                warn!("Ignoring unreadable index: {}", e);
                None
            }
        };
        if let Some(index) = &index {
            sync_session(&mut session, index)?;
            info!(
                "Restored index with {} chunks from {}",
                index.len(),
                settings.index_path.display()
            );
        }

        Ok(Self {
            embedder,
            model,
            loader,
            template,
            settings,
            state: Mutex::new(ActiveState { index, session }),
        })
    }

    /// Build the service described by `config`: its embedding backend, an OpenAI-compatible
    /// chat model, the file loader and the configured prompt template.
    pub fn from_config(config: &RagConfig) -> Result<Self> {
        let settings = PipelineSettings::from_config(config)?;
        let template = template::resolve(config.template.as_deref())?;
        let embedder = embedder::from_config(config)?;
        let model = OpenAiLanguageModel::from_config(config, &template);
        Self::open(
            settings,
            embedder,
            Box::new(model),
            Box::new(FileLoader),
            template,
        )
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Index the document at `path`, replacing the active index.
    ///
    /// Any failure, including a failed session update after the new index was written, leaves
    /// the previous index and history in place.
    pub async fn ingest(&self, path: &Path) -> Result<IngestReport> {
        let mut state = self.state.lock().await;

        let document_id = loader::document_id(path)?;
        info!("Ingesting {}", path.display());

        let pages = self.loader.load(path).await?;
        let document = Document::from_pages(document_id, &pages);
        let chunks = self.settings.segmenter.segment(&document.text);
        let vectors = self.embed_chunks(&chunks).await?;

        let source = IndexSource {
            document_id: document.id.clone(),
            fingerprint: document.fingerprint.clone(),
            indexed_at: Utc::now(),
        };
        let index = VectorIndex::build(chunks.into_iter().zip(vectors).collect())?
            .with_source(source);
        index.persist(&self.settings.index_path)?;

        let history_reset = match state
            .session
            .on_new_upload(&document.id, &document.fingerprint)
        {
            Ok(reset) => reset,
            Err(e) => {
                warn!("Session update failed, restoring previous index: {}", e);
                self.restore_index(state.index.as_ref());
                return Err(e);
            }
        };

        let report = IngestReport {
            document_id: document.id.clone(),
            chunk_count: index.len(),
            dimension: index.dimension(),
            index_path: self.settings.index_path.clone(),
            history_reset,
        };
        state.index = Some(index);

        info!(
            "Indexed {} chunks of {} (history reset: {})",
            report.chunk_count, report.document_id, history_reset
        );
        Ok(report)
    }

    /// Put `previous` back on disk after a failed ingest, or clear the index path when there
    /// was no active index.
    fn restore_index(&self, previous: Option<&VectorIndex>) {
        let path = &self.settings.index_path;
        let restored = match previous {
            Some(index) => index.persist(path),
            None => std::fs::remove_dir_all(path).map_err(RagError::from),
        };
        if let Err(e) = restored {
            warn!("Could not restore index at {}: {}", path.display(), e);
        }
    }

    async fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<EmbeddingVector>> {
        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();

        let bar = if console::user_attended_stderr() {
            ProgressBar::new(texts.len() as u64).with_style(
                ProgressStyle::with_template("{spinner} [{pos}/{len}] Embedding chunks {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            )
        } else {
            ProgressBar::hidden()
        };

        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.settings.embedding_batch_size.max(1)) {
            vectors.extend(embed_batch(self.embedder.as_ref(), batch).await?);
            bar.inc(batch.len() as u64);
            debug!("Embedded {}/{} chunks", vectors.len(), texts.len());
        }
        bar.finish_and_clear();

        Ok(vectors)
    }

    /// Answer `query` from the active document.
    ///
    /// The question and answer are appended to history only when the whole turn succeeds.
    pub async fn ask(&self, query: &str) -> Result<Answer> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let mut turn = TurnState::Idle;
        advance(&mut turn, TurnState::QueryReceived);

        let outcome = self.run_turn(state, query, &mut turn).await;
        match outcome {
            Ok(answer) => {
                if state.session.active_document().is_some() {
                    if let Err(e) = state.session.record_turn(query, &answer.text) {
                        advance(&mut turn, TurnState::Failed);
                        return Err(e);
                    }
                }
                advance(&mut turn, TurnState::Answered);
                Ok(answer)
            }
            Err(e) => {
                warn!("Turn failed while {}: {}", turn, e);
                advance(&mut turn, TurnState::Failed);
                Err(e)
            }
        }
    }

    async fn run_turn(
        &self,
        state: &mut ActiveState,
        query: &str,
        turn: &mut TurnState,
    ) -> Result<Answer> {
        advance(turn, TurnState::Retrieving);
        if state.index.is_none() {
            let index = VectorIndex::load(&self.settings.index_path)?;
            sync_session(&mut state.session, &index)?;
            state.index = Some(index);
        }
        let index = state
            .index
            .as_ref()
            .ok_or_else(|| RagError::IndexNotFound(self.settings.index_path.clone()))?;

        let context = Retriever::new(self.embedder.as_ref(), index)
            .with_top_k(self.settings.top_k)
            .retrieve(query)
            .await?;

        advance(turn, TurnState::Composing);
        let text = AnswerComposer::new(self.model.as_ref(), &self.template)
            .answer(query, &context)
            .await?;

        Ok(Answer { text, context })
    }

    /// Turns about the active document, oldest first.
    pub async fn history(&self) -> Result<Vec<ConversationTurn>> {
        self.state.lock().await.session.history()
    }

    pub async fn active_document(&self) -> Option<Conversation> {
        self.state.lock().await.session.active_document().cloned()
    }
}
