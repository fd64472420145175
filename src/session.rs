//! Chatbot session.
//!
//! Owns the pipeline end to end: document building, chunking, index
//! construction, retrieval, prompt assembly, and generation, plus the
//! in-memory conversation history.
//!
//! The session is a one-way state machine: uninitialized → ready. All
//! mutable state sits behind a single async mutex held for the whole of
//! `initialize` and `ask`, which gives two guarantees at once: concurrent
//! initializers coalesce into one build (later callers observe the ready
//! state and no-op), and questions serialize so history appends never
//! interleave.

use anyhow::{Context, Result};
use futures::stream::BoxStream;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::chunk::split_documents;
use crate::config::Config;
use crate::documents::build_documents;
use crate::embedding::{create_embedder, Embedder};
use crate::extract::{PdfExtractor, TextExtractor};
use crate::index::SearchIndex;
use crate::llm::{select_provider, ChatProvider};
use crate::models::{ChatMessage, ChatRole, RepoRecord};
use crate::prompt::assemble;

/// Reply given to questions that arrive before the knowledge base exists.
pub const INITIALIZING_REPLY: &str = "Please wait while I initialize my knowledge base...";

/// What `initialize` did.
#[derive(Debug, Clone, Copy)]
pub struct InitSummary {
    pub repos: usize,
    pub documents: usize,
    pub chunks: usize,
    pub already_initialized: bool,
}

struct SessionInner {
    index: Option<SearchIndex>,
    history: Vec<ChatMessage>,
}

/// Run the ingestion pipeline once: resume read → documents → chunks →
/// persistent index rebuild. Shared by [`ChatSession::initialize`] and the
/// CLI `index` command (which has no need for an LLM credential).
pub async fn build_knowledge_base(
    config: &Config,
    repos: &[RepoRecord],
    embedder: &dyn Embedder,
    extractor: &dyn TextExtractor,
) -> Result<(SearchIndex, InitSummary)> {
    let resume_bytes = read_resume(config);
    let docs = build_documents(repos, &config.profile, resume_bytes.as_deref(), extractor);
    let chunks = split_documents(
        &docs,
        config.chunking.max_chars,
        config.chunking.overlap_chars,
    );

    let index = SearchIndex::open(&config.index.dir).await?;
    let stored = index
        .rebuild(&chunks, embedder)
        .await
        .context("failed to build the embedding index")?;

    Ok((
        index,
        InitSummary {
            repos: repos.len(),
            documents: docs.len(),
            chunks: stored,
            already_initialized: false,
        },
    ))
}

/// Best-effort read of the configured resume file.
fn read_resume(config: &Config) -> Option<Vec<u8>> {
    let path = config.profile.resume_path.as_ref()?;
    match std::fs::read(path) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            warn!("could not read resume at {}: {}", path.display(), e);
            None
        }
    }
}

pub struct ChatSession {
    config: Arc<Config>,
    embedder: Box<dyn Embedder>,
    provider: Box<dyn ChatProvider>,
    extractor: Box<dyn TextExtractor>,
    inner: Mutex<SessionInner>,
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("provider", &self.provider.name())
            .field("model", &self.embedder.model_name())
            .finish_non_exhaustive()
    }
}

impl ChatSession {
    /// Build a session from configuration. Fails immediately when no LLM
    /// credential is configured — before any network call is attempted.
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let provider = select_provider(&config.llm)?;
        let embedder = create_embedder(&config.embedding)?;
        Ok(Self::with_components(
            config,
            embedder,
            provider,
            Box::new(PdfExtractor),
        ))
    }

    /// Assemble a session from explicit parts. This is the seam tests use
    /// to substitute deterministic embedding and canned generation.
    pub fn with_components(
        config: Arc<Config>,
        embedder: Box<dyn Embedder>,
        provider: Box<dyn ChatProvider>,
        extractor: Box<dyn TextExtractor>,
    ) -> Self {
        Self {
            config,
            embedder,
            provider,
            extractor,
            inner: Mutex::new(SessionInner {
                index: None,
                history: Vec::new(),
            }),
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub async fn is_ready(&self) -> bool {
        self.inner.lock().await.index.is_some()
    }

    pub async fn history(&self) -> Vec<ChatMessage> {
        self.inner.lock().await.history.clone()
    }

    /// Reopen a previously persisted index without rebuilding. Succeeds
    /// only when the index is non-empty and was built with the configured
    /// embedding model; returns whether the session became ready.
    pub async fn restore(&self) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        if inner.index.is_some() {
            return Ok(true);
        }

        let index = SearchIndex::open(&self.config.index.dir).await?;
        if index.len().await? == 0 {
            return Ok(false);
        }
        match index.recorded_model().await? {
            Some(model) if model == self.embedder.model_name() => {
                info!(
                    "restored index from {} ({} chunks)",
                    self.config.index.dir.display(),
                    index.len().await?
                );
                inner.index = Some(index);
                Ok(true)
            }
            Some(model) => {
                warn!(
                    "persisted index was built with model '{}', configured model is '{}'; rebuild required",
                    model,
                    self.embedder.model_name()
                );
                Ok(false)
            }
            None => Ok(false),
        }
    }

    /// Build the knowledge base: documents → chunks → persistent index.
    /// Idempotent — once ready, further calls are no-ops. Completes even
    /// when no repositories are supplied; a profile-only index is valid.
    pub async fn initialize(&self, repos: &[RepoRecord]) -> Result<InitSummary> {
        let mut inner = self.inner.lock().await;
        if inner.index.is_some() {
            return Ok(InitSummary {
                repos: repos.len(),
                documents: 0,
                chunks: 0,
                already_initialized: true,
            });
        }

        let (index, summary) = build_knowledge_base(
            &self.config,
            repos,
            self.embedder.as_ref(),
            self.extractor.as_ref(),
        )
        .await?;

        info!(
            "knowledge base ready: {} repos, {} documents, {} chunks",
            summary.repos, summary.documents, summary.chunks
        );

        inner.index = Some(index);
        Ok(summary)
    }

    /// Answer one question. Before the session is ready this returns the
    /// fixed placeholder and leaves history untouched. Otherwise the flow
    /// is retrieve → assemble → generate, and the user/assistant pair is
    /// appended to history on success.
    pub async fn ask(&self, question: &str) -> Result<String> {
        let mut inner = self.inner.lock().await;
        let Some(index) = inner.index.as_ref() else {
            return Ok(INITIALIZING_REPLY.to_string());
        };

        let hits = index
            .search(question, self.config.retrieval.top_k, self.embedder.as_ref())
            .await?;
        let prompt = assemble(&hits, question, &self.config.profile.name);
        let answer = self.provider.complete(&prompt).await?;

        inner.history.push(ChatMessage {
            role: ChatRole::User,
            content: question.to_string(),
        });
        inner.history.push(ChatMessage {
            role: ChatRole::Assistant,
            content: answer.clone(),
        });

        Ok(answer)
    }

    /// Streaming variant of [`ask`](Self::ask): yields answer fragments as
    /// they arrive. History is not recorded on this path.
    pub async fn ask_stream(&self, question: &str) -> Result<BoxStream<'static, Result<String>>> {
        let inner = self.inner.lock().await;
        let Some(index) = inner.index.as_ref() else {
            return Ok(futures::stream::iter(vec![Ok(INITIALIZING_REPLY.to_string())]).boxed());
        };

        let hits = index
            .search(question, self.config.retrieval.top_k, self.embedder.as_ref())
            .await?;
        let prompt = assemble(&hits, question, &self.config.profile.name);
        self.provider.stream(&prompt).await
    }
}
