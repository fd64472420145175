//! Session-level integration tests.
//!
//! Exercises the full pipeline — documents, chunking, index, retrieval,
//! prompting, generation — with a deterministic embedding fake and a canned
//! chat provider, so everything runs offline.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use tempfile::TempDir;

use folio_chat::config::Config;
use folio_chat::embedding::Embedder;
use folio_chat::extract::PdfExtractor;
use folio_chat::index::SearchIndex;
use folio_chat::llm::ChatProvider;
use folio_chat::models::{RepoRecord, SourceType};
use folio_chat::prompt::RenderedPrompt;
use folio_chat::session::{ChatSession, INITIALIZING_REPLY};

// ============ Fakes ============

/// Deterministic bag-of-words embedding over a hashed vocabulary: texts
/// sharing tokens land closer together, which is enough to make retrieval
/// meaningful without a real model. Counts embed calls so tests can observe
/// whether an index rebuild happened.
struct HashEmbedder {
    calls: Arc<AtomicUsize>,
}

impl HashEmbedder {
    fn new() -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                calls: calls.clone(),
            },
            calls,
        )
    }

    fn vector(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; 64];
        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let h = token
                .bytes()
                .fold(0usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize));
            v[h % 64] += 1.0;
        }
        v
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }

    fn model_name(&self) -> &str {
        "test-hash-64"
    }

    fn dims(&self) -> usize {
        64
    }
}

/// Chat provider that answers from a template and records the last prompt
/// it saw, so tests can inspect what retrieval fed the model.
struct CannedProvider {
    last_prompt: Arc<Mutex<Option<RenderedPrompt>>>,
}

impl CannedProvider {
    fn new() -> (Self, Arc<Mutex<Option<RenderedPrompt>>>) {
        let last = Arc::new(Mutex::new(None));
        (
            Self {
                last_prompt: last.clone(),
            },
            last,
        )
    }
}

#[async_trait]
impl ChatProvider for CannedProvider {
    fn name(&self) -> &str {
        "canned"
    }

    async fn complete(&self, prompt: &RenderedPrompt) -> Result<String> {
        *self.last_prompt.lock().unwrap() = Some(prompt.clone());
        Ok(format!("Here is what I know about: {}", prompt.user))
    }

    async fn stream(&self, prompt: &RenderedPrompt) -> Result<BoxStream<'static, Result<String>>> {
        *self.last_prompt.lock().unwrap() = Some(prompt.clone());
        Ok(futures::stream::iter(vec![
            Ok("Hello".to_string()),
            Ok(" world".to_string()),
        ])
        .boxed())
    }
}

// ============ Fixtures ============

fn test_config(tmp: &TempDir) -> Arc<Config> {
    let mut config = Config::default();
    config.profile.name = "Jane Doe".to_string();
    config.profile.title = "AI Engineer".to_string();
    config.profile.bio = "Builds intelligent systems.".to_string();
    config.index.dir = tmp.path().join("index");
    Arc::new(config)
}

fn test_session(config: Arc<Config>) -> (ChatSession, Arc<AtomicUsize>, Arc<Mutex<Option<RenderedPrompt>>>) {
    let (embedder, embed_calls) = HashEmbedder::new();
    let (provider, last_prompt) = CannedProvider::new();
    let session = ChatSession::with_components(
        config,
        Box::new(embedder),
        Box::new(provider),
        Box::new(PdfExtractor),
    );
    (session, embed_calls, last_prompt)
}

fn studybuddy() -> RepoRecord {
    RepoRecord {
        name: "studybuddy".to_string(),
        description: Some("AI study companion".to_string()),
        language: Some("Python".to_string()),
        stargazers_count: 12,
        html_url: Some("https://github.com/jdoe/studybuddy".to_string()),
        ..RepoRecord::default()
    }
}

/// Minimal valid PDF containing `text` on one page. Body first, then an
/// xref table with correct byte offsets so pdf-extract can parse it.
fn minimal_pdf_with_text(text: &str) -> Vec<u8> {
    let stream_content = format!("BT /F1 12 Tf 72 720 Td ({}) Tj ET", text);
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let o1 = out.len();
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    let o2 = out.len();
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    let o3 = out.len();
    out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
    let o4 = out.len();
    out.extend_from_slice(
        format!(
            "4 0 obj << /Length {} >> stream\n{}\nendstream endobj\n",
            stream_content.len(),
            stream_content
        )
        .as_bytes(),
    );
    let o5 = out.len();
    out.extend_from_slice(
        b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
    );
    let xref_start = out.len();
    out.extend_from_slice(b"xref\n0 6\n");
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in [o1, o2, o3, o4, o5] {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(b"trailer << /Size 6 /Root 1 0 R >>\nstartxref\n");
    out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}

// ============ Tests ============

#[tokio::test]
async fn test_ask_before_initialize_returns_placeholder() {
    let tmp = TempDir::new().unwrap();
    let (session, _, _) = test_session(test_config(&tmp));

    let answer = session.ask("anything").await.unwrap();
    assert_eq!(answer, INITIALIZING_REPLY);
    assert!(session.history().await.is_empty());
    assert!(!session.is_ready().await);
}

#[tokio::test]
async fn test_initialize_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    let (session, embed_calls, _) = test_session(test_config(&tmp));

    let first = session.initialize(&[studybuddy()]).await.unwrap();
    assert!(!first.already_initialized);
    assert!(first.chunks > 0);
    let calls_after_first = embed_calls.load(Ordering::SeqCst);
    assert!(calls_after_first > 0);

    let second = session.initialize(&[studybuddy()]).await.unwrap();
    assert!(second.already_initialized);
    assert_eq!(embed_calls.load(Ordering::SeqCst), calls_after_first);
    assert!(session.history().await.is_empty());
}

#[tokio::test]
async fn test_initialize_without_repos_reaches_ready() {
    let tmp = TempDir::new().unwrap();
    let (session, _, _) = test_session(test_config(&tmp));

    let summary = session.initialize(&[]).await.unwrap();
    assert_eq!(summary.repos, 0);
    // The personal-info document alone is a valid knowledge base.
    assert!(summary.documents >= 1);
    assert!(session.is_ready().await);
}

#[tokio::test]
async fn test_end_to_end_studybuddy_question() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp);
    let (session, _, last_prompt) = test_session(config.clone());

    session.initialize(&[studybuddy()]).await.unwrap();
    let answer = session.ask("What is studybuddy?").await.unwrap();

    assert!(!answer.is_empty());
    assert!(!answer.contains("{context}"));
    assert!(!answer.contains("{question}"));

    // Retrieval must have put the studybuddy document into the prompt.
    let prompt = last_prompt.lock().unwrap().clone().unwrap();
    assert!(prompt.system.contains("studybuddy"));
    assert!(prompt.system.contains("AI study companion"));
    assert_eq!(prompt.user, "What is studybuddy?");

    // And the top-3 chunks in the index agree.
    let (embedder, _) = HashEmbedder::new();
    let index = SearchIndex::open(&config.index.dir).await.unwrap();
    let hits = index
        .search("What is studybuddy?", 3, &embedder)
        .await
        .unwrap();
    assert!(hits.iter().any(|c| c.content.contains("studybuddy")));

    let history = session.history().await;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].content, "What is studybuddy?");
    assert_eq!(history[1].content, answer);
}

#[tokio::test]
async fn test_resume_ingestion_and_retrieval() {
    let tmp = TempDir::new().unwrap();
    let mut config = (*test_config(&tmp)).clone();
    let resume_path = tmp.path().join("resume.pdf");
    std::fs::write(
        &resume_path,
        minimal_pdf_with_text("Education: XYZ University"),
    )
    .unwrap();
    config.profile.resume_path = Some(resume_path);
    let config = Arc::new(config);

    let (session, _, _) = test_session(config.clone());
    session.initialize(&[]).await.unwrap();

    let (embedder, _) = HashEmbedder::new();
    let index = SearchIndex::open(&config.index.dir).await.unwrap();
    let hits = index
        .search("What is the education background?", 3, &embedder)
        .await
        .unwrap();
    // pdf-extract may reflow whitespace, so match word by word.
    let resume_hit = hits
        .iter()
        .find(|c| c.content.contains("XYZ") && c.content.contains("University"))
        .expect("resume chunk should be retrieved");
    assert_eq!(resume_hit.metadata.source_type, SourceType::Resume);
}

#[tokio::test]
async fn test_corrupt_resume_still_reaches_ready() {
    let tmp = TempDir::new().unwrap();
    let mut config = (*test_config(&tmp)).clone();
    let resume_path = tmp.path().join("resume.pdf");
    std::fs::write(&resume_path, b"definitely not a pdf").unwrap();
    config.profile.resume_path = Some(resume_path);

    let (session, _, _) = test_session(Arc::new(config));
    let summary = session.initialize(&[studybuddy()]).await.unwrap();
    assert!(session.is_ready().await);
    // Repo + personal info, no resume document.
    assert_eq!(summary.documents, 2);
}

#[tokio::test]
async fn test_missing_resume_file_is_skipped() {
    let tmp = TempDir::new().unwrap();
    let mut config = (*test_config(&tmp)).clone();
    config.profile.resume_path = Some(tmp.path().join("does-not-exist.pdf"));

    let (session, _, _) = test_session(Arc::new(config));
    session.initialize(&[]).await.unwrap();
    assert!(session.is_ready().await);
}

#[tokio::test]
async fn test_missing_credential_fails_fast() {
    // No provider key may leak in from the environment for this test.
    for var in ["GROQ_API_KEY", "GEMINI_API_KEY", "GOOGLE_API_KEY"] {
        std::env::remove_var(var);
    }
    let tmp = TempDir::new().unwrap();
    let err = ChatSession::new(test_config(&tmp)).unwrap_err();
    assert!(err.to_string().contains("credential"));
}

#[tokio::test]
async fn test_ask_stream_before_ready_yields_placeholder() {
    let tmp = TempDir::new().unwrap();
    let (session, _, _) = test_session(test_config(&tmp));

    let mut stream = session.ask_stream("hello?").await.unwrap();
    let mut collected = String::new();
    while let Some(fragment) = stream.next().await {
        collected.push_str(&fragment.unwrap());
    }
    assert_eq!(collected, INITIALIZING_REPLY);
    assert!(session.history().await.is_empty());
}

#[tokio::test]
async fn test_ask_stream_yields_ordered_fragments() {
    let tmp = TempDir::new().unwrap();
    let (session, _, _) = test_session(test_config(&tmp));
    session.initialize(&[studybuddy()]).await.unwrap();

    let mut stream = session.ask_stream("Tell me about studybuddy").await.unwrap();
    let mut collected = String::new();
    while let Some(fragment) = stream.next().await {
        collected.push_str(&fragment.unwrap());
    }
    assert_eq!(collected, "Hello world");
    // The streaming path leaves history untouched.
    assert!(session.history().await.is_empty());
}

#[tokio::test]
async fn test_restore_reuses_persisted_index() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp);

    {
        let (session, _, _) = test_session(config.clone());
        session.initialize(&[studybuddy()]).await.unwrap();
    }

    let (session, embed_calls, _) = test_session(config);
    let calls_before = embed_calls.load(Ordering::SeqCst);
    assert!(session.restore().await.unwrap());
    assert!(session.is_ready().await);
    // Restoring must not re-embed anything.
    assert_eq!(embed_calls.load(Ordering::SeqCst), calls_before);

    let answer = session.ask("What is studybuddy?").await.unwrap();
    assert!(answer.contains("studybuddy"));
}

#[tokio::test]
async fn test_restore_on_empty_directory_reports_not_ready() {
    let tmp = TempDir::new().unwrap();
    let (session, _, _) = test_session(test_config(&tmp));
    assert!(!session.restore().await.unwrap());
    assert!(!session.is_ready().await);
}
