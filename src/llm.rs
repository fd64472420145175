//! Chat-completion providers.
//!
//! The chatbot talks to exactly one hosted provider, picked at construction
//! time by credential presence: Groq (OpenAI-compatible API) when
//! `GROQ_API_KEY` is set, otherwise Gemini when `GEMINI_API_KEY` (or
//! `GOOGLE_API_KEY`) is set, otherwise construction fails — a missing
//! credential must surface immediately, not on the first question.
//!
//! Both providers implement [`ChatProvider`] with a blocking `complete`
//! and an SSE-based `stream` that yields text fragments in order. Dropping
//! the stream early simply stops consumption; provider errors propagate as
//! plain failures with the upstream status and body attached.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::LlmConfig;
use crate::prompt::RenderedPrompt;

const GROQ_CHAT_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// A hosted chat-completion backend.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    fn name(&self) -> &str;
    /// One-shot completion of the rendered prompt.
    async fn complete(&self, prompt: &RenderedPrompt) -> Result<String>;
    /// Incremental completion: an ordered, finite stream of text fragments
    /// for a single consumer. Not restartable.
    async fn stream(&self, prompt: &RenderedPrompt) -> Result<BoxStream<'static, Result<String>>>;
}

/// Pick the provider by credential presence. Groq wins when both are set.
pub fn select_provider(config: &LlmConfig) -> Result<Box<dyn ChatProvider>> {
    if let Ok(key) = std::env::var("GROQ_API_KEY") {
        if !key.trim().is_empty() {
            return Ok(Box::new(GroqProvider::new(key, config)?));
        }
    }
    for var in ["GEMINI_API_KEY", "GOOGLE_API_KEY"] {
        if let Ok(key) = std::env::var(var) {
            if !key.trim().is_empty() {
                return Ok(Box::new(GeminiProvider::new(key, config)?));
            }
        }
    }
    bail!("no LLM credential found: set GROQ_API_KEY or GEMINI_API_KEY")
}

fn build_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .context("failed to build LLM HTTP client")
}

// ============ Groq (OpenAI-compatible) ============

pub struct GroqProvider {
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    client: reqwest::Client,
}

impl GroqProvider {
    pub fn new(api_key: String, config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            api_key,
            model: config.primary_model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            client: build_client(config.timeout_secs)?,
        })
    }

    fn request_body<'a>(&'a self, prompt: &'a RenderedPrompt, stream: bool) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream,
            messages: vec![
                WireMessage {
                    role: "system",
                    content: &prompt.system,
                },
                WireMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
        }
    }

    async fn send(&self, prompt: &RenderedPrompt, stream: bool) -> Result<reqwest::Response> {
        let resp = self
            .client
            .post(GROQ_CHAT_URL)
            .header("Authorization", format!("Bearer {}", self.api_key.trim()))
            .header("Content-Type", "application/json")
            .json(&self.request_body(prompt, stream))
            .send()
            .await
            .context("failed to call Groq chat completions")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            bail!("Groq returned {}: {}", status, body);
        }
        Ok(resp)
    }
}

#[async_trait]
impl ChatProvider for GroqProvider {
    fn name(&self) -> &str {
        "groq"
    }

    async fn complete(&self, prompt: &RenderedPrompt) -> Result<String> {
        let resp = self.send(prompt, false).await?;
        let parsed: ChatResponse = resp.json().await.context("failed to parse Groq response")?;
        let answer = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .unwrap_or_default();
        if answer.is_empty() {
            bail!("Groq response missing message content");
        }
        Ok(answer)
    }

    async fn stream(&self, prompt: &RenderedPrompt) -> Result<BoxStream<'static, Result<String>>> {
        let resp = self.send(prompt, true).await?;
        Ok(sse_stream(resp, parse_groq_fragment))
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
    messages: Vec<WireMessage<'a>>,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

fn parse_groq_fragment(payload: &str) -> Result<Option<String>> {
    let chunk: StreamChunk =
        serde_json::from_str(payload).context("failed to parse Groq stream chunk")?;
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content))
}

// ============ Gemini ============

pub struct GeminiProvider {
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(api_key: String, config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            api_key,
            model: config.fallback_model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            client: build_client(config.timeout_secs)?,
        })
    }

    fn request_body(&self, prompt: &RenderedPrompt) -> serde_json::Value {
        serde_json::json!({
            "system_instruction": { "parts": [{ "text": prompt.system }] },
            "contents": [{ "role": "user", "parts": [{ "text": prompt.user }] }],
            "generationConfig": {
                "temperature": self.temperature,
                "maxOutputTokens": self.max_tokens,
            },
        })
    }

    async fn send(&self, prompt: &RenderedPrompt, action: &str) -> Result<reqwest::Response> {
        let url = format!("{}/{}:{}", GEMINI_API_BASE, self.model, action);
        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", self.api_key.trim())
            .header("Content-Type", "application/json")
            .json(&self.request_body(prompt))
            .send()
            .await
            .context("failed to call Gemini generateContent")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            bail!("Gemini returned {}: {}", status, body);
        }
        Ok(resp)
    }
}

#[async_trait]
impl ChatProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn complete(&self, prompt: &RenderedPrompt) -> Result<String> {
        let resp = self.send(prompt, "generateContent").await?;
        let json: serde_json::Value =
            resp.json().await.context("failed to parse Gemini response")?;
        let answer = gemini_text(&json);
        if answer.is_empty() {
            bail!("Gemini response missing text content");
        }
        Ok(answer)
    }

    async fn stream(&self, prompt: &RenderedPrompt) -> Result<BoxStream<'static, Result<String>>> {
        let resp = self.send(prompt, "streamGenerateContent?alt=sse").await?;
        Ok(sse_stream(resp, parse_gemini_fragment))
    }
}

fn parse_gemini_fragment(payload: &str) -> Result<Option<String>> {
    let json: serde_json::Value =
        serde_json::from_str(payload).context("failed to parse Gemini stream chunk")?;
    let text = gemini_text(&json);
    Ok(if text.is_empty() { None } else { Some(text) })
}

/// Collect the text parts of the first candidate.
fn gemini_text(json: &serde_json::Value) -> String {
    json.get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default()
}

// ============ SSE plumbing ============

/// Incremental server-sent-events framing: feed raw body bytes in, get the
/// complete `data:` payloads out. Partial lines are buffered until their
/// newline arrives, so fragments split across network reads reassemble
/// correctly.
struct SseBuffer {
    pending: Vec<u8>,
}

impl SseBuffer {
    fn new() -> Self {
        Self {
            pending: Vec::new(),
        }
    }

    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut payloads = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(data) = line.strip_prefix("data:") {
                let data = data.trim_start();
                if !data.is_empty() {
                    payloads.push(data.to_string());
                }
            }
        }
        payloads
    }
}

/// Pump a streaming response through the SSE framer and a per-provider
/// fragment parser. The pump task ends when the body ends, the terminator
/// arrives, or the consumer drops the stream.
fn sse_stream(
    resp: reqwest::Response,
    parse: fn(&str) -> Result<Option<String>>,
) -> BoxStream<'static, Result<String>> {
    let (tx, mut rx) = tokio::sync::mpsc::channel::<Result<String>>(32);

    tokio::spawn(async move {
        let mut buffer = SseBuffer::new();
        let mut body = resp.bytes_stream();
        while let Some(part) = body.next().await {
            let bytes = match part {
                Ok(bytes) => bytes,
                Err(e) => {
                    let _ = tx.send(Err(e.into())).await;
                    return;
                }
            };
            for payload in buffer.push(&bytes) {
                if payload == "[DONE]" {
                    return;
                }
                match parse(&payload) {
                    Ok(Some(text)) if !text.is_empty() => {
                        if tx.send(Ok(text)).await.is_err() {
                            // Consumer went away; stop reading the body.
                            return;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                }
            }
        }
    });

    Box::pin(futures::stream::poll_fn(move |cx| rx.poll_recv(cx)))
}
