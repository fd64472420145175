//! Core data models used throughout folio-chat.
//!
//! These types represent the documents, chunks, and chat messages that flow
//! through the ingestion and question-answering pipeline, plus the raw
//! repository records fetched from GitHub.

use serde::{Deserialize, Serialize};

/// Where a document's text originally came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Repo,
    PersonalInfo,
    Resume,
    #[default]
    Unknown,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Repo => "repo",
            SourceType::PersonalInfo => "personal_info",
            SourceType::Resume => "resume",
            SourceType::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "repo" => SourceType::Repo,
            "personal_info" => SourceType::PersonalInfo,
            "resume" => SourceType::Resume,
            _ => SourceType::Unknown,
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata attached to a document and copied unchanged onto every chunk
/// derived from it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocMetadata {
    pub source_type: SourceType,
    pub name: Option<String>,
    pub url: Option<String>,
    pub language: Option<String>,
    pub source: Option<String>,
}

/// A normalized text document produced by the document builder.
/// Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub content: String,
    pub metadata: DocMetadata,
}

/// A bounded substring of a parent [`Document`], the unit of embedding and
/// retrieval. Carries the parent metadata plus a per-parent index and a
/// SHA-256 hash of its text.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub chunk_index: i64,
    pub content: String,
    pub metadata: DocMetadata,
    pub hash: String,
}

/// A chunk returned from the index, paired with its similarity score.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub content: String,
    pub metadata: DocMetadata,
    pub score: f32,
}

/// Who authored a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
}

/// One turn of the visitor conversation. Held in memory for the life of a
/// session, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

/// A repository record as returned by the GitHub REST API. Only the fields
/// the pipeline reads are deserialized; everything else in the payload is
/// ignored. All fields are defaulted so partial payloads still parse.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepoRecord {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub stargazers_count: u64,
    #[serde(default)]
    pub forks_count: u64,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub license: Option<RepoLicense>,
}

/// License info nested inside a repository record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepoLicense {
    #[serde(default)]
    pub spdx_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}
