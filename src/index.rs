//! Persistent embedding index.
//!
//! The index lives in a directory as a single SQLite file (WAL mode) with
//! one row per chunk: text, metadata columns, and the embedding vector as
//! a little-endian f32 BLOB. A `meta` table records the embedding model
//! name so a reopened index is never queried with vectors from a different
//! model.
//!
//! `rebuild` replaces the entire contents in one transaction; `search`
//! never mutates the index.

use anyhow::{bail, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::embedding::{self, Embedder};
use crate::models::{Chunk, DocMetadata, RetrievedChunk, SourceType};

const INDEX_FILE: &str = "index.sqlite";

/// Upper bound on texts per embedding call, to keep remote request bodies
/// and local inference batches reasonable.
const EMBED_BATCH: usize = 64;

pub struct SearchIndex {
    pool: SqlitePool,
    dir: PathBuf,
}

impl SearchIndex {
    /// Open (or create) the index under `dir` and run idempotent migrations.
    pub async fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let db_path = dir.join(INDEX_FILE);

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                position INTEGER NOT NULL,
                content TEXT NOT NULL,
                source_type TEXT NOT NULL,
                name TEXT,
                url TEXT,
                language TEXT,
                source TEXT,
                hash TEXT NOT NULL,
                embedding BLOB NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_position ON chunks(position)")
            .execute(&pool)
            .await?;

        Ok(Self {
            pool,
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Replace the index contents with the given chunks, embedding them in
    /// batches. Records the embedder's model name so later opens can verify
    /// they query the same embedding space.
    pub async fn rebuild(&self, chunks: &[Chunk], embedder: &dyn Embedder) -> Result<usize> {
        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(EMBED_BATCH) {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            vectors.extend(embedder.embed(&texts).await?);
        }

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM chunks").execute(&mut *tx).await?;

        for (position, (chunk, vector)) in chunks.iter().zip(vectors.iter()).enumerate() {
            sqlx::query(
                r#"
                INSERT INTO chunks (id, position, content, source_type, name, url, language, source, hash, embedding)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(position as i64)
            .bind(&chunk.content)
            .bind(chunk.metadata.source_type.as_str())
            .bind(&chunk.metadata.name)
            .bind(&chunk.metadata.url)
            .bind(&chunk.metadata.language)
            .bind(&chunk.metadata.source)
            .bind(&chunk.hash)
            .bind(embedding::vec_to_blob(vector))
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            r#"
            INSERT INTO meta (key, value) VALUES ('embedding_model', ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(embedder.model_name())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO meta (key, value) VALUES ('built_at', ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(chrono::Utc::now().timestamp().to_string())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(chunks.len())
    }

    /// Return the top-`k` chunks by cosine similarity to `query`, ordered
    /// by descending score with insertion position as a deterministic
    /// tie-break. An empty index yields an empty result.
    pub async fn search(
        &self,
        query: &str,
        k: usize,
        embedder: &dyn Embedder,
    ) -> Result<Vec<RetrievedChunk>> {
        let Some(recorded) = self.recorded_model().await? else {
            return Ok(Vec::new());
        };
        if recorded != embedder.model_name() {
            bail!(
                "index was built with embedding model '{}' but '{}' is configured; rebuild the index",
                recorded,
                embedder.model_name()
            );
        }

        let query_vec = embedding::embed_one(embedder, query).await?;

        let rows = sqlx::query(
            "SELECT position, content, source_type, name, url, language, source, embedding FROM chunks",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut scored: Vec<(i64, RetrievedChunk)> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vector = embedding::blob_to_vec(&blob);
                let score = embedding::cosine_similarity(&query_vec, &vector);
                let source_type: String = row.get("source_type");
                let position: i64 = row.get("position");
                (
                    position,
                    RetrievedChunk {
                        content: row.get("content"),
                        metadata: DocMetadata {
                            source_type: SourceType::parse(&source_type),
                            name: row.get("name"),
                            url: row.get("url"),
                            language: row.get("language"),
                            source: row.get("source"),
                        },
                        score,
                    },
                )
            })
            .collect();

        scored.sort_by(|a, b| {
            b.1.score
                .partial_cmp(&a.1.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(k);

        Ok(scored.into_iter().map(|(_, c)| c).collect())
    }

    /// Number of stored chunks.
    pub async fn len(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    /// Embedding model the stored vectors were produced with, if any.
    pub async fn recorded_model(&self) -> Result<Option<String>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM meta WHERE key = 'embedding_model'")
                .fetch_optional(&self.pool)
                .await?;
        Ok(value)
    }

    /// Unix timestamp of the last rebuild, if any.
    pub async fn built_at(&self) -> Result<Option<i64>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM meta WHERE key = 'built_at'")
                .fetch_optional(&self.pool)
                .await?;
        Ok(value.and_then(|s| s.parse::<i64>().ok()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use uuid::Uuid;

    /// Deterministic bag-of-words embedding over a small hashed vocabulary.
    /// Texts sharing tokens score higher than unrelated texts.
    struct HashEmbedder {
        name: String,
    }

    impl HashEmbedder {
        fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
            }
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
            Ok(texts.iter().map(|t| Self::vector(t)).collect())
        }

        fn model_name(&self) -> &str {
            &self.name
        }

        fn dims(&self) -> usize {
            64
        }
    }

    fn chunk(content: &str) -> Chunk {
        Chunk {
            id: Uuid::new_v4().to_string(),
            chunk_index: 0,
            content: content.to_string(),
            metadata: DocMetadata {
                source_type: SourceType::Repo,
                name: Some("demo".to_string()),
                ..DocMetadata::default()
            },
            hash: "h".to_string(),
        }
    }

    #[tokio::test]
    async fn test_rebuild_and_search() {
        let tmp = tempfile::TempDir::new().unwrap();
        let index = SearchIndex::open(tmp.path()).await.unwrap();
        let embedder = HashEmbedder::new("test-hash-64");

        let chunks = vec![
            chunk("studybuddy is an AI study companion written in Python"),
            chunk("weather station firmware for embedded sensors"),
            chunk("personal portfolio website with a chatbot"),
        ];
        let n = index.rebuild(&chunks, &embedder).await.unwrap();
        assert_eq!(n, 3);
        assert_eq!(index.len().await.unwrap(), 3);

        let hits = index
            .search("what is studybuddy", 2, &embedder)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits[0].content.contains("studybuddy"));
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn test_search_is_deterministic() {
        let tmp = tempfile::TempDir::new().unwrap();
        let index = SearchIndex::open(tmp.path()).await.unwrap();
        let embedder = HashEmbedder::new("test-hash-64");

        let chunks: Vec<Chunk> = (0..10)
            .map(|i| chunk(&format!("document number {} about topic {}", i, i % 3)))
            .collect();
        index.rebuild(&chunks, &embedder).await.unwrap();

        let a = index.search("topic 1", 5, &embedder).await.unwrap();
        let b = index.search("topic 1", 5, &embedder).await.unwrap();
        let contents_a: Vec<&str> = a.iter().map(|c| c.content.as_str()).collect();
        let contents_b: Vec<&str> = b.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(contents_a, contents_b);
    }

    #[tokio::test]
    async fn test_empty_index_returns_no_results() {
        let tmp = tempfile::TempDir::new().unwrap();
        let index = SearchIndex::open(tmp.path()).await.unwrap();
        let embedder = HashEmbedder::new("test-hash-64");
        let hits = index.search("anything", 3, &embedder).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_model_mismatch_is_rejected() {
        let tmp = tempfile::TempDir::new().unwrap();
        let index = SearchIndex::open(tmp.path()).await.unwrap();

        index
            .rebuild(&[chunk("some text")], &HashEmbedder::new("model-a"))
            .await
            .unwrap();

        let err = index
            .search("query", 3, &HashEmbedder::new("model-b"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("model"));
    }

    #[tokio::test]
    async fn test_rebuild_replaces_previous_contents() {
        let tmp = tempfile::TempDir::new().unwrap();
        let index = SearchIndex::open(tmp.path()).await.unwrap();
        let embedder = HashEmbedder::new("test-hash-64");

        index
            .rebuild(&[chunk("first generation")], &embedder)
            .await
            .unwrap();
        index
            .rebuild(&[chunk("second generation"), chunk("extra")], &embedder)
            .await
            .unwrap();

        assert_eq!(index.len().await.unwrap(), 2);
        let hits = index.search("first generation", 5, &embedder).await.unwrap();
        assert!(hits.iter().all(|c| !c.content.contains("first generation")));
    }

    #[tokio::test]
    async fn test_reopen_preserves_contents() {
        let tmp = tempfile::TempDir::new().unwrap();
        let embedder = HashEmbedder::new("test-hash-64");
        {
            let index = SearchIndex::open(tmp.path()).await.unwrap();
            index
                .rebuild(&[chunk("persisted fact about rust")], &embedder)
                .await
                .unwrap();
        }
        let reopened = SearchIndex::open(tmp.path()).await.unwrap();
        assert_eq!(reopened.len().await.unwrap(), 1);
        assert_eq!(
            reopened.recorded_model().await.unwrap().as_deref(),
            Some("test-hash-64")
        );
        assert!(reopened.built_at().await.unwrap().is_some());
        let hits = reopened.search("rust", 1, &embedder).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].content.contains("persisted fact"));
    }
}
