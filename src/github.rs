//! GitHub repository source.
//!
//! Fetches the public repositories feeding the knowledge base. Pagination
//! walks `per_page=100` pages until an empty page comes back. Failures here
//! are treated as degradable by callers: the chatbot falls back to a
//! profile-only knowledge base.

use anyhow::{bail, Context, Result};
use std::time::Duration;

use crate::models::RepoRecord;

const API_BASE: &str = "https://api.github.com";
const PER_PAGE: usize = 100;

/// Hard cap on pages fetched; nobody's portfolio needs more.
const MAX_PAGES: usize = 10;

pub struct GithubClient {
    username: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl GithubClient {
    /// Build a client for `username`. The token (if any) normally comes
    /// from the `GITHUB_TOKEN` environment variable via [`Self::from_env`].
    pub fn new(username: &str, token: Option<String>) -> Result<Self> {
        if username.trim().is_empty() {
            bail!("github.username is not configured");
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(concat!("folio-chat/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build GitHub HTTP client")?;
        Ok(Self {
            username: username.to_string(),
            token,
            client,
        })
    }

    pub fn from_env(username: &str) -> Result<Self> {
        Self::new(username, std::env::var("GITHUB_TOKEN").ok())
    }

    /// Fetch all public repositories, most recently updated first.
    pub async fn list_repositories(&self) -> Result<Vec<RepoRecord>> {
        let mut repos = Vec::new();

        for page in 1..=MAX_PAGES {
            let url = format!("{}/users/{}/repos", API_BASE, self.username);
            let mut request = self
                .client
                .get(&url)
                .header("Accept", "application/vnd.github.v3+json")
                .query(&[
                    ("per_page", PER_PAGE.to_string()),
                    ("page", page.to_string()),
                    ("sort", "updated".to_string()),
                ]);
            if let Some(token) = &self.token {
                request = request.header("Authorization", format!("token {}", token));
            }

            let response = request
                .send()
                .await
                .context("GitHub repository request failed")?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                bail!("GitHub API error {}: {}", status, body);
            }

            let batch: Vec<RepoRecord> = response
                .json()
                .await
                .context("failed to parse GitHub repository response")?;

            let done = batch.len() < PER_PAGE;
            repos.extend(batch);
            if done {
                break;
            }
        }

        Ok(repos)
    }
}
