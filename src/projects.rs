//! Repository post-processing for the project listing endpoint:
//! keyword categorization, filtering, sorting, and the featured list.

use serde::Serialize;

use crate::config::CategoryRule;
use crate::models::RepoRecord;

/// A repository prepared for display.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectSummary {
    pub name: String,
    pub description: Option<String>,
    pub language: Option<String>,
    pub stars: u64,
    pub forks: u64,
    pub topics: Vec<String>,
    pub url: Option<String>,
    pub category: String,
    pub updated_at: Option<String>,
    pub featured: bool,
}

/// Bucket a repository by matching category keywords against its
/// description, topics, and primary language. First matching rule wins.
pub fn categorize(repo: &RepoRecord, rules: &[CategoryRule]) -> String {
    let haystack = format!(
        "{} {} {}",
        repo.description.as_deref().unwrap_or("").to_lowercase(),
        repo.topics.join(" ").to_lowercase(),
        repo.language.as_deref().unwrap_or("").to_lowercase(),
    );

    for rule in rules {
        if rule.keywords.iter().any(|kw| haystack.contains(kw.as_str())) {
            return rule.name.clone();
        }
    }
    "Other".to_string()
}

/// Filter by category, free-text search over name/description, and a
/// minimum star count. `category = None` or `"All"` matches everything.
pub fn filter_repositories<'a>(
    repos: &'a [RepoRecord],
    rules: &[CategoryRule],
    category: Option<&str>,
    search: Option<&str>,
    min_stars: u64,
) -> Vec<&'a RepoRecord> {
    repos
        .iter()
        .filter(|r| match category {
            None | Some("All") | Some("") => true,
            Some(c) => categorize(r, rules) == c,
        })
        .filter(|r| match search {
            None | Some("") => true,
            Some(term) => {
                let term = term.to_lowercase();
                r.name.to_lowercase().contains(&term)
                    || r.description
                        .as_deref()
                        .unwrap_or("")
                        .to_lowercase()
                        .contains(&term)
            }
        })
        .filter(|r| r.stargazers_count >= min_stars)
        .collect()
}

/// Sort in place by `stars`, `forks`, `name`, or (the default) most
/// recently updated.
pub fn sort_repositories(repos: &mut [&RepoRecord], sort_by: &str) {
    match sort_by {
        "stars" => repos.sort_by(|a, b| b.stargazers_count.cmp(&a.stargazers_count)),
        "forks" => repos.sort_by(|a, b| b.forks_count.cmp(&a.forks_count)),
        "name" => repos.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase())),
        _ => repos.sort_by(|a, b| b.updated_at.cmp(&a.updated_at)),
    }
}

/// Summaries for display. Featured repositories keep their configured order
/// and come first; the rest follow in the given order.
pub fn summarize(
    repos: &[&RepoRecord],
    rules: &[CategoryRule],
    featured_names: &[String],
) -> Vec<ProjectSummary> {
    let summary = |repo: &RepoRecord, featured: bool| ProjectSummary {
        name: repo.name.clone(),
        description: repo.description.clone(),
        language: repo.language.clone(),
        stars: repo.stargazers_count,
        forks: repo.forks_count,
        topics: repo.topics.clone(),
        url: repo.html_url.clone(),
        category: categorize(repo, rules),
        updated_at: repo.updated_at.clone(),
        featured,
    };

    let mut out = Vec::with_capacity(repos.len());
    for name in featured_names {
        if let Some(repo) = repos.iter().find(|r| &r.name == name) {
            out.push(summary(repo, true));
        }
    }
    for repo in repos {
        if !featured_names.contains(&repo.name) {
            out.push(summary(repo, false));
        }
    }
    out
}
