//! Document builder.
//!
//! Normalizes the three knowledge sources — GitHub repository records, the
//! static profile, and an optional resume PDF — into a flat list of
//! [`Document`]s ready for chunking. Resume extraction failures are
//! non-fatal: the builder logs a warning and continues with whatever
//! documents exist.

use tracing::warn;

use crate::config::ProfileConfig;
use crate::extract::TextExtractor;
use crate::models::{DocMetadata, Document, RepoRecord, SourceType};

/// Build the full document set. Always emits exactly one personal-info
/// document; repo and resume documents depend on what is available.
pub fn build_documents(
    repos: &[RepoRecord],
    profile: &ProfileConfig,
    resume: Option<&[u8]>,
    extractor: &dyn TextExtractor,
) -> Vec<Document> {
    let mut docs: Vec<Document> = repos.iter().map(repo_document).collect();

    docs.push(profile_document(profile));

    if let Some(bytes) = resume {
        match resume_document(bytes, profile, extractor) {
            Some(doc) => docs.push(doc),
            None => warn!("resume could not be parsed; continuing without it"),
        }
    }

    docs
}

/// Render one repository record into a fixed-template document.
/// Missing fields fall back to "No description" / "N/A" / zero counts,
/// and timestamps are truncated to their date part.
fn repo_document(repo: &RepoRecord) -> Document {
    let content = format!(
        "Project: {}\n\
         Description: {}\n\
         Language: {}\n\
         Stars: {}\n\
         Forks: {}\n\
         Topics: {}\n\
         Created: {}\n\
         Updated: {}\n\
         URL: {}\n",
        repo.name,
        repo.description.as_deref().unwrap_or("No description"),
        repo.language.as_deref().unwrap_or("N/A"),
        repo.stargazers_count,
        repo.forks_count,
        repo.topics.join(", "),
        short_date(repo.created_at.as_deref()),
        short_date(repo.updated_at.as_deref()),
        repo.html_url.as_deref().unwrap_or(""),
    );

    Document {
        content,
        metadata: DocMetadata {
            source_type: SourceType::Repo,
            name: Some(repo.name.clone()),
            url: repo.html_url.clone(),
            language: repo.language.clone(),
            source: None,
        },
    }
}

fn profile_document(profile: &ProfileConfig) -> Document {
    let skills: Vec<&str> = profile
        .skills
        .values()
        .flat_map(|list| list.iter().map(String::as_str))
        .collect();

    let mut content = format!(
        "Name: {}\nTitle: {}\nBio: {}\nSkills: {}\n",
        profile.name,
        profile.title,
        profile.bio,
        skills.join(", "),
    );
    if let Some(email) = &profile.email {
        content.push_str(&format!("Email: {}\n", email));
    }
    if let Some(github) = &profile.github_url {
        content.push_str(&format!("GitHub: {}\n", github));
    }
    if let Some(linkedin) = &profile.linkedin {
        content.push_str(&format!("LinkedIn: {}\n", linkedin));
    }

    Document {
        content,
        metadata: DocMetadata {
            source_type: SourceType::PersonalInfo,
            name: Some(profile.name.clone()),
            ..DocMetadata::default()
        },
    }
}

/// Extract the resume text and append the configured featured-project list.
/// Returns `None` when the bytes do not parse as a PDF.
fn resume_document(
    bytes: &[u8],
    profile: &ProfileConfig,
    extractor: &dyn TextExtractor,
) -> Option<Document> {
    let text = match extractor.extract(bytes) {
        Ok(text) => text,
        Err(e) => {
            warn!("resume extraction failed: {}", e);
            return None;
        }
    };

    let mut content = text;
    if !profile.featured.is_empty() {
        content.push_str("\n\nFeatured projects:\n");
        for name in &profile.featured {
            content.push_str(&format!("- {}\n", name));
        }
    }

    Some(Document {
        content,
        metadata: DocMetadata {
            source_type: SourceType::Resume,
            name: Some(profile.name.clone()),
            source: Some("resume.pdf".to_string()),
            ..DocMetadata::default()
        },
    })
}

/// Truncate an ISO timestamp to its `YYYY-MM-DD` prefix.
fn short_date(ts: Option<&str>) -> &str {
    match ts {
        Some(s) if s.len() >= 10 => &s[..10],
        Some(s) => s,
        None => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::ExtractError;

    struct FakeExtractor(Result<String, ()>);

    impl TextExtractor for FakeExtractor {
        fn extract(&self, _bytes: &[u8]) -> Result<String, ExtractError> {
            self.0
                .clone()
                .map_err(|_| ExtractError::Pdf("unreadable".to_string()))
        }
    }

    fn profile() -> ProfileConfig {
        ProfileConfig {
            name: "Jane Doe".to_string(),
            title: "AI Engineer".to_string(),
            bio: "Builds intelligent systems.".to_string(),
            featured: vec!["studybuddy".to_string()],
            ..ProfileConfig::default()
        }
    }

    fn studybuddy() -> RepoRecord {
        RepoRecord {
            name: "studybuddy".to_string(),
            description: Some("AI study companion".to_string()),
            language: Some("Python".to_string()),
            stargazers_count: 12,
            created_at: Some("2023-04-01T12:30:00Z".to_string()),
            updated_at: Some("2024-01-15T08:00:00Z".to_string()),
            html_url: Some("https://github.com/jdoe/studybuddy".to_string()),
            ..RepoRecord::default()
        }
    }

    #[test]
    fn test_repo_template_renders_fields_and_dates() {
        let doc = repo_document(&studybuddy());
        assert!(doc.content.contains("Project: studybuddy"));
        assert!(doc.content.contains("Description: AI study companion"));
        assert!(doc.content.contains("Stars: 12"));
        assert!(doc.content.contains("Created: 2023-04-01"));
        assert!(doc.content.contains("Updated: 2024-01-15"));
        assert!(!doc.content.contains("T12:30"));
        assert_eq!(doc.metadata.source_type, SourceType::Repo);
        assert_eq!(doc.metadata.name.as_deref(), Some("studybuddy"));
    }

    #[test]
    fn test_repo_template_defaults_for_missing_fields() {
        let doc = repo_document(&RepoRecord {
            name: "bare".to_string(),
            ..RepoRecord::default()
        });
        assert!(doc.content.contains("Description: No description"));
        assert!(doc.content.contains("Language: N/A"));
        assert!(doc.content.contains("Stars: 0"));
    }

    #[test]
    fn test_personal_info_always_present() {
        let docs = build_documents(&[], &profile(), None, &FakeExtractor(Err(())));
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].metadata.source_type, SourceType::PersonalInfo);
        assert!(docs[0].content.contains("Name: Jane Doe"));
    }

    #[test]
    fn test_resume_appends_featured_projects() {
        let docs = build_documents(
            &[],
            &profile(),
            Some(b"%PDF"),
            &FakeExtractor(Ok("Education: XYZ University".to_string())),
        );
        let resume = docs
            .iter()
            .find(|d| d.metadata.source_type == SourceType::Resume)
            .unwrap();
        assert!(resume.content.contains("Education: XYZ University"));
        assert!(resume.content.contains("Featured projects:"));
        assert!(resume.content.contains("- studybuddy"));
    }

    #[test]
    fn test_unparseable_resume_is_skipped() {
        let docs = build_documents(
            &[studybuddy()],
            &profile(),
            Some(b"garbage"),
            &FakeExtractor(Err(())),
        );
        assert_eq!(docs.len(), 2);
        assert!(docs
            .iter()
            .all(|d| d.metadata.source_type != SourceType::Resume));
    }
}
