//! Shared command support
//!
//! Repository resolution, body templates, milestone lookup, parent
//! validation, and free-text input handling. Plain functions composed by
//! the verb structs.

use crate::config::Config;
use crate::model::{IssueKind, Milestone, RemoteIssue, RepoRef};
use crate::remote::HybridClient;
use crate::{Result, TrellisError};
use std::io::Read;
use std::path::Path;

/// Resolve the target repository: an explicit `owner/repo` argument wins,
/// else the configured project URL must be repo-shaped.
pub fn resolve_repo(arg: Option<&str>, config: &Config) -> Result<RepoRef> {
    match arg {
        Some(value) => RepoRef::parse(value),
        None => config.repo().ok_or_else(|| {
            TrellisError::RepositoryFormatInvalid(format!(
                "no --repo given and '{}' is not a repository URL",
                config.project_url
            ))
        }),
    }
}

/// Resolve free text from the mutually-exclusive inline/file/stdin trio.
/// A file path of `-` reads stdin.
pub fn resolve_text_input(
    inline: Option<String>,
    file: Option<&Path>,
) -> Result<Option<String>> {
    match (inline, file) {
        (Some(text), None) => Ok(Some(text)),
        (None, Some(path)) if path == Path::new("-") => {
            let mut text = String::new();
            std::io::stdin().read_to_string(&mut text)?;
            Ok(Some(text))
        }
        (None, Some(path)) => Ok(Some(std::fs::read_to_string(path)?)),
        (None, None) => Ok(None),
        (Some(_), Some(_)) => Err(TrellisError::Internal(
            "inline text and file input are mutually exclusive".to_string(),
        )),
    }
}

/// Default body template for a kind: the configured required sections with
/// placeholders, a Tasks list for epics, and a parent reference for
/// children.
pub fn default_body(kind: IssueKind, config: &Config, parent: Option<u64>) -> String {
    let mut parts = Vec::new();

    if let Some(parent) = parent {
        parts.push(format!("**Parent:** #{parent}\n"));
    }

    for section in config.required_sections(kind) {
        parts.push(format!("## {section}\n\n*TODO: Fill in this section*\n"));
    }

    if kind == IssueKind::Epic {
        parts.push("## Tasks\n\n*Sub-issues will be listed here as they are created*\n".to_string());
    }

    parts.join("\n")
}

/// Resolve a milestone by exact title.
pub async fn resolve_milestone(
    client: &HybridClient,
    repo: &RepoRef,
    title: Option<&str>,
) -> Result<Option<Milestone>> {
    let Some(title) = title else {
        return Ok(None);
    };

    let milestones = client.rest().list_milestones(repo).await?;
    match milestones.iter().find(|m| m.title == title) {
        Some(milestone) => Ok(Some(milestone.clone())),
        None => Err(TrellisError::MilestoneNotFound {
            title: title.to_string(),
            available: milestones.into_iter().map(|m| m.title).collect(),
        }),
    }
}

/// Validate a parent issue for a child of the given kind: it must exist, be
/// open, and be the expected kind in the hierarchy.
pub async fn validate_parent(
    client: &HybridClient,
    repo: &RepoRef,
    parent_number: u64,
    child_kind: IssueKind,
) -> Result<RemoteIssue> {
    let expected = child_kind
        .expected_parent()
        .ok_or_else(|| TrellisError::Internal(format!("{child_kind} takes no parent")))?;

    let parent = client.rest().get_issue(repo, parent_number).await?;
    if !parent.is_open() {
        return Err(TrellisError::ParentClosed(parent_number));
    }

    let actual = client.resolve_kind(repo, &parent).await;
    // Untyped parents pass; the repository may predate trellis.
    if actual != IssueKind::Issue && actual != expected {
        return Err(TrellisError::ParentNotOfExpectedKind {
            expected: expected.name().to_string(),
            actual: actual.name().to_string(),
        });
    }

    Ok(parent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StatusMethod;

    fn config() -> Config {
        Config::new("https://github.com/acme/svc", Some(StatusMethod::Labels)).unwrap()
    }

    #[test]
    fn test_resolve_repo_argument_wins() {
        let repo = resolve_repo(Some("other/thing"), &config()).unwrap();
        assert_eq!(repo.full_name(), "other/thing");
    }

    #[test]
    fn test_resolve_repo_falls_back_to_config() {
        let repo = resolve_repo(None, &config()).unwrap();
        assert_eq!(repo.full_name(), "acme/svc");
    }

    #[test]
    fn test_resolve_repo_rejects_project_config_without_arg() {
        let config =
            Config::new("https://github.com/orgs/acme/projects/3", None).unwrap();
        assert!(resolve_repo(None, &config).is_err());
    }

    #[test]
    fn test_default_epic_body_has_required_sections() {
        let body = default_body(IssueKind::Epic, &config(), None);
        for section in ["## Summary", "## Acceptance Criteria", "## Milestone Plan", "## Tasks"] {
            assert!(body.contains(section), "missing {section}");
        }
        assert!(!body.contains("**Parent:**"));

        // The generated template passes its own required-section check
        let parsed = crate::body::ParsedBody::parse(&body);
        assert!(parsed
            .missing_sections(&config().required_sections(IssueKind::Epic))
            .is_empty());
    }

    #[test]
    fn test_default_task_body_references_parent() {
        let body = default_body(IssueKind::Task, &config(), Some(10));
        assert!(body.starts_with("**Parent:** #10\n"));
        assert!(body.contains("## Implementation Plan"));

        let parsed = crate::body::ParsedBody::parse(&body);
        assert_eq!(parsed.references.parent, Some(10));
    }

    #[test]
    fn test_resolve_text_input_inline() {
        let text = resolve_text_input(Some("hello".to_string()), None).unwrap();
        assert_eq!(text.as_deref(), Some("hello"));
        assert_eq!(resolve_text_input(None, None).unwrap(), None);
    }

    #[test]
    fn test_resolve_text_input_file() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"from file").unwrap();
        let text = resolve_text_input(None, Some(file.path())).unwrap();
        assert_eq!(text.as_deref(), Some("from file"));
    }
}
