//! Error types for trellis
//!
//! Defines a comprehensive error enum covering all failure modes across the system.
//! Uses thiserror for ergonomic error handling.

use crate::remote::Feature;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for trellis operations
pub type Result<T> = std::result::Result<T, TrellisError>;

/// Comprehensive error type for trellis operations
#[derive(Error, Debug)]
pub enum TrellisError {
    /// GITHUB_TOKEN is not set
    #[error(
        "GitHub token not found.\n\
         Set the GITHUB_TOKEN environment variable with a personal access token\n\
         that has Issues read/write access."
    )]
    MissingCredential,

    /// Token rejected by the API
    #[error("GitHub authentication failed: {0}")]
    InvalidCredential(String),

    /// trellis.yaml does not exist
    #[error(
        "Configuration file not found: {0}\n\
         Create a trellis.yaml with at minimum:\n  \
         project_url: https://github.com/owner/repo"
    )]
    ConfigMissing(PathBuf),

    /// trellis.yaml exists but cannot be used
    #[error("Invalid configuration in {path}: {detail}")]
    ConfigInvalid { path: PathBuf, detail: String },

    /// A required configuration field is absent
    #[error("Required configuration field '{0}' is missing from trellis.yaml")]
    ConfigMissingField(String),

    /// Repository argument is not owner/repo
    #[error("Invalid repository format '{0}'. Expected 'owner/repo'")]
    RepositoryFormatInvalid(String),

    /// Issue does not exist in the repository
    #[error("Issue not found: {0}")]
    IssueNotFound(String),

    /// The API refused the operation
    #[error("Access forbidden: {0}")]
    Forbidden(String),

    /// An HTTP call exceeded its deadline
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Rate limited and retries exhausted
    #[error("GitHub rate limit exceeded; retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Transient transport failure after retries
    #[error("Network error: {0}")]
    NetworkError(String),

    /// A GraphQL feature this repository does not have
    #[error("GitHub feature '{0}' is not available for this repository")]
    FeatureUnavailable(Feature),

    /// Workflow transition attempted from the wrong state
    #[error("Cannot {attempted} from state '{current}'")]
    IllegalTransition { current: String, attempted: String },

    /// submit-plan precondition: body is missing required sections
    #[error("Missing required sections: {}", .0.join(", "))]
    RequiredSectionMissing(Vec<String>),

    /// approve-work precondition: open children or unchecked todos remain
    #[error("Completion blocked: {} open child issue(s), {} unchecked todo(s)",
            open_children.len(), unchecked_todos.len())]
    CompletionBlocked {
        open_children: Vec<u64>,
        /// (section title, todo text) pairs
        unchecked_todos: Vec<(String, String)>,
    },

    /// create-todo collision within a section
    #[error("Todo \"{0}\" already exists in that section")]
    DuplicateTodo(String),

    /// Section title did not match any section in the body
    #[error("Section \"{name}\" not found")]
    SectionNotFound { name: String, available: Vec<String> },

    /// check-todo substring matched more than one todo
    #[error("\"{pattern}\" matches {} todos; use more specific text", candidates.len())]
    AmbiguousMatch {
        pattern: String,
        candidates: Vec<String>,
    },

    /// Body would exceed GitHub's size ceiling
    #[error("Issue body would be {0} characters; GitHub's limit is 65536")]
    BodyTooLarge(usize),

    /// Composite create rolled back after a hard linkage failure
    #[error("Parent relationship is required but step '{step}' failed; the created issue was rolled back")]
    RelationshipRequired { step: String },

    /// Parent issue exists but is the wrong kind for this hierarchy edge
    #[error("Parent issue is a {actual}, expected a {expected}")]
    ParentNotOfExpectedKind { expected: String, actual: String },

    /// Cannot attach children to a closed parent
    #[error("Cannot create a child under closed issue #{0}")]
    ParentClosed(u64),

    /// The fetched issue is not the kind the command was asked for
    #[error("Issue #{number} is a {actual}, not a {expected}")]
    KindMismatch {
        number: u64,
        expected: String,
        actual: String,
    },

    /// Milestone title did not resolve
    #[error("Milestone '{title}' not found")]
    MilestoneNotFound {
        title: String,
        available: Vec<String>,
    },

    /// check-todo substring matched nothing
    #[error("No todos matching \"{pattern}\" in that section")]
    TodoNotFound {
        pattern: String,
        available: Vec<String>,
    },

    /// A required free-text input was not supplied in any of its forms
    #[error("Missing input: provide {0}")]
    MissingInput(&'static str),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Programmer bugs surfaced at runtime; never swallowed
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TrellisError {
    /// Process exit code for this error.
    ///
    /// 1 user error, 2 remote error, 3 authentication, 4 workflow/precondition
    /// violation, 5 internal.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConfigMissing(_)
            | Self::ConfigInvalid { .. }
            | Self::ConfigMissingField(_)
            | Self::RepositoryFormatInvalid(_)
            | Self::DuplicateTodo(_)
            | Self::SectionNotFound { .. }
            | Self::AmbiguousMatch { .. }
            | Self::BodyTooLarge(_)
            | Self::ParentNotOfExpectedKind { .. }
            | Self::ParentClosed(_)
            | Self::KindMismatch { .. }
            | Self::MilestoneNotFound { .. }
            | Self::TodoNotFound { .. }
            | Self::MissingInput(_)
            | Self::Io(_) => 1,

            Self::IssueNotFound(_)
            | Self::Forbidden(_)
            | Self::Timeout(_)
            | Self::RateLimited { .. }
            | Self::NetworkError(_)
            | Self::FeatureUnavailable(_)
            | Self::RelationshipRequired { .. }
            | Self::Http(_) => 2,

            Self::MissingCredential | Self::InvalidCredential(_) => 3,

            Self::IllegalTransition { .. }
            | Self::RequiredSectionMissing(_)
            | Self::CompletionBlocked { .. } => 4,

            Self::Json(_) | Self::Internal(_) => 5,
        }
    }

    /// Stable snake_case tag for the JSON error envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingCredential => "missing_credential",
            Self::InvalidCredential(_) => "invalid_credential",
            Self::ConfigMissing(_) => "config_missing",
            Self::ConfigInvalid { .. } => "config_invalid",
            Self::ConfigMissingField(_) => "config_missing_field",
            Self::RepositoryFormatInvalid(_) => "repository_format_invalid",
            Self::IssueNotFound(_) => "issue_not_found",
            Self::Forbidden(_) => "forbidden",
            Self::Timeout(_) => "timeout",
            Self::RateLimited { .. } => "rate_limited",
            Self::NetworkError(_) => "network_error",
            Self::FeatureUnavailable(_) => "feature_unavailable",
            Self::IllegalTransition { .. } => "illegal_transition",
            Self::RequiredSectionMissing(_) => "required_section_missing",
            Self::CompletionBlocked { .. } => "completion_blocked",
            Self::DuplicateTodo(_) => "duplicate_todo",
            Self::SectionNotFound { .. } => "section_not_found",
            Self::AmbiguousMatch { .. } => "ambiguous_match",
            Self::BodyTooLarge(_) => "body_too_large",
            Self::RelationshipRequired { .. } => "relationship_required",
            Self::ParentNotOfExpectedKind { .. } => "parent_not_of_expected_kind",
            Self::ParentClosed(_) => "parent_closed",
            Self::KindMismatch { .. } => "kind_mismatch",
            Self::MilestoneNotFound { .. } => "milestone_not_found",
            Self::TodoNotFound { .. } => "todo_not_found",
            Self::MissingInput(_) => "missing_input",
            Self::Io(_) => "io_error",
            Self::Json(_) => "internal_error",
            Self::Http(_) => "network_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Items the user can pick from to fix the error, when the failure has
    /// a finite candidate set.
    pub fn valid_options(&self) -> Option<Vec<String>> {
        match self {
            Self::SectionNotFound { available, .. } if !available.is_empty() => {
                Some(available.clone())
            }
            Self::AmbiguousMatch { candidates, .. } => Some(candidates.clone()),
            Self::MilestoneNotFound { available, .. } if !available.is_empty() => {
                Some(available.clone())
            }
            Self::TodoNotFound { available, .. } if !available.is_empty() => {
                Some(available.clone())
            }
            Self::CompletionBlocked {
                open_children,
                unchecked_todos,
            } => {
                let mut items: Vec<String> = open_children
                    .iter()
                    .map(|n| format!("open child #{n}"))
                    .collect();
                items.extend(
                    unchecked_todos
                        .iter()
                        .map(|(section, text)| format!("unchecked in {section}: {text}")),
                );
                Some(items)
            }
            Self::RequiredSectionMissing(names) => Some(names.clone()),
            _ => None,
        }
    }
}
