//! Remote service access
//!
//! Two transports and a façade: a REST wrapper for CRUD, a GraphQL wrapper
//! for hierarchy and type features, and the hybrid client that routes
//! between them with runtime feature detection and fallbacks.

pub mod graphql;
pub mod hybrid;
pub mod rest;
pub mod retry;

pub use graphql::GraphTransport;
pub use hybrid::{HybridClient, LinkOutcome, TypePath};
pub use rest::RestTransport;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Optional remote-service capabilities detected at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    SubIssues,
    IssueTypes,
    ProjectsV2,
}

impl Feature {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::SubIssues => "sub_issues",
            Self::IssueTypes => "issue_types",
            Self::ProjectsV2 => "projects_v2",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Read the bearer credential from the environment. Never read from disk.
pub fn token_from_env() -> crate::Result<String> {
    std::env::var("GITHUB_TOKEN")
        .ok()
        .filter(|t| !t.trim().is_empty())
        .ok_or(crate::TrellisError::MissingCredential)
}
