//! Core data model: issue kinds, workflow states, and remote snapshots.

use crate::{Result, TrellisError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The three kinds of the enforced hierarchy, plus a fallback for issues
/// created outside trellis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueKind {
    Epic,
    Task,
    SubTask,
    /// An issue with no recognised type tag
    Issue,
}

impl IssueKind {
    /// Canonical kebab-case name (`sub-task`, never `subtask`).
    pub fn name(&self) -> &'static str {
        match self {
            Self::Epic => "epic",
            Self::Task => "task",
            Self::SubTask => "sub-task",
            Self::Issue => "issue",
        }
    }

    /// Fallback label carried when custom issue types are unavailable.
    pub fn type_label(&self) -> &'static str {
        match self {
            Self::Epic => "type:epic",
            Self::Task => "type:task",
            Self::SubTask => "type:sub-task",
            Self::Issue => "type:issue",
        }
    }

    /// Display name of the custom issue type on the remote service.
    pub fn custom_type_name(&self) -> &'static str {
        match self {
            Self::Epic => "Epic",
            Self::Task => "Task",
            Self::SubTask => "Sub-task",
            Self::Issue => "Issue",
        }
    }

    /// Parse a user- or config-supplied kind. Accepts the historical
    /// `subtask` spelling and normalises it.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "epic" => Some(Self::Epic),
            "task" => Some(Self::Task),
            "sub-task" | "subtask" | "sub_task" => Some(Self::SubTask),
            "issue" => Some(Self::Issue),
            _ => None,
        }
    }

    /// Infer a kind from a label set (`type:*` labels win; unknown ⇒ Issue).
    pub fn from_labels<'a>(labels: impl IntoIterator<Item = &'a str>) -> Self {
        for label in labels {
            match label {
                "type:epic" => return Self::Epic,
                "type:task" => return Self::Task,
                "type:sub-task" | "type:subtask" => return Self::SubTask,
                _ => {}
            }
        }
        Self::Issue
    }

    /// The kind a parent must have for a child of this kind, if any.
    pub fn expected_parent(&self) -> Option<IssueKind> {
        match self {
            Self::Epic | Self::Issue => None,
            Self::Task => Some(Self::Epic),
            Self::SubTask => Some(Self::Task),
        }
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Seven-state per-issue lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkflowState {
    Backlog,
    Planning,
    AwaitingPlanApproval,
    PlanApproved,
    InProgress,
    AwaitingCompletionApproval,
    Closed,
}

impl WorkflowState {
    pub const ALL: [WorkflowState; 7] = [
        Self::Backlog,
        Self::Planning,
        Self::AwaitingPlanApproval,
        Self::PlanApproved,
        Self::InProgress,
        Self::AwaitingCompletionApproval,
        Self::Closed,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Backlog => "backlog",
            Self::Planning => "planning",
            Self::AwaitingPlanApproval => "awaiting-plan-approval",
            Self::PlanApproved => "plan-approved",
            Self::InProgress => "in-progress",
            Self::AwaitingCompletionApproval => "awaiting-completion-approval",
            Self::Closed => "closed",
        }
    }

    /// Label form used by the `labels` status backend.
    pub fn status_label(&self) -> String {
        format!("status:{}", self.name())
    }

    /// Option name used by the project-board single-select Status field.
    pub fn field_option(&self) -> &'static str {
        match self {
            Self::Backlog => "Backlog",
            Self::Planning => "Planning",
            Self::AwaitingPlanApproval => "Awaiting Plan Approval",
            Self::PlanApproved => "Plan Approved",
            Self::InProgress => "In Progress",
            Self::AwaitingCompletionApproval => "Awaiting Completion Approval",
            Self::Closed => "Closed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let normalized = s.trim().to_lowercase().replace(' ', "-");
        Self::ALL
            .iter()
            .copied()
            .find(|state| state.name() == normalized)
    }

    /// Parse a `status:<name>` label.
    pub fn from_status_label(label: &str) -> Option<Self> {
        label.strip_prefix("status:").and_then(Self::parse)
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A repository coordinate, validated to `owner/repo` shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub repo: String,
}

impl RepoRef {
    pub fn parse(s: &str) -> Result<Self> {
        let mut parts = s.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(owner), Some(repo), None) if !owner.is_empty() && !repo.is_empty() => {
                Ok(Self {
                    owner: owner.to_string(),
                    repo: repo.to_string(),
                })
            }
            _ => Err(TrellisError::RepositoryFormatInvalid(s.to_string())),
        }
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

/// A milestone on the remote service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Milestone {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_open")]
    pub state: String,
    #[serde(default)]
    pub due_on: Option<String>,
}

fn default_open() -> String {
    "open".to_string()
}

/// A remote issue snapshot as returned by the REST transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteIssue {
    pub number: u64,
    #[serde(default)]
    pub node_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    pub state: String,
    #[serde(default)]
    pub labels: Vec<Label>,
    #[serde(default)]
    pub assignees: Vec<Account>,
    #[serde(default)]
    pub milestone: Option<Milestone>,
    pub html_url: String,
}

impl RemoteIssue {
    pub fn label_names(&self) -> Vec<&str> {
        self.labels.iter().map(|l| l.name.as_str()).collect()
    }

    pub fn kind(&self) -> IssueKind {
        IssueKind::from_labels(self.labels.iter().map(|l| l.name.as_str()))
    }

    pub fn is_open(&self) -> bool {
        self.state.eq_ignore_ascii_case("open")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub login: String,
}

/// A sign-off gate embedded in an issue body. Distinct from a plain todo:
/// verification carries an owner and supporting metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub text: String,
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signed_off_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requirements: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
    /// Index of the condition heading in the body's line buffer
    pub line: usize,
}

/// A child issue as seen through the hierarchy view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChildIssue {
    pub number: u64,
    pub title: String,
    pub state: String,
    #[serde(default)]
    pub kind: Option<IssueKind>,
}

impl ChildIssue {
    pub fn is_closed(&self) -> bool {
        self.state.eq_ignore_ascii_case("closed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parse_normalises_subtask() {
        assert_eq!(IssueKind::parse("subtask"), Some(IssueKind::SubTask));
        assert_eq!(IssueKind::parse("Sub-Task"), Some(IssueKind::SubTask));
        assert_eq!(IssueKind::parse("epic"), Some(IssueKind::Epic));
        assert_eq!(IssueKind::parse("gadget"), None);
        assert_eq!(IssueKind::SubTask.name(), "sub-task");
    }

    #[test]
    fn test_kind_from_labels() {
        assert_eq!(
            IssueKind::from_labels(["bug", "type:epic"]),
            IssueKind::Epic
        );
        assert_eq!(
            IssueKind::from_labels(["type:subtask"]),
            IssueKind::SubTask
        );
        assert_eq!(IssueKind::from_labels(["bug"]), IssueKind::Issue);
    }

    #[test]
    fn test_expected_parent_chain() {
        assert_eq!(IssueKind::Task.expected_parent(), Some(IssueKind::Epic));
        assert_eq!(IssueKind::SubTask.expected_parent(), Some(IssueKind::Task));
        assert_eq!(IssueKind::Epic.expected_parent(), None);
    }

    #[test]
    fn test_state_label_roundtrip() {
        for state in WorkflowState::ALL {
            let label = state.status_label();
            assert_eq!(WorkflowState::from_status_label(&label), Some(state));
        }
        assert_eq!(WorkflowState::from_status_label("status:nope"), None);
        assert_eq!(WorkflowState::from_status_label("type:epic"), None);
    }

    #[test]
    fn test_state_parse_from_field_option() {
        assert_eq!(
            WorkflowState::parse("In Progress"),
            Some(WorkflowState::InProgress)
        );
        assert_eq!(
            WorkflowState::parse("awaiting-plan-approval"),
            Some(WorkflowState::AwaitingPlanApproval)
        );
    }

    #[test]
    fn test_repo_ref_parse() {
        let repo = RepoRef::parse("acme/svc").unwrap();
        assert_eq!(repo.owner, "acme");
        assert_eq!(repo.repo, "svc");
        assert_eq!(repo.full_name(), "acme/svc");

        assert!(RepoRef::parse("acme").is_err());
        assert!(RepoRef::parse("acme/svc/extra").is_err());
        assert!(RepoRef::parse("/svc").is_err());
    }
}
