//! Workflow engine
//!
//! The seven-state lifecycle: a typed transition table, precondition
//! evaluation against the parsed body and the hierarchy view, status
//! projection onto the configured backend (label set or project-board
//! field), and the append-only audit log embedded in the issue body.

use crate::body::ParsedBody;
use crate::config::{Config, ProjectUrl, StatusMethod};
use crate::model::{RepoRef, WorkflowState};
use crate::remote::graphql::ProjectInfo;
use crate::remote::{Feature, HybridClient};
use crate::{Result, TrellisError};
use serde::Serialize;
use tracing::{debug, info, warn};

/// What must hold before a transition may fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    None,
    /// All sections in `required_sections[kind]` present in the body
    RequiredSections,
    /// Every todo checked and every child issue closed
    CompletionReady,
}

/// One row of the transition table.
#[derive(Debug, Clone, Copy)]
pub struct Transition {
    pub name: &'static str,
    pub from: WorkflowState,
    pub to: WorkflowState,
    pub precondition: Precondition,
}

/// The transition DAG. Any attempt whose from-state does not match the
/// current state fails with `IllegalTransition`.
pub const TRANSITIONS: [Transition; 6] = [
    Transition {
        name: "start-plan",
        from: WorkflowState::Backlog,
        to: WorkflowState::Planning,
        precondition: Precondition::None,
    },
    Transition {
        name: "submit-plan",
        from: WorkflowState::Planning,
        to: WorkflowState::AwaitingPlanApproval,
        precondition: Precondition::RequiredSections,
    },
    Transition {
        name: "approve-plan",
        from: WorkflowState::AwaitingPlanApproval,
        to: WorkflowState::PlanApproved,
        precondition: Precondition::None,
    },
    Transition {
        name: "start-work",
        from: WorkflowState::PlanApproved,
        to: WorkflowState::InProgress,
        precondition: Precondition::None,
    },
    Transition {
        name: "submit-work",
        from: WorkflowState::InProgress,
        to: WorkflowState::AwaitingCompletionApproval,
        precondition: Precondition::None,
    },
    Transition {
        name: "approve-work",
        from: WorkflowState::AwaitingCompletionApproval,
        to: WorkflowState::Closed,
        precondition: Precondition::CompletionReady,
    },
];

pub fn find_transition(name: &str) -> Option<&'static Transition> {
    TRANSITIONS.iter().find(|t| t.name == name)
}

/// Outcome of a successful transition.
#[derive(Debug, Clone, Serialize)]
pub struct TransitionReport {
    pub number: u64,
    pub title: String,
    pub transition: String,
    pub from: WorkflowState,
    pub to: WorkflowState,
    pub actor: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub log_entries: usize,
    /// Set when the status backend degraded or canonicalised
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    pub url: String,
}

/// Executes transitions against the configured status backend.
pub struct WorkflowEngine<'a> {
    client: &'a HybridClient,
    config: &'a Config,
}

impl<'a> WorkflowEngine<'a> {
    pub fn new(client: &'a HybridClient, config: &'a Config) -> Self {
        Self { client, config }
    }

    /// Run one named transition. Reads current state from the configured
    /// backend, checks the from-state and precondition, projects the new
    /// state, and appends one audit entry to the body's log block.
    pub async fn execute(
        &self,
        repo: &RepoRef,
        number: u64,
        transition_name: &str,
        message: Option<String>,
    ) -> Result<TransitionReport> {
        let transition = find_transition(transition_name).ok_or_else(|| {
            TrellisError::Internal(format!("unknown transition '{transition_name}'"))
        })?;

        let issue = self.client.rest().get_issue(repo, number).await?;
        let mut parsed = ParsedBody::parse(issue.body.as_deref().unwrap_or(""));

        let board = self.board_backend(repo).await;
        let mut warning = match (self.config.status_method, &board) {
            (StatusMethod::StatusField, None) => Some(
                "project status field unavailable; tracking state with labels".to_string(),
            ),
            _ => None,
        };

        let (current, state_warning) = self.read_state(repo, &issue, board.as_ref()).await?;
        if warning.is_none() {
            warning = state_warning;
        }

        if current != transition.from {
            return Err(TrellisError::IllegalTransition {
                current: current.name().to_string(),
                attempted: transition.name.to_string(),
            });
        }

        self.check_precondition(repo, number, &issue, &parsed, transition)
            .await?;

        self.project_status(repo, &issue, transition.to, board.as_ref())
            .await?;

        if transition.to == WorkflowState::Closed {
            self.client.rest().close_issue(repo, number).await?;
        }

        let actor = self.client.actor().await?;
        parsed.append_log_entry(
            transition.from.name(),
            transition.to.name(),
            &actor,
            message.as_deref(),
        );
        self.client
            .rest()
            .update_issue_body(repo, number, &parsed.to_body_checked()?)
            .await?;

        info!(
            repo = %repo,
            number,
            transition = transition.name,
            from = transition.from.name(),
            to = transition.to.name(),
            "Workflow transition applied"
        );

        Ok(TransitionReport {
            number,
            title: issue.title.clone(),
            transition: transition.name.to_string(),
            from: transition.from,
            to: transition.to,
            actor,
            message,
            log_entries: parsed.log_entry_count(),
            warning,
            url: issue.html_url,
        })
    }

    /// The project board for this invocation, or None when state is tracked
    /// with labels. The config is authoritative; `status_field` degrades to
    /// labels only when the board cannot be reached, and that degradation is
    /// surfaced to the user.
    async fn board_backend(&self, repo: &RepoRef) -> Option<ProjectInfo> {
        match self.config.status_method {
            StatusMethod::Labels => None,
            StatusMethod::StatusField => {
                if !self
                    .client
                    .feature_available(Feature::ProjectsV2, repo)
                    .await
                {
                    return None;
                }
                match self.resolve_board().await {
                    Ok(board) => Some(board),
                    Err(e) => {
                        warn!(error = %e, "Project board unavailable, degrading to labels");
                        self.client.mark_feature(Feature::ProjectsV2, false);
                        None
                    }
                }
            }
        }
    }

    async fn resolve_board(&self) -> Result<ProjectInfo> {
        match &self.config.parsed_url {
            ProjectUrl::Project {
                scope,
                owner,
                number,
            } => {
                self.client
                    .graphql()
                    .resolve_project(scope, owner, *number)
                    .await
            }
            // A repo-shaped URL has no board to resolve.
            ProjectUrl::Repo { .. } => Err(TrellisError::FeatureUnavailable(Feature::ProjectsV2)),
        }
    }

    /// Current state from the chosen backend. The closed flag always wins;
    /// multiple `status:*` labels canonicalise to the lexicographically
    /// first with a warning.
    async fn read_state(
        &self,
        repo: &RepoRef,
        issue: &crate::model::RemoteIssue,
        board: Option<&ProjectInfo>,
    ) -> Result<(WorkflowState, Option<String>)> {
        if !issue.is_open() {
            return Ok((WorkflowState::Closed, None));
        }

        let Some(board) = board else {
            let mut status_labels: Vec<&str> = issue
                .labels
                .iter()
                .map(|l| l.name.as_str())
                .filter(|name| name.starts_with("status:"))
                .collect();
            status_labels.sort_unstable();

            let warning = if status_labels.len() > 1 {
                let chosen = status_labels[0];
                warn!(labels = ?status_labels, chosen, "Multiple status labels, canonicalising");
                Some(format!(
                    "multiple status labels found ({}); treating '{}' as authoritative",
                    status_labels.join(", "),
                    chosen
                ))
            } else {
                None
            };

            let state = status_labels
                .first()
                .and_then(|label| WorkflowState::from_status_label(label))
                .unwrap_or(WorkflowState::Backlog);
            return Ok((state, warning));
        };

        let node_id = self.client.node_id(repo, issue.number).await?;
        let value = self
            .client
            .graphql()
            .issue_project_status(&node_id, &board.id)
            .await?;

        let state = value
            .as_deref()
            .and_then(WorkflowState::parse)
            .unwrap_or(WorkflowState::Backlog);
        Ok((state, None))
    }

    async fn check_precondition(
        &self,
        repo: &RepoRef,
        number: u64,
        issue: &crate::model::RemoteIssue,
        parsed: &ParsedBody,
        transition: &Transition,
    ) -> Result<()> {
        match transition.precondition {
            Precondition::None => Ok(()),
            Precondition::RequiredSections => {
                let kind = self.client.resolve_kind(repo, issue).await;
                let required = self.config.required_sections(kind);
                let missing = parsed.missing_sections(&required);
                if missing.is_empty() {
                    Ok(())
                } else {
                    Err(TrellisError::RequiredSectionMissing(missing))
                }
            }
            Precondition::CompletionReady => {
                // Body and children are re-read inside this same invocation;
                // the TOCTOU window against other writers is accepted.
                let unchecked_todos: Vec<(String, String)> = parsed
                    .all_todos()
                    .filter(|(_, todo)| !todo.checked)
                    .map(|(section, todo)| (section.title.clone(), todo.text.clone()))
                    .collect();

                let open_children: Vec<u64> = self
                    .client
                    .children(repo, number)
                    .await?
                    .iter()
                    .filter(|child| !child.is_closed())
                    .map(|child| child.number)
                    .collect();

                if unchecked_todos.is_empty() && open_children.is_empty() {
                    Ok(())
                } else {
                    Err(TrellisError::CompletionBlocked {
                        open_children,
                        unchecked_todos,
                    })
                }
            }
        }
    }

    /// Project the new state onto the backend. Labels swap atomically via a
    /// whole-set replacement; the board path resolves the item and sets the
    /// single-select option.
    async fn project_status(
        &self,
        repo: &RepoRef,
        issue: &crate::model::RemoteIssue,
        to: WorkflowState,
        board: Option<&ProjectInfo>,
    ) -> Result<()> {
        let Some(board) = board else {
            let mut labels: Vec<String> = issue
                .labels
                .iter()
                .map(|l| l.name.clone())
                .filter(|name| !name.starts_with("status:"))
                .collect();
            labels.push(to.status_label());

            debug!(repo = %repo, number = issue.number, to = to.name(), "Swapping status label");
            self.client
                .rest()
                .set_labels(repo, issue.number, &labels)
                .await?;
            return Ok(());
        };

        let fields = self.client.graphql().project_fields(&board.id).await?;
        let status_field = fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case("Status"))
            .ok_or(TrellisError::FeatureUnavailable(Feature::ProjectsV2))?;
        let option = status_field
            .options
            .iter()
            .find(|o| o.name.eq_ignore_ascii_case(to.field_option()))
            .ok_or(TrellisError::FeatureUnavailable(Feature::ProjectsV2))?;

        let node_id = self.client.node_id(repo, issue.number).await?;
        let item_id = self
            .client
            .graphql()
            .add_issue_to_project(&board.id, &node_id)
            .await?;

        debug!(repo = %repo, number = issue.number, to = to.field_option(), "Setting board status");
        self.client
            .graphql()
            .set_project_field(&board.id, &item_id, &status_field.id, &option.id)
            .await
    }
}

/// Swap helper used by creation flows: the full label set for a fresh issue.
pub fn labels_for_new_issue(extra: &[String]) -> Vec<String> {
    let mut labels = vec![WorkflowState::Backlog.status_label()];
    for label in extra {
        if !labels.contains(label) {
            labels.push(label.clone());
        }
    }
    labels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_table_is_a_chain() {
        // Each transition's to-state is the next one's from-state, ending closed
        for pair in TRANSITIONS.windows(2) {
            assert_eq!(pair[0].to, pair[1].from);
        }
        assert_eq!(TRANSITIONS[0].from, WorkflowState::Backlog);
        assert_eq!(TRANSITIONS[5].to, WorkflowState::Closed);
    }

    #[test]
    fn test_find_transition() {
        let submit = find_transition("submit-plan").unwrap();
        assert_eq!(submit.from, WorkflowState::Planning);
        assert_eq!(submit.precondition, Precondition::RequiredSections);

        let approve = find_transition("approve-work").unwrap();
        assert_eq!(approve.precondition, Precondition::CompletionReady);

        assert!(find_transition("teleport").is_none());
    }

    #[test]
    fn test_labels_for_new_issue() {
        let labels = labels_for_new_issue(&["bug".to_string()]);
        assert_eq!(labels, vec!["status:backlog", "bug"]);

        // status:backlog is never duplicated
        let labels = labels_for_new_issue(&["status:backlog".to_string()]);
        assert_eq!(labels, vec!["status:backlog"]);
    }
}
