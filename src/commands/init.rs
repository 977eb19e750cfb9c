//! init command
//!
//! Idempotent repository setup: custom issue types (with type-label
//! fallback), the full set of workflow status labels, and the project
//! board's Status field when the config uses it. Errors are collected per
//! item and reported in a summary; init never fails fast.

use crate::config::{Config, ProjectUrl, StatusMethod};
use crate::model::{IssueKind, RepoRef, WorkflowState};
use crate::remote::{Feature, HybridClient};
use crate::{Result, TrellisError};
use serde::Serialize;
use tracing::warn;

/// Workflow status labels with colors
const STATUS_LABEL_COLORS: [(WorkflowState, &str); 7] = [
    (WorkflowState::Backlog, "ededed"),
    (WorkflowState::Planning, "d4c5f9"),
    (WorkflowState::AwaitingPlanApproval, "f9d0c4"),
    (WorkflowState::PlanApproved, "c2e0c6"),
    (WorkflowState::InProgress, "0052cc"),
    (WorkflowState::AwaitingCompletionApproval, "fbca04"),
    (WorkflowState::Closed, "0e8a16"),
];

/// Issue type labels with colors (fallback when custom types unavailable)
const TYPE_LABEL_COLORS: [(IssueKind, &str); 3] = [
    (IssueKind::Epic, "7057ff"),
    (IssueKind::Task, "0052cc"),
    (IssueKind::SubTask, "0e8a16"),
];

const ISSUE_TYPE_DESCRIPTIONS: [(IssueKind, &str); 3] = [
    (
        IssueKind::Epic,
        "Large work item that can be broken down into multiple tasks",
    ),
    (
        IssueKind::Task,
        "Standard work item that implements specific functionality",
    ),
    (
        IssueKind::SubTask,
        "Small work item that is part of a larger task",
    ),
];

/// Board Status field options with single-select colors
const FIELD_OPTION_COLORS: [(WorkflowState, &str); 7] = [
    (WorkflowState::Backlog, "GRAY"),
    (WorkflowState::Planning, "PURPLE"),
    (WorkflowState::AwaitingPlanApproval, "YELLOW"),
    (WorkflowState::PlanApproved, "PINK"),
    (WorkflowState::InProgress, "BLUE"),
    (WorkflowState::AwaitingCompletionApproval, "ORANGE"),
    (WorkflowState::Closed, "GREEN"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum InitOutcome {
    Created,
    Existing,
    Fallback,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct InitItem {
    pub name: String,
    pub outcome: InitOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct InitReport {
    pub items: Vec<InitItem>,
    pub fallbacks: Vec<String>,
}

impl InitReport {
    fn push(&mut self, name: impl Into<String>, outcome: InitOutcome, detail: Option<String>) {
        self.items.push(InitItem {
            name: name.into(),
            outcome,
            detail,
        });
    }

    pub fn failed(&self) -> usize {
        self.items
            .iter()
            .filter(|i| i.outcome == InitOutcome::Failed)
            .count()
    }
}

pub struct InitCommand<'a> {
    client: &'a HybridClient,
    config: &'a Config,
}

impl<'a> InitCommand<'a> {
    pub fn new(client: &'a HybridClient, config: &'a Config) -> Self {
        Self { client, config }
    }

    pub async fn execute(&self) -> Result<InitReport> {
        let mut report = InitReport::default();

        let (repo, board_id) = self.resolve_targets(&mut report).await?;

        self.ensure_issue_types(&repo, &mut report).await;

        match (self.config.status_method, board_id) {
            (StatusMethod::StatusField, Some(board_id)) => {
                self.ensure_status_field(&board_id, &repo, &mut report).await;
            }
            (StatusMethod::StatusField, None) => {
                report.fallbacks.push(
                    "project board unavailable; created status labels instead".to_string(),
                );
                self.ensure_status_labels(&repo, &mut report).await;
            }
            (StatusMethod::Labels, _) => {
                self.ensure_status_labels(&repo, &mut report).await;
            }
        }

        Ok(report)
    }

    /// The repository to initialise, and the board when the config points at
    /// one and it resolves.
    async fn resolve_targets(
        &self,
        report: &mut InitReport,
    ) -> Result<(RepoRef, Option<String>)> {
        match &self.config.parsed_url {
            ProjectUrl::Repo { owner, repo } => Ok((
                RepoRef {
                    owner: owner.clone(),
                    repo: repo.clone(),
                },
                None,
            )),
            ProjectUrl::Project {
                scope,
                owner,
                number,
            } => {
                let board = self
                    .client
                    .graphql()
                    .resolve_project(scope, owner, *number)
                    .await;
                match board {
                    Ok(board) => {
                        let repo = board.repository.as_ref().map(|(owner, name)| RepoRef {
                            owner: owner.clone(),
                            repo: name.clone(),
                        });
                        match repo {
                            Some(repo) => Ok((repo, Some(board.id))),
                            None => Err(TrellisError::ConfigInvalid {
                                path: crate::config::CONFIG_FILE.into(),
                                detail: format!(
                                    "project board '{}' has no linked repository; \
                                     use a repository URL instead",
                                    board.title
                                ),
                            }),
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Project board resolution failed");
                        report.push(
                            "project board",
                            InitOutcome::Failed,
                            Some(e.to_string()),
                        );
                        Err(e)
                    }
                }
            }
        }
    }

    /// Custom issue types via the graph transport, else type labels.
    async fn ensure_issue_types(&self, repo: &RepoRef, report: &mut InitReport) {
        if self.client.feature_available(Feature::IssueTypes, repo).await {
            let existing = match self
                .client
                .graphql()
                .list_issue_types(&repo.owner, &repo.repo)
                .await
            {
                Ok(types) => types,
                Err(e) => {
                    report.push("issue types", InitOutcome::Failed, Some(e.to_string()));
                    return self.ensure_type_labels(repo, report).await;
                }
            };

            let repo_id = match self
                .client
                .graphql()
                .repository_id(&repo.owner, &repo.repo)
                .await
            {
                Ok(id) => id,
                Err(e) => {
                    report.push("issue types", InitOutcome::Failed, Some(e.to_string()));
                    return self.ensure_type_labels(repo, report).await;
                }
            };

            for (kind, description) in ISSUE_TYPE_DESCRIPTIONS {
                let name = kind.custom_type_name();
                if existing.iter().any(|t| t.name.eq_ignore_ascii_case(name)) {
                    report.push(format!("issue type '{name}'"), InitOutcome::Existing, None);
                    continue;
                }
                match self
                    .client
                    .graphql()
                    .create_issue_type(&repo_id, name, description)
                    .await
                {
                    Ok(()) => {
                        report.push(format!("issue type '{name}'"), InitOutcome::Created, None)
                    }
                    Err(TrellisError::FeatureUnavailable(feature)) => {
                        self.client.mark_feature(feature, false);
                        report.fallbacks.push(
                            "custom issue types unavailable; using type labels".to_string(),
                        );
                        return self.ensure_type_labels(repo, report).await;
                    }
                    Err(e) => report.push(
                        format!("issue type '{name}'"),
                        InitOutcome::Failed,
                        Some(e.to_string()),
                    ),
                }
            }
            return;
        }

        report
            .fallbacks
            .push("custom issue types unavailable; using type labels".to_string());
        self.ensure_type_labels(repo, report).await;
    }

    async fn ensure_type_labels(&self, repo: &RepoRef, report: &mut InitReport) {
        let existing = match self.client.rest().list_labels(repo).await {
            Ok(labels) => labels,
            Err(e) => {
                report.push("type labels", InitOutcome::Failed, Some(e.to_string()));
                return;
            }
        };

        for (kind, color) in TYPE_LABEL_COLORS {
            let name = kind.type_label();
            if existing.iter().any(|l| l.name == name) {
                report.push(format!("label '{name}'"), InitOutcome::Existing, None);
                continue;
            }
            match self.client.rest().create_label(repo, name, color).await {
                Ok(_) => report.push(format!("label '{name}'"), InitOutcome::Fallback, None),
                Err(e) => report.push(
                    format!("label '{name}'"),
                    InitOutcome::Failed,
                    Some(e.to_string()),
                ),
            }
        }
    }

    async fn ensure_status_labels(&self, repo: &RepoRef, report: &mut InitReport) {
        let existing = match self.client.rest().list_labels(repo).await {
            Ok(labels) => labels,
            Err(e) => {
                report.push("status labels", InitOutcome::Failed, Some(e.to_string()));
                return;
            }
        };

        for (state, color) in STATUS_LABEL_COLORS {
            let name = state.status_label();
            if existing.iter().any(|l| l.name == name) {
                report.push(format!("label '{name}'"), InitOutcome::Existing, None);
                continue;
            }
            match self.client.rest().create_label(repo, &name, color).await {
                Ok(_) => report.push(format!("label '{name}'"), InitOutcome::Created, None),
                Err(e) => report.push(
                    format!("label '{name}'"),
                    InitOutcome::Failed,
                    Some(e.to_string()),
                ),
            }
        }
    }

    /// Ensure the board has a Status field carrying every workflow state.
    async fn ensure_status_field(
        &self,
        board_id: &str,
        repo: &RepoRef,
        report: &mut InitReport,
    ) {
        let fields = match self.client.graphql().project_fields(board_id).await {
            Ok(fields) => fields,
            Err(e) => {
                report.push("status field", InitOutcome::Failed, Some(e.to_string()));
                report
                    .fallbacks
                    .push("board fields unreadable; created status labels instead".to_string());
                return self.ensure_status_labels(repo, report).await;
            }
        };

        if let Some(status) = fields.iter().find(|f| f.name.eq_ignore_ascii_case("Status")) {
            let mut complete = true;
            for (state, _) in FIELD_OPTION_COLORS {
                let wanted = state.field_option();
                if !status
                    .options
                    .iter()
                    .any(|o| o.name.eq_ignore_ascii_case(wanted))
                {
                    complete = false;
                    report.push(
                        format!("status option '{wanted}'"),
                        InitOutcome::Failed,
                        Some("option missing; add it on the project board".to_string()),
                    );
                }
            }
            if complete {
                report.push("status field 'Status'", InitOutcome::Existing, None);
            }
            return;
        }

        let options: Vec<(&str, &str)> = FIELD_OPTION_COLORS
            .iter()
            .map(|(state, color)| (state.field_option(), *color))
            .collect();
        match self
            .client
            .graphql()
            .create_project_status_field(board_id, "Status", &options)
            .await
        {
            Ok(()) => report.push("status field 'Status'", InitOutcome::Created, None),
            Err(e) => {
                report.push(
                    "status field 'Status'",
                    InitOutcome::Failed,
                    Some(e.to_string()),
                );
                report
                    .fallbacks
                    .push("status field creation failed; created status labels instead".to_string());
                self.ensure_status_labels(repo, report).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_state_has_a_label_color_and_field_option() {
        assert_eq!(STATUS_LABEL_COLORS.len(), WorkflowState::ALL.len());
        assert_eq!(FIELD_OPTION_COLORS.len(), WorkflowState::ALL.len());
        for state in WorkflowState::ALL {
            assert!(STATUS_LABEL_COLORS.iter().any(|(s, _)| *s == state));
            assert!(FIELD_OPTION_COLORS.iter().any(|(s, _)| *s == state));
        }
    }

    #[test]
    fn test_report_failed_count() {
        let mut report = InitReport::default();
        report.push("a", InitOutcome::Created, None);
        report.push("b", InitOutcome::Failed, Some("boom".to_string()));
        assert_eq!(report.failed(), 1);
        assert_eq!(report.items.len(), 2);
    }
}
