//! get command
//!
//! Fetches an issue, parses its body, and enriches it with the hierarchy
//! view: parent and children for tasks, children and available milestones
//! for epics. Returns a structured value suitable for machine or human
//! rendering.

use crate::body::ParsedBody;
use crate::model::{ChildIssue, Condition, IssueKind, RepoRef};
use crate::remote::HybridClient;
use crate::{Result, TrellisError};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct TodoReport {
    pub text: String,
    pub checked: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SectionReport {
    pub title: String,
    pub body: String,
    pub todos: Vec<TodoReport>,
    pub total_todos: usize,
    pub completed_todos: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEntryReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    pub from_state: String,
    pub to_state: String,
    pub actor: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChildSummary {
    pub total: usize,
    pub open: usize,
    pub closed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParentReport {
    pub number: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct GetReport {
    pub number: u64,
    pub title: String,
    pub state: String,
    pub kind: IssueKind,
    pub url: String,
    pub labels: Vec<String>,
    pub assignees: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub milestone: Option<String>,
    pub prelude: String,
    pub sections: Vec<SectionReport>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<ParentReport>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ChildIssue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children_summary: Option<ChildSummary>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub available_milestones: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub log: Vec<LogEntryReport>,
}

pub struct GetCommand<'a> {
    client: &'a HybridClient,
}

impl<'a> GetCommand<'a> {
    pub fn new(client: &'a HybridClient) -> Self {
        Self { client }
    }

    /// Fetch one issue. `expected` other than `Issue` asserts the kind.
    pub async fn execute(
        &self,
        repo: &RepoRef,
        number: u64,
        expected: IssueKind,
    ) -> Result<GetReport> {
        let issue = self.client.rest().get_issue(repo, number).await?;
        let kind = self.client.resolve_kind(repo, &issue).await;

        if expected != IssueKind::Issue && kind != expected {
            return Err(TrellisError::KindMismatch {
                number,
                expected: expected.name().to_string(),
                actual: kind.name().to_string(),
            });
        }

        let parsed = ParsedBody::parse(issue.body.as_deref().unwrap_or(""));

        let sections = parsed
            .sections
            .iter()
            .enumerate()
            .map(|(idx, section)| SectionReport {
                title: section.title.clone(),
                body: parsed.section_text(idx),
                todos: section
                    .todos
                    .iter()
                    .map(|t| TodoReport {
                        text: t.text.clone(),
                        checked: t.checked,
                    })
                    .collect(),
                total_todos: section.todos.len(),
                completed_todos: section.todos.iter().filter(|t| t.checked).count(),
            })
            .collect();

        let log = parsed
            .log
            .as_ref()
            .map(|block| {
                block
                    .entries
                    .iter()
                    .map(|entry| LogEntryReport {
                        timestamp: entry.timestamp.map(|t| t.to_rfc3339()),
                        from_state: entry.from_state.clone(),
                        to_state: entry.to_state.clone(),
                        actor: entry.actor.clone(),
                        message: entry.message.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        // Hierarchy enrichment: children for container kinds, parent for
        // children of the hierarchy.
        let children = match kind {
            IssueKind::Epic | IssueKind::Task => self.client.children(repo, number).await?,
            _ => Vec::new(),
        };
        let children_summary = (!children.is_empty()).then(|| {
            let closed = children.iter().filter(|c| c.is_closed()).count();
            ChildSummary {
                total: children.len(),
                open: children.len() - closed,
                closed,
            }
        });

        let parent = parsed
            .references
            .parent
            .filter(|_| matches!(kind, IssueKind::Task | IssueKind::SubTask))
            .map(|number| ParentReport { number });

        // Epics list the repository's milestones to support planning.
        let available_milestones = if kind == IssueKind::Epic {
            self.client
                .rest()
                .list_milestones(repo)
                .await?
                .into_iter()
                .map(|m| m.title)
                .collect()
        } else {
            Vec::new()
        };

        Ok(GetReport {
            number: issue.number,
            title: issue.title.clone(),
            state: issue.state.clone(),
            kind,
            url: issue.html_url.clone(),
            labels: issue.label_names().iter().map(|s| s.to_string()).collect(),
            assignees: issue.assignees.iter().map(|a| a.login.clone()).collect(),
            milestone: issue.milestone.as_ref().map(|m| m.title.clone()),
            prelude: parsed.prelude_text(),
            sections,
            conditions: parsed.conditions.clone(),
            parent,
            children,
            children_summary,
            available_milestones,
            log,
        })
    }
}
