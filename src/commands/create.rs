//! Issue creation commands
//!
//! One command drives all three kinds: epics stand alone, tasks and
//! sub-tasks carry a required parent relationship. Creation is a composite
//! of typed create plus hierarchy linkage; the hybrid client rolls the
//! child back when the required link cannot be recorded in any form.

use crate::body::{writer::validate_body_size, ParsedBody};
use crate::commands::support;
use crate::config::Config;
use crate::model::{IssueKind, RemoteIssue, RepoRef};
use crate::remote::{HybridClient, LinkOutcome, TypePath};
use crate::workflow::labels_for_new_issue;
use crate::{Result, TrellisError};
use serde::Serialize;

/// Arguments common to create-epic, create-task, and create-sub-task.
#[derive(Debug, Clone, Default)]
pub struct CreateArgs {
    pub title: String,
    pub body: Option<String>,
    pub labels: Vec<String>,
    pub assignees: Vec<String>,
    pub milestone: Option<String>,
    /// Required for task and sub-task
    pub parent: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateReport {
    pub number: u64,
    pub title: String,
    pub url: String,
    pub state: String,
    pub kind: IssueKind,
    pub labels: Vec<String>,
    pub assignees: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub milestone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<u64>,
    pub type_path: TypePath,
    /// Present when the relationship degraded to a body reference
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<&'static str>,
}

pub struct CreateCommand<'a> {
    client: &'a HybridClient,
    config: &'a Config,
    kind: IssueKind,
}

impl<'a> CreateCommand<'a> {
    pub fn new(client: &'a HybridClient, config: &'a Config, kind: IssueKind) -> Self {
        Self {
            client,
            config,
            kind,
        }
    }

    pub async fn execute(&self, repo: &RepoRef, args: CreateArgs) -> Result<CreateReport> {
        let parent = self.validate_parent_argument(&args)?;

        if let Some(parent_number) = parent {
            support::validate_parent(self.client, repo, parent_number, self.kind).await?;
        }

        let body = self.prepare_body(args.body, parent)?;
        validate_body_size(&body)?;

        let parsed = ParsedBody::parse(&body);
        let required = self.config.required_sections(self.kind);
        let missing = parsed.missing_sections(&required);
        if !missing.is_empty() {
            return Err(TrellisError::RequiredSectionMissing(missing));
        }

        let labels = labels_for_new_issue(&args.labels);
        let milestone =
            support::resolve_milestone(self.client, repo, args.milestone.as_deref()).await?;

        let (issue, type_path) = self
            .client
            .create_typed_issue(
                repo,
                self.kind,
                &args.title,
                &body,
                &labels,
                &args.assignees,
                milestone.as_ref(),
            )
            .await?;

        let link = match parent {
            Some(parent_number) => Some(
                self.client
                    .link_child(repo, parent_number, &issue, true)
                    .await?,
            ),
            None => None,
        };

        Ok(self.report(issue, type_path, parent, link))
    }

    fn validate_parent_argument(&self, args: &CreateArgs) -> Result<Option<u64>> {
        match (self.kind.expected_parent(), args.parent) {
            (Some(_), Some(parent)) => Ok(Some(parent)),
            (Some(expected), None) => Err(TrellisError::Internal(format!(
                "create-{} requires a parent {} argument",
                self.kind, expected
            ))),
            (None, _) => Ok(None),
        }
    }

    /// Custom bodies for children get the parent reference injected into the
    /// prelude when missing; default bodies come from the kind's template.
    fn prepare_body(&self, custom: Option<String>, parent: Option<u64>) -> Result<String> {
        match custom {
            None => Ok(support::default_body(self.kind, self.config, parent)),
            Some(body) => match parent {
                None => Ok(body),
                Some(parent_number) => {
                    let mut parsed = ParsedBody::parse(&body);
                    parsed.ensure_parent_reference(parent_number);
                    Ok(parsed.to_body())
                }
            },
        }
    }

    fn report(
        &self,
        issue: RemoteIssue,
        type_path: TypePath,
        parent: Option<u64>,
        link: Option<LinkOutcome>,
    ) -> CreateReport {
        CreateReport {
            number: issue.number,
            title: issue.title.clone(),
            url: issue.html_url.clone(),
            state: issue.state.clone(),
            kind: self.kind,
            labels: issue.label_names().iter().map(|s| s.to_string()).collect(),
            assignees: issue.assignees.iter().map(|a| a.login.clone()).collect(),
            milestone: issue.milestone.as_ref().map(|m| m.title.clone()),
            parent,
            type_path,
            fallback: match link {
                Some(LinkOutcome::BodyReference) => Some("body-reference"),
                _ => None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StatusMethod;

    fn config() -> Config {
        Config::new("https://github.com/acme/svc", Some(StatusMethod::Labels)).unwrap()
    }

    #[test]
    fn test_prepare_body_injects_parent_into_custom_body() {
        let client = HybridClient::new("t").unwrap();
        let config = config();
        let command = CreateCommand::new(&client, &config, IssueKind::Task);

        let body = command
            .prepare_body(Some("## Summary\ncustom\n".to_string()), Some(10))
            .unwrap();
        assert!(body.starts_with("**Parent:** #10"));

        // An existing reference is left alone
        let body = command
            .prepare_body(Some("**Parent:** #10\n\n## Summary\n".to_string()), Some(10))
            .unwrap();
        assert_eq!(body.matches("**Parent:**").count(), 1);
    }

    #[test]
    fn test_parent_argument_required_for_children() {
        let client = HybridClient::new("t").unwrap();
        let config = config();

        let command = CreateCommand::new(&client, &config, IssueKind::SubTask);
        let args = CreateArgs {
            title: "x".to_string(),
            ..Default::default()
        };
        assert!(command.validate_parent_argument(&args).is_err());

        let command = CreateCommand::new(&client, &config, IssueKind::Epic);
        assert_eq!(command.validate_parent_argument(&args).unwrap(), None);
    }
}
