//! Todo commands
//!
//! create-todo appends a checkbox line to a section (optionally creating the
//! section); check-todo toggles a single todo matched by substring. Both
//! read the latest body, apply one edit through the writer, and write back.

use crate::body::ParsedBody;
use crate::model::{RemoteIssue, RepoRef};
use crate::remote::HybridClient;
use crate::{Result, TrellisError};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct CreateTodoReport {
    pub number: u64,
    pub title: String,
    pub url: String,
    pub section: String,
    pub todo: String,
    pub section_created: bool,
    pub todos_in_section: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckTodoReport {
    pub number: u64,
    pub title: String,
    pub url: String,
    pub section: String,
    pub todo: String,
    pub checked: bool,
    pub action: &'static str,
}

async fn fetch_parsed(
    client: &HybridClient,
    repo: &RepoRef,
    number: u64,
) -> Result<(RemoteIssue, ParsedBody)> {
    let issue = client.rest().get_issue(repo, number).await?;
    let parsed = ParsedBody::parse(issue.body.as_deref().unwrap_or(""));
    Ok((issue, parsed))
}

fn section_not_found(parsed: &ParsedBody, name: &str) -> TrellisError {
    TrellisError::SectionNotFound {
        name: name.to_string(),
        available: parsed.section_titles(),
    }
}

pub struct CreateTodoCommand<'a> {
    client: &'a HybridClient,
}

impl<'a> CreateTodoCommand<'a> {
    pub fn new(client: &'a HybridClient) -> Self {
        Self { client }
    }

    pub async fn execute(
        &self,
        repo: &RepoRef,
        number: u64,
        section_name: &str,
        text: &str,
        create_section: bool,
    ) -> Result<CreateTodoReport> {
        let text = text.trim();
        if text.is_empty() {
            return Err(TrellisError::Internal("todo text cannot be empty".to_string()));
        }

        let (issue, mut parsed) = fetch_parsed(self.client, repo, number).await?;

        let (section_idx, section_created) = match parsed.find_section(section_name) {
            Some(idx) => (idx, false),
            None if create_section => (parsed.append_section(section_name), true),
            None => return Err(section_not_found(&parsed, section_name)),
        };

        // Uniqueness within a section is by exact text
        if parsed.sections[section_idx]
            .todos
            .iter()
            .any(|t| t.text == text)
        {
            return Err(TrellisError::DuplicateTodo(text.to_string()));
        }

        parsed.insert_todo(section_idx, text);

        self.client
            .rest()
            .update_issue_body(repo, number, &parsed.to_body_checked()?)
            .await?;

        let section_idx = parsed
            .find_section(section_name)
            .expect("section still present after edit");
        Ok(CreateTodoReport {
            number: issue.number,
            title: issue.title,
            url: issue.html_url,
            section: parsed.sections[section_idx].title.clone(),
            todo: text.to_string(),
            section_created,
            todos_in_section: parsed.sections[section_idx].todos.len(),
        })
    }
}

pub struct CheckTodoCommand<'a> {
    client: &'a HybridClient,
}

impl<'a> CheckTodoCommand<'a> {
    pub fn new(client: &'a HybridClient) -> Self {
        Self { client }
    }

    /// Toggle semantics: checked becomes unchecked and vice versa. The
    /// substring match is case-insensitive; anything other than exactly one
    /// hit is an error listing the candidates.
    pub async fn execute(
        &self,
        repo: &RepoRef,
        number: u64,
        section_name: &str,
        pattern: &str,
    ) -> Result<CheckTodoReport> {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return Err(TrellisError::Internal("match text cannot be empty".to_string()));
        }

        let (issue, mut parsed) = fetch_parsed(self.client, repo, number).await?;

        let section_idx = parsed
            .find_section(section_name)
            .ok_or_else(|| section_not_found(&parsed, section_name))?;

        let needle = pattern.to_lowercase();
        let matches: Vec<usize> = parsed.sections[section_idx]
            .todos
            .iter()
            .enumerate()
            .filter(|(_, todo)| todo.text.to_lowercase().contains(&needle))
            .map(|(idx, _)| idx)
            .collect();

        let todo_idx = match matches.as_slice() {
            [only] => *only,
            [] => {
                return Err(TrellisError::TodoNotFound {
                    pattern: pattern.to_string(),
                    available: parsed.sections[section_idx]
                        .todos
                        .iter()
                        .map(|t| t.text.clone())
                        .collect(),
                })
            }
            many => {
                return Err(TrellisError::AmbiguousMatch {
                    pattern: pattern.to_string(),
                    candidates: many
                        .iter()
                        .map(|&idx| parsed.sections[section_idx].todos[idx].text.clone())
                        .collect(),
                })
            }
        };

        let todo_text = parsed.sections[section_idx].todos[todo_idx].text.clone();
        let checked = parsed.toggle_todo(section_idx, todo_idx)?;

        self.client
            .rest()
            .update_issue_body(repo, number, &parsed.to_body_checked()?)
            .await?;

        Ok(CheckTodoReport {
            number: issue.number,
            title: issue.title,
            url: issue.html_url,
            section: section_name.to_string(),
            todo: todo_text,
            checked,
            action: if checked { "checked" } else { "unchecked" },
        })
    }
}
