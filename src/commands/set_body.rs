//! set-body command
//!
//! Replaces an issue body atomically after validating its size. The
//! read-modify-write races other writers; the command always writes against
//! the snapshot it was given.

use crate::body::writer::validate_body_size;
use crate::model::RepoRef;
use crate::remote::HybridClient;
use crate::Result;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct SetBodyReport {
    pub number: u64,
    pub title: String,
    pub url: String,
    pub updated: bool,
    pub body_length: usize,
}

pub struct SetBodyCommand<'a> {
    client: &'a HybridClient,
}

impl<'a> SetBodyCommand<'a> {
    pub fn new(client: &'a HybridClient) -> Self {
        Self { client }
    }

    pub async fn execute(&self, repo: &RepoRef, number: u64, body: &str) -> Result<SetBodyReport> {
        validate_body_size(body)?;

        let issue = self.client.rest().update_issue_body(repo, number, body).await?;

        Ok(SetBodyReport {
            number: issue.number,
            title: issue.title,
            url: issue.html_url,
            updated: true,
            body_length: body.chars().count(),
        })
    }
}
