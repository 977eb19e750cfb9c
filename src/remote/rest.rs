//! REST transport
//!
//! Typed wrapper over the GitHub HTTP JSON API for issues, comments, labels,
//! milestones, and assignees. GETs retry on transient failures with
//! exponential backoff; mutations are issued exactly once so a failure never
//! duplicates a side effect.

use crate::model::{Account, Label, Milestone, RemoteIssue, RepoRef};
use crate::remote::retry::{retry_reads, RetryPolicy, Transient};
use crate::{Result, TrellisError};
use reqwest::{header, Client, Response, StatusCode};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

/// Per-request timeout for single GETs
const GET_TIMEOUT: Duration = Duration::from_secs(10);
/// Per-request timeout for create/update operations
const WRITE_TIMEOUT: Duration = Duration::from_secs(15);

const DEFAULT_BASE_URL: &str = "https://api.github.com";

impl Transient for TrellisError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            TrellisError::RateLimited { .. }
                | TrellisError::Timeout(_)
                | TrellisError::NetworkError(_)
        )
    }

    fn mandated_delay(&self) -> Option<Duration> {
        match self {
            TrellisError::RateLimited { retry_after_secs } => {
                Some(Duration::from_secs(*retry_after_secs))
            }
            _ => None,
        }
    }
}

/// Issue creation payload
#[derive(Debug, Clone, Default, Serialize)]
pub struct NewIssue {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub assignees: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub milestone: Option<u64>,
}

/// Issue update payload; only set fields are sent
#[derive(Debug, Clone, Default, Serialize)]
pub struct IssuePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub milestone: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignees: Option<Vec<String>>,
}

/// REST API client
pub struct RestTransport {
    client: Client,
    base_url: String,
    token: String,
    retry: RetryPolicy,
}

impl RestTransport {
    pub fn new(token: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .default_headers({
                let mut headers = header::HeaderMap::new();
                headers.insert(
                    header::USER_AGENT,
                    header::HeaderValue::from_static("trellis/0.4"),
                );
                headers.insert(
                    header::ACCEPT,
                    header::HeaderValue::from_static("application/vnd.github.v3+json"),
                );
                headers
            })
            .build()?;

        Ok(Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            token: token.to_string(),
            retry: RetryPolicy::default(),
        })
    }

    /// Point the transport at a different API root. Used by tests.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Map transport-level failures; classification of HTTP statuses happens
    /// in `parse_response`.
    fn map_send_error(e: reqwest::Error) -> TrellisError {
        if e.is_timeout() {
            TrellisError::Timeout(e.to_string())
        } else if e.is_connect() {
            TrellisError::NetworkError(e.to_string())
        } else {
            TrellisError::Http(e)
        }
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: Response,
        context: &str,
    ) -> Result<T> {
        let status = response.status();
        match status {
            StatusCode::OK | StatusCode::CREATED => {
                response.json().await.map_err(TrellisError::from)
            }
            StatusCode::UNAUTHORIZED => Err(TrellisError::InvalidCredential(
                "token rejected by the API".to_string(),
            )),
            StatusCode::FORBIDDEN => {
                let detail = response.text().await.unwrap_or_default();
                Err(TrellisError::Forbidden(format!("{context}: {detail}")))
            }
            StatusCode::NOT_FOUND => Err(TrellisError::IssueNotFound(context.to_string())),
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after_secs = response
                    .headers()
                    .get(header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(60);
                Err(TrellisError::RateLimited { retry_after_secs })
            }
            status if status.is_server_error() => {
                let detail = response.text().await.unwrap_or_default();
                Err(TrellisError::NetworkError(format!(
                    "{context}: HTTP {status}: {detail}"
                )))
            }
            status => {
                let detail = response.text().await.unwrap_or_default();
                Err(TrellisError::NetworkError(format!(
                    "{context}: unexpected HTTP {status}: {detail}"
                )))
            }
        }
    }

    /// Idempotent GET with retry on transient failures.
    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        context: &str,
    ) -> Result<T> {
        retry_reads(&self.retry, context, || async move {
            let response = self
                .client
                .get(self.url(path))
                .bearer_auth(&self.token)
                .timeout(GET_TIMEOUT)
                .send()
                .await
                .map_err(Self::map_send_error)?;
            Self::parse_response(response, context).await
        })
        .await
    }

    /// Mutation; never retried.
    async fn send_json<T: serde::de::DeserializeOwned, B: Serialize>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: &B,
        context: &str,
    ) -> Result<T> {
        let response = self
            .client
            .request(method, self.url(path))
            .bearer_auth(&self.token)
            .timeout(WRITE_TIMEOUT)
            .json(body)
            .send()
            .await
            .map_err(Self::map_send_error)?;
        Self::parse_response(response, context).await
    }

    /// The login the credential belongs to. Doubles as token validation.
    pub async fn authenticated_user(&self) -> Result<Account> {
        self.get_json("/user", "authenticated user").await
    }

    pub async fn get_issue(&self, repo: &RepoRef, number: u64) -> Result<RemoteIssue> {
        debug!(repo = %repo, number, "Fetching issue");
        self.get_json(
            &format!("/repos/{}/{}/issues/{number}", repo.owner, repo.repo),
            &format!("{repo}#{number}"),
        )
        .await
    }

    pub async fn create_issue(&self, repo: &RepoRef, new_issue: &NewIssue) -> Result<RemoteIssue> {
        info!(repo = %repo, title = %new_issue.title, "Creating issue");
        let issue: RemoteIssue = self
            .send_json(
                reqwest::Method::POST,
                &format!("/repos/{}/{}/issues", repo.owner, repo.repo),
                new_issue,
                &format!("create issue in {repo}"),
            )
            .await?;
        info!(number = issue.number, "Issue created");
        Ok(issue)
    }

    pub async fn update_issue(
        &self,
        repo: &RepoRef,
        number: u64,
        patch: &IssuePatch,
    ) -> Result<RemoteIssue> {
        debug!(repo = %repo, number, "Updating issue");
        self.send_json(
            reqwest::Method::PATCH,
            &format!("/repos/{}/{}/issues/{number}", repo.owner, repo.repo),
            patch,
            &format!("{repo}#{number}"),
        )
        .await
    }

    pub async fn update_issue_body(
        &self,
        repo: &RepoRef,
        number: u64,
        body: &str,
    ) -> Result<RemoteIssue> {
        self.update_issue(
            repo,
            number,
            &IssuePatch {
                body: Some(body.to_string()),
                ..Default::default()
            },
        )
        .await
    }

    /// Close an issue. Closing an already-closed issue is a no-op on the
    /// service side, which keeps the rollback path idempotent.
    pub async fn close_issue(&self, repo: &RepoRef, number: u64) -> Result<RemoteIssue> {
        info!(repo = %repo, number, "Closing issue");
        self.update_issue(
            repo,
            number,
            &IssuePatch {
                state: Some("closed".to_string()),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn list_labels(&self, repo: &RepoRef) -> Result<Vec<Label>> {
        self.get_json(
            &format!("/repos/{}/{}/labels?per_page=100", repo.owner, repo.repo),
            &format!("labels in {repo}"),
        )
        .await
    }

    pub async fn create_label(&self, repo: &RepoRef, name: &str, color: &str) -> Result<Label> {
        self.send_json(
            reqwest::Method::POST,
            &format!("/repos/{}/{}/labels", repo.owner, repo.repo),
            &serde_json::json!({ "name": name, "color": color }),
            &format!("create label '{name}' in {repo}"),
        )
        .await
    }

    pub async fn add_labels(
        &self,
        repo: &RepoRef,
        number: u64,
        labels: &[String],
    ) -> Result<Vec<Label>> {
        self.send_json(
            reqwest::Method::POST,
            &format!("/repos/{}/{}/issues/{number}/labels", repo.owner, repo.repo),
            &serde_json::json!({ "labels": labels }),
            &format!("add labels to {repo}#{number}"),
        )
        .await
    }

    /// Atomic label replacement; the whole set changes in one request.
    pub async fn set_labels(
        &self,
        repo: &RepoRef,
        number: u64,
        labels: &[String],
    ) -> Result<Vec<Label>> {
        self.send_json(
            reqwest::Method::PUT,
            &format!("/repos/{}/{}/issues/{number}/labels", repo.owner, repo.repo),
            &serde_json::json!({ "labels": labels }),
            &format!("set labels on {repo}#{number}"),
        )
        .await
    }

    pub async fn remove_label(&self, repo: &RepoRef, number: u64, label: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.url(&format!(
                "/repos/{}/{}/issues/{number}/labels/{label}",
                repo.owner, repo.repo
            )))
            .bearer_auth(&self.token)
            .timeout(WRITE_TIMEOUT)
            .send()
            .await
            .map_err(Self::map_send_error)?;

        // Removing an absent label is a no-op, not an error.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        let _: Vec<Label> =
            Self::parse_response(response, &format!("remove label from {repo}#{number}")).await?;
        Ok(())
    }

    pub async fn add_assignees(
        &self,
        repo: &RepoRef,
        number: u64,
        assignees: &[String],
    ) -> Result<RemoteIssue> {
        self.send_json(
            reqwest::Method::POST,
            &format!(
                "/repos/{}/{}/issues/{number}/assignees",
                repo.owner, repo.repo
            ),
            &serde_json::json!({ "assignees": assignees }),
            &format!("assign {repo}#{number}"),
        )
        .await
    }

    pub async fn create_comment(&self, repo: &RepoRef, number: u64, body: &str) -> Result<()> {
        let _: serde_json::Value = self
            .send_json(
                reqwest::Method::POST,
                &format!(
                    "/repos/{}/{}/issues/{number}/comments",
                    repo.owner, repo.repo
                ),
                &serde_json::json!({ "body": body }),
                &format!("comment on {repo}#{number}"),
            )
            .await?;
        Ok(())
    }

    pub async fn list_milestones(&self, repo: &RepoRef) -> Result<Vec<Milestone>> {
        self.get_json(
            &format!(
                "/repos/{}/{}/milestones?state=all&per_page=100",
                repo.owner, repo.repo
            ),
            &format!("milestones in {repo}"),
        )
        .await
    }

    pub async fn create_milestone(&self, repo: &RepoRef, title: &str) -> Result<Milestone> {
        self.send_json(
            reqwest::Method::POST,
            &format!("/repos/{}/{}/milestones", repo.owner, repo.repo),
            &serde_json::json!({ "title": title }),
            &format!("create milestone '{title}' in {repo}"),
        )
        .await
    }
}
