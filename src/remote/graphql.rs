//! Graph transport
//!
//! Typed wrapper over the GitHub GraphQL API for the features the REST API
//! does not carry: sub-issue edges, custom issue types, and project-board
//! field updates. Every request sends the preview feature-flag header;
//! responses are classified into the error taxonomy so the hybrid client
//! can tell a missing feature from a hard failure.

use crate::model::{ChildIssue, IssueKind};
use crate::remote::Feature;
use crate::{Result, TrellisError};
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_GRAPHQL_URL: &str = "https://api.github.com/graphql";

/// Preview features enabled on every request
const FEATURE_HEADER: &str = "sub_issues,issue_types";

/// Per-request timeout; graph queries can return large result sets
const GRAPHQL_TIMEOUT: Duration = Duration::from_secs(30);

/// Rate-limit retries, on top of the initial attempt
const MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Deserialize)]
struct GraphQLResponse<T> {
    data: Option<T>,
    errors: Option<Vec<GraphQLErrorItem>>,
}

#[derive(Debug, Deserialize)]
struct GraphQLErrorItem {
    message: String,
    #[serde(rename = "type", default)]
    error_type: Option<String>,
}

/// A custom issue type configured on a repository.
#[derive(Debug, Clone, Deserialize)]
pub struct IssueTypeInfo {
    pub id: String,
    pub name: String,
}

/// An issue created through the graph transport.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedIssue {
    pub id: String,
    pub number: u64,
    pub url: String,
}

/// Parent issue plus its native children.
#[derive(Debug, Clone)]
pub struct IssueWithChildren {
    pub number: u64,
    pub title: String,
    pub state: String,
    pub children: Vec<ChildIssue>,
}

/// A project board resolved from a project URL.
#[derive(Debug, Clone)]
pub struct ProjectInfo {
    pub id: String,
    pub title: String,
    /// First repository linked to the board, as (owner, name)
    pub repository: Option<(String, String)>,
}

/// A field on a project board, with single-select options when present.
#[derive(Debug, Clone)]
pub struct ProjectField {
    pub id: String,
    pub name: String,
    pub options: Vec<ProjectFieldOption>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectFieldOption {
    pub id: String,
    pub name: String,
}

/// GraphQL API client
pub struct GraphTransport {
    client: Client,
    url: String,
    token: String,
}

impl GraphTransport {
    pub fn new(token: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(GRAPHQL_TIMEOUT)
            .default_headers({
                let mut headers = header::HeaderMap::new();
                headers.insert(
                    header::USER_AGENT,
                    header::HeaderValue::from_static("trellis/0.4"),
                );
                headers.insert(
                    "GraphQL-Features",
                    header::HeaderValue::from_static(FEATURE_HEADER),
                );
                headers
            })
            .build()?;

        Ok(Self {
            client,
            url: DEFAULT_GRAPHQL_URL.to_string(),
            token: token.to_string(),
        })
    }

    /// Point the transport at a different endpoint. Used by tests.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Execute a query or mutation. Rate limits are retried honouring
    /// Retry-After with exponential backoff, at most three attempts;
    /// everything else is classified and surfaced.
    async fn execute<T: serde::de::DeserializeOwned>(
        &self,
        query: &str,
        variables: Value,
        context: &str,
    ) -> Result<T> {
        let payload = json!({ "query": query, "variables": variables });

        let mut last_retry_after = 60;
        for attempt in 0..MAX_ATTEMPTS {
            let response = match self
                .client
                .post(&self.url)
                .bearer_auth(&self.token)
                .json(&payload)
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) if e.is_timeout() => {
                    return Err(TrellisError::Timeout(format!("{context}: {e}")))
                }
                Err(e) if e.is_connect() && attempt + 1 < MAX_ATTEMPTS => {
                    warn!(context, attempt, "Connection error, retrying: {e}");
                    tokio::time::sleep(Duration::from_secs(1 << attempt)).await;
                    continue;
                }
                Err(e) => return Err(TrellisError::NetworkError(format!("{context}: {e}"))),
            };

            match response.status() {
                StatusCode::OK => {
                    let parsed: GraphQLResponse<T> = response.json().await?;
                    if let Some(errors) = parsed.errors.filter(|e| !e.is_empty()) {
                        return Err(classify_errors(&errors, context));
                    }
                    return parsed.data.ok_or_else(|| {
                        TrellisError::Internal(format!("{context}: no data in GraphQL response"))
                    });
                }
                StatusCode::UNAUTHORIZED => {
                    return Err(TrellisError::InvalidCredential(
                        "token rejected by the GraphQL API".to_string(),
                    ))
                }
                StatusCode::FORBIDDEN => {
                    let detail = response.text().await.unwrap_or_default();
                    return Err(classify_forbidden(&detail, context));
                }
                StatusCode::TOO_MANY_REQUESTS => {
                    let retry_after = response
                        .headers()
                        .get(header::RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(60);
                    last_retry_after = retry_after;
                    if attempt + 1 < MAX_ATTEMPTS {
                        debug!(context, retry_after, "Rate limited, honouring Retry-After");
                        let backoff = Duration::from_secs(retry_after.max(1) << attempt);
                        tokio::time::sleep(backoff).await;
                        continue;
                    }
                }
                status => {
                    let detail = response.text().await.unwrap_or_default();
                    return Err(TrellisError::NetworkError(format!(
                        "{context}: HTTP {status}: {detail}"
                    )));
                }
            }
        }

        Err(TrellisError::RateLimited {
            retry_after_secs: last_retry_after,
        })
    }

    /// Convert an issue number to its opaque node ID.
    pub async fn resolve_node_id(&self, owner: &str, repo: &str, number: u64) -> Result<String> {
        let query = r#"
            query ResolveNodeId($owner: String!, $repo: String!, $number: Int!) {
                repository(owner: $owner, name: $repo) {
                    issue(number: $number) { id }
                }
            }
        "#;

        #[derive(Deserialize)]
        struct Data {
            repository: Option<RepositoryNode>,
        }
        #[derive(Deserialize)]
        struct RepositoryNode {
            issue: Option<IdNode>,
        }
        #[derive(Deserialize)]
        struct IdNode {
            id: String,
        }

        let data: Data = self
            .execute(
                query,
                json!({ "owner": owner, "repo": repo, "number": number }),
                &format!("resolve node id for {owner}/{repo}#{number}"),
            )
            .await?;

        data.repository
            .and_then(|r| r.issue)
            .map(|i| i.id)
            .ok_or_else(|| TrellisError::IssueNotFound(format!("{owner}/{repo}#{number}")))
    }

    pub async fn repository_id(&self, owner: &str, repo: &str) -> Result<String> {
        let query = r#"
            query RepositoryId($owner: String!, $repo: String!) {
                repository(owner: $owner, name: $repo) { id }
            }
        "#;

        #[derive(Deserialize)]
        struct Data {
            repository: Option<IdNode>,
        }
        #[derive(Deserialize)]
        struct IdNode {
            id: String,
        }

        let data: Data = self
            .execute(
                query,
                json!({ "owner": owner, "repo": repo }),
                &format!("resolve repository {owner}/{repo}"),
            )
            .await?;

        data.repository
            .map(|r| r.id)
            .ok_or_else(|| TrellisError::IssueNotFound(format!("{owner}/{repo}")))
    }

    /// Create the native parent-child edge between two issues.
    pub async fn add_sub_issue_edge(
        &self,
        parent_node_id: &str,
        child_node_id: &str,
    ) -> Result<()> {
        let mutation = r#"
            mutation AddSubIssue($parentId: ID!, $childId: ID!) {
                addSubIssue(input: {parentId: $parentId, childId: $childId}) {
                    parentIssue { id }
                    childIssue { id }
                }
            }
        "#;

        let _: Value = self
            .execute(
                mutation,
                json!({ "parentId": parent_node_id, "childId": child_node_id }),
                "add sub-issue edge",
            )
            .await?;
        Ok(())
    }

    pub async fn remove_sub_issue_edge(
        &self,
        parent_node_id: &str,
        child_node_id: &str,
    ) -> Result<()> {
        let mutation = r#"
            mutation RemoveSubIssue($parentId: ID!, $childId: ID!) {
                removeSubIssue(input: {parentId: $parentId, childId: $childId}) {
                    parentIssue { id }
                }
            }
        "#;

        let _: Value = self
            .execute(
                mutation,
                json!({ "parentId": parent_node_id, "childId": child_node_id }),
                "remove sub-issue edge",
            )
            .await?;
        Ok(())
    }

    /// Custom issue types configured on the repository.
    pub async fn list_issue_types(&self, owner: &str, repo: &str) -> Result<Vec<IssueTypeInfo>> {
        let query = r#"
            query ListIssueTypes($owner: String!, $repo: String!) {
                repository(owner: $owner, name: $repo) {
                    issueTypes(first: 20) {
                        nodes { id name }
                    }
                }
            }
        "#;

        #[derive(Deserialize)]
        struct Data {
            repository: Option<RepositoryNode>,
        }
        #[derive(Deserialize)]
        struct RepositoryNode {
            #[serde(rename = "issueTypes")]
            issue_types: Option<Nodes>,
        }
        #[derive(Deserialize)]
        struct Nodes {
            nodes: Vec<IssueTypeInfo>,
        }

        let data: Data = self
            .execute(
                query,
                json!({ "owner": owner, "repo": repo }),
                &format!("list issue types in {owner}/{repo}"),
            )
            .await?;

        Ok(data
            .repository
            .and_then(|r| r.issue_types)
            .map(|n| n.nodes)
            .unwrap_or_default())
    }

    pub async fn create_issue_type(
        &self,
        repository_id: &str,
        name: &str,
        description: &str,
    ) -> Result<()> {
        let mutation = r#"
            mutation CreateIssueType($repositoryId: ID!, $name: String!, $description: String!) {
                createIssueType(input: {
                    repositoryId: $repositoryId,
                    name: $name,
                    description: $description
                }) {
                    issueType { id name }
                }
            }
        "#;

        let _: Value = self
            .execute(
                mutation,
                json!({ "repositoryId": repository_id, "name": name, "description": description }),
                &format!("create issue type '{name}'"),
            )
            .await?;
        Ok(())
    }

    /// Create an issue carrying a custom type in one mutation.
    pub async fn create_issue_with_type(
        &self,
        repository_id: &str,
        title: &str,
        body: &str,
        type_name: &str,
    ) -> Result<CreatedIssue> {
        let mutation = r#"
            mutation CreateIssue($repositoryId: ID!, $title: String!, $body: String, $issueType: String) {
                createIssue(input: {
                    repositoryId: $repositoryId,
                    title: $title,
                    body: $body,
                    issueType: $issueType
                }) {
                    issue { id number url }
                }
            }
        "#;

        #[derive(Deserialize)]
        struct Data {
            #[serde(rename = "createIssue")]
            create_issue: CreateIssueNode,
        }
        #[derive(Deserialize)]
        struct CreateIssueNode {
            issue: CreatedIssue,
        }

        let data: Data = self
            .execute(
                mutation,
                json!({
                    "repositoryId": repository_id,
                    "title": title,
                    "body": body,
                    "issueType": type_name,
                }),
                &format!("create typed issue '{title}'"),
            )
            .await?;
        Ok(data.create_issue.issue)
    }

    /// Assign a custom type to an existing issue.
    pub async fn set_issue_type(&self, issue_node_id: &str, issue_type_id: &str) -> Result<()> {
        let mutation = r#"
            mutation SetIssueType($issueId: ID!, $issueTypeId: ID!) {
                updateIssueIssueType(input: {issueId: $issueId, issueTypeId: $issueTypeId}) {
                    issue { id }
                }
            }
        "#;

        let _: Value = self
            .execute(
                mutation,
                json!({ "issueId": issue_node_id, "issueTypeId": issue_type_id }),
                "set issue type",
            )
            .await?;
        Ok(())
    }

    /// The custom type name of an issue, when the repository has them.
    pub async fn issue_type_name(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<Option<String>> {
        let query = r#"
            query IssueTypeName($owner: String!, $repo: String!, $number: Int!) {
                repository(owner: $owner, name: $repo) {
                    issue(number: $number) {
                        issueType { name }
                    }
                }
            }
        "#;

        #[derive(Deserialize)]
        struct Data {
            repository: Option<RepositoryNode>,
        }
        #[derive(Deserialize)]
        struct RepositoryNode {
            issue: Option<IssueNode>,
        }
        #[derive(Deserialize)]
        struct IssueNode {
            #[serde(rename = "issueType")]
            issue_type: Option<NameNode>,
        }
        #[derive(Deserialize)]
        struct NameNode {
            name: String,
        }

        let data: Data = self
            .execute(
                query,
                json!({ "owner": owner, "repo": repo, "number": number }),
                &format!("issue type of {owner}/{repo}#{number}"),
            )
            .await?;

        Ok(data
            .repository
            .and_then(|r| r.issue)
            .and_then(|i| i.issue_type)
            .map(|t| t.name))
    }

    /// An issue with its native children.
    pub async fn get_issue_with_children(&self, node_id: &str) -> Result<IssueWithChildren> {
        let query = r#"
            query IssueWithChildren($id: ID!) {
                node(id: $id) {
                    ... on Issue {
                        number
                        title
                        state
                        subIssues(first: 100) {
                            nodes {
                                number
                                title
                                state
                                issueType { name }
                                labels(first: 20) { nodes { name } }
                            }
                        }
                    }
                }
            }
        "#;

        #[derive(Deserialize)]
        struct Data {
            node: Option<IssueNode>,
        }
        #[derive(Deserialize)]
        struct IssueNode {
            number: u64,
            title: String,
            state: String,
            #[serde(rename = "subIssues")]
            sub_issues: Option<SubIssues>,
        }
        #[derive(Deserialize)]
        struct SubIssues {
            nodes: Vec<ChildNode>,
        }
        #[derive(Deserialize)]
        struct ChildNode {
            number: u64,
            title: String,
            state: String,
            #[serde(rename = "issueType")]
            issue_type: Option<NameNode>,
            labels: Option<LabelNodes>,
        }
        #[derive(Deserialize)]
        struct NameNode {
            name: String,
        }
        #[derive(Deserialize)]
        struct LabelNodes {
            nodes: Vec<NameNode>,
        }

        let data: Data = self
            .execute(query, json!({ "id": node_id }), "issue with children")
            .await?;

        let node = data
            .node
            .ok_or_else(|| TrellisError::IssueNotFound(node_id.to_string()))?;

        let children = node
            .sub_issues
            .map(|s| s.nodes)
            .unwrap_or_default()
            .into_iter()
            .map(|child| {
                let kind = child
                    .issue_type
                    .as_ref()
                    .and_then(|t| IssueKind::parse(&t.name))
                    .or_else(|| {
                        child.labels.as_ref().map(|labels| {
                            IssueKind::from_labels(labels.nodes.iter().map(|l| l.name.as_str()))
                        })
                    });
                ChildIssue {
                    number: child.number,
                    title: child.title,
                    state: child.state.to_lowercase(),
                    kind,
                }
            })
            .collect();

        Ok(IssueWithChildren {
            number: node.number,
            title: node.title,
            state: node.state.to_lowercase(),
            children,
        })
    }

    /// Resolve an org or user project board by number.
    pub async fn resolve_project(
        &self,
        scope: &str,
        owner: &str,
        number: u64,
    ) -> Result<ProjectInfo> {
        let query = if scope == "orgs" {
            r#"
            query ResolveProject($owner: String!, $number: Int!) {
                organization(login: $owner) {
                    projectV2(number: $number) {
                        id
                        title
                        repositories(first: 1) {
                            nodes { name owner { login } }
                        }
                    }
                }
            }
            "#
        } else {
            r#"
            query ResolveProject($owner: String!, $number: Int!) {
                user(login: $owner) {
                    projectV2(number: $number) {
                        id
                        title
                        repositories(first: 1) {
                            nodes { name owner { login } }
                        }
                    }
                }
            }
            "#
        };

        let data: Value = self
            .execute(
                query,
                json!({ "owner": owner, "number": number }),
                &format!("resolve project {owner}/{number}"),
            )
            .await?;

        let container = if scope == "orgs" { "organization" } else { "user" };
        let project = data
            .get(container)
            .and_then(|c| c.get("projectV2"))
            .filter(|p| !p.is_null());

        match project {
            Some(p) => {
                let repository = p
                    .get("repositories")
                    .and_then(|r| r.get("nodes"))
                    .and_then(Value::as_array)
                    .and_then(|nodes| nodes.first())
                    .and_then(|node| {
                        Some((
                            node.get("owner")?.get("login")?.as_str()?.to_string(),
                            node.get("name")?.as_str()?.to_string(),
                        ))
                    });
                Ok(ProjectInfo {
                    id: p["id"].as_str().unwrap_or_default().to_string(),
                    title: p["title"].as_str().unwrap_or_default().to_string(),
                    repository,
                })
            }
            None => Err(TrellisError::FeatureUnavailable(Feature::ProjectsV2)),
        }
    }

    /// Create a single-select Status field on a project board with the
    /// workflow's option set.
    pub async fn create_project_status_field(
        &self,
        project_id: &str,
        field_name: &str,
        options: &[(&str, &str)],
    ) -> Result<()> {
        let mutation = r#"
            mutation CreateProjectField($input: CreateProjectV2FieldInput!) {
                createProjectV2Field(input: $input) {
                    projectV2Field {
                        ... on ProjectV2SingleSelectField { id name }
                    }
                }
            }
        "#;

        let formatted: Vec<Value> = options
            .iter()
            .map(|(name, color)| json!({ "name": name, "color": color, "description": "" }))
            .collect();

        let _: Value = self
            .execute(
                mutation,
                json!({
                    "input": {
                        "projectId": project_id,
                        "name": field_name,
                        "dataType": "SINGLE_SELECT",
                        "singleSelectOptions": formatted,
                    }
                }),
                &format!("create project field '{field_name}'"),
            )
            .await?;
        Ok(())
    }

    /// Fields on a project board, including single-select options.
    pub async fn project_fields(&self, project_id: &str) -> Result<Vec<ProjectField>> {
        let query = r#"
            query ProjectFields($projectId: ID!) {
                node(id: $projectId) {
                    ... on ProjectV2 {
                        fields(first: 50) {
                            nodes {
                                ... on ProjectV2FieldCommon { id name }
                                ... on ProjectV2SingleSelectField {
                                    id
                                    name
                                    options { id name }
                                }
                            }
                        }
                    }
                }
            }
        "#;

        let data: Value = self
            .execute(query, json!({ "projectId": project_id }), "project fields")
            .await?;

        let nodes = data
            .get("node")
            .and_then(|n| n.get("fields"))
            .and_then(|f| f.get("nodes"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        Ok(nodes
            .into_iter()
            .filter_map(|field| {
                let id = field.get("id")?.as_str()?.to_string();
                let name = field.get("name")?.as_str()?.to_string();
                let options = field
                    .get("options")
                    .and_then(Value::as_array)
                    .map(|opts| {
                        opts.iter()
                            .filter_map(|o| {
                                Some(ProjectFieldOption {
                                    id: o.get("id")?.as_str()?.to_string(),
                                    name: o.get("name")?.as_str()?.to_string(),
                                })
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                Some(ProjectField { id, name, options })
            })
            .collect())
    }

    /// Add an issue to a project board; returns the project item ID. The
    /// mutation is idempotent on the service side, so this also resolves the
    /// item for issues already on the board.
    pub async fn add_issue_to_project(
        &self,
        project_id: &str,
        issue_node_id: &str,
    ) -> Result<String> {
        let mutation = r#"
            mutation AddToProject($projectId: ID!, $contentId: ID!) {
                addProjectV2ItemById(input: {projectId: $projectId, contentId: $contentId}) {
                    item { id }
                }
            }
        "#;

        let data: Value = self
            .execute(
                mutation,
                json!({ "projectId": project_id, "contentId": issue_node_id }),
                "add issue to project",
            )
            .await?;

        data.get("addProjectV2ItemById")
            .and_then(|a| a.get("item"))
            .and_then(|i| i.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or(TrellisError::FeatureUnavailable(Feature::ProjectsV2))
    }

    /// Set a single-select field value on a project item.
    pub async fn set_project_field(
        &self,
        project_id: &str,
        item_id: &str,
        field_id: &str,
        option_id: &str,
    ) -> Result<()> {
        let mutation = r#"
            mutation SetProjectField($projectId: ID!, $itemId: ID!, $fieldId: ID!, $optionId: String!) {
                updateProjectV2ItemFieldValue(input: {
                    projectId: $projectId,
                    itemId: $itemId,
                    fieldId: $fieldId,
                    value: { singleSelectOptionId: $optionId }
                }) {
                    projectV2Item { id }
                }
            }
        "#;

        let _: Value = self
            .execute(
                mutation,
                json!({
                    "projectId": project_id,
                    "itemId": item_id,
                    "fieldId": field_id,
                    "optionId": option_id,
                }),
                "set project field",
            )
            .await?;
        Ok(())
    }

    /// Current single-select Status value of an issue on one project board.
    pub async fn issue_project_status(
        &self,
        issue_node_id: &str,
        project_id: &str,
    ) -> Result<Option<String>> {
        let query = r#"
            query IssueProjectStatus($id: ID!) {
                node(id: $id) {
                    ... on Issue {
                        projectItems(first: 10) {
                            nodes {
                                project { id }
                                fieldValueByName(name: "Status") {
                                    ... on ProjectV2ItemFieldSingleSelectValue { name }
                                }
                            }
                        }
                    }
                }
            }
        "#;

        let data: Value = self
            .execute(query, json!({ "id": issue_node_id }), "issue project status")
            .await?;

        let nodes = data
            .get("node")
            .and_then(|n| n.get("projectItems"))
            .and_then(|p| p.get("nodes"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        Ok(nodes.iter().find_map(|item| {
            let matches = item
                .get("project")
                .and_then(|p| p.get("id"))
                .and_then(Value::as_str)
                == Some(project_id);
            if !matches {
                return None;
            }
            item.get("fieldValueByName")
                .and_then(|v| v.get("name"))
                .and_then(Value::as_str)
                .map(str::to_string)
        }))
    }

    /// Minimal probe for the sub-issues feature.
    pub async fn probe_sub_issues(&self, owner: &str, repo: &str) -> Result<()> {
        let query = r#"
            query ProbeSubIssues($owner: String!, $repo: String!) {
                repository(owner: $owner, name: $repo) {
                    issues(first: 1) {
                        nodes { subIssues(first: 1) { totalCount } }
                    }
                }
            }
        "#;

        let _: Value = self
            .execute(
                query,
                json!({ "owner": owner, "repo": repo }),
                "probe sub_issues",
            )
            .await?;
        Ok(())
    }

    /// Minimal probe for custom issue types.
    pub async fn probe_issue_types(&self, owner: &str, repo: &str) -> Result<()> {
        let query = r#"
            query ProbeIssueTypes($owner: String!, $repo: String!) {
                repository(owner: $owner, name: $repo) {
                    issueTypes(first: 1) { totalCount }
                }
            }
        "#;

        let _: Value = self
            .execute(
                query,
                json!({ "owner": owner, "repo": repo }),
                "probe issue_types",
            )
            .await?;
        Ok(())
    }
}

/// Classify GraphQL response errors per the taxonomy. Feature gaps are
/// detected before syntax markers because an unknown field usually means the
/// preview feature is disabled, not a malformed query.
fn classify_errors(errors: &[GraphQLErrorItem], context: &str) -> TrellisError {
    for error in errors {
        let message = error.message.to_lowercase();
        let error_type = error.error_type.as_deref().unwrap_or("");

        if message.contains("subissue") || message.contains("sub_issue") {
            return TrellisError::FeatureUnavailable(Feature::SubIssues);
        }
        if message.contains("issuetype") || message.contains("issue type") {
            return TrellisError::FeatureUnavailable(Feature::IssueTypes);
        }
        if message.contains("projectv2") || message.contains("projects v2") {
            return TrellisError::FeatureUnavailable(Feature::ProjectsV2);
        }
        if error_type == "RATE_LIMITED" || message.contains("rate limit") {
            return TrellisError::RateLimited {
                retry_after_secs: 60,
            };
        }
        if error_type == "FORBIDDEN"
            || error_type == "INSUFFICIENT_SCOPES"
            || message.contains("permission")
            || message.contains("access denied")
        {
            return TrellisError::Forbidden(error.message.clone());
        }
        if error_type == "NOT_FOUND"
            || message.contains("could not resolve")
            || message.contains("not found")
        {
            return TrellisError::IssueNotFound(format!("{context}: {}", error.message));
        }
        if message.contains("parse error")
            || message.contains("syntax error")
            || message.contains("expected type")
        {
            // A malformed query is a programmer bug; fail hard.
            return TrellisError::Internal(format!("{context}: {}", error.message));
        }
    }

    let joined: Vec<&str> = errors.iter().map(|e| e.message.as_str()).collect();
    TrellisError::NetworkError(format!("{context}: GraphQL: {}", joined.join("; ")))
}

/// A 403 body can mean a disabled preview feature rather than a permission
/// problem.
fn classify_forbidden(body: &str, context: &str) -> TrellisError {
    let lower = body.to_lowercase();
    if lower.contains("subissue") || lower.contains("sub_issue") {
        return TrellisError::FeatureUnavailable(Feature::SubIssues);
    }
    if lower.contains("issuetype") || lower.contains("issue type") {
        return TrellisError::FeatureUnavailable(Feature::IssueTypes);
    }
    if lower.contains("projectv2") || lower.contains("projects v2") {
        return TrellisError::FeatureUnavailable(Feature::ProjectsV2);
    }
    TrellisError::Forbidden(format!("{context}: {body}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{headers, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport(server: &MockServer) -> GraphTransport {
        GraphTransport::new("test-token")
            .unwrap()
            .with_url(format!("{}/graphql", server.uri()))
    }

    #[test]
    fn test_classify_feature_errors() {
        let cases = [
            ("Field 'subIssues' doesn't exist on type 'Issue'", Feature::SubIssues),
            ("issueType is not enabled for this repository", Feature::IssueTypes),
            ("ProjectV2 not accessible", Feature::ProjectsV2),
        ];
        for (message, feature) in cases {
            let errors = vec![GraphQLErrorItem {
                message: message.to_string(),
                error_type: None,
            }];
            match classify_errors(&errors, "test") {
                TrellisError::FeatureUnavailable(f) => assert_eq!(f, feature),
                other => panic!("unexpected: {other:?}"),
            }
        }
    }

    #[test]
    fn test_classify_syntax_error_fails_hard() {
        let errors = vec![GraphQLErrorItem {
            message: "Parse error on \"}\" at [3, 1]".to_string(),
            error_type: None,
        }];
        let err = classify_errors(&errors, "test");
        assert!(matches!(err, TrellisError::Internal(_)));
        assert_eq!(err.exit_code(), 5);
    }

    #[test]
    fn test_classify_permission_error() {
        let errors = vec![GraphQLErrorItem {
            message: "you lack permission to update this issue".to_string(),
            error_type: Some("FORBIDDEN".to_string()),
        }];
        assert!(matches!(
            classify_errors(&errors, "test"),
            TrellisError::Forbidden(_)
        ));
    }

    #[tokio::test]
    async fn test_feature_header_is_sent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .and(headers("GraphQL-Features", FEATURE_HEADER.split(',').collect::<Vec<_>>()))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {
                    "repository": { "issue": { "id": "I_node7" } }
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let id = transport(&server)
            .resolve_node_id("acme", "svc", 7)
            .await
            .unwrap();
        assert_eq!(id, "I_node7");
    }

    #[tokio::test]
    async fn test_graphql_error_payload_is_classified() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": null,
                "errors": [{ "message": "Field 'subIssues' doesn't exist on type 'Issue'" }]
            })))
            .mount(&server)
            .await;

        let err = transport(&server)
            .probe_sub_issues("acme", "svc")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TrellisError::FeatureUnavailable(Feature::SubIssues)
        ));
    }

    #[tokio::test]
    async fn test_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = transport(&server)
            .resolve_node_id("acme", "svc", 1)
            .await
            .unwrap_err();
        assert!(matches!(err, TrellisError::InvalidCredential(_)));
    }

    #[tokio::test]
    async fn test_children_parsing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {
                    "node": {
                        "number": 10,
                        "title": "Auth epic",
                        "state": "OPEN",
                        "subIssues": {
                            "nodes": [
                                {
                                    "number": 11,
                                    "title": "Endpoint",
                                    "state": "CLOSED",
                                    "issueType": { "name": "Task" },
                                    "labels": { "nodes": [] }
                                },
                                {
                                    "number": 12,
                                    "title": "Docs",
                                    "state": "OPEN",
                                    "issueType": null,
                                    "labels": { "nodes": [{ "name": "type:task" }] }
                                }
                            ]
                        }
                    }
                }
            })))
            .mount(&server)
            .await;

        let issue = transport(&server)
            .get_issue_with_children("I_node10")
            .await
            .unwrap();
        assert_eq!(issue.number, 10);
        assert_eq!(issue.children.len(), 2);
        assert!(issue.children[0].is_closed());
        assert_eq!(issue.children[0].kind, Some(IssueKind::Task));
        assert_eq!(issue.children[1].kind, Some(IssueKind::Task));
    }
}
