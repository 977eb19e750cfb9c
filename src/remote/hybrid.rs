//! Hybrid client
//!
//! Unifies the REST and graph transports behind routed operations: feature
//! probing with a process-lifetime cache, per-operation fallback selection,
//! node-ID translation, and rollback when a multi-step creation fails
//! partway. Owns both transports for the lifetime of a command invocation.

use crate::body::ParsedBody;
use crate::model::{ChildIssue, IssueKind, Milestone, RemoteIssue, RepoRef};
use crate::remote::graphql::GraphTransport;
use crate::remote::rest::{IssuePatch, NewIssue, RestTransport};
use crate::remote::Feature;
use crate::{Result, TrellisError};
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};
use tracing::{debug, info, warn};

/// How the typed-create path was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TypePath {
    /// Native custom issue type assigned via the graph transport
    CustomType,
    /// `type:<kind>` label fallback
    TypeLabel,
}

/// How the parent-child relationship was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LinkOutcome {
    /// Native sub-issue edge
    NativeEdge,
    /// `**Parent:** #N` reference in the child body prelude
    BodyReference,
}

/// Bounded node-ID cache keyed by (owner/repo, issue number).
struct NodeIdCache {
    capacity: usize,
    entries: HashMap<(String, u64), (String, u64)>,
    tick: u64,
}

impl NodeIdCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
            tick: 0,
        }
    }

    fn get(&mut self, key: &(String, u64)) -> Option<String> {
        self.tick += 1;
        let tick = self.tick;
        self.entries.get_mut(key).map(|(id, used)| {
            *used = tick;
            id.clone()
        })
    }

    fn insert(&mut self, key: (String, u64), id: String) {
        self.tick += 1;
        if self.entries.len() >= self.capacity && !self.entries.contains_key(&key) {
            if let Some(oldest) = self
                .entries
                .iter()
                .min_by_key(|(_, (_, used))| *used)
                .map(|(k, _)| k.clone())
            {
                self.entries.remove(&oldest);
            }
        }
        self.entries.insert(key, (id, self.tick));
    }
}

fn child_reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\s*- \[.\]\s*#(\d+)").expect("static pattern"))
}

/// Façade over both transports with feature detection and fallbacks.
pub struct HybridClient {
    rest: RestTransport,
    graphql: GraphTransport,
    features: Mutex<HashMap<Feature, bool>>,
    node_ids: Mutex<NodeIdCache>,
    actor: Mutex<Option<String>>,
}

impl HybridClient {
    pub fn new(token: &str) -> Result<Self> {
        Ok(Self::from_parts(
            RestTransport::new(token)?,
            GraphTransport::new(token)?,
        ))
    }

    /// Assemble from preconfigured transports. Used by tests.
    pub fn from_parts(rest: RestTransport, graphql: GraphTransport) -> Self {
        Self {
            rest,
            graphql,
            features: Mutex::new(HashMap::new()),
            node_ids: Mutex::new(NodeIdCache::new(64)),
            actor: Mutex::new(None),
        }
    }

    pub fn rest(&self) -> &RestTransport {
        &self.rest
    }

    pub fn graphql(&self) -> &GraphTransport {
        &self.graphql
    }

    /// Whether a feature is available, probing at most once per process.
    /// Probes never propagate errors; unknown means unavailable.
    pub async fn feature_available(&self, feature: Feature, repo: &RepoRef) -> bool {
        if let Some(&available) = self.features.lock().expect("feature cache").get(&feature) {
            return available;
        }

        let probe = match feature {
            Feature::SubIssues => self.graphql.probe_sub_issues(&repo.owner, &repo.repo).await,
            Feature::IssueTypes => {
                self.graphql
                    .probe_issue_types(&repo.owner, &repo.repo)
                    .await
            }
            // Projects are probed contextually when the board is resolved;
            // until then assume present and let the caller mark the outcome.
            Feature::ProjectsV2 => Ok(()),
        };

        let available = match probe {
            Ok(()) => true,
            Err(e) => {
                debug!(feature = %feature, error = %e, "Feature probe failed");
                false
            }
        };

        self.features
            .lock()
            .expect("feature cache")
            .insert(feature, available);
        available
    }

    /// Record a feature outcome discovered outside a probe.
    pub fn mark_feature(&self, feature: Feature, available: bool) {
        self.features
            .lock()
            .expect("feature cache")
            .insert(feature, available);
    }

    /// Login of the authenticated principal, fetched once.
    pub async fn actor(&self) -> Result<String> {
        if let Some(actor) = self.actor.lock().expect("actor cache").clone() {
            return Ok(actor);
        }
        let login = self.rest.authenticated_user().await?.login;
        *self.actor.lock().expect("actor cache") = Some(login.clone());
        Ok(login)
    }

    /// Translate an issue number to its opaque node ID, with a small LRU.
    pub async fn node_id(&self, repo: &RepoRef, number: u64) -> Result<String> {
        let key = (repo.full_name(), number);
        if let Some(id) = self.node_ids.lock().expect("node cache").get(&key) {
            return Ok(id);
        }
        let id = self
            .graphql
            .resolve_node_id(&repo.owner, &repo.repo, number)
            .await?;
        self.node_ids
            .lock()
            .expect("node cache")
            .insert(key, id.clone());
        Ok(id)
    }

    /// Create an issue with a typed tag. Preferred path is a graph create
    /// carrying the custom type; fallback is a REST create with a `type:`
    /// label. Labels, assignees and milestone are applied either way.
    pub async fn create_typed_issue(
        &self,
        repo: &RepoRef,
        kind: IssueKind,
        title: &str,
        body: &str,
        labels: &[String],
        assignees: &[String],
        milestone: Option<&Milestone>,
    ) -> Result<(RemoteIssue, TypePath)> {
        if self.feature_available(Feature::IssueTypes, repo).await {
            let repo_id = self.graphql.repository_id(&repo.owner, &repo.repo).await?;
            match self
                .graphql
                .create_issue_with_type(&repo_id, title, body, kind.custom_type_name())
                .await
            {
                Ok(created) => {
                    self.node_ids
                        .lock()
                        .expect("node cache")
                        .insert((repo.full_name(), created.number), created.id.clone());

                    // The create mutation carries title/body/type only; the
                    // rest is applied through a single REST patch.
                    let issue = self
                        .rest
                        .update_issue(
                            repo,
                            created.number,
                            &IssuePatch {
                                labels: Some(labels.to_vec()),
                                assignees: (!assignees.is_empty())
                                    .then(|| assignees.to_vec()),
                                milestone: milestone.map(|m| m.number),
                                ..Default::default()
                            },
                        )
                        .await?;
                    return Ok((issue, TypePath::CustomType));
                }
                Err(TrellisError::FeatureUnavailable(feature)) => {
                    info!(%feature, "Typed create unavailable, using label fallback");
                    self.mark_feature(feature, false);
                }
                Err(e) => return Err(e),
            }
        }

        let mut all_labels = labels.to_vec();
        if !all_labels.iter().any(|l| l == kind.type_label()) {
            all_labels.push(kind.type_label().to_string());
        }
        let issue = self
            .rest
            .create_issue(
                repo,
                &NewIssue {
                    title: title.to_string(),
                    body: Some(body.to_string()),
                    labels: all_labels,
                    assignees: assignees.to_vec(),
                    milestone: milestone.map(|m| m.number),
                },
            )
            .await?;
        Ok((issue, TypePath::TypeLabel))
    }

    /// Record the parent-child relationship for a freshly created child.
    ///
    /// Preferred path is the native sub-issue edge. A feature gap degrades to
    /// the body-reference fallback. Any hard failure on a required
    /// relationship rolls the orphan child back (closes it) and surfaces
    /// `RelationshipRequired` naming the failed step; an orphan with no
    /// traceable parent would break the hierarchy invariant.
    pub async fn link_child(
        &self,
        repo: &RepoRef,
        parent_number: u64,
        child: &RemoteIssue,
        required: bool,
    ) -> Result<LinkOutcome> {
        if self.feature_available(Feature::SubIssues, repo).await {
            match self.try_native_edge(repo, parent_number, child).await {
                Ok(()) => return Ok(LinkOutcome::NativeEdge),
                Err((step, TrellisError::FeatureUnavailable(feature))) => {
                    info!(%feature, step, "Native edge unavailable, using body reference");
                    self.mark_feature(feature, false);
                }
                Err((step, e)) if required => {
                    warn!(step, error = %e, "Edge creation failed hard, rolling back child");
                    self.rollback_orphan(repo, child.number).await;
                    return Err(TrellisError::RelationshipRequired {
                        step: step.to_string(),
                    });
                }
                Err((step, e)) => {
                    warn!(step, error = %e, "Edge creation failed, using body reference");
                }
            }
        }

        match self.write_body_reference(repo, parent_number, child).await {
            Ok(()) => Ok(LinkOutcome::BodyReference),
            Err(e) if required => {
                warn!(error = %e, "Body reference failed, rolling back child");
                self.rollback_orphan(repo, child.number).await;
                Err(TrellisError::RelationshipRequired {
                    step: "body_reference".to_string(),
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn try_native_edge(
        &self,
        repo: &RepoRef,
        parent_number: u64,
        child: &RemoteIssue,
    ) -> std::result::Result<(), (&'static str, TrellisError)> {
        let parent_id = self
            .node_id(repo, parent_number)
            .await
            .map_err(|e| ("resolve_node_id", e))?;
        let child_id = match &child.node_id {
            Some(id) => id.clone(),
            None => self
                .node_id(repo, child.number)
                .await
                .map_err(|e| ("resolve_node_id", e))?,
        };
        self.graphql
            .add_sub_issue_edge(&parent_id, &child_id)
            .await
            .map_err(|e| ("add_sub_issue_edge", e))
    }

    async fn write_body_reference(
        &self,
        repo: &RepoRef,
        parent_number: u64,
        child: &RemoteIssue,
    ) -> Result<()> {
        let mut parsed = ParsedBody::parse(child.body.as_deref().unwrap_or(""));
        if parsed.references.parent == Some(parent_number) {
            return Ok(());
        }
        parsed.ensure_parent_reference(parent_number);
        self.rest
            .update_issue_body(repo, child.number, &parsed.to_body_checked()?)
            .await?;
        Ok(())
    }

    /// Compensating mutation: close the orphan. Closing an already-closed
    /// issue is a no-op, so the rollback is idempotent. Failures here are
    /// logged, not surfaced; the caller's original error is what matters.
    pub async fn rollback_orphan(&self, repo: &RepoRef, number: u64) {
        match self.rest.close_issue(repo, number).await {
            Ok(_) => info!(repo = %repo, number, "Rolled back orphan issue"),
            Err(TrellisError::IssueNotFound(_)) => {}
            Err(e) => warn!(repo = %repo, number, error = %e, "Rollback close failed"),
        }
    }

    /// Resolve an issue's kind for hierarchy validation. Preferred path is
    /// the typed graph query; fallback is label inference.
    pub async fn resolve_kind(&self, repo: &RepoRef, issue: &RemoteIssue) -> IssueKind {
        if self.feature_available(Feature::IssueTypes, repo).await {
            match self
                .graphql
                .issue_type_name(&repo.owner, &repo.repo, issue.number)
                .await
            {
                Ok(Some(name)) => {
                    if let Some(kind) = IssueKind::parse(&name) {
                        return kind;
                    }
                }
                Ok(None) => {}
                Err(TrellisError::FeatureUnavailable(feature)) => {
                    self.mark_feature(feature, false);
                }
                Err(e) => {
                    debug!(error = %e, "Typed kind lookup failed, inferring from labels");
                }
            }
        }
        issue.kind()
    }

    /// The hierarchy view of an issue's children. Preferred path is the
    /// native sub-issue query; fallback parses `- [.] #N` references from
    /// the parent body and reads each child's authoritative state.
    pub async fn children(&self, repo: &RepoRef, number: u64) -> Result<Vec<ChildIssue>> {
        if self.feature_available(Feature::SubIssues, repo).await {
            let node_id = self.node_id(repo, number).await?;
            match self.graphql.get_issue_with_children(&node_id).await {
                Ok(issue) => return Ok(issue.children),
                Err(TrellisError::FeatureUnavailable(feature)) => {
                    self.mark_feature(feature, false);
                }
                Err(e) => return Err(e),
            }
        }

        let parent = self.rest.get_issue(repo, number).await?;
        let body = parent.body.unwrap_or_default();
        let mut children = Vec::new();
        for line in body.lines() {
            if let Some(caps) = child_reference_pattern().captures(line) {
                if let Ok(child_number) = caps[1].parse::<u64>() {
                    if child_number == number {
                        continue;
                    }
                    let child = self.rest.get_issue(repo, child_number).await?;
                    children.push(ChildIssue {
                        number: child.number,
                        state: child.state.clone(),
                        kind: Some(child.kind()),
                        title: child.title,
                    });
                }
            }
        }
        Ok(children)
    }
}
