//! Workflow verbs
//!
//! start-plan through approve-work. Each verb names one transition in the
//! engine's table; the engine does the rest.

use crate::config::Config;
use crate::model::RepoRef;
use crate::remote::HybridClient;
use crate::workflow::{TransitionReport, WorkflowEngine};
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowVerb {
    StartPlan,
    SubmitPlan,
    ApprovePlan,
    StartWork,
    SubmitWork,
    ApproveWork,
}

impl WorkflowVerb {
    pub fn transition_name(&self) -> &'static str {
        match self {
            Self::StartPlan => "start-plan",
            Self::SubmitPlan => "submit-plan",
            Self::ApprovePlan => "approve-plan",
            Self::StartWork => "start-work",
            Self::SubmitWork => "submit-work",
            Self::ApproveWork => "approve-work",
        }
    }
}

pub struct WorkflowCommand<'a> {
    client: &'a HybridClient,
    config: &'a Config,
}

impl<'a> WorkflowCommand<'a> {
    pub fn new(client: &'a HybridClient, config: &'a Config) -> Self {
        Self { client, config }
    }

    pub async fn execute(
        &self,
        repo: &RepoRef,
        number: u64,
        verb: WorkflowVerb,
        message: Option<String>,
    ) -> Result<TransitionReport> {
        WorkflowEngine::new(self.client, self.config)
            .execute(repo, number, verb.transition_name(), message)
            .await
    }
}
