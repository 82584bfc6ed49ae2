//! Deployment models

use chrono::{DateTime, Utc};
use openapi_server::models::{DeploymentInfo, StepRecord};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::deploy::fsm::{DeploymentEvent, DeploymentFsm, DeploymentState};

/// Terraform lifecycle action. Categorical: the same kind can recur.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Init,
    Plan,
    Apply,
    Destroy,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Init => "init",
            StepKind::Plan => "plan",
            StepKind::Apply => "apply",
            StepKind::Destroy => "destroy",
        }
    }

    /// Apply and destroy close a lifecycle run
    pub fn is_terminal(&self) -> bool {
        matches!(self, StepKind::Apply | StepKind::Destroy)
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recorded status of a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Successful,
    Failed,
    Cancelled,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::Successful => "successful",
            StepStatus::Failed => "failed",
            StepStatus::Cancelled => "cancelled",
        }
    }

    /// Status for a finished command
    pub fn from_exit_code(exit_code: Option<i32>) -> Self {
        if exit_code == Some(0) {
            StepStatus::Successful
        } else {
            StepStatus::Failed
        }
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One step outcome, embedded in a deployment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentStep {
    pub step: StepKind,
    pub step_status: StepStatus,

    /// Combined command output, stored verbatim
    pub message: String,
    pub timestamp: DateTime<Utc>,

    /// `terraform show -json` of the saved plan; only ever set for `plan`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_data: Option<Value>,
}

impl DeploymentStep {
    pub fn new(step: StepKind, step_status: StepStatus, message: impl Into<String>) -> Self {
        Self {
            step,
            step_status,
            message: message.into(),
            timestamp: Utc::now(),
            structured_data: None,
        }
    }

    pub fn with_structured_data(mut self, data: Option<Value>) -> Self {
        self.structured_data = data;
        self
    }

    pub fn to_record(&self) -> StepRecord {
        StepRecord {
            step: self.step.to_string(),
            step_status: self.step_status.to_string(),
            message: self.message.clone(),
            timestamp: self.timestamp,
            structured_data: self.structured_data.clone(),
        }
    }
}

/// One lifecycle execution context of a project space
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    pub deployment_id: String,

    /// Human-readable, unique across deployments, never changes
    pub deployment_name: String,

    pub project_id: String,

    /// Space name within the project
    pub space_id: String,

    #[serde(default)]
    pub state: DeploymentState,

    /// Step whose failure put the deployment into `failed`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<StepKind>,

    /// Latest outcome per step kind, in execution order
    pub steps: Vec<DeploymentStep>,

    /// Every recorded outcome, append-only
    #[serde(default)]
    pub history: Vec<DeploymentStep>,

    pub started_at: DateTime<Utc>,

    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,

    pub updated_at: DateTime<Utc>,
}

impl Deployment {
    /// Create an empty deployment
    pub fn new(
        deployment_id: impl Into<String>,
        deployment_name: impl Into<String>,
        project_id: impl Into<String>,
        space_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            deployment_id: deployment_id.into(),
            deployment_name: deployment_name.into(),
            project_id: project_id.into(),
            space_id: space_id.into(),
            state: DeploymentState::Uninitialized,
            failed_step: None,
            steps: Vec::new(),
            history: Vec::new(),
            started_at: now,
            finished_at: None,
            updated_at: now,
        }
    }

    /// Current entry of the given kind
    pub fn step(&self, kind: StepKind) -> Option<&DeploymentStep> {
        self.steps.iter().find(|s| s.step == kind)
    }

    /// Record a step outcome: the previous entry of the same kind is removed
    /// and the new one appended, so at most one entry per kind remains.
    pub fn record_step(&mut self, step: DeploymentStep) {
        self.steps.retain(|s| s.step != step.step);

        if step.step.is_terminal() && step.step_status == StepStatus::Successful {
            self.finished_at = Some(step.timestamp);
        }
        self.advance(step.step, step.step_status);
        self.updated_at = step.timestamp;

        self.history.push(step.clone());
        self.steps.push(step);
    }

    /// Change the status of the current entry of `kind` in place.
    ///
    /// Returns `false` without touching anything when no such entry exists.
    pub fn mark_step(&mut self, kind: StepKind, status: StepStatus) -> bool {
        let now = Utc::now();
        let Some(step) = self.steps.iter_mut().find(|s| s.step == kind) else {
            return false;
        };

        step.step_status = status;
        step.timestamp = now;
        let mut entry = step.clone();
        entry.structured_data = None;

        self.advance(kind, status);
        self.updated_at = now;
        self.history.push(entry);
        true
    }

    fn advance(&mut self, kind: StepKind, status: StepStatus) {
        let Some(event) = DeploymentEvent::from_step(kind, status) else {
            return;
        };
        let mut fsm = DeploymentFsm::resume(self.state, self.failed_step);
        if let Err(e) = fsm.process(event) {
            debug!("Deployment {} keeps state {}: {}", self.deployment_id, self.state, e);
        }
        self.state = fsm.state();
        self.failed_step = fsm.failed_step();
    }

    pub fn step_records(&self) -> Vec<StepRecord> {
        self.steps.iter().map(DeploymentStep::to_record).collect()
    }

    pub fn to_info(&self) -> DeploymentInfo {
        DeploymentInfo {
            deployment_id: self.deployment_id.clone(),
            deployment_name: self.deployment_name.clone(),
            project_id: self.project_id.clone(),
            space_id: self.space_id.clone(),
            state: self.state.to_string(),
            failed_step: self.failed_step.map(|kind| kind.to_string()),
            started_at: self.started_at,
            finished_at: self.finished_at,
            steps: self.step_records(),
        }
    }
}
