//! Finite State Machine for the Terraform deployment lifecycle
//!
//! The state is stored on the deployment and advanced with every step write.
//! Step events are accepted from any state: re-running `init` or `plan` is
//! always legal and Terraform's own state directory enforces the real
//! prerequisites. Only a plan cancellation is restricted.

use serde::{Deserialize, Serialize};

use crate::models::deployment::{StepKind, StepStatus};

/// Deployment state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentState {
    /// No step has completed yet
    #[default]
    Uninitialized,

    /// `terraform init` succeeded
    Initialized,

    /// A plan is recorded and awaiting a decision
    Planned,

    /// Plan applied
    Applied,

    /// Infrastructure destroyed
    Destroyed,

    /// The latest step failed
    Failed,

    /// The recorded plan was rejected
    Cancelled,
}

impl DeploymentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentState::Uninitialized => "uninitialized",
            DeploymentState::Initialized => "initialized",
            DeploymentState::Planned => "planned",
            DeploymentState::Applied => "applied",
            DeploymentState::Destroyed => "destroyed",
            DeploymentState::Failed => "failed",
            DeploymentState::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for DeploymentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deployment event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentEvent {
    /// `terraform init` exited 0
    InitSucceeded,

    /// `terraform plan` exited 0
    PlanSucceeded,

    /// `terraform apply` exited 0
    ApplySucceeded,

    /// `terraform destroy` exited 0
    DestroySucceeded,

    /// A step exited non-zero
    StepFailed(StepKind),

    /// The user rejected the recorded plan
    PlanCancelled,
}

impl DeploymentEvent {
    /// Event produced by a recorded step outcome, `None` for in-flight
    /// statuses
    pub fn from_step(kind: StepKind, status: StepStatus) -> Option<Self> {
        match (kind, status) {
            (_, StepStatus::Pending | StepStatus::Running) => None,
            (_, StepStatus::Failed) => Some(DeploymentEvent::StepFailed(kind)),
            (StepKind::Plan, StepStatus::Cancelled) => Some(DeploymentEvent::PlanCancelled),
            (_, StepStatus::Cancelled) => None,
            (StepKind::Init, StepStatus::Successful) => Some(DeploymentEvent::InitSucceeded),
            (StepKind::Plan, StepStatus::Successful) => Some(DeploymentEvent::PlanSucceeded),
            (StepKind::Apply, StepStatus::Successful) => Some(DeploymentEvent::ApplySucceeded),
            (StepKind::Destroy, StepStatus::Successful) => Some(DeploymentEvent::DestroySucceeded),
        }
    }
}

/// Deployment FSM
#[derive(Debug, Clone, Default)]
pub struct DeploymentFsm {
    state: DeploymentState,
    failed_step: Option<StepKind>,
}

impl DeploymentFsm {
    /// Create a new FSM in the uninitialized state
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume from a stored state
    pub fn from_state(state: DeploymentState) -> Self {
        Self::resume(state, None)
    }

    /// Resume from a stored state and the step that failed, if any
    pub fn resume(state: DeploymentState, failed_step: Option<StepKind>) -> Self {
        Self { state, failed_step }
    }

    /// Get current state
    pub fn state(&self) -> DeploymentState {
        self.state
    }

    /// Step that moved the machine into `Failed`, if any
    pub fn failed_step(&self) -> Option<StepKind> {
        self.failed_step
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: DeploymentEvent) -> Result<(), String> {
        let new_state = match (self.state, event) {
            (_, DeploymentEvent::InitSucceeded) => DeploymentState::Initialized,
            (_, DeploymentEvent::PlanSucceeded) => DeploymentState::Planned,
            (_, DeploymentEvent::ApplySucceeded) => DeploymentState::Applied,
            (_, DeploymentEvent::DestroySucceeded) => DeploymentState::Destroyed,
            (_, DeploymentEvent::StepFailed(kind)) => {
                self.failed_step = Some(kind);
                self.state = DeploymentState::Failed;
                return Ok(());
            }

            // Only a pending plan decision can be cancelled
            (DeploymentState::Planned, DeploymentEvent::PlanCancelled) => {
                DeploymentState::Cancelled
            }

            (state, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", state, event));
            }
        };

        self.failed_step = None;
        self.state = new_state;
        Ok(())
    }
}
