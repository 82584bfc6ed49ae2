//! Document store
//!
//! Deployments and projects are persisted through two narrow traits so the
//! orchestrator never depends on a concrete backend. `memory` is used by
//! tests and ephemeral runs, `file` keeps one JSON document per record.

pub mod file;
pub mod memory;

use async_trait::async_trait;

use crate::errors::ServerError;
use crate::models::deployment::{Deployment, DeploymentStep, StepKind, StepStatus};
use crate::models::project::Project;

pub use file::{FileDeploymentStore, FileProjectStore};
pub use memory::{MemoryDeploymentStore, MemoryProjectStore};

/// Listing filter; unset fields match everything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeploymentFilter {
    pub project_id: Option<String>,
    pub space_id: Option<String>,
}

impl DeploymentFilter {
    pub fn matches(&self, deployment: &Deployment) -> bool {
        self.project_id
            .as_deref()
            .is_none_or(|id| deployment.project_id == id)
            && self
                .space_id
                .as_deref()
                .is_none_or(|id| deployment.space_id == id)
    }
}

#[async_trait]
pub trait DeploymentStore: Send + Sync {
    /// Insert `deployment` unless one with the same id exists, in which case
    /// the stored document is returned untouched.
    ///
    /// Fails with `Conflict` when another deployment already holds the name.
    async fn create_deployment(&self, deployment: Deployment) -> Result<Deployment, ServerError>;

    async fn get_deployment(&self, deployment_id: &str) -> Result<Option<Deployment>, ServerError>;

    /// Replace the current entry of the step's kind and append it to history
    async fn upsert_step(
        &self,
        deployment_id: &str,
        step: DeploymentStep,
    ) -> Result<Deployment, ServerError>;

    /// Update the current entry of `kind` in place.
    ///
    /// `Ok(None)` without writing when the deployment has no such entry.
    async fn set_step_status(
        &self,
        deployment_id: &str,
        kind: StepKind,
        status: StepStatus,
    ) -> Result<Option<Deployment>, ServerError>;

    /// Matching deployments, newest first
    async fn list_deployments(
        &self,
        filter: &DeploymentFilter,
    ) -> Result<Vec<Deployment>, ServerError>;

    async fn delete_deployment(&self, deployment_id: &str) -> Result<bool, ServerError>;
}

#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn find_project(&self, project_id: &str) -> Result<Option<Project>, ServerError>;

    async fn save_project(&self, project: Project) -> Result<Project, ServerError>;

    /// All projects ordered by creation time
    async fn list_projects(&self) -> Result<Vec<Project>, ServerError>;

    async fn delete_project(&self, project_id: &str) -> Result<bool, ServerError>;
}

pub(crate) fn sort_newest_first(deployments: &mut [Deployment]) {
    deployments.sort_by(|a, b| b.started_at.cmp(&a.started_at));
}

pub(crate) fn name_conflict(name: &str) -> ServerError {
    ServerError::Conflict(format!("deployment name already exists: {}", name))
}
