//! In-memory stores

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::errors::ServerError;
use crate::models::deployment::{Deployment, DeploymentStep, StepKind, StepStatus};
use crate::models::project::Project;
use crate::store::{
    name_conflict, sort_newest_first, DeploymentFilter, DeploymentStore, ProjectStore,
};

/// Deployments keyed by id
#[derive(Default)]
pub struct MemoryDeploymentStore {
    entries: RwLock<HashMap<String, Deployment>>,
}

impl MemoryDeploymentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeploymentStore for MemoryDeploymentStore {
    async fn create_deployment(&self, deployment: Deployment) -> Result<Deployment, ServerError> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());

        if let Some(existing) = entries.get(&deployment.deployment_id) {
            return Ok(existing.clone());
        }
        if entries
            .values()
            .any(|d| d.deployment_name == deployment.deployment_name)
        {
            return Err(name_conflict(&deployment.deployment_name));
        }

        entries.insert(deployment.deployment_id.clone(), deployment.clone());
        Ok(deployment)
    }

    async fn get_deployment(&self, deployment_id: &str) -> Result<Option<Deployment>, ServerError> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(deployment_id).cloned())
    }

    async fn upsert_step(
        &self,
        deployment_id: &str,
        step: DeploymentStep,
    ) -> Result<Deployment, ServerError> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let deployment = entries
            .get_mut(deployment_id)
            .ok_or_else(|| ServerError::DeploymentNotFound(deployment_id.to_string()))?;

        deployment.record_step(step);
        Ok(deployment.clone())
    }

    async fn set_step_status(
        &self,
        deployment_id: &str,
        kind: StepKind,
        status: StepStatus,
    ) -> Result<Option<Deployment>, ServerError> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let deployment = entries
            .get_mut(deployment_id)
            .ok_or_else(|| ServerError::DeploymentNotFound(deployment_id.to_string()))?;

        if !deployment.mark_step(kind, status) {
            return Ok(None);
        }
        Ok(Some(deployment.clone()))
    }

    async fn list_deployments(
        &self,
        filter: &DeploymentFilter,
    ) -> Result<Vec<Deployment>, ServerError> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let mut deployments: Vec<Deployment> =
            entries.values().filter(|d| filter.matches(d)).cloned().collect();
        sort_newest_first(&mut deployments);
        Ok(deployments)
    }

    async fn delete_deployment(&self, deployment_id: &str) -> Result<bool, ServerError> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        Ok(entries.remove(deployment_id).is_some())
    }
}

/// Projects keyed by id
#[derive(Default)]
pub struct MemoryProjectStore {
    entries: RwLock<HashMap<String, Project>>,
}

impl MemoryProjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProjectStore for MemoryProjectStore {
    async fn find_project(&self, project_id: &str) -> Result<Option<Project>, ServerError> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(project_id).cloned())
    }

    async fn save_project(&self, project: Project) -> Result<Project, ServerError> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(project.project_id.clone(), project.clone());
        Ok(project)
    }

    async fn list_projects(&self) -> Result<Vec<Project>, ServerError> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let mut projects: Vec<Project> = entries.values().cloned().collect();
        projects.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(projects)
    }

    async fn delete_project(&self, project_id: &str) -> Result<bool, ServerError> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        Ok(entries.remove(project_id).is_some())
    }
}
