//! JSON file stores
//!
//! One pretty-printed document per record, named `<id>.json`. Writes go
//! through a temp file and a rename, and are serialized per store so the
//! read-modify-write of a step upsert cannot interleave.

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::warn;

use crate::errors::ServerError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;
use crate::models::deployment::{Deployment, DeploymentStep, StepKind, StepStatus};
use crate::models::project::Project;
use crate::store::{
    name_conflict, sort_newest_first, DeploymentFilter, DeploymentStore, ProjectStore,
};

/// Document file for `id`, `None` when the id cannot be a plain file name
fn document(dir: &Dir, id: &str) -> Option<File> {
    let plain = !id.is_empty()
        && !id.starts_with('.')
        && !id.contains(['/', '\\', '\0']);
    plain.then(|| dir.file(&format!("{}.json", id)))
}

/// Read every document in `dir`, skipping unreadable ones
async fn read_all<T: serde::de::DeserializeOwned>(dir: &Dir) -> Result<Vec<T>, ServerError> {
    let mut documents = Vec::new();
    for path in dir.list_files("json").await? {
        match File::new(&path).read_json::<T>().await {
            Ok(document) => documents.push(document),
            Err(e) => warn!("Skipping unreadable document {}: {}", path.display(), e),
        }
    }
    Ok(documents)
}

/// Deployments under `<base_dir>/deployments`
pub struct FileDeploymentStore {
    dir: Dir,
    write_lock: Mutex<()>,
}

impl FileDeploymentStore {
    pub fn new(dir: Dir) -> Self {
        Self {
            dir,
            write_lock: Mutex::new(()),
        }
    }

    async fn load(&self, deployment_id: &str) -> Result<Option<Deployment>, ServerError> {
        match document(&self.dir, deployment_id) {
            Some(file) => file.read_json_opt().await,
            None => Ok(None),
        }
    }

    async fn store(&self, deployment: &Deployment) -> Result<(), ServerError> {
        let file = document(&self.dir, &deployment.deployment_id).ok_or_else(|| {
            ServerError::InvalidParameter(format!(
                "deployment id is not storable: {}",
                deployment.deployment_id
            ))
        })?;
        file.write_json(deployment).await
    }
}

#[async_trait]
impl DeploymentStore for FileDeploymentStore {
    async fn create_deployment(&self, deployment: Deployment) -> Result<Deployment, ServerError> {
        let _guard = self.write_lock.lock().await;

        if let Some(existing) = self.load(&deployment.deployment_id).await? {
            return Ok(existing);
        }
        let taken = read_all::<Deployment>(&self.dir)
            .await?
            .iter()
            .any(|d| d.deployment_name == deployment.deployment_name);
        if taken {
            return Err(name_conflict(&deployment.deployment_name));
        }

        self.store(&deployment).await?;
        Ok(deployment)
    }

    async fn get_deployment(&self, deployment_id: &str) -> Result<Option<Deployment>, ServerError> {
        self.load(deployment_id).await
    }

    async fn upsert_step(
        &self,
        deployment_id: &str,
        step: DeploymentStep,
    ) -> Result<Deployment, ServerError> {
        let _guard = self.write_lock.lock().await;

        let mut deployment = self
            .load(deployment_id)
            .await?
            .ok_or_else(|| ServerError::DeploymentNotFound(deployment_id.to_string()))?;
        deployment.record_step(step);
        self.store(&deployment).await?;
        Ok(deployment)
    }

    async fn set_step_status(
        &self,
        deployment_id: &str,
        kind: StepKind,
        status: StepStatus,
    ) -> Result<Option<Deployment>, ServerError> {
        let _guard = self.write_lock.lock().await;

        let mut deployment = self
            .load(deployment_id)
            .await?
            .ok_or_else(|| ServerError::DeploymentNotFound(deployment_id.to_string()))?;
        if !deployment.mark_step(kind, status) {
            return Ok(None);
        }
        self.store(&deployment).await?;
        Ok(Some(deployment))
    }

    async fn list_deployments(
        &self,
        filter: &DeploymentFilter,
    ) -> Result<Vec<Deployment>, ServerError> {
        let mut deployments: Vec<Deployment> = read_all::<Deployment>(&self.dir)
            .await?
            .into_iter()
            .filter(|d| filter.matches(d))
            .collect();
        sort_newest_first(&mut deployments);
        Ok(deployments)
    }

    async fn delete_deployment(&self, deployment_id: &str) -> Result<bool, ServerError> {
        let _guard = self.write_lock.lock().await;
        match document(&self.dir, deployment_id) {
            Some(file) => file.delete().await,
            None => Ok(false),
        }
    }
}

/// Projects under `<base_dir>/projects`
pub struct FileProjectStore {
    dir: Dir,
    write_lock: Mutex<()>,
}

impl FileProjectStore {
    pub fn new(dir: Dir) -> Self {
        Self {
            dir,
            write_lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl ProjectStore for FileProjectStore {
    async fn find_project(&self, project_id: &str) -> Result<Option<Project>, ServerError> {
        match document(&self.dir, project_id) {
            Some(file) => file.read_json_opt().await,
            None => Ok(None),
        }
    }

    async fn save_project(&self, project: Project) -> Result<Project, ServerError> {
        let _guard = self.write_lock.lock().await;
        let file = document(&self.dir, &project.project_id).ok_or_else(|| {
            ServerError::InvalidParameter(format!(
                "project id is not storable: {}",
                project.project_id
            ))
        })?;
        file.write_json(&project).await?;
        Ok(project)
    }

    async fn list_projects(&self) -> Result<Vec<Project>, ServerError> {
        let mut projects = read_all::<Project>(&self.dir).await?;
        projects.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(projects)
    }

    async fn delete_project(&self, project_id: &str) -> Result<bool, ServerError> {
        let _guard = self.write_lock.lock().await;
        match document(&self.dir, project_id) {
            Some(file) => file.delete().await,
            None => Ok(false),
        }
    }
}
