//! Deployment orchestrator
//!
//! Sequences the Terraform lifecycle of one project space: validates the
//! request, resolves the execution container, runs the commands through the
//! runner and records the outcome in the deployment's step log.
//!
//! A non-zero Terraform exit is a normal outcome recorded as a `failed` step.
//! Only validation, lookup, resolution and transport problems are errors.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use openapi_server::models::{
    CommandResponse, DeploymentSummaryResponse, PlanResponse, SpaceStatus, SpaceSyncResponse,
    TerraformSummary,
};
use serde_json::Value;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{error, info, warn};

use crate::deploy::command::CommandLine;
use crate::deploy::identifiers;
use crate::deploy::parser::parse_summary;
use crate::deploy::repository::{self, DEFAULT_BRANCH};
use crate::deploy::resolver::ContainerResolver;
use crate::deploy::runner::{CommandOutput, CommandRunner};
use crate::deploy::summary;
use crate::deploy::terraform::{self, PLAN_FILE};
use crate::errors::ServerError;
use crate::models::deployment::{Deployment, DeploymentStep, StepKind, StepStatus};
use crate::models::project::{validate_segment, Project, SpaceChanges};
use crate::storage::settings::TerraformSettings;
use crate::store::{DeploymentFilter, DeploymentStore, ProjectStore};
use crate::utils::short_uid;

/// Message returned when a plan is cancelled
pub const PLAN_CANCELLED_MESSAGE: &str = "Plan Step Cancelled by User";

/// Parameters of a lifecycle step call
#[derive(Debug, Clone, Default)]
pub struct StepRequest {
    pub space_name: Option<String>,
    pub deployment_id: Option<String>,
}

impl StepRequest {
    pub fn new(space_name: impl Into<String>, deployment_id: Option<String>) -> Self {
        Self {
            space_name: Some(space_name.into()),
            deployment_id,
        }
    }
}

/// Result of an init, apply or destroy call
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub command: String,
    pub output: CommandOutput,
    pub summary: Option<TerraformSummary>,
    pub deployment: Deployment,
}

impl StepOutcome {
    pub fn to_response(&self) -> CommandResponse {
        CommandResponse {
            command: self.command.clone(),
            deployment_id: self.deployment.deployment_id.clone(),
            deployment_name: Some(self.deployment.deployment_name.clone()),
            exit_code: self.output.exit_code,
            stdout: self.output.stdout.clone(),
            stderr: self.output.stderr.clone(),
            combined: self.output.combined.clone(),
            summary: self.summary,
            step_status: self.output.step_status().to_string(),
            state: self.deployment.state.to_string(),
            steps: self.deployment.step_records(),
        }
    }
}

/// Result of a plan call
#[derive(Debug, Clone)]
pub struct PlanOutcome {
    /// The human-readable run
    pub output: CommandOutput,
    pub structured_data: Option<Value>,
    pub summary: Option<TerraformSummary>,
    pub deployment: Deployment,
}

impl PlanOutcome {
    pub fn to_response(&self) -> PlanResponse {
        PlanResponse {
            step_name: "Plan".to_string(),
            deployment_id: self.deployment.deployment_id.clone(),
            raw_format: self.output.stdout.clone(),
            data: self.structured_data.clone(),
            exit_code: self.output.exit_code,
            stderr: self.output.stderr.clone(),
            summary: self.summary,
            step_status: self.output.step_status().to_string(),
        }
    }
}

/// Result of a branch reset
#[derive(Debug, Clone)]
pub struct BranchReset {
    pub branch: String,
    pub project: Project,
    pub changes: SpaceChanges,
}

impl BranchReset {
    pub fn to_response(&self) -> SpaceSyncResponse {
        SpaceSyncResponse {
            success: true,
            message: format!("Repo reset to origin/{} and spaces synced", self.branch),
            spaces: self.project.to_response().spaces,
            added: self.changes.added.clone(),
            removed: self.changes.removed.clone(),
        }
    }
}

/// One async mutex per workspace path
#[derive(Default)]
struct WorkspaceLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl WorkspaceLocks {
    async fn acquire(&self, workspace: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.entry(workspace.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

/// Validated request target
struct Target {
    project: Project,
    space_name: String,
    workspace: String,
    deployment: Option<Deployment>,
}

pub struct Orchestrator {
    projects: Arc<dyn ProjectStore>,
    deployments: Arc<dyn DeploymentStore>,
    resolver: ContainerResolver,
    runner: CommandRunner,
    settings: TerraformSettings,
    locks: WorkspaceLocks,
}

impl Orchestrator {
    pub fn new(
        projects: Arc<dyn ProjectStore>,
        deployments: Arc<dyn DeploymentStore>,
        resolver: ContainerResolver,
        runner: CommandRunner,
        settings: TerraformSettings,
    ) -> Self {
        Self {
            projects,
            deployments,
            resolver,
            runner,
            settings,
            locks: WorkspaceLocks::default(),
        }
    }

    /// `terraform init`; creates the deployment when no id is given
    pub async fn init(
        &self,
        project_id: &str,
        request: StepRequest,
    ) -> Result<StepOutcome, ServerError> {
        self.run_step(project_id, request, StepKind::Init, terraform::init())
            .await
    }

    /// `terraform apply -auto-approve`
    pub async fn apply(
        &self,
        project_id: &str,
        request: StepRequest,
    ) -> Result<StepOutcome, ServerError> {
        self.run_step(project_id, request, StepKind::Apply, terraform::apply())
            .await
    }

    /// `terraform destroy -auto-approve`
    pub async fn destroy(
        &self,
        project_id: &str,
        request: StepRequest,
    ) -> Result<StepOutcome, ServerError> {
        self.run_step(project_id, request, StepKind::Destroy, terraform::destroy())
            .await
    }

    /// Human-readable plan plus a second run saving the plan and showing it
    /// as JSON for the structured data
    pub async fn plan(
        &self,
        project_id: &str,
        request: StepRequest,
    ) -> Result<PlanOutcome, ServerError> {
        let target = self.prepare(project_id, &request, true).await?;
        let deployment_id = existing_id(&target)?;

        let _guard = self.locks.acquire(&target.workspace).await;
        let container_id = self.resolve().await?;

        let output = self
            .run(&container_id, &target, &[terraform::plan()])
            .await?;
        let json_run = self
            .run(
                &container_id,
                &target,
                &[
                    terraform::plan_to_file(PLAN_FILE),
                    terraform::show_json(PLAN_FILE),
                ],
            )
            .await?;
        let structured_data = structured_plan(&deployment_id, &json_run);

        let step = DeploymentStep::new(StepKind::Plan, output.step_status(), output.combined.clone())
            .with_structured_data(structured_data.clone());
        let deployment = self.deployments.upsert_step(&deployment_id, step).await?;
        log_step(&deployment, StepKind::Plan, &output);

        Ok(PlanOutcome {
            summary: parse_summary(&output.stdout),
            output,
            structured_data,
            deployment,
        })
    }

    /// Mark the recorded plan as rejected. Runs no command.
    pub async fn cancel_plan(
        &self,
        project_id: &str,
        deployment_id: Option<&str>,
    ) -> Result<Deployment, ServerError> {
        let deployment_id = deployment_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ServerError::MissingParameter("deploymentId".to_string()))?;
        self.find_project(project_id).await?;
        self.find_deployment(project_id, deployment_id).await?;

        let deployment = self
            .deployments
            .set_step_status(deployment_id, StepKind::Plan, StepStatus::Cancelled)
            .await?
            .ok_or_else(|| {
                ServerError::StepNotFound(format!("plan step of deployment {}", deployment_id))
            })?;

        info!("Deployment {} plan cancelled", deployment_id);
        Ok(deployment)
    }

    /// Deployment with its resources bucketed from the current plan
    pub async fn summary(
        &self,
        deployment_id: &str,
    ) -> Result<DeploymentSummaryResponse, ServerError> {
        let deployment = self
            .deployments
            .get_deployment(deployment_id)
            .await?
            .ok_or_else(|| ServerError::DeploymentNotFound(deployment_id.to_string()))?;

        Ok(DeploymentSummaryResponse {
            deployment_id: deployment.deployment_id.clone(),
            deployment_name: deployment.deployment_name.clone(),
            started_at: deployment.started_at,
            finished_at: deployment.finished_at,
            state: deployment.state.to_string(),
            summary: summary::project(&deployment),
            steps: deployment.step_records(),
        })
    }

    pub async fn list_deployments(
        &self,
        filter: &DeploymentFilter,
    ) -> Result<Vec<Deployment>, ServerError> {
        self.deployments.list_deployments(filter).await
    }

    /// Delete a deployment on behalf of the project's owner
    pub async fn delete_deployment(
        &self,
        project_id: &str,
        deployment_id: &str,
        caller: Option<&str>,
    ) -> Result<(), ServerError> {
        let project = self.find_project(project_id).await?;
        let caller = authorize(&project, caller)?;

        self.find_deployment(project_id, deployment_id).await?;
        self.deployments.delete_deployment(deployment_id).await?;
        info!("Deployment {} deleted by {}", deployment_id, caller);
        Ok(())
    }

    /// Hard reset the project's checkout to its remote branch, then sync the
    /// space list with the folders at the repository root
    pub async fn reset_branch(&self, project_id: &str) -> Result<BranchReset, ServerError> {
        let mut project = self.find_project(project_id).await?;
        validate_segment("projectName", &project.project_name)?;
        let branch = project
            .branch
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .unwrap_or(DEFAULT_BRANCH)
            .to_string();
        if branch.starts_with('-') {
            return Err(ServerError::InvalidParameter(format!(
                "branch must not start with '-': {}",
                branch
            )));
        }

        let workspace = self.project_workspace(&project);
        let _guard = self.locks.acquire(&workspace).await;
        let container_id = self.resolve().await?;

        let check = self
            .exec_in(
                &container_id,
                &self.settings.workspace_root,
                &[repository::directory_exists(&project.project_name)],
                &[],
            )
            .await?;
        if !check.success() {
            return Err(ServerError::InvalidParameter(format!(
                "Workspace directory {} does not exist in container, clone the repository first",
                workspace
            )));
        }

        let reset = self
            .exec_in(
                &container_id,
                &workspace,
                &[
                    repository::fetch(&branch),
                    repository::reset_hard(&branch),
                    repository::clean(),
                ],
                &[],
            )
            .await?;
        ensure_success("git reset", &reset)?;

        let listing = self
            .exec_in(&container_id, &workspace, &[repository::list_folders()], &[])
            .await?;
        ensure_success("folder listing", &listing)?;

        let changes = project.sync_spaces(&repository::parse_folders(&listing.stdout));
        let project = self.projects.save_project(project).await?;
        info!(
            "Project {} reset to origin/{} (added {:?}, removed {:?})",
            project.project_id, branch, changes.added, changes.removed
        );

        Ok(BranchReset {
            branch,
            project,
            changes,
        })
    }

    /// Delete a project on behalf of its owner together with its checkout in
    /// the container and its deployments.
    ///
    /// A failed checkout removal is logged and does not stop the delete.
    pub async fn delete_project(
        &self,
        project_id: &str,
        caller: Option<&str>,
    ) -> Result<Project, ServerError> {
        let project = self.find_project(project_id).await?;
        let caller = authorize(&project, caller)?;
        validate_segment("projectName", &project.project_name)?;

        let workspace = self.project_workspace(&project);
        let _guard = self.locks.acquire(&workspace).await;
        let container_id = self.resolve().await?;

        let removal = self
            .exec_in(
                &container_id,
                &self.settings.workspace_root,
                &[repository::remove_directory(&project.project_name)],
                &[],
            )
            .await;
        match removal {
            Ok(output) if output.success() => {
                info!("Removed {} from container {}", workspace, container_id)
            }
            Ok(output) => warn!(
                "Failed to remove {} from container (exit code {:?}): {}",
                workspace,
                output.exit_code,
                output.stderr.trim()
            ),
            Err(e) => warn!("Failed to remove {} from container: {}", workspace, e),
        }

        let filter = DeploymentFilter {
            project_id: Some(project.project_id.clone()),
            space_id: None,
        };
        for deployment in self.deployments.list_deployments(&filter).await? {
            self.deployments
                .delete_deployment(&deployment.deployment_id)
                .await?;
        }
        self.projects.delete_project(&project.project_id).await?;

        info!("Project {} deleted by {}", project.project_id, caller);
        Ok(project)
    }

    /// Status of every space of a project from its most recent deployment
    pub async fn space_statuses(&self, project_id: &str) -> Result<Vec<SpaceStatus>, ServerError> {
        let project = self.find_project(project_id).await?;

        let mut statuses = Vec::with_capacity(project.spaces.len());
        for space in &project.spaces {
            let filter = DeploymentFilter {
                project_id: Some(project.project_id.clone()),
                space_id: Some(space.space_name.clone()),
            };
            let latest = self.deployments.list_deployments(&filter).await?.into_iter().next();

            statuses.push(SpaceStatus {
                space_id: space.space_id.clone(),
                space_name: space.space_name.clone(),
                status: if latest.is_some() {
                    "deployed"
                } else {
                    "not yet deployed"
                }
                .to_string(),
                last_run: latest.as_ref().map(|d| d.finished_at.unwrap_or(d.started_at)),
                deployment_id: latest.as_ref().map(|d| d.deployment_id.clone()),
                state: latest.as_ref().map(|d| d.state.to_string()),
            });
        }
        Ok(statuses)
    }

    async fn run_step(
        &self,
        project_id: &str,
        request: StepRequest,
        kind: StepKind,
        command: CommandLine,
    ) -> Result<StepOutcome, ServerError> {
        let creates = kind == StepKind::Init;
        let target = self.prepare(project_id, &request, !creates).await?;

        let _guard = self.locks.acquire(&target.workspace).await;
        let container_id = self.resolve().await?;
        let output = self
            .run(&container_id, &target, std::slice::from_ref(&command))
            .await?;

        let deployment_id = match &target.deployment {
            Some(deployment) => deployment.deployment_id.clone(),
            None => self.create_deployment(&target).await?.deployment_id,
        };
        let step = DeploymentStep::new(kind, output.step_status(), output.combined.clone());
        let deployment = self.deployments.upsert_step(&deployment_id, step).await?;
        log_step(&deployment, kind, &output);

        Ok(StepOutcome {
            command: command.to_string(),
            summary: parse_summary(&output.stdout),
            output,
            deployment,
        })
    }

    /// Validate in order: space name, deployment id, project, deployment
    async fn prepare(
        &self,
        project_id: &str,
        request: &StepRequest,
        require_deployment: bool,
    ) -> Result<Target, ServerError> {
        let space_name = request.space_name.clone().unwrap_or_default();
        validate_segment("spaceName", &space_name)?;

        let deployment_id = request
            .deployment_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty());
        if require_deployment && deployment_id.is_none() {
            return Err(ServerError::MissingParameter("deploymentId".to_string()));
        }

        let project = self.find_project(project_id).await?;
        let deployment = match deployment_id {
            Some(id) => Some(self.find_deployment(project_id, id).await?),
            None => None,
        };
        if let Some(deployment) = &deployment {
            if deployment.space_id != space_name {
                warn!(
                    "Deployment {} belongs to space {}, running in {}",
                    deployment.deployment_id, deployment.space_id, space_name
                );
            }
        }

        let workspace = format!("{}/{}", self.project_workspace(&project), space_name);
        Ok(Target {
            project,
            space_name,
            workspace,
            deployment,
        })
    }

    /// Checkout of the project's repository inside the container
    fn project_workspace(&self, project: &Project) -> String {
        format!(
            "{}/{}",
            self.settings.workspace_root.trim_end_matches('/'),
            project.project_name
        )
    }

    async fn find_project(&self, project_id: &str) -> Result<Project, ServerError> {
        self.projects
            .find_project(project_id)
            .await?
            .ok_or_else(|| ServerError::ProjectNotFound(project_id.to_string()))
    }

    /// The deployment, provided it belongs to `project_id`
    async fn find_deployment(
        &self,
        project_id: &str,
        deployment_id: &str,
    ) -> Result<Deployment, ServerError> {
        self.deployments
            .get_deployment(deployment_id)
            .await?
            .filter(|d| d.project_id == project_id)
            .ok_or_else(|| ServerError::DeploymentNotFound(deployment_id.to_string()))
    }

    async fn create_deployment(&self, target: &Target) -> Result<Deployment, ServerError> {
        let identity = identifiers::generate(
            &self.settings.deployment_prefix,
            &target.project.project_name,
            &target.space_name,
        );
        let deployment = Deployment::new(
            identity.deployment_id,
            identity.deployment_name,
            target.project.project_id.clone(),
            target.space_name.clone(),
        );

        match self.deployments.create_deployment(deployment.clone()).await {
            Err(ServerError::Conflict(_)) => {
                let mut retry = deployment;
                retry.deployment_name = format!("{}-{}", retry.deployment_name, short_uid());
                warn!(
                    "Deployment name taken, retrying as {}",
                    retry.deployment_name
                );
                self.deployments.create_deployment(retry).await
            }
            result => {
                if let Ok(created) = &result {
                    info!(
                        "Created deployment {} ({})",
                        created.deployment_id, created.deployment_name
                    );
                }
                result
            }
        }
    }

    async fn resolve(&self) -> Result<String, ServerError> {
        self.resolver
            .resolve()
            .await
            .inspect_err(|e| error!("Container resolution failed: {}", e))
    }

    async fn run(
        &self,
        container_id: &str,
        target: &Target,
        commands: &[CommandLine],
    ) -> Result<CommandOutput, ServerError> {
        let env = self.env(&target.project);
        self.exec_in(container_id, &target.workspace, commands, &env)
            .await
    }

    async fn exec_in(
        &self,
        container_id: &str,
        workspace: &str,
        commands: &[CommandLine],
        env: &[(String, String)],
    ) -> Result<CommandOutput, ServerError> {
        self.runner
            .run(container_id, workspace, commands, env)
            .await
            .inspect_err(|e| error!("Command transport failed in {}: {}", workspace, e))
    }

    /// Environment overrides for every Terraform invocation of `project`
    fn env(&self, project: &Project) -> Vec<(String, String)> {
        let mut env = vec![
            ("TF_IN_AUTOMATION".to_string(), "true".to_string()),
            ("FORCE_COLOR".to_string(), "0".to_string()),
        ];
        env.extend(
            self.settings
                .env
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        if let Some(profile) = project.profile.as_deref().filter(|p| !p.is_empty()) {
            env.push(("AWS_PROFILE".to_string(), profile.to_string()));
        }
        env
    }
}

/// The caller, provided they own `project`
fn authorize<'a>(project: &Project, caller: Option<&'a str>) -> Result<&'a str, ServerError> {
    let caller = caller
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ServerError::MissingParameter("x-user-id".to_string()))?;
    if project.owner_id.as_deref() != Some(caller) {
        return Err(ServerError::Forbidden(format!(
            "user {} does not own project {}",
            caller, project.project_id
        )));
    }
    Ok(caller)
}

/// Turn a non-zero exit of a maintenance command into an error
fn ensure_success(what: &str, output: &CommandOutput) -> Result<(), ServerError> {
    if output.success() {
        return Ok(());
    }
    let detail = output.stderr.trim();
    Err(ServerError::CommandFailed(if detail.is_empty() {
        format!("{} exited with {:?}", what, output.exit_code)
    } else {
        format!("{}: {}", what, detail)
    }))
}

fn existing_id(target: &Target) -> Result<String, ServerError> {
    target
        .deployment
        .as_ref()
        .map(|d| d.deployment_id.clone())
        .ok_or_else(|| ServerError::MissingParameter("deploymentId".to_string()))
}

/// Parse the `show -json` run; any failure leaves the data unset
fn structured_plan(deployment_id: &str, run: &CommandOutput) -> Option<Value> {
    if !run.success() {
        warn!(
            "JSON plan for {} exited with {:?}, no structured data",
            deployment_id, run.exit_code
        );
        return None;
    }

    match serde_json::from_str(&run.stdout) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Failed to parse JSON plan for {}: {}", deployment_id, e);
            None
        }
    }
}

fn log_step(deployment: &Deployment, kind: StepKind, output: &CommandOutput) {
    info!(
        "Deployment {} {} {} (exit code {:?}, state {})",
        deployment.deployment_id,
        kind,
        output.step_status(),
        output.exit_code,
        deployment.state
    );
}
