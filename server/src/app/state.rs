//! Application state management

use std::sync::Arc;

use tracing::{info, warn};

use crate::app::options::AppOptions;
use crate::deploy::docker::{ContainerRuntime, DockerCli};
use crate::deploy::resolver::ContainerResolver;
use crate::deploy::runner::CommandRunner;
use crate::deploy::Orchestrator;
use crate::errors::ServerError;
use crate::store::{
    DeploymentStore, FileDeploymentStore, FileProjectStore, MemoryDeploymentStore,
    MemoryProjectStore, ProjectStore,
};

/// Main application state
pub struct AppState {
    /// Project documents
    pub projects: Arc<dyn ProjectStore>,

    /// Deployment documents
    pub deployments: Arc<dyn DeploymentStore>,

    /// Terraform lifecycle orchestrator
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    /// Initialize application state with the docker CLI runtime
    pub async fn init(options: &AppOptions) -> Result<Self, ServerError> {
        let runtime = Arc::new(DockerCli::new(
            options.terraform.docker_binary.clone(),
            options.terraform.shell.clone(),
        ));
        Self::with_runtime(options, runtime).await
    }

    /// Initialize application state on top of `runtime`
    pub async fn with_runtime(
        options: &AppOptions,
        runtime: Arc<dyn ContainerRuntime>,
    ) -> Result<Self, ServerError> {
        info!("Initializing application state...");

        let (projects, deployments): (Arc<dyn ProjectStore>, Arc<dyn DeploymentStore>) =
            if options.storage.in_memory {
                info!("Using in-memory document stores");
                (
                    Arc::new(MemoryProjectStore::new()),
                    Arc::new(MemoryDeploymentStore::new()),
                )
            } else {
                let layout = &options.storage.layout;
                layout.setup().await?;
                info!("Using document stores under {}", layout.base_dir.display());
                (
                    Arc::new(FileProjectStore::new(layout.projects_dir())),
                    Arc::new(FileDeploymentStore::new(layout.deployments_dir())),
                )
            };

        let resolver = ContainerResolver::new(
            runtime.clone(),
            options.terraform.container_id.clone(),
            options.terraform.image_name.clone(),
        );
        if options.terraform.container_id.is_none() && options.terraform.image_name.is_none() {
            warn!("Neither CONTAINERID nor DOCKER_IMAGE_NAME is set, Terraform calls will fail");
        }

        let orchestrator = Arc::new(Orchestrator::new(
            projects.clone(),
            deployments.clone(),
            resolver,
            CommandRunner::new(runtime),
            options.terraform.clone(),
        ));

        Ok(Self {
            projects,
            deployments,
            orchestrator,
        })
    }

    /// Shutdown application state
    pub async fn shutdown(&self) -> Result<(), ServerError> {
        info!("Shutting down application state...");
        Ok(())
    }
}
