//! Container resolution
//!
//! Several API replicas must agree on one execution host, so the target is
//! found by image name on every request instead of being stored centrally.

use std::sync::Arc;

use tracing::debug;

use crate::deploy::docker::ContainerRuntime;
use crate::errors::ServerError;

/// Maps the configured execution target to a running container id
#[derive(Clone)]
pub struct ContainerResolver {
    runtime: Arc<dyn ContainerRuntime>,
    container_id: Option<String>,
    image_name: Option<String>,
}

impl ContainerResolver {
    /// A fixed `container_id` wins over `image_name` lookup
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        container_id: Option<String>,
        image_name: Option<String>,
    ) -> Self {
        Self {
            runtime,
            container_id,
            image_name,
        }
    }

    /// Resolve the configured target
    pub async fn resolve(&self) -> Result<String, ServerError> {
        if let Some(id) = &self.container_id {
            return Ok(id.clone());
        }

        let image = self.image_name.as_deref().ok_or_else(|| {
            ServerError::ConfigError("DOCKER_IMAGE_NAME environment variable is not set".into())
        })?;
        self.resolve_image(image).await
    }

    /// First running container of `image`
    pub async fn resolve_image(&self, image: &str) -> Result<String, ServerError> {
        let ids = self.runtime.list_running_containers(image).await?;
        let id = ids
            .into_iter()
            .next()
            .ok_or_else(|| ServerError::NoContainerFound(format!("no running container for image {}", image)))?;
        debug!("Resolved image {} to container {}", image, id);
        Ok(id)
    }
}
