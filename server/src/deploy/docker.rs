//! Docker container runtime
//!
//! The shared Terraform container is provisioned outside this service; we
//! only list running containers and exec into them.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::errors::ServerError;

/// Raw result of a command executed in a container
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    /// `None` when the process was killed by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Container runtime operations used by the resolver and the runner
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Ids of running containers whose image is exactly `image`
    async fn list_running_containers(&self, image: &str) -> Result<Vec<String>, ServerError>;

    /// Run `script` with the runtime's shell inside `container_id`.
    ///
    /// A non-zero exit is returned as data; only a failure to spawn or talk
    /// to the runtime is an error.
    async fn exec(
        &self,
        container_id: &str,
        env: &[(String, String)],
        script: &str,
    ) -> Result<ExecOutput, ServerError>;
}

/// `docker` CLI backed runtime
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
    shell: String,
}

impl DockerCli {
    pub fn new(binary: impl Into<String>, shell: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            shell: shell.into(),
        }
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new("docker", "bash")
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn list_running_containers(&self, image: &str) -> Result<Vec<String>, ServerError> {
        let output = Command::new(&self.binary)
            .args(["ps", "--format", "{{.ID}} {{.Image}}"])
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| ServerError::CommandTransport(format!("Failed to run docker ps: {}", e)))?;

        if !output.status.success() {
            return Err(ServerError::CommandTransport(format!(
                "docker ps failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(parse_ps_output(&String::from_utf8_lossy(&output.stdout), image))
    }

    async fn exec(
        &self,
        container_id: &str,
        env: &[(String, String)],
        script: &str,
    ) -> Result<ExecOutput, ServerError> {
        let mut command = Command::new(&self.binary);
        command.arg("exec");
        for (key, value) in env {
            command.arg("-e").arg(format!("{}={}", key, value));
        }
        command
            .arg(container_id)
            .arg(&self.shell)
            .arg("-c")
            .arg(script)
            .stdin(Stdio::null());

        debug!("docker exec {} {} -c {}", container_id, self.shell, script);
        let output = command.output().await.map_err(|e| {
            ServerError::CommandTransport(format!("Failed to run docker exec: {}", e))
        })?;

        Ok(ExecOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Pick the ids from `docker ps --format "{{.ID}} {{.Image}}"` output whose
/// image matches exactly
pub fn parse_ps_output(output: &str, image: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.trim().split_once(' '))
        .filter(|(_, line_image)| line_image.trim() == image)
        .map(|(id, _)| id.to_string())
        .collect()
}
