//! Command runner
//!
//! Executes a chain of commands inside a container workspace. Knows nothing
//! about Terraform.

use std::sync::Arc;

use tracing::debug;

use crate::deploy::command::{compose_script, CommandLine};
use crate::deploy::docker::{ContainerRuntime, ExecOutput};
use crate::errors::ServerError;
use crate::models::deployment::StepStatus;

/// Captured output of one runner invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,

    /// stdout followed by stderr; the interleaving between the two streams is
    /// not preserved
    pub combined: String,
}

impl CommandOutput {
    pub fn from_exec(exec: ExecOutput) -> Self {
        let combined = format!("{}{}", exec.stdout, exec.stderr);
        Self {
            exit_code: exec.exit_code,
            stdout: exec.stdout,
            stderr: exec.stderr,
            combined,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn step_status(&self) -> StepStatus {
        StepStatus::from_exit_code(self.exit_code)
    }
}

/// Runs command chains in a container
#[derive(Clone)]
pub struct CommandRunner {
    runtime: Arc<dyn ContainerRuntime>,
}

impl CommandRunner {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self { runtime }
    }

    /// Run `commands` joined with `&&` after `cd`-ing into `workspace`.
    ///
    /// No timeout is applied: apply and destroy may run for a long time.
    pub async fn run(
        &self,
        container_id: &str,
        workspace: &str,
        commands: &[CommandLine],
        env: &[(String, String)],
    ) -> Result<CommandOutput, ServerError> {
        let script = compose_script(workspace, commands)?;
        debug!("Running in {} ({}): {}", container_id, workspace, script);

        let exec = self.runtime.exec(container_id, env, &script).await?;
        let output = CommandOutput::from_exec(exec);
        debug!("Command chain exited with {:?}", output.exit_code);
        Ok(output)
    }
}
