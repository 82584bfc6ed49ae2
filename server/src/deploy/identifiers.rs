//! Deployment id and name generation

use chrono::{DateTime, Local, Utc};

use crate::utils::short_uid;

/// Generated identity of a new deployment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentIdentity {
    pub deployment_id: String,
    pub deployment_name: String,
}

/// Generate an id and a name for a new deployment of `project`/`space`
pub fn generate(prefix: &str, project: &str, space: &str) -> DeploymentIdentity {
    generate_at(prefix, project, space, Local::now(), &short_uid())
}

/// `<prefix>-<YYYYMMDD>-<project>-<space>-<suffix>` and
/// `<project> <space> Deployment-<M/D/YYYY>-<HHMMSS>`
pub fn generate_at(
    prefix: &str,
    project: &str,
    space: &str,
    now: DateTime<Local>,
    suffix: &str,
) -> DeploymentIdentity {
    let date = now.with_timezone(&Utc).format("%Y%m%d");
    DeploymentIdentity {
        deployment_id: format!("{}-{}-{}-{}-{}", prefix, date, project, space, suffix),
        deployment_name: format!(
            "{} {} Deployment-{}-{}",
            project,
            space,
            now.format("%-m/%-d/%Y"),
            now.format("%H%M%S")
        ),
    }
}
