//! Project models
//!
//! Projects are owned by the surrounding CRUD layer; the deployment engine
//! only reads the name, the credential profile and the space list.

use chrono::{DateTime, Utc};
use openapi_server::models::{CreateProjectRequest, ProjectResponse, SpaceInfo};
use serde::{Deserialize, Serialize};

use crate::errors::ServerError;
use crate::utils::generate_uuid;

/// Cloud service provider tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloudProvider {
    Aws,
    Gcp,
    Azure,
}

impl CloudProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloudProvider::Aws => "aws",
            CloudProvider::Gcp => "gcp",
            CloudProvider::Azure => "azure",
        }
    }
}

impl std::str::FromStr for CloudProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "aws" => Ok(CloudProvider::Aws),
            "gcp" => Ok(CloudProvider::Gcp),
            "azure" => Ok(CloudProvider::Azure),
            _ => Err(format!("Unsupported cloud provider: {}", s)),
        }
    }
}

/// A subdirectory of the project's repository holding one Terraform root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Space {
    pub space_id: String,
    pub space_name: String,
}

/// A cloud project connected to a Git repository
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub project_id: String,
    pub project_name: String,
    #[serde(default)]
    pub project_description: Option<String>,
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub repo_url: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub csp: Option<CloudProvider>,

    /// Name of the credential profile configured inside the container
    #[serde(default)]
    pub profile: Option<String>,
    #[serde(default)]
    pub spaces: Vec<Space>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn new(project_id: impl Into<String>, project_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            project_id: project_id.into(),
            project_name: project_name.into(),
            project_description: None,
            owner_id: None,
            repo_url: None,
            branch: None,
            csp: None,
            profile: None,
            spaces: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Build a new project from a registration request
    pub fn from_request(request: CreateProjectRequest) -> Result<Self, ServerError> {
        let project_name = request.project_name.unwrap_or_default();
        validate_segment("projectName", &project_name)?;

        let csp = request
            .csp
            .filter(|c| !c.is_empty())
            .map(|c| c.parse::<CloudProvider>())
            .transpose()
            .map_err(ServerError::InvalidParameter)?;

        let mut spaces: Vec<Space> = Vec::with_capacity(request.spaces.len());
        for space_name in request.spaces {
            validate_segment("spaceName", &space_name)?;
            if spaces.iter().any(|s| s.space_name == space_name) {
                continue;
            }
            spaces.push(Space {
                space_id: generate_uuid(),
                space_name,
            });
        }

        let mut project = Project::new(generate_uuid(), project_name);
        project.project_description = request.project_description;
        project.owner_id = request.owner_id;
        project.repo_url = request.repo_url;
        project.branch = request.branch;
        project.csp = csp;
        project.profile = request.profile.filter(|p| !p.is_empty());
        project.spaces = spaces;
        Ok(project)
    }

    /// Match the space list against the folders found at the repository
    /// root: spaces whose folder is gone are dropped, new folders become
    /// spaces, and surviving spaces keep their ids
    pub fn sync_spaces(&mut self, folders: &[String]) -> SpaceChanges {
        let (kept, removed): (Vec<Space>, Vec<Space>) = std::mem::take(&mut self.spaces)
            .into_iter()
            .partition(|s| folders.contains(&s.space_name));

        let added: Vec<String> = folders
            .iter()
            .filter(|f| !kept.iter().any(|s| &s.space_name == *f))
            .filter(|f| validate_segment("spaceName", f).is_ok())
            .cloned()
            .collect();

        self.spaces = kept;
        self.spaces.extend(added.iter().map(|name| Space {
            space_id: generate_uuid(),
            space_name: name.clone(),
        }));

        let changes = SpaceChanges {
            added,
            removed: removed.into_iter().map(|s| s.space_name).collect(),
        };
        if !changes.is_empty() {
            self.updated_at = Utc::now();
        }
        changes
    }

    pub fn to_response(&self) -> ProjectResponse {
        ProjectResponse {
            project_id: self.project_id.clone(),
            project_name: self.project_name.clone(),
            project_description: self.project_description.clone(),
            owner_id: self.owner_id.clone(),
            repo_url: self.repo_url.clone(),
            branch: self.branch.clone(),
            csp: self.csp.map(|c| c.as_str().to_string()),
            profile: self.profile.clone(),
            spaces: self
                .spaces
                .iter()
                .map(|s| SpaceInfo {
                    space_id: s.space_id.clone(),
                    space_name: s.space_name.clone(),
                })
                .collect(),
            created_at: self.created_at,
        }
    }
}

/// Space names added and removed by a sync
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpaceChanges {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl SpaceChanges {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Reject values that cannot be used as a single workspace path segment
pub fn validate_segment(field: &str, value: &str) -> Result<(), ServerError> {
    if value.trim().is_empty() {
        return Err(ServerError::MissingParameter(field.to_string()));
    }
    if value.contains(['/', '\\', '\0']) || value == "." || value == ".." {
        return Err(ServerError::InvalidParameter(format!(
            "{} must be a single path segment: {}",
            field, value
        )));
    }
    Ok(())
}
