//! Deployment API models
//!
//! Field names follow the camelCase JSON the web client already speaks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Version response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionResponse {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Error body returned with every non-2xx status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ── Terraform lifecycle ──────────────────────────────────────────

/// Body of the init/plan/apply/destroy endpoints.
///
/// Both fields are optional on the wire so that a missing value surfaces as a
/// 400 with a readable message instead of a deserialization rejection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TerraformRequest {
    pub space_name: Option<String>,
    pub deployment_id: Option<String>,
}

/// Body of the plan cancel endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CancelPlanRequest {
    pub deployment_id: Option<String>,
}

/// Counts scraped from the human-readable Terraform output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged, rename_all_fields = "camelCase")]
pub enum TerraformSummary {
    Plan {
        to_add: u64,
        to_change: u64,
        to_destroy: u64,
    },
    Apply {
        added: u64,
        changed: u64,
        destroyed: u64,
    },
    Destroy {
        destroyed: u64,
    },
}

/// One recorded step of a deployment
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRecord {
    pub step: String,
    pub step_status: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structured_data: Option<Value>,
}

/// Response of init/apply/destroy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResponse {
    pub command: String,
    pub deployment_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment_name: Option<String>,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub combined: String,
    pub summary: Option<TerraformSummary>,
    pub step_status: String,
    pub state: String,
    pub steps: Vec<StepRecord>,
}

/// Response of plan
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanResponse {
    pub step_name: String,
    pub deployment_id: String,
    pub raw_format: String,
    pub data: Option<Value>,
    pub exit_code: Option<i32>,
    pub stderr: String,
    pub summary: Option<TerraformSummary>,
    pub step_status: String,
}

/// Response of plan cancel and deployment delete
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentActionResponse {
    pub success: bool,
    pub message: String,
    pub deployment_id: String,
}

// ── Read side ────────────────────────────────────────────────────

/// A resource touched by a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRef {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub name: String,
    pub address: String,
}

/// Resources bucketed by planned action
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSummary {
    pub resources_provisioned: Vec<ResourceRef>,
    pub resources_changed: Vec<ResourceRef>,
    pub resources_destroyed: Vec<ResourceRef>,
}

/// Deployment summary response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentSummaryResponse {
    pub deployment_id: String,
    pub deployment_name: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub state: String,
    pub summary: ResourceSummary,
    pub steps: Vec<StepRecord>,
}

/// Deployment list entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentInfo {
    pub deployment_id: String,
    pub deployment_name: String,
    pub project_id: String,
    pub space_id: String,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub steps: Vec<StepRecord>,
}

/// Deployment list response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentListResponse {
    pub deployments: Vec<DeploymentInfo>,
    pub total: usize,
}

/// Query parameters of the deployment list
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeploymentListQuery {
    pub project_id: Option<String>,
    pub space_id: Option<String>,
}

// ── Projects ─────────────────────────────────────────────────────

/// Project registration request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateProjectRequest {
    pub project_name: Option<String>,
    pub project_description: Option<String>,
    pub owner_id: Option<String>,
    pub repo_url: Option<String>,
    pub branch: Option<String>,
    pub csp: Option<String>,
    pub profile: Option<String>,
    pub spaces: Vec<String>,
}

/// Space of a project
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpaceInfo {
    pub space_id: String,
    pub space_name: String,
}

/// Project response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectResponse {
    pub project_id: String,
    pub project_name: String,
    pub project_description: Option<String>,
    pub owner_id: Option<String>,
    pub repo_url: Option<String>,
    pub branch: Option<String>,
    pub csp: Option<String>,
    pub profile: Option<String>,
    pub spaces: Vec<SpaceInfo>,
    pub created_at: DateTime<Utc>,
}

/// Project list response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectListResponse {
    pub projects: Vec<ProjectResponse>,
    pub total: usize,
}

/// Response of the branch reset
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpaceSyncResponse {
    pub success: bool,
    pub message: String,
    pub spaces: Vec<SpaceInfo>,
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

/// Response of the project delete
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDeleteResponse {
    pub success: bool,
    pub message: String,
    pub project_id: String,
}

/// Deployment status of one space
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpaceStatus {
    pub space_id: String,
    pub space_name: String,
    pub status: String,
    pub last_run: Option<DateTime<Utc>>,
    pub deployment_id: Option<String>,
    pub state: Option<String>,
}

/// Space status list response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpacesResponse {
    pub success: bool,
    pub spaces: Vec<SpaceStatus>,
}
