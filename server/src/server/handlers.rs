//! HTTP request handlers
//!
//! Handlers only translate between the wire models and the orchestrator.
//! Errors are rendered by `ServerError`'s `IntoResponse`.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use openapi_server::models::{
    CancelPlanRequest, CreateProjectRequest, DeploymentActionResponse, DeploymentListQuery,
    DeploymentListResponse, HealthResponse, ProjectDeleteResponse, ProjectListResponse,
    SpacesResponse, TerraformRequest, VersionResponse,
};

use crate::deploy::orchestrator::PLAN_CANCELLED_MESSAGE;
use crate::deploy::StepRequest;
use crate::errors::ServerError;
use crate::models::project::Project;
use crate::server::extract::JsonBody;
use crate::server::state::ServerState;
use crate::store::DeploymentFilter;
use crate::utils::version_info;

/// Caller identity header for owner-authorized operations
pub const USER_ID_HEADER: &str = "x-user-id";

fn caller(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
}

fn step_request(body: TerraformRequest) -> StepRequest {
    StepRequest {
        space_name: body.space_name,
        deployment_id: body.deployment_id,
    }
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "spacectl".to_string(),
        version: version.version,
    })
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    let version = version_info();
    Json(VersionResponse {
        version: version.version,
        git_hash: version.git_hash,
        build_time: version.build_time,
    })
}

// ── Terraform lifecycle ──────────────────────────────────────────

pub async fn init_handler(
    State(state): State<Arc<ServerState>>,
    Path(project_id): Path<String>,
    JsonBody(body): JsonBody<TerraformRequest>,
) -> Result<impl IntoResponse, ServerError> {
    let outcome = state
        .orchestrator
        .init(&project_id, step_request(body))
        .await?;
    Ok(Json(outcome.to_response()))
}

pub async fn plan_handler(
    State(state): State<Arc<ServerState>>,
    Path(project_id): Path<String>,
    JsonBody(body): JsonBody<TerraformRequest>,
) -> Result<impl IntoResponse, ServerError> {
    let outcome = state
        .orchestrator
        .plan(&project_id, step_request(body))
        .await?;
    Ok(Json(outcome.to_response()))
}

pub async fn apply_handler(
    State(state): State<Arc<ServerState>>,
    Path(project_id): Path<String>,
    JsonBody(body): JsonBody<TerraformRequest>,
) -> Result<impl IntoResponse, ServerError> {
    let outcome = state
        .orchestrator
        .apply(&project_id, step_request(body))
        .await?;
    Ok(Json(outcome.to_response()))
}

pub async fn destroy_handler(
    State(state): State<Arc<ServerState>>,
    Path(project_id): Path<String>,
    JsonBody(body): JsonBody<TerraformRequest>,
) -> Result<impl IntoResponse, ServerError> {
    let outcome = state
        .orchestrator
        .destroy(&project_id, step_request(body))
        .await?;
    Ok(Json(outcome.to_response()))
}

pub async fn cancel_plan_handler(
    State(state): State<Arc<ServerState>>,
    Path(project_id): Path<String>,
    JsonBody(body): JsonBody<CancelPlanRequest>,
) -> Result<impl IntoResponse, ServerError> {
    let deployment = state
        .orchestrator
        .cancel_plan(&project_id, body.deployment_id.as_deref())
        .await?;
    Ok(Json(DeploymentActionResponse {
        success: true,
        message: PLAN_CANCELLED_MESSAGE.to_string(),
        deployment_id: deployment.deployment_id,
    }))
}

pub async fn summary_handler(
    State(state): State<Arc<ServerState>>,
    Path(deployment_id): Path<String>,
) -> Result<impl IntoResponse, ServerError> {
    let summary = state.orchestrator.summary(&deployment_id).await?;
    Ok(Json(summary))
}

// ── Deployments ──────────────────────────────────────────────────

pub async fn list_deployments_handler(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<DeploymentListQuery>,
) -> Result<impl IntoResponse, ServerError> {
    let filter = DeploymentFilter {
        project_id: query.project_id.filter(|id| !id.is_empty()),
        space_id: query.space_id.filter(|id| !id.is_empty()),
    };
    let deployments: Vec<_> = state
        .orchestrator
        .list_deployments(&filter)
        .await?
        .iter()
        .map(|d| d.to_info())
        .collect();

    let total = deployments.len();
    Ok(Json(DeploymentListResponse { deployments, total }))
}

pub async fn delete_deployment_handler(
    State(state): State<Arc<ServerState>>,
    Path((project_id, deployment_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ServerError> {
    state
        .orchestrator
        .delete_deployment(&project_id, &deployment_id, caller(&headers))
        .await?;

    Ok(Json(DeploymentActionResponse {
        success: true,
        message: "Deployment deleted".to_string(),
        deployment_id,
    }))
}

// ── Projects ─────────────────────────────────────────────────────

pub async fn create_project_handler(
    State(state): State<Arc<ServerState>>,
    JsonBody(body): JsonBody<CreateProjectRequest>,
) -> Result<impl IntoResponse, ServerError> {
    let project = Project::from_request(body)?;
    let project = state.projects.save_project(project).await?;
    Ok((StatusCode::CREATED, Json(project.to_response())))
}

pub async fn list_projects_handler(
    State(state): State<Arc<ServerState>>,
) -> Result<impl IntoResponse, ServerError> {
    let projects: Vec<_> = state
        .projects
        .list_projects()
        .await?
        .iter()
        .map(Project::to_response)
        .collect();

    let total = projects.len();
    Ok(Json(ProjectListResponse { projects, total }))
}

pub async fn get_project_handler(
    State(state): State<Arc<ServerState>>,
    Path(project_id): Path<String>,
) -> Result<impl IntoResponse, ServerError> {
    let project = state
        .projects
        .find_project(&project_id)
        .await?
        .ok_or_else(|| ServerError::ProjectNotFound(project_id.clone()))?;
    Ok(Json(project.to_response()))
}

pub async fn spaces_handler(
    State(state): State<Arc<ServerState>>,
    Path(project_id): Path<String>,
) -> Result<impl IntoResponse, ServerError> {
    let spaces = state.orchestrator.space_statuses(&project_id).await?;
    Ok(Json(SpacesResponse {
        success: true,
        spaces,
    }))
}

pub async fn delete_project_handler(
    State(state): State<Arc<ServerState>>,
    Path(project_id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ServerError> {
    let project = state
        .orchestrator
        .delete_project(&project_id, caller(&headers))
        .await?;

    Ok(Json(ProjectDeleteResponse {
        success: true,
        message: format!(
            "Project '{}' and all related data deleted",
            project.project_name
        ),
        project_id: project.project_id,
    }))
}

pub async fn reset_branch_handler(
    State(state): State<Arc<ServerState>>,
    Path(project_id): Path<String>,
) -> Result<impl IntoResponse, ServerError> {
    let reset = state.orchestrator.reset_branch(&project_id).await?;
    Ok(Json(reset.to_response()))
}
