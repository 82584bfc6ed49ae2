//! HTTP server setup

use std::future::Future;
use std::sync::Arc;

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::app::options::ServerOptions;
use crate::errors::ServerError;
use crate::server::handlers::{
    apply_handler, cancel_plan_handler, create_project_handler, delete_deployment_handler,
    delete_project_handler, destroy_handler, get_project_handler, health_handler, init_handler,
    list_deployments_handler, list_projects_handler, plan_handler, reset_branch_handler,
    spaces_handler, summary_handler, version_handler,
};
use crate::server::state::ServerState;

/// Build the application router
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        // Health and version
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        // Terraform lifecycle
        .route("/api/projects/{projectId}/terraform/init", post(init_handler))
        .route("/api/projects/{projectId}/terraform/plan", post(plan_handler))
        .route("/api/projects/{projectId}/terraform/apply", post(apply_handler))
        .route("/api/projects/{projectId}/terraform/destroy", post(destroy_handler))
        .route(
            "/api/projects/{projectId}/terraform/plan/cancel",
            post(cancel_plan_handler),
        )
        .route("/api/terraform/{deploymentId}/summary", get(summary_handler))
        // Deployments
        .route("/api/deployments", get(list_deployments_handler))
        .route(
            "/api/projects/{projectId}/deployments/{deploymentId}",
            delete(delete_deployment_handler),
        )
        // Projects
        .route(
            "/api/projects",
            post(create_project_handler).get(list_projects_handler),
        )
        .route(
            "/api/projects/{projectId}",
            get(get_project_handler).delete(delete_project_handler),
        )
        .route("/api/projects/{projectId}/spaces", get(spaces_handler))
        .route(
            "/api/projects/{projectId}/reset-branch",
            put(reset_branch_handler),
        )
        // State and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Start the HTTP server
pub async fn serve(
    options: &ServerOptions,
    state: Arc<ServerState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<Result<(), ServerError>>, ServerError> {
    let app = router(state);

    let addr = format!("{}:{}", options.host, options.port);
    info!("Starting HTTP server on {}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| ServerError::ServerError(e.to_string()))?;

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| ServerError::ServerError(e.to_string()))
    });

    Ok(handle)
}
