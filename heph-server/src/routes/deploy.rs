//! Deploy verbs: create, incrementally update, tear down, and inspect the
//! running topology.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use heph_core::diff::compute_diff;
use heph_core::model::Diagram;
use heph_core::status::StatusResponse;
use heph_core::validate::validate_diagram;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Serialize)]
pub struct DeployResponse {
    pub status: &'static str,
}

fn parse_diagram(body: &str) -> ApiResult<Diagram> {
    let diagram: Diagram = serde_json::from_str(body)
        .map_err(|e| ApiError::BadRequest(format!("invalid JSON: {e}")))?;
    validate_diagram(&diagram).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    Ok(diagram)
}

/// POST /api/deploy
pub async fn deploy(
    State(state): State<AppState>,
    body: String,
) -> ApiResult<(StatusCode, Json<DeployResponse>)> {
    let diagram = parse_diagram(&body)?;

    // Detached task: a client disconnect must not strand the state
    // machine mid-transition.
    let manager = state.manager.clone();
    tokio::spawn(async move { manager.deploy(&diagram).await })
        .await
        .map_err(|e| ApiError::Internal(format!("deploy task: {e}")))??;

    Ok((StatusCode::ACCEPTED, Json(DeployResponse { status: "deploying" })))
}

/// PUT /api/deploy: reconcile the running topology toward a new diagram.
pub async fn update(
    State(state): State<AppState>,
    body: String,
) -> ApiResult<Json<StatusResponse>> {
    let diagram = parse_diagram(&body)?;

    let last = state
        .manager
        .last_diagram()
        .ok_or_else(|| ApiError::Conflict("no active deployment".to_string()))?;

    let diff = compute_diff(&last.nodes, &diagram.nodes);

    let manager = state.manager.clone();
    let edges = diagram.edges.clone();
    tokio::spawn(async move { manager.apply_diff(&diff.added, &diff.removed, &edges).await })
        .await
        .map_err(|e| ApiError::Internal(format!("update task: {e}")))??;

    state.manager.update_last_diagram(diagram);

    let (deploy_status, node_statuses) = state.manager.get_status().await;
    Ok(Json(StatusResponse {
        deploy_status,
        node_statuses,
    }))
}

/// DELETE /api/deploy
pub async fn teardown(State(state): State<AppState>) -> ApiResult<Json<DeployResponse>> {
    let manager = state.manager.clone();
    tokio::spawn(async move { manager.teardown().await })
        .await
        .map_err(|e| ApiError::Internal(format!("teardown task: {e}")))??;

    Ok(Json(DeployResponse { status: "idle" }))
}

/// GET /api/deploy/status
pub async fn status(State(state): State<AppState>) -> ApiResult<Json<StatusResponse>> {
    let (deploy_status, node_statuses) = state.manager.get_status().await;
    Ok(Json(StatusResponse {
        deploy_status,
        node_statuses,
    }))
}
