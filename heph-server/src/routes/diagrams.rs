//! CRUD over stored diagrams.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use heph_core::model::Diagram;
use heph_core::validate::validate_diagram;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Serialize)]
pub struct CreatedResponse {
    pub id: String,
}

fn parse_body(body: &str) -> ApiResult<Diagram> {
    let diagram: Diagram = serde_json::from_str(body)
        .map_err(|e| ApiError::BadRequest(format!("invalid JSON: {e}")))?;
    validate_diagram(&diagram).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    Ok(diagram)
}

/// POST /api/diagrams
pub async fn create(
    State(state): State<AppState>,
    body: String,
) -> ApiResult<(StatusCode, Json<CreatedResponse>)> {
    let diagram = parse_body(&body)?;
    let created = state.store.create(&diagram)?;
    Ok((StatusCode::CREATED, Json(CreatedResponse { id: created.id })))
}

/// GET /api/diagrams
pub async fn list(State(state): State<AppState>) -> ApiResult<Json<Vec<Diagram>>> {
    Ok(Json(state.store.list()?))
}

/// GET /api/diagrams/:id
pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Diagram>> {
    Ok(Json(state.store.get(&id)?))
}

/// PUT /api/diagrams/:id
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: String,
) -> ApiResult<Json<Diagram>> {
    let diagram = parse_body(&body)?;
    Ok(Json(state.store.update(&id, &diagram)?))
}

/// DELETE /api/diagrams/:id
pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.store.delete(&id)?;
    Ok(StatusCode::NO_CONTENT)
}
