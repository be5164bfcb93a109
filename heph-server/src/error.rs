use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use heph_core::manager::DeployError;
use heph_core::translate::TranslateError;

use crate::storage::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error("diagram not found")]
    NotFound,

    #[error("{0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<DeployError> for ApiError {
    fn from(err: DeployError) -> Self {
        match err {
            DeployError::AlreadyDeploying => {
                ApiError::Conflict("deployment already in progress".to_string())
            }
            DeployError::NotDeployed => ApiError::Conflict("no active deployment".to_string()),
            DeployError::Translate(inner) => match inner {
                TranslateError::UnsupportedServiceType { .. }
                | TranslateError::Cycle(_)
                | TranslateError::Config { .. } => ApiError::BadRequest(inner.to_string()),
                TranslateError::Ports { .. } | TranslateError::OpenApi { .. } => {
                    ApiError::Internal(inner.to_string())
                }
            },
            DeployError::Runtime(inner) => ApiError::Internal(inner.to_string()),
            DeployError::Teardown(inner) => ApiError::Internal(inner.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidId => ApiError::BadRequest("invalid diagram ID".to_string()),
            StoreError::NotFound { .. } => ApiError::NotFound,
            StoreError::Io(_) | StoreError::Encoding(_) => ApiError::Internal(err.to_string()),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use heph_core::ports::PortsExhausted;
    use heph_core::resolver::CyclicDependency;

    #[test]
    fn test_state_errors_map_to_conflict() {
        assert_eq!(
            ApiError::from(DeployError::AlreadyDeploying).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(DeployError::NotDeployed).status(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_graph_errors_map_to_bad_request() {
        let err = DeployError::Translate(TranslateError::Cycle(CyclicDependency {
            processed: 0,
            total: 2,
        }));
        assert_eq!(ApiError::from(err).status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_capacity_errors_map_to_internal() {
        let err = DeployError::Translate(TranslateError::Ports {
            node: "db".to_string(),
            source: PortsExhausted,
        });
        assert_eq!(
            ApiError::from(err).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_store_errors_map_per_kind() {
        assert_eq!(
            ApiError::from(StoreError::InvalidId).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(StoreError::NotFound {
                id: "x".to_string()
            })
            .status(),
            StatusCode::NOT_FOUND
        );
    }
}
