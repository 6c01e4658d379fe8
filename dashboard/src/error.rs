use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use beaglegaze::{DashboardError, ErrorKind};
use serde_json::json;
use thiserror::Error;

use crate::usage::UsageError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Dashboard(#[from] DashboardError),

    #[error(transparent)]
    Usage(#[from] UsageError),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Usage(e) => match e {
                UsageError::Invalid(_) => StatusCode::BAD_REQUEST,
                UsageError::NotFound(_) => StatusCode::NOT_FOUND,
                UsageError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Dashboard(e) => match e.kind() {
                ErrorKind::Validation => StatusCode::BAD_REQUEST,
                ErrorKind::Rejected => StatusCode::CONFLICT,
                ErrorKind::Revert => StatusCode::UNPROCESSABLE_ENTITY,
                ErrorKind::Connectivity => StatusCode::SERVICE_UNAVAILABLE,
                ErrorKind::Storage => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn kind_label(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) | ApiError::Usage(UsageError::NotFound(_)) => "not_found",
            ApiError::Usage(UsageError::Invalid(_)) => "validation",
            ApiError::Usage(UsageError::Storage(_)) => "storage",
            ApiError::Dashboard(e) => match e.kind() {
                ErrorKind::Validation => "validation",
                ErrorKind::Rejected => "rejected",
                ErrorKind::Revert => "revert",
                ErrorKind::Connectivity => "connectivity",
                ErrorKind::Storage => "storage",
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::warn!("Request failed: {}", self);
        }

        let message = match &self {
            ApiError::Dashboard(e) => e.reason(),
            ApiError::Usage(_) | ApiError::NotFound(_) => self.to_string(),
        };
        let body = Json(json!({
            "error": message,
            "kind": self.kind_label(),
        }));

        (status, body).into_response()
    }
}
