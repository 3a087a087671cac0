//! Mapping of engine errors onto HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use engine::EngineError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("{0}")]
    NotFound(String),
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "notFound"),
            Self::Engine(e) => match e {
                EngineError::StageNotFound(_)
                | EngineError::PubNotFound(_)
                | EngineError::PubTypeNotFound(_)
                | EngineError::ActionInstanceNotFound(_)
                | EngineError::RuleBindingNotFound(_) => (StatusCode::NOT_FOUND, "notFound"),

                EngineError::IllegalTransition { .. } => (StatusCode::CONFLICT, "illegalTransition"),
                EngineError::NotInStage { .. } => (StatusCode::CONFLICT, "notInStage"),
                EngineError::AlreadyInStage { .. } => (StatusCode::CONFLICT, "alreadyInStage"),
                EngineError::StageOccupied(_) => (StatusCode::CONFLICT, "stageOccupied"),
                EngineError::DuplicateBinding { .. } => (StatusCode::CONFLICT, "duplicateBinding"),
                EngineError::CascadeLimit(_) => (StatusCode::CONFLICT, "cascadeLimit"),

                EngineError::UnknownActionKind(_) => (StatusCode::BAD_REQUEST, "unknownActionKind"),
                EngineError::UnknownEventKind(_) => (StatusCode::BAD_REQUEST, "unknownEventKind"),
                EngineError::CommunityMismatch { .. } => {
                    (StatusCode::BAD_REQUEST, "communityMismatch")
                }
                EngineError::OrderKey(_) => (StatusCode::BAD_REQUEST, "invalidOrder"),

                EngineError::ConfigValidation { .. } => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "configValidation")
                }
                EngineError::ParamsValidation { .. } => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "paramsValidation")
                }
                EngineError::RuleConfigValidation { .. } => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "ruleConfigValidation")
                }
                EngineError::PubValidation(_) => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "pubValidation")
                }

                EngineError::Schema(_) | EngineError::Database(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "internal")
                }
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        let body = json!({ "error": self.to_string(), "code": code });
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
