use crate::core::DaemonError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Error surfaced by the HTTP dispatcher.
///
/// Lookup and routing failures always become `404`; nothing here takes the
/// process down.
#[derive(Debug)]
pub enum ApiError {
    Daemon(DaemonError),
    Input(String),
}

impl From<DaemonError> for ApiError {
    fn from(err: DaemonError) -> Self {
        ApiError::Daemon(err)
    }
}

impl ApiError {
    pub fn input(message: impl Into<String>) -> Self {
        Self::Input(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Daemon(err) if err.is_not_found() => StatusCode::NOT_FOUND,
            ApiError::Daemon(err) if err.is_conflict() => StatusCode::CONFLICT,
            ApiError::Daemon(DaemonError::ShutdownInProgress) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Daemon(DaemonError::Config(_)) => StatusCode::BAD_REQUEST,
            ApiError::Daemon(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Input(_) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Daemon(DaemonError::NotFound(_)) => "not_found",
            ApiError::Daemon(DaemonError::UnknownIdentifier(_)) => "unknown_identifier",
            ApiError::Daemon(DaemonError::UnknownAlias(_)) => "unknown_alias",
            ApiError::Daemon(DaemonError::UnresolvedReference(_)) => "unresolved_reference",
            ApiError::Daemon(DaemonError::DuplicateIdentifier(_)) => "duplicate_identifier",
            ApiError::Daemon(DaemonError::AliasConflict { .. }) => "alias_conflict",
            ApiError::Daemon(DaemonError::IdentifiersExhausted) => "identifiers_exhausted",
            ApiError::Daemon(DaemonError::ShutdownInProgress) => "shutdown_in_progress",
            ApiError::Daemon(DaemonError::Config(_)) => "invalid_request",
            ApiError::Daemon(_) => "internal_error",
            ApiError::Input(_) => "input_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code().to_string();
        let message = match self {
            ApiError::Daemon(err) => err.to_string(),
            ApiError::Input(msg) => msg,
        };

        let body = Json(ErrorResponse {
            error: message,
            code,
        });

        (status, body).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
