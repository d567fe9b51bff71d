//! Error taxonomy and its HTTP rendering.

use crate::{agent::AgentError, models::ErrorResponse, transport::TransportError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};
use thiserror::Error;
use tracing::{error, warn};
use utoipa::ToSchema;
use voxbridge_core::{catalog::CatalogError, pipeline::ComposeError};

/// The kinds of failure a client can be told about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum ErrorKind {
    RoomCreationFailed,
    TokenIssuanceFailed,
    BotJoinTimeout,
    AgentCrashed,
    ProviderUnavailable,
    AgentUnavailable,
    InvalidRequest,
    NotFound,
    LanguageDetectionTimeout,
    /// Only ever logged.
    TranscriptForwardingFailure,
    Internal,
}

impl ErrorKind {
    pub fn status(self) -> StatusCode {
        match self {
            ErrorKind::RoomCreationFailed | ErrorKind::TokenIssuanceFailed => {
                StatusCode::BAD_GATEWAY
            }
            ErrorKind::BotJoinTimeout | ErrorKind::LanguageDetectionTimeout => {
                StatusCode::GATEWAY_TIMEOUT
            }
            ErrorKind::ProviderUnavailable | ErrorKind::AgentUnavailable => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::AgentCrashed
            | ErrorKind::TranscriptForwardingFailure
            | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Why a connect request failed. Room and token failures are reported before
/// any session exists.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("{0}")]
    InvalidRequest(String),
    #[error("agent runtime unavailable: {0}")]
    AgentUnavailable(String),
    #[error("{0}")]
    ProviderUnavailable(String),
    #[error("failed to create room: {0}")]
    RoomCreationFailed(#[source] TransportError),
    #[error("failed to issue room token: {0}")]
    TokenIssuanceFailed(#[source] TransportError),
    #[error("agent did not join room '{room}' within {timeout:?}")]
    BotJoinTimeout { room: String, timeout: Duration },
    #[error("agent failed before joining: {0}")]
    AgentCrashed(String),
}

impl ConnectError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConnectError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            ConnectError::AgentUnavailable(_) => ErrorKind::AgentUnavailable,
            ConnectError::ProviderUnavailable(_) => ErrorKind::ProviderUnavailable,
            ConnectError::RoomCreationFailed(_) => ErrorKind::RoomCreationFailed,
            ConnectError::TokenIssuanceFailed(_) => ErrorKind::TokenIssuanceFailed,
            ConnectError::BotJoinTimeout { .. } => ErrorKind::BotJoinTimeout,
            ConnectError::AgentCrashed(_) => ErrorKind::AgentCrashed,
        }
    }
}

impl From<ComposeError> for ConnectError {
    fn from(err: ComposeError) -> Self {
        ConnectError::ProviderUnavailable(err.to_string())
    }
}

impl From<CatalogError> for ConnectError {
    fn from(err: CatalogError) -> Self {
        ConnectError::InvalidRequest(err.to_string())
    }
}

impl From<AgentError> for ConnectError {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::ProviderUnavailable { .. } => {
                ConnectError::ProviderUnavailable(err.to_string())
            }
            other => ConnectError::AgentCrashed(other.to_string()),
        }
    }
}

pub enum ApiError {
    Connect(ConnectError),
    BadRequest(String),
    NotFound(String),
    DetectionTimeout,
    Unavailable(ErrorKind, String),
    InternalServerError(anyhow::Error),
}

impl ApiError {
    fn parts(self) -> (ErrorKind, String) {
        match self {
            ApiError::Connect(err) => (err.kind(), err.to_string()),
            ApiError::BadRequest(message) => (ErrorKind::InvalidRequest, message),
            ApiError::NotFound(message) => (ErrorKind::NotFound, message),
            ApiError::DetectionTimeout => (
                ErrorKind::LanguageDetectionTimeout,
                "language detection did not finish in time".to_string(),
            ),
            ApiError::Unavailable(kind, message) => (kind, message),
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                (
                    ErrorKind::Internal,
                    "An internal server error occurred.".to_string(),
                )
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (kind, message) = self.parts();
        let status = kind.status();
        if status.is_server_error() {
            warn!(%kind, %message, "Request failed");
        }
        (status, Json(ErrorResponse { kind, message })).into_response()
    }
}

impl From<ConnectError> for ApiError {
    fn from(err: ConnectError) -> Self {
        ApiError::Connect(err)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::InternalServerError(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_map_to_statuses() {
        assert_eq!(ErrorKind::RoomCreationFailed.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(ErrorKind::BotJoinTimeout.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            ErrorKind::ProviderUnavailable.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(ErrorKind::InvalidRequest.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorKind::AgentCrashed.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_kind_serializes_pascal_case() {
        assert_eq!(
            serde_json::to_value(ErrorKind::TokenIssuanceFailed).unwrap(),
            "TokenIssuanceFailed"
        );
        assert_eq!(ErrorKind::BotJoinTimeout.to_string(), "BotJoinTimeout");
    }

    #[test]
    fn test_agent_errors_map_to_connect_kinds() {
        let unavailable = ConnectError::from(AgentError::ProviderUnavailable {
            provider: voxbridge_core::providers::ProviderId::GeminiLive,
            reason: "setup rejected".to_string(),
        });
        assert_eq!(unavailable.kind(), ErrorKind::ProviderUnavailable);

        let crashed = ConnectError::from(AgentError::Service("socket reset".to_string()));
        assert_eq!(crashed.kind(), ErrorKind::AgentCrashed);
    }

    #[test]
    fn test_catalog_errors_are_invalid_requests() {
        let err = ConnectError::from(CatalogError::UnknownModel("gpt-x".to_string()));
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        assert!(err.to_string().contains("gpt-x"));
    }
}
