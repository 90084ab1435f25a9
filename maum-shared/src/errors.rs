use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::types::ApiErrorResponse;

/// Application error codes following the pattern E{area}{sequence}
///
/// Ranges:
/// - E0xxx: Shared/infrastructure errors
/// - E2xxx: Profile errors
/// - E3xxx: Matching/recommendation errors
/// - E6xxx: Moderation errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    // Shared (E0xxx)
    InternalError,
    ValidationError,
    NotFound,
    Unauthorized,
    Forbidden,
    ServiceUnavailable,
    BadRequest,
    TokenExpired,
    TokenInvalid,

    // Profile (E2xxx)
    ProfileNotFound,

    // Matching (E3xxx)
    MatchNotFound,
    DailyLikeLimitExceeded,
    CannotLikeSelf,
    CannotBlockSelf,
    NotMatchParticipant,

    // Moderation (E6xxx)
    CannotReportSelf,
}

impl ErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            // Shared
            Self::InternalError => "E0001",
            Self::ValidationError => "E0002",
            Self::NotFound => "E0003",
            Self::Unauthorized => "E0004",
            Self::Forbidden => "E0005",
            Self::ServiceUnavailable => "E0006",
            Self::BadRequest => "E0007",
            Self::TokenExpired => "E0008",
            Self::TokenInvalid => "E0009",

            // Profile
            Self::ProfileNotFound => "E2001",

            // Matching
            Self::MatchNotFound => "E3001",
            Self::DailyLikeLimitExceeded => "E3002",
            Self::CannotLikeSelf => "E3003",
            Self::CannotBlockSelf => "E3004",
            Self::NotMatchParticipant => "E3005",

            // Moderation
            Self::CannotReportSelf => "E6001",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InternalError | Self::ServiceUnavailable => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ValidationError | Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::NotFound | Self::ProfileNotFound | Self::MatchNotFound => StatusCode::NOT_FOUND,
            Self::Unauthorized | Self::TokenExpired | Self::TokenInvalid => StatusCode::UNAUTHORIZED,
            Self::Forbidden | Self::NotMatchParticipant | Self::CannotLikeSelf
            | Self::CannotBlockSelf | Self::CannotReportSelf => StatusCode::FORBIDDEN,
            Self::DailyLikeLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{message}")]
    Known {
        code: ErrorCode,
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("internal server error")]
    Internal(#[from] anyhow::Error),

    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

impl AppError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Known {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(code: ErrorCode, message: impl Into<String>, details: serde_json::Value) -> Self {
        Self::Known {
            code,
            message: message.into(),
            details: Some(details),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadRequest, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_response) = match &self {
            AppError::Known { code, message, details } => {
                let status = code.status_code();
                let mut resp = ApiErrorResponse::new(code.code(), message);
                if let Some(d) = details {
                    resp = resp.with_details(d.clone());
                }
                (status, resp)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiErrorResponse::new("E0001", "internal server error"),
                )
            }
            AppError::Database(err) => {
                tracing::error!(error = %err, "database error");
                match err {
                    diesel::result::Error::NotFound => (
                        StatusCode::NOT_FOUND,
                        ApiErrorResponse::new("E0003", "resource not found"),
                    ),
                    _ => (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        ApiErrorResponse::new("E0001", "database error"),
                    ),
                }
            }
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                ApiErrorResponse::new("E0002", msg),
            ),
        };

        (status, Json(error_response)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_error_maps_to_429_with_matching_range_code() {
        let code = ErrorCode::DailyLikeLimitExceeded;
        assert_eq!(code.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert!(code.code().starts_with("E3"));
    }

    #[test]
    fn not_found_family_maps_to_404() {
        for code in [ErrorCode::NotFound, ErrorCode::ProfileNotFound, ErrorCode::MatchNotFound] {
            assert_eq!(code.status_code(), StatusCode::NOT_FOUND);
        }
    }

    #[test]
    fn self_target_guards_map_to_403() {
        for code in [
            ErrorCode::CannotLikeSelf,
            ErrorCode::CannotBlockSelf,
            ErrorCode::CannotReportSelf,
            ErrorCode::NotMatchParticipant,
        ] {
            assert_eq!(code.status_code(), StatusCode::FORBIDDEN);
        }
    }
}
