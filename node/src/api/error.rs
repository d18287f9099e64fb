//! HTTP rendering of ledger and chat failures.
//!
//! Every error leaves the node as `{error, kind, retryable}` with a status
//! derived from the error kind.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use afritrade_ledger::chat::ChatError;
use afritrade_ledger::{ErrorKind, LedgerError};

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
    retryable: bool,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    kind: &'static str,
    retryable: bool,
}

impl ApiError {
    fn new(status: StatusCode, kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            kind,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, ErrorKind::Validation.as_str(), message)
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, ErrorKind::Unauthorized.as_str(), message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, ErrorKind::Internal.as_str(), message)
    }

    pub fn is_busy(&self) -> bool {
        self.kind == ErrorKind::Busy.as_str()
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        let kind = err.kind();
        let status = match (&err, kind) {
            (LedgerError::InvalidCredentials, _) => StatusCode::UNAUTHORIZED,
            (_, ErrorKind::Unauthorized) => StatusCode::FORBIDDEN,
            (_, ErrorKind::Validation) | (_, ErrorKind::InsufficientFunds) => {
                StatusCode::BAD_REQUEST
            }
            (_, ErrorKind::NotFound) => StatusCode::NOT_FOUND,
            (_, ErrorKind::Conflict) | (_, ErrorKind::Busy) => StatusCode::CONFLICT,
            (_, ErrorKind::Internal) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %err, "ledger failure");
        }
        Self {
            status,
            kind: kind.as_str(),
            message: err.to_string(),
            retryable: kind.is_retryable(),
        }
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        match &err {
            ChatError::Validation(_) => Self::bad_request(err.to_string()),
            ChatError::SessionNotFound(_) => {
                Self::new(StatusCode::NOT_FOUND, ErrorKind::NotFound.as_str(), err.to_string())
            }
            ChatError::Upstream(_) => Self::new(StatusCode::BAD_GATEWAY, "upstream", err.to_string()),
            ChatError::Storage(_) => {
                tracing::error!(error = %err, "chat storage failure");
                Self::internal(err.to_string())
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.message,
            kind: self.kind,
            retryable: self.retryable,
        };
        (self.status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use afritrade_ledger::vault::WalletNumber;
    use uuid::Uuid;

    #[test]
    fn pin_mismatch_is_forbidden_but_bad_login_is_unauthorized() {
        assert_eq!(ApiError::from(LedgerError::InvalidPin).status, StatusCode::FORBIDDEN);
        assert_eq!(
            ApiError::from(LedgerError::InvalidCredentials).status,
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn busy_is_a_retryable_conflict() {
        let err = ApiError::from(LedgerError::Busy(WalletNumber::parse("000001").unwrap()));
        assert_eq!(err.status, StatusCode::CONFLICT);
        assert!(err.retryable);
        assert_eq!(err.kind, "busy");
    }

    #[test]
    fn chat_failures_map_to_gateway_and_not_found() {
        assert_eq!(
            ApiError::from(ChatError::Upstream("timeout".into())).status,
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::from(ChatError::SessionNotFound(Uuid::nil())).status,
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn pin_required_is_a_validation_error() {
        let err = ApiError::from(LedgerError::PinRequired);
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.kind, "validation");
        assert!(!err.retryable);
    }
}
