//! HTTP 에러 응답

use crate::ledger::{JoinError, SettleError, StoreError, TransferError, UpdateError};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

/// `{code, message}` 형태의 에러 응답
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl ToString) -> Self {
        Self {
            status,
            code,
            message: message.to_string(),
        }
    }

    pub fn bad_request(message: impl ToString) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_request", message)
    }

    fn not_found(message: impl ToString) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    fn room_closed(message: impl ToString) -> Self {
        Self::new(StatusCode::CONFLICT, "room_closed", message)
    }

    fn storage(err: &StoreError) -> Self {
        tracing::error!(error = %err, "Storage failure");
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "storage_error",
            "storage failure, retry the whole operation",
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({
            "code": self.code,
            "message": self.message,
        }));
        (self.status, body).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Backend(_) => Self::storage(&err),
            _ => Self::not_found(&err),
        }
    }
}

impl From<TransferError> for ApiError {
    fn from(err: TransferError) -> Self {
        match &err {
            TransferError::InvalidAmount(_) | TransferError::SelfTransfer => {
                Self::bad_request(&err)
            }
            TransferError::RoomNotFound(_) | TransferError::PlayerNotInRoom { .. } => {
                Self::not_found(&err)
            }
            TransferError::RoomClosed(_) => Self::room_closed(&err),
            TransferError::InsufficientBalance { .. } => {
                Self::new(StatusCode::CONFLICT, "insufficient_balance", &err)
            }
            TransferError::Store(inner) => Self::storage(inner),
        }
    }
}

impl From<SettleError> for ApiError {
    fn from(err: SettleError) -> Self {
        match &err {
            SettleError::RoomNotFound(_) => Self::not_found(&err),
            SettleError::RoomClosed(_) => Self::room_closed(&err),
            SettleError::Unbalanced(_) => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "ledger_unbalanced", &err)
            }
            SettleError::Store(inner) => Self::storage(inner),
        }
    }
}

impl From<JoinError> for ApiError {
    fn from(err: JoinError) -> Self {
        match &err {
            JoinError::RoomNotFound(_) => Self::not_found(&err),
            JoinError::RoomClosed(_) => Self::room_closed(&err),
            JoinError::Store(inner) => Self::storage(inner),
        }
    }
}

impl From<UpdateError> for ApiError {
    fn from(err: UpdateError) -> Self {
        match &err {
            UpdateError::RoomNotFound(_) | UpdateError::PlayerNotInRoom { .. } => {
                Self::not_found(&err)
            }
            UpdateError::RoomClosed(_) => Self::room_closed(&err),
            UpdateError::Store(inner) => Self::storage(inner),
        }
    }
}
