use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use shared::checkout::CheckoutError;
use shared::shared_wheel_game::WheelError;

use crate::storage::StorageError;

/// Errors surfaced to HTTP clients as a status code plus a plain-text message.
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Unauthorized,
    Forbidden,
    Gone,
    Misconfigured(&'static str),
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::Gone => StatusCode::GONE,
            Self::Misconfigured(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadRequest(m) | Self::NotFound(m) | Self::Conflict(m) | Self::Internal(m) => {
                write!(f, "{}", m)
            }
            Self::Misconfigured(m) => write!(f, "{}", m),
            Self::Unauthorized => write!(f, "Missing session signature"),
            Self::Forbidden => write!(f, "Invalid session signature"),
            Self::Gone => write!(f, "Session expired"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<WheelError> for AppError {
    fn from(err: WheelError) -> Self {
        match err {
            WheelError::Configuration(e) => {
                tracing::error!("Wheel configuration error: {}", e);
                Self::Internal("Wheel is misconfigured".to_string())
            }
            WheelError::AlreadySpun | WheelError::NotSpinning => Self::Conflict(err.to_string()),
        }
    }
}

impl From<CheckoutError> for AppError {
    fn from(err: CheckoutError) -> Self {
        match err {
            CheckoutError::Validation(_) => Self::BadRequest(err.to_string()),
            CheckoutError::SpinNotResolved => Self::Conflict(err.to_string()),
        }
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound => Self::NotFound(err.to_string()),
            _ => {
                tracing::error!("Storage error: {}", err);
                Self::Internal(err.to_string())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}
