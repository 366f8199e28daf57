use actix_web::{http::StatusCode, ResponseError};
use log::error;
use thiserror::Error;

use crate::response::response_from_error;

/// Request-level failure taxonomy. Validation problems are the caller's to
/// fix, missing records map to 404, and storage failures surface as a
/// generic message with the detail kept in the server log.
///
/// Out-of-range sort/order/page/limit values never land here; they are
/// normalized at the query boundary instead.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("internal storage error")]
    Store,
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Logs the underlying cause and returns the client-safe variant.
    pub fn store(err: impl std::fmt::Display) -> Self {
        error!("store failure: {}", err);
        Self::Store
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Store => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> actix_web::HttpResponse {
        response_from_error(self)
    }
}
