//! Actix Web error adapters for supervisor errors.
//!
//! This module implements Actix Web's `ResponseError` for the crate's
//! [`Error`] so bridge handlers can return it directly.

use crate::error::Error;
use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde_json::json;

fn status_for(error: &Error) -> StatusCode {
    match error {
        Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        Error::ConfigParse(_) | Error::ConfigValidation(_) => StatusCode::BAD_REQUEST,
        Error::NotRunning | Error::Communication(_) => StatusCode::SERVICE_UNAVAILABLE,
        Error::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn json_error(status_code: StatusCode, message: String) -> HttpResponse {
    HttpResponse::build(status_code)
        .content_type("application/json")
        .json(json!({
            "error": message,
            "code": status_code.as_u16()
        }))
}

impl ResponseError for Error {
    fn error_response(&self) -> HttpResponse {
        json_error(self.status_code(), self.to_string())
    }

    fn status_code(&self) -> StatusCode {
        status_for(self)
    }
}

/// Errors raised while handling bridge requests
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("{0}")]
    Internal(#[from] Error),
}

impl ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse {
        json_error(self.status_code(), self.to_string())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(e) => e.status_code(),
        }
    }
}
