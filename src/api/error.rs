use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::errors::{Error, ErrorKind};

#[derive(Debug)]
pub struct ApiError {
    kind: ErrorKind,
    message: String,
}

impl ApiError {
    pub fn new<S: Into<String>>(kind: ErrorKind, msg: S) -> Self {
        Self { kind, message: msg.into() }
    }

    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::new(ErrorKind::NotFound, msg)
    }

    pub fn bad_request<S: Into<String>>(msg: S) -> Self {
        Self::new(ErrorKind::Configuration, msg)
    }

    fn status_code(&self) -> StatusCode {
        match self.kind {
            ErrorKind::Configuration => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Authentication => StatusCode::BAD_GATEWAY,
            ErrorKind::RemoteUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let body = ErrorBody { error: self.kind.to_string(), message: self.message };
        (status, Json(body)).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}
