//! Error types for the API layer.
//!
//! [`ApiError`] unifies all request-time failure modes into a single
//! enum that converts into an HTTP response via its
//! [`IntoResponse`](axum::response::IntoResponse) implementation.
//! Construction-time routing failures live in
//! [`RouteError`](crate::routing::RouteError) and are fatal at startup,
//! never surfaced here.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::cluster::ClusterError;

/// Request-time failures surfaced to clients.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The addressed build/subjob/atom/worker id does not exist. This is
    /// a domain condition, distinct from a dispatch miss (which never
    /// reaches a handler).
    #[error("{0} not found")]
    NotFound(String),

    /// Malformed or unacceptable payload on a mutating endpoint.
    #[error("{0}")]
    BadRequest(String),

    /// Missing or invalid credential on a protected endpoint. Rejected
    /// before the handler body executes.
    #[error("authentication required")]
    Unauthenticated,

    /// The route matched but does not support the request method.
    #[error("method not allowed")]
    MethodNotAllowed,

    /// An internal invariant failed.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ClusterError> for ApiError {
    fn from(err: ClusterError) -> Self {
        match err {
            ClusterError::NotFound(what) => ApiError::NotFound(what),
            ClusterError::Rejected(why) => ApiError::BadRequest(why),
        }
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            // Mutating-endpoint rejections carry the explicit envelope.
            ApiError::BadRequest(message) => serde_json::json!({
                "success": false,
                "error": message,
                "status": status.as_u16(),
            }),
            other => serde_json::json!({
                "error": other.to_string(),
                "status": status.as_u16(),
            }),
        };
        (status, axum::Json(body)).into_response()
    }
}
