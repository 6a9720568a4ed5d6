use crate::health::ReconcileError;
use crate::models::HostId;
use crate::probe::ProbeError;
use crate::response::ApiResponse;
use crate::shutdown::ShutdownError;
use crate::store::StoreError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::error::Error as _;
use std::sync::Arc;
use tracing::error;

/// Errors surfaced by the HTTP layer, rendered as the JSON envelope.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("host {0} not found")]
    HostNotFound(HostId),
    #[error("image {0} not found")]
    ImageNotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Reconcile(#[from] Arc<ReconcileError>),
    #[error(transparent)]
    Shutdown(#[from] ShutdownError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn store_status(e: &StoreError) -> StatusCode {
    match e {
        StoreError::ConstraintViolation(_) => StatusCode::BAD_REQUEST,
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        StoreError::Io(_) | StoreError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::HostNotFound(_) | ApiError::ImageNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Store(e) => store_status(e),
            ApiError::Reconcile(e) => match &**e {
                ReconcileError::NotFound(_) => StatusCode::NOT_FOUND,
                ReconcileError::Probe(ProbeError::InvalidAddress(_)) => StatusCode::BAD_REQUEST,
                ReconcileError::Store(e) => store_status(e),
                ReconcileError::Interrupted(_) => StatusCode::SERVICE_UNAVAILABLE,
            },
            ApiError::Shutdown(e) => match e {
                ShutdownError::NotFound { .. } => StatusCode::NOT_FOUND,
                ShutdownError::UnsafeAddress(_) => StatusCode::BAD_REQUEST,
                ShutdownError::Store(e) => store_status(e),
                ShutdownError::InvalidCommand(_) => StatusCode::INTERNAL_SERVER_ERROR,
                ShutdownError::Launch(_) | ShutdownError::CommandFailed { .. } | ShutdownError::TimedOut(_) => {
                    StatusCode::BAD_GATEWAY
                }
            },
            ApiError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Full source chain, for `developerMessage`.
    fn chain(&self) -> String {
        let mut out = format!("{self:?}");
        let mut source = self.source();
        while let Some(cause) = source {
            out.push_str(&format!(" <- {cause}"));
            source = cause.source();
        }
        out
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.status();
        if code.is_server_error() {
            error!(status = code.as_u16(), error = %self, "request failed");
        }
        ApiResponse::new(code)
            .reason(code.canonical_reason().unwrap_or("Error"))
            .message(self.to_string())
            .developer_message(self.chain())
            .into_response()
    }
}
