use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bomana_core::{ManifestError, Origin};
use bomana_stats::StoreError;
use thiserror::Error;

use crate::settings::SettingsError;

/// Failure of a single request, rendered as `{"detail": ...}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApiError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Manifest(error) => manifest_status(error),
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn manifest_status(error: &ManifestError) -> StatusCode {
    match error {
        ManifestError::UnsupportedChannel(_) => StatusCode::BAD_REQUEST,
        ManifestError::NotFound(_) => StatusCode::SERVICE_UNAVAILABLE,
        ManifestError::Transport { .. }
        | ManifestError::Upstream { .. }
        | ManifestError::Parse {
            origin: Origin::Remote,
            ..
        } => StatusCode::BAD_GATEWAY,
        ManifestError::Validation(_)
        | ManifestError::Configuration(_)
        | ManifestError::Parse {
            origin: Origin::Local,
            ..
        } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            Self::Manifest(error) if error.is_rejected_input() => {
                log::debug!("Rejected request: {self}");
            }
            _ => log::error!("Request failed ({status}): {self}"),
        }
        (status, Json(serde_json::json!({ "detail": self.to_string() }))).into_response()
    }
}

/// Failure to start or run the service.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error("failed to open event store: {0}")]
    Store(#[from] StoreError),
    #[error("failed to build manifest resolver: {0}")]
    Resolver(#[from] ManifestError),
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}
