use axum::Json;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

#[derive(Debug, Error, PartialEq)]
pub enum ProxyError {
    #[error("missing configuration variable {0}")]
    Configuration(&'static str),

    #[error("invalid value '{value}' for {variable}")]
    InvalidSetting {
        variable: &'static str,
        value: String,
    },

    #[error("{0}")]
    BadRequest(String),

    #[error("upstream answered {status}")]
    Upstream { status: StatusCode, body: String },

    #[error("upstream unreachable: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for ProxyError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        match self {
            Self::Configuration(_) | Self::InvalidSetting { .. } => {
                error!(error = %self, "proxy misconfigured");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "Server configuration error" })),
                )
                    .into_response()
            }
            Self::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
            }
            Self::Upstream { status, body } => {
                warn!(%status, "relaying upstream error");
                (status, [(header::CONTENT_TYPE, "application/json")], body).into_response()
            }
            Self::Transport(message) => {
                error!(%message, "upstream request failed");
                (
                    StatusCode::BAD_GATEWAY,
                    Json(json!({ "error": "Upstream service unavailable" })),
                )
                    .into_response()
            }
        }
    }
}
