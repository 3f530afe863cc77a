//! Error type shared by handlers, the OCR client and the ingestion client.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::{debug, error};

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("{0}")]
    BadRequest(String),

    #[error("unsupported content type: {0:?}")]
    UnsupportedMediaType(String),

    #[error("{0}")]
    Unauthorized(&'static str),

    /// A remote service answered with a non-2xx status.
    #[error("{service} returned {status}: {body}")]
    Upstream {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("failed to reach {service}: {source}")]
    Transport {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected response from {service}: {message}")]
    Decode {
        service: &'static str,
        message: String,
    },

    /// Forwarding stopped at `page`; earlier pages stay ingested.
    #[error("ingestion stopped at page {page}: {source}")]
    Ingestion {
        page: usize,
        #[source]
        source: Box<GatewayError>,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl GatewayError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn transport(service: &'static str) -> impl FnOnce(reqwest::Error) -> Self {
        move |source| Self::Transport { service, source }
    }

    pub fn decode(service: &'static str, message: impl ToString) -> Self {
        Self::Decode {
            service,
            message: message.to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Upstream { .. } | Self::Transport { .. } | Self::Decode { .. } => {
                StatusCode::BAD_GATEWAY
            }
            Self::Ingestion { source, .. } => source.status(),
            Self::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable identifier reported in the `error` field of the response body.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::UnsupportedMediaType(_) => "unsupported_media_type",
            Self::Unauthorized(_) => "unauthorized",
            Self::Upstream { .. } => "upstream_error",
            Self::Transport { .. } => "upstream_unreachable",
            Self::Decode { .. } => "upstream_decode_error",
            Self::Ingestion { .. } => "ingestion_failed",
            Self::Io { .. } => "io_error",
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed ({}): {}", status, self);
        } else {
            debug!("Request rejected ({}): {}", status, self);
        }

        let body = json!({
            "error": self.kind(),
            "message": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}
