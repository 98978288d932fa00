use axum::{
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::warn;

use super::upstream::FetchError;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("no manifest discovered yet")]
    NoDescriptorYet,

    #[error("missing query parameter '{0}'")]
    MissingParameter(&'static str),

    #[error(transparent)]
    Upstream(#[from] FetchError),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::NoDescriptorYet => StatusCode::SERVICE_UNAVAILABLE,
            ProxyError::MissingParameter(_) => StatusCode::BAD_REQUEST,
            ProxyError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let body = match &self {
            ProxyError::NoDescriptorYet => "# Waiting for manifest...\n".to_string(),
            ProxyError::MissingParameter(_) => format!("{self}\n"),
            ProxyError::Upstream(e) => {
                warn!(error = %e, "upstream fetch failed");
                format!("# Upstream error: {e}\n")
            }
        };

        (
            self.status(),
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            body,
        )
            .into_response()
    }
}
