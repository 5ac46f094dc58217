use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Errors surfaced by the loopback pages.
#[derive(Debug, thiserror::Error)]
pub enum ShellError {
    /// The request carried no usable `Host` header, so the page origin is unknown.
    #[error("Missing or invalid Host header")]
    MissingHost,

    /// The `Host` header names something other than the public origin.
    #[error("Request is not for this origin")]
    ForeignHost,

    /// A browser marked the request as started by another site.
    #[error("Cross-site request refused")]
    CrossSite,

    #[error(transparent)]
    Link(#[from] crate::error::Error),
}

impl IntoResponse for ShellError {
    fn into_response(self) -> Response {
        match self {
            Self::MissingHost => (StatusCode::BAD_REQUEST, self.to_string()).into_response(),
            Self::ForeignHost => {
                (StatusCode::MISDIRECTED_REQUEST, self.to_string()).into_response()
            }
            Self::CrossSite => (StatusCode::FORBIDDEN, self.to_string()).into_response(),
            Self::Link(ref e) => {
                tracing::error!(error = %e, "Link page internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response()
            }
        }
    }
}
