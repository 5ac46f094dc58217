use std::sync::{Mutex, PoisonError};

use axum::http::{HeaderMap, Uri, header::HOST};
use url::Url;

use super::error::ShellError;
use crate::navigator::Navigator;

/// [`Navigator`] for one HTTP request: the location is the configured
/// public origin plus the request path, and the last navigation becomes the
/// response redirect.
pub(super) struct RequestNavigator {
    location: Url,
    target: Mutex<Option<String>>,
}

impl RequestNavigator {
    /// The `Host` header must name `origin`; it never picks the location.
    pub(super) fn from_request(
        origin: &Url,
        headers: &HeaderMap,
        uri: &Uri,
    ) -> Result<Self, ShellError> {
        let host = headers
            .get(HOST)
            .and_then(|v| v.to_str().ok())
            .filter(|h| !h.is_empty())
            .ok_or(ShellError::MissingHost)?;
        let claimed = Url::parse(&format!("{}://{host}/", origin.scheme()))
            .map_err(|_| ShellError::MissingHost)?;
        if claimed.origin() != origin.origin() {
            tracing::warn!(host = %host, "Request for a foreign host");
            return Err(ShellError::ForeignHost);
        }

        let mut location = origin.clone();
        location.set_path(uri.path());
        location.set_query(uri.query());

        Ok(Self {
            location,
            target: Mutex::new(None),
        })
    }

    pub(super) fn take_target(&self) -> Option<String> {
        self.target
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn record(&self, target: String) {
        *self.target.lock().unwrap_or_else(PoisonError::into_inner) = Some(target);
    }
}

impl Navigator for RequestNavigator {
    fn location(&self) -> Url {
        self.location.clone()
    }

    fn assign(&self, url: &Url) {
        self.record(url.to_string());
    }

    fn push(&self, route: &str) {
        self.record(route.to_string());
    }

    fn replace(&self, route: &str) {
        self.record(route.to_string());
    }
}
