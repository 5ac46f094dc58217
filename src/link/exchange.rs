use std::future::Future;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::Error;
use crate::types::IdToken;

/// Fallback text when the backend rejects without a message.
pub const DEFAULT_REJECTION: &str = "Failed to link account";

/// Body of the backend link call.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkAccountRequest {
    pub code: String,
    pub redirect_uri: String,
}

impl std::fmt::Debug for LinkAccountRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkAccountRequest")
            .field("code", &"[REDACTED]")
            .field("redirect_uri", &self.redirect_uri)
            .finish()
    }
}

/// Wire response of the backend link call.
#[derive(Debug, Clone, Deserialize)]
pub struct LinkAccountResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// Structured answer from the backend. Transport failures are `Err`, not this.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeOutcome {
    Linked,
    Rejected { message: String },
}

impl From<LinkAccountResponse> for ExchangeOutcome {
    fn from(response: LinkAccountResponse) -> Self {
        if response.success {
            Self::Linked
        } else {
            Self::Rejected {
                message: response
                    .message
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| DEFAULT_REJECTION.to_string()),
            }
        }
    }
}

/// Trusted backend that redeems an authorization code for a durable grant.
pub trait ExchangeClient: Send + Sync + 'static {
    /// `POST endpoint` with `Authorization: Bearer <bearer>` and a JSON body.
    ///
    /// Returns `Ok` for any well-formed `{success, message?}` answer and `Err`
    /// when the call could not be completed or the answer is unreadable.
    fn link_account(
        &self,
        endpoint: &Url,
        bearer: &IdToken,
        request: &LinkAccountRequest,
    ) -> impl Future<Output = Result<ExchangeOutcome, Error>> + Send;
}

/// [`ExchangeClient`] over HTTP.
#[cfg(feature = "http")]
pub struct HttpExchangeClient {
    http: reqwest::Client,
}

#[cfg(feature = "http")]
impl HttpExchangeClient {
    /// Create a client whose requests time out after the configured exchange timeout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the underlying HTTP client cannot be built.
    pub fn new(config: &crate::config::LinkConfig) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(config.exchange_timeout())
            .build()?;
        Ok(Self { http })
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }
}

#[cfg(feature = "http")]
impl ExchangeClient for HttpExchangeClient {
    async fn link_account(
        &self,
        endpoint: &Url,
        bearer: &IdToken,
        request: &LinkAccountRequest,
    ) -> Result<ExchangeOutcome, Error> {
        let response = self
            .http
            .post(endpoint.clone())
            .bearer_auth(bearer.expose())
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;

        match serde_json::from_slice::<LinkAccountResponse>(&body) {
            Ok(parsed) if parsed.success && !status.is_success() => Err(Error::Exchange(format!(
                "success body with status {}",
                status.as_u16()
            ))),
            Ok(parsed) => Ok(parsed.into()),
            Err(e) => {
                tracing::debug!(status = status.as_u16(), error = %e, "Unreadable exchange response");
                Err(Error::Exchange(format!(
                    "unreadable response (status {})",
                    status.as_u16()
                )))
            }
        }
    }
}
