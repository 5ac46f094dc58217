use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinHandle;
use url::Url;

use super::exchange::{ExchangeClient, ExchangeOutcome, LinkAccountRequest};
use super::state_token::states_match;
use super::storage::{StateStorage, consume_attempt};
use crate::config::LinkConfig;
use crate::error::Error;
use crate::navigator::Navigator;
use crate::session::SessionStore;

/// Query parameters the authorization server sends back.
///
/// Empty values count as absent.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl CallbackParams {
    #[must_use]
    pub fn from_url(url: &Url) -> Self {
        let mut params = Self::default();
        for (key, value) in url.query_pairs() {
            if value.is_empty() {
                continue;
            }
            let slot = match key.as_ref() {
                "code" => &mut params.code,
                "state" => &mut params.state,
                "error" => &mut params.error,
                "error_description" => &mut params.error_description,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.into_owned());
            }
        }
        params
    }
}

impl std::fmt::Debug for CallbackParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackParams")
            .field("code", &self.code.as_ref().map(|_| "[REDACTED]"))
            .field("state", &self.state.as_ref().map(|_| "[REDACTED]"))
            .field("error", &self.error)
            .field("error_description", &self.error_description)
            .finish()
    }
}

/// Why a link attempt ended without a grant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FailureReason {
    #[error("Error linking your account: {}", denial_text(.error, .description))]
    ThirdPartyDenied {
        error: String,
        description: Option<String>,
    },
    #[error(
        "Invalid authentication state. This link request was not started here or was already used. Please connect again."
    )]
    CsrfMismatch,
    #[error("No authorization code received. The request may have been cancelled. Please try again.")]
    MissingCode,
    #[error("You must be signed in to link your Alexa account.")]
    NotSignedIn,
    #[error("Failed to link your account: {message}")]
    ExchangeRejected { message: String },
    #[error("Could not reach EleFit to finish linking. Check your connection and try again.")]
    NetworkError,
    #[error("Account linking is not configured correctly on this device. Please contact support.")]
    Misconfigured,
}

fn denial_text(error: &str, description: &Option<String>) -> String {
    match description {
        Some(description) => format!("{error} ({description})"),
        None => error.to_string(),
    }
}

impl FailureReason {
    /// Stable machine-readable name.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ThirdPartyDenied { .. } => "third-party-denied",
            Self::CsrfMismatch => "csrf-mismatch",
            Self::MissingCode => "missing-code",
            Self::NotSignedIn => "not-signed-in",
            Self::ExchangeRejected { .. } => "exchange-rejected",
            Self::NetworkError => "network-error",
            Self::Misconfigured => "configuration-error",
        }
    }
}

/// Outcome shown on the callback page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkResult {
    Processing,
    Succeeded,
    Failed(FailureReason),
}

impl LinkResult {
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Processing => "Processing your Alexa account link...".to_string(),
            Self::Succeeded => "Your account has been successfully linked with Alexa!".to_string(),
            Self::Failed(reason) => reason.to_string(),
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Processing)
    }
}

/// Finishes a link attempt when the authorization server redirects back.
///
/// Runs once per page load. Steps short-circuit in this order: provider error,
/// CSRF state, code, session, token, backend exchange. The stored state is
/// consumed on every path that gets past parsing.
pub struct LinkCallbackHandler<S, E, N> {
    config: Arc<LinkConfig>,
    store: SessionStore,
    storage: Arc<S>,
    exchange: Arc<E>,
    navigator: Arc<N>,
    result: Mutex<LinkResult>,
    ran: AtomicBool,
    mounted: AtomicBool,
    // Guards `mounted` transitions too, so no navigation is scheduled after unmount.
    pending_navigation: Mutex<Option<JoinHandle<()>>>,
}

impl<S, E, N> LinkCallbackHandler<S, E, N>
where
    S: StateStorage,
    E: ExchangeClient,
    N: Navigator,
{
    #[must_use]
    pub fn new(
        config: Arc<LinkConfig>,
        store: SessionStore,
        storage: Arc<S>,
        exchange: Arc<E>,
        navigator: Arc<N>,
    ) -> Self {
        Self {
            config,
            store,
            storage,
            exchange,
            navigator,
            result: Mutex::new(LinkResult::Processing),
            ran: AtomicBool::new(false),
            mounted: AtomicBool::new(true),
            pending_navigation: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn result(&self) -> LinkResult {
        self.result
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Process the callback found in the live page location.
    pub async fn run_from_location(&self) -> LinkResult {
        let params = CallbackParams::from_url(&self.navigator.location());
        self.run(params).await
    }

    /// Process one callback. Later calls return the first outcome untouched.
    ///
    /// If the handler is unmounted while this is in flight, the outcome is
    /// returned but not committed and no navigation is scheduled.
    pub async fn run(&self, params: CallbackParams) -> LinkResult {
        if self.ran.swap(true, Ordering::AcqRel) {
            tracing::debug!("Link callback already processed");
            return self.result();
        }

        let outcome = self.process(params).await;
        self.commit(&outcome);
        outcome
    }

    /// Tear down: drop any uncommitted outcome and cancel the pending navigation.
    pub fn unmount(&self) {
        let mut pending = self
            .pending_navigation
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.mounted.store(false, Ordering::Release);
        if let Some(handle) = pending.take() {
            tracing::debug!("Cancelling post-link navigation");
            handle.abort();
        }
    }

    /// Leave for the home route now (the "Return to Dashboard" action).
    pub fn return_home(&self) {
        if let Some(handle) = self
            .pending_navigation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
        self.navigator.push(&self.config.home_route);
    }

    async fn process(&self, params: CallbackParams) -> LinkResult {
        if let Some(error) = params.error {
            // Burn the token so this attempt cannot be replayed.
            if let Err(e) = self.storage.take(&self.config.storage_key) {
                tracing::error!(error = %e, "Could not clear link state");
            }
            tracing::warn!(error = %error, "Third-party authorization denied");
            return LinkResult::Failed(FailureReason::ThirdPartyDenied {
                error,
                description: params.error_description,
            });
        }

        let stored = consume_attempt(
            self.storage.as_ref(),
            &self.config.storage_key,
            self.config.attempt_ttl,
        )
        .unwrap_or_else(|e| {
            tracing::error!(error = %e, "Could not read link state");
            None
        });

        let verified = match (stored, params.state.as_deref()) {
            (Some(attempt), Some(received)) => states_match(&attempt.state, received),
            _ => false,
        };
        if !verified {
            tracing::warn!("OAuth state mismatch");
            return LinkResult::Failed(FailureReason::CsrfMismatch);
        }

        let Some(code) = params.code else {
            tracing::warn!("Callback carried no authorization code");
            return LinkResult::Failed(FailureReason::MissingCode);
        };

        if self.store.current().session().is_none() {
            tracing::warn!("Link callback without a session");
            return LinkResult::Failed(FailureReason::NotSignedIn);
        }

        let bearer = match self.store.mint_bearer_token(true).await {
            Ok(token) => token,
            Err(Error::NotSignedIn) => return LinkResult::Failed(FailureReason::NotSignedIn),
            Err(e) => {
                tracing::error!(error = %e, "Token refresh failed");
                return LinkResult::Failed(FailureReason::NetworkError);
            }
        };

        let location = self.navigator.location();
        let (redirect_uri, endpoint) = match (
            self.config.redirect_uri(&location),
            self.config.exchange_endpoint(&location),
        ) {
            (Ok(redirect_uri), Ok(endpoint)) => (redirect_uri, endpoint),
            (Err(e), _) | (_, Err(e)) => {
                tracing::error!(error = %e, "Link configuration error");
                return LinkResult::Failed(FailureReason::Misconfigured);
            }
        };

        let request = LinkAccountRequest {
            code,
            redirect_uri: redirect_uri.into(),
        };

        match self
            .exchange
            .link_account(&endpoint, &bearer, &request)
            .await
        {
            Ok(ExchangeOutcome::Linked) => {
                tracing::info!("Account linked");
                LinkResult::Succeeded
            }
            Ok(ExchangeOutcome::Rejected { message }) => {
                tracing::warn!(message = %message, "Backend rejected the authorization code");
                LinkResult::Failed(FailureReason::ExchangeRejected { message })
            }
            Err(e) => {
                tracing::error!(error = %e, "Exchange call failed");
                LinkResult::Failed(FailureReason::NetworkError)
            }
        }
    }

    fn commit(&self, outcome: &LinkResult) {
        let mut pending = self
            .pending_navigation
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !self.mounted.load(Ordering::Acquire) {
            tracing::debug!("Handler unmounted, dropping link result");
            return;
        }

        *self.result.lock().unwrap_or_else(PoisonError::into_inner) = outcome.clone();

        if *outcome == LinkResult::Succeeded {
            let navigator = Arc::clone(&self.navigator);
            let route = self.config.home_route.clone();
            let delay = self.config.success_delay;
            *pending = Some(tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                navigator.push(&route);
            }));
        }
    }
}

impl<S, E, N> Drop for LinkCallbackHandler<S, E, N> {
    fn drop(&mut self) {
        let pending = self
            .pending_navigation
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = pending.take() {
            handle.abort();
        }
    }
}
