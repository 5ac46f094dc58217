use std::sync::{Arc, Mutex, PoisonError};

use url::Url;

use super::state_token::generate_state;
use super::storage::{LinkAttempt, StateStorage, save_attempt};
use crate::config::LinkConfig;
use crate::error::Error;
use crate::navigator::Navigator;
use crate::session::SessionStore;

/// State of the "Connect with Alexa" control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitiatorStatus {
    Idle,
    /// The page is on its way to the authorization server.
    Connecting,
    Failed(String),
}

/// Starts the third-party authorization-code flow.
pub struct LinkInitiator<S, N> {
    config: Arc<LinkConfig>,
    store: SessionStore,
    storage: Arc<S>,
    navigator: Arc<N>,
    status: Mutex<InitiatorStatus>,
}

impl<S: StateStorage, N: Navigator> LinkInitiator<S, N> {
    #[must_use]
    pub fn new(
        config: Arc<LinkConfig>,
        store: SessionStore,
        storage: Arc<S>,
        navigator: Arc<N>,
    ) -> Self {
        Self {
            config,
            store,
            storage,
            navigator,
            status: Mutex::new(InitiatorStatus::Idle),
        }
    }

    #[must_use]
    pub fn status(&self) -> InitiatorStatus {
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Authorization request URL for a given state and redirect URI.
    #[must_use]
    pub fn authorization_url(&self, state: &str, redirect_uri: &Url) -> Url {
        let mut url = self.config.auth_url.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("scope", &self.config.scope)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", redirect_uri.as_str())
            .append_pair("state", state);
        url
    }

    /// Mint and persist a fresh state, then send the whole page to the
    /// authorization server.
    ///
    /// Any earlier unconsumed attempt in the same storage is superseded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotSignedIn`] without navigating unless a session is
    /// present, and [`Error::Storage`] / [`Error::Config`] if the attempt cannot
    /// be prepared.
    pub fn begin(&self) -> Result<(), Error> {
        if self.status() == InitiatorStatus::Connecting {
            tracing::debug!("Link already in progress");
            return Ok(());
        }

        if self.store.current().session().is_none() {
            tracing::warn!("Link requested without a session");
            self.set_status(InitiatorStatus::Failed(
                "Please sign in before connecting with Alexa.".into(),
            ));
            return Err(Error::NotSignedIn);
        }

        let url = self.prepare().inspect_err(|e| {
            tracing::error!(error = %e, "Could not start account link");
            self.set_status(InitiatorStatus::Failed(
                "Failed to connect with Alexa. Please try again.".into(),
            ));
        })?;

        self.set_status(InitiatorStatus::Connecting);
        tracing::info!(auth_url = %self.config.auth_url, "Redirecting to third-party authorization");
        self.navigator.assign(&url);
        Ok(())
    }

    fn prepare(&self) -> Result<Url, Error> {
        let redirect_uri = self.config.redirect_uri(&self.navigator.location())?;
        let attempt = LinkAttempt::new(generate_state());
        save_attempt(self.storage.as_ref(), &self.config.storage_key, &attempt)?;
        Ok(self.authorization_url(&attempt.state, &redirect_uri))
    }

    fn set_status(&self, status: InitiatorStatus) {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = status;
    }
}
