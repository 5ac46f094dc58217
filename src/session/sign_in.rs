use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use super::provider::{IdentityProvider, Session};
use super::store::{SessionEvent, SessionStore, Subscription};
use crate::error::Error;
use crate::navigator::Navigator;

/// First-party sign-in: popup with redirect fallback, plus the redirect drain.
///
/// The popup result, the redirect drain and the provider's own listener may all
/// observe the same sign-in. They all write through the store, which only
/// notifies on real transitions, so whoever lands first wins and the rest are
/// no-ops.
pub struct SignInFlow<P> {
    store: SessionStore,
    provider: Arc<P>,
    drained: AtomicBool,
    error: Mutex<Option<String>>,
}

impl<P: IdentityProvider> SignInFlow<P> {
    #[must_use]
    pub fn new(store: SessionStore, provider: Arc<P>) -> Self {
        Self {
            store,
            provider,
            drained: AtomicBool::new(false),
            error: Mutex::new(None),
        }
    }

    /// Leave the sign-in screen for `home_route` whenever a session appears.
    ///
    /// Fires immediately if a session is already present. Hold the returned
    /// subscription for as long as the sign-in screen is shown.
    pub fn watch_for_sign_in<N: Navigator>(
        &self,
        navigator: Arc<N>,
        home_route: impl Into<String>,
    ) -> Subscription {
        let home_route = home_route.into();
        self.store.subscribe(move |state| {
            if state.session().is_some() {
                navigator.replace(&home_route);
            }
        })
    }

    /// Drain an outstanding redirect sign-in. Call once per page load, before
    /// any gate decision.
    ///
    /// A failed drain still counts as drained, so the store can settle.
    ///
    /// # Errors
    ///
    /// Returns the provider's error; it is also kept for [`last_error`](Self::last_error).
    pub async fn resolve_pending_redirect(&self) -> Result<Option<Session>, Error> {
        if self.drained.swap(true, Ordering::AcqRel) {
            tracing::debug!("Redirect result already drained for this page load");
            return Ok(None);
        }

        match self.provider.redirect_result().await {
            Ok(user) => {
                if let Some(session) = &user {
                    tracing::info!(uid = %session.uid(), "Redirect sign-in completed");
                }
                self.store.apply(SessionEvent::Redirect(user.clone()));
                Ok(user)
            }
            Err(e) => {
                tracing::error!(error = %e, "Redirect sign-in failed");
                self.store.apply(SessionEvent::Redirect(None));
                self.record(&e);
                Err(e)
            }
        }
    }

    /// Start an interactive sign-in.
    ///
    /// `Ok(None)` is not a failure: the provider chose to navigate the whole
    /// page away and the result will come back through the redirect drain.
    ///
    /// # Errors
    ///
    /// Returns the provider's error; it is also kept for [`last_error`](Self::last_error).
    pub async fn begin_interactive(&self) -> Result<Option<Session>, Error> {
        self.clear_error();

        match self.provider.sign_in_interactive().await {
            Ok(Some(session)) => {
                tracing::info!(uid = %session.uid(), "Popup sign-in completed");
                self.store.apply(SessionEvent::SignedIn(session.clone()));
                Ok(Some(session))
            }
            Ok(None) => {
                tracing::info!("Sign-in continues by redirect");
                Ok(None)
            }
            Err(e) => {
                tracing::error!(error = %e, "Popup sign-in failed");
                self.record(&e);
                Err(e)
            }
        }
    }

    /// # Errors
    ///
    /// Returns the provider's error; the store is left untouched in that case.
    pub async fn sign_out(&self) -> Result<(), Error> {
        self.provider.sign_out().await?;
        self.store.apply(SessionEvent::SignedOut);
        tracing::info!("Signed out");
        Ok(())
    }

    /// User-facing text of the last sign-in failure, if any.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, e: &Error) {
        let message = format!("Failed to sign in. Please try again. Error: {e}");
        *self.error.lock().unwrap_or_else(PoisonError::into_inner) = Some(message);
    }

    fn clear_error(&self) {
        *self.error.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
