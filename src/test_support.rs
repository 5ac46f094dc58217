//! Shared fakes for in-crate tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;
use url::Url;

use crate::error::Error;
use crate::link::exchange::{ExchangeClient, ExchangeOutcome, LinkAccountRequest};
use crate::navigator::Navigator;
use crate::session::{IdentityProvider, Session, TokenSource};
use crate::types::{IdToken, Profile};

pub(crate) type Calls = Arc<Mutex<Vec<bool>>>;

/// Token source returning a fixed token and recording each `force_refresh` flag.
pub(crate) struct StaticTokens {
    token: String,
    calls: Calls,
    fail: bool,
}

impl StaticTokens {
    pub(crate) fn new(token: &str) -> Self {
        Self {
            token: token.to_string(),
            calls: Arc::default(),
            fail: false,
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            token: String::new(),
            calls: Arc::default(),
            fail: true,
        }
    }

    pub(crate) fn calls(&self) -> Calls {
        Arc::clone(&self.calls)
    }
}

impl TokenSource for StaticTokens {
    async fn id_token(&self, force_refresh: bool) -> Result<IdToken, Error> {
        self.calls.lock().unwrap().push(force_refresh);
        if self.fail {
            return Err(Error::Provider("token refresh failed".into()));
        }
        Ok(IdToken::new(self.token.clone()))
    }
}

pub(crate) fn session(uid: &str) -> (Session, Calls) {
    let tokens = StaticTokens::new(&format!("token-for-{uid}"));
    let calls = tokens.calls();
    let profile = Profile::new(uid).with_email(format!("{uid}@example.com"));
    (Session::new(profile, tokens), calls)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Navigation {
    Assign(String),
    Push(String),
    Replace(String),
}

pub(crate) struct RecordingNavigator {
    location: Mutex<Url>,
    events: Mutex<Vec<Navigation>>,
}

impl RecordingNavigator {
    pub(crate) fn at(location: &str) -> Arc<Self> {
        Arc::new(Self {
            location: Mutex::new(location.parse().unwrap()),
            events: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn events(&self) -> Vec<Navigation> {
        self.events.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn location(&self) -> Url {
        self.location.lock().unwrap().clone()
    }

    fn assign(&self, url: &Url) {
        self.events
            .lock()
            .unwrap()
            .push(Navigation::Assign(url.to_string()));
    }

    fn push(&self, route: &str) {
        self.events
            .lock()
            .unwrap()
            .push(Navigation::Push(route.to_string()));
    }

    fn replace(&self, route: &str) {
        self.events
            .lock()
            .unwrap()
            .push(Navigation::Replace(route.to_string()));
    }
}

/// Identity provider answering from pre-loaded scripts.
#[derive(Default)]
pub(crate) struct ScriptedProvider {
    interactive: Mutex<VecDeque<Result<Option<Session>, Error>>>,
    redirect: Mutex<VecDeque<Result<Option<Session>, Error>>>,
    pub(crate) sign_outs: AtomicUsize,
}

impl ScriptedProvider {
    pub(crate) fn with_interactive(self, result: Result<Option<Session>, Error>) -> Self {
        self.interactive.lock().unwrap().push_back(result);
        self
    }

    pub(crate) fn with_redirect(self, result: Result<Option<Session>, Error>) -> Self {
        self.redirect.lock().unwrap().push_back(result);
        self
    }
}

impl IdentityProvider for ScriptedProvider {
    async fn sign_in_interactive(&self) -> Result<Option<Session>, Error> {
        self.interactive.lock().unwrap().pop_front().unwrap_or(Ok(None))
    }

    async fn redirect_result(&self) -> Result<Option<Session>, Error> {
        self.redirect.lock().unwrap().pop_front().unwrap_or(Ok(None))
    }

    async fn sign_out(&self) -> Result<(), Error> {
        self.sign_outs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Exchange backend with a scripted answer, optionally held until released.
pub(crate) struct ScriptedExchange {
    answer: Mutex<Option<Result<ExchangeOutcome, Error>>>,
    calls: Mutex<Vec<(String, String, LinkAccountRequest)>>,
    hold: Option<Arc<Notify>>,
}

impl ScriptedExchange {
    pub(crate) fn answering(answer: Result<ExchangeOutcome, Error>) -> Arc<Self> {
        Arc::new(Self {
            answer: Mutex::new(Some(answer)),
            calls: Mutex::new(Vec::new()),
            hold: None,
        })
    }

    pub(crate) fn held(answer: Result<ExchangeOutcome, Error>, release: Arc<Notify>) -> Arc<Self> {
        Arc::new(Self {
            answer: Mutex::new(Some(answer)),
            calls: Mutex::new(Vec::new()),
            hold: Some(release),
        })
    }

    /// `(endpoint, bearer, request)` per call.
    pub(crate) fn calls(&self) -> Vec<(String, String, LinkAccountRequest)> {
        self.calls.lock().unwrap().clone()
    }
}

impl ExchangeClient for ScriptedExchange {
    async fn link_account(
        &self,
        endpoint: &Url,
        bearer: &IdToken,
        request: &LinkAccountRequest,
    ) -> Result<ExchangeOutcome, Error> {
        self.calls.lock().unwrap().push((
            endpoint.to_string(),
            bearer.expose().to_string(),
            request.clone(),
        ));
        if let Some(release) = &self.hold {
            release.notified().await;
        }
        self.answer
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| Err(Error::Exchange("answer already used".into())))
    }
}
