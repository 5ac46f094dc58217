use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use super::provider::Session;
use crate::error::Error;
use crate::types::IdToken;

/// What the store currently knows about the user.
#[derive(Debug, Clone)]
pub enum SessionState {
    /// Resolution in progress. Not the same as [`Absent`](Self::Absent).
    Loading,
    Present(Session),
    Absent,
}

impl SessionState {
    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        match self {
            Self::Present(session) => Some(session),
            Self::Loading | Self::Absent => None,
        }
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    fn same_as(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Loading, Self::Loading) | (Self::Absent, Self::Absent) => true,
            (Self::Present(a), Self::Present(b)) => a.same_identity(b),
            _ => false,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Loading => "loading",
            Self::Present(_) => "present",
            Self::Absent => "absent",
        }
    }
}

/// One observation fed into the store by a producer.
pub(crate) enum SessionEvent {
    /// The identity provider's ambient auth-state listener fired.
    Provider(Option<Session>),
    /// The page-load redirect drain finished (`None` also covers a failed drain).
    Redirect(Option<Session>),
    /// An interactive popup sign-in completed.
    SignedIn(Session),
    SignedOut,
}

#[derive(Default)]
struct Resolution {
    session: Option<Session>,
    provider_settled: bool,
    redirect_drained: bool,
}

impl Resolution {
    fn visible(&self) -> SessionState {
        match &self.session {
            Some(session) => SessionState::Present(session.clone()),
            // A returning user may still be about to appear from the redirect drain.
            None if self.provider_settled && self.redirect_drained => SessionState::Absent,
            None => SessionState::Loading,
        }
    }

    fn install(&mut self, session: Session) {
        let unchanged = self
            .session
            .as_ref()
            .is_some_and(|current| current.same_identity(&session));
        if !unchanged {
            self.session = Some(session);
        }
    }

    fn apply(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Provider(user) => {
                self.provider_settled = true;
                match user {
                    Some(session) => self.install(session),
                    None => self.session = None,
                }
            }
            SessionEvent::Redirect(user) => {
                self.redirect_drained = true;
                if let Some(session) = user {
                    self.install(session);
                }
            }
            SessionEvent::SignedIn(session) => self.install(session),
            SessionEvent::SignedOut => {
                self.session = None;
                self.provider_settled = true;
                self.redirect_drained = true;
            }
        }
    }
}

type Listener = Arc<dyn Fn(&SessionState) + Send + Sync>;

struct Registered {
    id: u64,
    // Only deliveries queued after registration reach this listener.
    since: u64,
    listener: Listener,
}

struct Delivery {
    seq: u64,
    // `Some` for the initial state handed to one new subscriber.
    target: Option<u64>,
    state: SessionState,
}

#[derive(Default)]
struct Outbox {
    queue: VecDeque<Delivery>,
    next_seq: u64,
}

impl Outbox {
    fn push(&mut self, target: Option<u64>, state: SessionState) -> u64 {
        self.next_seq += 1;
        let seq = self.next_seq;
        self.queue.push_back(Delivery { seq, target, state });
        seq
    }
}

struct Inner {
    resolution: Mutex<Resolution>,
    listeners: Mutex<Vec<Registered>>,
    outbox: Mutex<Outbox>,
    // Held by the thread delivering notifications, for the whole drain.
    writer: Mutex<()>,
    next_listener: AtomicU64,
    feed_taken: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

thread_local! {
    // Stores whose listeners are running on this thread right now.
    static DELIVERING: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

/// Marks a store as delivering on the current thread until dropped.
struct DeliveryMark(usize);

impl DeliveryMark {
    fn enter(key: usize) -> Self {
        DELIVERING.with(|stores| stores.borrow_mut().push(key));
        Self(key)
    }

    fn is_active(key: usize) -> bool {
        DELIVERING.with(|stores| stores.borrow().contains(&key))
    }
}

impl Drop for DeliveryMark {
    fn drop(&mut self) {
        DELIVERING.with(|stores| {
            let mut stores = stores.borrow_mut();
            if let Some(pos) = stores.iter().rposition(|k| *k == self.0) {
                stores.remove(pos);
            }
        });
    }
}

/// Process-wide holder of the signed-in identity.
///
/// Cloning yields another handle to the same store. All writes are serialized
/// and every subscriber sees transitions in the order they happened.
///
/// Listeners may read, subscribe and write. Anything they trigger on the same
/// store is queued and delivered once the current notification round is
/// finished, still in order.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Inner>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    /// A fresh store, in [`SessionState::Loading`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                resolution: Mutex::new(Resolution::default()),
                listeners: Mutex::new(Vec::new()),
                outbox: Mutex::new(Outbox::default()),
                writer: Mutex::new(()),
                next_listener: AtomicU64::new(0),
                feed_taken: AtomicBool::new(false),
            }),
        }
    }

    #[must_use]
    pub fn current(&self) -> SessionState {
        lock(&self.inner.resolution).visible()
    }

    /// Register a listener.
    ///
    /// It is called with the current state, then on every transition until the
    /// returned [`Subscription`] is dropped. From outside a listener the first
    /// call happens before `subscribe` returns; from inside one it happens right
    /// after the running notification round.
    pub fn subscribe(
        &self,
        listener: impl Fn(&SessionState) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
        let listener: Listener = Arc::new(listener);

        self.write(|inner| {
            let resolution = lock(&inner.resolution);
            let since = lock(&inner.outbox).push(Some(id), resolution.visible());
            lock(&inner.listeners).push(Registered {
                id,
                since,
                listener,
            });
        });

        Subscription {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Hand out the single writer slot for the identity provider's listener.
    ///
    /// Returns `None` once the feed has been taken.
    #[must_use]
    pub fn provider_feed(&self) -> Option<ProviderFeed> {
        if self.inner.feed_taken.swap(true, Ordering::AcqRel) {
            tracing::warn!("Identity provider listener already installed");
            return None;
        }
        Some(ProviderFeed {
            store: self.clone(),
        })
    }

    /// Mint a bearer token for the current session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotSignedIn`] unless a session is present, otherwise
    /// whatever the session's token source reports.
    pub async fn mint_bearer_token(&self, force_refresh: bool) -> Result<IdToken, Error> {
        let session = self
            .current()
            .session()
            .cloned()
            .ok_or(Error::NotSignedIn)?;
        session.id_token(force_refresh).await
    }

    /// Feed one observation in. Returns whether the visible state changed.
    pub(crate) fn apply(&self, event: SessionEvent) -> bool {
        self.write(|inner| {
            let mut resolution = lock(&inner.resolution);
            let before = resolution.visible();
            resolution.apply(event);
            let after = resolution.visible();

            if before.same_as(&after) {
                tracing::debug!(state = after.label(), "Session observation was a no-op");
                return false;
            }

            tracing::debug!(from = before.label(), to = after.label(), "Session transition");
            lock(&inner.outbox).push(None, after);
            true
        })
    }

    fn key(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }

    /// Run `mutate` as the single writer, then deliver what it queued.
    ///
    /// Re-entered from a listener, the writer is already this thread, so the
    /// mutation runs at once and delivery is left to the outer drain.
    fn write<T>(&self, mutate: impl FnOnce(&Inner) -> T) -> T {
        if DeliveryMark::is_active(self.key()) {
            return mutate(&self.inner);
        }

        let _writer = lock(&self.inner.writer);
        let out = mutate(&self.inner);
        let _mark = DeliveryMark::enter(self.key());
        self.drain();
        out
    }

    fn drain(&self) {
        loop {
            let Some(delivery) = lock(&self.inner.outbox).queue.pop_front() else {
                return;
            };

            let recipients: Vec<Listener> = lock(&self.inner.listeners)
                .iter()
                .filter(|r| match delivery.target {
                    Some(id) => r.id == id,
                    None => r.since < delivery.seq,
                })
                .map(|r| Arc::clone(&r.listener))
                .collect();
            for listener in recipients {
                listener(&delivery.state);
            }
        }
    }
}

/// Keeps a listener registered. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    inner: Weak<Inner>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            lock(&inner.listeners).retain(|r| r.id != self.id);
        }
    }
}

/// Writer handle for the identity provider's auth-state listener.
///
/// Wire the provider's "auth state changed" callback to [`report`](Self::report).
pub struct ProviderFeed {
    store: SessionStore,
}

impl ProviderFeed {
    pub fn report(&self, user: Option<Session>) {
        self.store.apply(SessionEvent::Provider(user));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{StaticTokens, session};

    fn recorder(store: &SessionStore) -> (Arc<Mutex<Vec<&'static str>>>, Subscription) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let subscription = store.subscribe(move |state| sink.lock().unwrap().push(state.label()));
        (seen, subscription)
    }

    #[test]
    fn test_starts_loading() {
        let store = SessionStore::new();
        assert!(store.current().is_loading());
    }

    #[test]
    fn test_absent_requires_provider_and_redirect_drain() {
        let store = SessionStore::new();
        let feed = store.provider_feed().unwrap();

        feed.report(None);
        assert!(store.current().is_loading(), "drain still pending");

        store.apply(SessionEvent::Redirect(None));
        assert!(matches!(store.current(), SessionState::Absent));
    }

    #[test]
    fn test_absent_after_drain_then_provider() {
        let store = SessionStore::new();
        let feed = store.provider_feed().unwrap();

        store.apply(SessionEvent::Redirect(None));
        assert!(store.current().is_loading(), "provider not settled");

        feed.report(None);
        assert!(matches!(store.current(), SessionState::Absent));
    }

    #[test]
    fn test_redirect_first_then_provider_converges_once() {
        let store = SessionStore::new();
        let feed = store.provider_feed().unwrap();
        let (seen, _sub) = recorder(&store);

        assert!(store.apply(SessionEvent::Redirect(Some(session("u1").0))));
        feed.report(Some(session("u1").0));

        assert_eq!(*seen.lock().unwrap(), vec!["loading", "present"]);
        assert_eq!(store.current().session().unwrap().uid().as_str(), "u1");
    }

    #[test]
    fn test_provider_first_then_redirect_converges_once() {
        let store = SessionStore::new();
        let feed = store.provider_feed().unwrap();
        let (seen, _sub) = recorder(&store);

        feed.report(Some(session("u1").0));
        assert!(!store.apply(SessionEvent::Redirect(Some(session("u1").0))));

        assert_eq!(*seen.lock().unwrap(), vec!["loading", "present"]);
    }

    #[test]
    fn test_different_user_replaces_session() {
        let store = SessionStore::new();
        store.apply(SessionEvent::SignedIn(session("u1").0));
        assert!(store.apply(SessionEvent::SignedIn(session("u2").0)));
        assert_eq!(store.current().session().unwrap().uid().as_str(), "u2");
    }

    #[test]
    fn test_sign_out_is_absent_immediately() {
        let store = SessionStore::new();
        store.apply(SessionEvent::SignedIn(session("u1").0));
        store.apply(SessionEvent::SignedOut);
        assert!(matches!(store.current(), SessionState::Absent));
    }

    #[test]
    fn test_subscribe_delivers_current_then_changes_in_order() {
        let store = SessionStore::new();
        let feed = store.provider_feed().unwrap();
        store.apply(SessionEvent::Redirect(None));

        let (first, _a) = recorder(&store);
        feed.report(None);
        let (second, _b) = recorder(&store);
        feed.report(Some(session("u1").0));
        feed.report(None);

        assert_eq!(
            *first.lock().unwrap(),
            vec!["loading", "absent", "present", "absent"]
        );
        assert_eq!(*second.lock().unwrap(), vec!["absent", "present", "absent"]);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let store = SessionStore::new();
        let (seen, subscription) = recorder(&store);
        subscription.unsubscribe();

        store.apply(SessionEvent::SignedIn(session("u1").0));
        assert_eq!(*seen.lock().unwrap(), vec!["loading"]);
    }

    #[test]
    fn test_listener_may_read_store() {
        let store = SessionStore::new();
        let reader = store.clone();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = store.subscribe(move |_| sink.lock().unwrap().push(reader.current().label()));

        store.apply(SessionEvent::SignedIn(session("u1").0));
        assert_eq!(*seen.lock().unwrap(), vec!["loading", "present"]);
    }

    #[test]
    fn test_listener_may_subscribe() {
        let (done_tx, done_rx) = std::sync::mpsc::channel();

        std::thread::spawn(move || {
            let store = SessionStore::new();
            let nested = Arc::new(Mutex::new(Vec::new()));
            let held = Arc::new(Mutex::new(Vec::new()));

            let _outer = {
                let store = store.clone();
                let nested = Arc::clone(&nested);
                let held = Arc::clone(&held);
                store.clone().subscribe(move |state| {
                    if state.session().is_some() {
                        let sink = Arc::clone(&nested);
                        let inner = store.subscribe(move |s| sink.lock().unwrap().push(s.label()));
                        held.lock().unwrap().push(inner);
                    }
                })
            };

            store.apply(SessionEvent::SignedIn(session("u1").0));
            store.apply(SessionEvent::SignedOut);
            let seen = nested.lock().unwrap().clone();
            done_tx.send(seen).unwrap();
        });

        let seen = done_rx
            .recv_timeout(std::time::Duration::from_secs(5))
            .expect("subscribing from a listener must not block");
        assert_eq!(seen, vec!["present", "absent"]);
    }

    #[test]
    fn test_listener_write_is_delivered_after_current_round() {
        let store = SessionStore::new();
        let writer = store.clone();
        let _sign_out_on_present = store.subscribe(move |state| {
            if state.session().is_some() {
                writer.apply(SessionEvent::SignedOut);
            }
        });
        let (seen, _sub) = recorder(&store);

        store.apply(SessionEvent::SignedIn(session("u1").0));

        assert_eq!(*seen.lock().unwrap(), vec!["loading", "present", "absent"]);
        assert!(matches!(store.current(), SessionState::Absent));
    }

    #[test]
    fn test_provider_feed_taken_once() {
        let store = SessionStore::new();
        assert!(store.provider_feed().is_some());
        assert!(store.provider_feed().is_none());
        assert!(store.clone().provider_feed().is_none());
    }

    #[tokio::test]
    async fn test_mint_requires_session() {
        let store = SessionStore::new();
        let err = store.mint_bearer_token(true).await.unwrap_err();
        assert!(matches!(err, Error::NotSignedIn));

        store.apply(SessionEvent::Redirect(None));
        store.apply(SessionEvent::Provider(None));
        let err = store.mint_bearer_token(false).await.unwrap_err();
        assert!(matches!(err, Error::NotSignedIn));
    }

    #[tokio::test]
    async fn test_mint_forwards_force_refresh() {
        let store = SessionStore::new();
        let tokens = StaticTokens::new("tok-1");
        let calls = tokens.calls();
        store.apply(SessionEvent::SignedIn(Session::new(
            crate::types::Profile::new("u1"),
            tokens,
        )));

        let token = store.mint_bearer_token(true).await.unwrap();
        assert_eq!(token.expose(), "tok-1");
        assert_eq!(*calls.lock().unwrap(), vec![true]);
    }
}
