use std::sync::{Arc, Mutex, PoisonError};

use crate::navigator::Navigator;
use crate::session::{SessionState, SessionStore, Subscription};
use crate::types::Profile;

/// What a protected view should render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateVerdict {
    /// Session still resolving: show a neutral waiting indicator and nothing else.
    Pending,
    /// No session: leave for the sign-in route.
    Denied,
    Admitted(Profile),
}

/// Pure gate decision for one store state.
#[must_use]
pub fn evaluate(state: &SessionState) -> GateVerdict {
    match state {
        SessionState::Loading => GateVerdict::Pending,
        SessionState::Absent => GateVerdict::Denied,
        SessionState::Present(session) => GateVerdict::Admitted(session.profile().clone()),
    }
}

/// Guard for a mounted protected view.
///
/// Re-evaluates on every store transition, so signing out while the view is
/// open revokes admission at once. Each entry into `Denied` replaces the
/// current history entry with the sign-in route, so back-navigation cannot
/// return to the gated page.
pub struct AuthGate {
    verdict: Arc<Mutex<GateVerdict>>,
    _subscription: Subscription,
}

impl AuthGate {
    pub fn mount<N: Navigator>(
        store: &SessionStore,
        navigator: Arc<N>,
        sign_in_route: impl Into<String>,
    ) -> Self {
        let sign_in_route = sign_in_route.into();
        let verdict = Arc::new(Mutex::new(GateVerdict::Pending));
        let slot = Arc::clone(&verdict);

        let subscription = store.subscribe(move |state| {
            let next = evaluate(state);
            let entering_denied = {
                let mut current = slot.lock().unwrap_or_else(PoisonError::into_inner);
                // The initial Pending placeholder never counts as a prior Denied.
                let entering = next == GateVerdict::Denied && *current != GateVerdict::Denied;
                *current = next;
                entering
            };
            if entering_denied {
                tracing::debug!(to = %sign_in_route, "Not authenticated, redirecting to sign-in");
                navigator.replace(&sign_in_route);
            }
        });

        Self {
            verdict,
            _subscription: subscription,
        }
    }

    #[must_use]
    pub fn verdict(&self) -> GateVerdict {
        self.verdict
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn is_admitted(&self) -> bool {
        matches!(self.verdict(), GateVerdict::Admitted(_))
    }
}
