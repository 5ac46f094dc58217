//! First-party session: the store, the provider seam and the sign-in flow.
//!
//! ```rust,ignore
//! let store = SessionStore::new();
//! let feed = store.provider_feed().expect("first install");
//! firebase.on_auth_state_changed(move |user| feed.report(user.map(into_session)));
//!
//! let sign_in = SignInFlow::new(store.clone(), provider);
//! sign_in.resolve_pending_redirect().await.ok();
//! ```

mod provider;
mod sign_in;
mod store;

pub use provider::{IdentityProvider, Session, TokenSource};
pub use sign_in::SignInFlow;
pub use store::{ProviderFeed, SessionState, SessionStore, Subscription};
