//! Third-party account linking over the authorization-code grant.
//!
//! [`LinkInitiator`] mints a CSRF state, stores it in [`StateStorage`] and
//! sends the page away. When the authorization server redirects back,
//! [`LinkCallbackHandler`] consumes that state, checks it and hands the code to
//! the backend through an [`ExchangeClient`].

mod callback;
pub(crate) mod exchange;
mod initiator;
pub(crate) mod state_token;
pub(crate) mod storage;

pub use callback::{CallbackParams, FailureReason, LinkCallbackHandler, LinkResult};
#[cfg(feature = "http")]
pub use exchange::HttpExchangeClient;
pub use exchange::{
    DEFAULT_REJECTION, ExchangeClient, ExchangeOutcome, LinkAccountRequest, LinkAccountResponse,
};
pub use initiator::{InitiatorStatus, LinkInitiator};
pub use state_token::{generate_state, states_match};
pub use storage::{LinkAttempt, MemoryStorage, StateStorage};
