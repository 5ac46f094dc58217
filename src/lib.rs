#![doc = include_str!("../README.md")]

pub mod config;
pub mod error;
pub mod gate;
pub mod link;
pub mod navigator;
pub mod session;
#[cfg(feature = "shell")]
pub mod shell;
pub mod types;

#[cfg(test)]
mod test_support;

// Re-exports for convenient access
pub use config::LinkConfig;
pub use error::Error;
pub use gate::{AuthGate, GateVerdict};
#[cfg(feature = "http")]
pub use link::HttpExchangeClient;
pub use link::{
    CallbackParams, ExchangeClient, ExchangeOutcome, FailureReason, InitiatorStatus,
    LinkCallbackHandler, LinkInitiator, LinkResult, MemoryStorage, StateStorage,
};
pub use navigator::Navigator;
pub use session::{
    IdentityProvider, ProviderFeed, Session, SessionState, SessionStore, SignInFlow, Subscription,
    TokenSource,
};
pub use types::{IdToken, Profile, Uid};
