#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// No live session when one was required.
    #[error("Not signed in")]
    NotSignedIn,
    /// The identity provider rejected or aborted a sign-in.
    #[error("Sign-in error: {0}")]
    Provider(String),
    #[error("State storage error: {0}")]
    Storage(String),
    #[error("Configuration error: {0}")]
    Config(String),
    /// The backend answered with something other than the exchange contract.
    #[error("Exchange error: {0}")]
    Exchange(String),
    #[cfg(feature = "http")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}
