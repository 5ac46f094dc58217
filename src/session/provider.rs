use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::Error;
use crate::types::{IdToken, Profile, Uid};

/// Mints bearer tokens for one signed-in user.
///
/// `force_refresh = true` must bypass any cached token.
pub trait TokenSource: Send + Sync + 'static {
    fn id_token(&self, force_refresh: bool)
    -> impl Future<Output = Result<IdToken, Error>> + Send;
}

/// First-party identity provider (Google sign-in behind Firebase, or a stand-in).
///
/// The provider's ambient auth-state listener is not part of this trait; it is
/// wired to the store through [`ProviderFeed`](super::ProviderFeed).
pub trait IdentityProvider: Send + Sync + 'static {
    /// Interactive sign-in.
    ///
    /// `Ok(None)` means the provider fell back to a full-page redirect; the
    /// outcome arrives later through [`redirect_result`](Self::redirect_result).
    fn sign_in_interactive(&self) -> impl Future<Output = Result<Option<Session>, Error>> + Send;

    /// Drain a completed redirect sign-in, if one is pending for this page load.
    fn redirect_result(&self) -> impl Future<Output = Result<Option<Session>, Error>> + Send;

    fn sign_out(&self) -> impl Future<Output = Result<(), Error>> + Send;
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Object-safe wrapper for TokenSource (needed for Arc<dyn>).
pub(crate) trait TokenSourceDyn: Send + Sync {
    fn id_token_dyn(&self, force_refresh: bool) -> BoxFuture<'_, Result<IdToken, Error>>;
}

impl<T: TokenSource> TokenSourceDyn for T {
    fn id_token_dyn(&self, force_refresh: bool) -> BoxFuture<'_, Result<IdToken, Error>> {
        Box::pin(self.id_token(force_refresh))
    }
}

/// The live first-party identity: a profile plus the ability to mint tokens.
#[derive(Clone)]
pub struct Session {
    profile: Profile,
    tokens: Arc<dyn TokenSourceDyn>,
}

impl Session {
    #[must_use]
    pub fn new(profile: Profile, tokens: impl TokenSource) -> Self {
        Self {
            profile,
            tokens: Arc::new(tokens),
        }
    }

    #[must_use]
    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    #[must_use]
    pub fn uid(&self) -> &Uid {
        &self.profile.uid
    }

    /// Mint a bearer token for this session.
    ///
    /// # Errors
    ///
    /// Propagates whatever the token source reports.
    pub async fn id_token(&self, force_refresh: bool) -> Result<IdToken, Error> {
        self.tokens.id_token_dyn(force_refresh).await
    }

    /// Two observations of the same sign-in.
    pub(crate) fn same_identity(&self, other: &Session) -> bool {
        self.profile == other.profile
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("profile", &self.profile)
            .finish_non_exhaustive()
    }
}
