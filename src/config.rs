use std::time::Duration;

use url::Url;

use crate::error::Error;

/// Account-linking configuration.
///
/// The client id is the only required value, so it is the constructor argument.
///
/// ```rust,ignore
/// use elefit_accounts::LinkConfig;
///
/// let config = LinkConfig::new("elefit-alexa-client")
///     .with_api_base("https://api.elefit.app".parse()?);
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct LinkConfig {
    pub(crate) client_id: String,
    pub(crate) auth_url: Url,
    pub(crate) scope: String,
    pub(crate) callback_path: String,
    pub(crate) api_base: Option<Url>,
    pub(crate) public_origin: Option<Url>,
    pub(crate) exchange_path: String,
    pub(crate) sign_in_route: String,
    pub(crate) home_route: String,
    pub(crate) storage_key: String,
    pub(crate) success_delay: Duration,
    pub(crate) attempt_ttl: Duration,
    pub(crate) exchange_timeout: Duration,
}

impl LinkConfig {
    /// Create a new link configuration for the given third-party client id.
    #[must_use]
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            auth_url: "https://www.amazon.com/ap/oa"
                .parse()
                .expect("valid default URL"),
            scope: "profile".into(),
            callback_path: "/alexa-auth-callback".into(),
            api_base: None,
            public_origin: None,
            exchange_path: "/api/alexa/link-account".into(),
            sign_in_route: "/login".into(),
            home_route: "/".into(),
            storage_key: "alexaAuthState".into(),
            success_delay: Duration::from_secs(3),
            attempt_ttl: Duration::from_secs(600),
            exchange_timeout: Duration::from_secs(15),
        }
    }

    /// Create config from environment variables.
    ///
    /// # Required env vars
    /// - `ELEFIT_LINK_CLIENT_ID`: third-party client id
    ///
    /// # Optional env vars
    /// - `ELEFIT_LINK_AUTH_URL`: authorization endpoint
    /// - `ELEFIT_LINK_SCOPE`: requested scope
    /// - `ELEFIT_LINK_CALLBACK_PATH`: own callback route
    /// - `ELEFIT_API_BASE`: backend origin (defaults to the live page origin)
    /// - `ELEFIT_PUBLIC_ORIGIN`: origin the loopback pages are served from
    /// - `ELEFIT_LINK_EXCHANGE_PATH`: backend exchange route
    /// - `ELEFIT_SIGN_IN_ROUTE`, `ELEFIT_HOME_ROUTE`: navigation targets
    /// - `ELEFIT_LINK_SUCCESS_DELAY_MS`, `ELEFIT_LINK_ATTEMPT_TTL_SECS`,
    ///   `ELEFIT_EXCHANGE_TIMEOUT_SECS`: timing
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the client id is missing or a value does not parse.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let client_id = lookup("ELEFIT_LINK_CLIENT_ID")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| Error::Config("ELEFIT_LINK_CLIENT_ID is required".into()))?;

        let mut config = Self::new(client_id);

        if let Some(url) = lookup("ELEFIT_LINK_AUTH_URL") {
            config = config.with_auth_url(parse_url("ELEFIT_LINK_AUTH_URL", &url)?);
        }
        if let Some(scope) = lookup("ELEFIT_LINK_SCOPE") {
            config = config.with_scope(scope);
        }
        if let Some(path) = lookup("ELEFIT_LINK_CALLBACK_PATH") {
            config = config.with_callback_path(parse_route("ELEFIT_LINK_CALLBACK_PATH", path)?);
        }
        if let Some(url) = lookup("ELEFIT_API_BASE") {
            config = config.with_api_base(parse_url("ELEFIT_API_BASE", &url)?);
        }
        if let Some(url) = lookup("ELEFIT_PUBLIC_ORIGIN") {
            config = config.with_public_origin(parse_url("ELEFIT_PUBLIC_ORIGIN", &url)?);
        }
        if let Some(path) = lookup("ELEFIT_LINK_EXCHANGE_PATH") {
            config = config.with_exchange_path(parse_route("ELEFIT_LINK_EXCHANGE_PATH", path)?);
        }
        if let Some(route) = lookup("ELEFIT_SIGN_IN_ROUTE") {
            config = config.with_sign_in_route(parse_route("ELEFIT_SIGN_IN_ROUTE", route)?);
        }
        if let Some(route) = lookup("ELEFIT_HOME_ROUTE") {
            config = config.with_home_route(parse_route("ELEFIT_HOME_ROUTE", route)?);
        }
        if let Some(ms) = lookup("ELEFIT_LINK_SUCCESS_DELAY_MS") {
            let ms = parse_u64("ELEFIT_LINK_SUCCESS_DELAY_MS", &ms)?;
            config = config.with_success_delay(Duration::from_millis(ms));
        }
        if let Some(secs) = lookup("ELEFIT_LINK_ATTEMPT_TTL_SECS") {
            let secs = parse_u64("ELEFIT_LINK_ATTEMPT_TTL_SECS", &secs)?;
            config = config.with_attempt_ttl(Duration::from_secs(secs));
        }
        if let Some(secs) = lookup("ELEFIT_EXCHANGE_TIMEOUT_SECS") {
            let secs = parse_u64("ELEFIT_EXCHANGE_TIMEOUT_SECS", &secs)?;
            config = config.with_exchange_timeout(Duration::from_secs(secs));
        }

        Ok(config)
    }

    /// Override the third-party authorization endpoint.
    #[must_use]
    pub fn with_auth_url(mut self, url: Url) -> Self {
        self.auth_url = url;
        self
    }

    /// Override the requested scope (default: `profile`).
    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    #[must_use]
    pub fn with_callback_path(mut self, path: impl Into<String>) -> Self {
        self.callback_path = path.into();
        self
    }

    /// Send the exchange call to this origin instead of the page origin.
    #[must_use]
    pub fn with_api_base(mut self, base: Url) -> Self {
        self.api_base = Some(base);
        self
    }

    /// Origin the loopback pages are served from. Only its scheme, host and
    /// port are used.
    #[must_use]
    pub fn with_public_origin(mut self, origin: Url) -> Self {
        self.public_origin = Some(origin);
        self
    }

    #[must_use]
    pub fn with_exchange_path(mut self, path: impl Into<String>) -> Self {
        self.exchange_path = path.into();
        self
    }

    #[must_use]
    pub fn with_sign_in_route(mut self, route: impl Into<String>) -> Self {
        self.sign_in_route = route.into();
        self
    }

    #[must_use]
    pub fn with_home_route(mut self, route: impl Into<String>) -> Self {
        self.home_route = route.into();
        self
    }

    #[must_use]
    pub fn with_storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = key.into();
        self
    }

    #[must_use]
    pub fn with_success_delay(mut self, delay: Duration) -> Self {
        self.success_delay = delay;
        self
    }

    #[must_use]
    pub fn with_attempt_ttl(mut self, ttl: Duration) -> Self {
        self.attempt_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_exchange_timeout(mut self, timeout: Duration) -> Self {
        self.exchange_timeout = timeout;
        self
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn auth_url(&self) -> &Url {
        &self.auth_url
    }

    #[must_use]
    pub fn public_origin(&self) -> Option<&Url> {
        self.public_origin.as_ref()
    }

    #[must_use]
    pub fn scope(&self) -> &str {
        &self.scope
    }

    #[must_use]
    pub fn callback_path(&self) -> &str {
        &self.callback_path
    }

    #[must_use]
    pub fn sign_in_route(&self) -> &str {
        &self.sign_in_route
    }

    #[must_use]
    pub fn home_route(&self) -> &str {
        &self.home_route
    }

    #[must_use]
    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }

    #[must_use]
    pub fn success_delay(&self) -> Duration {
        self.success_delay
    }

    #[must_use]
    pub fn attempt_ttl(&self) -> Duration {
        self.attempt_ttl
    }

    #[must_use]
    pub fn exchange_timeout(&self) -> Duration {
        self.exchange_timeout
    }

    /// The `redirect_uri` for the page currently at `location`.
    ///
    /// Used verbatim in both the authorization request and the exchange body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the callback path cannot be joined onto the location.
    pub fn redirect_uri(&self, location: &Url) -> Result<Url, Error> {
        location
            .join(&self.callback_path)
            .map_err(|e| Error::Config(format!("callback path: {e}")))
    }

    /// Backend exchange endpoint, relative to `api_base` or else the live page origin.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the exchange path cannot be joined onto the base.
    pub fn exchange_endpoint(&self, location: &Url) -> Result<Url, Error> {
        self.api_base
            .as_ref()
            .unwrap_or(location)
            .join(&self.exchange_path)
            .map_err(|e| Error::Config(format!("exchange path: {e}")))
    }
}

fn parse_url(var: &str, value: &str) -> Result<Url, Error> {
    value
        .parse()
        .map_err(|e| Error::Config(format!("{var}: {e}")))
}

fn parse_route(var: &str, value: String) -> Result<String, Error> {
    if value.starts_with('/') {
        Ok(value)
    } else {
        Err(Error::Config(format!("{var}: must start with '/'")))
    }
}

fn parse_u64(var: &str, value: &str) -> Result<u64, Error> {
    value
        .trim()
        .parse()
        .map_err(|e| Error::Config(format!("{var}: {e}")))
}
