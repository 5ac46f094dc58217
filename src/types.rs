use derive_more::{Display, From, Into};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

/// Opaque first-party user identifier issued by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct Uid(pub String);

impl Uid {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Uid {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Short-lived bearer token minted from a live session.
///
/// Never printed: `Debug` is redacted and there is no `Display`.
pub struct IdToken(SecretString);

impl IdToken {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::from(token.into()))
    }

    /// Raw token value, for the `Authorization` header only.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for IdToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("IdToken([REDACTED])")
    }
}

/// Public profile of the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct Profile {
    pub uid: Uid,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
}

impl Profile {
    /// Create a profile with only the required `uid`.
    #[must_use]
    pub fn new(uid: impl Into<Uid>) -> Self {
        Self {
            uid: uid.into(),
            display_name: None,
            email: None,
            photo_url: None,
        }
    }

    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    #[must_use]
    pub fn with_photo_url(mut self, url: impl Into<String>) -> Self {
        self.photo_url = Some(url.into());
        self
    }

    /// Label for "Signed in as ...": display name, then email, then uid.
    #[must_use]
    pub fn display_label(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| self.email.as_deref().filter(|s| !s.is_empty()))
            .unwrap_or_else(|| self.uid.as_str())
    }

    #[must_use]
    pub fn avatar_url<'a>(&'a self, default: &'a str) -> &'a str {
        self.photo_url
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_label_prefers_display_name() {
        let profile = Profile::new("u1")
            .with_display_name("Ada")
            .with_email("ada@example.com");
        assert_eq!(profile.display_label(), "Ada");
    }

    #[test]
    fn test_display_label_falls_back_to_email_then_uid() {
        let profile = Profile::new("u1").with_email("ada@example.com");
        assert_eq!(profile.display_label(), "ada@example.com");

        let profile = Profile::new("u1").with_display_name("");
        assert_eq!(profile.display_label(), "u1");
    }

    #[test]
    fn test_avatar_url_default() {
        let profile = Profile::new("u1");
        assert_eq!(profile.avatar_url("/default-avatar.png"), "/default-avatar.png");

        let profile = profile.with_photo_url("https://cdn.example.com/a.png");
        assert_eq!(
            profile.avatar_url("/default-avatar.png"),
            "https://cdn.example.com/a.png"
        );
    }

    #[test]
    fn test_id_token_debug_is_redacted() {
        let token = IdToken::new("super-secret");
        let printed = format!("{token:?}");
        assert!(!printed.contains("super-secret"));
        assert_eq!(token.expose(), "super-secret");
    }

    #[test]
    fn test_uid_serde_transparent() {
        let uid = Uid::from("abc");
        let json = serde_json::to_string(&uid).unwrap();
        assert_eq!(json, "\"abc\"");
    }
}
