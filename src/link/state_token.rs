use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use subtle::ConstantTimeEq;

/// Generates a cryptographically random CSRF `state` for the authorization request.
///
/// Returns a 43-character URL-safe string (32 random bytes → base64url).
#[must_use]
pub fn generate_state() -> String {
    let random_bytes: [u8; 32] = rand::rng().random();
    URL_SAFE_NO_PAD.encode(random_bytes)
}

/// Compares a stored state with the one echoed back, by content in constant time.
#[must_use]
pub fn states_match(stored: &str, received: &str) -> bool {
    stored.len() == received.len() && bool::from(stored.as_bytes().ct_eq(received.as_bytes()))
}
