#![cfg(feature = "http")]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use elefit_accounts::link::{DEFAULT_REJECTION, LinkAccountRequest};
use elefit_accounts::{
    Error, ExchangeClient, ExchangeOutcome, HttpExchangeClient, IdToken, LinkCallbackHandler,
    LinkConfig, LinkInitiator, LinkResult, MemoryStorage, Navigator, Profile, Session,
    SessionStore, TokenSource,
};
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const EXCHANGE_PATH: &str = "/api/alexa/link-account";

fn request() -> LinkAccountRequest {
    LinkAccountRequest {
        code: "XYZ".into(),
        redirect_uri: "https://app.elefit.test/alexa-auth-callback".into(),
    }
}

fn endpoint(server: &MockServer) -> Url {
    Url::parse(&format!("{}{EXCHANGE_PATH}", server.uri())).unwrap()
}

fn client() -> HttpExchangeClient {
    HttpExchangeClient::new(&LinkConfig::new("elefit-alexa-client")).unwrap()
}

#[tokio::test]
async fn test_link_account_success() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(EXCHANGE_PATH))
        .and(header("Authorization", "Bearer token-123"))
        .and(body_json(json!({
            "code": "XYZ",
            "redirect_uri": "https://app.elefit.test/alexa-auth-callback"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = client()
        .link_account(&endpoint(&server), &IdToken::new("token-123"), &request())
        .await
        .unwrap();

    assert_eq!(outcome, ExchangeOutcome::Linked);
}

#[tokio::test]
async fn test_link_account_rejected_with_message() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(EXCHANGE_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "success": false,
            "message": "Authorization code expired"
        })))
        .mount(&server)
        .await;

    let outcome = client()
        .link_account(&endpoint(&server), &IdToken::new("token-123"), &request())
        .await
        .unwrap();

    assert_eq!(
        outcome,
        ExchangeOutcome::Rejected {
            message: "Authorization code expired".into()
        }
    );
}

#[tokio::test]
async fn test_link_account_rejected_without_message() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(EXCHANGE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": false })))
        .mount(&server)
        .await;

    let outcome = client()
        .link_account(&endpoint(&server), &IdToken::new("token-123"), &request())
        .await
        .unwrap();

    assert_eq!(
        outcome,
        ExchangeOutcome::Rejected {
            message: DEFAULT_REJECTION.into()
        }
    );
}

#[tokio::test]
async fn test_link_account_unreadable_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(EXCHANGE_PATH))
        .respond_with(ResponseTemplate::new(502).set_body_string("<html>Bad Gateway</html>"))
        .mount(&server)
        .await;

    let result = client()
        .link_account(&endpoint(&server), &IdToken::new("token-123"), &request())
        .await;

    assert!(matches!(result, Err(Error::Exchange(_))));
}

#[tokio::test]
async fn test_link_account_success_body_on_error_status() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(EXCHANGE_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "success": true })))
        .mount(&server)
        .await;

    let result = client()
        .link_account(&endpoint(&server), &IdToken::new("token-123"), &request())
        .await;

    assert!(matches!(result, Err(Error::Exchange(_))));
}

#[tokio::test]
async fn test_link_account_times_out() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(EXCHANGE_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "success": true }))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let config =
        LinkConfig::new("elefit-alexa-client").with_exchange_timeout(Duration::from_millis(200));
    let result = HttpExchangeClient::new(&config)
        .unwrap()
        .link_account(&endpoint(&server), &IdToken::new("token-123"), &request())
        .await;

    assert!(matches!(result, Err(Error::Http(_))));
}

// ── Full round trip ────────────────────────────────────────────────

struct FixedToken;

impl TokenSource for FixedToken {
    async fn id_token(&self, _force_refresh: bool) -> Result<IdToken, Error> {
        Ok(IdToken::new("token-for-u1"))
    }
}

struct PageNavigator {
    location: Mutex<Url>,
    assigned: Mutex<Option<Url>>,
}

impl PageNavigator {
    fn at(location: &str) -> Arc<Self> {
        Arc::new(Self {
            location: Mutex::new(location.parse().unwrap()),
            assigned: Mutex::new(None),
        })
    }

    fn load(&self, location: Url) {
        *self.location.lock().unwrap() = location;
    }
}

impl Navigator for PageNavigator {
    fn location(&self) -> Url {
        self.location.lock().unwrap().clone()
    }

    fn assign(&self, url: &Url) {
        *self.assigned.lock().unwrap() = Some(url.clone());
    }

    fn push(&self, _route: &str) {}

    fn replace(&self, _route: &str) {}
}

#[tokio::test]
async fn test_connect_then_callback_against_backend() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(EXCHANGE_PATH))
        .and(header("Authorization", "Bearer token-for-u1"))
        .and(body_json(json!({
            "code": "XYZ",
            "redirect_uri": "https://app.elefit.test/alexa-auth-callback"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .expect(1)
        .mount(&server)
        .await;

    let config = Arc::new(
        LinkConfig::new("elefit-alexa-client").with_api_base(server.uri().parse().unwrap()),
    );
    let store = SessionStore::new();
    store
        .provider_feed()
        .unwrap()
        .report(Some(Session::new(Profile::new("u1"), FixedToken)));
    let storage = Arc::new(MemoryStorage::new());
    let navigator = PageNavigator::at("https://app.elefit.test/alexa-connect");

    LinkInitiator::new(
        Arc::clone(&config),
        store.clone(),
        Arc::clone(&storage),
        Arc::clone(&navigator),
    )
    .begin()
    .unwrap();

    let authorize = navigator.assigned.lock().unwrap().clone().unwrap();
    let state = authorize
        .query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
        .unwrap();

    // The authorization server sends the browser back.
    navigator.load(
        format!("https://app.elefit.test/alexa-auth-callback?code=XYZ&state={state}")
            .parse()
            .unwrap(),
    );
    let exchange = Arc::new(HttpExchangeClient::new(&config).unwrap());
    let handler = LinkCallbackHandler::new(config, store, storage, exchange, navigator);

    assert_eq!(handler.run_from_location().await, LinkResult::Succeeded);
}
