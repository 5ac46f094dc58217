use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::{
    HeaderMap, StatusCode, Uri,
    header::{ORIGIN, RETRY_AFTER},
};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::get;
use url::Url;

use super::error::ShellError;
use super::navigator::RequestNavigator;
use super::state::ShellState;
use crate::config::LinkConfig;
use crate::error::Error;
use crate::gate::{AuthGate, GateVerdict};
use crate::link::{
    ExchangeClient, FailureReason, LinkCallbackHandler, LinkInitiator, LinkResult, StateStorage,
};
use crate::session::SessionStore;

/// Path of the gated "Connect with Alexa" page.
pub const CONNECT_PATH: &str = "/alexa-connect";

/// Create the account-linking router: the gated connect page and the
/// authorization callback page.
///
/// # Errors
///
/// Returns [`Error::Config`] if `config` has no public origin or it is not an
/// `http`/`https` origin.
pub fn link_routes<S, E>(
    config: LinkConfig,
    store: SessionStore,
    storage: Arc<S>,
    exchange: Arc<E>,
) -> Result<Router, Error>
where
    S: StateStorage,
    E: ExchangeClient,
{
    let origin = serving_origin(&config)?;
    let callback_path = config.callback_path().to_string();

    let state = ShellState {
        config: Arc::new(config),
        origin: Arc::new(origin),
        store,
        storage,
        exchange,
    };

    Ok(Router::new()
        .route(CONNECT_PATH, get(connect::<S, E>))
        .route(&callback_path, get(callback::<S, E>))
        .with_state(state))
}

fn serving_origin(config: &LinkConfig) -> Result<Url, Error> {
    let configured = config.public_origin().ok_or_else(|| {
        Error::Config("a public origin is required to serve the link pages".into())
    })?;
    if !matches!(configured.scheme(), "http" | "https") {
        return Err(Error::Config(format!(
            "public origin must be http or https: {configured}"
        )));
    }
    Url::parse(&configured.origin().ascii_serialization())
        .map_err(|e| Error::Config(format!("public origin: {e}")))
}

// ── Connect ────────────────────────────────────────────────────────

async fn connect<S: StateStorage, E: ExchangeClient>(
    State(state): State<ShellState<S, E>>,
    headers: HeaderMap,
    uri: Uri,
) -> Result<Response, ShellError> {
    let navigator = Arc::new(RequestNavigator::from_request(
        &state.origin,
        &headers,
        &uri,
    )?);
    ensure_same_origin(&state.origin, &headers)?;

    let verdict = AuthGate::mount(
        &state.store,
        Arc::clone(&navigator),
        state.config.sign_in_route(),
    )
    .verdict();

    match verdict {
        GateVerdict::Pending => Ok((
            StatusCode::SERVICE_UNAVAILABLE,
            [(RETRY_AFTER, "1")],
            "Verifying authentication...",
        )
            .into_response()),
        GateVerdict::Denied => Ok(redirect_to(&navigator, state.config.sign_in_route())),
        GateVerdict::Admitted(profile) => {
            tracing::debug!(uid = %profile.uid, "Starting account link");
            let initiator = LinkInitiator::new(
                Arc::clone(&state.config),
                state.store.clone(),
                Arc::clone(&state.storage),
                Arc::clone(&navigator),
            );
            match initiator.begin() {
                Ok(()) => Ok(redirect_to(&navigator, CONNECT_PATH)),
                // Signed out between the gate check and the click.
                Err(Error::NotSignedIn) => {
                    Ok(Redirect::to(state.config.sign_in_route()).into_response())
                }
                Err(e) => Err(e.into()),
            }
        }
    }
}

// ── Callback ───────────────────────────────────────────────────────

async fn callback<S: StateStorage, E: ExchangeClient>(
    State(state): State<ShellState<S, E>>,
    headers: HeaderMap,
    uri: Uri,
) -> Result<Response, ShellError> {
    let navigator = Arc::new(RequestNavigator::from_request(
        &state.origin,
        &headers,
        &uri,
    )?);

    let handler = LinkCallbackHandler::new(
        Arc::clone(&state.config),
        state.store.clone(),
        Arc::clone(&state.storage),
        Arc::clone(&state.exchange),
        navigator,
    );
    // The delayed return home is carried by the page itself.
    let result = handler.run_from_location().await;
    handler.unmount();

    Ok(render_result(&result, &state.config))
}

// ── Helpers ────────────────────────────────────────────────────────

/// Refuse connect requests a browser reports as started by another site.
/// Requests without fetch metadata are let through.
fn ensure_same_origin(origin: &Url, headers: &HeaderMap) -> Result<(), ShellError> {
    let fetch_site = headers
        .get("sec-fetch-site")
        .and_then(|v| v.to_str().ok());
    if matches!(fetch_site, Some("cross-site" | "same-site")) {
        tracing::warn!(fetch_site = ?fetch_site, "Cross-site connect refused");
        return Err(ShellError::CrossSite);
    }

    if let Some(value) = headers.get(ORIGIN) {
        let expected = origin.origin().ascii_serialization();
        if value.to_str().ok() != Some(expected.as_str()) {
            tracing::warn!(origin = ?value, "Connect from a foreign origin refused");
            return Err(ShellError::CrossSite);
        }
    }
    Ok(())
}

fn redirect_to(navigator: &RequestNavigator, fallback: &str) -> Response {
    let target = navigator
        .take_target()
        .unwrap_or_else(|| fallback.to_string());
    Redirect::to(&target).into_response()
}

fn result_status(result: &LinkResult) -> StatusCode {
    match result {
        LinkResult::Processing => StatusCode::ACCEPTED,
        LinkResult::Succeeded => StatusCode::OK,
        LinkResult::Failed(FailureReason::NotSignedIn) => StatusCode::UNAUTHORIZED,
        LinkResult::Failed(FailureReason::NetworkError) => StatusCode::BAD_GATEWAY,
        LinkResult::Failed(FailureReason::Misconfigured) => StatusCode::INTERNAL_SERVER_ERROR,
        LinkResult::Failed(_) => StatusCode::BAD_REQUEST,
    }
}

fn render_result(result: &LinkResult, config: &LinkConfig) -> Response {
    let home = escape_html(config.home_route());
    let (refresh, actions) = match result {
        LinkResult::Succeeded => (
            format!(
                r#"<meta http-equiv="refresh" content="{}; url={home}">"#,
                config.success_delay().as_millis().div_ceil(1000)
            ),
            format!(r#"<a href="{home}">Return to Dashboard</a>"#),
        ),
        LinkResult::Failed(_) => (
            String::new(),
            format!(
                r#"<a href="{CONNECT_PATH}">Try Again</a> <a href="{home}">Return to Dashboard</a>"#
            ),
        ),
        LinkResult::Processing => (String::new(), String::new()),
    };

    let body = format!(
        "<!doctype html>\n<html><head><meta charset=\"utf-8\">{refresh}<title>Alexa Account Linking</title></head>\
         <body><h1>Alexa Account Linking</h1><p>{}</p>{actions}</body></html>",
        escape_html(&result.message())
    );

    (result_status(result), Html(body)).into_response()
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
