//! Loopback HTTP pages for account linking, for hosts without a browser UI.
//!
//! The host owns the [`SessionStore`](crate::session::SessionStore) and keeps
//! it fed; these routes only read it.
//!
//! Page locations come from the configured public origin. Requests whose
//! `Host` names anything else are refused, and so are connect requests a
//! browser marks as cross-site.
//!
//! ```rust,ignore
//! use elefit_accounts::shell::link_routes;
//!
//! let config = LinkConfig::from_env()?
//!     .with_public_origin("http://127.0.0.1:8765".parse()?);
//! let exchange = Arc::new(HttpExchangeClient::new(&config)?);
//! let app = axum::Router::new().merge(link_routes(
//!     config,
//!     store.clone(),
//!     Arc::new(MemoryStorage::new()),
//!     exchange,
//! )?);
//! ```

mod error;
mod navigator;
mod routes;
mod state;

pub use error::ShellError;
pub use routes::{CONNECT_PATH, link_routes};
