use std::sync::Arc;

use url::Url;

use crate::config::LinkConfig;
use crate::session::SessionStore;

/// Shared state for the link page handlers.
pub(super) struct ShellState<S, E> {
    pub(super) config: Arc<LinkConfig>,
    /// Scheme, host and port only.
    pub(super) origin: Arc<Url>,
    pub(super) store: SessionStore,
    pub(super) storage: Arc<S>,
    pub(super) exchange: Arc<E>,
}

// Manual Clone: avoid derive adding `S: Clone, E: Clone` bounds.
impl<S, E> Clone for ShellState<S, E> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            origin: Arc::clone(&self.origin),
            store: self.store.clone(),
            storage: Arc::clone(&self.storage),
            exchange: Arc::clone(&self.exchange),
        }
    }
}
