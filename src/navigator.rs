use url::Url;

/// Host page: where it is and how to leave it.
///
/// Implemented by whatever embeds the flow (a webview bridge, the loopback
/// [`shell`](crate::shell), a test double). Calls are fire-and-forget.
pub trait Navigator: Send + Sync + 'static {
    /// The live page location. Origins are always derived from this.
    fn location(&self) -> Url;

    /// Full-page navigation to an external URL. The page is gone afterwards.
    fn assign(&self, url: &Url);

    /// In-app navigation that adds a history entry.
    fn push(&self, route: &str);

    /// In-app navigation that replaces the current history entry.
    fn replace(&self, route: &str);
}
