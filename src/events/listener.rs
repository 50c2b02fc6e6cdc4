use async_trait::async_trait;

use super::SessionEvent;

/// Trait for handling session events asynchronously.
///
/// # Example
///
/// ```rust,ignore
/// use tether::events::{Listener, SessionEvent};
/// use async_trait::async_trait;
///
/// struct SignedOutBanner {
///     tx: tokio::sync::mpsc::Sender<()>,
/// }
///
/// #[async_trait]
/// impl Listener for SignedOutBanner {
///     async fn handle(&self, event: &SessionEvent) {
///         if let SessionEvent::AuthStateChanged { authenticated: false, .. } = event {
///             let _ = self.tx.send(()).await;
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait Listener: Send + Sync + 'static {
    async fn handle(&self, event: &SessionEvent);
}
