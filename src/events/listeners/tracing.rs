use async_trait::async_trait;

use crate::events::{Listener, SessionEvent};

/// Emits session events as `tracing` events.
///
/// Requires the `tracing` feature to be enabled.
///
/// # Example
///
/// ```rust,ignore
/// use tether::events::listeners::TracingListener;
///
/// let manager = SessionManager::builder(config, transport)
///     .listener(TracingListener)
///     .build()?;
/// ```
pub struct TracingListener;

#[async_trait]
impl Listener for TracingListener {
    async fn handle(&self, event: &SessionEvent) {
        match event {
            SessionEvent::LoginFailed { reason, .. } | SessionEvent::RenewalFailed { reason, .. } => {
                tracing::warn!(
                    target: "tether::events",
                    event_name = event.name(),
                    reason = %reason,
                    at = %event.timestamp(),
                    "session event"
                );
            }
            _ => {
                tracing::info!(
                    target: "tether::events",
                    event_name = event.name(),
                    ?event,
                    "session event"
                );
            }
        }
    }
}
