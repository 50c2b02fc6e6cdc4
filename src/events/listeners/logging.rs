use async_trait::async_trait;

use crate::events::{Listener, SessionEvent};

/// Logs every session event using the `log` crate.
///
/// Failures (`session.login.failed`, `session.token.renewal_failed`) are
/// logged at `Warn` or the configured level, whichever is more severe.
///
/// # Example
///
/// ```rust,ignore
/// use tether::events::listeners::LoggingListener;
///
/// let manager = SessionManager::builder(config, transport)
///     .listener(LoggingListener::with_level(log::Level::Debug))
///     .build()?;
/// ```
pub struct LoggingListener {
    level: log::Level,
}

impl LoggingListener {
    /// Creates a new logging listener at INFO level.
    pub fn new() -> Self {
        Self {
            level: log::Level::Info,
        }
    }

    /// Creates a new logging listener at the specified level.
    pub fn with_level(level: log::Level) -> Self {
        Self { level }
    }

    fn level_for(&self, event: &SessionEvent) -> log::Level {
        match event {
            SessionEvent::LoginFailed { .. } | SessionEvent::RenewalFailed { .. } => {
                self.level.min(log::Level::Warn)
            }
            _ => self.level,
        }
    }
}

impl Default for LoggingListener {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Listener for LoggingListener {
    async fn handle(&self, event: &SessionEvent) {
        log::log!(
            target: "tether::events",
            self.level_for(event),
            "event={} {:?}",
            event.name(),
            event
        );
    }
}
