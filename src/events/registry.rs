use std::sync::Arc;

use super::{Listener, SessionEvent};

/// Listeners attached to one session manager.
///
/// Cloning is cheap and shares the listeners.
#[derive(Clone, Default)]
pub struct EventRegistry {
    listeners: Vec<Arc<dyn Listener>>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener to receive events.
    ///
    /// Listeners are called in the order they are registered.
    pub fn listen(&mut self, listener: impl Listener) -> &mut Self {
        self.listeners.push(Arc::new(listener));
        self
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Dispatch an event to all registered listeners.
    ///
    /// If no listeners are registered, this is a no-op.
    pub async fn dispatch(&self, event: SessionEvent) {
        for listener in &self.listeners {
            listener.handle(&event).await;
        }
    }
}
