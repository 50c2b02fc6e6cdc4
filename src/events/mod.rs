//! Session lifecycle events.
//!
//! The manager fires events on login, logout, renewal and auth-state
//! changes. Listeners are registered per manager through
//! [`SessionManagerBuilder::listener`](crate::manager::SessionManagerBuilder::listener);
//! with none registered, events are dropped.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use tether::SessionManager;
//! use tether::events::listeners::LoggingListener;
//!
//! let manager = SessionManager::builder(config, transport)
//!     .listener(LoggingListener::new())
//!     .build()?;
//! ```

mod event;
mod listener;
mod registry;

pub mod listeners;

pub use event::SessionEvent;
pub use listener::Listener;
pub use registry::EventRegistry;
