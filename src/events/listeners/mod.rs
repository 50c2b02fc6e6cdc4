//! Built-in event listeners.
//!
//! These listeners provide common functionality out of the box.
//! Attach them with [`SessionManagerBuilder::listener`](crate::manager::SessionManagerBuilder::listener).

mod logging;
#[cfg(feature = "tracing")]
mod tracing;

pub use logging::LoggingListener;
#[cfg(feature = "tracing")]
pub use self::tracing::TracingListener;
