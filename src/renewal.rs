//! Background renewal timer.
//!
//! [`RenewalScheduler`] owns at most one timer task. What a tick does is
//! supplied by the caller; the session manager passes a closure that
//! exchanges the refresh token.

use std::future::Future;
use std::sync::{Mutex, PoisonError};

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};

use crate::config::RenewalOptions;
use crate::transport::TransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewalState {
    Stopped,
    Running,
}

/// Why a renewal tick did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoRefreshToken,
    Hidden,
    /// A concurrent exchange failed and dropped the rejected token.
    TokenDropped,
}

/// Result of one renewal attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum RenewalOutcome {
    /// New access token stored; `rotated` when the refresh token changed too.
    Renewed { rotated: bool },
    /// Another caller already replaced the rejected token; nothing exchanged.
    Coalesced,
    Skipped(SkipReason),
    /// The exchange failed; the access token was dropped, the refresh token kept.
    Failed(TransportError),
    /// The session was cleared or replaced by a login while the exchange was
    /// in flight; the result was thrown away.
    Discarded,
}

impl RenewalOutcome {
    /// Whether a usable access token is available after this outcome.
    pub fn has_fresh_token(&self) -> bool {
        matches!(self, Self::Renewed { .. } | Self::Coalesced)
    }
}

/// Owner of the renewal timer task.
///
/// Dropping the scheduler cancels the timer.
#[derive(Default)]
pub struct RenewalScheduler {
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl RenewalScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts the timer, replacing any running one.
    ///
    /// With `run_immediately` the first tick fires right away; otherwise it
    /// fires one `interval` after the call. Ticks never overlap: a slow tick
    /// delays the next one instead of queueing a burst.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start<F, Fut>(&self, options: &RenewalOptions, mut tick: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let period = options.interval;
        let run_immediately = options.run_immediately;

        let mut handle = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = handle.take() {
            previous.abort();
        }

        let first = Instant::now() + period;
        *handle = Some(tokio::spawn(async move {
            if run_immediately {
                tick().await;
            }
            let mut ticker = interval_at(first, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                tick().await;
            }
        }));

        log::debug!(
            target: "tether::renewal",
            "msg=\"renewal started\" interval_ms={} run_immediately={}",
            period.as_millis(),
            run_immediately
        );
    }

    /// Cancels the timer. Returns whether one was running.
    ///
    /// The task is aborted before this returns, so no further tick starts.
    /// A tick already awaiting the network is cancelled at that await point.
    pub fn stop(&self) -> bool {
        let previous = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match previous {
            Some(handle) => {
                handle.abort();
                log::debug!(target: "tether::renewal", "msg=\"renewal stopped\"");
                true
            }
            None => false,
        }
    }

    pub fn state(&self) -> RenewalState {
        let handle = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
        match handle.as_ref() {
            Some(h) if !h.is_finished() => RenewalState::Running,
            _ => RenewalState::Stopped,
        }
    }
}

impl Drop for RenewalScheduler {
    fn drop(&mut self) {
        if let Some(handle) = self
            .handle
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    fn counting_tick(count: &Arc<AtomicUsize>) -> impl FnMut() -> std::future::Ready<()> + Send + 'static {
        let count = Arc::clone(count);
        move || {
            count.fetch_add(1, Ordering::SeqCst);
            std::future::ready(())
        }
    }

    fn every_second() -> RenewalOptions {
        RenewalOptions::every(Duration::from_secs(1))
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_once_per_interval() {
        let count = Arc::new(AtomicUsize::new(0));
        let scheduler = RenewalScheduler::new();
        scheduler.start(&every_second(), counting_tick(&count));
        assert_eq!(scheduler.state(), RenewalState::Running);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(2000)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_immediately() {
        let count = Arc::new(AtomicUsize::new(0));
        let scheduler = RenewalScheduler::new();
        scheduler.start(&every_second().immediately(), counting_tick(&count));

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_start_keeps_one_timer() {
        let count = Arc::new(AtomicUsize::new(0));
        let scheduler = RenewalScheduler::new();
        scheduler.start(&every_second(), counting_tick(&count));
        scheduler.start(&every_second(), counting_tick(&count));

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_prevents_further_ticks() {
        let count = Arc::new(AtomicUsize::new(0));
        let scheduler = RenewalScheduler::new();
        scheduler.start(&every_second(), counting_tick(&count));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        assert!(scheduler.stop());
        assert_eq!(scheduler.state(), RenewalState::Stopped);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stop_when_stopped_is_noop() {
        let scheduler = RenewalScheduler::new();
        assert!(!scheduler.stop());
        assert!(!scheduler.stop());
        assert_eq!(scheduler.state(), RenewalState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_timer() {
        let count = Arc::new(AtomicUsize::new(0));
        let scheduler = RenewalScheduler::new();
        scheduler.start(&every_second(), counting_tick(&count));
        drop(scheduler);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_outcome_fresh_token() {
        assert!(RenewalOutcome::Renewed { rotated: false }.has_fresh_token());
        assert!(RenewalOutcome::Coalesced.has_fresh_token());
        assert!(!RenewalOutcome::Skipped(SkipReason::Hidden).has_fresh_token());
        assert!(!RenewalOutcome::Discarded.has_fresh_token());
    }
}
