// src/session/clock.rs

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::session::time::{TimeSource, remaining_until};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockEvent {
    Tick { remaining: Duration },
    /// Sent once, after which the clock stops on its own.
    Expired,
}

/// Countdown against an absolute deadline.
///
/// Every tick recomputes the remaining time from the deadline, so a host that
/// stalled the task for minutes sees the true (possibly already expired)
/// value on the very next tick.
#[derive(Debug, Default)]
pub struct SessionClock {
    handle: Option<JoinHandle<()>>,
}

impl SessionClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts ticking every `interval`. Returns `false` and does nothing if
    /// the clock is already running.
    ///
    /// `on_event` may return `ControlFlow::Break` to stop the clock early.
    pub fn start<F>(
        &mut self,
        deadline_at: DateTime<Utc>,
        interval: Duration,
        time: Arc<dyn TimeSource>,
        mut on_event: F,
    ) -> bool
    where
        F: FnMut(ClockEvent) -> ControlFlow<()> + Send + 'static,
    {
        if self.is_running() {
            return false;
        }

        self.handle = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let remaining = remaining_until(deadline_at, time.now());
                if remaining.is_zero() {
                    let _ = on_event(ClockEvent::Expired);
                    break;
                }
                if on_event(ClockEvent::Tick { remaining }).is_break() {
                    break;
                }
            }
        }));
        true
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Cancels any pending tick.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for SessionClock {
    fn drop(&mut self) {
        self.stop();
    }
}
