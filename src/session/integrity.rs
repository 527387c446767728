// src/session/integrity.rs

use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::models::exam_record::CheatingReason;

/// Signals the host page can push to us.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegritySignal {
    VisibilityLost,
    FocusLost,
}

impl From<IntegritySignal> for CheatingReason {
    fn from(signal: IntegritySignal) -> Self {
        match signal {
            IntegritySignal::VisibilityLost => CheatingReason::VisibilityLost,
            IntegritySignal::FocusLost => CheatingReason::FocusLost,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IntegrityPolicy {
    /// Episodes that trigger an automatic submission.
    pub threshold: u32,
    /// Signals closer than this to the last episode belong to it.
    pub cooldown: Duration,
    /// How often the visibility probe is re-checked.
    pub poll_interval: Duration,
    /// Whether the host delivers visibility/focus events at all.
    pub events_available: bool,
}

impl Default for IntegrityPolicy {
    fn default() -> Self {
        Self {
            threshold: 3,
            cooldown: Duration::from_secs(3),
            poll_interval: Duration::from_secs(2),
            events_available: true,
        }
    }
}

/// Host-side visibility state, read by the periodic poll.
pub trait VisibilityProbe: Send + Sync + 'static {
    fn is_hidden(&self) -> bool;
}

/// Visibility as last reported by the page's heartbeat.
#[derive(Debug, Default)]
pub struct HostVisibility {
    hidden: AtomicBool,
}

impl HostVisibility {
    pub fn set_hidden(&self, hidden: bool) {
        self.hidden.store(hidden, Ordering::SeqCst);
    }
}

impl VisibilityProbe for HostVisibility {
    fn is_hidden(&self) -> bool {
        self.hidden.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detection {
    /// Inactive monitor, same episode, or threshold already reached.
    Ignored,
    Episode {
        reason: CheatingReason,
        attempts: u32,
        threshold_reached: bool,
    },
}

/// Debounces raw focus/visibility signals into cheating episodes.
///
/// The monitor itself is host-agnostic: callers feed it signals and poll
/// results together with the time they were observed.
#[derive(Debug)]
pub struct IntegrityMonitor {
    policy: IntegrityPolicy,
    active: bool,
    attempts: u32,
    last_episode_at: Option<DateTime<Utc>>,
    pending_ack: bool,
    poll_saw_hidden: bool,
    poller: Option<JoinHandle<()>>,
}

impl IntegrityMonitor {
    pub fn new(policy: IntegrityPolicy) -> Self {
        Self {
            policy,
            active: false,
            attempts: 0,
            last_episode_at: None,
            pending_ack: false,
            poll_saw_hidden: false,
            poller: None,
        }
    }

    pub fn activate(&mut self) {
        if !self.policy.events_available {
            tracing::warn!("Visibility/focus events unavailable; integrity monitor is poll-only");
        }
        self.active = true;
    }

    pub fn observe(&mut self, reason: CheatingReason, now: DateTime<Utc>) -> Detection {
        if !self.active || self.attempts >= self.policy.threshold {
            return Detection::Ignored;
        }

        let cooldown = TimeDelta::from_std(self.policy.cooldown).unwrap_or(TimeDelta::MAX);
        if let Some(last) = self.last_episode_at {
            if now - last < cooldown {
                return Detection::Ignored;
            }
        }

        self.attempts += 1;
        self.last_episode_at = Some(now);
        self.pending_ack = true;

        Detection::Episode {
            reason,
            attempts: self.attempts,
            threshold_reached: self.attempts >= self.policy.threshold,
        }
    }

    /// Feeds one poll result. Only a visible -> hidden transition counts, so a
    /// student who stays away is not charged once per poll.
    pub fn observe_poll(&mut self, hidden: bool, now: DateTime<Utc>) -> Detection {
        let departed = hidden && !self.poll_saw_hidden;
        self.poll_saw_hidden = hidden;
        if departed {
            self.observe(CheatingReason::HiddenOnPoll, now)
        } else {
            Detection::Ignored
        }
    }

    /// Clears the pending acknowledgement. Returns `true` if one was pending.
    pub fn acknowledge(&mut self) -> bool {
        std::mem::take(&mut self.pending_ack)
    }

    /// Spawns the periodic probe check. A running poller is left alone.
    pub fn start_polling<F>(&mut self, probe: Arc<dyn VisibilityProbe>, mut on_poll: F) -> bool
    where
        F: FnMut(bool) -> ControlFlow<()> + Send + 'static,
    {
        if self.poller.as_ref().is_some_and(|h| !h.is_finished()) {
            return false;
        }

        let interval = self.policy.poll_interval;
        self.poller = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if on_poll(probe.is_hidden()).is_break() {
                    break;
                }
            }
        }));
        true
    }

    /// Deactivates the monitor and cancels the poller.
    pub fn stop(&mut self) {
        self.active = false;
        if let Some(handle) = self.poller.take() {
            handle.abort();
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn pending_acknowledgement(&self) -> bool {
        self.pending_ack
    }
}

impl Drop for IntegrityMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}
