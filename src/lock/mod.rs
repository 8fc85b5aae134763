//! Project lock expiry tracking.
//!
//! [`LockTracker`] is the pure state machine; [`LockMonitor`] drives it from
//! periodic polls and a per-second countdown.

mod monitor;

pub use monitor::{LockMonitor, LockMonitorHandle, LockSnapshot};

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::models::LockStatus;

pub const READ_ONLY_MESSAGE: &str =
    "Project is now read-only. It can be opened for editing from the project overview page";
pub const EDITABLE_MESSAGE: &str = "Project is now open for editing";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    /// No lock held (also the state before the first poll)
    Unlocked,
    /// Lock held; `None` expiry means an indefinite lock
    Locked { expires_at: Option<DateTime<Utc>> },
    WarningVisible { expires_at: DateTime<Utc> },
    Expired,
}

impl LockState {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        match self {
            LockState::Locked { expires_at } => *expires_at,
            LockState::WarningVisible { expires_at } => Some(*expires_at),
            _ => None,
        }
    }

    pub fn is_warning_visible(&self) -> bool {
        matches!(self, LockState::WarningVisible { .. })
    }

    /// Whether the per-second countdown has anything to count.
    pub fn needs_countdown(&self) -> bool {
        self.expires_at().is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockEvent {
    WarningOpened { seconds_left: u64 },
    WarningClosed,
    Expired,
    BecameReadOnly,
    BecameEditable,
}

/// `max(0, expires_at - now)`.
pub fn time_left(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (expires_at - now).to_std().unwrap_or(Duration::ZERO)
}

/// Whole seconds shown in the countdown, rounded up.
pub fn countdown_seconds(time_left: Duration) -> u64 {
    let millis = time_left.as_millis() as u64;
    millis.div_ceil(1000)
}

#[derive(Debug, Clone)]
pub struct LockTracker {
    warning_threshold: Duration,
    state: LockState,
    read_only: Option<bool>,
}

impl LockTracker {
    pub fn new(warning_threshold: Duration) -> Self {
        Self {
            warning_threshold,
            state: LockState::Unlocked,
            read_only: None,
        }
    }

    pub fn state(&self) -> LockState {
        self.state
    }

    pub fn seconds_left(&self, now: DateTime<Utc>) -> Option<u64> {
        self.state
            .expires_at()
            .map(|expires_at| countdown_seconds(time_left(expires_at, now)))
    }

    /// Apply a freshly polled status.
    pub fn apply_status(&mut self, status: &LockStatus, now: DateTime<Utc>) -> Vec<LockEvent> {
        let mut events = Vec::new();

        let read_only = status.is_read_only();
        match self.read_only.replace(read_only) {
            Some(false) if read_only => events.push(LockEvent::BecameReadOnly),
            Some(true) if !read_only => events.push(LockEvent::BecameEditable),
            _ => {}
        }

        let next = if status.is_lock_acquired {
            self.evaluate(status.expires_at(), now)
        } else {
            LockState::Unlocked
        };
        events.extend(self.transition(next, now));
        events
    }

    /// Advance the countdown. No-op unless the state carries an expiry.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Vec<LockEvent> {
        if !self.state.needs_countdown() {
            return Vec::new();
        }
        let next = self.evaluate(self.state.expires_at(), now);
        self.transition(next, now)
    }

    fn evaluate(&self, expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> LockState {
        let Some(expires_at) = expires_at else {
            return LockState::Locked { expires_at: None };
        };
        let left = time_left(expires_at, now);
        if left.is_zero() {
            LockState::Expired
        } else if left <= self.warning_threshold {
            LockState::WarningVisible { expires_at }
        } else {
            LockState::Locked {
                expires_at: Some(expires_at),
            }
        }
    }

    fn transition(&mut self, next: LockState, now: DateTime<Utc>) -> Vec<LockEvent> {
        let previous = std::mem::replace(&mut self.state, next);
        let mut events = Vec::new();

        match (previous.is_warning_visible(), next.is_warning_visible()) {
            (false, true) => events.push(LockEvent::WarningOpened {
                seconds_left: self.seconds_left(now).unwrap_or(0),
            }),
            (true, false) if next != LockState::Expired => events.push(LockEvent::WarningClosed),
            _ => {}
        }
        if next == LockState::Expired && previous != LockState::Expired {
            events.push(LockEvent::Expired);
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::models::LockInfo;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()
    }

    fn ms(millis: i64) -> chrono::Duration {
        chrono::Duration::milliseconds(millis)
    }

    fn locked(expires_at: Option<DateTime<Utc>>) -> LockStatus {
        LockStatus {
            is_lock_acquired: true,
            lock_info: Some(LockInfo {
                expires_at,
                ..LockInfo::default()
            }),
            ..LockStatus::default()
        }
    }

    fn unlocked() -> LockStatus {
        LockStatus::default()
    }

    #[test]
    fn test_countdown_rounds_up() {
        assert_eq!(countdown_seconds(Duration::from_millis(5000)), 5);
        assert_eq!(countdown_seconds(Duration::from_millis(4001)), 5);
        assert_eq!(countdown_seconds(Duration::from_millis(1)), 1);
        assert_eq!(countdown_seconds(Duration::ZERO), 0);
        assert_eq!(time_left(t0(), t0() + ms(10)), Duration::ZERO);
    }

    #[test]
    fn test_warning_opens_immediately_inside_threshold() {
        let mut tracker = LockTracker::new(Duration::from_millis(10_000));
        let expires_at = t0() + ms(5000);

        let events = tracker.apply_status(&locked(Some(expires_at)), t0());

        assert_eq!(events, vec![LockEvent::WarningOpened { seconds_left: 5 }]);
        assert_eq!(tracker.state(), LockState::WarningVisible { expires_at });
        assert_eq!(tracker.seconds_left(t0()), Some(5));
    }

    #[test]
    fn test_countdown_to_warning_then_expiry() {
        let mut tracker = LockTracker::new(Duration::from_millis(10_000));
        let expires_at = t0() + ms(12_000);

        assert!(tracker.apply_status(&locked(Some(expires_at)), t0()).is_empty());
        assert_eq!(
            tracker.state(),
            LockState::Locked {
                expires_at: Some(expires_at)
            }
        );

        assert!(tracker.tick(t0() + ms(1000)).is_empty());
        assert_eq!(
            tracker.tick(t0() + ms(2000)),
            vec![LockEvent::WarningOpened { seconds_left: 10 }]
        );
        assert!(tracker.tick(t0() + ms(11_000)).is_empty());
        assert_eq!(tracker.seconds_left(t0() + ms(11_000)), Some(1));

        assert_eq!(tracker.tick(t0() + ms(12_000)), vec![LockEvent::Expired]);
        assert_eq!(tracker.state(), LockState::Expired);
        assert!(!tracker.state().needs_countdown());
        assert!(tracker.tick(t0() + ms(13_000)).is_empty());
    }

    #[test]
    fn test_renewal_closes_warning() {
        let mut tracker = LockTracker::new(Duration::from_millis(10_000));
        tracker.apply_status(&locked(Some(t0() + ms(5000))), t0());
        assert!(tracker.state().is_warning_visible());

        let renewed = t0() + ms(60_000);
        let events = tracker.apply_status(&locked(Some(renewed)), t0() + ms(1000));

        assert_eq!(events, vec![LockEvent::WarningClosed]);
        assert_eq!(
            tracker.state(),
            LockState::Locked {
                expires_at: Some(renewed)
            }
        );
    }

    #[test]
    fn test_poll_keeps_warning_while_inside_threshold() {
        let mut tracker = LockTracker::new(Duration::from_millis(10_000));
        let expires_at = t0() + ms(8000);
        tracker.apply_status(&locked(Some(expires_at)), t0());

        let events = tracker.apply_status(&locked(Some(expires_at)), t0() + ms(2000));
        assert!(events.is_empty());
        assert!(tracker.state().is_warning_visible());
    }

    #[test]
    fn test_missing_expiry_is_indefinite() {
        let mut tracker = LockTracker::new(Duration::from_millis(10_000));
        assert!(tracker.apply_status(&locked(None), t0()).is_empty());
        assert_eq!(tracker.state(), LockState::Locked { expires_at: None });
        assert_eq!(tracker.seconds_left(t0()), None);
        assert!(!tracker.state().needs_countdown());
        assert!(tracker.tick(t0() + ms(3_600_000)).is_empty());
        assert_eq!(tracker.state(), LockState::Locked { expires_at: None });
    }

    #[test]
    fn test_lock_lost_goes_unlocked_and_flags_read_only() {
        let mut tracker = LockTracker::new(Duration::from_millis(10_000));
        assert_eq!(tracker.state(), LockState::Unlocked);

        // First poll never announces a flip.
        assert_eq!(
            tracker.apply_status(&locked(Some(t0() + ms(5000))), t0()),
            vec![LockEvent::WarningOpened { seconds_left: 5 }]
        );

        let events = tracker.apply_status(&unlocked(), t0() + ms(1000));
        assert_eq!(
            events,
            vec![LockEvent::BecameReadOnly, LockEvent::WarningClosed]
        );
        assert_eq!(tracker.state(), LockState::Unlocked);
        assert!(tracker.tick(t0() + ms(2000)).is_empty());

        let events = tracker.apply_status(&locked(None), t0() + ms(3000));
        assert_eq!(events, vec![LockEvent::BecameEditable]);
    }

    #[test]
    fn test_first_poll_read_only_is_silent() {
        let mut tracker = LockTracker::new(Duration::from_millis(10_000));
        assert!(tracker.apply_status(&unlocked(), t0()).is_empty());
    }

    #[test]
    fn test_already_expired_lock() {
        let mut tracker = LockTracker::new(Duration::from_millis(10_000));
        let events = tracker.apply_status(&locked(Some(t0() - ms(1000))), t0());
        assert_eq!(events, vec![LockEvent::Expired]);

        // Same stale expiry on the next poll: no repeated event.
        assert!(tracker
            .apply_status(&locked(Some(t0() - ms(1000))), t0() + ms(1000))
            .is_empty());
    }
}
