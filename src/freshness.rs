//! # freshness
//!
//! [`FreshnessMonitor`] — the single owned connectivity state machine.
//!
//! Every successful source read advances `last_success`; failed reads never
//! do. Consumers read an immutable [`ConnectivityState`] snapshot; staleness
//! is derived from the age of the last success at read time, so no
//! background timer is needed to flip states.
//!
//! ## Transitions
//! - `Disconnected → Connecting` on a successful handshake probe
//! - `Connecting → Connected` on the first successful read
//! - `Connected → Stale` once `now - last_success > max_age`
//! - `Stale → Connected` on the next success before the hard threshold
//! - `Connected|Stale → Disconnected` on explicit close, an unrecoverable
//!   error, or age beyond `hard_max_age`

use std::sync::RwLock;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

// ─── ConnectivityState ────────────────────────────────────────────────────────

/// Trustworthiness of the upstream source at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectivityState {
    Disconnected,
    Connecting,
    Connected,
    /// Reachable in the past but no fresh update; prices may be out of
    /// date, so order placement is refused in this state.
    Stale,
}

// ─── FreshnessMonitor ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Down,
    Connecting,
    Up,
}

#[derive(Debug)]
struct Inner {
    phase: Phase,
    last_success: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct FreshnessMonitor {
    inner: RwLock<Inner>,
    max_age: Duration,
    hard_max_age: Duration,
}

impl FreshnessMonitor {
    pub fn new(max_age: StdDuration, hard_max_age: StdDuration) -> Self {
        Self {
            inner: RwLock::new(Inner {
                phase: Phase::Down,
                last_success: None,
            }),
            max_age: Duration::from_std(max_age).unwrap_or_else(|_| Duration::seconds(30)),
            hard_max_age: Duration::from_std(hard_max_age)
                .unwrap_or_else(|_| Duration::seconds(150)),
        }
    }

    /// A handshake with the underlying source succeeded; data has not
    /// flowed yet.
    pub fn mark_connecting(&self) {
        let mut inner = self.inner.write().expect("freshness lock poisoned");
        if inner.phase == Phase::Down {
            inner.phase = Phase::Connecting;
            info!("source handshake ok, awaiting first update");
        }
    }

    pub fn record_success(&self) {
        self.record_success_at(Utc::now());
    }

    pub fn record_success_at(&self, now: DateTime<Utc>) {
        let mut inner = self.inner.write().expect("freshness lock poisoned");
        let was = derive(&inner, now, self.max_age, self.hard_max_age);
        inner.phase = Phase::Up;
        inner.last_success = Some(now);
        if was != ConnectivityState::Connected {
            info!(previous = ?was, "source connected");
        }
    }

    /// A read failed. Fatal errors drop the source to `Disconnected`
    /// immediately; ordinary poll failures just leave `last_success` where
    /// it is and let staleness accumulate.
    pub fn record_failure(&self, fatal: bool) {
        if fatal {
            let mut inner = self.inner.write().expect("freshness lock poisoned");
            if inner.phase != Phase::Down {
                warn!("unrecoverable source error, marking disconnected");
                inner.phase = Phase::Down;
            }
        }
    }

    /// Explicit shutdown of the upstream connection.
    pub fn close(&self) {
        let mut inner = self.inner.write().expect("freshness lock poisoned");
        inner.phase = Phase::Down;
        info!("source closed");
    }

    pub fn state(&self) -> ConnectivityState {
        self.state_at(Utc::now())
    }

    pub fn state_at(&self, now: DateTime<Utc>) -> ConnectivityState {
        let inner = self.inner.read().expect("freshness lock poisoned");
        derive(&inner, now, self.max_age, self.hard_max_age)
    }

    pub fn last_success(&self) -> Option<DateTime<Utc>> {
        self.inner.read().expect("freshness lock poisoned").last_success
    }
}

fn derive(
    inner: &Inner,
    now: DateTime<Utc>,
    max_age: Duration,
    hard_max_age: Duration,
) -> ConnectivityState {
    match inner.phase {
        Phase::Down => ConnectivityState::Disconnected,
        Phase::Connecting => ConnectivityState::Connecting,
        Phase::Up => match inner.last_success {
            None => ConnectivityState::Connecting,
            Some(at) => {
                let age = now - at;
                if age > hard_max_age {
                    ConnectivityState::Disconnected
                } else if age > max_age {
                    ConnectivityState::Stale
                } else {
                    ConnectivityState::Connected
                }
            }
        },
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn monitor() -> FreshnessMonitor {
        // max_age 30s, hard 150s
        FreshnessMonitor::new(StdDuration::from_secs(30), StdDuration::from_secs(150))
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn starts_disconnected_then_connecting_then_connected() {
        let m = monitor();
        assert_eq!(m.state_at(at(0)), ConnectivityState::Disconnected);

        m.mark_connecting();
        assert_eq!(m.state_at(at(0)), ConnectivityState::Connecting);

        m.record_success_at(at(1));
        assert_eq!(m.state_at(at(1)), ConnectivityState::Connected);
    }

    #[test]
    fn frequent_successes_stay_connected() {
        let m = monitor();
        for i in 0..10 {
            m.record_success_at(at(i * 20));
            assert_eq!(m.state_at(at(i * 20 + 19)), ConnectivityState::Connected);
        }
    }

    #[test]
    fn silence_degrades_to_stale_then_disconnected() {
        let m = monitor();
        m.record_success_at(at(0));

        assert_eq!(m.state_at(at(30)), ConnectivityState::Connected);
        assert_eq!(m.state_at(at(31)), ConnectivityState::Stale);
        assert_eq!(m.state_at(at(150)), ConnectivityState::Stale);
        assert_eq!(m.state_at(at(151)), ConnectivityState::Disconnected);
    }

    #[test]
    fn stale_recovers_on_next_success() {
        let m = monitor();
        m.record_success_at(at(0));
        assert_eq!(m.state_at(at(60)), ConnectivityState::Stale);

        m.record_success_at(at(61));
        assert_eq!(m.state_at(at(61)), ConnectivityState::Connected);
    }

    #[test]
    fn failures_never_advance_last_success() {
        let m = monitor();
        m.record_success_at(at(0));
        m.record_failure(false);
        m.record_failure(false);
        assert_eq!(m.last_success(), Some(at(0)));
        assert_eq!(m.state_at(at(40)), ConnectivityState::Stale);
    }

    #[test]
    fn fatal_failure_disconnects_immediately() {
        let m = monitor();
        m.record_success_at(at(0));
        m.record_failure(true);
        assert_eq!(m.state_at(at(1)), ConnectivityState::Disconnected);
    }

    #[test]
    fn explicit_close_disconnects() {
        let m = monitor();
        m.record_success_at(at(0));
        m.close();
        assert_eq!(m.state_at(at(0)), ConnectivityState::Disconnected);
    }
}
