//! Per-identifier lockout after repeated failed authorization attempts.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::{debug, warn};

/// Failure threshold and timing for [`RateGuard`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RatePolicy {
    /// Failures within `window` that trigger a lockout.
    pub max_attempts: u32,
    #[serde(rename = "window_secs", with = "secs")]
    pub window: Duration,
    #[serde(rename = "lockout_secs", with = "secs")]
    pub lockout: Duration,
}

impl Default for RatePolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window: Duration::from_secs(15 * 60),
            lockout: Duration::from_secs(30 * 60),
        }
    }
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

/// Verdict of [`RateGuard::check_allowed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Locked { retry_after: Duration },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

#[derive(Debug, Clone, Copy)]
struct RateState {
    attempt_count: u32,
    window_start: Instant,
    locked_until: Option<Instant>,
}

impl RateState {
    /// A served lockout, or a failure window that closed without one.
    fn is_stale(&self, now: Instant, window: Duration) -> bool {
        match self.locked_until {
            Some(until) => now >= until,
            None => now.saturating_duration_since(self.window_start) >= window,
        }
    }
}

/// Tracks failed attempts per identifier and enforces a lockout window.
///
/// State is process-local. One identifier's failures never affect another.
#[derive(Debug, Default)]
pub struct RateGuard {
    policy: RatePolicy,
    states: Mutex<HashMap<String, RateState>>,
}

impl RateGuard {
    pub fn new(policy: RatePolicy) -> Self {
        Self {
            policy,
            states: Mutex::new(HashMap::new()),
        }
    }

    pub fn check_allowed(&self, identifier: &str) -> RateDecision {
        self.check_allowed_at(identifier, Instant::now())
    }

    pub fn record_failure(&self, identifier: &str) {
        self.record_failure_at(identifier, Instant::now());
    }

    pub fn record_success(&self, identifier: &str) {
        let key = normalize_identifier(identifier);
        if self.lock().remove(&key).is_some() {
            debug!(identifier = %key, "rate guard reset after success");
        }
    }

    pub fn check_allowed_at(&self, identifier: &str, now: Instant) -> RateDecision {
        let key = normalize_identifier(identifier);
        let mut states = self.lock();
        let Some(state) = states.get(&key).copied() else {
            return RateDecision::Allowed;
        };
        if state.is_stale(now, self.policy.window) {
            states.remove(&key);
            return RateDecision::Allowed;
        }
        match state.locked_until {
            Some(until) => RateDecision::Locked {
                retry_after: until - now,
            },
            None => RateDecision::Allowed,
        }
    }

    pub fn record_failure_at(&self, identifier: &str, now: Instant) {
        let key = normalize_identifier(identifier);
        let mut states = self.lock();
        states.retain(|_, state| !state.is_stale(now, self.policy.window));
        let state = states.entry(key.clone()).or_insert(RateState {
            attempt_count: 0,
            window_start: now,
            locked_until: None,
        });
        if state.locked_until.is_some() {
            return;
        }

        state.attempt_count += 1;
        if state.attempt_count >= self.policy.max_attempts {
            state.locked_until = Some(now + self.policy.lockout);
            warn!(
                identifier = %key,
                attempts = state.attempt_count,
                lockout_secs = self.policy.lockout.as_secs(),
                "identifier locked after repeated authorization failures"
            );
        } else {
            debug!(identifier = %key, attempts = state.attempt_count, "authorization failure recorded");
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, RateState>> {
        self.states.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn normalize_identifier(identifier: &str) -> String {
    identifier.trim().to_lowercase()
}
