//! Fixed counting window for a single client identity.

use chrono::{DateTime, TimeDelta, Utc};

/// Per-identity rate state for the current fixed window.
///
/// A window is created on the first request from an identity and replaced
/// by a fresh one once `now >= reset_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientWindow {
    /// The rate-limit key this window belongs to
    pub identity: String,
    /// Requests attempted in this window, admitted or not
    pub count: u64,
    /// When this window expires
    pub reset_at: DateTime<Utc>,
}

impl ClientWindow {
    /// Open a fresh, empty window starting at `now`.
    pub fn open(identity: &str, now: DateTime<Utc>, length: TimeDelta) -> Self {
        Self {
            identity: identity.to_string(),
            count: 0,
            reset_at: now + length,
        }
    }

    /// Whether this window has run out at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.reset_at
    }

    /// Record one more attempt and return the new count.
    pub fn record(&mut self) -> u64 {
        self.count = self.count.saturating_add(1);
        self.count
    }

    /// Whole seconds until the window resets, rounded up and never negative.
    pub fn retry_after_secs(&self, now: DateTime<Utc>) -> u64 {
        let millis = (self.reset_at - now).num_milliseconds().max(0);
        ceil_div_1000(millis) as u64
    }

    /// The reset time as Unix seconds, rounded up.
    pub fn reset_epoch_secs(&self) -> i64 {
        ceil_div_1000(self.reset_at.timestamp_millis())
    }
}

fn ceil_div_1000(millis: i64) -> i64 {
    (millis + 999).div_euclid(1000)
}
