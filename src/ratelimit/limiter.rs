//! Core admission controller.

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use tracing::{debug, trace};

use super::window::ClientWindow;
use crate::config::RateLimitingConfig;
use crate::error::{MarketgateError, Result};

/// Default length of a counting window in seconds.
pub const DEFAULT_WINDOW_SECS: i64 = 15 * 60;
/// Default number of requests admitted per window.
pub const DEFAULT_MAX_REQUESTS: u64 = 100;
/// Longest window accepted from configuration.
const MAX_WINDOW_DAYS: i64 = 366;

/// Window length and request budget applied to every identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionPolicy {
    /// Length of a counting window
    pub window: TimeDelta,
    /// Requests admitted per identity per window
    pub max_requests: u64,
}

impl Default for AdmissionPolicy {
    fn default() -> Self {
        Self {
            window: TimeDelta::seconds(DEFAULT_WINDOW_SECS),
            max_requests: DEFAULT_MAX_REQUESTS,
        }
    }
}

impl AdmissionPolicy {
    /// Build a policy from the rate limiting section of the configuration.
    pub fn from_config(config: &RateLimitingConfig) -> Result<Self> {
        let window = i64::try_from(config.window_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .filter(|window| {
                *window > TimeDelta::zero() && *window <= TimeDelta::days(MAX_WINDOW_DAYS)
            })
            .ok_or_else(|| {
                MarketgateError::Config(format!(
                    "rate_limiting.window_secs out of range: {}",
                    config.window_secs
                ))
            })?;

        Ok(Self {
            window,
            max_requests: config.max_requests,
        })
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The request may proceed; the values belong in the response headers.
    Allow {
        /// Requests admitted per window
        limit: u64,
        /// Requests left in the current window
        remaining: u64,
        /// When the current window resets, in Unix seconds
        reset_epoch_secs: i64,
    },
    /// The caller is over its budget for the current window.
    Reject {
        /// Seconds until the window resets
        retry_after_secs: u64,
    },
}

impl Decision {
    /// Whether the request may proceed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow { .. })
    }
}

/// Per-identity fixed-window admission controller.
///
/// Windows live in a `DashMap`. `admit` performs its lookup, reset and
/// increment while holding the entry guard, so concurrent requests for the
/// same identity are serialised and the count is exact.
pub struct AdmissionController {
    policy: AdmissionPolicy,
    windows: DashMap<String, ClientWindow>,
}

impl AdmissionController {
    /// Create a controller enforcing `policy`.
    pub fn new(policy: AdmissionPolicy) -> Self {
        Self {
            policy,
            windows: DashMap::new(),
        }
    }

    /// The policy this controller enforces.
    pub fn policy(&self) -> AdmissionPolicy {
        self.policy
    }

    /// Count a request from `identity` at `now` and decide whether it may proceed.
    pub fn admit(&self, identity: &str, now: DateTime<Utc>) -> Decision {
        let mut window = self
            .windows
            .entry(identity.to_string())
            .or_insert_with(|| ClientWindow::open(identity, now, self.policy.window));

        if window.is_expired(now) {
            trace!(identity = %identity, "Window expired, opening a fresh one");
            *window = ClientWindow::open(identity, now, self.policy.window);
        }

        let count = window.record();

        if count > self.policy.max_requests {
            let retry_after_secs = window.retry_after_secs(now);
            debug!(
                identity = %identity,
                count,
                retry_after_secs,
                "Rate limit exceeded"
            );
            return Decision::Reject { retry_after_secs };
        }

        Decision::Allow {
            limit: self.policy.max_requests,
            remaining: self.policy.max_requests.saturating_sub(count),
            reset_epoch_secs: window.reset_epoch_secs(),
        }
    }

    /// Snapshot of the window currently held for `identity`.
    pub fn window(&self, identity: &str) -> Option<ClientWindow> {
        self.windows.get(identity).map(|w| w.value().clone())
    }

    /// Remove every window that has expired at `now`.
    ///
    /// An expired window would be replaced on the next request anyway, so
    /// sweeping never changes a decision. Returns the number removed.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let mut removed = 0;
        self.windows.retain(|_, window| {
            let expired = window.is_expired(now);
            if expired {
                removed += 1;
            }
            !expired
        });
        removed
    }

    /// Number of identities with a live or stale window.
    pub fn tracked_identities(&self) -> usize {
        self.windows.len()
    }

    /// Drop all windows.
    pub fn clear(&self) {
        self.windows.clear();
    }
}

impl Default for AdmissionController {
    fn default() -> Self {
        Self::new(AdmissionPolicy::default())
    }
}
