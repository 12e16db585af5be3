//! Per-identity rate limiting
//!
//! Fixed-window counting per (identity, operation class). The limiter never
//! waits: it answers immediately and the caller decides whether to reject
//! with a retry hint.

use crate::config::RateQuota;
use crate::identity::Identity;
use dashmap::DashMap;
use std::time::{Duration, Instant};

/// Classes of operations with distinct budgets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationClass {
    /// Listings and history reads
    Read,
    /// Message sends
    Send,
}

/// Outcome of a rate check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Within budget; the request was counted
    Allowed,
    /// Budget spent for this window
    Denied {
        /// Time until the window resets
        retry_after: Duration,
    },
}

impl Decision {
    /// Retry hint in whole seconds, rounded up and never zero
    #[inline]
    #[must_use]
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::Allowed => None,
            Self::Denied { retry_after } => {
                let secs = retry_after.as_secs();
                Some(if retry_after.subsec_nanos() > 0 {
                    secs + 1
                } else {
                    secs.max(1)
                })
            }
        }
    }
}

#[derive(Debug)]
struct RateWindow {
    window_start: Instant,
    count: u32,
}

/// Fixed-window rate limiter keyed by (identity, class)
#[derive(Debug)]
pub struct RateLimiter {
    read_quota: RateQuota,
    send_quota: RateQuota,
    windows: DashMap<(Identity, OperationClass), RateWindow>,
}

impl RateLimiter {
    /// Create a limiter with the given budgets
    #[inline]
    #[must_use]
    pub fn new(read_quota: RateQuota, send_quota: RateQuota) -> Self {
        Self {
            read_quota,
            send_quota,
            windows: DashMap::new(),
        }
    }

    fn quota(&self, class: OperationClass) -> RateQuota {
        match class {
            OperationClass::Read => self.read_quota,
            OperationClass::Send => self.send_quota,
        }
    }

    /// Check (and count) one request
    ///
    /// Counting and the limit check happen under the entry lock for the
    /// identity's window, so concurrent callers cannot push the count past
    /// the limit.
    pub fn check(&self, identity: &Identity, class: OperationClass) -> Decision {
        let quota = self.quota(class);
        let window = quota.window();
        let now = Instant::now();

        let mut entry = self
            .windows
            .entry((identity.clone(), class))
            .or_insert_with(|| RateWindow {
                window_start: now,
                count: 0,
            });

        if now.duration_since(entry.window_start) >= window {
            entry.window_start = now;
            entry.count = 0;
        }

        if entry.count < quota.limit {
            entry.count += 1;
            Decision::Allowed
        } else {
            let elapsed = now.duration_since(entry.window_start);
            Decision::Denied {
                retry_after: window.saturating_sub(elapsed),
            }
        }
    }

    /// Unused budget in the identity's current window
    #[must_use]
    pub fn remaining(&self, identity: &Identity, class: OperationClass) -> u32 {
        let quota = self.quota(class);
        match self.windows.get(&(identity.clone(), class)) {
            None => quota.limit,
            Some(entry) => {
                if entry.window_start.elapsed() >= quota.window() {
                    quota.limit
                } else {
                    quota.limit.saturating_sub(entry.count)
                }
            }
        }
    }

    /// Drop all windows (test hook)
    pub fn reset(&self) {
        self.windows.clear();
    }
}
