//! Rate limiting primitives for auth flows.
//!
//! Limits are enforced per client IP and per identifier (email/phone) with
//! fixed one-minute windows held in process memory. Lookup misses and
//! verification failures share the same budget as successes, so probing is
//! throttled as hard as legitimate use.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug)]
pub enum RateLimitAction {
    Register,
    Login,
    SendCode,
    VerifyCode,
    ResetPassword,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited,
}

pub trait RateLimiter: Send + Sync {
    fn check_ip(&self, ip: Option<&str>, action: RateLimitAction) -> RateLimitDecision;
    fn check_identifier(&self, identifier: &str, action: RateLimitAction) -> RateLimitDecision;
}

#[derive(Clone, Debug)]
pub struct NoopRateLimiter;

impl RateLimiter for NoopRateLimiter {
    fn check_ip(&self, _ip: Option<&str>, _action: RateLimitAction) -> RateLimitDecision {
        RateLimitDecision::Allowed
    }

    fn check_identifier(&self, _identifier: &str, _action: RateLimitAction) -> RateLimitDecision {
        RateLimitDecision::Allowed
    }
}

const DEFAULT_WINDOW: Duration = Duration::from_secs(60);
// Sweep stale windows once the map grows past this many keys.
const SWEEP_THRESHOLD: usize = 4096;

const fn ip_limit(action: RateLimitAction) -> u32 {
    match action {
        RateLimitAction::Register | RateLimitAction::Login | RateLimitAction::VerifyCode => 10,
        RateLimitAction::SendCode | RateLimitAction::ResetPassword => 5,
    }
}

const fn identifier_limit(action: RateLimitAction) -> u32 {
    match action {
        RateLimitAction::SendCode => 3,
        RateLimitAction::Register
        | RateLimitAction::Login
        | RateLimitAction::VerifyCode
        | RateLimitAction::ResetPassword => 10,
    }
}

struct Window {
    started: Instant,
    count: u32,
}

/// Fixed-window in-memory limiter.
pub struct FixedWindowRateLimiter {
    window: Duration,
    windows: Mutex<HashMap<String, Window>>,
}

impl FixedWindowRateLimiter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            windows: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    fn check(&self, key: String, limit: u32) -> RateLimitDecision {
        let now = Instant::now();
        let mut windows = self
            .windows
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if windows.len() > SWEEP_THRESHOLD {
            let window = self.window;
            windows.retain(|_, entry| now.duration_since(entry.started) < window);
        }

        let entry = windows.entry(key).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.duration_since(entry.started) >= self.window {
            entry.started = now;
            entry.count = 0;
        }
        entry.count = entry.count.saturating_add(1);

        if entry.count > limit {
            RateLimitDecision::Limited
        } else {
            RateLimitDecision::Allowed
        }
    }
}

impl Default for FixedWindowRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter for FixedWindowRateLimiter {
    fn check_ip(&self, ip: Option<&str>, action: RateLimitAction) -> RateLimitDecision {
        // Requests without a resolvable client IP are not throttled here;
        // the identifier check still applies.
        let Some(ip) = ip else {
            return RateLimitDecision::Allowed;
        };
        self.check(format!("ip:{action:?}:{ip}"), ip_limit(action))
    }

    fn check_identifier(&self, identifier: &str, action: RateLimitAction) -> RateLimitDecision {
        self.check(
            format!("id:{action:?}:{identifier}"),
            identifier_limit(action),
        )
    }
}
