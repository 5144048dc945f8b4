//! Rate limiting primitives for the admin API.
//!
//! Fixed windows keyed by source IP, checked before any auth logic runs.
//! State is process-local and in-memory; multiple instances each enforce
//! independent windows (single-instance scope, see DESIGN.md).

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

const GENERAL_LIMIT: u32 = 100;
const GENERAL_WINDOW: Duration = Duration::from_secs(15 * 60);
const LOGIN_LIMIT: u32 = 5;
const LOGIN_WINDOW: Duration = Duration::from_secs(60);

/// Buckets with separate ceilings. The login route is stricter than the
/// general API.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum RateLimitScope {
    General,
    Login,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited,
}

pub trait RateLimiter: Send + Sync {
    fn check(&self, ip: Option<&str>, scope: RateLimitScope) -> RateLimitDecision;
}

/// Limiter that always allows; used in tests that are not about limits.
#[derive(Clone, Debug)]
pub struct NoopRateLimiter;

impl RateLimiter for NoopRateLimiter {
    fn check(&self, _ip: Option<&str>, _scope: RateLimitScope) -> RateLimitDecision {
        RateLimitDecision::Allowed
    }
}

#[derive(Clone, Copy, Debug)]
struct WindowConfig {
    limit: u32,
    window: Duration,
}

#[derive(Clone, Copy, Debug)]
struct Window {
    started: Instant,
    count: u32,
}

/// In-memory fixed-window counter per (scope, source IP).
#[derive(Debug)]
pub struct WindowRateLimiter {
    general: WindowConfig,
    login: WindowConfig,
    windows: Mutex<HashMap<(RateLimitScope, String), Window>>,
}

impl Default for WindowRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowRateLimiter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            general: WindowConfig {
                limit: GENERAL_LIMIT,
                window: GENERAL_WINDOW,
            },
            login: WindowConfig {
                limit: LOGIN_LIMIT,
                window: LOGIN_WINDOW,
            },
            windows: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn with_general_window(mut self, limit: u32, window: Duration) -> Self {
        self.general = WindowConfig { limit, window };
        self
    }

    #[must_use]
    pub fn with_login_window(mut self, limit: u32, window: Duration) -> Self {
        self.login = WindowConfig { limit, window };
        self
    }

    fn config(&self, scope: RateLimitScope) -> WindowConfig {
        match scope {
            RateLimitScope::General => self.general,
            RateLimitScope::Login => self.login,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<(RateLimitScope, String), Window>> {
        self.windows.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RateLimiter for WindowRateLimiter {
    fn check(&self, ip: Option<&str>, scope: RateLimitScope) -> RateLimitDecision {
        let config = self.config(scope);
        // Requests without a resolvable source IP share one bucket rather
        // than bypassing the limiter.
        let key = (scope, ip.unwrap_or("unknown").to_string());
        let now = Instant::now();

        let mut windows = self.lock();
        // Drop long-expired windows so the map stays bounded by active sources.
        let longest = self.general.window.max(self.login.window);
        windows.retain(|_, window| now.duration_since(window.started) < longest);

        let window = windows.entry(key).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.duration_since(window.started) >= config.window {
            window.started = now;
            window.count = 0;
        }
        window.count += 1;
        if window.count > config.limit {
            RateLimitDecision::Limited
        } else {
            RateLimitDecision::Allowed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_rate_limiter_allows() {
        let limiter = NoopRateLimiter;
        assert_eq!(
            limiter.check(None, RateLimitScope::Login),
            RateLimitDecision::Allowed
        );
    }

    #[test]
    fn login_window_limits_after_five_attempts() {
        let limiter = WindowRateLimiter::new();
        for _ in 0..5 {
            assert_eq!(
                limiter.check(Some("1.2.3.4"), RateLimitScope::Login),
                RateLimitDecision::Allowed
            );
        }
        assert_eq!(
            limiter.check(Some("1.2.3.4"), RateLimitScope::Login),
            RateLimitDecision::Limited
        );
    }

    #[test]
    fn windows_are_scoped_per_ip() {
        let limiter = WindowRateLimiter::new();
        for _ in 0..5 {
            limiter.check(Some("1.2.3.4"), RateLimitScope::Login);
        }
        assert_eq!(
            limiter.check(Some("5.6.7.8"), RateLimitScope::Login),
            RateLimitDecision::Allowed
        );
    }

    #[test]
    fn login_and_general_windows_are_independent() {
        let limiter = WindowRateLimiter::new();
        for _ in 0..6 {
            limiter.check(Some("1.2.3.4"), RateLimitScope::Login);
        }
        assert_eq!(
            limiter.check(Some("1.2.3.4"), RateLimitScope::General),
            RateLimitDecision::Allowed
        );
    }

    #[test]
    fn window_resets_after_expiry() {
        let limiter =
            WindowRateLimiter::new().with_login_window(1, std::time::Duration::from_millis(10));
        assert_eq!(
            limiter.check(Some("1.2.3.4"), RateLimitScope::Login),
            RateLimitDecision::Allowed
        );
        assert_eq!(
            limiter.check(Some("1.2.3.4"), RateLimitScope::Login),
            RateLimitDecision::Limited
        );
        std::thread::sleep(std::time::Duration::from_millis(15));
        assert_eq!(
            limiter.check(Some("1.2.3.4"), RateLimitScope::Login),
            RateLimitDecision::Allowed
        );
    }

    #[test]
    fn missing_ip_shares_one_bucket() {
        let limiter = WindowRateLimiter::new().with_login_window(2, GENERAL_WINDOW);
        assert_eq!(
            limiter.check(None, RateLimitScope::Login),
            RateLimitDecision::Allowed
        );
        assert_eq!(
            limiter.check(None, RateLimitScope::Login),
            RateLimitDecision::Allowed
        );
        assert_eq!(
            limiter.check(None, RateLimitScope::Login),
            RateLimitDecision::Limited
        );
    }
}
