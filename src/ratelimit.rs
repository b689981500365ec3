//! Per-client fixed-window request limiter.
//!
//! Each client key owns a `{window_start, request_count}` pair. A window
//! resets wholesale once it is older than the configured duration. All state
//! lives behind one mutex inside the [`RateLimiter`], and the map never grows
//! past its capacity: expired windows are swept periodically and whenever the
//! map is full, and the oldest window is evicted if a sweep frees nothing.

use std::collections::HashMap;
use std::future::Future;
use std::net::IpAddr;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

pub const HEADER_LIMIT: &str = "X-RateLimit-Limit";
pub const HEADER_REMAINING: &str = "X-RateLimit-Remaining";
pub const HEADER_RESET: &str = "X-RateLimit-Reset";
pub const TOO_MANY_REQUESTS: u16 = 429;
pub const DENIED_BODY: &str = "Rate limit exceeded. Please try again later.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
    pub capacity: usize,
    pub sweep_interval: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window: Duration::seconds(60),
            capacity: 10_000,
            sweep_interval: Duration::seconds(300),
        }
    }
}

/// Identity a request is counted against.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey(String);

impl ClientKey {
    /// Prefers the authenticated subject, then the peer address.
    pub fn from_request(subject: Option<&str>, addr: Option<IpAddr>) -> Self {
        match (subject.filter(|s| !s.is_empty()), addr) {
            (Some(subject), _) => ClientKey(format!("user_{subject}")),
            (None, Some(addr)) => ClientKey(addr.to_string()),
            (None, None) => ClientKey("unknown".to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Window {
    start: DateTime<Utc>,
    count: u32,
}

#[derive(Debug)]
struct LimiterState {
    windows: HashMap<ClientKey, Window>,
    last_sweep: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitHeaders {
    pub limit: u32,
    pub remaining: u32,
    pub reset: i64,
}

impl RateLimitHeaders {
    pub fn pairs(&self) -> [(&'static str, String); 3] {
        [
            (HEADER_LIMIT, self.limit.to_string()),
            (HEADER_REMAINING, self.remaining.to_string()),
            (HEADER_RESET, self.reset.to_string()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allowed(RateLimitHeaders),
    Denied(RateLimitHeaders),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed(_))
    }

    pub fn headers(&self) -> &RateLimitHeaders {
        match self {
            Decision::Allowed(headers) | Decision::Denied(headers) => headers,
        }
    }
}

/// The response a denied request receives instead of running its handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub status: u16,
    pub headers: RateLimitHeaders,
    pub body: &'static str,
}

/// A handler's output together with the headers to attach to it.
#[derive(Debug, Clone, PartialEq)]
pub struct Admitted<T> {
    pub headers: RateLimitHeaders,
    pub value: T,
}

#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            state: Mutex::new(LimiterState {
                windows: HashMap::new(),
                last_sweep: None,
            }),
        }
    }

    pub fn check(&self, key: &ClientKey) -> Decision {
        self.check_at(key, Utc::now())
    }

    pub fn check_at(&self, key: &ClientKey, now: DateTime<Utc>) -> Decision {
        let mut guard = self.lock();
        let state = &mut *guard;

        let sweep_due = state
            .last_sweep
            .map_or(true, |at| now - at >= self.config.sweep_interval);
        if sweep_due {
            self.sweep(state, now);
        }

        let limit = self.config.max_requests;
        match state.windows.get_mut(key) {
            Some(window) if now - window.start > self.config.window => {
                *window = Window { start: now, count: 1 };
                Decision::Allowed(self.headers(window))
            }
            Some(window) if window.count < limit => {
                window.count += 1;
                Decision::Allowed(self.headers(window))
            }
            Some(window) => {
                let mut headers = self.headers(window);
                headers.remaining = 0;
                warn!(client = key.as_str(), limit, "rate limit exceeded");
                Decision::Denied(headers)
            }
            None => {
                if state.windows.len() >= self.config.capacity {
                    self.make_room(state, now);
                }
                let window = Window { start: now, count: 1 };
                state.windows.insert(key.clone(), window);
                Decision::Allowed(self.headers(&window))
            }
        }
    }

    /// Runs `handler` only when `key` is admitted.
    pub async fn guard<F, Fut, T>(
        &self,
        key: &ClientKey,
        handler: F,
    ) -> Result<Admitted<T>, Rejection>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        match self.check(key) {
            Decision::Allowed(headers) => Ok(Admitted {
                headers,
                value: handler().await,
            }),
            Decision::Denied(headers) => Err(Rejection {
                status: TOO_MANY_REQUESTS,
                headers,
                body: DENIED_BODY,
            }),
        }
    }

    pub fn tracked_clients(&self) -> usize {
        self.lock().windows.len()
    }

    fn lock(&self) -> MutexGuard<'_, LimiterState> {
        // Poisoning is ignored: the map only holds plain counters.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn headers(&self, window: &Window) -> RateLimitHeaders {
        RateLimitHeaders {
            limit: self.config.max_requests,
            remaining: self.config.max_requests.saturating_sub(window.count),
            reset: (window.start + self.config.window).timestamp(),
        }
    }

    fn sweep(&self, state: &mut LimiterState, now: DateTime<Utc>) {
        let before = state.windows.len();
        let window = self.config.window;
        state.windows.retain(|_, w| now - w.start <= window);
        state.last_sweep = Some(now);
        debug!(
            removed = before - state.windows.len(),
            remaining = state.windows.len(),
            "swept expired rate limit windows"
        );
    }

    fn make_room(&self, state: &mut LimiterState, now: DateTime<Utc>) {
        self.sweep(state, now);
        if state.windows.len() < self.config.capacity {
            return;
        }
        let oldest = state
            .windows
            .iter()
            .min_by_key(|(_, w)| w.start)
            .map(|(key, _)| key.clone());
        if let Some(key) = oldest {
            state.windows.remove(&key);
            debug!(client = key.as_str(), "evicted oldest rate limit window");
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}
