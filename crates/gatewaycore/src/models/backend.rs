//! Upstream endpoint and its lock-free liveness/breaker state.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use url::Url;

/// Number of consecutive upstream failures that opens the breaker.
pub const FAILURE_THRESHOLD: u32 = 5;

/// How long a backend stays excluded from selection once its breaker opens.
pub const OPEN_DURATION_SECS: i64 = 30;

/// A concrete upstream endpoint serving a tenant's traffic.
///
/// All mutable state is atomic so the load balancer's hot path never takes
/// a lock. `url` is immutable after construction.
#[derive(Debug)]
pub struct Backend {
    /// Friendly name from configuration, used in logs and the admin surface.
    pub name: String,
    /// Parsed upstream URL (scheme, host, optional base path/query).
    pub url: Url,
    /// Path probed by the health check (e.g. `/healthz`).
    pub health_path: String,
    alive: AtomicBool,
    consecutive_failures: AtomicU32,
    /// Milliseconds since epoch until which the breaker is open; 0 = closed.
    breaker_open_until: AtomicI64,
}

impl Backend {
    pub fn new(name: impl Into<String>, url: Url, health_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url,
            health_path: health_path.into(),
            alive: AtomicBool::new(true),
            consecutive_failures: AtomicU32::new(0),
            breaker_open_until: AtomicI64::new(0),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }

    pub fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::Relaxed);
    }

    /// True when the breaker is currently open (backend should be skipped).
    pub fn is_breaker_open(&self) -> bool {
        let open_until = self.breaker_open_until.load(Ordering::Relaxed);
        open_until != 0 && open_until > now_millis()
    }

    /// A backend is selectable when alive and not breaker-open.
    pub fn is_selectable(&self) -> bool {
        self.is_alive() && !self.is_breaker_open()
    }

    /// Record an observed upstream failure (TCP/TLS error or 5xx response).
    pub fn record_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures >= FAILURE_THRESHOLD {
            self.breaker_open_until
                .store(now_millis() + OPEN_DURATION_SECS * 1000, Ordering::Relaxed);
            self.consecutive_failures.store(0, Ordering::Relaxed);
        }
    }

    /// Record an observed upstream success: closes the breaker and resets
    /// the failure streak.
    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        self.breaker_open_until.store(0, Ordering::Relaxed);
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_millis() as i64
}
