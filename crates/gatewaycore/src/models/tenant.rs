//! `TenantRouter`: an immutable backend pool plus a lock-free round-robin
//! selector, owned by the matcher and referenced (non-owning) by the
//! dispatcher and script registry.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::models::backend::Backend;

/// A tenant's pool of backends and the cursor that load-balances across
/// them.
///
/// The set of backends is immutable after construction; only the inner
/// atomics of each [`Backend`] and the router's own cursor mutate.
#[derive(Debug)]
pub struct TenantRouter {
    pub name: String,
    backends: Vec<Backend>,
    cursor: AtomicUsize,
    /// Path prefix this tenant claims, if any (path-based or hybrid match).
    pub path_prefix: Option<String>,
    /// Host domains this tenant claims, if any (host-based or hybrid match).
    pub domains: Vec<String>,
    /// Script tag used to look up this tenant's script in the script engine.
    pub script_tag: Option<String>,
}

impl TenantRouter {
    pub fn new(
        name: impl Into<String>,
        backends: Vec<Backend>,
        path_prefix: Option<String>,
        domains: Vec<String>,
        script_tag: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            backends,
            cursor: AtomicUsize::new(0),
            path_prefix,
            domains,
            script_tag,
        }
    }

    pub fn backends(&self) -> &[Backend] {
        &self.backends
    }

    pub fn is_hybrid(&self) -> bool {
        self.path_prefix.is_some() && !self.domains.is_empty()
    }

    /// Select the next backend using an atomic fetch-add round-robin
    /// cursor, skipping non-selectable backends, with a last-resort
    /// fallback to the backend at the raw cursor position when none are
    /// selectable. Returns `None` only when the pool is empty.
    pub fn next_backend(&self) -> Option<&Backend> {
        let len = self.backends.len();
        if len == 0 {
            return None;
        }

        let start = self.cursor.fetch_add(1, Ordering::Relaxed) % len;
        for offset in 0..len {
            let idx = (start + offset) % len;
            let candidate = &self.backends[idx];
            if candidate.is_selectable() {
                return Some(candidate);
            }
        }

        // Nothing selectable: last-resort fallback so the proxy layer can
        // surface a real upstream error instead of a synthetic 502.
        Some(&self.backends[start])
    }

    /// `"alive/total healthy"` summary used by the admin health endpoint.
    pub fn health_summary(&self) -> String {
        let total = self.backends.len();
        let healthy = self.backends.iter().filter(|b| b.is_selectable()).count();
        format!("{healthy}/{total} healthy")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn backend(name: &str) -> Backend {
        Backend::new(name, Url::parse("http://127.0.0.1:9000").unwrap(), "/healthz")
    }

    fn router(n: usize) -> TenantRouter {
        let backends = (0..n).map(|i| backend(&format!("b{i}"))).collect();
        TenantRouter::new("t", backends, None, vec![], None)
    }

    #[test]
    fn round_robin_covers_every_backend_equally() {
        let r = router(3);
        let mut counts = [0usize; 3];
        for _ in 0..9 {
            let name = &r.next_backend().unwrap().name;
            let idx: usize = name.trim_start_matches('b').parse().unwrap();
            counts[idx] += 1;
        }
        assert_eq!(counts, [3, 3, 3]);
    }

    #[test]
    fn empty_pool_returns_none() {
        let r = router(0);
        assert!(r.next_backend().is_none());
    }

    #[test]
    fn fallback_when_all_unhealthy() {
        let r = router(2);
        for b in r.backends() {
            b.set_alive(false);
        }
        assert!(r.next_backend().is_some());
    }

    #[test]
    fn breaker_skips_open_backend() {
        let r = router(2);
        for _ in 0..crate::models::backend::FAILURE_THRESHOLD {
            r.backends()[0].record_failure();
        }
        for _ in 0..10 {
            let b = r.next_backend().unwrap();
            assert_eq!(b.name, "b1");
        }
    }
}
