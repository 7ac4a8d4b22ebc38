//! Prometheus-compatible metrics for gateway observability.
//!
//! Ambient infrastructure: tracked regardless of which tenant features are
//! in use, and exposed on the admin surface alongside `/health`/`/tenants`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Thread-safe, lock-free counters and a small response-time histogram.
///
/// Cheap to clone: every field is an `Arc`, so cloning shares state rather
/// than copying it.
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    pub requests_total: Arc<AtomicU64>,
    pub requests_success: Arc<AtomicU64>,
    pub requests_error: Arc<AtomicU64>,
    pub response_time_sum_ms: Arc<AtomicU64>,
    pub active_connections: Arc<AtomicU64>,
    pub peak_connections: Arc<AtomicU64>,
    pub response_time_bucket_100ms: Arc<AtomicU64>,
    pub response_time_bucket_500ms: Arc<AtomicU64>,
    pub response_time_bucket_1s: Arc<AtomicU64>,
    pub response_time_bucket_5s: Arc<AtomicU64>,
    pub response_time_bucket_inf: Arc<AtomicU64>,
    pub http_4xx_errors: Arc<AtomicU64>,
    pub http_5xx_errors: Arc<AtomicU64>,
    pub timeout_errors: Arc<AtomicU64>,
    pub script_errors: Arc<AtomicU64>,
    start_time: Instant,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self {
            requests_total: Arc::new(AtomicU64::new(0)),
            requests_success: Arc::new(AtomicU64::new(0)),
            requests_error: Arc::new(AtomicU64::new(0)),
            response_time_sum_ms: Arc::new(AtomicU64::new(0)),
            active_connections: Arc::new(AtomicU64::new(0)),
            peak_connections: Arc::new(AtomicU64::new(0)),
            response_time_bucket_100ms: Arc::new(AtomicU64::new(0)),
            response_time_bucket_500ms: Arc::new(AtomicU64::new(0)),
            response_time_bucket_1s: Arc::new(AtomicU64::new(0)),
            response_time_bucket_5s: Arc::new(AtomicU64::new(0)),
            response_time_bucket_inf: Arc::new(AtomicU64::new(0)),
            http_4xx_errors: Arc::new(AtomicU64::new(0)),
            http_5xx_errors: Arc::new(AtomicU64::new(0)),
            timeout_errors: Arc::new(AtomicU64::new(0)),
            script_errors: Arc::new(AtomicU64::new(0)),
            start_time: Instant::now(),
        }
    }
}

impl MetricsCollector {
    pub fn record_request(&self, status_code: u16, response_time: Duration) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        self.response_time_sum_ms
            .fetch_add(response_time.as_millis() as u64, Ordering::Relaxed);

        let ms = response_time.as_millis() as u64;
        if ms <= 100 {
            self.response_time_bucket_100ms.fetch_add(1, Ordering::Relaxed);
        }
        if ms <= 500 {
            self.response_time_bucket_500ms.fetch_add(1, Ordering::Relaxed);
        }
        if ms <= 1000 {
            self.response_time_bucket_1s.fetch_add(1, Ordering::Relaxed);
        }
        if ms <= 5000 {
            self.response_time_bucket_5s.fetch_add(1, Ordering::Relaxed);
        } else {
            self.response_time_bucket_inf.fetch_add(1, Ordering::Relaxed);
        }

        if (200..400).contains(&status_code) {
            self.requests_success.fetch_add(1, Ordering::Relaxed);
        } else {
            self.requests_error.fetch_add(1, Ordering::Relaxed);
            match status_code {
                400..=499 => {
                    self.http_4xx_errors.fetch_add(1, Ordering::Relaxed);
                }
                500..=599 => {
                    self.http_5xx_errors.fetch_add(1, Ordering::Relaxed);
                }
                _ => {}
            }
        }
    }

    pub fn record_timeout(&self) {
        self.timeout_errors.fetch_add(1, Ordering::Relaxed);
        self.requests_error.fetch_add(1, Ordering::Relaxed);
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_script_error(&self) {
        self.script_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_connections(&self) {
        let current = self.active_connections.fetch_add(1, Ordering::Relaxed) + 1;
        let mut peak = self.peak_connections.load(Ordering::Relaxed);
        while current > peak {
            match self.peak_connections.compare_exchange_weak(
                peak,
                current,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(new_peak) => peak = new_peak,
            }
        }
    }

    pub fn decrement_connections(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Render the current snapshot in Prometheus exposition format.
    pub fn render_prometheus(&self) -> String {
        let total = self.requests_total.load(Ordering::Relaxed);
        let success = self.requests_success.load(Ordering::Relaxed);
        let error = self.requests_error.load(Ordering::Relaxed);
        let sum_ms = self.response_time_sum_ms.load(Ordering::Relaxed);
        let avg = if total > 0 { sum_ms as f64 / total as f64 } else { 0.0 };
        let success_rate = if total > 0 {
            (success as f64 / total as f64) * 100.0
        } else {
            100.0
        };

        format!(
            "# HELP gateway_requests_total Total number of HTTP requests\n\
             # TYPE gateway_requests_total counter\n\
             gateway_requests_total {total}\n\
             \n\
             # HELP gateway_requests_success_total Successful HTTP requests\n\
             # TYPE gateway_requests_success_total counter\n\
             gateway_requests_success_total {success}\n\
             \n\
             # HELP gateway_requests_error_total Failed HTTP requests\n\
             # TYPE gateway_requests_error_total counter\n\
             gateway_requests_error_total {error}\n\
             \n\
             # HELP gateway_http_4xx_errors_total Client errors\n\
             # TYPE gateway_http_4xx_errors_total counter\n\
             gateway_http_4xx_errors_total {}\n\
             \n\
             # HELP gateway_http_5xx_errors_total Server errors\n\
             # TYPE gateway_http_5xx_errors_total counter\n\
             gateway_http_5xx_errors_total {}\n\
             \n\
             # HELP gateway_timeout_errors_total Upstream timeouts\n\
             # TYPE gateway_timeout_errors_total counter\n\
             gateway_timeout_errors_total {}\n\
             \n\
             # HELP gateway_script_errors_total Script runtime/timeout errors\n\
             # TYPE gateway_script_errors_total counter\n\
             gateway_script_errors_total {}\n\
             \n\
             # HELP gateway_response_time_avg_ms Average response time\n\
             # TYPE gateway_response_time_avg_ms gauge\n\
             gateway_response_time_avg_ms {avg:.2}\n\
             \n\
             # HELP gateway_response_time_bucket Response time histogram\n\
             # TYPE gateway_response_time_bucket histogram\n\
             gateway_response_time_bucket{{le=\"100\"}} {}\n\
             gateway_response_time_bucket{{le=\"500\"}} {}\n\
             gateway_response_time_bucket{{le=\"1000\"}} {}\n\
             gateway_response_time_bucket{{le=\"5000\"}} {}\n\
             gateway_response_time_bucket{{le=\"+Inf\"}} {}\n\
             \n\
             # HELP gateway_success_rate Success rate percentage\n\
             # TYPE gateway_success_rate gauge\n\
             gateway_success_rate {success_rate:.2}\n\
             \n\
             # HELP gateway_active_connections Active connections\n\
             # TYPE gateway_active_connections gauge\n\
             gateway_active_connections {}\n\
             \n\
             # HELP gateway_peak_connections Peak concurrent connections\n\
             # TYPE gateway_peak_connections gauge\n\
             gateway_peak_connections {}\n\
             \n\
             # HELP gateway_uptime_seconds Service uptime\n\
             # TYPE gateway_uptime_seconds counter\n\
             gateway_uptime_seconds {}\n",
            self.http_4xx_errors.load(Ordering::Relaxed),
            self.http_5xx_errors.load(Ordering::Relaxed),
            self.timeout_errors.load(Ordering::Relaxed),
            self.script_errors.load(Ordering::Relaxed),
            self.response_time_bucket_100ms.load(Ordering::Relaxed),
            self.response_time_bucket_500ms.load(Ordering::Relaxed),
            self.response_time_bucket_1s.load(Ordering::Relaxed),
            self.response_time_bucket_5s.load(Ordering::Relaxed),
            self.response_time_bucket_inf.load(Ordering::Relaxed),
            self.active_connections.load(Ordering::Relaxed),
            self.peak_connections.load(Ordering::Relaxed),
            self.uptime().as_secs(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_and_error_classified_correctly() {
        let m = MetricsCollector::default();
        m.record_request(200, Duration::from_millis(10));
        m.record_request(503, Duration::from_millis(10));
        assert_eq!(m.requests_success.load(Ordering::Relaxed), 1);
        assert_eq!(m.requests_error.load(Ordering::Relaxed), 1);
        assert_eq!(m.http_5xx_errors.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn peak_connections_tracks_maximum() {
        let m = MetricsCollector::default();
        m.increment_connections();
        m.increment_connections();
        m.decrement_connections();
        assert_eq!(m.peak_connections.load(Ordering::Relaxed), 2);
        assert_eq!(m.active_connections.load(Ordering::Relaxed), 1);
    }
}
