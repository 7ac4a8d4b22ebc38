//! Periodic, cooperative health probing of tenant backends.
//!
//! One [`HealthProbe`] task runs per tenant, sharing its router's backend
//! list. It never holds a lock on the request path: the only cross-task
//! communication is through the atomics on [`Backend`].

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use tokio::sync::watch;
use tokio::time::timeout;

use crate::matcher::TenantMatcher;
use crate::models::tenant::TenantRouter;

const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Spawns and owns the per-tenant health-check tasks.
pub struct HealthProbe {
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<tokio::task::JoinHandle<()>>,
}

impl HealthProbe {
    /// Spawn one probing task per tenant indexed in `matcher`, each on its
    /// own `health_interval_sec` cadence, sharing `client` for outbound
    /// calls. Tasks hold the matcher's `Arc` alive so they probe the exact
    /// `Backend` instances the dispatcher selects against.
    pub fn spawn(matcher: Arc<TenantMatcher>, client: reqwest::Client, interval_secs: &[u64]) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut handles = Vec::with_capacity(matcher.tenants().len());

        for (idx, interval_sec) in interval_secs.iter().enumerate() {
            let matcher = matcher.clone();
            let client = client.clone();
            let mut shutdown_rx = shutdown_rx.clone();
            let interval_sec = *interval_sec;

            let handle = tokio::spawn(async move {
                let mut ticker = tokio::time::interval(Duration::from_secs(interval_sec.max(1)));
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            probe_tenant(&matcher.tenants()[idx], &client).await;
                        }
                        _ = shutdown_rx.changed() => {
                            if *shutdown_rx.borrow() {
                                debug!("health probe for tenant '{}' shutting down", matcher.tenants()[idx].name);
                                return;
                            }
                        }
                    }
                }
            });
            handles.push(handle);
        }

        Self { shutdown_tx, handles }
    }

    /// Signal all probe tasks to stop and wait for them to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

async fn probe_tenant(tenant: &TenantRouter, client: &reqwest::Client) {
    for backend in tenant.backends() {
        let url = match backend.url.join(&backend.health_path) {
            Ok(url) => url,
            Err(err) => {
                warn!(
                    "tenant '{}' backend '{}' has an unjoinable health path: {err}",
                    tenant.name, backend.name
                );
                backend.set_alive(false);
                continue;
            }
        };

        let result = timeout(PROBE_TIMEOUT, client.get(url).send()).await;

        let healthy = match result {
            Ok(Ok(resp)) => resp.status() == reqwest::StatusCode::OK,
            Ok(Err(err)) => {
                debug!("health check transport error for '{}': {err}", backend.name);
                false
            }
            Err(_) => {
                debug!("health check timed out for '{}'", backend.name);
                false
            }
        };

        backend.set_alive(healthy);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::backend::Backend;
    use url::Url;

    #[test]
    fn starts_healthy_by_default_before_first_probe() {
        let b = Backend::new("b", Url::parse("http://127.0.0.1:1").unwrap(), "/health");
        assert!(b.is_alive());
    }

    async fn spawn_status_upstream(status: u16) -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let server = actix_web::HttpServer::new(move || {
            actix_web::App::new().default_service(actix_web::web::route().to(move || {
                let status = actix_web::http::StatusCode::from_u16(status).unwrap();
                async move { actix_web::HttpResponse::build(status).finish() }
            }))
        })
        .listen(listener)
        .expect("attach listener")
        .run();
        tokio::spawn(server);
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn probe_marks_alive_only_on_exact_200() {
        let upstream_200 = spawn_status_upstream(200).await;
        let upstream_201 = spawn_status_upstream(201).await;

        let backend_200 = Backend::new("ok", Url::parse(&upstream_200).unwrap(), "/health");
        let backend_201 = Backend::new("created", Url::parse(&upstream_201).unwrap(), "/health");
        backend_200.set_alive(false);
        backend_201.set_alive(true);

        let tenant = TenantRouter::new(
            "t",
            vec![backend_200, backend_201],
            None,
            vec!["t.example.com".to_string()],
            None,
        );
        let client = reqwest::Client::new();
        probe_tenant(&tenant, &client).await;

        assert!(tenant.backends()[0].is_alive());
        assert!(!tenant.backends()[1].is_alive());
    }
}
