//! Admin HTTP surface: `GET /health` and `GET /tenants`.
//!
//! Mounted under `admin_base_path` ahead of tenant routing in the
//! dispatcher's composition order (see [`crate::dispatcher`]).

use actix_web::{web, HttpResponse, Result};
use serde::Serialize;
use serde_json::json;

use crate::matcher::TenantMatcher;
use crate::services::metrics::MetricsCollector;

/// Shared state handed to the admin handlers.
pub struct AdminState {
    pub matcher: std::sync::Arc<TenantMatcher>,
    pub metrics: MetricsCollector,
}

#[derive(Serialize)]
struct BackendSummary {
    name: String,
    url: String,
    alive: bool,
    breaker_open: bool,
}

#[derive(Serialize)]
struct TenantSummary {
    name: String,
    domains: Vec<String>,
    path_prefix: Option<String>,
    backends: Vec<BackendSummary>,
}

/// `GET /health` — aggregate status across every tenant's backend pool.
pub async fn health(state: web::Data<AdminState>) -> Result<HttpResponse> {
    let mut tenants = serde_json::Map::new();
    let mut any_unhealthy = false;

    for tenant in state.matcher.tenants() {
        let healthy = tenant.backends().iter().filter(|b| b.is_selectable()).count();
        let total = tenant.backends().len();
        if healthy == 0 && total > 0 {
            any_unhealthy = true;
        }
        tenants.insert(tenant.name.clone(), json!(tenant.health_summary()));
    }

    let status = if any_unhealthy { "degraded" } else { "healthy" };

    Ok(HttpResponse::Ok().json(json!({
        "status": status,
        "tenants": tenants,
        "uptime": state.metrics.uptime().as_secs(),
        "version": env!("CARGO_PKG_VERSION"),
    })))
}

/// `GET /tenants` — per-tenant routing and backend detail.
pub async fn tenants(state: web::Data<AdminState>) -> Result<HttpResponse> {
    let summaries: Vec<TenantSummary> = state
        .matcher
        .tenants()
        .iter()
        .map(|tenant| TenantSummary {
            name: tenant.name.clone(),
            domains: tenant.domains.clone(),
            path_prefix: tenant.path_prefix.clone(),
            backends: tenant
                .backends()
                .iter()
                .map(|b| BackendSummary {
                    name: b.name.clone(),
                    url: b.url.to_string(),
                    alive: b.is_alive(),
                    breaker_open: b.is_breaker_open(),
                })
                .collect(),
        })
        .collect();

    Ok(HttpResponse::Ok().json(summaries))
}

/// `GET /metrics` — Prometheus exposition of the process-wide counters.
pub async fn metrics(state: web::Data<AdminState>) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(state.metrics.render_prometheus())
}

pub fn configure_admin(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/tenants", web::get().to(tenants))
        .route("/metrics", web::get().to(metrics));
}
