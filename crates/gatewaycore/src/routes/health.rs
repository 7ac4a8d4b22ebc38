//! Kubernetes-style liveness/readiness probes.
//!
//! These are process-level checks independent of tenant state; the
//! tenant-aware health summary lives on the admin surface, see
//! [`crate::routes::admin`].

use actix_web::{web, HttpResponse, Result};
use serde_json::json;

pub async fn readiness_check() -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(json!({
        "status": "ready",
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}

pub async fn liveness_check() -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(json!({
        "status": "alive",
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}

pub fn configure_health(cfg: &mut web::ServiceConfig) {
    cfg.route("/ready", web::get().to(readiness_check))
        .route("/live", web::get().to(liveness_check));
}
