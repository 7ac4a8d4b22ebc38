//! HTTP route handlers: process probes and the admin surface.
//!
//! - [`health`] - Kubernetes-style liveness/readiness probes
//! - [`admin`] - `GET /health`, `GET /tenants`, `GET /metrics`, tenant-aware

pub mod admin;
pub mod health;
