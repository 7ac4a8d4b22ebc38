//! Core library for the multi-tenant reverse-proxy gateway: tenant
//! matching, load balancing and circuit breaking, health probing, the
//! reverse proxy itself, the embedded scripting sandbox, and the HTTP
//! surface (admin routes and middleware) that the `gatewayd` binary wires
//! together.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod logs;
pub mod matcher;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod scripting;
pub mod services;
