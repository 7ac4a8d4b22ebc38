//! Embedded scripting sandbox: tenant-authored routes and middleware,
//! mounted into the dispatcher alongside the built-in proxy.
//!
//! - [`pattern`] - route pattern compilation shared by script routing
//! - [`registry`] - per-tenant scratch/committed route and middleware sets
//! - [`pool`] - bounded pool of `rhai` interpreters
//! - [`bindings`] - functions exposed to scripts at each execution phase
//! - [`engine`] - directory scan, registration runs, request-time execution

pub mod bindings;
pub mod engine;
pub mod pattern;
pub mod pool;
pub mod registry;
