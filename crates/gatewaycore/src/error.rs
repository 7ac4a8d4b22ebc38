//! Gateway-wide error kinds and their HTTP response mapping.
//!
//! Every error a request-serving path can raise is represented here as a
//! variant of [`GatewayError`]. Startup-only failures (bad configuration,
//! listener bind failure) are represented separately since they never reach
//! an HTTP response.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;

/// Errors raised while loading or validating the configuration document.
///
/// These never produce an HTTP response; the binary logs them and exits.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration as JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("configuration is invalid: {0}")]
    Invalid(String),
}

/// Error kinds raised while serving a request, mapped 1:1 onto the status
/// codes and recovery actions of the error-handling design.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// No tenant matched the request's host/path.
    #[error("no tenant matched for host={host:?} path={path}")]
    NoTenantMatch { host: String, path: String },

    /// A tenant matched but it has no backend currently usable.
    #[error("no backend available for tenant {tenant}")]
    NoBackendAvailable { tenant: String },

    /// TCP/TLS-level failure reaching the upstream.
    #[error("upstream transport error: {0}")]
    UpstreamTransport(String),

    /// The upstream call exceeded its deadline.
    #[error("upstream timeout")]
    UpstreamTimeout,

    /// A script failed to register its routes/middleware.
    #[error("script registration failed: {0}")]
    ScriptRegistrationError(String),

    /// A script raised an error while handling a live request.
    #[error("script runtime error: {0}")]
    ScriptRuntimeError(String),

    /// A script exceeded its execution timeout.
    #[error("script execution timed out")]
    ScriptTimeout,

    /// A handler panicked; caught by the recovery guard.
    #[error("internal error")]
    PanicInHandler,
}

impl ResponseError for GatewayError {
    fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::NoTenantMatch { .. } => StatusCode::NOT_FOUND,
            GatewayError::NoBackendAvailable { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::UpstreamTransport(_) => StatusCode::BAD_GATEWAY,
            GatewayError::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::ScriptRegistrationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::ScriptRuntimeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::ScriptTimeout => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::PanicInHandler => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = serde_json::json!({
            "error": self.to_string(),
            "status": self.status_code().as_u16(),
        });

        // Registration errors never reach a live request; everything else
        // gets a generic body so upstream/script internals don't leak.
        let message = match self {
            GatewayError::ScriptRuntimeError(_) | GatewayError::ScriptTimeout | GatewayError::PanicInHandler => {
                serde_json::json!({ "error": "internal server error", "status": self.status_code().as_u16() })
            }
            _ => body,
        };

        HttpResponse::build(self.status_code()).json(message)
    }
}
