//! Reverse-proxy request rewriting and streaming response forwarding.
//!
//! For a `(backend, strip_prefix)` pair, [`ProxyBuilder`] produces an
//! outbound request, forwards it on the shared pooled client, and streams
//! the response back to the client without buffering the full body.

use std::time::Duration;

use actix_web::http::header::{HeaderName, HeaderValue};
use actix_web::{web, HttpRequest, HttpResponse};
use futures_util::StreamExt;
use log::debug;

use crate::error::GatewayError;
use crate::models::backend::Backend;

const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(30);

/// Headers stripped from the outbound request: hop-by-hop headers that do
/// not belong on a forwarded call.
const HOP_HEADERS: &[&str] = &["host", "connection", "upgrade", "proxy-connection"];

/// Builds and executes the rewritten outbound request for a matched
/// `(backend, strip_prefix)` pair.
pub struct ProxyBuilder {
    client: reqwest::Client,
}

impl ProxyBuilder {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Rewrite `req`'s target against `backend`, applying `strip_prefix`,
    /// forward it, and stream the response back. On upstream failure the
    /// backend's breaker is updated via [`Backend::record_failure`]/
    /// [`Backend::record_success`] before the error is mapped.
    pub async fn forward(
        &self,
        req: &HttpRequest,
        body: web::Payload,
        backend: &Backend,
        strip_prefix: &str,
    ) -> Result<HttpResponse, GatewayError> {
        let target_url = self.build_target_url(req, backend, strip_prefix);
        debug!("proxying {} {} -> {}", req.method(), req.uri(), target_url);

        let method =
            reqwest::Method::from_bytes(req.method().as_str().as_bytes()).unwrap_or(reqwest::Method::GET);

        let body_stream = body.map(|chunk| chunk.map_err(std::io::Error::other));

        let mut builder = self
            .client
            .request(method, target_url)
            .body(reqwest::Body::wrap_stream(body_stream))
            .timeout(DEFAULT_UPSTREAM_TIMEOUT);

        for (name, value) in req.headers() {
            let lower = name.as_str().to_ascii_lowercase();
            if HOP_HEADERS.contains(&lower.as_str()) {
                continue;
            }
            if let Ok(v) = reqwest::header::HeaderValue::from_bytes(value.as_bytes()) {
                builder = builder.header(name.as_str(), v);
            }
        }

        builder = self.apply_forwarded_headers(builder, req, backend);

        let response = match builder.send().await {
            Ok(resp) => resp,
            Err(err) if err.is_timeout() => {
                backend.record_failure();
                return Err(GatewayError::UpstreamTimeout);
            }
            Err(err) => {
                backend.record_failure();
                return Err(GatewayError::UpstreamTransport(err.to_string()));
            }
        };

        let status = response.status();
        if status.is_server_error() {
            backend.record_failure();
        } else {
            backend.record_success();
        }

        let mut client_resp = HttpResponse::build(
            actix_web::http::StatusCode::from_u16(status.as_u16())
                .unwrap_or(actix_web::http::StatusCode::BAD_GATEWAY),
        );

        for (name, value) in response.headers() {
            if HOP_HEADERS.contains(&name.as_str().to_ascii_lowercase().as_str()) {
                continue;
            }
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_str().as_bytes()),
                HeaderValue::from_bytes(value.as_bytes()),
            ) {
                client_resp.insert_header((name, value));
            }
        }

        let byte_stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| actix_web::error::ErrorBadGateway(e.to_string())));

        Ok(client_resp.streaming(byte_stream))
    }

    /// Rewrite scheme/host/path/query against `backend` per the request
    /// path transformation and query-merge rules.
    fn build_target_url(&self, req: &HttpRequest, backend: &Backend, strip_prefix: &str) -> String {
        let mut path = req.path();
        if !strip_prefix.is_empty() {
            if let Some(stripped) = path.strip_prefix(strip_prefix) {
                path = stripped;
            }
        }
        let mut path = if path.is_empty() {
            "/".to_string()
        } else if !path.starts_with('/') {
            format!("/{path}")
        } else {
            path.to_string()
        };

        let base_path = backend.url.path().trim_end_matches('/');
        if !base_path.is_empty() {
            path = format!("{base_path}{path}");
        }

        let mut url = backend.url.clone();
        url.set_path(&path);

        let backend_query = backend.url.query().map(str::to_string);
        let request_query = req.uri().query().map(str::to_string);
        let merged_query = match (backend_query, request_query) {
            (Some(b), Some(r)) => Some(format!("{b}&{r}")),
            (Some(b), None) => Some(b),
            (None, Some(r)) => Some(r),
            (None, None) => None,
        };
        url.set_query(merged_query.as_deref());

        url.to_string()
    }

    /// Append `X-Forwarded-Host`, `X-Forwarded-Proto`, `X-Forwarded-For`.
    fn apply_forwarded_headers(
        &self,
        mut builder: reqwest::RequestBuilder,
        req: &HttpRequest,
        _backend: &Backend,
    ) -> reqwest::RequestBuilder {
        if let Some(host) = req.headers().get("host") {
            if let Ok(v) = host.to_str() {
                builder = builder.header("X-Forwarded-Host", v);
            }
        }

        let proto = if req.connection_info().scheme() == "https" {
            "https"
        } else {
            "http"
        };
        builder = builder.header("X-Forwarded-Proto", proto);

        let remote_ip = req
            .connection_info()
            .realip_remote_addr()
            .map(strip_port)
            .unwrap_or("unknown")
            .to_string();

        let existing = req
            .headers()
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let xff = match existing {
            Some(prior) if !prior.is_empty() => format!("{prior}, {remote_ip}"),
            _ => remote_ip,
        };
        builder = builder.header("X-Forwarded-For", xff);

        builder
    }
}

/// `realip_remote_addr()` only strips the port when a trusted forwarding
/// header already exists; on the first hop it falls back to the raw peer
/// address (`ip:port`). The XFF chain is IP-only, so strip the port here too,
/// bracket-aware for IPv6 literals.
fn strip_port(addr: &str) -> &str {
    if let Some(rest) = addr.strip_prefix('[') {
        if let Some(end) = rest.find(']') {
            return &addr[..end + 2];
        }
        return addr;
    }
    match addr.rfind(':') {
        Some(idx) => &addr[..idx],
        None => addr,
    }
}

/// A standalone, allocation-light path rewrite used by unit tests and by
/// callers that only need the rewritten path (not a full request build).
pub fn rewrite_path(path: &str, strip_prefix: &str, base_path: &str) -> String {
    let mut path = path;
    if !strip_prefix.is_empty() {
        if let Some(stripped) = path.strip_prefix(strip_prefix) {
            path = stripped;
        }
    }
    let mut out = if path.is_empty() {
        "/".to_string()
    } else if !path.starts_with('/') {
        format!("/{path}")
    } else {
        path.to_string()
    };
    let base_path = base_path.trim_end_matches('/');
    if !base_path.is_empty() {
        out = format!("{base_path}{out}");
    }
    out
}
