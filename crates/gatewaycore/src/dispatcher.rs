//! `RequestDispatcher`: the catch-all handler tying tenant matching,
//! scripted routes, and the fallback proxy together.
//!
//! Composition order (outermost first), wired up by the binary crate when
//! it builds the `App`:
//! 1. [`crate::middleware::recovery::RecoveryGuard`]
//! 2. [`crate::middleware::request_id::RequestIdStamp`]
//! 3. [`crate::middleware::compression::SelectiveCompress`]
//! 4. [`crate::middleware::host_scripts::HostScriptGate`] — host-bound and
//!    hybrid tenants get a crack at their scripted routes ahead of the
//!    admin surface and path-based mounting, per spec step 4.
//! 5. admin routes (`GET /health`, `GET /tenants`, `GET /metrics`)
//! 6. this module's [`dispatch`], which resolves a tenant by path, tries
//!    its scripted routes, and falls back to the reverse proxy.

use std::sync::Arc;
use std::time::Instant;

use actix_web::{web, HttpRequest, HttpResponse};
use log::warn;

use crate::error::GatewayError;
use crate::matcher::TenantMatcher;
use crate::scripting::engine::{HandlerOutcome, ScriptEngine};
use crate::scripting::registry::TenantScripts;
use crate::services::metrics::MetricsCollector;
use crate::services::proxy::ProxyBuilder;

/// Shared application state handed to the dispatcher on every request.
pub struct GatewayState {
    pub matcher: Arc<TenantMatcher>,
    pub script_engine: Option<Arc<ScriptEngine>>,
    pub proxy: ProxyBuilder,
    pub metrics: MetricsCollector,
}

/// Try a tenant's committed scripted routes for `(method, path)`: run the
/// applicable middleware chain (short-circuiting on the first wrapper that
/// doesn't call `next()`) then the route handler. Returns `None` when no
/// route matches, so the caller can fall through to whatever comes next in
/// the composition order.
pub(crate) async fn try_scripted_route(
    engine: &ScriptEngine,
    scripts: &TenantScripts,
    method: &str,
    path: &str,
    tenant_name: &str,
) -> Option<Result<HttpResponse, GatewayError>> {
    let (route, params) = scripts.find_route(method, path)?;
    let middleware = scripts.middleware_for(&route.pattern.raw);

    for wrapper in middleware {
        match engine.execute_handler(wrapper, params.clone(), tenant_name).await {
            Ok(outcome) if !outcome.continued => return Some(Ok(build_script_response(outcome))),
            Ok(_) => {}
            Err(err) => return Some(Err(err)),
        }
    }

    Some(engine.execute_handler(&route.handler, params, tenant_name).await.map(build_script_response))
}

/// The catch-all handler: resolves `(host, path)` to a tenant, tries a
/// scripted route for the stripped path, and otherwise proxies to the
/// tenant's next selected backend.
pub async fn dispatch(
    req: HttpRequest,
    body: web::Payload,
    state: web::Data<GatewayState>,
) -> Result<HttpResponse, GatewayError> {
    let started = Instant::now();
    state.metrics.increment_connections();
    let result = dispatch_inner(&req, body, &state).await;
    state.metrics.decrement_connections();

    let status = match &result {
        Ok(resp) => resp.status().as_u16(),
        Err(err) => err.status_code().as_u16(),
    };
    state.metrics.record_request(status, started.elapsed());

    result
}

async fn dispatch_inner(
    req: &HttpRequest,
    body: web::Payload,
    state: &GatewayState,
) -> Result<HttpResponse, GatewayError> {
    let host = req
        .connection_info()
        .host()
        .to_string();
    let path = req.path();

    let matched = state
        .matcher
        .match_request(&host, path)
        .ok_or_else(|| GatewayError::NoTenantMatch {
            host: host.clone(),
            path: path.to_string(),
        })?;

    let tenant = matched.tenant;
    let strip_prefix = matched.strip_prefix;

    if let (Some(script_tag), Some(engine)) = (&tenant.script_tag, &state.script_engine) {
        let scoped_path = path.strip_prefix(strip_prefix).unwrap_or(path);
        let scoped_path = if scoped_path.starts_with('/') {
            scoped_path.to_string()
        } else {
            format!("/{scoped_path}")
        };

        if let Some(scripts) = engine.registry().tenant(script_tag) {
            if let Some(result) =
                try_scripted_route(engine, &scripts, req.method().as_str(), &scoped_path, &tenant.name).await
            {
                return result;
            }
        }
    }

    let backend = tenant
        .next_backend()
        .ok_or_else(|| GatewayError::NoBackendAvailable {
            tenant: tenant.name.clone(),
        })?;

    match state.proxy.forward(req, body, backend, strip_prefix).await {
        Ok(resp) => Ok(resp),
        Err(err) => {
            warn!("proxy failure for tenant '{}': {err}", tenant.name);
            Err(err)
        }
    }
}

pub(crate) fn build_script_response(outcome: HandlerOutcome) -> HttpResponse {
    let mut builder = HttpResponse::Ok();
    for (name, value) in outcome.headers {
        builder.insert_header((name, value));
    }
    builder.body(outcome.body)
}
