//! Host-based tenant script middleware (spec composition step 4): a
//! host-bound or hybrid tenant's scripted routes get first crack at a
//! request, ahead of the admin surface and path-based tenant mounting,
//! matching against the *full*, unstripped path (a host-only tenant never
//! strips anything; a hybrid tenant's path-prefix requirement only gates
//! the catch-all proxy fallback, not this stage).
//!
//! If no scripted route matches, the request falls through to whatever is
//! registered next (admin routes, then [`crate::dispatcher::dispatch`]).

use std::future::Future;
use std::pin::Pin;

use actix_web::body::BoxBody;
use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::{web, Error};

use crate::dispatcher::{try_scripted_route, GatewayState};
use crate::scripting::engine::ScriptEngine;
use crate::scripting::registry::TenantScripts;
use std::sync::Arc;

pub struct HostScriptGate;

impl<S, B> Transform<S, ServiceRequest> for HostScriptGate
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: actix_web::body::MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Transform = HostScriptGateMiddleware<S>;
    type InitError = ();
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(HostScriptGateMiddleware { service }))
    }
}

pub struct HostScriptGateMiddleware<S> {
    service: S,
}

/// Resolve, synchronously, whether `(host, method, path)` lands on a
/// host-bound/hybrid tenant that has a scripted route for it. Only if this
/// returns `Some` does the middleware commit to the scripted branch instead
/// of forwarding to the wrapped service.
fn resolve_host_script(
    state: &GatewayState,
    host: &str,
    method: &str,
    path: &str,
) -> Option<(Arc<ScriptEngine>, Arc<TenantScripts>, String)> {
    let tenant = state.matcher.match_host(host)?;
    let script_tag = tenant.script_tag.as_ref()?;
    let engine = state.script_engine.clone()?;
    let scripts = engine.registry().tenant(script_tag)?;
    scripts.find_route(method, path)?;
    Some((engine, scripts, tenant.name.clone()))
}

impl<S, B> Service<ServiceRequest> for HostScriptGateMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: actix_web::body::MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    actix_web::dev::forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let host = req.connection_info().host().to_string();
        let method = req.method().as_str().to_string();
        let path = req.path().to_string();
        let state = req.app_data::<web::Data<GatewayState>>().cloned();

        let resolved = state.as_ref().and_then(|state| resolve_host_script(state, &host, &method, &path));

        if let Some((engine, scripts, tenant_name)) = resolved {
            let http_req = req.request().clone();
            return Box::pin(async move {
                // `scripts` is the exact snapshot already confirmed to have
                // a matching route above, so this is never `None`.
                match try_scripted_route(&engine, &scripts, &method, &path, &tenant_name).await {
                    Some(Ok(resp)) => Ok(ServiceResponse::new(http_req, resp).map_into_boxed_body()),
                    Some(Err(err)) => Ok(ServiceResponse::from_err(err, http_req)),
                    None => Ok(ServiceResponse::new(http_req, actix_web::HttpResponse::NotFound().finish())),
                }
            });
        }

        let fut = self.service.call(req);
        Box::pin(async move { Ok(fut.await?.map_into_boxed_body()) })
    }
}
