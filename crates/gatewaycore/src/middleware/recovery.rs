//! Top-level recovery guard: a handler (most likely a tenant script) that
//! panics is turned into a 500 response instead of taking down the worker.
//!
//! This is the outermost layer in the dispatcher's composition order so
//! every other middleware and route is covered.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;

use actix_web::body::BoxBody;
use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::{Error, HttpResponse};
use futures_util::FutureExt;

pub struct RecoveryGuard;

impl<S, B> Transform<S, ServiceRequest> for RecoveryGuard
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: actix_web::body::MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Transform = RecoveryGuardMiddleware<S>;
    type InitError = ();
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(RecoveryGuardMiddleware { service }))
    }
}

pub struct RecoveryGuardMiddleware<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for RecoveryGuardMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: actix_web::body::MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    actix_web::dev::forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let http_req = req.request().clone();
        let fut = self.service.call(req);

        Box::pin(async move {
            match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(result) => Ok(result?.map_into_boxed_body()),
                Err(_) => {
                    log::error!("handler panicked");
                    let response = HttpResponse::InternalServerError()
                        .json(serde_json::json!({"error": "internal error"}));
                    Ok(ServiceResponse::new(http_req, response))
                }
            }
        })
    }
}
