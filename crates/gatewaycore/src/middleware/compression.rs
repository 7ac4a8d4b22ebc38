//! Content-type-scoped response compression.
//!
//! Wraps the response body in gzip only when the response `Content-Type`
//! matches a configured allow-list and the client advertises `gzip` in
//! `Accept-Encoding`. Other responses (binary payloads, already-compressed
//! upstream bodies) pass through unmodified.

use std::future::{ready, Future, Ready};
use std::pin::Pin;
use std::rc::Rc;

use actix_web::body::{BoxBody, MessageBody};
use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::header::{HeaderValue, CONTENT_ENCODING, CONTENT_TYPE};
use actix_web::Error;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;

pub struct SelectiveCompress {
    content_types: Rc<Vec<String>>,
    level: u32,
}

impl SelectiveCompress {
    pub fn new(content_types: Vec<String>, level: u32) -> Self {
        Self {
            content_types: Rc::new(content_types),
            level,
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for SelectiveCompress
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Transform = SelectiveCompressMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(SelectiveCompressMiddleware {
            service,
            content_types: self.content_types.clone(),
            level: self.level,
        }))
    }
}

pub struct SelectiveCompressMiddleware<S> {
    service: S,
    content_types: Rc<Vec<String>>,
    level: u32,
}

impl<S, B> Service<ServiceRequest> for SelectiveCompressMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    actix_web::dev::forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let accepts_gzip = req
            .headers()
            .get(actix_web::http::header::ACCEPT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.contains("gzip"))
            .unwrap_or(false);

        let content_types = self.content_types.clone();
        let level = self.level;
        let fut = self.service.call(req);

        Box::pin(async move {
            let res = fut.await?;
            if !accepts_gzip {
                return Ok(res.map_into_boxed_body());
            }

            let is_eligible = res
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(|ct| {
                    let base = ct.split(';').next().unwrap_or(ct).trim();
                    content_types.iter().any(|allowed| allowed == base)
                })
                .unwrap_or(false);

            if !is_eligible {
                return Ok(res.map_into_boxed_body());
            }

            let (req, res) = res.into_parts();
            let (mut res, body) = res.into_parts();
            let bytes = actix_web::body::to_bytes(body).await.unwrap_or_default();

            let compressed = {
                let mut encoder = GzEncoder::new(Vec::new(), Compression::new(level));
                encoder
                    .write_all(&bytes)
                    .and_then(|_| encoder.finish())
                    .ok()
            };

            let body = match compressed {
                Some(compressed) => {
                    res.headers_mut()
                        .insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
                    compressed
                }
                None => bytes.to_vec(),
            };

            Ok(ServiceResponse::new(req, res.set_body(BoxBody::new(body))))
        })
    }
}
