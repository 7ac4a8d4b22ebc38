//! End-to-end test: a real upstream, a dispatcher built from a live
//! `TenantMatcher`, and a request routed all the way through the proxy.

use std::sync::Arc;

use actix_web::{test, web, App, HttpResponse};
use gatewaycore::dispatcher::{dispatch, GatewayState};
use gatewaycore::matcher::TenantMatcher;
use gatewaycore::models::backend::Backend;
use gatewaycore::models::tenant::TenantRouter;
use gatewaycore::services::metrics::MetricsCollector;
use gatewaycore::services::proxy::ProxyBuilder;
use url::Url;

async fn echo_path(req: actix_web::HttpRequest) -> HttpResponse {
    HttpResponse::Ok().body(format!("upstream saw {}", req.path()))
}

async fn echo_xff(req: actix_web::HttpRequest) -> HttpResponse {
    let xff = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    HttpResponse::Ok().body(xff)
}

async fn spawn_upstream() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    let addr = listener.local_addr().unwrap();
    let server = actix_web::HttpServer::new(|| App::new().default_service(web::route().to(echo_path)))
        .listen(listener)
        .expect("attach listener")
        .run();
    tokio::spawn(server);
    format!("http://{addr}")
}

async fn spawn_xff_upstream() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    let addr = listener.local_addr().unwrap();
    let server = actix_web::HttpServer::new(|| App::new().default_service(web::route().to(echo_xff)))
        .listen(listener)
        .expect("attach listener")
        .run();
    tokio::spawn(server);
    format!("http://{addr}")
}

#[actix_web::test]
async fn proxies_matched_tenant_with_stripped_prefix() {
    let upstream = spawn_upstream().await;

    let backend = Backend::new("upstream-1", Url::parse(&upstream).unwrap(), "/health");
    let tenant = TenantRouter::new("api", vec![backend], Some("/api/".to_string()), vec![], None);
    let matcher = Arc::new(TenantMatcher::new(vec![tenant]));

    let state = web::Data::new(GatewayState {
        matcher,
        script_engine: None,
        proxy: ProxyBuilder::new(reqwest::Client::new()),
        metrics: MetricsCollector::default(),
    });

    let app = test::init_service(App::new().app_data(state.clone()).default_service(web::route().to(dispatch))).await;

    let req = test::TestRequest::get().uri("/api/widgets/7").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let body = test::read_body(resp).await;
    assert_eq!(body, actix_web::web::Bytes::from_static(b"upstream saw /widgets/7"));
}

#[actix_web::test]
async fn forwarded_for_carries_bare_ip_no_port() {
    let upstream = spawn_xff_upstream().await;

    let backend = Backend::new("upstream-1", Url::parse(&upstream).unwrap(), "/health");
    let tenant = TenantRouter::new("api", vec![backend], Some("/api/".to_string()), vec![], None);
    let matcher = Arc::new(TenantMatcher::new(vec![tenant]));

    let state = web::Data::new(GatewayState {
        matcher,
        script_engine: None,
        proxy: ProxyBuilder::new(reqwest::Client::new()),
        metrics: MetricsCollector::default(),
    });

    let app = test::init_service(App::new().app_data(state.clone()).default_service(web::route().to(dispatch))).await;

    let req = test::TestRequest::get()
        .uri("/api/widgets/7")
        .peer_addr("203.0.113.5:54321".parse().unwrap())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let body = test::read_body(resp).await;
    assert_eq!(body, actix_web::web::Bytes::from_static(b"203.0.113.5"));
}

#[actix_web::test]
async fn unmatched_host_and_path_is_not_found() {
    let matcher = Arc::new(TenantMatcher::new(vec![]));
    let state = web::Data::new(GatewayState {
        matcher,
        script_engine: None,
        proxy: ProxyBuilder::new(reqwest::Client::new()),
        metrics: MetricsCollector::default(),
    });

    let app = test::init_service(App::new().app_data(state.clone()).default_service(web::route().to(dispatch))).await;

    let req = test::TestRequest::get().uri("/anything").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), actix_web::http::StatusCode::NOT_FOUND);
}
