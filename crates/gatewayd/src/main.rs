//! Gateway server entry point.
//!
//! Loads and validates configuration, builds the tenant matcher and
//! (optionally) the script engine, spawns the per-tenant health probes,
//! and starts the Actix Web server with the dispatcher composition order
//! described in `gatewaycore::dispatcher`.

use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use gatewaycore::config::settings::{load_settings, Settings};
use gatewaycore::config::validation::ConfigValidator;
use gatewaycore::dispatcher::{dispatch, GatewayState};
use gatewaycore::logs::logger::configure_logger;
use gatewaycore::matcher::TenantMatcher;
use gatewaycore::middleware::compression::SelectiveCompress;
use gatewaycore::middleware::host_scripts::HostScriptGate;
use gatewaycore::middleware::recovery::RecoveryGuard;
use gatewaycore::middleware::request_id::RequestIdStamp;
use gatewaycore::models::backend::Backend;
use gatewaycore::models::tenant::TenantRouter;
use gatewaycore::routes::admin::{configure_admin, AdminState};
use gatewaycore::routes::health::configure_health;
use gatewaycore::scripting::engine::ScriptEngine;
use gatewaycore::services::health::HealthProbe;
use gatewaycore::services::metrics::MetricsCollector;
use gatewaycore::services::proxy::ProxyBuilder;
use log::{error, info};
use tokio::signal;

fn build_tenants(settings: &Settings) -> Vec<TenantRouter> {
    settings
        .tenants
        .iter()
        .map(|tenant| {
            let backends = tenant
                .services
                .iter()
                .map(|service| {
                    let url = url::Url::parse(&service.url)
                        .unwrap_or_else(|e| panic!("invalid url for service '{}': {e}", service.name));
                    Backend::new(service.name.clone(), url, service.health_path.clone())
                })
                .collect();

            TenantRouter::new(
                tenant.name.clone(),
                backends,
                tenant.path_prefix.clone(),
                tenant.domains.clone(),
                tenant.script_tag.clone(),
            )
        })
        .collect()
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    configure_logger();

    let settings: Settings = load_settings().expect("failed to load settings");
    info!("starting gateway v{}", settings.version);

    let validation = ConfigValidator::validate_comprehensive(&settings);
    for warning in &validation.warnings {
        log::warn!("{warning}");
    }
    for recommendation in &validation.recommendations {
        info!("recommendation: {recommendation}");
    }
    if !validation.is_valid {
        for err in &validation.errors {
            error!("{err}");
        }
        std::process::exit(1);
    }

    let client = reqwest::Client::builder()
        .pool_max_idle_per_host(32)
        .build()
        .expect("failed to build http client");

    let tenants = build_tenants(&settings);
    let interval_secs: Vec<u64> = settings.tenants.iter().map(|t| t.health_interval_sec).collect();
    let matcher = Arc::new(TenantMatcher::new(tenants));
    let health_probe = HealthProbe::spawn(matcher.clone(), client.clone(), &interval_secs);

    let script_engine = if settings.scripting.enabled {
        let engine = Arc::new(ScriptEngine::new(
            settings.scripting.scripts_dir.clone(),
            settings.scripting.global_scripts.clone(),
        ));
        engine.load().expect("failed to load scripts");

        for tenant in &settings.tenants {
            if let Some(tag) = &tenant.script_tag {
                engine
                    .register_tenant(&tenant.name, tag)
                    .await
                    .unwrap_or_else(|e| panic!("failed to register scripts for tenant '{}': {e}", tenant.name));
            }
        }
        Some(engine)
    } else {
        None
    };

    let metrics = MetricsCollector::default();
    let proxy = ProxyBuilder::new(client.clone());

    let admin_state = web::Data::new(AdminState {
        matcher: matcher.clone(),
        metrics: metrics.clone(),
    });
    let gateway_state = web::Data::new(GatewayState {
        matcher: matcher.clone(),
        script_engine: script_engine.clone(),
        proxy,
        metrics: metrics.clone(),
    });

    let admin_base_path = settings.admin_base_path.clone();
    let compression = settings.compression.clone();

    let (cfg_host, cfg_port) = settings
        .listen_address
        .rsplit_once(':')
        .map(|(h, p)| (h.to_string(), p.parse::<u16>().unwrap_or(8080)))
        .unwrap_or_else(|| ("0.0.0.0".to_string(), 8080));

    let bind_host = std::env::var("GATEWAY_HOST").unwrap_or(cfg_host);
    let bind_port = std::env::var("GATEWAY_PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(cfg_port);

    info!("listening on {bind_host}:{bind_port}");

    let server = HttpServer::new(move || {
        App::new()
            .app_data(admin_state.clone())
            .app_data(gateway_state.clone())
            // .wrap() composes outside-in in reverse registration order, so
            // the last call here (RecoveryGuard) ends up outermost and
            // HostScriptGate ends up innermost, right before admin routes
            // and the catch-all dispatcher.
            .wrap(HostScriptGate)
            .wrap(SelectiveCompress::new(compression.content_types.clone(), compression.level))
            .wrap(RequestIdStamp)
            .wrap(RecoveryGuard)
            .service(web::scope(&admin_base_path).configure(configure_admin).configure(configure_health))
            .default_service(web::route().to(dispatch))
    })
    .bind((bind_host.as_str(), bind_port))?
    .run();

    let result = tokio::select! {
        result = server => result,
        _ = signal::ctrl_c() => {
            info!("received shutdown signal, draining...");
            Ok(())
        }
    };

    health_probe.shutdown().await;
    if let Some(engine) = script_engine {
        engine.shutdown().await;
    }

    match &result {
        Ok(_) => info!("server stopped gracefully"),
        Err(e) => error!("server error: {e}"),
    }

    result
}
