//! End-to-end tests for the scripting sandbox: scan a directory of `.rhai`
//! files, register a tenant, and execute its handlers/middleware.

use gatewaycore::error::GatewayError;
use gatewaycore::scripting::engine::ScriptEngine;

fn write_script(dir: &tempfile::TempDir, filename: &str, contents: &str) {
    std::fs::write(dir.path().join(filename), contents).expect("write script");
}

#[tokio::test]
async fn registers_and_serves_a_route() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_script(
        &dir,
        "billing.rhai",
        r#"
            fn handle_users(request, response) {
                response.write("hello " + request["id"]);
                response.set_header("content-type", "text/plain");
            }

            fn auth_middleware(request, response) {
                next();
            }

            register_route("GET", "/users/{id}", Fn("handle_users"));
            register_middleware("/users/*", Fn("auth_middleware"));
        "#,
    );

    let engine = ScriptEngine::new(dir.path().to_str().unwrap(), vec![]);
    engine.load().expect("scan and compile");
    engine.register_tenant("billing-tenant", "billing").await.expect("register");

    let scripts = engine.registry().tenant("billing-tenant").expect("tenant scripts committed");
    let (route, params) = scripts.find_route("GET", "/users/42").expect("route matches");
    assert_eq!(params.get("id").unwrap(), "42");

    let middleware = scripts.middleware_for(&route.pattern.raw);
    assert_eq!(middleware.len(), 1);

    let mw_outcome = engine
        .execute_handler(middleware[0], params.clone(), "billing-tenant")
        .await
        .expect("middleware runs");
    assert!(mw_outcome.continued);

    let outcome = engine
        .execute_handler(&route.handler, params, "billing-tenant")
        .await
        .expect("handler runs");
    assert_eq!(String::from_utf8(outcome.body).unwrap(), "hello 42");
    assert!(outcome.headers.contains(&("content-type".to_string(), "text/plain".to_string())));
    assert!(!outcome.continued);
}

#[tokio::test]
async fn nested_groups_compose_prefixes() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_script(
        &dir,
        "reports.rhai",
        r#"
            fn list(request, response) {
                response.write("reports");
            }

            register_group("/api", || {
                register_group("/v1", || {
                    register_route("GET", "/reports", Fn("list"));
                });
            });
        "#,
    );

    let engine = ScriptEngine::new(dir.path().to_str().unwrap(), vec![]);
    engine.load().expect("scan and compile");
    engine.register_tenant("reports-tenant", "reports").await.expect("register");

    let scripts = engine.registry().tenant("reports-tenant").unwrap();
    assert!(scripts.find_route("GET", "/api/v1/reports").is_some());
    assert!(scripts.find_route("GET", "/reports").is_none());
}

#[tokio::test]
async fn failed_registration_does_not_commit() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_script(
        &dir,
        "broken.rhai",
        r#"
            fn noop(request, response) {}
            register_route("GET", "missing-leading-slash", Fn("noop"));
        "#,
    );

    let engine = ScriptEngine::new(dir.path().to_str().unwrap(), vec![]);
    engine.load().expect("scan and compile");
    let result = engine.register_tenant("broken-tenant", "broken").await;
    assert!(result.is_err());
    assert!(engine.registry().tenant("broken-tenant").is_none());
}

#[tokio::test]
async fn reregistering_same_method_and_pattern_does_not_grow_route_count() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_script(
        &dir,
        "dup.rhai",
        r#"
            fn list(request, response) {
                response.write("ok");
            }

            register_route("GET", "/items", Fn("list"));
            register_route("GET", "/items", Fn("list"));
        "#,
    );

    let engine = ScriptEngine::new(dir.path().to_str().unwrap(), vec![]);
    engine.load().expect("scan and compile");
    engine.register_tenant("dup-tenant", "dup").await.expect("register");

    let scripts = engine.registry().tenant("dup-tenant").unwrap();
    assert_eq!(scripts.route_count(), 1);
}

#[tokio::test]
async fn busy_loop_handler_is_abandoned_on_timeout() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_script(
        &dir,
        "stuck.rhai",
        r#"
            fn spin(request, response) {
                loop {
                }
            }

            register_route("GET", "/stuck", Fn("spin"));
        "#,
    );

    let engine = ScriptEngine::new(dir.path().to_str().unwrap(), vec![]);
    engine.load().expect("scan and compile");
    engine.register_tenant("stuck-tenant", "stuck").await.expect("register");

    let scripts = engine.registry().tenant("stuck-tenant").unwrap();
    let (route, params) = scripts.find_route("GET", "/stuck").unwrap();

    let started = std::time::Instant::now();
    let result = engine.execute_handler(&route.handler, params, "stuck-tenant").await;
    let elapsed = started.elapsed();

    assert!(matches!(result, Err(GatewayError::ScriptTimeout)));
    // The non-yielding loop is caught by the cooperative `on_progress` check
    // rather than running forever; a generous upper bound just guards
    // against the abandoned interpreter hanging the test suite.
    assert!(elapsed < std::time::Duration::from_secs(30));
}

#[tokio::test]
async fn global_order_places_named_scripts_first() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_script(&dir, "global-second.rhai", "fn noop(request, response) {}");
    write_script(&dir, "global-first.rhai", "fn noop(request, response) {}");

    let engine = ScriptEngine::new(
        dir.path().to_str().unwrap(),
        vec!["first".to_string(), "second".to_string()],
    );
    engine.load().expect("scan and compile");

    // Both compiled scripts are independently registrable under their
    // logical (prefix-stripped) names.
    engine.register_tenant("t", "first").await.expect("first registers");
    engine.register_tenant("t", "second").await.expect("second registers");
}
