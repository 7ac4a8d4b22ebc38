//! `ScriptEngine`: directory scan, pooled registration runs, and
//! request-time handler execution.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use rhai::{Dynamic, Engine, Scope};

use crate::error::GatewayError;
use crate::scripting::bindings::{install_registration_bindings, install_request_bindings, ScriptResponse};
use crate::scripting::pool::{PooledInterpreter, ScriptPool};
use crate::scripting::registry::{CompiledScript, ScratchRegistry, ScriptHandlerRef, ScriptRegistry};

const DEFAULT_SCRIPT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_POOL_CAPACITY: usize = 16;

struct LoadedScript {
    name: String,
    source: String,
}

struct ScriptMap {
    globals: Vec<LoadedScript>,
    tenants: HashMap<String, LoadedScript>,
}

fn base_rhai_engine() -> Engine {
    let mut engine = Engine::new();
    engine.set_max_operations(5_000_000);
    engine.set_max_expr_depths(64, 64);
    engine.set_max_string_size(1 << 20);
    engine.set_max_array_size(10_000);
    engine.set_max_map_size(10_000);
    engine
}

fn is_timeout_error(err: &str) -> bool {
    err.contains("script timeout")
}

fn scan_scripts_dir(dir: &str, global_order: &[String]) -> Result<ScriptMap, GatewayError> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| GatewayError::ScriptRegistrationError(format!("cannot read scripts_dir '{dir}': {e}")))?;

    let mut global_by_filename: HashMap<String, LoadedScript> = HashMap::new();
    let mut tenants = HashMap::new();

    for entry in entries {
        let entry = entry
            .map_err(|e| GatewayError::ScriptRegistrationError(format!("cannot read directory entry: {e}")))?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("rhai") {
            continue;
        }
        let stem = match path.file_stem().and_then(|s| s.to_str()) {
            Some(s) => s.to_string(),
            None => continue,
        };
        let source = std::fs::read_to_string(&path)
            .map_err(|e| GatewayError::ScriptRegistrationError(format!("cannot read '{}': {e}", path.display())))?;
        let filename = path.file_name().and_then(|s| s.to_str()).unwrap_or(&stem).to_string();

        if let Some(tag) = stem.strip_prefix("global-") {
            global_by_filename.insert(filename, LoadedScript { name: tag.to_string(), source });
        } else {
            tenants.insert(stem.clone(), LoadedScript { name: stem, source });
        }
    }

    let mut globals = Vec::new();
    for ordered_name in global_order {
        if let Some(script) = global_by_filename.remove(ordered_name) {
            globals.push(script);
        }
    }
    let mut remaining: Vec<_> = global_by_filename.into_values().collect();
    remaining.sort_by(|a, b| a.name.cmp(&b.name));
    globals.extend(remaining);

    Ok(ScriptMap { globals, tenants })
}

/// Outcome of a request-time handler or middleware wrapper invocation.
pub struct HandlerOutcome {
    pub body: Vec<u8>,
    pub headers: Vec<(String, String)>,
    pub continued: bool,
}

/// Owns the interpreter pool, the compiled script map, and the committed
/// [`ScriptRegistry`] every tenant script registers into.
pub struct ScriptEngine {
    pool: Arc<ScriptPool>,
    registry: Arc<ScriptRegistry>,
    compiled: RwLock<HashMap<String, Arc<CompiledScript>>>,
    global_order: Vec<String>,
    scripts_dir: String,
}

impl ScriptEngine {
    pub fn new(scripts_dir: impl Into<String>, global_order: Vec<String>) -> Self {
        Self {
            pool: Arc::new(ScriptPool::new(base_rhai_engine(), DEFAULT_POOL_CAPACITY)),
            registry: Arc::new(ScriptRegistry::new()),
            compiled: RwLock::new(HashMap::new()),
            global_order,
            scripts_dir: scripts_dir.into(),
        }
    }

    pub fn registry(&self) -> Arc<ScriptRegistry> {
        self.registry.clone()
    }

    /// Scan the scripts directory and compile every `.rhai` file found.
    /// Does not run registration; call [`Self::register_tenant`] per
    /// tenant (and per global script) afterwards.
    pub fn load(&self) -> Result<(), GatewayError> {
        let scan = scan_scripts_dir(&self.scripts_dir, &self.global_order)?;
        let mut compiled = HashMap::new();

        for script in scan.globals.into_iter().chain(scan.tenants.into_values()) {
            let engine = base_rhai_engine();
            let ast = engine
                .compile(&script.source)
                .map_err(|e| GatewayError::ScriptRegistrationError(format!("{}: {e}", script.name)))?;
            compiled.insert(
                script.name.clone(),
                Arc::new(CompiledScript {
                    name: script.name,
                    ast,
                }),
            );
        }

        *self.compiled.write().expect("compiled scripts lock poisoned") = compiled;
        Ok(())
    }

    /// Re-scan and recompile. Existing mounted registrations remain live
    /// until a tenant is explicitly re-registered or cleared.
    pub fn reload(&self) -> Result<(), GatewayError> {
        self.load()
    }

    /// Stop accepting interpreter returns and drop every idle engine. Call
    /// once the listener has stopped accepting new connections.
    pub async fn shutdown(&self) {
        self.pool.close().await;
    }

    fn lookup_script(&self, script_tag: &str) -> Result<Arc<CompiledScript>, GatewayError> {
        self.compiled
            .read()
            .expect("compiled scripts lock poisoned")
            .get(script_tag)
            .cloned()
            .ok_or_else(|| GatewayError::ScriptRegistrationError(format!("no script tagged '{script_tag}'")))
    }

    /// Run the named tenant's registration script under the pool and
    /// commit its scratch registrations on success. A script that fails
    /// registration leaves the tenant's previously committed routes
    /// untouched (registration is not transactional across runs, but each
    /// run is buffered and only merged in whole).
    pub async fn register_tenant(&self, tenant: &str, script_tag: &str) -> Result<(), GatewayError> {
        let script = self.lookup_script(script_tag)?;
        let interpreter = self.pool.acquire().await;
        let (mut engine, permit) = interpreter.into_parts();

        let scratch = Arc::new(Mutex::new(ScratchRegistry::new()));
        install_registration_bindings(&mut engine, scratch.clone(), script.clone());
        arm_timeout(&mut engine);

        let ast = script.ast.clone();
        let join = tokio::task::spawn_blocking(move || {
            let mut scope = Scope::new();
            let result = engine.eval_ast_with_scope::<Dynamic>(&mut scope, &ast);
            (engine, result)
        })
        .await;

        match join {
            Ok((engine, Ok(_))) => {
                self.pool.release(PooledInterpreter::from_parts(engine, permit)).await;
                let scratch = Arc::try_unwrap(scratch)
                    .map_err(|_| GatewayError::ScriptRegistrationError("scratch registry still referenced after run".to_string()))?
                    .into_inner()
                    .expect("scratch registry lock poisoned");
                self.registry.commit(tenant, scratch);
                Ok(())
            }
            Ok((engine, Err(err))) => {
                self.pool.dispose(PooledInterpreter::from_parts(engine, permit));
                if is_timeout_error(&err.to_string()) {
                    Err(GatewayError::ScriptTimeout)
                } else {
                    Err(GatewayError::ScriptRegistrationError(err.to_string()))
                }
            }
            Err(join_err) => Err(GatewayError::ScriptRegistrationError(format!(
                "registration task did not complete: {join_err}"
            ))),
        }
    }

    /// Execute a request-time handler or middleware wrapper function.
    pub async fn execute_handler(
        &self,
        handler: &ScriptHandlerRef,
        params: HashMap<String, String>,
        tenant: &str,
    ) -> Result<HandlerOutcome, GatewayError> {
        let interpreter = self.pool.acquire().await;
        let (mut engine, permit) = interpreter.into_parts();

        let continued = Arc::new(AtomicBool::new(false));
        let response = ScriptResponse::new();

        let mut request_map = rhai::Map::new();
        for (k, v) in &params {
            request_map.insert(k.into(), Dynamic::from(v.clone()));
        }

        install_request_bindings(&mut engine, params, tenant.to_string(), continued.clone());
        arm_timeout(&mut engine);

        let ast = handler.script.ast.clone();
        let fn_name = handler.fn_name.clone();
        let response_for_call = response.clone();
        let join = tokio::task::spawn_blocking(move || {
            let mut scope = Scope::new();
            let result: Result<Dynamic, _> = engine.call_fn(
                &mut scope,
                &ast,
                &fn_name,
                (Dynamic::from(request_map), Dynamic::from(response_for_call)),
            );
            (engine, result)
        })
        .await;

        match join {
            Ok((engine, Ok(_))) => {
                self.pool.release(PooledInterpreter::from_parts(engine, permit)).await;
                let state = response.into_state();
                Ok(HandlerOutcome {
                    body: state.body,
                    headers: state.headers,
                    continued: continued.load(Ordering::Relaxed),
                })
            }
            Ok((engine, Err(err))) => {
                self.pool.dispose(PooledInterpreter::from_parts(engine, permit));
                if is_timeout_error(&err.to_string()) {
                    Err(GatewayError::ScriptTimeout)
                } else {
                    Err(GatewayError::ScriptRuntimeError(err.to_string()))
                }
            }
            Err(join_err) => Err(GatewayError::ScriptRuntimeError(format!(
                "handler task did not complete: {join_err}"
            ))),
        }
    }
}

fn arm_timeout(engine: &mut Engine) {
    let deadline = Instant::now() + DEFAULT_SCRIPT_TIMEOUT;
    engine.on_progress(move |_ops| {
        if Instant::now() >= deadline {
            Some(Dynamic::from("script timeout".to_string()))
        } else {
            None
        }
    });
}
