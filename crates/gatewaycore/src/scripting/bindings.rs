//! Rhai bindings installed fresh on a pooled engine before each script run.
//!
//! Registration-phase bindings (`register_route`/`register_middleware`/
//! `register_group`) write into a [`ScratchRegistry`]. Request-time
//! bindings (`param`, `response.write`/`set_header`, `next`, `log`, `rand`)
//! operate on a single live request/response pair.
//!
//! State is shared via `Arc<Mutex<_>>` rather than `Rc<RefCell<_>>` so the
//! whole registration/execution closure set stays `Send`, letting the
//! driver run scripts inside `spawn_blocking`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use rhai::{Dynamic, Engine, EvalAltResult, FnPtr, NativeCallContext};

use crate::scripting::registry::{CompiledScript, ScriptHandlerRef, ScratchRegistry};

type RhaiResult<T> = Result<T, Box<EvalAltResult>>;

fn registration_error(msg: impl Into<String>) -> Box<EvalAltResult> {
    Box::new(EvalAltResult::ErrorRuntime(Dynamic::from(msg.into()), rhai::Position::NONE))
}

/// Install `register_route`/`register_middleware`/`register_group` bound to
/// this run's scratch buffer and originating script.
pub fn install_registration_bindings(
    engine: &mut Engine,
    scratch: Arc<Mutex<ScratchRegistry>>,
    script: Arc<CompiledScript>,
) {
    let s = scratch.clone();
    let script_for_route = script.clone();
    engine.register_fn(
        "register_route",
        move |method: &str, pattern: &str, handler: FnPtr| -> RhaiResult<()> {
            let href = ScriptHandlerRef {
                script: script_for_route.clone(),
                fn_name: handler.fn_name().to_string(),
            };
            s.lock()
                .expect("scratch registry lock poisoned")
                .register_route(method, pattern, href)
                .map_err(|e| registration_error(e.to_string()))
        },
    );

    let s = scratch.clone();
    let script_for_mw = script.clone();
    engine.register_fn(
        "register_middleware",
        move |pattern: &str, wrapper: FnPtr| -> RhaiResult<()> {
            let href = ScriptHandlerRef {
                script: script_for_mw.clone(),
                fn_name: wrapper.fn_name().to_string(),
            };
            s.lock()
                .expect("scratch registry lock poisoned")
                .register_middleware(pattern, href)
                .map_err(|e| registration_error(e.to_string()))
        },
    );

    let s = scratch.clone();
    engine.register_fn(
        "register_group",
        move |context: NativeCallContext, prefix: &str, setup: FnPtr| -> RhaiResult<()> {
            s.lock()
                .expect("scratch registry lock poisoned")
                .push_group(prefix)
                .map_err(|e| registration_error(e.to_string()))?;
            let result = setup.call_within_context::<()>(&context, ());
            s.lock().expect("scratch registry lock poisoned").pop_group();
            result
        },
    );
}

/// A growable response buffer a request-time script writes into.
#[derive(Clone, Default)]
pub struct ScriptResponse {
    inner: Arc<Mutex<ResponseState>>,
}

#[derive(Default)]
pub struct ResponseState {
    pub body: Vec<u8>,
    pub headers: Vec<(String, String)>,
}

impl ScriptResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_state(self) -> ResponseState {
        Arc::try_unwrap(self.inner)
            .map(|m| m.into_inner().expect("response state lock poisoned"))
            .unwrap_or_default()
    }

    fn write(&mut self, chunk: &str) {
        self.inner
            .lock()
            .expect("response state lock poisoned")
            .body
            .extend_from_slice(chunk.as_bytes());
    }

    fn set_header(&mut self, name: &str, value: &str) {
        self.inner
            .lock()
            .expect("response state lock poisoned")
            .headers
            .push((name.to_string(), value.to_string()));
    }
}

/// Install request-time bindings: `param`, `response.write`/`set_header`,
/// `next`, `log`, `rand`. `continued` flips to `true` if the handler calls
/// `next()`; the Rust-side dispatcher reads it after the call returns to
/// decide whether to continue the middleware chain.
pub fn install_request_bindings(
    engine: &mut Engine,
    params: HashMap<String, String>,
    tenant: String,
    continued: Arc<AtomicBool>,
) {
    engine.register_type_with_name::<ScriptResponse>("Response");
    engine.register_fn("write", |r: &mut ScriptResponse, chunk: &str| r.write(chunk));
    engine.register_fn("set_header", |r: &mut ScriptResponse, name: &str, value: &str| {
        r.set_header(name, value)
    });

    engine.register_fn("param", move |_request: Dynamic, name: &str| -> Dynamic {
        params
            .get(name)
            .cloned()
            .map(Dynamic::from)
            .unwrap_or(Dynamic::UNIT)
    });

    engine.register_fn("next", move || {
        continued.store(true, Ordering::Relaxed);
    });

    let log_tenant = tenant.clone();
    engine.register_fn("log", move |message: &str| {
        log::info!("[tenant:{log_tenant}] {message}");
    });

    engine.register_fn("rand", || -> f64 { rand::random::<f64>() });
}
