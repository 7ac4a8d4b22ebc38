//! `ScriptRegistry`: the per-tenant sub-multiplexer that scripts populate
//! at registration time and that live requests are matched against.
//!
//! Registration never mutates the live registry directly: bindings write
//! into a [`ScratchRegistry`] which is only merged in via [`TenantScripts::commit`]
//! once the whole script has run without error, giving the
//! buffer-then-commit behaviour the scripting model recommends.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::GatewayError;
use crate::scripting::pattern::{middleware_applies, CompiledPattern};

/// A compiled script and the name it was loaded under.
#[derive(Debug)]
pub struct CompiledScript {
    pub name: String,
    pub ast: rhai::AST,
}

/// A reference to a named function inside a specific compiled script,
/// sufficient to invoke it later via `Engine::call_fn`.
#[derive(Clone)]
pub struct ScriptHandlerRef {
    pub script: Arc<CompiledScript>,
    pub fn_name: String,
}

#[derive(Clone)]
pub struct ScriptRoute {
    pub method: String,
    pub pattern: CompiledPattern,
    pub handler: ScriptHandlerRef,
}

#[derive(Clone)]
pub struct ScriptMiddlewareEntry {
    pub pattern_raw: String,
    pub wrapper: ScriptHandlerRef,
}

/// Buffer scripts register into during a single registration run. Only
/// merged into the tenant's live registry if the script runs to
/// completion without error.
#[derive(Default)]
pub struct ScratchRegistry {
    pub routes: Vec<ScriptRoute>,
    pub middleware: Vec<ScriptMiddlewareEntry>,
    group_stack: Vec<String>,
}

impl ScratchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn prefixed(&self, pattern: &str) -> String {
        let joined_prefix: String = self.group_stack.concat();
        if joined_prefix.is_empty() {
            pattern.to_string()
        } else {
            format!("{}{}", joined_prefix.trim_end_matches('/'), pattern)
        }
    }

    pub fn register_route(
        &mut self,
        method: &str,
        pattern: &str,
        handler: ScriptHandlerRef,
    ) -> Result<(), GatewayError> {
        if method.trim().is_empty() {
            return Err(GatewayError::ScriptRegistrationError(
                "register_route: method must not be empty".to_string(),
            ));
        }
        if pattern.trim().is_empty() {
            return Err(GatewayError::ScriptRegistrationError(
                "register_route: pattern must not be empty".to_string(),
            ));
        }
        let full_pattern = self.prefixed(pattern);
        let compiled = CompiledPattern::compile(&full_pattern)?;
        let method = method.to_ascii_uppercase();

        // Double-registration of the same (method, pattern) is idempotent
        // and the first handler wins: skip accumulating a shadowed
        // duplicate rather than pushing (or overwriting with) another one.
        let already_registered = self.routes.iter().any(|r| r.method == method && r.pattern.raw == compiled.raw);
        if !already_registered {
            self.routes.push(ScriptRoute {
                method,
                pattern: compiled,
                handler,
            });
        }
        Ok(())
    }

    pub fn register_middleware(
        &mut self,
        pattern: &str,
        wrapper: ScriptHandlerRef,
    ) -> Result<(), GatewayError> {
        if pattern.trim().is_empty() {
            return Err(GatewayError::ScriptRegistrationError(
                "register_middleware: pattern must not be empty".to_string(),
            ));
        }
        let full_pattern = self.prefixed(pattern);
        self.middleware.push(ScriptMiddlewareEntry {
            pattern_raw: full_pattern,
            wrapper,
        });
        Ok(())
    }

    pub fn push_group(&mut self, prefix: &str) -> Result<(), GatewayError> {
        if !prefix.starts_with('/') {
            return Err(GatewayError::ScriptRegistrationError(format!(
                "register_group: prefix '{prefix}' must begin with '/'"
            )));
        }
        self.group_stack.push(prefix.to_string());
        Ok(())
    }

    pub fn pop_group(&mut self) {
        self.group_stack.pop();
    }
}

/// Ordered middleware chain applicable to a matched route, outermost
/// first, resolved once at request time.
pub fn applicable_middleware<'a>(
    middleware: &'a [ScriptMiddlewareEntry],
    route_pattern: &str,
) -> Vec<&'a ScriptHandlerRef> {
    middleware
        .iter()
        .filter(|m| middleware_applies(&m.pattern_raw, route_pattern))
        .map(|m| &m.wrapper)
        .collect()
}

/// The live, committed registry for one tenant. Swapped wholesale on
/// commit/clear via an `RwLock`, so reads on the request hot path never
/// block a writer mid-update.
#[derive(Default)]
pub struct TenantScripts {
    routes: Vec<ScriptRoute>,
    middleware: Vec<ScriptMiddlewareEntry>,
}

impl TenantScripts {
    pub fn find_route(&self, method: &str, path: &str) -> Option<(&ScriptRoute, HashMap<String, String>)> {
        for route in &self.routes {
            if route.method != method {
                continue;
            }
            if let Some(params) = route.pattern.matches(path) {
                return Some((route, params));
            }
        }
        None
    }

    pub fn middleware_for(&self, route_pattern: &str) -> Vec<&ScriptHandlerRef> {
        applicable_middleware(&self.middleware, route_pattern)
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty() && self.middleware.is_empty()
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }
}

/// Registry of every tenant's committed scripts, keyed by tenant name.
#[derive(Default)]
pub struct ScriptRegistry {
    tenants: RwLock<HashMap<String, Arc<TenantScripts>>>,
}

impl ScriptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically replace a tenant's registered routes/middleware with the
    /// contents of a completed scratch buffer.
    pub fn commit(&self, tenant: &str, scratch: ScratchRegistry) {
        let committed = Arc::new(TenantScripts {
            routes: scratch.routes,
            middleware: scratch.middleware,
        });
        self.tenants.write().expect("script registry lock poisoned").insert(tenant.to_string(), committed);
    }

    /// Remove all entries for a tenant, replacing them with an empty
    /// sub-multiplexer.
    pub fn clear(&self, tenant: &str) {
        self.tenants
            .write()
            .expect("script registry lock poisoned")
            .insert(tenant.to_string(), Arc::new(TenantScripts::default()));
    }

    pub fn tenant(&self, tenant: &str) -> Option<Arc<TenantScripts>> {
        self.tenants.read().expect("script registry lock poisoned").get(tenant).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_handler() -> ScriptHandlerRef {
        ScriptHandlerRef {
            script: Arc::new(CompiledScript {
                name: "t".to_string(),
                ast: rhai::AST::empty(),
            }),
            fn_name: "handle".to_string(),
        }
    }

    #[test]
    fn group_prefix_composes_nested() {
        let mut scratch = ScratchRegistry::new();
        scratch.push_group("/api").unwrap();
        scratch.push_group("/v1").unwrap();
        scratch.register_route("GET", "/users", dummy_handler()).unwrap();
        scratch.pop_group();
        scratch.pop_group();
        assert_eq!(scratch.routes[0].pattern.raw, "/api/v1/users");
    }

    #[test]
    fn double_registration_of_same_method_and_pattern_is_idempotent() {
        let mut scratch = ScratchRegistry::new();
        scratch.register_route("GET", "/users/{id}", dummy_handler()).unwrap();
        scratch.register_route("GET", "/users/{id}", dummy_handler()).unwrap();
        assert_eq!(scratch.routes.len(), 1);
    }

    #[test]
    fn rejects_empty_method_or_pattern() {
        let mut scratch = ScratchRegistry::new();
        assert!(scratch.register_route("", "/x", dummy_handler()).is_err());
        assert!(scratch.register_route("GET", "", dummy_handler()).is_err());
    }

    #[test]
    fn commit_then_find_route() {
        let registry = ScriptRegistry::new();
        let mut scratch = ScratchRegistry::new();
        scratch.register_route("GET", "/users/{id}", dummy_handler()).unwrap();
        registry.commit("tenant-a", scratch);

        let live = registry.tenant("tenant-a").unwrap();
        let (route, params) = live.find_route("GET", "/users/42").unwrap();
        assert_eq!(route.method, "GET");
        assert_eq!(params.get("id").unwrap(), "42");
    }

    #[test]
    fn clear_replaces_with_empty() {
        let registry = ScriptRegistry::new();
        let mut scratch = ScratchRegistry::new();
        scratch.register_route("GET", "/x", dummy_handler()).unwrap();
        registry.commit("t", scratch);
        registry.clear("t");
        assert!(registry.tenant("t").unwrap().is_empty());
    }
}
