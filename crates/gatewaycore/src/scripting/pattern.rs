//! Route pattern compilation shared by the script registry: `{name}` path
//! parameters and a trailing `*` wildcard, compiled to a regex once at
//! registration time and matched against every live request path.

use std::collections::HashMap;
use std::sync::Arc;

use regex::Regex;

use crate::error::GatewayError;

/// A pattern compiled from a script-declared route string such as
/// `/users/{id}/posts/*`.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    pub raw: String,
    regex: Arc<Regex>,
    param_names: Vec<String>,
}

impl CompiledPattern {
    pub fn compile(pattern: &str) -> Result<Self, GatewayError> {
        if !pattern.starts_with('/') {
            return Err(GatewayError::ScriptRegistrationError(format!(
                "route pattern '{pattern}' must begin with '/'"
            )));
        }

        let mut regex_str = String::from("^");
        let mut param_names = Vec::new();
        let mut chars = pattern.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' => {
                    let mut name = String::new();
                    for nc in chars.by_ref() {
                        if nc == '}' {
                            break;
                        }
                        name.push(nc);
                    }
                    if name.is_empty() {
                        return Err(GatewayError::ScriptRegistrationError(format!(
                            "route pattern '{pattern}' has an empty parameter name"
                        )));
                    }
                    param_names.push(name);
                    regex_str.push_str("([^/]+)");
                }
                '*' => {
                    regex_str.push_str(".*");
                }
                _ => {
                    regex_str.push_str(&regex::escape(&c.to_string()));
                }
            }
        }
        regex_str.push('$');

        let regex = Regex::new(&regex_str)
            .map_err(|e| GatewayError::ScriptRegistrationError(format!("bad route pattern regex: {e}")))?;

        Ok(Self {
            raw: pattern.to_string(),
            regex: Arc::new(regex),
            param_names,
        })
    }

    /// Match `path`, returning extracted path parameters on success.
    pub fn matches(&self, path: &str) -> Option<HashMap<String, String>> {
        let captures = self.regex.captures(path)?;
        let mut params = HashMap::with_capacity(self.param_names.len());
        for (idx, name) in self.param_names.iter().enumerate() {
            if let Some(value) = captures.get(idx + 1) {
                params.insert(name.clone(), value.as_str().to_string());
            }
        }
        Some(params)
    }
}

/// Whether middleware pattern `middleware` applies to a registered route
/// pattern `route`, per the registration-time applicability rule: exact
/// match, prefix-wildcard match, or the root catch-all `/*`.
pub fn middleware_applies(middleware: &str, route: &str) -> bool {
    if middleware == route {
        return true;
    }
    if middleware == "/*" {
        return true;
    }
    if let Some(prefix) = middleware.strip_suffix('*') {
        return route.starts_with(prefix);
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_single_param() {
        let p = CompiledPattern::compile("/users/{id}").unwrap();
        let params = p.matches("/users/42").unwrap();
        assert_eq!(params.get("id").unwrap(), "42");
    }

    #[test]
    fn wildcard_matches_remainder() {
        let p = CompiledPattern::compile("/assets/*").unwrap();
        assert!(p.matches("/assets/css/app.css").is_some());
        assert!(p.matches("/other").is_none());
    }

    #[test]
    fn rejects_pattern_without_leading_slash() {
        assert!(CompiledPattern::compile("users").is_err());
    }

    #[test]
    fn middleware_exact_match() {
        assert!(middleware_applies("/users/{id}", "/users/{id}"));
        assert!(!middleware_applies("/users/{id}", "/posts/{id}"));
    }

    #[test]
    fn middleware_prefix_wildcard() {
        assert!(middleware_applies("/api/*", "/api/users/{id}"));
        assert!(!middleware_applies("/api/*", "/other"));
    }

    #[test]
    fn middleware_root_catch_all() {
        assert!(middleware_applies("/*", "/anything/at/all"));
    }
}
