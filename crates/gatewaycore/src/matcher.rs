//! `TenantMatcher`: resolves `(host, path)` to a tenant with a defined
//! precedence and longest-prefix rule.
//!
//! Two indexes are built once at startup and never mutated afterwards:
//! `domain_index` (exact, lowercased host -> tenant) and `path_index`
//! (prefixes sorted longest-first). Resolution never panics; a request that
//! matches nothing yields `None`.

use ahash::AHashMap;

use crate::models::tenant::TenantRouter;

/// Result of a successful match: the tenant and the portion of the path
/// prefix to strip before forwarding upstream.
pub struct Matched<'a> {
    pub tenant: &'a TenantRouter,
    pub strip_prefix: &'a str,
}

pub struct TenantMatcher {
    domain_index: AHashMap<String, usize>,
    /// `(prefix, tenant_index)` sorted by descending prefix length.
    path_index: Vec<(String, usize)>,
    tenants: Vec<TenantRouter>,
}

impl TenantMatcher {
    /// Builds the two indexes from an already-constructed list of tenant
    /// routers. A tenant with both `domains` and `path_prefix` is indexed
    /// into both structures (see [`Self::match_request`] for how hybrid
    /// matching composes).
    pub fn new(tenants: Vec<TenantRouter>) -> Self {
        let mut domain_index = AHashMap::new();
        let mut path_index = Vec::new();

        for (idx, tenant) in tenants.iter().enumerate() {
            for domain in &tenant.domains {
                domain_index.insert(domain.to_lowercase(), idx);
            }
            if let Some(prefix) = &tenant.path_prefix {
                path_index.push((prefix.clone(), idx));
            }
        }

        // Longest-prefix-wins: sort once, descending by length.
        path_index.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

        Self {
            domain_index,
            path_index,
            tenants,
        }
    }

    pub fn tenants(&self) -> &[TenantRouter] {
        &self.tenants
    }

    /// Strip the port from a `Host` header value: bracketed IPv6 literals
    /// keep everything through the closing `]`, otherwise cut at the first
    /// `:`.
    fn normalize_host(host: &str) -> &str {
        if let Some(rest) = host.strip_prefix('[') {
            if let Some(end) = rest.find(']') {
                return &host[..end + 2];
            }
            return host;
        }
        match host.find(':') {
            Some(idx) => &host[..idx],
            None => host,
        }
    }

    /// An empty path only matches the exact prefix `"/"`, since `"".starts_with("/")`
    /// is `false` in Rust despite an empty path being equivalent to the root.
    fn path_matches_prefix(path: &str, prefix: &str) -> bool {
        if path.is_empty() {
            prefix == "/"
        } else {
            path.starts_with(prefix)
        }
    }

    /// Resolve a host to a host-bound or hybrid tenant by domain alone,
    /// ignoring any path prefix the tenant also claims. Used by the
    /// host-based tenant middleware stage (spec §4.7 step 4), which gets a
    /// crack at every request on a matching host before admin routes or
    /// path-based mounting are considered.
    pub fn match_host(&self, host: &str) -> Option<&TenantRouter> {
        let host = Self::normalize_host(host).to_lowercase();
        if host.is_empty() {
            return None;
        }
        self.domain_index.get(&host).map(|&idx| &self.tenants[idx])
    }

    /// Resolve `(host, path)` to a tenant and its strip prefix, following
    /// the precedence: hybrid, host-only, path-only, no match.
    pub fn match_request(&self, host: &str, path: &str) -> Option<Matched<'_>> {
        let host = Self::normalize_host(host).to_lowercase();

        if !host.is_empty() {
            if let Some(&idx) = self.domain_index.get(&host) {
                let tenant = &self.tenants[idx];

                if let Some(prefix) = &tenant.path_prefix {
                    // Hybrid tenant: host matched, now require the path
                    // prefix too. If it doesn't match, fall through to the
                    // path-only resolver rather than returning host-only.
                    if Self::path_matches_prefix(path, prefix) {
                        return Some(Matched {
                            tenant,
                            strip_prefix: prefix,
                        });
                    }
                } else {
                    // Host-only tenant.
                    return Some(Matched {
                        tenant,
                        strip_prefix: "",
                    });
                }
            }
        }

        // Path-only resolution: longest prefix of `path` among tenants that
        // have no domain set (hybrid tenants only match via the branch
        // above, never via bare path-prefix fallthrough).
        for (prefix, idx) in &self.path_index {
            let tenant = &self.tenants[*idx];
            if !tenant.domains.is_empty() {
                continue;
            }
            if Self::path_matches_prefix(path, prefix) {
                return Some(Matched {
                    tenant,
                    strip_prefix: prefix,
                });
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant(name: &str, domains: Vec<&str>, prefix: Option<&str>) -> TenantRouter {
        TenantRouter::new(
            name,
            vec![],
            prefix.map(String::from),
            domains.into_iter().map(String::from).collect(),
            None,
        )
    }

    #[test]
    fn host_only_match() {
        let m = TenantMatcher::new(vec![tenant("a", vec!["api.example.com"], None)]);
        let r = m.match_request("api.example.com", "/anything").unwrap();
        assert_eq!(r.tenant.name, "a");
        assert_eq!(r.strip_prefix, "");
    }

    #[test]
    fn host_normalisation_strips_port() {
        let m = TenantMatcher::new(vec![tenant("a", vec!["example.com"], None)]);
        assert!(m.match_request("example.com", "/x").is_some());
        assert!(m.match_request("example.com:8080", "/x").is_some());
    }

    #[test]
    fn longest_prefix_wins() {
        let m = TenantMatcher::new(vec![
            tenant("a", vec![], Some("/a/")),
            tenant("b", vec![], Some("/a/b/")),
        ]);
        let r = m.match_request("irrelevant.com", "/a/b/x").unwrap();
        assert_eq!(r.tenant.name, "b");
        assert_eq!(r.strip_prefix, "/a/b/");
    }

    #[test]
    fn hybrid_requires_both_and_falls_through_on_path_mismatch() {
        let m = TenantMatcher::new(vec![
            tenant("hybrid", vec!["h.example.com"], Some("/h/")),
            tenant("pathonly", vec![], Some("/")),
        ]);
        // host + path both match hybrid
        let r = m.match_request("h.example.com", "/h/x").unwrap();
        assert_eq!(r.tenant.name, "hybrid");

        // host matches hybrid but path doesn't -> falls through to path-only
        let r2 = m.match_request("h.example.com", "/other").unwrap();
        assert_eq!(r2.tenant.name, "pathonly");
    }

    #[test]
    fn no_match_returns_none() {
        let m = TenantMatcher::new(vec![tenant("a", vec!["api.example.com"], None)]);
        assert!(m.match_request("unknown.com", "/x").is_none());
    }

    #[test]
    fn empty_path_matches_root_prefix_only() {
        let m = TenantMatcher::new(vec![tenant("root", vec![], Some("/"))]);
        let r = m.match_request("irrelevant.com", "").unwrap();
        assert_eq!(r.tenant.name, "root");

        let m2 = TenantMatcher::new(vec![tenant("scoped", vec![], Some("/api/"))]);
        assert!(m2.match_request("irrelevant.com", "").is_none());

        let m3 = TenantMatcher::new(vec![tenant("hybrid", vec!["h.example.com"], Some("/"))]);
        let r3 = m3.match_request("h.example.com", "").unwrap();
        assert_eq!(r3.tenant.name, "hybrid");
    }

    #[test]
    fn match_host_ignores_path_prefix_requirement() {
        let m = TenantMatcher::new(vec![tenant("hybrid", vec!["h.example.com"], Some("/h/"))]);
        assert_eq!(m.match_host("h.example.com").unwrap().name, "hybrid");
        assert_eq!(m.match_host("h.example.com:8080").unwrap().name, "hybrid");
        assert!(m.match_host("other.com").is_none());
        assert!(m.match_host("").is_none());
    }

    #[test]
    fn scenario_config_example() {
        let m = TenantMatcher::new(vec![
            tenant("A", vec!["api.example.com"], None),
            tenant("B", vec![], Some("/api/")),
        ]);
        let r = m.match_request("api.example.com", "/api/users").unwrap();
        assert_eq!(r.tenant.name, "A");
        assert_eq!(r.strip_prefix, "");
    }
}
