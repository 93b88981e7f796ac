//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Store the compiled route table
//! - Resolve method + path to a route and its parameters
//! - Distinguish unknown paths from unsupported methods
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(1) exact-path lookup via HashMap
//! - O(n) prefix scan for parameterised routes (there is one)
//! - Explicit NotFound / MethodNotAllowed rather than silent default

use std::collections::HashMap;

use axum::http::Method;

use crate::routing::matcher::{Matcher, Params, SegmentMatcher};

/// Handlers known to the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteKind {
    Root,
    Ping,
    Search,
    Suggest,
    Lookup,
}

impl RouteKind {
    /// Stable name for logs and metric labels.
    pub fn name(&self) -> &'static str {
        match self {
            RouteKind::Root => "root",
            RouteKind::Ping => "ping",
            RouteKind::Search => "search",
            RouteKind::Suggest => "suggest",
            RouteKind::Lookup => "lookup",
        }
    }
}

/// A successful resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    pub route: RouteKind,
    pub params: Params,
}

/// Outcome of resolving a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Matched(RouteMatch),
    NotFound,
    MethodNotAllowed { allowed: &'static [Method] },
}

const READ_ONLY: &[Method] = &[Method::GET, Method::HEAD];

#[derive(Debug)]
struct PrefixRoute {
    kind: RouteKind,
    matcher: Box<dyn Matcher>,
}

/// The service's route table.
#[derive(Debug)]
pub struct Router {
    exact: HashMap<&'static str, RouteKind>,
    prefixed: Vec<PrefixRoute>,
    methods: &'static [Method],
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    /// Build the fixed route table.
    pub fn new() -> Self {
        let exact: HashMap<&'static str, RouteKind> = [
            ("/", RouteKind::Root),
            ("/ping", RouteKind::Ping),
            ("/search", RouteKind::Search),
            ("/suggest", RouteKind::Suggest),
        ]
        .into_iter()
        .collect();

        let prefixed = vec![PrefixRoute {
            kind: RouteKind::Lookup,
            matcher: Box::new(SegmentMatcher::new("/lookup/", "query")),
        }];

        tracing::debug!(
            exact_routes = exact.len(),
            prefixed_routes = prefixed.len(),
            "Route table compiled"
        );

        Self {
            exact,
            prefixed,
            methods: READ_ONLY,
        }
    }

    /// Resolve a request. Method is checked only after the path matched.
    pub fn resolve(&self, method: &Method, path: &str) -> Resolution {
        let matched = self
            .exact
            .get(path)
            .map(|&route| RouteMatch {
                route,
                params: Params::default(),
            })
            .or_else(|| {
                self.prefixed.iter().find_map(|entry| {
                    entry.matcher.matches(path).map(|params| RouteMatch {
                        route: entry.kind,
                        params,
                    })
                })
            });

        match matched {
            None => Resolution::NotFound,
            Some(_) if !self.methods.contains(method) => Resolution::MethodNotAllowed {
                allowed: self.methods,
            },
            Some(route) => Resolution::Matched(route),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind(resolution: Resolution) -> Option<RouteKind> {
        match resolution {
            Resolution::Matched(m) => Some(m.route),
            _ => None,
        }
    }

    #[test]
    fn resolves_fixed_routes() {
        let router = Router::new();
        assert_eq!(kind(router.resolve(&Method::GET, "/")), Some(RouteKind::Root));
        assert_eq!(kind(router.resolve(&Method::GET, "/ping")), Some(RouteKind::Ping));
        assert_eq!(kind(router.resolve(&Method::GET, "/search")), Some(RouteKind::Search));
        assert_eq!(kind(router.resolve(&Method::HEAD, "/suggest")), Some(RouteKind::Suggest));
    }

    #[test]
    fn resolves_lookup_with_param() {
        let router = Router::new();
        match router.resolve(&Method::GET, "/lookup/1,2,3") {
            Resolution::Matched(m) => {
                assert_eq!(m.route, RouteKind::Lookup);
                assert_eq!(m.params.get("query"), Some("1,2,3"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn unknown_paths_are_not_found() {
        let router = Router::new();
        for path in ["/unknown", "/lookup", "/lookup/", "/search/apple", "/ping/"] {
            assert_eq!(router.resolve(&Method::GET, path), Resolution::NotFound, "{}", path);
        }
    }

    #[test]
    fn unsupported_methods_are_rejected() {
        let router = Router::new();
        assert_eq!(
            router.resolve(&Method::POST, "/search"),
            Resolution::MethodNotAllowed { allowed: READ_ONLY }
        );
        assert_eq!(router.resolve(&Method::DELETE, "/nowhere"), Resolution::NotFound);
    }
}
