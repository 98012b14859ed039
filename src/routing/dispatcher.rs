//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Hold the compiled route table
//! - Match an incoming path against the table, first match wins
//! - Extract captured ids (positional and named)
//! - Return matched route or explicit no-match
//!
//! # Design Decisions
//! - Immutable after construction (safe to share via Arc, no locks)
//! - O(n) ordered scan; the table is small and patterns within one
//!   version are mutually exclusive by construction
//! - Captured ids stay strings here; coercion and existence checks are
//!   the handler's job (a missing resource is a domain NotFound, not a
//!   dispatch failure)

use std::collections::HashMap;

use crate::routing::compiler::CompiledRoute;

/// Ids captured while matching a path.
#[derive(Debug, Clone, Default)]
pub struct Captures {
    positional: Vec<String>,
    named: HashMap<String, String>,
}

impl Captures {
    /// Captured values in path order.
    pub fn positional(&self) -> &[String] {
        &self.positional
    }

    /// Look up a capture by the key its named route node exposes
    /// (e.g. `build_id`).
    pub fn named(&self, key: &str) -> Option<&str> {
        self.named.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty()
    }
}

/// A successful dispatch: the matched route plus its captures.
#[derive(Debug)]
pub struct RouteMatch<'a> {
    pub route: &'a CompiledRoute,
    pub captures: Captures,
}

/// The compiled dispatch table.
pub struct Dispatcher {
    table: Vec<CompiledRoute>,
}

impl Dispatcher {
    pub fn new(table: Vec<CompiledRoute>) -> Self {
        Self { table }
    }

    /// All compiled routes in emission order.
    pub fn routes(&self) -> &[CompiledRoute] {
        &self.table
    }

    /// Match a request path against the table.
    ///
    /// Returns the first matching entry in compiler emission order, or
    /// `None` when no pattern matches (a dispatch miss, rendered 404).
    pub fn dispatch(&self, path: &str) -> Option<RouteMatch<'_>> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        self.table.iter().find_map(|route| {
            if route.segments.len() != segments.len() {
                return None;
            }
            let matched = route
                .segments
                .iter()
                .zip(&segments)
                .all(|(pattern, segment)| pattern.matches(segment));
            if !matched {
                return None;
            }

            let mut captures = Captures::default();
            let captured = route
                .segments
                .iter()
                .zip(&segments)
                .filter(|(pattern, _)| pattern.captures());
            for ((_, value), key) in captured.zip(&route.capture_names) {
                captures.positional.push((*value).to_string());
                if let Some(key) = key {
                    captures.named.insert(key.clone(), (*value).to_string());
                }
            }
            Some(RouteMatch { route, captures })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::HandlerKind;
    use crate::routing::compiler::{compile, mount_version, ApiVersion};
    use crate::routing::node::RouteNode;

    fn dispatcher() -> Dispatcher {
        let v1 = vec![RouteNode::literal("build", HandlerKind::Builds)
            .named("builds")
            .children(vec![RouteNode::id(HandlerKind::Build)
                .named("build")
                .children(vec![
                    RouteNode::literal("result", HandlerKind::BuildResultRedirect),
                    RouteNode::literal("subjob", HandlerKind::Subjobs)
                        .named("subjobs")
                        .children(vec![RouteNode::id(HandlerKind::Subjob).named("subjob")]),
                ])])];
        let v2 = vec![RouteNode::literal("builds", HandlerKind::Builds).children(vec![
            RouteNode::id(HandlerKind::Build).named("build"),
        ])];
        let root = RouteNode::root(HandlerKind::Root);
        let root = mount_version(root, v1, ApiVersion::V1);
        let root = mount_version(root, v2, ApiVersion::V2);
        Dispatcher::new(compile(&root).unwrap())
    }

    #[test]
    fn dispatches_root() {
        let d = dispatcher();
        let m = d.dispatch("/").unwrap();
        assert_eq!(m.route.handler, HandlerKind::Root);
        assert!(m.captures.is_empty());
    }

    #[test]
    fn captures_named_ids_along_the_path() {
        let d = dispatcher();
        let m = d.dispatch("/v1/build/42/subjob/7").unwrap();
        assert_eq!(m.route.handler, HandlerKind::Subjob);
        assert_eq!(m.captures.positional(), &["42", "7"]);
        assert_eq!(m.captures.named("build_id"), Some("42"));
        assert_eq!(m.captures.named("subjob_id"), Some("7"));
    }

    #[test]
    fn literal_and_id_children_do_not_collide() {
        let d = dispatcher();
        let result = d.dispatch("/v1/build/42/result").unwrap();
        assert_eq!(result.route.handler, HandlerKind::BuildResultRedirect);
        let fetch = d.dispatch("/v1/build/42").unwrap();
        assert_eq!(fetch.route.handler, HandlerKind::Build);
    }

    #[test]
    fn versions_do_not_share_capture_bags() {
        let d = dispatcher();
        let v1 = d.dispatch("/v1/build/5").unwrap();
        let v2 = d.dispatch("/v2/builds/5").unwrap();
        assert_eq!(v1.route.version, Some(ApiVersion::V1));
        assert_eq!(v2.route.version, Some(ApiVersion::V2));
        assert_ne!(v1.route.full_pattern, v2.route.full_pattern);
        assert_eq!(v1.captures.named("build_id"), Some("5"));
        assert_eq!(v2.captures.named("build_id"), Some("5"));
    }

    #[test]
    fn miss_is_explicit() {
        let d = dispatcher();
        assert!(d.dispatch("/v1/build/notanumber").is_none());
        assert!(d.dispatch("/v3/build").is_none());
        assert!(d.dispatch("/v1/build/1/unknown").is_none());
    }

    #[test]
    fn trailing_slash_is_tolerated() {
        let d = dispatcher();
        assert!(d.dispatch("/v1/build/").is_some());
    }
}
