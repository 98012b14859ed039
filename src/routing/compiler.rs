//! Route tree compilation.
//!
//! # Responsibilities
//! - Walk the route tree in pre-order and emit one flat entry per node
//! - Compose each entry's full pattern from its ancestors' patterns
//! - Propagate named captures (`build` → `build_id`) to descendants
//! - Tag every entry under a version mount with that version
//! - Reject duplicate full patterns before the service accepts requests
//!
//! # Design Decisions
//! - Compilation is a pure function over an immutable tree: compiling
//!   the same tree twice yields identical ordered output
//! - Dispatch correctness never depends on emission order (patterns are
//!   mutually distinguishing); determinism is for reproducible startup
//! - Version-specific behavior (pagination) travels in the entry's
//!   parameter bag, not in a parallel handler hierarchy

use std::collections::HashSet;
use std::fmt;

use crate::api::handlers::HandlerKind;
use crate::routing::node::{RouteNode, Segment};

/// API version tag applied by a version mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiVersion {
    V1,
    V2,
}

impl ApiVersion {
    /// Path prefix segment for this version.
    pub fn prefix(self) -> &'static str {
        match self {
            ApiVersion::V1 => "v1",
            ApiVersion::V2 => "v2",
        }
    }

    /// Whether listing endpoints honor `offset`/`limit` in this version.
    pub fn paginated(self) -> bool {
        matches!(self, ApiVersion::V2)
    }

    pub fn number(self) -> u32 {
        match self {
            ApiVersion::V1 => 1,
            ApiVersion::V2 => 2,
        }
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// A flattened, fully-qualified route produced by [`compile`].
#[derive(Debug, Clone)]
pub struct CompiledRoute {
    /// Segment matchers from root to this node, in order.
    pub segments: Vec<Segment>,
    /// Rendered absolute pattern, e.g. `/v1/build/{id}/subjob/{id}`.
    pub full_pattern: String,
    pub handler: HandlerKind,
    /// Version tag, absent for entries above any version mount.
    pub version: Option<ApiVersion>,
    /// Listing endpoints slice by `offset`/`limit` when set.
    pub paginated: bool,
    /// Key for each captured segment, in capture order. Derived from the
    /// nearest named node owning the capture (`build` → `build_id`);
    /// `None` for captures on unnamed nodes.
    pub capture_names: Vec<Option<String>>,
    /// The node's own symbolic name, if any.
    pub name: Option<&'static str>,
}

impl CompiledRoute {
    /// Number of path segments this route matches.
    pub fn depth(&self) -> usize {
        self.segments.len()
    }
}

/// Construction-time routing failures. These are fatal at startup and
/// can never occur while serving.
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    /// Two nodes compiled to the same full pattern, making dispatch
    /// ambiguous.
    #[error("duplicate route pattern: {0}")]
    DuplicatePattern(String),
}

/// Mount version subtrees under the tree root.
///
/// Each subtree list is wrapped in a `v1`/`v2` prefix node dispatching
/// to the version index handler; every route compiled beneath carries
/// the version tag. Two versions may reuse the same handler kinds for
/// structurally different trees.
pub fn mount_version(root: RouteNode, subtrees: Vec<RouteNode>, version: ApiVersion) -> RouteNode {
    let mut mount = RouteNode::literal(version.prefix(), HandlerKind::VersionIndex)
        .named(version.prefix())
        .children(subtrees);
    mount.version = Some(version);
    root.children(vec![mount])
}

/// Compile a route tree into the flat dispatch table.
///
/// Emits one entry per node in pre-order. The input tree is not
/// mutated; compiling twice from the same tree yields identical output.
pub fn compile(root: &RouteNode) -> Result<Vec<CompiledRoute>, RouteError> {
    let mut table = Vec::new();
    let mut seen = HashSet::new();
    visit(root, &[], &[], None, &mut table, &mut seen)?;
    Ok(table)
}

fn visit(
    node: &RouteNode,
    ancestor_segments: &[Segment],
    ancestor_captures: &[Option<String>],
    version: Option<ApiVersion>,
    table: &mut Vec<CompiledRoute>,
    seen: &mut HashSet<String>,
) -> Result<(), RouteError> {
    let mut segments = ancestor_segments.to_vec();
    let mut capture_names = ancestor_captures.to_vec();

    // The root's empty literal contributes no path segment.
    let is_root = matches!(&node.pattern, Segment::Literal(text) if text.is_empty());
    if !is_root {
        if node.pattern.captures() {
            capture_names.push(node.name.map(|n| format!("{n}_id")));
        }
        segments.push(node.pattern.clone());
    }

    // Everything beneath a version mount inherits its tag.
    let version = version.or(node.version);

    let full_pattern = render_pattern(&segments);
    if !seen.insert(full_pattern.clone()) {
        return Err(RouteError::DuplicatePattern(full_pattern));
    }

    table.push(CompiledRoute {
        segments: segments.clone(),
        full_pattern,
        handler: node.handler,
        version,
        paginated: version.is_some_and(ApiVersion::paginated),
        capture_names: capture_names.clone(),
        name: node.name,
    });

    for child in &node.children {
        visit(child, &segments, &capture_names, version, table, seen)?;
    }
    Ok(())
}

fn render_pattern(segments: &[Segment]) -> String {
    if segments.is_empty() {
        return "/".to_string();
    }
    let mut pattern = String::new();
    for segment in segments {
        pattern.push('/');
        pattern.push_str(segment.pattern_text());
    }
    pattern
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_tree() -> RouteNode {
        let v1 = vec![
            RouteNode::literal("version", HandlerKind::Version),
            RouteNode::literal("build", HandlerKind::Builds)
                .named("builds")
                .children(vec![RouteNode::id(HandlerKind::Build)
                    .named("build")
                    .children(vec![RouteNode::literal(
                        "subjob",
                        HandlerKind::Subjobs,
                    )])]),
        ];
        let v2 = vec![
            RouteNode::literal("version", HandlerKind::Version),
            RouteNode::literal("builds", HandlerKind::Builds).children(vec![
                RouteNode::id(HandlerKind::Build).named("build"),
            ]),
        ];
        let root = RouteNode::root(HandlerKind::Root);
        let root = mount_version(root, v1, ApiVersion::V1);
        mount_version(root, v2, ApiVersion::V2)
    }

    #[test]
    fn compiles_one_entry_per_node_in_preorder() {
        let table = compile(&small_tree()).unwrap();
        let patterns: Vec<_> = table.iter().map(|r| r.full_pattern.as_str()).collect();
        assert_eq!(
            patterns,
            vec![
                "/",
                "/v1",
                "/v1/version",
                "/v1/build",
                "/v1/build/{id}",
                "/v1/build/{id}/subjob",
                "/v2",
                "/v2/version",
                "/v2/builds",
                "/v2/builds/{id}",
            ]
        );
    }

    #[test]
    fn compilation_is_deterministic_and_idempotent() {
        let tree = small_tree();
        let first = compile(&tree).unwrap();
        let second = compile(&tree).unwrap();
        let render = |t: &[CompiledRoute]| {
            t.iter()
                .map(|r| format!("{}|{:?}|{:?}|{:?}", r.full_pattern, r.handler, r.version, r.capture_names))
                .collect::<Vec<_>>()
        };
        assert_eq!(render(&first), render(&second));
    }

    #[test]
    fn descendant_pattern_extends_named_ancestor_pattern() {
        let table = compile(&small_tree()).unwrap();
        let build = table.iter().find(|r| r.name == Some("build")).unwrap();
        let child = table
            .iter()
            .find(|r| r.full_pattern == "/v1/build/{id}/subjob")
            .unwrap();
        assert!(child.full_pattern.starts_with(&build.full_pattern));
        assert_eq!(
            child.full_pattern,
            format!("{}/subjob", build.full_pattern)
        );
    }

    #[test]
    fn named_captures_propagate_to_descendants() {
        let table = compile(&small_tree()).unwrap();
        let child = table
            .iter()
            .find(|r| r.full_pattern == "/v1/build/{id}/subjob")
            .unwrap();
        assert_eq!(child.capture_names, vec![Some("build_id".to_string())]);
    }

    #[test]
    fn versions_are_tagged_independently() {
        let table = compile(&small_tree()).unwrap();
        let v1 = table
            .iter()
            .find(|r| r.full_pattern == "/v1/build/{id}")
            .unwrap();
        let v2 = table
            .iter()
            .find(|r| r.full_pattern == "/v2/builds/{id}")
            .unwrap();
        assert_eq!(v1.version, Some(ApiVersion::V1));
        assert_eq!(v2.version, Some(ApiVersion::V2));
        assert!(!v1.paginated);
        assert!(v2.paginated);
        assert_eq!(v1.handler, v2.handler);
    }

    #[test]
    fn duplicate_full_pattern_is_a_construction_error() {
        let root = RouteNode::root(HandlerKind::Root).children(vec![
            RouteNode::literal("build", HandlerKind::Builds),
            RouteNode::literal("build", HandlerKind::Queue),
        ]);
        match compile(&root) {
            Err(RouteError::DuplicatePattern(p)) => assert_eq!(p, "/build"),
            other => panic!("expected duplicate-pattern error, got {other:?}"),
        }
    }

    #[test]
    fn literal_and_id_segments_are_distinguishable() {
        let root = RouteNode::root(HandlerKind::Root).children(vec![RouteNode::literal(
            "slave",
            HandlerKind::Workers,
        )
        .children(vec![
            RouteNode::id(HandlerKind::Worker),
            RouteNode::literal("shutdown", HandlerKind::WorkersShutdown),
        ])]);
        assert!(compile(&root).is_ok());
    }

    #[test]
    fn same_pattern_in_different_versions_is_allowed() {
        let table = compile(&small_tree()).unwrap();
        assert!(table.iter().any(|r| r.full_pattern == "/v1/version"));
        assert!(table.iter().any(|r| r.full_pattern == "/v2/version"));
    }
}
