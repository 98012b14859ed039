//! Route tree definition.
//!
//! # Responsibilities
//! - Describe one path segment: its matcher, handler kind, optional name
//! - Hold ordered child nodes forming the tree
//! - Stay immutable after construction (the compiler only reads it)
//!
//! # Design Decisions
//! - Tree shape instead of a flat string list: parents/children are
//!   inspectable, so full paths and child-route listings are derived,
//!   never hand-concatenated at registration sites
//! - Two segment kinds only (literal, numeric id); no general patterns

use crate::api::handlers::HandlerKind;
use crate::routing::compiler::ApiVersion;

/// A single path-segment matcher.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// Matches the exact segment text (case-sensitive).
    Literal(String),
    /// Matches one decimal id segment and captures it.
    NumericId,
}

impl Segment {
    /// Returns true if the given path segment satisfies this matcher.
    pub fn matches(&self, segment: &str) -> bool {
        match self {
            Segment::Literal(text) => text == segment,
            Segment::NumericId => {
                !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit())
            }
        }
    }

    /// Returns true if matching this segment captures a value.
    pub fn captures(&self) -> bool {
        matches!(self, Segment::NumericId)
    }

    /// Pattern text used when rendering a full route pattern.
    pub fn pattern_text(&self) -> &str {
        match self {
            Segment::Literal(text) => text,
            Segment::NumericId => "{id}",
        }
    }
}

/// One node of the route tree: a segment, the handler it dispatches to,
/// an optional symbolic name, and its children.
///
/// A node's full path pattern is the `/`-joined concatenation of its
/// ancestors' patterns, root first. Composition is purely structural;
/// no node rewrites another node's pattern.
#[derive(Debug, Clone)]
pub struct RouteNode {
    pub(crate) pattern: Segment,
    pub(crate) handler: HandlerKind,
    pub(crate) name: Option<&'static str>,
    /// Set on version-mount nodes; inherited by everything beneath.
    pub(crate) version: Option<ApiVersion>,
    pub(crate) children: Vec<RouteNode>,
}

impl RouteNode {
    /// Tree root. Matches the empty path (`/`).
    pub fn root(handler: HandlerKind) -> Self {
        Self {
            pattern: Segment::Literal(String::new()),
            handler,
            name: None,
            version: None,
            children: Vec::new(),
        }
    }

    /// Node matching a literal path segment.
    pub fn literal(text: &str, handler: HandlerKind) -> Self {
        Self {
            pattern: Segment::Literal(text.to_string()),
            handler,
            name: None,
            version: None,
            children: Vec::new(),
        }
    }

    /// Node matching one captured numeric id.
    pub fn id(handler: HandlerKind) -> Self {
        Self {
            pattern: Segment::NumericId,
            handler,
            name: None,
            version: None,
            children: Vec::new(),
        }
    }

    /// Attach a symbolic name. Named nodes expose their captured id to
    /// descendants under `<name>_id` and show up in child-route listings.
    pub fn named(mut self, name: &'static str) -> Self {
        self.name = Some(name);
        self
    }

    /// Attach child nodes, preserving order.
    pub fn children(mut self, children: Vec<RouteNode>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn pattern(&self) -> &Segment {
        &self.pattern
    }

    pub fn handler(&self) -> HandlerKind {
        self.handler
    }

    pub fn name(&self) -> Option<&'static str> {
        self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_segment_is_exact_and_case_sensitive() {
        let seg = Segment::Literal("build".to_string());
        assert!(seg.matches("build"));
        assert!(!seg.matches("Build"));
        assert!(!seg.matches("builds"));
    }

    #[test]
    fn numeric_id_matches_digits_only() {
        let seg = Segment::NumericId;
        assert!(seg.matches("0"));
        assert!(seg.matches("42"));
        assert!(!seg.matches(""));
        assert!(!seg.matches("4x2"));
        assert!(!seg.matches("-1"));
    }

    #[test]
    fn builder_preserves_child_order() {
        let node = RouteNode::literal("build", HandlerKind::Builds).children(vec![
            RouteNode::literal("a", HandlerKind::Version),
            RouteNode::literal("b", HandlerKind::Version),
        ]);
        let names: Vec<_> = node
            .children
            .iter()
            .map(|c| c.pattern.pattern_text().to_string())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
