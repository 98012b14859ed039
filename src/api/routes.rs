//! Declarative route tree for the master API.
//!
//! The routes are described as a tree: a better representation of a
//! path than a flat string list, and it lets the compiler derive full
//! patterns and child-route listings from structure alone. Two
//! versions are mounted at the root: v1 nests every resource under
//! `build/{id}`, v2 exposes the flatter plural shape and paginates
//! listings. Worker endpoints keep the `slave` wire name.

use crate::api::handlers::HandlerKind;
use crate::routing::{mount_version, ApiVersion, RouteNode};

fn v1_routes() -> Vec<RouteNode> {
    vec![
        RouteNode::literal("metrics", HandlerKind::Metrics),
        RouteNode::literal("version", HandlerKind::Version),
        RouteNode::literal("build", HandlerKind::Builds)
            .named("builds")
            .children(vec![RouteNode::id(HandlerKind::Build)
                .named("build")
                .children(vec![
                    RouteNode::literal("result", HandlerKind::BuildResultRedirect),
                    RouteNode::literal("artifacts.tar.gz", HandlerKind::BuildTarArchive),
                    RouteNode::literal("artifacts.zip", HandlerKind::BuildZipArchive),
                    RouteNode::literal("subjob", HandlerKind::Subjobs)
                        .named("subjobs")
                        .children(vec![RouteNode::id(HandlerKind::Subjob)
                            .named("subjob")
                            .children(vec![
                                RouteNode::literal("atom", HandlerKind::Atoms)
                                    .named("atoms")
                                    .children(vec![RouteNode::id(HandlerKind::Atom)
                                        .named("atom")
                                        .children(vec![RouteNode::literal(
                                            "console",
                                            HandlerKind::AtomConsole,
                                        )])]),
                                RouteNode::literal("result", HandlerKind::SubjobResult),
                            ])]),
                ])]),
        RouteNode::literal("queue", HandlerKind::Queue),
        RouteNode::literal("slave", HandlerKind::Workers)
            .named("slaves")
            .children(vec![
                RouteNode::id(HandlerKind::Worker).named("slave").children(vec![
                    RouteNode::literal("shutdown", HandlerKind::WorkerShutdown),
                    RouteNode::literal("heartbeat", HandlerKind::WorkerHeartbeat),
                ]),
                RouteNode::literal("shutdown", HandlerKind::WorkersShutdown),
            ]),
        RouteNode::literal("eventlog", HandlerKind::EventLog),
    ]
}

fn v2_routes() -> Vec<RouteNode> {
    vec![
        RouteNode::literal("metrics", HandlerKind::Metrics),
        RouteNode::literal("version", HandlerKind::Version),
        RouteNode::literal("builds", HandlerKind::Builds)
            .named("builds")
            .children(vec![RouteNode::id(HandlerKind::Build)
                .named("build")
                .children(vec![
                    RouteNode::literal("result", HandlerKind::BuildResultRedirect),
                    RouteNode::literal("artifacts.tar.gz", HandlerKind::BuildTarArchive),
                    RouteNode::literal("artifacts.zip", HandlerKind::BuildZipArchive),
                    RouteNode::literal("subjobs", HandlerKind::Subjobs)
                        .named("subjobs")
                        .children(vec![RouteNode::id(HandlerKind::Subjob)
                            .named("subjob")
                            .children(vec![
                                RouteNode::literal("atoms", HandlerKind::Atoms)
                                    .named("atoms")
                                    .children(vec![RouteNode::id(HandlerKind::Atom)
                                        .named("atom")
                                        .children(vec![RouteNode::literal(
                                            "console",
                                            HandlerKind::AtomConsole,
                                        )])]),
                                RouteNode::literal("result", HandlerKind::SubjobResult),
                            ])]),
                ])]),
        RouteNode::literal("queue", HandlerKind::Queue),
        RouteNode::literal("slaves", HandlerKind::Workers)
            .named("slaves")
            .children(vec![
                RouteNode::id(HandlerKind::Worker).named("slave").children(vec![
                    RouteNode::literal("shutdown", HandlerKind::WorkerShutdown),
                    RouteNode::literal("heartbeat", HandlerKind::WorkerHeartbeat),
                ]),
                RouteNode::literal("shutdown", HandlerKind::WorkersShutdown),
            ]),
        RouteNode::literal("eventlog", HandlerKind::EventLog),
    ]
}

/// The complete route tree: both API versions mounted at the root.
pub fn route_tree() -> RouteNode {
    let root = RouteNode::root(HandlerKind::Root);
    let root = mount_version(root, v1_routes(), ApiVersion::V1);
    mount_version(root, v2_routes(), ApiVersion::V2)
}
