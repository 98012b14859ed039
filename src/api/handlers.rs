//! Resource handlers.
//!
//! Each compiled route dispatches to one [`HandlerKind`]. All kinds
//! share the uniform contract `handle(route, request, context, table)`;
//! version-specific behavior (pagination) arrives as a flag in the
//! compiled entry, not as a parallel handler hierarchy. Id coercion and
//! existence checks happen here — the dispatcher hands ids over as
//! opaque strings, and a missing resource is a domain NotFound.

use std::collections::HashMap;

use axum::body::Bytes;
use axum::http::{Method, StatusCode};
use serde_json::{json, Value};

use crate::api::console;
use crate::api::context::ApiContext;
use crate::api::error::ApiError;
use crate::api::response::{paginate, query_u64, ApiResponse};
use crate::cluster::ArchiveFormat;
use crate::routing::{Captures, CompiledRoute, Dispatcher};

/// Every handler the route tree can dispatch to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    Root,
    VersionIndex,
    Version,
    Metrics,
    Queue,
    Builds,
    Build,
    BuildResultRedirect,
    BuildTarArchive,
    BuildZipArchive,
    Subjobs,
    Subjob,
    SubjobResult,
    Atoms,
    Atom,
    AtomConsole,
    Workers,
    Worker,
    WorkerHeartbeat,
    WorkerShutdown,
    WorkersShutdown,
    EventLog,
}

impl HandlerKind {
    /// Whether this handler requires a credential for the given method.
    /// Worker connect (POST to the collection) stays open: workers
    /// register before any credential exchange.
    pub fn requires_auth(self, method: &Method) -> bool {
        match self {
            HandlerKind::Builds => method == Method::POST,
            HandlerKind::Build | HandlerKind::Worker => method == Method::PUT,
            HandlerKind::WorkerHeartbeat
            | HandlerKind::WorkerShutdown
            | HandlerKind::WorkersShutdown => method == Method::POST,
            _ => false,
        }
    }
}

/// A file part extracted from a multipart upload.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content: Bytes,
}

/// Multipart body: at most one file part plus text fields.
#[derive(Debug, Clone, Default)]
pub struct MultipartBody {
    pub file: Option<UploadedFile>,
    pub fields: HashMap<String, String>,
}

/// Decoded request body, produced by the server before dispatch.
#[derive(Debug, Clone)]
pub enum DecodedBody {
    None,
    Json(Value),
    Multipart(MultipartBody),
}

impl DecodedBody {
    /// JSON view of the body; an absent body reads as an empty object.
    fn as_json(&self) -> Result<Value, ApiError> {
        match self {
            DecodedBody::None => Ok(json!({})),
            DecodedBody::Json(value) => Ok(value.clone()),
            DecodedBody::Multipart(_) => Err(ApiError::BadRequest(
                "expected a JSON body".to_string(),
            )),
        }
    }
}

/// Everything a handler receives for one request.
#[derive(Debug)]
pub struct ApiRequest {
    pub method: Method,
    pub captures: Captures,
    pub query: HashMap<String, String>,
    pub body: DecodedBody,
}

fn capture_id(captures: &Captures, key: &str) -> Result<u64, ApiError> {
    let raw = captures
        .named(key)
        .ok_or_else(|| ApiError::Internal(format!("route did not capture {key}")))?;
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("{key} out of range: {raw}")))
}

/// Named direct children of a route, for index listings. Only named
/// nodes are exposed; the names come from the route tree, the paths
/// from the compiled table.
fn child_routes(route: &CompiledRoute, dispatcher: &Dispatcher) -> Value {
    let prefix = if route.full_pattern == "/" {
        String::new()
    } else {
        route.full_pattern.clone()
    };
    let mut children = serde_json::Map::new();
    for candidate in dispatcher.routes() {
        let is_child = candidate.depth() == route.depth() + 1
            && candidate.full_pattern.starts_with(&format!("{prefix}/"));
        if let (true, Some(name)) = (is_child, candidate.name) {
            children.insert(
                name.to_string(),
                Value::String(candidate.full_pattern.clone()),
            );
        }
    }
    Value::Object(children)
}

/// Dispatch one matched request to its handler.
pub fn handle(
    route: &CompiledRoute,
    request: &ApiRequest,
    ctx: &ApiContext,
    dispatcher: &Dispatcher,
) -> Result<ApiResponse, ApiError> {
    match (route.handler, request.method.as_str()) {
        (HandlerKind::Root, "GET") | (HandlerKind::VersionIndex, "GET") => {
            let mut body = json!({
                "child_routes": child_routes(route, dispatcher),
            });
            if let Some(version) = route.version {
                body["api_version"] = json!(version.number());
            }
            Ok(ApiResponse::json(body))
        }

        (HandlerKind::Version, "GET") => Ok(ApiResponse::json(json!({
            "version": env!("CARGO_PKG_VERSION"),
            "api_version": route.version.map(|v| v.number()),
        }))),

        (HandlerKind::Metrics, "GET") => {
            let exposition = ctx
                .metrics
                .as_ref()
                .map(|handle| handle.render())
                .unwrap_or_default();
            Ok(ApiResponse::Text(exposition))
        }

        (HandlerKind::Queue, "GET") => {
            let queue = paginate(ctx.scheduler.active_builds(), &request.query, route.paginated)?;
            Ok(ApiResponse::json(json!({ "queue": queue })))
        }

        (HandlerKind::Builds, "GET") => {
            let builds = paginate(ctx.scheduler.builds(), &request.query, route.paginated)?;
            Ok(ApiResponse::json(json!({ "builds": builds })))
        }
        (HandlerKind::Builds, "POST") => {
            let params = request.body.as_json()?;
            let build = ctx.scheduler.request_new_build(&params)?;
            ctx.eventlog
                .record("BUILD_REQUEST", json!({ "build_id": build["id"] }));
            Ok(ApiResponse::envelope(
                StatusCode::ACCEPTED,
                true,
                json!({ "build_id": build["id"] }),
            ))
        }

        (HandlerKind::Build, "GET") => {
            let build_id = capture_id(&request.captures, "build_id")?;
            Ok(ApiResponse::json(
                json!({ "build": ctx.scheduler.build(build_id)? }),
            ))
        }
        (HandlerKind::Build, "PUT") => {
            let build_id = capture_id(&request.captures, "build_id")?;
            let params = request.body.as_json()?;
            let build = ctx.scheduler.update_build(build_id, &params)?;
            Ok(ApiResponse::envelope(
                StatusCode::OK,
                true,
                json!({ "build": build }),
            ))
        }

        (HandlerKind::BuildResultRedirect, "GET") => {
            let build_id = capture_id(&request.captures, "build_id")?;
            // The tar archive is the canonical result download.
            Ok(ApiResponse::Redirect(format!(
                "/v1/build/{build_id}/artifacts.tar.gz"
            )))
        }
        (HandlerKind::BuildTarArchive, "GET") => {
            let build_id = capture_id(&request.captures, "build_id")?;
            let path = ctx
                .scheduler
                .results_archive_path(build_id, ArchiveFormat::Tar)?;
            Ok(ApiResponse::File(path))
        }
        (HandlerKind::BuildZipArchive, "GET") => {
            let build_id = capture_id(&request.captures, "build_id")?;
            let path = ctx
                .scheduler
                .results_archive_path(build_id, ArchiveFormat::Zip)?;
            Ok(ApiResponse::File(path))
        }

        (HandlerKind::Subjobs, "GET") => {
            let build_id = capture_id(&request.captures, "build_id")?;
            let subjobs = paginate(
                ctx.scheduler.subjobs(build_id)?,
                &request.query,
                route.paginated,
            )?;
            Ok(ApiResponse::json(json!({ "subjobs": subjobs })))
        }
        (HandlerKind::Subjob, "GET") => {
            let build_id = capture_id(&request.captures, "build_id")?;
            let subjob_id = capture_id(&request.captures, "subjob_id")?;
            Ok(ApiResponse::json(
                json!({ "subjob": ctx.scheduler.subjob(build_id, subjob_id)? }),
            ))
        }

        (HandlerKind::SubjobResult, "POST") => {
            let build_id = capture_id(&request.captures, "build_id")?;
            let subjob_id = capture_id(&request.captures, "subjob_id")?;
            let DecodedBody::Multipart(multipart) = &request.body else {
                return Err(ApiError::BadRequest(
                    "subjob result must be a multipart upload".to_string(),
                ));
            };
            let file = multipart
                .file
                .as_ref()
                .ok_or_else(|| ApiError::BadRequest("result file not provided".to_string()))?;
            let worker_url = multipart
                .fields
                .get("slave")
                .ok_or_else(|| ApiError::BadRequest("reporting slave not provided".to_string()))?;

            let executor_id = multipart
                .fields
                .get("metric_data")
                .and_then(|raw| serde_json::from_str::<Value>(raw).ok())
                .and_then(|data| data.get("executor_id").cloned());
            ctx.eventlog.record(
                "MASTER_RECEIVED_RESULT",
                json!({
                    "build_id": build_id,
                    "subjob_id": subjob_id,
                    "slave": worker_url,
                    "executor_id": executor_id,
                }),
            );

            ctx.scheduler
                .report_subjob_result(build_id, subjob_id, worker_url, &file.content)?;
            Ok(ApiResponse::envelope(StatusCode::OK, true, json!({})))
        }
        (HandlerKind::SubjobResult, "GET") => {
            // TODO: serve the subjob's result archive back out.
            Ok(ApiResponse::json(json!({ "status": "not implemented" })))
        }

        (HandlerKind::Atoms, "GET") => {
            let build_id = capture_id(&request.captures, "build_id")?;
            let subjob_id = capture_id(&request.captures, "subjob_id")?;
            let atoms = paginate(
                ctx.scheduler.atoms(build_id, subjob_id)?,
                &request.query,
                route.paginated,
            )?;
            Ok(ApiResponse::json(json!({ "atoms": atoms })))
        }
        (HandlerKind::Atom, "GET") => {
            let build_id = capture_id(&request.captures, "build_id")?;
            let subjob_id = capture_id(&request.captures, "subjob_id")?;
            let atom_id = capture_id(&request.captures, "atom_id")?;
            Ok(ApiResponse::json(
                json!({ "atom": ctx.scheduler.atom(build_id, subjob_id, atom_id)? }),
            ))
        }

        (HandlerKind::AtomConsole, "GET") => {
            let build_id = capture_id(&request.captures, "build_id")?;
            let subjob_id = capture_id(&request.captures, "subjob_id")?;
            let atom_id = capture_id(&request.captures, "atom_id")?;
            console::console_output(ctx, build_id, subjob_id, atom_id, &request.query)
        }

        (HandlerKind::Workers, "GET") => {
            let workers = paginate(ctx.registry.workers(), &request.query, route.paginated)?;
            Ok(ApiResponse::json(json!({ "slaves": workers })))
        }
        (HandlerKind::Workers, "POST") => {
            let params = request.body.as_json()?;
            let url = params
                .get("slave")
                .and_then(Value::as_str)
                .ok_or_else(|| ApiError::BadRequest("slave url not provided".to_string()))?;
            let num_executors = params
                .get("num_executors")
                .and_then(Value::as_u64)
                .ok_or_else(|| ApiError::BadRequest("num_executors not provided".to_string()))?;
            let num_executors = u32::try_from(num_executors).map_err(|_| {
                ApiError::BadRequest(format!("num_executors out of range: {num_executors}"))
            })?;
            let session_id = params.get("session_id").and_then(Value::as_str);
            let worker = ctx
                .registry
                .connect_worker(url, num_executors, session_id)?;
            Ok(ApiResponse::envelope(
                StatusCode::CREATED,
                true,
                json!({ "slave": worker }),
            ))
        }

        (HandlerKind::Worker, "GET") => {
            let worker_id = capture_id(&request.captures, "slave_id")?;
            Ok(ApiResponse::json(
                json!({ "slave": ctx.registry.worker(worker_id)? }),
            ))
        }
        (HandlerKind::Worker, "PUT") => {
            let worker_id = capture_id(&request.captures, "slave_id")?;
            let params = request.body.as_json()?;
            let state = params
                .get("slave")
                .and_then(|s| s.get("state"))
                .and_then(Value::as_str)
                .ok_or_else(|| ApiError::BadRequest("slave state not provided".to_string()))?;
            let worker = ctx.registry.update_worker_state(worker_id, state)?;
            Ok(ApiResponse::envelope(
                StatusCode::OK,
                true,
                json!({ "slave": worker }),
            ))
        }

        (HandlerKind::WorkerHeartbeat, "POST") => {
            let worker_id = capture_id(&request.captures, "slave_id")?;
            ctx.registry.refresh_heartbeat(worker_id)?;
            Ok(ApiResponse::envelope(StatusCode::OK, true, json!({})))
        }

        (HandlerKind::WorkerShutdown, "POST") => {
            let worker_id = capture_id(&request.captures, "slave_id")?;
            ctx.registry.set_shutdown_mode(&[worker_id])?;
            Ok(ApiResponse::envelope(StatusCode::OK, true, json!({})))
        }
        (HandlerKind::WorkersShutdown, "POST") => {
            let params = request.body.as_json()?;
            let worker_ids = if params
                .get("shutdown_all")
                .and_then(Value::as_bool)
                .unwrap_or(false)
            {
                ctx.registry.all_worker_ids()
            } else {
                params
                    .get("slaves")
                    .and_then(Value::as_array)
                    .ok_or_else(|| {
                        ApiError::BadRequest(
                            "expected shutdown_all or a list of slaves".to_string(),
                        )
                    })?
                    .iter()
                    .map(|id| {
                        id.as_u64().ok_or_else(|| {
                            ApiError::BadRequest(format!("bad slave id: {id}"))
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?
            };
            ctx.registry.set_shutdown_mode(&worker_ids)?;
            Ok(ApiResponse::envelope(StatusCode::OK, true, json!({})))
        }

        (HandlerKind::EventLog, "GET") => {
            let since_timestamp = request
                .query
                .get("since_timestamp")
                .map(|raw| {
                    raw.parse::<f64>().map_err(|_| {
                        ApiError::BadRequest("since_timestamp must be numeric".to_string())
                    })
                })
                .transpose()?;
            let since_id = query_u64(&request.query, "since_id")?;
            let events = paginate(
                ctx.eventlog.events(since_timestamp, since_id),
                &request.query,
                route.paginated,
            )?;
            Ok(ApiResponse::json(json!({ "events": events })))
        }

        _ => Err(ApiError::MethodNotAllowed),
    }
}
