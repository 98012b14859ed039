//! HTTP server setup and request dispatch.
//!
//! # Responsibilities
//! - Create the Axum router with the catch-all dispatch handler
//! - Wire up middleware (tracing, timeout, request ID)
//! - Parse query strings and decode JSON/multipart bodies
//! - Dispatch requests through the compiled route table
//! - Run the authentication guard before protected handlers
//! - Render handler responses, including archive byte serving
//! - Record per-request metrics
//!
//! # Design Decisions
//! - A single catch-all route: the compiled dispatch table, not Axum's
//!   router, decides which handler answers
//! - The compiled table is built once and shared read-only via Arc;
//!   requests are handled independently with no shared mutable state

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, FromRequest, Multipart, State},
    http::{header, HeaderValue, Method, Request, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::any,
    Json, Router,
};
use tokio::net::TcpListener;
use tower::limit::ConcurrencyLimitLayer;
use tower::ServiceExt;
use tower_http::{services::ServeFile, timeout::TimeoutLayer, trace::TraceLayer};

use crate::api::handlers::{self, ApiRequest, DecodedBody, MultipartBody, UploadedFile};
use crate::api::{guard, route_tree, ApiContext, ApiError, ApiResponse};
use crate::config::MasterConfig;
use crate::http::request::{RequestIdLayer, X_REQUEST_ID};
use crate::observability::metrics;
use crate::routing::{compile, Dispatcher, RouteError, RouteMatch};

/// Upper bound for decoded request bodies (subjob result archives are
/// the largest expected payload).
const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

/// Application state injected into the dispatch handler.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub context: Arc<ApiContext>,
}

/// HTTP server for the build master.
pub struct HttpServer {
    router: Router,
    config: MasterConfig,
}

impl HttpServer {
    /// Compile the route tree and assemble the server.
    ///
    /// A duplicate route pattern fails here, before any listener is
    /// bound — routing ambiguity is never a runtime condition.
    pub fn new(config: MasterConfig, context: ApiContext) -> Result<Self, RouteError> {
        let table = compile(&route_tree())?;
        tracing::info!(routes = table.len(), "Route table compiled");

        let state = AppState {
            dispatcher: Arc::new(Dispatcher::new(table)),
            context: Arc::new(context),
        };
        let router = Self::build_router(&config, state);
        Ok(Self { router, config })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &MasterConfig, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(dispatch_handler))
            .route("/", any(dispatch_handler))
            .with_state(state)
            // One body cap for every decode path, multipart included;
            // the framework default is far below a result archive.
            .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
            .layer(TimeoutLayer::new(Duration::from_secs(
                config.timeouts.request_secs,
            )))
            .layer(ConcurrencyLimitLayer::new(config.listener.max_connections))
            .layer(RequestIdLayer)
            .layer(TraceLayer::new_for_http())
    }

    /// The assembled router, for in-process testing without a listener.
    pub fn into_router(self) -> Router {
        self.router
    }

    pub fn config(&self) -> &MasterConfig {
        &self.config
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Main dispatch handler: route lookup, guard, body decode, handler
/// invocation, response rendering.
async fn dispatch_handler(
    State(state): State<AppState>,
    request: Request<Body>,
) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let query = parse_query(request.uri().query());
    let request_id = request
        .headers()
        .get(&X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let Some(RouteMatch { route, captures }) = state.dispatcher.dispatch(&path) else {
        tracing::debug!(request_id = %request_id, method = %method, path = %path, "No route matched");
        metrics::record_request(method.as_str(), 404, "none", start);
        // A dispatch miss, as opposed to a handler-level domain miss.
        let body = serde_json::json!({ "error": "invalid request url", "status": 404 });
        return (StatusCode::NOT_FOUND, Json(body)).into_response();
    };

    if let Err(err) = guard::authenticate(
        route,
        &method,
        request.headers(),
        &state.context.config.auth,
    ) {
        tracing::warn!(request_id = %request_id, path = %path, "Rejected unauthenticated request");
        metrics::record_request(method.as_str(), err.status().as_u16(), &route.full_pattern, start);
        return err.into_response();
    }

    let body = match decode_body(request).await {
        Ok(body) => body,
        Err(err) => {
            metrics::record_request(method.as_str(), err.status().as_u16(), &route.full_pattern, start);
            return err.into_response();
        }
    };

    let api_request = ApiRequest {
        method: method.clone(),
        captures,
        query,
        body,
    };

    let result = handlers::handle(route, &api_request, &state.context, &state.dispatcher);
    let response = match result {
        Ok(ApiResponse::Json { status, body }) => (status, Json(body)).into_response(),
        Ok(ApiResponse::Text(text)) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            text,
        )
            .into_response(),
        Ok(ApiResponse::Redirect(target)) => Redirect::temporary(&target).into_response(),
        Ok(ApiResponse::File(archive)) => serve_archive(&archive).await,
        Err(err) => {
            tracing::debug!(request_id = %request_id, path = %path, error = %err, "Request failed");
            err.into_response()
        }
    };

    metrics::record_request(
        method.as_str(),
        response.status().as_u16(),
        &route.full_pattern,
        start,
    );
    response
}

fn parse_query(query: Option<&str>) -> std::collections::HashMap<String, String> {
    query
        .map(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .into_owned()
                .collect()
        })
        .unwrap_or_default()
}

/// Decode the request body for mutating methods. JSON is the default;
/// multipart carries subjob result uploads.
async fn decode_body(request: Request<Body>) -> Result<DecodedBody, ApiError> {
    if request.method() != Method::POST && request.method() != Method::PUT {
        return Ok(DecodedBody::None);
    }

    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    if content_type.starts_with("multipart/form-data") {
        let mut multipart = Multipart::from_request(request, &())
            .await
            .map_err(|e| ApiError::BadRequest(format!("bad multipart body: {e}")))?;
        let mut body = MultipartBody::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::BadRequest(format!("bad multipart body: {e}")))?
        {
            let name = field.name().unwrap_or_default().to_string();
            if name == "file" {
                let file_name = field.file_name().unwrap_or("result").to_string();
                let content = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("bad file part: {e}")))?;
                body.file = Some(UploadedFile { file_name, content });
            } else {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("bad field {name}: {e}")))?;
                body.fields.insert(name, value);
            }
        }
        return Ok(DecodedBody::Multipart(body));
    }

    let bytes = axum::body::to_bytes(request.into_body(), MAX_BODY_BYTES)
        .await
        .map_err(|e| ApiError::BadRequest(format!("failed to read body: {e}")))?;
    if bytes.is_empty() {
        return Ok(DecodedBody::None);
    }
    serde_json::from_slice(&bytes)
        .map(DecodedBody::Json)
        .map_err(|e| ApiError::BadRequest(format!("request body is not valid JSON: {e}")))
}

/// Serve a result archive through static byte serving, downloaded as a
/// binary file.
async fn serve_archive(path: &Path) -> Response {
    match ServeFile::new(path).oneshot(Request::new(Body::empty())).await {
        Ok(response) => {
            if response.status() == StatusCode::NOT_FOUND {
                return ApiError::NotFound(format!("results archive {}", path.display()))
                    .into_response();
            }
            let mut response = response.map(Body::new);
            response.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/octet-stream"),
            );
            response
        }
        Err(e) => ApiError::Internal(format!("failed to serve archive: {e}")).into_response(),
    }
}

/// Wait for shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received");
}
