//! Handler response kinds and shared response helpers.
//!
//! # Responsibilities
//! - Represent the four ways a handler answers: JSON body, exposition
//!   text, redirect, or hand-off to static byte serving
//! - Build the `{success, ...}` envelope mutating endpoints report with
//! - Slice listing results by `offset`/`limit` (v2 pagination contract)

use std::collections::HashMap;
use std::path::PathBuf;

use axum::http::StatusCode;
use serde_json::{Map, Value};

use crate::api::error::ApiError;

/// What a handler produced. The HTTP server renders this into the wire
/// response; handlers stay transport-agnostic.
#[derive(Debug)]
pub enum ApiResponse {
    /// JSON body with the given status.
    Json { status: StatusCode, body: Value },
    /// Plain-text body (metrics exposition).
    Text(String),
    /// Temporary redirect to the given target.
    Redirect(String),
    /// Hand the file at this path to static byte serving, downloaded as
    /// a binary.
    File(PathBuf),
}

impl ApiResponse {
    /// 200 with a JSON body.
    pub fn json(body: Value) -> Self {
        ApiResponse::Json {
            status: StatusCode::OK,
            body,
        }
    }

    /// Mutation outcome envelope: `{"success": ..., <body fields>}`.
    pub fn envelope(status: StatusCode, success: bool, body: Value) -> Self {
        let mut fields = Map::new();
        fields.insert("success".to_string(), Value::Bool(success));
        if let Value::Object(extra) = body {
            fields.extend(extra);
        }
        ApiResponse::Json {
            status,
            body: Value::Object(fields),
        }
    }
}

/// Parse an optional numeric query parameter.
pub fn query_u64(query: &HashMap<String, String>, key: &str) -> Result<Option<u64>, ApiError> {
    match query.get(key) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| ApiError::BadRequest(format!("{key} must be a non-negative integer"))),
    }
}

/// Apply the uniform pagination contract to an ordered collection.
///
/// When `enabled` (v2 routes), returns `[offset, offset+limit)` clamped
/// to the collection bounds; an out-of-range offset yields an empty
/// list. When disabled (v1 routes), the parameters are ignored and the
/// full collection is returned.
pub fn paginate<T>(
    items: Vec<T>,
    query: &HashMap<String, String>,
    enabled: bool,
) -> Result<Vec<T>, ApiError> {
    if !enabled {
        return Ok(items);
    }
    let offset = query_u64(query, "offset")?.unwrap_or(0) as usize;
    let limit = query_u64(query, "limit")?.map(|l| l as usize);

    let offset = offset.min(items.len());
    let end = match limit {
        Some(limit) => offset.saturating_add(limit).min(items.len()),
        None => items.len(),
    };
    Ok(items
        .into_iter()
        .skip(offset)
        .take(end - offset)
        .collect())
}
