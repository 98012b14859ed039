//! Console-output fallback protocol.
//!
//! Two-tier read: the master's local store first; on a local miss, one
//! redirect hop to the worker currently executing the subjob. The
//! master never proxies or follows the redirect itself — in-progress
//! log data is polled frequently and can be large, so the master's role
//! stays limited to address resolution.

use std::collections::HashMap;

use url::Url;

use crate::api::context::ApiContext;
use crate::api::error::ApiError;
use crate::api::response::{query_u64, ApiResponse};
use crate::cluster::ClusterError;

/// Serve an atom's console output, falling back to a redirect.
///
/// 1. Query the local console-output store.
/// 2. On success, answer with the payload directly.
/// 3. On a local miss the atom may still be executing remotely:
///    resolve the subjob's assigned worker and redirect the client to
///    the equivalent endpoint there, forwarding `max_lines` and
///    `offset_line`. With no assigned worker the original NotFound
///    propagates unchanged — never silently swallowed into an empty
///    body.
pub fn console_output(
    ctx: &ApiContext,
    build_id: u64,
    subjob_id: u64,
    atom_id: u64,
    query: &HashMap<String, String>,
) -> Result<ApiResponse, ApiError> {
    let max_lines = query_u64(query, "max_lines")?
        .map(|n| n as usize)
        .unwrap_or(ctx.config.console.default_max_lines);
    let offset_line = query_u64(query, "offset_line")?.map(|n| n as usize);

    match ctx
        .console
        .console_output(build_id, subjob_id, atom_id, max_lines, offset_line)
    {
        Ok(payload) => Ok(ApiResponse::json(payload)),
        Err(ClusterError::NotFound(what)) => {
            let worker_url = ctx.scheduler.subjob_worker_url(build_id, subjob_id)?;
            match worker_url {
                None => Err(ApiError::NotFound(what)),
                Some(base) => Ok(ApiResponse::Redirect(worker_console_url(
                    &base,
                    build_id,
                    subjob_id,
                    atom_id,
                    max_lines,
                    offset_line,
                )?)),
            }
        }
        Err(err) => Err(err.into()),
    }
}

/// Build the worker's console endpoint URL, mirroring the local
/// build/subjob/atom addressing scheme.
fn worker_console_url(
    base: &str,
    build_id: u64,
    subjob_id: u64,
    atom_id: u64,
    max_lines: usize,
    offset_line: Option<usize>,
) -> Result<String, ApiError> {
    let mut url = Url::parse(base)
        .map_err(|e| ApiError::Internal(format!("bad worker url {base}: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| ApiError::Internal(format!("worker url {base} cannot carry a path")))?
        .extend([
            "v1",
            "build",
            &build_id.to_string(),
            "subjob",
            &subjob_id.to_string(),
            "atom",
            &atom_id.to_string(),
            "console",
        ]);
    url.query_pairs_mut()
        .append_pair("max_lines", &max_lines.to_string());
    if let Some(offset) = offset_line {
        url.query_pairs_mut()
            .append_pair("offset_line", &offset.to_string());
    }
    Ok(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::context::ApiContext;
    use crate::cluster::InMemoryCluster;
    use crate::config::MasterConfig;
    use std::sync::Arc;

    fn context(cluster: Arc<InMemoryCluster>) -> ApiContext {
        ApiContext::from_cluster(cluster, MasterConfig::default(), None)
    }

    #[test]
    fn local_hit_answers_directly() {
        let cluster = Arc::new(InMemoryCluster::new("/tmp/results"));
        let build_id = cluster.seed_build(1, 1);
        cluster.store_console_output(build_id, 0, 0, vec!["hello".to_string()]);
        let ctx = context(cluster);

        let response = console_output(&ctx, build_id, 0, 0, &HashMap::new()).unwrap();
        match response {
            ApiResponse::Json { body, .. } => {
                assert_eq!(body["console_output"], "hello\n");
            }
            other => panic!("expected json, got {other:?}"),
        }
    }

    #[test]
    fn local_miss_with_assigned_worker_redirects() {
        let cluster = Arc::new(InMemoryCluster::new("/tmp/results"));
        let build_id = cluster.seed_build(1, 1);
        cluster.assign_subjob_worker(build_id, 0, "http://worker-7:8080");
        let ctx = context(cluster);

        let response = console_output(&ctx, build_id, 0, 0, &HashMap::new()).unwrap();
        match response {
            ApiResponse::Redirect(target) => assert_eq!(
                target,
                format!("http://worker-7:8080/v1/build/{build_id}/subjob/0/atom/0/console?max_lines=50")
            ),
            other => panic!("expected redirect, got {other:?}"),
        }
    }

    #[test]
    fn offset_line_is_forwarded_when_present() {
        let cluster = Arc::new(InMemoryCluster::new("/tmp/results"));
        let build_id = cluster.seed_build(1, 1);
        cluster.assign_subjob_worker(build_id, 0, "http://worker-7:8080");
        let ctx = context(cluster);

        let query: HashMap<_, _> = [
            ("max_lines".to_string(), "10".to_string()),
            ("offset_line".to_string(), "200".to_string()),
        ]
        .into_iter()
        .collect();
        let response = console_output(&ctx, build_id, 0, 0, &query).unwrap();
        match response {
            ApiResponse::Redirect(target) => {
                assert!(target.ends_with("/console?max_lines=10&offset_line=200"));
            }
            other => panic!("expected redirect, got {other:?}"),
        }
    }

    #[test]
    fn local_miss_without_worker_propagates_not_found() {
        let cluster = Arc::new(InMemoryCluster::new("/tmp/results"));
        let build_id = cluster.seed_build(1, 1);
        let ctx = context(cluster);

        let err = console_output(&ctx, build_id, 0, 0, &HashMap::new());
        assert!(matches!(err, Err(ApiError::NotFound(_))));
    }

    #[test]
    fn unknown_subjob_surfaces_not_found_not_redirect() {
        let cluster = Arc::new(InMemoryCluster::new("/tmp/results"));
        let build_id = cluster.seed_build(1, 1);
        let ctx = context(cluster);

        let err = console_output(&ctx, build_id, 9, 0, &HashMap::new());
        assert!(matches!(err, Err(ApiError::NotFound(_))));
    }
}
