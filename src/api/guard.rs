//! Authentication guard for mutating endpoints.
//!
//! Modeled as an explicit guard the server invokes before a handler is
//! reached, keeping authentication orthogonal to handler logic. An
//! unauthenticated call is rejected before any collaborator is invoked.

use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, Method};

use crate::api::error::ApiError;
use crate::config::AuthConfig;
use crate::routing::CompiledRoute;

/// Reject the request unless it either targets an open endpoint or
/// presents the configured API key as a Bearer token.
pub fn authenticate(
    route: &CompiledRoute,
    method: &Method,
    headers: &HeaderMap,
    auth: &AuthConfig,
) -> Result<(), ApiError> {
    if !route.handler.requires_auth(method) {
        return Ok(());
    }

    let presented = headers.get(AUTHORIZATION).and_then(|h| h.to_str().ok());
    match presented {
        Some(value) if value == format!("Bearer {}", auth.api_key) => Ok(()),
        _ => Err(ApiError::Unauthenticated),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::HandlerKind;
    use crate::routing::{compile, RouteNode};

    fn build_route(handler: HandlerKind) -> CompiledRoute {
        let root = RouteNode::root(HandlerKind::Root)
            .children(vec![RouteNode::literal("build", handler)]);
        compile(&root).unwrap().remove(1)
    }

    fn auth() -> AuthConfig {
        AuthConfig {
            api_key: "topsecret".to_string(),
        }
    }

    #[test]
    fn open_endpoints_need_no_credential() {
        let route = build_route(HandlerKind::Builds);
        assert!(authenticate(&route, &Method::GET, &HeaderMap::new(), &auth()).is_ok());
    }

    #[test]
    fn mutating_endpoints_reject_missing_or_wrong_key() {
        let route = build_route(HandlerKind::Builds);
        let err = authenticate(&route, &Method::POST, &HeaderMap::new(), &auth());
        assert!(matches!(err, Err(ApiError::Unauthenticated)));

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, "Bearer wrong".parse().unwrap());
        let err = authenticate(&route, &Method::POST, &headers, &auth());
        assert!(matches!(err, Err(ApiError::Unauthenticated)));
    }

    #[test]
    fn correct_bearer_key_passes() {
        let route = build_route(HandlerKind::Builds);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, "Bearer topsecret".parse().unwrap());
        assert!(authenticate(&route, &Method::POST, &headers, &auth()).is_ok());
    }
}
