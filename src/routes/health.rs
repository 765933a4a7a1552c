//! Health check endpoints
//!
//! Kubernetes-style probes:
//! - /health, /healthz - liveness (is the service running?)
//! - /ready, /readyz - readiness (can it reach its collaborators?)
//!
//! Liveness always answers 200 while the process runs. Readiness checks
//! the team store; the control plane is probed lazily per request and a
//! control-plane outage should not take the whole front door out of
//! rotation.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;

use crate::server::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: &'static str,
    pub mode: String,
    pub node_id: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn build_health_response(state: &AppState, error: Option<String>) -> HealthResponse {
    HealthResponse {
        healthy: error.is_none(),
        version: env!("CARGO_PKG_VERSION"),
        mode: if state.args.dev_mode {
            "development".to_string()
        } else {
            "production".to_string()
        },
        node_id: state.args.node_id.to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        error,
    }
}

fn health_body(response: &HealthResponse, status: StatusCode) -> Response<Full<Bytes>> {
    let body = serde_json::to_string(response)
        .unwrap_or_else(|_| r#"{"healthy":false,"error":"Serialization failed"}"#.to_string());

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

/// Handle liveness probe (/health, /healthz)
pub fn health_check(state: Arc<AppState>) -> Response<Full<Bytes>> {
    health_body(&build_health_response(&state, None), StatusCode::OK)
}

/// Handle readiness probe (/ready, /readyz)
///
/// Ready only when the team store answers; an unreachable store means
/// joins and passthrough auth cannot work.
pub async fn readiness_check(state: Arc<AppState>) -> Response<Full<Bytes>> {
    match state.store.list().await {
        Ok(_) => health_body(&build_health_response(&state, None), StatusCode::OK),
        Err(e) => health_body(
            &build_health_response(&state, Some(format!("Team store unreachable: {e}"))),
            StatusCode::SERVICE_UNAVAILABLE,
        ),
    }
}

/// Version information for deployment verification
#[derive(Serialize)]
pub struct VersionResponse {
    pub version: &'static str,
    pub commit: &'static str,
    pub build_time: &'static str,
    pub service: &'static str,
}

/// Handle version endpoint (/version)
pub fn version_info() -> Response<Full<Bytes>> {
    let response = VersionResponse {
        version: env!("CARGO_PKG_VERSION"),
        commit: option_env!("GIT_COMMIT_SHORT").unwrap_or("unknown"),
        build_time: option_env!("BUILD_TIMESTAMP").unwrap_or("unknown"),
        service: "gatehouse",
    };

    let body = serde_json::to_string(&response)
        .unwrap_or_else(|_| r#"{"version":"unknown","commit":"unknown"}"#.to_string());

    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_liveness_always_ok() {
        let (state, _, _) = AppState::for_tests();
        let response = health_check(state);
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_readiness_with_working_store() {
        let (state, _, _) = AppState::for_tests();
        let response = readiness_check(state).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_version_shape() {
        let response = version_info();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
