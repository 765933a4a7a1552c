//! Join UI proxy
//!
//! Serves the join page by forwarding `/` and `/static/*` to the UI
//! container. Query strings pass through untouched so redirect hints
//! (`?msg=...&teamname=...`) reach the page.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::server::AppState;

/// Forward a UI request to the join UI container.
pub async fn handle_ui_request(
    state: Arc<AppState>,
    path: &str,
    query: Option<&str>,
) -> Response<Full<Bytes>> {
    let mut target = format!("{}{}", state.args.ui_url.trim_end_matches('/'), path);
    if let Some(query) = query {
        target.push('?');
        target.push_str(query);
    }

    debug!(url = %target, "Forwarding UI request");

    let response = match state.http_client.get(&target).send().await {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e, url = %target, "Failed to reach join UI");
            return ui_unavailable(&e.to_string());
        }
    };

    let status = response.status();
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("text/html")
        .to_string();
    let cache_control = response
        .headers()
        .get("cache-control")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    let body = match response.bytes().await {
        Ok(body) => body,
        Err(e) => {
            warn!(error = %e, "Failed to read join UI response body");
            return ui_unavailable(&e.to_string());
        }
    };

    let mut builder = Response::builder()
        .status(StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::OK))
        .header("Content-Type", content_type);

    if let Some(cc) = cache_control {
        builder = builder.header("Cache-Control", cc);
    }

    builder.body(Full::new(body)).unwrap()
}

fn ui_unavailable(detail: &str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::BAD_GATEWAY)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(format!(
            r#"{{"error": "Join UI unavailable: {}"}}"#,
            detail
        ))))
        .unwrap()
}
