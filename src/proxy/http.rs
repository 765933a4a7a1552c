//! Plain HTTP forwarding to a team backend
//!
//! The inbound request is replayed against the backend endpoint with its
//! original method, path, query, headers, and body. Hop-by-hop headers
//! stay on their own leg of the connection; everything else passes
//! through untouched. Any failure to reach the backend surfaces as a
//! proxy error so the caller can answer 502.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::{self, HeaderName};
use hyper::{Request, Response, StatusCode};
use tracing::debug;

use crate::types::{GatehouseError, Result};

/// Headers that describe the connection itself, never forwarded.
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(name)
}

/// Join the backend endpoint with the request's path and query.
fn target_url(endpoint: &str, req_uri: &hyper::Uri) -> String {
    let path_and_query = req_uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    format!("{}{}", endpoint.trim_end_matches('/'), path_and_query)
}

/// Replay a request against a backend endpoint.
///
/// Generic over the inbound body so tests can drive it with buffered
/// bodies; the server hands it `hyper::body::Incoming`.
pub async fn forward_http<B>(
    client: &reqwest::Client,
    endpoint: &str,
    req: Request<B>,
) -> Result<Response<Full<Bytes>>>
where
    B: hyper::body::Body + Send,
    B::Data: Send,
    B::Error: std::fmt::Display,
{
    let (parts, body) = req.into_parts();
    let target = target_url(endpoint, &parts.uri);

    let body_bytes = body
        .collect()
        .await
        .map_err(|e| GatehouseError::Proxy(format!("Failed to read request body: {e}")))?
        .to_bytes();

    debug!(
        method = %parts.method,
        url = %target,
        body_len = body_bytes.len(),
        "Forwarding request to backend"
    );

    let mut builder = client.request(parts.method, &target);
    for (name, value) in parts.headers.iter() {
        if is_hop_by_hop(name) || name == header::HOST || name == header::CONTENT_LENGTH {
            continue;
        }
        builder = builder.header(name.clone(), value.clone());
    }

    let backend_response = builder
        .body(body_bytes.to_vec())
        .send()
        .await
        .map_err(|e| GatehouseError::Proxy(format!("Backend unreachable: {e}")))?;

    let status = backend_response.status();
    let mut response = Response::builder()
        .status(StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY));

    for (name, value) in backend_response.headers().iter() {
        if is_hop_by_hop(name) {
            continue;
        }
        response = response.header(name.clone(), value.clone());
    }

    let response_body = backend_response
        .bytes()
        .await
        .map_err(|e| GatehouseError::Proxy(format!("Failed to read backend response: {e}")))?;

    response
        .body(Full::new(response_body))
        .map_err(|e| GatehouseError::Proxy(format!("Failed to build response: {e}")))
}
