//! WebSocket forwarding to a team backend
//!
//! The client leg is upgraded off the inbound hyper request; the backend
//! leg is a fresh client handshake against the team endpoint with the
//! original path carried over. After both legs are up, a pump moves
//! frames in both directions until either side closes.

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use http_body_util::Full;
use hyper::{Request, Response};
use tokio_tungstenite::{
    connect_async_with_config,
    tungstenite::{handshake::client::generate_key, protocol::Message},
};
use tracing::{debug, info, warn};

use crate::types::{GatehouseError, Result};

type ClientWebSocket =
    hyper_tungstenite::WebSocketStream<hyper_util::rt::TokioIo<hyper::upgrade::Upgraded>>;

/// Whether the request asks for a WebSocket upgrade.
pub fn is_websocket_upgrade<B>(req: &Request<B>) -> bool {
    hyper_tungstenite::is_upgrade_request(req)
}

/// Rewrite an http(s) endpoint into its ws(s) form.
fn websocket_url(endpoint: &str) -> String {
    if let Some(rest) = endpoint.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = endpoint.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        endpoint.to_string()
    }
}

/// Host portion of a URL, for the handshake Host header.
fn host_of(url: &str) -> &str {
    url.split("//")
        .last()
        .unwrap_or("localhost")
        .split('/')
        .next()
        .unwrap_or("localhost")
}

/// Accept the client upgrade and spawn the backend pump.
///
/// Returns the 101 response immediately; the pump runs in its own task
/// for the life of the connection.
pub fn proxy_websocket<B>(mut req: Request<B>, endpoint: &str) -> Result<Response<Full<Bytes>>> {
    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let target = format!(
        "{}{}",
        websocket_url(endpoint).trim_end_matches('/'),
        path_and_query
    );

    let (response, client_ws) = hyper_tungstenite::upgrade(&mut req, None)
        .map_err(|e| GatehouseError::Proxy(format!("WebSocket upgrade failed: {e}")))?;

    tokio::spawn(async move {
        match client_ws.await {
            Ok(client_ws) => {
                if let Err(e) = run_pump(client_ws, &target).await {
                    warn!(error = %e, url = %target, "WebSocket proxy ended with error");
                }
            }
            Err(e) => warn!(error = %e, "Client WebSocket upgrade failed"),
        }
    });

    Ok(response)
}

/// Connect the backend leg and move frames both ways until one side closes.
async fn run_pump(client_ws: ClientWebSocket, target: &str) -> Result<()> {
    // Some backends refuse handshakes without Host and Origin
    let request = tokio_tungstenite::tungstenite::http::Request::builder()
        .uri(target)
        .header("Host", host_of(target))
        .header("Origin", "http://localhost")
        .header("Connection", "Upgrade")
        .header("Upgrade", "websocket")
        .header("Sec-WebSocket-Version", "13")
        .header("Sec-WebSocket-Key", generate_key())
        .body(())
        .map_err(|e| GatehouseError::Proxy(format!("Failed to build handshake: {e}")))?;

    let (backend_ws, _) = connect_async_with_config(request, None, false)
        .await
        .map_err(|e| GatehouseError::Proxy(format!("Failed to connect to backend: {e}")))?;

    debug!(url = %target, "Backend WebSocket connected");

    let (mut client_sink, mut client_stream) = client_ws.split();
    let (mut backend_sink, mut backend_stream) = backend_ws.split();

    let client_to_backend = async move {
        while let Some(msg) = client_stream.next().await {
            match msg {
                Ok(Message::Close(frame)) => {
                    let _ = backend_sink.send(Message::Close(frame)).await;
                    break;
                }
                Ok(Message::Frame(_)) => {}
                Ok(msg) => {
                    if backend_sink.send(msg).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    debug!(error = %e, "Client WebSocket error");
                    break;
                }
            }
        }
        let _ = backend_sink.close().await;
    };

    let backend_to_client = async move {
        while let Some(msg) = backend_stream.next().await {
            match msg {
                Ok(Message::Close(frame)) => {
                    let _ = client_sink.send(Message::Close(frame)).await;
                    break;
                }
                Ok(Message::Frame(_)) => {}
                Ok(msg) => {
                    if client_sink.send(msg).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    debug!(error = %e, "Backend WebSocket error");
                    break;
                }
            }
        }
        let _ = client_sink.close().await;
    };

    tokio::select! {
        _ = client_to_backend => {
            info!("Client side closed WebSocket");
        }
        _ = backend_to_client => {
            info!("Backend side closed WebSocket");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_websocket_url() {
        assert_eq!(
            websocket_url("http://team-team42:8080"),
            "ws://team-team42:8080"
        );
        assert_eq!(
            websocket_url("https://team-team42.example.com"),
            "wss://team-team42.example.com"
        );
        assert_eq!(websocket_url("ws://already-ws:8080"), "ws://already-ws:8080");
    }

    #[test]
    fn test_host_of() {
        assert_eq!(host_of("ws://team-team42:8080/socket"), "team-team42:8080");
        assert_eq!(host_of("wss://example.com"), "example.com");
    }

    #[test]
    fn test_upgrade_detection() {
        let upgrade = Request::builder()
            .uri("/socket")
            .header("Connection", "Upgrade")
            .header("Upgrade", "websocket")
            .header("Sec-WebSocket-Version", "13")
            .header("Sec-WebSocket-Key", generate_key())
            .body(())
            .unwrap();
        assert!(is_websocket_upgrade(&upgrade));

        let plain = Request::builder().uri("/socket").body(()).unwrap();
        assert!(!is_websocket_upgrade(&plain));
    }
}
