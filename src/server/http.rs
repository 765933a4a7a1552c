//! HTTP server implementation
//!
//! hyper http1 with TokioIo, one task per connection, upgrades enabled so
//! passthrough WebSockets can ride the same listener.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::activity::ActivityThrottle;
use crate::auth::CookieCodec;
use crate::config::Args;
use crate::lifecycle::LifecycleManager;
use crate::orchestrator::Orchestrator;
use crate::router;
use crate::routes;
use crate::store::TeamStore;
use crate::types::Result;

type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub store: Arc<dyn TeamStore>,
    pub orchestrator: Arc<dyn Orchestrator>,
    pub lifecycle: LifecycleManager,
    pub throttle: ActivityThrottle,
    pub cookies: CookieCodec,
    /// Shared client for backend and UI forwarding
    pub http_client: reqwest::Client,
}

impl AppState {
    pub fn new(
        args: Args,
        store: Arc<dyn TeamStore>,
        orchestrator: Arc<dyn Orchestrator>,
    ) -> Result<Self> {
        let cookies = args.cookie_codec()?;
        let lifecycle = LifecycleManager::new(
            Arc::clone(&orchestrator),
            Arc::clone(&store),
            args.lifecycle_config(),
        );
        let throttle = ActivityThrottle::new(args.activity_window());

        Ok(Self {
            args,
            store,
            orchestrator,
            lifecycle,
            throttle,
            cookies,
            http_client: reqwest::Client::new(),
        })
    }

    /// In-memory state for tests, with fast readiness polling and an
    /// unreachable backend endpoint.
    #[cfg(test)]
    pub fn for_tests() -> (
        Arc<Self>,
        Arc<crate::orchestrator::MemoryOrchestrator>,
        Arc<crate::store::MemoryTeamStore>,
    ) {
        use clap::Parser;

        let mut args = Args::parse_from(["gatehouse"]);
        args.dev_mode = true;
        args.backend_url_template = "http://127.0.0.1:1/{team}".into();
        args.ready_poll_interval_secs = 0;
        args.ready_poll_attempts = 3;

        let orchestrator = Arc::new(crate::orchestrator::MemoryOrchestrator::new(
            &args.backend_url_template,
        ));
        let store = Arc::new(crate::store::MemoryTeamStore::new());
        let state = Self::new(
            args,
            Arc::clone(&store) as Arc<dyn TeamStore>,
            Arc::clone(&orchestrator) as Arc<dyn Orchestrator>,
        )
        .unwrap();

        (Arc::new(state), orchestrator, store)
    }
}

/// Start the HTTP server
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!(
        "Gatehouse listening on {} as node {}",
        state.args.listen, state.args.node_id
    );

    if state.args.dev_mode {
        warn!("Development mode enabled - in-memory store and orchestrator");
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .preserve_header_case(true)
                        .title_case_headers(true)
                        .serve_connection(io, service)
                        .with_upgrades()
                        .await
                    {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> std::result::Result<Response<BoxBody>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    debug!("[{}] {} {}", addr, method, path);

    let response = match (method, path.as_str()) {
        // Liveness probe
        (Method::GET, "/health") | (Method::GET, "/healthz") => {
            to_boxed(routes::health_check(Arc::clone(&state)))
        }

        // Readiness probe - 200 only if the team store answers
        (Method::GET, "/ready") | (Method::GET, "/readyz") => {
            to_boxed(routes::readiness_check(Arc::clone(&state)).await)
        }

        // Version info for deployment verification
        (Method::GET, "/version") => to_boxed(routes::version_info()),

        // CORS preflight
        (Method::OPTIONS, _) => to_boxed(preflight_response()),

        // Team join: create-or-join, sets the identity cookie
        (Method::POST, p) if p.starts_with("/teams/") && p.ends_with("/join") => {
            let team = p
                .strip_prefix("/teams/")
                .and_then(|s| s.strip_suffix("/join"))
                .unwrap_or("");
            to_boxed(routes::handle_join(req, Arc::clone(&state), team).await)
        }

        // Bounded wait for a ready instance
        (Method::GET, p) if p.starts_with("/teams/") && p.ends_with("/wait-till-ready") => {
            let team = p
                .strip_prefix("/teams/")
                .and_then(|s| s.strip_suffix("/wait-till-ready"))
                .unwrap_or("");
            to_boxed(routes::handle_wait_ready(Arc::clone(&state), team).await)
        }

        // Admin control surface, gated on the cookie's admin flag
        (_, p) if p.starts_with("/admin/") => {
            to_boxed(routes::handle_admin_request(&req, Arc::clone(&state)).await)
        }

        // Join UI
        (Method::GET, "/") | (Method::GET, "/index.html") => {
            let query = req.uri().query().map(|q| q.to_string());
            to_boxed(routes::handle_ui_request(Arc::clone(&state), &path, query.as_deref()).await)
        }
        (Method::GET, p) if p.starts_with("/static/") || p == "/favicon.ico" => {
            let query = req.uri().query().map(|q| q.to_string());
            to_boxed(routes::handle_ui_request(Arc::clone(&state), p, query.as_deref()).await)
        }

        // Everything else is team traffic
        _ => to_boxed(router::handle_passthrough(Arc::clone(&state), req).await),
    };

    Ok(response)
}

/// Convert a Full<Bytes> body to BoxBody
fn to_boxed(response: Response<Full<Bytes>>) -> Response<BoxBody> {
    response.map(|body| body.map_err(|never| match never {}).boxed())
}

/// CORS preflight response
fn preflight_response() -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::OK)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Headers", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, DELETE, OPTIONS")
        .body(Full::new(Bytes::new()))
        .unwrap()
}
