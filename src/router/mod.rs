//! Passthrough traffic router
//!
//! Everything that is not a fixed route lands here. The identity cookie
//! selects the team, the throttle coalesces the activity write, and the
//! derived instance state decides what happens next:
//!
//! - no valid cookie: redirect to the join page
//! - `Ready`: forward to the team's backend (HTTP or WebSocket)
//! - `Starting`: redirect to the join page with a restarting hint
//! - `Absent`: redirect to the join page with a not-found hint

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{COOKIE, LOCATION};
use hyper::{Request, Response, StatusCode};
use std::sync::Arc;
use tracing::{error, warn};

use crate::orchestrator::InstanceState;
use crate::proxy;
use crate::server::AppState;
use crate::team::TeamName;

/// Route one passthrough request.
pub async fn handle_passthrough<B>(state: Arc<AppState>, req: Request<B>) -> Response<Full<Bytes>>
where
    B: hyper::body::Body + Send,
    B::Data: Send,
    B::Error: std::fmt::Display,
{
    let cookie_header = req.headers().get(COOKIE).and_then(|v| v.to_str().ok());
    let identity = match state.cookies.identity_from_cookie_header(cookie_header) {
        Some(identity) => identity,
        None => return redirect("/"),
    };

    // The cookie carries a name we validated at issue time, but it is
    // still external input
    let team = match TeamName::parse(&identity.team) {
        Ok(team) => team,
        Err(_) => return redirect("/"),
    };

    record_activity(&state, &team);

    match state.lifecycle.status(&team).await {
        Ok(InstanceState::Ready) => forward(state, team, req).await,
        Ok(InstanceState::Starting) => redirect_to_join("instance-restarting", &team),
        Ok(InstanceState::Absent) => redirect_to_join("instance-not-found", &team),
        Err(e) => {
            error!(team = %team, error = %e, "Instance status lookup failed");
            redirect_to_join("instance-not-found", &team)
        }
    }
}

/// Coalesced last-activity bookkeeping, off the request path.
fn record_activity(state: &Arc<AppState>, team: &TeamName) {
    if !state.throttle.observe(team.as_str()) {
        return;
    }

    let store = Arc::clone(&state.store);
    let name = team.as_str().to_string();
    tokio::spawn(async move {
        if let Err(e) = store.touch(&name, chrono::Utc::now()).await {
            warn!(team = %name, error = %e, "Failed to persist activity timestamp");
        }
    });
}

async fn forward<B>(state: Arc<AppState>, team: TeamName, req: Request<B>) -> Response<Full<Bytes>>
where
    B: hyper::body::Body + Send,
    B::Data: Send,
    B::Error: std::fmt::Display,
{
    let endpoint = state.lifecycle.endpoint(&team).await;

    if proxy::is_websocket_upgrade(&req) {
        match proxy::proxy_websocket(req, &endpoint) {
            Ok(response) => response,
            Err(e) => {
                error!(team = %team, error = %e, "WebSocket proxy failed");
                bad_gateway()
            }
        }
    } else {
        match proxy::forward_http(&state.http_client, &endpoint, req).await {
            Ok(response) => response,
            Err(e) => {
                error!(team = %team, error = %e, "Backend forward failed");
                bad_gateway()
            }
        }
    }
}

fn redirect(location: &str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::FOUND)
        .header(LOCATION, location)
        .body(Full::new(Bytes::new()))
        .unwrap()
}

fn redirect_to_join(msg: &str, team: &TeamName) -> Response<Full<Bytes>> {
    redirect(&format!(
        "/?msg={}&teamname={}",
        msg,
        urlencoding::encode(team.as_str())
    ))
}

fn bad_gateway() -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::BAD_GATEWAY)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(
            r#"{"error": "Team backend unreachable"}"#,
        )))
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::COOKIE_NAME;
    use crate::store::TeamStore;
    use std::time::Duration;

    fn passthrough_req(cookie: Option<&str>) -> Request<Full<Bytes>> {
        let mut builder = Request::builder().method("GET").uri("/app/dashboard");
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }
        builder.body(Full::new(Bytes::new())).unwrap()
    }

    fn cookie_for(state: &AppState, team: &str) -> String {
        let team = TeamName::parse(team).unwrap();
        let token = state.cookies.issue(&team, false).unwrap();
        format!("{}={}", COOKIE_NAME, token)
    }

    fn location(response: &Response<Full<Bytes>>) -> &str {
        response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .unwrap()
    }

    #[tokio::test]
    async fn test_no_cookie_redirects_to_join_page() {
        let (state, _, _) = AppState::for_tests();

        let response = handle_passthrough(state, passthrough_req(None)).await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(location(&response), "/");
    }

    #[tokio::test]
    async fn test_garbage_cookie_redirects_to_join_page() {
        let (state, _, _) = AppState::for_tests();

        let cookie = format!("{}=not-a-token", COOKIE_NAME);
        let response = handle_passthrough(state, passthrough_req(Some(&cookie))).await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(location(&response), "/");
    }

    #[tokio::test]
    async fn test_absent_instance_redirects_with_hint() {
        let (state, _, _) = AppState::for_tests();
        let cookie = cookie_for(&state, "team42");

        let response = handle_passthrough(state, passthrough_req(Some(&cookie))).await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            location(&response),
            "/?msg=instance-not-found&teamname=team42"
        );
    }

    #[tokio::test]
    async fn test_starting_instance_redirects_with_hint() {
        let (state, orchestrator, _) = AppState::for_tests();
        orchestrator.set_health("team42", 0, 0);
        let cookie = cookie_for(&state, "team42");

        let response = handle_passthrough(state, passthrough_req(Some(&cookie))).await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            location(&response),
            "/?msg=instance-restarting&teamname=team42"
        );
    }

    #[tokio::test]
    async fn test_activity_recorded_once_per_window() {
        let (state, _, store) = AppState::for_tests();
        let cookie = cookie_for(&state, "team42");

        let team = TeamName::parse("team42").unwrap();
        state.lifecycle.join(&team, None).await.unwrap();

        for _ in 0..5 {
            // Instance is Ready but the forward target is unreachable;
            // the activity observation happens before the forward
            let _ = handle_passthrough(Arc::clone(&state), passthrough_req(Some(&cookie))).await;
        }

        assert_eq!(state.throttle.tracked_teams(), 1);

        // Give the spawned touch a moment to land
        tokio::time::sleep(Duration::from_millis(50)).await;
        let record = store.get("team42").await.unwrap().unwrap();
        assert!(record.last_active.is_some());
    }
}
