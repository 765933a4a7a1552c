//! Team join and readiness endpoints
//!
//! - `POST /teams/{team}/join` - create-or-join; sets the identity cookie
//! - `GET  /teams/{team}/wait-till-ready` - bounded wait for a ready instance
//!
//! Join is the only place the identity cookie is issued, and the only
//! place a passcode ever appears in a response body.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::SET_COOKIE;
use hyper::{Request, Response, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;

use super::{error_response, json_response};
use crate::lifecycle::JoinOutcome;
use crate::server::AppState;
use crate::team::{is_valid_passcode_format, TeamName};
use crate::types::GatehouseError;

#[derive(Deserialize, Default)]
struct JoinRequest {
    passcode: Option<String>,
}

/// Handle `POST /teams/{team}/join`.
pub async fn handle_join<B>(
    req: Request<B>,
    state: Arc<AppState>,
    team_name: &str,
) -> Response<Full<Bytes>>
where
    B: hyper::body::Body + Send,
    B::Data: Send,
    B::Error: std::fmt::Display,
{
    let team = match TeamName::parse(team_name) {
        Ok(team) => team,
        Err(e) => return error_response(e),
    };

    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(error = %e, "Failed to read join request body");
            return error_response(GatehouseError::BadRequest(
                "Failed to read request body".into(),
            ));
        }
    };

    let join_request: JoinRequest = if body.is_empty() {
        JoinRequest::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(r) => r,
            Err(e) => return error_response(GatehouseError::BadRequest(format!(
                "Invalid JSON body: {e}"
            ))),
        }
    };

    // Reject malformed passcodes before they reach the verifier
    if let Some(ref passcode) = join_request.passcode {
        if !is_valid_passcode_format(passcode) {
            return error_response(GatehouseError::BadRequest(
                "Passcode must be 8 uppercase alphanumeric characters".into(),
            ));
        }
    }

    let outcome = match state
        .lifecycle
        .join(&team, join_request.passcode.as_deref())
        .await
    {
        Ok(outcome) => outcome,
        Err(e) => return error_response(e),
    };

    let is_admin = team.as_str() == state.args.admin_team;
    let cookie_value = match state.cookies.issue(&team, is_admin) {
        Ok(value) => value,
        Err(e) => return error_response(e),
    };

    let body = match &outcome {
        JoinOutcome::Created { passcode } => serde_json::json!({
            "message": "Team created",
            "team": team.as_str(),
            "passcode": passcode,
        }),
        JoinOutcome::Joined => serde_json::json!({
            "message": "Joined team",
            "team": team.as_str(),
        }),
        JoinOutcome::Accepted => serde_json::json!({
            "message": "Team creation in progress",
            "team": team.as_str(),
        }),
    };

    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/json")
        .header(SET_COOKIE, state.cookies.set_cookie_header(&cookie_value))
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}

/// Handle `GET /teams/{team}/wait-till-ready`.
///
/// Holds the request open until the instance reports ready or the poll
/// budget runs out. A dropped connection abandons the wait.
pub async fn handle_wait_ready(state: Arc<AppState>, team_name: &str) -> Response<Full<Bytes>> {
    let team = match TeamName::parse(team_name) {
        Ok(team) => team,
        Err(e) => return error_response(e),
    };

    match state.lifecycle.wait_ready(&team).await {
        Ok(()) => json_response(
            StatusCode::OK,
            serde_json::json!({
                "message": "Instance ready",
                "team": team.as_str(),
            }),
        ),
        Err(e) => error_response(e),
    }
}
