//! Admin control surface
//!
//! - `GET    /admin/all` - all teams with state and activity timestamps
//! - `POST   /admin/teams/{team}/restart` - delete the running pod
//! - `DELETE /admin/teams/{team}/delete` - tear the team down entirely
//!
//! Every endpoint is gated on the admin capability flag carried in the
//! signed identity cookie; the team name itself is never consulted here.

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::COOKIE;
use hyper::{Method, Request, Response, StatusCode};
use std::sync::Arc;
use tracing::info;

use super::{error_response, json_response};
use crate::server::AppState;
use crate::team::TeamName;
use crate::types::GatehouseError;

/// Route an `/admin/*` request.
pub async fn handle_admin_request<B>(
    req: &Request<B>,
    state: Arc<AppState>,
) -> Response<Full<Bytes>> {
    let cookie_header = req.headers().get(COOKIE).and_then(|v| v.to_str().ok());
    let identity = state.cookies.identity_from_cookie_header(cookie_header);

    match identity {
        Some(identity) if identity.is_admin => {}
        _ => {
            return error_response(GatehouseError::Unauthorized(
                "Admin capability required".into(),
            ))
        }
    }

    let path = req.uri().path();
    match (req.method(), path) {
        (&Method::GET, "/admin/all") => handle_list(state).await,

        (&Method::POST, p) if p.starts_with("/admin/teams/") && p.ends_with("/restart") => {
            let team = p
                .strip_prefix("/admin/teams/")
                .and_then(|s| s.strip_suffix("/restart"))
                .unwrap_or("");
            handle_restart(state, team).await
        }

        (&Method::DELETE, p) if p.starts_with("/admin/teams/") && p.ends_with("/delete") => {
            let team = p
                .strip_prefix("/admin/teams/")
                .and_then(|s| s.strip_suffix("/delete"))
                .unwrap_or("");
            handle_delete(state, team).await
        }

        _ => error_response(GatehouseError::NotFound(format!(
            "No admin endpoint at {path}"
        ))),
    }
}

async fn handle_list(state: Arc<AppState>) -> Response<Full<Bytes>> {
    match state.lifecycle.list().await {
        Ok(teams) => json_response(
            StatusCode::OK,
            serde_json::json!({
                "count": teams.len(),
                "teams": teams,
            }),
        ),
        Err(e) => error_response(e),
    }
}

async fn handle_restart(state: Arc<AppState>, team_name: &str) -> Response<Full<Bytes>> {
    let team = match TeamName::parse(team_name) {
        Ok(team) => team,
        Err(e) => return error_response(e),
    };

    match state.lifecycle.restart(&team).await {
        Ok(()) => {
            info!(team = %team, "Admin restarted instance");
            json_response(
                StatusCode::OK,
                serde_json::json!({
                    "message": "Instance restarting",
                    "team": team.as_str(),
                }),
            )
        }
        Err(e) => error_response(e),
    }
}

async fn handle_delete(state: Arc<AppState>, team_name: &str) -> Response<Full<Bytes>> {
    let team = match TeamName::parse(team_name) {
        Ok(team) => team,
        Err(e) => return error_response(e),
    };

    match state.lifecycle.delete(&team).await {
        Ok(()) => {
            state.throttle.forget(team.as_str());
            info!(team = %team, "Admin deleted team");
            json_response(
                StatusCode::OK,
                serde_json::json!({
                    "message": "Team deleted",
                    "team": team.as_str(),
                }),
            )
        }
        Err(e) => error_response(e),
    }
}
