//! HTTP route handlers
//!
//! Everything with a fixed path lives here: team join and readiness wait,
//! the admin control surface, health probes, and the join UI proxy.
//! Per-team passthrough traffic is handled by the router instead.

pub mod admin;
pub mod health;
pub mod teams;
pub mod ui;

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};

pub use admin::handle_admin_request;
pub use health::{health_check, readiness_check, version_info};
pub use teams::{handle_join, handle_wait_ready};
pub use ui::handle_ui_request;

use crate::types::GatehouseError;

/// JSON error response from a domain error.
pub fn error_response(err: GatehouseError) -> Response<Full<Bytes>> {
    let (status, message) = err.into_status_code_and_body();
    let body = serde_json::json!({ "error": message });

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}

/// JSON success response.
pub fn json_response(status: StatusCode, body: serde_json::Value) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}
