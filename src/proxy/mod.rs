//! Backend forwarding
//!
//! Once the router has resolved a team's backend endpoint, these modules
//! move the bytes: plain HTTP via a shared client, WebSockets via an
//! upgrade on both legs and a bidirectional pump.

pub mod http;
pub mod ws;

pub use http::forward_http;
pub use ws::{is_websocket_upgrade, proxy_websocket};
