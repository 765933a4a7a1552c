//! Gatehouse - multi-tenant front door for per-team sandboxed instances
//!
//! One shared entry point in front of many per-team application backends.
//! Visitors join a team with a passcode, get a signed identity cookie, and
//! from then on every request they make is routed to their team's own
//! backend instance. The backends themselves are created and torn down
//! through an external control plane; gatehouse never stores instance
//! state, it derives it live from reported replica counts.

pub mod activity;
pub mod auth;
pub mod config;
pub mod lifecycle;
pub mod orchestrator;
pub mod proxy;
pub mod router;
pub mod routes;
pub mod server;
pub mod store;
pub mod team;
pub mod types;

pub use config::Args;
pub use server::AppState;
pub use types::{GatehouseError, Result};
