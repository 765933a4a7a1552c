//! Configuration for Gatehouse
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;
use uuid::Uuid;

use crate::auth::CookieCodec;
use crate::lifecycle::LifecycleConfig;
use crate::types::GatehouseError;

/// Gatehouse - multi-tenant front door for per-team sandboxed instances
#[derive(Parser, Debug, Clone)]
#[command(name = "gatehouse")]
#[command(about = "Front door for per-team sandboxed application instances")]
pub struct Args {
    /// Unique node identifier for this gatehouse instance
    #[arg(long, env = "NODE_ID", default_value_t = Uuid::new_v4())]
    pub node_id: Uuid,

    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Base URL of the instance control plane
    #[arg(long, env = "CONTROL_PLANE_URL", default_value = "http://localhost:9090")]
    pub control_plane_url: String,

    /// URL template for team backend endpoints; `{team}` expands to the
    /// team name
    #[arg(
        long,
        env = "BACKEND_URL_TEMPLATE",
        default_value = "http://team-{team}:8080"
    )]
    pub backend_url_template: String,

    /// URL of the join UI, proxied at / and /static/*
    #[arg(long, env = "UI_URL", default_value = "http://localhost:8081")]
    pub ui_url: String,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "gatehouse")]
    pub mongodb_db: String,

    /// Secret for signing identity cookies (required in production)
    #[arg(long, env = "COOKIE_SECRET")]
    pub cookie_secret: Option<String>,

    /// Identity cookie lifetime in seconds
    #[arg(long, env = "COOKIE_TTL_SECONDS", default_value = "604800")]
    pub cookie_ttl_seconds: u64,

    /// Team name whose members receive the admin capability
    #[arg(long, env = "ADMIN_TEAM", default_value = "admin")]
    pub admin_team: String,

    /// Maximum number of instances across all teams
    #[arg(long, env = "MAX_INSTANCES", default_value = "50")]
    pub max_instances: usize,

    /// Seconds between readiness polls
    #[arg(long, env = "READY_POLL_INTERVAL_SECS", default_value = "3")]
    pub ready_poll_interval_secs: u64,

    /// Maximum readiness polls before giving up
    #[arg(long, env = "READY_POLL_ATTEMPTS", default_value = "60")]
    pub ready_poll_attempts: u32,

    /// Seconds between persisted activity writes per team
    #[arg(long, env = "ACTIVITY_WINDOW_SECS", default_value = "10")]
    pub activity_window_secs: u64,

    /// Enable development mode (in-memory store and orchestrator, fixed
    /// cookie secret)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// Validate configuration beyond what clap enforces.
    pub fn validate(&self) -> Result<(), GatehouseError> {
        if !self.dev_mode && self.cookie_secret.is_none() {
            return Err(GatehouseError::Config(
                "COOKIE_SECRET is required in production mode".into(),
            ));
        }

        if !self.backend_url_template.contains("{team}") {
            return Err(GatehouseError::Config(
                "BACKEND_URL_TEMPLATE must contain a {team} placeholder".into(),
            ));
        }

        if self.max_instances == 0 {
            return Err(GatehouseError::Config(
                "MAX_INSTANCES must be at least 1".into(),
            ));
        }

        if self.ready_poll_attempts == 0 {
            return Err(GatehouseError::Config(
                "READY_POLL_ATTEMPTS must be at least 1".into(),
            ));
        }

        Ok(())
    }

    /// Build the cookie codec from configuration.
    ///
    /// Production requires an explicit secret; dev mode falls back to a
    /// fixed insecure one.
    pub fn cookie_codec(&self) -> Result<CookieCodec, GatehouseError> {
        match &self.cookie_secret {
            Some(secret) => CookieCodec::new(secret.clone(), self.cookie_ttl_seconds),
            None if self.dev_mode => Ok(CookieCodec::new_dev()),
            None => Err(GatehouseError::Config(
                "COOKIE_SECRET is required in production mode".into(),
            )),
        }
    }

    pub fn lifecycle_config(&self) -> LifecycleConfig {
        LifecycleConfig {
            max_instances: self.max_instances,
            ready_poll_interval: Duration::from_secs(self.ready_poll_interval_secs),
            ready_poll_attempts: self.ready_poll_attempts,
        }
    }

    pub fn activity_window(&self) -> Duration {
        Duration::from_secs(self.activity_window_secs)
    }
}
