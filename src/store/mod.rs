//! Persistent team records
//!
//! The store keeps the durable facts about a team: its passcode hash and
//! its creation/last-activity timestamps. Instance existence and readiness
//! are never stored here; those are always read live from the orchestrator.
//!
//! `TeamStore` is the seam: production uses MongoDB, dev mode and tests use
//! the in-memory implementation.

pub mod memory;
pub mod mongo;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::types::Result;

pub use memory::MemoryTeamStore;
pub use mongo::MongoTeamStore;

/// Durable record for one team.
#[derive(Debug, Clone)]
pub struct TeamRecord {
    /// Validated team name
    pub name: String,
    /// PHC-formatted Argon2id hash of the join passcode.
    /// Immutable for the life of the instance generation; a new hash only
    /// appears when the team record is deleted and re-created.
    pub passcode_hash: String,
    /// When the team was created
    pub created_at: DateTime<Utc>,
    /// Last persisted activity timestamp (written through the throttle)
    pub last_active: Option<DateTime<Utc>>,
}

impl TeamRecord {
    pub fn new(name: &str, passcode_hash: String) -> Self {
        Self {
            name: name.to_string(),
            passcode_hash,
            created_at: Utc::now(),
            last_active: None,
        }
    }
}

/// Storage interface for team records.
#[async_trait]
pub trait TeamStore: Send + Sync {
    /// Insert a new team record. Fails if the team already exists.
    async fn insert(&self, record: TeamRecord) -> Result<()>;

    /// Fetch a team record by name. Absence is a normal outcome.
    async fn get(&self, name: &str) -> Result<Option<TeamRecord>>;

    /// Update the last-activity timestamp for a team.
    ///
    /// Monotonic: a timestamp older than the stored one is never written.
    /// A missing team is a no-op, not an error.
    async fn touch(&self, name: &str, at: DateTime<Utc>) -> Result<()>;

    /// Remove a team record so the name can be reused with a fresh passcode.
    async fn delete(&self, name: &str) -> Result<()>;

    /// List all team records.
    async fn list(&self) -> Result<Vec<TeamRecord>>;
}
