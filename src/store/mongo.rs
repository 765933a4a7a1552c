//! MongoDB team store
//!
//! One collection, `teams`, unique-indexed on the team name. The
//! last-activity write uses `$max` so concurrent throttled writes can never
//! move the timestamp backwards.

use async_trait::async_trait;
use bson::doc;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use mongodb::{options::IndexOptions, Client, Collection, IndexModel};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use super::{TeamRecord, TeamStore};
use crate::types::{GatehouseError, Result};

const TEAMS_COLLECTION: &str = "teams";

/// Wire representation of a team record.
#[derive(Debug, Serialize, Deserialize)]
struct TeamDoc {
    name: String,
    passcode_hash: String,
    created_at: bson::DateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_active: Option<bson::DateTime>,
}

impl From<&TeamRecord> for TeamDoc {
    fn from(record: &TeamRecord) -> Self {
        Self {
            name: record.name.clone(),
            passcode_hash: record.passcode_hash.clone(),
            created_at: bson::DateTime::from_chrono(record.created_at),
            last_active: record.last_active.map(bson::DateTime::from_chrono),
        }
    }
}

impl From<TeamDoc> for TeamRecord {
    fn from(doc: TeamDoc) -> Self {
        Self {
            name: doc.name,
            passcode_hash: doc.passcode_hash,
            created_at: doc.created_at.to_chrono(),
            last_active: doc.last_active.map(|d| d.to_chrono()),
        }
    }
}

/// MongoDB-backed team store.
#[derive(Clone)]
pub struct MongoTeamStore {
    teams: Collection<TeamDoc>,
}

impl MongoTeamStore {
    /// Connect and prepare the `teams` collection.
    pub async fn connect(uri: &str, db_name: &str) -> Result<Self> {
        info!("Connecting to MongoDB at {}", uri);

        // Use serverSelectionTimeoutMS to avoid hanging on unreachable MongoDB
        let timeout_uri = if uri.contains('?') {
            format!("{}&serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        } else {
            format!("{}?serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        };

        let client = Client::with_uri_str(&timeout_uri)
            .await
            .map_err(|e| GatehouseError::Database(format!("Failed to connect to MongoDB: {}", e)))?;

        // Verify connection with timeout
        client
            .database(db_name)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| GatehouseError::Database(format!("MongoDB ping failed: {}", e)))?;

        let teams = client.database(db_name).collection::<TeamDoc>(TEAMS_COLLECTION);

        // Unique index on team name
        let index = IndexModel::builder()
            .keys(doc! { "name": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        teams
            .create_index(index)
            .await
            .map_err(|e| GatehouseError::Database(format!("Failed to create index: {}", e)))?;

        info!("Connected to MongoDB database '{}'", db_name);

        Ok(Self { teams })
    }
}

#[async_trait]
impl TeamStore for MongoTeamStore {
    async fn insert(&self, record: TeamRecord) -> Result<()> {
        self.teams
            .insert_one(TeamDoc::from(&record))
            .await
            .map_err(|e| GatehouseError::Database(format!("Insert failed: {}", e)))?;
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Option<TeamRecord>> {
        let doc = self
            .teams
            .find_one(doc! { "name": name })
            .await
            .map_err(|e| GatehouseError::Database(format!("Find failed: {}", e)))?;
        Ok(doc.map(TeamRecord::from))
    }

    async fn touch(&self, name: &str, at: DateTime<Utc>) -> Result<()> {
        // $max keeps the timestamp monotonically non-decreasing even if
        // two throttled writes land out of order.
        self.teams
            .update_one(
                doc! { "name": name },
                doc! { "$max": { "last_active": bson::DateTime::from_chrono(at) } },
            )
            .await
            .map_err(|e| GatehouseError::Database(format!("Touch failed: {}", e)))?;
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.teams
            .delete_one(doc! { "name": name })
            .await
            .map_err(|e| GatehouseError::Database(format!("Delete failed: {}", e)))?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<TeamRecord>> {
        let mut cursor = self
            .teams
            .find(doc! {})
            .await
            .map_err(|e| GatehouseError::Database(format!("Find failed: {}", e)))?;

        let mut records = Vec::new();
        while let Some(doc) = cursor.next().await {
            match doc {
                Ok(d) => records.push(TeamRecord::from(d)),
                Err(e) => {
                    error!("Error reading team document: {}", e);
                }
            }
        }

        Ok(records)
    }
}
