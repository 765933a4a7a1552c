//! In-memory team store
//!
//! Used in dev mode when MongoDB is unreachable, and by tests. Same
//! contract as the MongoDB store, including monotonic `touch`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use super::{TeamRecord, TeamStore};
use crate::types::{GatehouseError, Result};

/// Process-local team store backed by a concurrent map.
#[derive(Default)]
pub struct MemoryTeamStore {
    teams: DashMap<String, TeamRecord>,
}

impl MemoryTeamStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TeamStore for MemoryTeamStore {
    async fn insert(&self, record: TeamRecord) -> Result<()> {
        use dashmap::mapref::entry::Entry;

        match self.teams.entry(record.name.clone()) {
            Entry::Occupied(_) => Err(GatehouseError::Database(format!(
                "Team '{}' already exists",
                record.name
            ))),
            Entry::Vacant(entry) => {
                entry.insert(record);
                Ok(())
            }
        }
    }

    async fn get(&self, name: &str) -> Result<Option<TeamRecord>> {
        Ok(self.teams.get(name).map(|r| r.clone()))
    }

    async fn touch(&self, name: &str, at: DateTime<Utc>) -> Result<()> {
        if let Some(mut record) = self.teams.get_mut(name) {
            // Keep the max: never move last_active backwards
            if record.last_active.map_or(true, |prev| at > prev) {
                record.last_active = Some(at);
            }
        }
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.teams.remove(name);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<TeamRecord>> {
        Ok(self.teams.iter().map(|r| r.clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn test_insert_get_delete() {
        let store = MemoryTeamStore::new();
        store
            .insert(TeamRecord::new("team42", "$argon2id$fake".into()))
            .await
            .unwrap();

        let record = store.get("team42").await.unwrap().unwrap();
        assert_eq!(record.name, "team42");
        assert!(record.last_active.is_none());

        // Duplicate insert is rejected
        assert!(store
            .insert(TeamRecord::new("team42", "$argon2id$other".into()))
            .await
            .is_err());

        store.delete("team42").await.unwrap();
        assert!(store.get("team42").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_touch_is_monotonic() {
        let store = MemoryTeamStore::new();
        store
            .insert(TeamRecord::new("team42", "$argon2id$fake".into()))
            .await
            .unwrap();

        let now = Utc::now();
        store.touch("team42", now).await.unwrap();

        // An older timestamp must not overwrite the newer one
        store
            .touch("team42", now - Duration::seconds(30))
            .await
            .unwrap();

        let record = store.get("team42").await.unwrap().unwrap();
        assert_eq!(record.last_active, Some(now));
    }

    #[tokio::test]
    async fn test_touch_unknown_team_is_noop() {
        let store = MemoryTeamStore::new();
        store.touch("ghost", Utc::now()).await.unwrap();
        assert!(store.get("ghost").await.unwrap().is_none());
    }
}
