//! Instance lifecycle manager
//!
//! Owns the create-or-join decision and the bounded readiness wait. A
//! team's instance state is never cached here: every decision re-derives
//! it from the orchestrator, so the manager stays correct when instances
//! change underneath it (restarts, deletions, supervision replacing pods).
//!
//! Creation is serialized per team within the process by an async mutex,
//! and tolerated cross-process via the control plane's conflict response:
//! losing the creation race is benign, the loser simply falls back to the
//! readiness wait like everyone else.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::auth::passcode::{issue_passcode, verify_passcode};
use crate::orchestrator::{
    InstanceState, Orchestrator, OrchestratorError,
};
use crate::store::{TeamRecord, TeamStore};
use crate::team::TeamName;
use crate::types::{GatehouseError, Result};

/// Lifecycle policy knobs.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Maximum instance count across all teams
    pub max_instances: usize,
    /// Sleep between readiness polls
    pub ready_poll_interval: Duration,
    /// Hard cap on readiness polls; interval x attempts bounds the wait
    pub ready_poll_attempts: u32,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            max_instances: 50,
            ready_poll_interval: Duration::from_secs(3),
            ready_poll_attempts: 60,
        }
    }
}

/// Outcome of a join request.
#[derive(Debug)]
pub enum JoinOutcome {
    /// New team: instance created, passcode issued exactly once
    Created { passcode: String },
    /// Existing team, correct passcode
    Joined,
    /// Lost a cross-process creation race; the caller is in, but the
    /// winner's passcode stands and none is returned here
    Accepted,
}

/// One row in the admin listing.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TeamSummary {
    pub team: String,
    pub state: InstanceState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_active: Option<DateTime<Utc>>,
}

/// Per-team state machine driver over the orchestrator and team store.
pub struct LifecycleManager {
    orchestrator: Arc<dyn Orchestrator>,
    store: Arc<dyn TeamStore>,
    config: LifecycleConfig,
    /// Per-team creation locks; held across the check-then-create window
    creation_locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
}

impl LifecycleManager {
    pub fn new(
        orchestrator: Arc<dyn Orchestrator>,
        store: Arc<dyn TeamStore>,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            orchestrator,
            store,
            config,
            creation_locks: DashMap::new(),
        }
    }

    fn creation_lock(&self, team: &TeamName) -> Arc<tokio::sync::Mutex<()>> {
        self.creation_locks
            .entry(team.as_str().to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Drop the lock entry once no other join holds a handle to it, so the
    /// map tracks only in-flight joins instead of every name ever tried.
    ///
    /// With the guard released, the remaining references are the map's and
    /// the caller's. The count check runs under the map's shard lock, which
    /// also serializes `creation_lock`'s entry lookup, so a concurrent
    /// joiner either already holds its clone (count > 2, entry stays) or
    /// re-creates the entry after the removal.
    fn release_creation_lock(&self, team: &TeamName, _lock: &Arc<tokio::sync::Mutex<()>>) {
        self.creation_locks
            .remove_if(team.as_str(), |_, entry| Arc::strong_count(entry) <= 2);
    }

    #[cfg(test)]
    fn creation_lock_count(&self) -> usize {
        self.creation_locks.len()
    }

    /// Establish or confirm a team.
    ///
    /// Absent team: capacity check, passcode issue, instance creation.
    /// Existing team: passcode verification, nothing re-created. The
    /// authentication error never reveals whether the team exists or the
    /// passcode was merely wrong.
    pub async fn join(&self, team: &TeamName, presented: Option<&str>) -> Result<JoinOutcome> {
        let lock = self.creation_lock(team);
        let result = {
            let _guard = lock.lock().await;
            match self.orchestrator.instance_health(team).await {
                Ok(_) => self.join_existing(team, presented).await,
                Err(OrchestratorError::NotFound) => self.create_team(team).await,
                Err(e) => Err(orchestration_error(team, "status lookup", e)),
            }
        };
        self.release_creation_lock(team, &lock);
        result
    }

    async fn join_existing(&self, team: &TeamName, presented: Option<&str>) -> Result<JoinOutcome> {
        let unauthorized =
            || GatehouseError::Unauthorized("Passcode required or incorrect".to_string());

        let presented = presented.ok_or_else(unauthorized)?;
        let record = self
            .store
            .get(team.as_str())
            .await?
            .ok_or_else(unauthorized)?;

        if verify_passcode(presented, &record.passcode_hash)? {
            info!(team = %team, "Teammate joined existing instance");
            Ok(JoinOutcome::Joined)
        } else {
            Err(unauthorized())
        }
    }

    async fn create_team(&self, team: &TeamName) -> Result<JoinOutcome> {
        let instance_count = self
            .orchestrator
            .list_instances()
            .await
            .map_err(|e| orchestration_error(team, "capacity listing", e))?
            .len();

        if instance_count >= self.config.max_instances {
            return Err(GatehouseError::Capacity(format!(
                "Instance limit reached ({}/{})",
                instance_count, self.config.max_instances
            )));
        }

        let (passcode, hash) = issue_passcode()?;

        match self.orchestrator.create_instance(team).await {
            Ok(()) => {
                self.store
                    .insert(TeamRecord::new(team.as_str(), hash))
                    .await?;
                info!(team = %team, "Instance created, passcode issued");
                Ok(JoinOutcome::Created { passcode })
            }
            Err(OrchestratorError::Conflict) => {
                // Someone else is creating this team right now. Their
                // passcode stands; ours is dropped unpersisted.
                warn!(team = %team, "Creation conflict, another creator won the race");
                Ok(JoinOutcome::Accepted)
            }
            Err(e) => Err(orchestration_error(team, "creation", e)),
        }
    }

    /// Current derived state for a team's instance.
    pub async fn status(&self, team: &TeamName) -> Result<InstanceState> {
        match self.orchestrator.instance_health(team).await {
            Ok(health) => Ok(InstanceState::from_health(&health)),
            Err(OrchestratorError::NotFound) => Ok(InstanceState::Absent),
            Err(e) => Err(orchestration_error(team, "status lookup", e)),
        }
    }

    /// Network address to forward this team's traffic to.
    pub async fn endpoint(&self, team: &TeamName) -> String {
        match self.orchestrator.instance_health(team).await {
            Ok(health) => health
                .endpoint
                .unwrap_or_else(|| self.orchestrator.endpoint_url(team)),
            Err(_) => self.orchestrator.endpoint_url(team),
        }
    }

    /// Block (bounded) until the team's instance reports one available
    /// replica.
    ///
    /// Polls on a fixed interval up to a hard attempt cap, then fails with
    /// a timeout; the instance is left in whatever state the orchestrator
    /// reports. The loop lives inside the request future, so a client
    /// disconnect drops it mid-sleep and the wait is abandoned cleanly.
    pub async fn wait_ready(&self, team: &TeamName) -> Result<()> {
        for attempt in 1..=self.config.ready_poll_attempts {
            match self.orchestrator.instance_health(team).await {
                Ok(health) if health.available_replicas >= 1 => {
                    info!(team = %team, attempt, "Instance ready");
                    return Ok(());
                }
                Ok(_) | Err(OrchestratorError::NotFound) => {
                    // Still starting, or not yet visible to the control
                    // plane; keep polling until the cap
                }
                Err(e) => return Err(orchestration_error(team, "readiness poll", e)),
            }

            // No sleep after the last poll; the wait is attempts x interval
            if attempt < self.config.ready_poll_attempts {
                tokio::time::sleep(self.config.ready_poll_interval).await;
            }
        }

        Err(GatehouseError::Timeout(format!(
            "Instance for team '{}' not ready after {} polls",
            team, self.config.ready_poll_attempts
        )))
    }

    /// Delete the running pod; supervision replaces it and the state flows
    /// back through Starting to Ready on its own.
    pub async fn restart(&self, team: &TeamName) -> Result<()> {
        match self.orchestrator.restart_instance(team).await {
            Ok(()) => {
                info!(team = %team, "Instance restart requested");
                Ok(())
            }
            Err(OrchestratorError::NotFound) => Err(GatehouseError::NotFound(format!(
                "No instance for team '{}'",
                team
            ))),
            Err(e) => Err(orchestration_error(team, "restart", e)),
        }
    }

    /// Tear down the team entirely. The stored record goes too, so a
    /// later join re-creates the team with a fresh passcode.
    pub async fn delete(&self, team: &TeamName) -> Result<()> {
        match self.orchestrator.delete_instance(team).await {
            Ok(()) | Err(OrchestratorError::NotFound) => {}
            Err(e) => return Err(orchestration_error(team, "deletion", e)),
        }

        self.store.delete(team.as_str()).await?;
        self.creation_locks
            .remove_if(team.as_str(), |_, entry| Arc::strong_count(entry) <= 1);
        info!(team = %team, "Team deleted");
        Ok(())
    }

    /// All teams with derived state and stored timestamps.
    pub async fn list(&self) -> Result<Vec<TeamSummary>> {
        let instances = self
            .orchestrator
            .list_instances()
            .await
            .map_err(|e| GatehouseError::Orchestration(format!("listing failed: {e}")))?;

        let mut summaries = Vec::with_capacity(instances.len());
        for instance in instances {
            let record = self.store.get(&instance.team).await?;
            summaries.push(TeamSummary {
                team: instance.team,
                state: InstanceState::from_health(&instance.health),
                created_at: record.as_ref().map(|r| r.created_at),
                last_active: record.as_ref().and_then(|r| r.last_active),
            });
        }

        Ok(summaries)
    }
}

fn orchestration_error(team: &TeamName, op: &str, err: OrchestratorError) -> GatehouseError {
    GatehouseError::Orchestration(format!("{op} failed for team '{team}': {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::MemoryOrchestrator;
    use crate::store::MemoryTeamStore;
    use crate::team::is_valid_passcode_format;
    use tokio_test::assert_ok;

    fn team(name: &str) -> TeamName {
        TeamName::parse(name).unwrap()
    }

    fn manager_with(
        config: LifecycleConfig,
    ) -> (LifecycleManager, Arc<MemoryOrchestrator>, Arc<MemoryTeamStore>) {
        let orchestrator = Arc::new(MemoryOrchestrator::new("http://team-{team}:8080"));
        let store = Arc::new(MemoryTeamStore::new());
        let manager = LifecycleManager::new(
            Arc::clone(&orchestrator) as Arc<dyn Orchestrator>,
            Arc::clone(&store) as Arc<dyn TeamStore>,
            config,
        );
        (manager, orchestrator, store)
    }

    fn fast_config() -> LifecycleConfig {
        LifecycleConfig {
            max_instances: 50,
            ready_poll_interval: Duration::from_millis(10),
            ready_poll_attempts: 3,
        }
    }

    #[tokio::test]
    async fn test_join_absent_creates_and_issues_passcode() {
        let (manager, orchestrator, store) = manager_with(fast_config());

        let outcome = manager.join(&team("team42"), None).await.unwrap();
        let passcode = match outcome {
            JoinOutcome::Created { passcode } => passcode,
            other => panic!("expected Created, got {:?}", other),
        };

        assert!(is_valid_passcode_format(&passcode));
        assert_eq!(orchestrator.instance_count(), 1);
        assert!(store.get("team42").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_join_existing_with_correct_passcode() {
        let (manager, _, store) = manager_with(fast_config());

        let passcode = match manager.join(&team("team42"), None).await.unwrap() {
            JoinOutcome::Created { passcode } => passcode,
            other => panic!("expected Created, got {:?}", other),
        };
        let hash_before = store.get("team42").await.unwrap().unwrap().passcode_hash;

        let outcome = manager.join(&team("team42"), Some(&passcode)).await.unwrap();
        assert!(matches!(outcome, JoinOutcome::Joined));

        // No re-issue while the team stays up
        let hash_after = store.get("team42").await.unwrap().unwrap().passcode_hash;
        assert_eq!(hash_before, hash_after);
    }

    #[tokio::test]
    async fn test_join_existing_wrong_or_missing_passcode() {
        let (manager, _, _) = manager_with(fast_config());
        manager.join(&team("team42"), None).await.unwrap();

        let wrong = manager.join(&team("team42"), Some("WRONGPW1")).await;
        assert!(matches!(wrong, Err(GatehouseError::Unauthorized(_))));

        let missing = manager.join(&team("team42"), None).await;
        assert!(matches!(missing, Err(GatehouseError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_capacity_limit() {
        let mut config = fast_config();
        config.max_instances = 1;
        let (manager, _, _) = manager_with(config);

        manager.join(&team("team-a"), None).await.unwrap();
        let result = manager.join(&team("team-b"), None).await;
        assert!(matches!(result, Err(GatehouseError::Capacity(_))));
    }

    #[tokio::test]
    async fn test_creation_locks_drained_after_joins() {
        let mut config = fast_config();
        config.max_instances = 1;
        let (manager, _, _) = manager_with(config);

        manager.join(&team("team-a"), None).await.unwrap();

        // Capacity-rejected joins for distinct names must not accumulate
        // lock entries; only in-flight joins may hold one
        for i in 0..50 {
            let name = team(&format!("team-{i}"));
            let result = manager.join(&name, None).await;
            assert!(matches!(result, Err(GatehouseError::Capacity(_))));
        }
        assert_eq!(manager.creation_lock_count(), 0);

        manager.delete(&team("team-a")).await.unwrap();
        assert_eq!(manager.creation_lock_count(), 0);
    }

    #[tokio::test]
    async fn test_lost_creation_race_is_benign() {
        let (manager, orchestrator, store) = manager_with(fast_config());
        orchestrator.fail_next_create_with_conflict();

        let outcome = manager.join(&team("team42"), None).await.unwrap();
        assert!(matches!(outcome, JoinOutcome::Accepted));

        // The winner's hash stands: we persisted nothing
        assert!(store.get("team42").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_wait_ready_times_out_within_bound() {
        let (manager, orchestrator, _) = manager_with(fast_config());
        manager.join(&team("team42"), None).await.unwrap();
        orchestrator.set_health("team42", 0, 0);

        let started = std::time::Instant::now();
        let result = manager.wait_ready(&team("team42")).await;

        assert!(matches!(result, Err(GatehouseError::Timeout(_))));
        // 3 polls x 10ms, with generous slack
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_wait_ready_does_not_sleep_after_last_poll() {
        let config = LifecycleConfig {
            max_instances: 50,
            ready_poll_interval: Duration::from_secs(5),
            ready_poll_attempts: 1,
        };
        let (manager, orchestrator, _) = manager_with(config);
        manager.join(&team("team42"), None).await.unwrap();
        orchestrator.set_health("team42", 0, 0);

        // One attempt means no interval sleeps at all
        let started = std::time::Instant::now();
        let result = manager.wait_ready(&team("team42")).await;

        assert!(matches!(result, Err(GatehouseError::Timeout(_))));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_wait_ready_succeeds() {
        let (manager, _, _) = manager_with(fast_config());
        manager.join(&team("team42"), None).await.unwrap();

        assert_ok!(manager.wait_ready(&team("team42")).await);
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let (manager, orchestrator, _) = manager_with(fast_config());

        assert_eq!(
            manager.status(&team("team42")).await.unwrap(),
            InstanceState::Absent
        );

        manager.join(&team("team42"), None).await.unwrap();
        assert_eq!(
            manager.status(&team("team42")).await.unwrap(),
            InstanceState::Ready
        );

        orchestrator.set_health("team42", 0, 0);
        assert_eq!(
            manager.status(&team("team42")).await.unwrap(),
            InstanceState::Starting
        );
    }

    #[tokio::test]
    async fn test_restart_flows_back_to_starting() {
        let (manager, _, _) = manager_with(fast_config());
        manager.join(&team("team42"), None).await.unwrap();

        manager.restart(&team("team42")).await.unwrap();
        assert_eq!(
            manager.status(&team("team42")).await.unwrap(),
            InstanceState::Starting
        );
    }

    #[tokio::test]
    async fn test_delete_allows_name_reuse_with_fresh_passcode() {
        let (manager, _, store) = manager_with(fast_config());

        manager.join(&team("team42"), None).await.unwrap();
        let hash_before = store.get("team42").await.unwrap().unwrap().passcode_hash;

        manager.delete(&team("team42")).await.unwrap();
        assert!(store.get("team42").await.unwrap().is_none());

        let outcome = manager.join(&team("team42"), None).await.unwrap();
        assert!(matches!(outcome, JoinOutcome::Created { .. }));

        let hash_after = store.get("team42").await.unwrap().unwrap().passcode_hash;
        assert_ne!(hash_before, hash_after);
    }

    #[tokio::test]
    async fn test_list_merges_store_timestamps() {
        let (manager, _, store) = manager_with(fast_config());
        manager.join(&team("team42"), None).await.unwrap();

        let created_at = store.get("team42").await.unwrap().unwrap().created_at;
        let summaries = manager.list().await.unwrap();

        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].team, "team42");
        assert_eq!(summaries[0].state, InstanceState::Ready);
        assert_eq!(summaries[0].created_at, Some(created_at));
        assert!(created_at <= Utc::now());
    }
}
