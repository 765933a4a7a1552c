//! In-memory orchestrator
//!
//! Stands in for the control plane in dev mode and tests. Instances become
//! ready immediately unless a test pins their replica counts.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{
    expand_endpoint_template, InstanceHealth, InstanceSummary, Orchestrator, OrchestratorError,
};
use crate::team::TeamName;

/// Process-local fake control plane.
pub struct MemoryOrchestrator {
    instances: DashMap<String, InstanceHealth>,
    endpoint_template: String,
    /// When set, the next create fails with Conflict even though the
    /// instance is not visible yet (simulates losing a cross-process race).
    conflict_on_create: AtomicBool,
}

impl MemoryOrchestrator {
    pub fn new(endpoint_template: &str) -> Self {
        Self {
            instances: DashMap::new(),
            endpoint_template: endpoint_template.to_string(),
            conflict_on_create: AtomicBool::new(false),
        }
    }

    /// Pin the replica counts reported for a team.
    pub fn set_health(&self, team: &str, ready_replicas: i32, available_replicas: i32) {
        self.instances.insert(
            team.to_string(),
            InstanceHealth {
                ready_replicas,
                available_replicas,
                endpoint: None,
            },
        );
    }

    /// Make the next create fail with Conflict.
    pub fn fail_next_create_with_conflict(&self) {
        self.conflict_on_create.store(true, Ordering::SeqCst);
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }
}

#[async_trait]
impl Orchestrator for MemoryOrchestrator {
    async fn create_instance(&self, team: &TeamName) -> Result<(), OrchestratorError> {
        if self.conflict_on_create.swap(false, Ordering::SeqCst) {
            return Err(OrchestratorError::Conflict);
        }

        use dashmap::mapref::entry::Entry;
        match self.instances.entry(team.as_str().to_string()) {
            Entry::Occupied(_) => Err(OrchestratorError::Conflict),
            Entry::Vacant(entry) => {
                entry.insert(InstanceHealth {
                    ready_replicas: 1,
                    available_replicas: 1,
                    endpoint: None,
                });
                Ok(())
            }
        }
    }

    async fn instance_health(&self, team: &TeamName) -> Result<InstanceHealth, OrchestratorError> {
        self.instances
            .get(team.as_str())
            .map(|h| h.clone())
            .ok_or(OrchestratorError::NotFound)
    }

    async fn restart_instance(&self, team: &TeamName) -> Result<(), OrchestratorError> {
        let mut health = self
            .instances
            .get_mut(team.as_str())
            .ok_or(OrchestratorError::NotFound)?;
        // The pod is gone until the supervising controller replaces it
        health.ready_replicas = 0;
        health.available_replicas = 0;
        Ok(())
    }

    async fn delete_instance(&self, team: &TeamName) -> Result<(), OrchestratorError> {
        self.instances
            .remove(team.as_str())
            .map(|_| ())
            .ok_or(OrchestratorError::NotFound)
    }

    async fn list_instances(&self) -> Result<Vec<InstanceSummary>, OrchestratorError> {
        Ok(self
            .instances
            .iter()
            .map(|entry| InstanceSummary {
                team: entry.key().clone(),
                health: entry.value().clone(),
            })
            .collect())
    }

    fn endpoint_url(&self, team: &TeamName) -> String {
        self.instances
            .get(team.as_str())
            .and_then(|h| h.endpoint.clone())
            .unwrap_or_else(|| expand_endpoint_template(&self.endpoint_template, team))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn team(name: &str) -> TeamName {
        TeamName::parse(name).unwrap()
    }

    #[tokio::test]
    async fn test_create_then_conflict() {
        let orch = MemoryOrchestrator::new("http://team-{team}:8080");
        orch.create_instance(&team("team42")).await.unwrap();

        assert!(matches!(
            orch.create_instance(&team("team42")).await,
            Err(OrchestratorError::Conflict)
        ));
    }

    #[tokio::test]
    async fn test_restart_resets_replicas() {
        let orch = MemoryOrchestrator::new("http://team-{team}:8080");
        orch.create_instance(&team("team42")).await.unwrap();

        orch.restart_instance(&team("team42")).await.unwrap();
        let health = orch.instance_health(&team("team42")).await.unwrap();
        assert_eq!(health.available_replicas, 0);
    }

    #[tokio::test]
    async fn test_delete_then_not_found() {
        let orch = MemoryOrchestrator::new("http://team-{team}:8080");
        orch.create_instance(&team("team42")).await.unwrap();
        orch.delete_instance(&team("team42")).await.unwrap();

        assert!(matches!(
            orch.instance_health(&team("team42")).await,
            Err(OrchestratorError::NotFound)
        ));
        assert!(matches!(
            orch.delete_instance(&team("team42")).await,
            Err(OrchestratorError::NotFound)
        ));
    }
}
