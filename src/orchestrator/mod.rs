//! Orchestration collaborator
//!
//! The orchestrator is the external control plane that actually creates,
//! inspects, restarts, and deletes per-team backend workloads. Gatehouse
//! never stores instance state locally; it derives it per request from the
//! replica counts the orchestrator reports.

pub mod control_plane;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::team::TeamName;

pub use control_plane::ControlPlaneOrchestrator;
pub use memory::MemoryOrchestrator;

/// Errors from the orchestration collaborator.
///
/// `NotFound` and `Conflict` are normal protocol outcomes (absent instance,
/// lost creation race) and are handled locally by the lifecycle manager;
/// only `Backend` is a real failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum OrchestratorError {
    #[error("instance not found")]
    NotFound,

    #[error("instance already exists")]
    Conflict,

    #[error("orchestration backend error: {0}")]
    Backend(String),
}

/// Replica counts reported for one instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceHealth {
    pub ready_replicas: i32,
    pub available_replicas: i32,
    /// Network address of the instance, when the control plane knows it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

/// Derived instance state. Never stored; computed per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceState {
    Absent,
    Starting,
    Ready,
}

impl InstanceState {
    /// Derive the state from reported replica counts.
    pub fn from_health(health: &InstanceHealth) -> Self {
        if health.available_replicas >= 1 {
            Self::Ready
        } else {
            Self::Starting
        }
    }
}

/// One entry in an orchestrator listing.
#[derive(Debug, Clone)]
pub struct InstanceSummary {
    pub team: String,
    pub health: InstanceHealth,
}

/// Control-plane interface consumed by the lifecycle manager and router.
#[async_trait]
pub trait Orchestrator: Send + Sync {
    /// Create the backend workload and its network endpoint for a team.
    /// An already-existing instance is a `Conflict`.
    async fn create_instance(&self, team: &TeamName) -> Result<(), OrchestratorError>;

    /// Report replica counts for a team's instance.
    async fn instance_health(&self, team: &TeamName) -> Result<InstanceHealth, OrchestratorError>;

    /// Delete the running pod; the supervising controller replaces it.
    async fn restart_instance(&self, team: &TeamName) -> Result<(), OrchestratorError>;

    /// Tear down the workload and its network endpoint.
    async fn delete_instance(&self, team: &TeamName) -> Result<(), OrchestratorError>;

    /// List all instances across teams.
    async fn list_instances(&self) -> Result<Vec<InstanceSummary>, OrchestratorError>;

    /// Network address for a team's instance, derived from configuration
    /// when the control plane does not report one.
    fn endpoint_url(&self, team: &TeamName) -> String;
}

/// Expand a `{team}` placeholder in a backend URL template.
pub(crate) fn expand_endpoint_template(template: &str, team: &TeamName) -> String {
    template.replace("{team}", team.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_from_health() {
        let ready = InstanceHealth {
            ready_replicas: 1,
            available_replicas: 1,
            endpoint: None,
        };
        assert_eq!(InstanceState::from_health(&ready), InstanceState::Ready);

        let starting = InstanceHealth {
            ready_replicas: 0,
            available_replicas: 0,
            endpoint: None,
        };
        assert_eq!(InstanceState::from_health(&starting), InstanceState::Starting);

        // Exists but nothing available yet counts as starting, not ready
        let degraded = InstanceHealth {
            ready_replicas: 1,
            available_replicas: 0,
            endpoint: None,
        };
        assert_eq!(InstanceState::from_health(&degraded), InstanceState::Starting);
    }

    #[test]
    fn test_endpoint_template() {
        let team = TeamName::parse("team42").unwrap();
        assert_eq!(
            expand_endpoint_template("http://team-{team}:8080", &team),
            "http://team-team42:8080"
        );
    }
}
