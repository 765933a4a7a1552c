//! REST control-plane client
//!
//! Talks to the instance control plane over HTTP:
//!
//! - `POST   /v1/instances` `{team}`         - create workload + endpoint
//! - `GET    /v1/instances/{team}`           - replica counts
//! - `POST   /v1/instances/{team}/restart`   - delete the running pod
//! - `DELETE /v1/instances/{team}`           - tear down workload + endpoint
//! - `GET    /v1/instances`                  - list all instances
//!
//! 404 and 409 are protocol outcomes (`NotFound`, `Conflict`); everything
//! else non-2xx is a backend failure.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{
    expand_endpoint_template, InstanceHealth, InstanceSummary, Orchestrator, OrchestratorError,
};
use crate::team::TeamName;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct CreateRequest<'a> {
    team: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListedInstance {
    team: String,
    #[serde(flatten)]
    health: InstanceHealth,
}

/// reqwest-backed orchestrator client.
pub struct ControlPlaneOrchestrator {
    client: reqwest::Client,
    base_url: String,
    endpoint_template: String,
}

impl ControlPlaneOrchestrator {
    pub fn new(base_url: &str, endpoint_template: &str) -> Result<Self, OrchestratorError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| OrchestratorError::Backend(format!("Failed to build client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            endpoint_template: endpoint_template.to_string(),
        })
    }

    fn instance_url(&self, team: &TeamName) -> String {
        format!("{}/v1/instances/{}", self.base_url, team)
    }

    fn map_status(status: StatusCode) -> OrchestratorError {
        match status {
            StatusCode::NOT_FOUND => OrchestratorError::NotFound,
            StatusCode::CONFLICT => OrchestratorError::Conflict,
            other => OrchestratorError::Backend(format!("control plane returned {other}")),
        }
    }
}

#[async_trait]
impl Orchestrator for ControlPlaneOrchestrator {
    async fn create_instance(&self, team: &TeamName) -> Result<(), OrchestratorError> {
        let url = format!("{}/v1/instances", self.base_url);
        debug!(team = %team, url = %url, "Requesting instance creation");

        let response = self
            .client
            .post(&url)
            .json(&CreateRequest { team: team.as_str() })
            .send()
            .await
            .map_err(|e| OrchestratorError::Backend(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::map_status(response.status()))
        }
    }

    async fn instance_health(&self, team: &TeamName) -> Result<InstanceHealth, OrchestratorError> {
        let response = self
            .client
            .get(self.instance_url(team))
            .send()
            .await
            .map_err(|e| OrchestratorError::Backend(e.to_string()))?;

        if response.status().is_success() {
            response
                .json::<InstanceHealth>()
                .await
                .map_err(|e| OrchestratorError::Backend(format!("invalid status body: {e}")))
        } else {
            Err(Self::map_status(response.status()))
        }
    }

    async fn restart_instance(&self, team: &TeamName) -> Result<(), OrchestratorError> {
        let url = format!("{}/restart", self.instance_url(team));
        let response = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(|e| OrchestratorError::Backend(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::map_status(response.status()))
        }
    }

    async fn delete_instance(&self, team: &TeamName) -> Result<(), OrchestratorError> {
        let response = self
            .client
            .delete(self.instance_url(team))
            .send()
            .await
            .map_err(|e| OrchestratorError::Backend(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::map_status(response.status()))
        }
    }

    async fn list_instances(&self) -> Result<Vec<InstanceSummary>, OrchestratorError> {
        let url = format!("{}/v1/instances", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| OrchestratorError::Backend(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::map_status(response.status()));
        }

        let listed = response
            .json::<Vec<ListedInstance>>()
            .await
            .map_err(|e| OrchestratorError::Backend(format!("invalid list body: {e}")))?;

        Ok(listed
            .into_iter()
            .map(|i| InstanceSummary {
                team: i.team,
                health: i.health,
            })
            .collect())
    }

    fn endpoint_url(&self, team: &TeamName) -> String {
        expand_endpoint_template(&self.endpoint_template, team)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            ControlPlaneOrchestrator::map_status(StatusCode::NOT_FOUND),
            OrchestratorError::NotFound
        ));
        assert!(matches!(
            ControlPlaneOrchestrator::map_status(StatusCode::CONFLICT),
            OrchestratorError::Conflict
        ));
        assert!(matches!(
            ControlPlaneOrchestrator::map_status(StatusCode::INTERNAL_SERVER_ERROR),
            OrchestratorError::Backend(_)
        ));
    }

    #[test]
    fn test_urls() {
        let orch =
            ControlPlaneOrchestrator::new("http://cp:9090/", "http://team-{team}:8080").unwrap();
        let team = TeamName::parse("team42").unwrap();

        assert_eq!(orch.instance_url(&team), "http://cp:9090/v1/instances/team42");
        assert_eq!(orch.endpoint_url(&team), "http://team-team42:8080");
    }
}
