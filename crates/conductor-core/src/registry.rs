use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ConductorResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRequest {
    pub instruction: String,
    #[serde(default)]
    pub context: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    pub output: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// The seam between the core and whatever concrete agents a host wires
/// up. The core never knows how an agent is implemented, only that it can
/// be looked up by role and invoked by id.
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    async fn agents_with_role(&self, role: &str) -> Vec<String>;
    async fn invoke(&self, agent_id: &str, request: AgentRequest) -> ConductorResult<AgentResponse>;
}
