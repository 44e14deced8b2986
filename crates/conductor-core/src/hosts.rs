//! The callback seams a host application implements. The core calls
//! these at well-defined points in the state machine and never assumes
//! anything about how they're implemented — no LLM wire format, no
//! specific provider, no HTTP.

use async_trait::async_trait;

use crate::error::ConductorResult;
use crate::model::{AdaptiveLoopState, PlanStep, ProgressEvaluation, SequentialPlanState};
use crate::registry::AgentResponse;

#[async_trait]
pub trait AdaptiveHost: Send + Sync {
    async fn gather_facts(&self, goal: &str) -> ConductorResult<serde_json::Value>;
    async fn create_plan(&self, facts: &serde_json::Value) -> ConductorResult<Vec<PlanStep>>;
    async fn evaluate_progress(
        &self,
        state: &AdaptiveLoopState,
        last_response: &AgentResponse,
    ) -> ConductorResult<ProgressEvaluation>;
    async fn summarize(&self, state: &AdaptiveLoopState) -> ConductorResult<String>;
    async fn handle_failure(
        &self,
        state: &AdaptiveLoopState,
        error: &crate::error::ConductorError,
    ) -> ConductorResult<()>;

    /// Folds a resume message into the loop's fact base. Default is a
    /// no-op passthrough; hosts that track conversational facts override
    /// this to actually incorporate the message.
    async fn update_facts(
        &self,
        facts: serde_json::Value,
        _message: &str,
    ) -> ConductorResult<serde_json::Value> {
        Ok(facts)
    }
}

#[async_trait]
pub trait SequentialHost: Send + Sync {
    async fn create_plan(&self, goal: &str) -> ConductorResult<Vec<PlanStep>>;
    async fn summarize(&self, state: &SequentialPlanState) -> ConductorResult<String>;
    async fn handle_failure(
        &self,
        state: &SequentialPlanState,
        error: &crate::error::ConductorError,
    ) -> ConductorResult<()>;

    /// Whether the given step requires human approval before it runs.
    /// Default `false` mirrors an always-auto approval policy.
    async fn needs_approval(&self, _step: &PlanStep) -> bool {
        false
    }
}
