//! Mock adapters for exercising the orchestrators end to end without a
//! real agent backend. Exported (not `#[cfg(test)]`) so both this crate's
//! `tests/` directory and downstream crates can reuse them.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::{ConductorError, ConductorResult};
use crate::hosts::{AdaptiveHost, SequentialHost};
use crate::model::{AdaptiveLoopState, PlanStep, ProgressEvaluation, SequentialPlanState};
use crate::registry::{AgentInvoker, AgentRequest, AgentResponse};

/// Invokes any agent id and echoes the instruction back as output.
#[derive(Default)]
pub struct MockAgentInvoker {
    pub roles: std::collections::HashMap<String, Vec<String>>,
}

#[async_trait]
impl AgentInvoker for MockAgentInvoker {
    async fn agents_with_role(&self, role: &str) -> Vec<String> {
        self.roles.get(role).cloned().unwrap_or_default()
    }

    async fn invoke(&self, agent_id: &str, request: AgentRequest) -> ConductorResult<AgentResponse> {
        Ok(AgentResponse {
            output: format!("{agent_id}: {}", request.instruction),
            data: serde_json::Value::Null,
        })
    }
}

/// Walks through a fixed, caller-supplied sequence of `ProgressEvaluation`
/// values, one per call, regardless of what the agent actually returned.
/// Lets tests script exact scenarios (stall then replan then complete,
/// etc.) without writing a bespoke host for each one.
pub struct ScriptedAdaptiveHost {
    plan: Vec<PlanStep>,
    replan: Vec<PlanStep>,
    evaluations: Mutex<Vec<ProgressEvaluation>>,
    cursor: AtomicUsize,
}

impl ScriptedAdaptiveHost {
    pub fn new(plan: Vec<PlanStep>, evaluations: Vec<ProgressEvaluation>) -> Self {
        Self {
            plan,
            replan: Vec::new(),
            evaluations: Mutex::new(evaluations),
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn with_replan(mut self, replan: Vec<PlanStep>) -> Self {
        self.replan = replan;
        self
    }
}

#[async_trait]
impl AdaptiveHost for ScriptedAdaptiveHost {
    async fn gather_facts(&self, goal: &str) -> ConductorResult<serde_json::Value> {
        Ok(serde_json::json!({ "goal": goal }))
    }

    async fn create_plan(&self, _facts: &serde_json::Value) -> ConductorResult<Vec<PlanStep>> {
        let attempt = self.cursor.load(Ordering::SeqCst);
        if attempt == 0 {
            Ok(self.plan.clone())
        } else {
            Ok(self.replan.clone())
        }
    }

    async fn evaluate_progress(
        &self,
        _state: &AdaptiveLoopState,
        _last_response: &AgentResponse,
    ) -> ConductorResult<ProgressEvaluation> {
        let mut evaluations = self.evaluations.lock().await;
        let idx = self.cursor.fetch_add(1, Ordering::SeqCst);
        evaluations
            .get(idx)
            .cloned()
            .ok_or_else(|| ConductorError::Fatal("scripted host ran out of evaluations".into()))
    }

    async fn summarize(&self, _state: &AdaptiveLoopState) -> ConductorResult<String> {
        Ok("scripted summary".to_string())
    }

    async fn handle_failure(
        &self,
        _state: &AdaptiveLoopState,
        _error: &ConductorError,
    ) -> ConductorResult<()> {
        Ok(())
    }
}

/// A fixed plan with no approval gating, for sequential-orchestrator
/// scenarios that don't need HITL.
pub struct FixedSequentialHost {
    pub steps: Vec<PlanStep>,
}

#[async_trait]
impl SequentialHost for FixedSequentialHost {
    async fn create_plan(&self, _goal: &str) -> ConductorResult<Vec<PlanStep>> {
        Ok(self.steps.clone())
    }

    async fn summarize(&self, state: &SequentialPlanState) -> ConductorResult<String> {
        Ok(format!("ran {} steps", state.completed_steps.len()))
    }

    async fn handle_failure(
        &self,
        _state: &SequentialPlanState,
        _error: &ConductorError,
    ) -> ConductorResult<()> {
        Ok(())
    }
}

pub fn mock_agents() -> Arc<dyn AgentInvoker> {
    Arc::new(MockAgentInvoker::default())
}
