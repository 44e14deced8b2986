use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ConductorError, ConductorResult};

/// A single unit of work in a plan. Parallel groups hold only `Sequential`
/// members — nesting is capped at depth 2 by construction, never by a
/// runtime depth counter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum PlanStep {
    Sequential { agent_id: String, instruction: String },
    Parallel { steps: Vec<PlanStep> },
}

impl PlanStep {
    pub fn of(agent_id: impl Into<String>, instruction: impl Into<String>) -> Self {
        PlanStep::Sequential {
            agent_id: agent_id.into(),
            instruction: instruction.into(),
        }
    }

    /// Builds a parallel group. Rejects sub-steps that are themselves
    /// parallel groups, since a plan step may nest a group only one level
    /// deep.
    pub fn parallel(steps: Vec<PlanStep>) -> ConductorResult<Self> {
        if steps.is_empty() {
            return Err(ConductorError::guard("a parallel step must contain at least one sub-step"));
        }
        if steps.iter().any(|s| matches!(s, PlanStep::Parallel { .. })) {
            return Err(ConductorError::guard(
                "a parallel step cannot nest another parallel step",
            ));
        }
        Ok(PlanStep::Parallel { steps })
    }
}

/// A FIFO queue of plan steps shared by both orchestrators.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StepQueue {
    steps: VecDeque<PlanStep>,
}

impl StepQueue {
    pub fn new(steps: Vec<PlanStep>) -> Self {
        Self {
            steps: steps.into(),
        }
    }

    pub fn next_step(&self) -> Option<&PlanStep> {
        self.steps.front()
    }

    pub fn has_more_steps(&self) -> bool {
        !self.steps.is_empty()
    }

    pub fn remove_first_step(&mut self) -> Option<PlanStep> {
        self.steps.pop_front()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Outcome of an `evaluateProgress` call against the current loop state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum ProgressEvaluation {
    Complete { summary: String },
    /// Keep working the current step. `agent_id` names which agent should
    /// receive `instruction`; it may differ from the agent that just ran,
    /// letting the evaluator redirect mid-step.
    ContinueAgent { agent_id: String, instruction: String },
    ContinueStep { next: PlanStep },
    /// No progress this turn. `agent_id`/`instruction` name the evaluator's
    /// suggested next attempt if the orchestrator decides to retry rather
    /// than replan; both are carried even though a replan discards them,
    /// so the evaluator doesn't need to know in advance which path is taken.
    Stalled { agent_id: String, instruction: String, reason: String },
    AwaitingApproval { approval_id: String, context: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingApproval {
    pub approval_id: String,
    pub context: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptiveLoopState {
    pub facts: serde_json::Value,
    pub plan: StepQueue,
    pub turn_count: u32,
    pub stall_count: u32,
    pub replan_count: u32,
    pub pending_step: Option<PlanStep>,
    pub pending_approval: Option<PendingApproval>,
    /// Append-only audit log of orchestration decisions and agent outputs,
    /// built from the same fixed-prefix lines `AuditLog` emits to
    /// `tracing`. Reset to empty on replan.
    pub message_history: Vec<String>,
    /// Latest response per agent id. Reset on replan.
    pub agent_responses: HashMap<String, String>,
}

impl AdaptiveLoopState {
    pub fn record(&mut self, line: impl Into<String>) {
        self.message_history.push(line.into());
    }

    pub fn last_final(&self) -> Option<&str> {
        self.message_history
            .iter()
            .rev()
            .find_map(|line| line.strip_prefix("FINAL: "))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequentialPlanState {
    pub remaining_steps: StepQueue,
    pub completed_steps: Vec<PlanStep>,
    pub step_count: u32,
    pub pending_approval: Option<PendingApproval>,
    /// Append-only audit log, mirroring `AdaptiveLoopState::message_history`
    /// — the sequential orchestrator has no replan step, so this never
    /// resets mid-run.
    pub message_history: Vec<String>,
}

impl SequentialPlanState {
    pub fn record(&mut self, line: impl Into<String>) {
        self.message_history.push(line.into());
    }

    pub fn last_final(&self) -> Option<&str> {
        self.message_history
            .iter()
            .rev()
            .find_map(|line| line.strip_prefix("FINAL: "))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum WorkflowStatus {
    Running,
    AwaitingApproval,
    Completed,
    Failed,
    Stopped,
}

/// Named steps of the two orchestrators, used for dispatch and for the
/// `current_step` audit field instead of a self-referential type
/// parameter or method reference.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum StepName {
    GatherFacts,
    CreatePlan,
    InnerLoop,
    ExecuteAgent,
    Replan,
    Complete,
    ExecutePlan,
    Summarize,
    End,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum WorkflowBody {
    Adaptive(AdaptiveLoopState),
    Sequential(SequentialPlanState),
}

/// The persisted, host-visible state of one workflow instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostState {
    pub instance_id: String,
    pub status: WorkflowStatus,
    pub current_step: StepName,
    pub body: WorkflowBody,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl HostState {
    pub fn as_adaptive(&self) -> ConductorResult<&AdaptiveLoopState> {
        match &self.body {
            WorkflowBody::Adaptive(state) => Ok(state),
            WorkflowBody::Sequential(_) => Err(ConductorError::guard(
                "instance is a sequential plan, not an adaptive loop",
            )),
        }
    }

    pub fn as_adaptive_mut(&mut self) -> ConductorResult<&mut AdaptiveLoopState> {
        match &mut self.body {
            WorkflowBody::Adaptive(state) => Ok(state),
            WorkflowBody::Sequential(_) => Err(ConductorError::guard(
                "instance is a sequential plan, not an adaptive loop",
            )),
        }
    }

    pub fn as_sequential(&self) -> ConductorResult<&SequentialPlanState> {
        match &self.body {
            WorkflowBody::Sequential(state) => Ok(state),
            WorkflowBody::Adaptive(_) => Err(ConductorError::guard(
                "instance is an adaptive loop, not a sequential plan",
            )),
        }
    }

    pub fn as_sequential_mut(&mut self) -> ConductorResult<&mut SequentialPlanState> {
        match &mut self.body {
            WorkflowBody::Sequential(state) => Ok(state),
            WorkflowBody::Adaptive(_) => Err(ConductorError::guard(
                "instance is an adaptive loop, not a sequential plan",
            )),
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parallel_rejects_nested_parallel() {
        let nested = PlanStep::parallel(vec![PlanStep::of("a", "do x")]).unwrap();
        let err = PlanStep::parallel(vec![nested]).unwrap_err();
        assert!(matches!(err, ConductorError::GuardViolation(_)));
    }

    #[test]
    fn parallel_rejects_empty_group() {
        let err = PlanStep::parallel(vec![]).unwrap_err();
        assert!(matches!(err, ConductorError::GuardViolation(_)));
    }

    #[test]
    fn step_queue_fifo_order() {
        let mut queue = StepQueue::new(vec![
            PlanStep::of("a", "first"),
            PlanStep::of("b", "second"),
        ]);
        assert!(queue.has_more_steps());
        assert_eq!(
            queue.next_step(),
            Some(&PlanStep::of("a", "first"))
        );
        queue.remove_first_step();
        assert_eq!(
            queue.next_step(),
            Some(&PlanStep::of("b", "second"))
        );
        queue.remove_first_step();
        assert!(!queue.has_more_steps());
    }
}
