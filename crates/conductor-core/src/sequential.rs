use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::audit::AuditLog;
use crate::cancellation::CancellationRegistry;
use crate::config::WorkflowConfig;
use crate::error::{ConductorError, ConductorResult};
use crate::events::{EventHub, WorkflowEvent};
use crate::hosts::SequentialHost;
use crate::model::{
    HostState, PendingApproval, SequentialPlanState, StepName, StepQueue, WorkflowBody,
    WorkflowStatus,
};
use crate::registry::AgentInvoker;
use crate::retry::RetryPolicy;
use crate::step_exec::StepExecutor;

/// Pops one plan step at a time and runs it to completion with no stall
/// detection and no replanning — the simpler sibling of the adaptive
/// loop, for goals whose plan is trusted not to need revision mid-flight.
pub struct SequentialPlanOrchestrator<H: SequentialHost> {
    store: Arc<dyn crate::store::WorkflowStore>,
    agents: Arc<dyn AgentInvoker>,
    host: Arc<H>,
    config: WorkflowConfig,
    events: EventHub,
    cancellations: CancellationRegistry,
}

impl<H: SequentialHost> SequentialPlanOrchestrator<H> {
    pub fn new(
        store: Arc<dyn crate::store::WorkflowStore>,
        agents: Arc<dyn AgentInvoker>,
        host: Arc<H>,
        config: WorkflowConfig,
    ) -> Self {
        Self {
            store,
            agents,
            host,
            config,
            events: EventHub::default(),
            cancellations: CancellationRegistry::new(),
        }
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<WorkflowEvent> {
        self.events.subscribe()
    }

    pub async fn start(
        &self,
        instance_id: impl Into<String>,
        goal: impl Into<String>,
    ) -> ConductorResult<HostState> {
        let instance_id = instance_id.into();
        let goal = goal.into();
        if self.store.load(&instance_id).await?.is_some() {
            return Err(ConductorError::CommandError(format!(
                "instance {instance_id} already started"
            )));
        }

        let steps = self.host.create_plan(&goal).await?;
        if steps.is_empty() {
            return Err(ConductorError::guard("createPlan produced an empty plan"));
        }
        if steps.len() as u32 > self.config.max_steps {
            return Err(ConductorError::guard(format!(
                "plan has {} steps, exceeding max_steps {}",
                steps.len(),
                self.config.max_steps
            )));
        }

        let ledger_line = AuditLog::task_ledger(&format!("goal={goal}, steps={}", steps.len()));
        let now = Utc::now();
        let state = HostState {
            instance_id,
            status: WorkflowStatus::Running,
            current_step: StepName::ExecutePlan,
            body: WorkflowBody::Sequential(SequentialPlanState {
                remaining_steps: StepQueue::new(steps),
                completed_steps: Vec::new(),
                step_count: 0,
                pending_approval: None,
                message_history: vec![ledger_line],
            }),
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        };
        self.store.persist(&state).await?;
        self.cancellations.register(&state.instance_id);
        self.run_execute_plan(state, false).await
    }

    /// `resume(message)` has no applicable pause point in the sequential
    /// orchestrator beyond an outstanding approval — approve/reject that
    /// through `approve` instead.
    pub async fn resume(&self, instance_id: &str, _message: &str) -> ConductorResult<HostState> {
        Err(ConductorError::CommandError(format!(
            "instance {instance_id} has no resumable pause point; use approve() to clear a pending approval"
        )))
    }

    /// `approve` is keyed into the idempotency ledger on `(instanceId,
    /// "approve", approvalId+approved)` since it's the command most prone
    /// to client-side retries racing a slow network — a repeated call
    /// replays the first outcome instead of re-running the resumed plan.
    pub async fn approve(
        &self,
        instance_id: &str,
        approval_id: &str,
        approved: bool,
    ) -> ConductorResult<HostState> {
        let payload_hash = format!("{approval_id}:{approved}");
        if let Some(cached) = self
            .store
            .idempotency_lookup(instance_id, "approve", &payload_hash)
            .await?
        {
            return serde_json::from_value(cached).map_err(ConductorError::from);
        }
        let result = self.approve_uncached(instance_id, approval_id, approved).await?;
        self.store
            .idempotency_record(
                instance_id,
                "approve",
                &payload_hash,
                &serde_json::to_value(&result)?,
            )
            .await?;
        Ok(result)
    }

    async fn approve_uncached(
        &self,
        instance_id: &str,
        approval_id: &str,
        approved: bool,
    ) -> ConductorResult<HostState> {
        let mut state = self.load(instance_id).await?;
        let pending = state
            .as_sequential()?
            .pending_approval
            .clone()
            .ok_or_else(|| ConductorError::CommandError("no pending approval".into()))?;
        if pending.approval_id != approval_id {
            return Err(ConductorError::ApprovalIdMismatch {
                expected: pending.approval_id,
                actual: approval_id.to_string(),
            });
        }
        if !approved {
            return self
                .fail(state, &format!("Rejected by human: {}", pending.context))
                .await;
        }
        let line = AuditLog::hitl_approved(approval_id);
        let sequential = state.as_sequential_mut()?;
        sequential.pending_approval = None;
        sequential.message_history.push(line);
        state.status = WorkflowStatus::Running;
        state.touch();
        self.events.emit(WorkflowEvent::HitlApproved {
            approval_id: approval_id.to_string(),
        });
        self.store.persist(&state).await?;
        self.run_execute_plan(state, true).await
    }

    pub async fn stop(&self, instance_id: &str, reason: &str) -> ConductorResult<HostState> {
        self.cancellations.cancel(instance_id);
        let mut state = self.load(instance_id).await?;
        state.status = WorkflowStatus::Stopped;
        state.error = Some(reason.to_string());
        state.touch();
        self.store.persist(&state).await?;
        self.events.emit(WorkflowEvent::Done {
            status: state.status,
            error: state.error.clone(),
        });
        Ok(state)
    }

    pub async fn get_state(&self, instance_id: &str) -> ConductorResult<HostState> {
        self.load(instance_id).await
    }

    /// Extracts the last `FINAL:` message from the persisted history.
    /// Errors with `CommandError` (signaling not-yet-completed) if the
    /// instance hasn't completed or no `FINAL:` line has been recorded yet.
    pub async fn get_answer(&self, instance_id: &str) -> ConductorResult<String> {
        let state = self.load(instance_id).await?;
        if state.status != WorkflowStatus::Completed {
            return Err(ConductorError::CommandError(format!(
                "instance {instance_id} has not completed"
            )));
        }
        state
            .as_sequential()?
            .last_final()
            .map(str::to_string)
            .ok_or_else(|| {
                ConductorError::CommandError(format!(
                    "instance {instance_id} completed without a FINAL: message"
                ))
            })
    }

    async fn load(&self, instance_id: &str) -> ConductorResult<HostState> {
        self.store
            .load(instance_id)
            .await?
            .ok_or_else(|| ConductorError::InstanceNotFound(instance_id.to_string()))
    }

    async fn fail(&self, mut state: HostState, message: &str) -> ConductorResult<HostState> {
        state.status = WorkflowStatus::Failed;
        state.error = Some(message.to_string());
        state.touch();
        let line = AuditLog::failed(message);
        if let Ok(sequential) = state.as_sequential_mut() {
            sequential.message_history.push(line);
        }
        self.store.persist(&state).await?;
        self.events.emit(WorkflowEvent::Done {
            status: state.status,
            error: state.error.clone(),
        });
        Ok(state)
    }

    /// `skip_approval_check` is set on the first iteration after a resume
    /// from `approve()` so the just-approved step runs immediately instead
    /// of re-triggering its own approval gate.
    async fn run_execute_plan(
        &self,
        mut state: HostState,
        mut skip_approval_check: bool,
    ) -> ConductorResult<HostState> {
        loop {
            if self.cancellations.token_for(&state.instance_id).is_cancelled() {
                state.status = WorkflowStatus::Stopped;
                state.touch();
                self.store.persist(&state).await?;
                self.events.emit(WorkflowEvent::Done {
                    status: state.status,
                    error: state.error.clone(),
                });
                return Ok(state);
            }
            if !state.as_sequential()?.remaining_steps.has_more_steps() {
                return self.complete(state).await;
            }
            let step_count = state.as_sequential()?.step_count;
            if step_count >= self.config.max_steps {
                return self
                    .fail(state, "sequential plan exceeded max_steps without completing")
                    .await;
            }

            let step = state
                .as_sequential()?
                .remaining_steps
                .next_step()
                .cloned()
                .expect("has_more_steps just confirmed a front element exists");

            if !skip_approval_check && self.host.needs_approval(&step).await {
                let approval_id = Uuid::new_v4().to_string();
                let context = format!("approval required before step: {step:?}");
                let line = AuditLog::hitl_request(&context);
                let sequential = state.as_sequential_mut()?;
                sequential.pending_approval = Some(PendingApproval {
                    approval_id: approval_id.clone(),
                    context: context.clone(),
                });
                sequential.message_history.push(line);
                state.status = WorkflowStatus::AwaitingApproval;
                state.touch();
                self.events.emit(WorkflowEvent::HitlRequested {
                    approval_id,
                    context,
                });
                self.store.persist(&state).await?;
                return Ok(state);
            }
            skip_approval_check = false;

            let retry = RetryPolicy::new(self.config.default_step_retries, self.config.default_step_timeout);
            let agents = self.agents.clone();
            let step_for_call = step.clone();
            let result = retry
                .run("execute_plan", move || {
                    let agents = agents.clone();
                    let step = step_for_call.clone();
                    async move { StepExecutor.execute(&step, agents).await }
                })
                .await;

            match result {
                Ok(response) => {
                    let line = AuditLog::satisfied(&response.output);
                    let sequential = state.as_sequential_mut()?;
                    sequential.remaining_steps.remove_first_step();
                    sequential.completed_steps.push(step);
                    sequential.step_count += 1;
                    sequential.message_history.push(line);
                    let step_count = sequential.step_count;
                    state.touch();
                    self.events.emit(WorkflowEvent::Turn {
                        current: step_count,
                        max: self.config.max_steps,
                    });
                    self.store.persist(&state).await?;
                }
                Err(e) => {
                    let _ = self.host.handle_failure(state.as_sequential()?, &e).await;
                    return self.fail(state, &format!("step execution failed: {e}")).await;
                }
            }
        }
    }

    async fn complete(&self, mut state: HostState) -> ConductorResult<HostState> {
        let summary = self.host.summarize(state.as_sequential()?).await?;
        let line = AuditLog::final_summary(&summary);
        let sequential = state.as_sequential_mut()?;
        sequential.message_history.push(line);
        state.status = WorkflowStatus::Completed;
        state.result = Some(serde_json::json!({ "summary": summary }));
        state.touch();
        self.store.persist(&state).await?;
        self.events.emit(WorkflowEvent::Done {
            status: state.status,
            error: None,
        });
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PlanStep;
    use crate::registry::{AgentRequest, AgentResponse};
    use crate::store::MemoryStore;
    use async_trait::async_trait;

    struct EchoAgents;

    #[async_trait]
    impl AgentInvoker for EchoAgents {
        async fn agents_with_role(&self, _role: &str) -> Vec<String> {
            vec!["worker".to_string()]
        }

        async fn invoke(&self, agent_id: &str, request: AgentRequest) -> ConductorResult<AgentResponse> {
            Ok(AgentResponse {
                output: format!("{agent_id} did: {}", request.instruction),
                data: serde_json::Value::Null,
            })
        }
    }

    struct ThreeStepHost;

    #[async_trait]
    impl SequentialHost for ThreeStepHost {
        async fn create_plan(&self, _goal: &str) -> ConductorResult<Vec<PlanStep>> {
            Ok(vec![
                PlanStep::of("worker", "step one"),
                PlanStep::of("worker", "step two"),
                PlanStep::of("worker", "step three"),
            ])
        }

        async fn summarize(&self, state: &SequentialPlanState) -> ConductorResult<String> {
            Ok(format!("completed {} steps", state.completed_steps.len()))
        }

        async fn handle_failure(
            &self,
            _state: &SequentialPlanState,
            _error: &ConductorError,
        ) -> ConductorResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn runs_every_step_in_order_then_completes() {
        let orchestrator = SequentialPlanOrchestrator::new(
            Arc::new(MemoryStore::new()),
            Arc::new(EchoAgents),
            Arc::new(ThreeStepHost),
            WorkflowConfig::default(),
        );
        let state = orchestrator.start("seq-1", "ship three things").await.unwrap();
        assert_eq!(state.status, WorkflowStatus::Completed);
        let sequential = state.as_sequential().unwrap();
        assert_eq!(sequential.step_count, 3);
        assert_eq!(sequential.completed_steps.len(), 3);
        assert_eq!(
            orchestrator.get_answer("seq-1").await.unwrap(),
            "completed 3 steps"
        );
    }

    #[tokio::test]
    async fn get_answer_rejects_an_instance_that_has_not_completed() {
        let orchestrator = SequentialPlanOrchestrator::new(
            Arc::new(MemoryStore::new()),
            Arc::new(EchoAgents),
            Arc::new(AlwaysApprovingHost),
            WorkflowConfig::default(),
        );
        orchestrator.start("seq-paused", "do a dangerous thing").await.unwrap();
        let err = orchestrator.get_answer("seq-paused").await.unwrap_err();
        assert!(matches!(err, ConductorError::CommandError(_)));
    }

    struct AlwaysApprovingHost;

    #[async_trait]
    impl SequentialHost for AlwaysApprovingHost {
        async fn create_plan(&self, _goal: &str) -> ConductorResult<Vec<PlanStep>> {
            Ok(vec![PlanStep::of("worker", "dangerous step")])
        }

        async fn summarize(&self, _state: &SequentialPlanState) -> ConductorResult<String> {
            Ok("done".to_string())
        }

        async fn handle_failure(
            &self,
            _state: &SequentialPlanState,
            _error: &ConductorError,
        ) -> ConductorResult<()> {
            Ok(())
        }

        async fn needs_approval(&self, _step: &PlanStep) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn checkpoint_step_pauses_then_runs_once_approved() {
        let orchestrator = SequentialPlanOrchestrator::new(
            Arc::new(MemoryStore::new()),
            Arc::new(EchoAgents),
            Arc::new(AlwaysApprovingHost),
            WorkflowConfig::default(),
        );
        let paused = orchestrator.start("seq-hitl", "do a dangerous thing").await.unwrap();
        assert_eq!(paused.status, WorkflowStatus::AwaitingApproval);
        let approval_id = paused.as_sequential().unwrap().pending_approval.clone().unwrap().approval_id;
        let completed = orchestrator.approve("seq-hitl", &approval_id, true).await.unwrap();
        assert_eq!(completed.status, WorkflowStatus::Completed);

        let replayed = orchestrator.approve("seq-hitl", &approval_id, true).await.unwrap();
        assert_eq!(replayed.status, WorkflowStatus::Completed);
    }

    #[tokio::test]
    async fn oversized_plan_is_rejected_before_it_starts() {
        struct HugePlanHost;
        #[async_trait]
        impl SequentialHost for HugePlanHost {
            async fn create_plan(&self, _goal: &str) -> ConductorResult<Vec<PlanStep>> {
                Ok((0..100).map(|i| PlanStep::of("worker", format!("step {i}"))).collect())
            }
            async fn summarize(&self, _state: &SequentialPlanState) -> ConductorResult<String> {
                Ok(String::new())
            }
            async fn handle_failure(
                &self,
                _state: &SequentialPlanState,
                _error: &ConductorError,
            ) -> ConductorResult<()> {
                Ok(())
            }
        }
        let orchestrator = SequentialPlanOrchestrator::new(
            Arc::new(MemoryStore::new()),
            Arc::new(EchoAgents),
            Arc::new(HugePlanHost),
            WorkflowConfig::default(),
        );
        let err = orchestrator.start("seq-huge", "too much").await.unwrap_err();
        assert!(matches!(err, ConductorError::GuardViolation(_)));
    }
}
