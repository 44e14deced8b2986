use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;

use crate::audit::AuditLog;
use crate::cancellation::CancellationRegistry;
use crate::config::WorkflowConfig;
use crate::error::{ConductorError, ConductorResult};
use crate::events::{EventHub, WorkflowEvent};
use crate::hosts::AdaptiveHost;
use crate::model::{
    AdaptiveLoopState, HostState, PendingApproval, PlanStep, ProgressEvaluation, StepName,
    StepQueue, WorkflowBody, WorkflowStatus,
};
use crate::registry::AgentInvoker;
use crate::step_exec::StepExecutor;

/// Drives one instance through gatherFacts -> createPlan -> innerLoop,
/// replanning on sustained stalls and pausing on awaiting-approval
/// evaluations, exactly as the goal-loop state machine this is modeled on
/// reloads state each turn and branches on a progress signal.
pub struct AdaptiveLoopOrchestrator<H: AdaptiveHost> {
    store: Arc<dyn crate::store::WorkflowStore>,
    agents: Arc<dyn AgentInvoker>,
    host: Arc<H>,
    config: WorkflowConfig,
    events: EventHub,
    step_exec: StepExecutor,
    cancellations: CancellationRegistry,
}

impl<H: AdaptiveHost> AdaptiveLoopOrchestrator<H> {
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
            step_exec: StepExecutor,
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

        let facts = self.host.gather_facts(&goal).await?;
        let steps = self.host.create_plan(&facts).await?;
        if steps.is_empty() {
            return Err(ConductorError::guard("createPlan produced an empty plan"));
        }

        let mut plan = StepQueue::new(steps);
        let pending_step = plan.next_step().cloned();
        let ledger_line = AuditLog::task_ledger(&format!("goal={goal}"));
        let now = Utc::now();
        let state = HostState {
            instance_id,
            status: WorkflowStatus::Running,
            current_step: StepName::InnerLoop,
            body: WorkflowBody::Adaptive(AdaptiveLoopState {
                facts,
                plan: std::mem::take(&mut plan),
                turn_count: 0,
                stall_count: 0,
                replan_count: 0,
                pending_step,
                pending_approval: None,
                message_history: vec![ledger_line],
                agent_responses: HashMap::new(),
            }),
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        };
        self.store.persist(&state).await?;
        self.cancellations.register(&state.instance_id);
        self.run_inner_loop(state).await
    }

    pub async fn resume(&self, instance_id: &str, message: &str) -> ConductorResult<HostState> {
        let mut state = self.load(instance_id).await?;
        if state.status != WorkflowStatus::AwaitingApproval {
            return Err(ConductorError::CommandError(format!(
                "instance {instance_id} is not paused"
            )));
        }
        let facts = state.as_adaptive()?.facts.clone();
        let updated = self.host.update_facts(facts, message).await?;
        state.as_adaptive_mut()?.facts = updated;
        state.status = WorkflowStatus::Running;
        state.touch();
        self.store.persist(&state).await?;
        self.run_inner_loop(state).await
    }

    /// `approve` is keyed into the idempotency ledger on `(instanceId,
    /// "approve", approvalId+approved)` since it's the command most prone
    /// to client-side retries racing a slow network — a repeated call
    /// replays the first outcome instead of re-running the resumed loop.
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
            .as_adaptive()?
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
                .fail(
                    state,
                    &format!("Rejected by human: {}", pending.context),
                )
                .await;
        }
        let line = AuditLog::hitl_approved(approval_id);
        let adaptive = state.as_adaptive_mut()?;
        adaptive.pending_approval = None;
        adaptive.message_history.push(line);
        state.status = WorkflowStatus::Running;
        state.touch();
        self.events.emit(WorkflowEvent::HitlApproved {
            approval_id: approval_id.to_string(),
        });
        self.store.persist(&state).await?;
        self.run_inner_loop(state).await
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
            .as_adaptive()?
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
        if let Ok(adaptive) = state.as_adaptive_mut() {
            adaptive.message_history.push(line);
        }
        self.store.persist(&state).await?;
        self.events.emit(WorkflowEvent::Done {
            status: state.status,
            error: state.error.clone(),
        });
        Ok(state)
    }

    async fn run_inner_loop(&self, mut state: HostState) -> ConductorResult<HostState> {
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

            let turn_count = state.as_adaptive()?.turn_count;
            if turn_count >= self.config.max_turns {
                return self
                    .fail(state, "adaptive loop exceeded max_turns without completing")
                    .await;
            }

            let step = match state.as_adaptive()?.pending_step.clone() {
                Some(step) => step,
                None => {
                    return self
                        .fail(state, "inner loop invoked with no pending step")
                        .await
                }
            };

            state.as_adaptive_mut()?.turn_count += 1;
            state.touch();
            self.store.persist(&state).await?;
            self.events.emit(WorkflowEvent::Turn {
                current: state.as_adaptive()?.turn_count,
                max: self.config.max_turns,
            });

            let response = match self.step_exec.execute(&step, self.agents.clone()).await {
                Ok(response) => response,
                Err(e) => {
                    let _ = self.host.handle_failure(state.as_adaptive()?, &e).await;
                    return self
                        .fail(state, &format!("agent execution failed: {e}"))
                        .await;
                }
            };

            let agent_ids: Vec<String> = match &step {
                PlanStep::Sequential { agent_id, .. } => vec![agent_id.clone()],
                PlanStep::Parallel { steps } => steps
                    .iter()
                    .filter_map(|s| match s {
                        PlanStep::Sequential { agent_id, .. } => Some(agent_id.clone()),
                        PlanStep::Parallel { .. } => None,
                    })
                    .collect(),
            };
            let output_lines: Vec<&str> = if agent_ids.len() > 1 {
                response.output.split('\n').collect()
            } else {
                vec![response.output.as_str()]
            };
            {
                let adaptive = state.as_adaptive_mut()?;
                for (id, text) in agent_ids.iter().zip(output_lines.iter()) {
                    adaptive.agent_responses.insert(id.clone(), (*text).to_string());
                }
                for (id, text) in agent_ids.iter().zip(output_lines.iter()) {
                    let line = AuditLog::agent(id, text);
                    adaptive.message_history.push(line);
                }
            }

            let evaluation = self
                .host
                .evaluate_progress(state.as_adaptive()?, &response)
                .await?;

            match evaluation {
                ProgressEvaluation::Complete { summary } => {
                    let complete_line = AuditLog::complete(&summary);
                    state.as_adaptive_mut()?.message_history.push(complete_line);
                    let final_answer = self.host.summarize(state.as_adaptive()?).await?;
                    let final_line = AuditLog::final_summary(&final_answer);
                    let adaptive = state.as_adaptive_mut()?;
                    adaptive.message_history.push(final_line);
                    state.status = WorkflowStatus::Completed;
                    state.result = Some(serde_json::json!({ "summary": final_answer }));
                    state.touch();
                    self.store.persist(&state).await?;
                    self.events.emit(WorkflowEvent::Done {
                        status: state.status,
                        error: None,
                    });
                    return Ok(state);
                }
                ProgressEvaluation::ContinueAgent { agent_id, instruction } => {
                    let adaptive = state.as_adaptive_mut()?;
                    adaptive.stall_count = 0;
                    adaptive.pending_step = Some(PlanStep::Sequential { agent_id, instruction });
                    state.touch();
                    self.store.persist(&state).await?;
                }
                ProgressEvaluation::ContinueStep { next } => {
                    let adaptive = state.as_adaptive_mut()?;
                    adaptive.stall_count = 0;
                    adaptive.plan.remove_first_step();
                    adaptive.pending_step = Some(next);
                    state.touch();
                    self.store.persist(&state).await?;
                }
                ProgressEvaluation::Stalled { agent_id, instruction, reason } => {
                    let should_replan = {
                        let adaptive = state.as_adaptive_mut()?;
                        adaptive.stall_count += 1;
                        adaptive.stall_count >= self.config.stall_threshold
                    };
                    if should_replan {
                        let exhausted = {
                            let adaptive = state.as_adaptive_mut()?;
                            adaptive.replan_count += 1;
                            adaptive.replan_count > self.config.max_replans
                        };
                        if exhausted {
                            return self
                                .fail(
                                    state,
                                    &format!("stalled after exhausting replans: {reason}"),
                                )
                                .await;
                        }
                        let facts = state.as_adaptive()?.facts.clone();
                        let new_steps = self.host.create_plan(&facts).await?;
                        if new_steps.is_empty() {
                            return self.fail(state, "replan produced an empty plan").await;
                        }
                        let adaptive = state.as_adaptive_mut()?;
                        adaptive.plan = StepQueue::new(new_steps);
                        adaptive.stall_count = 0;
                        adaptive.pending_step = adaptive.plan.next_step().cloned();
                        adaptive.pending_approval = None;
                        adaptive.agent_responses.clear();
                        let replan_count = adaptive.replan_count;
                        let ledger_line =
                            AuditLog::updated_task_ledger(&format!("replanned after stall: {reason}"));
                        adaptive.message_history = vec![ledger_line];
                        state.touch();
                        self.events.emit(WorkflowEvent::Replan {
                            count: replan_count,
                        });
                        self.store.persist(&state).await?;
                    } else {
                        let line =
                            AuditLog::orchestrator(&format!("stalled, retrying: {reason}"));
                        let adaptive = state.as_adaptive_mut()?;
                        adaptive.pending_step = Some(PlanStep::Sequential { agent_id, instruction });
                        adaptive.message_history.push(line);
                        state.touch();
                        self.store.persist(&state).await?;
                    }
                }
                ProgressEvaluation::AwaitingApproval {
                    approval_id,
                    context,
                } => {
                    let line = AuditLog::hitl_request(&context);
                    let adaptive = state.as_adaptive_mut()?;
                    adaptive.pending_approval = Some(PendingApproval {
                        approval_id: approval_id.clone(),
                        context: context.clone(),
                    });
                    adaptive.message_history.push(line);
                    state.status = WorkflowStatus::AwaitingApproval;
                    state.touch();
                    self.events.emit(WorkflowEvent::HitlRequested {
                        approval_id,
                        context,
                    });
                    self.store.persist(&state).await?;
                    return Ok(state);
                }
            }
        }
    }
}
