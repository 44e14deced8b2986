//! Shared plan-step execution used by both orchestrators: a `Sequential`
//! step is a single agent invocation; a `Parallel` step fans its members
//! out through the deferred-effect primitive and folds the responses back
//! into one aggregate response.

use std::sync::Arc;

use crate::audit::AuditLog;
use crate::error::{ConductorError, ConductorResult};
use crate::model::PlanStep;
use crate::parallel::{execute_parallel_group, DeferredEffect};
use crate::registry::{AgentInvoker, AgentRequest, AgentResponse};

#[derive(Default)]
pub struct StepExecutor;

impl StepExecutor {
    pub async fn execute(
        &self,
        step: &PlanStep,
        agents: Arc<dyn AgentInvoker>,
    ) -> ConductorResult<AgentResponse> {
        match step {
            PlanStep::Sequential {
                agent_id,
                instruction,
            } => {
                AuditLog::agent(agent_id, instruction);
                agents
                    .invoke(
                        agent_id,
                        AgentRequest {
                            instruction: instruction.clone(),
                            context: serde_json::Value::Null,
                        },
                    )
                    .await
            }
            PlanStep::Parallel { steps } => {
                if steps.is_empty() {
                    return Err(ConductorError::guard("parallel step has no sub-steps"));
                }
                let mut effects = Vec::with_capacity(steps.len());
                for sub in steps {
                    let (agent_id, instruction) = match sub {
                        PlanStep::Sequential {
                            agent_id,
                            instruction,
                        } => (agent_id.clone(), instruction.clone()),
                        PlanStep::Parallel { .. } => {
                            return Err(ConductorError::guard(
                                "a parallel step cannot nest another parallel step",
                            ))
                        }
                    };
                    AuditLog::agent(&agent_id, &instruction);
                    let agents = agents.clone();
                    effects.push(DeferredEffect::<Vec<AgentResponse>> {
                        call: Box::new(move || {
                            Box::pin(async move {
                                agents
                                    .invoke(
                                        &agent_id,
                                        AgentRequest {
                                            instruction,
                                            context: serde_json::Value::Null,
                                        },
                                    )
                                    .await
                            })
                        }),
                        apply: Box::new(|response, mut acc| {
                            acc.push(response);
                            acc
                        }),
                    });
                }
                let merged = execute_parallel_group(effects, Vec::new()).await?;
                Ok(AgentResponse {
                    output: merged
                        .iter()
                        .map(|r| r.output.clone())
                        .collect::<Vec<_>>()
                        .join("\n"),
                    data: serde_json::Value::Array(merged.into_iter().map(|r| r.data).collect()),
                })
            }
        }
    }
}
