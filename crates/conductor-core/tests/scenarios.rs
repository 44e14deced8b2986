use std::sync::Arc;
use std::time::Duration;

use conductor_core::model::{PlanStep, ProgressEvaluation, WorkflowStatus};
use conductor_core::store::MemoryStore;
use conductor_core::test_support::{mock_agents, FixedSequentialHost, ScriptedAdaptiveHost};
use conductor_core::{AdaptiveLoopOrchestrator, SequentialPlanOrchestrator, WorkflowConfig};

#[tokio::test]
async fn sequential_plan_executes_a_parallel_group_then_completes() {
    let parallel = PlanStep::parallel(vec![
        PlanStep::of("researcher", "look up A"),
        PlanStep::of("researcher", "look up B"),
    ])
    .unwrap();
    let host = FixedSequentialHost {
        steps: vec![PlanStep::of("planner", "kick off"), parallel],
    };
    let orchestrator = SequentialPlanOrchestrator::new(
        Arc::new(MemoryStore::new()),
        mock_agents(),
        Arc::new(host),
        WorkflowConfig::default(),
    );
    let state = orchestrator
        .start("seq-parallel", "research two things")
        .await
        .unwrap();
    assert_eq!(state.status, WorkflowStatus::Completed);
    assert_eq!(state.as_sequential().unwrap().completed_steps.len(), 2);
}

#[tokio::test]
async fn adaptive_loop_replans_once_then_completes() {
    let host = Arc::new(
        ScriptedAdaptiveHost::new(
            vec![PlanStep::of("worker", "try approach one")],
            vec![
                ProgressEvaluation::Stalled {
                    agent_id: "worker".into(),
                    instruction: "try approach one".into(),
                    reason: "no progress on approach one".into(),
                },
                ProgressEvaluation::Stalled {
                    agent_id: "worker".into(),
                    instruction: "try approach one".into(),
                    reason: "still stuck".into(),
                },
                ProgressEvaluation::Complete {
                    summary: "approach two worked".into(),
                },
            ],
        )
        .with_replan(vec![PlanStep::of("worker", "try approach two")]),
    );
    let config = WorkflowConfig {
        stall_threshold: 2,
        max_replans: 1,
        ..WorkflowConfig::default()
    };
    let orchestrator =
        AdaptiveLoopOrchestrator::new(Arc::new(MemoryStore::new()), mock_agents(), host, config);
    let state = orchestrator
        .start("adaptive-replan", "solve the thing")
        .await
        .unwrap();
    assert_eq!(state.status, WorkflowStatus::Completed);
    assert_eq!(state.as_adaptive().unwrap().replan_count, 1);
    assert_eq!(
        orchestrator.get_answer("adaptive-replan").await.unwrap(),
        "scripted summary"
    );
}

#[tokio::test]
async fn command_against_unknown_instance_is_rejected() {
    let orchestrator = AdaptiveLoopOrchestrator::new(
        Arc::new(MemoryStore::new()),
        mock_agents(),
        Arc::new(ScriptedAdaptiveHost::new(
            vec![PlanStep::of("worker", "go")],
            vec![ProgressEvaluation::Complete {
                summary: "done".into(),
            }],
        )),
        WorkflowConfig::default(),
    );
    let err = orchestrator.get_state("never-started").await.unwrap_err();
    assert!(matches!(
        err,
        conductor_core::ConductorError::InstanceNotFound(_)
    ));
}

#[tokio::test]
async fn step_timeout_is_retried_then_succeeds_within_bounded_wall_clock() {
    tokio::time::pause();

    struct FlakyAgents {
        calls: std::sync::atomic::AtomicU32,
    }

    #[async_trait::async_trait]
    impl conductor_core::AgentInvoker for FlakyAgents {
        async fn agents_with_role(&self, _role: &str) -> Vec<String> {
            vec![]
        }

        async fn invoke(
            &self,
            agent_id: &str,
            request: conductor_core::AgentRequest,
        ) -> conductor_core::ConductorResult<conductor_core::AgentResponse> {
            let n = self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if n == 0 {
                // First call never resolves within the configured timeout.
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            Ok(conductor_core::AgentResponse {
                output: format!("{agent_id}: {}", request.instruction),
                data: serde_json::Value::Null,
            })
        }
    }

    let host = FixedSequentialHost {
        steps: vec![PlanStep::of("worker", "eventually succeeds")],
    };
    let config = WorkflowConfig {
        default_step_timeout: Duration::from_secs(1),
        default_step_retries: 1,
        ..WorkflowConfig::default()
    };
    let orchestrator = SequentialPlanOrchestrator::new(
        Arc::new(MemoryStore::new()),
        Arc::new(FlakyAgents {
            calls: std::sync::atomic::AtomicU32::new(0),
        }),
        Arc::new(host),
        config,
    );

    // With time paused, the runtime auto-advances the virtual clock to the
    // next pending timer once this task is the only thing left to run —
    // so the 1s step timeout fires, the retry's backoff sleep elapses,
    // and the second (fast) call completes, all without real wall-clock
    // delay.
    let state = orchestrator.start("seq-timeout", "flaky goal").await.unwrap();
    assert_eq!(state.status, WorkflowStatus::Completed);
}
