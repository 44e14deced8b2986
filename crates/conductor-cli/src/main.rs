//! Small demo binary exercising the orchestration core end to end: a
//! fixed-plan host plus an echoing agent registry, driven through the
//! `start`/`approve`/`resume`/`stop`/`get-state` command surface against
//! a durable SQLite store.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use conductor_core::model::{HostState, PlanStep, SequentialPlanState};
use conductor_core::test_support::mock_agents;
use conductor_core::{ConductorError, ConductorResult, SequentialPlanOrchestrator, WorkflowConfig};
use conductor_store_sqlite::SqliteStore;

#[derive(Parser)]
#[command(name = "conductor", version, about = "Durable multi-agent orchestration demo CLI")]
struct Cli {
    #[arg(long, env = "CONDUCTOR_DB", default_value = "sqlite://conductor.db?mode=rwc")]
    database_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start a new sequential-plan instance. Each `--step agent=instruction`
    /// becomes one plan step; prefix an instruction with `approve:` to
    /// require human approval before that step runs.
    Start {
        instance_id: String,
        #[arg(long)]
        goal: String,
        #[arg(long = "step")]
        steps: Vec<String>,
    },
    Approve {
        instance_id: String,
        approval_id: String,
        #[arg(long)]
        reject: bool,
    },
    Resume {
        instance_id: String,
        message: String,
    },
    Stop {
        instance_id: String,
        reason: String,
    },
    GetState {
        instance_id: String,
    },
}

/// A plan fixed at `start` time. Later commands (approve/resume/stop/
/// get-state) reconstruct this host with an empty plan since `create_plan`
/// only runs once, at `start`, and every other orchestrator method works
/// purely off the persisted `HostState`.
struct DemoHost {
    steps: Vec<PlanStep>,
}

#[async_trait]
impl conductor_core::SequentialHost for DemoHost {
    async fn create_plan(&self, _goal: &str) -> ConductorResult<Vec<PlanStep>> {
        Ok(self.steps.clone())
    }

    async fn summarize(&self, state: &SequentialPlanState) -> ConductorResult<String> {
        Ok(format!("completed {} of the plan's steps", state.completed_steps.len()))
    }

    async fn handle_failure(&self, _state: &SequentialPlanState, error: &ConductorError) -> ConductorResult<()> {
        tracing::warn!(%error, "plan step failed");
        Ok(())
    }

    async fn needs_approval(&self, step: &PlanStep) -> bool {
        matches!(step, PlanStep::Sequential { instruction, .. } if instruction.starts_with("approve:"))
    }
}

fn parse_steps(raw: &[String]) -> Result<Vec<PlanStep>> {
    raw.iter()
        .map(|s| {
            let (agent_id, instruction) = s
                .split_once('=')
                .context("step must be formatted as agent=instruction")?;
            Ok(PlanStep::of(agent_id, instruction))
        })
        .collect()
}

fn print_state(state: &HostState) {
    println!("{}", serde_json::to_string_pretty(state).expect("HostState always serializes"));
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let store = Arc::new(
        SqliteStore::connect(&cli.database_url)
            .await
            .context("connecting to the conductor database")?,
    );

    match cli.command {
        Command::Start { instance_id, goal, steps } => {
            let plan = parse_steps(&steps)?;
            let orchestrator = SequentialPlanOrchestrator::new(
                store,
                mock_agents(),
                Arc::new(DemoHost { steps: plan }),
                WorkflowConfig::default(),
            );
            let state = orchestrator.start(instance_id, goal).await?;
            print_state(&state);
        }
        Command::Approve { instance_id, approval_id, reject } => {
            let orchestrator = SequentialPlanOrchestrator::new(
                store,
                mock_agents(),
                Arc::new(DemoHost { steps: vec![] }),
                WorkflowConfig::default(),
            );
            let state = orchestrator
                .approve(&instance_id, &approval_id, !reject)
                .await?;
            print_state(&state);
        }
        Command::Resume { instance_id, message } => {
            let orchestrator = SequentialPlanOrchestrator::new(
                store,
                mock_agents(),
                Arc::new(DemoHost { steps: vec![] }),
                WorkflowConfig::default(),
            );
            let state = orchestrator.resume(&instance_id, &message).await?;
            print_state(&state);
        }
        Command::Stop { instance_id, reason } => {
            let orchestrator = SequentialPlanOrchestrator::new(
                store,
                mock_agents(),
                Arc::new(DemoHost { steps: vec![] }),
                WorkflowConfig::default(),
            );
            let state = orchestrator.stop(&instance_id, &reason).await?;
            print_state(&state);
        }
        Command::GetState { instance_id } => {
            let orchestrator = SequentialPlanOrchestrator::new(
                store,
                mock_agents(),
                Arc::new(DemoHost { steps: vec![] }),
                WorkflowConfig::default(),
            );
            let state = orchestrator.get_state(&instance_id).await?;
            print_state(&state);
        }
    }

    Ok(())
}
