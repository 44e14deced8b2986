pub mod adaptive;
pub mod audit;
pub mod cancellation;
pub mod config;
pub mod error;
pub mod events;
pub mod hosts;
pub mod model;
pub mod parallel;
pub mod registry;
pub mod retry;
pub mod sequential;
pub mod step_exec;
pub mod store;

pub mod test_support;

pub use adaptive::AdaptiveLoopOrchestrator;
pub use cancellation::CancellationRegistry;
pub use config::WorkflowConfig;
pub use error::{ConductorError, ConductorResult, ErrorKind};
pub use events::{EventHub, WorkflowEvent};
pub use hosts::{AdaptiveHost, SequentialHost};
pub use model::{
    AdaptiveLoopState, HostState, PendingApproval, PlanStep, ProgressEvaluation,
    SequentialPlanState, StepName, StepQueue, WorkflowBody, WorkflowStatus,
};
pub use registry::{AgentInvoker, AgentRequest, AgentResponse};
pub use sequential::SequentialPlanOrchestrator;
pub use store::{MemoryStore, WorkflowStore};
