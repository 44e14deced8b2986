//! Per-instance progress broadcast, modeled directly on the
//! register/subscribe/broadcast shape used for tracking running work
//! elsewhere in this codebase: a bounded broadcast channel per instance,
//! silently dropped when nobody is listening.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::warn;

use crate::model::WorkflowStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkflowEvent {
    Status { status: WorkflowStatus },
    Turn { current: u32, max: u32 },
    Replan { count: u32 },
    HitlRequested { approval_id: String, context: String },
    HitlApproved { approval_id: String },
    Done { status: WorkflowStatus, error: Option<String> },
}

/// Owns the broadcast sender for one orchestrator. Cloning is cheap; the
/// sender is wrapped so construction failures (no receivers yet) never
/// propagate as errors to callers who only want to emit progress.
#[derive(Clone)]
pub struct EventHub {
    tx: broadcast::Sender<WorkflowEvent>,
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: WorkflowEvent) {
        if let Err(e) = self.tx.send(event) {
            warn!("no active subscribers for workflow event: {e}");
        }
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(512)
    }
}
