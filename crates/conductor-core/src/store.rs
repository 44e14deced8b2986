use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::ConductorResult;
use crate::model::HostState;

/// The durable persistence contract the substrate commits through before
/// any step's side effects run. A real deployment backs this with a
/// database (see `conductor-store-sqlite`); `MemoryStore` below is the
/// in-process implementation used by tests and by `conductor-cli`'s
/// ephemeral demo mode.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    async fn load(&self, instance_id: &str) -> ConductorResult<Option<HostState>>;
    async fn persist(&self, state: &HostState) -> ConductorResult<()>;

    /// Returns the previously recorded result for `(instance_id,
    /// command_name, payload_hash)`, if any, so a repeated command can be
    /// replayed instead of re-run.
    async fn idempotency_lookup(
        &self,
        instance_id: &str,
        command_name: &str,
        payload_hash: &str,
    ) -> ConductorResult<Option<serde_json::Value>>;

    async fn idempotency_record(
        &self,
        instance_id: &str,
        command_name: &str,
        payload_hash: &str,
        result: &serde_json::Value,
    ) -> ConductorResult<()>;
}

#[derive(Default)]
pub struct MemoryStore {
    states: Mutex<HashMap<String, HostState>>,
    idempotency: Mutex<HashMap<(String, String, String), serde_json::Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowStore for MemoryStore {
    async fn load(&self, instance_id: &str) -> ConductorResult<Option<HostState>> {
        let states = self.states.lock().expect("memory store mutex poisoned");
        Ok(states.get(instance_id).cloned())
    }

    async fn persist(&self, state: &HostState) -> ConductorResult<()> {
        let mut states = self.states.lock().expect("memory store mutex poisoned");
        states.insert(state.instance_id.clone(), state.clone());
        Ok(())
    }

    async fn idempotency_lookup(
        &self,
        instance_id: &str,
        command_name: &str,
        payload_hash: &str,
    ) -> ConductorResult<Option<serde_json::Value>> {
        let ledger = self.idempotency.lock().expect("idempotency mutex poisoned");
        Ok(ledger
            .get(&(
                instance_id.to_string(),
                command_name.to_string(),
                payload_hash.to_string(),
            ))
            .cloned())
    }

    async fn idempotency_record(
        &self,
        instance_id: &str,
        command_name: &str,
        payload_hash: &str,
        result: &serde_json::Value,
    ) -> ConductorResult<()> {
        let mut ledger = self.idempotency.lock().expect("idempotency mutex poisoned");
        ledger.insert(
            (
                instance_id.to_string(),
                command_name.to_string(),
                payload_hash.to_string(),
            ),
            result.clone(),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AdaptiveLoopState, StepName, StepQueue, WorkflowBody, WorkflowStatus};
    use chrono::Utc;

    fn sample_state(instance_id: &str) -> HostState {
        let now = Utc::now();
        HostState {
            instance_id: instance_id.to_string(),
            status: WorkflowStatus::Running,
            current_step: StepName::InnerLoop,
            body: WorkflowBody::Adaptive(AdaptiveLoopState {
                facts: serde_json::json!({}),
                plan: StepQueue::new(vec![]),
                turn_count: 0,
                stall_count: 0,
                replan_count: 0,
                pending_step: None,
                pending_approval: None,
                message_history: Vec::new(),
                agent_responses: HashMap::new(),
            }),
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn persist_then_load_round_trips() {
        let store = MemoryStore::new();
        let state = sample_state("wf-1");
        store.persist(&state).await.unwrap();
        let loaded = store.load("wf-1").await.unwrap().unwrap();
        assert_eq!(loaded.instance_id, "wf-1");
    }

    #[tokio::test]
    async fn idempotency_round_trips() {
        let store = MemoryStore::new();
        assert!(store
            .idempotency_lookup("wf-1", "approve", "hash-a")
            .await
            .unwrap()
            .is_none());
        store
            .idempotency_record("wf-1", "approve", "hash-a", &serde_json::json!({"ok": true}))
            .await
            .unwrap();
        let replayed = store
            .idempotency_lookup("wf-1", "approve", "hash-a")
            .await
            .unwrap();
        assert_eq!(replayed, Some(serde_json::json!({"ok": true})));
    }
}
