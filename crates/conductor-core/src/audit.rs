//! Emits the fixed-prefix audit lines a host can tail and parse without a
//! schema: `TASK_LEDGER:`, `UPDATED_TASK_LEDGER:`, `ORCHESTRATOR:`,
//! `<agentId>:`, `COMPLETE:`, `SATISFIED:`, `FAILED:`, `FINAL:`,
//! `HITL_REQUEST:`, `HITL_APPROVED:`, `COST:`.

use tracing::{info, warn};

/// Each method both logs through `tracing` and returns the formatted line
/// verbatim, so a caller can also append it to a persisted
/// `messageHistory` without reformatting the prefix twice.
pub struct AuditLog;

impl AuditLog {
    pub fn task_ledger(content: &str) -> String {
        let line = format!("TASK_LEDGER: {content}");
        info!(target: "conductor::audit", "{line}");
        line
    }

    pub fn updated_task_ledger(content: &str) -> String {
        let line = format!("UPDATED_TASK_LEDGER: {content}");
        info!(target: "conductor::audit", "{line}");
        line
    }

    pub fn orchestrator(content: &str) -> String {
        let line = format!("ORCHESTRATOR: {content}");
        info!(target: "conductor::audit", "{line}");
        line
    }

    pub fn agent(agent_id: &str, content: &str) -> String {
        let line = format!("{agent_id}: {content}");
        info!(target: "conductor::audit", "{line}");
        line
    }

    pub fn complete(content: &str) -> String {
        let line = format!("COMPLETE: {content}");
        info!(target: "conductor::audit", "{line}");
        line
    }

    pub fn satisfied(content: &str) -> String {
        let line = format!("SATISFIED: {content}");
        info!(target: "conductor::audit", "{line}");
        line
    }

    pub fn failed(content: &str) -> String {
        let line = format!("FAILED: {content}");
        warn!(target: "conductor::audit", "{line}");
        line
    }

    pub fn final_summary(content: &str) -> String {
        let line = format!("FINAL: {content}");
        info!(target: "conductor::audit", "{line}");
        line
    }

    pub fn hitl_request(content: &str) -> String {
        let line = format!("HITL_REQUEST: {content}");
        info!(target: "conductor::audit", "{line}");
        line
    }

    pub fn hitl_approved(content: &str) -> String {
        let line = format!("HITL_APPROVED: {content}");
        info!(target: "conductor::audit", "{line}");
        line
    }

    pub fn cost(content: &str) -> String {
        let line = format!("COST: {content}");
        info!(target: "conductor::audit", "{line}");
        line
    }
}
