//! A durable, SQLite-backed implementation of `conductor_core::WorkflowStore`.
//!
//! Grounded on the same `sqlx::SqlitePool` + hand-rolled migration SQL
//! pattern used for this codebase's other SQLite-backed persistence, with
//! the optimistic-concurrency version column borrowed from its ETag
//! service: every `persist` increments `version` via an upsert rather than
//! a read-modify-write, since the substrate already serializes writes per
//! instance and the version column exists for observability and future
//! cross-process conflict detection, not as a lock this crate enforces.

use async_trait::async_trait;
use conductor_core::error::{ConductorError, ConductorResult};
use conductor_core::model::{HostState, WorkflowStatus};
use conductor_core::store::WorkflowStore;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl From<StoreError> for ConductorError {
    fn from(e: StoreError) -> Self {
        ConductorError::Storage(e.to_string())
    }
}

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn status_label(status: WorkflowStatus) -> &'static str {
        match status {
            WorkflowStatus::Running => "running",
            WorkflowStatus::AwaitingApproval => "awaiting_approval",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Failed => "failed",
            WorkflowStatus::Stopped => "stopped",
        }
    }
}

#[derive(sqlx::FromRow)]
struct StateRow {
    state_json: String,
}

#[derive(sqlx::FromRow)]
struct ResultRow {
    result_json: String,
}

#[async_trait]
impl WorkflowStore for SqliteStore {
    async fn load(&self, instance_id: &str) -> ConductorResult<Option<HostState>> {
        let row = sqlx::query_as::<_, StateRow>(
            "SELECT state_json FROM workflow_instances WHERE instance_id = ?",
        )
        .bind(instance_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from)?;
        match row {
            Some(row) => {
                let state: HostState =
                    serde_json::from_str(&row.state_json).map_err(StoreError::from)?;
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }

    async fn persist(&self, state: &HostState) -> ConductorResult<()> {
        let body = serde_json::to_string(state).map_err(StoreError::from)?;
        let status = Self::status_label(state.status);
        sqlx::query(
            "INSERT INTO workflow_instances (instance_id, status, state_json, version, created_at, updated_at)
             VALUES (?, ?, ?, 1, ?, ?)
             ON CONFLICT(instance_id) DO UPDATE SET
                status = excluded.status,
                state_json = excluded.state_json,
                version = workflow_instances.version + 1,
                updated_at = excluded.updated_at",
        )
        .bind(&state.instance_id)
        .bind(status)
        .bind(&body)
        .bind(state.created_at.to_rfc3339())
        .bind(state.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(())
    }

    async fn idempotency_lookup(
        &self,
        instance_id: &str,
        command_name: &str,
        payload_hash: &str,
    ) -> ConductorResult<Option<serde_json::Value>> {
        let row = sqlx::query_as::<_, ResultRow>(
            "SELECT result_json FROM idempotency_ledger
             WHERE instance_id = ? AND command_name = ? AND payload_hash = ?",
        )
        .bind(instance_id)
        .bind(command_name)
        .bind(payload_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from)?;
        match row {
            Some(row) => Ok(Some(
                serde_json::from_str(&row.result_json).map_err(StoreError::from)?,
            )),
            None => Ok(None),
        }
    }

    async fn idempotency_record(
        &self,
        instance_id: &str,
        command_name: &str,
        payload_hash: &str,
        result: &serde_json::Value,
    ) -> ConductorResult<()> {
        let json = serde_json::to_string(result).map_err(StoreError::from)?;
        sqlx::query(
            "INSERT INTO idempotency_ledger (instance_id, command_name, payload_hash, result_json)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(instance_id, command_name, payload_hash) DO NOTHING",
        )
        .bind(instance_id)
        .bind(command_name)
        .bind(payload_hash)
        .bind(&json)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(())
    }
}
