//! Durable wrapper around the chain engine.
//!
//! Every mutation saves the `phases_json` snapshot (upsert) and appends
//! the engine's events to `task_chain_events` in commit order. The
//! in-memory map is a cache; `resume` rehydrates from the snapshot after
//! a restart. The re-init escalation counter is persisted so the guard
//! survives restarts.

use crate::engine::{
    ChainError, ChainStatus, CompleteSubOutcome, EngineEvent, GateOutcome, GateResult, Phase,
    SubTaskSpec, TaskChain,
};
use crate::protocol::{build_protocol, validate_custom};
use mpm_db::{now_ms, DbPool};
use serde_json::json;
use sqlx::Row;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// One persisted event, as read back from the log.
#[derive(Debug, Clone)]
pub struct EventRow {
    pub id: i64,
    pub task_id: String,
    pub phase_id: String,
    pub sub_id: String,
    pub event_type: String,
    pub payload: String,
    pub created_at: i64,
}

pub struct ChainStore {
    pool: DbPool,
    chains: Mutex<HashMap<String, TaskChain>>,
    /// Serializes load-mutate-commit sequences; parallel tool calls may
    /// target the same task_id.
    op_lock: Mutex<()>,
}

impl ChainStore {
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            chains: Mutex::new(HashMap::new()),
            op_lock: Mutex::new(()),
        }
    }

    /// Initialize a chain. Re-initializing an existing `task_id` is
    /// allowed exactly once (`reinit_count` 0 -> 1); after that the call
    /// is refused until the user weighs in.
    pub async fn init(
        &self,
        task_id: &str,
        description: &str,
        protocol: &str,
        custom_phases: Option<Vec<Phase>>,
        input: &str,
    ) -> Result<TaskChain, ChainError> {
        let _guard = self.op_lock.lock().await;
        let existing = self.load(task_id).await?;
        let reinit_count = match &existing {
            None => 0,
            Some(chain) if chain.reinit_count == 0 => 1,
            Some(_) => return Err(ChainError::ReinitRefused(task_id.to_string())),
        };

        let phases = match custom_phases {
            Some(phases) => {
                validate_custom(&phases)?;
                phases
            }
            None => build_protocol(protocol, input)?,
        };

        let (mut chain, mut events) = TaskChain::init(task_id, description, protocol, phases)?;
        chain.reinit_count = reinit_count;
        if reinit_count > 0 {
            info!(task_id, reinit_count, "Re-initializing existing task chain");
            if let Some(init_event) = events.first_mut() {
                init_event.payload = json!({
                    "protocol": protocol,
                    "description": description,
                    "reinit_count": reinit_count,
                });
            }
        }

        self.persist(&chain, &events).await?;
        self.chains
            .lock()
            .await
            .insert(task_id.to_string(), chain.clone());
        Ok(chain)
    }

    /// Read the snapshot row, without touching the in-memory map.
    pub async fn load(&self, task_id: &str) -> Result<Option<TaskChain>, ChainError> {
        let row = sqlx::query(
            "SELECT task_id, description, protocol, status, phases_json, current_phase, reinit_count \
             FROM task_chains WHERE task_id = ?",
        )
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        let Some(row) = row else { return Ok(None) };

        let phases: Vec<Phase> = serde_json::from_str(row.get::<String, _>("phases_json").as_str())
            .map_err(|e| ChainError::InvalidProtocol(format!("corrupt phases_json: {}", e)))?;
        let status: ChainStatus =
            serde_json::from_value(json!(row.get::<String, _>("status")))
                .map_err(|e| ChainError::InvalidProtocol(format!("corrupt status: {}", e)))?;

        Ok(Some(TaskChain {
            task_id: row.get("task_id"),
            description: row.get("description"),
            protocol: row.get("protocol"),
            status,
            phases,
            current_phase: row.get("current_phase"),
            reinit_count: row.get::<i64, _>("reinit_count") as u32,
        }))
    }

    /// Rehydrate from the DB into the in-memory map (cross-session resume).
    pub async fn resume(&self, task_id: &str) -> Result<TaskChain, ChainError> {
        let chain = self
            .load(task_id)
            .await?
            .ok_or_else(|| ChainError::ChainNotFound(task_id.to_string()))?;
        self.chains
            .lock()
            .await
            .insert(task_id.to_string(), chain.clone());
        debug!(task_id, "Resumed task chain from snapshot");
        Ok(chain)
    }

    async fn get_or_load(&self, task_id: &str) -> Result<TaskChain, ChainError> {
        if let Some(chain) = self.chains.lock().await.get(task_id) {
            return Ok(chain.clone());
        }
        self.load(task_id)
            .await?
            .ok_or_else(|| ChainError::ChainNotFound(task_id.to_string()))
    }

    async fn commit(
        &self,
        chain: TaskChain,
        events: &[EngineEvent],
    ) -> Result<(), ChainError> {
        self.persist(&chain, events).await?;
        self.chains
            .lock()
            .await
            .insert(chain.task_id.clone(), chain);
        Ok(())
    }

    pub async fn start_phase(&self, task_id: &str, phase_id: &str) -> Result<TaskChain, ChainError> {
        let _guard = self.op_lock.lock().await;
        let mut chain = self.get_or_load(task_id).await?;
        let events = chain.start_phase(phase_id)?;
        self.commit(chain.clone(), &events).await?;
        Ok(chain)
    }

    pub async fn complete_execute(
        &self,
        task_id: &str,
        phase_id: &str,
        summary: &str,
    ) -> Result<(TaskChain, String), ChainError> {
        let _guard = self.op_lock.lock().await;
        let mut chain = self.get_or_load(task_id).await?;
        let (next, events) = chain.complete_execute(phase_id, summary)?;
        self.commit(chain.clone(), &events).await?;
        Ok((chain, next))
    }

    pub async fn complete_gate(
        &self,
        task_id: &str,
        phase_id: &str,
        result: GateResult,
        summary: &str,
    ) -> Result<(TaskChain, GateOutcome), ChainError> {
        let _guard = self.op_lock.lock().await;
        let mut chain = self.get_or_load(task_id).await?;
        let (outcome, events) = chain.complete_gate(phase_id, result, summary)?;
        // Exhaustion is persisted (the chain is failed on disk) before the
        // terminal error surfaces to the caller.
        self.commit(chain.clone(), &events).await?;
        Ok((chain, outcome))
    }

    pub async fn spawn_sub_tasks(
        &self,
        task_id: &str,
        phase_id: &str,
        specs: Vec<SubTaskSpec>,
    ) -> Result<(TaskChain, Vec<String>), ChainError> {
        let _guard = self.op_lock.lock().await;
        let mut chain = self.get_or_load(task_id).await?;
        let (ids, events) = chain.spawn_sub_tasks(phase_id, specs)?;
        self.commit(chain.clone(), &events).await?;
        Ok((chain, ids))
    }

    pub async fn start_sub_task(
        &self,
        task_id: &str,
        phase_id: &str,
        sub_id: &str,
    ) -> Result<TaskChain, ChainError> {
        let _guard = self.op_lock.lock().await;
        let mut chain = self.get_or_load(task_id).await?;
        let events = chain.start_sub_task(phase_id, sub_id)?;
        self.commit(chain.clone(), &events).await?;
        Ok(chain)
    }

    pub async fn complete_sub_task(
        &self,
        task_id: &str,
        phase_id: &str,
        sub_id: &str,
        result: GateResult,
        summary: &str,
    ) -> Result<(TaskChain, CompleteSubOutcome), ChainError> {
        let _guard = self.op_lock.lock().await;
        let mut chain = self.get_or_load(task_id).await?;
        let (outcome, events) = chain.complete_sub_task(phase_id, sub_id, result, summary)?;
        self.commit(chain.clone(), &events).await?;
        Ok((chain, outcome))
    }

    pub async fn finish(&self, task_id: &str) -> Result<TaskChain, ChainError> {
        let _guard = self.op_lock.lock().await;
        let mut chain = self.get_or_load(task_id).await?;
        let events = chain.finish();
        self.commit(chain.clone(), &events).await?;
        Ok(chain)
    }

    /// Status JSON for the `task_chain(status)` tool mode.
    pub async fn status(&self, task_id: &str) -> Result<serde_json::Value, ChainError> {
        let chain = self.get_or_load(task_id).await?;
        Ok(status_view(&chain))
    }

    /// Full event log for a chain, in append order.
    pub async fn events(&self, task_id: &str) -> Result<Vec<EventRow>, ChainError> {
        let rows = sqlx::query(
            "SELECT id, task_id, phase_id, sub_id, event_type, payload, created_at \
             FROM task_chain_events WHERE task_id = ? ORDER BY id",
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(rows
            .into_iter()
            .map(|row| EventRow {
                id: row.get("id"),
                task_id: row.get("task_id"),
                phase_id: row.get("phase_id"),
                sub_id: row.get("sub_id"),
                event_type: row.get("event_type"),
                payload: row.get("payload"),
                created_at: row.get("created_at"),
            })
            .collect())
    }

    /// Drop the in-memory cache (tests exercise cross-session resume).
    pub async fn clear_cache(&self) {
        self.chains.lock().await.clear();
    }

    async fn persist(&self, chain: &TaskChain, events: &[EngineEvent]) -> Result<(), ChainError> {
        let phases_json = serde_json::to_string(&chain.phases)
            .map_err(|e| ChainError::InvalidProtocol(format!("serialize phases: {}", e)))?;
        let now = now_ms();

        let mut tx = self.pool.begin().await.map_err(storage_err)?;

        sqlx::query(
            "INSERT INTO task_chains \
             (task_id, description, protocol, status, phases_json, current_phase, reinit_count, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(task_id) DO UPDATE SET \
               description = excluded.description, \
               protocol = excluded.protocol, \
               status = excluded.status, \
               phases_json = excluded.phases_json, \
               current_phase = excluded.current_phase, \
               reinit_count = excluded.reinit_count, \
               updated_at = excluded.updated_at",
        )
        .bind(&chain.task_id)
        .bind(&chain.description)
        .bind(&chain.protocol)
        .bind(chain.status.to_string())
        .bind(&phases_json)
        .bind(&chain.current_phase)
        .bind(chain.reinit_count as i64)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(storage_err)?;

        for event in events {
            sqlx::query(
                "INSERT INTO task_chain_events (task_id, phase_id, sub_id, event_type, payload, created_at) \
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&chain.task_id)
            .bind(&event.phase_id)
            .bind(&event.sub_id)
            .bind(event.event_type.as_str())
            .bind(event.payload.to_string())
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;
        }

        tx.commit().await.map_err(storage_err)?;
        Ok(())
    }
}

/// Serializable status summary used by the `status` and `resume` modes.
pub fn status_view(chain: &TaskChain) -> serde_json::Value {
    json!({
        "task_id": chain.task_id,
        "description": chain.description,
        "protocol": chain.protocol,
        "status": chain.status,
        "current_phase": chain.current_phase,
        "reinit_count": chain.reinit_count,
        "finished": chain.is_finished(),
        "phases": chain.phases.iter().map(|p| json!({
            "id": p.id,
            "name": p.name,
            "type": p.phase_type,
            "status": p.status,
            "summary": p.summary,
            "retry_count": p.retry_count,
            "max_retries": p.max_retries,
            "sub_tasks": p.sub_tasks.iter().map(|s| json!({
                "id": s.id,
                "name": s.name,
                "status": s.status,
                "summary": s.summary,
            })).collect::<Vec<_>>(),
        })).collect::<Vec<_>>(),
    })
}

fn storage_err(e: sqlx::Error) -> ChainError {
    ChainError::Storage(e.to_string())
}
