use std::collections::HashMap;

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ExecutionError, Result};
use crate::execution::logs::{LogBuffer, LogPage};
use crate::execution::record::{ExecutionRecord, ExecutionStatus, NewExecution};
use crate::execution::transition::TransitionPolicy;

/// Record and log buffer of one execution. Kept together so they are
/// created, and found, atomically.
#[derive(Debug)]
struct Entry {
    record: ExecutionRecord,
    logs: LogBuffer,
}

#[derive(Debug, Default)]
struct Ledger {
    entries: HashMap<String, Entry>,
    /// Ids in the order `create` admitted them.
    created_order: Vec<String>,
}

/// Counts of executions per status at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionStats {
    pub total: usize,
    pub queued: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub canceled: usize,
    pub timeout: usize,
}

impl ExecutionStats {
    pub fn count(&self, status: ExecutionStatus) -> usize {
        match status {
            ExecutionStatus::Queued => self.queued,
            ExecutionStatus::Running => self.running,
            ExecutionStatus::Completed => self.completed,
            ExecutionStatus::Failed => self.failed,
            ExecutionStatus::Canceled => self.canceled,
            ExecutionStatus::Timeout => self.timeout,
        }
    }

    fn observe(&mut self, status: ExecutionStatus) {
        self.total += 1;
        let slot = match status {
            ExecutionStatus::Queued => &mut self.queued,
            ExecutionStatus::Running => &mut self.running,
            ExecutionStatus::Completed => &mut self.completed,
            ExecutionStatus::Failed => &mut self.failed,
            ExecutionStatus::Canceled => &mut self.canceled,
            ExecutionStatus::Timeout => &mut self.timeout,
        };
        *slot += 1;
    }
}

/// In-memory ledger of executions and their logs.
///
/// Every operation runs as one short critical section under a single lock:
/// mutations hold it exclusively, lookups and aggregates share it. Callers
/// always receive copies, so a returned record never changes underneath them.
#[derive(Debug, Default)]
pub struct ExecutionStore {
    ledger: RwLock<Ledger>,
    policy: TransitionPolicy,
}

impl ExecutionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: TransitionPolicy) -> Self {
        Self {
            ledger: RwLock::new(Ledger::default()),
            policy,
        }
    }

    pub fn policy(&self) -> TransitionPolicy {
        self.policy
    }

    /// Insert a queued execution with an empty log buffer.
    pub fn create(
        &self,
        execution_id: impl Into<String>,
        new: NewExecution,
    ) -> Result<ExecutionRecord> {
        let execution_id = execution_id.into();
        let mut ledger = self.ledger.write();

        if ledger.entries.contains_key(&execution_id) {
            return Err(ExecutionError::DuplicateId(execution_id));
        }

        let record = ExecutionRecord::new(execution_id.clone(), new, Utc::now());
        ledger.entries.insert(
            execution_id.clone(),
            Entry {
                record: record.clone(),
                logs: LogBuffer::new(),
            },
        );
        ledger.created_order.push(execution_id);

        tracing::debug!(
            execution_id = %record.execution_id,
            environment = %record.environment,
            "Execution created"
        );
        Ok(record)
    }

    /// Get an execution by ID
    pub fn get(&self, execution_id: &str) -> Result<ExecutionRecord> {
        self.ledger
            .read()
            .entries
            .get(execution_id)
            .map(|entry| entry.record.clone())
            .ok_or_else(|| ExecutionError::NotFound(execution_id.to_string()))
    }

    /// Set the status, and `result` / `error` when given. Omitted values keep
    /// whatever was recorded before.
    pub fn update_status(
        &self,
        execution_id: &str,
        status: ExecutionStatus,
        result: Option<Value>,
        error: Option<String>,
    ) -> Result<ExecutionRecord> {
        let mut ledger = self.ledger.write();
        let entry = ledger
            .entries
            .get_mut(execution_id)
            .ok_or_else(|| ExecutionError::NotFound(execution_id.to_string()))?;
        let record = &mut entry.record;

        if !self.policy.permits(record.status, status) {
            return Err(ExecutionError::InvalidTransition {
                id: execution_id.to_string(),
                from: record.status,
                to: status,
            });
        }

        let previous = record.status;
        record.status = status;
        if result.is_some() {
            record.result = result;
        }
        if error.is_some() {
            record.error = error;
        }
        // updated_at never moves backwards, even if the wall clock does
        record.updated_at = Utc::now().max(record.updated_at);

        tracing::debug!(
            execution_id,
            from = %previous,
            to = %status,
            "Execution status updated"
        );
        Ok(record.clone())
    }

    /// Mark an execution `canceled` unless it already reached a terminal
    /// status, in which case the record is returned unchanged. The check and
    /// the write happen under one write lock.
    pub fn cancel_if_active(&self, execution_id: &str, error: &str) -> Result<ExecutionRecord> {
        let mut ledger = self.ledger.write();
        let entry = ledger
            .entries
            .get_mut(execution_id)
            .ok_or_else(|| ExecutionError::NotFound(execution_id.to_string()))?;
        let record = &mut entry.record;

        if record.is_terminal() {
            return Ok(record.clone());
        }

        let previous = record.status;
        record.status = ExecutionStatus::Canceled;
        record.error = Some(error.to_string());
        record.updated_at = Utc::now().max(record.updated_at);
        entry.logs.append([error.to_string()]);

        tracing::debug!(execution_id, from = %previous, "Execution canceled");
        Ok(record.clone())
    }

    /// Append lines to an execution's log buffer, preserving their order.
    ///
    /// Lines for an unknown execution are dropped: log producers may race
    /// ahead of record creation and must not fail because of it.
    pub fn append_logs<I>(&self, execution_id: &str, lines: I)
    where
        I: IntoIterator<Item = String>,
    {
        let mut ledger = self.ledger.write();
        match ledger.entries.get_mut(execution_id) {
            Some(entry) => entry.logs.append(lines),
            None => {
                tracing::warn!(execution_id, "Dropping log lines for unknown execution");
            }
        }
    }

    /// Read up to `limit` log lines starting at `offset`.
    pub fn read_logs(&self, execution_id: &str, offset: usize, limit: usize) -> Result<LogPage> {
        let ledger = self.ledger.read();
        let entry = ledger
            .entries
            .get(execution_id)
            .ok_or_else(|| ExecutionError::NotFound(execution_id.to_string()))?;
        Ok(entry.logs.page(offset, limit, entry.record.status))
    }

    /// Most recent executions, newest first.
    ///
    /// `limit` is applied to the creation-order tail *before* the status
    /// filter, so a filtered listing may return fewer than `limit` records even
    /// when older matches exist.
    pub fn list(&self, limit: usize, status: Option<ExecutionStatus>) -> Vec<ExecutionRecord> {
        let ledger = self.ledger.read();
        let start = ledger.created_order.len().saturating_sub(limit);

        let mut records: Vec<ExecutionRecord> = ledger.created_order[start..]
            .iter()
            .rev()
            .filter_map(|id| ledger.entries.get(id))
            .map(|entry| &entry.record)
            .filter(|record| status.map_or(true, |s| record.status == s))
            .cloned()
            .collect();
        drop(ledger);

        // stable: equal timestamps keep newest-created first
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records
    }

    pub fn stats(&self) -> ExecutionStats {
        let ledger = self.ledger.read();
        let mut stats = ExecutionStats::default();
        for entry in ledger.entries.values() {
            stats.observe(entry.record.status);
        }
        stats
    }

    /// Number of executions ever created
    pub fn len(&self) -> usize {
        self.ledger.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ledger.read().entries.is_empty()
    }
}
