use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::ServiceConfig;
use crate::error::{ExecutionError, Result};
use crate::execution::{
    ExecutionRecord, ExecutionRequest, ExecutionStats, ExecutionStatus, ExecutionStore, LogPage,
};
use crate::worker::{ExecutionRunner, CANCELED_MESSAGE};

/// Owns the store and the runner, and tracks the executions still in flight.
///
/// Constructed once per process (or per test) and shared behind an `Arc`.
/// Submitting hands each execution to its own tokio task; every task's
/// cancellation token is a child of the service's shutdown token, so shutting
/// down cancels whatever is still running.
pub struct ExecutionService {
    config: ServiceConfig,
    store: Arc<ExecutionStore>,
    runner: ExecutionRunner,
    in_flight: Arc<Mutex<HashMap<String, CancellationToken>>>,
    shutdown: CancellationToken,
    started_at: Instant,
}

impl ExecutionService {
    pub fn new(config: ServiceConfig) -> Self {
        Self::with_shutdown(config, CancellationToken::new())
    }

    pub fn with_shutdown(config: ServiceConfig, shutdown: CancellationToken) -> Self {
        let store = Arc::new(ExecutionStore::with_policy(config.transition_policy));
        let runner = ExecutionRunner::new(config.runner.clone(), store.clone());

        Self {
            config,
            store,
            runner,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            shutdown,
            started_at: Instant::now(),
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<ExecutionStore> {
        &self.store
    }

    /// Accept a request: assign an id, record it as queued and start running
    /// it in the background on the current tokio runtime.
    pub fn submit(&self, request: ExecutionRequest) -> Result<ExecutionRecord> {
        request.validate()?;
        let runtime = Handle::try_current().map_err(|e| {
            ExecutionError::Internal(format!("no runtime to run the execution on: {}", e))
        })?;

        let execution_id = Uuid::new_v4().to_string();
        let record = self
            .store
            .create(execution_id.clone(), request.to_new_execution())?;

        let timeout = self.config.runner.timeout_for(request.timeout_seconds);
        let token = self.shutdown.child_token();
        self.in_flight
            .lock()
            .insert(execution_id.clone(), token.clone());

        tracing::info!(
            execution_id = %execution_id,
            environment = %record.environment,
            correlation_id = ?record.correlation_id,
            "Execution submitted"
        );

        let runner = self.runner.clone();
        let in_flight = self.in_flight.clone();
        let task_record = record.clone();
        runtime.spawn(async move {
            runner.run(task_record, timeout, token).await;
            in_flight.lock().remove(&execution_id);
        });

        Ok(record)
    }

    pub fn get(&self, execution_id: &str) -> Result<ExecutionRecord> {
        self.store.get(execution_id)
    }

    pub fn list(&self, limit: usize, status: Option<ExecutionStatus>) -> Vec<ExecutionRecord> {
        self.store.list(limit, status)
    }

    pub fn logs(&self, execution_id: &str, offset: usize, limit: usize) -> Result<LogPage> {
        self.store.read_logs(execution_id, offset, limit)
    }

    /// Request cancellation. Terminal executions are returned unchanged; a
    /// running one is stopped by its runner shortly after, so the returned
    /// record may still show it as running.
    pub fn cancel(&self, execution_id: &str) -> Result<ExecutionRecord> {
        let token = self.in_flight.lock().get(execution_id).cloned();
        match token {
            Some(token) => {
                tracing::info!(execution_id, "Cancellation requested");
                token.cancel();
                self.store.get(execution_id)
            }
            // No runner owns it: cancel in the store, which leaves a record
            // that finished in the meantime untouched
            None => {
                let record = self
                    .store
                    .cancel_if_active(execution_id, CANCELED_MESSAGE)?;
                tracing::debug!(
                    execution_id,
                    status = %record.status,
                    "Cancel applied without a runner"
                );
                Ok(record)
            }
        }
    }

    pub fn stats(&self) -> ExecutionStats {
        self.store.stats()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().len()
    }

    pub fn uptime_seconds(&self) -> f64 {
        self.started_at.elapsed().as_secs_f64()
    }

    /// Cancel every execution that is still running.
    pub fn shutdown(&self) {
        tracing::info!(in_flight = self.in_flight(), "Cancelling in-flight executions");
        self.shutdown.cancel();
    }
}
