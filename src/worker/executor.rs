use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Map, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::config::RunnerConfig;
use crate::execution::{
    ExecutionEnvironment, ExecutionRecord, ExecutionStatus, ExecutionStore, GitSource,
};

const STDERR_PREFIX: &str = "[stderr] ";

/// Error recorded (and logged) for executions stopped by a cancel request.
pub const CANCELED_MESSAGE: &str = "Execution canceled";

/// How a run ended, before it is recorded in the store.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub status: ExecutionStatus,
    pub result: Option<Value>,
    pub error: Option<String>,
}

impl RunOutcome {
    pub fn completed(result: Value) -> Self {
        Self {
            status: ExecutionStatus::Completed,
            result: Some(result),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: ExecutionStatus::Failed,
            result: None,
            error: Some(error.into()),
        }
    }

    fn canceled() -> Self {
        Self {
            status: ExecutionStatus::Canceled,
            result: None,
            error: Some(CANCELED_MESSAGE.to_string()),
        }
    }

    fn timed_out(limit: Duration) -> Self {
        Self {
            status: ExecutionStatus::Timeout,
            result: None,
            error: Some(format!("Execution exceeded {:?} timeout", limit)),
        }
    }
}

/// Drives executions from queued to a terminal status.
///
/// Progress is reported only through [`ExecutionStore::update_status`] and
/// [`ExecutionStore::append_logs`]:
/// - `simulated`: emits a fixed sequence of log lines and completes
/// - `local`: clones the repository into its own workspace and runs the
///   entrypoint with `<shell> -c`, streaming stdout/stderr line by line
/// - `airflow`: no runner is available; the execution fails immediately
#[derive(Debug, Clone)]
pub struct ExecutionRunner {
    config: RunnerConfig,
    store: Arc<ExecutionStore>,
}

impl ExecutionRunner {
    pub fn new(config: RunnerConfig, store: Arc<ExecutionStore>) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Run one execution to completion and return the terminal status it was
    /// left in. Cancelling `cancel` or exceeding `timeout` stops the work and
    /// records `canceled` / `timeout`.
    pub async fn run(
        &self,
        record: ExecutionRecord,
        timeout: Option<Duration>,
        cancel: CancellationToken,
    ) -> ExecutionStatus {
        let execution_id = record.execution_id.clone();

        if cancel.is_cancelled() {
            return self.finish(&execution_id, RunOutcome::canceled());
        }

        if let Err(e) = self
            .store
            .update_status(&execution_id, ExecutionStatus::Running, None, None)
        {
            tracing::warn!(execution_id = %execution_id, error = %e, "Could not start execution");
            return self
                .store
                .get(&execution_id)
                .map(|r| r.status)
                .unwrap_or(ExecutionStatus::Failed);
        }

        tracing::info!(
            execution_id = %execution_id,
            environment = %record.environment,
            entrypoint = %record.entrypoint,
            timeout_secs = ?timeout.map(|t| t.as_secs()),
            "Executing"
        );

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => RunOutcome::canceled(),
            outcome = with_timeout(timeout, self.perform(&record)) => {
                match (outcome, timeout) {
                    (Some(outcome), _) => outcome,
                    (None, Some(limit)) => RunOutcome::timed_out(limit),
                    (None, None) => RunOutcome::failed("Execution aborted"),
                }
            }
        };

        // Dropping the work future above killed any child still using it
        if record.environment == ExecutionEnvironment::Local {
            self.remove_checkout(&execution_id).await;
        }

        self.finish(&execution_id, outcome)
    }

    async fn remove_checkout(&self, execution_id: &str) {
        let checkout = workspace_for(&self.config.workspace_root, execution_id);
        match tokio::fs::remove_dir_all(&checkout).await {
            Ok(()) => {
                tracing::debug!(execution_id, path = %checkout.display(), "Removed checkout")
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                execution_id,
                path = %checkout.display(),
                error = %e,
                "Failed to remove checkout"
            ),
        }
    }

    fn finish(&self, execution_id: &str, outcome: RunOutcome) -> ExecutionStatus {
        if let Some(error) = &outcome.error {
            if matches!(
                outcome.status,
                ExecutionStatus::Canceled | ExecutionStatus::Timeout
            ) {
                self.store.append_logs(execution_id, [error.clone()]);
            }
        }

        let status = outcome.status;
        match self
            .store
            .update_status(execution_id, status, outcome.result, outcome.error)
        {
            Ok(record) => {
                tracing::info!(execution_id, status = %record.status, "Execution finished");
                record.status
            }
            Err(e) => {
                tracing::error!(execution_id, error = %e, "Failed to record execution outcome");
                status
            }
        }
    }

    async fn perform(&self, record: &ExecutionRecord) -> RunOutcome {
        match record.environment {
            ExecutionEnvironment::Simulated => self.simulate(record).await,
            ExecutionEnvironment::Local => self.run_local(record).await,
            ExecutionEnvironment::Airflow => {
                tracing::warn!(
                    execution_id = %record.execution_id,
                    "No runner configured for the airflow environment"
                );
                RunOutcome::failed("environment `airflow` has no runner configured")
            }
        }
    }

    async fn simulate(&self, record: &ExecutionRecord) -> RunOutcome {
        let delay = Duration::from_millis(self.config.simulated_step_delay_ms);
        let git = &record.git;
        let mut source = git.repository_url.clone();
        if let Some(branch) = &git.branch {
            source.push_str(&format!(" (branch {})", branch));
        }

        let steps = [
            format!("Starting: {}", record.entrypoint),
            format!("Fetching {}", source),
            "Executing step 1".to_string(),
            "Executing step 2".to_string(),
        ];
        for line in steps {
            self.store.append_logs(&record.execution_id, [line]);
            tokio::time::sleep(delay).await;
        }

        if record
            .parameters
            .get("simulate_failure")
            .and_then(Value::as_bool)
            .unwrap_or(false)
        {
            self.store
                .append_logs(&record.execution_id, ["Simulated failure".to_string()]);
            return RunOutcome::failed("Simulated failure requested");
        }

        self.store
            .append_logs(&record.execution_id, ["Finished successfully".to_string()]);
        RunOutcome::completed(json!({
            "ok": true,
            "environment": record.environment,
            "entrypoint": record.entrypoint,
            "parameters": record.parameters,
        }))
    }

    async fn run_local(&self, record: &ExecutionRecord) -> RunOutcome {
        let id = &record.execution_id;
        let checkout = workspace_for(&self.config.workspace_root, id);

        if let Err(e) = tokio::fs::create_dir_all(&self.config.workspace_root).await {
            return RunOutcome::failed(format!("Cannot create workspace: {}", e));
        }

        self.store.append_logs(
            id,
            [format!("Cloning {} into {}", record.git.repository_url, checkout.display())],
        );
        let mut clone = Command::new(&self.config.git_binary);
        clone.args(clone_args(&record.git, &checkout));
        match self.run_streaming(id, clone).await {
            Ok(status) if status.success() => {}
            Ok(status) => return RunOutcome::failed(format!("git clone failed ({})", status)),
            Err(e) => return RunOutcome::failed(format!("Failed to run git: {}", e)),
        }

        if let Some(commit) = &record.git.commit_sha {
            let mut checkout_cmd = Command::new(&self.config.git_binary);
            checkout_cmd.args(checkout_args(&checkout, commit));
            match self.run_streaming(id, checkout_cmd).await {
                Ok(status) if status.success() => {}
                Ok(status) => {
                    return RunOutcome::failed(format!(
                        "git checkout {} failed ({})",
                        commit, status
                    ))
                }
                Err(e) => return RunOutcome::failed(format!("Failed to run git: {}", e)),
            }
        }

        let workdir = match &record.git.subpath {
            Some(subpath) => checkout.join(subpath),
            None => checkout,
        };
        self.run_entrypoint(id, &workdir, &record.entrypoint, &record.parameters)
            .await
    }

    /// Run `entrypoint` through the configured shell inside `workdir`.
    ///
    /// Parameters are exported as `PARAM_<KEY>` environment variables; string
    /// values verbatim, anything else as JSON.
    pub async fn run_entrypoint(
        &self,
        execution_id: &str,
        workdir: &Path,
        entrypoint: &str,
        parameters: &Map<String, Value>,
    ) -> RunOutcome {
        let mut command = Command::new(&self.config.shell);
        command
            .arg("-c")
            .arg(entrypoint)
            .current_dir(workdir)
            .env("EXECUTION_ID", execution_id)
            .envs(parameter_env(parameters));

        self.store
            .append_logs(execution_id, [format!("Starting: {}", entrypoint)]);

        match self.run_streaming(execution_id, command).await {
            Ok(status) if status.success() => RunOutcome::completed(json!({
                "ok": true,
                "exit_code": status.code(),
            })),
            Ok(status) => match status.code() {
                Some(code) => RunOutcome {
                    status: ExecutionStatus::Failed,
                    result: Some(json!({ "ok": false, "exit_code": code })),
                    error: Some(format!("Exit code: {}", code)),
                },
                None => RunOutcome::failed("Process terminated by signal"),
            },
            Err(e) => {
                tracing::error!(execution_id, error = %e, "Failed to spawn entrypoint");
                RunOutcome::failed(e.to_string())
            }
        }
    }

    /// Spawn `command` and copy its output into the execution's log buffer as
    /// it is produced. Dropping the returned future kills the child.
    async fn run_streaming(
        &self,
        execution_id: &str,
        mut command: Command,
    ) -> std::io::Result<ExitStatus> {
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn()?;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let (_, _, status) = tokio::join!(
            pump_lines(&self.store, execution_id, stdout, ""),
            pump_lines(&self.store, execution_id, stderr, STDERR_PREFIX),
            child.wait(),
        );
        status
    }
}

async fn pump_lines<R>(
    store: &ExecutionStore,
    execution_id: &str,
    reader: Option<R>,
    prefix: &str,
) where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return;
    };
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => store.append_logs(execution_id, [format!("{}{}", prefix, line)]),
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(execution_id, error = %e, "Stopped reading process output");
                break;
            }
        }
    }
}

async fn with_timeout<F>(limit: Option<Duration>, work: F) -> Option<F::Output>
where
    F: Future,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, work).await.ok(),
        None => Some(work.await),
    }
}

/// Arguments for `git` that fetch `git` into `dest`. A pinned commit needs
/// full history, so shallow clones are only used without one.
pub fn clone_args(git: &GitSource, dest: &Path) -> Vec<String> {
    let mut args = vec!["clone".to_string()];
    if git.commit_sha.is_none() {
        args.push("--depth=1".to_string());
    }
    if let Some(branch) = &git.branch {
        args.push("--branch".to_string());
        args.push(branch.clone());
    }
    args.push(git.repository_url.clone());
    args.push(dest.display().to_string());
    args
}

pub fn checkout_args(repo: &Path, commit: &str) -> Vec<String> {
    vec![
        "-C".to_string(),
        repo.display().to_string(),
        "checkout".to_string(),
        "--detach".to_string(),
        commit.to_string(),
    ]
}

pub fn parameter_env(parameters: &Map<String, Value>) -> Vec<(String, String)> {
    parameters
        .iter()
        .map(|(key, value)| {
            let name: String = key
                .chars()
                .map(|c| {
                    if c.is_ascii_alphanumeric() {
                        c.to_ascii_uppercase()
                    } else {
                        '_'
                    }
                })
                .collect();
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (format!("PARAM_{}", name), value)
        })
        .collect()
}

/// Per-execution workspace path under `root`.
pub fn workspace_for(root: &Path, execution_id: &str) -> PathBuf {
    root.join(execution_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shallow_clone_without_commit() {
        let git = GitSource::new("https://example.com/repo.git").with_branch("main");
        let args = clone_args(&git, Path::new("/tmp/ws/e1"));
        assert_eq!(
            args,
            vec![
                "clone",
                "--depth=1",
                "--branch",
                "main",
                "https://example.com/repo.git",
                "/tmp/ws/e1"
            ]
        );
    }

    #[test]
    fn full_clone_when_commit_pinned() {
        let mut git = GitSource::new("https://example.com/repo.git");
        git.commit_sha = Some("abc123".to_string());
        let args = clone_args(&git, Path::new("/tmp/ws/e1"));
        assert!(!args.iter().any(|a| a.starts_with("--depth")));
        assert!(!args.iter().any(|a| a == "--branch"));

        assert_eq!(
            checkout_args(Path::new("/tmp/ws/e1"), "abc123"),
            vec!["-C", "/tmp/ws/e1", "checkout", "--detach", "abc123"]
        );
    }

    #[test]
    fn parameters_become_env_vars() {
        let mut params = Map::new();
        params.insert("name".to_string(), json!("world"));
        params.insert("max-retries".to_string(), json!(3));
        params.insert("flags".to_string(), json!({"dry": true}));

        let mut env = parameter_env(&params);
        env.sort();
        assert_eq!(
            env,
            vec![
                ("PARAM_FLAGS".to_string(), "{\"dry\":true}".to_string()),
                ("PARAM_MAX_RETRIES".to_string(), "3".to_string()),
                ("PARAM_NAME".to_string(), "world".to_string()),
            ]
        );
    }

    #[test]
    fn workspace_is_per_execution() {
        assert_eq!(
            workspace_for(Path::new("/srv/ws"), "e42"),
            PathBuf::from("/srv/ws/e42")
        );
    }
}
