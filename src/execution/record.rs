use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ExecutionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Canceled,
    Timeout,
}

impl ExecutionStatus {
    pub const ALL: [ExecutionStatus; 6] = [
        ExecutionStatus::Queued,
        ExecutionStatus::Running,
        ExecutionStatus::Completed,
        ExecutionStatus::Failed,
        ExecutionStatus::Canceled,
        ExecutionStatus::Timeout,
    ];

    /// Terminal executions produce no further progress or log lines.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed
                | ExecutionStatus::Failed
                | ExecutionStatus::Canceled
                | ExecutionStatus::Timeout
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionStatus::Queued => "queued",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Canceled => "canceled",
            ExecutionStatus::Timeout => "timeout",
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = ExecutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ExecutionStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ExecutionError::InvalidRequest(format!("unknown status `{}`", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionEnvironment {
    Local,
    Airflow,
    #[default]
    Simulated,
}

impl std::fmt::Display for ExecutionEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionEnvironment::Local => write!(f, "local"),
            ExecutionEnvironment::Airflow => write!(f, "airflow"),
            ExecutionEnvironment::Simulated => write!(f, "simulated"),
        }
    }
}

/// Where the code for an execution comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitSource {
    pub repository_url: String,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub commit_sha: Option<String>,
    /// Folder inside the repository the entrypoint is resolved against.
    #[serde(default)]
    pub subpath: Option<String>,
}

impl GitSource {
    pub fn new(repository_url: impl Into<String>) -> Self {
        Self {
            repository_url: repository_url.into(),
            branch: None,
            commit_sha: None,
            subpath: None,
        }
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    pub fn with_subpath(mut self, subpath: impl Into<String>) -> Self {
        self.subpath = Some(subpath.into());
        self
    }

    /// Accepts `http://` and `https://` URLs that name a host.
    pub fn validate(&self) -> Result<(), ExecutionError> {
        let rest = self
            .repository_url
            .strip_prefix("https://")
            .or_else(|| self.repository_url.strip_prefix("http://"))
            .ok_or_else(|| {
                ExecutionError::InvalidRequest(format!(
                    "repository_url must be an http(s) URL, got `{}`",
                    self.repository_url
                ))
            })?;
        let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
        if host.is_empty() || host.chars().any(char::is_whitespace) {
            return Err(ExecutionError::InvalidRequest(format!(
                "repository_url has no valid host: `{}`",
                self.repository_url
            )));
        }
        Ok(())
    }
}

/// Immutable inputs of an execution, as handed to the store on creation.
#[derive(Debug, Clone, PartialEq)]
pub struct NewExecution {
    pub git: GitSource,
    pub entrypoint: String,
    pub parameters: Map<String, Value>,
    pub environment: ExecutionEnvironment,
    pub correlation_id: Option<String>,
}

impl NewExecution {
    pub fn new(git: GitSource, entrypoint: impl Into<String>) -> Self {
        Self {
            git,
            entrypoint: entrypoint.into(),
            parameters: Map::new(),
            environment: ExecutionEnvironment::default(),
            correlation_id: None,
        }
    }

    pub fn with_environment(mut self, environment: ExecutionEnvironment) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }
}

/// A submission as received from a caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub git: GitSource,
    pub entrypoint: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default)]
    pub environment: ExecutionEnvironment,
    #[serde(default)]
    pub correlation_id: Option<String>,
    /// Wall clock limit; the runner's default applies when absent.
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

impl ExecutionRequest {
    pub fn validate(&self) -> Result<(), ExecutionError> {
        if self.entrypoint.trim().is_empty() {
            return Err(ExecutionError::InvalidRequest(
                "entrypoint cannot be empty".to_string(),
            ));
        }
        if self.timeout_seconds == Some(0) {
            return Err(ExecutionError::InvalidRequest(
                "timeout_seconds must be at least 1".to_string(),
            ));
        }
        self.git.validate()
    }

    pub fn to_new_execution(&self) -> NewExecution {
        NewExecution {
            git: self.git.clone(),
            entrypoint: self.entrypoint.clone(),
            parameters: self.parameters.clone(),
            environment: self.environment,
            correlation_id: self.correlation_id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub execution_id: String,
    pub status: ExecutionStatus,
    pub environment: ExecutionEnvironment,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub correlation_id: Option<String>,
    pub git: GitSource,
    pub entrypoint: String,
    pub parameters: Map<String, Value>,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub logs_pointer: String,
}

impl ExecutionRecord {
    pub fn new(execution_id: String, new: NewExecution, now: DateTime<Utc>) -> Self {
        let logs_pointer = logs_pointer(&execution_id);
        Self {
            execution_id,
            status: ExecutionStatus::Queued,
            environment: new.environment,
            created_at: now,
            updated_at: now,
            correlation_id: new.correlation_id,
            git: new.git,
            entrypoint: new.entrypoint,
            parameters: new.parameters,
            result: None,
            error: None,
            logs_pointer,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

pub fn logs_pointer(execution_id: &str) -> String {
    format!("mem:{}", execution_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn terminal_statuses() {
        let terminal: Vec<_> = ExecutionStatus::ALL
            .into_iter()
            .filter(|s| s.is_terminal())
            .collect();
        assert_eq!(
            terminal,
            vec![
                ExecutionStatus::Completed,
                ExecutionStatus::Failed,
                ExecutionStatus::Canceled,
                ExecutionStatus::Timeout,
            ]
        );
    }

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!(
            "COMPLETED".parse::<ExecutionStatus>().unwrap(),
            ExecutionStatus::Completed
        );
        assert_eq!(
            "timeout".parse::<ExecutionStatus>().unwrap(),
            ExecutionStatus::Timeout
        );
        assert!("done".parse::<ExecutionStatus>().is_err());
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(ExecutionStatus::Canceled).unwrap(),
            json!("canceled")
        );
        assert_eq!(
            serde_json::to_value(ExecutionEnvironment::Airflow).unwrap(),
            json!("airflow")
        );
    }

    #[test]
    fn request_defaults_to_simulated() {
        let req: ExecutionRequest = serde_json::from_value(json!({
            "git": {"repository_url": "https://example.com/repo.git"},
            "entrypoint": "run.py"
        }))
        .unwrap();
        assert_eq!(req.environment, ExecutionEnvironment::Simulated);
        assert!(req.parameters.is_empty());
        assert!(req.timeout_seconds.is_none());
        assert!(req.validate().is_ok());
    }

    #[test]
    fn request_validation() {
        let mut req = ExecutionRequest {
            git: GitSource::new("https://example.com/repo.git"),
            entrypoint: "  ".to_string(),
            parameters: Map::new(),
            environment: ExecutionEnvironment::Local,
            correlation_id: None,
            timeout_seconds: None,
        };
        assert!(matches!(
            req.validate(),
            Err(ExecutionError::InvalidRequest(_))
        ));

        req.entrypoint = "run.sh".to_string();
        req.timeout_seconds = Some(0);
        assert!(req.validate().is_err());

        req.timeout_seconds = Some(30);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn git_source_url_validation() {
        assert!(GitSource::new("https://gitlab.com/group/repo").validate().is_ok());
        assert!(GitSource::new("http://localhost:8080/repo.git").validate().is_ok());
        assert!(GitSource::new("git@github.com:org/repo.git").validate().is_err());
        assert!(GitSource::new("https:///no-host").validate().is_err());
        assert!(GitSource::new("https://").validate().is_err());
    }

    #[test]
    fn new_record_is_queued_with_pointer() {
        let now = Utc::now();
        let record = ExecutionRecord::new(
            "abc".to_string(),
            NewExecution::new(GitSource::new("https://example.com/r.git"), "run.py")
                .with_parameter("x", json!(1))
                .with_correlation_id("corr"),
            now,
        );
        assert_eq!(record.status, ExecutionStatus::Queued);
        assert_eq!(record.created_at, record.updated_at);
        assert_eq!(record.logs_pointer, "mem:abc");
        assert_eq!(record.parameters["x"], json!(1));
        assert_eq!(record.correlation_id.as_deref(), Some("corr"));
        assert!(record.result.is_none());
        assert!(record.error.is_none());
    }
}
