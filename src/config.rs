use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::execution::TransitionPolicy;

/// Configuration for the execution runner.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Directory under which each local execution gets its own checkout
    pub workspace_root: PathBuf,
    /// Applied when a request carries no `timeout_seconds`. `None` means unbounded.
    pub default_timeout: Option<Duration>,
    /// Pause between the log lines of a simulated execution
    pub simulated_step_delay_ms: u64,
    /// Executable used to fetch sources
    pub git_binary: String,
    /// Shell that runs the entrypoint (invoked as `<shell> -c <entrypoint>`)
    pub shell: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            workspace_root: std::env::temp_dir().join("execution-service"),
            default_timeout: Some(Duration::from_secs(3600)),
            simulated_step_delay_ms: 100,
            git_binary: "git".to_string(),
            shell: "sh".to_string(),
        }
    }
}

impl RunnerConfig {
    /// Effective wall clock limit for one execution.
    pub fn timeout_for(&self, requested_seconds: Option<u64>) -> Option<Duration> {
        requested_seconds
            .map(Duration::from_secs)
            .or(self.default_timeout)
    }
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub listen_addr: SocketAddr,
    pub transition_policy: TransitionPolicy,
    pub runner: RunnerConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8000)),
            transition_policy: TransitionPolicy::default(),
            runner: RunnerConfig::default(),
        }
    }
}

impl ServiceConfig {
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            ..Default::default()
        }
    }

    pub fn with_transition_policy(mut self, policy: TransitionPolicy) -> Self {
        self.transition_policy = policy;
        self
    }

    pub fn with_runner(mut self, runner: RunnerConfig) -> Self {
        self.runner = runner;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runner_config_default() {
        let cfg = RunnerConfig::default();
        assert!(cfg.workspace_root.ends_with("execution-service"));
        assert_eq!(cfg.default_timeout, Some(Duration::from_secs(3600)));
        assert_eq!(cfg.simulated_step_delay_ms, 100);
        assert_eq!(cfg.git_binary, "git");
        assert_eq!(cfg.shell, "sh");
    }

    #[test]
    fn requested_timeout_wins_over_default() {
        let cfg = RunnerConfig::default();
        assert_eq!(cfg.timeout_for(Some(5)), Some(Duration::from_secs(5)));
        assert_eq!(cfg.timeout_for(None), Some(Duration::from_secs(3600)));

        let unbounded = RunnerConfig {
            default_timeout: None,
            ..RunnerConfig::default()
        };
        assert_eq!(unbounded.timeout_for(None), None);
        assert_eq!(unbounded.timeout_for(Some(1)), Some(Duration::from_secs(1)));
    }

    #[test]
    fn service_config_default() {
        let cfg = ServiceConfig::default();
        assert_eq!(cfg.listen_addr.to_string(), "127.0.0.1:8000");
        assert_eq!(cfg.transition_policy, TransitionPolicy::Permissive);
    }

    #[test]
    fn service_config_builders() {
        let addr: SocketAddr = "0.0.0.0:9000".parse().unwrap();
        let runner = RunnerConfig {
            simulated_step_delay_ms: 0,
            ..RunnerConfig::default()
        };
        let cfg = ServiceConfig::new(addr)
            .with_transition_policy(TransitionPolicy::Strict)
            .with_runner(runner);
        assert_eq!(cfg.listen_addr, addr);
        assert_eq!(cfg.transition_policy, TransitionPolicy::Strict);
        assert_eq!(cfg.runner.simulated_step_delay_ms, 0);
    }
}
