use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use execution_service::api::{run_server, ApiState};
use execution_service::config::{RunnerConfig, ServiceConfig};
use execution_service::execution::TransitionPolicy;
use execution_service::service::ExecutionService;
use execution_service::shutdown::install_shutdown_handler;

#[derive(Parser, Debug)]
#[command(name = "execution-service")]
#[command(version)]
#[command(about = "Runs scripts from git repositories and serves their status and logs")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start the HTTP API
    Server(ServerArgs),
}

#[derive(Parser, Debug)]
struct ServerArgs {
    /// Address to bind
    #[arg(long, default_value = "127.0.0.1")]
    host: IpAddr,

    /// Port to listen on
    #[arg(long, default_value = "8000")]
    port: u16,

    /// Directory for local execution checkouts (defaults to a temp dir)
    #[arg(long)]
    workspace_root: Option<PathBuf>,

    /// Timeout applied when a request sets none; 0 disables it
    #[arg(long, default_value = "3600")]
    default_timeout_secs: u64,

    /// Delay between log lines of simulated executions
    #[arg(long, default_value = "100")]
    simulated_step_delay_ms: u64,

    /// Shell used to run local entrypoints
    #[arg(long, default_value = "sh")]
    shell: String,

    /// git executable used to fetch sources
    #[arg(long, default_value = "git")]
    git: String,

    /// Reject status updates that do not follow
    /// queued -> running -> terminal (cancel allowed from any live state)
    #[arg(long)]
    strict_transitions: bool,
}

impl ServerArgs {
    fn into_config(self) -> ServiceConfig {
        let defaults = RunnerConfig::default();
        let runner = RunnerConfig {
            workspace_root: self.workspace_root.unwrap_or(defaults.workspace_root),
            default_timeout: match self.default_timeout_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            simulated_step_delay_ms: self.simulated_step_delay_ms,
            git_binary: self.git,
            shell: self.shell,
        };
        let policy = if self.strict_transitions {
            TransitionPolicy::Strict
        } else {
            TransitionPolicy::Permissive
        };

        ServiceConfig::new(SocketAddr::new(self.host, self.port))
            .with_transition_policy(policy)
            .with_runner(runner)
    }
}

async fn run_server_command(args: ServerArgs) -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = args.into_config();
    tracing::info!(
        listen_addr = %config.listen_addr,
        policy = ?config.transition_policy,
        workspace_root = %config.runner.workspace_root.display(),
        default_timeout_secs = ?config.runner.default_timeout.map(|t| t.as_secs()),
        "Starting execution service"
    );

    let shutdown = install_shutdown_handler();
    let listen_addr = config.listen_addr;
    let service = Arc::new(ExecutionService::with_shutdown(config, shutdown.clone()));

    let result = run_server(listen_addr, ApiState::new(service.clone()), shutdown).await;
    service.shutdown();
    result?;

    tracing::info!("Execution service stopped");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    match args.command {
        Commands::Server(server_args) => {
            run_server_command(server_args).await?;
        }
    }

    Ok(())
}
