//! podctl - GPU pod lifecycle control
//!
//! ## Usage
//!
//! ```bash
//! # Print the branch pod's status (RUNNING, STOPPED, NOT_FOUND, ...)
//! podctl branch status
//!
//! # Start main, deploying a fresh pod if none exists or it won't come up
//! podctl main start --deploy-new-if-needed -v
//!
//! # Deploy under a tighter price ceiling
//! podctl branch deploy --max-price 0.30
//!
//! # Wait up to 10 minutes for the workload to answer HTTP
//! podctl main health --timeout 600
//! ```
//!
//! stdout carries a single token for scripts; progress goes to stderr.
//! Exit code is 0 on success and 1 on any failure.

use clap::{Parser, ValueEnum};
use podctl_core::PodRole;
use podctl_orchestrator::{ActionReport, Config, LifecycleController, OrchestratorError, RunPodClient};
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// podctl: start, stop, deploy and inspect GPU pods by role
#[derive(Parser)]
#[command(name = "podctl")]
#[command(about = "Lifecycle control for spot GPU pods", long_about = None)]
struct Cli {
    /// Pod role: main or branch
    #[arg(value_name = "ROLE")]
    role: PodRole,

    /// Action to perform
    action: Action,

    /// Verbose progress on stderr
    #[arg(short, long)]
    verbose: bool,

    /// Deploy a new pod when none exists or the existing one won't start
    #[arg(long)]
    deploy_new_if_needed: bool,

    /// Env file (default: ./env if present)
    #[arg(long, env = "PODCTL_CONFIG")]
    config: Option<PathBuf>,

    /// GPU price ceiling in USD/hour (overrides MAX_GPU_PRICE)
    #[arg(long)]
    max_price: Option<Decimal>,

    /// Wait bound in seconds for start, stop and health
    #[arg(long)]
    timeout: Option<u64>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Action {
    Start,
    Stop,
    Restart,
    Status,
    Deploy,
    Terminate,
    Health,
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let default = if verbose {
        "podctl=info,podctl_orchestrator=info,warn"
    } else {
        "warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<ActionReport> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(price) = cli.max_price {
        config = config.with_max_price(price);
    }
    if let Some(secs) = cli.timeout {
        let timeout = Duration::from_secs(secs);
        config = config.with_timeouts(timeout, timeout);
    }

    let role = cli.role;
    info!(
        role = %role,
        action = ?cli.action,
        app = %config.app_name,
        max_price = %config.max_price,
        "podctl starting"
    );

    let client = Arc::new(RunPodClient::from_config(&config)?);
    let controller = LifecycleController::new(config, client)?;

    let report = match cli.action {
        Action::Status => {
            let report = controller.status(role).await?;
            if cli.verbose {
                if let Some(pod) = report.pod() {
                    info!(pod_id = %pod.id, url = %pod.url(), "Pod endpoint");
                }
            }
            report
        }
        Action::Start => controller.start(role, cli.deploy_new_if_needed).await?,
        Action::Stop => controller.stop(role).await?,
        Action::Restart => controller.restart(role, cli.deploy_new_if_needed).await?,
        Action::Deploy => controller.deploy(role).await?,
        Action::Terminate => controller.terminate(role).await?,
        Action::Health => {
            let timeout = controller.config().start_timeout;
            controller.health(role, timeout).await?
        }
    };

    Ok(report)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(report) => {
            if let ActionReport::Deployed { pod, gpu } = &report {
                info!(pod_id = %pod.id, gpu = %gpu.display_name, url = %pod.url(), "Deployed");
            }
            println!("{}", report.token());
            ExitCode::SUCCESS
        }
        Err(e) => {
            if let Some(err) = e.downcast_ref::<OrchestratorError>() {
                if err.is_exhaustion() {
                    warn!("No GPU could be rented; raise MAX_GPU_PRICE or retry later");
                }
            }
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
