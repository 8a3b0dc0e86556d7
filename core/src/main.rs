//! devenv-e2e CLI
//!
//! Runs the end-to-end tests of the repository in the current directory.

use std::path::PathBuf;

use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use devenv_e2e::config::CONFIG_FILE;
use devenv_e2e::{E2EConfig, E2EOrchestrator, RunOutcome, Validate};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.iter().skip(1).any(|a| a == "-h" || a == "--help") {
        eprintln!("Usage: {} [repo-dir]", args[0]);
        eprintln!("\nRuns end-to-end tests for the repository (default: current directory).");
        eprintln!("\nEnvironment variables:");
        eprintln!("  SKIP_DEVENV_PROVISION=true  Do not provision a devenv");
        eprintln!("  SKIP_LOCALIZER=true         Do not start the tunnel");
        eprintln!("  CI=true                     Use CI vault address");
        return;
    }

    let repo_dir = match args.get(1) {
        Some(dir) => PathBuf::from(dir),
        None => match std::env::current_dir() {
            Ok(dir) => dir,
            Err(e) => {
                eprintln!("failed to get current directory: {}", e);
                std::process::exit(1);
            }
        },
    };

    let config = match E2EConfig::load_or_default(repo_dir.join(CONFIG_FILE)) {
        Ok(config) => config.with_process_env(),
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    match config.validate().into_result() {
        Ok(warnings) => {
            for warning in warnings {
                tracing::warn!("{}", warning);
            }
        }
        Err(e) => {
            eprintln!("Invalid config: {}", e);
            std::process::exit(1);
        }
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling");
            on_signal.cancel();
        }
    });

    let run_id = uuid::Uuid::new_v4().to_string();
    let span = tracing::info_span!("e2e", run_id = %run_id);

    let orchestrator = E2EOrchestrator::new(config, repo_dir);
    match orchestrator.run(&cancel).instrument(span).await {
        Ok(RunOutcome::Skipped) => {}
        Ok(RunOutcome::Passed {
            dependencies,
            target,
        }) => {
            tracing::info!(deps = dependencies.len(), target = %target, "e2e tests passed");
        }
        Err(e) => {
            eprintln!("E2E tests failed, or failed to run: {}", e);
            std::process::exit(1);
        }
    }
}
