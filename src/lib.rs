pub mod commands;
pub mod config;
pub mod device;
pub mod errors;
pub mod executor;
pub mod perception;

use std::process::ExitCode;

use clap::Parser;

use crate::commands::Cli;
use crate::config::AppConfig;
use crate::errors::DroidLensResult;

pub use crate::errors::DroidLensError;
pub use crate::executor::coordinator::DeviceHandle;
pub use crate::executor::input::{ExecResult, InputDispatcher};
pub use crate::perception::bounds::Bounds;
pub use crate::perception::element::AppElement;
pub use crate::perception::geometry::Vector2;
pub use crate::perception::hierarchy::Hierarchy;
pub use crate::perception::traits::HierarchySource;

pub fn run() -> ExitCode {
    // Logs go to stderr so stdout stays parseable.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Load .env file if present (ignore error if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config = match resolve_config(&cli) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!(error = %e, "failed to load config");
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!(error = %e, "failed to start tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(commands::execute(cli, config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            ExitCode::FAILURE
        }
    }
}

/// An explicit `--config` must load; otherwise a missing file means defaults.
fn resolve_config(cli: &Cli) -> DroidLensResult<AppConfig> {
    if let Some(path) = &cli.config {
        return config::load_config_from(path);
    }
    match config::load_config() {
        Ok(cfg) => Ok(cfg),
        Err(DroidLensError::Config(msg)) => {
            tracing::warn!(reason = %msg, "using default config");
            let mut cfg = AppConfig::default();
            config::apply_env_overrides(&mut cfg);
            Ok(cfg)
        }
        Err(e) => Err(e),
    }
}
