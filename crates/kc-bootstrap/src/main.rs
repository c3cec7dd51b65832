//! # kc-bootstrap
//!
//! Converges a Keycloak realm to one of the demo token-exchange topologies.

#![forbid(unsafe_code)]
#![allow(clippy::uninlined_format_args)]

use clap::Parser;
use kc_bootstrap::{
    cli::{Cli, Command},
    commands::{run_apply, run_plan, run_verify},
    config::BootstrapConfig,
    output::{error, prompt_password, warning},
    BootstrapResult,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Initialize tracing
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = match load_config(&cli) {
        Ok(c) => c,
        Err(e) => {
            error(&format!("Failed to load configuration: {}", e));
            std::process::exit(1);
        }
    };

    let code = match &cli.command {
        Command::Apply(args) => match run_apply(args, &config, cli.output).await {
            Ok(_) => 0,
            Err(e) => {
                error(&e.to_string());
                error(&format!(
                    "Make sure Keycloak is running and accessible at {}",
                    config.base_url()
                ));
                1
            }
        },
        Command::Plan(args) => report(run_plan(args, &config, cli.output)),
        Command::Verify(args) => match run_verify(args, &config, cli.output) {
            Ok(true) => 0,
            Ok(false) => 2,
            Err(e) => {
                error(&e.to_string());
                1
            }
        },
    };

    if code != 0 {
        std::process::exit(code);
    }
}

/// Resolves the effective configuration: file, then environment and flags.
fn load_config(cli: &Cli) -> BootstrapResult<BootstrapConfig> {
    let mut config = BootstrapConfig::load(cli.config.as_deref())?;
    config.apply_cli(cli);
    if cli.prompt_password {
        config.admin_password = prompt_password("Admin password: ")?;
    }
    config.validate()?;

    if matches!(cli.command, Command::Apply(_)) && config.uses_insecure_credentials() {
        warning("Using default admin credentials (admin/admin). Do not use them outside a local demo.");
    }
    Ok(config)
}

fn report(result: BootstrapResult<()>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(e) => {
            error(&e.to_string());
            1
        }
    }
}
