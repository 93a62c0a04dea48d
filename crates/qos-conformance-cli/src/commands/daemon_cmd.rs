use super::load_config;
use super::parsers::parse_duration;
use anyhow::{Context, Result};
use clap::Args;
use qos_conformance::process::{restart_daemon, ProcessHarness};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Args)]
pub struct DaemonRestartCommand {
    /// Harness configuration (TOML)
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Middleware implementation; every configured one when omitted
    #[arg(long, short)]
    pub implementation: Option<String>,

    /// Time allowed for each daemon command (e.g. 10, 5s, 1500ms)
    #[arg(long, value_parser = parse_duration)]
    pub timeout: Option<Duration>,
}

pub async fn execute(cmd: DaemonRestartCommand) -> Result<()> {
    let mut config = load_config(cmd.config.as_deref())?;
    if let Some(timeout) = cmd.timeout {
        config.shutdown_timeout = timeout;
    }
    let implementations = match cmd.implementation {
        Some(implementation) => vec![implementation],
        None => config.implementations.clone(),
    };

    for implementation in &implementations {
        let harness = ProcessHarness::for_implementation(&config, implementation);
        restart_daemon(&config, &harness)
            .await
            .with_context(|| format!("Failed to restart the daemon for {implementation}"))?;
        info!(implementation = %implementation, "daemon restarted");
        println!("daemon restarted for {implementation}");
    }
    Ok(())
}
