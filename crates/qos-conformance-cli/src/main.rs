use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{daemon_cmd, matrix_cmd, plan_cmd, scenarios_cmd};

#[derive(Parser)]
#[command(name = "qos-conformance")]
#[command(about = "Inspect and prepare QoS compatibility conformance runs")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the subscriber/publisher compatibility matrix
    Matrix(matrix_cmd::MatrixCommand),
    /// List the scenarios of a manifest
    Scenarios(scenarios_cmd::ScenariosCommand),
    /// Print the exact command lines and endpoint QoS of every scenario
    Plan(plan_cmd::PlanCommand),
    /// Stop and start the discovery daemon for an implementation
    #[command(name = "daemon-restart")]
    DaemonRestart(daemon_cmd::DaemonRestartCommand),
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug {
        "qos_conformance=debug,qos_conformance_cli=debug"
    } else if cli.verbose {
        "qos_conformance=info,qos_conformance_cli=info"
    } else {
        "warn"
    };
    qos_conformance::logging::init_tracing(filter);

    match cli.command {
        Commands::Matrix(cmd) => matrix_cmd::execute(&cmd),
        Commands::Scenarios(cmd) => scenarios_cmd::execute(&cmd),
        Commands::Plan(cmd) => plan_cmd::execute(&cmd),
        Commands::DaemonRestart(cmd) => daemon_cmd::execute(cmd).await,
    }
}
