use super::{load_config, load_manifest};
use anyhow::{Context, Result};
use clap::Args;
use qos_conformance::process::{CliCommand, ProcessHarness};
use qos_conformance::{ConformanceSuite, TestMode};
use std::path::PathBuf;

#[derive(Args)]
pub struct PlanCommand {
    /// Scenario manifest (TOML); the built-in scenarios when omitted
    #[arg(long, short)]
    pub manifest: Option<PathBuf>,

    /// Harness configuration (TOML)
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Middleware implementation to plan for; every configured one when omitted
    #[arg(long, short)]
    pub implementation: Option<String>,

    /// Append a unique segment to every topic
    #[arg(long)]
    pub unique_topics: bool,
}

pub fn execute(cmd: &PlanCommand) -> Result<()> {
    let mut config = load_config(cmd.config.as_deref())?;
    if cmd.unique_topics {
        config.unique_topics = true;
    }
    if let Some(implementation) = &cmd.implementation {
        config.implementations = vec![implementation.clone()];
    }
    let manifest = load_manifest(cmd.manifest.as_deref())?;
    let suite =
        ConformanceSuite::new(config, manifest.scenarios).context("Invalid conformance suite")?;
    let config = suite.config();

    for implementation in &config.implementations {
        println!("implementation {implementation}");
        let harness = ProcessHarness::for_implementation(config, implementation);
        for (key, value) in harness.env() {
            println!("  env {key}={value}");
        }
        if config.restart_daemon {
            println!("  $ {}", CliCommand::daemon(config, "stop"));
            println!("  $ {}", CliCommand::daemon(config, "start"));
        }

        for scenario in suite.scenarios() {
            let plan = scenario.qos_plan();
            let command = match scenario.mode {
                TestMode::Publish => {
                    CliCommand::publish(config, &scenario.topic, plan.cli.as_ref())
                }
                TestMode::Echo => CliCommand::echo(config, &scenario.topic, plan.cli.as_ref()),
            };
            println!();
            println!("  {} ({})", scenario.name, scenario.mode);
            println!("    $ {command}");
            match scenario.mode {
                TestMode::Publish => println!(
                    "    subscriber {} expects {}-{} messages within {}",
                    plan.endpoint,
                    scenario.expected_min_count,
                    scenario.expected_max_count,
                    humantime::format_duration(config.message_timeout)
                ),
                TestMode::Echo => println!(
                    "    publisher {} every {} for {}, expects {}",
                    plan.endpoint,
                    humantime::format_duration(config.publish_period),
                    humantime::format_duration(config.echo_window),
                    if scenario.compatible_qos {
                        format!("`{}`", config.message().to_echo_line())
                    } else {
                        "no output".to_owned()
                    }
                ),
            }
            println!(
                "    up to {} attempts, shutdown timeout {}",
                config.retry_attempts,
                humantime::format_duration(config.shutdown_timeout)
            );
        }
        println!();
    }
    Ok(())
}
