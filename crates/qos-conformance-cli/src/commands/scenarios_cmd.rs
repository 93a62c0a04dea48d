use super::load_manifest;
use anyhow::Result;
use clap::Args;
use qos_conformance::TestMode;
use std::path::PathBuf;

#[derive(Args)]
pub struct ScenariosCommand {
    /// Scenario manifest (TOML); the built-in scenarios when omitted
    #[arg(long, short)]
    pub manifest: Option<PathBuf>,

    /// Only list scenarios of this mode
    #[arg(long, value_parser = ["pub", "echo"])]
    pub mode: Option<String>,
}

pub fn execute(cmd: &ScenariosCommand) -> Result<()> {
    let manifest = load_manifest(cmd.manifest.as_deref())?;
    let mode = match cmd.mode.as_deref() {
        Some("pub") => Some(TestMode::Publish),
        Some("echo") => Some(TestMode::Echo),
        _ => None,
    };

    if let Some(description) = &manifest.description {
        println!("{description}");
    }
    println!(
        "{:<24} {:<5} {:<40} {:<8} {:<11} expected",
        "name", "mode", "topic", "qos", "compatible"
    );
    for scenario in manifest
        .scenarios
        .iter()
        .filter(|s| mode.is_none_or(|m| s.mode == m))
    {
        let expected = match scenario.mode {
            TestMode::Publish => format!(
                "{}-{} messages",
                scenario.expected_min_count, scenario.expected_max_count
            ),
            TestMode::Echo if scenario.compatible_qos => "payload echoed".to_owned(),
            TestMode::Echo => "no output".to_owned(),
        };
        println!(
            "{:<24} {:<5} {:<40} {:<8} {:<11} {expected}",
            scenario.name,
            scenario.mode,
            scenario.topic,
            if scenario.provide_qos { "explicit" } else { "default" },
            if scenario.compatible_qos { "yes" } else { "no" },
        );
    }
    Ok(())
}
