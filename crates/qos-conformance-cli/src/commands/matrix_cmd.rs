use anyhow::{Context, Result};
use clap::Args;
use qos_conformance::CompatibilityMatrix;

#[derive(Args)]
pub struct MatrixCommand {
    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,

    /// Only show pairs that must deliver
    #[arg(long)]
    pub compatible_only: bool,
}

pub fn execute(cmd: &MatrixCommand) -> Result<()> {
    let matrix = CompatibilityMatrix::full();

    if cmd.json {
        let entries: Vec<_> = matrix
            .entries()
            .iter()
            .filter(|e| !cmd.compatible_only || e.compatible)
            .collect();
        let json = serde_json::to_string_pretty(&entries).context("Failed to serialize matrix")?;
        println!("{json}");
        return Ok(());
    }

    if cmd.compatible_only {
        for e in matrix.entries().iter().filter(|e| e.compatible) {
            println!("subscriber {} <- publisher {}", e.subscriber, e.publisher);
        }
    } else {
        print!("{}", matrix.render_table());
    }
    Ok(())
}
