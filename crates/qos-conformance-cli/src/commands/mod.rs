pub mod daemon_cmd;
pub mod matrix_cmd;
pub mod parsers;
pub mod plan_cmd;
pub mod scenarios_cmd;

use anyhow::{Context, Result};
use qos_conformance::{HarnessConfig, ScenarioManifest};
use std::path::Path;

/// Loads `path` when given, otherwise the defaults; env overrides apply either way.
pub fn load_config(path: Option<&Path>) -> Result<HarnessConfig> {
    let config = match path {
        Some(path) => HarnessConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => HarnessConfig::default(),
    };
    Ok(config.with_env_overrides())
}

/// Loads and validates `path` when given, otherwise the built-in scenarios.
pub fn load_manifest(path: Option<&Path>) -> Result<ScenarioManifest> {
    let manifest = match path {
        Some(path) => ScenarioManifest::load(path)
            .with_context(|| format!("Failed to load manifest {}", path.display()))?,
        None => ScenarioManifest::builtin(),
    };
    manifest.validate().context("Invalid scenario manifest")?;
    Ok(manifest)
}
