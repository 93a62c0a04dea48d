//! Scenario manifest for a conformance run.
//!
//! The manifest is a TOML file (`scenarios.toml`) listing every scenario as a
//! `[[scenarios]]` table. Use [`ScenarioManifest::load`] to deserialize it and
//! [`ScenarioManifest::validate`] before handing scenarios to a suite.

use crate::error::{ConformanceError, Result};
use crate::scenario::{Scenario, TestMode};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioManifest {
    pub description: Option<String>,
    #[serde(default)]
    pub scenarios: Vec<Scenario>,
}

impl ScenarioManifest {
    /// The built-in basic/compatible/incompatible scenarios for both modes.
    #[must_use]
    pub fn builtin() -> Self {
        let mut scenarios = Scenario::defaults(TestMode::Publish);
        scenarios.extend(Scenario::defaults(TestMode::Echo));
        Self {
            description: Some("built-in pub and echo QoS scenarios".to_owned()),
            scenarios,
        }
    }

    /// Loads and deserializes a manifest from a TOML file.
    ///
    /// # Errors
    /// Returns [`ConformanceError::Io`] or [`ConformanceError::Toml`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConformanceError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&content, &path.display().to_string())
    }

    /// # Errors
    /// Returns [`ConformanceError::Toml`] when `content` is not a valid manifest.
    pub fn parse(content: &str, origin: &str) -> Result<Self> {
        toml::from_str(content).map_err(|source| ConformanceError::Toml {
            path: origin.to_owned(),
            source,
        })
    }

    /// Validates every scenario and rejects topics or names used twice.
    ///
    /// # Errors
    /// Returns the first [`ConformanceError::Configuration`] found.
    pub fn validate(&self) -> Result<()> {
        let mut topics = HashSet::new();
        let mut names = HashSet::new();
        for scenario in &self.scenarios {
            scenario.validate()?;
            if !topics.insert(scenario.topic.as_str()) {
                return Err(ConformanceError::Configuration(format!(
                    "topic `{}` is used by more than one scenario",
                    scenario.topic
                )));
            }
            if !names.insert(scenario.name.as_str()) {
                return Err(ConformanceError::Configuration(format!(
                    "scenario name `{}` is not unique",
                    scenario.name
                )));
            }
        }
        Ok(())
    }

    pub fn scenarios_for(&self, mode: TestMode) -> impl Iterator<Item = &Scenario> {
        self.scenarios.iter().filter(move |s| s.mode == mode)
    }

    #[must_use]
    pub fn find(&self, name: &str) -> Option<&Scenario> {
        self.scenarios.iter().find(|s| s.name == name)
    }
}

impl Default for ScenarioManifest {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
description = "sample"

[[scenarios]]
name = "pub_basic"
topic = "/t1"
mode = "publish"
provide_qos = false
compatible_qos = true
expected_min_count = 1
expected_max_count = 5

[[scenarios]]
name = "pub_incompatible_qos"
topic = "/t3"
mode = "publish"
provide_qos = true
compatible_qos = false
expected_min_count = 0
expected_max_count = 0
"#;

    #[test]
    fn test_parse_sample() {
        let manifest = ScenarioManifest::parse(SAMPLE, "sample").unwrap();
        assert_eq!(manifest.scenarios.len(), 2);
        assert_eq!(manifest.description.as_deref(), Some("sample"));
        manifest.validate().unwrap();
        let incompatible = manifest.find("pub_incompatible_qos").unwrap();
        assert_eq!(incompatible.expected_max_count, 0);
        assert_eq!(manifest.scenarios_for(TestMode::Echo).count(), 0);
    }

    #[test]
    fn test_unknown_mode_is_toml_error() {
        let bad = SAMPLE.replace("mode = \"publish\"", "mode = \"broadcast\"");
        assert!(matches!(
            ScenarioManifest::parse(&bad, "bad"),
            Err(ConformanceError::Toml { .. })
        ));
    }

    #[test]
    fn test_duplicate_topic_rejected() {
        let dup = SAMPLE.replace("/t3", "/t1");
        let manifest = ScenarioManifest::parse(&dup, "dup").unwrap();
        assert!(matches!(
            manifest.validate(),
            Err(ConformanceError::Configuration(msg)) if msg.contains("/t1")
        ));
    }

    #[test]
    fn test_builtin_is_valid() {
        let manifest = ScenarioManifest::builtin();
        manifest.validate().unwrap();
        assert_eq!(manifest.scenarios_for(TestMode::Publish).count(), 3);
        assert_eq!(manifest.scenarios_for(TestMode::Echo).count(), 3);
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            ScenarioManifest::load("/nonexistent/scenarios.toml"),
            Err(ConformanceError::Io { .. })
        ));
    }
}
