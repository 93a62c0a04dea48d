//! Suite report generation.
//!
//! Produces a human-readable text report and machine-readable JSON from the
//! records of a [`ConformanceSuite`](crate::runner::ConformanceSuite) run.

use crate::runner::{ScenarioFailure, ScenarioResult};
use crate::scenario::{Scenario, TestMode};
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Passed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioRecord {
    pub name: String,
    pub topic: String,
    pub mode: TestMode,
    pub verdict: Verdict,
    pub attempts: u32,
    pub observed_count: Option<u32>,
    pub duration_ms: u64,
    pub detail: Option<String>,
}

impl ScenarioRecord {
    #[must_use]
    pub fn passed(scenario: &Scenario, result: &ScenarioResult) -> Self {
        Self {
            name: scenario.name.clone(),
            topic: result.topic.clone(),
            mode: scenario.mode,
            verdict: Verdict::Passed,
            attempts: result.attempts,
            observed_count: result.observed_count,
            duration_ms: millis(result.duration),
            detail: None,
        }
    }

    #[must_use]
    pub fn failed(scenario: &Scenario, failure: &ScenarioFailure) -> Self {
        Self {
            name: scenario.name.clone(),
            topic: scenario.topic.clone(),
            mode: scenario.mode,
            verdict: Verdict::Failed,
            attempts: failure.attempts,
            observed_count: None,
            duration_ms: millis(failure.duration),
            detail: Some(failure.error.to_string()),
        }
    }

    #[must_use]
    pub fn skipped(scenario: &Scenario, reason: &str) -> Self {
        Self {
            name: scenario.name.clone(),
            topic: scenario.topic.clone(),
            mode: scenario.mode,
            verdict: Verdict::Skipped,
            attempts: 0,
            observed_count: None,
            duration_ms: 0,
            detail: Some(reason.to_owned()),
        }
    }
}

/// All scenario records for one middleware implementation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImplementationRun {
    pub implementation: String,
    pub node_name: String,
    pub records: Vec<ScenarioRecord>,
}

impl ImplementationRun {
    #[must_use]
    pub fn new(implementation: &str, node_name: &str) -> Self {
        Self {
            implementation: implementation.to_owned(),
            node_name: node_name.to_owned(),
            records: Vec::new(),
        }
    }

    #[must_use]
    pub fn count(&self, verdict: Verdict) -> usize {
        self.records.iter().filter(|r| r.verdict == verdict).count()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiteReport {
    pub runs: Vec<ImplementationRun>,
}

impl SuiteReport {
    #[must_use]
    pub fn count(&self, verdict: Verdict) -> usize {
        self.runs.iter().map(|r| r.count(verdict)).sum()
    }

    /// True when at least one scenario ran and nothing failed or was skipped.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.count(Verdict::Passed) > 0
            && self.count(Verdict::Failed) == 0
            && self.count(Verdict::Skipped) == 0
    }

    #[must_use]
    pub fn generate_text(&self) -> String {
        let mut out = String::new();
        out.push_str("QoS Conformance Report\n");
        out.push_str(&"=".repeat(60));
        out.push('\n');
        let _ = writeln!(
            out,
            "Passed: {}  Failed: {}  Skipped: {}\n",
            self.count(Verdict::Passed),
            self.count(Verdict::Failed),
            self.count(Verdict::Skipped)
        );

        for run in &self.runs {
            let _ = writeln!(
                out,
                "Implementation {} ({}/{} passed)",
                run.implementation,
                run.count(Verdict::Passed),
                run.records.len()
            );
            for record in &run.records {
                let marker = match record.verdict {
                    Verdict::Passed => "[PASS]",
                    Verdict::Failed => "[FAIL]",
                    Verdict::Skipped => "[SKIP]",
                };
                let _ = write!(out, "  {marker} {:<24} {:<5}", record.name, record.mode);
                if let Some(count) = record.observed_count {
                    let _ = write!(out, " received={count}");
                }
                if record.attempts > 1 {
                    let _ = write!(out, " attempts={}", record.attempts);
                }
                if let Some(detail) = &record.detail {
                    let _ = write!(out, " - {}", truncate(detail, 100));
                }
                out.push('\n');
            }
            out.push('\n');
        }
        out
    }

    /// # Errors
    /// Returns the serializer error; the report types contain no maps with
    /// non-string keys, so this only fails on allocation problems.
    pub fn generate_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_owned()
    } else {
        let mut result: String = s.chars().take(max).collect();
        result.push_str("...");
        result
    }
}
