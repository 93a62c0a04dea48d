//! Scenario execution.
//!
//! [`ScenarioRunner`] runs one scenario against one middleware implementation:
//! fixture up, command launched, bounded wait, command shut down, fixture
//! closed, outcome checked. The whole attempt is retried on flaky failures.
//! [`ConformanceSuite`] runs scenarios strictly one after another, once per
//! configured implementation, and collects a [`SuiteReport`].

use crate::assertions::{assert_count_in_range, assert_echo_output};
use crate::config::HarnessConfig;
use crate::error::{ConformanceError, Result};
use crate::fixture::{PublisherFixture, SubscriberFixture};
use crate::node::{NodeError, TopicNode};
use crate::process::{restart_daemon, CliCommand, ProcessHarness};
use crate::report::{ImplementationRun, ScenarioRecord, SuiteReport};
use crate::retry::retry_on_failure;
use crate::scenario::{Scenario, TestMode};
use crate::signal::WaitOutcome;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioResult {
    pub name: String,
    pub topic: String,
    pub mode: TestMode,
    pub attempts: u32,
    /// Messages seen by the subscriber fixture; `None` in echo mode.
    pub observed_count: Option<u32>,
    pub captured_lines: Vec<String>,
    pub duration: Duration,
}

/// A scenario that did not pass, with what it cost.
#[derive(Debug)]
pub struct ScenarioFailure {
    pub error: ConformanceError,
    /// Zero when the scenario was rejected before any attempt.
    pub attempts: u32,
    pub duration: Duration,
}

#[derive(Debug)]
struct AttemptOutcome {
    observed_count: Option<u32>,
    captured_lines: Vec<String>,
}

pub struct ScenarioRunner {
    node: Arc<dyn TopicNode>,
    config: HarnessConfig,
    harness: ProcessHarness,
    implementation: String,
}

impl ScenarioRunner {
    #[must_use]
    pub fn new(node: Arc<dyn TopicNode>, config: HarnessConfig, implementation: &str) -> Self {
        let harness = ProcessHarness::for_implementation(&config, implementation);
        Self {
            node,
            config,
            harness,
            implementation: implementation.to_owned(),
        }
    }

    #[must_use]
    pub fn implementation(&self) -> &str {
        &self.implementation
    }

    #[must_use]
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Runs `scenario`, retrying flaky attempts up to the configured budget.
    ///
    /// # Errors
    /// [`ConformanceError::Configuration`] for an inconsistent scenario, or the
    /// error of the last attempt.
    pub async fn run(&self, scenario: &Scenario) -> Result<ScenarioResult> {
        self.run_detailed(scenario).await.map_err(|failure| failure.error)
    }

    /// Same as [`run`](Self::run), but a failure also reports the attempts
    /// spent and the time taken.
    ///
    /// # Errors
    /// See [`run`](Self::run).
    pub async fn run_detailed(
        &self,
        scenario: &Scenario,
    ) -> std::result::Result<ScenarioResult, ScenarioFailure> {
        let started = Instant::now();
        if let Err(error) = scenario.validate() {
            return Err(ScenarioFailure {
                error,
                attempts: 0,
                duration: started.elapsed(),
            });
        }
        info!(
            scenario = %scenario.name,
            topic = %scenario.topic,
            mode = %scenario.mode,
            implementation = %self.implementation,
            "running scenario"
        );

        let attempted = retry_on_failure(&scenario.name, self.config.retry_attempts, |number| {
            debug!(scenario = %scenario.name, attempt = number, "starting attempt");
            self.attempt(scenario)
        })
        .await
        .map_err(|failed| ScenarioFailure {
            error: failed.value,
            attempts: failed.attempts,
            duration: started.elapsed(),
        })?;

        info!(
            scenario = %scenario.name,
            attempts = attempted.attempts,
            "scenario passed"
        );
        Ok(ScenarioResult {
            name: scenario.name.clone(),
            topic: scenario.topic.clone(),
            mode: scenario.mode,
            attempts: attempted.attempts,
            observed_count: attempted.value.observed_count,
            captured_lines: attempted.value.captured_lines,
            duration: started.elapsed(),
        })
    }

    async fn attempt(&self, scenario: &Scenario) -> Result<AttemptOutcome> {
        match scenario.mode {
            TestMode::Publish => self.attempt_publish(scenario).await,
            TestMode::Echo => self.attempt_echo(scenario).await,
        }
    }

    async fn attempt_publish(&self, scenario: &Scenario) -> Result<AttemptOutcome> {
        let plan = scenario.qos_plan();
        let mut subscriber =
            SubscriberFixture::open(self.node.clone(), &scenario.topic, plan.endpoint)?;

        let command = CliCommand::publish(&self.config, &scenario.topic, plan.cli.as_ref());
        let mut process = self.harness.launch(&command)?;

        let waited = subscriber.signal().wait(self.config.message_timeout).await;
        debug!(scenario = %scenario.name, ?waited, "message wait finished");

        let shutdown = process.shutdown(self.config.shutdown_timeout).await;
        let outcome = process.wait_and_capture(self.config.shutdown_timeout).await;
        subscriber.close();
        shutdown?;

        let observed = subscriber.received_count();
        if waited == WaitOutcome::TimedOut && observed > 0 {
            debug!(scenario = %scenario.name, observed, "messages arrived after the wait");
        }
        assert_count_in_range(
            observed,
            scenario.expected_min_count,
            scenario.expected_max_count,
        )?;

        Ok(AttemptOutcome {
            observed_count: Some(observed),
            captured_lines: outcome.captured_lines,
        })
    }

    async fn attempt_echo(&self, scenario: &Scenario) -> Result<AttemptOutcome> {
        let plan = scenario.qos_plan();
        let message = self.config.message();
        let mut publisher = PublisherFixture::open(
            self.node.clone(),
            &scenario.topic,
            plan.endpoint,
            self.config.publish_period,
            message.clone(),
        )?;

        let command = CliCommand::echo(&self.config, &scenario.topic, plan.cli.as_ref());
        let mut process = self.harness.launch(&command)?;

        // nothing signals completion here: echo output is judged after the window
        tokio::time::sleep(self.config.echo_window).await;

        let shutdown = process.shutdown(self.config.shutdown_timeout).await;
        let outcome = process.wait_and_capture(self.config.shutdown_timeout).await;
        publisher.close();
        shutdown?;

        debug!(
            scenario = %scenario.name,
            published = publisher.published_count(),
            captured = outcome.captured_lines.len(),
            "echo window finished"
        );
        assert_echo_output(
            &outcome.captured_lines,
            scenario.compatible_qos,
            &message.to_echo_line(),
        )?;

        Ok(AttemptOutcome {
            observed_count: None,
            captured_lines: outcome.captured_lines,
        })
    }
}

/// A validated set of scenarios plus the configuration to run them with.
#[derive(Debug, Clone)]
pub struct ConformanceSuite {
    config: HarnessConfig,
    scenarios: Vec<Scenario>,
}

impl ConformanceSuite {
    /// # Errors
    /// Returns [`ConformanceError::Configuration`] for an invalid configuration,
    /// an invalid scenario, or a topic shared by two scenarios.
    pub fn new(config: HarnessConfig, scenarios: Vec<Scenario>) -> Result<Self> {
        config.validate()?;
        let scenarios: Vec<Scenario> = if config.unique_topics {
            scenarios.into_iter().map(Scenario::with_unique_topic).collect()
        } else {
            scenarios
        };

        let mut topics = HashSet::new();
        for scenario in &scenarios {
            scenario.validate()?;
            if !topics.insert(scenario.topic.clone()) {
                return Err(ConformanceError::Configuration(format!(
                    "topic `{}` is used by more than one scenario",
                    scenario.topic
                )));
            }
        }
        Ok(Self { config, scenarios })
    }

    #[must_use]
    pub fn scenarios(&self) -> &[Scenario] {
        &self.scenarios
    }

    #[must_use]
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Runs every scenario in order against one implementation, sharing `node`.
    ///
    /// A shutdown failure means the environment is broken: the remaining
    /// scenarios are recorded as skipped.
    pub async fn run_implementation(
        &self,
        implementation: &str,
        node: Arc<dyn TopicNode>,
    ) -> ImplementationRun {
        let runner = ScenarioRunner::new(node.clone(), self.config.clone(), implementation);
        let mut run = ImplementationRun::new(implementation, node.node_name());

        let mut abort_reason: Option<String> = None;
        for scenario in &self.scenarios {
            if let Some(reason) = &abort_reason {
                run.records.push(ScenarioRecord::skipped(scenario, reason));
                continue;
            }
            match runner.run_detailed(scenario).await {
                Ok(result) => run.records.push(ScenarioRecord::passed(scenario, &result)),
                Err(failure) => {
                    let e = &failure.error;
                    error!(
                        scenario = %scenario.name,
                        implementation,
                        attempts = failure.attempts,
                        "scenario failed: {e}"
                    );
                    if matches!(e, ConformanceError::Shutdown { .. }) {
                        abort_reason = Some(format!("aborted after `{}`: {e}", scenario.name));
                    }
                    run.records.push(ScenarioRecord::failed(scenario, &failure));
                }
            }
        }
        run
    }

    /// Runs the suite once per configured implementation.
    ///
    /// `create_node` builds the in-process node for an implementation; it is
    /// called after the discovery daemon restart, so the node joins fresh
    /// discovery state.
    pub async fn run_all<F>(&self, mut create_node: F) -> SuiteReport
    where
        F: FnMut(&str) -> std::result::Result<Arc<dyn TopicNode>, NodeError>,
    {
        let mut report = SuiteReport::default();
        for implementation in &self.config.implementations {
            if self.config.restart_daemon {
                let harness = ProcessHarness::for_implementation(&self.config, implementation);
                if let Err(e) = restart_daemon(&self.config, &harness).await {
                    error!(implementation = %implementation, "daemon restart failed: {e}");
                    report.runs.push(self.skipped_run(implementation, &e.to_string()));
                    continue;
                }
            }

            match create_node(implementation) {
                Ok(node) => {
                    let run = self.run_implementation(implementation, node).await;
                    report.runs.push(run);
                }
                Err(e) => {
                    error!(implementation = %implementation, "node creation failed: {e}");
                    report.runs.push(self.skipped_run(implementation, &e.to_string()));
                }
            }
        }
        report
    }

    fn skipped_run(&self, implementation: &str, reason: &str) -> ImplementationRun {
        let mut run = ImplementationRun::new(implementation, "");
        run.records = self
            .scenarios
            .iter()
            .map(|s| ScenarioRecord::skipped(s, reason))
            .collect();
        run
    }
}
