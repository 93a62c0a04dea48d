//! End-to-end QoS compatibility conformance for pub/sub command-line tools.
//!
//! Drives a real `<cli> topic pub` / `<cli> topic echo` process against an
//! in-process counterpart endpoint and checks that messages are delivered
//! exactly when the subscriber's reliability/durability demands are met by
//! the publisher, within a bounded window.
//!
//! The middleware is reached through the [`node::TopicNode`] trait; the
//! command under test is launched by [`process::ProcessHarness`]. Scenarios
//! come from [`scenario::Scenario::defaults`] or a TOML
//! [`manifest::ScenarioManifest`], and results are summarised by
//! [`report::SuiteReport`].
//!
//! ```rust,no_run
//! use qos_conformance::{ConformanceSuite, HarnessConfig, ScenarioManifest, TopicNode};
//! use std::sync::Arc;
//!
//! # fn bind_node(_: &str) -> Result<Arc<dyn TopicNode>, qos_conformance::node::NodeError> { todo!() }
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = HarnessConfig::default().with_env_overrides();
//! let manifest = ScenarioManifest::load("scenarios.toml")?;
//! let suite = ConformanceSuite::new(config, manifest.scenarios)?;
//! let report = suite.run_all(bind_node).await;
//! println!("{}", report.generate_text());
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]

pub mod assertions;
pub mod config;
pub mod error;
pub mod fixture;
pub mod logging;
pub mod manifest;
pub mod matrix;
pub mod node;
pub mod process;
pub mod qos;
pub mod report;
pub mod retry;
pub mod runner;
pub mod scenario;
pub mod signal;

pub use config::HarnessConfig;
pub use error::{ConformanceError, Result};
pub use manifest::ScenarioManifest;
pub use matrix::{CompatibilityMatrix, DeliveryExpectation};
pub use node::{EndpointId, StringMessage, TopicNode};
pub use qos::{is_compatible, Durability, QosProfile, Reliability};
pub use report::SuiteReport;
pub use runner::{ConformanceSuite, ScenarioFailure, ScenarioResult, ScenarioRunner};
pub use scenario::{Scenario, TestMode};
