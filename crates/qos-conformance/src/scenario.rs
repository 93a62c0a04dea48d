//! Named test scenarios and the QoS plan each one derives.
//!
//! A scenario says whether QoS is given explicitly and whether the chosen
//! pairing should be compatible. The plan maps that onto opposite extremes:
//! a compatible pairing puts the producer at [`QosProfile::strict`] and the
//! consumer at [`QosProfile::lenient`]; an incompatible one swaps them, so a
//! middleware that delivers anyway is caught.

use crate::error::{ConformanceError, Result};
use crate::matrix::DeliveryExpectation;
use crate::qos::{is_compatible, QosProfile};
use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Which side runs as the external command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestMode {
    /// `topic pub` is under test; the fixture subscribes.
    Publish,
    /// `topic echo` is under test; the fixture publishes periodically.
    Echo,
}

impl fmt::Display for TestMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Publish => "pub",
            Self::Echo => "echo",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub topic: String,
    pub mode: TestMode,
    pub provide_qos: bool,
    pub compatible_qos: bool,
    pub expected_min_count: u32,
    pub expected_max_count: u32,
}

/// QoS for both halves of one scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QosPlan {
    /// Flags passed to the command; `None` means the command's defaults.
    pub cli: Option<QosProfile>,
    pub endpoint: QosProfile,
    pub mode: TestMode,
}

impl QosPlan {
    /// The QoS the command effectively runs with.
    #[must_use]
    pub fn cli_effective(&self) -> QosProfile {
        self.cli.unwrap_or_else(QosProfile::system_default)
    }

    #[must_use]
    pub fn producer(&self) -> QosProfile {
        match self.mode {
            TestMode::Publish => self.cli_effective(),
            TestMode::Echo => self.endpoint,
        }
    }

    #[must_use]
    pub fn consumer(&self) -> QosProfile {
        match self.mode {
            TestMode::Publish => self.endpoint,
            TestMode::Echo => self.cli_effective(),
        }
    }

    #[must_use]
    pub fn is_compatible(&self) -> bool {
        is_compatible(&self.consumer(), &self.producer())
    }
}

impl Scenario {
    /// A scenario with the expected count range implied by `compatible_qos`.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        topic: impl Into<String>,
        mode: TestMode,
        provide_qos: bool,
        compatible_qos: bool,
    ) -> Self {
        let expectation = DeliveryExpectation::for_compatibility(compatible_qos);
        Self {
            name: name.into(),
            topic: topic.into(),
            mode,
            provide_qos,
            compatible_qos,
            expected_min_count: expectation.min_count,
            expected_max_count: expectation.max_count,
        }
    }

    #[must_use]
    pub fn with_expected_counts(mut self, min: u32, max: u32) -> Self {
        self.expected_min_count = min;
        self.expected_max_count = max;
        self
    }

    /// Appends a ULID segment so concurrent or repeated runs never share a topic.
    #[must_use]
    pub fn with_unique_topic(mut self) -> Self {
        let suffix = Ulid::new().to_string().to_lowercase();
        self.topic = format!("{}/run_{suffix}", self.topic.trim_end_matches('/'));
        self
    }

    /// Basic, compatible and incompatible scenarios for one mode.
    #[must_use]
    pub fn defaults(mode: TestMode) -> Vec<Self> {
        let prefix = format!("/clitest/topic/{mode}");
        vec![
            Self::new(format!("{mode}_basic"), format!("{prefix}_basic"), mode, false, true),
            Self::new(
                format!("{mode}_compatible_qos"),
                format!("{prefix}_compatible_qos"),
                mode,
                true,
                true,
            ),
            Self::new(
                format!("{mode}_incompatible_qos"),
                format!("{prefix}_incompatible_qos"),
                mode,
                true,
                false,
            ),
        ]
    }

    #[must_use]
    pub fn expectation(&self) -> DeliveryExpectation {
        DeliveryExpectation {
            min_count: self.expected_min_count,
            max_count: self.expected_max_count,
        }
    }

    #[must_use]
    pub fn qos_plan(&self) -> QosPlan {
        if !self.provide_qos {
            return QosPlan {
                cli: None,
                endpoint: QosProfile::system_default(),
                mode: self.mode,
            };
        }

        let (producer, consumer) = if self.compatible_qos {
            (QosProfile::strict(), QosProfile::lenient())
        } else {
            (QosProfile::lenient(), QosProfile::strict())
        };

        let (cli, endpoint) = match self.mode {
            TestMode::Publish => (producer, consumer),
            TestMode::Echo => (consumer, producer),
        };

        QosPlan {
            cli: Some(cli),
            endpoint,
            mode: self.mode,
        }
    }

    /// Checks the scenario's internal consistency.
    ///
    /// # Errors
    /// Returns [`ConformanceError::Configuration`] describing the first violated invariant.
    pub fn validate(&self) -> Result<()> {
        if !self.topic.starts_with('/') || self.topic.len() < 2 {
            return Err(self.config_error(format!(
                "topic `{}` must be an absolute, non-empty name",
                self.topic
            )));
        }
        if !self.provide_qos && !self.compatible_qos {
            return Err(self.config_error(
                "default QoS is always compatible with default QoS, compatible_qos must be true"
                    .to_owned(),
            ));
        }
        if self.expected_min_count > self.expected_max_count {
            return Err(self.config_error(format!(
                "expected_min_count {} exceeds expected_max_count {}",
                self.expected_min_count, self.expected_max_count
            )));
        }
        let plan = self.qos_plan();
        if plan.is_compatible() != self.compatible_qos {
            return Err(self.config_error(format!(
                "derived consumer {} / producer {} disagree with compatible_qos={}",
                plan.consumer(),
                plan.producer(),
                self.compatible_qos
            )));
        }
        Ok(())
    }

    fn config_error(&self, detail: String) -> ConformanceError {
        ConformanceError::Configuration(format!("scenario `{}`: {detail}", self.name))
    }
}
