//! The compatibility matrix as data.
//!
//! Every (subscriber, publisher) policy pair maps to a [`DeliveryExpectation`].
//! Keeping the expectation as data lets a run be recalibrated against a
//! middleware whose delivery rule differs from [`is_compatible`].

use crate::qos::{is_compatible, Durability, QosProfile, Reliability, DEFAULT_DEPTH};
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Inclusive range of messages a subscriber should observe within the wait window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryExpectation {
    pub min_count: u32,
    pub max_count: u32,
}

impl DeliveryExpectation {
    /// At least one message, and no flood beyond what a short window allows.
    pub const DELIVERED: Self = Self {
        min_count: 1,
        max_count: 5,
    };

    pub const DROPPED: Self = Self {
        min_count: 0,
        max_count: 0,
    };

    #[must_use]
    pub fn for_compatibility(compatible: bool) -> Self {
        if compatible {
            Self::DELIVERED
        } else {
            Self::DROPPED
        }
    }

    #[must_use]
    pub fn contains(&self, count: u32) -> bool {
        (self.min_count..=self.max_count).contains(&count)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixEntry {
    pub subscriber: QosProfile,
    pub publisher: QosProfile,
    pub compatible: bool,
    pub expectation: DeliveryExpectation,
}

impl MatrixEntry {
    /// Same subscriber and publisher policies; depth is ignored.
    fn matches(&self, subscriber: &QosProfile, publisher: &QosProfile) -> bool {
        same_policies(&self.subscriber, subscriber) && same_policies(&self.publisher, publisher)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompatibilityMatrix {
    entries: Vec<MatrixEntry>,
}

impl CompatibilityMatrix {
    /// All sixteen subscriber/publisher policy combinations.
    #[must_use]
    pub fn full() -> Self {
        let profiles: Vec<QosProfile> = Reliability::ALL
            .iter()
            .flat_map(|&reliability| {
                Durability::ALL
                    .iter()
                    .map(move |&durability| QosProfile::new(reliability, durability, DEFAULT_DEPTH))
            })
            .collect();

        let mut entries = Vec::with_capacity(profiles.len() * profiles.len());
        for subscriber in &profiles {
            for publisher in &profiles {
                let compatible = is_compatible(subscriber, publisher);
                entries.push(MatrixEntry {
                    subscriber: *subscriber,
                    publisher: *publisher,
                    compatible,
                    expectation: DeliveryExpectation::for_compatibility(compatible),
                });
            }
        }
        Self { entries }
    }

    #[must_use]
    pub fn entries(&self) -> &[MatrixEntry] {
        &self.entries
    }

    /// Looks up the expectation for a pair, ignoring depth.
    #[must_use]
    pub fn expectation(
        &self,
        subscriber: &QosProfile,
        publisher: &QosProfile,
    ) -> Option<DeliveryExpectation> {
        self.entries
            .iter()
            .find(|e| e.matches(subscriber, publisher))
            .map(|e| e.expectation)
    }

    /// Replaces the expectation for one pair.
    ///
    /// Returns `false` if the pair is not part of the matrix.
    pub fn recalibrate(
        &mut self,
        subscriber: &QosProfile,
        publisher: &QosProfile,
        expectation: DeliveryExpectation,
    ) -> bool {
        match self.entries.iter_mut().find(|e| e.matches(subscriber, publisher)) {
            Some(entry) => {
                entry.expectation = expectation;
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn render_table(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{:<14} {:<16} {:<14} {:<16} {:<11} expected",
            "sub.reliab", "sub.durab", "pub.reliab", "pub.durab", "compatible"
        );
        out.push_str(&"-".repeat(84));
        out.push('\n');
        for e in &self.entries {
            let _ = writeln!(
                out,
                "{:<14} {:<16} {:<14} {:<16} {:<11} {}-{}",
                e.subscriber.reliability(),
                e.subscriber.durability(),
                e.publisher.reliability(),
                e.publisher.durability(),
                if e.compatible { "yes" } else { "no" },
                e.expectation.min_count,
                e.expectation.max_count
            );
        }
        out
    }
}

fn same_policies(a: &QosProfile, b: &QosProfile) -> bool {
    a.reliability() == b.reliability() && a.durability() == b.durability()
}
