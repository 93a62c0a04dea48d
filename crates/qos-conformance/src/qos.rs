//! QoS policies and the subscriber/publisher compatibility rule.
//!
//! Policies are ordered by strictness: a subscriber may only demand what the
//! publisher offers. [`is_compatible`] encodes that rule and is total over
//! every value these enums can hold. Unknown policy names are rejected at the
//! parsing boundary with [`QosError::UnknownPolicy`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;

/// Default history depth used by profiles built in this crate.
pub const DEFAULT_DEPTH: NonZeroU32 = match NonZeroU32::new(10) {
    Some(depth) => depth,
    None => unreachable!(),
};

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum QosError {
    #[error("unknown {policy} policy: {value}")]
    UnknownPolicy { policy: &'static str, value: String },

    #[error("history depth must be positive")]
    ZeroDepth,
}

/// Delivery guarantee. `BestEffort < Reliable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reliability {
    BestEffort,
    Reliable,
}

/// History replay for late joiners. `Volatile < TransientLocal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Durability {
    Volatile,
    TransientLocal,
}

impl Reliability {
    pub const ALL: [Self; 2] = [Self::BestEffort, Self::Reliable];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BestEffort => "best_effort",
            Self::Reliable => "reliable",
        }
    }
}

impl Durability {
    pub const ALL: [Self; 2] = [Self::Volatile, Self::TransientLocal];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Volatile => "volatile",
            Self::TransientLocal => "transient_local",
        }
    }
}

impl fmt::Display for Reliability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Durability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Reliability {
    type Err = QosError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reliable" => Ok(Self::Reliable),
            "best_effort" => Ok(Self::BestEffort),
            other => Err(QosError::UnknownPolicy {
                policy: "reliability",
                value: other.to_owned(),
            }),
        }
    }
}

impl FromStr for Durability {
    type Err = QosError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "transient_local" => Ok(Self::TransientLocal),
            "volatile" => Ok(Self::Volatile),
            other => Err(QosError::UnknownPolicy {
                policy: "durability",
                value: other.to_owned(),
            }),
        }
    }
}

/// An immutable reliability/durability/depth triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QosProfile {
    reliability: Reliability,
    durability: Durability,
    depth: NonZeroU32,
}

impl QosProfile {
    #[must_use]
    pub const fn new(reliability: Reliability, durability: Durability, depth: NonZeroU32) -> Self {
        Self {
            reliability,
            durability,
            depth,
        }
    }

    /// Builds a profile from a raw depth.
    ///
    /// # Errors
    /// Returns [`QosError::ZeroDepth`] when `depth` is zero.
    pub fn with_raw_depth(
        reliability: Reliability,
        durability: Durability,
        depth: u32,
    ) -> Result<Self, QosError> {
        let depth = NonZeroU32::new(depth).ok_or(QosError::ZeroDepth)?;
        Ok(Self::new(reliability, durability, depth))
    }

    /// What a command-line endpoint uses when no QoS flags are passed.
    #[must_use]
    pub const fn system_default() -> Self {
        Self::new(Reliability::Reliable, Durability::Volatile, DEFAULT_DEPTH)
    }

    /// The most demanding profile: reliable and transient-local.
    #[must_use]
    pub const fn strict() -> Self {
        Self::new(Reliability::Reliable, Durability::TransientLocal, DEFAULT_DEPTH)
    }

    /// The least demanding profile: best-effort and volatile.
    #[must_use]
    pub const fn lenient() -> Self {
        Self::new(Reliability::BestEffort, Durability::Volatile, DEFAULT_DEPTH)
    }

    #[must_use]
    pub const fn reliability(&self) -> Reliability {
        self.reliability
    }

    #[must_use]
    pub const fn durability(&self) -> Durability {
        self.durability
    }

    #[must_use]
    pub const fn depth(&self) -> NonZeroU32 {
        self.depth
    }

    /// Renders the `--qos-*` flags a CLI endpoint accepts for this profile.
    #[must_use]
    pub fn cli_flags(&self) -> Vec<String> {
        vec![
            "--qos-reliability".to_owned(),
            self.reliability.as_str().to_owned(),
            "--qos-durability".to_owned(),
            self.durability.as_str().to_owned(),
        ]
    }
}

impl Default for QosProfile {
    fn default() -> Self {
        Self::system_default()
    }
}

impl fmt::Display for QosProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{reliability: {}, durability: {}, depth: {}}}",
            self.reliability, self.durability, self.depth
        )
    }
}

/// Returns whether the middleware must deliver from `publisher` to `subscriber`.
///
/// Directional: swapping the arguments can change the answer.
#[must_use]
pub fn is_compatible(subscriber: &QosProfile, publisher: &QosProfile) -> bool {
    subscriber.reliability <= publisher.reliability && subscriber.durability <= publisher.durability
}
