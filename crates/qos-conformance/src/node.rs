//! The seam between the harness and the messaging middleware.
//!
//! A [`TopicNode`] is the in-process participant the harness controls. The
//! middleware binding behind it is the system under test: the harness never
//! delivers messages itself, it only creates endpoints and observes callbacks.

use crate::qos::QosProfile;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A `std_msgs/String`-shaped message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringMessage {
    pub data: String,
}

impl StringMessage {
    #[must_use]
    pub fn new(data: impl Into<String>) -> Self {
        Self { data: data.into() }
    }

    /// The line an echo command prints for this message, e.g. `data: hello`.
    #[must_use]
    pub fn to_echo_line(&self) -> String {
        format!("data: {}", self.data)
    }
}

/// Opaque handle to a publisher or subscription owned by a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointId(pub u64);

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "endpoint#{}", self.0)
    }
}

pub type MessageCallback = Box<dyn Fn(StringMessage) + Send + Sync + 'static>;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum NodeError {
    #[error("unknown endpoint: {0}")]
    UnknownEndpoint(EndpointId),

    #[error("endpoint {0} is not a publisher")]
    NotAPublisher(EndpointId),

    #[error("failed to create endpoint on {topic}: {reason}")]
    CreationFailed { topic: String, reason: String },

    #[error("publish failed: {0}")]
    PublishFailed(String),
}

/// Operations the middleware binding must offer to the harness.
///
/// Callbacks may run on any thread; implementations must not invoke them
/// after [`destroy`](Self::destroy) has returned for that subscription.
pub trait TopicNode: Send + Sync {
    fn node_name(&self) -> &str;

    /// # Errors
    /// Returns [`NodeError::CreationFailed`] when the middleware refuses the endpoint.
    fn create_subscription(
        &self,
        topic: &str,
        qos: QosProfile,
        callback: MessageCallback,
    ) -> Result<EndpointId, NodeError>;

    /// # Errors
    /// Returns [`NodeError::CreationFailed`] when the middleware refuses the endpoint.
    fn create_publisher(&self, topic: &str, qos: QosProfile) -> Result<EndpointId, NodeError>;

    /// # Errors
    /// Fails for unknown or non-publisher endpoints, or when the write is rejected.
    fn publish(&self, publisher: EndpointId, message: &StringMessage) -> Result<(), NodeError>;

    /// # Errors
    /// Returns [`NodeError::UnknownEndpoint`] if `endpoint` was never created or is already gone.
    fn destroy(&self, endpoint: EndpointId) -> Result<(), NodeError>;
}
