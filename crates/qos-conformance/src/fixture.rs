//! The in-process half of a scenario.
//!
//! Each fixture owns exactly one endpoint (plus a timer for the publisher)
//! for the lifetime of one scenario attempt. `close` is idempotent and also
//! runs on drop, so endpoints never outlive a failed attempt.

use crate::node::{EndpointId, StringMessage, TopicNode};
use crate::qos::QosProfile;
use crate::signal::DeliverySignal;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Counts deliveries and fires a [`DeliverySignal`] on the first one.
pub struct SubscriberFixture {
    node: Arc<dyn TopicNode>,
    topic: String,
    subscription: Option<EndpointId>,
    received: Arc<AtomicU32>,
    signal: DeliverySignal,
}

impl SubscriberFixture {
    /// # Errors
    /// Propagates the node's refusal to create the subscription.
    pub fn open(
        node: Arc<dyn TopicNode>,
        topic: &str,
        qos: QosProfile,
    ) -> Result<Self, crate::node::NodeError> {
        let received = Arc::new(AtomicU32::new(0));
        let signal = DeliverySignal::new();

        let counter = received.clone();
        let first = signal.clone();
        let subscription = node.create_subscription(
            topic,
            qos,
            Box::new(move |_message: StringMessage| {
                // count before firing: a woken waiter must see the increment
                counter.fetch_add(1, Ordering::AcqRel);
                first.fire();
            }),
        )?;
        debug!(%subscription, topic, %qos, "subscriber fixture opened");

        Ok(Self {
            node,
            topic: topic.to_owned(),
            subscription: Some(subscription),
            received,
            signal,
        })
    }

    #[must_use]
    pub fn received_count(&self) -> u32 {
        self.received.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn signal(&self) -> &DeliverySignal {
        &self.signal
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn close(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            if let Err(e) = self.node.destroy(subscription) {
                warn!(topic = %self.topic, "failed to destroy subscription: {e}");
            }
        }
    }
}

impl Drop for SubscriberFixture {
    fn drop(&mut self) {
        self.close();
    }
}

/// Publishes a fixed message every `period` until closed.
pub struct PublisherFixture {
    node: Arc<dyn TopicNode>,
    topic: String,
    publisher: Option<EndpointId>,
    timer: Option<JoinHandle<()>>,
    published: Arc<AtomicU32>,
}

impl PublisherFixture {
    /// Creates the publisher and starts its timer. The first publish happens
    /// one `period` after opening.
    ///
    /// # Errors
    /// Propagates the node's refusal to create the publisher.
    pub fn open(
        node: Arc<dyn TopicNode>,
        topic: &str,
        qos: QosProfile,
        period: Duration,
        message: StringMessage,
    ) -> Result<Self, crate::node::NodeError> {
        let publisher = node.create_publisher(topic, qos)?;
        let published = Arc::new(AtomicU32::new(0));
        debug!(%publisher, topic, %qos, ?period, "publisher fixture opened");

        let timer = {
            let node = node.clone();
            let published = published.clone();
            let topic = topic.to_owned();
            tokio::spawn(async move {
                let start = tokio::time::Instant::now() + period;
                let mut ticker = tokio::time::interval_at(start, period);
                loop {
                    ticker.tick().await;
                    match node.publish(publisher, &message) {
                        Ok(()) => {
                            published.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => warn!(topic = %topic, "publish failed: {e}"),
                    }
                }
            })
        };

        Ok(Self {
            node,
            topic: topic.to_owned(),
            publisher: Some(publisher),
            timer: Some(timer),
            published,
        })
    }

    #[must_use]
    pub fn published_count(&self) -> u32 {
        self.published.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Stops the timer, then releases the publisher.
    pub fn close(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        if let Some(publisher) = self.publisher.take() {
            if let Err(e) = self.node.destroy(publisher) {
                warn!(topic = %self.topic, "failed to destroy publisher: {e}");
            }
        }
    }
}

impl Drop for PublisherFixture {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{MessageCallback, NodeError};
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// Loops publishes straight back to subscriptions on the same topic.
    #[derive(Default)]
    struct LoopbackNode {
        next_id: AtomicU32,
        subscriptions: Mutex<HashMap<EndpointId, (String, Arc<MessageCallback>)>>,
        publishers: Mutex<HashMap<EndpointId, String>>,
        destroyed: Mutex<Vec<EndpointId>>,
    }

    impl LoopbackNode {
        fn id(&self) -> EndpointId {
            EndpointId(u64::from(self.next_id.fetch_add(1, Ordering::Relaxed)))
        }

        fn deliver(&self, topic: &str, message: &StringMessage) {
            let callbacks: Vec<_> = self
                .subscriptions
                .lock()
                .values()
                .filter(|(t, _)| t == topic)
                .map(|(_, cb)| cb.clone())
                .collect();
            for cb in callbacks {
                (**cb)(message.clone());
            }
        }
    }

    impl TopicNode for LoopbackNode {
        fn node_name(&self) -> &str {
            "loopback"
        }

        fn create_subscription(
            &self,
            topic: &str,
            _qos: QosProfile,
            callback: MessageCallback,
        ) -> Result<EndpointId, NodeError> {
            let id = self.id();
            self.subscriptions
                .lock()
                .insert(id, (topic.to_owned(), Arc::new(callback)));
            Ok(id)
        }

        fn create_publisher(&self, topic: &str, _qos: QosProfile) -> Result<EndpointId, NodeError> {
            let id = self.id();
            self.publishers.lock().insert(id, topic.to_owned());
            Ok(id)
        }

        fn publish(&self, publisher: EndpointId, message: &StringMessage) -> Result<(), NodeError> {
            let topic = self
                .publishers
                .lock()
                .get(&publisher)
                .cloned()
                .ok_or(NodeError::NotAPublisher(publisher))?;
            self.deliver(&topic, message);
            Ok(())
        }

        fn destroy(&self, endpoint: EndpointId) -> Result<(), NodeError> {
            let removed = self.subscriptions.lock().remove(&endpoint).is_some()
                || self.publishers.lock().remove(&endpoint).is_some();
            if removed {
                self.destroyed.lock().push(endpoint);
                Ok(())
            } else {
                Err(NodeError::UnknownEndpoint(endpoint))
            }
        }
    }

    #[tokio::test]
    async fn test_subscriber_counts_and_signals() {
        let node = Arc::new(LoopbackNode::default());
        let sub = SubscriberFixture::open(node.clone(), "/t1", QosProfile::default()).unwrap();
        assert_eq!(sub.received_count(), 0);
        assert!(!sub.signal().is_fired());

        node.deliver("/t1", &StringMessage::new("hello"));
        node.deliver("/t1", &StringMessage::new("hello"));
        node.deliver("/other", &StringMessage::new("hello"));

        assert_eq!(sub.received_count(), 2);
        assert!(sub.signal().is_fired());
    }

    #[tokio::test]
    async fn test_subscriber_close_is_idempotent() {
        let node = Arc::new(LoopbackNode::default());
        let mut sub = SubscriberFixture::open(node.clone(), "/t1", QosProfile::default()).unwrap();
        sub.close();
        sub.close();
        drop(sub);
        assert_eq!(node.destroyed.lock().len(), 1);
        assert!(node.subscriptions.lock().is_empty());
    }

    #[tokio::test]
    async fn test_publisher_fixture_publishes_periodically() {
        let node = Arc::new(LoopbackNode::default());
        let sub = SubscriberFixture::open(node.clone(), "/t2", QosProfile::lenient()).unwrap();
        let mut publisher = PublisherFixture::open(
            node.clone(),
            "/t2",
            QosProfile::strict(),
            Duration::from_millis(20),
            StringMessage::new("hello"),
        )
        .unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;
        publisher.close();
        let published = publisher.published_count();
        assert!(published >= 2, "published {published}");
        assert_eq!(sub.received_count(), published);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(publisher.published_count(), published);
        assert!(node.publishers.lock().is_empty());
    }

    #[tokio::test]
    async fn test_drop_releases_endpoints() {
        let node = Arc::new(LoopbackNode::default());
        {
            let _sub = SubscriberFixture::open(node.clone(), "/t3", QosProfile::strict()).unwrap();
            let _publisher = PublisherFixture::open(
                node.clone(),
                "/t3",
                QosProfile::lenient(),
                Duration::from_millis(50),
                StringMessage::new("hello"),
            )
            .unwrap();
        }
        assert!(node.subscriptions.lock().is_empty());
        assert!(node.publishers.lock().is_empty());
        assert_eq!(node.destroyed.lock().len(), 2);
    }
}
