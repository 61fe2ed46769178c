//! In-process broker
//!
//! Topic semantics on top of a tokio broadcast channel: every connection
//! sees every envelope published to a topic it subscribed to. Used for
//! embedded runs and tests, where connections can be dropped and the broker
//! made unreachable on demand.

use super::transport::{Connection, Connector, TopicSender};
use super::{Envelope, MessagingError};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{debug, warn};

const DEFAULT_CAPACITY: usize = 1024;

#[derive(Clone)]
pub struct MemoryBroker {
    inner: Arc<BrokerInner>,
}

struct BrokerInner {
    bus: broadcast::Sender<Envelope>,
    /// Bumped to drop every open connection
    generation: watch::Sender<u64>,
    available: AtomicBool,
    connects: AtomicUsize,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (bus, _) = broadcast::channel(capacity);
        let (generation, _) = watch::channel(0);
        Self {
            inner: Arc::new(BrokerInner {
                bus,
                generation,
                available: AtomicBool::new(true),
                connects: AtomicUsize::new(0),
            }),
        }
    }

    /// Publish as an external party would
    pub fn publish(&self, envelope: Envelope) {
        // no subscribers is not an error on a topic
        let _ = self.inner.bus.send(envelope);
    }

    /// Observe every envelope crossing the broker
    pub fn tap(&self) -> broadcast::Receiver<Envelope> {
        self.inner.bus.subscribe()
    }

    /// Drop every open connection
    pub fn drop_connections(&self) {
        self.inner.generation.send_modify(|g| *g += 1);
        debug!("Memory broker dropped all connections");
    }

    /// Refuse (or accept again) new connections
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::SeqCst);
    }

    /// Number of successful connects so far
    pub fn connection_count(&self) -> usize {
        self.inner.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MemoryBroker {
    async fn connect(&self, subscriptions: &[String]) -> Result<Box<dyn Connection>, MessagingError> {
        if !self.inner.available.load(Ordering::SeqCst) {
            return Err(MessagingError::Transport(
                "memory broker is unavailable".to_string(),
            ));
        }
        self.inner.connects.fetch_add(1, Ordering::SeqCst);

        let generation = self.inner.generation.subscribe();
        let opened_at = *generation.borrow();

        Ok(Box::new(MemoryConnection {
            rx: self.inner.bus.subscribe(),
            subscriptions: subscriptions.iter().cloned().collect(),
            generation: generation.clone(),
            sender: Arc::new(MemorySender {
                bus: self.inner.bus.clone(),
                generation,
                opened_at,
            }),
        }))
    }

    fn endpoint(&self) -> String {
        "memory://local".to_string()
    }
}

struct MemoryConnection {
    rx: broadcast::Receiver<Envelope>,
    subscriptions: HashSet<String>,
    generation: watch::Receiver<u64>,
    sender: Arc<MemorySender>,
}

#[async_trait]
impl Connection for MemoryConnection {
    fn sender(&self) -> Arc<dyn TopicSender> {
        self.sender.clone()
    }

    async fn next(&mut self) -> Option<Envelope> {
        if *self.generation.borrow() != self.sender.opened_at {
            return None;
        }
        loop {
            tokio::select! {
                _ = self.generation.changed() => return None,
                received = self.rx.recv() => match received {
                    Ok(envelope) if self.subscriptions.contains(&envelope.to) => return Some(envelope),
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped = skipped, "Memory connection lagged, envelopes lost");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                },
            }
        }
    }
}

struct MemorySender {
    bus: broadcast::Sender<Envelope>,
    generation: watch::Receiver<u64>,
    opened_at: u64,
}

impl TopicSender for MemorySender {
    fn send(&self, envelope: Envelope) -> Result<(), MessagingError> {
        if *self.generation.borrow() != self.opened_at {
            return Err(MessagingError::not_connected(envelope.to));
        }
        let _ = self.bus.send(envelope);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_only_subscribed_topics_are_delivered() {
        let broker = MemoryBroker::new();
        let mut connection = broker.connect(&["topic://a".to_string()]).await.unwrap();

        broker.publish(Envelope::new("topic://b", json!(1)));
        broker.publish(Envelope::new("topic://a", json!(2)));

        let envelope = connection.next().await.unwrap();
        assert_eq!(envelope.to, "topic://a");
        assert_eq!(envelope.body, json!(2));
    }

    #[tokio::test]
    async fn test_drop_ends_connection_and_sender() {
        let broker = MemoryBroker::new();
        let mut connection = broker.connect(&[]).await.unwrap();
        let sender = connection.sender();

        broker.drop_connections();
        assert!(connection.next().await.is_none());
        assert!(matches!(
            sender.send(Envelope::new("topic://a", json!(null))),
            Err(MessagingError::NotConnected { .. })
        ));
    }

    #[tokio::test]
    async fn test_unavailable_broker_refuses() {
        let broker = MemoryBroker::new();
        broker.set_available(false);
        assert!(broker.connect(&[]).await.is_err());
        broker.set_available(true);
        assert!(broker.connect(&[]).await.is_ok());
        assert_eq!(broker.connection_count(), 1);
    }
}
