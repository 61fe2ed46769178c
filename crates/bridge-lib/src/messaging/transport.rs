//! Transport seam between the messaging client and a concrete bus
//!
//! A [`Connector`] opens one [`Connection`] per connection attempt. The
//! connection yields inbound envelopes in arrival order and hands out a
//! [`TopicSender`] that may be shared across tasks. When `next` returns
//! `None` the connection is gone and the client reconnects.

use super::{Envelope, MessagingError};
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a connection subscribed to `subscriptions`
    async fn connect(&self, subscriptions: &[String]) -> Result<Box<dyn Connection>, MessagingError>;

    /// Human readable endpoint, for logs
    fn endpoint(&self) -> String;
}

#[async_trait]
pub trait Connection: Send {
    fn sender(&self) -> Arc<dyn TopicSender>;

    /// Next inbound envelope, `None` once the connection dropped
    async fn next(&mut self) -> Option<Envelope>;

    /// Flush queued sends and say goodbye to the broker
    async fn close(&mut self) {}
}

/// Non-blocking send handle
///
/// Sends are queued on the connection; a closed connection reports
/// [`MessagingError::NotConnected`].
pub trait TopicSender: Send + Sync {
    fn send(&self, envelope: Envelope) -> Result<(), MessagingError>;
}
