//! Messaging client with correlation, reconnect and fail-fast sends
//!
//! This module provides a bus client that:
//! - Owns the connection lifecycle and reconnects with exponential backoff
//! - Re-subscribes every reply topic and inbound handler topic on reconnect
//! - Turns correlated sends into futures settled by the reply
//! - Dispatches inbound requests to topic-bound handlers

use super::envelope::reply_outcome;
use super::registry::{CorrelationRegistry, PendingReply};
use super::topics::{self, short_name};
use super::transport::{Connector, TopicSender};
use super::{Annotations, Envelope, MessagingError};
use crate::handlers::InboundHandler;
use crate::observability::{BridgeMetrics, StructuredLogger};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Configuration for the messaging client
#[derive(Debug, Clone)]
pub struct MessagingConfig {
    /// Reply topics subscribed on every connection
    pub subscriptions: Vec<String>,
    /// Timeout for best-effort requests
    pub best_effort_timeout: Duration,
    /// Initial backoff for reconnection
    pub initial_backoff: Duration,
    /// Maximum backoff for reconnection
    pub max_backoff: Duration,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            subscriptions: topics::REPLIES.iter().map(|t| t.to_string()).collect(),
            best_effort_timeout: Duration::from_secs(7),
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
        }
    }
}

/// Bus connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No endpoint configured or messaging switched off
    Disabled,
    Disconnected,
    Connecting,
    Open,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disabled => "disabled",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
        }
    }

    fn code(&self) -> i64 {
        match self {
            ConnectionState::Disabled => 0,
            ConnectionState::Disconnected => 1,
            ConnectionState::Connecting => 2,
            ConnectionState::Open => 3,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection statistics for tracking reconnection attempts
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConnectionStats {
    pub connects: u32,
    pub failed_attempts: u32,
    pub last_error: Option<String>,
}

struct ClientInner {
    config: MessagingConfig,
    connector: Option<Arc<dyn Connector>>,
    registry: CorrelationRegistry,
    handlers: DashMap<String, Arc<dyn InboundHandler>>,
    link: RwLock<Option<Arc<dyn TopicSender>>>,
    state: watch::Sender<ConnectionState>,
    stats: Mutex<ConnectionStats>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
    metrics: BridgeMetrics,
    logger: StructuredLogger,
}

/// Handle to the bus; clones share one connection
#[derive(Clone)]
pub struct MessagingClient {
    inner: Arc<ClientInner>,
}

impl MessagingClient {
    pub fn builder() -> MessagingClientBuilder {
        MessagingClientBuilder::new()
    }

    pub fn config(&self) -> &MessagingConfig {
        &self.inner.config
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Watch connection state changes
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Wait until the connection is open or `timeout` elapses
    pub async fn wait_until_open(&self, timeout: Duration) -> bool {
        let mut rx = self.subscribe_state();
        tokio::time::timeout(timeout, rx.wait_for(|s| *s == ConnectionState::Open))
            .await
            .map(|r| r.is_ok())
            .unwrap_or(false)
    }

    pub fn connection_stats(&self) -> ConnectionStats {
        self.inner
            .stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn registry(&self) -> &CorrelationRegistry {
        &self.inner.registry
    }

    pub fn pending_requests(&self) -> usize {
        self.inner.registry.len()
    }

    pub fn endpoint(&self) -> Option<String> {
        self.inner.connector.as_ref().map(|c| c.endpoint())
    }

    /// Bind a handler to its inbound topic
    ///
    /// Subscriptions are computed per connection, so a handler registered
    /// after start is subscribed on the next reconnect.
    pub fn register_handler(&self, handler: Arc<dyn InboundHandler>) {
        let topic = handler.topic().to_string();
        debug!(topic = %topic, "Registered inbound handler");
        self.inner.handlers.insert(topic, handler);
    }

    fn subscriptions(&self) -> Vec<String> {
        let mut topics = self.inner.config.subscriptions.clone();
        for entry in self.inner.handlers.iter() {
            if !topics.contains(entry.key()) {
                topics.push(entry.key().clone());
            }
        }
        topics
    }

    /// Start the connection task; a disabled client only logs once
    pub fn start(&self) {
        let Some(connector) = self.inner.connector.clone() else {
            self.inner.logger.log_messaging_disabled();
            return;
        };

        let mut task = self.inner.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.is_some() {
            return;
        }
        let client = self.clone();
        *task = Some(tokio::spawn(async move { client.run(connector).await }));
    }

    /// Stop the connection task and reject everything still pending
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        let task = self
            .inner
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            let _ = task.await;
        }
        self.set_link(None);
        if self.state() != ConnectionState::Disabled {
            self.set_state(ConnectionState::Disconnected);
        }

        let rejected = self.inner.registry.reject_all(MessagingError::Shutdown);
        self.inner.metrics.set_pending_requests(0);
        info!(rejected = rejected, "Messaging client stopped");
    }

    fn set_state(&self, state: ConnectionState) {
        self.inner.state.send_replace(state);
        self.inner.metrics.set_connection_state(state.code());
    }

    fn set_link(&self, sender: Option<Arc<dyn TopicSender>>) {
        *self.inner.link.write().unwrap_or_else(PoisonError::into_inner) = sender;
    }

    fn record_stats(&self, update: impl FnOnce(&mut ConnectionStats)) {
        update(&mut self.inner.stats.lock().unwrap_or_else(PoisonError::into_inner));
    }

    async fn run(self, connector: Arc<dyn Connector>) {
        let endpoint = connector.endpoint();
        let cancel = self.inner.cancel.clone();
        let initial_backoff = self.inner.config.initial_backoff;
        let mut backoff = initial_backoff;

        loop {
            self.set_state(ConnectionState::Connecting);
            let subscriptions = self.subscriptions();

            let attempt = tokio::select! {
                _ = cancel.cancelled() => break,
                result = connector.connect(&subscriptions) => result,
            };

            let delay = match attempt {
                Ok(mut connection) => {
                    backoff = initial_backoff;
                    self.set_link(Some(connection.sender()));
                    self.record_stats(|s| {
                        s.connects += 1;
                        s.last_error = None;
                    });
                    self.set_state(ConnectionState::Open);
                    self.inner
                        .logger
                        .log_bus_connected(&endpoint, subscriptions.len());

                    let reason = loop {
                        tokio::select! {
                            _ = cancel.cancelled() => break None,
                            next = connection.next() => match next {
                                Some(envelope) => self.dispatch(envelope),
                                None => break Some("connection closed"),
                            },
                        }
                    };

                    self.set_link(None);
                    let Some(reason) = reason else {
                        connection.close().await;
                        break;
                    };

                    // pending requests stay registered and may still be answered
                    self.set_state(ConnectionState::Disconnected);
                    self.inner.metrics.inc_reconnects();
                    self.inner.logger.log_bus_disconnected(
                        &endpoint,
                        reason,
                        self.inner.registry.len(),
                    );
                    initial_backoff
                }
                Err(e) => {
                    let delay = backoff;
                    backoff = std::cmp::min(backoff * 2, self.inner.config.max_backoff);
                    self.record_stats(|s| {
                        s.failed_attempts += 1;
                        s.last_error = Some(e.to_string());
                    });
                    self.set_state(ConnectionState::Disconnected);
                    warn!(
                        endpoint = %endpoint,
                        error = %e,
                        next_backoff_ms = delay.as_millis() as u64,
                        "Connection to message bus failed"
                    );
                    delay
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.set_state(ConnectionState::Disconnected);
        debug!(endpoint = %endpoint, "Connection task finished");
    }

    /// Route one inbound envelope
    fn dispatch(&self, envelope: Envelope) {
        let topic = short_name(&envelope.to).to_string();
        self.inner.metrics.inc_received(&topic);

        let handler = self
            .inner
            .handlers
            .get(&envelope.to)
            .map(|entry| entry.value().clone());
        if let Some(handler) = handler {
            let client = self.clone();
            tokio::spawn(async move {
                let correlation_id = envelope.correlation_id.clone();
                if let Err(e) = handler.handle(&client, envelope).await {
                    warn!(
                        topic = %topic,
                        correlation_id = ?correlation_id,
                        error = %e,
                        "Inbound handler failed"
                    );
                }
            });
            return;
        }

        let Some(id) = envelope
            .correlation_id
            .as_deref()
            .and_then(|raw| Uuid::parse_str(raw).ok())
        else {
            self.drop_message(&envelope, "no_correlation_id");
            return;
        };

        let outcome = if topics::UNCONDITIONAL_REPLIES.contains(&envelope.to.as_str()) {
            Ok(envelope.body)
        } else {
            reply_outcome(envelope.body)
        };
        let remote_error = outcome.is_err();

        match self.inner.registry.settle_with_info(id, outcome) {
            Some(settled) => {
                self.inner
                    .metrics
                    .observe_reply_latency(settled.elapsed.as_secs_f64());
                if remote_error {
                    self.inner
                        .metrics
                        .inc_remote_errors(short_name(&settled.topic));
                }
                self.inner
                    .metrics
                    .set_pending_requests(self.inner.registry.len());
                debug!(correlation_id = %id, topic = %topic, "Settled pending request");
            }
            None => {
                self.inner.metrics.inc_dropped("no_pending_request");
                self.inner.logger.log_message_dropped(
                    &envelope.to,
                    Some(&id.to_string()),
                    "no pending request",
                );
            }
        }
    }

    fn drop_message(&self, envelope: &Envelope, reason: &str) {
        self.inner.metrics.inc_dropped(reason);
        self.inner
            .logger
            .log_message_dropped(&envelope.to, envelope.correlation_id.as_deref(), reason);
    }

    /// Current sender, or the reason sends must fail fast
    fn sender_for(&self, topic: &str) -> Result<Arc<dyn TopicSender>, MessagingError> {
        if self.inner.cancel.is_cancelled() {
            return Err(MessagingError::Shutdown);
        }
        match self.state() {
            ConnectionState::Disabled => return Err(MessagingError::ConnectionUnavailable),
            ConnectionState::Open => {}
            _ => return Err(MessagingError::not_connected(topic)),
        }
        self.inner
            .link
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| MessagingError::not_connected(topic))
    }

    fn transmit(&self, envelope: Envelope) -> Result<(), MessagingError> {
        let sender = self.sender_for(&envelope.to)?;
        let topic = short_name(&envelope.to).to_string();
        sender.send(envelope)?;
        self.inner.metrics.inc_sent(&topic);
        Ok(())
    }

    /// Send without expecting a reply
    pub fn publish(&self, envelope: Envelope) -> Result<(), MessagingError> {
        self.transmit(envelope)
    }

    /// Reply to an inbound request, carrying its correlation id back
    pub fn reply(&self, topic: &str, request: &Envelope, body: Value) -> Result<(), MessagingError> {
        let mut envelope = Envelope::new(topic, body);
        envelope.correlation_id = request.correlation_id.clone();
        envelope.message_annotations = request.message_annotations.clone();
        envelope.application_properties = request.application_properties.clone();
        self.transmit(envelope)
    }

    /// Send a request and return the future settled by its reply
    ///
    /// Fails immediately when the bus is not open; nothing is registered in
    /// that case.
    pub fn send_correlated(
        &self,
        topic: &str,
        body: Value,
        annotations: &Annotations,
    ) -> Result<PendingReply, MessagingError> {
        let sender = self.sender_for(topic)?;
        let (id, reply) = self.inner.registry.register(topic);
        let envelope = Envelope::new(topic, body)
            .with_correlation_id(id.to_string())
            .with_application(annotations);

        if let Err(e) = sender.send(envelope) {
            self.inner.registry.cancel(id);
            return Err(e);
        }
        self.inner.metrics.inc_sent(short_name(topic));
        self.inner
            .metrics
            .set_pending_requests(self.inner.registry.len());
        debug!(correlation_id = %id, topic = %topic, "Sent correlated request");
        Ok(reply)
    }

    /// Like [`send_correlated`](Self::send_correlated), resolving with
    /// `fallback` if no reply arrives within `timeout`
    pub fn send_correlated_with_timeout(
        &self,
        topic: &str,
        body: Value,
        annotations: &Annotations,
        timeout: Duration,
        fallback: Value,
    ) -> Result<PendingReply, MessagingError> {
        let reply = self.send_correlated(topic, body, annotations)?;
        let id = reply.id();

        let client = self.clone();
        let topic = topic.to_string();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if client.inner.registry.expire(id, fallback) {
                client.inner.metrics.inc_reply_timeouts(short_name(&topic));
                client
                    .inner
                    .metrics
                    .set_pending_requests(client.inner.registry.len());
                client.inner.logger.log_reply_timeout(&topic, id, timeout);
            }
        });
        self.inner.registry.attach_timeout(id, timer.abort_handle());

        Ok(reply)
    }

    /// Send and await the reply
    pub async fn request(
        &self,
        topic: &str,
        body: Value,
        annotations: &Annotations,
    ) -> Result<Value, MessagingError> {
        self.send_correlated(topic, body, annotations)?.await
    }

    /// Send and await the reply, falling back after the configured timeout
    pub async fn request_best_effort(
        &self,
        topic: &str,
        body: Value,
        annotations: &Annotations,
        fallback: Value,
    ) -> Result<Value, MessagingError> {
        let timeout = self.inner.config.best_effort_timeout;
        self.send_correlated_with_timeout(topic, body, annotations, timeout, fallback)?
            .await
    }
}

/// Builder for MessagingClient configuration
pub struct MessagingClientBuilder {
    config: MessagingConfig,
    connector: Option<Arc<dyn Connector>>,
    handlers: Vec<Arc<dyn InboundHandler>>,
    instance: String,
}

impl MessagingClientBuilder {
    pub fn new() -> Self {
        Self {
            config: MessagingConfig::default(),
            connector: None,
            handlers: Vec::new(),
            instance: "app-bridge".to_string(),
        }
    }

    /// Bus to connect to; without one the client is disabled
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Force the disabled state even if a connector was set
    pub fn disabled(mut self) -> Self {
        self.connector = None;
        self
    }

    pub fn config(mut self, config: MessagingConfig) -> Self {
        self.config = config;
        self
    }

    pub fn subscribe(mut self, topic: impl Into<String>) -> Self {
        let topic = topic.into();
        if !self.config.subscriptions.contains(&topic) {
            self.config.subscriptions.push(topic);
        }
        self
    }

    pub fn best_effort_timeout(mut self, timeout: Duration) -> Self {
        self.config.best_effort_timeout = timeout;
        self
    }

    pub fn initial_backoff(mut self, backoff: Duration) -> Self {
        self.config.initial_backoff = backoff;
        self
    }

    pub fn max_backoff(mut self, backoff: Duration) -> Self {
        self.config.max_backoff = backoff;
        self
    }

    pub fn handler(mut self, handler: Arc<dyn InboundHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn instance(mut self, name: impl Into<String>) -> Self {
        self.instance = name.into();
        self
    }

    pub fn build(self) -> anyhow::Result<MessagingClient> {
        if self.config.initial_backoff.is_zero() {
            anyhow::bail!("initial_backoff must be greater than zero");
        }
        if self.config.max_backoff < self.config.initial_backoff {
            anyhow::bail!("max_backoff must not be smaller than initial_backoff");
        }

        let initial = if self.connector.is_some() {
            ConnectionState::Disconnected
        } else {
            ConnectionState::Disabled
        };
        let (state, _) = watch::channel(initial);
        let metrics = BridgeMetrics::new();
        metrics.set_connection_state(initial.code());

        let client = MessagingClient {
            inner: Arc::new(ClientInner {
                config: self.config,
                connector: self.connector,
                registry: CorrelationRegistry::new(),
                handlers: DashMap::new(),
                link: RwLock::new(None),
                state,
                stats: Mutex::new(ConnectionStats::default()),
                cancel: CancellationToken::new(),
                task: Mutex::new(None),
                metrics,
                logger: StructuredLogger::new(self.instance),
            }),
        };
        for handler in self.handlers {
            client.register_handler(handler);
        }
        Ok(client)
    }
}

impl Default for MessagingClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
