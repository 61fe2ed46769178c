//! Correlation registry for in-flight requests
//!
//! Every correlated send registers a pending entry keyed by a fresh v4 uuid.
//! An entry is removed exactly once: by a reply, by its timeout, or by
//! cancellation. Removal is atomic, so a reply racing a timeout settles the
//! caller's future at most once and the loser becomes a no-op. Dropping the
//! [`PendingReply`] cancels an entry that is still pending.

use super::MessagingError;
use dashmap::DashMap;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::fmt;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::debug;
use uuid::Uuid;

pub type ReplyOutcome = Result<Value, MessagingError>;

struct PendingRequest {
    tx: oneshot::Sender<ReplyOutcome>,
    topic: String,
    created_at: Instant,
    timeout: Option<AbortHandle>,
}

type PendingMap = DashMap<Uuid, PendingRequest>;

impl PendingRequest {
    fn abort_timer(&self) {
        if let Some(timer) = &self.timeout {
            timer.abort();
        }
    }
}

/// Future returned by a correlated send
pub struct PendingReply {
    id: Uuid,
    rx: oneshot::Receiver<ReplyOutcome>,
    pending: Weak<PendingMap>,
}

impl PendingReply {
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl fmt::Debug for PendingReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingReply").field("id", &self.id).finish()
    }
}

impl Drop for PendingReply {
    fn drop(&mut self) {
        let Some(pending) = self.pending.upgrade() else {
            return;
        };
        if let Some((_, entry)) = pending.remove(&self.id) {
            entry.abort_timer();
            debug!(correlation_id = %self.id, topic = %entry.topic, "Reply dropped before settling");
        }
    }
}

impl Future for PendingReply {
    type Output = ReplyOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => Poll::Ready(Err(MessagingError::Dropped)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Summary of a settled entry, used for latency metrics
#[derive(Debug, Clone)]
pub struct Settled {
    pub topic: String,
    pub elapsed: Duration,
}

#[derive(Clone, Default)]
pub struct CorrelationRegistry {
    pending: Arc<PendingMap>,
}

impl CorrelationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pending request for `topic`
    pub fn register(&self, topic: &str) -> (Uuid, PendingReply) {
        let id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        self.pending.insert(
            id,
            PendingRequest {
                tx,
                topic: topic.to_string(),
                created_at: Instant::now(),
                timeout: None,
            },
        );
        debug!(correlation_id = %id, topic = %topic, "Registered pending request");
        let reply = PendingReply {
            id,
            rx,
            pending: Arc::downgrade(&self.pending),
        };
        (id, reply)
    }

    /// Attach the timer that will expire `id`
    ///
    /// If the entry is already gone the timer is aborted immediately.
    pub fn attach_timeout(&self, id: Uuid, handle: AbortHandle) {
        match self.pending.get_mut(&id) {
            Some(mut entry) => entry.timeout = Some(handle),
            None => handle.abort(),
        }
    }

    fn take(&self, id: &Uuid) -> Option<PendingRequest> {
        self.pending.remove(id).map(|(_, entry)| entry)
    }

    /// Settle `id` with a reply; returns false if nothing was pending
    pub fn settle(&self, id: Uuid, outcome: ReplyOutcome) -> bool {
        self.settle_with_info(id, outcome).is_some()
    }

    /// Like [`settle`](Self::settle) but reports the topic and latency
    pub fn settle_with_info(&self, id: Uuid, outcome: ReplyOutcome) -> Option<Settled> {
        let entry = self.take(&id)?;
        entry.abort_timer();
        let settled = Settled {
            topic: entry.topic,
            elapsed: entry.created_at.elapsed(),
        };
        // receiver may already be gone; the entry is settled either way
        let _ = entry.tx.send(outcome);
        Some(settled)
    }

    /// Resolve `id` with the fallback payload unless already settled
    pub fn expire(&self, id: Uuid, fallback: Value) -> bool {
        match self.take(&id) {
            Some(entry) => {
                let _ = entry.tx.send(Ok(fallback));
                true
            }
            None => false,
        }
    }

    /// Drop an entry whose send never left the process
    pub fn cancel(&self, id: Uuid) -> bool {
        match self.take(&id) {
            Some(entry) => {
                entry.abort_timer();
                true
            }
            None => false,
        }
    }

    /// Reject everything still pending
    pub fn reject_all(&self, error: MessagingError) -> usize {
        let ids: Vec<Uuid> = self.pending.iter().map(|entry| *entry.key()).collect();
        ids.into_iter()
            .filter(|id| self.settle(*id, Err(error.clone())))
            .count()
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.pending.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_settle_resolves_once() {
        let registry = CorrelationRegistry::new();
        let (id, reply) = registry.register("topic://t");
        assert_eq!(registry.len(), 1);

        assert!(registry.settle(id, Ok(json!({"n": 1}))));
        assert!(!registry.settle(id, Ok(json!({"n": 2}))));
        assert!(!registry.expire(id, json!({"n": 3})));
        assert!(registry.is_empty());

        assert_eq!(reply.await, Ok(json!({"n": 1})));
    }

    #[test]
    fn test_pending_until_settled() {
        let registry = CorrelationRegistry::new();
        let (id, reply) = registry.register("topic://t");
        let mut reply = tokio_test::task::spawn(reply);

        tokio_test::assert_pending!(reply.poll());
        registry.settle(id, Ok(json!("done")));
        assert!(reply.is_woken());
        assert_eq!(tokio_test::assert_ready!(reply.poll()), Ok(json!("done")));
    }

    #[tokio::test]
    async fn test_unknown_id_is_noop() {
        let registry = CorrelationRegistry::new();
        assert!(!registry.settle(Uuid::new_v4(), Ok(Value::Null)));
        assert!(!registry.cancel(Uuid::new_v4()));
    }

    #[tokio::test]
    async fn test_expire_resolves_with_fallback() {
        let registry = CorrelationRegistry::new();
        let (id, reply) = registry.register("topic://t");
        assert!(registry.expire(id, json!({"valid": true})));
        assert!(!registry.settle(id, Ok(json!("late"))));
        assert_eq!(reply.await, Ok(json!({"valid": true})));
    }

    #[tokio::test]
    async fn test_cancel_drops_the_future() {
        let registry = CorrelationRegistry::new();
        let (id, reply) = registry.register("topic://t");
        assert!(registry.cancel(id));
        assert_eq!(reply.await, Err(MessagingError::Dropped));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_reply_cancels_entry() {
        let registry = CorrelationRegistry::new();
        let (id, reply) = registry.register("topic://t");
        let (other, kept) = registry.register("topic://u");

        let timer = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(7)).await;
        });
        registry.attach_timeout(id, timer.abort_handle());

        drop(reply);
        assert!(!registry.contains(&id));
        assert!(timer.await.unwrap_err().is_cancelled());
        assert!(!registry.settle(id, Ok(json!("late"))));

        assert_eq!(registry.len(), 1);
        assert!(registry.settle(other, Ok(json!("ok"))));
        assert_eq!(kept.await, Ok(json!("ok")));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_reject_all() {
        let registry = CorrelationRegistry::new();
        let (_, first) = registry.register("topic://a");
        let (_, second) = registry.register("topic://b");

        assert_eq!(registry.reject_all(MessagingError::Shutdown), 2);
        assert_eq!(first.await, Err(MessagingError::Shutdown));
        assert_eq!(second.await, Err(MessagingError::Shutdown));
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_settle_aborts_timer() {
        let registry = CorrelationRegistry::new();
        let (id, reply) = registry.register("topic://t");

        let timer_registry = registry.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(7)).await;
            timer_registry.expire(id, json!(false))
        });
        registry.attach_timeout(id, timer.abort_handle());

        let settled = registry.settle_with_info(id, Ok(json!("reply"))).unwrap();
        assert_eq!(settled.topic, "topic://t");
        assert_eq!(reply.await, Ok(json!("reply")));
        assert!(timer.await.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_concurrent_settles_win_once() {
        let registry = CorrelationRegistry::new();
        let (id, reply) = registry.register("topic://t");

        let mut tasks = Vec::new();
        for n in 0..8 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move { registry.settle(id, Ok(json!(n))) }));
        }
        let mut wins = 0;
        for task in tasks {
            if task.await.unwrap() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
        assert!(reply.await.is_ok());
    }
}
