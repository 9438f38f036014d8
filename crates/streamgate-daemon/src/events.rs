//! Event subscription bridge between process lifecycles and channel
//! sessions.
//!
//! Topics are typed keys rather than formatted strings, so a process-exit
//! topic can never collide with a stream-data topic. Subscribers are
//! addressed by an opaque [`SubscriberId`] handle; the bus never holds a
//! reference to a session, only the id and a sender, so dropping a session
//! cannot leak through the bus.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{RwLock, mpsc};
use tracing::{debug, trace};

/// Manager-assigned process identifier.
pub type Pid = u64;

/// A subscription key in the event bus.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Fires once when the process leaves the running set.
    ProcessExit(Pid),
    /// Fires for every chunk the named stream emits.
    StreamData(Pid, String),
}

/// Payload delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A chunk of process output.
    Data(Vec<u8>),
    /// The process exited.
    Exited,
}

/// Opaque handle identifying one subscriber across topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

/// Fan-out event bus keyed by `(topic, subscriber id)`.
#[derive(Debug, Default)]
pub struct EventBus {
    next_id: AtomicU64,
    topics: RwLock<HashMap<Topic, HashMap<SubscriberId, mpsc::UnboundedSender<StreamEvent>>>>,
}

impl EventBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Allocate a fresh subscriber handle.
    pub fn subscriber_id(&self) -> SubscriberId {
        SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Subscribe `id` to `topic`, returning the event receiver.
    ///
    /// Subscribing the same id to the same topic again replaces the
    /// previous receiver.
    pub async fn subscribe(
        &self,
        topic: Topic,
        id: SubscriberId,
    ) -> mpsc::UnboundedReceiver<StreamEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut topics = self.topics.write().await;
        topics.entry(topic.clone()).or_default().insert(id, tx);
        trace!(?topic, ?id, "subscribed");
        rx
    }

    /// Remove `id` from `topic`. A no-op when nothing matches, so
    /// teardown stays safe to invoke from racing exit paths.
    pub async fn unsubscribe(&self, topic: &Topic, id: SubscriberId) {
        let mut topics = self.topics.write().await;
        if let Some(subs) = topics.get_mut(topic) {
            if subs.remove(&id).is_some() {
                trace!(?topic, ?id, "unsubscribed");
            }
            if subs.is_empty() {
                topics.remove(topic);
            }
        }
    }

    /// Deliver `event` to every current subscriber of `topic`.
    ///
    /// Subscribers whose receiver is gone are dropped from the table.
    pub async fn publish(&self, topic: &Topic, event: &StreamEvent) {
        let mut topics = self.topics.write().await;
        let Some(subs) = topics.get_mut(topic) else {
            return;
        };

        subs.retain(|id, tx| {
            let alive = tx.send(event.clone()).is_ok();
            if !alive {
                debug!(?topic, ?id, "dropping subscriber with closed receiver");
            }
            alive
        });
        if subs.is_empty() {
            topics.remove(topic);
        }
    }

    /// Number of live subscribers on `topic`.
    pub async fn subscriber_count(&self, topic: &Topic) -> usize {
        self.topics
            .read()
            .await
            .get(topic)
            .map_or(0, HashMap::len)
    }

    /// Total number of topics with at least one subscriber.
    pub async fn topic_count(&self) -> usize {
        self.topics.read().await.len()
    }
}
