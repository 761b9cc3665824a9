//! Broadcast hub for push-stream viewers
//!
//! Every viewer owns a bounded queue. Publishing never blocks: a viewer
//! whose queue is full or closed is dropped on the spot, so one slow
//! client can never stall the poll loop.

use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::event::StreamEvent;

/// Queue capacity used when none is configured
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

struct Subscriber {
    id: Uuid,
    tx: mpsc::Sender<StreamEvent>,
    joined_at: DateTime<Utc>,
}

struct HubInner {
    subscribers: Mutex<Vec<Subscriber>>,
    /// Sent to each new subscriber before anything else
    handshake: StreamEvent,
    capacity: usize,
}

impl HubInner {
    fn remove(&self, id: Uuid) -> bool {
        let mut subscribers = self.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        before != subscribers.len()
    }
}

/// Fan-out of stream events to all connected viewers
///
/// Cloning the hub yields another handle to the same subscriber set.
#[derive(Clone)]
pub struct BroadcastHub {
    inner: Arc<HubInner>,
}

impl BroadcastHub {
    /// Create a hub that greets every new subscriber with `handshake`
    pub fn new(handshake: StreamEvent, capacity: usize) -> Self {
        Self {
            inner: Arc::new(HubInner {
                subscribers: Mutex::new(Vec::new()),
                handshake,
                // The handshake must always fit
                capacity: capacity.max(1),
            }),
        }
    }

    /// Register a new viewer
    ///
    /// The handshake is the first event the returned subscription yields.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(self.inner.capacity);
        let id = Uuid::new_v4();

        let mut subscribers = self.inner.subscribers.lock();
        // Queued under the lock so no publish can overtake it
        let _ = tx.try_send(self.inner.handshake.clone());
        subscribers.push(Subscriber {
            id,
            tx,
            joined_at: Utc::now(),
        });
        let count = subscribers.len();
        drop(subscribers);

        info!(subscriber_id = %id, subscribers = count, "Viewer subscribed");

        Subscription {
            id,
            rx,
            hub: Arc::downgrade(&self.inner),
        }
    }

    /// Remove a viewer. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: Uuid) {
        if self.inner.remove(id) {
            info!(subscriber_id = %id, "Viewer unsubscribed");
        }
    }

    /// Deliver an event to every viewer without blocking
    ///
    /// Viewers whose queue is full or closed are removed immediately.
    pub fn publish(&self, event: StreamEvent) {
        let mut subscribers = self.inner.subscribers.lock();
        subscribers.retain(|s| match s.tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!(
                    subscriber_id = %s.id,
                    connected_for_ms = (Utc::now() - s.joined_at).num_milliseconds(),
                    "Dropping slow viewer"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(subscriber_id = %s.id, "Dropping disconnected viewer");
                false
            }
        });
    }

    /// Publish a human-readable progress message
    pub fn log(&self, text: impl Into<String>) {
        self.publish(StreamEvent::log(text));
    }

    /// Publish a protocol line
    pub fn line(&self, text: impl Into<String>) {
        self.publish(StreamEvent::line(text));
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }

    pub fn handshake(&self) -> &StreamEvent {
        &self.inner.handshake
    }
}

impl std::fmt::Debug for BroadcastHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastHub")
            .field("subscribers", &self.subscriber_count())
            .field("capacity", &self.inner.capacity)
            .finish()
    }
}

/// A viewer's end of the hub
///
/// Dropping the subscription unregisters it.
pub struct Subscription {
    id: Uuid,
    rx: mpsc::Receiver<StreamEvent>,
    hub: Weak<HubInner>,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Next event, or `None` once the hub has dropped this viewer
    pub async fn recv(&mut self) -> Option<StreamEvent> {
        self.rx.recv().await
    }

    /// Next already queued event, without waiting
    pub fn try_recv(&mut self) -> Option<StreamEvent> {
        self.rx.try_recv().ok()
    }

    /// Stop accepting events; the hub drops this viewer on its next publish
    pub fn close(&mut self) {
        self.rx.close();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            if hub.remove(self.id) {
                debug!(subscriber_id = %self.id, "Viewer disconnected");
            }
        }
    }
}
