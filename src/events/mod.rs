//! Session event bridge
//!
//! A typed publish/subscribe surface that decouples the connection manager
//! from presentation collaborators. One bridge is built per session and
//! shared by reference; it carries no game logic of its own. Dispatch is
//! synchronous: publishing invokes every currently registered subscriber
//! before returning, in registration order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::proto::{Entity, PlayerState};

/// Handshake info published once per established connection
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HelloInfo {
    pub tick_hz: u32,
    pub server_time_ms: u64,
}

/// Corrected local player plus the visible entity set, ordered by id
#[derive(Debug, Clone, PartialEq)]
pub struct StateUpdate {
    pub you: PlayerState,
    pub entities: Vec<Entity>,
}

/// A chat line delivered by the server
#[derive(Debug, Clone, PartialEq)]
pub struct ChatLine {
    pub channel: String,
    pub from: String,
    pub msg: String,
    pub ts: u64,
}

/// An outbound chat intent raised by presentation
#[derive(Debug, Clone, PartialEq)]
pub struct ChatIntent {
    pub text: String,
}

/// An outbound movement intent raised by presentation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveIntent {
    pub dx: f64,
    pub dy: f64,
}

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct TopicInner<T> {
    subscribers: Mutex<Vec<(u64, Callback<T>)>>,
    next_id: AtomicU64,
}

/// A single named topic with its subscriber list
pub struct Topic<T> {
    inner: Arc<TopicInner<T>>,
}

impl<T> Default for Topic<T> {
    fn default() -> Self {
        Self {
            inner: Arc::new(TopicInner {
                subscribers: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }
}

impl<T> Topic<T> {
    /// Register a subscriber
    ///
    /// The returned handle cancels exactly this subscription; dropping it
    /// without calling `cancel` leaves the subscription active for the
    /// lifetime of the bridge.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.subscribers.lock().push((id, Arc::new(callback)));

        let weak: Weak<TopicInner<T>> = Arc::downgrade(&self.inner);
        Subscription {
            cancel: Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.subscribers.lock().retain(|(sid, _)| *sid != id);
                }
            }),
        }
    }

    /// Deliver to every current subscriber before returning, in
    /// registration order
    pub fn publish(&self, value: &T) {
        // Snapshot outside the lock so subscribers may subscribe/cancel
        // from inside their callback.
        let callbacks: Vec<Callback<T>> = self
            .inner
            .subscribers
            .lock()
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect();
        for callback in callbacks {
            callback(value);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }
}

/// Capability to cancel one subscription
pub struct Subscription {
    cancel: Box<dyn FnOnce() + Send>,
}

impl Subscription {
    pub fn cancel(self) {
        (self.cancel)();
    }
}

/// All topics exposed to presentation collaborators
#[derive(Default)]
pub struct EventBridge {
    /// Handshake info (tick rate, server time)
    pub server_hello: Topic<HelloInfo>,
    /// Corrected player plus entity state
    pub server_state: Topic<StateUpdate>,
    /// Inbound chat lines
    pub server_chat: Topic<ChatLine>,
    /// Outbound chat intents from presentation
    pub client_chat: Topic<ChatIntent>,
    /// Outbound move intents from presentation
    pub client_move: Topic<MoveIntent>,
}

impl EventBridge {
    pub fn new() -> Self {
        Self::default()
    }
}
