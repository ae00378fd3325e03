//! Type-safe event bus for adjustment lifecycle notifications.
//!
//! The [`EventBus`] lets adjusters announce lifecycle transitions to any
//! number of observers without coupling to them. The completion handler
//! remains the authoritative sink for outcomes; events exist for metrics,
//! dashboards and tests.
//!
//! Each event is its own struct implementing [`Event`], and each gets its
//! own `tokio::sync::broadcast` channel keyed by `TypeId`. A channel exists
//! only once somebody has subscribed to its type.
//!
//! # Example
//!
//! ```rust
//! use qos_types::events::{AdjustmentCancelled, EventBus};
//! use qos_types::FileId;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let bus = EventBus::new();
//! let mut rx = bus.subscribe::<AdjustmentCancelled>();
//!
//! bus.emit(AdjustmentCancelled {
//!     file_id: FileId::from("F1"),
//!     explanation: "pool disabled".into(),
//! });
//!
//! let event = rx.recv().await.unwrap();
//! assert_eq!(event.file_id, FileId::from("F1"));
//! # });
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tracing::warn;

use crate::{FileId, QosAction, SessionId};

// ---------------------------------------------------------------------------
// Event trait
// ---------------------------------------------------------------------------

/// Marker trait for all events that can travel through the [`EventBus`].
pub trait Event: Any + Send + Sync + Clone + std::fmt::Debug + 'static {}

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// An adjuster has been bound to a task and is about to contact remote services.
#[derive(Clone, Debug)]
pub struct AdjustmentStarted {
    /// The file being adjusted.
    pub file_id: FileId,
    /// The action being carried out.
    pub action: QosAction,
    /// Correlation marker attached to the task's outgoing requests.
    pub session: SessionId,
}
impl Event for AdjustmentStarted {}

/// An adjustment reached its desired end state.
#[derive(Clone, Debug)]
pub struct AdjustmentCompleted {
    /// The file that was adjusted.
    pub file_id: FileId,
    /// The pool that now holds the adjusted replica, when known.
    pub target: Option<String>,
}
impl Event for AdjustmentCompleted {}

/// An adjustment failed.
#[derive(Clone, Debug)]
pub struct AdjustmentFailed {
    /// The file whose adjustment failed.
    pub file_id: FileId,
    /// Rendered error.
    pub reason: String,
}
impl Event for AdjustmentFailed {}

/// An adjustment was cancelled before it finished.
#[derive(Clone, Debug)]
pub struct AdjustmentCancelled {
    /// The file whose adjustment was cancelled.
    pub file_id: FileId,
    /// Why the caller cancelled.
    pub explanation: String,
}
impl Event for AdjustmentCancelled {}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Events buffered per type before slow receivers start lagging.
const CHANNEL_CAPACITY: usize = 256;

type Channels = HashMap<TypeId, Box<dyn Any + Send + Sync>>;

/// Broadcast hub with one channel per event type.
///
/// Cloning is cheap and every clone publishes to the same channels.
/// Emitting never blocks and never fails; events of a type nobody
/// subscribed to are discarded.
#[derive(Clone, Default)]
pub struct EventBus {
    channels: Arc<Mutex<Channels>>,
}

impl EventBus {
    /// Create a bus with no channels.
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `event` to the current subscribers of `E`.
    pub fn emit<E: Event>(&self, event: E) {
        let channels = self.channels.lock().expect("event bus lock poisoned");
        if let Some(sender) = channels
            .get(&TypeId::of::<E>())
            .and_then(|boxed| boxed.downcast_ref::<broadcast::Sender<E>>())
        {
            // Err only means nobody is listening right now.
            let _ = sender.send(event);
        }
    }

    /// Receive every `E` emitted from now on.
    pub fn subscribe<E: Event>(&self) -> EventReceiver<E> {
        let mut channels = self.channels.lock().expect("event bus lock poisoned");
        EventReceiver {
            rx: sender_for::<E>(&mut channels).subscribe(),
        }
    }

    /// Number of live receivers for `E`.
    pub fn subscriber_count<E: Event>(&self) -> usize {
        let channels = self.channels.lock().expect("event bus lock poisoned");
        channels
            .get(&TypeId::of::<E>())
            .and_then(|boxed| boxed.downcast_ref::<broadcast::Sender<E>>())
            .map_or(0, broadcast::Sender::receiver_count)
    }
}

/// The channel for `E`, created on first use.
fn sender_for<E: Event>(channels: &mut Channels) -> &broadcast::Sender<E> {
    channels
        .entry(TypeId::of::<E>())
        .or_insert_with(|| Box::new(broadcast::channel::<E>(CHANNEL_CAPACITY).0))
        .downcast_ref::<broadcast::Sender<E>>()
        .expect("event bus channel keyed by the wrong type")
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let channels = self.channels.lock().expect("event bus lock poisoned");
        f.debug_struct("EventBus")
            .field("event_types", &channels.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// EventReceiver
// ---------------------------------------------------------------------------

/// Typed receiver for a specific event type.
pub struct EventReceiver<E: Event> {
    rx: broadcast::Receiver<E>,
}

impl<E: Event> EventReceiver<E> {
    /// Wait for the next event.
    ///
    /// Returns `None` once the bus has been dropped. Skips over lagged
    /// events with a warning.
    pub async fn recv(&mut self) -> Option<E> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(
                        skipped = n,
                        event_type = std::any::type_name::<E>(),
                        "event receiver lagged"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Return the next already-buffered event without waiting.
    pub fn try_recv(&mut self) -> Option<E> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
