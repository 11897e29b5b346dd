//! # Event bus for broadcasting run events.
//!
//! [`Bus`] wraps a [`tokio::sync::broadcast`] ring for direct receivers and,
//! when built by a supervisor, a bounded feed that carries every event to the
//! subscriber listener without loss.
//!
//! ```text
//! Publishers:                           Receivers:
//!   Supervisor (pre-flight, Started) ─┐          ┌──► Supervisor::subscribe()   (ring, may lag)
//!   RunWorker (output, Finished)     ─┼──► Bus ──┤
//!   SubscriberSet (overflow/panic)   ─┘          └──► feed ──► listener ──► SubscriberSet
//! ```
//!
//! ## Rules
//! - `publish()` never blocks. Into the feed it is best effort.
//! - `deliver().await` waits for room in the feed, so a slow subscriber slows
//!   the publisher instead of losing events.
//! - One ring buffer (capacity from [`Config::bus_capacity`](crate::Config))
//!   is shared by all direct receivers; a receiver that falls behind gets
//!   `RecvError::Lagged(n)` and skips the `n` oldest events.
//! - Events published while nobody listens are dropped.

use tokio::sync::{broadcast, mpsc};

use super::event::Event;

/// Broadcast channel for run events.
///
/// Cheap to clone; every clone publishes into the same channels.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
    feed: Option<mpsc::Sender<Event>>,
}

impl Bus {
    /// Creates a new bus without a subscriber feed; capacity is clamped to at least 1.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<Event>(capacity.max(1));
        Self { tx, feed: None }
    }

    /// Creates a bus plus the receiving end of its lossless feed.
    pub(crate) fn with_feed(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let capacity = capacity.max(1);
        let (tx, _rx) = broadcast::channel::<Event>(capacity);
        let (feed_tx, feed_rx) = mpsc::channel::<Event>(capacity);
        (
            Self {
                tx,
                feed: Some(feed_tx),
            },
            feed_rx,
        )
    }

    /// Publishes an event to all current receivers (fire-and-forget).
    ///
    /// The feed gets the event only if it has room.
    pub fn publish(&self, ev: Event) {
        if let Some(feed) = &self.feed {
            let _ = feed.try_send(ev.clone());
        }
        let _ = self.tx.send(ev);
    }

    /// Publishes an event, waiting until the feed accepts it.
    ///
    /// Returns at once when there is no feed or the listener is gone.
    pub async fn deliver(&self, ev: Event) {
        match &self.feed {
            Some(feed) => {
                let _ = self.tx.send(ev.clone());
                let _ = feed.send(ev).await;
            }
            None => {
                let _ = self.tx.send(ev);
            }
        }
    }

    /// Creates a receiver that observes events sent after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Number of live receivers.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
