//! # Event fan-out to multiple subscribers.
//!
//! Provides [`SubscriberSet`], which hands each event to every subscriber's
//! bounded queue. Each queue is drained by a dedicated worker task.
//!
//! ## Architecture
//! ```text
//! deliver(event)
//!     │
//!     ├──► [queue 1] ──► worker 1 ──► subscriber1.on_event()
//!     │    (bounded)         └──────► panic → SubscriberPanicked
//!     ├──► [queue 2] ──► worker 2 ──► subscriber2.on_event()
//!     │    (bounded)
//!     └──► [queue N] ──► worker N ──► subscriberN.on_event()
//!          (bounded)
//! ```
//!
//! ## Rules
//! - **Lifecycle events are never dropped**: `Started`, `CancelRequested`,
//!   `Diagnostic` and `Finished` wait for room in every queue.
//! - **Stream events wait up to the stall limit**: a full queue slows the
//!   caller (and through the bus feed, the run worker and the solver). A
//!   subscriber still full after the limit skips stream events until it has
//!   room again.
//! - **Skipped events are counted**: one `SubscriberOverflow` per subscriber
//!   and run, published after that run's `Finished`.
//! - **No cross-subscriber ordering**: subscriber A may process event N while B processes N+5
//! - **Per-subscriber FIFO**: each subscriber sees events in publish order
//! - **Isolation**: a panicking subscriber is reported via `SubscriberPanicked`
//!   and keeps receiving later events
//!
//! **Warning**: `AssertUnwindSafe` is used, which can leave shared state inconsistent
//! if a subscriber panics while holding a lock.

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::mpsc::{self, error::SendTimeoutError, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::warn;

use crate::core::panic_message;
use crate::events::{Bus, Event};
use crate::subscribers::Subscribe;

/// Stall limit used when none is configured.
const DEFAULT_STALL: Duration = Duration::from_secs(5);

struct SubscriberChannel {
    name: &'static str,
    sender: mpsc::Sender<Arc<Event>>,
    /// Timed out on a stream event; skips stream events while its queue is full.
    behind: bool,
    /// Stream events skipped since the last report.
    dropped: u64,
}

impl SubscriberChannel {
    async fn deliver(&mut self, event: &Arc<Event>, stall: Duration) {
        if event.is_lifecycle() {
            // Only fails once the worker is gone, i.e. during shutdown.
            let _ = self.sender.send(Arc::clone(event)).await;
            return;
        }
        if event.run.is_none() {
            let _ = self.sender.try_send(Arc::clone(event));
            return;
        }

        if self.behind || stall.is_zero() {
            match self.sender.try_send(Arc::clone(event)) {
                Ok(()) => self.behind = false,
                Err(TrySendError::Full(_)) => self.dropped += 1,
                Err(TrySendError::Closed(_)) => {}
            }
            return;
        }
        match self.sender.send_timeout(Arc::clone(event), stall).await {
            Ok(()) => {}
            Err(SendTimeoutError::Timeout(_)) => {
                warn!(subscriber = self.name, ?stall, "subscriber stalled, skipping output events");
                self.behind = true;
                self.dropped += 1;
            }
            Err(SendTimeoutError::Closed(_)) => {}
        }
    }
}

/// Fan-out coordinator for event subscribers.
pub struct SubscriberSet {
    channels: Vec<SubscriberChannel>,
    workers: Vec<JoinHandle<()>>,
    bus: Bus,
    stall: Duration,
}

impl SubscriberSet {
    /// Creates a new set and spawns one worker task per subscriber.
    ///
    /// Must be called inside a tokio runtime. Minimum queue capacity is 1.
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>, bus: Bus) -> Self {
        let mut channels = Vec::with_capacity(subs.len());
        let mut workers = Vec::with_capacity(subs.len());

        for sub in subs {
            let cap = sub.queue_capacity().max(1);
            let name = sub.name();
            let (tx, mut rx) = mpsc::channel::<Arc<Event>>(cap);
            let worker_bus = bus.clone();

            let handle = tokio::spawn(async move {
                while let Some(ev) = rx.recv().await {
                    let fut = sub.on_event(ev.as_ref());
                    if let Err(panic) = std::panic::AssertUnwindSafe(fut).catch_unwind().await {
                        worker_bus.publish(Event::subscriber_panicked(
                            sub.name(),
                            panic_message(panic.as_ref()),
                        ));
                    }
                }
            });
            channels.push(SubscriberChannel {
                name,
                sender: tx,
                behind: false,
                dropped: 0,
            });
            workers.push(handle);
        }
        Self {
            channels,
            workers,
            bus,
            stall: DEFAULT_STALL,
        }
    }

    /// Sets how long a stream event waits for a full queue (`0` = never wait).
    #[must_use]
    pub fn with_stall(mut self, stall: Duration) -> Self {
        self.stall = stall;
        self
    }

    /// Delivers an event to all subscribers, in subscriber order.
    ///
    /// Waits for full queues as described in the module rules. After a
    /// `Finished`, skipped-event counts are published as `SubscriberOverflow`.
    pub async fn deliver(&mut self, event: Arc<Event>) {
        for channel in &mut self.channels {
            channel.deliver(&event, self.stall).await;
        }
        if event.is_finished() {
            self.report_drops(true);
        }
    }

    /// Publishes (or, at shutdown, only logs) skipped-event counts.
    fn report_drops(&mut self, publish: bool) {
        for channel in &mut self.channels {
            if channel.dropped == 0 {
                continue;
            }
            warn!(subscriber = channel.name, dropped = channel.dropped, "subscriber missed output events");
            if publish {
                self.bus
                    .publish(Event::subscriber_overflow(channel.name, channel.dropped));
            }
            channel.dropped = 0;
        }
    }

    /// Closes every queue and waits until each worker has drained it.
    pub async fn shutdown(mut self) {
        self.report_drops(false);
        drop(self.channels);
        for h in self.workers {
            let _ = h.await;
        }
    }

    /// True if there are no subscribers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Number of subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }
}
