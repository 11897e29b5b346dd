//! # Core subscriber trait
//!
//! `Subscribe` is the extension point for consuming run events: a UI, a log
//! file, a progress bar. Each subscriber is driven by a dedicated worker task
//! fed by a bounded queue owned by the [`SubscriberSet`](crate::SubscriberSet).
//!
//! ## Contract
//! - Implementations may be slow (file I/O, rendering). A full queue throttles
//!   the run for up to [`Config::subscriber_stall`](crate::Config); after that
//!   the subscriber misses output events until it catches up, and a
//!   `SubscriberOverflow` with the count follows the run's `Finished`.
//! - Lifecycle events (`Started`, `CancelRequested`, `Diagnostic`,
//!   `Finished`) are never dropped, so `on_event` must eventually return.
//! - Each subscriber declares its queue capacity via
//!   [`Subscribe::queue_capacity`].
//!
//! ## Example
//! ```rust
//! use simvisor::{Event, EventKind, Subscribe};
//!
//! struct FailureCounter(std::sync::atomic::AtomicUsize);
//!
//! #[async_trait::async_trait]
//! impl Subscribe for FailureCounter {
//!     async fn on_event(&self, ev: &Event) {
//!         if let EventKind::Finished { outcome, .. } = &ev.kind {
//!             if !outcome.is_success() {
//!                 self.0.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
//!             }
//!         }
//!     }
//!     fn name(&self) -> &'static str { "failure-counter" }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Contract for event subscribers.
///
/// Called from a subscriber-dedicated worker task. Implementations should avoid
/// blocking the async runtime.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handle a single event.
    async fn on_event(&self, event: &Event);

    /// Human-readable name (for logs).
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Preferred capacity of this subscriber's queue.
    ///
    /// Solver output can arrive in bursts of thousands of lines, hence the
    /// larger default.
    fn queue_capacity(&self) -> usize {
        4096
    }
}
