//! # Event subscriber trait.
//!
//! Provides [`Subscribe`] an extension point for plugging custom event handlers into a session.
//!
//! Each subscriber gets:
//! - **Dedicated worker task** (runs independently)
//! - **Per-subscriber bounded queue** (capacity via [`Subscribe::queue_capacity`])
//! - **Panic isolation** (panics are caught and logged)
//!
//! ## Architecture
//! ```text
//! SubscriberSet ──► [bounded queue] ──► worker task ──► subscriber.on_event()
//!                                    └─► panic caught → logged, worker continues
//! ```
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use vmvisor::{Event, EventKind, Subscribe};
//!
//! struct ForcedStops;
//!
//! #[async_trait]
//! impl Subscribe for ForcedStops {
//!     async fn on_event(&self, ev: &Event) {
//!         if matches!(ev.kind, EventKind::ForcedStopIssued) {
//!             // page someone, bump a counter, etc.
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str { "forced-stops" }
//!     fn queue_capacity(&self) -> usize { 64 }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Event subscriber for session observability.
///
/// ### Implementation requirements
/// - Use async I/O; avoid blocking the executor (the session is single-threaded).
/// - Handle errors internally; do not panic.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Processes a single event.
    ///
    /// Called from a dedicated worker task, not in the publisher context.
    /// Events are delivered in FIFO order per subscriber.
    async fn on_event(&self, event: &Event);

    /// Returns the subscriber name used in logs.
    ///
    /// The default uses `type_name::<Self>()`, which can be verbose - override it when possible.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Returns the preferred queue capacity for this subscriber (clamped to min 1).
    ///
    /// Default: 1024.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
