//! Session events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to events emitted by the session and its lifecycle
//! controller.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Session`, `LifecycleController`, the OS signal forwarder.
//! - **Consumers**: `Session::subscriber_listener()` (fans out to `SubscriberSet`),
//!   and any receiver obtained via [`Bus::subscribe`].

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
