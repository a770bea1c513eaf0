//! # Event subscribers for vmvisor sessions.
//!
//! This module provides the [`Subscribe`] trait, the [`SubscriberSet`] fan-out
//! and the built-in [`LogWriter`] for events broadcast through the
//! [`Bus`](crate::events::Bus).
//!
//! ## Architecture
//! ```text
//! Event flow:
//!   LifecycleController ── publish(Event) ──► Bus ──► Session listener ──► SubscriberSet
//!                                                                          │
//!                                                                  ┌───────┴───────┐
//!                                                                  ▼               ▼
//!                                                              LogWriter        Custom
//! ```

mod log;
mod set;
mod subscriber;

pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscriber::Subscribe;
