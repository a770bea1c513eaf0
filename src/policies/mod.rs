//! Shutdown pacing policy.
//!
//! [`ShutdownPolicy`] controls **how long** the controller waits between
//! graceful stop attempts and **when** it escalates to a forced stop.
//!
//! ## Quick wiring
//! ```text
//! Config { shutdown: ShutdownConfig { backoff_ms, escalate_after } }
//!      └─► ShutdownPolicy ──► core::controller::LifecycleController uses:
//!           - interval to schedule the next stop step
//!           - escalate_after to decide when the single forced stop is issued
//! ```

mod shutdown;

pub use shutdown::ShutdownPolicy;
