//! # vmvisor
//!
//! **vmvisor** provisions, launches and gracefully shuts down one virtual
//! machine hosted by a hypervisor platform.
//!
//! It turns declarative resource intents into a validated, platform-legal
//! machine descriptor, then supervises the machine through a single merge loop
//! that reconciles the platform's completion callbacks with its push feed of
//! state changes.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   Config (toml) ──► ResourcePlan::compute ──► Assembler::build ──► ValidatedDescriptor
//!                      (planner: clamp)          (identity, disk,        │
//!                                                 devices, validate)     ▼
//! ┌───────────────────────────────────────────────────────────────────────────────┐
//! │  Session (entry point, explicit Mode)                                         │
//! │  - Bus (broadcast events)                                                     │
//! │  - SubscriberSet (fans out to subscribers, e.g. LogWriter)                    │
//! │  - StopHandle (caller / OS signal ─► graceful stop)                           │
//! └──────────────────────────────────┬────────────────────────────────────────────┘
//!                                    ▼
//!                      ┌───────────────────────────┐      Machine::start / stop
//!                      │   LifecycleController     │ ───► can_request_stop / request_stop
//!                      │   (merge loop, select!)   │
//!                      └───────▲───────────────────┘
//!                              │ Signal
//!                      ┌───────┴───────────────────┐
//!                      │  EventBridge              │ ◄─── Completion::complete (one-shot)
//!                      │  2 × capacity-1 slots     │ ◄─── StateNotifier::notify (feed)
//!                      └───────────────────────────┘
//! ```
//!
//! ### Lifecycle
//! ```text
//! Created ─► Starting ─► Running ─► Stopping ─► Stopped
//!               │                      ▲
//!               ├──────────────────────┘   (Stopped seen before Running)
//!               └─► Error                  (start completion error)
//!
//! Stopping: every backoff interval
//!   ├─► can_request_stop()? no ─► skip
//!   ├─► request_stop(), attempts += 1
//!   └─► attempts > escalate_after ─► stop() once (forced)
//! ```
//!
//! ## Features
//! | Area              | Description                                               | Key types / traits                         |
//! |-------------------|-----------------------------------------------------------|--------------------------------------------|
//! | **Planning**      | Clamp CPU and memory into platform bounds.                | [`ResourcePlan`], [`clamp_cpu`]            |
//! | **Assembly**      | Identity artifacts, disk image, device set, validation.   | [`Assembler`], [`DeviceSet`]               |
//! | **Lifecycle**     | Start, supervise and shut down one machine.               | [`LifecycleController`], [`EventBridge`]   |
//! | **Sessions**      | Entry point with explicit run/install mode.               | [`Session`], [`SessionBuilder`], [`Mode`]  |
//! | **Policies**      | Interval and escalation threshold of the shutdown loop.   | [`ShutdownPolicy`]                         |
//! | **Subscriber API**| Hook into session events.                                 | [`Subscribe`], [`LogWriter`]               |
//! | **Platform**      | Hypervisor seam and a scripted simulation.                | [`Platform`], [`Machine`], [`platform::sim`] |
//! | **Errors**        | Typed errors with stage tags and stable labels.           | [`VmError`], [`ConfigError`]               |
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use vmvisor::{Config, LogWriter, Mode, SessionBuilder, Subscribe};
//! use vmvisor::platform::sim::{SimScript, SimulatedPlatform};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
//!     let session = SessionBuilder::new(Config::default(), SimulatedPlatform::new(SimScript::default()))
//!         .with_subscribers(subs)
//!         .build();
//!
//!     let stop = session.stop_handle();
//!     tokio::spawn(async move {
//!         tokio::time::sleep(std::time::Duration::from_secs(5)).await;
//!         stop.request_graceful_stop();
//!     });
//!
//!     session.run(Mode::Run, CancellationToken::new()).await?;
//!     Ok(())
//! }
//! ```
mod config;
mod core;
pub mod descriptor;
mod error;
mod events;
mod planner;
pub mod platform;
mod policies;
mod subscribers;

// ---- Public re-exports ----

pub use config::{
    ArtifactPaths, Config, DEFAULT_BUNDLE_DIR, DisplayMode, ResourceRequest, ShutdownConfig,
};
pub use crate::core::{
    Completion, CompletionSignal, EventBridge, Installer, LifecycleController, Mode, Phase,
    Session, SessionBuilder, Signal, StateNotifier, StopHandle, wait_for_shutdown_signal,
};
pub use descriptor::{
    Assembler, DeviceCategory, DeviceConfig, DeviceSet, MachineDescriptor, ValidatedDescriptor,
    map_validation,
};
pub use error::{
    ConfigError, ConfigStage, Resource, ResourceBoundsError, StopAttemptError, VmError,
};
pub use events::{Bus, Event, EventKind};
pub use planner::{
    DEFAULT_MEMORY_SIZE, GIB, MIB, ResourcePlan, clamp_cpu, clamp_memory, default_cpu_count,
    host_cores,
};
pub use platform::{Bounds, Machine, MachineState, Platform, PlatformBounds, PlatformError};
pub use policies::ShutdownPolicy;
pub use subscribers::{LogWriter, Subscribe, SubscriberSet};
