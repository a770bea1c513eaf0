//! Runtime core: session orchestration and machine lifecycle.
//!
//! The public entry point is [`Session`], built with [`SessionBuilder`]. The
//! [`LifecycleController`] and [`EventBridge`] are public for platforms and
//! tests that drive a machine directly.
//!
//! Internal modules:
//! - [`bridge`]: completion callbacks and the state feed as two capacity-1 sources;
//! - [`controller`]: the merge loop, state machine and shutdown escalation;
//! - [`stop`]: stop attempt bookkeeping and the caller-side stop handle;
//! - [`session`]: planning, assembly, launch and subscriber fan-out;
//! - [`shutdown`]: OS signals forwarded as graceful stop requests.

mod bridge;
mod builder;
mod controller;
mod session;
mod shutdown;
mod stop;

pub use bridge::{Completion, CompletionSignal, EventBridge, Phase, Signal, StateNotifier};
pub use builder::SessionBuilder;
pub use controller::LifecycleController;
pub use session::{Installer, Mode, Session};
pub use shutdown::wait_for_shutdown_signal;
pub use stop::StopHandle;
