//! # OS signals as graceful stop requests.
//!
//! [`wait_for_shutdown_signal`] completes when the process receives a
//! termination signal; [`forward_signals`] turns that into a
//! [`StopHandle::request_graceful_stop`] so an interrupted session still goes
//! through the graceful-then-forced protocol instead of exiting abruptly.
//!
//! ## Signals
//! **Unix platforms:**
//! - `SIGINT` (Ctrl-C in terminal)
//! - `SIGTERM` (default kill signal)
//! - `SIGQUIT`
//!
//! **Other platforms:**
//! - `Ctrl-C` via [`tokio::signal::ctrl_c`]

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::stop::StopHandle;

/// Waits for a termination signal.
///
/// Returns `Err` if signal registration fails.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    tokio::select! {
        _ = sigint.recv()  => {},
        _ = sigterm.recv() => {},
        _ = sigquit.recv() => {},
    }
    Ok(())
}

/// Waits for a termination signal.
#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

/// Spawns a task that requests a graceful stop on the first OS signal.
///
/// The task exits without side effects once `done` is cancelled.
pub(crate) fn forward_signals(stop: StopHandle, done: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            res = wait_for_shutdown_signal() => match res {
                Ok(()) => {
                    tracing::info!("termination signal received, requesting graceful stop");
                    stop.request_graceful_stop();
                }
                Err(e) => tracing::warn!(error = %e, "signal handlers unavailable"),
            },
            _ = done.cancelled() => {}
        }
    })
}
