//! # Session: one run of one machine, from configuration to terminal state.
//!
//! The [`Session`] owns the configuration, the platform, the event bus and the
//! subscribers. [`Session::run`] takes an explicit [`Mode`] instead of any
//! process-wide switch.
//!
//! ```text
//! Session::run(Mode::Run, ctx)
//!   ├─ subscriber_listener(): Bus.subscribe() ─► SubscriberSet::emit(&Event)
//!   ├─ forward_signals()  (if cfg.handle_signals) ─► StopHandle::request_graceful_stop
//!   ├─ ResourcePlan::compute(cfg.resources, platform.bounds(), host_cores())
//!   ├─ Assembler::build(plan) ─► ValidatedDescriptor ─► publish(DescriptorReady)
//!   ├─ platform.create_machine(descriptor)
//!   ├─ LifecycleController::run(ctx) ─► Ok | VmError
//!   └─ publish(SessionFinished), flush subscribers
//!
//! Session::run(Mode::Install, ctx)
//!   └─ Installer::install(cfg, ctx)  (VmError::InstallUnavailable without one)
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use tokio::{sync::broadcast, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{
    config::Config,
    core::{controller::LifecycleController, shutdown, stop::StopHandle},
    descriptor::Assembler,
    error::{ConfigError, ConfigStage, VmError},
    events::{Bus, Event, EventKind},
    planner::{ResourcePlan, host_cores},
    platform::Platform,
    subscribers::{Subscribe, SubscriberSet},
};

/// What a session does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Assemble, launch and supervise the machine.
    #[default]
    Run,
    /// Hand over to the configured [`Installer`].
    Install,
}

/// Guest installation, supplied by the caller.
#[async_trait]
pub trait Installer: Send + Sync + 'static {
    /// Installs a guest into the artifacts named by `cfg`.
    async fn install(&self, cfg: &Config, ctx: CancellationToken) -> Result<(), VmError>;
}

/// One machine session.
pub struct Session<P: Platform> {
    cfg: Config,
    platform: P,
    bus: Bus,
    subscribers: Vec<Arc<dyn Subscribe>>,
    installer: Option<Arc<dyn Installer>>,
    stop: StopHandle,
}

impl<P: Platform> Session<P> {
    pub(crate) fn new_internal(
        cfg: Config,
        platform: P,
        bus: Bus,
        subscribers: Vec<Arc<dyn Subscribe>>,
        installer: Option<Arc<dyn Installer>>,
    ) -> Self {
        Self {
            cfg,
            platform,
            bus,
            subscribers,
            installer,
            stop: StopHandle::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// Bus carrying every event of this session.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Handle that requests a graceful stop of the running machine.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Runs the session to completion.
    ///
    /// In [`Mode::Run`] this returns once the machine is Stopped (`Ok`) or in
    /// Error, or with [`VmError::Canceled`] when `ctx` is cancelled before
    /// shutdown begins. Exactly one result is reported.
    pub async fn run(&self, mode: Mode, ctx: CancellationToken) -> Result<(), VmError> {
        let done = CancellationToken::new();
        let listener = self.subscriber_listener(done.clone());
        let signals = self
            .cfg
            .handle_signals
            .then(|| shutdown::forward_signals(self.stop.clone(), done.clone()));

        let res = match mode {
            Mode::Run => self.run_machine(ctx).await,
            Mode::Install => self.install(ctx).await,
        };

        let finished = Event::new(EventKind::SessionFinished);
        self.bus.publish(match &res {
            Ok(()) => finished,
            Err(e) => finished.with_reason(e.as_label()),
        });

        done.cancel();
        if let Some(signals) = signals {
            let _ = signals.await;
        }
        let _ = listener.await;
        res
    }

    async fn run_machine(&self, ctx: CancellationToken) -> Result<(), VmError> {
        let plan = ResourcePlan::compute(&self.cfg.resources, &self.platform.bounds(), host_cores())?;
        let descriptor = Assembler::new(&self.platform, &self.cfg).build(plan)?;
        self.bus
            .publish(Event::new(EventKind::DescriptorReady).with_reason(descriptor.summary()));

        if ctx.is_cancelled() {
            self.bus.publish(Event::new(EventKind::SessionAbandoned));
            return Err(VmError::Canceled);
        }

        let machine = self
            .platform
            .create_machine(descriptor)
            .map_err(|e| ConfigError::platform(ConfigStage::Machine, e))?;

        LifecycleController::new(
            machine,
            self.cfg.shutdown_policy(),
            self.bus.clone(),
            self.stop.clone(),
        )
        .run(ctx)
        .await
    }

    async fn install(&self, ctx: CancellationToken) -> Result<(), VmError> {
        match &self.installer {
            Some(installer) => installer.install(&self.cfg, ctx).await,
            None => Err(VmError::InstallUnavailable),
        }
    }

    /// Forwards bus events to the subscriber set until `done`, then flushes it.
    fn subscriber_listener(&self, done: CancellationToken) -> JoinHandle<()> {
        let mut rx = self.bus.subscribe();
        let set = SubscriberSet::new(self.subscribers.clone());
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    ev = rx.recv() => match ev {
                        Ok(ev) => set.emit(&ev),
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!(skipped = n, "subscriber listener lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    _ = done.cancelled() => {
                        loop {
                            match rx.try_recv() {
                                Ok(ev) => set.emit(&ev),
                                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                                Err(_) => break,
                            }
                        }
                        break;
                    }
                }
            }
            set.shutdown().await;
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::ArtifactPaths,
        core::builder::SessionBuilder,
        platform::sim::{SimScript, SimulatedPlatform},
    };

    fn config_in(dir: &std::path::Path) -> Config {
        Config {
            disk_size: 1 << 20,
            handle_signals: false,
            artifacts: ArtifactPaths::in_bundle(dir),
            ..Config::default()
        }
    }

    struct Recorder;

    #[async_trait]
    impl Installer for Recorder {
        async fn install(&self, cfg: &Config, _ctx: CancellationToken) -> Result<(), VmError> {
            Err(VmError::Install(cfg.artifacts.disk_image.display().to_string()))
        }
    }

    #[tokio::test]
    async fn test_install_without_installer() {
        let dir = tempfile::tempdir().unwrap();
        let session =
            SessionBuilder::new(config_in(dir.path()), SimulatedPlatform::new(SimScript::default()))
                .build();
        let err = session
            .run(Mode::Install, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, VmError::InstallUnavailable));
    }

    #[tokio::test]
    async fn test_install_delegates() {
        let dir = tempfile::tempdir().unwrap();
        let session =
            SessionBuilder::new(config_in(dir.path()), SimulatedPlatform::new(SimScript::default()))
                .with_installer(Arc::new(Recorder))
                .build();
        let err = session
            .run(Mode::Install, CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.as_label(), "install_failed");
        assert!(!dir.path().join("Disk.img").exists());
    }

    #[tokio::test]
    async fn test_cancelled_before_launch() {
        let dir = tempfile::tempdir().unwrap();
        let platform = SimulatedPlatform::new(SimScript::default());
        let counters = platform.counters();
        let session = SessionBuilder::new(config_in(dir.path()), platform).build();
        let ctx = CancellationToken::new();
        ctx.cancel();

        let err = session.run(Mode::Run, ctx).await.unwrap_err();
        assert!(err.is_canceled());
        assert_eq!(counters.stop_requests(), 0);
    }
}
