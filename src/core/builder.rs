use std::sync::Arc;

use crate::{
    config::Config,
    events::Bus,
    platform::Platform,
    subscribers::Subscribe,
};

use super::session::{Installer, Session};

/// Builder for a [`Session`] with optional subscribers and installer.
pub struct SessionBuilder<P: Platform> {
    cfg: Config,
    platform: P,
    subscribers: Vec<Arc<dyn Subscribe>>,
    installer: Option<Arc<dyn Installer>>,
}

impl<P: Platform> SessionBuilder<P> {
    pub fn new(cfg: Config, platform: P) -> Self {
        Self {
            cfg,
            platform,
            subscribers: Vec::new(),
            installer: None,
        }
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive session events (transitions, stop attempts,
    /// escalation) through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Enables [`Mode::Install`](super::Mode::Install).
    pub fn with_installer(mut self, installer: Arc<dyn Installer>) -> Self {
        self.installer = Some(installer);
        self
    }

    /// Builds the session. Subscriber workers start when it runs.
    pub fn build(self) -> Session<P> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        Session::new_internal(
            self.cfg,
            self.platform,
            bus,
            self.subscribers,
            self.installer,
        )
    }
}
