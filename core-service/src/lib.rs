//! Sync service facade and bootstrap helpers.
//!
//! This crate wires the host-provided [`InstanceLauncher`] and settings into
//! the sync engine. Hosts (a CLI, a tray agent) build a [`SyncService`], keep
//! a handle to its live settings and event stream, and drive it with
//! [`SyncService::run`].
//!
//! ```rust,ignore
//! let service = SyncService::builder()
//!     .launcher(Arc::new(VlcLauncher::new(vlc_path)))
//!     .settings(SettingsSnapshot { instances_number: 3, ..Default::default() })
//!     .build()?;
//!
//! let mut events = service.events();
//! service.run(token, Some("file:///movies/movie.mp4".to_string())).await?;
//! ```

pub mod error;

pub use error::{Result, ServiceError};

pub use core_runtime::events::EventStream;
pub use core_runtime::{
    CoreEvent, EventBus, InstanceEvent, SettingsPatch, SettingsSnapshot, SyncEvent, SyncSettings,
    SyncTimings,
};

use bridge_traits::{InstanceHandle, InstanceLauncher};
use core_async::sync::CancellationToken;
use core_sync::Syncer;
use std::sync::Arc;
use tracing::{error, info, instrument};

/// Primary facade exposed to host applications.
pub struct SyncService {
    settings: Arc<SyncSettings>,
    timings: Arc<SyncTimings>,
    event_bus: EventBus,
    syncer: Arc<Syncer>,
}

impl SyncService {
    pub fn builder() -> SyncServiceBuilder {
        SyncServiceBuilder::default()
    }

    /// Live settings. Changes apply to a running session.
    pub fn settings(&self) -> Arc<SyncSettings> {
        Arc::clone(&self.settings)
    }

    pub fn timings(&self) -> &SyncTimings {
        &self.timings
    }

    /// Validates and applies an external settings change.
    ///
    /// Returns whether any value changed. An invalid patch leaves every
    /// setting untouched.
    pub fn apply_settings_patch(&self, patch: &SettingsPatch) -> Result<bool> {
        Ok(self.settings.apply_patch(patch)?)
    }

    /// Subscribes to instance and sync events.
    pub fn events(&self) -> EventStream {
        EventStream::new(self.event_bus.subscribe())
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn syncer(&self) -> &Arc<Syncer> {
        &self.syncer
    }

    /// Registers an instance the host launched itself, typically the one
    /// the user started.
    pub fn add_instance(&self, instance: Arc<dyn InstanceHandle>) {
        self.syncer.add_instance(instance);
    }

    /// Runs a sync session until `token` is cancelled or every instance has
    /// exited, both of which count as success.
    ///
    /// # Errors
    ///
    /// The first fatal error of the session: a crashed instance, a rejected
    /// request, or a failed launch of the first instance.
    #[instrument(skip(self, token))]
    pub async fn run(&self, token: CancellationToken, initial_file: Option<String>) -> Result<()> {
        match self.syncer.start(token, initial_file).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_normal_shutdown() => {
                info!("Sync session finished: {}", e);
                Ok(())
            }
            Err(e) => {
                error!("Sync session failed: {}", e);
                Err(e.into())
            }
        }
    }
}

/// Builder for [`SyncService`].
///
/// A launcher is required; settings and timings fall back to their
/// defaults.
#[derive(Default)]
pub struct SyncServiceBuilder {
    launcher: Option<Arc<dyn InstanceLauncher>>,
    settings: Option<SettingsSnapshot>,
    timings: Option<SyncTimings>,
    event_bus: Option<EventBus>,
    instances: Vec<Arc<dyn InstanceHandle>>,
}

impl SyncServiceBuilder {
    pub fn launcher(mut self, launcher: Arc<dyn InstanceLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    pub fn settings(mut self, settings: SettingsSnapshot) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn timings(mut self, timings: SyncTimings) -> Self {
        self.timings = Some(timings);
        self
    }

    pub fn event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Adds an already running instance to the session.
    pub fn instance(mut self, instance: Arc<dyn InstanceHandle>) -> Self {
        self.instances.push(instance);
        self
    }

    pub fn build(self) -> Result<SyncService> {
        let launcher = self.launcher.ok_or_else(|| ServiceError::CapabilityMissing {
            capability: "InstanceLauncher".to_string(),
            message: "An InstanceLauncher is required to start player instances. \
                      Use .launcher() to provide one."
                .to_string(),
        })?;

        let snapshot = self.settings.unwrap_or_default();
        snapshot.validate()?;
        let timings = self.timings.unwrap_or_default();
        timings.validate()?;

        let settings = Arc::new(SyncSettings::from_snapshot(snapshot));
        let timings = Arc::new(timings);
        let event_bus = self.event_bus.unwrap_or_default();
        let syncer = Arc::new(
            Syncer::new(Arc::clone(&settings), Arc::clone(&timings), launcher)
                .with_event_bus(event_bus.clone()),
        );
        for instance in self.instances {
            syncer.add_instance(instance);
        }

        Ok(SyncService {
            settings,
            timings,
            event_bus,
            syncer,
        })
    }
}
