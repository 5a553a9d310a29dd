//! # Player
//!
//! One running player instance: its handle, its [`InstanceState`] and the
//! loop that polls it.
//!
//! ## Overview
//!
//! [`Player::wait_and_poll`] drives three activities until the first one
//! ends:
//!
//! - waiting for the process to exit,
//! - forwarding parsed stderr events to the observer,
//! - polling the status and reporting manual changes to the observer.
//!
//! A `Stopped` update is held back for
//! `SyncTimings::wait_for_shutdown_after_stop`. Players often report
//! `Stopped` while their process is exiting, and that must not stop every
//! other player. If the process finishes within the grace period the update
//! is dropped.

use crate::changed_fields::ChangedFields;
use crate::clock::PlaybackClock;
use crate::error::{Result, SyncError};
use crate::instance_state::InstanceState;
use crate::repeat::RepeatRule;
use crate::update::Update;
use async_trait::async_trait;
use bridge_traits::{
    BridgeError, CommandGroup, InstanceHandle, InstanceId, PlaybackState, StatusSample,
    StderrEvent,
};
use core_async::sync::{mpsc, CancellationToken};
use core_async::time::{sleep_cancellable, sleep_until_cancellable};
use core_runtime::{SyncSettings, SyncTimings};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, info_span, instrument, Instrument};

/// Receives what a polled player reports.
#[async_trait]
pub trait PlayerObserver: Send + Sync {
    /// A manual change was observed on `player`.
    async fn on_update(&self, player: &Arc<Player>, update: Update) -> Result<()>;

    /// `player` emitted a stderr event.
    async fn on_event(&self, player: &Arc<Player>, event: StderrEvent) -> Result<()>;

    /// `player`'s process exited on its own and it left the set.
    async fn on_finish(&self, _player: &Arc<Player>) {}
}

pub struct Player {
    instance: Arc<dyn InstanceHandle>,
    state: InstanceState,
    settings: Arc<SyncSettings>,
    timings: Arc<SyncTimings>,
}

impl fmt::Debug for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Player")
            .field("id", &self.id())
            .field("last", &self.state.last_sample())
            .finish()
    }
}

impl Player {
    pub fn new(
        instance: Arc<dyn InstanceHandle>,
        settings: Arc<SyncSettings>,
        timings: Arc<SyncTimings>,
    ) -> Self {
        Self {
            state: InstanceState::new(PlaybackClock::new(&timings)),
            instance,
            settings,
            timings,
        }
    }

    pub fn id(&self) -> InstanceId {
        self.instance.id()
    }

    pub fn state(&self) -> &InstanceState {
        &self.state
    }

    pub fn instance(&self) -> &Arc<dyn InstanceHandle> {
        &self.instance
    }

    pub fn is_recoverable_err(&self, err: &BridgeError) -> bool {
        self.instance.is_recoverable_err(err)
    }

    /// Waits for the instance and polls it until the instance exits, a fatal
    /// error occurs or `token` is cancelled.
    ///
    /// # Errors
    ///
    /// - [`SyncError::Cancelled`] after `token` was cancelled
    /// - [`SyncError::InstanceFinished`] when the process exited on its own
    /// - any error returned by the observer or a fatal request error
    pub async fn wait_and_poll(
        self: Arc<Self>,
        token: CancellationToken,
        observer: Arc<dyn PlayerObserver>,
    ) -> Result<()> {
        let span = info_span!("player", id = self.id());
        self.run(token, observer).instrument(span).await
    }

    async fn run(
        self: &Arc<Self>,
        token: CancellationToken,
        observer: Arc<dyn PlayerObserver>,
    ) -> Result<()> {
        self.instance
            .set_click_detection(self.settings.click_pause.get());
        let instance = Arc::clone(&self.instance);
        let _click_subscription = self
            .settings
            .click_pause
            .subscribe(move |enabled| instance.set_click_detection(*enabled));

        let token = token.child_token();
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let wait = self.instance.wait(
            token.clone(),
            Box::new(move |event| {
                let _ = event_tx.send(event);
            }),
        );
        tokio::pin!(wait);

        let events = async {
            while let Some(event) = event_rx.recv().await {
                observer.on_event(self, event).await?;
            }
            // The sender lives as long as the wait future, which wins the
            // select below once it completes.
            std::future::pending::<Result<()>>().await
        };

        let outcome = tokio::select! {
            result = &mut wait => return Err(self.wait_error(&token, result)),
            result = events => result,
            result = self.poll(&token, observer.as_ref()) => result,
        };

        token.cancel();
        if let Err(e) = wait.await {
            debug!("Instance wait after shutdown: {}", e);
        }
        outcome
    }

    fn wait_error(&self, token: &CancellationToken, result: bridge_traits::Result<()>) -> SyncError {
        let instance_id = self.id();
        match result {
            _ if token.is_cancelled() => SyncError::Cancelled,
            Ok(()) | Err(BridgeError::InstanceFinished) => {
                info!("Instance {} finished", instance_id);
                SyncError::InstanceFinished { instance_id }
            }
            Err(BridgeError::InstanceFailed(message)) => {
                SyncError::InstanceFailed { instance_id, message }
            }
            Err(source) => SyncError::Command {
                instance_id,
                recoverable: false,
                source,
            },
        }
    }

    async fn poll(
        self: &Arc<Self>,
        token: &CancellationToken,
        observer: &dyn PlayerObserver,
    ) -> Result<()> {
        loop {
            let status = tokio::select! {
                _ = token.cancelled() => return Err(SyncError::Cancelled),
                status = self.instance.get_status_ex() => status,
            };

            match status {
                Ok(sample) => self.on_new_status(token, observer, sample).await?,
                Err(e) if self.is_recoverable_err(&e) => {
                    debug!("Status request failed, retrying: {}", e);
                }
                Err(e) => return Err(self.request_error(e, false)),
            }

            sleep_cancellable(token, self.settings.polling_interval.get()).await?;
        }
    }

    async fn on_new_status(
        self: &Arc<Self>,
        token: &CancellationToken,
        observer: &dyn PlayerObserver,
        sample: StatusSample,
    ) -> Result<()> {
        let update = match self.state.apply_new_status_and_get_update(&sample) {
            Ok(update) => update,
            Err(SyncError::StaleSample) => {
                debug!("Skipping stale status: {}", sample);
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        if !update.is_manual() {
            return Ok(());
        }

        if update.changed.contains(ChangedFields::STATE)
            && update.sample.state == PlaybackState::Stopped
        {
            tokio::select! {
                _ = self.instance.finished() => {
                    debug!("Instance exited after reporting stop, dropping update");
                    return Ok(());
                }
                slept = sleep_cancellable(token, self.timings.wait_for_shutdown_after_stop) => slept?,
            }
        }

        info!("Update: {}", update);
        let file_opened_at = update
            .changed
            .contains(ChangedFields::FILE_URI)
            .then(|| update.sample.window.center());

        observer.on_update(self, update).await?;

        if let Some(opened_at) = file_opened_at {
            // Let the player finish its own resume-position seek.
            let settle = opened_at + self.timings.wait_for_auto_seek_after_file_opened;
            sleep_until_cancellable(token, settle).await?;
        }
        Ok(())
    }

    /// Sends `group` to the instance and applies the resulting status.
    ///
    /// Recoverable failures are retried according to `rule`.
    #[instrument(skip(self, token, group), fields(instance_id = self.id()))]
    pub async fn send_cmd_group(
        &self,
        token: &CancellationToken,
        group: &CommandGroup,
        rule: RepeatRule,
    ) -> Result<StatusSample> {
        loop {
            let result = tokio::select! {
                _ = token.cancelled() => return Err(SyncError::Cancelled),
                result = self.instance.send_cmd_group(group) => result,
            };

            let err = match result {
                Ok(sample) => {
                    debug!("Command result: {}", sample);
                    self.state.apply_new_status(&sample);
                    return Ok(sample);
                }
                Err(e) => e,
            };

            let recoverable = self.is_recoverable_err(&err);
            match rule.interval() {
                Some(interval) if recoverable && self.instance.is_running() => {
                    debug!("Command {:?} failed, retrying: {}", group, err);
                    sleep_cancellable(token, interval).await?;
                }
                _ => return Err(self.request_error(err, recoverable)),
            }
        }
    }

    fn request_error(&self, source: BridgeError, recoverable: bool) -> SyncError {
        let instance_id = self.id();
        if !self.instance.is_running() {
            return SyncError::InstanceFinished { instance_id };
        }
        SyncError::Command {
            instance_id,
            recoverable,
            source,
        }
    }
}
