//! # Syncer
//!
//! Keeps every player of a session on the same file, play state, rate and
//! position.
//!
//! ## Overview
//!
//! The syncer observes all players through a [`PlayerSet`]. A manual change
//! on one player is pushed to the others:
//!
//! 1. **Admission**: updates from followers are ignored for a while after a
//!    sync round, so their delayed echoes are not mistaken for new manual
//!    changes. See [`Arbitration`].
//! 2. **File opened**: missing instances are launched with the file and
//!    every other player not already playing it is told to open it.
//!    Followers stay ignored until the source reports the opened file's
//!    playback, which is then pushed like any other change.
//! 3. **Anything else**: non-seek fields are pushed first, then positions
//!    converge through repeated single-shot seeks unless every player is
//!    already where the source predicts.
//! 4. **Click**: a click on a player's video toggles pause on every player.
//!
//! Sync rounds are serialized. Shared state is only locked for the duration
//! of a single read or write, never across a request to a player.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let syncer = Arc::new(Syncer::new(settings, timings, launcher).with_event_bus(bus));
//! syncer.start(token, Some("file:///movie.mp4".to_string())).await?;
//! ```

use crate::changed_fields::ChangedFields;
use crate::clock::PlaybackClock;
use crate::error::{Result, SyncError};
use crate::player::{Player, PlayerObserver};
use crate::player_set::PlayerSet;
use crate::repeat::RepeatRule;
use crate::update::Update;
use crate::url::same_file;
use async_trait::async_trait;
use bridge_traits::{
    CommandGroup, ExpectedPositionGetter, InstanceHandle, InstanceId, InstanceLauncher,
    LaunchOptions, PlaybackState, StatusSample, StderrEvent, TimeRange,
};
use core_async::sync::{CancellationToken, Notify};
use core_async::time::Instant;
use core_runtime::{CoreEvent, EventBus, InstanceEvent, SyncEvent, SyncSettings, SyncTimings, Value};
use futures::future::join_all;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Who the players currently follow, and until when followers are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Arbitration {
    last_synced_from: Option<InstanceId>,
    accept_follower_updates_after: Option<Instant>,
    /// Set while the source of a file open has not reported the opened
    /// file's playback yet.
    awaiting_source: bool,
}

impl Arbitration {
    pub fn last_synced_from(&self) -> Option<InstanceId> {
        self.last_synced_from
    }

    pub fn accept_follower_updates_after(&self) -> Option<Instant> {
        self.accept_follower_updates_after
    }

    pub fn is_awaiting_source(&self) -> bool {
        self.awaiting_source
    }

    /// Whether an update observed during `window` on instance `id` is taken
    /// into account.
    pub fn admits(&self, id: InstanceId, window: &TimeRange) -> bool {
        match self.last_synced_from {
            None => true,
            Some(source) if source == id => true,
            Some(_) if self.awaiting_source => false,
            Some(_) => self
                .accept_follower_updates_after
                .map_or(true, |deadline| window.center() >= deadline),
        }
    }

    pub fn accept(&mut self, id: InstanceId) {
        self.last_synced_from = Some(id);
        self.awaiting_source = false;
    }

    /// Ignores every follower until the current source reports again.
    pub fn await_source(&mut self) {
        self.awaiting_source = self.last_synced_from.is_some();
    }

    pub fn hold_followers_until(&mut self, deadline: Instant) {
        self.accept_follower_updates_after = Some(deadline);
    }

    /// Forgets `id` as the source once it has left the session.
    pub fn release(&mut self, id: InstanceId) {
        if self.last_synced_from == Some(id) {
            *self = Self::default();
        }
    }
}

/// Fields a source update pushes to followers.
///
/// A stop is pushed alone: a rate change observed in the same sample, or a
/// file opened while stopped, stays local to the source. A state change into
/// playing or paused also pushes the position, since the follower may have
/// drifted meanwhile.
pub fn fields_to_push(update: &Update) -> ChangedFields {
    if update.changed.is_empty() {
        return ChangedFields::empty();
    }
    if update.sample.state == PlaybackState::Stopped {
        return ChangedFields::STATE;
    }
    if update.changed.contains(ChangedFields::STATE) {
        return update.changed | ChangedFields::POSITION;
    }
    update.changed
}

fn plays_file(player: &Player, file_uri: &str) -> bool {
    player
        .state()
        .last_sample()
        .is_some_and(|last| same_file(&last.file_uri, file_uri))
}

pub struct Syncer {
    settings: Arc<SyncSettings>,
    timings: Arc<SyncTimings>,
    launcher: Arc<dyn InstanceLauncher>,
    players: PlayerSet,
    clock: PlaybackClock,
    arbitration: parking_lot::Mutex<Arbitration>,
    round: core_async::sync::Mutex<()>,
    launch_lock: core_async::sync::Mutex<()>,
    file_uri: Value<Option<String>>,
    next_instance_id: AtomicU32,
    event_bus: Option<EventBus>,
}

/// Observer bound to one running session.
struct SessionObserver {
    syncer: Arc<Syncer>,
    token: CancellationToken,
}

#[async_trait]
impl PlayerObserver for SessionObserver {
    async fn on_update(&self, player: &Arc<Player>, update: Update) -> Result<()> {
        self.syncer.on_update(&self.token, player, update).await
    }

    async fn on_event(&self, player: &Arc<Player>, event: StderrEvent) -> Result<()> {
        self.syncer.on_event(&self.token, player, event).await
    }

    async fn on_finish(&self, player: &Arc<Player>) {
        self.syncer.on_finish(player);
    }
}

impl Syncer {
    pub fn new(
        settings: Arc<SyncSettings>,
        timings: Arc<SyncTimings>,
        launcher: Arc<dyn InstanceLauncher>,
    ) -> Self {
        Self {
            clock: PlaybackClock::new(&timings),
            settings,
            timings,
            launcher,
            players: PlayerSet::new(),
            arbitration: parking_lot::Mutex::new(Arbitration::default()),
            round: core_async::sync::Mutex::new(()),
            launch_lock: core_async::sync::Mutex::new(()),
            file_uri: Value::new(None),
            next_instance_id: AtomicU32::new(0),
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn players(&self) -> &PlayerSet {
        &self.players
    }

    pub fn arbitration(&self) -> Arbitration {
        self.arbitration.lock().clone()
    }

    /// File the session is playing, once one is known.
    pub fn file_uri(&self) -> Option<String> {
        self.file_uri.get()
    }

    /// Registers an instance launched outside the syncer.
    pub fn add_instance(&self, instance: Arc<dyn InstanceHandle>) -> Arc<Player> {
        self.next_instance_id
            .fetch_max(instance.id().saturating_add(1), Ordering::SeqCst);
        let player = Arc::new(Player::new(
            instance,
            Arc::clone(&self.settings),
            Arc::clone(&self.timings),
        ));
        self.players.add(Arc::clone(&player));
        player
    }

    /// Runs the session until `token` is cancelled, every instance exited or
    /// a fatal error occurred.
    ///
    /// Launches a first instance with `initial_file` if none was added.
    #[instrument(skip(self, token))]
    pub async fn start(
        self: &Arc<Self>,
        token: CancellationToken,
        initial_file: Option<String>,
    ) -> Result<()> {
        let token = token.child_token();
        if self.players.is_empty() {
            self.launch_instance(&token, initial_file).await?;
        }

        let count_changed = Arc::new(Notify::new());
        let notify = Arc::clone(&count_changed);
        let _count_subscription = self
            .settings
            .instances_number
            .subscribe(move |_| notify.notify_one());

        let observer = Arc::new(SessionObserver {
            syncer: Arc::clone(self),
            token: token.clone(),
        });

        let result = tokio::select! {
            result = self.players.wait_and_poll(token.clone(), observer) => result,
            result = self.follow_instance_count(&token, &count_changed) => result,
        };
        token.cancel();

        match &result {
            Err(SyncError::InstanceFailed { instance_id, message }) => {
                self.emit(CoreEvent::Instance(InstanceEvent::Failed {
                    instance_id: *instance_id,
                    message: message.clone(),
                }));
            }
            Err(e) if e.is_normal_shutdown() => info!("Sync session ended: {}", e),
            Err(e) => warn!("Sync session failed: {}", e),
            Ok(()) => {}
        }
        result
    }

    async fn follow_instance_count(
        &self,
        token: &CancellationToken,
        count_changed: &Notify,
    ) -> Result<()> {
        loop {
            tokio::select! {
                _ = token.cancelled() => return Err(SyncError::Cancelled),
                _ = count_changed.notified() => {}
            }
            debug!("Instances number changed to {}", self.settings.instances_number.get());
            self.launch_missing_instances(token, None).await;
        }
    }

    async fn on_update(
        &self,
        token: &CancellationToken,
        player: &Arc<Player>,
        update: Update,
    ) -> Result<()> {
        let _round = self.round.lock().await;
        let id = player.id();

        {
            let mut arbitration = self.arbitration.lock();
            if !arbitration.admits(id, &update.sample.window) {
                debug!("Ignoring update from follower {}: {}", id, update);
                return Ok(());
            }
            arbitration.accept(id);
        }
        if update.sample.has_file() {
            self.file_uri
                .set_if_changed(Some(update.sample.file_uri.clone()));
        }

        if update.changed.contains(ChangedFields::FILE_URI)
            && update.sample.state != PlaybackState::Stopped
        {
            return self.on_file_opened(token, player, &update.sample).await;
        }
        if !update.is_manual() {
            return Ok(());
        }

        self.sync_players(token, player, &update).await?;
        self.hold_followers(self.follower_skip());
        Ok(())
    }

    fn follower_skip(&self) -> core_async::time::Duration {
        self.timings
            .follower_skip_duration(self.settings.polling_interval.get())
    }

    fn hold_followers(&self, duration: core_async::time::Duration) {
        self.arbitration
            .lock()
            .hold_followers_until(Instant::now() + duration);
    }

    #[instrument(skip(self, token, source, sample), fields(source_id = source.id()))]
    async fn on_file_opened(
        &self,
        token: &CancellationToken,
        source: &Arc<Player>,
        sample: &StatusSample,
    ) -> Result<()> {
        info!("Player {} opened {}", source.id(), sample.file_uri);
        let hold = self
            .follower_skip()
            .max(self.timings.wait_for_auto_seek_after_file_opened);
        {
            let mut arbitration = self.arbitration.lock();
            arbitration.await_source();
            arbitration.hold_followers_until(Instant::now() + hold);
        }
        self.emit(CoreEvent::Sync(SyncEvent::FileOpened {
            source_id: source.id(),
            file_uri: sample.file_uri.clone(),
        }));

        let open_file = CommandGroup::open_file(sample.file_uri.clone());
        let targets = self
            .players
            .snapshot()
            .into_iter()
            .filter(|p| p.id() != source.id() && !plays_file(p, &sample.file_uri))
            .map(|p| (p, open_file.clone()))
            .collect();

        let (_, pushed) = tokio::join!(
            self.launch_missing_instances(token, Some(sample.file_uri.clone())),
            self.send_to_all(token, targets, self.repeat_until_applied()),
        );
        pushed?;

        // New instances start their own settle period once they are up.
        self.hold_followers(hold);
        Ok(())
    }

    fn repeat_until_applied(&self) -> RepeatRule {
        RepeatRule::WithInterval(self.timings.commands_repeat_interval)
    }

    #[instrument(skip(self, token, source, update), fields(source_id = source.id()))]
    async fn sync_players(
        &self,
        token: &CancellationToken,
        source: &Arc<Player>,
        update: &Update,
    ) -> Result<()> {
        info!("Syncing players to {}", update);
        let fields = fields_to_push(update);
        let commands = source.state().get_sync_commands(fields);
        let base_fields = fields.without(ChangedFields::POSITION);
        let base_commands = commands.without_seek();

        let mut targets = Vec::new();
        for player in self.players.snapshot() {
            if player.id() == source.id() {
                continue;
            }
            let own_fields = player.state().differing_fields(&update.sample);
            if own_fields.is_empty() {
                debug!("Player {} already matches", player.id());
                continue;
            }
            let group = if base_fields.includes(own_fields) {
                base_commands.clone()
            } else {
                debug!(
                    "Player {} also differs in {}",
                    player.id(),
                    own_fields.without(base_fields)
                );
                source
                    .state()
                    .get_sync_commands(base_fields | own_fields)
                    .without_seek()
            };
            if !group.is_empty() {
                targets.push((player, group));
            }
        }

        self.send_to_all(token, targets, self.repeat_until_applied())
            .await?;
        self.emit(CoreEvent::Sync(SyncEvent::PlayersSynced {
            source_id: source.id(),
            fields: fields.to_string(),
        }));

        if let Some(seek) = commands.seek {
            if self.players.len() > 1 {
                let skip = (!self.settings.re_seek_src.get()).then(|| source.id());
                self.converge_position(token, seek, skip).await?;
            }
        }
        Ok(())
    }

    /// Sends each group to its player concurrently.
    ///
    /// Players that exited meanwhile are skipped; their own poll loop reports
    /// the exit.
    async fn send_to_all(
        &self,
        token: &CancellationToken,
        targets: Vec<(Arc<Player>, CommandGroup)>,
        rule: RepeatRule,
    ) -> Result<()> {
        let results = join_all(
            targets
                .iter()
                .map(|(player, group)| player.send_cmd_group(token, group, rule)),
        )
        .await;

        for result in results {
            match result {
                Ok(_) => {}
                Err(e) if e.is_instance_finished() => debug!("Skipping finished player: {}", e),
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Seeks every player (except `skip`) until each reports the position
    /// predicted by `getter`.
    ///
    /// Nothing is sent when every player is already predicted there.
    async fn converge_position(
        &self,
        token: &CancellationToken,
        getter: ExpectedPositionGetter,
        skip: Option<InstanceId>,
    ) -> Result<()> {
        let now = Instant::now();
        let players = self.players.snapshot();
        if players.iter().all(|p| self.in_place(p, &getter, now)) {
            debug!("Players already in place");
            return Ok(());
        }

        let seek = CommandGroup::seek_only(Arc::clone(&getter));
        let max_rounds = self.timings.max_convergence_rounds;

        for round in 1..=max_rounds {
            let targets: Vec<_> = self
                .players
                .snapshot()
                .into_iter()
                .filter(|p| Some(p.id()) != skip)
                .collect();
            let results = join_all(
                targets
                    .iter()
                    .map(|player| player.send_cmd_group(token, &seek, RepeatRule::Single)),
            )
            .await;

            let mut converged = true;
            for (player, result) in targets.iter().zip(results) {
                match result {
                    Ok(sample) if self.reached(&getter, &sample) => {}
                    Ok(sample) => {
                        debug!("Player {} missed the target: {}", player.id(), sample);
                        converged = false;
                    }
                    Err(e) if e.is_recoverable() => {
                        debug!("Seek on player {} failed: {}", player.id(), e);
                        converged = false;
                    }
                    Err(e) if e.is_instance_finished() => {}
                    Err(e) => {
                        warn!("Position sync aborted: {}", e);
                        return Err(e);
                    }
                }
            }

            if converged {
                info!("Positions converged after {} round(s)", round);
                self.emit(CoreEvent::Sync(SyncEvent::PositionConverged { rounds: round }));
                return Ok(());
            }
        }

        warn!("Positions did not converge after {} rounds", max_rounds);
        Ok(())
    }

    /// Whether the last known state of `player` puts it at `getter` at `at`.
    fn in_place(&self, player: &Player, getter: &ExpectedPositionGetter, at: Instant) -> bool {
        let state = player.state();
        let Some(last) = state.last_sample() else {
            return false;
        };
        if last.state == PlaybackState::Stopped || last.length_secs == 0 {
            return true;
        }
        let Some(own) = state.get_expected_position() else {
            return true;
        };
        let tolerance = self.clock.position_tolerance(last.length_secs, last.rate);
        (own(at) - getter(at)).abs() <= tolerance
    }

    fn reached(&self, getter: &ExpectedPositionGetter, sample: &StatusSample) -> bool {
        if sample.state == PlaybackState::Stopped || sample.length_secs == 0 {
            return true;
        }
        let expected = getter(sample.window.center());
        let tolerance = self
            .clock
            .position_tolerance(sample.length_secs, sample.rate);
        (sample.position - expected).abs() <= tolerance
    }

    async fn on_event(
        &self,
        token: &CancellationToken,
        player: &Arc<Player>,
        event: StderrEvent,
    ) -> Result<()> {
        match event {
            StderrEvent::Mouse1Click => self.on_click(token, player).await,
        }
    }

    #[instrument(skip(self, token, source), fields(source_id = source.id()))]
    async fn on_click(&self, token: &CancellationToken, source: &Arc<Player>) -> Result<()> {
        if !self.settings.click_pause.get() {
            return Ok(());
        }
        let commands = source.state().get_pause_or_resume_commands();
        if commands.is_empty() {
            debug!("Click ignored, player {} is stopped", source.id());
            return Ok(());
        }

        let _round = self.round.lock().await;
        info!("Click on player {}, toggling pause", source.id());
        self.arbitration.lock().accept(source.id());

        let targets = self
            .players
            .snapshot()
            .into_iter()
            .map(|p| (p, commands.clone()))
            .collect();
        self.send_to_all(token, targets, self.repeat_until_applied())
            .await?;
        if let Some(seek) = commands.seek {
            self.converge_position(token, seek, None).await?;
        }

        self.hold_followers(self.follower_skip());
        self.emit(CoreEvent::Sync(SyncEvent::PauseToggled {
            source_id: source.id(),
        }));
        Ok(())
    }

    fn on_finish(&self, player: &Arc<Player>) {
        self.arbitration.lock().release(player.id());
        self.emit(CoreEvent::Instance(InstanceEvent::Finished {
            instance_id: player.id(),
        }));
    }

    /// Launches instances until the configured number runs.
    ///
    /// Without `file_uri` it first waits for the session to know a file.
    /// Failures are logged and do not end the session.
    async fn launch_missing_instances(&self, token: &CancellationToken, file_uri: Option<String>) {
        let _launching = self.launch_lock.lock().await;

        let file_uri = match file_uri {
            Some(uri) => uri,
            None => match self.wait_for_file_uri(token).await {
                Ok(uri) => uri,
                Err(_) => return,
            },
        };

        let missing = self
            .settings
            .instances_number
            .get()
            .saturating_sub(self.players.len());
        if missing == 0 {
            return;
        }

        info!("Launching {} instance(s) with {}", missing, file_uri);
        let results = join_all(
            (0..missing).map(|_| self.launch_instance(token, Some(file_uri.clone()))),
        )
        .await;

        for result in results {
            match result {
                Ok(_) | Err(SyncError::Cancelled) => {}
                Err(SyncError::Launch { instance_id, source }) => {
                    warn!("Failed to launch instance {}: {}", instance_id, source);
                    self.emit(CoreEvent::Instance(InstanceEvent::LaunchFailed {
                        instance_id,
                        message: source.to_string(),
                    }));
                }
                Err(e) => warn!("Failed to launch instance: {}", e),
            }
        }
    }

    async fn wait_for_file_uri(&self, token: &CancellationToken) -> Result<String> {
        let known = Arc::new(Notify::new());
        let notify = Arc::clone(&known);
        let _subscription = self.file_uri.subscribe(move |_| notify.notify_one());

        loop {
            if let Some(uri) = self.file_uri.get() {
                return Ok(uri);
            }
            debug!("Waiting for a file before launching instances");
            tokio::select! {
                _ = token.cancelled() => return Err(SyncError::Cancelled),
                _ = known.notified() => {}
            }
        }
    }

    async fn launch_instance(
        &self,
        token: &CancellationToken,
        file_uri: Option<String>,
    ) -> Result<Arc<Player>> {
        let id = self.next_instance_id.fetch_add(1, Ordering::SeqCst);
        let options = LaunchOptions {
            id,
            file_uri: file_uri.clone(),
            no_video: self.settings.no_video.get(),
        };

        let launched = tokio::select! {
            _ = token.cancelled() => return Err(SyncError::Cancelled),
            launched = self.launcher.launch(options) => launched,
        };
        let instance = launched.map_err(|source| SyncError::Launch {
            instance_id: id,
            source,
        })?;

        info!("Instance {} launched", id);
        let player = Arc::new(Player::new(
            instance,
            Arc::clone(&self.settings),
            Arc::clone(&self.timings),
        ));
        self.players.add(Arc::clone(&player));
        self.emit(CoreEvent::Instance(InstanceEvent::Launched {
            instance_id: id,
            file_uri,
        }));
        Ok(player)
    }

    fn emit(&self, event: CoreEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(event).ok();
        }
    }
}
