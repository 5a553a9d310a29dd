//! Shared fakes for the sync integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::{
    BridgeError, CommandGroup, InstanceHandle, InstanceId, InstanceLauncher, LaunchOptions,
    PlaybackState, PlayerClient, Result as BridgeResult, StatusSample, StderrEvent,
    StderrEventHandler, TimeRange, WireCommand,
};
use core_async::sync::{mpsc, watch, CancellationToken};
use core_async::time::{sleep, Duration, Instant};
use core_runtime::{SettingsSnapshot, SyncSettings, SyncTimings};
use core_sync::{Player, PlayerObserver, Update};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub const MOVIE: &str = "file:///movies/movie.mp4";
const LENGTH_SECS: u32 = 100;
const LATENCY: Duration = Duration::from_millis(2);

fn fast_timing_values() -> SyncTimings {
    SyncTimings::default()
        .with_wait_for_auto_seek_after_file_opened(Duration::from_millis(150))
        .with_commands_repeat_interval(Duration::from_millis(5))
        .with_wait_for_shutdown_after_stop(Duration::from_millis(200))
}

pub fn fast_timings() -> Arc<SyncTimings> {
    Arc::new(fast_timing_values())
}

/// Fast timings ignoring followers for `intervals` polling intervals after
/// every sync round.
pub fn fast_timings_holding_followers(intervals: f64) -> Arc<SyncTimings> {
    Arc::new(fast_timing_values().with_skip_follower_updates_polling_intervals(intervals))
}

pub fn fast_settings(instances_number: usize) -> Arc<SyncSettings> {
    Arc::new(SyncSettings::from_snapshot(SettingsSnapshot {
        instances_number,
        polling_interval: Duration::from_millis(20),
        ..SettingsSnapshot::default()
    }))
}

/// Polls `condition` until it holds or `timeout` elapses.
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(5)).await;
    }
    condition()
}

// ============================================================================
// Simulated player
// ============================================================================

#[derive(Debug, Clone)]
struct Playback {
    file_uri: String,
    state: PlaybackState,
    rate: f64,
    position: f64,
    since: Instant,
}

impl Playback {
    fn position_at(&self, at: Instant) -> f64 {
        if self.state != PlaybackState::Playing {
            return self.position;
        }
        let secs = at.saturating_duration_since(self.since).as_secs_f64();
        (self.position + secs * self.rate / f64::from(LENGTH_SECS)).min(1.0)
    }

    fn rebase(&mut self, now: Instant) {
        self.position = self.position_at(now);
        self.since = now;
    }

    fn apply(&mut self, command: &WireCommand, now: Instant) {
        self.rebase(now);
        match command {
            WireCommand::PlayFile(uri) => {
                self.file_uri = uri.clone();
                self.state = PlaybackState::Playing;
                self.position = 0.0;
            }
            WireCommand::Seek(position) => self.position = *position,
            WireCommand::Rate(rate) => self.rate = *rate,
            WireCommand::Resume => self.state = PlaybackState::Playing,
            WireCommand::Pause => self.state = PlaybackState::Paused,
            WireCommand::Stop => {
                self.state = PlaybackState::Stopped;
                self.position = 0.0;
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Exit {
    Running,
    Stopped,
    Finished,
    Failed(String),
}

/// In-memory player whose position advances with the wall clock.
pub struct FakeInstance {
    id: InstanceId,
    playback: Mutex<Playback>,
    commands: Mutex<Vec<WireCommand>>,
    failures: Mutex<VecDeque<BridgeError>>,
    command_failures: Mutex<VecDeque<BridgeError>>,
    exit: watch::Sender<Exit>,
    click_detection: AtomicBool,
    events_tx: mpsc::UnboundedSender<StderrEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<StderrEvent>>>,
}

impl FakeInstance {
    pub fn new(id: InstanceId, file_uri: Option<&str>) -> Arc<Self> {
        let (exit, _) = watch::channel(Exit::Running);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let state = if file_uri.is_some() {
            PlaybackState::Playing
        } else {
            PlaybackState::Stopped
        };
        Arc::new(Self {
            id,
            playback: Mutex::new(Playback {
                file_uri: file_uri.unwrap_or_default().to_string(),
                state,
                rate: 1.0,
                position: 0.0,
                since: Instant::now(),
            }),
            commands: Mutex::new(Vec::new()),
            failures: Mutex::new(VecDeque::new()),
            command_failures: Mutex::new(VecDeque::new()),
            exit,
            click_detection: AtomicBool::new(false),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
        })
    }

    /// Instance playing `file_uri` from `position`.
    pub fn playing(id: InstanceId, file_uri: &str, position: f64) -> Arc<Self> {
        let instance = Self::new(id, Some(file_uri));
        instance.user(WireCommand::Seek(position));
        instance
    }

    fn exit_state(&self) -> Exit {
        self.exit.borrow().clone()
    }

    fn user(&self, command: WireCommand) {
        self.playback.lock().apply(&command, Instant::now());
    }

    pub fn user_open(&self, uri: &str) {
        self.user(WireCommand::PlayFile(uri.to_string()));
    }

    pub fn user_seek(&self, position: f64) {
        self.user(WireCommand::Seek(position));
    }

    pub fn user_rate(&self, rate: f64) {
        self.user(WireCommand::Rate(rate));
    }

    pub fn user_pause(&self) {
        self.user(WireCommand::Pause);
    }

    pub fn user_stop(&self) {
        self.user(WireCommand::Stop);
    }

    /// Process exits on its own.
    pub fn exit(&self) {
        self.exit.send_replace(Exit::Finished);
    }

    /// Process crashes.
    pub fn crash(&self, message: &str) {
        self.exit.send_replace(Exit::Failed(message.to_string()));
    }

    /// Mouse click on the video surface, reported if detection is enabled.
    pub fn click(&self) {
        if self.click_detection.load(Ordering::SeqCst) {
            let _ = self.events_tx.send(StderrEvent::Mouse1Click);
        }
    }

    pub fn click_detection(&self) -> bool {
        self.click_detection.load(Ordering::SeqCst)
    }

    /// The next request fails with `err`.
    pub fn fail_next(&self, err: BridgeError) {
        self.failures.lock().push_back(err);
    }

    /// The next command group fails with `err`; status requests still work.
    pub fn fail_next_command(&self, err: BridgeError) {
        self.command_failures.lock().push_back(err);
    }

    pub fn commands(&self) -> Vec<WireCommand> {
        self.commands.lock().clone()
    }

    pub fn seeks(&self) -> Vec<f64> {
        self.commands()
            .into_iter()
            .filter_map(|c| match c {
                WireCommand::Seek(position) => Some(position),
                _ => None,
            })
            .collect()
    }

    pub fn position(&self) -> f64 {
        self.playback.lock().position_at(Instant::now())
    }

    pub fn state(&self) -> PlaybackState {
        self.playback.lock().state
    }

    pub fn rate(&self) -> f64 {
        self.playback.lock().rate
    }

    pub fn file_uri(&self) -> String {
        self.playback.lock().file_uri.clone()
    }

    fn begin_request(&self) -> BridgeResult<()> {
        if self.exit_state() != Exit::Running {
            return Err(BridgeError::Transport("connection refused".to_string()));
        }
        match self.failures.lock().pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn sample(&self, start: Instant) -> StatusSample {
        let now = Instant::now();
        let playback = self.playback.lock();
        let file_name = playback
            .file_uri
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
        StatusSample {
            window: TimeRange::new(start, now),
            length_secs: if playback.file_uri.is_empty() { 0 } else { LENGTH_SECS },
            rate: playback.rate,
            state: playback.state,
            position: playback.position_at(now),
            file_name,
            file_uri: playback.file_uri.clone(),
        }
    }
}

async fn next_event(rx: &mut Option<mpsc::UnboundedReceiver<StderrEvent>>) -> Option<StderrEvent> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[async_trait]
impl PlayerClient for FakeInstance {
    async fn get_status_ex(&self) -> BridgeResult<StatusSample> {
        let start = Instant::now();
        self.begin_request()?;
        sleep(LATENCY).await;
        Ok(self.sample(start))
    }

    async fn send_cmd_group(&self, group: &CommandGroup) -> BridgeResult<StatusSample> {
        let start = Instant::now();
        self.begin_request()?;
        if let Some(err) = self.command_failures.lock().pop_front() {
            return Err(err);
        }
        sleep(LATENCY).await;

        let now = Instant::now();
        let commands = group.to_wire_commands(now);
        {
            let mut playback = self.playback.lock();
            for command in &commands {
                playback.apply(command, now);
            }
        }
        self.commands.lock().extend(commands);
        Ok(self.sample(start))
    }

    fn is_recoverable_err(&self, err: &BridgeError) -> bool {
        matches!(
            err,
            BridgeError::Transport(_) | BridgeError::MalformedResponse(_)
        )
    }
}

#[async_trait]
impl InstanceHandle for FakeInstance {
    fn id(&self) -> InstanceId {
        self.id
    }

    fn is_running(&self) -> bool {
        self.exit_state() == Exit::Running
    }

    fn stop(&self) -> BridgeResult<()> {
        self.exit.send_replace(Exit::Stopped);
        Ok(())
    }

    fn set_click_detection(&self, enabled: bool) {
        self.click_detection.store(enabled, Ordering::SeqCst);
    }

    async fn wait(&self, token: CancellationToken, on_event: StderrEventHandler) -> BridgeResult<()> {
        let mut exit_rx = self.exit.subscribe();
        let mut events = self.events_rx.lock().take();
        loop {
            match self.exit_state() {
                Exit::Running => {}
                Exit::Stopped => return Ok(()),
                Exit::Finished => return Err(BridgeError::InstanceFinished),
                Exit::Failed(message) => return Err(BridgeError::InstanceFailed(message)),
            }
            tokio::select! {
                _ = token.cancelled() => {
                    self.stop()?;
                    return Ok(());
                }
                _ = exit_rx.changed() => {}
                Some(event) = next_event(&mut events) => on_event(event),
            }
        }
    }

    async fn finished(&self) {
        let mut exit_rx = self.exit.subscribe();
        while self.exit_state() == Exit::Running {
            if exit_rx.changed().await.is_err() {
                return;
            }
        }
    }
}

// ============================================================================
// Launcher
// ============================================================================

#[derive(Default)]
pub struct FakeLauncher {
    launched: Mutex<Vec<Arc<FakeInstance>>>,
    options: Mutex<Vec<LaunchOptions>>,
    failing: AtomicBool,
}

impl FakeLauncher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn launched(&self) -> Vec<Arc<FakeInstance>> {
        self.launched.lock().clone()
    }

    pub fn options(&self) -> Vec<LaunchOptions> {
        self.options.lock().clone()
    }
}

#[async_trait]
impl InstanceLauncher for FakeLauncher {
    async fn launch(&self, options: LaunchOptions) -> BridgeResult<Arc<dyn InstanceHandle>> {
        self.options.lock().push(options.clone());
        if self.failing.load(Ordering::SeqCst) {
            return Err(BridgeError::LaunchFailed("player binary not found".to_string()));
        }
        sleep(LATENCY).await;
        let instance = FakeInstance::new(options.id, options.file_uri.as_deref());
        self.launched.lock().push(Arc::clone(&instance));
        Ok(instance)
    }
}

// ============================================================================
// Observer
// ============================================================================

#[derive(Default)]
pub struct RecordingObserver {
    updates: Mutex<Vec<(InstanceId, Update)>>,
    events: Mutex<Vec<(InstanceId, StderrEvent)>>,
    finished: Mutex<Vec<InstanceId>>,
}

impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn updates(&self) -> Vec<(InstanceId, Update)> {
        self.updates.lock().clone()
    }

    pub fn events(&self) -> Vec<(InstanceId, StderrEvent)> {
        self.events.lock().clone()
    }

    pub fn finished(&self) -> Vec<InstanceId> {
        self.finished.lock().clone()
    }
}

#[async_trait]
impl PlayerObserver for RecordingObserver {
    async fn on_update(&self, player: &Arc<Player>, update: Update) -> core_sync::Result<()> {
        self.updates.lock().push((player.id(), update));
        Ok(())
    }

    async fn on_event(&self, player: &Arc<Player>, event: StderrEvent) -> core_sync::Result<()> {
        self.events.lock().push((player.id(), event));
        Ok(())
    }

    async fn on_finish(&self, player: &Arc<Player>) {
        self.finished.lock().push(player.id());
    }
}
