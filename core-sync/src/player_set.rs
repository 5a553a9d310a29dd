//! # Player Set
//!
//! Supervised group of [`Player`]s that accepts new members while running.
//!
//! ## Overview
//!
//! [`PlayerSet::wait_and_poll`] spawns one task per player and collects
//! their results. Players added later are spawned by [`PlayerSet::add`]
//! under the same lock, with a child of the running token, so a late player
//! never outlives the set.
//!
//! - A player whose process exits on its own is removed and reported through
//!   [`PlayerObserver::on_finish`]. The set keeps running.
//! - The first other error cancels every player and is returned.
//! - When the last player leaves, [`SyncError::AllInstancesFinished`] is
//!   returned.

use crate::error::{Result, SyncError};
use crate::player::{Player, PlayerObserver};
use bridge_traits::InstanceId;
use core_async::sync::{mpsc, CancellationToken};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

type Outcome = (InstanceId, Result<()>);

struct WaitContext {
    token: CancellationToken,
    observer: Arc<dyn PlayerObserver>,
    done_tx: mpsc::UnboundedSender<Outcome>,
}

#[derive(Default)]
struct Inner {
    players: Vec<Arc<Player>>,
    wait: Option<WaitContext>,
}

/// Players of one session.
#[derive(Default)]
pub struct PlayerSet {
    inner: Mutex<Inner>,
}

fn spawn_player(player: Arc<Player>, ctx: &WaitContext) {
    let token = ctx.token.child_token();
    let observer = Arc::clone(&ctx.observer);
    let done_tx = ctx.done_tx.clone();
    core_async::task::spawn(async move {
        let id = player.id();
        let result = player.wait_and_poll(token, observer).await;
        let _ = done_tx.send((id, result));
    });
}

impl PlayerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `player`. If the set is running it starts polling right away.
    pub fn add(&self, player: Arc<Player>) {
        let mut inner = self.inner.lock();
        if let Some(ctx) = &inner.wait {
            spawn_player(Arc::clone(&player), ctx);
        }
        debug!("Player {} added", player.id());
        inner.players.push(player);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().players.is_empty()
    }

    /// Current members, in insertion order.
    pub fn snapshot(&self) -> Vec<Arc<Player>> {
        self.inner.lock().players.clone()
    }

    fn remove(&self, id: InstanceId) -> Option<(Arc<Player>, usize)> {
        let mut inner = self.inner.lock();
        let index = inner.players.iter().position(|p| p.id() == id)?;
        let player = inner.players.remove(index);
        Some((player, inner.players.len()))
    }

    /// Polls every member until one fails, all of them exit or `token` is
    /// cancelled.
    ///
    /// # Errors
    ///
    /// - [`SyncError::AlreadyWaiting`] if another call is running
    /// - [`SyncError::AllInstancesFinished`] once no player is left
    /// - [`SyncError::Cancelled`] after `token` was cancelled
    /// - the first error reported by a player
    pub async fn wait_and_poll(
        &self,
        token: CancellationToken,
        observer: Arc<dyn PlayerObserver>,
    ) -> Result<()> {
        let token = token.child_token();
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();
        {
            let mut inner = self.inner.lock();
            if inner.wait.is_some() {
                return Err(SyncError::AlreadyWaiting);
            }
            if inner.players.is_empty() {
                return Err(SyncError::AllInstancesFinished);
            }
            let ctx = WaitContext {
                token: token.clone(),
                observer: Arc::clone(&observer),
                done_tx,
            };
            for player in &inner.players {
                spawn_player(Arc::clone(player), &ctx);
            }
            inner.wait = Some(ctx);
        }

        let outcome = self.collect(&token, &mut done_rx, observer.as_ref()).await;

        token.cancel();
        // Dropping the context drops the last sender kept outside the tasks.
        drop(self.inner.lock().wait.take());
        while let Some((id, result)) = done_rx.recv().await {
            if let Err(e) = result {
                debug!("Player {} stopped: {}", id, e);
            }
        }
        outcome
    }

    async fn collect(
        &self,
        token: &CancellationToken,
        done_rx: &mut mpsc::UnboundedReceiver<Outcome>,
        observer: &dyn PlayerObserver,
    ) -> Result<()> {
        loop {
            let (id, result) = tokio::select! {
                _ = token.cancelled() => return Err(SyncError::Cancelled),
                done = done_rx.recv() => match done {
                    Some(done) => done,
                    None => return Err(SyncError::AllInstancesFinished),
                },
            };

            match result {
                Err(e) if e.is_instance_finished() => {
                    let Some((player, left)) = self.remove(id) else {
                        continue;
                    };
                    info!("Player {} left, {} remaining", id, left);
                    observer.on_finish(&player).await;
                    if left == 0 {
                        return Err(SyncError::AllInstancesFinished);
                    }
                }
                Err(e) => {
                    warn!("Player {} failed: {}", id, e);
                    return Err(e);
                }
                Ok(()) => {
                    debug!("Player {} returned without error", id);
                }
            }
        }
    }
}
