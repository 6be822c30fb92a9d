//! Timer subsystem: wall-clock expirations that become proposed moves
//!
//! The manager owns a single priority queue keyed by expiration. Timer
//! properties on states carry only an opaque id; the queue is authoritative.
//! A fired timer proposes its recorded move with proposer = admin, unless
//! the state it was started against has since been superseded, in which case
//! it is discarded.

use crate::game::Game;
use crate::moves::Move;
use crate::prop::PlayerIndex;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// A timer-valued state property. Inactive timers have an empty id.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Timer {
    id: String,
}

impl Timer {
    pub fn inactive() -> Self {
        Timer::default()
    }

    pub fn with_id(id: String) -> Self {
        Timer { id }
    }

    pub fn is_active(&self) -> bool {
        !self.id.is_empty()
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn set_id(&mut self, id: String) {
        self.id = id;
    }

    pub(crate) fn deactivate(&mut self) {
        self.id.clear();
    }
}

struct TimerRecord {
    duration: Duration,
    /// None until `start`; time does not run while merely prepared.
    expires: Option<Instant>,
    game: Game,
    /// Version of the state the timer was started against. If the game has
    /// moved past it by fire time, the record is discarded.
    state_version: u64,
    mv: Option<Box<dyn Move>>,
}

#[derive(Default)]
struct TimerQueue {
    records: FxHashMap<String, TimerRecord>,
    // Cancelled ids stay in the heap as tombstones and are skipped on pop.
    heap: BinaryHeap<Reverse<(Instant, String)>>,
}

/// The single priority queue turning expirations into proposals.
pub struct TimerManager {
    inner: Mutex<TimerQueue>,
    /// Woken whenever the earliest expiration may have changed.
    rearm: Notify,
}

impl std::fmt::Debug for TimerManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("TimerManager")
            .field("records", &inner.records.len())
            .finish()
    }
}

fn random_id() -> String {
    use rand::Rng;
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill(&mut bytes);
    hex::encode(bytes)
}

impl TimerManager {
    pub fn new() -> Arc<Self> {
        Arc::new(TimerManager {
            inner: Mutex::new(TimerQueue::default()),
            rearm: Notify::new(),
        })
    }

    /// Record an intent to fire `mv` against `game` after `duration`. Time
    /// does not start until `start`. Returns the opaque timer id.
    pub fn prepare(
        &self,
        duration: Duration,
        game: Game,
        state_version: u64,
        mv: Box<dyn Move>,
    ) -> String {
        let id = random_id();
        self.register(id.clone(), duration, game, state_version, mv);
        id
    }

    /// Record an intent under a caller-supplied id. Used when the id was
    /// already minted into a state's timer property before commit.
    pub(crate) fn register(
        &self,
        id: String,
        duration: Duration,
        game: Game,
        state_version: u64,
        mv: Box<dyn Move>,
    ) {
        self.inner.lock().records.insert(
            id,
            TimerRecord {
                duration,
                expires: None,
                game,
                state_version,
                mv: Some(mv),
            },
        );
    }

    /// Start a prepared timer: expiration = now + duration.
    pub fn start(&self, id: &str) {
        let mut inner = self.inner.lock();
        if let Some(rec) = inner.records.get_mut(id) {
            if rec.expires.is_none() {
                let expires = Instant::now() + rec.duration;
                rec.expires = Some(expires);
                inner.heap.push(Reverse((expires, id.to_string())));
            }
        }
        drop(inner);
        self.rearm.notify_one();
    }

    /// Cancel immediately. The heap entry becomes a tombstone the driver
    /// skips.
    pub fn cancel(&self, id: &str) {
        self.inner.lock().records.remove(id);
    }

    /// Remaining duration, or zero for unknown, unstarted-and-fired, or
    /// expired timers. Unstarted prepared timers report their full duration.
    pub fn remaining(&self, id: &str) -> Duration {
        let inner = self.inner.lock();
        match inner.records.get(id) {
            Some(rec) => match rec.expires {
                Some(expires) => expires.saturating_duration_since(Instant::now()),
                None => rec.duration,
            },
            None => Duration::ZERO,
        }
    }

    pub fn is_prepared(&self, id: &str) -> bool {
        self.inner.lock().records.contains_key(id)
    }

    /// Earliest live expiration, for driver scheduling.
    pub fn next_expiration(&self) -> Option<Instant> {
        let mut inner = self.inner.lock();
        while let Some(Reverse((at, id))) = inner.heap.peek().cloned() {
            if inner.records.contains_key(&id) {
                return Some(at);
            }
            // Tombstone from a cancel.
            inner.heap.pop();
        }
        None
    }

    /// Fire every record whose expiration has passed, proposing each
    /// recorded move with proposer = admin. Records started against a
    /// superseded state version are discarded without proposing.
    pub async fn tick(&self) {
        let now = Instant::now();
        let mut due: Vec<(Game, u64, Box<dyn Move>)> = Vec::new();
        {
            let mut inner = self.inner.lock();
            while let Some(Reverse((at, id))) = inner.heap.peek().cloned() {
                if at > now {
                    break;
                }
                inner.heap.pop();
                if let Some(mut rec) = inner.records.remove(&id) {
                    if let Some(mv) = rec.mv.take() {
                        due.push((rec.game, rec.state_version, mv));
                    }
                }
            }
        }
        for (game, state_version, mv) in due {
            if game.version() > state_version {
                log::debug!(
                    "discarding stale timer for game {}: prepared at v{}, game at v{}",
                    game.id(),
                    state_version,
                    game.version()
                );
                continue;
            }
            if let Err(e) = game.propose_move(mv, PlayerIndex::ADMIN).await {
                log::warn!("timer-fired move rejected for game {}: {e}", game.id());
            }
        }
    }

    /// Spawn the background driver: sleeps until the next expiration (or an
    /// idle bound), re-armed whenever a timer starts. Abort the returned
    /// handle to stop it.
    pub fn spawn_driver(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let mgr = Arc::clone(self);
        tokio::spawn(async move {
            const IDLE: Duration = Duration::from_secs(60);
            loop {
                let deadline = mgr
                    .next_expiration()
                    .unwrap_or_else(|| Instant::now() + IDLE);
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => {
                        mgr.tick().await;
                    }
                    _ = mgr.rearm.notified() => {}
                }
            }
        })
    }
}
