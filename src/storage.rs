//! Storage: persistence seam for games, states, moves, and agent blobs
//!
//! Every commit saves the game record and the new state (and its move
//! record) in one call so providers can make the write atomic. A storage
//! failure halts the owning game until `clear_storage_error`.

use crate::delegate::Variant;
use crate::error::{EngineError, Result};
use crate::moves::MoveRecord;
use crate::prop::value::PlayerIndex;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Persistent identity and status of one game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GameRecord {
    pub id: String,
    /// The delegate's machine name.
    pub name: String,
    /// Feeds component id derivation; never serialized for recipients.
    pub secret_salt: String,
    pub version: u64,
    pub num_players: usize,
    pub finished: bool,
    pub winners: Vec<PlayerIndex>,
    pub created: DateTime<Utc>,
    /// Agent name per seat; empty string for human seats.
    pub agents: Vec<String>,
    pub variant: Variant,
}

impl GameRecord {
    /// The record as recipients see it: identical but with the salt
    /// blanked.
    pub fn for_recipient(&self) -> GameRecord {
        let mut out = self.clone();
        out.secret_salt = String::new();
        out
    }
}

/// A persistence backend. All methods are synchronous; providers needing
/// async I/O bridge internally.
pub trait StorageProvider: Send + Sync {
    fn game(&self, game_id: &str) -> Result<GameRecord>;

    /// The serialized state at an exact version.
    fn state(&self, game_id: &str, version: u64) -> Result<Vec<u8>>;

    /// The move that produced `version`.
    fn mov(&self, game_id: &str, version: u64) -> Result<MoveRecord>;

    /// Moves producing versions in `[from, to]`, ascending.
    fn moves(&self, game_id: &str, from: u64, to: u64) -> Result<Vec<MoveRecord>>;

    /// Persist a commit: the updated game record, the new current state,
    /// and (except at setup) the move that produced it.
    fn save_game_and_current_state(
        &self,
        game: &GameRecord,
        state: &[u8],
        mv: Option<&MoveRecord>,
    ) -> Result<()>;

    fn agent_state(&self, game_id: &str, seat: PlayerIndex) -> Result<Vec<u8>>;

    fn save_agent_state(&self, game_id: &str, seat: PlayerIndex, blob: &[u8]) -> Result<()>;

    /// Notification that a player-initiated chain finished committing.
    fn player_move_applied(&self, _game: &GameRecord) -> Result<()> {
        Ok(())
    }
}

#[derive(Default)]
struct MemoryInner {
    games: FxHashMap<String, GameRecord>,
    states: FxHashMap<(String, u64), Vec<u8>>,
    moves: FxHashMap<(String, u64), MoveRecord>,
    agent_blobs: FxHashMap<(String, i32), Vec<u8>>,
}

/// In-process provider backing tests and single-node servers.
#[derive(Default)]
pub struct MemoryStorage {
    inner: RwLock<MemoryInner>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        MemoryStorage::default()
    }
}

fn missing(what: &str, id: &str) -> EngineError {
    EngineError::Storage(format!("{what} {id} not found"))
}

impl StorageProvider for MemoryStorage {
    fn game(&self, game_id: &str) -> Result<GameRecord> {
        self.inner
            .read()
            .games
            .get(game_id)
            .cloned()
            .ok_or_else(|| missing("game", game_id))
    }

    fn state(&self, game_id: &str, version: u64) -> Result<Vec<u8>> {
        self.inner
            .read()
            .states
            .get(&(game_id.to_string(), version))
            .cloned()
            .ok_or_else(|| missing("state", &format!("{game_id}@{version}")))
    }

    fn mov(&self, game_id: &str, version: u64) -> Result<MoveRecord> {
        self.inner
            .read()
            .moves
            .get(&(game_id.to_string(), version))
            .cloned()
            .ok_or_else(|| missing("move", &format!("{game_id}@{version}")))
    }

    fn moves(&self, game_id: &str, from: u64, to: u64) -> Result<Vec<MoveRecord>> {
        let inner = self.inner.read();
        let mut out = Vec::new();
        for v in from..=to {
            if let Some(m) = inner.moves.get(&(game_id.to_string(), v)) {
                out.push(m.clone());
            }
        }
        Ok(out)
    }

    fn save_game_and_current_state(
        &self,
        game: &GameRecord,
        state: &[u8],
        mv: Option<&MoveRecord>,
    ) -> Result<()> {
        let mut inner = self.inner.write();
        inner.games.insert(game.id.clone(), game.clone());
        inner
            .states
            .insert((game.id.clone(), game.version), state.to_vec());
        if let Some(m) = mv {
            inner.moves.insert((game.id.clone(), m.version), m.clone());
        }
        Ok(())
    }

    fn agent_state(&self, game_id: &str, seat: PlayerIndex) -> Result<Vec<u8>> {
        Ok(self
            .inner
            .read()
            .agent_blobs
            .get(&(game_id.to_string(), seat.0))
            .cloned()
            .unwrap_or_default())
    }

    fn save_agent_state(&self, game_id: &str, seat: PlayerIndex, blob: &[u8]) -> Result<()> {
        self.inner
            .write()
            .agent_blobs
            .insert((game_id.to_string(), seat.0), blob.to_vec());
        Ok(())
    }
}
