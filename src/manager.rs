//! The game manager: one immutable bundle of everything shared across games
//! of a type
//!
//! `GameManagerBuilder::build` runs every delegate configuration hook once,
//! freezes the chest, inspects one exemplar of each registered struct, and
//! binds the move catalog. After that the manager is read-only and shared
//! behind an `Arc` by every game worker.

use crate::component::{ChestBuilder, ComponentChest};
use crate::delegate::{Agent, GameDelegate};
use crate::error::{EngineError, Result};
use crate::game::{spawn_game, Game};
use crate::moves::{check_duplicate_names, MoveType, MoveTypeInfo};
use crate::prop::inflate::{InflateScope, StructInflater};
use crate::prop::value::PlayerIndex;
use crate::state::State;
use crate::storage::{GameRecord, StorageProvider};
use crate::timer::TimerManager;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Default bound on consecutive fix-up applications within one chain.
pub const DEFAULT_FIX_UP_CHAIN_MAX: usize = 200;

pub struct GameManagerBuilder {
    delegate: Arc<dyn GameDelegate>,
    storage: Arc<dyn StorageProvider>,
    fix_up_chain_max: usize,
}

impl GameManagerBuilder {
    pub fn new(delegate: Arc<dyn GameDelegate>, storage: Arc<dyn StorageProvider>) -> Self {
        GameManagerBuilder {
            delegate,
            storage,
            fix_up_chain_max: DEFAULT_FIX_UP_CHAIN_MAX,
        }
    }

    /// Override the runaway-fix-up bound.
    pub fn with_fix_up_chain_max(mut self, max: usize) -> Self {
        self.fix_up_chain_max = max;
        self
    }

    /// Run every configuration hook, validate everything, and freeze.
    pub fn build(self) -> Result<Arc<GameManager>> {
        let delegate = self.delegate;

        let mut chest_builder = ChestBuilder::new();
        delegate.configure_decks(&mut chest_builder)?;
        delegate.configure_enums(&mut chest_builder)?;
        delegate.configure_constants(&mut chest_builder)?;
        let chest = chest_builder.build();

        if chest.deck_names().is_empty() {
            return Err(EngineError::Configuration(
                "delegate registered no decks".to_string(),
            ));
        }
        if let Some(enum_name) = delegate.phase_enum() {
            if chest.enums().get(enum_name).is_none() {
                return Err(EngineError::Configuration(format!(
                    "phase enum {enum_name} is not registered on the chest"
                )));
            }
        }

        let game_exemplar = delegate.game_state_constructor();
        let game_inflater =
            StructInflater::inspect(game_exemplar.as_ref(), &chest, InflateScope::GameState)?;
        let player_exemplar = delegate.player_state_constructor(PlayerIndex::new(0));
        let player_inflater =
            StructInflater::inspect(player_exemplar.as_ref(), &chest, InflateScope::PlayerState)?;

        let mut dynamic_inflaters = FxHashMap::default();
        for deck in chest.decks() {
            if let Some(exemplar) = delegate.dynamic_component_values_constructor(deck) {
                let inflater = StructInflater::inspect(
                    exemplar.as_ref(),
                    &chest,
                    InflateScope::DynamicValues,
                )?;
                dynamic_inflaters.insert(deck.name().to_string(), inflater);
            }
        }

        let configs = delegate.configure_moves();
        if configs.is_empty() {
            return Err(EngineError::Configuration(
                "delegate registered no moves".to_string(),
            ));
        }
        check_duplicate_names(&configs)?;
        let mut move_types = Vec::with_capacity(configs.len());
        for config in configs {
            let exemplar = (config.constructor)();
            StructInflater::inspect(exemplar.as_ref(), &chest, InflateScope::Move).map_err(
                |e| {
                    EngineError::Configuration(format!(
                        "move type {}: {e}",
                        config.name
                    ))
                },
            )?;
            if let Some(enum_name) = delegate.phase_enum() {
                let def = chest.enums().get(enum_name).expect("checked above");
                for phase in &config.legal_phases {
                    if !def.contains(*phase) {
                        return Err(EngineError::Configuration(format!(
                            "move type {} lists phase {phase} outside enum {enum_name}",
                            config.name
                        )));
                    }
                }
            }
            move_types.push(MoveType::new(config));
        }

        let agents = delegate.configure_agents();
        for (i, a) in agents.iter().enumerate() {
            if agents[..i].iter().any(|b| b.name() == a.name()) {
                return Err(EngineError::Configuration(format!(
                    "agent {} registered twice",
                    a.name()
                )));
            }
        }

        Ok(Arc::new(GameManager {
            delegate,
            storage: self.storage,
            chest,
            move_types,
            game_inflater,
            player_inflater,
            dynamic_inflaters,
            agents,
            timers: TimerManager::new(),
            timer_driver: Mutex::new(None),
            fix_up_chain_max: self.fix_up_chain_max,
        }))
    }
}

/// Frozen per-game-type configuration shared by all running games.
pub struct GameManager {
    delegate: Arc<dyn GameDelegate>,
    storage: Arc<dyn StorageProvider>,
    chest: ComponentChest,
    move_types: Vec<MoveType>,
    game_inflater: StructInflater,
    player_inflater: StructInflater,
    dynamic_inflaters: FxHashMap<String, StructInflater>,
    agents: Vec<Box<dyn Agent>>,
    timers: Arc<TimerManager>,
    timer_driver: Mutex<Option<tokio::task::JoinHandle<()>>>,
    fix_up_chain_max: usize,
}

impl GameManager {
    pub fn delegate(&self) -> &dyn GameDelegate {
        self.delegate.as_ref()
    }

    pub fn storage(&self) -> &dyn StorageProvider {
        self.storage.as_ref()
    }

    pub fn chest(&self) -> &ComponentChest {
        &self.chest
    }

    pub fn move_type(&self, name: &str) -> Option<&MoveType> {
        self.move_types.iter().find(|m| m.name() == name)
    }

    pub fn move_types(&self) -> &[MoveType] {
        &self.move_types
    }

    /// Catalog summaries, for clients building proposal UIs.
    pub fn move_type_infos(&self) -> Vec<MoveTypeInfo> {
        self.move_types.iter().map(MoveType::info).collect()
    }

    pub fn agent(&self, name: &str) -> Option<&dyn Agent> {
        self.agents
            .iter()
            .find(|a| a.name() == name)
            .map(|a| a.as_ref())
    }

    pub fn agents(&self) -> impl Iterator<Item = &dyn Agent> {
        self.agents.iter().map(|a| a.as_ref())
    }

    pub fn timers(&self) -> &Arc<TimerManager> {
        &self.timers
    }

    pub fn fix_up_chain_max(&self) -> usize {
        self.fix_up_chain_max
    }

    pub(crate) fn game_inflater(&self) -> &StructInflater {
        &self.game_inflater
    }

    pub(crate) fn player_inflater(&self) -> &StructInflater {
        &self.player_inflater
    }

    pub(crate) fn dynamic_inflater(&self, deck: &str) -> Option<&StructInflater> {
        self.dynamic_inflaters.get(deck)
    }

    /// Spawn the timer driver once, on the current runtime. Idempotent.
    pub(crate) fn ensure_timer_driver(&self) {
        let mut guard = self.timer_driver.lock();
        if guard.is_none() {
            *guard = Some(self.timers.spawn_driver());
        }
    }

    /// Create a fresh, not-yet-set-up game with its own worker task. Must
    /// run on a tokio runtime.
    pub fn new_game(self: &Arc<Self>) -> Game {
        self.ensure_timer_driver();
        spawn_game(Arc::clone(self))
    }

    /// Load a committed state for inspection, without a worker. Defaults to
    /// the game's current version.
    pub fn read_only_game(
        &self,
        game_id: &str,
        version: Option<u64>,
    ) -> Result<(GameRecord, State)> {
        let record = self.storage.game(game_id)?;
        let version = version.unwrap_or(record.version);
        let bytes = self.storage.state(game_id, version)?;
        let state = self.state_from_bytes(&bytes, game_id, &record.secret_salt)?;
        Ok((record, state))
    }

    /// Deserialize a state from its wire bytes.
    pub fn state_from_bytes(&self, bytes: &[u8], game_id: &str, salt: &str) -> Result<State> {
        let wire: serde_json::Value = serde_json::from_slice(bytes)?;
        State::from_wire(self, &wire, game_id, salt)
    }
}

impl Drop for GameManager {
    fn drop(&mut self) {
        if let Some(handle) = self.timer_driver.lock().take() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for GameManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameManager")
            .field("game", &self.delegate.name())
            .field("decks", &self.chest.deck_names().len())
            .field("move_types", &self.move_types.len())
            .finish()
    }
}
