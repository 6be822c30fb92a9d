//! The game delegate: the seam where a concrete game plugs into the engine
//!
//! A delegate is consulted at manager build (decks, enums, constants, move
//! types, agents), at game setup (constructors, component distribution), and
//! after every committed move (fix-ups, finish detection). Everything has a
//! sensible default except the handful of methods a game cannot exist
//! without.

use crate::component::{ChestBuilder, Component, Deck};
use crate::error::{EngineError, Result};
use crate::moves::{Move, MoveTypeConfig};
use crate::prop::value::PlayerIndex;
use crate::sanitize::Policy;
use crate::state::{SanitizeTarget, State, SubState};
use std::collections::BTreeMap;

/// User-selected game options, key → chosen value.
pub type Variant = BTreeMap<String, String>;

/// One variant key a game offers at setup.
#[derive(Debug, Clone)]
pub struct VariantKey {
    pub name: String,
    pub values: Vec<String>,
    pub default: Option<String>,
}

/// The variant keys a game supports. Selections are validated and defaulted
/// at setup.
#[derive(Debug, Clone, Default)]
pub struct VariantConfig {
    pub keys: Vec<VariantKey>,
}

impl VariantConfig {
    /// Reject unknown keys and unknown values, then fill in defaults for
    /// keys the caller left unset.
    pub fn resolve(&self, selected: &Variant) -> Result<Variant> {
        for (k, v) in selected {
            let key = self.keys.iter().find(|key| &key.name == k).ok_or_else(|| {
                EngineError::Configuration(format!("unknown variant key {k}"))
            })?;
            if !key.values.contains(v) {
                return Err(EngineError::Configuration(format!(
                    "variant key {k} has no value {v}"
                )));
            }
        }
        let mut out = selected.clone();
        for key in &self.keys {
            if !out.contains_key(&key.name) {
                if let Some(d) = &key.default {
                    out.insert(key.name.clone(), d.clone());
                }
            }
        }
        Ok(out)
    }
}

/// Where a component lands during setup distribution: a stack-valued
/// property on the game state or on a player state, optionally a board
/// space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StarterStack {
    pub owner: StackOwner,
    pub prop: String,
    /// Board space index, for board-valued properties.
    pub space: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackOwner {
    Game,
    Player(usize),
}

impl StarterStack {
    pub fn game(prop: &str) -> Self {
        StarterStack {
            owner: StackOwner::Game,
            prop: prop.to_string(),
            space: None,
        }
    }

    pub fn player(seat: usize, prop: &str) -> Self {
        StarterStack {
            owner: StackOwner::Player(seat),
            prop: prop.to_string(),
            space: None,
        }
    }

    pub fn with_space(mut self, space: usize) -> Self {
        self.space = Some(space);
        self
    }
}

/// A concrete game's hooks into the engine.
pub trait GameDelegate: Send + Sync {
    /// Stable machine name, used in storage records.
    fn name(&self) -> &'static str;

    fn display_name(&self) -> String {
        self.name().to_string()
    }

    fn description(&self) -> String {
        String::new()
    }

    /// Bump when the wire format of this game's states changes.
    fn schema_version(&self) -> u64 {
        1
    }

    /// Register every deck on the chest. Runs once at manager build.
    fn configure_decks(&self, chest: &mut ChestBuilder) -> Result<()>;

    fn configure_enums(&self, _chest: &mut ChestBuilder) -> Result<()> {
        Ok(())
    }

    fn configure_constants(&self, _chest: &mut ChestBuilder) -> Result<()> {
        Ok(())
    }

    /// The full move catalog. Validated and bound at manager build.
    fn configure_moves(&self) -> Vec<MoveTypeConfig>;

    fn configure_agents(&self) -> Vec<Box<dyn Agent>> {
        Vec::new()
    }

    fn game_state_constructor(&self) -> Box<dyn SubState>;

    fn player_state_constructor(&self, seat: PlayerIndex) -> Box<dyn SubState>;

    /// Mutable per-component values for a deck, or None if the deck carries
    /// only immutable chest values.
    fn dynamic_component_values_constructor(&self, _deck: &Deck) -> Option<Box<dyn SubState>> {
        None
    }

    fn legal_num_players(&self, num_players: usize) -> bool {
        (1..=16).contains(&num_players)
    }

    fn variants(&self) -> VariantConfig {
        VariantConfig::default()
    }

    /// First setup hook, before components are distributed. The resolved
    /// variant selections arrive here.
    fn begin_set_up(&self, _state: &mut State, _variant: &Variant) -> Result<()> {
        Ok(())
    }

    /// Name the stack each component starts in. Called once per component
    /// of every deck, in deck registration order.
    fn distribute_component_to_starter_stack(
        &self,
        state: &State,
        component: &Component,
    ) -> Result<StarterStack>;

    /// Last setup hook, after distribution; deal hands and shuffle here.
    fn finish_set_up(&self, _state: &mut State) -> Result<()> {
        Ok(())
    }

    /// A fix-up to run against a just-committed state, or None. Consulted
    /// after every commit until it returns None.
    fn propose_fix_up(&self, _state: &State) -> Option<Box<dyn Move>> {
        None
    }

    /// Whether the game is over, and if so who won.
    fn check_game_finished(&self, _state: &State) -> (bool, Vec<PlayerIndex>) {
        (false, Vec::new())
    }

    fn current_player_index(&self, _state: &State) -> PlayerIndex {
        PlayerIndex::OBSERVER
    }

    /// The current phase value, drawn from `phase_enum` when one is named.
    fn current_phase(&self, _state: &State) -> i64 {
        0
    }

    /// Name of the phase enum, or None for games without phases. Tree
    /// enums restrict committed phases to leaves.
    fn phase_enum(&self) -> Option<&'static str> {
        None
    }

    /// Custom sanitization groups `recipient` belongs to when viewing
    /// `viewed`'s state, beyond the built-in all/self/other.
    fn group_membership(
        &self,
        _state: &State,
        _recipient: PlayerIndex,
        _viewed: PlayerIndex,
    ) -> Vec<String> {
        Vec::new()
    }

    /// Last-word override of a computed sanitization policy.
    fn sanitization_policy(&self, _target: &SanitizeTarget, computed: Policy) -> Policy {
        computed
    }

    /// Human-oriented sketch of a state, for debug output.
    fn diagram(&self, _state: &State) -> String {
        String::new()
    }
}

/// An automated player. Agents run outside the move pipeline: after each
/// player-initiated chain commits, every seated agent is shown the new state
/// and may propose.
pub trait Agent: Send + Sync {
    /// Stable machine name, referenced at game setup.
    fn name(&self) -> &'static str;

    fn display_name(&self) -> String {
        self.name().to_string()
    }

    /// Opaque byte blob persisted per seat; returned to the agent on every
    /// consultation.
    fn set_up_for_game(&self, _state: &State, _seat: PlayerIndex) -> Vec<u8> {
        Vec::new()
    }

    /// Consider the state and optionally propose a move, plus an updated
    /// blob to persist.
    fn propose_move(
        &self,
        state: &State,
        seat: PlayerIndex,
        agent_state: &[u8],
    ) -> (Option<Box<dyn Move>>, Option<Vec<u8>>);
}
