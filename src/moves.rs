//! Move types: proposals that transform a state into its successor
//!
//! A move is a struct of scalar/slice properties plus pure `legal` and
//! scratchpad-mutating `apply` callbacks. Move types use a two-phase API:
//! `MoveTypeConfig` is the describe side, usable without a manager for
//! inspection; binding happens only inside `GameManagerBuilder::build`,
//! which validates every config and yields instantiable `MoveType`s.

use crate::error::{EngineError, Result};
use crate::prop::reader::PropertyReadSetter;
use crate::prop::value::PlayerIndex;
use crate::state::State;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A typed move request. Implementations carry only scalar and slice
/// properties; `legal` must be pure and `apply` mutates only the scratch
/// state it is given.
pub trait Move: PropertyReadSetter + fmt::Debug + Send {
    /// The move type's registered name.
    fn name(&self) -> &str;

    fn clone_box(&self) -> Box<dyn Move>;

    /// Fill a skeleton instance with sensible values for the given state,
    /// before user customization.
    fn defaults_for_state(&mut self, _state: &State) {}

    /// Whether the move may apply, for this proposer, against this state.
    fn legal(&self, state: &State, proposer: PlayerIndex) -> Result<()>;

    /// Mutate the scratch copy. A returned error discards the scratchpad.
    fn apply(&self, state: &mut State) -> Result<()>;

    /// A move to run immediately after this one commits, with proposer =
    /// admin. Takes precedence over the delegate's `propose_fix_up`.
    fn immediate_fix_up(&self, _state: &State) -> Option<Box<dyn Move>> {
        None
    }
}

impl Clone for Box<dyn Move> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Describe-phase configuration for one move type. Construction and
/// inspection need no manager; only `GameManagerBuilder::build` turns this
/// into something that can instantiate moves.
#[derive(Debug, Clone)]
pub struct MoveTypeConfig {
    pub name: &'static str,
    pub help_text: &'static str,
    pub constructor: fn() -> Box<dyn Move>,
    /// Fix-up moves are engine-initiated and only proposable by admin.
    pub is_fix_up: bool,
    /// Phases (values of the delegate's phase enum) in which the move is
    /// legal. Empty means every phase.
    pub legal_phases: Vec<i64>,
    /// Opaque per-type configuration attached to every instance's record.
    pub custom_configuration: serde_json::Map<String, serde_json::Value>,
}

impl MoveTypeConfig {
    pub fn new(name: &'static str, constructor: fn() -> Box<dyn Move>) -> Self {
        MoveTypeConfig {
            name,
            help_text: "",
            constructor,
            is_fix_up: false,
            legal_phases: Vec::new(),
            custom_configuration: serde_json::Map::new(),
        }
    }

    pub fn with_help_text(mut self, help_text: &'static str) -> Self {
        self.help_text = help_text;
        self
    }

    pub fn fix_up(mut self) -> Self {
        self.is_fix_up = true;
        self
    }

    pub fn with_legal_phases(mut self, phases: Vec<i64>) -> Self {
        self.legal_phases = phases;
        self
    }

    pub fn with_custom_configuration(
        mut self,
        custom: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        self.custom_configuration = custom;
        self
    }

    /// Inspection summary, available without a manager.
    pub fn describe(&self) -> MoveTypeInfo {
        MoveTypeInfo {
            name: self.name.to_string(),
            help_text: self.help_text.to_string(),
            is_fix_up: self.is_fix_up,
            legal_phases: self.legal_phases.clone(),
        }
    }
}

/// Static description of a move type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveTypeInfo {
    pub name: String,
    pub help_text: String,
    pub is_fix_up: bool,
    pub legal_phases: Vec<i64>,
}

/// A bound move type: validated at manager build and able to instantiate
/// moves.
#[derive(Debug)]
pub struct MoveType {
    config: MoveTypeConfig,
}

impl MoveType {
    pub(crate) fn new(config: MoveTypeConfig) -> Self {
        MoveType { config }
    }

    pub fn name(&self) -> &str {
        self.config.name
    }

    pub fn is_fix_up(&self) -> bool {
        self.config.is_fix_up
    }

    pub fn legal_phases(&self) -> &[i64] {
        &self.config.legal_phases
    }

    pub fn custom_configuration(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.config.custom_configuration
    }

    pub fn info(&self) -> MoveTypeInfo {
        self.config.describe()
    }

    /// A fresh instance with `defaults_for_state` applied.
    pub fn new_move(&self, state: &State) -> Box<dyn Move> {
        let mut mv = (self.config.constructor)();
        mv.defaults_for_state(state);
        mv
    }

    /// A fresh instance filled from a serialized payload.
    pub fn move_from_payload(
        &self,
        payload: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<Box<dyn Move>> {
        let mut mv = (self.config.constructor)();
        crate::prop::fill_scalar_props_from_json(mv.as_mut(), payload)?;
        Ok(mv)
    }
}

/// Persisted record of one applied move.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MoveRecord {
    pub name: String,
    /// The state version this move produced.
    pub version: u64,
    /// The version of the player move that began this fix-up chain; a
    /// player move's own version.
    pub initiator: u64,
    pub timestamp: DateTime<Utc>,
    /// The phase of the resulting state.
    pub phase: i64,
    pub proposer: PlayerIndex,
    pub payload: serde_json::Map<String, serde_json::Value>,
}

/// Reject any registration list with duplicate move names.
pub(crate) fn check_duplicate_names(configs: &[MoveTypeConfig]) -> Result<()> {
    for (i, a) in configs.iter().enumerate() {
        if configs[..i].iter().any(|b| b.name == a.name) {
            return Err(EngineError::Configuration(format!(
                "move {} registered twice",
                a.name
            )));
        }
    }
    Ok(())
}
