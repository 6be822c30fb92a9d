//! Versioned game state: one game sub-state, one sub-state per player, and
//! dynamic component values
//!
//! A `State` is a value. The committed state is owned by its game's worker
//! task; moves run against a deep copy, and the copy becomes the committed
//! state only after validation succeeds and storage accepts it. Everything a
//! move may touch lives behind the reader traits, so the engine can walk,
//! validate, sanitize, and serialize user structs it knows nothing about.

use crate::component::{component_id, GENERIC_INDEX};
use crate::error::{EngineError, Result};
use crate::manager::GameManager;
use crate::moves::Move;
use crate::prop::reader::{is_merged_tag, PropertyReadSetConfigurer};
use crate::prop::value::{PlayerIndex, PropKind};
use crate::sanitize::{sanitize_props, Policy, GROUP_ALL, GROUP_OTHER, GROUP_SELF};
use crate::stack::{Slot, Stack, StackKind};
use crate::timer::Timer;
use rand::SeedableRng;
use rand_chacha::ChaCha12Rng;
use rustc_hash::FxHashMap;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use smallvec::{smallvec, SmallVec};
use std::fmt;
use std::time::Duration;

/// One user-defined sub-state struct. The blanket impl covers any cloneable
/// configurer, so game code only implements the reader traits.
pub trait SubState: PropertyReadSetConfigurer + fmt::Debug + Send {
    fn clone_box(&self) -> Box<dyn SubState>;

    /// Downcast support for delegate and move code that knows the concrete
    /// type.
    fn as_any(&self) -> &dyn std::any::Any;

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any;
}

impl<T> SubState for T
where
    T: PropertyReadSetConfigurer + Clone + fmt::Debug + Send + 'static,
{
    fn clone_box(&self) -> Box<dyn SubState> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

impl Clone for Box<dyn SubState> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// A timer a move asked for, waiting for its state to commit. The worker
/// drains these into the timer manager; `legal`/`apply` never touch the
/// queue themselves.
#[derive(Debug, Clone)]
pub struct PreparedTimer {
    pub(crate) id: String,
    pub(crate) duration: Duration,
    pub(crate) mv: Box<dyn Move>,
}

/// The complete state of one game at one version.
#[derive(Debug, Clone)]
pub struct State {
    version: u64,
    schema: u64,
    game_id: String,
    salt: String,
    num_players: usize,
    sanitized: bool,
    game: Box<dyn SubState>,
    players: Vec<Box<dyn SubState>>,
    /// Deck name → one values struct per component in that deck.
    dynamic_values: FxHashMap<String, Vec<Box<dyn SubState>>>,
    rng: ChaCha12Rng,
    prepared_timers: Vec<PreparedTimer>,
    cancelled_timers: Vec<String>,
}

/// Deterministic per-version stream: replays of a committed state draw the
/// same randomness.
fn seeded_rng(game_id: &str, salt: &str, version: u64) -> ChaCha12Rng {
    let mut hasher = Sha256::new();
    hasher.update(game_id.as_bytes());
    hasher.update(b"/");
    hasher.update(salt.as_bytes());
    hasher.update(b"/");
    hasher.update(version.to_le_bytes());
    let digest = hasher.finalize();
    let mut seed = [0u8; 32];
    seed.copy_from_slice(&digest);
    ChaCha12Rng::from_seed(seed)
}

fn stack_ids(game_id: &str, salt: &str, stack: &Stack) -> Vec<Option<String>> {
    if let Some(ids) = stack.sanitized_ids() {
        return ids.to_vec();
    }
    stack
        .slots()
        .map(|s| {
            s.map(|sl| component_id(game_id, salt, stack.deck(), sl.deck_index, sl.secret_count))
        })
        .collect()
}

impl State {
    pub(crate) fn new(
        schema: u64,
        game_id: String,
        salt: String,
        num_players: usize,
        game: Box<dyn SubState>,
        players: Vec<Box<dyn SubState>>,
        dynamic_values: FxHashMap<String, Vec<Box<dyn SubState>>>,
    ) -> State {
        let rng = seeded_rng(&game_id, &salt, 0);
        State {
            version: 0,
            schema,
            game_id,
            salt,
            num_players,
            sanitized: false,
            game,
            players,
            dynamic_values,
            rng,
            prepared_timers: Vec::new(),
            cancelled_timers: Vec::new(),
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn schema(&self) -> u64 {
        self.schema
    }

    pub fn game_id(&self) -> &str {
        &self.game_id
    }

    pub fn num_players(&self) -> usize {
        self.num_players
    }

    /// Sanitized states are views for a recipient; they cannot be committed
    /// or validated.
    pub fn is_sanitized(&self) -> bool {
        self.sanitized
    }

    pub fn game_state(&self) -> &dyn SubState {
        self.game.as_ref()
    }

    pub fn game_state_mut(&mut self) -> &mut dyn SubState {
        self.game.as_mut()
    }

    pub fn player_state(&self, seat: usize) -> Result<&dyn SubState> {
        self.players
            .get(seat)
            .map(|p| p.as_ref())
            .ok_or_else(|| EngineError::NotFound(format!("no player {seat}")))
    }

    pub fn player_state_mut(&mut self, seat: usize) -> Result<&mut dyn SubState> {
        self.players
            .get_mut(seat)
            .map(|p| p.as_mut() as &mut dyn SubState)
            .ok_or_else(|| EngineError::NotFound(format!("no player {seat}")))
    }

    pub fn player_states(&self) -> impl Iterator<Item = &dyn SubState> {
        self.players.iter().map(|p| p.as_ref())
    }

    /// Dynamic values for a deck's components, indexed by deck index.
    pub fn dynamic_values(&self, deck: &str) -> Option<&[Box<dyn SubState>]> {
        self.dynamic_values.get(deck).map(|v| v.as_slice())
    }

    pub fn dynamic_values_mut(&mut self, deck: &str) -> Option<&mut [Box<dyn SubState>]> {
        self.dynamic_values.get_mut(deck).map(|v| v.as_mut_slice())
    }

    /// The state-owned randomness source; shuffles draw from here so a
    /// committed version replays deterministically.
    pub fn rng_mut(&mut self) -> &mut ChaCha12Rng {
        &mut self.rng
    }

    /// Semi-stable ids for a stack's slots, in order. Sanitized stacks
    /// report their substituted ids.
    pub fn component_ids(&self, stack: &Stack) -> Vec<Option<String>> {
        stack_ids(&self.game_id, &self.salt, stack)
    }

    /// Mint a timer id and record the intent. The returned property value
    /// goes into a timer field; the queue entry starts only when this state
    /// commits.
    pub fn prepare_timer(&mut self, duration: Duration, mv: Box<dyn Move>) -> Timer {
        use rand::Rng;
        let mut bytes = [0u8; 8];
        self.rng.fill(&mut bytes);
        let id = hex::encode(bytes);
        self.prepared_timers.push(PreparedTimer {
            id: id.clone(),
            duration,
            mv,
        });
        Timer::with_id(id)
    }

    /// Deactivate a timer property and record the cancellation for commit.
    pub fn cancel_timer(&mut self, timer: &mut Timer) {
        if timer.is_active() {
            self.cancelled_timers.push(timer.id().to_string());
            timer.deactivate();
        }
    }

    pub(crate) fn take_timer_intents(&mut self) -> (Vec<PreparedTimer>, Vec<String>) {
        (
            std::mem::take(&mut self.prepared_timers),
            std::mem::take(&mut self.cancelled_timers),
        )
    }

    fn for_each_substate(
        &self,
        f: &mut dyn FnMut(&dyn SubState) -> Result<()>,
    ) -> Result<()> {
        f(self.game.as_ref())?;
        for p in &self.players {
            f(p.as_ref())?;
        }
        for subs in self.dynamic_values.values() {
            for s in subs {
                f(s.as_ref())?;
            }
        }
        Ok(())
    }

    fn for_each_substate_mut(
        &mut self,
        f: &mut dyn FnMut(&mut dyn SubState) -> Result<()>,
    ) -> Result<()> {
        f(self.game.as_mut())?;
        for p in &mut self.players {
            f(p.as_mut())?;
        }
        for subs in self.dynamic_values.values_mut() {
            for s in subs {
                f(s.as_mut())?;
            }
        }
        Ok(())
    }

    /// Check every cross-state invariant: full inflation, component
    /// conservation, player-index ranges, and (for tree phase enums) that
    /// the current phase is a leaf.
    pub fn validate(&self, manager: &GameManager) -> Result<()> {
        if self.sanitized {
            return Err(EngineError::InvariantViolation(
                "sanitized states cannot be validated".to_string(),
            ));
        }
        if self.players.len() != self.num_players {
            return Err(EngineError::InvariantViolation(format!(
                "state has {} player sub-states for {} players",
                self.players.len(),
                self.num_players
            )));
        }
        manager.game_inflater().verify_inflated(self.game.as_ref())?;
        for p in &self.players {
            manager.player_inflater().verify_inflated(p.as_ref())?;
        }
        for (deck, subs) in &self.dynamic_values {
            let inflater = manager.dynamic_inflater(deck).ok_or_else(|| {
                EngineError::Configuration(format!("no dynamic values registered for deck {deck}"))
            })?;
            for s in subs {
                inflater.verify_inflated(s.as_ref())?;
            }
        }

        // Conservation: every component of every deck in exactly one slot.
        let mut counts: FxHashMap<(String, usize), usize> = FxHashMap::default();
        let mut tally = |stack: &Stack| -> Result<()> {
            for slot in stack.components() {
                if slot.is_generic() {
                    return Err(EngineError::InvariantViolation(
                        "generic component in an unsanitized state".to_string(),
                    ));
                }
                *counts
                    .entry((stack.deck().to_string(), slot.deck_index))
                    .or_insert(0) += 1;
            }
            Ok(())
        };
        self.for_each_substate(&mut |sub| {
            for schema in sub.props() {
                match schema.kind {
                    PropKind::Stack if !is_merged_tag(schema.tag.as_deref()) => {
                        tally(sub.stack_prop(&schema.name)?)?;
                    }
                    PropKind::Board => {
                        for space in sub.board_prop(&schema.name)?.spaces() {
                            tally(space)?;
                        }
                    }
                    _ => {}
                }
            }
            Ok(())
        })?;
        for deck in manager.chest().decks() {
            for i in 0..deck.len() {
                let n = counts
                    .get(&(deck.name().to_string(), i))
                    .copied()
                    .unwrap_or(0);
                if n != 1 {
                    return Err(EngineError::InvariantViolation(format!(
                        "component {i} of deck {} appears {n} times",
                        deck.name()
                    )));
                }
            }
        }
        for ((deck, i), _) in counts.iter() {
            let len = manager
                .chest()
                .deck(deck)
                .map(|d| d.len())
                .ok_or_else(|| {
                    EngineError::InvariantViolation(format!("stack over unknown deck {deck}"))
                })?;
            if *i >= len {
                return Err(EngineError::InvariantViolation(format!(
                    "deck index {i} out of range for deck {deck}"
                )));
            }
        }

        // Player-index properties stay in range.
        let num_players = self.num_players;
        self.for_each_substate(&mut |sub| {
            for schema in sub.props() {
                match schema.kind {
                    PropKind::PlayerIndex => {
                        let v = sub.player_index_prop(&schema.name)?;
                        if !v.is_valid(num_players) {
                            return Err(EngineError::InvariantViolation(format!(
                                "property {} holds invalid player index {}",
                                schema.name, v.0
                            )));
                        }
                    }
                    PropKind::PlayerIndexSlice => {
                        for v in sub.player_index_slice_prop(&schema.name)? {
                            if !v.is_valid(num_players) {
                                return Err(EngineError::InvariantViolation(format!(
                                    "property {} holds invalid player index {}",
                                    schema.name, v.0
                                )));
                            }
                        }
                    }
                    _ => {}
                }
            }
            Ok(())
        })?;

        // Tree phase enums only commit at leaves.
        if let Some(enum_name) = manager.delegate().phase_enum() {
            let phase = manager.delegate().current_phase(self);
            let def = manager.chest().enums().get(enum_name).ok_or_else(|| {
                EngineError::Configuration(format!("unknown phase enum {enum_name}"))
            })?;
            if !def.is_leaf(phase) {
                return Err(EngineError::InvariantViolation(format!(
                    "phase {phase} is not a leaf of enum {enum_name}"
                )));
            }
        }
        Ok(())
    }

    /// Stamp the version, reseed the deterministic stream, and record every
    /// currently visible id on its stack. Runs once per commit, after
    /// validation.
    pub(crate) fn commit_prep(&mut self, version: u64) -> Result<()> {
        self.version = version;
        self.rng = seeded_rng(&self.game_id, &self.salt, version);
        let game_id = self.game_id.clone();
        let salt = self.salt.clone();
        self.for_each_substate_mut(&mut |sub| {
            for schema in sub.props() {
                match schema.kind {
                    PropKind::Stack if !is_merged_tag(schema.tag.as_deref()) => {
                        let mut stack = sub.stack_prop(&schema.name)?.clone();
                        let ids = stack_ids(&game_id, &salt, &stack);
                        stack.update_ids_last_seen(&ids, version);
                        sub.configure_stack_prop(&schema.name, stack)?;
                    }
                    PropKind::Board => {
                        let mut board = sub.board_prop(&schema.name)?.clone();
                        for space in board.spaces_mut() {
                            let ids = stack_ids(&game_id, &salt, space);
                            space.update_ids_last_seen(&ids, version);
                        }
                        sub.configure_board_prop(&schema.name, board)?;
                    }
                    _ => {}
                }
            }
            Ok(())
        })
    }

    /// Produce the view of this state a recipient is entitled to see.
    ///
    /// Admin sees everything. Each property's effective policy is the least
    /// restrictive among the recipient's groups, overridable by the
    /// delegate. Dynamic component values hide transitively: a component in
    /// a non-visible stack exposes nothing.
    pub fn sanitize(&self, manager: &GameManager, recipient: PlayerIndex) -> Result<State> {
        if recipient.is_admin() {
            return Ok(self.clone());
        }
        if !recipient.is_valid(self.num_players) {
            return Err(EngineError::NotFound(format!(
                "recipient {recipient} is not part of this game"
            )));
        }
        let delegate = manager.delegate();
        let chest = manager.chest();
        let game_id = self.game_id.clone();
        let salt = self.salt.clone();
        let ids_of = move |s: &Stack| stack_ids(&game_id, &salt, s);

        let mut out = self.clone();
        out.sanitized = true;
        let mut rng = self.rng.clone();
        // Stack policy per component, computed from the unsanitized slots.
        let mut containment: FxHashMap<(String, usize), Policy> = FxHashMap::default();

        let record = |sub: &dyn SubState,
                      policies: &[(String, Policy)],
                      containment: &mut FxHashMap<(String, usize), Policy>|
         -> Result<()> {
            for (name, policy) in policies {
                let schema = sub.schema_for(name).ok_or_else(|| {
                    EngineError::PropertyNotFound(name.clone())
                })?;
                let mut note = |stack: &Stack| {
                    for slot in stack.components() {
                        if !slot.is_generic() {
                            containment
                                .insert((stack.deck().to_string(), slot.deck_index), *policy);
                        }
                    }
                };
                match schema.kind {
                    PropKind::Stack => note(sub.stack_prop(name)?),
                    PropKind::Board => {
                        for space in sub.board_prop(name)?.spaces() {
                            note(space);
                        }
                    }
                    _ => {}
                }
            }
            Ok(())
        };

        // Custom groups are defined relative to a viewed player; game-state
        // and dynamic-value properties match against `all` only.
        {
            let ovr = |name: &str, p: Policy| {
                delegate.sanitization_policy(&SanitizeTarget { viewed_player: None, prop: name }, p)
            };
            let policies = sanitize_props(
                out.game.as_mut(),
                manager.game_inflater().props(),
                &[GROUP_ALL],
                chest,
                &mut rng,
                &ids_of,
                &ovr,
            )?;
            record(self.game.as_ref(), &policies, &mut containment)?;
        }

        for seat in 0..self.num_players {
            let viewed = PlayerIndex::new(seat);
            let customs = delegate.group_membership(self, recipient, viewed);
            let mut groups: SmallVec<[&str; 4]> = smallvec![GROUP_ALL];
            groups.push(if viewed == recipient {
                GROUP_SELF
            } else {
                GROUP_OTHER
            });
            groups.extend(customs.iter().map(String::as_str));
            let ovr = |name: &str, p: Policy| {
                delegate.sanitization_policy(
                    &SanitizeTarget {
                        viewed_player: Some(viewed),
                        prop: name,
                    },
                    p,
                )
            };
            let policies = sanitize_props(
                out.players[seat].as_mut(),
                manager.player_inflater().props(),
                &groups,
                chest,
                &mut rng,
                &ids_of,
                &ovr,
            )?;
            record(self.players[seat].as_ref(), &policies, &mut containment)?;
        }

        for (deck, subs) in out.dynamic_values.iter_mut() {
            let inflater = manager.dynamic_inflater(deck).ok_or_else(|| {
                EngineError::Configuration(format!("no dynamic values registered for deck {deck}"))
            })?;
            for (i, sub) in subs.iter_mut().enumerate() {
                let policy = containment
                    .get(&(deck.clone(), i))
                    .copied()
                    .unwrap_or(Policy::Visible);
                if policy > Policy::Visible {
                    // The component itself is obscured; its values follow.
                    sanitize_props(
                        sub.as_mut(),
                        inflater.props(),
                        &[GROUP_ALL],
                        chest,
                        &mut rng,
                        &ids_of,
                        &|_, _| Policy::Hidden,
                    )?;
                } else {
                    let ovr = |name: &str, p: Policy| {
                        delegate.sanitization_policy(
                            &SanitizeTarget {
                                viewed_player: None,
                                prop: name,
                            },
                            p,
                        )
                    };
                    sanitize_props(
                        sub.as_mut(),
                        inflater.props(),
                        &[GROUP_ALL],
                        chest,
                        &mut rng,
                        &ids_of,
                        &ovr,
                    )?;
                }
            }
        }

        Ok(out)
    }

    fn stack_to_wire(&self, stack: &Stack) -> Result<Value> {
        let indexes: Vec<Value> = stack
            .slots()
            .map(|s| match s {
                None => Value::Null,
                Some(sl) if sl.is_generic() => json!(-1),
                Some(sl) => json!(sl.deck_index),
            })
            .collect();
        Ok(json!({
            "Deck": stack.deck(),
            "Kind": serde_json::to_value(stack.kind())?,
            "Indexes": indexes,
            "Ids": self.component_ids(stack),
            "IdsLastSeen": serde_json::to_value(stack.ids_last_seen())?,
        }))
    }

    fn substate_to_wire(&self, sub: &dyn SubState, manager: &GameManager) -> Result<Value> {
        let mut obj = serde_json::Map::new();
        for schema in sub.props() {
            let name: &str = &schema.name;
            let v = match schema.kind {
                PropKind::Int => json!(sub.int_prop(name)?),
                PropKind::Bool => json!(sub.bool_prop(name)?),
                PropKind::String => json!(sub.string_prop(name)?),
                PropKind::PlayerIndex => json!(sub.player_index_prop(name)?.0),
                PropKind::IntSlice => json!(sub.int_slice_prop(name)?),
                PropKind::BoolSlice => json!(sub.bool_slice_prop(name)?),
                PropKind::StringSlice => json!(sub.string_slice_prop(name)?),
                PropKind::PlayerIndexSlice => {
                    json!(sub
                        .player_index_slice_prop(name)?
                        .iter()
                        .map(|p| p.0)
                        .collect::<Vec<i32>>())
                }
                PropKind::Enum => json!(sub.enum_prop(name)?.value()),
                PropKind::Stack => {
                    if is_merged_tag(schema.tag.as_deref()) {
                        // Derived views own nothing; reconstructed from tags.
                        continue;
                    }
                    self.stack_to_wire(sub.stack_prop(name)?)?
                }
                PropKind::Board => {
                    let board = sub.board_prop(name)?;
                    let spaces: Result<Vec<Value>> = board
                        .spaces()
                        .iter()
                        .map(|s| self.stack_to_wire(s))
                        .collect();
                    json!({ "Deck": board.deck(), "Spaces": spaces? })
                }
                PropKind::Timer => {
                    let t = sub.timer_prop(name)?;
                    let left = if t.is_active() {
                        manager.timers().remaining(t.id()).as_nanos() as u64
                    } else {
                        0
                    };
                    json!({ "Id": t.id(), "TimeLeft": left })
                }
            };
            obj.insert(schema.name.to_string(), v);
        }
        Ok(Value::Object(obj))
    }

    fn secret_move_counts(&self, manager: &GameManager) -> Result<FxHashMap<String, Vec<u64>>> {
        let mut table: FxHashMap<String, Vec<u64>> = FxHashMap::default();
        for deck in manager.chest().decks() {
            table.insert(deck.name().to_string(), vec![0; deck.len()]);
        }
        self.for_each_substate(&mut |sub| {
            for schema in sub.props() {
                let mut note = |stack: &Stack| {
                    if let Some(counts) = table.get_mut(stack.deck()) {
                        for slot in stack.components() {
                            if !slot.is_generic() {
                                if let Some(c) = counts.get_mut(slot.deck_index) {
                                    *c = slot.secret_count;
                                }
                            }
                        }
                    }
                };
                match schema.kind {
                    PropKind::Stack if !is_merged_tag(schema.tag.as_deref()) => {
                        note(sub.stack_prop(&schema.name)?)
                    }
                    PropKind::Board => {
                        for space in sub.board_prop(&schema.name)?.spaces() {
                            note(space);
                        }
                    }
                    _ => {}
                }
            }
            Ok(())
        })?;
        Ok(table)
    }

    /// Serialize for storage or a recipient. The salt never appears on the
    /// wire; ids are already derived.
    pub fn to_wire(&self, manager: &GameManager) -> Result<Value> {
        let players: Result<Vec<Value>> = self
            .players
            .iter()
            .map(|p| self.substate_to_wire(p.as_ref(), manager))
            .collect();
        let mut components = serde_json::Map::new();
        let mut deck_names: Vec<&String> = self.dynamic_values.keys().collect();
        deck_names.sort();
        for deck in deck_names {
            let subs = &self.dynamic_values[deck];
            let vals: Result<Vec<Value>> = subs
                .iter()
                .map(|s| self.substate_to_wire(s.as_ref(), manager))
                .collect();
            components.insert(deck.clone(), Value::Array(vals?));
        }
        let secret: std::collections::BTreeMap<String, Vec<u64>> = self
            .secret_move_counts(manager)?
            .into_iter()
            .collect();
        Ok(json!({
            "Version": self.version,
            "Schema": self.schema,
            "Game": self.substate_to_wire(self.game.as_ref(), manager)?,
            "Players": players?,
            "Components": Value::Object(components),
            "SecretMoveCount": serde_json::to_value(secret)?,
        }))
    }

    pub fn to_bytes(&self, manager: &GameManager) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.to_wire(manager)?)?)
    }

    fn wire_field<'a>(obj: &'a Value, key: &str) -> Result<&'a Value> {
        obj.get(key).ok_or_else(|| {
            EngineError::Serialization(format!("state wire record missing field {key}"))
        })
    }

    fn stack_from_wire(
        obj: &Value,
        secret: &FxHashMap<String, Vec<u64>>,
    ) -> Result<Stack> {
        let deck = Self::wire_field(obj, "Deck")?
            .as_str()
            .ok_or_else(|| EngineError::Serialization("stack deck is not a string".into()))?;
        let kind: StackKind = serde_json::from_value(Self::wire_field(obj, "Kind")?.clone())?;
        let mut stack = match kind {
            StackKind::Growable { max } => Stack::growable(deck, max),
            StackKind::Sized { size } => Stack::sized(deck, size),
        };
        let counts = secret.get(deck);
        let indexes = Self::wire_field(obj, "Indexes")?
            .as_array()
            .ok_or_else(|| EngineError::Serialization("stack indexes are not an array".into()))?;
        let slots: Result<Vec<Option<Slot>>> = indexes
            .iter()
            .map(|v| match v {
                Value::Null => Ok(None),
                _ => {
                    let n = v.as_i64().ok_or_else(|| {
                        EngineError::Serialization("stack index is not an integer".into())
                    })?;
                    if n < 0 {
                        Ok(Some(Slot {
                            deck_index: GENERIC_INDEX,
                            secret_count: 0,
                        }))
                    } else {
                        let i = n as usize;
                        Ok(Some(Slot {
                            deck_index: i,
                            secret_count: counts
                                .and_then(|c| c.get(i))
                                .copied()
                                .unwrap_or(0),
                        }))
                    }
                }
            })
            .collect();
        stack.set_slots(slots?);
        let seen: FxHashMap<String, u64> =
            serde_json::from_value(Self::wire_field(obj, "IdsLastSeen")?.clone())?;
        stack.set_ids_last_seen(seen);
        Ok(stack)
    }

    fn fill_substate_from_wire(
        sub: &mut dyn SubState,
        obj: &Value,
        manager: &GameManager,
        secret: &FxHashMap<String, Vec<u64>>,
    ) -> Result<()> {
        for schema in sub.props() {
            let name: &str = &schema.name;
            if schema.kind == PropKind::Stack && is_merged_tag(schema.tag.as_deref()) {
                continue;
            }
            let v = Self::wire_field(obj, name)?;
            let bad = || EngineError::Serialization(format!("property {name} has the wrong shape"));
            match schema.kind {
                PropKind::Int => sub.set_int_prop(name, v.as_i64().ok_or_else(bad)?)?,
                PropKind::Bool => sub.set_bool_prop(name, v.as_bool().ok_or_else(bad)?)?,
                PropKind::String => {
                    sub.set_string_prop(name, v.as_str().ok_or_else(bad)?.to_string())?
                }
                PropKind::PlayerIndex => sub.set_player_index_prop(
                    name,
                    PlayerIndex(v.as_i64().ok_or_else(bad)? as i32),
                )?,
                PropKind::IntSlice => {
                    sub.set_int_slice_prop(name, serde_json::from_value(v.clone())?)?
                }
                PropKind::BoolSlice => {
                    sub.set_bool_slice_prop(name, serde_json::from_value(v.clone())?)?
                }
                PropKind::StringSlice => {
                    sub.set_string_slice_prop(name, serde_json::from_value(v.clone())?)?
                }
                PropKind::PlayerIndexSlice => {
                    let raw: Vec<i32> = serde_json::from_value(v.clone())?;
                    sub.set_player_index_slice_prop(
                        name,
                        raw.into_iter().map(PlayerIndex).collect(),
                    )?
                }
                PropKind::Enum => {
                    let mut e = sub.enum_prop(name)?.clone();
                    let def = manager.chest().enums().get(e.enum_name()).ok_or_else(|| {
                        EngineError::Serialization(format!(
                            "enum property {name} references unknown enum {}",
                            e.enum_name()
                        ))
                    })?;
                    e.set_value(def, v.as_i64().ok_or_else(bad)?)?;
                    sub.configure_enum_prop(name, e)?;
                }
                PropKind::Stack => {
                    sub.configure_stack_prop(name, Self::stack_from_wire(v, secret)?)?
                }
                PropKind::Board => {
                    let deck = Self::wire_field(v, "Deck")?
                        .as_str()
                        .ok_or_else(bad)?
                        .to_string();
                    let spaces = Self::wire_field(v, "Spaces")?
                        .as_array()
                        .ok_or_else(bad)?;
                    let mut board = crate::stack::Board::new(&deck, spaces.len(), 0);
                    for (i, s) in spaces.iter().enumerate() {
                        board.spaces_mut()[i] = Self::stack_from_wire(s, secret)?;
                    }
                    sub.configure_board_prop(name, board)?;
                }
                PropKind::Timer => {
                    let id = Self::wire_field(v, "Id")?.as_str().ok_or_else(bad)?;
                    sub.configure_timer_prop(name, Timer::with_id(id.to_string()))?;
                }
            }
        }
        Ok(())
    }

    /// Reconstruct a state from its wire form. The game record supplies the
    /// identity the wire deliberately omits.
    pub(crate) fn from_wire(
        manager: &GameManager,
        wire: &Value,
        game_id: &str,
        salt: &str,
    ) -> Result<State> {
        let version = Self::wire_field(wire, "Version")?
            .as_u64()
            .ok_or_else(|| EngineError::Serialization("version is not an integer".into()))?;
        let schema = Self::wire_field(wire, "Schema")?
            .as_u64()
            .ok_or_else(|| EngineError::Serialization("schema is not an integer".into()))?;
        let players_wire = Self::wire_field(wire, "Players")?
            .as_array()
            .ok_or_else(|| EngineError::Serialization("players are not an array".into()))?;
        let secret: FxHashMap<String, Vec<u64>> =
            serde_json::from_value(Self::wire_field(wire, "SecretMoveCount")?.clone())?;

        let delegate = manager.delegate();
        let chest = manager.chest();
        let num_players = players_wire.len();

        let mut game = delegate.game_state_constructor();
        manager.game_inflater().inflate(game.as_mut(), chest)?;
        Self::fill_substate_from_wire(game.as_mut(), Self::wire_field(wire, "Game")?, manager, &secret)?;

        let mut players = Vec::with_capacity(num_players);
        for (seat, pw) in players_wire.iter().enumerate() {
            let mut p = delegate.player_state_constructor(PlayerIndex::new(seat));
            manager.player_inflater().inflate(p.as_mut(), chest)?;
            Self::fill_substate_from_wire(p.as_mut(), pw, manager, &secret)?;
            players.push(p);
        }

        let components = Self::wire_field(wire, "Components")?
            .as_object()
            .ok_or_else(|| EngineError::Serialization("components are not an object".into()))?;
        let mut dynamic_values: FxHashMap<String, Vec<Box<dyn SubState>>> = FxHashMap::default();
        for (deck_name, vals) in components {
            let deck = chest.deck(deck_name).ok_or_else(|| {
                EngineError::Serialization(format!("dynamic values for unknown deck {deck_name}"))
            })?;
            let inflater = manager.dynamic_inflater(deck_name).ok_or_else(|| {
                EngineError::Serialization(format!(
                    "dynamic values for deck {deck_name} not registered"
                ))
            })?;
            let arr = vals.as_array().ok_or_else(|| {
                EngineError::Serialization(format!("dynamic values for {deck_name} not an array"))
            })?;
            if arr.len() != deck.len() {
                return Err(EngineError::Serialization(format!(
                    "deck {deck_name} has {} components but {} value records",
                    deck.len(),
                    arr.len()
                )));
            }
            let mut subs = Vec::with_capacity(arr.len());
            for vw in arr {
                let mut s = delegate
                    .dynamic_component_values_constructor(deck)
                    .ok_or_else(|| {
                        EngineError::Serialization(format!(
                            "delegate constructs no dynamic values for deck {deck_name}"
                        ))
                    })?;
                inflater.inflate(s.as_mut(), chest)?;
                Self::fill_substate_from_wire(s.as_mut(), vw, manager, &secret)?;
                subs.push(s);
            }
            dynamic_values.insert(deck_name.clone(), subs);
        }

        let mut state = State::new(
            schema,
            game_id.to_string(),
            salt.to_string(),
            num_players,
            game,
            players,
            dynamic_values,
        );
        state.version = version;
        state.rng = seeded_rng(game_id, salt, version);
        Ok(state)
    }
}

/// The property a sanitization override is being asked about.
#[derive(Debug, Clone, Copy)]
pub struct SanitizeTarget<'a> {
    /// The owning player sub-state, or None for game state and dynamic
    /// values.
    pub viewed_player: Option<PlayerIndex>,
    pub prop: &'a str,
}
