//! A small but complete game used by the integration tests: players take
//! turns drawing cards into a bounded hand and scoring points. It exercises
//! decks, dynamic component values, a tree phase enum, sanitization tags,
//! fix-up chains, timers, and an agent.

use boardgame::component::ChestBuilder;
use boardgame::delegate::{Agent, GameDelegate, StarterStack, Variant};
use boardgame::enums::EnumValue;
use boardgame::error::{EngineError, Result};
use boardgame::moves::{Move, MoveTypeConfig};
use boardgame::prop::{
    PlayerIndex, PropBag, PropKind, PropValue, PropertyReadSetConfigurer, PropertyReadSetter,
    PropertyReader, PropertySchema,
};
use boardgame::stack::{InsertSlot, MergedStack, Stack};
use boardgame::state::{State, SubState};
use boardgame::storage::{GameRecord, MemoryStorage, StorageProvider};
use boardgame::timer::Timer;
use boardgame::{GameManager, GameManagerBuilder};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const NUM_CARDS: usize = 12;
pub const HAND_LIMIT: usize = 3;
pub const WIN_SCORE: i64 = 3;

pub const PHASE_SETUP: i64 = 1;
pub const PHASE_PLAY: i64 = 2;

fn not_found(name: &str) -> EngineError {
    EngineError::PropertyNotFound(name.to_string())
}

// --- game state -----------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct TallyGameState {
    pub draw_deck: Stack,
    pub discard: Stack,
    pub in_play: MergedStack,
    pub current_player: PlayerIndex,
    pub phase: EnumValue,
    pub move_timer: Timer,
}

impl PropertyReader for TallyGameState {
    fn props(&self) -> Vec<PropertySchema> {
        vec![
            PropertySchema::new("DrawDeck", PropKind::Stack)
                .with_tag("stack:cards")
                .with_sanitize("len"),
            PropertySchema::new("Discard", PropKind::Stack).with_tag("stack:cards"),
            PropertySchema::immutable("InPlay", PropKind::Stack)
                .with_tag("concatenate:DrawDeck,Discard"),
            PropertySchema::new("CurrentPlayer", PropKind::PlayerIndex),
            PropertySchema::new("Phase", PropKind::Enum).with_tag("enum:Phase"),
            PropertySchema::new("MoveTimer", PropKind::Timer),
        ]
    }

    fn player_index_prop(&self, name: &str) -> Result<PlayerIndex> {
        match name {
            "CurrentPlayer" => Ok(self.current_player),
            _ => Err(not_found(name)),
        }
    }

    fn enum_prop(&self, name: &str) -> Result<&EnumValue> {
        match name {
            "Phase" => Ok(&self.phase),
            _ => Err(not_found(name)),
        }
    }

    fn stack_prop(&self, name: &str) -> Result<&Stack> {
        match name {
            "DrawDeck" => Ok(&self.draw_deck),
            "Discard" => Ok(&self.discard),
            _ => Err(not_found(name)),
        }
    }

    fn merged_stack_prop(&self, name: &str) -> Result<&MergedStack> {
        match name {
            "InPlay" => Ok(&self.in_play),
            _ => Err(not_found(name)),
        }
    }

    fn timer_prop(&self, name: &str) -> Result<&Timer> {
        match name {
            "MoveTimer" => Ok(&self.move_timer),
            _ => Err(not_found(name)),
        }
    }
}

impl PropertyReadSetter for TallyGameState {
    fn set_player_index_prop(&mut self, name: &str, v: PlayerIndex) -> Result<()> {
        match name {
            "CurrentPlayer" => {
                self.current_player = v;
                Ok(())
            }
            _ => Err(not_found(name)),
        }
    }

    fn stack_prop_mut(&mut self, name: &str) -> Result<&mut Stack> {
        match name {
            "DrawDeck" => Ok(&mut self.draw_deck),
            "Discard" => Ok(&mut self.discard),
            _ => Err(not_found(name)),
        }
    }

    fn enum_prop_mut(&mut self, name: &str) -> Result<&mut EnumValue> {
        match name {
            "Phase" => Ok(&mut self.phase),
            _ => Err(not_found(name)),
        }
    }

    fn timer_prop_mut(&mut self, name: &str) -> Result<&mut Timer> {
        match name {
            "MoveTimer" => Ok(&mut self.move_timer),
            _ => Err(not_found(name)),
        }
    }
}

impl PropertyReadSetConfigurer for TallyGameState {
    fn configure_stack_prop(&mut self, name: &str, v: Stack) -> Result<()> {
        match name {
            "DrawDeck" => {
                self.draw_deck = v;
                Ok(())
            }
            "Discard" => {
                self.discard = v;
                Ok(())
            }
            _ => Err(not_found(name)),
        }
    }

    fn configure_merged_stack_prop(&mut self, name: &str, v: MergedStack) -> Result<()> {
        match name {
            "InPlay" => {
                self.in_play = v;
                Ok(())
            }
            _ => Err(not_found(name)),
        }
    }

    fn configure_enum_prop(&mut self, name: &str, v: EnumValue) -> Result<()> {
        match name {
            "Phase" => {
                self.phase = v;
                Ok(())
            }
            _ => Err(not_found(name)),
        }
    }

    fn configure_timer_prop(&mut self, name: &str, v: Timer) -> Result<()> {
        match name {
            "MoveTimer" => {
                self.move_timer = v;
                Ok(())
            }
            _ => Err(not_found(name)),
        }
    }
}

// --- player state ---------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct TallyPlayerState {
    pub hand: Stack,
    pub score: i64,
}

impl PropertyReader for TallyPlayerState {
    fn props(&self) -> Vec<PropertySchema> {
        vec![
            PropertySchema::new("Hand", PropKind::Stack)
                .with_tag("stack:cards")
                .with_sanitize("self:visible,other:len"),
            PropertySchema::new("Score", PropKind::Int).with_sanitize("other:hidden"),
        ]
    }

    fn int_prop(&self, name: &str) -> Result<i64> {
        match name {
            "Score" => Ok(self.score),
            _ => Err(not_found(name)),
        }
    }

    fn stack_prop(&self, name: &str) -> Result<&Stack> {
        match name {
            "Hand" => Ok(&self.hand),
            _ => Err(not_found(name)),
        }
    }
}

impl PropertyReadSetter for TallyPlayerState {
    fn set_int_prop(&mut self, name: &str, v: i64) -> Result<()> {
        match name {
            "Score" => {
                self.score = v;
                Ok(())
            }
            _ => Err(not_found(name)),
        }
    }

    fn stack_prop_mut(&mut self, name: &str) -> Result<&mut Stack> {
        match name {
            "Hand" => Ok(&mut self.hand),
            _ => Err(not_found(name)),
        }
    }
}

impl PropertyReadSetConfigurer for TallyPlayerState {
    fn configure_stack_prop(&mut self, name: &str, v: Stack) -> Result<()> {
        match name {
            "Hand" => {
                self.hand = v;
                Ok(())
            }
            _ => Err(not_found(name)),
        }
    }
}

// --- moves ----------------------------------------------------------------

fn current_player(state: &State) -> PlayerIndex {
    state
        .game_state()
        .player_index_prop("CurrentPlayer")
        .unwrap_or(PlayerIndex::OBSERVER)
}

fn hand_len(state: &State, seat: usize) -> usize {
    state
        .player_state(seat)
        .and_then(|p| p.stack_prop("Hand").map(|s| s.num_components()))
        .unwrap_or(0)
}

/// Draw the top card of the shared deck into the acting player's hand.
#[derive(Debug, Clone, Default)]
pub struct DrawCard {
    pub player: PlayerIndex,
}

impl PropertyReader for DrawCard {
    fn props(&self) -> Vec<PropertySchema> {
        vec![PropertySchema::new("Player", PropKind::PlayerIndex)]
    }

    fn player_index_prop(&self, name: &str) -> Result<PlayerIndex> {
        match name {
            "Player" => Ok(self.player),
            _ => Err(not_found(name)),
        }
    }
}

impl PropertyReadSetter for DrawCard {
    fn set_player_index_prop(&mut self, name: &str, v: PlayerIndex) -> Result<()> {
        match name {
            "Player" => {
                self.player = v;
                Ok(())
            }
            _ => Err(not_found(name)),
        }
    }
}

impl Move for DrawCard {
    fn name(&self) -> &str {
        "DrawCard"
    }

    fn clone_box(&self) -> Box<dyn Move> {
        Box::new(self.clone())
    }

    fn defaults_for_state(&mut self, state: &State) {
        self.player = current_player(state);
    }

    fn legal(&self, state: &State, proposer: PlayerIndex) -> Result<()> {
        let seat = self
            .player
            .as_seat()
            .ok_or_else(|| EngineError::ProposalRejected("no acting player".into()))?;
        if !proposer.is_admin() && proposer != self.player {
            return Err(EngineError::ProposalRejected(format!(
                "{proposer} cannot draw for {}",
                self.player
            )));
        }
        if current_player(state) != self.player {
            return Err(EngineError::ProposalRejected(format!(
                "it is not {}'s turn",
                self.player
            )));
        }
        if hand_len(state, seat) >= HAND_LIMIT {
            return Err(EngineError::ProposalRejected("hand is full".into()));
        }
        if state.game_state().stack_prop("DrawDeck")?.is_empty() {
            return Err(EngineError::ProposalRejected("the deck is empty".into()));
        }
        Ok(())
    }

    fn apply(&self, state: &mut State) -> Result<()> {
        let seat = self.player.as_seat().expect("checked in legal");
        let mut deck = state.game_state().stack_prop("DrawDeck")?.clone();
        let mut hand = state.player_state(seat)?.stack_prop("Hand")?.clone();
        deck.move_component(0, &mut hand, InsertSlot::Back)?;
        state.game_state_mut().configure_stack_prop("DrawDeck", deck)?;
        state
            .player_state_mut(seat)?
            .configure_stack_prop("Hand", hand)?;
        Ok(())
    }

    fn immediate_fix_up(&self, state: &State) -> Option<Box<dyn Move>> {
        let seat = self.player.as_seat()?;
        if hand_len(state, seat) >= HAND_LIMIT {
            return Some(Box::new(AdvanceTurn::default()));
        }
        None
    }
}

/// Admin-only fix-up: pass the turn to the next seat.
#[derive(Debug, Clone, Default)]
pub struct AdvanceTurn;

impl PropertyReader for AdvanceTurn {
    fn props(&self) -> Vec<PropertySchema> {
        vec![]
    }
}

impl PropertyReadSetter for AdvanceTurn {}

impl Move for AdvanceTurn {
    fn name(&self) -> &str {
        "AdvanceTurn"
    }

    fn clone_box(&self) -> Box<dyn Move> {
        Box::new(self.clone())
    }

    fn legal(&self, _state: &State, proposer: PlayerIndex) -> Result<()> {
        if !proposer.is_admin() {
            return Err(EngineError::ProposalRejected(
                "only the engine advances the turn".into(),
            ));
        }
        Ok(())
    }

    fn apply(&self, state: &mut State) -> Result<()> {
        let n = state.num_players() as i32;
        let cur = current_player(state);
        let next = PlayerIndex((cur.0 + 1).rem_euclid(n));
        state
            .game_state_mut()
            .set_player_index_prop("CurrentPlayer", next)
    }
}

/// Add points to a player's tally; carries a scalar payload.
#[derive(Debug, Clone, Default)]
pub struct IncrementScore {
    pub player: PlayerIndex,
    pub amount: i64,
}

impl PropertyReader for IncrementScore {
    fn props(&self) -> Vec<PropertySchema> {
        vec![
            PropertySchema::new("Player", PropKind::PlayerIndex),
            PropertySchema::new("Amount", PropKind::Int),
        ]
    }

    fn player_index_prop(&self, name: &str) -> Result<PlayerIndex> {
        match name {
            "Player" => Ok(self.player),
            _ => Err(not_found(name)),
        }
    }

    fn int_prop(&self, name: &str) -> Result<i64> {
        match name {
            "Amount" => Ok(self.amount),
            _ => Err(not_found(name)),
        }
    }
}

impl PropertyReadSetter for IncrementScore {
    fn set_player_index_prop(&mut self, name: &str, v: PlayerIndex) -> Result<()> {
        match name {
            "Player" => {
                self.player = v;
                Ok(())
            }
            _ => Err(not_found(name)),
        }
    }

    fn set_int_prop(&mut self, name: &str, v: i64) -> Result<()> {
        match name {
            "Amount" => {
                self.amount = v;
                Ok(())
            }
            _ => Err(not_found(name)),
        }
    }
}

impl Move for IncrementScore {
    fn name(&self) -> &str {
        "IncrementScore"
    }

    fn clone_box(&self) -> Box<dyn Move> {
        Box::new(self.clone())
    }

    fn defaults_for_state(&mut self, state: &State) {
        self.player = current_player(state);
        self.amount = 1;
    }

    fn legal(&self, state: &State, proposer: PlayerIndex) -> Result<()> {
        if !self.player.is_player(state.num_players()) {
            return Err(EngineError::ProposalRejected(format!(
                "{} holds no score",
                self.player
            )));
        }
        if !proposer.is_admin() && proposer != self.player {
            return Err(EngineError::ProposalRejected(format!(
                "{proposer} cannot score for {}",
                self.player
            )));
        }
        if self.amount <= 0 {
            return Err(EngineError::ProposalRejected(
                "score increments are positive".into(),
            ));
        }
        Ok(())
    }

    fn apply(&self, state: &mut State) -> Result<()> {
        let seat = self.player.as_seat().expect("checked in legal");
        let score = state.player_state(seat)?.int_prop("Score")?;
        state
            .player_state_mut(seat)?
            .set_int_prop("Score", score + self.amount)
    }
}

/// Start a wall-clock timer that passes the turn when it fires.
#[derive(Debug, Clone, Default)]
pub struct ArmTurnTimer {
    pub millis: i64,
}

impl PropertyReader for ArmTurnTimer {
    fn props(&self) -> Vec<PropertySchema> {
        vec![PropertySchema::new("Millis", PropKind::Int)]
    }

    fn int_prop(&self, name: &str) -> Result<i64> {
        match name {
            "Millis" => Ok(self.millis),
            _ => Err(not_found(name)),
        }
    }
}

impl PropertyReadSetter for ArmTurnTimer {
    fn set_int_prop(&mut self, name: &str, v: i64) -> Result<()> {
        match name {
            "Millis" => {
                self.millis = v;
                Ok(())
            }
            _ => Err(not_found(name)),
        }
    }
}

impl Move for ArmTurnTimer {
    fn name(&self) -> &str {
        "ArmTurnTimer"
    }

    fn clone_box(&self) -> Box<dyn Move> {
        Box::new(self.clone())
    }

    fn legal(&self, state: &State, proposer: PlayerIndex) -> Result<()> {
        if !proposer.is_admin() && proposer != current_player(state) {
            return Err(EngineError::ProposalRejected(
                "only the current player arms the turn timer".into(),
            ));
        }
        if self.millis <= 0 {
            return Err(EngineError::ProposalRejected(
                "timer duration must be positive".into(),
            ));
        }
        Ok(())
    }

    fn apply(&self, state: &mut State) -> Result<()> {
        let timer = state.prepare_timer(
            Duration::from_millis(self.millis as u64),
            Box::new(AdvanceTurn::default()),
        );
        state
            .game_state_mut()
            .configure_timer_prop("MoveTimer", timer)
    }
}

/// Deactivate the turn timer before it fires.
#[derive(Debug, Clone, Default)]
pub struct CancelTurnTimer;

impl PropertyReader for CancelTurnTimer {
    fn props(&self) -> Vec<PropertySchema> {
        vec![]
    }
}

impl PropertyReadSetter for CancelTurnTimer {}

impl Move for CancelTurnTimer {
    fn name(&self) -> &str {
        "CancelTurnTimer"
    }

    fn clone_box(&self) -> Box<dyn Move> {
        Box::new(self.clone())
    }

    fn legal(&self, state: &State, proposer: PlayerIndex) -> Result<()> {
        if !proposer.is_admin() && proposer != current_player(state) {
            return Err(EngineError::ProposalRejected(
                "only the current player cancels the turn timer".into(),
            ));
        }
        if !state.game_state().timer_prop("MoveTimer")?.is_active() {
            return Err(EngineError::ProposalRejected("no timer is armed".into()));
        }
        Ok(())
    }

    fn apply(&self, state: &mut State) -> Result<()> {
        let mut timer = state.game_state().timer_prop("MoveTimer")?.clone();
        state.cancel_timer(&mut timer);
        state
            .game_state_mut()
            .configure_timer_prop("MoveTimer", timer)
    }
}

// --- delegate and agent ---------------------------------------------------

#[derive(Debug, Default)]
pub struct TallyDelegate;

impl GameDelegate for TallyDelegate {
    fn name(&self) -> &'static str {
        "tally"
    }

    fn configure_decks(&self, chest: &mut ChestBuilder) -> Result<()> {
        chest.add_plain_deck("cards", NUM_CARDS)?;
        Ok(())
    }

    fn configure_enums(&self, chest: &mut ChestBuilder) -> Result<()> {
        chest.add_tree_enum(
            "Phase",
            &[(0, "Root"), (PHASE_SETUP, "Setup"), (PHASE_PLAY, "Play")],
            &[(PHASE_SETUP, 0), (PHASE_PLAY, 0)],
        )?;
        Ok(())
    }

    fn configure_constants(&self, chest: &mut ChestBuilder) -> Result<()> {
        chest.add_constant("HandLimit", HAND_LIMIT as i64)?;
        Ok(())
    }

    fn configure_moves(&self) -> Vec<MoveTypeConfig> {
        vec![
            MoveTypeConfig::new("DrawCard", || Box::new(DrawCard::default()))
                .with_help_text("draw the top card into your hand")
                .with_legal_phases(vec![PHASE_PLAY]),
            MoveTypeConfig::new("AdvanceTurn", || Box::new(AdvanceTurn)).fix_up(),
            MoveTypeConfig::new("IncrementScore", || Box::new(IncrementScore::default())),
            MoveTypeConfig::new("ArmTurnTimer", || Box::new(ArmTurnTimer::default())),
            MoveTypeConfig::new("CancelTurnTimer", || Box::new(CancelTurnTimer)),
        ]
    }

    fn configure_agents(&self) -> Vec<Box<dyn Agent>> {
        vec![Box::new(DrawBot)]
    }

    fn game_state_constructor(&self) -> Box<dyn SubState> {
        Box::new(TallyGameState::default())
    }

    fn player_state_constructor(&self, _seat: PlayerIndex) -> Box<dyn SubState> {
        Box::new(TallyPlayerState::default())
    }

    fn dynamic_component_values_constructor(
        &self,
        deck: &boardgame::component::Deck,
    ) -> Option<Box<dyn SubState>> {
        if deck.name() != "cards" {
            return None;
        }
        let mut bag = PropBag::new();
        bag.insert("Strength", PropValue::Int(0));
        Some(Box::new(bag))
    }

    fn begin_set_up(&self, state: &mut State, _variant: &Variant) -> Result<()> {
        state
            .game_state_mut()
            .configure_enum_prop("Phase", EnumValue::new("Phase", PHASE_PLAY))?;
        state
            .game_state_mut()
            .set_player_index_prop("CurrentPlayer", PlayerIndex::new(0))
    }

    fn distribute_component_to_starter_stack(
        &self,
        _state: &State,
        _component: &boardgame::component::Component,
    ) -> Result<StarterStack> {
        Ok(StarterStack::game("DrawDeck"))
    }

    fn finish_set_up(&self, state: &mut State) -> Result<()> {
        // Each card's strength is its deck index, so tests can predict it.
        if let Some(values) = state.dynamic_values_mut("cards") {
            for (i, v) in values.iter_mut().enumerate() {
                v.set_int_prop("Strength", i as i64)?;
            }
        }
        let mut deck = state.game_state().stack_prop("DrawDeck")?.clone();
        deck.shuffle(state.rng_mut());
        state.game_state_mut().configure_stack_prop("DrawDeck", deck)
    }

    fn check_game_finished(&self, state: &State) -> (bool, Vec<PlayerIndex>) {
        let scores: Vec<i64> = (0..state.num_players())
            .map(|seat| {
                state
                    .player_state(seat)
                    .and_then(|p| p.int_prop("Score"))
                    .unwrap_or(0)
            })
            .collect();
        let best = scores.iter().copied().max().unwrap_or(0);
        if best < WIN_SCORE {
            return (false, Vec::new());
        }
        let winners = scores
            .iter()
            .enumerate()
            .filter(|(_, s)| **s == best)
            .map(|(seat, _)| PlayerIndex::new(seat))
            .collect();
        (true, winners)
    }

    fn current_player_index(&self, state: &State) -> PlayerIndex {
        current_player(state)
    }

    fn current_phase(&self, state: &State) -> i64 {
        state
            .game_state()
            .enum_prop("Phase")
            .map(|e| e.value())
            .unwrap_or(0)
    }

    fn phase_enum(&self) -> Option<&'static str> {
        Some("Phase")
    }
}

/// Draws whenever it has the turn and room in hand.
#[derive(Debug)]
pub struct DrawBot;

impl Agent for DrawBot {
    fn name(&self) -> &'static str {
        "drawbot"
    }

    fn set_up_for_game(&self, _state: &State, _seat: PlayerIndex) -> Vec<u8> {
        b"draws:0".to_vec()
    }

    fn propose_move(
        &self,
        state: &State,
        seat: PlayerIndex,
        _agent_state: &[u8],
    ) -> (Option<Box<dyn Move>>, Option<Vec<u8>>) {
        if current_player(state) != seat {
            return (None, None);
        }
        let at = seat.as_seat().expect("agents are seated");
        if hand_len(state, at) >= HAND_LIMIT {
            return (None, None);
        }
        if state
            .game_state()
            .stack_prop("DrawDeck")
            .map(|s| s.is_empty())
            .unwrap_or(true)
        {
            return (None, None);
        }
        (Some(Box::new(DrawCard { player: seat })), None)
    }
}

// --- harness helpers ------------------------------------------------------

pub fn build_manager() -> Arc<GameManager> {
    build_manager_with_storage(Arc::new(MemoryStorage::new()))
}

pub fn build_manager_with_storage(storage: Arc<dyn StorageProvider>) -> Arc<GameManager> {
    let _ = env_logger::builder().is_test(true).try_init();
    GameManagerBuilder::new(Arc::new(TallyDelegate), storage)
        .build()
        .expect("manager builds")
}

/// A provider that can be told to start failing writes, for halt testing.
pub struct FailableStorage {
    inner: MemoryStorage,
    failing: AtomicBool,
    writes_left: AtomicI64,
}

impl FailableStorage {
    pub fn new() -> Self {
        FailableStorage {
            inner: MemoryStorage::new(),
            failing: AtomicBool::new(false),
            writes_left: AtomicI64::new(-1),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Accept `writes` more saves, then fail every save after that.
    pub fn fail_after(&self, writes: i64) {
        self.writes_left.store(writes, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(EngineError::Storage("backend unavailable".into()));
        }
        match self.writes_left.load(Ordering::SeqCst) {
            n if n < 0 => Ok(()),
            0 => Err(EngineError::Storage("backend unavailable".into())),
            n => {
                self.writes_left.store(n - 1, Ordering::SeqCst);
                Ok(())
            }
        }
    }
}

impl StorageProvider for FailableStorage {
    fn game(&self, game_id: &str) -> Result<GameRecord> {
        self.inner.game(game_id)
    }

    fn state(&self, game_id: &str, version: u64) -> Result<Vec<u8>> {
        self.inner.state(game_id, version)
    }

    fn mov(&self, game_id: &str, version: u64) -> Result<boardgame::moves::MoveRecord> {
        self.inner.mov(game_id, version)
    }

    fn moves(
        &self,
        game_id: &str,
        from: u64,
        to: u64,
    ) -> Result<Vec<boardgame::moves::MoveRecord>> {
        self.inner.moves(game_id, from, to)
    }

    fn save_game_and_current_state(
        &self,
        game: &GameRecord,
        state: &[u8],
        mv: Option<&boardgame::moves::MoveRecord>,
    ) -> Result<()> {
        self.check()?;
        self.inner.save_game_and_current_state(game, state, mv)
    }

    fn agent_state(&self, game_id: &str, seat: PlayerIndex) -> Result<Vec<u8>> {
        self.inner.agent_state(game_id, seat)
    }

    fn save_agent_state(&self, game_id: &str, seat: PlayerIndex, blob: &[u8]) -> Result<()> {
        self.check()?;
        self.inner.save_agent_state(game_id, seat, blob)
    }
}
