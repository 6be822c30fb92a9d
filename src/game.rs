//! One running game: a cheap cloneable handle plus a worker task that owns
//! the committed state
//!
//! All mutation is serialized through the worker's channel, so the pipeline
//! never needs a lock around the state. The handle carries only the game id
//! and two atomics (current version, finished) for lock-free staleness
//! checks; timers hold a handle clone and propose through the same channel
//! as everyone else.

use crate::delegate::{StackOwner, Variant};
use crate::error::{EngineError, Result};
use crate::manager::GameManager;
use crate::moves::{Move, MoveRecord};
use crate::prop::reader::fill_scalar_props_from_json;
use crate::prop::scalar_props_to_json;
use crate::prop::value::PlayerIndex;
use crate::state::{State, SubState};
use crate::stack::{InsertSlot, Slot};
use crate::storage::GameRecord;
use chrono::Utc;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

enum ProposalSpec {
    Instance(Box<dyn Move>),
    Named {
        name: String,
        payload: serde_json::Map<String, serde_json::Value>,
    },
}

enum Command {
    SetUp {
        num_players: usize,
        agents: Vec<String>,
        variant: Variant,
        reply: oneshot::Sender<Result<()>>,
    },
    Propose {
        spec: ProposalSpec,
        proposer: PlayerIndex,
        reply: oneshot::Sender<Result<u64>>,
    },
    CurrentState {
        reply: oneshot::Sender<Result<State>>,
    },
    SanitizedState {
        recipient: PlayerIndex,
        reply: oneshot::Sender<Result<State>>,
    },
    Record {
        reply: oneshot::Sender<Result<GameRecord>>,
    },
    ClearStorageError {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to a running game. Clones share the same worker.
#[derive(Clone, Debug)]
pub struct Game {
    id: String,
    tx: mpsc::Sender<Command>,
    version: Arc<AtomicU64>,
    finished: Arc<AtomicBool>,
}

fn worker_gone() -> EngineError {
    EngineError::NotFound("game worker has shut down".to_string())
}

impl Game {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Version of the last committed state, without a round trip.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.tx.send(build(tx)).await.map_err(|_| worker_gone())?;
        rx.await.map_err(|_| worker_gone())
    }

    /// Initialize the game: build and distribute the starting state, run
    /// the setup hooks, and commit version 0.
    pub async fn set_up(
        &self,
        num_players: usize,
        agents: Vec<String>,
        variant: Variant,
    ) -> Result<()> {
        self.request(|reply| Command::SetUp {
            num_players,
            agents,
            variant,
            reply,
        })
        .await?
    }

    /// Propose a typed move instance. Resolves when the whole chain (the
    /// move plus any fix-ups) has committed; returns the final version.
    pub async fn propose_move(&self, mv: Box<dyn Move>, proposer: PlayerIndex) -> Result<u64> {
        self.request(|reply| Command::Propose {
            spec: ProposalSpec::Instance(mv),
            proposer,
            reply,
        })
        .await?
    }

    /// Propose by registered type name with a scalar payload, for callers
    /// holding serialized input.
    pub async fn propose_move_by_name(
        &self,
        name: &str,
        payload: serde_json::Map<String, serde_json::Value>,
        proposer: PlayerIndex,
    ) -> Result<u64> {
        self.request(|reply| Command::Propose {
            spec: ProposalSpec::Named {
                name: name.to_string(),
                payload,
            },
            proposer,
            reply,
        })
        .await?
    }

    /// A copy of the committed state, unsanitized.
    pub async fn current_state(&self) -> Result<State> {
        self.request(|reply| Command::CurrentState { reply }).await?
    }

    /// The committed state as `recipient` may see it.
    pub async fn sanitized_state(&self, recipient: PlayerIndex) -> Result<State> {
        self.request(|reply| Command::SanitizedState { recipient, reply })
            .await?
    }

    pub async fn record(&self) -> Result<GameRecord> {
        self.request(|reply| Command::Record { reply }).await?
    }

    /// Lift a storage-failure halt after the operator fixes the backend.
    pub async fn clear_storage_error(&self) -> Result<()> {
        self.request(|reply| Command::ClearStorageError { reply })
            .await
    }
}

fn random_hex(bytes: usize) -> String {
    use rand::Rng;
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill(&mut buf[..]);
    hex::encode(buf)
}

/// Create the worker task and its handle. The game has no state until
/// `set_up`.
pub(crate) fn spawn_game(manager: Arc<GameManager>) -> Game {
    let id = random_hex(8);
    let record = GameRecord {
        id: id.clone(),
        name: manager.delegate().name().to_string(),
        secret_salt: random_hex(8),
        version: 0,
        num_players: 0,
        finished: false,
        winners: Vec::new(),
        created: Utc::now(),
        agents: Vec::new(),
        variant: Variant::new(),
    };
    let (tx, rx) = mpsc::channel(32);
    let version = Arc::new(AtomicU64::new(0));
    let finished = Arc::new(AtomicBool::new(false));
    let handle = Game {
        id,
        tx,
        version: Arc::clone(&version),
        finished: Arc::clone(&finished),
    };
    let worker = GameWorker {
        manager,
        handle: handle.clone(),
        record,
        state: None,
        storage_error: None,
        version,
        finished,
    };
    tokio::spawn(worker.run(rx));
    handle
}

struct GameWorker {
    manager: Arc<GameManager>,
    /// Clone of the public handle, given to timer records.
    handle: Game,
    record: GameRecord,
    state: Option<State>,
    /// While set, proposals fail fast; reads still work.
    storage_error: Option<String>,
    version: Arc<AtomicU64>,
    finished: Arc<AtomicBool>,
}

impl GameWorker {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        while let Some(cmd) = rx.recv().await {
            match cmd {
                Command::SetUp {
                    num_players,
                    agents,
                    variant,
                    reply,
                } => {
                    let result = self.set_up(num_players, agents, variant);
                    if result.is_ok() {
                        self.run_agents();
                    }
                    let _ = reply.send(result);
                }
                Command::Propose {
                    spec,
                    proposer,
                    reply,
                } => {
                    let result = self.propose(spec, proposer);
                    if result.is_ok() {
                        self.run_agents();
                    }
                    let _ = reply.send(result);
                }
                Command::CurrentState { reply } => {
                    let _ = reply.send(
                        self.state
                            .as_ref()
                            .cloned()
                            .ok_or_else(|| EngineError::Configuration("game not set up".into())),
                    );
                }
                Command::SanitizedState { recipient, reply } => {
                    let result = match &self.state {
                        Some(s) => s.sanitize(&self.manager, recipient),
                        None => Err(EngineError::Configuration("game not set up".into())),
                    };
                    let _ = reply.send(result);
                }
                Command::Record { reply } => {
                    let _ = reply.send(Ok(self.record.clone()));
                }
                Command::ClearStorageError { reply } => {
                    if let Some(e) = self.storage_error.take() {
                        log::info!("game {}: storage error cleared ({e})", self.record.id);
                    }
                    let _ = reply.send(());
                }
            }
        }
    }

    fn set_up(
        &mut self,
        num_players: usize,
        agents: Vec<String>,
        variant: Variant,
    ) -> Result<()> {
        if self.state.is_some() {
            return Err(EngineError::Configuration(
                "game is already set up".to_string(),
            ));
        }
        let manager = Arc::clone(&self.manager);
        let delegate = manager.delegate();
        if !delegate.legal_num_players(num_players) {
            return Err(EngineError::Configuration(format!(
                "{num_players} players is not legal for {}",
                delegate.name()
            )));
        }
        let variant = delegate.variants().resolve(&variant)?;
        let agents = match agents.len() {
            0 => vec![String::new(); num_players],
            n if n == num_players => agents,
            n => {
                return Err(EngineError::Configuration(format!(
                    "{n} agent entries for {num_players} players"
                )))
            }
        };
        for name in agents.iter().filter(|n| !n.is_empty()) {
            if manager.agent(name).is_none() {
                return Err(EngineError::Configuration(format!("unknown agent {name}")));
            }
        }

        let chest = manager.chest();
        let mut game = delegate.game_state_constructor();
        manager.game_inflater().inflate(game.as_mut(), chest)?;
        let mut players: Vec<Box<dyn SubState>> = Vec::with_capacity(num_players);
        for seat in 0..num_players {
            let mut p = delegate.player_state_constructor(PlayerIndex::new(seat));
            manager.player_inflater().inflate(p.as_mut(), chest)?;
            players.push(p);
        }
        let mut dynamic_values: FxHashMap<String, Vec<Box<dyn SubState>>> = FxHashMap::default();
        for deck in chest.decks() {
            if let Some(inflater) = manager.dynamic_inflater(deck.name()) {
                let mut subs = Vec::with_capacity(deck.len());
                for _ in 0..deck.len() {
                    let mut s = delegate
                        .dynamic_component_values_constructor(deck)
                        .ok_or_else(|| {
                            EngineError::Configuration(format!(
                                "deck {} lost its dynamic values constructor",
                                deck.name()
                            ))
                        })?;
                    inflater.inflate(s.as_mut(), chest)?;
                    subs.push(s);
                }
                dynamic_values.insert(deck.name().to_string(), subs);
            }
        }

        let mut state = State::new(
            delegate.schema_version(),
            self.record.id.clone(),
            self.record.secret_salt.clone(),
            num_players,
            game,
            players,
            dynamic_values,
        );
        delegate.begin_set_up(&mut state, &variant)?;

        // Every component gets exactly one starting home.
        for deck in chest.decks() {
            for component in deck.components() {
                let starter = delegate.distribute_component_to_starter_stack(&state, component)?;
                let sub = match starter.owner {
                    StackOwner::Game => state.game_state_mut(),
                    StackOwner::Player(seat) => state.player_state_mut(seat)?,
                };
                let stack = match starter.space {
                    Some(space) => sub
                        .board_prop_mut(&starter.prop)?
                        .space_mut(space)
                        .ok_or_else(|| {
                            EngineError::Configuration(format!(
                                "board {} has no space {space}",
                                starter.prop
                            ))
                        })?,
                    None => sub.stack_prop_mut(&starter.prop)?,
                };
                stack.insert_component(InsertSlot::NextFree, Slot::new(component.deck_index()))?;
            }
        }

        delegate.finish_set_up(&mut state)?;
        state.validate(&manager)?;
        state.commit_prep(0)?;

        self.record.num_players = num_players;
        self.record.agents = agents;
        self.record.variant = variant;
        self.record.version = 0;

        let bytes = state.to_bytes(&manager)?;
        if let Err(e) = manager
            .storage()
            .save_game_and_current_state(&self.record, &bytes, None)
        {
            self.storage_error = Some(e.to_string());
            return Err(e);
        }
        self.commit(state, 0);

        for seat in 0..num_players {
            let name = self.record.agents[seat].clone();
            if name.is_empty() {
                continue;
            }
            if let Some(agent) = manager.agent(&name) {
                let blob =
                    agent.set_up_for_game(self.state.as_ref().expect("just set"), PlayerIndex::new(seat));
                if let Err(e) = manager.storage().save_agent_state(
                    &self.record.id,
                    PlayerIndex::new(seat),
                    &blob,
                ) {
                    self.storage_error = Some(e.to_string());
                    return Err(e);
                }
            }
        }
        log::info!(
            "game {} set up for {num_players} players at v0",
            self.record.id
        );
        Ok(())
    }

    fn propose(&mut self, spec: ProposalSpec, proposer: PlayerIndex) -> Result<u64> {
        let manager = Arc::clone(&self.manager);
        let mv = match spec {
            ProposalSpec::Instance(mv) => {
                if manager.move_type(mv.name()).is_none() {
                    return Err(EngineError::ProposalRejected(format!(
                        "unknown move type {}",
                        mv.name()
                    )));
                }
                mv
            }
            ProposalSpec::Named { name, payload } => {
                let mt = manager.move_type(&name).ok_or_else(|| {
                    EngineError::ProposalRejected(format!("unknown move type {name}"))
                })?;
                let state = self
                    .state
                    .as_ref()
                    .ok_or_else(|| EngineError::Configuration("game not set up".into()))?;
                let mut mv = mt.new_move(state);
                fill_scalar_props_from_json(mv.as_mut(), &payload)?;
                mv
            }
        };
        self.run_chain(mv, proposer)
    }

    /// The pipeline: legality, scratchpad apply, validation, persistence,
    /// commit, then fix-ups until quiescent.
    ///
    /// A storage failure while committing a move halts the game and rejects
    /// the proposal. A failure while re-saving the record's finished flag
    /// after the final commit also halts the game, but the proposal still
    /// reports the committed version: the move itself is already durable,
    /// only the stored record lags behind the worker's.
    fn run_chain(&mut self, mv: Box<dyn Move>, proposer: PlayerIndex) -> Result<u64> {
        if self.finished.load(Ordering::SeqCst) {
            return Err(EngineError::GameFinished);
        }
        if let Some(e) = &self.storage_error {
            return Err(EngineError::Storage(format!(
                "storage is failing, game is halted: {e}"
            )));
        }
        if self.state.is_none() {
            return Err(EngineError::Configuration("game not set up".into()));
        }
        if proposer.is_observer() {
            return Err(EngineError::ProposalRejected(
                "observers cannot propose moves".to_string(),
            ));
        }
        if !proposer.is_admin() && !proposer.is_player(self.record.num_players) {
            return Err(EngineError::ProposalRejected(format!(
                "{proposer} is not part of this game"
            )));
        }

        let manager = Arc::clone(&self.manager);
        let delegate = manager.delegate();
        let mut current = mv;
        let mut current_proposer = proposer;
        let mut initiator: Option<u64> = None;
        let mut applied = 0usize;

        loop {
            applied += 1;
            if applied > manager.fix_up_chain_max() {
                log::error!(
                    "game {}: fix-up chain exceeded {} moves, aborting",
                    self.record.id,
                    manager.fix_up_chain_max()
                );
                return Err(EngineError::FixUpChainExceeded(manager.fix_up_chain_max()));
            }
            let first = applied == 1;
            let mt = match manager.move_type(current.name()) {
                Some(mt) => mt,
                None => {
                    return Err(EngineError::Configuration(format!(
                        "fix-up produced unregistered move type {}",
                        current.name()
                    )))
                }
            };
            if first && mt.is_fix_up() && !current_proposer.is_admin() {
                return Err(EngineError::ProposalRejected(format!(
                    "{} is a fix-up move, only admin may propose it",
                    mt.name()
                )));
            }

            let state = self.state.as_ref().expect("checked above");
            if !mt.legal_phases().is_empty() {
                let phase = delegate.current_phase(state);
                if !mt.legal_phases().contains(&phase) {
                    if first {
                        return Err(EngineError::ProposalRejected(format!(
                            "move {} is not legal in phase {phase}",
                            mt.name()
                        )));
                    }
                    break;
                }
            }
            if let Err(e) = current.legal(state, current_proposer) {
                if first {
                    return Err(EngineError::ProposalRejected(format!(
                        "move {} is not legal: {e}",
                        current.name()
                    )));
                }
                log::debug!(
                    "game {}: fix-up {} no longer legal, ending chain: {e}",
                    self.record.id,
                    current.name()
                );
                break;
            }

            let mut scratch = state.clone();
            if let Err(e) = current.apply(&mut scratch) {
                if first {
                    return Err(EngineError::ProposalRejected(format!(
                        "move {} failed to apply: {e}",
                        current.name()
                    )));
                }
                log::warn!(
                    "game {}: fix-up {} failed to apply, ending chain: {e}",
                    self.record.id,
                    current.name()
                );
                break;
            }
            if let Err(e) = scratch.validate(&manager) {
                if first {
                    return Err(e);
                }
                log::warn!(
                    "game {}: fix-up {} produced an invalid state, ending chain: {e}",
                    self.record.id,
                    current.name()
                );
                break;
            }

            let new_version = state.version() + 1;
            scratch.commit_prep(new_version)?;
            let init = *initiator.get_or_insert(new_version);
            let move_record = MoveRecord {
                name: current.name().to_string(),
                version: new_version,
                initiator: init,
                timestamp: Utc::now(),
                phase: delegate.current_phase(&scratch),
                proposer: current_proposer,
                payload: scalar_props_to_json(current.as_ref())?,
            };

            let bytes = scratch.to_bytes(&manager)?;
            self.record.version = new_version;
            if let Err(e) =
                manager
                    .storage()
                    .save_game_and_current_state(&self.record, &bytes, Some(&move_record))
            {
                self.record.version = new_version - 1;
                self.storage_error = Some(e.to_string());
                log::error!(
                    "game {}: storage rejected commit of v{new_version}, halting: {e}",
                    self.record.id
                );
                return Err(e);
            }
            self.commit(scratch, new_version);
            log::debug!(
                "game {}: {} committed as v{new_version} (proposer {current_proposer})",
                self.record.id,
                move_record.name
            );

            let state = self.state.as_ref().expect("just committed");
            let (done, winners) = delegate.check_game_finished(state);
            if done {
                self.record.finished = true;
                self.record.winners = winners;
                self.finished.store(true, Ordering::SeqCst);
                if let Err(e) =
                    manager
                        .storage()
                        .save_game_and_current_state(&self.record, &bytes, None)
                {
                    self.storage_error = Some(e.to_string());
                    log::error!(
                        "game {}: storage rejected finished record at v{new_version}: {e}",
                        self.record.id
                    );
                }
                log::info!(
                    "game {} finished at v{new_version}, winners {:?}",
                    self.record.id,
                    self.record.winners
                );
                break;
            }

            match current
                .immediate_fix_up(state)
                .or_else(|| delegate.propose_fix_up(state))
            {
                Some(next) => {
                    current = next;
                    current_proposer = PlayerIndex::ADMIN;
                }
                None => break,
            }
        }

        if proposer.is_player(self.record.num_players) {
            if let Err(e) = manager.storage().player_move_applied(&self.record) {
                self.storage_error = Some(e.to_string());
            }
        }
        Ok(self.record.version)
    }

    /// Swap in the committed state and flush its timer intents into the
    /// shared queue.
    fn commit(&mut self, mut state: State, version: u64) {
        let (prepared, cancelled) = state.take_timer_intents();
        self.state = Some(state);
        self.version.store(version, Ordering::SeqCst);
        let timers = self.manager.timers();
        for p in prepared {
            timers.register(
                p.id.clone(),
                p.duration,
                self.handle.clone(),
                version,
                p.mv,
            );
            timers.start(&p.id);
        }
        for id in cancelled {
            timers.cancel(&id);
        }
    }

    /// Show every seated agent the committed state; run until no agent has
    /// anything to propose.
    fn run_agents(&mut self) {
        let manager = Arc::clone(&self.manager);
        let mut rounds = 0usize;
        loop {
            rounds += 1;
            if rounds > manager.fix_up_chain_max() {
                log::warn!(
                    "game {}: agents still proposing after {rounds} rounds, yielding",
                    self.record.id
                );
                return;
            }
            let mut any = false;
            for seat in 0..self.record.num_players {
                if self.finished.load(Ordering::SeqCst) || self.storage_error.is_some() {
                    return;
                }
                let name = self.record.agents[seat].clone();
                if name.is_empty() {
                    continue;
                }
                let agent = match manager.agent(&name) {
                    Some(a) => a,
                    None => continue,
                };
                let seat_idx = PlayerIndex::new(seat);
                let blob = manager
                    .storage()
                    .agent_state(&self.record.id, seat_idx)
                    .unwrap_or_default();
                let state = self.state.as_ref().expect("agents run on set-up games");
                let (mv, new_blob) = agent.propose_move(state, seat_idx, &blob);
                if let Some(b) = new_blob {
                    if let Err(e) =
                        manager
                            .storage()
                            .save_agent_state(&self.record.id, seat_idx, &b)
                    {
                        self.storage_error = Some(e.to_string());
                        return;
                    }
                }
                if let Some(mv) = mv {
                    match self.run_chain(mv, seat_idx) {
                        Ok(_) => any = true,
                        Err(e) => log::warn!(
                            "game {}: agent {name} proposal rejected: {e}",
                            self.record.id
                        ),
                    }
                }
            }
            if !any {
                return;
            }
        }
    }
}
