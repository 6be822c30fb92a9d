//! A storage-backed engine for turn-based board and card games
//!
//! Games plug in through a [`delegate::GameDelegate`]: it registers the
//! immutable component chest, the move catalog, and constructors for the
//! per-game and per-player state structs. The engine owns everything
//! generic: versioned states, the propose/legal/apply/validate/commit
//! pipeline with fix-up chains, per-recipient sanitization, wall-clock
//! timers, and persistence through a pluggable [`storage::StorageProvider`].
//!
//! Each running game is a worker task owning its committed state; the
//! cloneable [`game::Game`] handle serializes every mutation through one
//! channel, so no state is ever shared mutably.

pub mod component;
pub mod delegate;
pub mod enums;
pub mod error;
pub mod game;
pub mod manager;
pub mod moves;
pub mod prop;
pub mod sanitize;
pub mod stack;
pub mod state;
pub mod storage;
pub mod timer;

pub use component::{ChestBuilder, Component, ComponentChest, ComponentRef, Deck};
pub use delegate::{Agent, GameDelegate, StarterStack, Variant, VariantConfig, VariantKey};
pub use error::{EngineError, Result};
pub use game::Game;
pub use manager::{GameManager, GameManagerBuilder};
pub use moves::{Move, MoveRecord, MoveType, MoveTypeConfig, MoveTypeInfo};
pub use prop::{
    PlayerIndex, PropBag, PropKind, PropValue, PropertyReadSetConfigurer, PropertyReadSetter,
    PropertyReader, PropertySchema,
};
pub use sanitize::Policy;
pub use stack::{Board, InsertSlot, MergeMode, MergedStack, Slot, Stack, StackKind};
pub use state::{SanitizeTarget, State, SubState};
pub use storage::{GameRecord, MemoryStorage, StorageProvider};
pub use timer::{Timer, TimerManager};
