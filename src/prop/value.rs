//! Property kinds, schemas, and the player-index newtype

use crate::enums::EnumValue;
use crate::stack::{Board, MergedStack, Stack};
use crate::timer::Timer;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// A player's seat within a game, or one of the two out-of-band actors.
///
/// Admin is the proposer credited for fix-up and timer moves and bypasses
/// player-legality checks; observers may inspect sanitized states but can
/// never propose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerIndex(pub i32);

impl PlayerIndex {
    pub const ADMIN: PlayerIndex = PlayerIndex(-1);
    pub const OBSERVER: PlayerIndex = PlayerIndex(-2);

    pub fn new(seat: usize) -> Self {
        PlayerIndex(seat as i32)
    }

    pub fn is_admin(&self) -> bool {
        *self == Self::ADMIN
    }

    pub fn is_observer(&self) -> bool {
        *self == Self::OBSERVER
    }

    /// True for a real seat in a game with `num_players` seats.
    pub fn is_player(&self, num_players: usize) -> bool {
        self.0 >= 0 && (self.0 as usize) < num_players
    }

    /// True for any index legal in a player-index property after a move
    /// applies: a real seat, admin, or observer.
    pub fn is_valid(&self, num_players: usize) -> bool {
        self.is_player(num_players) || self.is_admin() || self.is_observer()
    }

    pub fn as_seat(&self) -> Option<usize> {
        if self.0 >= 0 {
            Some(self.0 as usize)
        } else {
            None
        }
    }
}

/// Defaults to the observer: a freshly constructed player-index property
/// points at nobody until the game assigns it.
impl Default for PlayerIndex {
    fn default() -> Self {
        Self::OBSERVER
    }
}

impl fmt::Display for PlayerIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::ADMIN => write!(f, "admin"),
            Self::OBSERVER => write!(f, "observer"),
            _ => write!(f, "player {}", self.0),
        }
    }
}

/// The closed set of property types a reader may expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropKind {
    Int,
    Bool,
    String,
    PlayerIndex,
    IntSlice,
    BoolSlice,
    StringSlice,
    PlayerIndexSlice,
    Enum,
    Stack,
    Board,
    Timer,
}

impl PropKind {
    /// Interface-typed properties are replaced via `configure_*` rather than
    /// copied via `set_*`.
    pub fn is_interface(&self) -> bool {
        matches!(
            self,
            PropKind::Enum | PropKind::Stack | PropKind::Board | PropKind::Timer
        )
    }
}

/// Per-property metadata declared by a struct's reader.
///
/// This table plays the role struct field tags would: it names the
/// property, fixes its kind and mutability, and carries the
/// inflation and sanitization tag strings the manager parses at setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertySchema {
    pub name: Cow<'static, str>,
    pub kind: PropKind,
    /// For interface kinds: whether the underlying slot is the mutable
    /// variant. Setters refuse to mutate immutable slots.
    pub mutable: bool,
    /// Inflation tag, e.g. `stack:DrawDeck,5`, `sizedstack:Cards,3`,
    /// `board:Spaces`, `concatenate:A,B`, `overlap:A,B`, `enum:Phase`.
    pub tag: Option<Cow<'static, str>>,
    /// Sanitization tag, e.g. `len` or `self:visible,other:hidden`.
    pub sanitize: Option<Cow<'static, str>>,
}

impl PropertySchema {
    pub fn new(name: impl Into<Cow<'static, str>>, kind: PropKind) -> Self {
        PropertySchema {
            name: name.into(),
            kind,
            mutable: true,
            tag: None,
            sanitize: None,
        }
    }

    pub fn immutable(name: impl Into<Cow<'static, str>>, kind: PropKind) -> Self {
        PropertySchema {
            name: name.into(),
            kind,
            mutable: false,
            tag: None,
            sanitize: None,
        }
    }

    pub fn with_tag(mut self, tag: impl Into<Cow<'static, str>>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn with_sanitize(mut self, sanitize: impl Into<Cow<'static, str>>) -> Self {
        self.sanitize = Some(sanitize.into());
        self
    }
}

/// A dynamically typed property value, used by `PropBag` and by the
/// serialization helpers.
#[derive(Debug, Clone, PartialEq)]
pub enum PropValue {
    Int(i64),
    Bool(bool),
    String(String),
    PlayerIndex(PlayerIndex),
    IntSlice(Vec<i64>),
    BoolSlice(Vec<bool>),
    StringSlice(Vec<String>),
    PlayerIndexSlice(Vec<PlayerIndex>),
    Enum(EnumValue),
    Stack(Stack),
    MergedStack(MergedStack),
    Board(Board),
    Timer(Timer),
}

impl PropValue {
    pub fn kind(&self) -> PropKind {
        match self {
            PropValue::Int(_) => PropKind::Int,
            PropValue::Bool(_) => PropKind::Bool,
            PropValue::String(_) => PropKind::String,
            PropValue::PlayerIndex(_) => PropKind::PlayerIndex,
            PropValue::IntSlice(_) => PropKind::IntSlice,
            PropValue::BoolSlice(_) => PropKind::BoolSlice,
            PropValue::StringSlice(_) => PropKind::StringSlice,
            PropValue::PlayerIndexSlice(_) => PropKind::PlayerIndexSlice,
            PropValue::Enum(_) => PropKind::Enum,
            PropValue::Stack(_) | PropValue::MergedStack(_) => PropKind::Stack,
            PropValue::Board(_) => PropKind::Board,
            PropValue::Timer(_) => PropKind::Timer,
        }
    }

    /// The zero value a sanitization policy substitutes for a scalar.
    pub fn zeroed(&self) -> PropValue {
        match self {
            PropValue::Int(_) => PropValue::Int(0),
            PropValue::Bool(_) => PropValue::Bool(false),
            PropValue::String(_) => PropValue::String(String::new()),
            PropValue::PlayerIndex(_) => PropValue::PlayerIndex(PlayerIndex(0)),
            PropValue::IntSlice(_) => PropValue::IntSlice(Vec::new()),
            PropValue::BoolSlice(_) => PropValue::BoolSlice(Vec::new()),
            PropValue::StringSlice(_) => PropValue::StringSlice(Vec::new()),
            PropValue::PlayerIndexSlice(_) => PropValue::PlayerIndexSlice(Vec::new()),
            other => other.clone(),
        }
    }
}
