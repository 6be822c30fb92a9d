//! Immutable component catalog: components, decks, and the chest
//!
//! The chest has two lifecycle phases. During construction (`ChestBuilder`)
//! decks, enums, and constants may be added; `build()` freezes it into a
//! read-only `ComponentChest`. The builder exposes no lookups and the chest
//! exposes no registration, so both phase rules hold by construction. A
//! manager builder accepts either form and freezes an unfrozen builder
//! implicitly.

use crate::enums::{Enum, EnumSet};
use crate::error::{EngineError, Result};
use crate::prop::PropertyReader;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::OnceLock;

/// Sentinel deck index of a deck's generic component, distinct from any
/// real component.
pub const GENERIC_INDEX: usize = usize::MAX;

/// Read-only game-specific payload attached to a component.
pub trait ComponentValues: PropertyReader + fmt::Debug + Send + Sync {}

impl<T: PropertyReader + fmt::Debug + Send + Sync> ComponentValues for T {}

/// A cheap handle to a component: equality is by (deck name, deck index).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComponentRef {
    pub deck: String,
    pub deck_index: usize,
}

/// An immutable game piece: its owning deck, index within that deck, and an
/// opaque value payload.
#[derive(Debug)]
pub struct Component {
    deck: String,
    deck_index: usize,
    values: Option<Box<dyn ComponentValues>>,
}

impl Component {
    pub fn deck(&self) -> &str {
        &self.deck
    }

    pub fn deck_index(&self) -> usize {
        self.deck_index
    }

    pub fn is_generic(&self) -> bool {
        self.deck_index == GENERIC_INDEX
    }

    pub fn values(&self) -> Option<&dyn ComponentValues> {
        self.values.as_deref()
    }

    pub fn reference(&self) -> ComponentRef {
        ComponentRef {
            deck: self.deck.clone(),
            deck_index: self.deck_index,
        }
    }
}

impl PartialEq for Component {
    fn eq(&self, other: &Self) -> bool {
        self.deck == other.deck && self.deck_index == other.deck_index
    }
}

impl Eq for Component {}

/// An append-only ordered collection of components of one kind. Named when
/// registered on the chest builder.
#[derive(Debug)]
pub struct Deck {
    name: String,
    components: Vec<Component>,
    generic: OnceLock<Component>,
}

impl Deck {
    fn new(name: &str, values: Vec<Option<Box<dyn ComponentValues>>>) -> Self {
        let components = values
            .into_iter()
            .enumerate()
            .map(|(i, v)| Component {
                deck: name.to_string(),
                deck_index: i,
                values: v,
            })
            .collect();
        Deck {
            name: name.to_string(),
            components,
            generic: OnceLock::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn component(&self, deck_index: usize) -> Option<&Component> {
        if deck_index == GENERIC_INDEX {
            Some(self.generic_component())
        } else {
            self.components.get(deck_index)
        }
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    /// The placeholder component substituted for real ones in sanitized
    /// views. Materialized on first use; its id is always empty.
    pub fn generic_component(&self) -> &Component {
        self.generic.get_or_init(|| Component {
            deck: self.name.clone(),
            deck_index: GENERIC_INDEX,
            values: None,
        })
    }
}

/// Construction-phase chest: decks, enums, and constants may be added.
#[derive(Debug, Default)]
pub struct ChestBuilder {
    decks: Vec<Deck>,
    enums: EnumSet,
    constants: FxHashMap<String, i64>,
}

impl ChestBuilder {
    pub fn new() -> Self {
        ChestBuilder::default()
    }

    /// Register a deck under `name` with one component per payload entry.
    pub fn add_deck(
        &mut self,
        name: &str,
        values: Vec<Option<Box<dyn ComponentValues>>>,
    ) -> Result<&mut Self> {
        if self.decks.iter().any(|d| d.name == name) {
            return Err(EngineError::Configuration(format!(
                "deck {name} registered twice"
            )));
        }
        self.decks.push(Deck::new(name, values));
        Ok(self)
    }

    /// Register a deck of `count` payload-less components.
    pub fn add_plain_deck(&mut self, name: &str, count: usize) -> Result<&mut Self> {
        self.add_deck(name, (0..count).map(|_| None).collect())
    }

    pub fn add_enum(&mut self, name: &str, values: &[(i64, &str)]) -> Result<&mut Self> {
        self.enums.add(Enum::new_plain(name, values)?)?;
        Ok(self)
    }

    pub fn add_range_enum(&mut self, name: &str, min: i64, max: i64) -> Result<&mut Self> {
        self.enums.add(Enum::new_range(name, min, max)?)?;
        Ok(self)
    }

    pub fn add_tree_enum(
        &mut self,
        name: &str,
        values: &[(i64, &str)],
        parents: &[(i64, i64)],
    ) -> Result<&mut Self> {
        self.enums.add(Enum::new_tree(name, values, parents)?)?;
        Ok(self)
    }

    pub fn add_constant(&mut self, name: &str, value: i64) -> Result<&mut Self> {
        if self.constants.contains_key(name) {
            return Err(EngineError::Configuration(format!(
                "constant {name} registered twice"
            )));
        }
        self.constants.insert(name.to_string(), value);
        Ok(self)
    }

    /// Freeze into a served chest. Consumes the builder, so no further
    /// registration is possible.
    pub fn build(self) -> ComponentChest {
        let deck_names = self.decks.iter().map(|d| d.name.clone()).collect();
        let decks = self
            .decks
            .into_iter()
            .map(|d| (d.name.clone(), d))
            .collect();
        ComponentChest {
            decks,
            deck_names,
            enums: self.enums,
            constants: self.constants,
        }
    }
}

/// Served-phase chest: read-only set of decks plus enums and constants.
#[derive(Debug)]
pub struct ComponentChest {
    decks: FxHashMap<String, Deck>,
    deck_names: Vec<String>,
    enums: EnumSet,
    constants: FxHashMap<String, i64>,
}

impl ComponentChest {
    pub fn deck(&self, name: &str) -> Option<&Deck> {
        self.decks.get(name)
    }

    /// Deck names in registration order.
    pub fn deck_names(&self) -> &[String] {
        &self.deck_names
    }

    pub fn decks(&self) -> impl Iterator<Item = &Deck> {
        self.deck_names.iter().filter_map(|n| self.decks.get(n))
    }

    pub fn enums(&self) -> &EnumSet {
        &self.enums
    }

    pub fn constant(&self, name: &str) -> Option<i64> {
        self.constants.get(name).copied()
    }
}

/// Derive a component's semi-stable id within a game.
///
/// The id is stable across ordinary moves and rotates only when the secret
/// move count advances (shuffle, secret move). Generic components have the
/// empty id.
pub fn component_id(
    game_id: &str,
    salt: &str,
    deck: &str,
    deck_index: usize,
    secret_count: u64,
) -> String {
    if deck_index == GENERIC_INDEX {
        return String::new();
    }
    let mut hasher = Sha256::new();
    hasher.update(game_id.as_bytes());
    hasher.update(b":");
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(deck.as_bytes());
    hasher.update(b":");
    hasher.update(deck_index.to_le_bytes());
    hasher.update(b":");
    hasher.update(secret_count.to_le_bytes());
    hex::encode(&hasher.finalize()[..16])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deck_registration() {
        let mut b = ChestBuilder::new();
        b.add_plain_deck("cards", 4).unwrap();
        assert!(b.add_plain_deck("cards", 2).is_err());
        b.add_constant("HandSize", 5).unwrap();
        assert!(b.add_constant("HandSize", 6).is_err());

        let chest = b.build();
        let deck = chest.deck("cards").unwrap();
        assert_eq!(deck.len(), 4);
        assert!(chest.deck("tokens").is_none());
        assert_eq!(chest.constant("HandSize"), Some(5));
        assert_eq!(chest.deck_names(), &["cards".to_string()]);
    }

    #[test]
    fn test_component_equality_by_ref() {
        let mut b = ChestBuilder::new();
        b.add_plain_deck("cards", 2).unwrap();
        let chest = b.build();
        let deck = chest.deck("cards").unwrap();

        let c0 = deck.component(0).unwrap();
        let c1 = deck.component(1).unwrap();
        assert_ne!(c0, c1);
        assert_eq!(c0.reference(), c0.reference());
        assert_ne!(c0.reference(), c1.reference());
    }

    #[test]
    fn test_generic_component() {
        let mut b = ChestBuilder::new();
        b.add_plain_deck("cards", 1).unwrap();
        let chest = b.build();
        let deck = chest.deck("cards").unwrap();

        let g = deck.generic_component();
        assert!(g.is_generic());
        assert_eq!(g.deck_index(), GENERIC_INDEX);
        assert_eq!(component_id("g1", "salt", "cards", GENERIC_INDEX, 0), "");
    }

    #[test]
    fn test_component_id_rotation() {
        let a = component_id("g1", "salt", "cards", 0, 0);
        let same = component_id("g1", "salt", "cards", 0, 0);
        let moved_secretly = component_id("g1", "salt", "cards", 0, 1);
        let other_component = component_id("g1", "salt", "cards", 1, 0);
        let other_game = component_id("g2", "salt", "cards", 0, 0);

        assert_eq!(a, same);
        assert_ne!(a, moved_secretly);
        assert_ne!(a, other_component);
        assert_ne!(a, other_game);
        assert_eq!(a.len(), 32);
    }
}
