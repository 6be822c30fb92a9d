//! The stack family: ordered containers of component placements
//!
//! A `Stack` owns component slots drawn from a single deck. Growable stacks
//! splice and compact; sized stacks keep a fixed slot count with empty
//! sentinels. Boards are arrays of growable spaces. Merged stacks are
//! read-only derived views declared by `concatenate:`/`overlap:` tags and
//! resolved against the owning reader on demand.
//!
//! Component conservation is structural: removal is only reachable through
//! the atomic move operations, so a committed state can never lose a
//! component mid-move.

use crate::component::GENERIC_INDEX;
use crate::error::{EngineError, Result};
use crate::prop::PropertyReader;
use rand::seq::SliceRandom;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// One occupied slot: which component of the stack's deck sits here, and how
/// many times it has moved secretly. The count travels with the component
/// and feeds its semi-stable id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub deck_index: usize,
    pub secret_count: u64,
}

impl Slot {
    pub fn new(deck_index: usize) -> Self {
        Slot {
            deck_index,
            secret_count: 0,
        }
    }

    pub fn is_generic(&self) -> bool {
        self.deck_index == GENERIC_INDEX
    }
}

/// Growable stacks have a dynamic length bounded by `max` (0 = unbounded)
/// and never contain empty slots. Sized stacks have exactly `size` slots,
/// any of which may be empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StackKind {
    Growable { max: usize },
    Sized { size: usize },
}

/// Where an inserted component lands in the destination stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertSlot {
    Front,
    Back,
    /// Exact index. For sized stacks the slot must be empty.
    At(usize),
    /// First free slot: the end for growable stacks, the first empty slot
    /// for sized ones.
    NextFree,
}

/// An ordered sequence of component slots, all drawn from one deck.
#[derive(Debug, Clone, PartialEq)]
pub struct Stack {
    deck: String,
    kind: StackKind,
    slots: Vec<Option<Slot>>,
    /// For each semi-stable id ever observed in this stack, the most recent
    /// committed version at which it was seen.
    ids_last_seen: FxHashMap<String, u64>,
    /// Present only on sanitized views: ids to report instead of computing
    /// them from slots (generic substitutes have no ids of their own).
    sanitized_ids: Option<Vec<Option<String>>>,
}

impl Default for Stack {
    fn default() -> Self {
        Stack::uninflated()
    }
}

impl Stack {
    /// An uninflated stack; the inflater replaces these from `stack:` tags.
    pub fn uninflated() -> Self {
        Stack {
            deck: String::new(),
            kind: StackKind::Growable { max: 0 },
            slots: Vec::new(),
            ids_last_seen: FxHashMap::default(),
            sanitized_ids: None,
        }
    }

    /// A growable stack over `deck`; `max` of 0 means unbounded.
    pub fn growable(deck: &str, max: usize) -> Self {
        Stack {
            deck: deck.to_string(),
            kind: StackKind::Growable { max },
            slots: Vec::new(),
            ids_last_seen: FxHashMap::default(),
            sanitized_ids: None,
        }
    }

    /// A sized stack of exactly `size` slots, all initially empty.
    pub fn sized(deck: &str, size: usize) -> Self {
        Stack {
            deck: deck.to_string(),
            kind: StackKind::Sized { size },
            slots: vec![None; size],
            ids_last_seen: FxHashMap::default(),
            sanitized_ids: None,
        }
    }

    pub fn is_inflated(&self) -> bool {
        !self.deck.is_empty()
    }

    pub fn deck(&self) -> &str {
        &self.deck
    }

    pub fn kind(&self) -> StackKind {
        self.kind
    }

    pub fn is_sized(&self) -> bool {
        matches!(self.kind, StackKind::Sized { .. })
    }

    /// Slot count: occupied slots for growable stacks, the fixed size for
    /// sized ones.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.num_components() == 0
    }

    /// Count of occupied slots.
    pub fn num_components(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// The component at slot `i`, or None if the slot is empty or out of
    /// range.
    pub fn component_at(&self, i: usize) -> Option<&Slot> {
        self.slots.get(i).and_then(|s| s.as_ref())
    }

    pub fn first_component(&self) -> Option<&Slot> {
        self.slots.iter().find_map(|s| s.as_ref())
    }

    pub fn last_component(&self) -> Option<&Slot> {
        self.slots.iter().rev().find_map(|s| s.as_ref())
    }

    /// Index of the first free slot, or None if the stack is full.
    pub fn first_free_slot(&self) -> Option<usize> {
        match self.kind {
            StackKind::Growable { max } => {
                if max == 0 || self.slots.len() < max {
                    Some(self.slots.len())
                } else {
                    None
                }
            }
            StackKind::Sized { .. } => self.slots.iter().position(|s| s.is_none()),
        }
    }

    /// Index of the first occupied slot.
    pub fn first_occupied_slot(&self) -> Option<usize> {
        self.slots.iter().position(|s| s.is_some())
    }

    pub fn contains(&self, deck_index: usize) -> bool {
        self.slots
            .iter()
            .any(|s| s.map(|s| s.deck_index) == Some(deck_index))
    }

    /// Iterate over all slots in order, including empty ones.
    pub fn slots(&self) -> impl Iterator<Item = Option<&Slot>> {
        self.slots.iter().map(|s| s.as_ref())
    }

    /// Iterate over occupied slots in order.
    pub fn components(&self) -> impl Iterator<Item = &Slot> {
        self.slots.iter().filter_map(|s| s.as_ref())
    }

    pub fn ids_last_seen(&self) -> &FxHashMap<String, u64> {
        &self.ids_last_seen
    }

    fn resolve_insert(&self, at: InsertSlot) -> Result<usize> {
        let idx = match at {
            InsertSlot::Front => match self.kind {
                StackKind::Growable { .. } => 0,
                StackKind::Sized { .. } => self
                    .slots
                    .iter()
                    .position(|s| s.is_none())
                    .ok_or_else(|| self.full_err())?,
            },
            InsertSlot::Back => match self.kind {
                StackKind::Growable { .. } => self.slots.len(),
                StackKind::Sized { .. } => self
                    .slots
                    .iter()
                    .rposition(|s| s.is_none())
                    .ok_or_else(|| self.full_err())?,
            },
            InsertSlot::At(i) => i,
            InsertSlot::NextFree => self.first_free_slot().ok_or_else(|| self.full_err())?,
        };
        Ok(idx)
    }

    fn full_err(&self) -> EngineError {
        EngineError::ProposalRejected(format!("stack over deck {} has no free slot", self.deck))
    }

    /// Insert a slot. Growable: splices at `i`, subject to max. Sized: the
    /// slot at `i` must be empty.
    pub(crate) fn insert_component(&mut self, at: InsertSlot, slot: Slot) -> Result<()> {
        let i = self.resolve_insert(at)?;
        match self.kind {
            StackKind::Growable { max } => {
                if max != 0 && self.slots.len() >= max {
                    return Err(self.full_err());
                }
                if i > self.slots.len() {
                    return Err(EngineError::ProposalRejected(format!(
                        "insert index {i} out of range for stack of length {}",
                        self.slots.len()
                    )));
                }
                self.slots.insert(i, Some(slot));
            }
            StackKind::Sized { size } => {
                if i >= size {
                    return Err(EngineError::ProposalRejected(format!(
                        "slot index {i} out of range for sized stack of {size}"
                    )));
                }
                if self.slots[i].is_some() {
                    return Err(EngineError::ProposalRejected(format!(
                        "slot {i} is already occupied"
                    )));
                }
                self.slots[i] = Some(slot);
            }
        }
        Ok(())
    }

    /// Remove the slot at `i`. Growable: compacts. Sized: leaves an empty
    /// slot behind.
    pub(crate) fn remove_component(&mut self, i: usize) -> Result<Slot> {
        if i >= self.slots.len() {
            return Err(EngineError::ProposalRejected(format!(
                "remove index {i} out of range for stack of length {}",
                self.slots.len()
            )));
        }
        match self.kind {
            StackKind::Growable { .. } => self
                .slots
                .remove(i)
                .ok_or_else(|| EngineError::InvariantViolation("growable stack held an empty slot".into())),
            StackKind::Sized { .. } => self.slots[i]
                .take()
                .ok_or_else(|| EngineError::ProposalRejected(format!("slot {i} is empty"))),
        }
    }

    fn check_same_deck(&self, other: &Stack) -> Result<()> {
        if self.deck != other.deck {
            return Err(EngineError::ProposalRejected(format!(
                "cannot move a component between decks {} and {}",
                self.deck, other.deck
            )));
        }
        Ok(())
    }

    /// Atomically move the component at slot `i` into `other` at `to`.
    /// The removal and insertion happen as one operation, so conservation
    /// cannot be violated partway.
    pub fn move_component(&mut self, i: usize, other: &mut Stack, to: InsertSlot) -> Result<()> {
        self.check_same_deck(other)?;
        // Verify the destination before disturbing the source.
        other.resolve_insert(to)?;
        if other.first_free_slot().is_none() {
            return Err(other.full_err());
        }
        let slot = self.remove_component(i)?;
        match other.insert_component(to, slot) {
            Ok(()) => Ok(()),
            Err(e) => {
                // Splice back so the component is never lost.
                match self.kind {
                    StackKind::Growable { .. } => self.slots.insert(i.min(self.slots.len()), Some(slot)),
                    StackKind::Sized { .. } => self.slots[i] = Some(slot),
                }
                Err(e)
            }
        }
    }

    /// Move a component and rotate ids: the moved component and every
    /// component already resident in the destination advance their secret
    /// move counts.
    pub fn secret_move_component(
        &mut self,
        i: usize,
        other: &mut Stack,
        to: InsertSlot,
    ) -> Result<()> {
        self.move_component(i, other, to)?;
        for slot in other.slots.iter_mut().flatten() {
            slot.secret_count += 1;
        }
        Ok(())
    }

    /// Move every component from this stack into `other`, preserving order.
    pub fn move_all_to(&mut self, other: &mut Stack) -> Result<()> {
        while let Some(i) = self.first_occupied_slot() {
            self.move_component(i, other, InsertSlot::NextFree)?;
        }
        Ok(())
    }

    /// Swap the slots at `i` and `j` in place.
    pub fn swap_components(&mut self, i: usize, j: usize) -> Result<()> {
        if i >= self.slots.len() || j >= self.slots.len() {
            return Err(EngineError::ProposalRejected(format!(
                "swap indexes {i},{j} out of range for stack of length {}",
                self.slots.len()
            )));
        }
        self.slots.swap(i, j);
        Ok(())
    }

    /// Randomize slot order and scramble ids: every component's secret move
    /// count advances, so all derived ids rotate.
    pub fn shuffle(&mut self, rng: &mut impl rand::Rng) {
        self.slots.shuffle(rng);
        for slot in self.slots.iter_mut().flatten() {
            slot.secret_count += 1;
        }
    }

    /// Randomize slot order without scrambling ids. Observers learn nothing
    /// about positions but components keep their identities.
    pub fn public_shuffle(&mut self, rng: &mut impl rand::Rng) {
        self.slots.shuffle(rng);
    }

    /// Stable sort of the occupied slots by a caller-provided comparison.
    /// Sized stacks keep their empty slots in place.
    pub fn sort_components<F>(&mut self, mut cmp: F)
    where
        F: FnMut(&Slot, &Slot) -> std::cmp::Ordering,
    {
        let mut occupied: Vec<Slot> = self.slots.iter().filter_map(|s| *s).collect();
        occupied.sort_by(|a, b| cmp(a, b));
        let mut it = occupied.into_iter();
        for s in self.slots.iter_mut() {
            if s.is_some() {
                *s = it.next();
            }
        }
    }

    /// Record that the given ids were visible in this stack at `version`.
    /// Called once per stack when a state commits.
    pub(crate) fn update_ids_last_seen(&mut self, ids: &[Option<String>], version: u64) {
        for id in ids.iter().flatten() {
            if !id.is_empty() {
                self.ids_last_seen.insert(id.clone(), version);
            }
        }
    }

    pub(crate) fn set_ids_last_seen(&mut self, ids: FxHashMap<String, u64>) {
        self.ids_last_seen = ids;
    }

    pub(crate) fn clear_ids_last_seen(&mut self) {
        self.ids_last_seen.clear();
    }

    pub(crate) fn sanitized_ids(&self) -> Option<&[Option<String>]> {
        self.sanitized_ids.as_deref()
    }

    pub(crate) fn set_sanitized_ids(&mut self, ids: Option<Vec<Option<String>>>) {
        self.sanitized_ids = ids;
    }

    /// Replace every slot's contents for sanitization, preserving kind and
    /// length. Used by the Order/Len policy transforms.
    pub(crate) fn replace_with_generics(&mut self) {
        for s in self.slots.iter_mut() {
            if s.is_some() {
                *s = Some(Slot {
                    deck_index: GENERIC_INDEX,
                    secret_count: 0,
                });
            }
        }
    }

    /// Collapse to zero or one generic component (NonEmpty policy).
    pub(crate) fn collapse_to_presence(&mut self) {
        let occupied = self.num_components() > 0;
        match self.kind {
            StackKind::Growable { .. } => {
                self.slots.clear();
                if occupied {
                    self.slots.push(Some(Slot {
                        deck_index: GENERIC_INDEX,
                        secret_count: 0,
                    }));
                }
            }
            StackKind::Sized { size } => {
                self.slots = vec![None; size];
                if occupied && size > 0 {
                    self.slots[0] = Some(Slot {
                        deck_index: GENERIC_INDEX,
                        secret_count: 0,
                    });
                }
            }
        }
    }

    /// Empty the stack entirely (Hidden policy).
    pub(crate) fn empty_out(&mut self) {
        match self.kind {
            StackKind::Growable { .. } => self.slots.clear(),
            StackKind::Sized { size } => self.slots = vec![None; size],
        }
    }

    /// Overwrite slots wholesale; used by deserialization.
    pub(crate) fn set_slots(&mut self, slots: Vec<Option<Slot>>) {
        self.slots = slots;
    }
}

/// An ordered array of board-space stacks sharing one deck and max size.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Board {
    deck: String,
    spaces: Vec<Stack>,
}

impl Board {
    pub fn uninflated() -> Self {
        Board::default()
    }

    pub fn new(deck: &str, num_spaces: usize, max_per_space: usize) -> Self {
        Board {
            deck: deck.to_string(),
            spaces: (0..num_spaces)
                .map(|_| Stack::growable(deck, max_per_space))
                .collect(),
        }
    }

    pub fn is_inflated(&self) -> bool {
        !self.deck.is_empty()
    }

    pub fn deck(&self) -> &str {
        &self.deck
    }

    pub fn len(&self) -> usize {
        self.spaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spaces.is_empty()
    }

    pub fn space(&self, i: usize) -> Option<&Stack> {
        self.spaces.get(i)
    }

    pub fn space_mut(&mut self, i: usize) -> Option<&mut Stack> {
        self.spaces.get_mut(i)
    }

    pub fn spaces(&self) -> &[Stack] {
        &self.spaces
    }

    pub fn spaces_mut(&mut self) -> &mut [Stack] {
        &mut self.spaces
    }
}

/// How a merged view combines its sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MergeMode {
    /// Sources appear one after another in declaration order.
    Concatenate,
    /// Position i resolves to the first source occupied at i.
    Overlap,
}

/// A read-only derived view over sibling stack properties. Stores only the
/// merge mode and source property names; contents are resolved against the
/// owning reader on demand, so the view owns no components and mutation has
/// no surface at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedStack {
    mode: MergeMode,
    sources: Vec<String>,
}

impl Default for MergedStack {
    fn default() -> Self {
        MergedStack::uninflated()
    }
}

impl MergedStack {
    pub fn uninflated() -> Self {
        MergedStack {
            mode: MergeMode::Concatenate,
            sources: Vec::new(),
        }
    }

    pub fn new(mode: MergeMode, sources: Vec<String>) -> Self {
        MergedStack { mode, sources }
    }

    pub fn is_inflated(&self) -> bool {
        !self.sources.is_empty()
    }

    pub fn mode(&self) -> MergeMode {
        self.mode
    }

    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    /// Resolve the view against the reader that owns the source properties.
    pub fn resolve<'a>(&self, owner: &'a dyn PropertyReader) -> Result<MergedView<'a>> {
        let mut stacks = Vec::with_capacity(self.sources.len());
        let mut deck: Option<String> = None;
        for name in &self.sources {
            let stack = owner.stack_prop(name)?;
            match &deck {
                None => deck = Some(stack.deck().to_string()),
                Some(d) if d != stack.deck() => {
                    return Err(EngineError::Configuration(format!(
                        "merged stack sources span decks {d} and {}",
                        stack.deck()
                    )))
                }
                _ => {}
            }
            stacks.push(stack);
        }
        Ok(MergedView {
            mode: self.mode,
            stacks,
        })
    }
}

/// A resolved merged view borrowing its source stacks.
#[derive(Debug)]
pub struct MergedView<'a> {
    mode: MergeMode,
    stacks: Vec<&'a Stack>,
}

impl<'a> MergedView<'a> {
    pub fn len(&self) -> usize {
        match self.mode {
            MergeMode::Concatenate => self.stacks.iter().map(|s| s.len()).sum(),
            MergeMode::Overlap => self.stacks.iter().map(|s| s.len()).max().unwrap_or(0),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.num_components() == 0
    }

    pub fn num_components(&self) -> usize {
        match self.mode {
            MergeMode::Concatenate => self.stacks.iter().map(|s| s.num_components()).sum(),
            MergeMode::Overlap => (0..self.len())
                .filter(|i| self.component_at(*i).is_some())
                .count(),
        }
    }

    pub fn component_at(&self, i: usize) -> Option<&'a Slot> {
        match self.mode {
            MergeMode::Concatenate => {
                let mut offset = 0;
                for s in &self.stacks {
                    if i < offset + s.len() {
                        return s.component_at(i - offset);
                    }
                    offset += s.len();
                }
                None
            }
            MergeMode::Overlap => self.stacks.iter().find_map(|s| s.component_at(i)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha12Rng;

    fn filled(deck: &str, n: usize) -> Stack {
        let mut s = Stack::growable(deck, 0);
        for i in 0..n {
            s.insert_component(InsertSlot::Back, Slot::new(i)).unwrap();
        }
        s
    }

    #[test]
    fn test_growable_insert_remove() {
        let mut s = filled("cards", 3);
        assert_eq!(s.len(), 3);
        assert_eq!(s.num_components(), 3);
        assert_eq!(s.component_at(1).unwrap().deck_index, 1);

        let removed = s.remove_component(0).unwrap();
        assert_eq!(removed.deck_index, 0);
        // Compacts: index 1 slides to front.
        assert_eq!(s.len(), 2);
        assert_eq!(s.component_at(0).unwrap().deck_index, 1);
    }

    #[test]
    fn test_growable_max_size() {
        let mut s = Stack::growable("cards", 2);
        s.insert_component(InsertSlot::Back, Slot::new(0)).unwrap();
        s.insert_component(InsertSlot::Back, Slot::new(1)).unwrap();
        assert!(s.insert_component(InsertSlot::Back, Slot::new(2)).is_err());
        assert_eq!(s.first_free_slot(), None);
    }

    #[test]
    fn test_sized_slots() {
        let mut s = Stack::sized("cards", 3);
        assert_eq!(s.len(), 3);
        assert_eq!(s.num_components(), 0);

        s.insert_component(InsertSlot::At(1), Slot::new(7)).unwrap();
        assert_eq!(s.len(), 3);
        assert_eq!(s.num_components(), 1);
        assert!(s.component_at(0).is_none());
        assert_eq!(s.component_at(1).unwrap().deck_index, 7);

        // Occupied slot refuses a second insert.
        assert!(s.insert_component(InsertSlot::At(1), Slot::new(8)).is_err());

        // Removal leaves the empty sentinel in place.
        s.remove_component(1).unwrap();
        assert_eq!(s.len(), 3);
        assert_eq!(s.num_components(), 0);
        assert!(s.remove_component(1).is_err());
    }

    #[test]
    fn test_move_component_across_stacks() {
        let mut a = filled("cards", 2);
        let mut b = Stack::growable("cards", 0);

        a.move_component(0, &mut b, InsertSlot::Back).unwrap();
        assert_eq!(a.num_components(), 1);
        assert_eq!(b.num_components(), 1);
        assert_eq!(b.component_at(0).unwrap().deck_index, 0);
    }

    #[test]
    fn test_move_component_deck_discipline() {
        let mut a = filled("cards", 1);
        let mut b = Stack::growable("tokens", 0);
        assert!(a.move_component(0, &mut b, InsertSlot::Back).is_err());
        // Source untouched after the rejected move.
        assert_eq!(a.num_components(), 1);
    }

    #[test]
    fn test_move_component_full_destination() {
        let mut a = filled("cards", 1);
        let mut b = Stack::growable("cards", 1);
        b.insert_component(InsertSlot::Back, Slot::new(5)).unwrap();
        assert!(a.move_component(0, &mut b, InsertSlot::Back).is_err());
        assert_eq!(a.num_components(), 1);
        assert_eq!(b.num_components(), 1);
    }

    #[test]
    fn test_shuffle_scrambles_counts() {
        let mut s = filled("cards", 4);
        let mut rng = ChaCha12Rng::seed_from_u64(7);
        s.shuffle(&mut rng);
        assert_eq!(s.num_components(), 4);
        assert!(s.components().all(|c| c.secret_count == 1));
    }

    #[test]
    fn test_public_shuffle_keeps_counts() {
        let mut s = filled("cards", 4);
        let mut rng = ChaCha12Rng::seed_from_u64(7);
        s.public_shuffle(&mut rng);
        assert!(s.components().all(|c| c.secret_count == 0));
    }

    #[test]
    fn test_secret_move_rotates_destination() {
        let mut a = filled("cards", 1);
        let mut b = filled("cards", 2);
        // Use distinct indexes in b.
        let mut b2 = Stack::growable("cards", 0);
        b.move_component(0, &mut b2, InsertSlot::Back).unwrap();
        b.move_component(0, &mut b2, InsertSlot::Back).unwrap();

        a.secret_move_component(0, &mut b2, InsertSlot::Back).unwrap();
        // Arrival and both residents rotated.
        assert!(b2.components().all(|c| c.secret_count == 1));
        assert_eq!(b2.num_components(), 3);
    }

    #[test]
    fn test_sort_components_stable() {
        let mut s = Stack::growable("cards", 0);
        for i in [3usize, 1, 2, 0] {
            s.insert_component(InsertSlot::Back, Slot::new(i)).unwrap();
        }
        s.sort_components(|a, b| a.deck_index.cmp(&b.deck_index));
        let order: Vec<usize> = s.components().map(|c| c.deck_index).collect();
        assert_eq!(order, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_board_spaces() {
        let mut b = Board::new("cards", 3, 2);
        assert_eq!(b.len(), 3);
        b.space_mut(0)
            .unwrap()
            .insert_component(InsertSlot::Back, Slot::new(0))
            .unwrap();
        assert_eq!(b.space(0).unwrap().num_components(), 1);
        assert!(b.space(3).is_none());
    }

    #[test]
    fn test_move_all_to() {
        let mut a = filled("cards", 3);
        let mut b = Stack::growable("cards", 0);
        a.move_all_to(&mut b).unwrap();
        assert_eq!(a.num_components(), 0);
        assert_eq!(b.num_components(), 3);
        let order: Vec<usize> = b.components().map(|c| c.deck_index).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }
}
