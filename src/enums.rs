//! Named enum definitions and enum-valued state properties
//!
//! An `Enum` is a closed set of named integer values registered on the
//! component chest. States hold `EnumValue`s that reference a definition by
//! name; tree enums additionally constrain committed phase values to leaves.

use crate::error::{EngineError, Result};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Structural variant of an enum definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnumKind {
    Plain,
    /// Contiguous integer range, inclusive on both ends.
    Range { min: i64, max: i64 },
    /// Hierarchy: each value except the root has a parent value. Only
    /// leaves are legal as a committed phase.
    Tree { parents: FxHashMap<i64, i64> },
}

/// A named, closed set of integer values.
#[derive(Debug, Clone)]
pub struct Enum {
    name: String,
    values: BTreeMap<i64, String>,
    default: i64,
    kind: EnumKind,
}

impl Enum {
    pub(crate) fn new_plain(name: &str, values: &[(i64, &str)]) -> Result<Self> {
        if values.is_empty() {
            return Err(EngineError::Configuration(format!(
                "enum {name} has no values"
            )));
        }
        let mut map = BTreeMap::new();
        for (v, display) in values {
            if map.insert(*v, display.to_string()).is_some() {
                return Err(EngineError::Configuration(format!(
                    "enum {name} declares value {v} twice"
                )));
            }
        }
        let default = *map.keys().next().expect("non-empty");
        Ok(Enum {
            name: name.to_string(),
            values: map,
            default,
            kind: EnumKind::Plain,
        })
    }

    pub(crate) fn new_range(name: &str, min: i64, max: i64) -> Result<Self> {
        if min > max {
            return Err(EngineError::Configuration(format!(
                "range enum {name} has min {min} > max {max}"
            )));
        }
        let values = (min..=max).map(|v| (v, v.to_string())).collect();
        Ok(Enum {
            name: name.to_string(),
            values,
            default: min,
            kind: EnumKind::Range { min, max },
        })
    }

    /// A tree enum: `parents` maps each non-root value to its parent, which
    /// must itself be declared.
    pub(crate) fn new_tree(
        name: &str,
        values: &[(i64, &str)],
        parents: &[(i64, i64)],
    ) -> Result<Self> {
        let mut e = Enum::new_plain(name, values)?;
        let mut parent_map = FxHashMap::default();
        for (child, parent) in parents {
            if !e.values.contains_key(child) || !e.values.contains_key(parent) {
                return Err(EngineError::Configuration(format!(
                    "tree enum {name}: parent link {child}->{parent} references undeclared value"
                )));
            }
            parent_map.insert(*child, *parent);
        }
        e.kind = EnumKind::Tree {
            parents: parent_map,
        };
        Ok(e)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &EnumKind {
        &self.kind
    }

    pub fn default_value(&self) -> i64 {
        self.default
    }

    pub fn contains(&self, value: i64) -> bool {
        self.values.contains_key(&value)
    }

    pub fn display_name(&self, value: i64) -> Option<&str> {
        self.values.get(&value).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// For tree enums, whether `value` has no children. Plain and range
    /// enums have only leaves.
    pub fn is_leaf(&self, value: i64) -> bool {
        match &self.kind {
            EnumKind::Tree { parents } => {
                self.contains(value) && !parents.values().any(|p| *p == value)
            }
            _ => self.contains(value),
        }
    }

    /// Instantiate a value of this enum at its default.
    pub fn new_value(&self) -> EnumValue {
        EnumValue {
            enum_name: self.name.clone(),
            value: self.default,
        }
    }
}

/// The chest's collection of enum definitions.
#[derive(Debug, Clone, Default)]
pub struct EnumSet {
    enums: FxHashMap<String, Enum>,
}

impl EnumSet {
    pub(crate) fn add(&mut self, e: Enum) -> Result<()> {
        if self.enums.contains_key(e.name()) {
            return Err(EngineError::Configuration(format!(
                "enum {} registered twice",
                e.name()
            )));
        }
        self.enums.insert(e.name().to_string(), e);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Enum> {
        self.enums.get(name)
    }

    pub fn len(&self) -> usize {
        self.enums.len()
    }

    pub fn is_empty(&self) -> bool {
        self.enums.is_empty()
    }
}

/// A reference to an enum definition plus a current value.
///
/// Serializes as the bare integer; the enum name is recovered from the
/// property schema on deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumValue {
    #[serde(skip)]
    enum_name: String,
    value: i64,
}

impl Default for EnumValue {
    fn default() -> Self {
        EnumValue::uninflated()
    }
}

impl EnumValue {
    /// An uninflated value; the inflater replaces these from `enum:` tags.
    pub fn uninflated() -> Self {
        EnumValue {
            enum_name: String::new(),
            value: 0,
        }
    }

    pub fn new(enum_name: &str, value: i64) -> Self {
        EnumValue {
            enum_name: enum_name.to_string(),
            value,
        }
    }

    pub fn is_inflated(&self) -> bool {
        !self.enum_name.is_empty()
    }

    pub fn enum_name(&self) -> &str {
        &self.enum_name
    }

    pub fn value(&self) -> i64 {
        self.value
    }

    /// Set the current value, validated against the definition.
    pub fn set_value(&mut self, def: &Enum, value: i64) -> Result<()> {
        if def.name() != self.enum_name {
            return Err(EngineError::WrongPropertyType(format!(
                "enum value belongs to {} not {}",
                self.enum_name,
                def.name()
            )));
        }
        if !def.contains(value) {
            return Err(EngineError::InvariantViolation(format!(
                "{value} is not a member of enum {}",
                self.enum_name
            )));
        }
        self.value = value;
        Ok(())
    }

    /// Reset to the definition's default, used by sanitization.
    pub(crate) fn zero(&mut self, def: Option<&Enum>) {
        self.value = def.map(Enum::default_value).unwrap_or(0);
    }
}
