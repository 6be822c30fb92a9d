//! The reader hierarchy: typed, reflection-free accessors over user structs
//!
//! Every user-defined sub-state, component-value, and move struct exposes up
//! to three accessor surfaces: a `PropertyReader` (read), a
//! `PropertyReadSetter` (read + write of scalars and slices), and a
//! `PropertyReadSetConfigurer` (read + write + wholesale replacement of
//! interface-typed containers). Implementations are typically written by
//! hand in the style a generator would emit; `PropBag` is the map-backed
//! default for dynamic property sets. Downstream engine code consumes only
//! the traits.

use crate::enums::EnumValue;
use crate::error::{EngineError, Result};
use crate::stack::{Board, MergedStack, Stack};
use crate::timer::Timer;
use crate::prop::value::{PlayerIndex, PropKind, PropValue, PropertySchema};

fn not_found(name: &str) -> EngineError {
    EngineError::PropertyNotFound(name.to_string())
}

/// Read-only property access, enumerable by name over the closed kind set.
pub trait PropertyReader {
    /// The property table: names, kinds, mutability, and tags.
    fn props(&self) -> Vec<PropertySchema>;

    fn schema_for(&self, name: &str) -> Option<PropertySchema> {
        self.props().into_iter().find(|s| s.name == name)
    }

    /// Whether the underlying slot for an interface-typed property is the
    /// mutable variant.
    fn prop_mutable(&self, name: &str) -> Result<bool> {
        self.schema_for(name)
            .map(|s| s.mutable)
            .ok_or_else(|| not_found(name))
    }

    fn int_prop(&self, name: &str) -> Result<i64> {
        Err(not_found(name))
    }

    fn bool_prop(&self, name: &str) -> Result<bool> {
        Err(not_found(name))
    }

    fn string_prop(&self, name: &str) -> Result<String> {
        Err(not_found(name))
    }

    fn player_index_prop(&self, name: &str) -> Result<PlayerIndex> {
        Err(not_found(name))
    }

    fn int_slice_prop(&self, name: &str) -> Result<Vec<i64>> {
        Err(not_found(name))
    }

    fn bool_slice_prop(&self, name: &str) -> Result<Vec<bool>> {
        Err(not_found(name))
    }

    fn string_slice_prop(&self, name: &str) -> Result<Vec<String>> {
        Err(not_found(name))
    }

    fn player_index_slice_prop(&self, name: &str) -> Result<Vec<PlayerIndex>> {
        Err(not_found(name))
    }

    fn enum_prop(&self, name: &str) -> Result<&EnumValue> {
        Err(not_found(name))
    }

    /// Read view of a stack property. Always legal regardless of the
    /// field's mutability.
    fn stack_prop(&self, name: &str) -> Result<&Stack> {
        Err(not_found(name))
    }

    /// Read view of a merged (concatenate/overlap) stack property.
    fn merged_stack_prop(&self, name: &str) -> Result<&MergedStack> {
        Err(not_found(name))
    }

    fn board_prop(&self, name: &str) -> Result<&Board> {
        Err(not_found(name))
    }

    fn timer_prop(&self, name: &str) -> Result<&Timer> {
        Err(not_found(name))
    }

    /// Fetch any property as a dynamic value. Merged stack properties come
    /// back as `PropValue::MergedStack`.
    fn prop(&self, name: &str) -> Result<PropValue> {
        let schema = self.schema_for(name).ok_or_else(|| not_found(name))?;
        Ok(match schema.kind {
            PropKind::Int => PropValue::Int(self.int_prop(name)?),
            PropKind::Bool => PropValue::Bool(self.bool_prop(name)?),
            PropKind::String => PropValue::String(self.string_prop(name)?),
            PropKind::PlayerIndex => PropValue::PlayerIndex(self.player_index_prop(name)?),
            PropKind::IntSlice => PropValue::IntSlice(self.int_slice_prop(name)?),
            PropKind::BoolSlice => PropValue::BoolSlice(self.bool_slice_prop(name)?),
            PropKind::StringSlice => PropValue::StringSlice(self.string_slice_prop(name)?),
            PropKind::PlayerIndexSlice => {
                PropValue::PlayerIndexSlice(self.player_index_slice_prop(name)?)
            }
            PropKind::Enum => PropValue::Enum(self.enum_prop(name)?.clone()),
            PropKind::Stack => {
                if is_merged_tag(schema.tag.as_deref()) {
                    PropValue::MergedStack(self.merged_stack_prop(name)?.clone())
                } else {
                    PropValue::Stack(self.stack_prop(name)?.clone())
                }
            }
            PropKind::Board => PropValue::Board(self.board_prop(name)?.clone()),
            PropKind::Timer => PropValue::Timer(self.timer_prop(name)?.clone()),
        })
    }
}

/// Whether an inflation tag declares a merged (derived, read-only) view.
pub fn is_merged_tag(tag: Option<&str>) -> bool {
    matches!(tag, Some(t) if t.starts_with("concatenate:") || t.starts_with("overlap:"))
}

fn set_err<R: PropertyReader + ?Sized>(reader: &R, name: &str) -> EngineError {
    match reader.schema_for(name) {
        // Replacements of interface-typed properties must go through the
        // configure_* surface.
        Some(s) if s.kind.is_interface() => EngineError::WrongPropertyType(name.to_string()),
        Some(_) => EngineError::WrongPropertyType(name.to_string()),
        None => not_found(name),
    }
}

/// Read plus mutation of scalars/slices, and in-place mutable access to
/// interface-typed containers on fields declared mutable.
pub trait PropertyReadSetter: PropertyReader {
    fn set_int_prop(&mut self, name: &str, _v: i64) -> Result<()> {
        Err(set_err(self, name))
    }

    fn set_bool_prop(&mut self, name: &str, _v: bool) -> Result<()> {
        Err(set_err(self, name))
    }

    fn set_string_prop(&mut self, name: &str, _v: String) -> Result<()> {
        Err(set_err(self, name))
    }

    fn set_player_index_prop(&mut self, name: &str, _v: PlayerIndex) -> Result<()> {
        Err(set_err(self, name))
    }

    fn set_int_slice_prop(&mut self, name: &str, _v: Vec<i64>) -> Result<()> {
        Err(set_err(self, name))
    }

    fn set_bool_slice_prop(&mut self, name: &str, _v: Vec<bool>) -> Result<()> {
        Err(set_err(self, name))
    }

    fn set_string_slice_prop(&mut self, name: &str, _v: Vec<String>) -> Result<()> {
        Err(set_err(self, name))
    }

    fn set_player_index_slice_prop(&mut self, name: &str, _v: Vec<PlayerIndex>) -> Result<()> {
        Err(set_err(self, name))
    }

    /// Mutable access to a stack property. Implementations must return
    /// `EngineError::ImmutableProperty` for fields declared immutable.
    fn stack_prop_mut(&mut self, name: &str) -> Result<&mut Stack> {
        Err(not_found(name))
    }

    fn board_prop_mut(&mut self, name: &str) -> Result<&mut Board> {
        Err(not_found(name))
    }

    fn timer_prop_mut(&mut self, name: &str) -> Result<&mut Timer> {
        Err(not_found(name))
    }

    fn enum_prop_mut(&mut self, name: &str) -> Result<&mut EnumValue> {
        Err(not_found(name))
    }
}

/// Full access: additionally supports replacing interface-typed containers
/// wholesale. This is the surface the inflater and the deserializer use, and
/// it is legal on both mutable and immutable fields.
pub trait PropertyReadSetConfigurer: PropertyReadSetter {
    fn configure_stack_prop(&mut self, name: &str, _v: Stack) -> Result<()> {
        Err(not_found(name))
    }

    fn configure_merged_stack_prop(&mut self, name: &str, _v: MergedStack) -> Result<()> {
        Err(not_found(name))
    }

    fn configure_board_prop(&mut self, name: &str, _v: Board) -> Result<()> {
        Err(not_found(name))
    }

    fn configure_timer_prop(&mut self, name: &str, _v: Timer) -> Result<()> {
        Err(not_found(name))
    }

    fn configure_enum_prop(&mut self, name: &str, _v: EnumValue) -> Result<()> {
        Err(not_found(name))
    }
}

/// A dynamically keyed property bag implementing the full reader hierarchy.
/// Used for computed properties and anywhere a fixed struct is overkill.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropBag {
    entries: Vec<BagEntry>,
}

#[derive(Debug, Clone, PartialEq)]
struct BagEntry {
    name: String,
    value: PropValue,
    mutable: bool,
    tag: Option<String>,
    sanitize: Option<String>,
}

impl PropBag {
    pub fn new() -> Self {
        PropBag::default()
    }

    pub fn insert(&mut self, name: &str, value: PropValue) -> &mut Self {
        self.insert_full(name, value, true, None, None)
    }

    pub fn insert_full(
        &mut self,
        name: &str,
        value: PropValue,
        mutable: bool,
        tag: Option<String>,
        sanitize: Option<String>,
    ) -> &mut Self {
        if let Some(e) = self.entries.iter_mut().find(|e| e.name == name) {
            e.value = value;
        } else {
            self.entries.push(BagEntry {
                name: name.to_string(),
                value,
                mutable,
                tag,
                sanitize,
            });
        }
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry(&self, name: &str) -> Result<&BagEntry> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| not_found(name))
    }

    fn entry_mut(&mut self, name: &str) -> Result<&mut BagEntry> {
        self.entries
            .iter_mut()
            .find(|e| e.name == name)
            .ok_or_else(|| not_found(name))
    }

    fn set_scalar(&mut self, name: &str, value: PropValue) -> Result<()> {
        let e = self.entry_mut(name)?;
        if e.value.kind() != value.kind() || e.value.kind().is_interface() {
            return Err(EngineError::WrongPropertyType(name.to_string()));
        }
        e.value = value;
        Ok(())
    }
}

impl PropertyReader for PropBag {
    fn props(&self) -> Vec<PropertySchema> {
        self.entries
            .iter()
            .map(|e| {
                let mut s = if e.mutable {
                    PropertySchema::new(e.name.clone(), e.value.kind())
                } else {
                    PropertySchema::immutable(e.name.clone(), e.value.kind())
                };
                if let Some(t) = &e.tag {
                    s = s.with_tag(t.clone());
                }
                if let Some(t) = &e.sanitize {
                    s = s.with_sanitize(t.clone());
                }
                s
            })
            .collect()
    }

    fn int_prop(&self, name: &str) -> Result<i64> {
        match &self.entry(name)?.value {
            PropValue::Int(v) => Ok(*v),
            _ => Err(EngineError::WrongPropertyType(name.to_string())),
        }
    }

    fn bool_prop(&self, name: &str) -> Result<bool> {
        match &self.entry(name)?.value {
            PropValue::Bool(v) => Ok(*v),
            _ => Err(EngineError::WrongPropertyType(name.to_string())),
        }
    }

    fn string_prop(&self, name: &str) -> Result<String> {
        match &self.entry(name)?.value {
            PropValue::String(v) => Ok(v.clone()),
            _ => Err(EngineError::WrongPropertyType(name.to_string())),
        }
    }

    fn player_index_prop(&self, name: &str) -> Result<PlayerIndex> {
        match &self.entry(name)?.value {
            PropValue::PlayerIndex(v) => Ok(*v),
            _ => Err(EngineError::WrongPropertyType(name.to_string())),
        }
    }

    fn int_slice_prop(&self, name: &str) -> Result<Vec<i64>> {
        match &self.entry(name)?.value {
            PropValue::IntSlice(v) => Ok(v.clone()),
            _ => Err(EngineError::WrongPropertyType(name.to_string())),
        }
    }

    fn bool_slice_prop(&self, name: &str) -> Result<Vec<bool>> {
        match &self.entry(name)?.value {
            PropValue::BoolSlice(v) => Ok(v.clone()),
            _ => Err(EngineError::WrongPropertyType(name.to_string())),
        }
    }

    fn string_slice_prop(&self, name: &str) -> Result<Vec<String>> {
        match &self.entry(name)?.value {
            PropValue::StringSlice(v) => Ok(v.clone()),
            _ => Err(EngineError::WrongPropertyType(name.to_string())),
        }
    }

    fn player_index_slice_prop(&self, name: &str) -> Result<Vec<PlayerIndex>> {
        match &self.entry(name)?.value {
            PropValue::PlayerIndexSlice(v) => Ok(v.clone()),
            _ => Err(EngineError::WrongPropertyType(name.to_string())),
        }
    }

    fn enum_prop(&self, name: &str) -> Result<&EnumValue> {
        match &self.entry(name)?.value {
            PropValue::Enum(v) => Ok(v),
            _ => Err(EngineError::WrongPropertyType(name.to_string())),
        }
    }

    fn stack_prop(&self, name: &str) -> Result<&Stack> {
        match &self.entry(name)?.value {
            PropValue::Stack(v) => Ok(v),
            _ => Err(EngineError::WrongPropertyType(name.to_string())),
        }
    }

    fn merged_stack_prop(&self, name: &str) -> Result<&MergedStack> {
        match &self.entry(name)?.value {
            PropValue::MergedStack(v) => Ok(v),
            _ => Err(EngineError::WrongPropertyType(name.to_string())),
        }
    }

    fn board_prop(&self, name: &str) -> Result<&Board> {
        match &self.entry(name)?.value {
            PropValue::Board(v) => Ok(v),
            _ => Err(EngineError::WrongPropertyType(name.to_string())),
        }
    }

    fn timer_prop(&self, name: &str) -> Result<&Timer> {
        match &self.entry(name)?.value {
            PropValue::Timer(v) => Ok(v),
            _ => Err(EngineError::WrongPropertyType(name.to_string())),
        }
    }
}

impl PropertyReadSetter for PropBag {
    fn set_int_prop(&mut self, name: &str, v: i64) -> Result<()> {
        self.set_scalar(name, PropValue::Int(v))
    }

    fn set_bool_prop(&mut self, name: &str, v: bool) -> Result<()> {
        self.set_scalar(name, PropValue::Bool(v))
    }

    fn set_string_prop(&mut self, name: &str, v: String) -> Result<()> {
        self.set_scalar(name, PropValue::String(v))
    }

    fn set_player_index_prop(&mut self, name: &str, v: PlayerIndex) -> Result<()> {
        self.set_scalar(name, PropValue::PlayerIndex(v))
    }

    fn set_int_slice_prop(&mut self, name: &str, v: Vec<i64>) -> Result<()> {
        self.set_scalar(name, PropValue::IntSlice(v))
    }

    fn set_bool_slice_prop(&mut self, name: &str, v: Vec<bool>) -> Result<()> {
        self.set_scalar(name, PropValue::BoolSlice(v))
    }

    fn set_string_slice_prop(&mut self, name: &str, v: Vec<String>) -> Result<()> {
        self.set_scalar(name, PropValue::StringSlice(v))
    }

    fn set_player_index_slice_prop(&mut self, name: &str, v: Vec<PlayerIndex>) -> Result<()> {
        self.set_scalar(name, PropValue::PlayerIndexSlice(v))
    }

    fn stack_prop_mut(&mut self, name: &str) -> Result<&mut Stack> {
        let e = self.entry_mut(name)?;
        if !e.mutable {
            return Err(EngineError::ImmutableProperty(name.to_string()));
        }
        match &mut e.value {
            PropValue::Stack(v) => Ok(v),
            _ => Err(EngineError::WrongPropertyType(name.to_string())),
        }
    }

    fn board_prop_mut(&mut self, name: &str) -> Result<&mut Board> {
        let e = self.entry_mut(name)?;
        if !e.mutable {
            return Err(EngineError::ImmutableProperty(name.to_string()));
        }
        match &mut e.value {
            PropValue::Board(v) => Ok(v),
            _ => Err(EngineError::WrongPropertyType(name.to_string())),
        }
    }

    fn timer_prop_mut(&mut self, name: &str) -> Result<&mut Timer> {
        let e = self.entry_mut(name)?;
        if !e.mutable {
            return Err(EngineError::ImmutableProperty(name.to_string()));
        }
        match &mut e.value {
            PropValue::Timer(v) => Ok(v),
            _ => Err(EngineError::WrongPropertyType(name.to_string())),
        }
    }

    fn enum_prop_mut(&mut self, name: &str) -> Result<&mut EnumValue> {
        let e = self.entry_mut(name)?;
        if !e.mutable {
            return Err(EngineError::ImmutableProperty(name.to_string()));
        }
        match &mut e.value {
            PropValue::Enum(v) => Ok(v),
            _ => Err(EngineError::WrongPropertyType(name.to_string())),
        }
    }
}

impl PropertyReadSetConfigurer for PropBag {
    fn configure_stack_prop(&mut self, name: &str, v: Stack) -> Result<()> {
        let e = self.entry_mut(name)?;
        match &e.value {
            PropValue::Stack(_) => {
                e.value = PropValue::Stack(v);
                Ok(())
            }
            _ => Err(EngineError::WrongPropertyType(name.to_string())),
        }
    }

    fn configure_merged_stack_prop(&mut self, name: &str, v: MergedStack) -> Result<()> {
        let e = self.entry_mut(name)?;
        match &e.value {
            PropValue::MergedStack(_) => {
                e.value = PropValue::MergedStack(v);
                Ok(())
            }
            _ => Err(EngineError::WrongPropertyType(name.to_string())),
        }
    }

    fn configure_board_prop(&mut self, name: &str, v: Board) -> Result<()> {
        let e = self.entry_mut(name)?;
        match &e.value {
            PropValue::Board(_) => {
                e.value = PropValue::Board(v);
                Ok(())
            }
            _ => Err(EngineError::WrongPropertyType(name.to_string())),
        }
    }

    fn configure_timer_prop(&mut self, name: &str, v: Timer) -> Result<()> {
        let e = self.entry_mut(name)?;
        match &e.value {
            PropValue::Timer(_) => {
                e.value = PropValue::Timer(v);
                Ok(())
            }
            _ => Err(EngineError::WrongPropertyType(name.to_string())),
        }
    }

    fn configure_enum_prop(&mut self, name: &str, v: EnumValue) -> Result<()> {
        let e = self.entry_mut(name)?;
        match &e.value {
            PropValue::Enum(_) => {
                e.value = PropValue::Enum(v);
                Ok(())
            }
            _ => Err(EngineError::WrongPropertyType(name.to_string())),
        }
    }
}

/// Serialize a reader's scalar and slice properties to a JSON object. Used
/// for move payloads, which carry no interface-typed properties.
pub fn scalar_props_to_json(r: &dyn PropertyReader) -> Result<serde_json::Map<String, serde_json::Value>> {
    let mut out = serde_json::Map::new();
    for schema in r.props() {
        if schema.kind.is_interface() {
            continue;
        }
        let v = match schema.kind {
            PropKind::Int => serde_json::json!(r.int_prop(&schema.name)?),
            PropKind::Bool => serde_json::json!(r.bool_prop(&schema.name)?),
            PropKind::String => serde_json::json!(r.string_prop(&schema.name)?),
            PropKind::PlayerIndex => serde_json::json!(r.player_index_prop(&schema.name)?.0),
            PropKind::IntSlice => serde_json::json!(r.int_slice_prop(&schema.name)?),
            PropKind::BoolSlice => serde_json::json!(r.bool_slice_prop(&schema.name)?),
            PropKind::StringSlice => serde_json::json!(r.string_slice_prop(&schema.name)?),
            PropKind::PlayerIndexSlice => serde_json::json!(r
                .player_index_slice_prop(&schema.name)?
                .iter()
                .map(|p| p.0)
                .collect::<Vec<i32>>()),
            _ => unreachable!("interface kinds filtered above"),
        };
        out.insert(schema.name.to_string(), v);
    }
    Ok(out)
}

fn json_err(name: &str) -> EngineError {
    EngineError::Serialization(format!("property {name} has malformed JSON payload"))
}

/// Fill a setter's scalar and slice properties from a JSON object produced
/// by `scalar_props_to_json`. Unknown keys are rejected.
pub fn fill_scalar_props_from_json(
    s: &mut dyn PropertyReadSetter,
    payload: &serde_json::Map<String, serde_json::Value>,
) -> Result<()> {
    for (name, value) in payload {
        let schema = s
            .schema_for(name)
            .ok_or_else(|| EngineError::PropertyNotFound(name.clone()))?;
        match schema.kind {
            PropKind::Int => {
                s.set_int_prop(name, value.as_i64().ok_or_else(|| json_err(name))?)?
            }
            PropKind::Bool => {
                s.set_bool_prop(name, value.as_bool().ok_or_else(|| json_err(name))?)?
            }
            PropKind::String => s.set_string_prop(
                name,
                value.as_str().ok_or_else(|| json_err(name))?.to_string(),
            )?,
            PropKind::PlayerIndex => s.set_player_index_prop(
                name,
                PlayerIndex(value.as_i64().ok_or_else(|| json_err(name))? as i32),
            )?,
            PropKind::IntSlice => {
                let v: Vec<i64> = serde_json::from_value(value.clone())?;
                s.set_int_slice_prop(name, v)?
            }
            PropKind::BoolSlice => {
                let v: Vec<bool> = serde_json::from_value(value.clone())?;
                s.set_bool_slice_prop(name, v)?
            }
            PropKind::StringSlice => {
                let v: Vec<String> = serde_json::from_value(value.clone())?;
                s.set_string_slice_prop(name, v)?
            }
            PropKind::PlayerIndexSlice => {
                let v: Vec<i32> = serde_json::from_value(value.clone())?;
                s.set_player_index_slice_prop(name, v.into_iter().map(PlayerIndex).collect())?
            }
            _ => {
                return Err(EngineError::WrongPropertyType(format!(
                    "{name}: interface-typed properties cannot be set from a scalar payload"
                )))
            }
        }
    }
    Ok(())
}
