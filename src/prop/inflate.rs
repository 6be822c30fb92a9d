//! The inflater: default instantiation of interface-typed properties
//!
//! At manager build the engine inspects one exemplar of every registered
//! struct, parses each interface-typed property's tag, validates it against
//! the chest, and records how to instantiate a default value when a field is
//! found uninflated. Tags:
//!
//! | Tag                    | Semantics                                        |
//! |------------------------|--------------------------------------------------|
//! | `stack:DECK[,SIZE]`    | growable stack over DECK, optional max size      |
//! | `sizedstack:DECK,N`    | sized stack of length N                          |
//! | `board:DECK,N[,MAX]`   | N board spaces over DECK, optional per-space max |
//! | `concatenate:A,B,…`    | immutable view concatenating sibling stacks      |
//! | `overlap:A,B,…`        | immutable view overlapping sibling stacks        |
//! | `enum:NAME`            | enum value drawn from the named enum             |
//!
//! Integer fields may be constant names resolved against the chest's
//! constants table. The inflater also parses each property's `sanitize` tag
//! into a group→policy map for fast lookup.

use crate::component::ComponentChest;
use crate::error::{EngineError, Result};
use crate::prop::reader::{PropertyReadSetConfigurer, PropertyReader};
use crate::prop::value::{PropKind, PropertySchema};
use crate::sanitize::{parse_sanitize_tag, GroupPolicyMap};
use crate::stack::{Board, MergeMode, MergedStack, Stack};

/// How to instantiate a default value for one interface-typed property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InflateSpec {
    Growable { deck: String, max: usize },
    Sized { deck: String, size: usize },
    Board { deck: String, spaces: usize, max: usize },
    Merged { mode: MergeMode, sources: Vec<String> },
    Enum { name: String },
    /// Timers default to inactive; nothing to instantiate.
    Timer,
}

/// Which kind of struct a property table belongs to; fixes the default
/// group of a bare `sanitize:` policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InflateScope {
    GameState,
    PlayerState,
    DynamicValues,
    Move,
}

impl InflateScope {
    fn default_sanitize_group(&self) -> &'static str {
        match self {
            // A bare policy on a player state applies to everyone but the
            // owning player.
            InflateScope::PlayerState => "other",
            _ => "all",
        }
    }
}

/// One property's parsed configuration.
#[derive(Debug, Clone)]
pub struct PropertyConfig {
    pub schema: PropertySchema,
    pub spec: Option<InflateSpec>,
    pub policy: GroupPolicyMap,
}

/// The per-struct inflation table computed once at manager build.
#[derive(Debug, Clone)]
pub struct StructInflater {
    scope: InflateScope,
    props: Vec<PropertyConfig>,
}

fn resolve_size(token: &str, chest: &ComponentChest, tag: &str) -> Result<usize> {
    if let Ok(n) = token.parse::<usize>() {
        return Ok(n);
    }
    match chest.constant(token) {
        Some(v) if v >= 0 => Ok(v as usize),
        Some(v) => Err(EngineError::Configuration(format!(
            "tag {tag}: constant {token} is negative ({v})"
        ))),
        None => Err(EngineError::Configuration(format!(
            "tag {tag}: {token} is neither an integer nor a known constant"
        ))),
    }
}

fn check_deck(deck: &str, chest: &ComponentChest, tag: &str) -> Result<()> {
    if chest.deck(deck).is_none() {
        return Err(EngineError::Configuration(format!(
            "tag {tag} references unknown deck {deck}"
        )));
    }
    Ok(())
}

fn parse_tag(schema: &PropertySchema, chest: &ComponentChest) -> Result<Option<InflateSpec>> {
    let name = &schema.name;
    let tag = match schema.tag.as_deref() {
        Some(t) => t,
        None => {
            return match schema.kind {
                PropKind::Timer => Ok(Some(InflateSpec::Timer)),
                PropKind::Stack | PropKind::Board | PropKind::Enum => {
                    Err(EngineError::Configuration(format!(
                        "interface-typed property {name} has no inflation tag"
                    )))
                }
                _ => Ok(None),
            }
        }
    };
    if !schema.kind.is_interface() {
        return Err(EngineError::Configuration(format!(
            "property {name} is not interface-typed but carries tag {tag}"
        )));
    }

    let (head, rest) = tag.split_once(':').ok_or_else(|| {
        EngineError::Configuration(format!("property {name} has malformed tag {tag}"))
    })?;
    let parts: Vec<&str> = rest.split(',').map(str::trim).collect();

    let spec = match (head, schema.kind) {
        ("stack", PropKind::Stack) => {
            let deck = parts
                .first()
                .filter(|d| !d.is_empty())
                .ok_or_else(|| EngineError::Configuration(format!("tag {tag} names no deck")))?;
            check_deck(deck, chest, tag)?;
            let max = match parts.get(1) {
                Some(t) => resolve_size(t, chest, tag)?,
                None => 0,
            };
            InflateSpec::Growable {
                deck: deck.to_string(),
                max,
            }
        }
        ("sizedstack", PropKind::Stack) => {
            if parts.len() != 2 {
                return Err(EngineError::Configuration(format!(
                    "tag {tag} needs exactly DECK,N"
                )));
            }
            check_deck(parts[0], chest, tag)?;
            InflateSpec::Sized {
                deck: parts[0].to_string(),
                size: resolve_size(parts[1], chest, tag)?,
            }
        }
        ("board", PropKind::Board) => {
            if parts.len() < 2 || parts.len() > 3 {
                return Err(EngineError::Configuration(format!(
                    "tag {tag} needs DECK,N[,MAX]"
                )));
            }
            check_deck(parts[0], chest, tag)?;
            InflateSpec::Board {
                deck: parts[0].to_string(),
                spaces: resolve_size(parts[1], chest, tag)?,
                max: match parts.get(2) {
                    Some(t) => resolve_size(t, chest, tag)?,
                    None => 0,
                },
            }
        }
        ("concatenate", PropKind::Stack) | ("overlap", PropKind::Stack) => {
            if schema.mutable {
                return Err(EngineError::Configuration(format!(
                    "derived view {name} must be declared immutable"
                )));
            }
            let sources: Vec<String> = parts
                .iter()
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
                .collect();
            if sources.len() < 2 {
                return Err(EngineError::Configuration(format!(
                    "tag {tag} needs at least two source properties"
                )));
            }
            InflateSpec::Merged {
                mode: if head == "concatenate" {
                    MergeMode::Concatenate
                } else {
                    MergeMode::Overlap
                },
                sources,
            }
        }
        ("enum", PropKind::Enum) => {
            let enum_name = parts
                .first()
                .filter(|n| !n.is_empty())
                .ok_or_else(|| EngineError::Configuration(format!("tag {tag} names no enum")))?;
            if chest.enums().get(enum_name).is_none() {
                return Err(EngineError::Configuration(format!(
                    "tag {tag} references unknown enum {enum_name}"
                )));
            }
            InflateSpec::Enum {
                name: enum_name.to_string(),
            }
        }
        _ => {
            return Err(EngineError::Configuration(format!(
                "tag {tag} does not match property {name} of kind {:?}",
                schema.kind
            )))
        }
    };
    Ok(Some(spec))
}

impl StructInflater {
    /// Inspect an exemplar struct once: parse and validate every tag,
    /// compute sanitize policy maps, and exercise each declared accessor to
    /// catch readers whose tables and getters disagree.
    pub fn inspect(
        exemplar: &dyn PropertyReader,
        chest: &ComponentChest,
        scope: InflateScope,
    ) -> Result<Self> {
        let mut props = Vec::new();
        for schema in exemplar.props() {
            if scope == InflateScope::Move && schema.kind.is_interface() {
                return Err(EngineError::Configuration(format!(
                    "move property {} is interface-typed; moves carry scalars and slices only",
                    schema.name
                )));
            }
            let spec = parse_tag(&schema, chest)?;
            let policy = match schema.sanitize.as_deref() {
                Some(tag) => parse_sanitize_tag(tag, scope.default_sanitize_group())?,
                None => GroupPolicyMap::default(),
            };
            // A schema entry whose accessor is unimplemented is a
            // configuration bug; surface it at build, not mid-game.
            exemplar.prop(&schema.name).map_err(|e| {
                EngineError::Configuration(format!(
                    "property {} declared but not readable: {e}",
                    schema.name
                ))
            })?;
            props.push(PropertyConfig {
                schema,
                spec,
                policy,
            });
        }
        // Merged views must reference sibling stack properties.
        let names: Vec<&str> = props.iter().map(|p| p.schema.name.as_ref()).collect();
        for p in &props {
            if let Some(InflateSpec::Merged { sources, .. }) = &p.spec {
                for s in sources {
                    if !names.contains(&s.as_str()) {
                        return Err(EngineError::Configuration(format!(
                            "derived view {} references unknown sibling {s}",
                            p.schema.name
                        )));
                    }
                }
            }
        }
        Ok(StructInflater { scope, props })
    }

    pub fn scope(&self) -> InflateScope {
        self.scope
    }

    pub fn props(&self) -> &[PropertyConfig] {
        &self.props
    }

    pub fn config_for(&self, name: &str) -> Option<&PropertyConfig> {
        self.props.iter().find(|p| p.schema.name == name)
    }

    /// Instantiate defaults for every uninflated interface-typed property.
    pub fn inflate(
        &self,
        target: &mut dyn PropertyReadSetConfigurer,
        chest: &ComponentChest,
    ) -> Result<()> {
        for p in &self.props {
            let name: &str = &p.schema.name;
            match &p.spec {
                Some(InflateSpec::Growable { deck, max }) => {
                    if !target.stack_prop(name)?.is_inflated() {
                        target.configure_stack_prop(name, Stack::growable(deck, *max))?;
                    }
                }
                Some(InflateSpec::Sized { deck, size }) => {
                    if !target.stack_prop(name)?.is_inflated() {
                        target.configure_stack_prop(name, Stack::sized(deck, *size))?;
                    }
                }
                Some(InflateSpec::Board { deck, spaces, max }) => {
                    if !target.board_prop(name)?.is_inflated() {
                        target.configure_board_prop(name, Board::new(deck, *spaces, *max))?;
                    }
                }
                Some(InflateSpec::Merged { mode, sources }) => {
                    if !target.merged_stack_prop(name)?.is_inflated() {
                        target.configure_merged_stack_prop(
                            name,
                            MergedStack::new(*mode, sources.clone()),
                        )?;
                    }
                }
                Some(InflateSpec::Enum { name: enum_name }) => {
                    if !target.enum_prop(name)?.is_inflated() {
                        let def = chest.enums().get(enum_name).ok_or_else(|| {
                            EngineError::Configuration(format!("unknown enum {enum_name}"))
                        })?;
                        target.configure_enum_prop(name, def.new_value())?;
                    }
                }
                Some(InflateSpec::Timer) | None => {}
            }
        }
        Ok(())
    }

    /// After inflation every interface-typed property must be non-nil.
    pub fn verify_inflated(&self, r: &dyn PropertyReader) -> Result<()> {
        for p in &self.props {
            let name: &str = &p.schema.name;
            let ok = match &p.spec {
                Some(InflateSpec::Growable { .. }) | Some(InflateSpec::Sized { .. }) => {
                    r.stack_prop(name)?.is_inflated()
                }
                Some(InflateSpec::Board { .. }) => r.board_prop(name)?.is_inflated(),
                Some(InflateSpec::Merged { .. }) => r.merged_stack_prop(name)?.is_inflated(),
                Some(InflateSpec::Enum { .. }) => r.enum_prop(name)?.is_inflated(),
                Some(InflateSpec::Timer) | None => true,
            };
            if !ok {
                return Err(EngineError::Configuration(format!(
                    "interface-typed property {name} is still uninflated"
                )));
            }
        }
        Ok(())
    }
}
