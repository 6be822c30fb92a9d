//! Sanitization: per-recipient views of committed states
//!
//! Sanitization is a pure read transformation. Policies are declared per
//! property via `sanitize:` tags, keyed by group; the recipient's group
//! memberships select the applicable policies and the least restrictive one
//! wins. Stack policies degrade contents in steps: keep order, keep length,
//! keep presence, hide entirely.

use crate::component::ComponentChest;
use crate::error::{EngineError, Result};
use crate::prop::inflate::{InflateSpec, PropertyConfig};
use crate::prop::reader::PropertyReadSetConfigurer;
use crate::prop::value::{PropKind, PropValue};
use crate::stack::Stack;
use rustc_hash::FxHashMap;

pub const GROUP_ALL: &str = "all";
pub const GROUP_SELF: &str = "self";
pub const GROUP_OTHER: &str = "other";

/// Ordered least- to most-restrictive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Policy {
    /// Unchanged.
    Visible,
    /// Stack contents replaced by generic components; length and ids kept.
    Order,
    /// Contents replaced, ids randomized; only length survives. Scalars
    /// zeroed from here up.
    Len,
    /// Collapses to empty-or-not.
    NonEmpty,
    /// Property blanked entirely.
    Hidden,
}

impl Policy {
    pub fn parse(s: &str) -> Result<Policy> {
        match s {
            "visible" => Ok(Policy::Visible),
            "order" => Ok(Policy::Order),
            "len" => Ok(Policy::Len),
            "nonempty" => Ok(Policy::NonEmpty),
            "hidden" => Ok(Policy::Hidden),
            _ => Err(EngineError::Configuration(format!(
                "unknown sanitization policy {s}"
            ))),
        }
    }
}

/// Group name → policy, parsed from one property's `sanitize:` tag.
pub type GroupPolicyMap = FxHashMap<String, Policy>;

/// Parse a `sanitize:` tag. Entries are `group:policy` pairs separated by
/// commas; a bare policy applies to `default_group`.
pub fn parse_sanitize_tag(tag: &str, default_group: &str) -> Result<GroupPolicyMap> {
    let mut map = GroupPolicyMap::default();
    for part in tag.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (group, policy) = match part.split_once(':') {
            Some((g, p)) => (g.trim(), p.trim()),
            None => (default_group, part),
        };
        if map
            .insert(group.to_string(), Policy::parse(policy)?)
            .is_some()
        {
            return Err(EngineError::Configuration(format!(
                "sanitize tag {tag} names group {group} twice"
            )));
        }
    }
    Ok(map)
}

/// The policies selected by the recipient's groups, reduced to the least
/// restrictive. A property with no matching group stays visible.
pub fn effective_policy(map: &GroupPolicyMap, groups: &[&str]) -> Policy {
    map.iter()
        .filter(|(g, _)| groups.contains(&g.as_str()))
        .map(|(_, p)| *p)
        .min()
        .unwrap_or(Policy::Visible)
}

fn random_hex_id(rng: &mut impl rand::Rng) -> String {
    let mut bytes = [0u8; 16];
    rng.fill(&mut bytes);
    hex::encode(bytes)
}

fn sanitize_stack(
    stack: &mut Stack,
    policy: Policy,
    rng: &mut impl rand::Rng,
    ids_of: &dyn Fn(&Stack) -> Vec<Option<String>>,
) {
    match policy {
        Policy::Visible => {}
        Policy::Order => {
            let ids = ids_of(stack);
            stack.replace_with_generics();
            stack.set_sanitized_ids(Some(ids));
        }
        Policy::Len => {
            let ids = stack
                .slots()
                .map(|s| s.map(|_| random_hex_id(rng)))
                .collect();
            stack.replace_with_generics();
            stack.set_sanitized_ids(Some(ids));
        }
        Policy::NonEmpty => {
            stack.collapse_to_presence();
            stack.set_sanitized_ids(Some(Vec::new()));
        }
        Policy::Hidden => {
            stack.empty_out();
            stack.set_sanitized_ids(Some(Vec::new()));
            stack.clear_ids_last_seen();
        }
    }
}

/// Apply the effective policies for one sub-state in place. `ids_of`
/// computes a stack's current semi-stable ids (needs the owning game's
/// identity, so the state supplies it). `override_policy` is the delegate's
/// hook; it receives the computed policy and may replace it.
///
/// Returns the policy applied to each stack/board property, which the state
/// uses to hide dynamic component values transitively.
pub(crate) fn sanitize_props(
    target: &mut dyn PropertyReadSetConfigurer,
    configs: &[PropertyConfig],
    groups: &[&str],
    chest: &ComponentChest,
    rng: &mut impl rand::Rng,
    ids_of: &dyn Fn(&Stack) -> Vec<Option<String>>,
    override_policy: &dyn Fn(&str, Policy) -> Policy,
) -> Result<Vec<(String, Policy)>> {
    let mut stack_policies = Vec::new();
    for cfg in configs {
        let name: &str = &cfg.schema.name;
        let policy = override_policy(name, effective_policy(&cfg.policy, groups));
        if policy == Policy::Visible {
            if matches!(cfg.schema.kind, PropKind::Stack | PropKind::Board)
                && !matches!(cfg.spec, Some(InflateSpec::Merged { .. }))
            {
                stack_policies.push((name.to_string(), Policy::Visible));
            }
            continue;
        }
        match cfg.schema.kind {
            PropKind::Stack => {
                if matches!(cfg.spec, Some(InflateSpec::Merged { .. })) {
                    // Derived views hold no data of their own.
                    continue;
                }
                let mut stack = target.stack_prop(name)?.clone();
                sanitize_stack(&mut stack, policy, rng, ids_of);
                target.configure_stack_prop(name, stack)?;
                stack_policies.push((name.to_string(), policy));
            }
            PropKind::Board => {
                let mut board = target.board_prop(name)?.clone();
                for space in board.spaces_mut() {
                    sanitize_stack(space, policy, rng, ids_of);
                }
                target.configure_board_prop(name, board)?;
                stack_policies.push((name.to_string(), policy));
            }
            PropKind::Timer => {
                if policy >= Policy::Len {
                    target.configure_timer_prop(name, crate::timer::Timer::inactive())?;
                }
            }
            PropKind::Enum => {
                if policy >= Policy::Len {
                    let mut v = target.enum_prop(name)?.clone();
                    let def = chest.enums().get(v.enum_name());
                    v.zero(def);
                    target.configure_enum_prop(name, v)?;
                }
            }
            _ => {
                // Scalars and slices: zeroed from Len up, untouched below.
                if policy >= Policy::Len {
                    let zeroed = target.prop(name)?.zeroed();
                    match zeroed {
                        PropValue::Int(v) => target.set_int_prop(name, v)?,
                        PropValue::Bool(v) => target.set_bool_prop(name, v)?,
                        PropValue::String(v) => target.set_string_prop(name, v)?,
                        PropValue::PlayerIndex(v) => target.set_player_index_prop(name, v)?,
                        PropValue::IntSlice(v) => target.set_int_slice_prop(name, v)?,
                        PropValue::BoolSlice(v) => target.set_bool_slice_prop(name, v)?,
                        PropValue::StringSlice(v) => target.set_string_slice_prop(name, v)?,
                        PropValue::PlayerIndexSlice(v) => {
                            target.set_player_index_slice_prop(name, v)?
                        }
                        _ => unreachable!("interface kinds handled above"),
                    }
                }
            }
        }
    }
    Ok(stack_policies)
}
