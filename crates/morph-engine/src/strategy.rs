//! Conversion strategy selection.
//!
//! For each matched member pair the [`Selector`] decides how a source value
//! becomes a destination value:
//!
//! | source | destination | strategy |
//! |--------|-------------|----------|
//! | scalar X | scalar X or wider | `DirectAssign` |
//! | scalar X | optional X or wider | `NullableWrap` |
//! | optional X | X or wider | `NullableUnwrap` (absent becomes the kind default) |
//! | optional X | optional X or wider | `NullableToNullable` |
//! | Complex A | Complex B | `NestedObject` |
//! | sequence/set of A | sequence of B | `SequenceElement` |
//! | sequence/set of A | set of B | `SetElement` |
//! | map K1 to V1 | map K2 to V2 | `MappingEntry` |
//! | anything else | | `Unmappable` |
//!
//! Strings follow the scalar rows, defaulting to the empty string.
//!
//! Nested-object pairs are not planned here. They go back to the plan
//! builder through [`NestedPlanner`], which owns cycle detection. A nested
//! pair that cannot be planned degrades only the member that needs it; a
//! depth limit still aborts the whole build.

use crate::containers::{ContainerFamily, ContainerTarget};
use crate::describe::{DescriptorKind, MemberDescriptor, TypeDescriptor};
use crate::diagnostics::diagnostic_codes;
use crate::error::{MapError, Result};
use crate::matcher::MemberMatch;
use crate::plan::PlanKey;
use crate::types::{PrimitiveKind, TypeRef};
use crate::value::Value;
use std::fmt;
use std::sync::Arc;

// =============================================================================
// Scalar casts
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Primitive(PrimitiveKind),
    String,
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarKind::Primitive(kind) => write!(f, "{kind}"),
            ScalarKind::String => f.write_str("string"),
        }
    }
}

/// Conversion applied to a present scalar value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScalarCast {
    Identity(ScalarKind),
    Widen { from: PrimitiveKind, to: PrimitiveKind },
}

impl ScalarCast {
    /// Select a cast, or `None` when no lossless conversion exists.
    pub fn between(source: ScalarKind, dest: ScalarKind) -> Option<ScalarCast> {
        match (source, dest) {
            (a, b) if a == b => Some(ScalarCast::Identity(a)),
            (ScalarKind::Primitive(from), ScalarKind::Primitive(to)) if from.widens_to(to) => {
                Some(ScalarCast::Widen { from, to })
            }
            _ => None,
        }
    }

    pub fn source_kind(&self) -> ScalarKind {
        match self {
            ScalarCast::Identity(kind) => *kind,
            ScalarCast::Widen { from, .. } => ScalarKind::Primitive(*from),
        }
    }

    pub fn target_kind(&self) -> ScalarKind {
        match self {
            ScalarCast::Identity(kind) => *kind,
            ScalarCast::Widen { to, .. } => ScalarKind::Primitive(*to),
        }
    }

    /// Convert a present value. `None` if the value is not of the source kind.
    pub fn apply(&self, value: &Value) -> Option<Value> {
        match self {
            ScalarCast::Identity(ScalarKind::String) => value.as_str().map(|_| value.clone()),
            ScalarCast::Identity(ScalarKind::Primitive(kind)) => {
                (value.primitive_kind() == Some(*kind)).then(|| value.clone())
            }
            ScalarCast::Widen { from, to } => {
                if value.primitive_kind() == Some(*from) {
                    value.widen(*to)
                } else {
                    None
                }
            }
        }
    }
}

impl fmt::Display for ScalarCast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarCast::Identity(kind) => write!(f, "{kind}"),
            ScalarCast::Widen { from, to } => write!(f, "{from} -> {to}"),
        }
    }
}

// =============================================================================
// Strategy
// =============================================================================

/// The plan a NestedObject member defers to.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct NestedTarget {
    pub key: PlanKey,
    /// Declared source type, without its optional modifier.
    pub source_ty: TypeRef,
    /// Declared destination type, without its optional modifier.
    pub dest_ty: TypeRef,
    pub dest_nullable: bool,
    /// Destination is abstract or an interface; the executor must dispatch.
    pub dest_abstract: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum UnmappableReason {
    /// No readable source member has this name.
    Unmatched,
    IncompatibleScalarTypes { source_type: String, dest_type: String },
    IncompatibleShapes { source_type: String, dest_type: String },
    /// Element or value types of two containers cannot be mapped.
    IncompatibleElements { source_type: String, dest_type: String },
    UnsupportedMappingKey { source_type: String, dest_type: String },
    /// The plan for a nested Complex pair failed; `cause` is its root error.
    NestedPlanFailed {
        source_type: String,
        dest_type: String,
        cause: String,
    },
}

impl UnmappableReason {
    pub fn code(&self) -> u32 {
        match self {
            UnmappableReason::Unmatched => diagnostic_codes::UNMATCHED_DESTINATION_MEMBER,
            UnmappableReason::IncompatibleScalarTypes { .. } => {
                diagnostic_codes::INCOMPATIBLE_SCALAR_TYPES
            }
            UnmappableReason::IncompatibleShapes { .. }
            | UnmappableReason::IncompatibleElements { .. } => {
                diagnostic_codes::INCOMPATIBLE_MEMBER_SHAPES
            }
            UnmappableReason::UnsupportedMappingKey { .. } => {
                diagnostic_codes::UNSUPPORTED_MAPPING_KEY
            }
            UnmappableReason::NestedPlanFailed { .. } => diagnostic_codes::NESTED_PLAN_FAILED,
        }
    }

    /// Type names for the diagnostic message, if the reason carries them.
    pub fn types(&self) -> Option<(&str, &str)> {
        match self {
            UnmappableReason::Unmatched => None,
            UnmappableReason::IncompatibleScalarTypes {
                source_type,
                dest_type,
            }
            | UnmappableReason::IncompatibleShapes {
                source_type,
                dest_type,
            }
            | UnmappableReason::IncompatibleElements {
                source_type,
                dest_type,
            }
            | UnmappableReason::UnsupportedMappingKey {
                source_type,
                dest_type,
            }
            | UnmappableReason::NestedPlanFailed {
                source_type,
                dest_type,
                ..
            } => Some((source_type, dest_type)),
        }
    }

    pub fn cause(&self) -> Option<&str> {
        match self {
            UnmappableReason::NestedPlanFailed { cause, .. } => Some(cause),
            _ => None,
        }
    }
}

impl fmt::Display for UnmappableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnmappableReason::Unmatched => f.write_str("unmatched"),
            UnmappableReason::IncompatibleScalarTypes { .. } => f.write_str("incompatible scalar types"),
            UnmappableReason::IncompatibleShapes { .. } => f.write_str("incompatible shapes"),
            UnmappableReason::IncompatibleElements { .. } => f.write_str("incompatible elements"),
            UnmappableReason::UnsupportedMappingKey { .. } => f.write_str("unsupported mapping key"),
            UnmappableReason::NestedPlanFailed {
                source_type,
                dest_type,
                cause,
            } => write!(f, "nested plan `{source_type}` -> `{dest_type}` failed: {cause}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Strategy {
    DirectAssign(ScalarCast),
    NullableWrap(ScalarCast),
    NullableUnwrap { cast: ScalarCast, default: Value },
    NullableToNullable(ScalarCast),
    NestedObject(NestedTarget),
    SequenceElement {
        element: Box<Strategy>,
        target: ContainerTarget,
    },
    SetElement {
        element: Box<Strategy>,
        target: ContainerTarget,
    },
    MappingEntry {
        key: Box<Strategy>,
        value: Box<Strategy>,
        target: ContainerTarget,
    },
    Unmappable(UnmappableReason),
}

impl Strategy {
    pub fn is_unmappable(&self) -> bool {
        matches!(self, Strategy::Unmappable(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Strategy::DirectAssign(_) => "DirectAssign",
            Strategy::NullableWrap(_) => "NullableWrap",
            Strategy::NullableUnwrap { .. } => "NullableUnwrap",
            Strategy::NullableToNullable(_) => "NullableToNullable",
            Strategy::NestedObject(_) => "NestedObject",
            Strategy::SequenceElement { .. } => "SequenceElement",
            Strategy::SetElement { .. } => "SetElement",
            Strategy::MappingEntry { .. } => "MappingEntry",
            Strategy::Unmappable(_) => "Unmappable",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::DirectAssign(cast)
            | Strategy::NullableWrap(cast)
            | Strategy::NullableUnwrap { cast, .. }
            | Strategy::NullableToNullable(cast) => write!(f, "{}({cast})", self.name()),
            Strategy::NestedObject(nested) => {
                write!(f, "NestedObject({} -> {})", nested.source_ty, nested.dest_ty)
            }
            Strategy::SequenceElement { element, target }
            | Strategy::SetElement { element, target } => {
                write!(f, "{}[{element}] -> {target}", self.name())
            }
            Strategy::MappingEntry { key, value, target } => {
                write!(f, "MappingEntry[{key}, {value}] -> {target}")
            }
            Strategy::Unmappable(reason) => write!(f, "Unmappable({reason})"),
        }
    }
}

// =============================================================================
// Selector
// =============================================================================

/// What the selector needs from the plan builder.
pub trait NestedPlanner {
    fn describe_member(&self, member: &MemberDescriptor) -> Result<Arc<TypeDescriptor>>;

    /// Request (or reference) the plan for a nested Complex pair.
    fn request_nested(&mut self, source: &TypeDescriptor, dest: &TypeDescriptor) -> Result<PlanKey>;
}

pub struct Selector<'p, P: NestedPlanner + ?Sized> {
    planner: &'p mut P,
}

impl<'p, P: NestedPlanner + ?Sized> Selector<'p, P> {
    pub fn new(planner: &'p mut P) -> Self {
        Self { planner }
    }

    /// Strategy for one matched member pair.
    pub fn select_member(&mut self, matched: &MemberMatch<'_>) -> Result<Strategy> {
        let Some(source_member) = matched.source else {
            return Ok(Strategy::Unmappable(UnmappableReason::Unmatched));
        };
        let source = self.planner.describe_member(source_member)?;
        let dest = self.planner.describe_member(matched.dest)?;
        self.select(source.resolved(), dest.resolved())
    }

    /// Strategy for a pair of resolved descriptors.
    pub fn select(&mut self, source: &TypeDescriptor, dest: &TypeDescriptor) -> Result<Strategy> {
        let source = source.resolved();
        let dest = dest.resolved();

        if let (Some(source_kind), Some(dest_kind)) = (scalar_kind(source), scalar_kind(dest)) {
            return Ok(select_scalar(source, dest, source_kind, dest_kind));
        }

        match (&source.kind, &dest.kind) {
            (DescriptorKind::Complex(_), DescriptorKind::Complex(dest_shape)) => {
                let key = match self.planner.request_nested(source, dest) {
                    Ok(key) => key,
                    Err(err) if matches!(err.root_cause(), MapError::DepthExceeded { .. }) => return Err(err),
                    Err(err) => {
                        return Ok(Strategy::Unmappable(UnmappableReason::NestedPlanFailed {
                            source_type: source.name.to_string(),
                            dest_type: dest.name.to_string(),
                            cause: err.root_cause().to_string(),
                        }));
                    }
                };
                Ok(Strategy::NestedObject(NestedTarget {
                    key,
                    source_ty: source.ty.non_optional().clone(),
                    dest_ty: dest.ty.non_optional().clone(),
                    dest_nullable: dest.nullable,
                    dest_abstract: !dest_shape.is_concrete(),
                }))
            }
            (
                DescriptorKind::Sequence {
                    element: source_element,
                    ..
                }
                | DescriptorKind::Set {
                    element: source_element,
                },
                DescriptorKind::Sequence {
                    element: dest_element,
                    ..
                }
                | DescriptorKind::Set {
                    element: dest_element,
                },
            ) => {
                let element = self.select(source_element, dest_element)?;
                if let Some(failed) = unmappable_elements(&element, source, dest) {
                    return Ok(failed);
                }
                let Some(target) = ContainerTarget::from_descriptor(dest) else {
                    return Ok(incompatible_shapes(source, dest));
                };
                let element = Box::new(element);
                Ok(match target.family {
                    ContainerFamily::Set => Strategy::SetElement { element, target },
                    _ => Strategy::SequenceElement { element, target },
                })
            }
            (
                DescriptorKind::Mapping {
                    key: source_key,
                    value: source_value,
                },
                DescriptorKind::Mapping {
                    key: dest_key,
                    value: dest_value,
                },
            ) => {
                // Keys are copied as is: scalar, same nullability, lossless.
                let key = if source_key.is_scalar() && dest_key.is_scalar() {
                    Some(self.select(source_key, dest_key)?)
                } else {
                    None
                };
                let Some(key @ Strategy::DirectAssign(ScalarCast::Identity(_))) = key else {
                    return Ok(Strategy::Unmappable(UnmappableReason::UnsupportedMappingKey {
                        source_type: source_key.name.to_string(),
                        dest_type: dest_key.name.to_string(),
                    }));
                };
                let value = self.select(source_value, dest_value)?;
                if let Some(failed) = unmappable_elements(&value, source, dest) {
                    return Ok(failed);
                }
                let Some(target) = ContainerTarget::from_descriptor(dest) else {
                    return Ok(incompatible_shapes(source, dest));
                };
                Ok(Strategy::MappingEntry {
                    key: Box::new(key),
                    value: Box::new(value),
                    target,
                })
            }
            _ => Ok(incompatible_shapes(source, dest)),
        }
    }
}

fn scalar_kind(desc: &TypeDescriptor) -> Option<ScalarKind> {
    match desc.kind {
        DescriptorKind::Primitive(kind) | DescriptorKind::NullablePrimitive(kind) => {
            Some(ScalarKind::Primitive(kind))
        }
        DescriptorKind::String => Some(ScalarKind::String),
        _ => None,
    }
}

fn select_scalar(
    source: &TypeDescriptor,
    dest: &TypeDescriptor,
    source_kind: ScalarKind,
    dest_kind: ScalarKind,
) -> Strategy {
    let Some(cast) = ScalarCast::between(source_kind, dest_kind) else {
        return Strategy::Unmappable(UnmappableReason::IncompatibleScalarTypes {
            source_type: source.name.to_string(),
            dest_type: dest.name.to_string(),
        });
    };
    match (source.nullable, dest.nullable) {
        (false, false) => Strategy::DirectAssign(cast),
        (false, true) => Strategy::NullableWrap(cast),
        (true, false) => Strategy::NullableUnwrap {
            cast,
            default: scalar_default(dest_kind),
        },
        (true, true) => Strategy::NullableToNullable(cast),
    }
}

/// Default value of a non-nullable scalar destination.
pub fn scalar_default(kind: ScalarKind) -> Value {
    match kind {
        ScalarKind::Primitive(kind) => kind.default_value(),
        ScalarKind::String => Value::String(String::new()),
    }
}

fn incompatible_shapes(source: &TypeDescriptor, dest: &TypeDescriptor) -> Strategy {
    Strategy::Unmappable(UnmappableReason::IncompatibleShapes {
        source_type: source.name.to_string(),
        dest_type: dest.name.to_string(),
    })
}

/// A container whose element (or value) strategy is unmappable. A failed
/// nested plan keeps its own reason so the diagnostic names the real cause.
fn unmappable_elements(element: &Strategy, source: &TypeDescriptor, dest: &TypeDescriptor) -> Option<Strategy> {
    match element {
        Strategy::Unmappable(reason @ UnmappableReason::NestedPlanFailed { .. }) => {
            Some(Strategy::Unmappable(reason.clone()))
        }
        Strategy::Unmappable(_) => Some(Strategy::Unmappable(UnmappableReason::IncompatibleElements {
            source_type: source.name.to_string(),
            dest_type: dest.name.to_string(),
        })),
        _ => None,
    }
}

#[cfg(test)]
#[path = "../tests/strategy_tests.rs"]
mod tests;
