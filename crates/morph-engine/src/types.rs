//! Type declarations: how the hosting layer tells the engine what a type looks like.
//!
//! Runtime member inspection is replaced by explicit, one-time registration:
//!
//! - [`TypeRef`] names a type (scalar, container, optional, or a registered
//!   Complex type closing over generic arguments).
//! - [`TypeDef`] declares a Complex type: its kind, generic parameters, base
//!   type, and ordered members.
//! - [`Describe`] maps Rust types onto `TypeRef`s so call sites can write
//!   `TypeRef::of::<Vec<Option<i32>>>()`.
//!
//! Every `TypeRef` has a canonical textual form (its `Display`), which is
//! interned into a [`TypeKey`] and used as the stable identity for descriptor
//! and plan caching.

use crate::decimal::Decimal;
use morph_common::Atom;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;

// =============================================================================
// TypeKey
// =============================================================================

/// Stable identity of a closed type: the interned canonical name.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TypeKey(pub Atom);

// =============================================================================
// PrimitiveKind
// =============================================================================

/// Built-in scalar kinds.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimitiveKind {
    Bool,
    I8,
    I16,
    I32,
    I64,
    I128,
    U8,
    U16,
    U32,
    U64,
    U128,
    F32,
    F64,
    Decimal,
    Char,
    /// Opaque binary blob.
    Bytes,
    Date,
    Time,
    DateTime,
    Duration,
    /// A UTC point in time.
    Instant,
    Uuid,
}

impl PrimitiveKind {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::I8 => "i8",
            Self::I16 => "i16",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::I128 => "i128",
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::U32 => "u32",
            Self::U64 => "u64",
            Self::U128 => "u128",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::Decimal => "decimal",
            Self::Char => "char",
            Self::Bytes => "bytes",
            Self::Date => "date",
            Self::Time => "time",
            Self::DateTime => "datetime",
            Self::Duration => "duration",
            Self::Instant => "instant",
            Self::Uuid => "uuid",
        }
    }

    /// Whether every value of `self` is representable as `target` without loss.
    ///
    /// Reflexive. Narrowing, sign changes that can lose values, integer to
    /// `f32` beyond 16 bits, and anything involving text are rejected.
    pub fn widens_to(self, target: PrimitiveKind) -> bool {
        use PrimitiveKind::*;

        if self == target {
            return true;
        }
        matches!(
            (self, target),
            (I8, I16 | I32 | I64 | I128 | F32 | F64 | Decimal)
                | (I16, I32 | I64 | I128 | F32 | F64 | Decimal)
                | (I32, I64 | I128 | F64 | Decimal)
                | (I64, I128 | Decimal)
                | (I128, Decimal)
                | (U8, U16 | U32 | U64 | U128 | I16 | I32 | I64 | I128 | F32 | F64 | Decimal)
                | (U16, U32 | U64 | U128 | I32 | I64 | I128 | F32 | F64 | Decimal)
                | (U32, U64 | U128 | I64 | I128 | F64 | Decimal)
                | (U64, U128 | I128 | Decimal)
                | (F32, F64)
                | (Date, DateTime)
        )
    }
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// SeqShape
// =============================================================================

/// Representation of an ordered container, independent of element type.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeqShape {
    /// Fixed-size, single-rank array. Jagged arrays are arrays of arrays.
    Array,
    /// Rectangular array with the given rank.
    MultiRank(u8),
    /// Growable sequence.
    List,
    /// Read-only view over a sequence.
    ReadOnly,
}

// =============================================================================
// TypeRef
// =============================================================================

/// Reference to a type, as written in a member declaration.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeRef {
    Primitive(PrimitiveKind),
    String,
    Optional(Box<TypeRef>),
    Sequence {
        element: Box<TypeRef>,
        shape: SeqShape,
    },
    Set(Box<TypeRef>),
    Map {
        key: Box<TypeRef>,
        value: Box<TypeRef>,
    },
    /// A registered Complex type, with its generic arguments (if any).
    Named {
        name: String,
        #[serde(default)]
        args: Vec<TypeRef>,
    },
    /// An open generic parameter of the enclosing definition.
    Param(String),
}

impl TypeRef {
    /// The `TypeRef` of a Rust type.
    pub fn of<T: Describe + ?Sized>() -> TypeRef {
        T::type_ref()
    }

    pub const fn primitive(kind: PrimitiveKind) -> TypeRef {
        TypeRef::Primitive(kind)
    }

    pub fn named(name: impl Into<String>) -> TypeRef {
        TypeRef::Named {
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn generic(name: impl Into<String>, args: impl IntoIterator<Item = TypeRef>) -> TypeRef {
        TypeRef::Named {
            name: name.into(),
            args: args.into_iter().collect(),
        }
    }

    pub fn param(name: impl Into<String>) -> TypeRef {
        TypeRef::Param(name.into())
    }

    /// Wrap in an optional modifier. Already-optional types are returned as is.
    pub fn optional(self) -> TypeRef {
        match self {
            TypeRef::Optional(_) => self,
            other => TypeRef::Optional(Box::new(other)),
        }
    }

    pub fn list(element: TypeRef) -> TypeRef {
        Self::sequence(element, SeqShape::List)
    }

    pub fn array(element: TypeRef) -> TypeRef {
        Self::sequence(element, SeqShape::Array)
    }

    pub fn multi_rank(element: TypeRef, rank: u8) -> TypeRef {
        Self::sequence(element, SeqShape::MultiRank(rank))
    }

    pub fn read_only(element: TypeRef) -> TypeRef {
        Self::sequence(element, SeqShape::ReadOnly)
    }

    pub fn sequence(element: TypeRef, shape: SeqShape) -> TypeRef {
        TypeRef::Sequence {
            element: Box::new(element),
            shape,
        }
    }

    pub fn set(element: TypeRef) -> TypeRef {
        TypeRef::Set(Box::new(element))
    }

    pub fn map(key: TypeRef, value: TypeRef) -> TypeRef {
        TypeRef::Map {
            key: Box::new(key),
            value: Box::new(value),
        }
    }

    pub fn is_optional(&self) -> bool {
        matches!(self, TypeRef::Optional(_))
    }

    /// The type with any optional modifier removed.
    pub fn non_optional(&self) -> &TypeRef {
        match self {
            TypeRef::Optional(inner) => inner.non_optional(),
            other => other,
        }
    }

    /// Name of the registered definition, for `Named` types (optional or not).
    pub fn def_name(&self) -> Option<&str> {
        match self.non_optional() {
            TypeRef::Named { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Generic arguments of a `Named` type.
    pub fn args(&self) -> &[TypeRef] {
        match self.non_optional() {
            TypeRef::Named { args, .. } => args,
            _ => &[],
        }
    }

    /// Whether any open generic parameter remains.
    pub fn has_params(&self) -> bool {
        match self {
            TypeRef::Param(_) => true,
            TypeRef::Primitive(_) | TypeRef::String => false,
            TypeRef::Optional(inner) | TypeRef::Set(inner) => inner.has_params(),
            TypeRef::Sequence { element, .. } => element.has_params(),
            TypeRef::Map { key, value } => key.has_params() || value.has_params(),
            TypeRef::Named { args, .. } => args.iter().any(TypeRef::has_params),
        }
    }

    /// Nesting depth of the reference (a scalar has depth 1).
    pub fn depth(&self) -> u32 {
        match self {
            TypeRef::Param(_) | TypeRef::Primitive(_) | TypeRef::String => 1,
            TypeRef::Optional(inner) | TypeRef::Set(inner) => 1 + inner.depth(),
            TypeRef::Sequence { element, .. } => 1 + element.depth(),
            TypeRef::Map { key, value } => 1 + key.depth().max(value.depth()),
            TypeRef::Named { args, .. } => 1 + args.iter().map(TypeRef::depth).max().unwrap_or(0),
        }
    }

    /// Replace open parameters with the matching closed arguments.
    ///
    /// Parameters without a matching name are left open.
    pub fn substitute(&self, params: &[String], args: &[TypeRef]) -> TypeRef {
        match self {
            TypeRef::Param(name) => params
                .iter()
                .position(|p| p == name)
                .and_then(|idx| args.get(idx))
                .cloned()
                .unwrap_or_else(|| self.clone()),
            TypeRef::Primitive(_) | TypeRef::String => self.clone(),
            TypeRef::Optional(inner) => inner.substitute(params, args).optional(),
            TypeRef::Sequence { element, shape } => {
                TypeRef::sequence(element.substitute(params, args), *shape)
            }
            TypeRef::Set(inner) => TypeRef::set(inner.substitute(params, args)),
            TypeRef::Map { key, value } => {
                TypeRef::map(key.substitute(params, args), value.substitute(params, args))
            }
            TypeRef::Named { name, args: own } => TypeRef::Named {
                name: name.clone(),
                args: own.iter().map(|a| a.substitute(params, args)).collect(),
            },
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Primitive(kind) => f.write_str(kind.name()),
            TypeRef::String => f.write_str("string"),
            TypeRef::Optional(inner) if inner.is_optional() => write!(f, "{inner}"),
            TypeRef::Optional(inner) => write!(f, "Option<{inner}>"),
            TypeRef::Sequence { element, shape } => match shape {
                SeqShape::Array => write!(f, "Array<{element}>"),
                SeqShape::MultiRank(rank) => write!(f, "Array{rank}<{element}>"),
                SeqShape::List => write!(f, "List<{element}>"),
                SeqShape::ReadOnly => write!(f, "ReadOnly<{element}>"),
            },
            TypeRef::Set(inner) => write!(f, "Set<{inner}>"),
            TypeRef::Map { key, value } => write!(f, "Map<{key},{value}>"),
            TypeRef::Named { name, args } if args.is_empty() => f.write_str(name),
            TypeRef::Named { name, args } => {
                write!(f, "{name}<")?;
                for (idx, arg) in args.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(">")
            }
            TypeRef::Param(name) => write!(f, "'{name}"),
        }
    }
}

// =============================================================================
// Describe
// =============================================================================

/// Rust types with a static structural description.
pub trait Describe {
    fn type_ref() -> TypeRef;
}

macro_rules! describe_primitives {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
            impl Describe for $ty {
                fn type_ref() -> TypeRef {
                    TypeRef::Primitive(PrimitiveKind::$kind)
                }
            }
        )*
    };
}

describe_primitives! {
    bool => Bool,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    i128 => I128,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    u128 => U128,
    f32 => F32,
    f64 => F64,
    char => Char,
    Decimal => Decimal,
    chrono::NaiveDate => Date,
    chrono::NaiveTime => Time,
    chrono::NaiveDateTime => DateTime,
    chrono::TimeDelta => Duration,
    chrono::DateTime<chrono::Utc> => Instant,
    uuid::Uuid => Uuid,
}

impl Describe for String {
    fn type_ref() -> TypeRef {
        TypeRef::String
    }
}

impl Describe for str {
    fn type_ref() -> TypeRef {
        TypeRef::String
    }
}

impl<T: Describe> Describe for Option<T> {
    fn type_ref() -> TypeRef {
        T::type_ref().optional()
    }
}

impl<T: Describe> Describe for Vec<T> {
    fn type_ref() -> TypeRef {
        TypeRef::list(T::type_ref())
    }
}

impl<T: Describe, const N: usize> Describe for [T; N] {
    fn type_ref() -> TypeRef {
        TypeRef::array(T::type_ref())
    }
}

impl<T: Describe> Describe for [T] {
    fn type_ref() -> TypeRef {
        TypeRef::read_only(T::type_ref())
    }
}

impl<T: Describe, S> Describe for HashSet<T, S> {
    fn type_ref() -> TypeRef {
        TypeRef::set(T::type_ref())
    }
}

impl<T: Describe> Describe for BTreeSet<T> {
    fn type_ref() -> TypeRef {
        TypeRef::set(T::type_ref())
    }
}

impl<T: Describe, S> Describe for indexmap::IndexSet<T, S> {
    fn type_ref() -> TypeRef {
        TypeRef::set(T::type_ref())
    }
}

impl<K: Describe, V: Describe, S> Describe for HashMap<K, V, S> {
    fn type_ref() -> TypeRef {
        TypeRef::map(K::type_ref(), V::type_ref())
    }
}

impl<K: Describe, V: Describe> Describe for BTreeMap<K, V> {
    fn type_ref() -> TypeRef {
        TypeRef::map(K::type_ref(), V::type_ref())
    }
}

impl<K: Describe, V: Describe, S> Describe for indexmap::IndexMap<K, V, S> {
    fn type_ref() -> TypeRef {
        TypeRef::map(K::type_ref(), V::type_ref())
    }
}

// =============================================================================
// TypeDef - registered Complex types
// =============================================================================

/// Kind of a registered Complex type.
///
/// | Kind | Default-constructible | Runtime variants |
/// |------|-----------------------|------------------|
/// | Class | Yes | Derived classes |
/// | Abstract | No | Derived classes |
/// | Interface | No | Implementing classes |
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefKind {
    #[default]
    Class,
    Abstract,
    Interface,
}

impl DefKind {
    pub const fn is_concrete(self) -> bool {
        matches!(self, DefKind::Class)
    }
}

const fn default_true() -> bool {
    true
}

/// A declared member of a Complex type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberDef {
    pub name: String,
    pub ty: TypeRef,
    #[serde(default = "default_true")]
    pub readable: bool,
    #[serde(default = "default_true")]
    pub writable: bool,
}

/// Declaration of a Complex type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDef {
    pub name: String,
    #[serde(default)]
    pub kind: DefKind,
    #[serde(default)]
    pub type_params: Vec<String>,
    #[serde(default)]
    pub extends: Option<TypeRef>,
    #[serde(default)]
    pub implements: Vec<TypeRef>,
    #[serde(default)]
    pub members: Vec<MemberDef>,
}

impl TypeDef {
    fn new(name: impl Into<String>, kind: DefKind) -> Self {
        Self {
            name: name.into(),
            kind,
            type_params: Vec::new(),
            extends: None,
            implements: Vec::new(),
            members: Vec::new(),
        }
    }

    pub fn class(name: impl Into<String>) -> Self {
        Self::new(name, DefKind::Class)
    }

    pub fn abstract_class(name: impl Into<String>) -> Self {
        Self::new(name, DefKind::Abstract)
    }

    pub fn interface(name: impl Into<String>) -> Self {
        Self::new(name, DefKind::Interface)
    }

    pub fn type_param(mut self, name: impl Into<String>) -> Self {
        self.type_params.push(name.into());
        self
    }

    pub fn extends(mut self, base: TypeRef) -> Self {
        self.extends = Some(base);
        self
    }

    pub fn implements(mut self, interface: TypeRef) -> Self {
        self.implements.push(interface);
        self
    }

    /// Add a readable and writable member.
    pub fn member(self, name: impl Into<String>, ty: TypeRef) -> Self {
        self.with_member(name, ty, true, true)
    }

    /// Add a member with a getter only.
    pub fn read_only(self, name: impl Into<String>, ty: TypeRef) -> Self {
        self.with_member(name, ty, true, false)
    }

    /// Add a member with a setter only.
    pub fn write_only(self, name: impl Into<String>, ty: TypeRef) -> Self {
        self.with_member(name, ty, false, true)
    }

    fn with_member(mut self, name: impl Into<String>, ty: TypeRef, readable: bool, writable: bool) -> Self {
        self.members.push(MemberDef {
            name: name.into(),
            ty,
            readable,
            writable,
        });
        self
    }

    pub fn is_concrete(&self) -> bool {
        self.kind.is_concrete()
    }

    /// Definitions this type derives from directly (base class, then interfaces).
    pub fn supertypes(&self) -> impl Iterator<Item = &TypeRef> {
        self.extends.iter().chain(self.implements.iter())
    }
}

#[cfg(test)]
#[path = "../tests/types_tests.rs"]
mod tests;
