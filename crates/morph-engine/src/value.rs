//! Instance values.
//!
//! The engine adapts `Value` graphs. A `Value` is either `Null`, a scalar, a
//! string, an [`Object`] carrying its runtime type, or a container. Sequences of
//! every shape except multi-rank arrays are `Seq`; multi-rank arrays are
//! [`Grid`]s. Sets and maps keep insertion order.
//!
//! `Value` implements `Eq` and `Hash` so it can key sets and maps. Floats
//! compare by bit pattern.

use crate::decimal::Decimal;
use crate::types::{PrimitiveKind, TypeRef};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Utc};
use indexmap::{IndexMap, IndexSet};
use std::hash::{Hash, Hasher};
use uuid::Uuid;

#[derive(Clone, Debug, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    I128(i128),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    U128(u128),
    F32(f32),
    F64(f64),
    Decimal(Decimal),
    Char(char),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    Duration(TimeDelta),
    Instant(DateTime<Utc>),
    Uuid(Uuid),
    String(String),
    Object(Object),
    Seq(Vec<Value>),
    Grid(Grid),
    Set(IndexSet<Value>),
    Map(IndexMap<Value, Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Elements of a sequence, grid, or set.
    pub fn len(&self) -> Option<usize> {
        match self {
            Value::Seq(items) => Some(items.len()),
            Value::Grid(grid) => Some(grid.items.len()),
            Value::Set(items) => Some(items.len()),
            Value::Map(entries) => Some(entries.len()),
            _ => None,
        }
    }

    /// The scalar kind this value holds, if it is a scalar.
    pub fn primitive_kind(&self) -> Option<PrimitiveKind> {
        Some(match self {
            Value::Bool(_) => PrimitiveKind::Bool,
            Value::I8(_) => PrimitiveKind::I8,
            Value::I16(_) => PrimitiveKind::I16,
            Value::I32(_) => PrimitiveKind::I32,
            Value::I64(_) => PrimitiveKind::I64,
            Value::I128(_) => PrimitiveKind::I128,
            Value::U8(_) => PrimitiveKind::U8,
            Value::U16(_) => PrimitiveKind::U16,
            Value::U32(_) => PrimitiveKind::U32,
            Value::U64(_) => PrimitiveKind::U64,
            Value::U128(_) => PrimitiveKind::U128,
            Value::F32(_) => PrimitiveKind::F32,
            Value::F64(_) => PrimitiveKind::F64,
            Value::Decimal(_) => PrimitiveKind::Decimal,
            Value::Char(_) => PrimitiveKind::Char,
            Value::Bytes(_) => PrimitiveKind::Bytes,
            Value::Date(_) => PrimitiveKind::Date,
            Value::Time(_) => PrimitiveKind::Time,
            Value::DateTime(_) => PrimitiveKind::DateTime,
            Value::Duration(_) => PrimitiveKind::Duration,
            Value::Instant(_) => PrimitiveKind::Instant,
            Value::Uuid(_) => PrimitiveKind::Uuid,
            _ => return None,
        })
    }

    /// Short description of the value's shape, for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        if let Some(kind) = self.primitive_kind() {
            return kind.name();
        }
        match self {
            Value::Null => "null",
            Value::String(_) => "string",
            Value::Object(_) => "object",
            Value::Seq(_) => "sequence",
            Value::Grid(_) => "multi-rank array",
            Value::Set(_) => "set",
            Value::Map(_) => "map",
            _ => "scalar",
        }
    }

    fn as_integer(&self) -> Option<i128> {
        match self {
            Value::I8(v) => Some(i128::from(*v)),
            Value::I16(v) => Some(i128::from(*v)),
            Value::I32(v) => Some(i128::from(*v)),
            Value::I64(v) => Some(i128::from(*v)),
            Value::I128(v) => Some(*v),
            Value::U8(v) => Some(i128::from(*v)),
            Value::U16(v) => Some(i128::from(*v)),
            Value::U32(v) => Some(i128::from(*v)),
            Value::U64(v) => Some(i128::from(*v)),
            Value::U128(v) => i128::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Convert a scalar to a wider kind. `None` if the value is not a scalar
    /// or does not fit the target.
    pub fn widen(&self, to: PrimitiveKind) -> Option<Value> {
        if self.primitive_kind() == Some(to) {
            return Some(self.clone());
        }
        if let Some(int) = self.as_integer() {
            return match to {
                PrimitiveKind::I8 => i8::try_from(int).ok().map(Value::I8),
                PrimitiveKind::I16 => i16::try_from(int).ok().map(Value::I16),
                PrimitiveKind::I32 => i32::try_from(int).ok().map(Value::I32),
                PrimitiveKind::I64 => i64::try_from(int).ok().map(Value::I64),
                PrimitiveKind::I128 => Some(Value::I128(int)),
                PrimitiveKind::U8 => u8::try_from(int).ok().map(Value::U8),
                PrimitiveKind::U16 => u16::try_from(int).ok().map(Value::U16),
                PrimitiveKind::U32 => u32::try_from(int).ok().map(Value::U32),
                PrimitiveKind::U64 => u64::try_from(int).ok().map(Value::U64),
                PrimitiveKind::U128 => u128::try_from(int).ok().map(Value::U128),
                PrimitiveKind::F32 => Some(Value::F32(int as f32)),
                PrimitiveKind::F64 => Some(Value::F64(int as f64)),
                PrimitiveKind::Decimal => Some(Value::Decimal(Decimal::from_i128(int))),
                _ => None,
            };
        }
        match (self, to) {
            (Value::F32(v), PrimitiveKind::F64) => Some(Value::F64(f64::from(*v))),
            (Value::Date(d), PrimitiveKind::DateTime) => {
                Some(Value::DateTime(d.and_time(NaiveTime::default())))
            }
            _ => None,
        }
    }
}

impl PrimitiveKind {
    /// Default value of the kind: zero, false, empty, nil, or the Unix epoch.
    pub fn default_value(self) -> Value {
        match self {
            PrimitiveKind::Bool => Value::Bool(false),
            PrimitiveKind::I8 => Value::I8(0),
            PrimitiveKind::I16 => Value::I16(0),
            PrimitiveKind::I32 => Value::I32(0),
            PrimitiveKind::I64 => Value::I64(0),
            PrimitiveKind::I128 => Value::I128(0),
            PrimitiveKind::U8 => Value::U8(0),
            PrimitiveKind::U16 => Value::U16(0),
            PrimitiveKind::U32 => Value::U32(0),
            PrimitiveKind::U64 => Value::U64(0),
            PrimitiveKind::U128 => Value::U128(0),
            PrimitiveKind::F32 => Value::F32(0.0),
            PrimitiveKind::F64 => Value::F64(0.0),
            PrimitiveKind::Decimal => Value::Decimal(Decimal::ZERO),
            PrimitiveKind::Char => Value::Char('\0'),
            PrimitiveKind::Bytes => Value::Bytes(Vec::new()),
            PrimitiveKind::Date => Value::Date(NaiveDate::default()),
            PrimitiveKind::Time => Value::Time(NaiveTime::default()),
            PrimitiveKind::DateTime => Value::DateTime(NaiveDateTime::default()),
            PrimitiveKind::Duration => Value::Duration(TimeDelta::zero()),
            PrimitiveKind::Instant => Value::Instant(DateTime::<Utc>::default()),
            PrimitiveKind::Uuid => Value::Uuid(Uuid::nil()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        use Value::*;
        match (self, other) {
            (Null, Null) => true,
            (Bool(a), Bool(b)) => a == b,
            (I8(a), I8(b)) => a == b,
            (I16(a), I16(b)) => a == b,
            (I32(a), I32(b)) => a == b,
            (I64(a), I64(b)) => a == b,
            (I128(a), I128(b)) => a == b,
            (U8(a), U8(b)) => a == b,
            (U16(a), U16(b)) => a == b,
            (U32(a), U32(b)) => a == b,
            (U64(a), U64(b)) => a == b,
            (U128(a), U128(b)) => a == b,
            (F32(a), F32(b)) => a.to_bits() == b.to_bits(),
            (F64(a), F64(b)) => a.to_bits() == b.to_bits(),
            (Decimal(a), Decimal(b)) => a == b,
            (Char(a), Char(b)) => a == b,
            (Bytes(a), Bytes(b)) => a == b,
            (Date(a), Date(b)) => a == b,
            (Time(a), Time(b)) => a == b,
            (DateTime(a), DateTime(b)) => a == b,
            (Duration(a), Duration(b)) => a == b,
            (Instant(a), Instant(b)) => a == b,
            (Uuid(a), Uuid(b)) => a == b,
            (String(a), String(b)) => a == b,
            (Object(a), Object(b)) => a == b,
            (Seq(a), Seq(b)) => a == b,
            (Grid(a), Grid(b)) => a == b,
            (Set(a), Set(b)) => a == b,
            (Map(a), Map(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        use Value::*;
        std::mem::discriminant(self).hash(state);
        match self {
            Null => {}
            Bool(v) => v.hash(state),
            I8(v) => v.hash(state),
            I16(v) => v.hash(state),
            I32(v) => v.hash(state),
            I64(v) => v.hash(state),
            I128(v) => v.hash(state),
            U8(v) => v.hash(state),
            U16(v) => v.hash(state),
            U32(v) => v.hash(state),
            U64(v) => v.hash(state),
            U128(v) => v.hash(state),
            F32(v) => v.to_bits().hash(state),
            F64(v) => v.to_bits().hash(state),
            Decimal(v) => v.hash(state),
            Char(v) => v.hash(state),
            Bytes(v) => v.hash(state),
            Date(v) => v.hash(state),
            Time(v) => v.hash(state),
            DateTime(v) => v.hash(state),
            Duration(v) => v.hash(state),
            Instant(v) => v.hash(state),
            Uuid(v) => v.hash(state),
            String(v) => v.hash(state),
            Seq(v) => v.hash(state),
            Grid(v) => v.hash(state),
            // Set, map and object equality ignore order; hash what order can't change.
            Object(v) => {
                v.type_ref.hash(state);
                v.fields.len().hash(state);
            }
            Set(v) => v.len().hash(state),
            Map(v) => v.len().hash(state),
        }
    }
}

// =============================================================================
// Object
// =============================================================================

/// An instance of a Complex type: its runtime type plus named member values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Object {
    type_ref: TypeRef,
    fields: IndexMap<String, Value>,
}

impl Object {
    /// An empty instance of the registered type `type_name`.
    pub fn new(type_name: impl Into<String>) -> Self {
        Self::of(TypeRef::named(type_name))
    }

    /// An empty instance of a (possibly generic) registered type.
    pub fn of(type_ref: TypeRef) -> Self {
        Self {
            type_ref: type_ref.non_optional().clone(),
            fields: IndexMap::new(),
        }
    }

    /// Builder: set a member value.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Runtime type of the instance.
    pub fn type_ref(&self) -> &TypeRef {
        &self.type_ref
    }

    /// Name of the registered definition.
    pub fn type_name(&self) -> &str {
        self.type_ref.def_name().unwrap_or_default()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

// =============================================================================
// Grid
// =============================================================================

/// Rectangular multi-rank array stored row-major.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Grid {
    dims: Vec<usize>,
    items: Vec<Value>,
}

impl Grid {
    /// `None` unless the product of `dims` equals the number of items.
    pub fn new(dims: Vec<usize>, items: Vec<Value>) -> Option<Self> {
        let size = dims.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))?;
        (size == items.len() && !dims.is_empty()).then_some(Self { dims, items })
    }

    /// A rank-2 grid from equally long rows.
    pub fn from_rows(rows: Vec<Vec<Value>>) -> Option<Self> {
        let width = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|row| row.len() != width) {
            return None;
        }
        let height = rows.len();
        Self::new(vec![height, width], rows.into_iter().flatten().collect())
    }

    /// A single-column grid: dims `[n, 1, ..]` with `rank` dimensions.
    pub fn column(items: Vec<Value>, rank: u8) -> Self {
        let mut dims = vec![1; usize::from(rank.max(1))];
        dims[0] = items.len();
        Self { dims, items }
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn items(&self) -> &[Value] {
        &self.items
    }

    /// Element at the given coordinates.
    pub fn get(&self, index: &[usize]) -> Option<&Value> {
        if index.len() != self.dims.len() {
            return None;
        }
        let mut offset = 0;
        for (i, d) in index.iter().zip(&self.dims) {
            if i >= d {
                return None;
            }
            offset = offset * d + i;
        }
        self.items.get(offset)
    }
}

// =============================================================================
// Conversions
// =============================================================================

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Value::$variant(value)
                }
            }
        )*
    };
}

value_from! {
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
    NaiveDate => Date,
    NaiveTime => Time,
    NaiveDateTime => DateTime,
    TimeDelta => Duration,
    DateTime<Utc> => Instant,
    Uuid => Uuid,
    String => String,
    Object => Object,
    Grid => Grid,
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Seq(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> FromIterator<T> for Value {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Value::Seq(iter.into_iter().map(Into::into).collect())
    }
}

impl Value {
    /// A set from the given elements, in first-seen order.
    pub fn set_of<T: Into<Value>>(items: impl IntoIterator<Item = T>) -> Value {
        Value::Set(items.into_iter().map(Into::into).collect())
    }

    /// A map from the given entries, in insertion order.
    pub fn map_of<K: Into<Value>, V: Into<Value>>(entries: impl IntoIterator<Item = (K, V)>) -> Value {
        Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

#[cfg(test)]
#[path = "../tests/value_tests.rs"]
mod tests;
