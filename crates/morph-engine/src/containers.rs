//! Container reconciliation.
//!
//! Sources are read through [`elements`] / [`entries`] regardless of their
//! concrete shape; destinations are always rebuilt fresh by a
//! [`ContainerTarget`]. A multi-rank destination keeps the source dimensions
//! when the ranks agree, and otherwise receives the elements as a single
//! column (`[n, 1, ..]`).

use crate::describe::{DescriptorKind, TypeDescriptor};
use crate::error::{MapError, Result};
use crate::types::SeqShape;
use crate::value::{Grid, Value};
use indexmap::{IndexMap, IndexSet};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ContainerFamily {
    Sequence(SeqShape),
    Set,
    Mapping,
}

/// The destination side of a container strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ContainerTarget {
    pub family: ContainerFamily,
    pub nullable: bool,
}

impl ContainerTarget {
    pub fn from_descriptor(desc: &TypeDescriptor) -> Option<Self> {
        let family = match &desc.resolved().kind {
            DescriptorKind::Sequence { shape, .. } => ContainerFamily::Sequence(*shape),
            DescriptorKind::Set { .. } => ContainerFamily::Set,
            DescriptorKind::Mapping { .. } => ContainerFamily::Mapping,
            _ => return None,
        };
        Some(Self {
            family,
            nullable: desc.nullable,
        })
    }

    /// Result for a null source container: null when the destination admits
    /// it, an empty container otherwise.
    pub fn absent(&self) -> Value {
        if self.nullable { Value::Null } else { self.empty() }
    }

    pub fn empty(&self) -> Value {
        match self.family {
            ContainerFamily::Sequence(SeqShape::MultiRank(rank)) => {
                Value::Grid(Grid::column(Vec::new(), rank))
            }
            ContainerFamily::Sequence(_) => Value::Seq(Vec::new()),
            ContainerFamily::Set => Value::Set(IndexSet::new()),
            ContainerFamily::Mapping => Value::Map(IndexMap::new()),
        }
    }

    /// Build the destination container from converted elements.
    ///
    /// `source_dims` are the dimensions of a multi-rank source, if any.
    pub fn rebuild(&self, items: Vec<Value>, source_dims: Option<&[usize]>) -> Result<Value> {
        match self.family {
            ContainerFamily::Sequence(SeqShape::MultiRank(rank)) => match source_dims {
                Some(dims) if dims.len() == usize::from(rank) => Grid::new(dims.to_vec(), items)
                    .map(Value::Grid)
                    .ok_or_else(|| MapError::InstanceMismatch {
                        member: String::new(),
                        expected: format!("{rank}-rank array"),
                        found: "array with inconsistent dimensions".to_string(),
                    }),
                _ => Ok(Value::Grid(Grid::column(items, rank))),
            },
            ContainerFamily::Sequence(_) => Ok(Value::Seq(items)),
            ContainerFamily::Set => Ok(Value::Set(items.into_iter().collect())),
            ContainerFamily::Mapping => Err(MapError::InstanceMismatch {
                member: String::new(),
                expected: "map entries".to_string(),
                found: "sequence elements".to_string(),
            }),
        }
    }

    pub fn rebuild_map(&self, entries: Vec<(Value, Value)>) -> Value {
        Value::Map(entries.into_iter().collect())
    }
}

impl fmt::Display for ContainerTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self.family {
            ContainerFamily::Sequence(SeqShape::Array) => "Array".to_string(),
            ContainerFamily::Sequence(SeqShape::MultiRank(rank)) => format!("Array{rank}"),
            ContainerFamily::Sequence(SeqShape::List) => "List".to_string(),
            ContainerFamily::Sequence(SeqShape::ReadOnly) => "ReadOnly".to_string(),
            ContainerFamily::Set => "Set".to_string(),
            ContainerFamily::Mapping => "Map".to_string(),
        };
        if self.nullable {
            write!(f, "Option<{name}>")
        } else {
            f.write_str(&name)
        }
    }
}

/// Borrowing iterator over the elements of any sequence-like value.
pub enum Elements<'v> {
    Slice(std::slice::Iter<'v, Value>),
    Set(indexmap::set::Iter<'v, Value>),
}

impl<'v> Iterator for Elements<'v> {
    type Item = &'v Value;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Elements::Slice(iter) => iter.next(),
            Elements::Set(iter) => iter.next(),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self {
            Elements::Slice(iter) => iter.size_hint(),
            Elements::Set(iter) => iter.size_hint(),
        }
    }
}

impl ExactSizeIterator for Elements<'_> {}

/// Elements of a sequence, grid, or set value, with the grid's dimensions.
pub fn elements(value: &Value) -> Option<(Elements<'_>, Option<&[usize]>)> {
    match value {
        Value::Seq(items) => Some((Elements::Slice(items.iter()), None)),
        Value::Grid(grid) => Some((Elements::Slice(grid.items().iter()), Some(grid.dims()))),
        Value::Set(items) => Some((Elements::Set(items.iter()), None)),
        _ => None,
    }
}

pub fn entries(value: &Value) -> Option<indexmap::map::Iter<'_, Value, Value>> {
    match value {
        Value::Map(map) => Some(map.iter()),
        _ => None,
    }
}
