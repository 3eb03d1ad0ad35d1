//! Mapping-plan engine for the morph object adapter.
//!
//! The engine projects instances of one structural type onto another by
//! matching member names. Work is split into two phases:
//!
//! - **Planning**: a (source, destination) pair is described, its members
//!   matched, and a per-member conversion [`Strategy`] chosen. The resulting
//!   [`MappingPlan`] is cached for the lifetime of the [`Engine`] and built at
//!   most once, even under concurrent first use.
//! - **Execution**: plans are run against source values, dispatching nested
//!   objects on their runtime type.
//!
//! Recursive type graphs are supported: a nested pair that is already being
//! planned is referenced lazily by key instead of being rebuilt.
mod builder;
pub mod cache;
mod containers;
pub mod decimal;
mod defaults;
pub mod describe;
pub mod diagnostics;
mod dispatch;
mod engine;
pub mod error;
mod execute;
mod matcher;
pub mod plan;
mod query_trace;
pub mod recursion;
pub mod registry;
pub mod strategy;
pub mod types;
pub mod value;

pub use cache::CacheStatsSnapshot;
pub use decimal::Decimal;
pub use describe::{DescriptorKind, MemberDescriptor, TypeDescriptor};
pub use diagnostics::{DiagnosticCategory, PlanDiagnostic};
pub use engine::{AdaptMany, Engine, EngineConfig};
pub use error::{MapError, Result};
pub use plan::{MappingPlan, MemberMapping, PlanKey, PlanReport, PlanStatus};
pub use registry::TypeRegistry;
pub use strategy::{ScalarCast, ScalarKind, Strategy, UnmappableReason};
pub use types::{DefKind, Describe, MemberDef, PrimitiveKind, SeqShape, TypeDef, TypeKey, TypeRef};
pub use value::{Grid, Object, Value};

#[cfg(test)]
#[path = "../tests/test_fixtures.rs"]
pub(crate) mod test_fixtures;
