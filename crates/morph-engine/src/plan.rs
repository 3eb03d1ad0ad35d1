//! Mapping plans.
//!
//! A [`MappingPlan`] is the finalized, reusable list of per-member conversion
//! instructions for one (source, destination) Complex type pair. Plans are
//! immutable once published to the cache.

use crate::diagnostics::PlanDiagnostic;
use crate::strategy::Strategy;
use crate::types::{TypeKey, TypeRef};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Cache key of a plan: the (source, destination) type keys.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PlanKey {
    pub source: TypeKey,
    pub dest: TypeKey,
}

impl PlanKey {
    pub const fn new(source: TypeKey, dest: TypeKey) -> Self {
        Self { source, dest }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum PlanStatus {
    /// Placeholder published while the plan is being built.
    Building,
    Ready,
    /// Built, but at least one member cannot be mapped and has no safe default.
    Unresolvable,
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PlanStatus::Building => "building",
            PlanStatus::Ready => "ready",
            PlanStatus::Unresolvable => "unresolvable",
        })
    }
}

/// Conversion of one writable destination member.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemberMapping {
    pub source_member: Option<String>,
    pub dest_member: String,
    pub dest_ty: TypeRef,
    pub strategy: Strategy,
}

#[derive(Clone, Debug)]
pub struct MappingPlan {
    pub key: PlanKey,
    pub source_ty: TypeRef,
    pub dest_ty: TypeRef,
    pub source_name: Arc<str>,
    pub dest_name: Arc<str>,
    /// Whether the destination can be default-constructed directly.
    pub dest_concrete: bool,
    /// In destination declaration order.
    pub members: Vec<MemberMapping>,
    pub diagnostics: Vec<PlanDiagnostic>,
    pub status: PlanStatus,
}

impl MappingPlan {
    pub fn is_ready(&self) -> bool {
        self.status == PlanStatus::Ready
    }

    pub fn member(&self, dest_member: &str) -> Option<&MemberMapping> {
        self.members.iter().find(|m| m.dest_member == dest_member)
    }

    /// Serializable summary for tooling.
    pub fn report(&self) -> PlanReport {
        PlanReport {
            source: self.source_name.to_string(),
            dest: self.dest_name.to_string(),
            status: self.status,
            members: self
                .members
                .iter()
                .map(|m| MemberReport {
                    dest_member: m.dest_member.clone(),
                    source_member: m.source_member.clone(),
                    dest_type: m.dest_ty.to_string(),
                    strategy: m.strategy.name(),
                    detail: m.strategy.to_string(),
                })
                .collect(),
            diagnostics: self.diagnostics.clone(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct PlanReport {
    pub source: String,
    pub dest: String,
    pub status: PlanStatus,
    pub members: Vec<MemberReport>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<PlanDiagnostic>,
}

#[derive(Clone, Debug, Serialize)]
pub struct MemberReport {
    pub dest_member: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_member: Option<String>,
    pub dest_type: String,
    pub strategy: &'static str,
    pub detail: String,
}
