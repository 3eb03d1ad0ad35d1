//! Mapping plan construction.
//!
//! A [`PlanBuilder`] lives for one top-level plan request. It claims cache
//! slots, runs the matcher and selector for each claimed pair, and answers the
//! selector's nested requests:
//!
//! - a pair whose required members lead back to itself is an
//!   `UnresolvableCycle`, decided from the descriptor graph alone;
//! - a pair already being built, on this thread or another, becomes a lazy
//!   reference once that check passes;
//! - a finished pair is referenced directly;
//! - anything else is built recursively, depth first.
//!
//! A failed nested pair degrades the member that asked for it. Only the
//! depth limit aborts the enclosing plan.

use crate::cache::{BuildTicket, Claim, PlanCache};
use crate::describe::{DescriptorKind, Extractor, MemberDescriptor, TypeDescriptor};
use crate::diagnostics::{PlanDiagnostic, diagnostic_codes};
use crate::error::{MapError, Result};
use crate::matcher::match_members;
use crate::plan::{MappingPlan, MemberMapping, PlanKey, PlanStatus};
use crate::recursion::{RecursionGuard, RecursionProfile, RecursionResult};
use crate::strategy::{NestedPlanner, Selector, Strategy};
use crate::types::TypeRef;
use rustc_hash::FxHashSet;
use std::sync::Arc;
use tracing::{debug, trace};

/// A matched member whose destination is a non-nullable Complex value.
struct RequiredEdge {
    member: String,
    source: Arc<TypeDescriptor>,
    dest: Arc<TypeDescriptor>,
}

impl RequiredEdge {
    fn key(&self) -> PlanKey {
        PlanKey::new(self.source.key, self.dest.key)
    }
}

pub struct PlanBuilder<'e> {
    extractor: Extractor<'e>,
    cache: &'e PlanCache,
    guard: RecursionGuard<PlanKey>,
}

impl<'e> PlanBuilder<'e> {
    pub fn new(extractor: Extractor<'e>, cache: &'e PlanCache, profile: RecursionProfile) -> Self {
        Self {
            extractor,
            cache,
            guard: RecursionGuard::with_profile(profile),
        }
    }

    /// The cached plan for a Complex pair, building it on a
    /// miss and waiting when another thread is already building it.
    pub fn get_or_build(&mut self, source: &TypeRef, dest: &TypeRef) -> Result<Arc<MappingPlan>> {
        let source = self.extractor.describe(source.non_optional())?;
        let dest = self.extractor.describe(dest.non_optional())?;
        let key = PlanKey::new(source.key, dest.key);
        let names = || (source.name.to_string(), dest.name.to_string());

        match self.cache.claim(key, names) {
            Claim::Done(result) => result,
            Claim::InProgress(slot) => {
                trace!(source = %source.name, dest = %dest.name, "waiting for plan built elsewhere");
                self.cache.wait(&slot, names)
            }
            Claim::Build(ticket) => self.build_claimed(ticket, &source, &dest),
        }
    }

    fn build_claimed(
        &mut self,
        ticket: BuildTicket<'_>,
        source: &TypeDescriptor,
        dest: &TypeDescriptor,
    ) -> Result<Arc<MappingPlan>> {
        let key = ticket.key();
        let result = match self.guard.enter(key) {
            RecursionResult::Entered => {
                let built = self.build_plan(key, source, dest);
                self.guard.leave(key);
                built.map(Arc::new)
            }
            RecursionResult::Cycle => Err(MapError::UnresolvableCycle {
                path: vec![source.name.to_string(), dest.name.to_string()],
            }),
            RecursionResult::DepthExceeded | RecursionResult::IterationExceeded => Err(self.depth_error()),
        };
        ticket.complete(result)
    }

    fn build_plan(&mut self, key: PlanKey, source: &TypeDescriptor, dest: &TypeDescriptor) -> Result<MappingPlan> {
        let (Some(source_shape), Some(dest_shape)) = (source.complex(), dest.complex()) else {
            return Err(MapError::IncompatibleTypes {
                source_type: source.name.to_string(),
                dest_type: dest.name.to_string(),
                reason: "plans are built for Complex pairs only".to_string(),
            });
        };
        let (source_shape, dest_shape) = (Arc::clone(source_shape), Arc::clone(dest_shape));
        let matches = match_members(&source_shape, &dest_shape)?;
        if let Some(path) = self.required_cycle(key, source, dest) {
            return Err(MapError::UnresolvableCycle { path });
        }

        let mut members = Vec::with_capacity(matches.len());
        let mut diagnostics = Vec::new();
        let mut status = PlanStatus::Ready;

        for matched in &matches {
            let strategy = Selector::new(self).select_member(matched)?;

            if let Strategy::Unmappable(reason) = &strategy {
                let (from, to) = reason.types().unwrap_or(("", ""));
                let cause = reason.cause().unwrap_or("");
                diagnostics.push(PlanDiagnostic::new(reason.code(), &matched.dest.name, &[from, to, cause]));
                if !self.has_safe_default(matched.dest)? {
                    diagnostics.push(PlanDiagnostic::new(
                        diagnostic_codes::NO_SAFE_DEFAULT,
                        &matched.dest.name,
                        &[matched.dest.ty.to_string().as_str()],
                    ));
                    status = PlanStatus::Unresolvable;
                }
            }

            members.push(MemberMapping {
                source_member: matched.source.map(|m| m.name.clone()),
                dest_member: matched.dest.name.clone(),
                dest_ty: matched.dest.ty.clone(),
                strategy,
            });
        }

        debug!(
            source = %source.name,
            dest = %dest.name,
            members = members.len(),
            diagnostics = diagnostics.len(),
            %status,
            "plan built"
        );

        Ok(MappingPlan {
            key,
            source_ty: source.ty.clone(),
            dest_ty: dest.ty.clone(),
            source_name: Arc::clone(&source.name),
            dest_name: Arc::clone(&dest.name),
            dest_concrete: dest_shape.is_concrete(),
            members,
            diagnostics,
            status,
        })
    }

    /// An unmappable member keeps its default, which does not exist for a
    /// non-nullable abstract or interface type.
    fn has_safe_default(&self, member: &MemberDescriptor) -> Result<bool> {
        let desc = self.extractor.describe_member(member)?;
        let desc = desc.resolved();
        Ok(match &desc.kind {
            DescriptorKind::Complex(shape) => desc.nullable || shape.is_concrete(),
            _ => true,
        })
    }

    fn depth_error(&self) -> MapError {
        MapError::DepthExceeded {
            what: "nested plan construction",
            limit: self.guard.max_depth(),
        }
    }

    /// Members of `dest` that must hold a nested Complex value. A pair whose
    /// members cannot be matched or described has no edges here; it fails
    /// when it is built.
    fn required_edges(&self, source: &TypeDescriptor, dest: &TypeDescriptor) -> Vec<RequiredEdge> {
        let (Some(source_shape), Some(dest_shape)) = (source.complex(), dest.complex()) else {
            return Vec::new();
        };
        let Ok(matches) = match_members(source_shape, dest_shape) else {
            return Vec::new();
        };
        matches
            .iter()
            .filter_map(|matched| {
                let source_member = self.extractor.describe_member(matched.source?).ok()?;
                let dest_member = self.extractor.describe_member(matched.dest).ok()?;
                let (source_member, dest_member) = (source_member.resolved(), dest_member.resolved());
                if dest_member.nullable || source_member.complex().is_none() || dest_member.complex().is_none() {
                    return None;
                }
                Some(RequiredEdge {
                    member: matched.dest.name.clone(),
                    source: self.extractor.describe(source_member.ty.non_optional()).ok()?,
                    dest: self.extractor.describe(dest_member.ty.non_optional()).ok()?,
                })
            })
            .collect()
    }

    /// The member path of a cycle of required edges through `start`, if any.
    ///
    /// Only the descriptor graph is consulted, so the answer does not depend on
    /// which pairs are cached or being built.
    fn required_cycle(&self, start: PlanKey, source: &TypeDescriptor, dest: &TypeDescriptor) -> Option<Vec<String>> {
        let mut visited = FxHashSet::default();
        let mut path = Vec::new();
        if self.find_required_cycle(start, source, dest, &mut visited, &mut path) {
            path.push(dest.name.to_string());
            return Some(path);
        }
        None
    }

    fn find_required_cycle(
        &self,
        start: PlanKey,
        source: &TypeDescriptor,
        dest: &TypeDescriptor,
        visited: &mut FxHashSet<PlanKey>,
        path: &mut Vec<String>,
    ) -> bool {
        if path.len() >= self.guard.max_depth() as usize {
            return false;
        }
        for edge in self.required_edges(source, dest) {
            let key = edge.key();
            path.push(format!("{}.{}", dest.name, edge.member));
            if key == start {
                return true;
            }
            if visited.insert(key) && self.find_required_cycle(start, &edge.source, &edge.dest, visited, path) {
                return true;
            }
            path.pop();
        }
        false
    }

    /// The checks a build of this pair would fail on before selecting any
    /// strategy. Used when another builder owns the pair.
    fn preflight(&self, key: PlanKey, source: &TypeDescriptor, dest: &TypeDescriptor) -> Result<()> {
        if let (Some(source_shape), Some(dest_shape)) = (source.complex(), dest.complex()) {
            for matched in match_members(source_shape, dest_shape)? {
                if let Some(source_member) = matched.source {
                    self.extractor.describe_member(source_member)?;
                }
                self.extractor.describe_member(matched.dest)?;
            }
        }
        match self.required_cycle(key, source, dest) {
            Some(path) => Err(MapError::UnresolvableCycle { path }),
            None => Ok(()),
        }
    }
}

impl NestedPlanner for PlanBuilder<'_> {
    fn describe_member(&self, member: &MemberDescriptor) -> Result<Arc<TypeDescriptor>> {
        self.extractor.describe_member(member)
    }

    fn request_nested(&mut self, source: &TypeDescriptor, dest: &TypeDescriptor) -> Result<PlanKey> {
        let source = self.extractor.describe(source.ty.non_optional())?;
        let dest = self.extractor.describe(dest.ty.non_optional())?;
        let key = PlanKey::new(source.key, dest.key);

        // On our own stack: its required-cycle check already passed.
        if self.guard.is_visiting(&key) {
            trace!(source = %source.name, dest = %dest.name, "cycle: lazy self-reference");
            self.cache.note_lazy_reference();
            return Ok(key);
        }

        match self.cache.claim(key, || (source.name.to_string(), dest.name.to_string())) {
            Claim::Done(Ok(_)) => Ok(key),
            Claim::Done(Err(err)) => Err(err),
            Claim::InProgress(_) => {
                self.preflight(key, &source, &dest)?;
                trace!(source = %source.name, dest = %dest.name, "building elsewhere: lazy reference");
                self.cache.note_lazy_reference();
                Ok(key)
            }
            Claim::Build(ticket) => {
                self.build_claimed(ticket, &source, &dest)?;
                Ok(key)
            }
        }
    }
}

#[cfg(test)]
#[path = "../tests/builder_tests.rs"]
mod tests;
