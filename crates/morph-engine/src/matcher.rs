//! Member matching.
//!
//! Pairs every writable destination member with the readable source member of
//! the same name, compared case-insensitively. Declared types are not
//! consulted here; the strategy selector judges compatibility.

use crate::describe::{ComplexShape, MemberDescriptor};
use crate::error::{MapError, Result};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

/// One destination member and the source member feeding it, if any.
#[derive(Clone, Copy, Debug)]
pub struct MemberMatch<'a> {
    pub source: Option<&'a MemberDescriptor>,
    pub dest: &'a MemberDescriptor,
}

/// Match members of `source` onto `dest`, in destination declaration order.
///
/// Read-only destination members are skipped. Fails with
/// `AmbiguousMemberMatch` when more than one readable source member folds to
/// a destination member's name.
pub fn match_members<'a>(source: &'a ComplexShape, dest: &'a ComplexShape) -> Result<Vec<MemberMatch<'a>>> {
    let mut by_name: FxHashMap<&str, SmallVec<[&MemberDescriptor; 2]>> = FxHashMap::default();
    for member in source.members.iter().filter(|m| m.is_readable()) {
        by_name.entry(member.folded.as_str()).or_default().push(member);
    }

    dest.members
        .iter()
        .filter(|m| m.is_writable())
        .map(|dest_member| match by_name.get(dest_member.folded.as_str()) {
            None => Ok(MemberMatch {
                source: None,
                dest: dest_member,
            }),
            Some(candidates) if candidates.len() == 1 => Ok(MemberMatch {
                source: Some(candidates[0]),
                dest: dest_member,
            }),
            Some(candidates) => Err(MapError::AmbiguousMemberMatch {
                source_type: source.def_name.clone(),
                dest_type: dest.def_name.clone(),
                member: dest_member.name.clone(),
                candidates: candidates.iter().map(|m| m.name.clone()).collect(),
            }),
        })
        .collect()
}

/// Number of destination members whose name (case-insensitively) appears
/// among the source members.
pub fn name_overlap(source: &ComplexShape, dest: &ComplexShape) -> usize {
    dest.members
        .iter()
        .filter(|d| source.members.iter().any(|s| s.folded == d.folded))
        .count()
}
