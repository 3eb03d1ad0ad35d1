//! Per-member plan diagnostics.
//!
//! Member-level problems never abort a plan. They degrade the member to its
//! default value and are recorded on the plan as [`PlanDiagnostic`]s, which
//! `Engine::validate` and `Engine::explain` surface to hosting tooling.
//!
//! Messages are templates with `{0}`, `{1}` placeholders, filled by
//! [`format_message`].

use serde::Serialize;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum DiagnosticCategory {
    Warning = 0,
    Error = 1,
    Message = 3,
}

/// Diagnostic codes.
pub mod diagnostic_codes {
    pub const UNMATCHED_DESTINATION_MEMBER: u32 = 1001;
    pub const INCOMPATIBLE_SCALAR_TYPES: u32 = 1002;
    pub const INCOMPATIBLE_MEMBER_SHAPES: u32 = 1003;
    pub const UNSUPPORTED_MAPPING_KEY: u32 = 1004;
    pub const NO_SAFE_DEFAULT: u32 = 1005;
    pub const NESTED_PLAN_FAILED: u32 = 1006;
}

#[derive(Clone, Copy, Debug)]
pub struct DiagnosticMessage {
    pub code: u32,
    pub category: DiagnosticCategory,
    pub message: &'static str,
}

pub static DIAGNOSTIC_MESSAGES: &[DiagnosticMessage] = &[
    DiagnosticMessage {
        code: diagnostic_codes::UNMATCHED_DESTINATION_MEMBER,
        category: DiagnosticCategory::Message,
        message: "No readable source member matches '{0}'; it keeps its default value.",
    },
    DiagnosticMessage {
        code: diagnostic_codes::INCOMPATIBLE_SCALAR_TYPES,
        category: DiagnosticCategory::Warning,
        message: "Member '{0}' cannot be converted losslessly from '{1}' to '{2}'.",
    },
    DiagnosticMessage {
        code: diagnostic_codes::INCOMPATIBLE_MEMBER_SHAPES,
        category: DiagnosticCategory::Warning,
        message: "Member '{0}' has incompatible shapes '{1}' and '{2}'.",
    },
    DiagnosticMessage {
        code: diagnostic_codes::UNSUPPORTED_MAPPING_KEY,
        category: DiagnosticCategory::Warning,
        message: "Member '{0}' maps keys of '{1}' to '{2}'; mapping keys must be scalars of the same kind.",
    },
    DiagnosticMessage {
        code: diagnostic_codes::NO_SAFE_DEFAULT,
        category: DiagnosticCategory::Error,
        message: "Member '{0}' of type '{1}' cannot be mapped and has no safe default.",
    },
    DiagnosticMessage {
        code: diagnostic_codes::NESTED_PLAN_FAILED,
        category: DiagnosticCategory::Warning,
        message: "Member '{0}' cannot be mapped: the plan from '{1}' to '{2}' could not be built ({3}).",
    },
];

/// Look up a diagnostic message definition by code.
#[must_use]
pub fn get_diagnostic_message(code: u32) -> Option<&'static DiagnosticMessage> {
    DIAGNOSTIC_MESSAGES.iter().find(|m| m.code == code)
}

/// Format a diagnostic message by replacing {0}, {1}, etc. with arguments.
#[must_use]
pub fn format_message(message: &str, args: &[&str]) -> String {
    let mut result = message.to_string();
    for (i, arg) in args.iter().enumerate() {
        result = result.replace(&format!("{{{i}}}"), arg);
    }
    result
}

/// A diagnostic recorded on a plan for one destination member.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PlanDiagnostic {
    pub code: u32,
    pub category: DiagnosticCategory,
    pub member: String,
    pub message: String,
}

impl PlanDiagnostic {
    /// Build a diagnostic from a registered code. The member name is always `{0}`.
    pub fn new(code: u32, member: &str, extra: &[&str]) -> Self {
        let mut args = Vec::with_capacity(extra.len() + 1);
        args.push(member);
        args.extend_from_slice(extra);
        let (category, message) = match get_diagnostic_message(code) {
            Some(def) => (def.category, format_message(def.message, &args)),
            None => (DiagnosticCategory::Error, format!("unknown diagnostic for '{member}'")),
        };
        Self {
            code,
            category,
            member: member.to_string(),
            message,
        }
    }

    /// Whether this diagnostic makes the mapping configuration invalid.
    pub fn is_problem(&self) -> bool {
        matches!(
            self.category,
            DiagnosticCategory::Warning | DiagnosticCategory::Error
        )
    }
}

impl fmt::Display for PlanDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "M{}: {}", self.code, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_unique() {
        let mut codes: Vec<_> = DIAGNOSTIC_MESSAGES.iter().map(|m| m.code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), DIAGNOSTIC_MESSAGES.len());
    }

    #[test]
    fn new_fills_member_then_extras() {
        let diag = PlanDiagnostic::new(
            diagnostic_codes::INCOMPATIBLE_SCALAR_TYPES,
            "Amount",
            &["string", "i32"],
        );
        assert_eq!(diag.category, DiagnosticCategory::Warning);
        assert_eq!(
            diag.to_string(),
            "M1002: Member 'Amount' cannot be converted losslessly from 'string' to 'i32'."
        );
        assert!(diag.is_problem());
    }

    #[test]
    fn unmatched_members_are_informational() {
        let diag = PlanDiagnostic::new(diagnostic_codes::UNMATCHED_DESTINATION_MEMBER, "Extra", &[]);
        assert_eq!(diag.category, DiagnosticCategory::Message);
        assert!(!diag.is_problem());
    }

    #[test]
    fn format_message_leaves_unused_placeholders() {
        assert_eq!(format_message("{0} and {1}", &["a"]), "a and {1}");
    }
}
