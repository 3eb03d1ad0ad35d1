//! Engine errors.
//!
//! Every failure the engine reports is a [`MapError`]. Errors are `Clone` so a
//! failed plan build can be cached and handed to every later requester of the
//! same pair.

use thiserror::Error;

pub type Result<T, E = MapError> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MapError {
    /// A type cannot be described (open generic, no members, too deep).
    #[error("type `{type_name}` cannot be described: {reason}")]
    UnsupportedTypeShape { type_name: String, reason: String },

    /// More than one source member matches a destination member once case is ignored.
    #[error(
        "destination member `{member}` of `{dest_type}` matches several members of `{source_type}`: {}",
        .candidates.join(", ")
    )]
    AmbiguousMemberMatch {
        source_type: String,
        dest_type: String,
        member: String,
        candidates: Vec<String>,
    },

    /// Top-level scalar pair with no safe conversion.
    #[error("no lossless conversion from `{source_type}` to `{dest_type}`")]
    IncompatibleScalarTypes {
        source_type: String,
        dest_type: String,
    },

    /// Top-level pair whose shapes cannot be mapped at all.
    #[error("cannot map `{source_type}` to `{dest_type}`: {reason}")]
    IncompatibleTypes {
        source_type: String,
        dest_type: String,
        reason: String,
    },

    /// A cycle of members that must all be populated.
    #[error("required members form a cycle: {}", .path.join(" -> "))]
    UnresolvableCycle { path: Vec<String> },

    /// A plan failed to build; `cause` holds the underlying error.
    #[error("failed to build plan `{source_type}` -> `{dest_type}`: {cause}")]
    PlanBuildFailure {
        source_type: String,
        dest_type: String,
        #[source]
        cause: Box<MapError>,
    },

    /// The thread building this plan unwound before finishing it.
    #[error("plan build for `{source_type}` -> `{dest_type}` was abandoned")]
    BuildAbandoned {
        source_type: String,
        dest_type: String,
    },

    #[error("type `{name}` is not registered")]
    UnknownType { name: String },

    #[error("type `{name}` is already registered with a different definition")]
    DuplicateType { name: String },

    #[error("type `{name}` inherits from itself")]
    InheritanceCycle { name: String },

    #[error("type `{name}` expects {expected} generic argument(s), found {found}")]
    GenericArity {
        name: String,
        expected: usize,
        found: usize,
    },

    /// The runtime value does not have the shape its declared type promises.
    #[error("member `{member}`: expected {expected}, found {found}")]
    InstanceMismatch {
        member: String,
        expected: String,
        found: String,
    },

    #[error("{what} exceeded the depth limit of {limit}")]
    DepthExceeded { what: &'static str, limit: u32 },

    /// Validation reported diagnostics that make the pair unusable.
    #[error(
        "mapping `{source_type}` -> `{dest_type}` is invalid:\n  {}",
        .diagnostics.join("\n  ")
    )]
    InvalidConfiguration {
        source_type: String,
        dest_type: String,
        diagnostics: Vec<String>,
    },

    #[error("invalid type definition: {0}")]
    DefinitionParse(String),
}

impl MapError {
    /// Wrap `self` as the cause of a failed plan build, unless it already is one.
    pub fn into_build_failure(self, source_type: &str, dest_type: &str) -> MapError {
        match self {
            already @ MapError::PlanBuildFailure { .. } => already,
            cause => MapError::PlanBuildFailure {
                source_type: source_type.to_string(),
                dest_type: dest_type.to_string(),
                cause: Box::new(cause),
            },
        }
    }

    /// The innermost error, looking through `PlanBuildFailure` wrappers.
    pub fn root_cause(&self) -> &MapError {
        match self {
            MapError::PlanBuildFailure { cause, .. } => cause.root_cause(),
            other => other,
        }
    }
}

impl From<serde_json::Error> for MapError {
    fn from(err: serde_json::Error) -> Self {
        MapError::DefinitionParse(err.to_string())
    }
}
