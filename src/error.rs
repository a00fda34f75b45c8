//! Error types for query_model.
//!
//! All errors that can occur while defining specs, building nodes, rewriting
//! graphs or generating SQL are represented by [`QueryModelError`]. Errors are
//! propagated via [`Result`] throughout the crate and surfaced unchanged to the
//! caller; nothing here logs or swallows them.
//!
//! # Error Classification
//!
//! Every error indicates a caller-side logic defect, so none is retryable.
//! Errors are still classified by the phase that raised them:
//! - **Definition**: malformed node specs or configuration.
//! - **Construction**: builder and copy operations given bad keys or values.
//! - **Navigation**: reference paths that do not resolve.
//! - **Generation**: a graph that cannot be rendered to SQL text.

use std::fmt;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, QueryModelError>;

/// Primary error type for the crate.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QueryModelError {
    // ── Definition errors ────────────────────────────────────────────────
    /// A node spec's template is malformed or declares a name both as a
    /// reference and as a placeholder.
    #[error("invalid node spec `{spec}`: {reason}")]
    SpecDefinition { spec: String, reason: String },

    /// A template has an unbalanced brace or an empty field.
    #[error("template syntax error: {0}")]
    TemplateSyntax(String),

    /// A materialization name did not match any variant.
    #[error("unknown materialization: {0}")]
    UnknownMaterialization(String),

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Construction errors ──────────────────────────────────────────────
    /// Missing references or a placeholder key set that differs from the
    /// declared one. Both lists are sorted.
    #[error(
        "incomplete `{spec}`: missing [{}], unexpected [{}]",
        .missing.join(", "),
        .unexpected.join(", ")
    )]
    IncompleteBuilder {
        spec: String,
        missing: Vec<String>,
        unexpected: Vec<String>,
    },

    /// `set_values` was given a key the spec declares neither as reference
    /// nor as placeholder.
    #[error("`{spec}` has no parameter named `{name}`")]
    UnknownParameter { spec: String, name: String },

    /// A value of the wrong kind was given for a reference or placeholder.
    #[error("type mismatch for `{name}`: {reason}")]
    TypeMismatch { name: String, reason: String },

    /// `copy_set` targeted a placeholder that the node does not have.
    #[error("node `{spec}` has no placeholder `{name}`")]
    UnknownPlaceholder { spec: String, name: String },

    /// `copy_link` targeted a reference that the node does not have.
    #[error("node `{spec}` has no reference `{name}`")]
    UnknownReference { spec: String, name: String },

    /// Instantiating builders recursively re-entered a builder that is
    /// still being instantiated.
    #[error("cyclic builder reference: {}", .0.join(" -> "))]
    CyclicBuilderReference(Vec<String>),

    // ── Navigation errors ────────────────────────────────────────────────
    /// A reference path did not resolve. `at` is the generic name of the
    /// node where the walk stopped.
    #[error("reference path [{}] not found: no `{missing}` on `{at}`", .path.join(", "))]
    PathNotFound {
        path: Vec<String>,
        missing: String,
        at: String,
    },

    // ── Generation errors ────────────────────────────────────────────────
    /// A template field had no value during substitution.
    #[error("no value for template field `{0}`")]
    MissingTemplateValue(String),

    /// A node that emits nothing was referenced by another node.
    #[error("`{referrer}` references `{name}`, which cannot be referenced")]
    NotReferenceable { referrer: String, name: String },

    /// Two different nodes would be given the same SQL name.
    #[error("two different nodes are both named `{alias}` in the generated SQL")]
    DuplicateAlias { alias: String },
}

/// Classification of an error by the phase that raised it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryModelErrorKind {
    Definition,
    Construction,
    Navigation,
    Generation,
}

impl fmt::Display for QueryModelErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryModelErrorKind::Definition => write!(f, "DEFINITION"),
            QueryModelErrorKind::Construction => write!(f, "CONSTRUCTION"),
            QueryModelErrorKind::Navigation => write!(f, "NAVIGATION"),
            QueryModelErrorKind::Generation => write!(f, "GENERATION"),
        }
    }
}

impl QueryModelError {
    /// Classify the error.
    pub fn kind(&self) -> QueryModelErrorKind {
        match self {
            QueryModelError::SpecDefinition { .. }
            | QueryModelError::TemplateSyntax(_)
            | QueryModelError::UnknownMaterialization(_)
            | QueryModelError::InvalidConfig(_) => QueryModelErrorKind::Definition,

            QueryModelError::IncompleteBuilder { .. }
            | QueryModelError::UnknownParameter { .. }
            | QueryModelError::TypeMismatch { .. }
            | QueryModelError::UnknownPlaceholder { .. }
            | QueryModelError::UnknownReference { .. }
            | QueryModelError::CyclicBuilderReference(_) => QueryModelErrorKind::Construction,

            QueryModelError::PathNotFound { .. } => QueryModelErrorKind::Navigation,

            QueryModelError::MissingTemplateValue(_)
            | QueryModelError::NotReferenceable { .. }
            | QueryModelError::DuplicateAlias { .. } => QueryModelErrorKind::Generation,
        }
    }

    /// Whether retrying the same call could succeed. Always `false`: every
    /// error here is deterministic in its inputs.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
