//! LZ-007: Error types.
//!
//! Every failure is structured data. Validation and reference resolution
//! collect all errors in one pass; the crate-level [`Error`] wraps the
//! collected lists.

use super::types::{NodeId, Partition, ResourceKind, Symbol};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// A schema or semantic violation at a field path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{path}: {kind}")]
pub struct ValidationError {
    /// Dotted path from the document root, e.g. `transitGateways[0].asn`
    pub path: String,
    pub kind: ValidationErrorKind,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, kind: ValidationErrorKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    pub fn semantic(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(path, ValidationErrorKind::Semantic(message.into()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationErrorKind {
    MissingField,
    UnknownField,
    TypeMismatch { expected: String, actual: String },
    NotInEnum { value: String, allowed: Vec<String> },
    OutOfRange { value: i64, min: i64, max: i64 },
    EmptyString,
    Semantic(String),
}

impl fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingField => write!(f, "required field is missing"),
            Self::UnknownField => write!(f, "unknown field"),
            Self::TypeMismatch { expected, actual } => {
                write!(f, "expected {}, got {}", expected, actual)
            }
            Self::NotInEnum { value, allowed } => {
                write!(f, "'{}' is not one of [{}]", value, allowed.join(", "))
            }
            Self::OutOfRange { value, min, max } => {
                write!(f, "{} is outside {}..={}", value, min, max)
            }
            Self::EmptyString => write!(f, "must not be empty"),
            Self::Semantic(msg) => write!(f, "{}", msg),
        }
    }
}

/// Failure loading one configuration document.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{document}: malformed document: {detail}")]
    MalformedDocument { document: String, detail: String },

    #[error("{document}: {error}")]
    Validation {
        document: String,
        error: ValidationError,
    },
}

impl ConfigError {
    /// The validation error, when this is one.
    pub fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            Self::Validation { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// A symbolic reference the directory could not resolve.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unresolved {symbol} referenced by {entity} at {path}{}", plural_occurrences(.other_occurrences))]
pub struct ResolutionError {
    pub symbol: Symbol,

    /// First entity referencing the symbol, e.g. `transit gateway 'Core'`
    pub entity: String,

    /// Field path of that first reference
    pub path: String,

    /// Further references to the same symbol
    pub other_occurrences: usize,
}

fn plural_occurrences(n: &usize) -> String {
    match *n {
        0 => String::new(),
        1 => " (and 1 other reference)".to_string(),
        n => format!(" (and {} other references)", n),
    }
}

/// A declaration or partition excluded from the plan.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("dependency cycle in {partition}: {}", .cycle.join(" -> "))]
    CyclicDependency {
        partition: Partition,
        cycle: Vec<NodeId>,
    },

    #[error("{kind} '{resource}' skipped: unresolved {}", join_symbols(.symbols))]
    UnresolvedTarget {
        kind: ResourceKind,
        resource: String,
        symbols: Vec<Symbol>,
    },

    #[error("{node} skipped: dependency '{dependency}' {}", dependency_reason(.excluded))]
    UnresolvedDependency {
        node: NodeId,
        dependency: String,
        excluded: bool,
    },
}

fn dependency_reason(excluded: &bool) -> &'static str {
    if *excluded {
        "was excluded from the plan"
    } else {
        "is neither in its partition nor provisioned"
    }
}

fn join_symbols(symbols: &[Symbol]) -> String {
    symbols
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Directory lookup or load failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectoryError {
    #[error("{kind} '{name}' not found in directory")]
    NotFound { kind: &'static str, name: String },

    #[error("cannot read directory {path}: {detail}")]
    Read { path: String, detail: String },

    #[error("invalid directory {path}: {detail}")]
    Parse { path: String, detail: String },
}

/// Failure reported by a plan emitter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct EmitError {
    pub message: String,
}

impl EmitError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// State, event log, or parameter store I/O failure.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("cannot access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid state file {}: {detail}", .path.display())]
    Parse { path: PathBuf, detail: String },

    #[error("serialize error: {0}")]
    Serialize(String),
}

/// Crate-level error.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{} configuration error(s)", .0.len())]
    Config(Vec<ConfigError>),

    #[error("{} unresolved reference(s)", .0.len())]
    Resolution(Vec<ResolutionError>),

    #[error("{} plan error(s)", .0.len())]
    Plan(Vec<PlanError>),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("{0} node(s) failed to emit")]
    Emission(u32),

    #[error("{0}")]
    Usage(String),
}

pub type Result<T> = std::result::Result<T, Error>;
