//! Error types for Atom conversion, patching and validation.

use thiserror::Error;

use crate::convert::ObjectGraph;
use crate::model::{AtomGraph, AtomKind, Id, ObjectAtom, VersionKey};

/// Stable error codes shared by every pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// A001: No factory or creator for a classname
    UnknownClass,
    /// A002: No structural patch bridges a version gap
    MissingPatch,
    /// A003: Unsupported map key kind
    InvalidMapKey,
    /// A004: Node re-entered while mid-patch
    CycleViolation,
    /// A005: Value accessed as the wrong variant
    TypeMismatch,
    /// A006: Attribute missing, or present when it must not be
    AttributeConflict,
    /// A007: Reference to an object absent from the graph
    DanglingReference,
    /// A008: A patch chain revisits a version key
    ChainLoop,
    /// A009: Identity conflict with the live object space
    IdentityConflict,
    /// A010: Failure reported by a patch or creator body
    PatchFailed,
}

impl ErrorCode {
    /// Returns the error code string (e.g., "A001").
    pub fn code(&self) -> &'static str {
        match self {
            ErrorCode::UnknownClass => "A001",
            ErrorCode::MissingPatch => "A002",
            ErrorCode::InvalidMapKey => "A003",
            ErrorCode::CycleViolation => "A004",
            ErrorCode::TypeMismatch => "A005",
            ErrorCode::AttributeConflict => "A006",
            ErrorCode::DanglingReference => "A007",
            ErrorCode::ChainLoop => "A008",
            ErrorCode::IdentityConflict => "A009",
            ErrorCode::PatchFailed => "A010",
        }
    }

    /// Returns how a caller should surface this code.
    pub fn category(&self) -> ErrorCategory {
        match self {
            ErrorCode::UnknownClass | ErrorCode::MissingPatch | ErrorCode::ChainLoop => {
                ErrorCategory::Outdated
            }
            ErrorCode::InvalidMapKey
            | ErrorCode::TypeMismatch
            | ErrorCode::AttributeConflict
            | ErrorCode::DanglingReference
            | ErrorCode::IdentityConflict => ErrorCategory::Corrupt,
            ErrorCode::CycleViolation | ErrorCode::PatchFailed => ErrorCategory::Internal,
        }
    }
}

/// Coarse classification of failures for user-facing reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Data written by an older (or unknown) release: back it up and warn.
    Outdated,
    /// The data itself is internally broken.
    Corrupt,
    /// A patch or creator violated its contract.
    Internal,
}

/// Error on attribute access of an Object atom.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AtomError {
    #[error("missing attribute `{attribute}`")]
    MissingAttribute { attribute: String },

    #[error("attribute `{attribute}` already exists")]
    DuplicateAttribute { attribute: String },

    #[error("attribute `{attribute}` is {found}, expected {expected}")]
    TypeMismatch {
        attribute: String,
        expected: AtomKind,
        found: AtomKind,
    },
}

/// Error confined to one object node.
///
/// Every engine records these per node and keeps going with the rest of
/// the graph, except [`NodeError::CycleViolation`] which aborts the pass.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NodeError {
    #[error("[A001] no factory or creator registered for `{classname}` version `{version}`")]
    UnknownClass { classname: String, version: String },

    #[error("[A002] no structural patch from {origin} (current version: {current:?})")]
    MissingPatch {
        origin: VersionKey,
        current: Option<String>,
    },

    #[error("[A003] property `{property}` has a map key of unsupported kind {kind}")]
    InvalidMapKey { property: String, kind: &'static str },

    #[error("[A004] object `{id}` was asked to re-enter its own patch")]
    CycleViolation { id: Id },

    #[error("[A005] `{attribute}` is {found}, expected {expected}")]
    TypeMismatch {
        attribute: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("[A006] {0}")]
    Attribute(AtomError),

    #[error("[A007] reference to unknown object `{id}`")]
    DanglingReference { id: Id },

    #[error("[A008] patch chain loops at {key}")]
    ChainLoop { key: VersionKey },

    #[error("[A009] object id `{id}` already exists in the live object space")]
    DuplicateId { id: Id },

    #[error("[A009] object `{id}` is a `{found}`, expected `{expected}`")]
    ClassMismatch {
        id: Id,
        expected: String,
        found: String,
    },

    #[error("[A010] {message}")]
    Patch { message: String },
}

impl NodeError {
    /// Returns the error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            NodeError::UnknownClass { .. } => ErrorCode::UnknownClass,
            NodeError::MissingPatch { .. } => ErrorCode::MissingPatch,
            NodeError::InvalidMapKey { .. } => ErrorCode::InvalidMapKey,
            NodeError::CycleViolation { .. } => ErrorCode::CycleViolation,
            NodeError::TypeMismatch { .. } => ErrorCode::TypeMismatch,
            NodeError::Attribute(AtomError::TypeMismatch { .. }) => ErrorCode::TypeMismatch,
            NodeError::Attribute(_) => ErrorCode::AttributeConflict,
            NodeError::DanglingReference { .. } => ErrorCode::DanglingReference,
            NodeError::ChainLoop { .. } => ErrorCode::ChainLoop,
            NodeError::DuplicateId { .. } | NodeError::ClassMismatch { .. } => {
                ErrorCode::IdentityConflict
            }
            NodeError::Patch { .. } => ErrorCode::PatchFailed,
        }
    }

    /// Shorthand for [`ErrorCode::category`].
    pub fn category(&self) -> ErrorCategory {
        self.code().category()
    }

    /// Creates a free-form failure from a patch or creator body.
    pub fn patch(message: impl Into<String>) -> Self {
        NodeError::Patch {
            message: message.into(),
        }
    }
}

impl From<AtomError> for NodeError {
    fn from(err: AtomError) -> Self {
        NodeError::Attribute(err)
    }
}

/// A [`NodeError`] together with the node it happened on.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("object `{id}` ({classname}): {error}")]
pub struct NodeFailure {
    pub id: Id,
    pub classname: String,
    pub error: NodeError,
}

impl NodeFailure {
    pub fn new(id: impl Into<Id>, classname: impl Into<String>, error: NodeError) -> Self {
        Self {
            id: id.into(),
            classname: classname.into(),
            error,
        }
    }

    /// Creates a failure attributed to an Object atom.
    pub fn at(object: &ObjectAtom, error: NodeError) -> Self {
        Self::new(object.id(), object.classname(), error)
    }
}

/// Error of a whole migration pass.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MigrationError {
    #[error("migration left {} object(s) unmigrated", .failures.len())]
    Incomplete {
        graph: Box<AtomGraph>,
        failures: Vec<NodeFailure>,
    },

    #[error("[A004] object `{id}` ({classname}) re-entered mid-patch; pass aborted")]
    CycleViolation { id: Id, classname: String },

    #[error("graph belongs to context `{found}`, migrator handles `{expected}`")]
    ContextMismatch { expected: String, found: String },

    #[error("unknown context `{context}`")]
    UnknownContext { context: String },

    #[error("no version path in context `{context}` from `{from}` to `{to}`")]
    NoVersionPath {
        context: String,
        from: String,
        to: String,
    },

    #[error("input graph is invalid: {0}")]
    InvalidGraph(#[from] ValidationError),
}

impl MigrationError {
    /// Returns the per-node failures, if this error carries any.
    pub fn failures(&self) -> &[NodeFailure] {
        match self {
            MigrationError::Incomplete { failures, .. } => failures,
            _ => &[],
        }
    }

    /// Returns the partially migrated graph, if one was produced.
    pub fn partial_graph(&self) -> Option<&AtomGraph> {
        match self {
            MigrationError::Incomplete { graph, .. } => Some(graph),
            _ => None,
        }
    }
}

/// Error converting live objects into Atoms.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConversionError {
    #[error("root object `{id}` is not in the object graph")]
    UnknownRoot { id: Id },

    #[error("conversion reported {} failure(s)", .failures.len())]
    Incomplete {
        graph: Box<AtomGraph>,
        failures: Vec<NodeFailure>,
    },
}

/// Error reconstructing live objects from Atoms.
#[derive(Debug, Error)]
pub enum ReconstructionError {
    #[error("atom graph has no root object")]
    MissingRoot,

    #[error("reconstruction reported {} failure(s)", .failures.len())]
    Incomplete {
        graph: Box<ObjectGraph>,
        root: Option<Id>,
        failures: Vec<NodeFailure>,
    },
}

/// Error registering a patch, creator, factory or version.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("a structural patch {origin} -> {target} is already registered")]
    DuplicateStructuralPatch { origin: VersionKey, target: VersionKey },

    #[error("a semantic patch for {classname}@{class_version} in {context} {from} -> {to} is already registered")]
    DuplicateSemanticPatch {
        context: String,
        from: String,
        to: String,
        classname: String,
        class_version: String,
    },

    #[error("a creator for {key} is already registered")]
    DuplicateCreator { key: VersionKey },

    #[error("a factory for class `{classname}` is already registered")]
    DuplicateFactory { classname: String },

    #[error("version `{version}` of context `{context}` is already registered")]
    DuplicateVersion { context: String, version: String },

    #[error("invalid registration key: {reason}")]
    InvalidKey { reason: &'static str },
}

/// Error found while validating an Atom graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("root object `{id}` is missing")]
    MissingRoot { id: Id },

    #[error("object stored under `{key}` carries id `{id}`")]
    IdMismatch { key: Id, id: Id },

    #[error("object `{id}` has an empty id, classname or version")]
    IncompleteMetadata { id: Id },

    #[error("object `{from}` references unknown object `{to}`")]
    DanglingReference { from: Id, to: Id },

    #[error("object `{id}` attribute `{attribute}` has a {kind} map key")]
    InvalidMapKey {
        id: Id,
        attribute: String,
        kind: AtomKind,
    },
}
