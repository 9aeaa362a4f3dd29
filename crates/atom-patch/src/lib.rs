//! Atom patch: versioned object persistence with forward migration.
//!
//! This crate converts live object graphs into a generic, self-describing
//! tree of Atoms, and brings Atom graphs saved by older releases up to the
//! current version of every class before turning them back into objects.
//!
//! # Overview
//!
//! Loading a saved graph is three steps:
//! - **Structural patching**: every Object atom climbs a chain of
//!   registered patches from its saved `(classname, version)` to the
//!   current one
//! - **Semantic patching**: optional, context-scoped adjustments that span
//!   several classes, applied once per context-version hop
//! - **Reconstruction**: Atoms become live objects through a class factory
//!
//! Saving is only the reverse of the last step: live objects are always at
//! the current version.
//!
//! # Quick Start
//!
//! ```rust
//! use atom_patch::model::builder::GraphBuilder;
//! use atom_patch::{migrate, Atom, ContextVersion, PatchKey, PatchRegistry, VersionTable};
//!
//! let registry = PatchRegistry::new();
//! registry.register_version("Shop", "1", VersionTable::new().with("Widget", "1")).unwrap();
//! registry.register_version("Shop", "2", VersionTable::new().with("Widget", "2")).unwrap();
//! registry
//!     .register_structural_patch(PatchKey::step("Widget", "1", "2"), |origin, target, _| {
//!         let size = origin.attribute("size")?.clone();
//!         target.remove_attribute("size")?;
//!         target.add_attribute("width", size)?;
//!         Ok(())
//!     })
//!     .unwrap();
//!
//! let saved = GraphBuilder::new()
//!     .tag("Shop", "1")
//!     .root("w", "Widget", "1", |o| o.int("size", 4))
//!     .build();
//!
//! let current = migrate(&registry, &saved, &ContextVersion::new("Shop", "1")).unwrap();
//! let widget = current.get("w").unwrap();
//! assert_eq!(widget.version(), "2");
//! assert_eq!(widget.attribute("width").unwrap(), &Atom::from(4i64));
//! ```
//!
//! # Modules
//!
//! - [`model`]: Atoms, Object atoms, Atom graphs and builders
//! - [`convert`]: live objects to Atoms and back
//! - [`patch`]: registries, structural and semantic engines, migration
//! - [`validate`]: integrity validation of Atom graphs
//! - [`error`]: Error types and codes
//! - [`limits`]: Bounds on patch chains and creator nesting
//!
//! # Failure model
//!
//! Every engine records failures per object and keeps going; a pass
//! returns the partial result together with the list of failures. The
//! only failure that stops a pass is an object asked to re-enter its own
//! patch.

pub mod convert;
pub mod error;
pub mod limits;
pub mod model;
pub mod patch;
pub mod validate;

#[cfg(test)]
mod test_support;

// Re-export commonly used types at crate root
pub use convert::{
    from_atoms, to_atoms, to_atoms_with_options, AtomReader, BlobPolicy, ClassFactory, ObjectGraph,
    PropertyValue, PropertyVisitor, ReadPolicy, Reflect, WriteOptions,
};
pub use error::{
    AtomError, ConversionError, ErrorCategory, ErrorCode, MigrationError, NodeError, NodeFailure,
    ReconstructionError, RegistryError, ValidationError,
};
pub use model::{Atom, AtomGraph, Blob, ContextVersion, Id, Numeric, ObjectAtom, VersionKey};
pub use patch::{
    migrate, MigrationOptions, Migrator, PatchContext, PatchKey, PatchModule, PatchRegistry,
    SemanticContext, SemanticKey, VersionTable,
};
pub use validate::{graph_issues, validate_graph};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
