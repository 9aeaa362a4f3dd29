//! Data model types for Atom graphs.
//!
//! This module contains the generic interchange representation:
//! - Identifiers (persisted ids)
//! - Values (the Atom tagged tree)
//! - Objects (Object atoms and version keys)
//! - Graphs (the id-indexed arena of one pass)
//! - Builders (ergonomic construction)

pub mod builder;
pub mod graph;
pub mod id;
pub mod object;
pub mod value;

pub use builder::{GraphBuilder, ObjectBuilder};
pub use graph::{AtomGraph, ContextVersion};
pub use id::{child_id, derived_id, generate_id, is_valid_id, Id};
pub use object::{ObjectAtom, VersionKey};
pub use value::{Atom, AtomKind, Blob, BufferId, Numeric};
