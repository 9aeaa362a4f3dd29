//! Builder API for ergonomic Atom graph construction.
//!
//! Provides a fluent interface for building Object atoms and whole graphs,
//! mostly used by creators, tests and demos.
//!
//! # Example
//!
//! ```rust
//! use atom_patch::model::builder::GraphBuilder;
//!
//! let graph = GraphBuilder::new()
//!     .tag("MedicalData", "1")
//!     .root("scene-1", "Scene", "1", |o| o
//!         .string("name", "Head CT")
//!         .object("material", "mat-1")
//!     )
//!     .object("mat-1", "Material", "1", |o| o.string("shading_mode", "PHONG"))
//!     .build();
//!
//! assert_eq!(graph.len(), 2);
//! assert_eq!(graph.root(), Some("scene-1"));
//! ```

use crate::model::{Atom, AtomGraph, Blob, ContextVersion, Id, ObjectAtom};

/// Builder for constructing an [`AtomGraph`].
#[derive(Debug, Clone, Default)]
pub struct GraphBuilder {
    graph: AtomGraph,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the context version tag.
    pub fn tag(mut self, context: impl Into<String>, version: impl Into<String>) -> Self {
        self.graph.set_tag(ContextVersion::new(context, version));
        self
    }

    /// Adds an object using a builder function.
    pub fn object<F>(mut self, id: impl Into<Id>, classname: &str, version: &str, f: F) -> Self
    where
        F: FnOnce(ObjectBuilder) -> ObjectBuilder,
    {
        let builder = f(ObjectBuilder::new(id, classname, version));
        self.graph.insert(builder.build());
        self
    }

    /// Adds an object using a builder function and makes it the root.
    pub fn root<F>(mut self, id: impl Into<Id>, classname: &str, version: &str, f: F) -> Self
    where
        F: FnOnce(ObjectBuilder) -> ObjectBuilder,
    {
        let builder = f(ObjectBuilder::new(id, classname, version));
        let object = builder.build();
        self.graph.set_root(object.id());
        self.graph.insert(object);
        self
    }

    /// Adds an already built object.
    pub fn insert(mut self, object: ObjectAtom) -> Self {
        self.graph.insert(object);
        self
    }

    /// Builds the final graph.
    pub fn build(self) -> AtomGraph {
        self.graph
    }
}

/// Builder for a single [`ObjectAtom`].
#[derive(Debug, Clone)]
pub struct ObjectBuilder {
    object: ObjectAtom,
}

impl ObjectBuilder {
    pub fn new(id: impl Into<Id>, classname: &str, version: &str) -> Self {
        Self {
            object: ObjectAtom::new(id, classname, version),
        }
    }

    /// Sets a meta info entry.
    pub fn meta(mut self, name: &str, value: &str) -> Self {
        self.object.set_meta(name, value);
        self
    }

    // =========================================================================
    // Scalars
    // =========================================================================

    pub fn boolean(mut self, name: &str, value: bool) -> Self {
        self.object.set_attribute(name, value);
        self
    }

    pub fn int(mut self, name: &str, value: i64) -> Self {
        self.object.set_attribute(name, value);
        self
    }

    pub fn uint(mut self, name: &str, value: u64) -> Self {
        self.object.set_attribute(name, value);
        self
    }

    pub fn real(mut self, name: &str, value: f64) -> Self {
        self.object.set_attribute(name, value);
        self
    }

    pub fn string(mut self, name: &str, value: impl Into<String>) -> Self {
        self.object.set_attribute(name, Atom::String(value.into()));
        self
    }

    pub fn blob(mut self, name: &str, value: Blob) -> Self {
        self.object.set_attribute(name, value);
        self
    }

    // =========================================================================
    // References and containers
    // =========================================================================

    /// Sets a reference to another object of the graph.
    pub fn object(mut self, name: &str, id: impl Into<Id>) -> Self {
        self.object.set_attribute(name, Atom::object(id));
        self
    }

    /// Sets a null reference.
    pub fn null(mut self, name: &str) -> Self {
        self.object.set_attribute(name, Atom::Null);
        self
    }

    pub fn sequence(mut self, name: &str, items: impl IntoIterator<Item = Atom>) -> Self {
        self.object.set_attribute(name, Atom::Sequence(items.into_iter().collect()));
        self
    }

    pub fn map(mut self, name: &str, entries: impl IntoIterator<Item = (Atom, Atom)>) -> Self {
        self.object.set_attribute(name, Atom::Map(entries.into_iter().collect()));
        self
    }

    /// Sets a raw attribute.
    pub fn attribute(mut self, name: &str, value: impl Into<Atom>) -> Self {
        self.object.set_attribute(name, value);
        self
    }

    // =========================================================================
    // Build
    // =========================================================================

    pub fn build(self) -> ObjectAtom {
        self.object
    }
}
