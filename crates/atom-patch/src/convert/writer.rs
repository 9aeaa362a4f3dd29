//! Live objects to Atoms.
//!
//! The writer walks the object graph from a root, producing one Object
//! atom per live object. The atom graph under construction doubles as the
//! identity cache of the pass: an object whose id is already present is
//! never converted again, so shared references stay shared and cycles
//! terminate. Nested objects are queued instead of converted recursively.

use log::{debug, info, warn};
use rustc_hash::FxHashMap;

use crate::convert::{ObjectGraph, PropertyValue, PropertyVisitor, Reflect};
use crate::error::{ConversionError, NodeError, NodeFailure};
use crate::model::{Atom, AtomGraph, Blob, BufferId, Id, ObjectAtom};

/// How blob payloads are carried into the Atom graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlobPolicy {
    /// Reference the live buffer; no data is copied.
    #[default]
    Share,
    /// Copy each distinct buffer once, so the Atom graph owns its data.
    Detach,
}

/// Options for [`to_atoms_with_options`].
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOptions {
    pub blobs: BlobPolicy,
}

impl WriteOptions {
    /// Options that detach every blob from the live objects.
    pub fn detached() -> Self {
        Self {
            blobs: BlobPolicy::Detach,
        }
    }
}

/// Converts the object graph reachable from `root` into Atoms.
///
/// The output is rooted at `root`.
pub fn to_atoms(objects: &ObjectGraph, root: &str) -> Result<AtomGraph, ConversionError> {
    to_atoms_with_options(objects, root, &WriteOptions::default())
}

/// Converts the object graph reachable from `root` with custom options.
pub fn to_atoms_with_options(
    objects: &ObjectGraph,
    root: &str,
    options: &WriteOptions,
) -> Result<AtomGraph, ConversionError> {
    let object = objects.get(root).ok_or_else(|| ConversionError::UnknownRoot {
        id: root.to_string(),
    })?;
    let mut writer = AtomWriter::new(objects, *options);
    writer.to_atom(object);
    writer.finish(root)
}

/// One conversion pass.
pub struct AtomWriter<'a> {
    objects: &'a ObjectGraph,
    options: WriteOptions,
    graph: AtomGraph,
    pending: Vec<Id>,
    detached: FxHashMap<BufferId, Blob>,
    failures: Vec<NodeFailure>,
}

impl<'a> AtomWriter<'a> {
    /// Creates a writer resolving references against `objects`.
    pub fn new(objects: &'a ObjectGraph, options: WriteOptions) -> Self {
        Self {
            objects,
            options,
            graph: AtomGraph::new(),
            pending: Vec::new(),
            detached: FxHashMap::default(),
            failures: Vec::new(),
        }
    }

    /// Returns the Atom referencing `object`, converting it and everything
    /// it reaches unless this pass already did.
    pub fn to_atom(&mut self, object: &dyn Reflect) -> Atom {
        let id = object.id().to_string();
        if !self.graph.contains(&id) {
            self.convert(object);
            self.drain();
        }
        Atom::Object(id)
    }

    /// Returns the atoms produced so far.
    pub fn graph(&self) -> &AtomGraph {
        &self.graph
    }

    /// Ends the pass, rooting the output at `root`.
    pub fn finish(mut self, root: &str) -> Result<AtomGraph, ConversionError> {
        self.graph.set_root(root);
        if self.failures.is_empty() {
            info!(
                "event=to_atoms module=convert status=ok objects={}",
                self.graph.len()
            );
            Ok(self.graph)
        } else {
            warn!(
                "event=to_atoms module=convert status=incomplete objects={} failures={}",
                self.graph.len(),
                self.failures.len()
            );
            Err(ConversionError::Incomplete {
                graph: Box::new(self.graph),
                failures: self.failures,
            })
        }
    }

    fn drain(&mut self) {
        let objects = self.objects;
        while let Some(id) = self.pending.pop() {
            if self.graph.contains(&id) {
                continue;
            }
            // Existence was checked when the reference was queued.
            if let Some(object) = objects.get(&id) {
                self.convert(object);
            }
        }
    }

    fn convert(&mut self, object: &dyn Reflect) {
        let mut visitor = AtomVisitor {
            atom: ObjectAtom::new(object.id(), object.classname(), object.version()),
            writer: self,
            errors: Vec::new(),
        };
        object.visit_properties(&mut visitor);
        let AtomVisitor { atom, errors, .. } = visitor;

        debug!(
            "event=convert_object module=convert status=ok id={} classname={}",
            atom.id(),
            atom.classname()
        );
        for error in errors {
            warn!(
                "event=convert_object module=convert status=failed id={} code={} error={error}",
                atom.id(),
                error.code().code()
            );
            self.failures.push(NodeFailure::at(&atom, error));
        }
        self.graph.insert(atom);
    }

    fn blob(&mut self, blob: Blob) -> Blob {
        match self.options.blobs {
            BlobPolicy::Share => blob,
            BlobPolicy::Detach => self
                .detached
                .entry(blob.buffer_id())
                .or_insert_with(|| blob.detach())
                .clone(),
        }
    }
}

struct AtomVisitor<'w, 'a> {
    atom: ObjectAtom,
    writer: &'w mut AtomWriter<'a>,
    errors: Vec<NodeError>,
}

impl AtomVisitor<'_, '_> {
    fn value(&mut self, property: &str, value: PropertyValue) -> Atom {
        match value {
            PropertyValue::Bool(v) => Atom::Boolean(v),
            PropertyValue::Int(v) => Atom::from(v),
            PropertyValue::UInt(v) => Atom::from(v),
            PropertyValue::Real(v) => Atom::from(v),
            PropertyValue::Text(v) | PropertyValue::Enum(v) => Atom::String(v),
            PropertyValue::Object(None) => Atom::Null,
            PropertyValue::Object(Some(id)) => {
                if self.writer.objects.contains(&id) {
                    self.writer.pending.push(id.clone());
                    Atom::Object(id)
                } else {
                    self.errors.push(NodeError::DanglingReference { id });
                    Atom::Null
                }
            }
            PropertyValue::Blob(blob) => Atom::Blob(self.writer.blob(blob)),
            PropertyValue::Array(items) => {
                Atom::Sequence(items.into_iter().map(|item| self.value(property, item)).collect())
            }
            PropertyValue::Map(entries) => {
                let mut out = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    let kind = key.kind();
                    if !kind.is_map_key() {
                        self.errors.push(NodeError::InvalidMapKey {
                            property: property.to_string(),
                            kind: kind.name(),
                        });
                        continue;
                    }
                    let key = self.value(property, key);
                    let value = self.value(property, value);
                    out.push((key, value));
                }
                Atom::Map(out)
            }
        }
    }
}

impl PropertyVisitor for AtomVisitor<'_, '_> {
    fn visit(&mut self, name: &str, value: PropertyValue) {
        let atom = self.value(name, value);
        self.atom.set_attribute(name, atom);
    }
}
