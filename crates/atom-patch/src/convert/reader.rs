//! Atoms to live objects.
//!
//! Reconstruction runs in two steps over the atom graph. The first step
//! instantiates one live object per Object atom through the
//! [`ClassFactory`] and decides its live id according to the
//! [`ReadPolicy`]. The second step sets properties, rewriting every
//! reference from persisted to live id. Because every object exists before
//! any property is set, shared references and cycles need no special care.

use log::{debug, info, warn};
use rustc_hash::FxHashMap;

use crate::convert::{ClassFactory, ObjectGraph, PropertyValue, Reflect};
use crate::error::{NodeError, NodeFailure, ReconstructionError};
use crate::model::{generate_id, Atom, AtomGraph, Id, Numeric, ObjectAtom};

/// How persisted ids map to live ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ReadPolicy {
    /// Keep persisted ids. An id already used in the live object space is
    /// an error.
    Strict,
    /// Mint a fresh id for every object (import as a new copy).
    #[default]
    Change,
    /// Keep persisted ids. A live object with the same id and class is
    /// updated in place (reload in place).
    Reuse,
}

/// Outcome of [`AtomReader::read_into`].
#[derive(Debug, Default)]
pub struct Reconstruction {
    /// Live id of the atom graph's root, if it was reconstructed.
    pub root: Option<Id>,
    /// Persisted id to live id, for every reconstructed object.
    pub ids: FxHashMap<Id, Id>,
    pub failures: Vec<NodeFailure>,
}

impl Reconstruction {
    /// Returns the live id an atom was reconstructed under.
    pub fn live_id(&self, persisted: &str) -> Option<&str> {
        self.ids.get(persisted).map(String::as_str)
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Reconstructs a fresh object graph from `atoms`.
pub fn from_atoms(
    atoms: &AtomGraph,
    factory: &ClassFactory,
    policy: ReadPolicy,
) -> Result<ObjectGraph, ReconstructionError> {
    if atoms.root().is_none() {
        return Err(ReconstructionError::MissingRoot);
    }
    let mut objects = ObjectGraph::new();
    let result = AtomReader::new(factory, policy).read_into(atoms, &mut objects);
    if let Some(root) = &result.root {
        objects.set_root(root.clone());
    }
    if result.is_complete() {
        Ok(objects)
    } else {
        Err(ReconstructionError::Incomplete {
            graph: Box::new(objects),
            root: result.root,
            failures: result.failures,
        })
    }
}

enum Slot {
    New(Box<dyn Reflect>),
    Existing,
}

/// Reconstructs atom graphs into a caller-owned live object space.
#[derive(Debug, Clone, Copy)]
pub struct AtomReader<'a> {
    factory: &'a ClassFactory,
    policy: ReadPolicy,
}

impl<'a> AtomReader<'a> {
    pub fn new(factory: &'a ClassFactory, policy: ReadPolicy) -> Self {
        Self { factory, policy }
    }

    /// Reconstructs every object of `atoms` into `objects`.
    ///
    /// Failures are per object: an object that cannot be instantiated is
    /// skipped, and references to it are set to null.
    pub fn read_into(&self, atoms: &AtomGraph, objects: &mut ObjectGraph) -> Reconstruction {
        let mut result = Reconstruction::default();
        let mut staged: Vec<(Id, Id, Slot)> = Vec::new();

        for persisted in atoms.traversal_order() {
            let Some(atom) = atoms.get(&persisted) else {
                continue;
            };
            match self.instantiate(atom, objects) {
                Ok((live, slot)) => {
                    result.ids.insert(persisted.clone(), live.clone());
                    staged.push((persisted, live, slot));
                }
                Err(error) => {
                    warn!(
                        "event=reconstruct module=convert status=failed id={} classname={} code={} error={error}",
                        atom.id(),
                        atom.classname(),
                        error.code().code()
                    );
                    result.failures.push(NodeFailure::at(atom, error));
                }
            }
        }

        for (persisted, live, slot) in staged {
            let Some(atom) = atoms.get(&persisted) else {
                continue;
            };
            match slot {
                Slot::New(mut object) => {
                    apply(atom, object.as_mut(), &result.ids, &mut result.failures);
                    objects.insert(object);
                }
                Slot::Existing => {
                    if let Some(object) = objects.get_mut(&live) {
                        apply(atom, object, &result.ids, &mut result.failures);
                    }
                }
            }
            debug!("event=reconstruct module=convert status=ok id={persisted} live_id={live}");
        }

        result.root = atoms.root().and_then(|root| result.ids.get(root).cloned());
        info!(
            "event=from_atoms module=convert status={} policy={:?} objects={} failures={}",
            if result.is_complete() { "ok" } else { "incomplete" },
            self.policy,
            result.ids.len(),
            result.failures.len()
        );
        result
    }

    fn instantiate(&self, atom: &ObjectAtom, objects: &ObjectGraph) -> Result<(Id, Slot), NodeError> {
        let mut instance = self
            .factory
            .create(atom.classname())
            .ok_or_else(|| NodeError::UnknownClass {
                classname: atom.classname().to_string(),
                version: atom.version().to_string(),
            })?;
        if instance.version() != atom.version() {
            return Err(NodeError::MissingPatch {
                origin: atom.key(),
                current: Some(instance.version().to_string()),
            });
        }

        let persisted = atom.id().to_string();
        match self.policy {
            ReadPolicy::Change => {
                let id = generate_id();
                instance.set_id(id.clone());
                Ok((id, Slot::New(instance)))
            }
            ReadPolicy::Strict => {
                if objects.contains(&persisted) {
                    return Err(NodeError::DuplicateId { id: persisted });
                }
                instance.set_id(persisted.clone());
                Ok((persisted, Slot::New(instance)))
            }
            ReadPolicy::Reuse => match objects.get(&persisted) {
                Some(existing) if existing.classname() == atom.classname() => {
                    Ok((persisted, Slot::Existing))
                }
                Some(existing) => Err(NodeError::ClassMismatch {
                    expected: atom.classname().to_string(),
                    found: existing.classname().to_string(),
                    id: persisted,
                }),
                None => {
                    instance.set_id(persisted.clone());
                    Ok((persisted, Slot::New(instance)))
                }
            },
        }
    }
}

fn apply(
    atom: &ObjectAtom,
    object: &mut dyn Reflect,
    ids: &FxHashMap<Id, Id>,
    failures: &mut Vec<NodeFailure>,
) {
    for (name, value) in atom.attributes() {
        let mut errors = Vec::new();
        let value = property(name, value, ids, &mut errors);
        if let Err(error) = object.set_property(name, value) {
            errors.push(error);
        }
        for error in errors {
            warn!(
                "event=set_property module=convert status=failed id={} property={name} error={error}",
                atom.id()
            );
            failures.push(NodeFailure::at(atom, error));
        }
    }
}

fn property(name: &str, atom: &Atom, ids: &FxHashMap<Id, Id>, errors: &mut Vec<NodeError>) -> PropertyValue {
    match atom {
        Atom::Null => PropertyValue::Object(None),
        Atom::Boolean(v) => PropertyValue::Bool(*v),
        Atom::Numeric(Numeric::Int(v)) => PropertyValue::Int(*v),
        Atom::Numeric(Numeric::UInt(v)) => PropertyValue::UInt(*v),
        Atom::Numeric(Numeric::Real(v)) => PropertyValue::Real(*v),
        Atom::String(v) => PropertyValue::Text(v.clone()),
        Atom::Blob(v) => PropertyValue::Blob(v.clone()),
        Atom::Sequence(items) => {
            PropertyValue::Array(items.iter().map(|item| property(name, item, ids, errors)).collect())
        }
        Atom::Map(entries) => {
            let mut out = Vec::with_capacity(entries.len());
            for (key, value) in entries {
                if !key.is_scalar_key() {
                    errors.push(NodeError::InvalidMapKey {
                        property: name.to_string(),
                        kind: key.kind().name(),
                    });
                    continue;
                }
                out.push((property(name, key, ids, errors), property(name, value, ids, errors)));
            }
            PropertyValue::Map(out)
        }
        // Failed or missing targets read back as null.
        Atom::Object(id) => PropertyValue::Object(ids.get(id).cloned()),
    }
}
