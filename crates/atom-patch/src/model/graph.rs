//! The Atom graph arena.
//!
//! All Object atoms of one load or save pass live in a single map indexed
//! by persisted id. References between objects are id lookups into that
//! map, so shared sub-objects and cycles need no special representation.

use std::fmt;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::model::{generate_id, Id, ObjectAtom};

/// An application context and one of its versions, e.g. `("MedicalData", "2")`.
///
/// The persistence layer tags every saved graph with the context version it
/// was written at.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContextVersion {
    pub context: String,
    pub version: String,
}

impl ContextVersion {
    pub fn new(context: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for ContextVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.context, self.version)
    }
}

/// A rooted graph of Object atoms.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AtomGraph {
    root: Option<Id>,
    tag: Option<ContextVersion>,
    objects: FxHashMap<Id, ObjectAtom>,
}

impl AtomGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a graph whose root is `root`, which is inserted as well.
    pub fn with_root(root: ObjectAtom) -> Self {
        let mut graph = Self::new();
        graph.root = Some(root.id().to_string());
        graph.insert(root);
        graph
    }

    pub fn root(&self) -> Option<&str> {
        self.root.as_deref()
    }

    pub fn set_root(&mut self, id: impl Into<Id>) {
        self.root = Some(id.into());
    }

    /// Returns the root object, if the root is set and present.
    pub fn root_object(&self) -> Option<&ObjectAtom> {
        self.root.as_deref().and_then(|id| self.objects.get(id))
    }

    pub fn tag(&self) -> Option<&ContextVersion> {
        self.tag.as_ref()
    }

    pub fn set_tag(&mut self, tag: ContextVersion) {
        self.tag = Some(tag);
    }

    /// Inserts an object under its own id, returning the object it replaced.
    pub fn insert(&mut self, object: ObjectAtom) -> Option<ObjectAtom> {
        self.objects.insert(object.id().to_string(), object)
    }

    pub fn get(&self, id: &str) -> Option<&ObjectAtom> {
        self.objects.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut ObjectAtom> {
        self.objects.get_mut(id)
    }

    pub fn remove(&mut self, id: &str) -> Option<ObjectAtom> {
        self.objects.remove(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.objects.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Iterates over `(id, object)` pairs in arbitrary order.
    pub fn objects(&self) -> impl Iterator<Item = (&str, &ObjectAtom)> {
        self.objects.iter().map(|(id, obj)| (id.as_str(), obj))
    }

    /// Raw access to the id-keyed storage, including entries whose key
    /// disagrees with the object id.
    pub(crate) fn entries(&self) -> &FxHashMap<Id, ObjectAtom> {
        &self.objects
    }

    /// Moves every object of `other` into this graph. Objects of `other`
    /// replace objects with the same id.
    pub fn absorb(&mut self, other: AtomGraph) {
        self.objects.extend(other.objects);
    }

    // =========================================================================
    // Traversal
    // =========================================================================

    /// Returns the ids reachable from `start` in pre-order.
    ///
    /// Children are visited in attribute-name order. References to ids
    /// absent from the graph are skipped. Returns an empty list if `start`
    /// itself is absent.
    pub fn reachable_from(&self, start: &str) -> Vec<Id> {
        let mut order = Vec::new();
        let mut seen: FxHashSet<&str> = FxHashSet::default();
        self.walk(start, &mut seen, &mut order);
        order
    }

    fn walk<'a>(&'a self, start: &'a str, seen: &mut FxHashSet<&'a str>, order: &mut Vec<Id>) {
        let Some((start, _)) = self.objects.get_key_value(start) else {
            return;
        };
        let mut stack: Vec<&str> = vec![start.as_str()];
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            let Some(object) = self.objects.get(id) else {
                continue;
            };
            order.push(id.to_string());

            let mut children: Vec<&str> = Vec::new();
            for value in object.attributes().values() {
                value.for_each_reference(&mut |child| {
                    if let Some((key, _)) = self.objects.get_key_value(child) {
                        if !seen.contains(key.as_str()) {
                            children.push(key.as_str());
                        }
                    }
                });
            }
            // Reverse so the first attribute is popped first.
            stack.extend(children.into_iter().rev());
        }
    }

    /// Returns every object id exactly once, in a deterministic order:
    /// pre-order from the root, then unreachable objects sorted by id.
    pub fn traversal_order(&self) -> Vec<Id> {
        let mut order = Vec::with_capacity(self.objects.len());
        let mut seen: FxHashSet<&str> = FxHashSet::default();
        if let Some(root) = self.root.as_deref() {
            self.walk(root, &mut seen, &mut order);
        }
        if order.len() < self.objects.len() {
            let mut rest: Vec<&str> = self
                .objects
                .keys()
                .map(String::as_str)
                .filter(|id| !seen.contains(id))
                .collect();
            rest.sort_unstable();
            for id in rest {
                self.walk(id, &mut seen, &mut order);
            }
        }
        order
    }

    // =========================================================================
    // Copies
    // =========================================================================

    /// Returns an id-preserving copy of the sub-graph reachable from `id`,
    /// rooted at `id`. The context tag is carried over.
    pub fn extract(&self, id: &str) -> Option<AtomGraph> {
        if !self.contains(id) {
            return None;
        }
        let mut out = AtomGraph {
            root: Some(id.to_string()),
            tag: self.tag.clone(),
            objects: FxHashMap::default(),
        };
        for child in self.reachable_from(id) {
            if let Some(object) = self.objects.get(&child) {
                out.insert(object.clone());
            }
        }
        Some(out)
    }

    /// Deep-copies the sub-graph reachable from `id` into this graph under
    /// fresh ids and returns the id of the copy of `id`.
    ///
    /// Sharing and cycles inside the sub-graph are preserved in the copy.
    /// References leaving the sub-graph keep pointing at the originals.
    pub fn duplicate(&mut self, id: &str) -> Option<Id> {
        let ids = self.reachable_from(id);
        let renamed: FxHashMap<Id, Id> = ids.iter().map(|old| (old.clone(), generate_id())).collect();

        let mut copies = Vec::with_capacity(ids.len());
        for old in &ids {
            let Some(object) = self.objects.get(old) else {
                continue;
            };
            let mut copy = object.clone();
            if let Some(new_id) = renamed.get(old) {
                copy.set_id(new_id.clone());
            }
            copy.remap_references(&mut |target| renamed.get(target).cloned());
            copies.push(copy);
        }
        for copy in copies {
            self.insert(copy);
        }
        renamed.get(id).cloned()
    }
}
