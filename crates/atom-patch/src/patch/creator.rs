//! Structural creators: default Object atoms at an exact historical version.
//!
//! When a patch needs an object that never existed on disk (a field added
//! by a later schema, say), it asks for a default instance at the version
//! its own code was written against. The new object then goes through the
//! same patch chain as everything read from the file.

use std::sync::Arc;

use log::debug;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::error::{NodeError, RegistryError};
use crate::limits::MAX_CREATION_DEPTH;
use crate::model::{child_id, AtomGraph, Id, ObjectAtom, VersionKey};

/// Fills a freshly allocated Object atom with default attributes.
///
/// The atom arrives with its id, classname and version set. Nested default
/// objects are requested through the [`Creation`].
pub type CreatorFn = Arc<dyn Fn(&mut ObjectAtom, &mut Creation<'_>) -> Result<(), NodeError> + Send + Sync>;

/// Maps version keys to creators.
#[derive(Default)]
pub struct CreatorDb {
    creators: RwLock<FxHashMap<VersionKey, CreatorFn>>,
}

impl CreatorDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&self, key: VersionKey, creator: F) -> Result<(), RegistryError>
    where
        F: Fn(&mut ObjectAtom, &mut Creation<'_>) -> Result<(), NodeError> + Send + Sync + 'static,
    {
        if key.classname.is_empty() || key.version.is_empty() {
            return Err(RegistryError::InvalidKey {
                reason: "empty classname or version",
            });
        }
        let mut creators = self.creators.write();
        if creators.contains_key(&key) {
            return Err(RegistryError::DuplicateCreator { key });
        }
        debug!("event=register_creator module=patch status=ok key={key}");
        creators.insert(key, Arc::new(creator));
        Ok(())
    }

    pub fn get(&self, key: &VersionKey) -> Option<CreatorFn> {
        self.creators.read().get(key).cloned()
    }

    pub fn contains(&self, key: &VersionKey) -> bool {
        self.creators.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.creators.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.creators.read().is_empty()
    }

    /// Creates a default object at exactly `key` under `id`.
    ///
    /// The returned graph is rooted at the new object and also holds every
    /// nested object its creator requested.
    pub fn create(&self, key: &VersionKey, id: Id) -> Result<AtomGraph, NodeError> {
        let mut graph = AtomGraph::new();
        Creation::run(self, &mut graph, 0, key, id.clone())?;
        graph.set_root(id);
        Ok(graph)
    }
}

impl std::fmt::Debug for CreatorDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreatorDb").field("creators", &self.len()).finish()
    }
}

/// State of one creator invocation.
pub struct Creation<'a> {
    db: &'a CreatorDb,
    graph: &'a mut AtomGraph,
    depth: usize,
    parent: Id,
    counter: usize,
}

impl Creation<'_> {
    fn run(db: &CreatorDb, graph: &mut AtomGraph, depth: usize, key: &VersionKey, id: Id) -> Result<(), NodeError> {
        if depth > MAX_CREATION_DEPTH {
            return Err(NodeError::patch(format!(
                "creator nesting deeper than {MAX_CREATION_DEPTH} while creating {key}"
            )));
        }
        let creator = db.get(key).ok_or_else(|| NodeError::UnknownClass {
            classname: key.classname.clone(),
            version: key.version.clone(),
        })?;

        let mut object = ObjectAtom::new(id.clone(), key.classname.clone(), key.version.clone());
        let mut creation = Creation {
            db,
            graph: &mut *graph,
            depth,
            parent: id,
            counter: 0,
        };
        creator(&mut object, &mut creation)?;
        graph.insert(object);
        Ok(())
    }

    /// Id of the object being created.
    pub fn id(&self) -> &str {
        &self.parent
    }

    /// Nesting level; the outermost creator runs at depth 0.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Creates a nested default object and returns its id.
    ///
    /// Ids are derived from the enclosing object's id, so repeated creation
    /// from the same parent is deterministic.
    pub fn create(&mut self, classname: &str, version: &str) -> Result<Id, NodeError> {
        let key = VersionKey::new(classname, version);
        let id = child_id(&self.parent, &format!("{key}#{}", self.counter));
        self.counter += 1;
        Creation::run(self.db, self.graph, self.depth + 1, &key, id.clone())?;
        Ok(id)
    }
}
