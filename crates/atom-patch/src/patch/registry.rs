//! Patch databases and the registry that bundles them.
//!
//! Registries are explicit values: the process entry point builds one,
//! every [`PatchModule`] registers into it during start-up, and it is then
//! shared read-only by any number of concurrent passes. Lookups clone the
//! callable out of the lock so no lock is held while a patch body runs.

use std::fmt;
use std::sync::Arc;

use log::{debug, info};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::error::{NodeError, RegistryError};
use crate::model::{ObjectAtom, VersionKey};
use crate::patch::{Creation, CreatorDb, PatchContext, SemanticContext, VersionTable, VersionsGraph};

/// Structural patch body: reads the origin object and edits the target,
/// which starts as a copy of the origin carrying the target version key.
pub type StructuralPatchFn =
    Arc<dyn Fn(&ObjectAtom, &mut ObjectAtom, &mut PatchContext<'_>) -> Result<(), NodeError> + Send + Sync>;

/// Semantic patch body: reads the object as it was in the input graph and
/// edits its structurally current version.
pub type SemanticPatchFn =
    Arc<dyn Fn(&ObjectAtom, &mut ObjectAtom, &mut SemanticContext<'_>) -> Result<(), NodeError> + Send + Sync>;

// =========================================================================
// Keys
// =========================================================================

/// Key of a structural patch: one version step of one class.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PatchKey {
    pub origin: VersionKey,
    pub target: VersionKey,
}

impl PatchKey {
    pub fn new(origin: VersionKey, target: VersionKey) -> Self {
        Self { origin, target }
    }

    /// Shorthand for a step that keeps the classname.
    pub fn step(classname: &str, from: &str, to: &str) -> Self {
        Self::new(VersionKey::new(classname, from), VersionKey::new(classname, to))
    }
}

impl fmt::Display for PatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.origin, self.target)
    }
}

/// Key of a semantic patch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SemanticKey {
    pub context: String,
    /// Origin context version.
    pub from: String,
    /// Target context version.
    pub to: String,
    /// Classname of the object in the input graph.
    pub classname: String,
    /// Class version of the object in the input graph.
    pub class_version: String,
}

impl SemanticKey {
    pub fn new(
        context: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
        classname: impl Into<String>,
        class_version: impl Into<String>,
    ) -> Self {
        Self {
            context: context.into(),
            from: from.into(),
            to: to.into(),
            classname: classname.into(),
            class_version: class_version.into(),
        }
    }
}

fn check_version_key(key: &VersionKey) -> Result<(), RegistryError> {
    if key.classname.is_empty() || key.version.is_empty() {
        return Err(RegistryError::InvalidKey {
            reason: "empty classname or version",
        });
    }
    Ok(())
}

// =========================================================================
// Structural patches
// =========================================================================

#[derive(Default)]
struct StructuralTable {
    patches: FxHashMap<PatchKey, StructuralPatchFn>,
    /// Default next hop of every origin key.
    next: FxHashMap<VersionKey, VersionKey>,
}

/// Structural patches indexed by (origin, target).
///
/// The first patch registered for an origin key becomes its default next
/// hop. Other patches from the same origin are reachable only when a
/// parent patch names them explicitly.
#[derive(Default)]
pub struct StructuralPatchDb {
    table: RwLock<StructuralTable>,
}

impl StructuralPatchDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&self, key: PatchKey, patch: F) -> Result<(), RegistryError>
    where
        F: Fn(&ObjectAtom, &mut ObjectAtom, &mut PatchContext<'_>) -> Result<(), NodeError> + Send + Sync + 'static,
    {
        check_version_key(&key.origin)?;
        check_version_key(&key.target)?;
        if key.origin == key.target {
            return Err(RegistryError::InvalidKey {
                reason: "patch origin equals its target",
            });
        }

        let mut table = self.table.write();
        if table.patches.contains_key(&key) {
            return Err(RegistryError::DuplicateStructuralPatch {
                origin: key.origin,
                target: key.target,
            });
        }
        debug!("event=register_structural_patch module=patch status=ok key={key}");
        table
            .next
            .entry(key.origin.clone())
            .or_insert_with(|| key.target.clone());
        table.patches.insert(key, Arc::new(patch));
        Ok(())
    }

    /// Returns the default next hop from `origin`.
    pub fn next_hop(&self, origin: &VersionKey) -> Option<VersionKey> {
        self.table.read().next.get(origin).cloned()
    }

    pub fn get(&self, key: &PatchKey) -> Option<StructuralPatchFn> {
        self.table.read().patches.get(key).cloned()
    }

    pub fn contains(&self, key: &PatchKey) -> bool {
        self.table.read().patches.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.table.read().patches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for StructuralPatchDb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StructuralPatchDb").field("patches", &self.len()).finish()
    }
}

// =========================================================================
// Semantic patches
// =========================================================================

/// Semantic patches indexed by [`SemanticKey`].
#[derive(Default)]
pub struct SemanticPatchDb {
    patches: RwLock<FxHashMap<SemanticKey, SemanticPatchFn>>,
}

impl SemanticPatchDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&self, key: SemanticKey, patch: F) -> Result<(), RegistryError>
    where
        F: Fn(&ObjectAtom, &mut ObjectAtom, &mut SemanticContext<'_>) -> Result<(), NodeError> + Send + Sync + 'static,
    {
        if [&key.context, &key.from, &key.to, &key.classname, &key.class_version]
            .iter()
            .any(|part| part.is_empty())
        {
            return Err(RegistryError::InvalidKey {
                reason: "empty semantic key component",
            });
        }

        let mut patches = self.patches.write();
        if patches.contains_key(&key) {
            return Err(RegistryError::DuplicateSemanticPatch {
                context: key.context,
                from: key.from,
                to: key.to,
                classname: key.classname,
                class_version: key.class_version,
            });
        }
        debug!(
            "event=register_semantic_patch module=patch status=ok context={} from={} to={} classname={} class_version={}",
            key.context, key.from, key.to, key.classname, key.class_version
        );
        patches.insert(key, Arc::new(patch));
        Ok(())
    }

    pub fn get(&self, key: &SemanticKey) -> Option<SemanticPatchFn> {
        self.patches.read().get(key).cloned()
    }

    pub fn contains(&self, key: &SemanticKey) -> bool {
        self.patches.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.patches.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for SemanticPatchDb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SemanticPatchDb").field("patches", &self.len()).finish()
    }
}

// =========================================================================
// Registry
// =========================================================================

/// A unit of patches, creators and versions registered together.
pub trait PatchModule {
    /// Name used in logs.
    fn name(&self) -> &str;

    fn register(&self, registry: &PatchRegistry) -> Result<(), RegistryError>;
}

/// Everything a migration pass looks up: structural patches, semantic
/// patches, creators and context versions.
#[derive(Debug, Default)]
pub struct PatchRegistry {
    structural: StructuralPatchDb,
    semantic: SemanticPatchDb,
    creators: CreatorDb,
    versions: VersionsGraph,
}

impl PatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a structural patch.
    pub fn register_structural_patch<F>(&self, key: PatchKey, patch: F) -> Result<(), RegistryError>
    where
        F: Fn(&ObjectAtom, &mut ObjectAtom, &mut PatchContext<'_>) -> Result<(), NodeError> + Send + Sync + 'static,
    {
        self.structural.register(key, patch)
    }

    /// Registers a semantic patch.
    pub fn register_semantic_patch<F>(&self, key: SemanticKey, patch: F) -> Result<(), RegistryError>
    where
        F: Fn(&ObjectAtom, &mut ObjectAtom, &mut SemanticContext<'_>) -> Result<(), NodeError> + Send + Sync + 'static,
    {
        self.semantic.register(key, patch)
    }

    /// Registers a structural creator.
    pub fn register_creator<F>(&self, key: VersionKey, creator: F) -> Result<(), RegistryError>
    where
        F: Fn(&mut ObjectAtom, &mut Creation<'_>) -> Result<(), NodeError> + Send + Sync + 'static,
    {
        self.creators.register(key, creator)
    }

    /// Appends a context version with its class table.
    pub fn register_version(
        &self,
        context: impl Into<String>,
        version: impl Into<String>,
        table: VersionTable,
    ) -> Result<(), RegistryError> {
        self.versions.register_version(context, version, table)
    }

    /// Lets a module register everything it provides.
    pub fn install(&self, module: &dyn PatchModule) -> Result<(), RegistryError> {
        let before = (self.structural.len(), self.semantic.len(), self.creators.len());
        module.register(self)?;
        info!(
            "event=install_module module=patch status=ok name={} structural={} semantic={} creators={}",
            module.name(),
            self.structural.len() - before.0,
            self.semantic.len() - before.1,
            self.creators.len() - before.2
        );
        Ok(())
    }

    /// Total number of structural and semantic patches.
    pub fn patch_count(&self) -> usize {
        self.structural.len() + self.semantic.len()
    }

    pub fn structural_patch_count(&self) -> usize {
        self.structural.len()
    }

    pub fn semantic_patch_count(&self) -> usize {
        self.semantic.len()
    }

    pub fn creator_count(&self) -> usize {
        self.creators.len()
    }

    pub fn structural(&self) -> &StructuralPatchDb {
        &self.structural
    }

    pub fn semantic(&self) -> &SemanticPatchDb {
        &self.semantic
    }

    pub fn creators(&self) -> &CreatorDb {
        &self.creators
    }

    pub fn versions(&self) -> &VersionsGraph {
        &self.versions
    }
}
