//! Whole-graph migration, one context-version hop at a time.
//!
//! Each hop `from -> to` brings the graph structurally to the class table
//! of `to`, then applies the semantic patches of the hop. Semantic patches
//! are looked up with each object's key as it was at `from`, so migrating
//! 1 -> 3 gives the same graph as migrating 1 -> 2 and then 2 -> 3.

use std::sync::Arc;

use log::{debug, error, info};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::{MigrationError, NodeError};
use crate::model::{AtomGraph, ContextVersion, Id};
use crate::patch::structural::patch_graph_frozen;
use crate::patch::{PatchRegistry, SemanticPass, VersionHop, VersionTable};
use crate::validate::validate_graph;

/// Options for [`Migrator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationOptions {
    /// Run the semantic passes after the structural pass.
    pub semantic: bool,
    /// Validate the input graph before patching.
    pub validate_input: bool,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            semantic: true,
            validate_input: true,
        }
    }
}

impl MigrationOptions {
    /// Structural pass only, no semantic adjustments.
    pub fn structural_only() -> Self {
        Self {
            semantic: false,
            ..Self::default()
        }
    }
}

/// Summary of a successful migration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationStats {
    pub objects: usize,
    pub structural_patches: usize,
    pub semantic_patches: usize,
    pub created: usize,
}

/// Migrates Atom graphs of one context to its current version.
#[derive(Debug)]
pub struct Migrator<'r> {
    registry: &'r PatchRegistry,
    context: String,
    options: MigrationOptions,
}

impl<'r> Migrator<'r> {
    pub fn new(registry: &'r PatchRegistry, context: impl Into<String>) -> Self {
        Self {
            registry,
            context: context.into(),
            options: MigrationOptions::default(),
        }
    }

    pub fn with_options(mut self, options: MigrationOptions) -> Self {
        self.options = options;
        self
    }

    /// Returns the context version graphs are migrated to.
    pub fn target(&self) -> Option<ContextVersion> {
        self.registry.versions().current(&self.context)
    }

    /// Migrates `graph`, saved at `origin`, to the current version of the
    /// context.
    ///
    /// Node failures do not stop the migration; they are returned together
    /// with the partially migrated graph in [`MigrationError::Incomplete`].
    pub fn migrate(&self, graph: &AtomGraph, origin: &ContextVersion) -> Result<AtomGraph, MigrationError> {
        self.migrate_with_stats(graph, origin).map(|(graph, _)| graph)
    }

    /// Like [`Migrator::migrate`], also returning pass counters.
    pub fn migrate_with_stats(
        &self,
        graph: &AtomGraph,
        origin: &ContextVersion,
    ) -> Result<(AtomGraph, MigrationStats), MigrationError> {
        let mismatch = |found: &str| MigrationError::ContextMismatch {
            expected: self.context.clone(),
            found: found.to_string(),
        };
        if origin.context != self.context {
            return Err(mismatch(&origin.context));
        }
        if let Some(tag) = graph.tag() {
            if tag.context != self.context {
                return Err(mismatch(&tag.context));
            }
        }
        if self.options.validate_input {
            validate_graph(graph)?;
        }

        let versions = self.registry.versions();
        let unknown = || MigrationError::UnknownContext {
            context: self.context.clone(),
        };
        let current = versions.current(&self.context).ok_or_else(unknown)?;
        let hops = versions.path(&self.context, &origin.version, &current.version)?;
        // A graph already at the current context version still gets a
        // structural pass for stale objects.
        let steps: Vec<(Option<&VersionHop>, Arc<VersionTable>)> = if hops.is_empty() {
            vec![(None, versions.current_table(&self.context).ok_or_else(unknown)?)]
        } else {
            hops.iter()
                .map(|hop| Ok((Some(hop), versions.table(&self.context, &hop.to).ok_or_else(unknown)?)))
                .collect::<Result<_, MigrationError>>()?
        };

        let mut stats = MigrationStats::default();
        let mut failures = Vec::new();
        let mut synthesized: FxHashSet<Id> = FxHashSet::default();
        // Structural failures stay at the version they failed at.
        let mut frozen: FxHashMap<Id, NodeError> = FxHashMap::default();
        let mut semantic_failed: FxHashSet<Id> = FxHashSet::default();
        let mut migrated: Option<AtomGraph> = None;

        for (hop, table) in &steps {
            let table: &VersionTable = table;
            let input = migrated.as_ref().unwrap_or(graph);
            let structural = patch_graph_frozen(self.registry, table, input, &frozen)?;
            stats.structural_patches += structural.invocations;
            for failure in &structural.failures {
                frozen.insert(failure.id.clone(), failure.error.clone());
            }
            failures.extend(structural.failures);
            let mut output = structural.graph;
            let mut created = structural.synthesized;

            if let (Some(hop), true) = (*hop, self.options.semantic) {
                let skip: FxHashSet<Id> = frozen.keys().chain(semantic_failed.iter()).cloned().collect();
                let pass = SemanticPass {
                    patches: self.registry.semantic(),
                    creators: self.registry.creators(),
                    table,
                    context: &self.context,
                    hop,
                };
                let before = failures.len();
                stats.semantic_patches += pass.run(input, &mut output, &skip, &mut created, &mut failures);
                semantic_failed.extend(failures[before..].iter().map(|f| f.id.clone()));
                debug!(
                    "event=migrate_hop module=patch status=done context={} from={} to={} objects={}",
                    self.context,
                    hop.from,
                    hop.to,
                    output.len()
                );
            }
            synthesized.extend(created);
            migrated = Some(output);
        }
        let mut output = migrated.unwrap_or_else(|| graph.clone());

        output.set_tag(current.clone());
        stats.objects = output.len();
        stats.created = synthesized.len();

        if !failures.is_empty() {
            error!(
                "event=migrate module=patch status=incomplete context={} from={} to={} failures={}",
                self.context,
                origin.version,
                current.version,
                failures.len()
            );
            return Err(MigrationError::Incomplete {
                graph: Box::new(output),
                failures,
            });
        }
        info!(
            "event=migrate module=patch status=ok context={} from={} to={} objects={} structural={} semantic={} created={}",
            self.context,
            origin.version,
            current.version,
            stats.objects,
            stats.structural_patches,
            stats.semantic_patches,
            stats.created
        );
        Ok((output, stats))
    }
}

/// Migrates `graph` with default options to the current version of the
/// context named by `origin`.
pub fn migrate(registry: &PatchRegistry, graph: &AtomGraph, origin: &ContextVersion) -> Result<AtomGraph, MigrationError> {
    Migrator::new(registry, origin.context.clone()).migrate(graph, origin)
}
