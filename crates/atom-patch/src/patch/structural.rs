//! The structural patch engine.
//!
//! Every object node moves through **Unpatched -> Patching -> Patched |
//! Failed**. A node is marked `Patching` before its first patch body runs,
//! so a reference cycle that leads back to it resolves immediately instead
//! of recursing. Nodes are visited in the graph's traversal order; patch
//! bodies may pull children forward through [`PatchContext`], which is the
//! only place the engine recurses.
//!
//! For one node at version key K the engine repeats:
//! 1. stop if K is current in the [`VersionTable`];
//! 2. find the next hop (the registry default, or the one a parent asked
//!    for), else fail with `MissingPatch`;
//! 3. copy the node with the next key set and run the patch body on it.
//!
//! Node failures are collected and never stop the pass. A failed node
//! stays in the output as its unpatched origin, and objects its patches
//! created are dropped with it. The one exception is a node asked to
//! re-enter its own patch with an explicit hop, which aborts the whole
//! pass with a `CycleViolation`.

use log::{debug, error, warn};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::{MigrationError, NodeError, NodeFailure};
use crate::limits::MAX_PATCH_HOPS;
use crate::model::{child_id, Atom, AtomGraph, Id, ObjectAtom, VersionKey};
use crate::patch::{CreatorDb, PatchKey, PatchRegistry, StructuralPatchDb, VersionTable};

#[derive(Debug, Clone, PartialEq)]
enum NodeState {
    Patching,
    Patched,
    Failed(NodeError),
}

/// Result of a structural pass.
#[derive(Debug, Clone, Default)]
pub struct StructuralOutcome {
    /// The migrated graph, with failed nodes left at their origin version.
    pub graph: AtomGraph,
    pub failures: Vec<NodeFailure>,
    /// Objects created by patches; absent from the input graph.
    pub synthesized: FxHashSet<Id>,
    /// Number of patch bodies invoked.
    pub invocations: usize,
}

impl StructuralOutcome {
    /// Ids of the nodes that failed.
    pub fn failed_ids(&self) -> FxHashSet<Id> {
        self.failures.iter().map(|f| f.id.clone()).collect()
    }
}

struct PassEnv<'r> {
    patches: &'r StructuralPatchDb,
    creators: &'r CreatorDb,
    table: &'r VersionTable,
    origin: &'r AtomGraph,
}

#[derive(Default)]
struct PassState {
    output: AtomGraph,
    /// Origins of synthesized objects.
    created: AtomGraph,
    states: FxHashMap<Id, NodeState>,
    /// First hop each patched node took.
    first_hops: FxHashMap<Id, VersionKey>,
    /// Objects created by each node's patches.
    owned: FxHashMap<Id, Vec<Id>>,
    failures: Vec<NodeFailure>,
    synthesized: FxHashSet<Id>,
    abort: Option<MigrationError>,
    invocations: usize,
}

impl PassState {
    fn origin<'a>(&'a self, env: &'a PassEnv<'_>, id: &str) -> Option<&'a ObjectAtom> {
        env.origin.get(id).or_else(|| self.created.get(id))
    }

    /// Drops every object created on behalf of `id`, transitively.
    fn discard_created(&mut self, id: &str) {
        let mut stack = self.owned.remove(id).unwrap_or_default();
        if stack.is_empty() {
            return;
        }
        let mut dropped = FxHashSet::default();
        while let Some(created) = stack.pop() {
            self.created.remove(&created);
            self.output.remove(&created);
            self.synthesized.remove(&created);
            self.states.remove(&created);
            self.first_hops.remove(&created);
            if let Some(more) = self.owned.remove(&created) {
                stack.extend(more);
            }
            dropped.insert(created);
        }
        self.failures.retain(|f| !dropped.contains(&f.id));
        debug!(
            "event=discard_created module=patch status=ok parent={id} objects={}",
            dropped.len()
        );
    }
}

/// Brings every object of `origin` to the version `table` names current.
///
/// Returns an error only when the pass aborts; per-node failures are
/// reported in the outcome.
pub fn patch_graph(
    registry: &PatchRegistry,
    table: &VersionTable,
    origin: &AtomGraph,
) -> Result<StructuralOutcome, MigrationError> {
    patch_graph_frozen(registry, table, origin, &FxHashMap::default())
}

/// Like [`patch_graph`], but nodes in `frozen` are copied through as they
/// are and count as failed with the given error. Their failures are not
/// reported again.
pub(crate) fn patch_graph_frozen(
    registry: &PatchRegistry,
    table: &VersionTable,
    origin: &AtomGraph,
    frozen: &FxHashMap<Id, NodeError>,
) -> Result<StructuralOutcome, MigrationError> {
    let env = PassEnv {
        patches: registry.structural(),
        creators: registry.creators(),
        table,
        origin,
    };
    let mut state = PassState::default();
    for (id, error) in frozen {
        if let Some(object) = origin.get(id) {
            state.states.insert(id.clone(), NodeState::Failed(error.clone()));
            state.output.insert(object.clone());
        }
    }

    for id in origin.traversal_order() {
        // Failures are recorded in the state.
        let _ = ensure(&env, &mut state, &id, None);
        if let Some(abort) = state.abort.take() {
            error!("event=structural_pass module=patch status=aborted error={abort}");
            return Err(abort);
        }
    }

    let PassState {
        mut output,
        states,
        mut failures,
        synthesized,
        invocations,
        ..
    } = state;

    for id in output.traversal_order() {
        // Failed nodes already carry their own error.
        if matches!(states.get(&id), Some(NodeState::Failed(_))) {
            continue;
        }
        let Some(object) = output.get(&id) else {
            continue;
        };
        for target in object.references() {
            if !output.contains(&target) {
                warn!(
                    "event=patch_node module=patch status=failed id={id} code=A007 target={target}"
                );
                failures.push(NodeFailure::at(object, NodeError::DanglingReference { id: target }));
            }
        }
    }

    if let Some(root) = origin.root() {
        output.set_root(root);
    }
    if let Some(tag) = origin.tag() {
        output.set_tag(tag.clone());
    }
    debug!(
        "event=structural_pass module=patch status=done objects={} invocations={invocations} failures={}",
        output.len(),
        failures.len()
    );
    Ok(StructuralOutcome {
        graph: output,
        failures,
        synthesized,
        invocations,
    })
}

/// Migrates one node unless this pass already started it.
///
/// `via` forces the first hop.
fn ensure(env: &PassEnv<'_>, state: &mut PassState, id: &str, via: Option<&VersionKey>) -> Result<(), NodeError> {
    if state.abort.is_some() {
        return Err(NodeError::CycleViolation { id: id.to_string() });
    }
    match state.states.get(id) {
        Some(NodeState::Patched) => return Ok(()),
        Some(NodeState::Failed(error)) => return Err(error.clone()),
        Some(NodeState::Patching) if via.is_none() => return Ok(()),
        Some(NodeState::Patching) => {
            let classname = state
                .origin(env, id)
                .map(|o| o.classname().to_string())
                .unwrap_or_default();
            error!("event=patch_node module=patch status=cycle_violation id={id} classname={classname}");
            state.abort = Some(MigrationError::CycleViolation {
                id: id.to_string(),
                classname,
            });
            return Err(NodeError::CycleViolation { id: id.to_string() });
        }
        None => {}
    }

    let Some(origin) = state.origin(env, id).cloned() else {
        return Err(NodeError::DanglingReference { id: id.to_string() });
    };
    state.states.insert(id.to_string(), NodeState::Patching);

    match run_chain(env, state, &origin, via) {
        Ok(target) => {
            debug!(
                "event=patch_node module=patch status=ok id={id} from={} to={}",
                origin.key(),
                target.key()
            );
            state.states.insert(id.to_string(), NodeState::Patched);
            state.output.insert(target);
            Ok(())
        }
        Err(error) => {
            warn!(
                "event=patch_node module=patch status=failed id={id} classname={} code={} error={error}",
                origin.classname(),
                error.code().code()
            );
            state.discard_created(id);
            state.failures.push(NodeFailure::at(&origin, error.clone()));
            state.states.insert(id.to_string(), NodeState::Failed(error.clone()));
            state.output.insert(origin);
            Err(error)
        }
    }
}

fn missing_patch(env: &PassEnv<'_>, key: &VersionKey) -> NodeError {
    NodeError::MissingPatch {
        origin: key.clone(),
        current: env.table.current(&key.classname).map(str::to_string),
    }
}

fn run_chain(
    env: &PassEnv<'_>,
    state: &mut PassState,
    origin: &ObjectAtom,
    via: Option<&VersionKey>,
) -> Result<ObjectAtom, NodeError> {
    let mut current = origin.clone();
    let mut seen = vec![current.key()];
    let mut forced = via.cloned();
    let mut creations = 0;

    loop {
        let key = current.key();
        let next = match forced.take() {
            Some(next) => next,
            None => {
                if env.table.is_current(&key) {
                    return Ok(current);
                }
                env.patches.next_hop(&key).ok_or_else(|| missing_patch(env, &key))?
            }
        };
        if seen.contains(&next) || seen.len() > MAX_PATCH_HOPS {
            return Err(NodeError::ChainLoop { key: next });
        }
        let step = PatchKey::new(key.clone(), next.clone());
        let patch = env.patches.get(&step).ok_or_else(|| missing_patch(env, &key))?;
        if seen.len() == 1 {
            state.first_hops.insert(origin.id().to_string(), next.clone());
        }

        let mut target = current.clone();
        target.set_key(&next);
        state.invocations += 1;
        let mut ctx = PatchContext {
            env,
            state: &mut *state,
            node: origin.id(),
            step: &step,
            creations,
        };
        patch(&current, &mut target, &mut ctx)?;
        creations = ctx.creations;

        debug!(
            "event=apply_patch module=patch status=ok id={} from={key} to={next}",
            origin.id()
        );
        seen.push(next);
        current = target;
    }
}

/// What a structural patch body can see and do besides editing its target.
pub struct PatchContext<'a> {
    env: &'a PassEnv<'a>,
    state: &'a mut PassState,
    node: &'a str,
    step: &'a PatchKey,
    creations: usize,
}

impl PatchContext<'_> {
    /// Id of the node being patched.
    pub fn node_id(&self) -> &str {
        self.node
    }

    /// Returns an object as it was before this pass.
    pub fn origin(&self, id: &str) -> Option<&ObjectAtom> {
        self.state.origin(self.env, id)
    }

    /// Returns an object once it is fully patched.
    pub fn patched(&self, id: &str) -> Option<&ObjectAtom> {
        match self.state.states.get(id) {
            Some(NodeState::Patched) => self.state.output.get(id),
            _ => None,
        }
    }

    /// Mutable access to a fully patched object.
    pub fn patched_mut(&mut self, id: &str) -> Option<&mut ObjectAtom> {
        match self.state.states.get(id) {
            Some(NodeState::Patched) => self.state.output.get_mut(id),
            _ => None,
        }
    }

    /// Current version of a class in the target table.
    pub fn current_version(&self, classname: &str) -> Option<&str> {
        self.env.table.current(classname)
    }

    /// Migrates `id` along its default chain now, before this patch
    /// continues. A node that is already in progress (a cycle) returns
    /// immediately.
    ///
    /// On error the child's own failure has already been recorded.
    pub fn migrate_child(&mut self, id: &str) -> Result<(), NodeError> {
        ensure(self.env, self.state, id, None)
    }

    /// Migrates `id` taking `next_hop` as its first hop instead of the
    /// registry default; the default chain follows. The patch
    /// `(child key -> next_hop)` must be registered.
    ///
    /// Asking this of a node that is already in progress aborts the pass.
    /// A node already patched along another first hop fails this patch.
    pub fn migrate_child_via(&mut self, id: &str, next_hop: &VersionKey) -> Result<(), NodeError> {
        if let Some(NodeState::Patched) = self.state.states.get(id) {
            if self.state.first_hops.get(id) == Some(next_hop) {
                return Ok(());
            }
            warn!(
                "event=migrate_child module=patch status=conflict id={id} next={next_hop} parent={}",
                self.node
            );
            return Err(NodeError::patch(format!(
                "next hop {next_hop} requested after `{id}` was patched"
            )));
        }
        if let Some(child) = self.state.origin(self.env, id) {
            let key = PatchKey::new(child.key(), next_hop.clone());
            if !self.env.patches.contains(&key) && !matches!(self.state.states.get(id), Some(NodeState::Patching)) {
                return Err(missing_patch(self.env, &key.origin));
            }
        }
        ensure(self.env, self.state, id, Some(next_hop))
    }

    /// Migrates every object referenced by `atom` along its default chain.
    ///
    /// Returns the first child failure after trying all of them.
    pub fn migrate_children(&mut self, atom: &Atom) -> Result<(), NodeError> {
        let mut first_error = None;
        for id in atom.references() {
            if let Err(error) = self.migrate_child(&id) {
                first_error.get_or_insert(error);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Synthesizes a default object at exactly `(classname, version)` and
    /// migrates it to its current version. Returns its id.
    ///
    /// The id is derived from the node being patched and the patch step,
    /// so re-running the same migration produces the same ids.
    pub fn create(&mut self, classname: &str, version: &str) -> Result<Id, NodeError> {
        let key = VersionKey::new(classname, version);
        let salt = format!("{}>{}:{key}#{}", self.step.origin, self.step.target, self.creations);
        let id = child_id(self.node, &salt);
        self.creations += 1;

        let graph = self.env.creators.create(&key, id.clone())?;
        let ids = graph.traversal_order();
        self.state.synthesized.extend(ids.iter().cloned());
        self.state
            .owned
            .entry(self.node.to_string())
            .or_default()
            .extend(ids.iter().cloned());
        self.state.created.absorb(graph);
        debug!(
            "event=create_object module=patch status=ok id={id} key={key} parent={}",
            self.node
        );
        for created in &ids {
            ensure(self.env, self.state, created, None)?;
        }
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::error::ErrorCode;
    use crate::model::builder::GraphBuilder;

    fn widget_registry() -> PatchRegistry {
        let registry = PatchRegistry::new();
        registry
            .register_structural_patch(PatchKey::step("Widget", "1", "2"), |origin, target, _| {
                // v2 renames `size` to `width`
                let size = origin.attribute("size")?.clone();
                target.remove_attribute("size")?;
                target.add_attribute("width", size)?;
                Ok(())
            })
            .unwrap();
        registry
            .register_structural_patch(PatchKey::step("Widget", "2", "3"), |_, target, _| {
                target.add_attribute("height", 10i64)?;
                Ok(())
            })
            .unwrap();
        registry
    }

    fn widget_table() -> VersionTable {
        VersionTable::new().with("Widget", "3").with("Node", "1")
    }

    #[test]
    fn test_chain_resolution() {
        let registry = widget_registry();
        let graph = GraphBuilder::new()
            .root("w", "Widget", "1", |o| o.int("size", 4))
            .build();

        let outcome = patch_graph(&registry, &widget_table(), &graph).unwrap();
        assert!(outcome.failures.is_empty());
        assert_eq!(outcome.invocations, 2);
        let widget = outcome.graph.get("w").unwrap();
        assert_eq!(widget.key(), VersionKey::new("Widget", "3"));
        assert_eq!(widget.get_numeric("width").unwrap().as_i64(), Some(4));
        assert_eq!(widget.get_numeric("height").unwrap().as_i64(), Some(10));
        assert!(!widget.has_attribute("size"));
        assert_eq!(outcome.graph.root(), Some("w"));
    }

    #[test]
    fn test_material_gains_texture_fields() {
        let registry = PatchRegistry::new();
        registry
            .register_structural_patch(PatchKey::step("Material", "1", "2"), |_, target, _| {
                target.add_attribute("diffuse_texture", Atom::Null)?;
                target.add_attribute("diffuse_texture_filtering", "LINEAR")?;
                Ok(())
            })
            .unwrap();
        let graph = GraphBuilder::new()
            .root("mat", "Material", "1", |o| o.string("shading_mode", "PHONG"))
            .build();
        let table = VersionTable::new().with("Material", "2");

        let outcome = patch_graph(&registry, &table, &graph).unwrap();
        let material = outcome.graph.get("mat").unwrap();
        assert_eq!(material.id(), "mat");
        assert_eq!(material.classname(), "Material");
        assert_eq!(material.version(), "2");
        let names: Vec<&str> = material.attributes().keys().map(String::as_str).collect();
        assert_eq!(names, ["diffuse_texture", "diffuse_texture_filtering", "shading_mode"]);
        assert_eq!(material.get_str("shading_mode"), Ok("PHONG"));
        assert!(material.attribute("diffuse_texture").unwrap().is_null());
        assert_eq!(material.get_str("diffuse_texture_filtering"), Ok("LINEAR"));
    }

    #[test]
    fn test_current_graph_is_unchanged() {
        let registry = widget_registry();
        let graph = GraphBuilder::new()
            .tag("Shop", "2")
            .root("w", "Widget", "3", |o| o.int("width", 1).int("height", 2))
            .build();
        let outcome = patch_graph(&registry, &widget_table(), &graph).unwrap();
        assert_eq!(outcome.invocations, 0);
        assert_eq!(outcome.graph, graph);
    }

    #[test]
    fn test_shared_node_patched_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = PatchRegistry::new();
        let counter = Arc::clone(&calls);
        registry
            .register_structural_patch(PatchKey::step("Leaf", "1", "2"), move |_, _, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
        registry
            .register_structural_patch(PatchKey::step("Parent", "1", "2"), |origin, _, ctx| {
                // Pull the child forward from inside the body
                ctx.migrate_children(origin.attribute("child")?)
            })
            .unwrap();

        let graph = GraphBuilder::new()
            .root("root", "Parent", "1", |o| o.object("child", "leaf"))
            .object("other", "Parent", "1", |o| o.object("child", "leaf"))
            .object("leaf", "Leaf", "1", |o| o)
            .build();
        let table = VersionTable::new().with("Leaf", "2").with("Parent", "2");

        let outcome = patch_graph(&registry, &table, &graph).unwrap();
        assert!(outcome.failures.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.graph.len(), 3);
        for parent in ["root", "other"] {
            assert_eq!(outcome.graph.get(parent).unwrap().get_object("child"), Ok("leaf"));
        }
        assert_eq!(outcome.graph.get("leaf").unwrap().version(), "2");
    }

    #[test]
    fn test_cycle_terminates() {
        let registry = PatchRegistry::new();
        registry
            .register_structural_patch(PatchKey::step("Node", "1", "2"), |origin, target, ctx| {
                ctx.migrate_children(origin.attribute("next")?)?;
                target.set_attribute("visited", true);
                Ok(())
            })
            .unwrap();
        let graph = GraphBuilder::new()
            .root("a", "Node", "1", |o| o.object("next", "b"))
            .object("b", "Node", "1", |o| o.object("next", "a"))
            .build();
        let table = VersionTable::new().with("Node", "2");

        let outcome = patch_graph(&registry, &table, &graph).unwrap();
        assert!(outcome.failures.is_empty());
        assert_eq!(outcome.invocations, 2);
        let a = outcome.graph.get("a").unwrap();
        let b = outcome.graph.get("b").unwrap();
        assert_eq!(a.get_object("next"), Ok("b"));
        assert_eq!(b.get_object("next"), Ok("a"));
        assert_eq!(a.get_bool("visited"), Ok(true));
        assert_eq!(b.get_bool("visited"), Ok(true));
    }

    #[test]
    fn test_missing_patch_keeps_siblings() {
        let registry = widget_registry();
        let graph = GraphBuilder::new()
            .root("root", "Node", "1", |o| {
                o.sequence("children", [Atom::object("w"), Atom::object("u")])
            })
            .object("w", "Widget", "1", |o| o.int("size", 1))
            .object("u", "UnknownClass", "1", |o| o)
            .build();

        let outcome = patch_graph(&registry, &widget_table(), &graph).unwrap();
        assert_eq!(outcome.failures.len(), 1);
        let failure = &outcome.failures[0];
        assert_eq!(failure.id, "u");
        assert_eq!(
            failure.error,
            NodeError::MissingPatch {
                origin: VersionKey::new("UnknownClass", "1"),
                current: None,
            }
        );
        assert_eq!(failure.error.code(), ErrorCode::MissingPatch);
        // Sibling migrated, failed node kept at its origin version
        assert_eq!(outcome.graph.get("w").unwrap().version(), "3");
        assert_eq!(outcome.graph.get("u").unwrap().version(), "1");
    }

    #[test]
    fn test_class_rename() {
        let registry = PatchRegistry::new();
        registry
            .register_structural_patch(
                PatchKey::new(VersionKey::new("Mesh", "1"), VersionKey::new("TriangularMesh", "1")),
                |_, _, _| Ok(()),
            )
            .unwrap();
        registry
            .register_structural_patch(PatchKey::step("TriangularMesh", "1", "2"), |_, target, _| {
                target.add_attribute("normals", Atom::Sequence(Vec::new()))?;
                Ok(())
            })
            .unwrap();
        let graph = GraphBuilder::new().root("m", "Mesh", "1", |o| o).build();
        let table = VersionTable::new().with("TriangularMesh", "2");

        let outcome = patch_graph(&registry, &table, &graph).unwrap();
        let mesh = outcome.graph.get("m").unwrap();
        assert_eq!(mesh.key(), VersionKey::new("TriangularMesh", "2"));
        assert!(mesh.has_attribute("normals"));
    }

    #[test]
    fn test_chain_loop() {
        let registry = PatchRegistry::new();
        registry
            .register_structural_patch(PatchKey::step("Loop", "1", "2"), |_, _, _| Ok(()))
            .unwrap();
        registry
            .register_structural_patch(PatchKey::step("Loop", "2", "1"), |_, _, _| Ok(()))
            .unwrap();
        let graph = GraphBuilder::new().root("l", "Loop", "1", |o| o).build();
        let table = VersionTable::new().with("Loop", "3");

        let outcome = patch_graph(&registry, &table, &graph).unwrap();
        assert_eq!(
            outcome.failures[0].error,
            NodeError::ChainLoop {
                key: VersionKey::new("Loop", "1")
            }
        );
    }

    #[test]
    fn test_explicit_next_hop() {
        let registry = PatchRegistry::new();
        // Default: Shape 1 -> 2. Alternative: Shape 1 -> Circle 1.
        registry
            .register_structural_patch(PatchKey::step("Shape", "1", "2"), |_, _, _| Ok(()))
            .unwrap();
        registry
            .register_structural_patch(
                PatchKey::new(VersionKey::new("Shape", "1"), VersionKey::new("Circle", "1")),
                |origin, target, _| {
                    let radius = origin.attribute("size")?.clone();
                    target.rename_attribute("size", "radius")?;
                    target.replace_attribute("radius", radius)?;
                    Ok(())
                },
            )
            .unwrap();
        registry
            .register_structural_patch(PatchKey::step("Circle", "1", "2"), |_, target, _| {
                target.add_attribute("filled", false)?;
                Ok(())
            })
            .unwrap();
        registry
            .register_structural_patch(PatchKey::step("Drawing", "1", "2"), |origin, _, ctx| {
                // The round shape of a drawing became a Circle
                let round = origin.get_object("round")?;
                ctx.migrate_child_via(round, &VersionKey::new("Circle", "1"))
            })
            .unwrap();

        let graph = GraphBuilder::new()
            .root("d", "Drawing", "1", |o| o.object("round", "s1").object("square", "s2"))
            .object("s1", "Shape", "1", |o| o.real("size", 2.0))
            .object("s2", "Shape", "1", |o| o.real("size", 3.0))
            .build();
        let table = VersionTable::new()
            .with("Drawing", "2")
            .with("Shape", "2")
            .with("Circle", "2");

        let outcome = patch_graph(&registry, &table, &graph).unwrap();
        assert!(outcome.failures.is_empty(), "{:?}", outcome.failures);
        let round = outcome.graph.get("s1").unwrap();
        assert_eq!(round.key(), VersionKey::new("Circle", "2"));
        assert_eq!(round.get_numeric("radius").unwrap().as_f64(), 2.0);
        assert_eq!(round.get_bool("filled"), Ok(false));
        assert_eq!(outcome.graph.get("s2").unwrap().key(), VersionKey::new("Shape", "2"));
    }

    #[test]
    fn test_unregistered_next_hop_is_missing_patch() {
        let registry = PatchRegistry::new();
        registry
            .register_structural_patch(PatchKey::step("Drawing", "1", "2"), |origin, _, ctx| {
                ctx.migrate_child_via(origin.get_object("round")?, &VersionKey::new("Circle", "1"))
            })
            .unwrap();
        let graph = GraphBuilder::new()
            .root("d", "Drawing", "1", |o| o.object("round", "s1"))
            .object("s1", "Shape", "2", |o| o)
            .build();
        let table = VersionTable::new().with("Drawing", "2").with("Shape", "2");

        let outcome = patch_graph(&registry, &table, &graph).unwrap();
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].id, "d");
        assert_eq!(outcome.failures[0].error.code(), ErrorCode::MissingPatch);
        // The child itself still migrates on its default chain
        assert_eq!(outcome.graph.get("s1").unwrap().version(), "2");
    }

    #[test]
    fn test_explicit_reentry_aborts_pass() {
        let registry = PatchRegistry::new();
        registry
            .register_structural_patch(PatchKey::step("Node", "1", "2"), |origin, _, ctx| {
                let next = origin.get_object("next")?;
                ctx.migrate_child_via(next, &VersionKey::new("Node", "2"))
            })
            .unwrap();
        let graph = GraphBuilder::new()
            .root("a", "Node", "1", |o| o.object("next", "b"))
            .object("b", "Node", "1", |o| o.object("next", "a"))
            .build();
        let table = VersionTable::new().with("Node", "2");

        let err = patch_graph(&registry, &table, &graph).unwrap_err();
        assert_eq!(
            err,
            MigrationError::CycleViolation {
                id: "a".to_string(),
                classname: "Node".to_string(),
            }
        );
    }

    #[test]
    fn test_next_hop_after_child_patched_fails_parent() {
        let registry = PatchRegistry::new();
        registry
            .register_structural_patch(PatchKey::step("Shape", "1", "2"), |_, _, _| Ok(()))
            .unwrap();
        registry
            .register_structural_patch(
                PatchKey::new(VersionKey::new("Shape", "1"), VersionKey::new("Circle", "1")),
                |_, _, _| Ok(()),
            )
            .unwrap();
        registry
            .register_structural_patch(PatchKey::step("Drawing", "1", "2"), |origin, _, ctx| {
                ctx.migrate_child_via(origin.get_object("round")?, &VersionKey::new("Circle", "1"))
            })
            .unwrap();
        // `a_shape` sorts first, so s1 takes its default chain before the drawing runs
        let graph = GraphBuilder::new()
            .root("scene", "Scene", "1", |o| o.object("a_shape", "s1").object("drawing", "d"))
            .object("d", "Drawing", "1", |o| o.object("round", "s1"))
            .object("s1", "Shape", "1", |o| o)
            .build();
        let table = VersionTable::new()
            .with("Scene", "1")
            .with("Drawing", "2")
            .with("Shape", "2")
            .with("Circle", "1");

        let outcome = patch_graph(&registry, &table, &graph).unwrap();
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].id, "d");
        assert_eq!(outcome.failures[0].error.code(), ErrorCode::PatchFailed);
        assert_eq!(outcome.graph.get("s1").unwrap().key(), VersionKey::new("Shape", "2"));
        assert_eq!(outcome.graph.get("d").unwrap().version(), "1");
    }

    #[test]
    fn test_same_next_hop_after_child_patched_is_accepted() {
        let registry = PatchRegistry::new();
        registry
            .register_structural_patch(PatchKey::step("Shape", "1", "2"), |_, _, _| Ok(()))
            .unwrap();
        registry
            .register_structural_patch(PatchKey::step("Drawing", "1", "2"), |origin, _, ctx| {
                ctx.migrate_child_via(origin.get_object("round")?, &VersionKey::new("Shape", "2"))
            })
            .unwrap();
        let graph = GraphBuilder::new()
            .root("scene", "Scene", "1", |o| o.object("a_shape", "s1").object("drawing", "d"))
            .object("d", "Drawing", "1", |o| o.object("round", "s1"))
            .object("s1", "Shape", "1", |o| o)
            .build();
        let table = VersionTable::new().with("Scene", "1").with("Drawing", "2").with("Shape", "2");

        let outcome = patch_graph(&registry, &table, &graph).unwrap();
        assert!(outcome.failures.is_empty(), "{:?}", outcome.failures);
        assert_eq!(outcome.graph.get("d").unwrap().version(), "2");
    }

    #[test]
    fn test_failed_node_drops_created_objects() {
        let registry = PatchRegistry::new();
        registry
            .register_creator(VersionKey::new("Texture", "1"), |obj, _| {
                obj.set_attribute("filtering", "NEAREST");
                Ok(())
            })
            .unwrap();
        registry
            .register_structural_patch(PatchKey::step("Material", "1", "2"), |_, target, ctx| {
                let texture = ctx.create("Texture", "1")?;
                target.add_attribute("texture", Atom::object(texture))?;
                Err(NodeError::patch("shading table unavailable"))
            })
            .unwrap();
        let graph = GraphBuilder::new().root("m", "Material", "1", |o| o).build();
        let table = VersionTable::new().with("Material", "2").with("Texture", "1");

        let outcome = patch_graph(&registry, &table, &graph).unwrap();
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].id, "m");
        assert_eq!(outcome.graph.len(), 1);
        assert!(outcome.synthesized.is_empty());
        assert_eq!(outcome.graph.get("m").unwrap().version(), "1");
    }

    #[test]
    fn test_dangling_child_reported_once() {
        let registry = PatchRegistry::new();
        registry
            .register_structural_patch(PatchKey::step("Node", "1", "2"), |origin, _, ctx| {
                ctx.migrate_children(origin.attribute("next")?)
            })
            .unwrap();
        let graph = GraphBuilder::new()
            .root("n", "Node", "1", |o| o.object("next", "ghost"))
            .build();
        let table = VersionTable::new().with("Node", "2");

        let outcome = patch_graph(&registry, &table, &graph).unwrap();
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].id, "n");
        assert_eq!(
            outcome.failures[0].error,
            NodeError::DanglingReference {
                id: "ghost".to_string()
            }
        );
    }

    #[test]
    fn test_frozen_nodes_copied_without_new_failure() {
        let registry = widget_registry();
        let graph = GraphBuilder::new()
            .root("root", "Node", "1", |o| {
                o.sequence("children", [Atom::object("w"), Atom::object("v")])
            })
            .object("w", "Widget", "1", |o| o.int("size", 1))
            .object("v", "Widget", "1", |o| o.int("size", 2))
            .build();
        let mut frozen = FxHashMap::default();
        frozen.insert("v".to_string(), NodeError::patch("failed earlier"));

        let outcome = patch_graph_frozen(&registry, &widget_table(), &graph, &frozen).unwrap();
        assert!(outcome.failures.is_empty());
        assert_eq!(outcome.graph.get("w").unwrap().version(), "3");
        assert_eq!(outcome.graph.get("v").unwrap(), graph.get("v").unwrap());
    }

    #[test]
    fn test_create_synthesizes_at_origin_version() {
        let registry = PatchRegistry::new();
        registry
            .register_creator(VersionKey::new("Texture", "1"), |obj, _| {
                obj.set_attribute("filtering", "NEAREST");
                Ok(())
            })
            .unwrap();
        registry
            .register_structural_patch(PatchKey::step("Texture", "1", "2"), |_, target, _| {
                target.replace_attribute("filtering", "LINEAR")?;
                Ok(())
            })
            .unwrap();
        registry
            .register_structural_patch(PatchKey::step("Material", "1", "2"), |_, target, ctx| {
                let texture = ctx.create("Texture", "1")?;
                target.add_attribute("texture", Atom::object(texture))?;
                Ok(())
            })
            .unwrap();

        let graph = GraphBuilder::new().root("m", "Material", "1", |o| o).build();
        let table = VersionTable::new().with("Material", "2").with("Texture", "2");

        let first = patch_graph(&registry, &table, &graph).unwrap();
        assert!(first.failures.is_empty());
        let texture_id = first.graph.get("m").unwrap().get_object("texture").unwrap().to_string();
        let texture = first.graph.get(&texture_id).unwrap();
        assert_eq!(texture.version(), "2");
        assert_eq!(texture.get_str("filtering"), Ok("LINEAR"));
        assert!(first.synthesized.contains(&texture_id));

        // Deterministic ids
        let second = patch_graph(&registry, &table, &graph).unwrap();
        assert_eq!(first.graph, second.graph);
    }

    #[test]
    fn test_failed_creation_fails_node_only() {
        let registry = PatchRegistry::new();
        registry
            .register_structural_patch(PatchKey::step("Material", "1", "2"), |_, target, ctx| {
                let texture = ctx.create("Texture", "1")?;
                target.add_attribute("texture", Atom::object(texture))?;
                Ok(())
            })
            .unwrap();
        let graph = GraphBuilder::new()
            .root("m", "Material", "1", |o| o)
            .object("n", "Node", "1", |o| o)
            .build();
        let table = VersionTable::new().with("Material", "2").with("Node", "1");

        let outcome = patch_graph(&registry, &table, &graph).unwrap();
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].error.code(), ErrorCode::UnknownClass);
        assert_eq!(outcome.graph.get("m").unwrap().version(), "1");
        assert!(outcome.graph.contains("n"));
    }

    #[test]
    fn test_dangling_reference_reported() {
        let registry = PatchRegistry::new();
        let graph = GraphBuilder::new()
            .root("n", "Node", "1", |o| o.object("next", "ghost"))
            .build();
        let table = VersionTable::new().with("Node", "1");

        let outcome = patch_graph(&registry, &table, &graph).unwrap();
        assert_eq!(
            outcome.failures[0].error,
            NodeError::DanglingReference {
                id: "ghost".to_string()
            }
        );
        assert_eq!(outcome.failures[0].id, "n");
    }

    #[test]
    fn test_deep_graph_does_not_overflow() {
        let registry = widget_registry();
        let mut builder = GraphBuilder::new().root("w0", "Widget", "1", |o| o.int("size", 0).object("next", "w1"));
        for i in 1..20_000 {
            builder = builder.object(format!("w{i}"), "Widget", "1", |o| {
                o.int("size", i).object("next", format!("w{}", i + 1))
            });
        }
        builder = builder.object("w20000", "Widget", "1", |o| o.int("size", 0));
        let graph = builder.build();

        let outcome = patch_graph(&registry, &widget_table(), &graph).unwrap();
        assert!(outcome.failures.is_empty());
        assert_eq!(outcome.invocations, 2 * graph.len());
    }
}
