//! The semantic patch engine.
//!
//! Runs once per context-version hop, after the structural pass of that
//! hop has brought every object to the class versions of the hop's target.
//! Patches are looked up by `(context, hop, classname, version)`, taking
//! the object's key as it was at the start of the hop, and are optional:
//! an object with no matching patch is left alone. Each object is visited
//! at most once per hop, shared or not.

use log::{debug, info, warn};
use rustc_hash::FxHashSet;

use crate::error::{NodeError, NodeFailure};
use crate::model::{child_id, AtomGraph, Id, ObjectAtom, VersionKey};
use crate::patch::{CreatorDb, SemanticKey, SemanticPatchDb, VersionHop, VersionTable};

/// What a semantic patch body can see and do besides editing its object.
///
/// The object being patched is taken out of the graph while its body runs,
/// so [`SemanticContext::object`] does not return it.
pub struct SemanticContext<'a> {
    context: &'a str,
    hop: &'a VersionHop,
    node: &'a str,
    origin: &'a AtomGraph,
    graph: &'a mut AtomGraph,
    creators: &'a CreatorDb,
    table: &'a VersionTable,
    synthesized: &'a mut FxHashSet<Id>,
    creations: usize,
}

impl SemanticContext<'_> {
    /// Id of the object being patched.
    pub fn node_id(&self) -> &str {
        self.node
    }

    /// Name of the context being migrated.
    pub fn context(&self) -> &str {
        self.context
    }

    /// The context-version hop this pass applies.
    pub fn hop(&self) -> &VersionHop {
        self.hop
    }

    /// Returns an object as it was at the start of the hop.
    pub fn origin(&self, id: &str) -> Option<&ObjectAtom> {
        self.origin.get(id)
    }

    /// Returns another object of the structurally patched graph.
    pub fn object(&self, id: &str) -> Option<&ObjectAtom> {
        self.graph.get(id)
    }

    pub fn object_mut(&mut self, id: &str) -> Option<&mut ObjectAtom> {
        self.graph.get_mut(id)
    }

    /// Synthesizes a default object at the version of `classname` in the
    /// hop's target table and adds it to the graph. Returns its id.
    pub fn create(&mut self, classname: &str) -> Result<Id, NodeError> {
        let version = self
            .table
            .current(classname)
            .ok_or_else(|| NodeError::UnknownClass {
                classname: classname.to_string(),
                version: String::new(),
            })?;
        let key = VersionKey::new(classname, version);
        let salt = format!("{}>{}:{key}#{}", self.hop.from, self.hop.to, self.creations);
        let id = child_id(self.node, &salt);
        self.creations += 1;

        let created = self.creators.create(&key, id.clone())?;
        self.synthesized.extend(created.traversal_order());
        self.graph.absorb(created);
        debug!(
            "event=create_object module=semantic status=ok id={id} key={key} parent={}",
            self.node
        );
        Ok(id)
    }
}

/// Inputs of one semantic hop.
pub struct SemanticPass<'r> {
    pub patches: &'r SemanticPatchDb,
    pub creators: &'r CreatorDb,
    /// Class versions of the hop's target, used by [`SemanticContext::create`].
    pub table: &'r VersionTable,
    pub context: &'r str,
    pub hop: &'r VersionHop,
}

impl SemanticPass<'_> {
    /// Applies the semantic patches of this hop to `graph`.
    ///
    /// `origin` is the graph at the start of the hop, before its structural
    /// pass; it selects the patch for each object. Objects in `skip` (failed or synthesized)
    /// are not visited. Returns the number of patch bodies invoked.
    pub fn run(
        &self,
        origin: &AtomGraph,
        graph: &mut AtomGraph,
        skip: &FxHashSet<Id>,
        synthesized: &mut FxHashSet<Id>,
        failures: &mut Vec<NodeFailure>,
    ) -> usize {
        let mut invocations = 0;
        let mut failed = 0;
        for id in origin.traversal_order() {
            if skip.contains(&id) || synthesized.contains(&id) {
                continue;
            }
            let Some(before) = origin.get(&id) else {
                continue;
            };
            let key = SemanticKey::new(
                self.context,
                self.hop.from.clone(),
                self.hop.to.clone(),
                before.classname(),
                before.version(),
            );
            let Some(patch) = self.patches.get(&key) else {
                continue;
            };
            let Some(structural) = graph.remove(&id) else {
                continue;
            };
            let mut object = structural.clone();

            invocations += 1;
            let mut ctx = SemanticContext {
                context: self.context,
                hop: self.hop,
                node: &id,
                origin,
                graph: &mut *graph,
                creators: self.creators,
                table: self.table,
                synthesized: &mut *synthesized,
                creations: 0,
            };
            match patch(before, &mut object, &mut ctx) {
                Ok(()) => {
                    debug!(
                        "event=apply_patch module=semantic status=ok id={id} context={} from={} to={}",
                        self.context, self.hop.from, self.hop.to
                    );
                    graph.insert(object);
                }
                Err(error) => {
                    warn!(
                        "event=apply_patch module=semantic status=failed id={id} code={} error={error}",
                        error.code().code()
                    );
                    // Edits of a failed body are dropped.
                    graph.insert(structural);
                    failures.push(NodeFailure::at(before, error));
                    failed += 1;
                }
            }
        }
        info!(
            "event=semantic_pass module=semantic status=done context={} from={} to={} invocations={invocations} failures={failed}",
            self.context, self.hop.from, self.hop.to
        );
        invocations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::builder::GraphBuilder;
    use crate::model::Atom;
    use crate::patch::PatchRegistry;

    fn hop() -> VersionHop {
        VersionHop {
            from: "1".to_string(),
            to: "2".to_string(),
        }
    }

    fn scene() -> AtomGraph {
        GraphBuilder::new()
            .tag("MedicalData", "1")
            .root("scene", "Scene", "1", |o| {
                o.sequence("volumes", [Atom::object("v1"), Atom::object("v2")])
            })
            .object("v1", "Volume", "1", |o| o.string("unit", "mm").object("image", "img"))
            .object("v2", "Volume", "1", |o| o.string("unit", "cm").object("image", "img"))
            .object("img", "Image", "1", |o| o.real("spacing", 1.0))
            .build()
    }

    fn run(registry: &PatchRegistry, graph: &mut AtomGraph, origin: &AtomGraph) -> (usize, Vec<NodeFailure>, FxHashSet<Id>) {
        let table = VersionTable::new()
            .with("Scene", "1")
            .with("Volume", "1")
            .with("Image", "1")
            .with("Label", "1");
        let hop = hop();
        let pass = SemanticPass {
            patches: registry.semantic(),
            creators: registry.creators(),
            table: &table,
            context: "MedicalData",
            hop: &hop,
        };
        let mut failures = Vec::new();
        let mut synthesized = FxHashSet::default();
        let count = pass.run(origin, graph, &FxHashSet::default(), &mut synthesized, &mut failures);
        (count, failures, synthesized)
    }

    #[test]
    fn test_cross_object_adjustment() {
        let registry = PatchRegistry::new();
        registry
            .register_semantic_patch(
                SemanticKey::new("MedicalData", "1", "2", "Volume", "1"),
                |origin, object, ctx| {
                    // Context 2 stores everything in millimetres
                    if origin.get_str("unit")? == "cm" {
                        let image = object.get_object("image")?.to_string();
                        if let Some(image) = ctx.object_mut(&image) {
                            let spacing = image.get_numeric("spacing")?.as_f64();
                            image.replace_attribute("spacing", spacing * 10.0)?;
                        }
                        object.replace_attribute("unit", "mm")?;
                    }
                    Ok(())
                },
            )
            .unwrap();
        let origin = scene();
        let mut graph = origin.clone();

        let (count, failures, _) = run(&registry, &mut graph, &origin);
        assert!(failures.is_empty());
        assert_eq!(count, 2);
        assert_eq!(graph.get("v2").unwrap().get_str("unit"), Ok("mm"));
        assert_eq!(graph.get("img").unwrap().get_numeric("spacing").unwrap().as_f64(), 10.0);
    }

    #[test]
    fn test_missing_semantic_patch_is_not_an_error() {
        let registry = PatchRegistry::new();
        let origin = scene();
        let mut graph = origin.clone();
        let (count, failures, _) = run(&registry, &mut graph, &origin);
        assert_eq!(count, 0);
        assert!(failures.is_empty());
        assert_eq!(graph, origin);
    }

    #[test]
    fn test_shared_object_visited_once() {
        let registry = PatchRegistry::new();
        registry
            .register_semantic_patch(SemanticKey::new("MedicalData", "1", "2", "Image", "1"), |_, object, _| {
                let spacing = object.get_numeric("spacing")?.as_f64();
                object.replace_attribute("spacing", spacing + 1.0)?;
                Ok(())
            })
            .unwrap();
        let origin = scene();
        let mut graph = origin.clone();
        let (count, _, _) = run(&registry, &mut graph, &origin);
        assert_eq!(count, 1);
        assert_eq!(graph.get("img").unwrap().get_numeric("spacing").unwrap().as_f64(), 2.0);
    }

    #[test]
    fn test_failed_body_keeps_structural_result() {
        let registry = PatchRegistry::new();
        registry
            .register_semantic_patch(SemanticKey::new("MedicalData", "1", "2", "Volume", "1"), |_, object, _| {
                object.replace_attribute("unit", "garbage")?;
                Err(NodeError::patch("unit table unavailable"))
            })
            .unwrap();
        let origin = scene();
        let mut graph = origin.clone();
        let (_, failures, _) = run(&registry, &mut graph, &origin);
        assert_eq!(failures.len(), 2);
        assert_eq!(graph.get("v1").unwrap().get_str("unit"), Ok("mm"));
        assert_eq!(graph.get("v2").unwrap().get_str("unit"), Ok("cm"));
    }

    #[test]
    fn test_create_at_current_version() {
        let registry = PatchRegistry::new();
        registry
            .register_creator(VersionKey::new("Label", "1"), |obj, _| {
                obj.set_attribute("text", "");
                Ok(())
            })
            .unwrap();
        registry
            .register_semantic_patch(SemanticKey::new("MedicalData", "1", "2", "Scene", "1"), |_, object, ctx| {
                let label = ctx.create("Label")?;
                object.add_attribute("label", Atom::object(label))?;
                Ok(())
            })
            .unwrap();
        let origin = scene();
        let mut graph = origin.clone();
        let (_, failures, synthesized) = run(&registry, &mut graph, &origin);
        assert!(failures.is_empty());

        let label = graph.get("scene").unwrap().get_object("label").unwrap();
        assert_eq!(graph.get(label).unwrap().key(), VersionKey::new("Label", "1"));
        assert!(synthesized.contains(label));
        assert_eq!(graph.len(), origin.len() + 1);
    }
}
