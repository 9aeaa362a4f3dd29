//! Benchmark for loading old scenes: migrate, reconstruct, save.
//!
//! Builds a synthetic "Studio 1" scene of meshes sharing a pool of
//! materials, migrates it to "Studio 3", loads it into live objects and
//! saves it again.

use std::any::Any;
use std::time::Instant;

use atom_patch::model::builder::GraphBuilder;
use atom_patch::{
    from_atoms, to_atoms, Atom, AtomGraph, Blob, ClassFactory, ContextVersion, Id, Migrator, NodeError,
    PatchKey, PatchRegistry, PropertyValue, PropertyVisitor, ReadPolicy, Reflect, SemanticKey, VersionTable,
};
use flexi_logger::Logger;
use log::info;

const MATERIAL_POOL: usize = 64;
const VERTEX_BYTES: usize = 3 * 4 * 32;

// =============================================================================
// LIVE CLASSES (Studio 3)
// =============================================================================

macro_rules! reflect_any {
    () => {
        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    };
}

fn unknown(name: &str) -> NodeError {
    NodeError::patch(format!("unknown property `{name}`"))
}

#[derive(Debug, Default)]
struct Scene {
    id: Id,
    units: String,
    meshes: Vec<Option<Id>>,
}

impl Reflect for Scene {
    fn classname(&self) -> &str {
        "Scene"
    }

    fn version(&self) -> &str {
        "1"
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: Id) {
        self.id = id;
    }

    fn visit_properties(&self, visitor: &mut dyn PropertyVisitor) {
        visitor.visit("units", PropertyValue::Text(self.units.clone()));
        visitor.visit(
            "meshes",
            PropertyValue::Array(self.meshes.iter().cloned().map(PropertyValue::Object).collect()),
        );
    }

    fn set_property(&mut self, name: &str, value: PropertyValue) -> Result<(), NodeError> {
        match name {
            "units" => self.units = value.into_text(name)?,
            "meshes" => {
                self.meshes = value
                    .into_array(name)?
                    .into_iter()
                    .map(|item| item.into_object(name))
                    .collect::<Result<_, _>>()?
            }
            _ => return Err(unknown(name)),
        }
        Ok(())
    }

    reflect_any!();
}

#[derive(Debug, Default)]
struct Mesh {
    id: Id,
    positions: Option<Blob>,
    normals: Vec<f64>,
    material: Option<Id>,
}

impl Reflect for Mesh {
    fn classname(&self) -> &str {
        "Mesh"
    }

    fn version(&self) -> &str {
        "3"
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: Id) {
        self.id = id;
    }

    fn visit_properties(&self, visitor: &mut dyn PropertyVisitor) {
        if let Some(positions) = &self.positions {
            visitor.visit("positions", PropertyValue::Blob(positions.clone()));
        }
        visitor.visit(
            "normals",
            PropertyValue::Array(self.normals.iter().copied().map(PropertyValue::Real).collect()),
        );
        visitor.visit("material", PropertyValue::Object(self.material.clone()));
    }

    fn set_property(&mut self, name: &str, value: PropertyValue) -> Result<(), NodeError> {
        match name {
            "positions" => self.positions = Some(value.into_blob(name)?),
            "normals" => {
                self.normals = value
                    .into_array(name)?
                    .into_iter()
                    .map(|item| item.into_f64(name))
                    .collect::<Result<_, _>>()?
            }
            "material" => self.material = value.into_object(name)?,
            _ => return Err(unknown(name)),
        }
        Ok(())
    }

    reflect_any!();
}

#[derive(Debug, Default)]
struct Material {
    id: Id,
    shading_mode: String,
    diffuse_texture_filtering: String,
}

impl Reflect for Material {
    fn classname(&self) -> &str {
        "Material"
    }

    fn version(&self) -> &str {
        "2"
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: Id) {
        self.id = id;
    }

    fn visit_properties(&self, visitor: &mut dyn PropertyVisitor) {
        visitor.visit("shading_mode", PropertyValue::Enum(self.shading_mode.clone()));
        visitor.visit(
            "diffuse_texture_filtering",
            PropertyValue::Text(self.diffuse_texture_filtering.clone()),
        );
    }

    fn set_property(&mut self, name: &str, value: PropertyValue) -> Result<(), NodeError> {
        match name {
            "shading_mode" => self.shading_mode = value.into_symbol(name)?,
            "diffuse_texture_filtering" => self.diffuse_texture_filtering = value.into_text(name)?,
            _ => return Err(unknown(name)),
        }
        Ok(())
    }

    reflect_any!();
}

// =============================================================================
// PATCHES
// =============================================================================

fn registry() -> PatchRegistry {
    let registry = PatchRegistry::new();
    let versions = [
        ("1", VersionTable::new().with("Scene", "1").with("Mesh", "1").with("Material", "1")),
        ("2", VersionTable::new().with("Scene", "1").with("Mesh", "2").with("Material", "2")),
        ("3", VersionTable::new().with("Scene", "1").with("Mesh", "3").with("Material", "2")),
    ];
    for (version, table) in versions {
        registry
            .register_version("Studio", version, table)
            .expect("Failed to register version");
    }

    registry
        .register_structural_patch(PatchKey::step("Mesh", "1", "2"), |_, target, ctx| {
            target.rename_attribute("vertices", "positions")?;
            // Materials must be current before the mesh is
            let material = target.attribute("material")?.clone();
            ctx.migrate_children(&material)
        })
        .expect("Failed to register patch");
    registry
        .register_structural_patch(PatchKey::step("Mesh", "2", "3"), |_, target, _| {
            target.add_attribute("normals", Atom::Sequence(Vec::new()))?;
            Ok(())
        })
        .expect("Failed to register patch");
    registry
        .register_structural_patch(PatchKey::step("Material", "1", "2"), |origin, target, _| {
            let mode = if origin.get_bool("gouraud_shading")? { "GOURAUD" } else { "PHONG" };
            target.remove_attribute("gouraud_shading")?;
            target.add_attribute("shading_mode", mode)?;
            target.add_attribute("diffuse_texture_filtering", "LINEAR")?;
            Ok(())
        })
        .expect("Failed to register patch");
    registry
        .register_semantic_patch(SemanticKey::new("Studio", "2", "3", "Scene", "1"), |_, scene, _| {
            // Studio 3 stores lengths in millimetres
            scene.replace_attribute("units", "mm")?;
            Ok(())
        })
        .expect("Failed to register semantic patch");
    registry
}

// =============================================================================
// SCENE
// =============================================================================

fn build_scene(meshes: usize) -> AtomGraph {
    let vertices = Blob::new(vec![0u8; VERTEX_BYTES]);
    let mesh_refs: Vec<Atom> = (0..meshes).map(|i| Atom::object(format!("mesh-{i}"))).collect();

    let mut builder = GraphBuilder::new()
        .tag("Studio", "1")
        .root("scene", "Scene", "1", |o| o.string("units", "cm").sequence("meshes", mesh_refs));
    for i in 0..MATERIAL_POOL {
        builder = builder.object(format!("material-{i}"), "Material", "1", |o| {
            o.boolean("gouraud_shading", i % 2 == 0)
        });
    }
    for i in 0..meshes {
        let vertices = vertices.clone();
        builder = builder.object(format!("mesh-{i}"), "Mesh", "1", |o| {
            o.blob("vertices", vertices)
                .object("material", format!("material-{}", i % MATERIAL_POOL))
        });
    }
    builder.build()
}

fn main() {
    let _logger = Logger::try_with_env_or_str("info")
        .expect("Invalid log level")
        .log_to_stderr()
        .format(flexi_logger::detailed_format)
        .start()
        .expect("Failed to start logger");

    let meshes: usize = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(100_000);

    let registry = registry();
    info!(
        "event=bench_start module=bench status=ok meshes={meshes} patches={} creators={}",
        registry.patch_count(),
        registry.creator_count()
    );

    let build_start = Instant::now();
    let saved = build_scene(meshes);
    let build_time = build_start.elapsed();
    println!("Built scene of {} objects in {:?}", saved.len(), build_time);

    // Migrate Studio 1 -> Studio 3
    let migrate_start = Instant::now();
    let (current, stats) = Migrator::new(&registry, "Studio")
        .migrate_with_stats(&saved, &ContextVersion::new("Studio", "1"))
        .expect("Failed to migrate");
    let migrate_time = migrate_start.elapsed();
    println!("\nMigrated to {:?} in {:?}", current.tag(), migrate_time);
    println!(
        "  - {} structural patches, {} semantic patches",
        stats.structural_patches, stats.semantic_patches
    );
    println!(
        "  Throughput: {:.0} objects/s",
        stats.objects as f64 / migrate_time.as_secs_f64()
    );

    // Reconstruct live objects
    let factory = ClassFactory::new();
    factory.register_type::<Scene>().expect("Failed to register Scene");
    factory.register_type::<Mesh>().expect("Failed to register Mesh");
    factory.register_type::<Material>().expect("Failed to register Material");

    let load_start = Instant::now();
    let objects = from_atoms(&current, &factory, ReadPolicy::Strict).expect("Failed to load");
    let load_time = load_start.elapsed();
    println!("\nLoaded {} live objects in {:?}", objects.len(), load_time);

    let scene = objects.downcast::<Scene>("scene").expect("Root is a Scene");
    assert_eq!(scene.units, "mm");
    assert_eq!(scene.meshes.len(), meshes);

    // Save again: no patching needed
    let save_start = Instant::now();
    let resaved = to_atoms(&objects, "scene").expect("Failed to save");
    let save_time = save_start.elapsed();
    println!("\nSaved {} atoms in {:?}", resaved.len(), save_time);

    let total = migrate_time + load_time + save_time;
    println!("\n=== Summary ===");
    println!("Migrate: {:>10.2?}", migrate_time);
    println!("Load:    {:>10.2?}", load_time);
    println!("Save:    {:>10.2?}", save_time);
    println!("Total:   {:>10.2?}", total);
}
