//! Loads a Material saved by an older release.
//!
//! Material 1 stored a `gouraud_shading` flag and a texture file name.
//! Material 2 replaced them with a shading mode, a texture object and a
//! filtering mode.

use std::any::Any;

use atom_patch::model::builder::GraphBuilder;
use atom_patch::{
    from_atoms, to_atoms, Atom, ClassFactory, ContextVersion, Id, Migrator, NodeError, ObjectGraph,
    PatchKey, PatchRegistry, PropertyValue, PropertyVisitor, ReadPolicy, Reflect, VersionKey, VersionTable,
};

#[derive(Debug, Default)]
struct Material {
    id: Id,
    shading_mode: String,
    diffuse_texture: Option<Id>,
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
        visitor.visit("diffuse_texture", PropertyValue::Object(self.diffuse_texture.clone()));
        visitor.visit(
            "diffuse_texture_filtering",
            PropertyValue::Text(self.diffuse_texture_filtering.clone()),
        );
    }

    fn set_property(&mut self, name: &str, value: PropertyValue) -> Result<(), NodeError> {
        match name {
            "shading_mode" => self.shading_mode = value.into_symbol(name)?,
            "diffuse_texture" => self.diffuse_texture = value.into_object(name)?,
            "diffuse_texture_filtering" => self.diffuse_texture_filtering = value.into_text(name)?,
            _ => return Err(NodeError::patch(format!("unknown property `{name}`"))),
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn registry() -> PatchRegistry {
    let registry = PatchRegistry::new();
    registry
        .register_version("MedicalData", "1", VersionTable::new().with("Material", "1"))
        .expect("Failed to register version 1");
    registry
        .register_version("MedicalData", "2", VersionTable::new().with("Material", "2"))
        .expect("Failed to register version 2");
    registry
        .register_creator(VersionKey::new("Material", "1"), |material, _| {
            material.set_attribute("gouraud_shading", false);
            material.set_attribute("texture_file", "");
            Ok(())
        })
        .expect("Failed to register creator");
    registry
        .register_structural_patch(PatchKey::step("Material", "1", "2"), |origin, target, _| {
            let mode = if origin.get_bool("gouraud_shading")? { "GOURAUD" } else { "PHONG" };
            target.clear_attributes();
            target.add_attribute("shading_mode", mode)?;
            target.add_attribute("diffuse_texture", Atom::Null)?;
            target.add_attribute("diffuse_texture_filtering", "LINEAR")?;
            Ok(())
        })
        .expect("Failed to register patch");
    registry
}

fn main() {
    let registry = registry();
    println!(
        "Registry: {} patch(es), {} creator(s)",
        registry.patch_count(),
        registry.creator_count()
    );

    let saved = GraphBuilder::new()
        .tag("MedicalData", "1")
        .root("mat-1", "Material", "1", |o| {
            o.boolean("gouraud_shading", true).string("texture_file", "skin.png")
        })
        .build();
    println!("\n=== Saved (MedicalData 1) ===");
    println!("{:#?}", saved.root_object().expect("Saved graph has a root"));

    let migrator = Migrator::new(&registry, "MedicalData");
    let current = migrator
        .migrate(&saved, &ContextVersion::new("MedicalData", "1"))
        .expect("Failed to migrate");
    println!("\n=== Migrated ({}) ===", current.tag().expect("Migrated graph is tagged"));
    println!("{:#?}", current.root_object().expect("Migrated graph has a root"));

    let factory = ClassFactory::new();
    factory.register_type::<Material>().expect("Failed to register Material");
    let objects: ObjectGraph = from_atoms(&current, &factory, ReadPolicy::Change).expect("Failed to load");
    let root = objects.root().expect("Loaded graph has a root").to_string();
    let material = objects.downcast::<Material>(&root).expect("Root is a Material");
    println!("\n=== Loaded ===");
    println!("{material:#?}");

    // Saving writes the current version directly
    let resaved = to_atoms(&objects, &root).expect("Failed to save");
    println!("\nResaved at version {}", resaved.get(&root).expect("Root saved").version());
}
