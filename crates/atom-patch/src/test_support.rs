//! Domain classes used by the unit tests.

use std::any::Any;

use crate::convert::{ClassFactory, PropertyValue, PropertyVisitor, Reflect};
use crate::error::NodeError;
use crate::model::{Blob, Id};

fn unknown_property(name: &str) -> NodeError {
    NodeError::patch(format!("unknown property `{name}`"))
}

fn reference(id: &Option<Id>) -> PropertyValue {
    PropertyValue::Object(id.clone())
}

macro_rules! impl_any {
    () => {
        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    };
}

/// Registers every test class.
pub fn factory() -> ClassFactory {
    let factory = ClassFactory::new();
    for result in [
        factory.register_type::<Material>(),
        factory.register_type::<Image>(),
        factory.register_type::<Node>(),
        factory.register_type::<Composite>(),
    ] {
        if let Err(err) = result {
            panic!("test factory registration failed: {err}");
        }
    }
    factory
}

// =========================================================================
// Material
// =========================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ShadingMode {
    Ambient,
    Flat,
    Gouraud,
    #[default]
    Phong,
}

impl ShadingMode {
    pub fn name(self) -> &'static str {
        match self {
            ShadingMode::Ambient => "AMBIENT",
            ShadingMode::Flat => "FLAT",
            ShadingMode::Gouraud => "GOURAUD",
            ShadingMode::Phong => "PHONG",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "AMBIENT" => Some(ShadingMode::Ambient),
            "FLAT" => Some(ShadingMode::Flat),
            "GOURAUD" => Some(ShadingMode::Gouraud),
            "PHONG" => Some(ShadingMode::Phong),
            _ => None,
        }
    }

    pub const ALL: [ShadingMode; 4] = [
        ShadingMode::Ambient,
        ShadingMode::Flat,
        ShadingMode::Gouraud,
        ShadingMode::Phong,
    ];
}

fn shading_mode(name: &str, value: PropertyValue) -> Result<ShadingMode, NodeError> {
    let symbol = value.into_symbol(name)?;
    ShadingMode::from_name(&symbol).ok_or_else(|| NodeError::TypeMismatch {
        attribute: name.to_string(),
        expected: "shading mode",
        found: "text",
    })
}

/// Material at version 2: v1 had no texture fields.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Material {
    pub id: Id,
    pub shading_mode: ShadingMode,
    pub diffuse_texture: Option<Id>,
    pub diffuse_texture_filtering: String,
}

impl Material {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            shading_mode: ShadingMode::Phong,
            diffuse_texture: None,
            diffuse_texture_filtering: "LINEAR".to_string(),
        }
    }
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
        visitor.visit("shading_mode", PropertyValue::Enum(self.shading_mode.name().to_string()));
        visitor.visit("diffuse_texture", reference(&self.diffuse_texture));
        visitor.visit(
            "diffuse_texture_filtering",
            PropertyValue::Text(self.diffuse_texture_filtering.clone()),
        );
    }

    fn set_property(&mut self, name: &str, value: PropertyValue) -> Result<(), NodeError> {
        match name {
            "shading_mode" => self.shading_mode = shading_mode(name, value)?,
            "diffuse_texture" => self.diffuse_texture = value.into_object(name)?,
            "diffuse_texture_filtering" => self.diffuse_texture_filtering = value.into_text(name)?,
            _ => return Err(unknown_property(name)),
        }
        Ok(())
    }

    impl_any!();
}

// =========================================================================
// Image
// =========================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub id: Id,
    pub width: u64,
    pub spacing: f64,
    pub voxels: Blob,
}

impl Default for Image {
    fn default() -> Self {
        Self {
            id: Id::new(),
            width: 0,
            spacing: 1.0,
            voxels: Blob::new(Vec::new()),
        }
    }
}

impl Reflect for Image {
    fn classname(&self) -> &str {
        "Image"
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
        visitor.visit("width", PropertyValue::UInt(self.width));
        visitor.visit("spacing", PropertyValue::Real(self.spacing));
        visitor.visit("voxels", PropertyValue::Blob(self.voxels.clone()));
    }

    fn set_property(&mut self, name: &str, value: PropertyValue) -> Result<(), NodeError> {
        match name {
            "width" => self.width = value.into_u64(name)?,
            "spacing" => self.spacing = value.into_f64(name)?,
            "voxels" => self.voxels = value.into_blob(name)?,
            _ => return Err(unknown_property(name)),
        }
        Ok(())
    }

    impl_any!();
}

// =========================================================================
// Node
// =========================================================================

/// Generic graph node: one optional link and an ordered child list that
/// may contain nulls.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Node {
    pub id: Id,
    pub label: String,
    pub next: Option<Id>,
    pub children: Vec<Option<Id>>,
}

impl Node {
    pub fn new(id: &str, label: &str) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            next: None,
            children: Vec::new(),
        }
    }
}

impl Reflect for Node {
    fn classname(&self) -> &str {
        "Node"
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
        visitor.visit("label", PropertyValue::Text(self.label.clone()));
        visitor.visit("next", reference(&self.next));
        visitor.visit(
            "children",
            PropertyValue::Array(self.children.iter().map(reference).collect()),
        );
    }

    fn set_property(&mut self, name: &str, value: PropertyValue) -> Result<(), NodeError> {
        match name {
            "label" => self.label = value.into_text(name)?,
            "next" => self.next = value.into_object(name)?,
            "children" => {
                self.children = value
                    .into_array(name)?
                    .into_iter()
                    .map(|item| item.into_object(name))
                    .collect::<Result<_, _>>()?;
            }
            _ => return Err(unknown_property(name)),
        }
        Ok(())
    }

    impl_any!();
}

// =========================================================================
// Composite
// =========================================================================

/// Container with every supported map key kind.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Composite {
    pub id: Id,
    pub name: String,
    pub visible: bool,
    pub count: i64,
    pub tags: Vec<String>,
    pub children: Vec<(String, Option<Id>)>,
    pub weights: Vec<(i64, f64)>,
    pub modes: Vec<(ShadingMode, String)>,
}

impl Composite {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            ..Self::default()
        }
    }
}

impl Reflect for Composite {
    fn classname(&self) -> &str {
        "Composite"
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
        visitor.visit("name", PropertyValue::Text(self.name.clone()));
        visitor.visit("visible", PropertyValue::Bool(self.visible));
        visitor.visit("count", PropertyValue::Int(self.count));
        visitor.visit(
            "tags",
            PropertyValue::Array(self.tags.iter().cloned().map(PropertyValue::Text).collect()),
        );
        visitor.visit(
            "children",
            PropertyValue::Map(
                self.children
                    .iter()
                    .map(|(k, v)| (PropertyValue::Text(k.clone()), reference(v)))
                    .collect(),
            ),
        );
        visitor.visit(
            "weights",
            PropertyValue::Map(
                self.weights
                    .iter()
                    .map(|(k, v)| (PropertyValue::Int(*k), PropertyValue::Real(*v)))
                    .collect(),
            ),
        );
        visitor.visit(
            "modes",
            PropertyValue::Map(
                self.modes
                    .iter()
                    .map(|(k, v)| (PropertyValue::Enum(k.name().to_string()), PropertyValue::Text(v.clone())))
                    .collect(),
            ),
        );
    }

    fn set_property(&mut self, name: &str, value: PropertyValue) -> Result<(), NodeError> {
        match name {
            "name" => self.name = value.into_text(name)?,
            "visible" => self.visible = value.into_bool(name)?,
            "count" => self.count = value.into_i64(name)?,
            "tags" => {
                self.tags = value
                    .into_array(name)?
                    .into_iter()
                    .map(|v| v.into_text(name))
                    .collect::<Result<_, _>>()?;
            }
            "children" => {
                self.children = value
                    .into_map(name)?
                    .into_iter()
                    .map(|(k, v)| Ok((k.into_text(name)?, v.into_object(name)?)))
                    .collect::<Result<_, NodeError>>()?;
            }
            "weights" => {
                self.weights = value
                    .into_map(name)?
                    .into_iter()
                    .map(|(k, v)| Ok((k.into_i64(name)?, v.into_f64(name)?)))
                    .collect::<Result<_, NodeError>>()?;
            }
            "modes" => {
                self.modes = value
                    .into_map(name)?
                    .into_iter()
                    .map(|(k, v)| Ok((shading_mode(name, k)?, v.into_text(name)?)))
                    .collect::<Result<_, NodeError>>()?;
            }
            _ => return Err(unknown_property(name)),
        }
        Ok(())
    }

    impl_any!();
}

// =========================================================================
// BadMap
// =========================================================================

/// Keys a map by object reference, which Atoms cannot represent.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BadMap {
    pub id: Id,
    pub entries: Vec<(Id, i64)>,
}

impl Reflect for BadMap {
    fn classname(&self) -> &str {
        "BadMap"
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
        visitor.visit(
            "entries",
            PropertyValue::Map(
                self.entries
                    .iter()
                    .map(|(k, v)| (PropertyValue::object(k.clone()), PropertyValue::Int(*v)))
                    .collect(),
            ),
        );
    }

    fn set_property(&mut self, name: &str, _value: PropertyValue) -> Result<(), NodeError> {
        Err(unknown_property(name))
    }

    impl_any!();
}
