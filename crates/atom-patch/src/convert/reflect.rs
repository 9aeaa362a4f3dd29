//! Reflection contract between live objects and the converter.
//!
//! A domain class takes part in conversion by implementing [`Reflect`]:
//! it enumerates its properties through a [`PropertyVisitor`] in a stable
//! order, and accepts them back one at a time through
//! [`Reflect::set_property`]. Nested objects are never owned by value;
//! they are ids into the enclosing [`ObjectGraph`].

use std::any::Any;
use std::fmt::Debug;

use rustc_hash::FxHashMap;

use crate::error::NodeError;
use crate::model::{Blob, Id};

/// Kind of a property value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKind {
    Bool,
    Int,
    UInt,
    Real,
    Text,
    Enum,
    Object,
    Blob,
    Array,
    Map,
}

impl PropertyKind {
    pub fn name(self) -> &'static str {
        match self {
            PropertyKind::Bool => "bool",
            PropertyKind::Int => "int",
            PropertyKind::UInt => "uint",
            PropertyKind::Real => "real",
            PropertyKind::Text => "text",
            PropertyKind::Enum => "enum",
            PropertyKind::Object => "object",
            PropertyKind::Blob => "blob",
            PropertyKind::Array => "array",
            PropertyKind::Map => "map",
        }
    }

    /// Returns whether values of this kind may key a map property.
    pub fn is_map_key(self) -> bool {
        matches!(
            self,
            PropertyKind::Int
                | PropertyKind::UInt
                | PropertyKind::Real
                | PropertyKind::Text
                | PropertyKind::Enum
        )
    }
}

/// A property value as seen by the converter.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Real(f64),
    Text(String),
    /// Enumerator, by symbolic name.
    Enum(String),
    /// Reference to another object of the graph, or null.
    Object(Option<Id>),
    Blob(Blob),
    Array(Vec<PropertyValue>),
    Map(Vec<(PropertyValue, PropertyValue)>),
}

impl PropertyValue {
    pub fn kind(&self) -> PropertyKind {
        match self {
            PropertyValue::Bool(_) => PropertyKind::Bool,
            PropertyValue::Int(_) => PropertyKind::Int,
            PropertyValue::UInt(_) => PropertyKind::UInt,
            PropertyValue::Real(_) => PropertyKind::Real,
            PropertyValue::Text(_) => PropertyKind::Text,
            PropertyValue::Enum(_) => PropertyKind::Enum,
            PropertyValue::Object(_) => PropertyKind::Object,
            PropertyValue::Blob(_) => PropertyKind::Blob,
            PropertyValue::Array(_) => PropertyKind::Array,
            PropertyValue::Map(_) => PropertyKind::Map,
        }
    }

    /// Creates a reference property.
    pub fn object(id: impl Into<Id>) -> Self {
        PropertyValue::Object(Some(id.into()))
    }

    fn mismatch(&self, property: &str, expected: PropertyKind) -> NodeError {
        NodeError::TypeMismatch {
            attribute: property.to_string(),
            expected: expected.name(),
            found: self.kind().name(),
        }
    }

    pub fn into_bool(self, property: &str) -> Result<bool, NodeError> {
        match self {
            PropertyValue::Bool(v) => Ok(v),
            other => Err(other.mismatch(property, PropertyKind::Bool)),
        }
    }

    /// Accepts signed and in-range unsigned integers.
    pub fn into_i64(self, property: &str) -> Result<i64, NodeError> {
        match self {
            PropertyValue::Int(v) => Ok(v),
            PropertyValue::UInt(v) => {
                i64::try_from(v).map_err(|_| PropertyValue::UInt(v).mismatch(property, PropertyKind::Int))
            }
            other => Err(other.mismatch(property, PropertyKind::Int)),
        }
    }

    /// Accepts unsigned and non-negative signed integers.
    pub fn into_u64(self, property: &str) -> Result<u64, NodeError> {
        match self {
            PropertyValue::UInt(v) => Ok(v),
            PropertyValue::Int(v) => {
                u64::try_from(v).map_err(|_| PropertyValue::Int(v).mismatch(property, PropertyKind::UInt))
            }
            other => Err(other.mismatch(property, PropertyKind::UInt)),
        }
    }

    /// Accepts any numeric value.
    pub fn into_f64(self, property: &str) -> Result<f64, NodeError> {
        match self {
            PropertyValue::Real(v) => Ok(v),
            PropertyValue::Int(v) => Ok(v as f64),
            PropertyValue::UInt(v) => Ok(v as f64),
            other => Err(other.mismatch(property, PropertyKind::Real)),
        }
    }

    pub fn into_text(self, property: &str) -> Result<String, NodeError> {
        match self {
            PropertyValue::Text(v) => Ok(v),
            other => Err(other.mismatch(property, PropertyKind::Text)),
        }
    }

    /// Returns an enumerator name. Enumerators travel as strings in Atoms,
    /// so text values are accepted too.
    pub fn into_symbol(self, property: &str) -> Result<String, NodeError> {
        match self {
            PropertyValue::Enum(v) | PropertyValue::Text(v) => Ok(v),
            other => Err(other.mismatch(property, PropertyKind::Enum)),
        }
    }

    pub fn into_object(self, property: &str) -> Result<Option<Id>, NodeError> {
        match self {
            PropertyValue::Object(v) => Ok(v),
            other => Err(other.mismatch(property, PropertyKind::Object)),
        }
    }

    pub fn into_blob(self, property: &str) -> Result<Blob, NodeError> {
        match self {
            PropertyValue::Blob(v) => Ok(v),
            other => Err(other.mismatch(property, PropertyKind::Blob)),
        }
    }

    pub fn into_array(self, property: &str) -> Result<Vec<PropertyValue>, NodeError> {
        match self {
            PropertyValue::Array(v) => Ok(v),
            other => Err(other.mismatch(property, PropertyKind::Array)),
        }
    }

    pub fn into_map(self, property: &str) -> Result<Vec<(PropertyValue, PropertyValue)>, NodeError> {
        match self {
            PropertyValue::Map(v) => Ok(v),
            other => Err(other.mismatch(property, PropertyKind::Map)),
        }
    }
}

/// Receives the properties of an object during [`Reflect::visit_properties`].
pub trait PropertyVisitor {
    fn visit(&mut self, name: &str, value: PropertyValue);
}

/// A live domain object that can be converted to and from Atoms.
pub trait Reflect: Any + Debug + Send + Sync {
    /// Class name written into the Object atom.
    fn classname(&self) -> &str;

    /// Current schema version of the class.
    fn version(&self) -> &str;

    /// Persisted id of this instance.
    fn id(&self) -> &str;

    fn set_id(&mut self, id: Id);

    /// Enumerates every property, always in the same order.
    fn visit_properties(&self, visitor: &mut dyn PropertyVisitor);

    /// Sets one property from a reconstructed value. Unknown property names
    /// and values of the wrong kind are errors.
    fn set_property(&mut self, name: &str, value: PropertyValue) -> Result<(), NodeError>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// The live object space: objects indexed by id, plus an optional root.
#[derive(Debug, Default)]
pub struct ObjectGraph {
    root: Option<Id>,
    objects: FxHashMap<Id, Box<dyn Reflect>>,
}

impl ObjectGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root(&self) -> Option<&str> {
        self.root.as_deref()
    }

    pub fn set_root(&mut self, id: impl Into<Id>) {
        self.root = Some(id.into());
    }

    /// Inserts an object under its own id, returning the object it replaced.
    pub fn insert(&mut self, object: Box<dyn Reflect>) -> Option<Box<dyn Reflect>> {
        self.objects.insert(object.id().to_string(), object)
    }

    /// Inserts a concrete object and returns its id.
    pub fn add<T: Reflect>(&mut self, object: T) -> Id {
        let id = object.id().to_string();
        self.objects.insert(id.clone(), Box::new(object));
        id
    }

    pub fn get(&self, id: &str) -> Option<&dyn Reflect> {
        self.objects.get(id).map(|obj| obj.as_ref())
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut (dyn Reflect + 'static)> {
        self.objects.get_mut(id).map(|obj| obj.as_mut())
    }

    /// Returns the object with this id if it is a `T`.
    pub fn downcast<T: Reflect>(&self, id: &str) -> Option<&T> {
        self.get(id)?.as_any().downcast_ref::<T>()
    }

    pub fn downcast_mut<T: Reflect>(&mut self, id: &str) -> Option<&mut T> {
        self.get_mut(id)?.as_any_mut().downcast_mut::<T>()
    }

    pub fn remove(&mut self, id: &str) -> Option<Box<dyn Reflect>> {
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

    /// Returns all ids, sorted.
    pub fn ids(&self) -> Vec<Id> {
        let mut ids: Vec<Id> = self.objects.keys().cloned().collect();
        ids.sort_unstable();
        ids
    }
}
