//! Object atoms and version keys.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::AtomError;
use crate::model::{Atom, AtomKind, Blob, Id, Numeric};

/// One schema revision of a class.
///
/// Classnames may change across versions, so a version key is not an
/// identity; the persisted object id is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VersionKey {
    pub classname: String,
    pub version: String,
}

impl VersionKey {
    pub fn new(classname: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            classname: classname.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for VersionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.classname, self.version)
    }
}

/// An object node: metadata plus named attributes.
///
/// Attributes are kept sorted by name so that traversal order, and with
/// it every pass over the graph, is deterministic.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectAtom {
    id: Id,
    classname: String,
    version: String,
    meta: BTreeMap<String, String>,
    attributes: BTreeMap<String, Atom>,
}

impl ObjectAtom {
    /// Creates an object with no attributes.
    pub fn new(id: impl Into<Id>, classname: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            classname: classname.into(),
            version: version.into(),
            meta: BTreeMap::new(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn classname(&self) -> &str {
        &self.classname
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Returns the (classname, version) pair of this object.
    pub fn key(&self) -> VersionKey {
        VersionKey::new(self.classname.clone(), self.version.clone())
    }

    /// Changes the persisted id. Callers own the consequences for
    /// references pointing at the old id.
    pub fn set_id(&mut self, id: impl Into<Id>) {
        self.id = id.into();
    }

    pub fn set_classname(&mut self, classname: impl Into<String>) {
        self.classname = classname.into();
    }

    pub fn set_version(&mut self, version: impl Into<String>) {
        self.version = version.into();
    }

    /// Sets both classname and version.
    pub fn set_key(&mut self, key: &VersionKey) {
        self.classname.clone_from(&key.classname);
        self.version.clone_from(&key.version);
    }

    // =========================================================================
    // Meta infos
    // =========================================================================

    /// Returns a meta info value.
    pub fn meta(&self, name: &str) -> Option<&str> {
        self.meta.get(name).map(String::as_str)
    }

    pub fn set_meta(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.meta.insert(name.into(), value.into());
    }

    pub fn remove_meta(&mut self, name: &str) -> Option<String> {
        self.meta.remove(name)
    }

    pub fn meta_infos(&self) -> &BTreeMap<String, String> {
        &self.meta
    }

    // =========================================================================
    // Attributes
    // =========================================================================

    pub fn attributes(&self) -> &BTreeMap<String, Atom> {
        &self.attributes
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// Returns an attribute, or [`AtomError::MissingAttribute`].
    pub fn attribute(&self, name: &str) -> Result<&Atom, AtomError> {
        self.attributes
            .get(name)
            .ok_or_else(|| AtomError::MissingAttribute {
                attribute: name.to_string(),
            })
    }

    /// Returns a mutable attribute, or [`AtomError::MissingAttribute`].
    pub fn attribute_mut(&mut self, name: &str) -> Result<&mut Atom, AtomError> {
        self.attributes
            .get_mut(name)
            .ok_or_else(|| AtomError::MissingAttribute {
                attribute: name.to_string(),
            })
    }

    /// Inserts or overwrites an attribute, returning the previous value.
    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<Atom>) -> Option<Atom> {
        self.attributes.insert(name.into(), value.into())
    }

    /// Adds an attribute that must not exist yet.
    pub fn add_attribute(&mut self, name: impl Into<String>, value: impl Into<Atom>) -> Result<(), AtomError> {
        let name = name.into();
        if self.attributes.contains_key(&name) {
            return Err(AtomError::DuplicateAttribute { attribute: name });
        }
        self.attributes.insert(name, value.into());
        Ok(())
    }

    /// Replaces an attribute that must already exist, returning the old value.
    pub fn replace_attribute(&mut self, name: &str, value: impl Into<Atom>) -> Result<Atom, AtomError> {
        let slot = self.attribute_mut(name)?;
        Ok(std::mem::replace(slot, value.into()))
    }

    /// Removes an attribute that must exist, returning its value.
    pub fn remove_attribute(&mut self, name: &str) -> Result<Atom, AtomError> {
        self.attributes
            .remove(name)
            .ok_or_else(|| AtomError::MissingAttribute {
                attribute: name.to_string(),
            })
    }

    /// Renames an attribute. `from` must exist and `to` must not.
    pub fn rename_attribute(&mut self, from: &str, to: impl Into<String>) -> Result<(), AtomError> {
        let to = to.into();
        if self.attributes.contains_key(&to) {
            return Err(AtomError::DuplicateAttribute { attribute: to });
        }
        let value = self.remove_attribute(from)?;
        self.attributes.insert(to, value);
        Ok(())
    }

    pub fn clear_attributes(&mut self) {
        self.attributes.clear();
    }

    // =========================================================================
    // Typed getters
    // =========================================================================

    fn typed<'a, T>(
        &'a self,
        name: &str,
        expected: AtomKind,
        get: impl FnOnce(&'a Atom) -> Option<T>,
    ) -> Result<T, AtomError> {
        let atom = self.attribute(name)?;
        get(atom).ok_or_else(|| AtomError::TypeMismatch {
            attribute: name.to_string(),
            expected,
            found: atom.kind(),
        })
    }

    pub fn get_bool(&self, name: &str) -> Result<bool, AtomError> {
        self.typed(name, AtomKind::Boolean, Atom::as_bool)
    }

    pub fn get_numeric(&self, name: &str) -> Result<Numeric, AtomError> {
        self.typed(name, AtomKind::Numeric, Atom::as_numeric)
    }

    pub fn get_str(&self, name: &str) -> Result<&str, AtomError> {
        self.typed(name, AtomKind::String, Atom::as_str)
    }

    pub fn get_blob(&self, name: &str) -> Result<&Blob, AtomError> {
        self.typed(name, AtomKind::Blob, Atom::as_blob)
    }

    pub fn get_sequence(&self, name: &str) -> Result<&[Atom], AtomError> {
        self.typed(name, AtomKind::Sequence, Atom::as_sequence)
    }

    pub fn get_map(&self, name: &str) -> Result<&[(Atom, Atom)], AtomError> {
        self.typed(name, AtomKind::Map, Atom::as_map)
    }

    /// Returns the id referenced by an object attribute.
    pub fn get_object(&self, name: &str) -> Result<&str, AtomError> {
        self.typed(name, AtomKind::Object, Atom::as_object)
    }

    /// Like [`get_object`](Self::get_object) but maps a null attribute to `None`.
    pub fn get_optional_object(&self, name: &str) -> Result<Option<&str>, AtomError> {
        match self.attribute(name)? {
            Atom::Null => Ok(None),
            Atom::Object(id) => Ok(Some(id)),
            other => Err(AtomError::TypeMismatch {
                attribute: name.to_string(),
                expected: AtomKind::Object,
                found: other.kind(),
            }),
        }
    }

    // =========================================================================
    // References
    // =========================================================================

    /// Returns the ids referenced by all attributes, in attribute order,
    /// without duplicates.
    pub fn references(&self) -> Vec<Id> {
        let mut ids: Vec<Id> = Vec::new();
        for value in self.attributes.values() {
            value.for_each_reference(&mut |id| {
                if !ids.iter().any(|seen| seen == id) {
                    ids.push(id.to_string());
                }
            });
        }
        ids
    }

    /// Rewrites every reference held by the attributes.
    pub fn remap_references(&mut self, f: &mut impl FnMut(&str) -> Option<Id>) {
        for value in self.attributes.values_mut() {
            value.remap_references(f);
        }
    }
}
