//! Atom value types.
//!
//! An [`Atom`] is one node of the generic interchange tree. Object atoms
//! are not nested by value: an [`Atom::Object`] holds the id of an
//! [`ObjectAtom`](crate::model::ObjectAtom) stored in the enclosing
//! [`AtomGraph`](crate::model::AtomGraph), which is what lets one object be
//! shared by several parents or take part in a cycle.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::model::Id;

/// Discriminant of an [`Atom`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AtomKind {
    Null,
    Boolean,
    Numeric,
    String,
    Blob,
    Sequence,
    Map,
    Object,
}

impl AtomKind {
    /// Returns the lowercase name of this kind.
    pub fn name(self) -> &'static str {
        match self {
            AtomKind::Null => "null",
            AtomKind::Boolean => "boolean",
            AtomKind::Numeric => "numeric",
            AtomKind::String => "string",
            AtomKind::Blob => "blob",
            AtomKind::Sequence => "sequence",
            AtomKind::Map => "map",
            AtomKind::Object => "object",
        }
    }
}

impl fmt::Display for AtomKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Numeric scalar: signed, unsigned or floating point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Numeric {
    Int(i64),
    UInt(u64),
    Real(f64),
}

impl Numeric {
    /// Returns the value as `i64` if it is integral and in range.
    pub fn as_i64(self) -> Option<i64> {
        match self {
            Numeric::Int(v) => Some(v),
            Numeric::UInt(v) => i64::try_from(v).ok(),
            Numeric::Real(_) => None,
        }
    }

    /// Returns the value as `u64` if it is integral and non-negative.
    pub fn as_u64(self) -> Option<u64> {
        match self {
            Numeric::Int(v) => u64::try_from(v).ok(),
            Numeric::UInt(v) => Some(v),
            Numeric::Real(_) => None,
        }
    }

    /// Returns the value as `f64` (integers may lose precision).
    pub fn as_f64(self) -> f64 {
        match self {
            Numeric::Int(v) => v as f64,
            Numeric::UInt(v) => v as f64,
            Numeric::Real(v) => v,
        }
    }
}

/// Logical identity of a blob buffer.
pub type BufferId = u64;

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque byte payload kept out of line from the tree.
///
/// Cloning a blob shares the underlying buffer. Two blobs are equal when
/// they have the same buffer identity and size; contents are never
/// compared.
#[derive(Clone)]
pub struct Blob {
    buffer: BufferId,
    data: Arc<[u8]>,
}

impl Blob {
    /// Wraps `data` in a new buffer with a fresh identity.
    pub fn new(data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            buffer: NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed),
            data: data.into(),
        }
    }

    /// Returns the buffer identity.
    pub fn buffer_id(&self) -> BufferId {
        self.buffer
    }

    /// Returns the payload size in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Returns the payload.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Returns whether both blobs point at the same allocation.
    pub fn shares_buffer(&self, other: &Blob) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    /// Copies the payload into a new buffer with a fresh identity.
    pub fn detach(&self) -> Blob {
        Blob::new(self.data.to_vec())
    }
}

impl PartialEq for Blob {
    fn eq(&self, other: &Self) -> bool {
        self.buffer == other.buffer && self.size() == other.size()
    }
}

impl fmt::Debug for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blob")
            .field("buffer", &self.buffer)
            .field("size", &self.size())
            .finish()
    }
}

/// A node of the generic interchange tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Atom {
    /// Absent optional value (null reference).
    Null,

    Boolean(bool),

    Numeric(Numeric),

    String(String),

    Blob(Blob),

    /// Ordered list; order is significant.
    Sequence(Vec<Atom>),

    /// Ordered (key, value) pairs. Keys are scalar atoms.
    Map(Vec<(Atom, Atom)>),

    /// Reference to an Object atom of the enclosing graph.
    Object(Id),
}

impl Atom {
    /// Creates an object reference.
    pub fn object(id: impl Into<Id>) -> Self {
        Atom::Object(id.into())
    }

    /// Returns the kind of this atom.
    pub fn kind(&self) -> AtomKind {
        match self {
            Atom::Null => AtomKind::Null,
            Atom::Boolean(_) => AtomKind::Boolean,
            Atom::Numeric(_) => AtomKind::Numeric,
            Atom::String(_) => AtomKind::String,
            Atom::Blob(_) => AtomKind::Blob,
            Atom::Sequence(_) => AtomKind::Sequence,
            Atom::Map(_) => AtomKind::Map,
            Atom::Object(_) => AtomKind::Object,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Atom::Null)
    }

    /// Returns whether this atom may be used as a map key.
    pub fn is_scalar_key(&self) -> bool {
        matches!(self, Atom::String(_) | Atom::Numeric(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Atom::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_numeric(&self) -> Option<Numeric> {
        match self {
            Atom::Numeric(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Atom::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&Blob> {
        match self {
            Atom::Blob(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[Atom]> {
        match self {
            Atom::Sequence(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_sequence_mut(&mut self) -> Option<&mut Vec<Atom>> {
        match self {
            Atom::Sequence(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&[(Atom, Atom)]> {
        match self {
            Atom::Map(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut Vec<(Atom, Atom)>> {
        match self {
            Atom::Map(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the referenced object id.
    pub fn as_object(&self) -> Option<&str> {
        match self {
            Atom::Object(id) => Some(id),
            _ => None,
        }
    }

    /// Looks up a string key in a map atom.
    pub fn map_get(&self, key: &str) -> Option<&Atom> {
        self.as_map()?
            .iter()
            .find(|(k, _)| k.as_str() == Some(key))
            .map(|(_, v)| v)
    }

    /// Calls `f` for every object id referenced by this atom, in order.
    ///
    /// Keys of map atoms are visited before their values.
    pub fn for_each_reference(&self, f: &mut impl FnMut(&str)) {
        match self {
            Atom::Object(id) => f(id),
            Atom::Sequence(items) => {
                for item in items {
                    item.for_each_reference(f);
                }
            }
            Atom::Map(entries) => {
                for (key, value) in entries {
                    key.for_each_reference(f);
                    value.for_each_reference(f);
                }
            }
            _ => {}
        }
    }

    /// Returns every object id referenced by this atom, in order.
    pub fn references(&self) -> Vec<Id> {
        let mut ids = Vec::new();
        self.for_each_reference(&mut |id| ids.push(id.to_string()));
        ids
    }

    /// Rewrites object references. References for which `f` returns `None`
    /// are left untouched.
    pub fn remap_references(&mut self, f: &mut impl FnMut(&str) -> Option<Id>) {
        match self {
            Atom::Object(id) => {
                if let Some(new_id) = f(id) {
                    *id = new_id;
                }
            }
            Atom::Sequence(items) => {
                for item in items {
                    item.remap_references(f);
                }
            }
            Atom::Map(entries) => {
                for (key, value) in entries {
                    key.remap_references(f);
                    value.remap_references(f);
                }
            }
            _ => {}
        }
    }
}

impl From<bool> for Atom {
    fn from(v: bool) -> Self {
        Atom::Boolean(v)
    }
}

impl From<i64> for Atom {
    fn from(v: i64) -> Self {
        Atom::Numeric(Numeric::Int(v))
    }
}

impl From<u64> for Atom {
    fn from(v: u64) -> Self {
        Atom::Numeric(Numeric::UInt(v))
    }
}

impl From<f64> for Atom {
    fn from(v: f64) -> Self {
        Atom::Numeric(Numeric::Real(v))
    }
}

impl From<Numeric> for Atom {
    fn from(v: Numeric) -> Self {
        Atom::Numeric(v)
    }
}

impl From<&str> for Atom {
    fn from(v: &str) -> Self {
        Atom::String(v.to_string())
    }
}

impl From<String> for Atom {
    fn from(v: String) -> Self {
        Atom::String(v)
    }
}

impl From<Blob> for Atom {
    fn from(v: Blob) -> Self {
        Atom::Blob(v)
    }
}

impl From<Vec<Atom>> for Atom {
    fn from(v: Vec<Atom>) -> Self {
        Atom::Sequence(v)
    }
}
