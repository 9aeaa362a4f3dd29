//! Conversion between live objects and Atom graphs.
//!
//! - [`reflect`]: the contract a domain class implements
//! - [`factory`]: classname to constructor registry
//! - [`writer`]: live objects to Atoms
//! - [`reader`]: Atoms to live objects

pub mod factory;
pub mod reader;
pub mod reflect;
pub mod writer;

pub use factory::{ClassFactory, FactoryFn};
pub use reader::{from_atoms, AtomReader, ReadPolicy, Reconstruction};
pub use reflect::{ObjectGraph, PropertyKind, PropertyValue, PropertyVisitor, Reflect};
pub use writer::{to_atoms, to_atoms_with_options, AtomWriter, BlobPolicy, WriteOptions};
