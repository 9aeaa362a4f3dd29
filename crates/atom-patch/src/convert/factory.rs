//! Class factory registry used during reconstruction.

use std::sync::Arc;

use log::debug;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::convert::Reflect;
use crate::error::RegistryError;

/// Produces a default instance of one class.
pub type FactoryFn = Arc<dyn Fn() -> Box<dyn Reflect> + Send + Sync>;

/// Maps classnames to factories.
///
/// Populated at start-up and read concurrently afterwards.
#[derive(Default)]
pub struct ClassFactory {
    factories: RwLock<FxHashMap<String, FactoryFn>>,
}

impl ClassFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory for `classname`.
    pub fn register<F>(&self, classname: impl Into<String>, factory: F) -> Result<(), RegistryError>
    where
        F: Fn() -> Box<dyn Reflect> + Send + Sync + 'static,
    {
        let classname = classname.into();
        if classname.is_empty() {
            return Err(RegistryError::InvalidKey {
                reason: "empty classname",
            });
        }
        let mut factories = self.factories.write();
        if factories.contains_key(&classname) {
            return Err(RegistryError::DuplicateFactory { classname });
        }
        debug!("event=register_factory module=convert status=ok classname={classname}");
        factories.insert(classname, Arc::new(factory));
        Ok(())
    }

    /// Registers `T::default` under the classname a default `T` reports.
    pub fn register_type<T: Reflect + Default>(&self) -> Result<(), RegistryError> {
        let classname = T::default().classname().to_string();
        self.register(classname, || Box::new(T::default()) as Box<dyn Reflect>)
    }

    /// Creates a default instance, or `None` if the class is unknown.
    pub fn create(&self, classname: &str) -> Option<Box<dyn Reflect>> {
        let factory = self.factories.read().get(classname).cloned()?;
        Some(factory())
    }

    pub fn contains(&self, classname: &str) -> bool {
        self.factories.read().contains_key(classname)
    }

    pub fn len(&self) -> usize {
        self.factories.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.read().is_empty()
    }
}

impl std::fmt::Debug for ClassFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<String> = self.factories.read().keys().cloned().collect();
        names.sort_unstable();
        f.debug_struct("ClassFactory").field("classes", &names).finish()
    }
}
