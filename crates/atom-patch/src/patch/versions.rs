//! Context versions and the class versions they ship.
//!
//! An application context (e.g. `"MedicalData"`) is released in successive
//! versions. Each context version fixes the current version of every class
//! through a [`VersionTable`]; the ordered list of context versions forms
//! the lineage that [`VersionsGraph::path`] walks.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::debug;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::error::{MigrationError, RegistryError};
use crate::model::{ContextVersion, VersionKey};

/// Current version of every class for one context version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionTable {
    versions: BTreeMap<String, String>,
}

impl VersionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a class version, builder style.
    pub fn with(mut self, classname: impl Into<String>, version: impl Into<String>) -> Self {
        self.set(classname, version);
        self
    }

    /// Sets the current version of a class, returning the previous one.
    pub fn set(&mut self, classname: impl Into<String>, version: impl Into<String>) -> Option<String> {
        self.versions.insert(classname.into(), version.into())
    }

    /// Returns the current version of a class.
    pub fn current(&self, classname: &str) -> Option<&str> {
        self.versions.get(classname).map(String::as_str)
    }

    /// Returns whether `key` is the current version of its class.
    pub fn is_current(&self, key: &VersionKey) -> bool {
        self.current(&key.classname) == Some(key.version.as_str())
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// Iterates over `(classname, version)` in classname order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.versions.iter().map(|(c, v)| (c.as_str(), v.as_str()))
    }
}

impl<C: Into<String>, V: Into<String>> FromIterator<(C, V)> for VersionTable {
    fn from_iter<I: IntoIterator<Item = (C, V)>>(iter: I) -> Self {
        let mut table = VersionTable::new();
        for (classname, version) in iter {
            table.set(classname, version);
        }
        table
    }
}

/// One step between adjacent context versions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionHop {
    pub from: String,
    pub to: String,
}

type Lineage = Vec<(String, Arc<VersionTable>)>;

/// Version lineage of every known context.
///
/// Versions are registered oldest first; the last registered version of a
/// context is its current version.
#[derive(Debug, Default)]
pub struct VersionsGraph {
    contexts: RwLock<FxHashMap<String, Lineage>>,
}

impl VersionsGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a version to the lineage of `context`.
    pub fn register_version(
        &self,
        context: impl Into<String>,
        version: impl Into<String>,
        table: VersionTable,
    ) -> Result<(), RegistryError> {
        let context = context.into();
        let version = version.into();
        if context.is_empty() || version.is_empty() {
            return Err(RegistryError::InvalidKey {
                reason: "empty context or version",
            });
        }
        let mut contexts = self.contexts.write();
        let lineage = contexts.entry(context.clone()).or_default();
        if lineage.iter().any(|(v, _)| *v == version) {
            return Err(RegistryError::DuplicateVersion { context, version });
        }
        debug!(
            "event=register_version module=patch status=ok context={context} version={version} classes={}",
            table.len()
        );
        lineage.push((version, Arc::new(table)));
        Ok(())
    }

    /// Returns the current version of a context.
    pub fn current(&self, context: &str) -> Option<ContextVersion> {
        let contexts = self.contexts.read();
        let (version, _) = contexts.get(context)?.last()?;
        Some(ContextVersion::new(context, version.clone()))
    }

    /// Returns the class table of one context version.
    pub fn table(&self, context: &str, version: &str) -> Option<Arc<VersionTable>> {
        let contexts = self.contexts.read();
        contexts
            .get(context)?
            .iter()
            .find(|(v, _)| v == version)
            .map(|(_, table)| Arc::clone(table))
    }

    /// Returns the class table of the current version of a context.
    pub fn current_table(&self, context: &str) -> Option<Arc<VersionTable>> {
        let contexts = self.contexts.read();
        contexts.get(context)?.last().map(|(_, table)| Arc::clone(table))
    }

    /// Lists the adjacent hops from `from` to `to`. Empty if they are equal.
    ///
    /// Downgrades are not supported.
    pub fn path(&self, context: &str, from: &str, to: &str) -> Result<Vec<VersionHop>, MigrationError> {
        let contexts = self.contexts.read();
        let lineage = contexts
            .get(context)
            .ok_or_else(|| MigrationError::UnknownContext {
                context: context.to_string(),
            })?;
        let position = |version: &str| lineage.iter().position(|(v, _)| v == version);
        let no_path = || MigrationError::NoVersionPath {
            context: context.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        };

        let (Some(start), Some(end)) = (position(from), position(to)) else {
            return Err(no_path());
        };
        if start > end {
            return Err(no_path());
        }
        Ok(lineage[start..=end]
            .windows(2)
            .map(|pair| VersionHop {
                from: pair[0].0.clone(),
                to: pair[1].0.clone(),
            })
            .collect())
    }

    /// Returns all context names, sorted.
    pub fn contexts(&self) -> Vec<String> {
        let mut names: Vec<String> = self.contexts.read().keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Returns the number of registered context versions.
    pub fn len(&self) -> usize {
        self.contexts.read().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
