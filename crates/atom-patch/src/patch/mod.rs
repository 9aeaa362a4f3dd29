//! Patching Atom graphs from older versions to the current one.
//!
//! - [`registry`]: structural and semantic patch databases
//! - [`creator`]: default objects at historical versions
//! - [`versions`]: context versions and their class tables
//! - [`structural`]: the structural engine
//! - [`semantic`]: the semantic engine
//! - [`migrate`]: both passes over a whole graph

pub mod creator;
pub mod migrate;
pub mod registry;
pub mod semantic;
pub mod structural;
pub mod versions;

pub use creator::{Creation, CreatorDb, CreatorFn};
pub use migrate::{migrate, MigrationOptions, MigrationStats, Migrator};
pub use registry::{
    PatchKey, PatchModule, PatchRegistry, SemanticKey, SemanticPatchDb, SemanticPatchFn, StructuralPatchDb,
    StructuralPatchFn,
};
pub use semantic::{SemanticContext, SemanticPass};
pub use structural::{patch_graph, PatchContext, StructuralOutcome};
pub use versions::{VersionHop, VersionTable, VersionsGraph};
