//! Hard limits for migration passes.
//!
//! These bound the work a single node can trigger, so a misregistered
//! patch table or a creator that recurses into itself fails the node
//! instead of hanging the pass.

/// Maximum number of structural patches applied to one node in one pass.
pub const MAX_PATCH_HOPS: usize = 64;

/// Maximum nesting of creators invoking other creators.
pub const MAX_CREATION_DEPTH: usize = 32;
