//! Persisted object identifiers.
//!
//! Every Object atom and every live object carries a string id that is
//! stable across save/load. Fresh ids are random UUIDv4 strings; ids for
//! objects synthesized during migration may instead be derived from a
//! parent id so that migrating the same input twice yields the same ids.

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// A persisted object identifier.
pub type Id = String;

/// Generates a fresh random identifier (hyphenated UUIDv4).
pub fn generate_id() -> Id {
    Uuid::new_v4().to_string()
}

/// Derives a UUIDv8 identifier from input bytes using SHA-256.
///
/// ```text
/// hash = SHA-256(input_bytes)[0:16]
/// hash[6] = (hash[6] & 0x0F) | 0x80  // version 8
/// hash[8] = (hash[8] & 0x3F) | 0x80  // RFC 4122 variant
/// ```
pub fn derived_id(input: &[u8]) -> Id {
    let hash = Sha256::digest(input);
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hash[..16]);

    // Set version 8 (bits 4-7 of byte 6)
    bytes[6] = (bytes[6] & 0x0F) | 0x80;
    // Set RFC 4122 variant (bits 6-7 of byte 8)
    bytes[8] = (bytes[8] & 0x3F) | 0x80;

    Uuid::from_bytes(bytes).to_string()
}

/// Domain separator prefix for child id derivation.
const CHILD_ID_PREFIX: &[u8] = b"atom-patch:child:";

/// Derives the id of an object synthesized on behalf of `parent`.
///
/// ```text
/// id = derived_id("atom-patch:child:" || parent || 0x00 || salt)
/// ```
///
/// The NUL separator keeps `("ab", "c")` and `("a", "bc")` apart.
pub fn child_id(parent: &str, salt: &str) -> Id {
    let mut input = Vec::with_capacity(CHILD_ID_PREFIX.len() + parent.len() + salt.len() + 1);
    input.extend_from_slice(CHILD_ID_PREFIX);
    input.extend_from_slice(parent.as_bytes());
    input.push(0);
    input.extend_from_slice(salt.as_bytes());
    derived_id(&input)
}

/// Returns whether `id` can be used as a persisted identifier.
///
/// Ids are opaque: any non-empty string without whitespace or control
/// characters is accepted, UUID-shaped or not.
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty() && !id.chars().any(|c| c.is_whitespace() || c.is_control())
}
