//! Key hashing and fixed modulo shard selection.
//!
//! Routing only needs a hash that is deterministic for equal keys within one
//! process lifetime; xxh32 with a fixed seed gives that plus a uniform
//! spread, and is the non-cryptographic hash the rest of our stack already
//! uses.

use xxhash_rust::xxh32::xxh32;

/// Seed pinned so the mapping is also stable across processes. Changing it
/// would remap every key on the next deployment.
const KEY_HASH_SEED: u32 = 0;

/// Stable 32-bit hash of an operation key.
pub fn key_hash32(key: &str) -> u32 {
    xxh32(key.as_bytes(), KEY_HASH_SEED)
}

/// Fixed modulo shard selection: `(hash & 0x7FFF_FFFF) % shard_count`.
///
/// Masking the sign bit mirrors the classic guard against negative remainders
/// when the hash is interpreted as signed. Always returns an index in
/// `[0, shard_count)`; `shard_count` must be non-zero.
pub fn shard_index(key: &str, shard_count: usize) -> usize {
    debug_assert!(shard_count > 0);
    (key_hash32(key) & 0x7FFF_FFFF) as usize % shard_count
}
