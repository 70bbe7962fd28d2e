//! # Consistent Hash Ring
//!
//! Purpose: Map keys onto endpoints so that changing the endpoint set only
//! remaps the keys between an affected ring position and its neighbor.
//!
//! Each endpoint contributes a fixed number of ring points, hashed from
//! `host:port-<replica>` with the same 32-bit hash used for keys. A key is
//! owned by the endpoint holding the first point at or clockwise after the
//! key's hash, wrapping past the top of the ring.

use std::collections::BTreeMap;

use crate::config::Endpoint;
use crate::hash::key_hash32;

/// Ring points per endpoint. Enough replicas to smooth out placement without
/// making ring construction noticeable.
const POINTS_PER_ENDPOINT: u32 = 160;

/// Immutable hash ring over an endpoint list. Values are indices into the
/// endpoint list the ring was built from.
#[derive(Debug)]
pub struct HashRing {
    points: BTreeMap<u32, usize>,
}

impl HashRing {
    /// Builds the ring. `endpoints` must be non-empty; the caller validates
    /// that when parsing configuration.
    pub fn new(endpoints: &[Endpoint]) -> Self {
        debug_assert!(!endpoints.is_empty());
        let mut points = BTreeMap::new();
        for (index, endpoint) in endpoints.iter().enumerate() {
            for replica in 0..POINTS_PER_ENDPOINT {
                let point = key_hash32(&format!("{endpoint}-{replica}"));
                // On the rare point collision the later endpoint wins; both
                // sides still resolve deterministically.
                points.insert(point, index);
            }
        }
        HashRing { points }
    }

    /// Index of the endpoint owning `key`.
    pub fn select(&self, key: &str) -> usize {
        let hash = key_hash32(key);
        let owner = self
            .points
            .range(hash..)
            .next()
            .or_else(|| self.points.iter().next());
        match owner {
            Some((_, &index)) => index,
            // Unreachable for a non-empty endpoint list; kept total anyway.
            None => 0,
        }
    }

    /// Number of distinct ring points.
    #[cfg(test)]
    fn len(&self) -> usize {
        self.points.len()
    }
}
