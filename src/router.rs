//! # Key Router
//!
//! Purpose: Resolve an operation key to the connection pool of the shard
//! that owns it, under either addressing policy.
//!
//! The router is built once, owns one pool per endpoint, and is read-only
//! afterwards; resolution takes no locks. Lifecycle is explicit: the owning
//! process constructs it and calls [`Router::close`] exactly once at
//! teardown.

use tracing::info;

use crate::config::{ClientConfig, Routing};
use crate::hash::shard_index;
use crate::pool::{ConnectionPool, PoolOptions};
use crate::ring::HashRing;

enum RouterMode {
    /// `hash(key) mod N` over the pool array.
    Fixed,
    /// Ring lookup yielding an index into the same pool array.
    Ring(HashRing),
}

/// Key-to-pool resolution over the configured shard set.
pub struct Router {
    pools: Vec<ConnectionPool>,
    mode: RouterMode,
}

impl Router {
    /// Builds one pool per endpoint and the routing structure for the
    /// configured policy. Endpoint order is significant for fixed modulo
    /// routing and must stay stable across deployments.
    pub fn new(config: &ClientConfig) -> Self {
        let options = PoolOptions::from_config(config);
        let pools = config
            .endpoints
            .iter()
            .map(|endpoint| ConnectionPool::new(endpoint.clone(), options.clone()))
            .collect::<Vec<_>>();
        let mode = match config.routing {
            Routing::FixedModulo => RouterMode::Fixed,
            Routing::ConsistentRing => RouterMode::Ring(HashRing::new(&config.endpoints)),
        };
        info!(
            shards = pools.len(),
            routing = ?config.routing,
            "router initialized"
        );
        Router { pools, mode }
    }

    /// Pool of the shard owning `key`. Deterministic for a fixed shard set.
    pub fn pool_for(&self, key: &str) -> &ConnectionPool {
        let index = match &self.mode {
            RouterMode::Fixed => shard_index(key, self.pools.len()),
            RouterMode::Ring(ring) => ring.select(key),
        };
        &self.pools[index]
    }

    /// All pools, in endpoint configuration order.
    pub fn pools(&self) -> &[ConnectionPool] {
        &self.pools
    }

    /// Closes every pool in sequence. Idempotent; the router stays wired to
    /// the closed pools, so later operations fail with a connection error
    /// instead of a dedicated shut-down error.
    pub fn close(&self) {
        for pool in &self.pools {
            pool.close();
        }
    }
}
