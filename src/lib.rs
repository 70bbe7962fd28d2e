//! # redshard
//!
//! Purpose: Client-side access layer for a sharded, Redis-compatible
//! key-value store. Each operation key deterministically selects a backend
//! shard, borrows a pooled connection to it, runs the command, and returns
//! the connection on every exit path.
//!
//! ## Design Principles
//! 1. **Deterministic Routing**: Fixed modulo hashing over the endpoint
//!    array, or consistent hashing over a ring — chosen at construction.
//! 2. **Bounded Pools**: One bounded connection pool per shard with a
//!    configurable blocking borrow.
//! 3. **Scoped Leases**: Acquire/use/release is enforced by an RAII lease,
//!    not by per-command cleanup code.
//! 4. **Unmodified Propagation**: No retries, no failover; errors reach the
//!    caller as the backend raised them.
//!
//! ## Usage
//!
//! ```no_run
//! use redshard::{ClientConfig, Endpoint, Routing, ShardedClient};
//!
//! let config = ClientConfig::new(
//!     vec![
//!         Endpoint::new("cache-a", 6379),
//!         Endpoint::new("cache-b", 6379),
//!     ],
//!     Routing::ConsistentRing,
//! )?;
//! let client = ShardedClient::new(config);
//! client.set("greeting", "hello")?;
//! assert_eq!(client.get("greeting")?.as_deref(), Some("hello"));
//! client.destroy();
//! # Ok::<(), redshard::ClientError>(())
//! ```

mod client;
mod config;
mod error;
mod hash;
mod pool;
mod resp;
mod ring;
mod router;

pub use client::{SetCondition, SetExpiry, ShardedClient};
pub use config::{keys, parse_endpoints, ClientConfig, Endpoint, Routing};
pub use error::{ClientError, ClientResult};
pub use pool::{ConnectionLease, ConnectionPool, PoolOptions, PoolStats};
pub use resp::Reply;
pub use router::Router;
