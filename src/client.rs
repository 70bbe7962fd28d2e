//! # Sharded Client Facade
//!
//! Purpose: Expose the store's command surface on top of the router and the
//! pool's acquire/use/release discipline.
//!
//! ## Design Principles
//! 1. **One Reusable Core**: Every command is an operation closure handed to
//!    [`ShardedClient::execute`]; the facade adds routing, never semantics.
//! 2. **Native Reply Shapes**: Return types mirror what the store answers —
//!    strings, integers, booleans, sequences, mappings.
//! 3. **Unmodified Propagation**: No retries, no fallback values; backend
//!    errors reach the caller as raised.

use std::collections::HashMap;

use crate::config::{ClientConfig, Routing};
use crate::error::{ClientError, ClientResult};
use crate::pool::ConnectionLease;
use crate::resp::Reply;
use crate::router::Router;

/// Condition attached to a conditional `set`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetCondition {
    /// Only set when the key does not exist (NX).
    IfAbsent,
    /// Only set when the key already exists (XX).
    IfPresent,
}

/// Expiry attached to a conditional `set`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetExpiry {
    /// Relative expiry in seconds (EX).
    Seconds(u64),
    /// Relative expiry in milliseconds (PX).
    Millis(u64),
}

/// Sharded, pooled client for a Redis-compatible store.
///
/// Construct one per process (or per test) and share it across threads; all
/// methods take `&self`. [`ShardedClient::destroy`] is the only teardown
/// entry point and closes every underlying pool.
pub struct ShardedClient {
    router: Router,
}

impl ShardedClient {
    /// Builds a client from an explicit configuration.
    pub fn new(config: ClientConfig) -> Self {
        ShardedClient {
            router: Router::new(&config),
        }
    }

    /// Builds a client from an injected settings map (see
    /// [`crate::config::keys`]).
    pub fn from_settings(
        settings: &HashMap<String, String>,
        routing: Routing,
    ) -> ClientResult<Self> {
        Ok(ShardedClient::new(ClientConfig::from_settings(
            settings, routing,
        )?))
    }

    /// Runs one operation against the shard owning `key`.
    ///
    /// Resolves the pool, borrows a connection (the only point that may
    /// block), runs `op`, and releases the connection on every exit path via
    /// the lease's drop. The operation's result or failure is propagated
    /// unchanged; nothing is retried.
    pub fn execute<T, F>(&self, key: &str, op: F) -> ClientResult<T>
    where
        F: FnOnce(&mut ConnectionLease) -> ClientResult<T>,
    {
        let mut lease = self.router.pool_for(key).acquire()?;
        op(&mut lease)
    }

    /// Closes all underlying pools. Further calls on this client fail with a
    /// connection error rather than hanging.
    pub fn destroy(&self) {
        self.router.close();
    }

    /// The router, exposed for pool introspection in tests and tooling.
    pub fn router(&self) -> &Router {
        &self.router
    }

    // String operations ----------------------------------------------------

    pub fn get(&self, key: &str) -> ClientResult<Option<String>> {
        self.execute(key, |conn| {
            optional_text(conn.exec(&[b"GET", key.as_bytes()])?)
        })
    }

    pub fn set(&self, key: &str, value: &str) -> ClientResult<()> {
        self.execute(key, |conn| {
            status(conn.exec(&[b"SET", key.as_bytes(), value.as_bytes()])?)
        })
    }

    /// Conditional set. Returns `true` when the store applied the write and
    /// `false` when the condition rejected it.
    pub fn set_with_options(
        &self,
        key: &str,
        value: &str,
        condition: SetCondition,
        expiry: SetExpiry,
    ) -> ClientResult<bool> {
        let condition_arg: &[u8] = match condition {
            SetCondition::IfAbsent => b"NX",
            SetCondition::IfPresent => b"XX",
        };
        let (expiry_arg, ttl): (&[u8], u64) = match expiry {
            SetExpiry::Seconds(secs) => (b"EX", secs),
            SetExpiry::Millis(millis) => (b"PX", millis),
        };
        let ttl = ttl.to_string();
        self.execute(key, |conn| {
            match conn.exec(&[
                b"SET",
                key.as_bytes(),
                value.as_bytes(),
                condition_arg,
                expiry_arg,
                ttl.as_bytes(),
            ])? {
                Reply::Status(_) => Ok(true),
                Reply::Bulk(None) => Ok(false),
                Reply::Error(message) => Err(server_error(message)),
                _ => Err(ClientError::UnexpectedReply),
            }
        })
    }

    /// SETNX. Returns `true` when the key was absent and has been set.
    pub fn set_if_not_exists(&self, key: &str, value: &str) -> ClientResult<bool> {
        self.execute(key, |conn| {
            flag(conn.exec(&[b"SETNX", key.as_bytes(), value.as_bytes()])?)
        })
    }

    /// SETEX: set with a relative expiry in seconds.
    pub fn set_with_expiry(&self, key: &str, seconds: u64, value: &str) -> ClientResult<()> {
        let seconds = seconds.to_string();
        self.execute(key, |conn| {
            status(conn.exec(&[b"SETEX", key.as_bytes(), seconds.as_bytes(), value.as_bytes()])?)
        })
    }

    /// Returns `true` when the expiry was set on an existing key.
    pub fn expire(&self, key: &str, seconds: u64) -> ClientResult<bool> {
        let seconds = seconds.to_string();
        self.execute(key, |conn| {
            flag(conn.exec(&[b"EXPIRE", key.as_bytes(), seconds.as_bytes()])?)
        })
    }

    pub fn exists(&self, key: &str) -> ClientResult<bool> {
        self.execute(key, |conn| flag(conn.exec(&[b"EXISTS", key.as_bytes()])?))
    }

    /// Increments the counter at `key`, creating it at 0 first when missing.
    pub fn incr(&self, key: &str) -> ClientResult<i64> {
        self.execute(key, |conn| integer(conn.exec(&[b"INCR", key.as_bytes()])?))
    }

    pub fn decr(&self, key: &str) -> ClientResult<i64> {
        self.execute(key, |conn| integer(conn.exec(&[b"DECR", key.as_bytes()])?))
    }

    /// Returns `true` when a key was actually removed.
    pub fn del(&self, key: &str) -> ClientResult<bool> {
        self.execute(key, |conn| flag(conn.exec(&[b"DEL", key.as_bytes()])?))
    }

    // Hash-field operations -------------------------------------------------

    /// Returns `true` when `field` was newly created rather than updated.
    pub fn hash_set(&self, key: &str, field: &str, value: &str) -> ClientResult<bool> {
        self.execute(key, |conn| {
            flag(conn.exec(&[b"HSET", key.as_bytes(), field.as_bytes(), value.as_bytes()])?)
        })
    }

    pub fn hash_get(&self, key: &str, field: &str) -> ClientResult<Option<String>> {
        self.execute(key, |conn| {
            optional_text(conn.exec(&[b"HGET", key.as_bytes(), field.as_bytes()])?)
        })
    }

    /// Sets several hash fields in one round trip.
    pub fn hash_bulk_set(&self, key: &str, fields: &HashMap<String, String>) -> ClientResult<()> {
        let mut args: Vec<&[u8]> = Vec::with_capacity(2 + fields.len() * 2);
        args.push(b"HMSET");
        args.push(key.as_bytes());
        for (field, value) in fields {
            args.push(field.as_bytes());
            args.push(value.as_bytes());
        }
        self.execute(key, |conn| status(conn.exec(&args)?))
    }

    /// Fetches several hash fields; the result is field-ordered with `None`
    /// for fields that are absent.
    pub fn hash_bulk_get(&self, key: &str, fields: &[&str]) -> ClientResult<Vec<Option<String>>> {
        let mut args: Vec<&[u8]> = Vec::with_capacity(2 + fields.len());
        args.push(b"HMGET");
        args.push(key.as_bytes());
        for field in fields {
            args.push(field.as_bytes());
        }
        self.execute(key, |conn| match conn.exec(&args)? {
            Reply::Array(items) => items.into_iter().map(optional_text).collect(),
            Reply::Error(message) => Err(server_error(message)),
            _ => Err(ClientError::UnexpectedReply),
        })
    }

    /// Fetches every field of the hash at `key`; empty map when missing.
    pub fn hash_get_all(&self, key: &str) -> ClientResult<HashMap<String, String>> {
        self.execute(key, |conn| {
            let items = match conn.exec(&[b"HGETALL", key.as_bytes()])? {
                Reply::Array(items) => items,
                Reply::Error(message) => return Err(server_error(message)),
                _ => return Err(ClientError::UnexpectedReply),
            };
            if items.len() % 2 != 0 {
                return Err(ClientError::UnexpectedReply);
            }
            let mut map = HashMap::with_capacity(items.len() / 2);
            let mut iter = items.into_iter();
            while let (Some(field), Some(value)) = (iter.next(), iter.next()) {
                let field = optional_text(field)?.ok_or(ClientError::UnexpectedReply)?;
                let value = optional_text(value)?.ok_or(ClientError::UnexpectedReply)?;
                map.insert(field, value);
            }
            Ok(map)
        })
    }
}

// Reply adapters shared by the facade methods. Each maps exactly one native
// reply shape; anything else is an UnexpectedReply.

fn server_error(message: Vec<u8>) -> ClientError {
    ClientError::Server(String::from_utf8_lossy(&message).into_owned())
}

fn status(reply: Reply) -> ClientResult<()> {
    match reply {
        Reply::Status(_) => Ok(()),
        Reply::Error(message) => Err(server_error(message)),
        _ => Err(ClientError::UnexpectedReply),
    }
}

fn integer(reply: Reply) -> ClientResult<i64> {
    match reply {
        Reply::Integer(value) => Ok(value),
        Reply::Error(message) => Err(server_error(message)),
        _ => Err(ClientError::UnexpectedReply),
    }
}

fn flag(reply: Reply) -> ClientResult<bool> {
    integer(reply).map(|value| value > 0)
}

fn optional_text(reply: Reply) -> ClientResult<Option<String>> {
    match reply {
        Reply::Bulk(Some(data)) => String::from_utf8(data)
            .map(Some)
            .map_err(|_| ClientError::UnexpectedReply),
        Reply::Bulk(None) => Ok(None),
        Reply::Error(message) => Err(server_error(message)),
        _ => Err(ClientError::UnexpectedReply),
    }
}
