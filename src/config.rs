//! # Client Configuration
//!
//! Purpose: Describe the shard endpoints and pool tuning for one client,
//! either built directly or loaded from an injected settings map.
//!
//! The settings map mirrors the deployment's property file: the process that
//! owns the client reads whatever source it likes (file, environment, ...)
//! and hands the flat `String -> String` map over. Numeric values that fail
//! to parse fall back to their defaults; only a missing or empty endpoint
//! list is fatal.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use crate::error::{ClientError, ClientResult};

const ENDPOINT_SEPARATOR: char = ';';
const HOST_PORT_SEPARATOR: char = ':';

/// Settings keys understood by [`ClientConfig::from_settings`].
pub mod keys {
    /// Per-connection socket timeout in milliseconds (default 2000).
    pub const TIMEOUT: &str = "redis.timeout";
    /// Maximum connections per pool (default 8).
    pub const MAX_TOTAL: &str = "redis.jedisPoolConfig.maxTotal";
    /// Maximum idle connections per pool (default 8).
    pub const MAX_IDLE: &str = "redis.jedisPoolConfig.maxIdle";
    /// Minimum idle target per pool (default 0, advisory).
    pub const MIN_IDLE: &str = "redis.jedisPoolConfig.minIdle";
    /// Maximum wait on acquire in milliseconds, -1 for unbounded (default -1).
    pub const MAX_WAIT: &str = "redis.jedisPoolConfig.maxWaitTime";
    /// Whether to validate a connection before handing it out (default false).
    pub const TEST_ON_BORROW: &str = "redis.jedisPoolConfig.testOnBorrow";
    /// Required `;`-separated list of `host:port` endpoints.
    pub const URLS: &str = "redis.jedisPoolConfig.urls";
}

/// One independently addressable backend store instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Endpoint {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.host, HOST_PORT_SEPARATOR, self.port)
    }
}

/// Parses a `;`-separated `host:port` list into endpoints.
///
/// Empty entries (trailing separators, doubled separators) are skipped; an
/// entirely empty list is a configuration error, as is any malformed entry.
pub fn parse_endpoints(urls: &str) -> ClientResult<Vec<Endpoint>> {
    let mut endpoints = Vec::new();
    for entry in urls.split(ENDPOINT_SEPARATOR) {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let (host, port) = entry
            .rsplit_once(HOST_PORT_SEPARATOR)
            .ok_or_else(|| ClientError::Config(format!("endpoint without port: {entry:?}")))?;
        if host.is_empty() {
            return Err(ClientError::Config(format!(
                "endpoint without host: {entry:?}"
            )));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| ClientError::Config(format!("invalid port in endpoint {entry:?}")))?;
        endpoints.push(Endpoint::new(host, port));
    }
    if endpoints.is_empty() {
        return Err(ClientError::Config(
            "no backend endpoints configured".to_string(),
        ));
    }
    Ok(endpoints)
}

/// Key-to-shard addressing policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routing {
    /// `hash(key) mod N` over the endpoint list in configuration order.
    /// Changing N remaps nearly all keys.
    FixedModulo,
    /// Hash ring over the endpoints; minimizes remapping when the endpoint
    /// set changes between deployments.
    ConsistentRing,
}

/// Full configuration for one sharded client. Immutable once the client is
/// constructed.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend shards, in configuration order.
    pub endpoints: Vec<Endpoint>,
    /// Addressing policy mapping keys onto `endpoints`.
    pub routing: Routing,
    /// Socket connect/read/write timeout.
    pub timeout: Duration,
    /// Maximum connections per pool, idle and leased combined.
    pub max_total: usize,
    /// Maximum idle connections kept per pool.
    pub max_idle: usize,
    /// Idle target per pool. Carried as an advisory knob; the pool does not
    /// pre-warm or background-evict.
    pub min_idle: usize,
    /// Maximum time `acquire` may block; `None` waits indefinitely.
    pub max_wait: Option<Duration>,
    /// Validate idle connections with a PING before handing them out.
    pub test_on_borrow: bool,
}

impl ClientConfig {
    /// Configuration with default tuning for the given endpoints.
    pub fn new(endpoints: Vec<Endpoint>, routing: Routing) -> ClientResult<Self> {
        if endpoints.is_empty() {
            return Err(ClientError::Config(
                "no backend endpoints configured".to_string(),
            ));
        }
        Ok(ClientConfig {
            endpoints,
            routing,
            timeout: Duration::from_millis(2000),
            max_total: 8,
            max_idle: 8,
            min_idle: 0,
            max_wait: None,
            test_on_borrow: false,
        })
    }

    /// Loads configuration from an injected settings map using the keys in
    /// [`keys`]. The endpoint list is required; everything else defaults.
    pub fn from_settings(
        settings: &HashMap<String, String>,
        routing: Routing,
    ) -> ClientResult<Self> {
        let urls = settings
            .get(keys::URLS)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                ClientError::Config(format!("required setting {} is missing", keys::URLS))
            })?;
        let mut config = ClientConfig::new(parse_endpoints(urls)?, routing)?;

        config.timeout = Duration::from_millis(get_u64(settings, keys::TIMEOUT, 2000));
        config.max_total = get_u64(settings, keys::MAX_TOTAL, 8) as usize;
        config.max_idle = get_u64(settings, keys::MAX_IDLE, 8) as usize;
        config.min_idle = get_u64(settings, keys::MIN_IDLE, 0) as usize;
        config.max_wait = match get_i64(settings, keys::MAX_WAIT, -1) {
            millis if millis < 0 => None,
            millis => Some(Duration::from_millis(millis as u64)),
        };
        config.test_on_borrow = settings
            .get(keys::TEST_ON_BORROW)
            .map(|v| v.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Ok(config)
    }
}

fn get_u64(settings: &HashMap<String, String>, key: &str, default: u64) -> u64 {
    settings
        .get(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn get_i64(settings: &HashMap<String, String>, key: &str, default: i64) -> i64 {
    settings
        .get(key)
        .and_then(|v| v.trim().parse::<i64>().ok())
        .unwrap_or(default)
}
