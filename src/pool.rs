//! # Connection Pool
//!
//! Purpose: Bound and reuse TCP connections to one backend shard, with a
//! blocking borrow that honors the configured wait budget.
//!
//! ## Design Principles
//! 1. **Bounded Total**: Idle plus leased connections never exceed
//!    `max_total`; excess borrowers wait on a condvar.
//! 2. **RAII Release**: A [`ConnectionLease`] returns its connection on drop,
//!    on every exit path, including panics inside the operation.
//! 3. **Minimal Locking**: The mutex only guards counters and the idle queue;
//!    dialing and command execution happen outside it.
//! 4. **No Poison Reuse**: Connections that saw an IO or framing error are
//!    discarded instead of pooled.

use std::collections::VecDeque;
use std::io::{BufReader, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::config::{ClientConfig, Endpoint};
use crate::error::{ClientError, ClientResult};
use crate::resp::{read_reply, write_command, Reply};

/// Tuning for one pool, copied out of [`ClientConfig`] at construction.
#[derive(Debug, Clone)]
pub struct PoolOptions {
    pub max_total: usize,
    pub max_idle: usize,
    pub min_idle: usize,
    pub max_wait: Option<Duration>,
    pub test_on_borrow: bool,
    pub timeout: Duration,
}

impl PoolOptions {
    pub fn from_config(config: &ClientConfig) -> Self {
        PoolOptions {
            max_total: config.max_total.max(1),
            max_idle: config.max_idle,
            min_idle: config.min_idle,
            max_wait: config.max_wait,
            test_on_borrow: config.test_on_borrow,
            timeout: config.timeout,
        }
    }
}

/// Point-in-time pool counters, mainly for tests and introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Idle plus leased connections.
    pub total: usize,
    /// Connections sitting in the idle queue.
    pub idle: usize,
}

struct PoolState {
    idle: VecDeque<Connection>,
    total: usize,
    closed: bool,
}

struct PoolInner {
    endpoint: Endpoint,
    options: PoolOptions,
    state: Mutex<PoolState>,
    returned: Condvar,
}

/// Bounded pool of connections to a single shard.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

/// What `acquire` decided to do while it held the lock.
enum Borrow {
    Idle(Connection),
    Dial,
    Wait,
}

impl ConnectionPool {
    pub fn new(endpoint: Endpoint, options: PoolOptions) -> Self {
        ConnectionPool {
            inner: Arc::new(PoolInner {
                endpoint,
                options,
                state: Mutex::new(PoolState {
                    idle: VecDeque::new(),
                    total: 0,
                    closed: false,
                }),
                returned: Condvar::new(),
            }),
        }
    }

    /// The shard this pool serves.
    pub fn endpoint(&self) -> &Endpoint {
        &self.inner.endpoint
    }

    /// Borrows a connection, blocking up to the configured `max_wait` when
    /// the pool is at `max_total`, or indefinitely when no wait is set.
    ///
    /// With `test_on_borrow` enabled, idle connections are validated with a
    /// PING before hand-out and replaced transparently when dead.
    pub fn acquire(&self) -> ClientResult<ConnectionLease> {
        let deadline = self.inner.options.max_wait.map(|wait| Instant::now() + wait);
        loop {
            let decision = {
                let mut state = self.inner.state.lock();
                loop {
                    if state.closed {
                        return Err(ClientError::Connection(format!(
                            "pool for {} is closed",
                            self.inner.endpoint
                        )));
                    }
                    if let Some(conn) = state.idle.pop_front() {
                        break Borrow::Idle(conn);
                    }
                    if state.total < self.inner.options.max_total {
                        // Reserve the slot before dropping the lock so
                        // concurrent borrowers cannot overshoot max_total.
                        state.total += 1;
                        break Borrow::Dial;
                    }
                    break Borrow::Wait;
                }
            };

            match decision {
                Borrow::Idle(mut conn) => {
                    if !self.inner.options.test_on_borrow || validate(&mut conn) {
                        return Ok(ConnectionLease::new(self.inner.clone(), conn));
                    }
                    warn!(
                        endpoint = %self.inner.endpoint,
                        "discarding idle connection that failed validation"
                    );
                    self.forget_one();
                    // Loop back around; the freed slot lets us dial a
                    // replacement.
                }
                Borrow::Dial => match self.dial() {
                    Ok(conn) => return Ok(ConnectionLease::new(self.inner.clone(), conn)),
                    Err(err) => {
                        self.forget_one();
                        return Err(err);
                    }
                },
                Borrow::Wait => {
                    let mut state = self.inner.state.lock();
                    // Re-check under the lock; a release may have raced us.
                    if !state.idle.is_empty()
                        || state.total < self.inner.options.max_total
                        || state.closed
                    {
                        continue;
                    }
                    match deadline {
                        None => {
                            self.inner.returned.wait(&mut state);
                        }
                        Some(deadline) => {
                            if self
                                .inner
                                .returned
                                .wait_until(&mut state, deadline)
                                .timed_out()
                            {
                                return Err(ClientError::PoolExhausted {
                                    endpoint: self.inner.endpoint.to_string(),
                                });
                            }
                        }
                    }
                }
            }
        }
    }

    /// Closes the pool: drops idle connections, wakes all waiters, and makes
    /// further `acquire` calls fail. Idempotent. Leased connections are
    /// discarded when their leases drop.
    pub fn close(&self) {
        let drained = {
            let mut state = self.inner.state.lock();
            state.closed = true;
            let drained = state.idle.len();
            state.total -= drained;
            state.idle.clear();
            drained
        };
        self.inner.returned.notify_all();
        debug!(endpoint = %self.inner.endpoint, drained, "pool closed");
    }

    /// Current counters.
    pub fn stats(&self) -> PoolStats {
        let state = self.inner.state.lock();
        PoolStats {
            total: state.total,
            idle: state.idle.len(),
        }
    }

    fn dial(&self) -> ClientResult<Connection> {
        debug!(endpoint = %self.inner.endpoint, "dialing backend");
        Connection::connect(&self.inner.endpoint, self.inner.options.timeout)
    }

    /// Forgets one connection slot and wakes a waiter that may now dial.
    fn forget_one(&self) {
        let mut state = self.inner.state.lock();
        state.total = state.total.saturating_sub(1);
        drop(state);
        self.inner.returned.notify_one();
    }
}

/// Leased connection, exclusively owned until dropped.
///
/// Dropping the lease is the release: the connection re-enters the idle set
/// unless it errored, the pool is closed, or the idle set is full.
pub struct ConnectionLease {
    pool: Arc<PoolInner>,
    conn: Option<Connection>,
    healthy: bool,
}

impl ConnectionLease {
    fn new(pool: Arc<PoolInner>, conn: Connection) -> Self {
        ConnectionLease {
            pool,
            conn: Some(conn),
            healthy: true,
        }
    }

    /// Sends one command and reads its reply. A transport or framing failure
    /// poisons the lease so the connection is not pooled again.
    pub fn exec(&mut self, args: &[&[u8]]) -> ClientResult<Reply> {
        let conn = match self.conn.as_mut() {
            Some(conn) => conn,
            None => return Err(ClientError::Connection("lease already released".into())),
        };
        let reply = conn.exec(args);
        if let Err(err) = &reply {
            if err.poisons_connection() {
                self.healthy = false;
            }
        }
        reply
    }
}

impl Drop for ConnectionLease {
    fn drop(&mut self) {
        let conn = match self.conn.take() {
            Some(conn) => conn,
            None => return,
        };
        {
            let mut state = self.pool.state.lock();
            if self.healthy && !state.closed && state.idle.len() < self.pool.options.max_idle {
                state.idle.push_back(conn);
            } else {
                state.total = state.total.saturating_sub(1);
            }
        }
        self.pool.returned.notify_one();
    }
}

/// One TCP connection with reusable RESP buffers.
pub struct Connection {
    reader: BufReader<TcpStream>,
    scratch: Vec<u8>,
    write_buf: Vec<u8>,
}

impl Connection {
    fn connect(endpoint: &Endpoint, timeout: Duration) -> ClientResult<Self> {
        let addr = resolve(endpoint)?;
        let stream = TcpStream::connect_timeout(&addr, timeout)
            .map_err(|err| ClientError::Connection(format!("connect to {endpoint}: {err}")))?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;
        // Small request/reply payloads; do not let Nagle batch them.
        stream.set_nodelay(true)?;
        Ok(Connection {
            reader: BufReader::new(stream),
            scratch: Vec::with_capacity(128),
            write_buf: Vec::with_capacity(256),
        })
    }

    fn exec(&mut self, args: &[&[u8]]) -> ClientResult<Reply> {
        self.write_buf.clear();
        write_command(args, &mut self.write_buf);
        let stream = self.reader.get_mut();
        stream.write_all(&self.write_buf)?;
        stream.flush()?;
        read_reply(&mut self.reader, &mut self.scratch)
    }
}

/// Full PING round trip; the probe that `test_on_borrow` buys.
fn validate(conn: &mut Connection) -> bool {
    matches!(conn.exec(&[b"PING"]), Ok(Reply::Status(_)))
}

fn resolve(endpoint: &Endpoint) -> ClientResult<SocketAddr> {
    let mut addrs = (endpoint.host.as_str(), endpoint.port)
        .to_socket_addrs()
        .map_err(|err| ClientError::Connection(format!("resolve {endpoint}: {err}")))?;
    addrs
        .next()
        .ok_or_else(|| ClientError::Connection(format!("no address for {endpoint}")))
}
