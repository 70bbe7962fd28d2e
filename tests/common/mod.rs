//! In-process fake shard: a TCP server speaking enough RESP2 to exercise the
//! client end to end, backed by a plain in-memory store.

// Each test binary uses its own subset of this module.
#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use redshard::{ClientConfig, Endpoint, Routing, ShardedClient};

#[derive(Default)]
struct Store {
    strings: HashMap<String, String>,
    hashes: HashMap<String, HashMap<String, String>>,
}

/// One fake backend shard listening on a loopback port.
pub struct FakeShard {
    endpoint: Endpoint,
    store: Arc<Mutex<Store>>,
    // Cloned handles of every accepted connection, for tests that kill the
    // server side of pooled sockets.
    accepted: Arc<Mutex<Vec<TcpStream>>>,
}

/// Installs a test-writer subscriber once; respects `RUST_LOG`.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

impl FakeShard {
    pub fn spawn() -> Self {
        init_tracing();
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        let store = Arc::new(Mutex::new(Store::default()));
        let accepted = Arc::new(Mutex::new(Vec::new()));

        let store_for_accept = store.clone();
        let accepted_for_accept = accepted.clone();
        thread::spawn(move || {
            for stream in listener.incoming() {
                let stream = match stream {
                    Ok(stream) => stream,
                    Err(_) => break,
                };
                if let Ok(handle) = stream.try_clone() {
                    accepted_for_accept.lock().unwrap().push(handle);
                }
                let store = store_for_accept.clone();
                thread::spawn(move || serve_connection(stream, store));
            }
        });

        FakeShard {
            endpoint: Endpoint::new(addr.ip().to_string(), addr.port()),
            store,
            accepted,
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        self.endpoint.clone()
    }

    /// Number of top-level keys currently stored.
    pub fn key_count(&self) -> usize {
        let store = self.store.lock().unwrap();
        store.strings.len() + store.hashes.len()
    }

    /// Severs every connection accepted so far, server side.
    pub fn drop_connections(&self) {
        for stream in self.accepted.lock().unwrap().drain(..) {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
    }
}

/// Client wired to the given shards with tight test timeouts.
pub fn client_for(shards: &[&FakeShard], routing: Routing) -> ShardedClient {
    ShardedClient::new(config_for(shards, routing))
}

pub fn config_for(shards: &[&FakeShard], routing: Routing) -> ClientConfig {
    let endpoints = shards.iter().map(|shard| shard.endpoint()).collect();
    let mut config = ClientConfig::new(endpoints, routing).expect("config");
    config.timeout = Duration::from_secs(2);
    config.max_wait = Some(Duration::from_secs(2));
    config
}

fn serve_connection(stream: TcpStream, store: Arc<Mutex<Store>>) {
    let mut writer = match stream.try_clone() {
        Ok(writer) => writer,
        Err(_) => return,
    };
    let mut reader = BufReader::new(stream);
    while let Ok(Some(args)) = read_command(&mut reader) {
        let reply = dispatch(&args, &store);
        if writer.write_all(&reply).and_then(|_| writer.flush()).is_err() {
            break;
        }
    }
}

fn dispatch(args: &[Vec<u8>], store: &Mutex<Store>) -> Vec<u8> {
    let command = match args.first() {
        Some(name) => String::from_utf8_lossy(name).to_ascii_uppercase(),
        None => return error("empty command"),
    };
    let arg = |i: usize| String::from_utf8_lossy(&args[i]).into_owned();
    let mut store = store.lock().unwrap();

    match command.as_str() {
        "PING" => status("PONG"),
        "GET" => match store.strings.get(&arg(1)) {
            Some(value) => bulk(value),
            None => null_bulk(),
        },
        "SET" if args.len() == 3 => {
            store.strings.insert(arg(1), arg(2));
            status("OK")
        }
        "SET" => handle_set_options(args, &mut store),
        "SETNX" => {
            let key = arg(1);
            if store.strings.contains_key(&key) {
                integer(0)
            } else {
                store.strings.insert(key, arg(2));
                integer(1)
            }
        }
        "SETEX" => {
            // TTL accepted and ignored; tests only assert the reply shape.
            store.strings.insert(arg(1), arg(3));
            status("OK")
        }
        "EXPIRE" => {
            let key = arg(1);
            if store.strings.contains_key(&key) || store.hashes.contains_key(&key) {
                integer(1)
            } else {
                integer(0)
            }
        }
        "EXISTS" => {
            let key = arg(1);
            let present = store.strings.contains_key(&key) || store.hashes.contains_key(&key);
            integer(present as i64)
        }
        "INCR" => counter(&mut store, &arg(1), 1),
        "DECR" => counter(&mut store, &arg(1), -1),
        "DEL" => {
            let key = arg(1);
            let removed =
                store.strings.remove(&key).is_some() || store.hashes.remove(&key).is_some();
            integer(removed as i64)
        }
        "HSET" => {
            let created = store
                .hashes
                .entry(arg(1))
                .or_default()
                .insert(arg(2), arg(3))
                .is_none();
            integer(created as i64)
        }
        "HGET" => match store.hashes.get(&arg(1)).and_then(|h| h.get(&arg(2))) {
            Some(value) => bulk(value),
            None => null_bulk(),
        },
        "HMSET" => {
            let hash = store.hashes.entry(arg(1)).or_default();
            for pair in args[2..].chunks_exact(2) {
                hash.insert(
                    String::from_utf8_lossy(&pair[0]).into_owned(),
                    String::from_utf8_lossy(&pair[1]).into_owned(),
                );
            }
            status("OK")
        }
        "HMGET" => {
            let key = arg(1);
            let mut reply = format!("*{}\r\n", args.len() - 2).into_bytes();
            for field in &args[2..] {
                let field = String::from_utf8_lossy(field).into_owned();
                match store.hashes.get(&key).and_then(|h| h.get(&field)) {
                    Some(value) => reply.extend_from_slice(&bulk(value)),
                    None => reply.extend_from_slice(&null_bulk()),
                }
            }
            reply
        }
        "HGETALL" => {
            let fields = store.hashes.get(&arg(1)).cloned().unwrap_or_default();
            let mut reply = format!("*{}\r\n", fields.len() * 2).into_bytes();
            for (field, value) in fields {
                reply.extend_from_slice(&bulk(&field));
                reply.extend_from_slice(&bulk(&value));
            }
            reply
        }
        _ => error("unknown command"),
    }
}

fn handle_set_options(args: &[Vec<u8>], store: &mut Store) -> Vec<u8> {
    let key = String::from_utf8_lossy(&args[1]).into_owned();
    let value = String::from_utf8_lossy(&args[2]).into_owned();
    let mut condition_ok = true;
    let mut idx = 3;
    while idx < args.len() {
        let token = String::from_utf8_lossy(&args[idx]).to_ascii_uppercase();
        match token.as_str() {
            "NX" => condition_ok = !store.strings.contains_key(&key),
            "XX" => condition_ok = store.strings.contains_key(&key),
            "EX" | "PX" => idx += 1, // TTL value accepted and ignored
            _ => return error("syntax error"),
        }
        idx += 1;
    }
    if condition_ok {
        store.strings.insert(key, value);
        status("OK")
    } else {
        null_bulk()
    }
}

fn counter(store: &mut Store, key: &str, delta: i64) -> Vec<u8> {
    let current = match store.strings.get(key) {
        Some(text) => match text.parse::<i64>() {
            Ok(value) => value,
            Err(_) => return error("value is not an integer or out of range"),
        },
        None => 0,
    };
    let next = current + delta;
    store.strings.insert(key.to_string(), next.to_string());
    integer(next)
}

// RESP plumbing ------------------------------------------------------------

fn read_command(reader: &mut BufReader<TcpStream>) -> std::io::Result<Option<Vec<Vec<u8>>>> {
    let mut line = Vec::new();
    if read_line(reader, &mut line)?.is_none() {
        return Ok(None);
    }
    if line.first() != Some(&b'*') {
        return Err(invalid("expected array header"));
    }
    let count = parse_len(&line[1..])?;
    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        read_line(reader, &mut line)?.ok_or_else(|| invalid("eof mid-command"))?;
        if line.first() != Some(&b'$') {
            return Err(invalid("expected bulk header"));
        }
        let len = parse_len(&line[1..])?;
        let mut data = vec![0u8; len];
        reader.read_exact(&mut data)?;
        let mut crlf = [0u8; 2];
        reader.read_exact(&mut crlf)?;
        if crlf != *b"\r\n" {
            return Err(invalid("missing crlf"));
        }
        args.push(data);
    }
    Ok(Some(args))
}

fn read_line(reader: &mut BufReader<TcpStream>, buf: &mut Vec<u8>) -> std::io::Result<Option<()>> {
    buf.clear();
    if reader.read_until(b'\n', buf)? == 0 {
        return Ok(None);
    }
    if buf.len() < 2 || buf[buf.len() - 2] != b'\r' {
        return Err(invalid("bad line terminator"));
    }
    buf.truncate(buf.len() - 2);
    Ok(Some(()))
}

fn parse_len(data: &[u8]) -> std::io::Result<usize> {
    std::str::from_utf8(data)
        .ok()
        .and_then(|text| text.parse::<usize>().ok())
        .ok_or_else(|| invalid("bad length"))
}

fn invalid(message: &str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, message.to_string())
}

fn status(text: &str) -> Vec<u8> {
    format!("+{text}\r\n").into_bytes()
}

fn error(text: &str) -> Vec<u8> {
    format!("-ERR {text}\r\n").into_bytes()
}

fn integer(value: i64) -> Vec<u8> {
    format!(":{value}\r\n").into_bytes()
}

fn bulk(data: &str) -> Vec<u8> {
    format!("${}\r\n{data}\r\n", data.len()).into_bytes()
}

fn null_bulk() -> Vec<u8> {
    b"$-1\r\n".to_vec()
}
