//! # RESP2 Wire Codec
//!
//! Purpose: Frame outgoing commands and parse backend replies without
//! pulling in a protocol crate.
//!
//! Commands always go out as arrays of bulk strings. Replies are parsed
//! top-down into [`Reply`]; bulk payloads are raw bytes until the facade
//! decides they are text. Invalid framing fails fast with
//! `ClientError::Protocol`.

use std::io::BufRead;

use crate::error::{ClientError, ClientResult};

/// One reply value from the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `+OK` style status line.
    Status(Vec<u8>),
    /// `-ERR ...` error line.
    Error(Vec<u8>),
    /// `:123` integer.
    Integer(i64),
    /// `$...` bulk string; `None` is the null bulk (`$-1`).
    Bulk(Option<Vec<u8>>),
    /// `*...` array of replies.
    Array(Vec<Reply>),
}

/// Frames a command as a RESP2 array of bulk strings into `out`.
pub fn write_command(args: &[&[u8]], out: &mut Vec<u8>) {
    out.push(b'*');
    out.extend_from_slice(args.len().to_string().as_bytes());
    out.extend_from_slice(b"\r\n");
    for arg in args {
        out.push(b'$');
        out.extend_from_slice(arg.len().to_string().as_bytes());
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(arg);
        out.extend_from_slice(b"\r\n");
    }
}

/// Reads one complete reply. `scratch` is reused across calls to keep header
/// lines off the heap.
pub fn read_reply<R: BufRead>(reader: &mut R, scratch: &mut Vec<u8>) -> ClientResult<Reply> {
    read_line(reader, scratch)?;
    let (&marker, rest) = scratch.split_first().ok_or(ClientError::Protocol)?;
    match marker {
        b'+' => Ok(Reply::Status(rest.to_vec())),
        b'-' => Ok(Reply::Error(rest.to_vec())),
        b':' => Ok(Reply::Integer(parse_int(rest)?)),
        b'$' => {
            let len = parse_int(rest)?;
            read_bulk(reader, len)
        }
        b'*' => {
            let len = parse_int(rest)?;
            read_array(reader, len, scratch)
        }
        _ => Err(ClientError::Protocol),
    }
}

fn read_bulk<R: BufRead>(reader: &mut R, len: i64) -> ClientResult<Reply> {
    if len < 0 {
        return Ok(Reply::Bulk(None));
    }
    let mut data = vec![0u8; len as usize];
    reader.read_exact(&mut data)?;
    let mut crlf = [0u8; 2];
    reader.read_exact(&mut crlf)?;
    if crlf != *b"\r\n" {
        return Err(ClientError::Protocol);
    }
    Ok(Reply::Bulk(Some(data)))
}

fn read_array<R: BufRead>(reader: &mut R, len: i64, scratch: &mut Vec<u8>) -> ClientResult<Reply> {
    if len <= 0 {
        return Ok(Reply::Array(Vec::new()));
    }
    let mut items = Vec::with_capacity(len as usize);
    for _ in 0..len {
        items.push(read_reply(reader, scratch)?);
    }
    Ok(Reply::Array(items))
}

fn read_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> ClientResult<()> {
    buf.clear();
    let bytes = reader.read_until(b'\n', buf)?;
    // A zero-byte read here means the backend closed mid-reply.
    if bytes == 0 || buf.len() < 2 || buf[buf.len() - 2] != b'\r' {
        return Err(ClientError::Protocol);
    }
    buf.truncate(buf.len() - 2);
    Ok(())
}

fn parse_int(data: &[u8]) -> ClientResult<i64> {
    let text = std::str::from_utf8(data).map_err(|_| ClientError::Protocol)?;
    text.parse::<i64>().map_err(|_| ClientError::Protocol)
}
