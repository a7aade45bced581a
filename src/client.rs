//! Remote database client.
//!
//! Mirrors the server's request/reply discipline over one TCP connection:
//! every call sends one frame and blocks for its reply. Iteration pulls
//! pages of entries and replays them locally, refilling on demand, so a
//! full scan costs one round-trip per page instead of one per entry.

use std::collections::VecDeque;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::error::{KvError, Result};
use crate::wire::{self, KeyValue, Request, Response};

// The batch builder is the engine's own; it crosses the wire as-is.
pub use crate::engine::WriteBatch;

/// A connection bound to one remote database.
pub struct RemoteDatabase {
    stream: TcpStream,
}

impl RemoteDatabase {
    /// Connect to `addr` and open `dbname`, creating it when
    /// `create_if_needed`. `timeout_secs` bounds the connect and every
    /// subsequent request round-trip.
    pub fn open(
        addr: &str,
        dbname: &str,
        create_if_needed: bool,
        timeout_secs: u64,
    ) -> Result<RemoteDatabase> {
        let stream = connect(addr, timeout_secs)?;
        let mut db = RemoteDatabase { stream };

        let reply = db.call(&Request::Open {
            dbname: dbname.to_string(),
            create: create_if_needed,
        })?;
        match reply {
            Response::Open { error } => check(&error)?,
            other => return Err(unexpected(&other)),
        }

        Ok(db)
    }

    /// Point read. Fails with `KeyNotFound` for an absent key; an empty
    /// value comes back as an empty vec.
    pub fn get(&mut self, key: &[u8]) -> Result<Vec<u8>> {
        self.get_inner(key, 0)
    }

    /// Point read against a snapshot taken earlier on this connection.
    pub fn get_at(&mut self, snapshot: u64, key: &[u8]) -> Result<Vec<u8>> {
        self.get_inner(key, snapshot)
    }

    fn get_inner(&mut self, key: &[u8], snapshot: u64) -> Result<Vec<u8>> {
        let reply = self.call(&Request::Get {
            key: key.to_vec(),
            snapshot,
        })?;
        match reply {
            Response::Get { value, error } => {
                check(&error)?;
                value.ok_or_else(|| KvError::Protocol("get reply missing value".to_string()))
            }
            other => Err(unexpected(&other)),
        }
    }

    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let reply = self.call(&Request::Put {
            key: key.to_vec(),
            value: value.to_vec(),
        })?;
        match reply {
            Response::Put { error } => check(&error),
            other => Err(unexpected(&other)),
        }
    }

    /// Submit a batch; the server applies it atomically in entry order.
    pub fn write(&mut self, batch: WriteBatch) -> Result<()> {
        let reply = self.call(&Request::Write {
            entries: batch.into_ops(),
        })?;
        match reply {
            Response::Write { error } => check(&error),
            other => Err(unexpected(&other)),
        }
    }

    /// Open a ranged iterator over `[lower, upper)`; empty bounds are
    /// unbounded.
    pub fn lookup(&mut self, lower: &[u8], upper: &[u8]) -> Result<RemoteIterator<'_>> {
        self.lookup_inner(lower, upper, 0)
    }

    /// Ranged iterator against a snapshot taken earlier on this connection.
    pub fn lookup_at(
        &mut self,
        snapshot: u64,
        lower: &[u8],
        upper: &[u8],
    ) -> Result<RemoteIterator<'_>> {
        self.lookup_inner(lower, upper, snapshot)
    }

    fn lookup_inner(&mut self, lower: &[u8], upper: &[u8], snapshot: u64) -> Result<RemoteIterator<'_>> {
        let reply = self.call(&Request::Lookup {
            lower: lower.to_vec(),
            upper: upper.to_vec(),
            snapshot,
        })?;
        let id = match reply {
            Response::Lookup { id, error } => {
                check(&error)?;
                id
            }
            other => return Err(unexpected(&other)),
        };
        Ok(RemoteIterator {
            db: self,
            id,
            entries: VecDeque::new(),
            exhausted: false,
        })
    }

    /// Take a point-in-time snapshot; the returned ID scopes `get_at` and
    /// `lookup_at` until the connection closes.
    pub fn snapshot(&mut self) -> Result<u64> {
        let reply = self.call(&Request::Snapshot)?;
        match reply {
            Response::Snapshot { id, error } => {
                check(&error)?;
                Ok(id)
            }
            other => Err(unexpected(&other)),
        }
    }

    /// Release the remote database binding and end the connection.
    pub fn close(mut self) -> Result<()> {
        let reply = self.call(&Request::Close)?;
        match reply {
            Response::Close { error } => check(&error),
            other => Err(unexpected(&other)),
        }
    }

    /// One request, one reply.
    fn call(&mut self, request: &Request) -> Result<Response> {
        let bytes = rmp_serde::to_vec_named(request)?;
        wire::write_frame(&mut self.stream, &bytes)?;

        let frame = wire::read_frame(&mut self.stream)?
            .ok_or_else(|| KvError::Protocol("connection closed mid-request".to_string()))?;
        let response: Response = rmp_serde::from_slice(&frame)?;

        if let Response::Error { error } = &response {
            return Err(KvError::from_wire(error));
        }
        Ok(response)
    }
}

/// Client half of the paged iteration protocol. Buffers one page and
/// refills from the server when it runs dry.
pub struct RemoteIterator<'a> {
    db: &'a mut RemoteDatabase,
    id: u64,
    entries: VecDeque<KeyValue>,
    exhausted: bool,
}

impl RemoteIterator<'_> {
    /// The next key/value pair, or `Ok(None)` once the sequence ends.
    /// `EndOfSequence` never surfaces as an error from here.
    pub fn next(&mut self) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        if let Some(kv) = self.entries.pop_front() {
            return Ok(Some((kv.key, kv.value)));
        }
        if self.exhausted {
            return Ok(None);
        }

        let reply = self.db.call(&Request::Next { id: self.id })?;
        let entries = match reply {
            Response::Next { entries, error } => {
                if !error.is_empty() {
                    match KvError::from_wire(&error) {
                        KvError::EndOfSequence => {
                            self.exhausted = true;
                            return Ok(None);
                        }
                        e => return Err(e),
                    }
                }
                entries
            }
            other => return Err(unexpected(&other)),
        };

        self.entries = entries.into();
        match self.entries.pop_front() {
            Some(kv) => Ok(Some((kv.key, kv.value))),
            // An empty page with no error never happens server-side; treat
            // it as exhaustion rather than spinning
            None => {
                self.exhausted = true;
                Ok(None)
            }
        }
    }
}

/// Destroy the database named `dbname` on the server at `addr`. One-shot
/// unary call; needs no open session.
pub fn remove(addr: &str, dbname: &str, timeout_secs: u64) -> Result<()> {
    let mut stream = connect(addr, timeout_secs)?;

    let request = Request::Remove {
        dbname: dbname.to_string(),
    };
    let bytes = rmp_serde::to_vec_named(&request)?;
    wire::write_frame(&mut stream, &bytes)?;

    let frame = wire::read_frame(&mut stream)?
        .ok_or_else(|| KvError::Protocol("connection closed mid-request".to_string()))?;
    match rmp_serde::from_slice::<Response>(&frame)? {
        Response::Remove { error } => check(&error),
        Response::Error { error } => Err(KvError::from_wire(&error)),
        other => Err(unexpected(&other)),
    }
}

fn connect(addr: &str, timeout_secs: u64) -> Result<TcpStream> {
    let sock_addr = addr
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| KvError::Protocol(format!("cannot resolve address '{}'", addr)))?;

    let timeout = Duration::from_secs(timeout_secs.max(1));
    let stream = TcpStream::connect_timeout(&sock_addr, timeout)?;
    stream.set_read_timeout(Some(timeout))?;
    stream.set_write_timeout(Some(timeout))?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

fn check(error: &str) -> Result<()> {
    if error.is_empty() {
        Ok(())
    } else {
        Err(KvError::from_wire(error))
    }
}

fn unexpected(response: &Response) -> KvError {
    KvError::Protocol(format!("unexpected reply kind: {:?}", response))
}
