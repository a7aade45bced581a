//! Request dispatcher and connection server.
//!
//! One thread per connection, strict request/reply: read a frame, route it
//! to the handler for its kind, write exactly one reply frame, repeat. Only
//! a channel-level failure ends the loop; every handler-local error travels
//! back inside the reply. When the loop ends — graceful Close or abrupt
//! disconnect — `Session::release_all` runs once and returns the session's
//! database reference to the registry.

use std::net::{TcpListener, TcpStream};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use crate::engine::WriteBatch;
use crate::error::KvError;
use crate::registry::DatabaseRegistry;
use crate::session::Session;
use crate::wire::{self, KeyValue, Request, Response};

// Global client ID counter
static NEXT_CLIENT_ID: AtomicUsize = AtomicUsize::new(1);

/// Entries per Next reply. A page never exceeds this, bounding reply size
/// regardless of how large the range is.
pub const PAGE_SIZE: usize = 64;

/// Connection server: owns the registry and accepts client connections.
pub struct Server {
    registry: Arc<DatabaseRegistry>,
}

impl Server {
    pub fn new(registry: Arc<DatabaseRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<DatabaseRegistry> {
        &self.registry
    }

    /// Accept connections forever, one handler thread each.
    pub fn serve(&self, listener: TcpListener) {
        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    let client_id = NEXT_CLIENT_ID.fetch_add(1, Ordering::SeqCst);
                    let registry = Arc::clone(&self.registry);
                    thread::spawn(move || {
                        handle_client(stream, registry, client_id);
                    });
                }
                Err(e) => {
                    tracing::warn!("accept error: {}", e);
                }
            }
        }
    }
}

/// Per-connection request/reply loop.
pub fn handle_client(mut stream: TcpStream, registry: Arc<DatabaseRegistry>, client_id: usize) {
    tracing::info!("client {} connected", client_id);

    let mut session = Session::new();

    loop {
        let msg = match wire::read_frame(&mut stream) {
            Ok(Some(msg)) => msg,
            Ok(None) => {
                tracing::info!("client {} disconnected", client_id);
                break;
            }
            Err(e) => {
                tracing::warn!("client {} read error: {}", client_id, e);
                break;
            }
        };

        let response = match rmp_serde::from_slice::<Request>(&msg) {
            Ok(request) => dispatch(&registry, &mut session, request),
            Err(e) => Response::Error {
                error: KvError::Protocol(format!("invalid request: {}", e)).to_wire(),
            },
        };

        let resp_bytes = match rmp_serde::to_vec_named(&response) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("client {} serialize error: {}", client_id, e);
                continue;
            }
        };

        if let Err(e) = wire::write_frame(&mut stream, &resp_bytes) {
            tracing::warn!("client {} write error: {}", client_id, e);
            break;
        }
    }

    // Cleanup: runs on both graceful close and abrupt disconnect
    if let Err(e) = session.release_all(&registry) {
        tracing::warn!("client {} cleanup error: {}", client_id, e);
    }
}

/// Route one request through the handler, keeping engine faults inside the
/// reply. A panic below this point must not kill the connection.
fn dispatch(registry: &DatabaseRegistry, session: &mut Session, request: Request) -> Response {
    match catch_unwind(AssertUnwindSafe(|| handle_request(registry, session, request))) {
        Ok(response) => response,
        Err(_) => Response::Error {
            error: KvError::Internal("request handler panicked".to_string()).to_wire(),
        },
    }
}

fn err_string(result: crate::error::Result<()>) -> String {
    match result {
        Ok(()) => String::new(),
        Err(e) => e.to_wire(),
    }
}

/// Handle one request against the session and registry, producing exactly
/// one reply. Exhaustive over request kinds.
pub fn handle_request(
    registry: &DatabaseRegistry,
    session: &mut Session,
    request: Request,
) -> Response {
    match request {
        Request::Open { dbname, create } => {
            // A second Open releases the current binding first, so a
            // session never holds two references
            if session.is_bound() {
                if let Err(e) = session.close_db(registry) {
                    return Response::Open { error: e.to_wire() };
                }
            }

            match registry.open(&dbname, create) {
                Ok(db) => {
                    session.bind(db);
                    Response::Open {
                        error: String::new(),
                    }
                }
                Err(e) => Response::Open { error: e.to_wire() },
            }
        }

        Request::Close => Response::Close {
            error: err_string(session.close_db(registry)),
        },

        Request::Get { key, snapshot } => {
            let result = match (session.require_db(), snapshot) {
                (Err(e), _) => Err(e),
                (Ok(db), 0) => db.handle.get(&key),
                (Ok(_), id) => session.snapshot(id).and_then(|snap| snap.get(&key)),
            };
            match result {
                Ok(value) => Response::Get {
                    value: Some(value),
                    error: String::new(),
                },
                Err(e) => Response::Get {
                    value: None,
                    error: e.to_wire(),
                },
            }
        }

        Request::Put { key, value } => Response::Put {
            error: err_string(
                session
                    .require_db()
                    .and_then(|db| db.handle.put(&key, &value)),
            ),
        },

        Request::Write { entries } => Response::Write {
            error: err_string(
                session
                    .require_db()
                    .and_then(|db| db.handle.write(WriteBatch::from(entries))),
            ),
        },

        Request::Lookup {
            lower,
            upper,
            snapshot,
        } => {
            let result = match (session.require_db(), snapshot) {
                (Err(e), _) => Err(e),
                (Ok(db), 0) => db.handle.lookup(&lower, &upper),
                (Ok(_), id) => session
                    .snapshot(id)
                    .and_then(|snap| snap.lookup(&lower, &upper)),
            };
            match result {
                Ok(cursor) => Response::Lookup {
                    id: session.track_cursor(cursor),
                    error: String::new(),
                },
                Err(e) => Response::Lookup {
                    id: 0,
                    error: e.to_wire(),
                },
            }
        }

        Request::Next { id } => handle_next(session, id),

        Request::Snapshot => {
            let result = session.require_db().and_then(|db| db.handle.snapshot());
            match result {
                Ok(snapshot) => Response::Snapshot {
                    id: session.track_snapshot(snapshot),
                    error: String::new(),
                },
                Err(e) => Response::Snapshot {
                    id: 0,
                    error: e.to_wire(),
                },
            }
        }

        Request::Remove { dbname } => Response::Remove {
            error: err_string(registry.remove(&dbname)),
        },
    }
}

/// Drain up to one page from a cursor.
///
/// A zero-length page only happens when the very first fetch hits the end;
/// the cursor is then discarded and `EndOfSequence` reported. A partial but
/// non-empty page is a success — the next call discovers exhaustion.
fn handle_next(session: &mut Session, id: u64) -> Response {
    let cursor = match session.cursor_mut(id) {
        Ok(cursor) => cursor,
        Err(e) => {
            return Response::Next {
                entries: Vec::new(),
                error: e.to_wire(),
            }
        }
    };

    let mut entries: Vec<KeyValue> = Vec::with_capacity(PAGE_SIZE);
    let mut stop: Option<KvError> = None;

    while entries.len() < PAGE_SIZE {
        match cursor.next() {
            Ok(Some((key, value))) => entries.push(KeyValue { key, value }),
            Ok(None) => {
                stop = Some(KvError::EndOfSequence);
                break;
            }
            Err(e) => {
                stop = Some(e);
                break;
            }
        }
    }

    match stop {
        // Nothing collected: surface the error and forget the cursor
        Some(e) if entries.is_empty() => {
            session.drop_cursor(id);
            Response::Next {
                entries,
                error: e.to_wire(),
            }
        }
        // Partial page: success now, exhaustion on the next call
        _ => Response::Next {
            entries,
            error: String::new(),
        },
    }
}
