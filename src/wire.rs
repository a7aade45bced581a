//! Wire protocol types and framing.
//!
//! Both directions carry length-prefixed MessagePack frames:
//!
//!   [4-byte length BE] [MessagePack payload]
//!
//! Requests and replies are tagged enums (`cmd` / `reply`), serialized with
//! named fields (`rmp_serde::to_vec_named`). The protocol is strict
//! request/reply: one pending request per connection, one reply per request,
//! in order. Every reply carries an `error` string — empty on success,
//! `CODE: message` otherwise (see `crate::error`).

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::engine::BatchOp;

/// Frames above this size are rejected before allocation.
pub const MAX_FRAME_LEN: usize = 100 * 1024 * 1024;

/// Request from client. `snapshot` fields use 0 for "read from the live
/// database"; `lower`/`upper` use the empty key for "unbounded".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "camelCase")]
pub enum Request {
    Open {
        dbname: String,
        #[serde(default)]
        create: bool,
    },
    Close,
    Get {
        key: Vec<u8>,
        #[serde(default)]
        snapshot: u64,
    },
    Put {
        key: Vec<u8>,
        value: Vec<u8>,
    },
    Write {
        entries: Vec<BatchOp>,
    },
    Lookup {
        #[serde(default)]
        lower: Vec<u8>,
        #[serde(default)]
        upper: Vec<u8>,
        #[serde(default)]
        snapshot: u64,
    },
    Next {
        id: u64,
    },
    Snapshot,
    /// Unary administrative call; the only request valid with no session
    /// state (no preceding Open).
    Remove {
        dbname: String,
    },
}

/// One key/value pair in a Next page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

/// Reply to client. Exactly one per request, same order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "reply", rename_all = "camelCase")]
pub enum Response {
    Open {
        error: String,
    },
    Close {
        error: String,
    },
    Get {
        /// `None` only on error; an empty value is `Some(vec![])`
        value: Option<Vec<u8>>,
        error: String,
    },
    Put {
        error: String,
    },
    Write {
        error: String,
    },
    Lookup {
        id: u64,
        error: String,
    },
    Next {
        entries: Vec<KeyValue>,
        error: String,
    },
    Snapshot {
        id: u64,
        error: String,
    },
    Remove {
        error: String,
    },
    /// Protocol-level failure (undecodable or out-of-protocol request)
    Error {
        error: String,
    },
}

/// Read one frame. `Ok(None)` on a clean EOF at a frame boundary.
pub fn read_frame<R: Read>(stream: &mut R) -> std::io::Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match stream.read_exact(&mut len_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("frame too large: {} bytes", len),
        ));
    }

    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf)?;

    Ok(Some(buf))
}

/// Write one frame.
pub fn write_frame<W: Write>(stream: &mut W, data: &[u8]) -> std::io::Result<()> {
    let len = data.len() as u32;
    stream.write_all(&len.to_be_bytes())?;
    stream.write_all(data)?;
    stream.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn round_trip_request(req: &Request) -> Request {
        let bytes = rmp_serde::to_vec_named(req).unwrap();
        rmp_serde::from_slice(&bytes).unwrap()
    }

    #[test]
    fn request_round_trip_through_framing() {
        let req = Request::Put {
            key: b"mykey".to_vec(),
            value: b"myvalue".to_vec(),
        };
        let bytes = rmp_serde::to_vec_named(&req).unwrap();

        let mut buf = Vec::new();
        write_frame(&mut buf, &bytes).unwrap();

        let mut reader = Cursor::new(buf);
        let frame = read_frame(&mut reader).unwrap().expect("one frame");
        let decoded: Request = rmp_serde::from_slice(&frame).unwrap();

        match decoded {
            Request::Put { key, value } => {
                assert_eq!(key, b"mykey");
                assert_eq!(value, b"myvalue");
            }
            other => panic!("wrong request kind: {:?}", other),
        }

        // Clean EOF after the only frame
        assert!(read_frame(&mut reader).unwrap().is_none());
    }

    #[test]
    fn batch_ops_round_trip_in_order() {
        let req = Request::Write {
            entries: vec![
                BatchOp::Put {
                    key: b"a".to_vec(),
                    value: b"1".to_vec(),
                },
                BatchOp::Remove { key: b"b".to_vec() },
                BatchOp::Put {
                    key: b"a".to_vec(),
                    value: b"2".to_vec(),
                },
            ],
        };

        match round_trip_request(&req) {
            Request::Write { entries } => {
                assert_eq!(entries.len(), 3);
                assert!(matches!(entries[1], BatchOp::Remove { .. }));
            }
            other => panic!("wrong request kind: {:?}", other),
        }
    }

    #[test]
    fn omitted_fields_decode_to_defaults() {
        // A client may omit bounds and snapshot entirely
        #[derive(Serialize)]
        struct BareLookup<'a> {
            cmd: &'a str,
        }

        let bytes = rmp_serde::to_vec_named(&BareLookup { cmd: "lookup" }).unwrap();
        match rmp_serde::from_slice::<Request>(&bytes).unwrap() {
            Request::Lookup { lower, upper, snapshot } => {
                assert!(lower.is_empty());
                assert!(upper.is_empty());
                assert_eq!(snapshot, 0);
            }
            other => panic!("wrong request kind: {:?}", other),
        }
    }

    #[test]
    fn get_reply_distinguishes_absent_from_empty() {
        let empty = Response::Get {
            value: Some(vec![]),
            error: String::new(),
        };
        let absent = Response::Get {
            value: None,
            error: "KEY_NOT_FOUND: key not found".to_string(),
        };

        let empty_bytes = rmp_serde::to_vec_named(&empty).unwrap();
        let absent_bytes = rmp_serde::to_vec_named(&absent).unwrap();

        match rmp_serde::from_slice::<Response>(&empty_bytes).unwrap() {
            Response::Get { value, error } => {
                assert_eq!(value, Some(vec![]));
                assert!(error.is_empty());
            }
            other => panic!("wrong reply kind: {:?}", other),
        }
        match rmp_serde::from_slice::<Response>(&absent_bytes).unwrap() {
            Response::Get { value, error } => {
                assert!(value.is_none());
                assert!(!error.is_empty());
            }
            other => panic!("wrong reply kind: {:?}", other),
        }
    }

    #[test]
    fn oversized_frame_is_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(MAX_FRAME_LEN as u32 + 1).to_be_bytes());
        buf.extend_from_slice(b"junk");

        let mut reader = Cursor::new(buf);
        let err = read_frame(&mut reader).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }
}
