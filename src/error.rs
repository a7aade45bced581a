//! Error types for the key-value session layer.
//!
//! Every handler-local failure is carried to the client as a reply string of
//! the form `CODE: message` (empty string = success). `KvError::code()`
//! produces the stable code half; `KvError::from_wire()` reconstructs a typed
//! error on the client side so callers can branch on the variant.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, KvError>;

#[derive(Error, Debug)]
pub enum KvError {
    #[error("could not open database: {0}")]
    OpenFailed(String),

    #[error("no database found")]
    NoDatabaseFound,

    #[error("database is not open")]
    NotOpen,

    #[error("no database bound to session")]
    NoDatabaseBound,

    #[error("invalid snapshot id")]
    InvalidSnapshot,

    #[error("invalid iterator id")]
    InvalidIterator,

    #[error("key not found")]
    KeyNotFound,

    #[error("end of sequence")]
    EndOfSequence,

    #[error("database '{0}' is in use")]
    DatabaseInUse(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage serialization error: {0}")]
    Storage(#[from] bincode::Error),

    #[error("wire encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("wire decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    /// Error string received from the server that maps to no known code.
    #[error("remote error: {0}")]
    Remote(String),
}

impl KvError {
    /// Get error code for the wire protocol
    pub fn code(&self) -> &'static str {
        match self {
            KvError::OpenFailed(_) => "OPEN_FAILED",
            KvError::NoDatabaseFound => "NO_DATABASE_FOUND",
            KvError::NotOpen => "NOT_OPEN",
            KvError::NoDatabaseBound => "NO_DATABASE_BOUND",
            KvError::InvalidSnapshot => "INVALID_SNAPSHOT",
            KvError::InvalidIterator => "INVALID_ITERATOR",
            KvError::KeyNotFound => "KEY_NOT_FOUND",
            KvError::EndOfSequence => "END_OF_SEQUENCE",
            KvError::DatabaseInUse(_) => "DATABASE_IN_USE",
            KvError::Protocol(_) => "PROTOCOL_ERROR",
            _ => "INTERNAL_ERROR",
        }
    }

    /// Render this error as a reply string (`CODE: message`).
    pub fn to_wire(&self) -> String {
        format!("{}: {}", self.code(), self)
    }

    /// Reconstruct a typed error from a non-empty reply string.
    pub fn from_wire(s: &str) -> KvError {
        let (code, msg) = s.split_once(": ").unwrap_or((s, ""));
        match code {
            "OPEN_FAILED" => KvError::OpenFailed(msg.to_string()),
            "NO_DATABASE_FOUND" => KvError::NoDatabaseFound,
            "NOT_OPEN" => KvError::NotOpen,
            "NO_DATABASE_BOUND" => KvError::NoDatabaseBound,
            "INVALID_SNAPSHOT" => KvError::InvalidSnapshot,
            "INVALID_ITERATOR" => KvError::InvalidIterator,
            "KEY_NOT_FOUND" => KvError::KeyNotFound,
            "END_OF_SEQUENCE" => KvError::EndOfSequence,
            "DATABASE_IN_USE" => KvError::DatabaseInUse(msg.to_string()),
            "PROTOCOL_ERROR" => KvError::Protocol(msg.to_string()),
            _ => KvError::Remote(s.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_round_trip_preserves_variant() {
        let cases = vec![
            KvError::NoDatabaseFound,
            KvError::NotOpen,
            KvError::NoDatabaseBound,
            KvError::InvalidSnapshot,
            KvError::InvalidIterator,
            KvError::KeyNotFound,
            KvError::EndOfSequence,
        ];

        for err in cases {
            let wire = err.to_wire();
            let back = KvError::from_wire(&wire);
            assert_eq!(back.code(), err.code(), "round trip of {}", wire);
        }
    }

    #[test]
    fn wire_round_trip_keeps_message() {
        let err = KvError::OpenFailed("permission denied".to_string());
        match KvError::from_wire(&err.to_wire()) {
            KvError::OpenFailed(msg) => assert!(msg.contains("permission denied")),
            other => panic!("expected OpenFailed, got {:?}", other),
        }
    }

    #[test]
    fn unknown_code_maps_to_remote() {
        match KvError::from_wire("SOMETHING_ELSE: boom") {
            KvError::Remote(s) => assert_eq!(s, "SOMETHING_ELSE: boom"),
            other => panic!("expected Remote, got {:?}", other),
        }
    }
}
