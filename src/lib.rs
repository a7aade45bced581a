//! ferrokv - a networked key-value store.
//!
//! One physical connection carries one logical session: the client opens a
//! database, issues point reads and writes, batched writes, ranged lookups
//! via paged iteration, and point-in-time snapshots, all over a strict
//! request/reply stream. Many connections may open the same database; a
//! reference-counted registry shares one engine handle between them and
//! closes it when the last session lets go.
//!
//! The storage engine sits behind the traits in [`engine`]; the crate ships
//! a copy-on-write B-tree engine as the default. Wire framing is
//! length-prefixed MessagePack (see [`wire`]).

pub mod client;
pub mod engine;
pub mod error;
pub mod registry;
pub mod server;
pub mod session;
pub mod wire;

pub use engine::{BatchOp, BTreeStore, Cursor, DatabaseHandle, SnapshotHandle, StorageEngine, WriteBatch};
pub use error::{KvError, Result};
pub use registry::{DatabaseRegistry, SharedDb};
pub use server::Server;
pub use session::Session;
