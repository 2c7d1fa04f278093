//! Embedded single-file object store.
//!
//! `stowage` persists opaque, variable-length binary payloads inside one
//! data file owned by the host process. Each payload is addressed by a
//! stable 64-bit id that survives restarts. There is no server, no
//! background thread and no write-ahead log: every mutating operation
//! ends with an fsync, and the in-memory allocation state is rebuilt
//! from the file alone on open.
//!
//! ## Key design
//!
//! - **Single data file**: a next-id cell at offset zero, a linked chain
//!   of fixed-width index blocks, and variable-length payload regions.
//!   All on-disk integers are little-endian.
//! - **Best-fit allocation**: free byte intervals are tracked in two
//!   mirrored orderings (by begin offset and by length) so containment
//!   checks and best-fit queries both run in logarithmic time.
//! - **Commit ordering**: in-memory maps are only mutated after the
//!   corresponding fsync returns, so an interrupted call leaves the
//!   store in the state that preceded it.
//!
//! The byte-level surface is [`Store`]; [`ObjectStore`] layers a codec
//! and a weak value cache on top of it, and [`SharedStore`] wraps either
//! in a coarse mutex for multi-threaded hosts.

use thiserror::Error;

pub mod codec;
pub mod config;
pub mod engine;
pub mod store;

pub use codec::{BincodeCodec, ObjectCodec};
pub use config::StoreConfig;
pub use engine::{DataFileEngine, Interval, ObjectIndex};
pub use store::shared::SharedStore;
pub use store::typed::ObjectStore;
pub use store::Store;

/// Stable 64-bit identifier of a stored object.
///
/// Zero is never handed out; on disk it marks a free index slot.
pub type ObjectId = u64;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error")]
    Io(#[from] std::io::Error),

    #[error("object {0} not found")]
    NotFound(ObjectId),

    #[error("object {0} already exists")]
    AlreadyExists(ObjectId),

    #[error("store is closed")]
    Closed,

    #[error("payload is {got} bytes but the reserved interval holds {want}")]
    LengthMismatch { want: u64, got: u64 },

    #[error("no free interval contains {0}")]
    NoFreeContainer(Interval),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("data file corrupted: {0}")]
    Corrupted(String),

    #[error("id space exhausted")]
    IdExhausted,

    #[error("codec error")]
    Codec(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("lock poisoned")]
    LockPoisoned,
}
