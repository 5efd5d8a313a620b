//! Error taxonomy for container and media operations.

use std::path::PathBuf;

/// Errors raised while opening, reading, or producing WUX media.
#[derive(Debug, thiserror::Error)]
pub enum WuxError {
    /// The backing file could not be opened.
    #[error("cannot open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The container header or index table is malformed.
    #[error("invalid WUX container: {0}")]
    InvalidFormat(String),

    /// A logical sector lies beyond the end of the index table.
    #[error("logical sector {sector} out of range (index table has {entries} entries)")]
    OutOfRangeIndex {
        /// Logical sector that was requested.
        sector: u64,
        /// Number of entries in the index table.
        entries: u64,
    },

    /// An index entry points past the sectors physically stored in the pool.
    #[error("index entry references pool slot {slot} but only {pool_slots} slots are present")]
    SlotOutOfRange {
        /// Slot referenced by the index entry.
        slot: u32,
        /// Slots actually present in the file.
        pool_slots: u64,
    },

    /// An I/O error, including short reads and writes.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, WuxError>;
