//! # lsm-wal
//!
//! The durability core of an LSM-tree storage engine: write-ahead log
//! framing and write-batch encoding.
//!
//! ## Features
//!
//! - **Write batches**: put/delete operations grouped into one atomic
//!   unit carrying a contiguous range of sequence numbers
//! - **Block-based log format**: 32KB blocks, per-record masked CRC32C
//!   checksums, fragmentation for records crossing block boundaries
//! - **Crash recovery**: log replay with torn-write tolerance at the
//!   tail and strict corruption detection everywhere else
//! - **Pluggable destinations**: file-backed or in-memory sinks behind
//!   the `LogSink` trait
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use lsm_wal::{SyncMode, WalWriter, WriteBatch};
//!
//! // Build a batch and assign its sequence range
//! let mut batch = WriteBatch::new();
//! batch.put(b"hello", b"world");
//! batch.delete(b"stale");
//! batch.set_sequence(42);
//!
//! // Persist it
//! let mut writer = WalWriter::create("db/000001.log".as_ref(), SyncMode::Always)?;
//! writer.add_record(batch.contents())?;
//!
//! // On restart, replay into the memtable
//! let max_seq = lsm_wal::replay_wal("db/000001.log".as_ref(), &mut memtable)?;
//! ```
//!
//! ## Concurrency
//!
//! No internal locking. A writer owns its destination exclusively, and
//! batches are built by a single thread; callers serialize concurrent
//! writes — typically by coalescing submitted batches with
//! [`WriteBatch::append`] into one group before a single
//! [`WalWriter::add_record`] call.

// Public modules
pub mod batch;
pub mod error;
pub mod options;
pub mod recovery;
pub mod types;
pub mod wal;

// Internal modules
mod util;

// Re-export main types for convenience
pub use batch::{Handler, WriteBatch, BATCH_HEADER_SIZE};
pub use error::{Error, Result};
pub use options::SyncMode;
pub use recovery::replay_wal;
pub use types::{MemTable, ValueType};
pub use wal::{
    FileSink, LogSink, RecordType, WalIterator, WalReader, WalWriter, BLOCK_SIZE, HEADER_SIZE,
};
