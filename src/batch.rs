//! Write batches: atomic groups of put/delete operations.
//!
//! A batch is held directly in its wire format:
//!
//! ```text
//! sequence: fixed64        (little-endian)
//! count:    fixed32        (little-endian)
//! data:     record[count]
//!
//! record :=
//!   kTypeValue    varstring varstring |
//!   kTypeDeletion varstring
//! varstring :=
//!   len:  varint32
//!   data: u8[len]
//! ```
//!
//! The sequence number is assigned once, immediately before persisting,
//! by the write-coordination layer; the batch's `count` operations then
//! occupy the contiguous range `[sequence, sequence + count)`.

use bytes::{Buf, BufMut, BytesMut};

use crate::types::{MemTable, ValueType};
use crate::util::coding::{
    decode_length_prefixed, encode_length_prefixed, read_fixed32, read_fixed64,
};
use crate::{Error, Result};

/// Batch header: an 8-byte sequence number followed by a 4-byte count.
pub const BATCH_HEADER_SIZE: usize = 12;

/// Receiver for decoded batch operations.
///
/// [`WriteBatch::iterate`] dispatches each record to one of these two
/// methods in encoding order.
pub trait Handler {
    /// A put of `value` under `key`.
    fn put(&mut self, key: &[u8], value: &[u8]);

    /// A deletion of `key`.
    fn delete(&mut self, key: &[u8]);
}

/// A batch of write operations to be applied atomically.
///
/// Mutation is single-writer: a batch is fully built by one thread
/// before being handed off for persistence or replay.
#[derive(Debug, Clone)]
pub struct WriteBatch {
    /// Wire-format contents: header followed by encoded records.
    rep: BytesMut,
}

impl WriteBatch {
    /// Create a new empty write batch.
    pub fn new() -> Self {
        let mut rep = BytesMut::with_capacity(BATCH_HEADER_SIZE);
        rep.resize(BATCH_HEADER_SIZE, 0);
        Self { rep }
    }

    /// Add a put operation to the batch.
    pub fn put(&mut self, key: &[u8], value: &[u8]) {
        self.set_count(self.count() + 1);
        self.rep.put_u8(ValueType::Value.to_byte());
        encode_length_prefixed(&mut self.rep, key);
        encode_length_prefixed(&mut self.rep, value);
    }

    /// Add a delete operation to the batch.
    pub fn delete(&mut self, key: &[u8]) {
        self.set_count(self.count() + 1);
        self.rep.put_u8(ValueType::Deletion.to_byte());
        encode_length_prefixed(&mut self.rep, key);
    }

    /// Clear the batch back to an empty header.
    pub fn clear(&mut self) {
        self.rep.clear();
        self.rep.resize(BATCH_HEADER_SIZE, 0);
    }

    /// Check if the batch holds no operations.
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Approximate size in bytes; callers use this to bound the size of
    /// a write group.
    pub fn approximate_size(&self) -> usize {
        self.rep.len()
    }

    /// Get the number of operations in the batch.
    pub fn count(&self) -> u32 {
        read_fixed32(&self.rep[8..]).expect("batch header present")
    }

    /// Set the operation count header field.
    pub fn set_count(&mut self, count: u32) {
        self.rep[8..12].copy_from_slice(&count.to_le_bytes());
    }

    /// Get the sequence number of the first operation.
    pub fn sequence(&self) -> u64 {
        read_fixed64(&self.rep).expect("batch header present")
    }

    /// Set the sequence number of the first operation.
    pub fn set_sequence(&mut self, sequence: u64) {
        self.rep[0..8].copy_from_slice(&sequence.to_le_bytes());
    }

    /// Append another batch's operations to this one.
    ///
    /// Used to coalesce concurrently-submitted batches into one durable
    /// write group before a single log append.
    pub fn append(&mut self, other: &WriteBatch) {
        debug_assert!(other.rep.len() >= BATCH_HEADER_SIZE);
        self.set_count(self.count() + other.count());
        self.rep.extend_from_slice(&other.rep[BATCH_HEADER_SIZE..]);
    }

    /// The serialized bytes, ready for the log writer.
    pub fn contents(&self) -> &[u8] {
        &self.rep
    }

    /// Replace the batch contents with bytes decoded from the log.
    pub fn set_contents(&mut self, contents: &[u8]) -> Result<()> {
        if contents.len() < BATCH_HEADER_SIZE {
            return Err(Error::corruption("malformed write batch (too small)"));
        }
        self.rep.clear();
        self.rep.extend_from_slice(contents);
        Ok(())
    }

    /// Decode the batch, dispatching each operation to `handler`.
    ///
    /// Fails with a corruption error if the buffer is malformed or the
    /// number of decoded records disagrees with the count header.
    pub fn iterate<H: Handler>(&self, handler: &mut H) -> Result<()> {
        if self.rep.len() < BATCH_HEADER_SIZE {
            return Err(Error::corruption("malformed write batch (too small)"));
        }

        let mut input = &self.rep[BATCH_HEADER_SIZE..];
        let mut found = 0u32;

        while !input.is_empty() {
            found += 1;
            let tag = input.get_u8();
            match ValueType::from_byte(tag) {
                Some(ValueType::Value) => {
                    let key = decode_length_prefixed(&mut input)
                        .ok_or_else(|| Error::corruption("bad write batch put"))?;
                    let value = decode_length_prefixed(&mut input)
                        .ok_or_else(|| Error::corruption("bad write batch put"))?;
                    handler.put(key, value);
                }
                Some(ValueType::Deletion) => {
                    let key = decode_length_prefixed(&mut input)
                        .ok_or_else(|| Error::corruption("bad write batch delete"))?;
                    handler.delete(key);
                }
                None => {
                    return Err(Error::corruption(format!(
                        "unknown write batch tag {}",
                        tag
                    )));
                }
            }
        }

        if found != self.count() {
            return Err(Error::corruption("write batch has wrong count"));
        }
        Ok(())
    }

    /// Replay the batch into a memtable.
    ///
    /// Operations are applied in encoding order at consecutive sequence
    /// numbers starting from the batch's stored sequence, establishing
    /// total write order during recovery.
    pub fn insert_into<M: MemTable>(&self, memtable: &mut M) -> Result<()> {
        let mut inserter = MemTableInserter {
            sequence: self.sequence(),
            memtable,
        };
        self.iterate(&mut inserter)
    }
}

impl Default for WriteBatch {
    fn default() -> Self {
        Self::new()
    }
}

/// Handler that applies decoded operations to a memtable, advancing the
/// sequence number after each.
struct MemTableInserter<'a, M: MemTable> {
    sequence: u64,
    memtable: &'a mut M,
}

impl<'a, M: MemTable> Handler for MemTableInserter<'a, M> {
    fn put(&mut self, key: &[u8], value: &[u8]) {
        self.memtable.add(self.sequence, ValueType::Value, key, value);
        self.sequence += 1;
    }

    fn delete(&mut self, key: &[u8]) {
        self.memtable.add(self.sequence, ValueType::Deletion, key, &[]);
        self.sequence += 1;
    }
}
