//! Write-Ahead Log (WAL) for durability.
//!
//! The WAL persists every write batch before it is applied to the
//! in-memory index. On crash recovery, the WAL is replayed to restore
//! any writes that weren't flushed to sorted tables.
//!
//! # Format
//!
//! The log is a sequence of 32KB blocks. Each block holds zero or more
//! physical records followed by up to six bytes of zero padding when the
//! next record header would not fit. A physical record is:
//!
//! - Masked CRC32C of type + payload (4 bytes, little-endian)
//! - Payload length (2 bytes, little-endian)
//! - Record type (1 byte): FULL, FIRST, MIDDLE, LAST
//! - Payload (0-65535 bytes)
//!
//! A logical record that doesn't fit in the current block is fragmented
//! across blocks as one FIRST, zero or more MIDDLE, and one LAST record.

mod reader;
mod sink;
mod writer;

pub use reader::{WalIterator, WalReader};
pub use sink::{FileSink, LogSink};
pub use writer::WalWriter;

/// Block size for WAL (32KB).
pub const BLOCK_SIZE: usize = 32 * 1024;

/// Header size: CRC (4) + Length (2) + Type (1) = 7 bytes.
pub const HEADER_SIZE: usize = 7;

/// Maximum payload size per record in a block.
pub const MAX_RECORD_SIZE: usize = BLOCK_SIZE - HEADER_SIZE;

/// Highest record type discriminant, for the per-type checksum seed table.
pub const MAX_RECORD_TYPE: usize = RecordType::Last as usize;

/// Record types for WAL entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordType {
    /// Zero is reserved for preallocated files.
    Zero = 0,
    /// Complete record in a single fragment.
    Full = 1,
    /// First fragment of a record.
    First = 2,
    /// Middle fragment(s) of a record.
    Middle = 3,
    /// Last fragment of a record.
    Last = 4,
}

impl RecordType {
    /// Create from byte value.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(RecordType::Zero),
            1 => Some(RecordType::Full),
            2 => Some(RecordType::First),
            3 => Some(RecordType::Middle),
            4 => Some(RecordType::Last),
            _ => None,
        }
    }

    /// Convert to byte.
    pub fn to_byte(self) -> u8 {
        self as u8
    }
}
