//! WAL writer implementation.

use std::path::Path;

use crate::options::SyncMode;
use crate::util::crc;
use crate::Result;

use super::{FileSink, LogSink, RecordType, BLOCK_SIZE, HEADER_SIZE, MAX_RECORD_TYPE};

/// Zero fill for block tails too small to hold a record header.
const BLOCK_TRAILER: [u8; HEADER_SIZE - 1] = [0; HEADER_SIZE - 1];

/// WAL writer for durable logging.
///
/// Frames logical records into a block-based format with per-record CRC
/// checksums, splitting records that don't fit in the current block.
/// A writer owns its sink exclusively; callers serialize concurrent
/// writes before handing them to [`add_record`](WalWriter::add_record).
pub struct WalWriter<S: LogSink> {
    /// Destination sink.
    sink: S,
    /// Current position within the current block.
    block_offset: usize,
    /// Checksum of each record type byte, computed once so the record
    /// checksum only has to be extended over the payload.
    type_crc: [u32; MAX_RECORD_TYPE + 1],
    /// Sync mode for durability.
    sync_mode: SyncMode,
    /// Bytes written since last sync.
    bytes_since_sync: usize,
}

impl<S: LogSink> WalWriter<S> {
    /// Create a writer for an empty destination.
    pub fn new(sink: S, sync_mode: SyncMode) -> Self {
        Self::with_dest_length(sink, 0, sync_mode)
    }

    /// Create a writer for a destination that already holds `dest_length`
    /// bytes, resuming within the final partially-filled block.
    pub fn with_dest_length(sink: S, dest_length: u64, sync_mode: SyncMode) -> Self {
        let mut type_crc = [0u32; MAX_RECORD_TYPE + 1];
        for (t, seed) in type_crc.iter_mut().enumerate() {
            *seed = crc::value(&[t as u8]);
        }

        Self {
            sink,
            block_offset: (dest_length % BLOCK_SIZE as u64) as usize,
            type_crc,
            sync_mode,
            bytes_since_sync: 0,
        }
    }

    /// Add a logical record to the WAL.
    ///
    /// The record is split across multiple fragments if it doesn't fit
    /// in the current block. Returns the first sink failure encountered,
    /// in which case no further fragments are emitted and the log is left
    /// truncated mid-record.
    pub fn add_record(&mut self, data: &[u8]) -> Result<()> {
        let mut left = data.len();
        let mut ptr = 0;
        let mut begin = true;

        // Loop at least once: an empty slice still emits a single
        // zero-length FULL record.
        loop {
            let leftover = BLOCK_SIZE - self.block_offset;

            // Switch to a new block if we can't fit a header
            if leftover < HEADER_SIZE {
                if leftover > 0 {
                    self.sink.append(&BLOCK_TRAILER[..leftover])?;
                    self.bytes_since_sync += leftover;
                }
                self.block_offset = 0;
            }

            // Invariant: a block never has 1-6 free bytes at this point.
            let avail = BLOCK_SIZE - self.block_offset - HEADER_SIZE;
            let fragment_length = std::cmp::min(left, avail);
            let end = left == fragment_length;

            let record_type = if begin && end {
                RecordType::Full
            } else if begin {
                RecordType::First
            } else if end {
                RecordType::Last
            } else {
                RecordType::Middle
            };

            self.emit_physical_record(record_type, &data[ptr..ptr + fragment_length])?;

            ptr += fragment_length;
            left -= fragment_length;
            begin = false;

            if left == 0 {
                break;
            }
        }

        self.maybe_sync()
    }

    /// Write a physical record (header + payload).
    fn emit_physical_record(&mut self, record_type: RecordType, data: &[u8]) -> Result<()> {
        debug_assert!(data.len() <= 0xFFFF); // Length fits in 2 bytes
        debug_assert!(self.block_offset + HEADER_SIZE + data.len() <= BLOCK_SIZE);

        // Checksum covers the type byte and the payload, seeded from the
        // precomputed per-type CRC.
        let checksum = crc::mask(crc::extend(self.type_crc[record_type as usize], data));

        // Header format: CRC (4) + Length (2) + Type (1), little-endian
        let mut header = [0u8; HEADER_SIZE];
        header[0..4].copy_from_slice(&checksum.to_le_bytes());
        header[4..6].copy_from_slice(&(data.len() as u16).to_le_bytes());
        header[6] = record_type.to_byte();

        let result = self
            .sink
            .append(&header)
            .and_then(|_| self.sink.append(data))
            .and_then(|_| self.sink.flush());

        // Bookkeeping advances even when the sink failed: the file may
        // already hold part of the record, and recovery accounting expects
        // the offset to match it.
        let record_size = HEADER_SIZE + data.len();
        self.block_offset += record_size;
        self.bytes_since_sync += record_size;

        result
    }

    /// Sync if required by sync mode.
    fn maybe_sync(&mut self) -> Result<()> {
        match self.sync_mode {
            SyncMode::Always => {
                self.sync()?;
            }
            SyncMode::Bytes { bytes } => {
                if self.bytes_since_sync >= bytes {
                    self.sync()?;
                }
            }
            SyncMode::Interval { .. } => {
                // Interval-based sync is handled externally
            }
            SyncMode::None => {
                // No sync
            }
        }
        Ok(())
    }

    /// Force a sync to stable storage.
    pub fn sync(&mut self) -> Result<()> {
        self.sink.sync()?;
        self.bytes_since_sync = 0;
        Ok(())
    }

    /// Flush buffered data (but don't sync to disk).
    pub fn flush(&mut self) -> Result<()> {
        self.sink.flush()
    }

    /// Close the writer.
    pub fn close(mut self) -> Result<()> {
        self.flush()?;
        self.sync()?;
        Ok(())
    }

    /// Current offset within the current block.
    pub fn block_offset(&self) -> usize {
        self.block_offset
    }

    /// Consume the writer and return the sink.
    pub fn into_sink(self) -> S {
        self.sink
    }
}

impl WalWriter<FileSink> {
    /// Create a new WAL file at `path`.
    pub fn create(path: &Path, sync_mode: SyncMode) -> Result<Self> {
        Ok(Self::new(FileSink::create(path)?, sync_mode))
    }

    /// Open an existing WAL file for appending, reusing the final
    /// partially-filled block.
    pub fn open_for_append(path: &Path, sync_mode: SyncMode) -> Result<Self> {
        let (sink, len) = FileSink::open_for_append(path)?;
        Ok(Self::with_dest_length(sink, len, sync_mode))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wal::MAX_RECORD_SIZE;
    use crate::{Error, Result};
    use tempfile::tempdir;

    /// Sink that fails every append after the first `allowed` calls.
    struct FailingSink {
        written: Vec<u8>,
        allowed: usize,
        appends: usize,
    }

    impl FailingSink {
        fn new(allowed: usize) -> Self {
            Self {
                written: Vec::new(),
                allowed,
                appends: 0,
            }
        }
    }

    impl LogSink for FailingSink {
        fn append(&mut self, data: &[u8]) -> Result<()> {
            self.appends += 1;
            if self.appends > self.allowed {
                return Err(Error::Io("injected append failure".into()));
            }
            self.written.extend_from_slice(data);
            Ok(())
        }

        fn flush(&mut self) -> Result<()> {
            Ok(())
        }

        fn sync(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn parse_records(buf: &[u8]) -> Vec<(RecordType, usize)> {
        let mut records = Vec::new();
        let mut pos = 0;
        while pos < buf.len() {
            let block_remaining = BLOCK_SIZE - pos % BLOCK_SIZE;
            if block_remaining < HEADER_SIZE {
                pos += block_remaining;
                continue;
            }
            if buf.len() - pos < HEADER_SIZE {
                break;
            }
            let len = u16::from_le_bytes([buf[pos + 4], buf[pos + 5]]) as usize;
            let rt = RecordType::from_byte(buf[pos + 6]).unwrap();
            records.push((rt, len));
            pos += HEADER_SIZE + len;
        }
        records
    }

    #[test]
    fn test_writer_small_record() {
        let mut writer = WalWriter::new(Vec::new(), SyncMode::None);
        writer.add_record(b"hello world").unwrap();

        let buf = writer.into_sink();
        assert_eq!(buf.len(), HEADER_SIZE + 11);
        assert_eq!(parse_records(&buf), vec![(RecordType::Full, 11)]);
        assert_eq!(&buf[HEADER_SIZE..], b"hello world");
    }

    #[test]
    fn test_writer_empty_record() {
        let mut writer = WalWriter::new(Vec::new(), SyncMode::None);
        writer.add_record(b"").unwrap();

        let buf = writer.into_sink();
        assert_eq!(parse_records(&buf), vec![(RecordType::Full, 0)]);
    }

    #[test]
    fn test_writer_checksum_on_wire() {
        let mut writer = WalWriter::new(Vec::new(), SyncMode::None);
        writer.add_record(b"payload").unwrap();

        let buf = writer.into_sink();
        let stored = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);

        let expected = crc::extend(crc::value(&[RecordType::Full.to_byte()]), b"payload");
        assert_eq!(crc::unmask(stored), expected);
        assert!(crc::verify_masked(&buf[6..6 + 1 + 7], stored));
    }

    #[test]
    fn test_writer_two_fragment_record() {
        // 40000 bytes from offset 0: FIRST takes the 32761 bytes that fit
        // after the header, LAST carries the remaining 7239.
        let data = vec![b'x'; 40000];
        let mut writer = WalWriter::new(Vec::new(), SyncMode::None);
        writer.add_record(&data).unwrap();

        let buf = writer.into_sink();
        assert_eq!(
            parse_records(&buf),
            vec![(RecordType::First, 32761), (RecordType::Last, 7239)]
        );
        assert_eq!(buf.len(), 40000 + 2 * HEADER_SIZE);
    }

    #[test]
    fn test_writer_three_fragment_record() {
        let data = vec![b'y'; 70000];
        let mut writer = WalWriter::new(Vec::new(), SyncMode::None);
        writer.add_record(&data).unwrap();

        let buf = writer.into_sink();
        assert_eq!(
            parse_records(&buf),
            vec![
                (RecordType::First, 32761),
                (RecordType::Middle, 32761),
                (RecordType::Last, 4478),
            ]
        );
    }

    #[test]
    fn test_writer_block_trailer_padding() {
        // Leave exactly 3 bytes in the first block: too small for a header,
        // so the writer zero-pads and rolls to the next block.
        let first_len = BLOCK_SIZE - HEADER_SIZE - 3;
        let mut writer = WalWriter::new(Vec::new(), SyncMode::None);
        writer.add_record(&vec![b'a'; first_len]).unwrap();
        assert_eq!(writer.block_offset(), BLOCK_SIZE - 3);

        writer.add_record(b"next").unwrap();

        let buf = writer.into_sink();
        // Trailer bytes are zero
        assert_eq!(&buf[BLOCK_SIZE - 3..BLOCK_SIZE], &[0, 0, 0]);
        // Second record starts at the next block boundary
        assert_eq!(
            parse_records(&buf),
            vec![(RecordType::Full, first_len), (RecordType::Full, 4)]
        );
        assert_eq!(&buf[BLOCK_SIZE + HEADER_SIZE..BLOCK_SIZE + HEADER_SIZE + 4], b"next");
    }

    #[test]
    fn test_writer_block_invariant() {
        // After every record the free space in the block is >= 7 or == 0.
        let mut writer = WalWriter::new(Vec::new(), SyncMode::None);
        for len in [0, 1, 6, 7, 100, 32760, 32761, 32762, 5000] {
            writer.add_record(&vec![b'z'; len]).unwrap();
            let free = BLOCK_SIZE - writer.block_offset();
            assert!(
                free >= HEADER_SIZE || free == 0,
                "{} free bytes after {}-byte record",
                free,
                len
            );
        }
    }

    #[test]
    fn test_writer_exact_block_fill() {
        // A record payload of BLOCK_SIZE - HEADER_SIZE fills the block
        // exactly; the next record starts a fresh block unpadded.
        let mut writer = WalWriter::new(Vec::new(), SyncMode::None);
        writer.add_record(&vec![b'f'; MAX_RECORD_SIZE]).unwrap();
        assert_eq!(writer.block_offset(), BLOCK_SIZE);

        writer.add_record(b"tail").unwrap();
        let buf = writer.into_sink();
        assert_eq!(buf.len(), BLOCK_SIZE + HEADER_SIZE + 4);
    }

    #[test]
    fn test_writer_resumes_mid_block() {
        let mut writer = WalWriter::with_dest_length(Vec::new(), 100, SyncMode::None);
        assert_eq!(writer.block_offset(), 100);

        writer.add_record(b"resumed").unwrap();
        assert_eq!(writer.block_offset(), 100 + HEADER_SIZE + 7);
    }

    #[test]
    fn test_writer_resume_offset_wraps_blocks() {
        let writer =
            WalWriter::with_dest_length(Vec::new(), (2 * BLOCK_SIZE + 17) as u64, SyncMode::None);
        assert_eq!(writer.block_offset(), 17);
    }

    #[test]
    fn test_writer_offset_advances_on_failure() {
        // The block offset advances past the failed record even though no
        // byte reached the sink, and no further fragments are emitted.
        let mut writer = WalWriter::new(FailingSink::new(0), SyncMode::None);

        let data = vec![b'q'; 40000];
        let err = writer.add_record(&data).unwrap_err();
        assert!(matches!(err, Error::Io(_)));

        // Only the FIRST fragment was attempted.
        assert_eq!(writer.block_offset(), HEADER_SIZE + 32761);
        assert!(writer.into_sink().written.is_empty());
    }

    #[test]
    fn test_writer_partial_failure_stops_fragmenting() {
        // First append (the FIRST fragment's header) succeeds, the payload
        // append fails: emission stops, offset still covers the fragment.
        let mut writer = WalWriter::new(FailingSink::new(1), SyncMode::None);

        let data = vec![b'q'; 40000];
        assert!(writer.add_record(&data).is_err());
        assert_eq!(writer.block_offset(), HEADER_SIZE + 32761);

        let sink = writer.into_sink();
        // Only the 7-byte header made it out before the failure.
        assert_eq!(sink.written.len(), HEADER_SIZE);
    }

    #[test]
    fn test_writer_file_backed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.wal");

        let mut writer = WalWriter::create(&path, SyncMode::None).unwrap();
        writer.add_record(b"hello world").unwrap();
        writer.close().unwrap();

        let metadata = std::fs::metadata(&path).unwrap();
        assert_eq!(metadata.len(), (HEADER_SIZE + 11) as u64);
    }

    #[test]
    fn test_writer_file_append_resumes_offset() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.wal");

        {
            let mut writer = WalWriter::create(&path, SyncMode::None).unwrap();
            writer.add_record(b"first").unwrap();
            writer.close().unwrap();
        }

        let writer = WalWriter::open_for_append(&path, SyncMode::None).unwrap();
        assert_eq!(writer.block_offset(), HEADER_SIZE + 5);
    }

    #[test]
    fn test_writer_sync_modes() {
        let dir = tempdir().unwrap();

        for (name, mode) in [
            ("always.wal", SyncMode::Always),
            ("bytes.wal", SyncMode::Bytes { bytes: 8 }),
            ("none.wal", SyncMode::None),
        ] {
            let path = dir.path().join(name);
            let mut writer = WalWriter::create(&path, mode).unwrap();
            writer.add_record(b"synced record").unwrap();
            writer.close().unwrap();
        }
    }
}
