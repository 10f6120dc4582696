//! WAL reader implementation.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use bytes::Bytes;

use crate::util::crc;
use crate::{Error, Result};

use super::{RecordType, BLOCK_SIZE, HEADER_SIZE};

/// WAL reader for recovery.
///
/// Reads logical records from a log stream, reassembling fragmented
/// records and verifying CRC checksums.
///
/// Corruption is returned as an error after the reader has skipped to
/// the next block, so a caller may keep scanning past damaged regions.
/// A record truncated by end-of-file is reported as end-of-stream, not
/// an error: a torn final write is an expected crash artifact.
pub struct WalReader<R: Read> {
    /// Source of log bytes.
    reader: R,
    /// Current block buffer.
    buffer: Vec<u8>,
    /// Current position within the buffer.
    buffer_offset: usize,
    /// Valid bytes in the buffer.
    buffer_size: usize,
    /// Whether we've reached EOF.
    eof: bool,
}

impl WalReader<BufReader<File>> {
    /// Open a WAL file for reading.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self::new(BufReader::with_capacity(BLOCK_SIZE * 4, file)))
    }
}

impl<R: Read> WalReader<R> {
    /// Create a reader over a log byte stream.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: vec![0u8; BLOCK_SIZE],
            buffer_offset: 0,
            buffer_size: 0,
            eof: false,
        }
    }

    /// Read the next logical record.
    ///
    /// Returns `None` when there are no more records.
    pub fn read_record(&mut self) -> Result<Option<Bytes>> {
        let mut scratch = Vec::new();
        let mut in_fragmented_record = false;

        loop {
            match self.read_physical_record()? {
                Some((record_type, data)) => match record_type {
                    RecordType::Full => {
                        if in_fragmented_record {
                            // Earlier fragments never saw their LAST; drop them.
                            scratch.clear();
                        }
                        return Ok(Some(Bytes::from(data)));
                    }
                    RecordType::First => {
                        if in_fragmented_record {
                            scratch.clear();
                        }
                        scratch = data;
                        in_fragmented_record = true;
                    }
                    RecordType::Middle => {
                        if !in_fragmented_record {
                            return Err(Error::corruption(
                                "middle record fragment without a first",
                            ));
                        }
                        scratch.extend_from_slice(&data);
                    }
                    RecordType::Last => {
                        if !in_fragmented_record {
                            return Err(Error::corruption("last record fragment without a first"));
                        }
                        scratch.extend_from_slice(&data);
                        return Ok(Some(Bytes::from(scratch)));
                    }
                    // Zero-type regions never surface from read_physical_record.
                    RecordType::Zero => unreachable!("zero-type records are filtered"),
                },
                None => {
                    // A fragmented record missing its LAST at EOF is a torn
                    // write; drop it silently.
                    return Ok(None);
                }
            }
        }
    }

    /// Read the next physical record, skipping block padding.
    ///
    /// On corruption, the rest of the current block is skipped before the
    /// error is returned, so the next call resumes at a block boundary.
    fn read_physical_record(&mut self) -> Result<Option<(RecordType, Vec<u8>)>> {
        loop {
            // Move to the next block when fewer than HEADER_SIZE bytes
            // remain: they are trailer padding (or a torn header at EOF).
            if self.buffer_offset + HEADER_SIZE > self.buffer_size {
                if !self.read_block()? {
                    return Ok(None);
                }
                continue;
            }

            let header = &self.buffer[self.buffer_offset..self.buffer_offset + HEADER_SIZE];
            let masked_crc = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
            let length = u16::from_le_bytes([header[4], header[5]]) as usize;
            let type_byte = header[6];

            // Zero type with zero length is preallocated file space, not
            // data; skip the rest of the block without reporting.
            if type_byte == RecordType::Zero.to_byte() && length == 0 {
                self.buffer_offset = self.buffer_size;
                continue;
            }

            // A zero type with a nonzero length is not valid writer output.
            let record_type = match RecordType::from_byte(type_byte) {
                Some(rt) if rt != RecordType::Zero => rt,
                _ => {
                    self.buffer_offset = self.buffer_size;
                    return Err(Error::corruption(format!(
                        "unknown record type {}",
                        type_byte
                    )));
                }
            };

            if self.buffer_offset + HEADER_SIZE + length > self.buffer_size {
                let truncated_at_eof = self.eof;
                self.buffer_offset = self.buffer_size;
                if truncated_at_eof {
                    // Torn final write; report end-of-stream.
                    return Ok(None);
                }
                return Err(Error::corruption("record length exceeds block"));
            }

            let data_start = self.buffer_offset + HEADER_SIZE;
            let data_end = data_start + length;
            let data = &self.buffer[data_start..data_end];

            // Checksum covers the type byte and the payload.
            let actual = crc::extend(crc::value(&[type_byte]), data);
            let expected = crc::unmask(masked_crc);
            if actual != expected {
                self.buffer_offset = self.buffer_size;
                return Err(Error::CrcMismatch { expected, actual });
            }

            let data = data.to_vec();
            self.buffer_offset = data_end;
            return Ok(Some((record_type, data)));
        }
    }

    /// Read the next block into the buffer.
    fn read_block(&mut self) -> Result<bool> {
        if self.eof {
            return Ok(false);
        }

        self.buffer_offset = 0;
        self.buffer_size = 0;

        while self.buffer_size < BLOCK_SIZE {
            let n = self.reader.read(&mut self.buffer[self.buffer_size..])?;
            if n == 0 {
                self.eof = true;
                break;
            }
            self.buffer_size += n;
        }

        Ok(self.buffer_size > 0)
    }
}

/// Iterator over WAL records.
pub struct WalIterator<'a, R: Read> {
    reader: &'a mut WalReader<R>,
}

impl<'a, R: Read> WalIterator<'a, R> {
    /// Create a new iterator.
    pub fn new(reader: &'a mut WalReader<R>) -> Self {
        Self { reader }
    }
}

impl<'a, R: Read> Iterator for WalIterator<'a, R> {
    type Item = Result<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.reader.read_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}
