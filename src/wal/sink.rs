//! Destination sink for log writes.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::Result;

use super::BLOCK_SIZE;

/// Append-only destination for physical log records.
///
/// A writer owns its sink exclusively for its lifetime. `flush` pushes
/// buffered bytes to the operating system; `sync` makes them durable.
pub trait LogSink {
    /// Append bytes to the destination.
    fn append(&mut self, data: &[u8]) -> Result<()>;

    /// Flush buffered bytes to the OS.
    fn flush(&mut self) -> Result<()>;

    /// Force written bytes to stable storage.
    fn sync(&mut self) -> Result<()>;
}

/// File-backed log sink with write buffering.
pub struct FileSink {
    writer: BufWriter<File>,
}

impl FileSink {
    /// Create a new log file, truncating any existing file at `path`.
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        Ok(Self {
            writer: BufWriter::with_capacity(BLOCK_SIZE * 4, file),
        })
    }

    /// Open an existing log file for appending.
    ///
    /// Returns the sink and the current file length, which the writer
    /// needs to resume mid-block.
    pub fn open_for_append(path: &Path) -> Result<(Self, u64)> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let len = file.metadata()?.len();

        Ok((
            Self {
                writer: BufWriter::with_capacity(BLOCK_SIZE * 4, file),
            },
            len,
        ))
    }
}

impl LogSink for FileSink {
    fn append(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(data)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        Ok(())
    }
}

/// In-memory sink, useful for tests and for staging log contents.
impl LogSink for Vec<u8> {
    fn append(&mut self, data: &[u8]) -> Result<()> {
        self.extend_from_slice(data);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        Ok(())
    }
}
