//! WAL replay for crash recovery.

use std::path::Path;

use crate::batch::WriteBatch;
use crate::types::MemTable;
use crate::wal::WalReader;
use crate::{Error, Result};

/// Replay a WAL file into a memtable.
///
/// Every decoded batch is applied at its stored sequence range. Returns
/// the largest sequence number applied, or 0 if the log held no batches.
///
/// Corruption in the final readable position of the file is treated as a
/// torn write: logged and dropped. The same corruption followed by
/// further valid records means the middle of the log is damaged, which
/// is fatal to the recovery attempt.
pub fn replay_wal<M: MemTable>(path: &Path, memtable: &mut M) -> Result<u64> {
    let mut reader = WalReader::open(path)?;
    let mut batch = WriteBatch::new();
    let mut max_sequence = 0u64;
    let mut batches = 0u64;

    // Corruption is held back until we know whether any valid record
    // follows it.
    let mut pending: Option<Error> = None;

    loop {
        match reader.read_record() {
            Ok(Some(record)) => {
                if let Some(err) = pending.take() {
                    // Valid data after the damage: not a torn tail.
                    return Err(err);
                }

                batch.set_contents(&record)?;
                batch.insert_into(memtable)?;
                batches += 1;

                let last_seq = batch.sequence() + u64::from(batch.count()).saturating_sub(1);
                if last_seq > max_sequence {
                    max_sequence = last_seq;
                }
            }
            Ok(None) => break,
            Err(err) if err.is_corruption() => {
                if pending.is_none() {
                    pending = Some(err);
                }
            }
            Err(err) => return Err(err),
        }
    }

    if let Some(err) = pending {
        tracing::warn!(
            path = %path.display(),
            error = %err,
            "dropping corrupt tail of WAL, assuming torn write"
        );
    }

    tracing::debug!(
        path = %path.display(),
        batches,
        max_sequence,
        "WAL replay complete"
    );

    Ok(max_sequence)
}
