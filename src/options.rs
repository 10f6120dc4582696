//! Configuration options for lsm-wal.

use std::time::Duration;

/// WAL sync mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Sync on every write (safest, slowest).
    Always,
    /// Sync at intervals (balanced). Interval-based sync is driven by the
    /// caller; the writer itself never syncs in this mode.
    Interval {
        /// Interval between syncs.
        interval: Duration,
    },
    /// Sync after N bytes written.
    Bytes {
        /// Number of bytes before sync.
        bytes: usize,
    },
    /// Let OS decide when to sync (fastest, may lose recent writes on crash).
    None,
}

impl Default for SyncMode {
    fn default() -> Self {
        SyncMode::Interval {
            interval: Duration::from_millis(100),
        }
    }
}
