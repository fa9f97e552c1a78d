//! Dedup key generation for Floodgate
//!
//! Submissions without a caller-supplied dedup key get a generated key
//! that is unique per call, which makes the task immune to compaction.

use std::sync::atomic::{AtomicU64, Ordering};

static TASK_SEQ: AtomicU64 = AtomicU64::new(0);

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}

/// Generate a dedup key that never repeats within the process.
///
/// Format: `task-{timestamp_ms}-{seq}`
/// Example: `task-1738300800123-42`
pub fn generate_task_key() -> String {
    let seq = TASK_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("task-{}-{}", now_ms(), seq)
}
