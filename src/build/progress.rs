//! Progress reporting and cooperative cancellation

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Emitted once per regular file, whether it was written or skipped
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressEvent {
    pub processed_files: usize,
    pub total_files: usize,
    /// 0.0 to 100.0
    pub percent_complete: f64,
}

impl ProgressEvent {
    pub fn new(processed_files: usize, total_files: usize) -> Self {
        let percent_complete = if total_files == 0 {
            100.0
        } else {
            processed_files as f64 / total_files as f64 * 100.0
        };
        Self {
            processed_files,
            total_files,
            percent_complete,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.processed_files >= self.total_files
    }
}

/// Shared cancellation flag
///
/// Clones observe the same flag. The writer polls it before each file copy
/// and before final serialization.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
