//! Processing statistics tracking.
//!
//! Thread-safe failure counters shared by the fetcher, the validator and the
//! pipeline orchestrator.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use strum::IntoEnumIterator;

use super::types::ErrorType;

/// Thread-safe processing statistics tracker.
///
/// Every `ErrorType` is initialized to zero on creation, so increments never
/// allocate and can be issued from any task holding an `Arc` to the tracker.
pub struct ProcessingStats {
    errors: HashMap<ErrorType, AtomicUsize>,
}

impl ProcessingStats {
    pub fn new() -> Self {
        let mut errors = HashMap::new();
        for error in ErrorType::iter() {
            errors.insert(error, AtomicUsize::new(0));
        }
        ProcessingStats { errors }
    }

    /// Increment an error counter.
    pub fn increment_error(&self, error: ErrorType) {
        if let Some(counter) = self.errors.get(&error) {
            counter.fetch_add(1, Ordering::Relaxed);
        } else {
            log::error!(
                "Attempted to increment error counter for {:?} which is not in the map. \
                 This indicates a bug in ProcessingStats initialization.",
                error
            );
        }
    }

    /// Sets every counter back to zero.
    pub fn reset(&self) {
        for counter in self.errors.values() {
            counter.store(0, Ordering::SeqCst);
        }
    }

    /// Get the count for an error type.
    pub fn get_error_count(&self, error: ErrorType) -> usize {
        self.errors
            .get(&error)
            .map(|c| c.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Get total error count across all error types.
    pub fn total_errors(&self) -> usize {
        ErrorType::iter().map(|e| self.get_error_count(e)).sum()
    }

    /// Error types with a non-zero count, in declaration order.
    pub fn non_zero(&self) -> Vec<(ErrorType, usize)> {
        ErrorType::iter()
            .map(|e| (e, self.get_error_count(e)))
            .filter(|(_, count)| *count > 0)
            .collect()
    }

    /// Logs every non-zero counter at `warn`, or a single line when clean.
    pub fn log_summary(&self) {
        let non_zero = self.non_zero();
        if non_zero.is_empty() {
            log::info!("No failures recorded");
            return;
        }
        for (error_type, count) in non_zero {
            log::warn!("   {}: {}", error_type, count);
        }
    }
}

impl Default for ProcessingStats {
    fn default() -> Self {
        Self::new()
    }
}
