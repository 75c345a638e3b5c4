//! Progress-callback trait for grading events.
//!
//! Inject an [`Arc<dyn GradingProgressCallback>`] via
//! [`crate::config::GradingConfigBuilder::progress_callback`] to receive
//! events as each page is extracted and graded. The trait is `Send + Sync`
//! because the key and submission pages are extracted concurrently.
//!
//! # Example
//!
//! ```rust
//! use quizgrade::{GradingConfig, GradingProgressCallback, Side};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     extracted: AtomicUsize,
//! }
//!
//! impl GradingProgressCallback for CountingCallback {
//!     fn on_extraction_complete(&self, side: Side, questions: usize) {
//!         self.extracted.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{side}: {questions} questions");
//!     }
//! }
//!
//! let config = GradingConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { extracted: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use crate::error::Side;
use std::sync::Arc;

/// Called by the grading pipeline as it works through a run.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. `on_extraction_*` may be called concurrently for
/// the two sides; protect shared state accordingly.
pub trait GradingProgressCallback: Send + Sync {
    /// Called just before a page is sent to the extraction backend.
    fn on_extraction_start(&self, side: Side) {
        let _ = side;
    }

    /// Called when a page was extracted into a valid record.
    ///
    /// # Arguments
    /// * `side`      — which page
    /// * `questions` — number of questions in the record
    fn on_extraction_complete(&self, side: Side, questions: usize) {
        let _ = (side, questions);
    }

    /// Called when extraction of a page failed.
    fn on_extraction_error(&self, side: Side, error: &str) {
        let _ = (side, error);
    }

    /// Called once the report has been assembled.
    ///
    /// # Arguments
    /// * `entries` — number of graded questions in the report
    fn on_grading_complete(&self, entries: usize) {
        let _ = entries;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl GradingProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::GradingConfig`].
pub type ProgressCallback = Arc<dyn GradingProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        failed_sides: Mutex<Vec<Side>>,
        graded: AtomicUsize,
    }

    impl GradingProgressCallback for TrackingCallback {
        fn on_extraction_start(&self, _side: Side) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_extraction_complete(&self, _side: Side, _questions: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_extraction_error(&self, side: Side, _error: &str) {
            self.failed_sides.lock().unwrap().push(side);
        }

        fn on_grading_complete(&self, entries: usize) {
            self.graded.store(entries, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_extraction_start(Side::Key);
        cb.on_extraction_complete(Side::Key, 14);
        cb.on_extraction_error(Side::Submission, "timeout");
        cb.on_grading_complete(14);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();

        tracker.on_extraction_start(Side::Key);
        tracker.on_extraction_start(Side::Submission);
        tracker.on_extraction_complete(Side::Key, 10);
        tracker.on_extraction_error(Side::Submission, "malformed");

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(*tracker.failed_sides.lock().unwrap(), vec![Side::Submission]);

        tracker.on_grading_complete(10);
        assert_eq!(tracker.graded.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_extraction_start(Side::Submission);
    }
}
