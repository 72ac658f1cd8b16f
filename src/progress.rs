//! Progress-callback trait for pipeline events.
//!
//! Inject an [`Arc<dyn GenerationProgressCallback>`] via
//! [`crate::config::PresentationConfigBuilder::progress_callback`] to receive
//! events as the request moves through normalisation, generation, image
//! resolution and rendering.
//!
//! # Example
//!
//! ```rust
//! use edgequake_slides::{GenerationProgressCallback, PresentationConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct ImageCounter {
//!     found: AtomicUsize,
//! }
//!
//! impl GenerationProgressCallback for ImageCounter {
//!     fn on_image_resolved(&self, slide: usize, total: usize, bytes: usize) {
//!         self.found.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("slide {slide}/{total}: {bytes} bytes");
//!     }
//! }
//!
//! let counter = Arc::new(ImageCounter { found: AtomicUsize::new(0) });
//!
//! let config = PresentationConfig::builder()
//!     .progress_callback(counter as Arc<dyn GenerationProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the pipeline as it processes a request.
///
/// Image events may arrive concurrently and out of slide order; slide
/// numbers are 1-indexed. All methods default to no-ops.
pub trait GenerationProgressCallback: Send + Sync {
    /// Source material is ready.
    fn on_source_ready(&self, chars: usize) {
        let _ = chars;
    }

    /// A generation attempt is about to be sent (1-indexed).
    fn on_generation_start(&self, attempt: u32) {
        let _ = attempt;
    }

    /// The reply was parsed into `count` slides; `dropped` entries were invalid.
    fn on_slides_generated(&self, count: usize, dropped: usize) {
        let _ = (count, dropped);
    }

    /// An image lookup for a slide started.
    fn on_image_start(&self, slide: usize, total: usize) {
        let _ = (slide, total);
    }

    /// An image was downloaded for a slide.
    fn on_image_resolved(&self, slide: usize, total: usize, bytes: usize) {
        let _ = (slide, total, bytes);
    }

    /// A slide will render without an image.
    fn on_image_missing(&self, slide: usize, total: usize, reason: &str) {
        let _ = (slide, total, reason);
    }

    /// The PDF was written.
    fn on_render_complete(&self, pages: usize, bytes: usize) {
        let _ = (pages, bytes);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl GenerationProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PresentationConfig`].
pub type ProgressCallback = Arc<dyn GenerationProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        resolved: AtomicUsize,
        missing: AtomicUsize,
        pages: AtomicUsize,
    }

    impl GenerationProgressCallback for TrackingCallback {
        fn on_image_resolved(&self, _slide: usize, _total: usize, _bytes: usize) {
            self.resolved.fetch_add(1, Ordering::SeqCst);
        }

        fn on_image_missing(&self, _slide: usize, _total: usize, _reason: &str) {
            self.missing.fetch_add(1, Ordering::SeqCst);
        }

        fn on_render_complete(&self, pages: usize, _bytes: usize) {
            self.pages.store(pages, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_source_ready(120);
        cb.on_generation_start(1);
        cb.on_slides_generated(7, 1);
        cb.on_image_start(1, 7);
        cb.on_image_resolved(1, 7, 2048);
        cb.on_image_missing(2, 7, "no results");
        cb.on_render_complete(7, 10_000);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_image_resolved(1, 3, 10);
        tracker.on_image_resolved(2, 3, 10);
        tracker.on_image_missing(3, 3, "timeout");
        tracker.on_render_complete(3, 999);

        assert_eq!(tracker.resolved.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.missing.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.pages.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_image_start(1, 10);
    }
}
