//! Reporter trait for dependency injection
//!
//! This trait lets the engine report transfer progress and asynchronous
//! errors without being coupled to a specific front-end.

/// Progress and error sink implemented by front-ends.
pub trait Reporter: Send + Sync {
    /// A transfer for `url` has started.
    fn fetching(&self, url: &str);

    /// Diagnostic bytes arrived on a transfer's stream.
    fn transfer_data(&self, url: &str, data: &[u8]);

    /// A transfer finished successfully with `size` payload bytes.
    fn fetched(&self, url: &str, size: u64);

    /// A transfer failed.
    fn failed(&self, url: &str, reason: &str);

    /// Log an informational message.
    fn info(&self, msg: &str);

    /// Report an asynchronous error that has no caller to return to.
    fn error(&self, msg: &str);
}

impl<T: Reporter + ?Sized> Reporter for std::sync::Arc<T> {
    fn fetching(&self, url: &str) {
        (**self).fetching(url)
    }
    fn transfer_data(&self, url: &str, data: &[u8]) {
        (**self).transfer_data(url, data)
    }
    fn fetched(&self, url: &str, size: u64) {
        (**self).fetched(url, size)
    }
    fn failed(&self, url: &str, reason: &str) {
        (**self).failed(url, reason)
    }
    fn info(&self, msg: &str) {
        (**self).info(msg)
    }
    fn error(&self, msg: &str) {
        (**self).error(msg)
    }
}

/// A no-op reporter for silent operations (e.g., verification, testing).
#[derive(Debug, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn fetching(&self, _: &str) {}
    fn transfer_data(&self, _: &str, _: &[u8]) {}
    fn fetched(&self, _: &str, _: u64) {}
    fn failed(&self, _: &str, _: &str) {}
    fn info(&self, _: &str) {}
    fn error(&self, _: &str) {}
}
