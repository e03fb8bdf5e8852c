//! Alert hooks
//!
//! The pool and the forwarding engine call these at two decision points.
//! Delivery is up to the embedding application.

use tracing::warn;

/// Receiver for operational alerts
pub trait AlertSink: Send + Sync {
    /// A full probe pass found no healthy endpoint in a non-empty pool
    fn no_healthy_proxies(&self);

    /// A request is about to be sent without a proxy
    fn fallback_to_direct(&self, url: &str);
}

/// Discards every alert
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAlertSink;

impl AlertSink for NoopAlertSink {
    fn no_healthy_proxies(&self) {}

    fn fallback_to_direct(&self, _url: &str) {}
}

/// Emits alerts as warnings through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn no_healthy_proxies(&self) {
        warn!(alert = "no_healthy_proxies", "ALERT: No healthy proxies available");
    }

    fn fallback_to_direct(&self, url: &str) {
        warn!(
            alert = "fallback_to_direct",
            url = %url,
            "ALERT: Falling back to direct connection"
        );
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::AlertSink;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Records every alert it receives
    #[derive(Default)]
    pub struct RecordingAlertSink {
        no_healthy: AtomicUsize,
        fallbacks: Mutex<Vec<String>>,
    }

    impl RecordingAlertSink {
        pub fn no_healthy_count(&self) -> usize {
            self.no_healthy.load(Ordering::SeqCst)
        }

        pub fn fallbacks(&self) -> Vec<String> {
            self.fallbacks.lock().clone()
        }
    }

    impl AlertSink for RecordingAlertSink {
        fn no_healthy_proxies(&self) {
            self.no_healthy.fetch_add(1, Ordering::SeqCst);
        }

        fn fallback_to_direct(&self, url: &str) {
            self.fallbacks.lock().push(url.to_string());
        }
    }
}
