use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Process-wide request accounting.
///
/// Updated by every connection handler and exported to CGI children through
/// the `THIRTEEN_*` environment variables. The counters only ever grow; the
/// start instant is fixed at construction.
#[derive(Debug)]
pub struct Counters {
    started: Instant,
    requests: AtomicU64,
    bytes: AtomicU64,
}

impl Counters {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            requests: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
        }
    }

    /// Records one completed request and the bytes written for it.
    pub fn record(&self, transferred: u64) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(transferred, Ordering::Relaxed);
    }

    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started.elapsed().as_secs()
    }
}

impl Default for Counters {
    fn default() -> Self {
        Self::new()
    }
}
