use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// A source of monotonic time, expressed as milliseconds since an
/// unspecified epoch (typically process start).
///
/// Every timing decision in the crawler core (limiter backoff, frontier
/// wake-at, retry scheduling) is expressed against a `Clock` rather than
/// `Instant::now()` directly, so that tests can drive time deterministically
/// instead of sleeping in real time.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current time in milliseconds since the clock's epoch.
    fn now_ms(&self) -> u64;
}

/// The real wall-clock, backed by `std::time::Instant`.
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// A manually-advanced clock for deterministic tests.
#[derive(Debug, Clone, Default)]
pub struct TestClock {
    now: Arc<AtomicU64>,
}

impl TestClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            now: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn set(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }

    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for TestClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// A shared, type-erased clock handle, cheaply cloneable across components.
pub type SharedClock = Arc<dyn Clock>;
