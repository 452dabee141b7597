use std::sync::Arc;

use parking_lot::Mutex;

use crate::traits::time_source::{SystemTimeSource, TimeSource};

/// Per-session presentation timestamp generator.
///
/// Containers reject timestamps that go backwards, so every value returned by
/// [`next`](Self::next) is `>=` the previous one, whatever the underlying
/// time source does. Shared between the capture thread (input timestamps)
/// and the encoding thread (output timestamps).
pub struct PresentationClock {
    source: Arc<dyn TimeSource>,
    last_us: Mutex<Option<i64>>,
}

impl PresentationClock {
    pub fn new() -> Self {
        Self::with_source(Arc::new(SystemTimeSource))
    }

    pub fn with_source(source: Arc<dyn TimeSource>) -> Self {
        Self {
            source,
            last_us: Mutex::new(None),
        }
    }

    /// Next timestamp in microseconds: `max(now, previous)`.
    pub fn next(&self) -> i64 {
        let now = self.source.now_us();
        let mut last = self.last_us.lock();
        let result = match *last {
            Some(prev) if now < prev => {
                log::trace!("clock went back {} us, holding at {}", prev - now, prev);
                prev
            }
            _ => now,
        };
        *last = Some(result);
        result
    }

    /// Last emitted timestamp, if any.
    pub fn last(&self) -> Option<i64> {
        *self.last_us.lock()
    }
}

impl Default for PresentationClock {
    fn default() -> Self {
        Self::new()
    }
}
