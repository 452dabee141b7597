use std::sync::OnceLock;
use std::time::Instant;

/// Source of raw microsecond readings for the presentation clock.
pub trait TimeSource: Send + Sync {
    fn now_us(&self) -> i64;
}

/// Monotonic process clock, microseconds since first use.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now_us(&self) -> i64 {
        static EPOCH: OnceLock<Instant> = OnceLock::new();
        EPOCH.get_or_init(Instant::now).elapsed().as_micros() as i64
    }
}
