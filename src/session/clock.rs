//! Time source for listening-time accounting.

use std::time::Instant;

/// Monotonic time source.
///
/// Listening time is measured in wall-clock terms between signals, so the
/// coordinator reads "now" through this trait and tests can substitute a
/// manually advanced clock.
pub trait Clock {
    fn now(&self) -> Instant;
}

/// The real monotonic clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}
