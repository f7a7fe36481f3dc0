use core::time::Duration;
use std::time::Instant;

/// Fyllo epoch: Friday, January 1, 2016 00:00:00 UTC
///
/// Snowflake IDs store ticks relative to this instant, which keeps the 41-bit
/// timestamp field from overflowing until the late 2080s.
pub const FYLLO_EPOCH: Duration = Duration::from_millis(1_451_606_400_000);

/// A millisecond tick source.
///
/// Ticks are milliseconds since the UNIX epoch. Implementations are free to
/// be wall clocks (which may move backwards) or monotonic clocks; the
/// sequencer detects and reports rewinds either way.
///
/// # Example
///
/// ```
/// use fyllo::TickSource;
///
/// struct FixedTime;
/// impl TickSource for FixedTime {
///     fn current_millis(&self) -> u64 {
///         1234
///     }
/// }
///
/// assert_eq!(FixedTime.current_millis(), 1234);
/// assert_eq!(FixedTime.wait_for_next(1000), 1234);
/// ```
pub trait TickSource {
    /// Returns the current tick.
    fn current_millis(&self) -> u64;

    /// Busy-spins until a tick strictly greater than `since` is observed and
    /// returns it.
    ///
    /// There is no sleep or back-off: the caller is expected to hold a lock
    /// and the wait is at most one tick on a healthy clock.
    fn wait_for_next(&self, since: u64) -> u64 {
        loop {
            let now = self.current_millis();
            if now > since {
                return now;
            }
            core::hint::spin_loop();
        }
    }

    /// Like [`TickSource::wait_for_next`], but gives up after `budget` and
    /// returns `None`.
    fn wait_for_next_within(&self, since: u64, budget: Duration) -> Option<u64> {
        let deadline = Instant::now() + budget;
        loop {
            let now = self.current_millis();
            if now > since {
                return Some(now);
            }
            if Instant::now() >= deadline {
                return None;
            }
            core::hint::spin_loop();
        }
    }
}

impl<T: TickSource + ?Sized> TickSource for &T {
    fn current_millis(&self) -> u64 {
        (**self).current_millis()
    }
}

impl<T: TickSource + ?Sized> TickSource for std::sync::Arc<T> {
    fn current_millis(&self) -> u64 {
        (**self).current_millis()
    }
}
