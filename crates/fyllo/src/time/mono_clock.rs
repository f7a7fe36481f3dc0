use crate::TickSource;
use core::time::Duration;
use std::{
    sync::{
        Arc, OnceLock,
        atomic::{AtomicU64, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Instant, SystemTime, UNIX_EPOCH},
};

/// Shared ticker thread that updates every millisecond.
#[derive(Debug)]
struct SharedTickerInner {
    current: AtomicU64,
    _handle: OnceLock<JoinHandle<()>>,
}

/// A monotonic tick source anchored to the wall clock at construction.
///
/// At startup the clock captures `SystemTime::now()` as a UNIX offset and from
/// then on only advances with a monotonic timer, so ticks never go backwards
/// even if NTP or an operator adjusts the system clock. A background ticker
/// thread stores elapsed milliseconds in an atomic once per millisecond, which
/// keeps [`TickSource::current_millis`] to a single atomic load.
///
/// Cloning is cheap: all clones share one ticker thread, and the thread exits
/// after the last clone is dropped.
#[derive(Clone, Debug)]
pub struct MonotonicClock {
    inner: Arc<SharedTickerInner>,
    unix_offset: u64, // in milliseconds
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock {
    /// Constructs a monotonic clock whose ticks are milliseconds since the
    /// UNIX epoch.
    ///
    /// # Panics
    ///
    /// Panics if the system clock reports a time before the UNIX epoch.
    ///
    /// # Example
    ///
    /// ```
    /// use fyllo::{MonotonicClock, TickSource, FYLLO_EPOCH};
    ///
    /// let clock = MonotonicClock::new();
    /// let first = clock.current_millis();
    /// std::thread::sleep(std::time::Duration::from_millis(3));
    /// let second = clock.current_millis();
    ///
    /// assert!(first > FYLLO_EPOCH.as_millis() as u64);
    /// assert!(second >= first);
    /// ```
    pub fn new() -> Self {
        let start = Instant::now();
        let unix_offset = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("System clock before UNIX_EPOCH")
            .as_millis() as u64;

        let inner = Arc::new(SharedTickerInner {
            current: AtomicU64::new(0),
            _handle: OnceLock::new(),
        });

        let weak_inner = Arc::downgrade(&inner);
        let handle = thread::spawn(move || {
            let mut tick = 0;

            loop {
                let Some(inner_ref) = weak_inner.upgrade() else {
                    break;
                };

                // Absolute target of the next tick
                let target = start + Duration::from_millis(tick);

                let now = Instant::now();
                if now < target {
                    thread::sleep(target - now);
                }

                let now_ms = start.elapsed().as_millis() as u64;
                inner_ref.current.store(now_ms, Ordering::Relaxed);

                // Align to the tick after the one we actually observed
                tick = now_ms + 1;
            }
        });

        let _ = inner._handle.set(handle);

        Self { inner, unix_offset }
    }
}

impl TickSource for MonotonicClock {
    fn current_millis(&self) -> u64 {
        self.unix_offset + self.inner.current.load(Ordering::Relaxed)
    }
}

/// A tick source that reads the wall clock on every call.
///
/// Unlike [`MonotonicClock`], ticks follow system clock adjustments and may
/// move backwards, which the sequencer reports as
/// [`Error::ClockRewind`](crate::Error::ClockRewind).
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl TickSource for SystemClock {
    fn current_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_millis() as u64)
    }
}
