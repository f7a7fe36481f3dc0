use core::{cmp::Ordering, time::Duration};

use parking_lot::Mutex;
#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{Error, MAX_SEQUENCE, Result, TickSource};

/// The mutable state of one [`Sequencer`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SequenceState {
    /// The tick the most recent sequence number was handed out in.
    pub last_tick: u64,
    /// The next sequence number to hand out within `last_tick`.
    pub counter: u64,
}

/// A per-tag sequence counter coupled to a [`TickSource`].
///
/// Each call to [`Sequencer::next`] returns a `(tick, sequence)` pair that is
/// unique for this sequencer: the counter restarts at zero whenever the tick
/// advances, and once it reaches the maximum within one tick the sequencer
/// spins until the next tick is observed.
///
/// The state lives behind its own mutex, so independent sequencers never
/// contend with each other. The tick is read while the lock is held, which
/// keeps concurrent callers from observing ticks out of order.
///
/// # Example
///
/// ```
/// use fyllo::{Sequencer, TickSource};
///
/// struct FixedTime;
/// impl TickSource for FixedTime {
///     fn current_millis(&self) -> u64 {
///         42
///     }
/// }
///
/// let sequencer = Sequencer::new(FixedTime);
/// assert_eq!(sequencer.next().unwrap(), (42, 0));
/// assert_eq!(sequencer.next().unwrap(), (42, 1));
/// ```
#[derive(Debug)]
pub struct Sequencer<T>
where
    T: TickSource,
{
    state: Mutex<SequenceState>,
    time: T,
    max_sequence: u64,
    spin_budget: Option<Duration>,
}

impl<T> Sequencer<T>
where
    T: TickSource,
{
    /// Creates a sequencer with the Snowflake layout's maximum sequence
    /// ([`MAX_SEQUENCE`]) and an empty state.
    pub fn new(time: T) -> Self {
        Self::from_components(0, 0, MAX_SEQUENCE, time)
    }

    /// Creates a sequencer from explicit state.
    ///
    /// Primarily useful for tests and for resuming after an identity change,
    /// where seeding `counter = max_sequence` forces the first call to wait
    /// for a tick strictly after `last_tick`.
    pub fn from_components(last_tick: u64, counter: u64, max_sequence: u64, time: T) -> Self {
        debug_assert!(max_sequence > 0);
        Self {
            state: Mutex::new(SequenceState { last_tick, counter }),
            time,
            max_sequence,
            spin_budget: None,
        }
    }

    /// Bounds how long [`Sequencer::next`] may spin waiting for the next tick
    /// once a tick's sequence space is exhausted. `None` spins without limit.
    #[must_use]
    pub fn with_spin_budget(mut self, budget: Option<Duration>) -> Self {
        self.spin_budget = budget;
        self
    }

    /// Returns the next `(tick, sequence)` pair.
    ///
    /// # Errors
    ///
    /// - [`Error::ClockRewind`] if the tick source reports a tick earlier than
    ///   the last one handed out. The state is left untouched, so the
    ///   sequencer recovers as soon as the clock catches up.
    /// - [`Error::TickStalled`] if a spin budget is set and the tick does not
    ///   advance within it.
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self)))]
    pub fn next(&self) -> Result<(u64, u64)> {
        let mut state = self.state.lock();
        let now = self.time.current_millis();

        match now.cmp(&state.last_tick) {
            Ordering::Greater => {
                state.last_tick = now;
                state.counter = 0;
            }
            Ordering::Equal => {
                if state.counter >= self.max_sequence {
                    state.last_tick = self.advance(now)?;
                    state.counter = 0;
                }
            }
            Ordering::Less => return Err(Self::cold_clock_behind(now, state.last_tick)),
        }

        if state.counter >= self.max_sequence {
            return Err(Error::SequenceExhausted {
                sequence: state.counter,
                max: self.max_sequence,
            });
        }

        let sequence = state.counter;
        state.counter += 1;
        Ok((state.last_tick, sequence))
    }

    /// Returns a snapshot of the current state.
    pub fn state(&self) -> SequenceState {
        *self.state.lock()
    }

    pub fn max_sequence(&self) -> u64 {
        self.max_sequence
    }

    fn advance(&self, since: u64) -> Result<u64> {
        match self.spin_budget {
            None => Ok(self.time.wait_for_next(since)),
            Some(budget) => self
                .time
                .wait_for_next_within(since, budget)
                .ok_or(Error::TickStalled {
                    since,
                    budget_ms: budget.as_millis() as u64,
                }),
        }
    }

    #[cold]
    #[inline(never)]
    fn cold_clock_behind(now: u64, last: u64) -> Error {
        #[cfg(feature = "tracing")]
        tracing::warn!(now, last, "clock moved backwards");
        Error::ClockRewind { now, last }
    }
}
