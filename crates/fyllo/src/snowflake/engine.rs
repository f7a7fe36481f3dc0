use core::time::Duration;
use std::{collections::HashMap, sync::Arc};

use parking_lot::RwLock;
#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    IdResult, Identifier, LABEL_MACHINE, LABEL_SEQUENCE, LABEL_TAG, LABEL_TIMESTAMP,
    MAX_MACHINE, MAX_SEQUENCE, MonotonicClock, Result, Sequencer, SnowflakeId, TickSource,
};

/// Tag-aware Snowflake ID generation.
///
/// The engine owns one [`Sequencer`] per business tag, created on first use.
/// Lookups take a shared read lock; the write lock is only taken to insert a
/// new tag or when the machine identity changes. Sequencers have their own
/// locks, so callers on different tags never block each other.
///
/// On every call the engine compares [`Identifier::identify`] against the
/// machine id it last observed. When they differ, every cached sequencer is
/// dropped and fresh ones are created under the new machine id. Fresh
/// sequencers never reuse the tick in which the change was observed.
///
/// # Example
///
/// ```
/// use fyllo::{FixedIdentifier, SnowflakeEngine};
///
/// let engine = SnowflakeEngine::new("static", FixedIdentifier::new(3).unwrap());
/// let a = engine.next_snowflake(7).unwrap();
/// let b = engine.next_snowflake(7).unwrap();
///
/// assert!(a < b);
/// assert_eq!(a.machine_id(), 3);
/// assert_eq!(a.tag(), 7);
/// ```
pub struct SnowflakeEngine<T = MonotonicClock>
where
    T: TickSource + Clone,
{
    name: String,
    identifier: Arc<dyn Identifier>,
    time: T,
    spin_budget: Option<Duration>,
    state: RwLock<EngineState<T>>,
}

struct EngineState<T>
where
    T: TickSource,
{
    machine: u64,
    /// Sequencers created after an identity change start past this tick.
    resume_after: Option<u64>,
    sequencers: HashMap<u8, Arc<Sequencer<T>>>,
}

impl SnowflakeEngine<MonotonicClock> {
    /// Creates an engine driven by a fresh [`MonotonicClock`].
    pub fn new(name: impl Into<String>, identifier: impl Identifier + 'static) -> Self {
        Self::with_time(name, identifier, MonotonicClock::default())
    }
}

impl<T> SnowflakeEngine<T>
where
    T: TickSource + Clone,
{
    pub fn with_time(
        name: impl Into<String>,
        identifier: impl Identifier + 'static,
        time: T,
    ) -> Self {
        let identifier: Arc<dyn Identifier> = Arc::new(identifier);
        let machine = identifier.identify();
        debug_assert!(machine < MAX_MACHINE);
        Self {
            name: name.into(),
            identifier,
            time,
            spin_budget: None,
            state: RwLock::new(EngineState {
                machine,
                resume_after: None,
                sequencers: HashMap::new(),
            }),
        }
    }

    /// Bounds how long a call may spin for the next tick once a tag's
    /// sequence space is exhausted. Applies to sequencers created afterwards.
    #[must_use]
    pub fn with_spin_budget(mut self, budget: Option<Duration>) -> Self {
        self.spin_budget = budget;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The machine id the engine currently packs into IDs.
    pub fn machine_id(&self) -> u64 {
        self.state.read().machine
    }

    /// Generates the next ID for `tag`.
    ///
    /// # Errors
    ///
    /// Propagates [`Sequencer::next`] failures: a clock rewind or, with a spin
    /// budget, a stalled clock. Neither poisons the engine.
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self)))]
    pub fn next_snowflake(&self, tag: u8) -> Result<SnowflakeId> {
        let (machine, sequencer) = self.sequencer_for(tag);
        let (tick, sequence) = sequencer.next()?;
        Ok(SnowflakeId::from(tick, machine, u64::from(tag), sequence))
    }

    /// Generates the next ID for `tag` as an [`IdResult`] labelled with its
    /// decoded fields.
    pub fn next_id(&self, tag: u8) -> Result<IdResult> {
        let id = self.next_snowflake(tag)?;
        Ok(IdResult::new(&self.name, id.to_raw())
            .with_label(LABEL_TIMESTAMP, id.timestamp())
            .with_label(LABEL_SEQUENCE, id.sequence())
            .with_label(LABEL_TAG, id.tag())
            .with_label(LABEL_MACHINE, id.machine_id()))
    }

    /// Returns the machine id to pack together with the sequencer for `tag`.
    /// Both come from the same locked view of the state.
    fn sequencer_for(&self, tag: u8) -> (u64, Arc<Sequencer<T>>) {
        let current = self.identifier.identify();
        {
            let state = self.state.read();
            if state.machine == current {
                if let Some(sequencer) = state.sequencers.get(&tag) {
                    return (state.machine, Arc::clone(sequencer));
                }
            }
        }

        let mut state = self.state.write();
        let current = self.identifier.identify();
        if state.machine != current {
            #[cfg(feature = "tracing")]
            tracing::info!(
                old = state.machine,
                new = current,
                "machine id changed, resetting sequencers"
            );
            state.machine = current;
            state.resume_after = Some(self.time.current_millis());
            state.sequencers.clear();
        }

        let resume_after = state.resume_after;
        let sequencer = state
            .sequencers
            .entry(tag)
            .or_insert_with(|| Arc::new(self.new_sequencer(resume_after)));
        (current, Arc::clone(sequencer))
    }

    fn new_sequencer(&self, resume_after: Option<u64>) -> Sequencer<T> {
        let time = self.time.clone();
        match resume_after {
            Some(tick) => Sequencer::from_components(tick, MAX_SEQUENCE, MAX_SEQUENCE, time),
            None => Sequencer::new(time),
        }
        .with_spin_budget(self.spin_budget)
    }
}

impl<T> core::fmt::Debug for SnowflakeEngine<T>
where
    T: TickSource + Clone,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = self.state.read();
        f.debug_struct("SnowflakeEngine")
            .field("name", &self.name)
            .field("identifier", &self.identifier)
            .field("machine", &state.machine)
            .field("tags", &state.sequencers.len())
            .finish_non_exhaustive()
    }
}
