use core::time::Duration;
use std::collections::{HashSet, VecDeque};
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use std::thread::scope;

use parking_lot::Mutex;

use crate::{
    Error, FYLLO_EPOCH, FixedIdentifier, Identifier, LABEL_MACHINE, LABEL_SEQUENCE, LABEL_TAG,
    LABEL_TIMESTAMP, MonotonicClock, Sequencer, SnowflakeEngine, SnowflakeId, TickSource,
};

const EPOCH: u64 = FYLLO_EPOCH.as_millis() as u64;

#[derive(Clone)]
struct FixedTime(u64);

impl TickSource for FixedTime {
    fn current_millis(&self) -> u64 {
        self.0
    }
}

/// A clock the test moves by hand.
#[derive(Clone, Default)]
struct ManualClock(Arc<AtomicU64>);

impl ManualClock {
    fn at(millis: u64) -> Self {
        Self(Arc::new(AtomicU64::new(millis)))
    }

    fn set(&self, millis: u64) {
        self.0.store(millis, Ordering::SeqCst);
    }
}

impl TickSource for ManualClock {
    fn current_millis(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Returns scripted ticks in order, repeating the last one.
struct ScriptedClock(Mutex<VecDeque<u64>>);

impl ScriptedClock {
    fn new(ticks: impl IntoIterator<Item = u64>) -> Self {
        Self(Mutex::new(ticks.into_iter().collect()))
    }
}

impl TickSource for ScriptedClock {
    fn current_millis(&self) -> u64 {
        let mut ticks = self.0.lock();
        if ticks.len() > 1 {
            ticks.pop_front().unwrap()
        } else {
            *ticks.front().unwrap()
        }
    }
}

/// An identity the test can reassign, standing in for a re-election.
#[derive(Clone, Debug, Default)]
struct SwitchableIdentity(Arc<AtomicU64>);

impl Identifier for SwitchableIdentity {
    fn identify(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

#[test]
fn sequence_increments_within_same_tick() {
    let sequencer = Sequencer::new(FixedTime(42));
    assert_eq!(sequencer.next().unwrap(), (42, 0));
    assert_eq!(sequencer.next().unwrap(), (42, 1));
    assert_eq!(sequencer.next().unwrap(), (42, 2));
}

#[test]
fn sequence_resets_when_tick_advances() {
    let clock = ManualClock::at(42);
    let sequencer = Sequencer::new(clock.clone());
    sequencer.next().unwrap();
    sequencer.next().unwrap();

    clock.set(43);
    assert_eq!(sequencer.next().unwrap(), (43, 0));
}

#[test]
fn exhausted_tick_waits_for_the_next_one() {
    let clock = ScriptedClock::new([42, 42, 42, 42, 42, 42, 43]);
    let sequencer = Sequencer::from_components(0, 0, 4, clock);

    for i in 0..4 {
        assert_eq!(sequencer.next().unwrap(), (42, i));
    }
    assert_eq!(sequencer.next().unwrap(), (43, 0));
    assert_eq!(sequencer.next().unwrap(), (43, 1));
}

#[test]
fn clock_rewind_fails_without_touching_state() {
    let clock = ManualClock::at(100);
    let sequencer = Sequencer::new(clock.clone());
    assert_eq!(sequencer.next().unwrap(), (100, 0));

    clock.set(99);
    let err = sequencer.next().unwrap_err();
    assert!(matches!(err, Error::ClockRewind { now: 99, last: 100 }));
    assert_eq!(sequencer.state().last_tick, 100);
    assert_eq!(sequencer.state().counter, 1);

    clock.set(100);
    assert_eq!(sequencer.next().unwrap(), (100, 1));
}

#[test]
fn spin_budget_reports_a_stalled_clock() {
    let sequencer = Sequencer::from_components(0, 0, 1, FixedTime(7))
        .with_spin_budget(Some(Duration::from_millis(5)));
    assert_eq!(sequencer.next().unwrap(), (7, 0));

    let err = sequencer.next().unwrap_err();
    assert!(matches!(err, Error::TickStalled { since: 7, budget_ms: 5 }));
}

#[test]
fn engine_ids_are_unique_and_ordered() {
    let engine = SnowflakeEngine::new("static", FixedIdentifier::new(1).unwrap());
    let mut seen = HashSet::new();
    let mut last: Option<SnowflakeId> = None;

    for _ in 0..20_000 {
        let id = engine.next_snowflake(9).unwrap();
        assert!(seen.insert(id));
        if let Some(prev) = last {
            assert!(id.timestamp() >= prev.timestamp());
            if id.timestamp() == prev.timestamp() {
                assert!(id.sequence() > prev.sequence());
            }
        }
        last = Some(id);
    }
}

#[test]
fn engine_threads_caller_tag_into_the_id() {
    let engine = SnowflakeEngine::with_time(
        "static",
        FixedIdentifier::new(5).unwrap(),
        ManualClock::at(EPOCH + 10),
    );

    let a = engine.next_snowflake(0).unwrap();
    let b = engine.next_snowflake(200).unwrap();
    assert_eq!(a.tag(), 0);
    assert_eq!(b.tag(), 200);
    // tags have independent sequencers
    assert_eq!(a.sequence(), 0);
    assert_eq!(b.sequence(), 0);
    assert_ne!(a, b);
}

#[test]
fn engine_worked_example() {
    let engine =
        SnowflakeEngine::with_time("static", FixedIdentifier::new(1).unwrap(), FixedTime(EPOCH));
    let id = engine.next_snowflake(0).unwrap();
    assert_eq!(id.to_raw(), 0x0000_0000_0004_0000);
}

#[test]
fn engine_result_carries_labels() {
    let engine = SnowflakeEngine::with_time(
        "static",
        FixedIdentifier::new(2).unwrap(),
        FixedTime(EPOCH + 1_000),
    );
    engine.next_id(3).unwrap();
    let result = engine.next_id(3).unwrap();

    assert_eq!(result.name, "static");
    assert_eq!(result.next, SnowflakeId::from(EPOCH + 1_000, 2, 3, 1).to_raw());
    assert_eq!(result.label(LABEL_TIMESTAMP), Some("1451606401000"));
    assert_eq!(result.label(LABEL_SEQUENCE), Some("1"));
    assert_eq!(result.label(LABEL_TAG), Some("3"));
    assert_eq!(result.label(LABEL_MACHINE), Some("2"));
}

#[test]
fn engine_recovers_after_clock_rewind() {
    let clock = ManualClock::at(EPOCH + 500);
    let engine =
        SnowflakeEngine::with_time("static", FixedIdentifier::new(0).unwrap(), clock.clone());
    let first = engine.next_snowflake(1).unwrap();

    clock.set(EPOCH + 499);
    assert!(matches!(
        engine.next_snowflake(1),
        Err(Error::ClockRewind { .. })
    ));

    clock.set(EPOCH + 500);
    let second = engine.next_snowflake(1).unwrap();
    assert!(second > first);
}

#[test]
fn identity_change_resets_sequencers() {
    let identity = SwitchableIdentity::default();
    identity.0.store(1, Ordering::SeqCst);
    let clock = ManualClock::at(EPOCH + 100);
    let engine = SnowflakeEngine::with_time("elected", identity.clone(), clock.clone())
        .with_spin_budget(Some(Duration::from_millis(5)));

    let before = engine.next_snowflake(4).unwrap();
    assert_eq!(before.machine_id(), 1);

    identity.0.store(2, Ordering::SeqCst);
    // the tick the change was observed in is not reused
    assert!(matches!(
        engine.next_snowflake(4),
        Err(Error::TickStalled { .. })
    ));
    assert_eq!(engine.machine_id(), 2);

    clock.set(EPOCH + 101);
    let after = engine.next_snowflake(4).unwrap();
    assert_eq!(after.machine_id(), 2);
    assert_eq!(after.tag(), 4);
    assert_eq!(after.sequence(), 0);
    assert_eq!(after.timestamp(), EPOCH + 101);
}

#[test]
fn concurrent_callers_never_collide() {
    let engine = SnowflakeEngine::with_time(
        "static",
        FixedIdentifier::new(3).unwrap(),
        MonotonicClock::default(),
    );
    let threads = num_cpus::get().clamp(2, 8);
    const PER_THREAD: usize = 4_096;

    let ids = Mutex::new(HashSet::with_capacity(threads * PER_THREAD));
    scope(|s| {
        for _ in 0..threads {
            s.spawn(|| {
                let local: Vec<_> = (0..PER_THREAD)
                    .map(|_| engine.next_snowflake(11).unwrap())
                    .collect();
                ids.lock().extend(local);
            });
        }
    });

    assert_eq!(ids.into_inner().len(), threads * PER_THREAD);
}
