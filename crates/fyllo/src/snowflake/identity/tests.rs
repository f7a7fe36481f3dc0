use core::time::Duration;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::{FutureExt, future::BoxFuture};
use parking_lot::Mutex;

use crate::{
    CoordinationStore, ElectedIdentifier, ElectionArgs, Error, ErrorCode, FixedIdentifier,
    Identifier, LeaseId, MACHINE_KEY_PREFIX, MAX_MACHINE, Result,
};

#[derive(Default)]
struct MemoryStore {
    inner: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    next_lease: LeaseId,
    alive: HashSet<LeaseId>,
    keys: HashMap<String, LeaseId>,
    keep_alives: usize,
    /// Answer keep-alives for unknown leases with an error, as etcd-client
    /// does, instead of `Ok(false)`.
    unknown_lease_errors: bool,
    unreachable: bool,
}

impl MemoryStore {
    fn new_lease(state: &mut MemoryState) -> LeaseId {
        state.next_lease += 1;
        state.alive.insert(state.next_lease);
        state.next_lease
    }

    /// Claims `machine` on behalf of some other process.
    fn occupy(&self, machine: u64) {
        let mut state = self.inner.lock();
        let lease = Self::new_lease(&mut state);
        state.keys.insert(key(machine), lease);
    }

    fn owner(&self, machine: u64) -> Option<LeaseId> {
        self.inner.lock().keys.get(&key(machine)).copied()
    }

    fn expire(&self, lease: LeaseId) {
        let mut state = self.inner.lock();
        state.alive.remove(&lease);
        state.keys.retain(|_, owner| *owner != lease);
    }

    fn keep_alives(&self) -> usize {
        self.inner.lock().keep_alives
    }

    fn etcd_like() -> Self {
        let store = Self::default();
        store.inner.lock().unknown_lease_errors = true;
        store
    }

    fn set_unreachable(&self, unreachable: bool) {
        self.inner.lock().unreachable = unreachable;
    }
}

impl CoordinationStore for MemoryStore {
    fn grant(&self, _ttl: Duration) -> BoxFuture<'_, Result<LeaseId>> {
        let lease = Self::new_lease(&mut self.inner.lock());
        futures::future::ready(Ok(lease)).boxed()
    }

    fn keep_alive(&self, lease: LeaseId) -> BoxFuture<'_, Result<bool>> {
        let mut state = self.inner.lock();
        state.keep_alives += 1;
        let alive = state.alive.contains(&lease);
        let result = if state.unreachable {
            Err(Error::coordination("etcd request failed", "connection refused"))
        } else if !alive && state.unknown_lease_errors {
            Err(Error::coordination("etcd request failed", "lease not found"))
        } else {
            Ok(alive)
        };
        futures::future::ready(result).boxed()
    }

    fn claim<'a>(&'a self, key: &'a str, lease: LeaseId) -> BoxFuture<'a, Result<bool>> {
        let mut state = self.inner.lock();
        let claimed = !state.keys.contains_key(key);
        if claimed {
            state.keys.insert(key.to_owned(), lease);
        }
        futures::future::ready(Ok(claimed)).boxed()
    }
}

fn key(machine: u64) -> String {
    format!("{MACHINE_KEY_PREFIX}{machine}")
}

const TTL: Duration = Duration::from_secs(3);

#[test]
fn fixed_identifier_validates_range() {
    assert_eq!(FixedIdentifier::new(0).unwrap().identify(), 0);
    assert_eq!(FixedIdentifier::from_args(" 15 ").unwrap().identify(), 15);

    let err = FixedIdentifier::new(MAX_MACHINE).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InitFailed);
    assert!(FixedIdentifier::from_args("").is_err());
    assert!(FixedIdentifier::from_args("-1").is_err());
}

#[test]
fn election_args_defaults_and_options() {
    let args = ElectionArgs::parse("endpoints=127.0.0.1:2379").unwrap();
    assert_eq!(args.endpoints, ["127.0.0.1:2379"]);
    assert_eq!(args.ttl, Duration::from_secs(10));
    assert_eq!(args.user, None);
    assert_eq!(args.password, None);

    let args =
        ElectionArgs::parse("endpoints=a:1, b:2;user=root;pwd=secret;ttl=4;region=eu").unwrap();
    assert_eq!(args.endpoints, ["a:1", "b:2"]);
    assert_eq!(args.user.as_deref(), Some("root"));
    assert_eq!(args.password.as_deref(), Some("secret"));
    assert_eq!(args.ttl, Duration::from_secs(4));
}

#[test]
fn election_args_rejects_bad_input() {
    for bad in ["", "user=root", "endpoints=", "endpoints=a:1;ttl=0", "endpoints=a:1;ttl=x"] {
        assert!(
            matches!(ElectionArgs::parse(bad), Err(Error::Configuration { .. })),
            "{bad:?} should be rejected"
        );
    }
}

#[tokio::test]
async fn elect_claims_first_free_slot() {
    let store = Arc::new(MemoryStore::default());
    store.occupy(0);
    store.occupy(1);

    let id = ElectedIdentifier::elect(Arc::clone(&store), TTL).await.unwrap();
    assert_eq!(id.identify(), 2);
    assert!(store.owner(2).is_some());
}

#[tokio::test]
async fn elect_fails_when_every_slot_is_claimed() {
    let store = Arc::new(MemoryStore::default());
    for machine in 0..MAX_MACHINE {
        store.occupy(machine);
    }

    let err = ElectedIdentifier::elect(Arc::clone(&store), TTL)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Coordination { .. }));
    assert_eq!(err.code(), ErrorCode::InitFailed);
}

#[tokio::test(start_paused = true)]
async fn lease_is_kept_alive_periodically() {
    let store = Arc::new(MemoryStore::default());
    let id = ElectedIdentifier::elect(Arc::clone(&store), TTL).await.unwrap();

    tokio::time::sleep(TTL + Duration::from_millis(10)).await;
    assert!(store.keep_alives() >= 3);
    assert_eq!(id.identify(), 0);
}

#[tokio::test(start_paused = true)]
async fn re_elects_after_lease_loss() {
    let store = Arc::new(MemoryStore::default());
    let id = ElectedIdentifier::elect(Arc::clone(&store), TTL).await.unwrap();
    assert_eq!(id.identify(), 0);

    let lease = store.owner(0).unwrap();
    store.expire(lease);
    store.occupy(0);

    tokio::time::sleep(TTL).await;
    assert_eq!(id.identify(), 1);
    assert_ne!(store.owner(1), Some(lease));
}

#[tokio::test(start_paused = true)]
async fn re_elects_when_lost_lease_is_reported_as_an_error() {
    let store = Arc::new(MemoryStore::etcd_like());
    let id = ElectedIdentifier::elect(Arc::clone(&store), TTL).await.unwrap();
    assert_eq!(id.identify(), 0);

    let lease = store.owner(0).unwrap();
    store.expire(lease);
    store.occupy(0);

    tokio::time::sleep(TTL * 2).await;
    assert_eq!(id.identify(), 1);
    assert_ne!(store.owner(0), Some(lease));
    assert_ne!(store.owner(1), Some(lease));
}

#[tokio::test(start_paused = true)]
async fn short_outage_keeps_the_lease() {
    let store = Arc::new(MemoryStore::default());
    let id = ElectedIdentifier::elect(Arc::clone(&store), TTL).await.unwrap();
    let lease = store.owner(0).unwrap();

    // two failed refreshes, less than one ttl without confirmation
    store.set_unreachable(true);
    tokio::time::sleep(Duration::from_millis(2_500)).await;
    store.set_unreachable(false);
    tokio::time::sleep(TTL).await;

    assert_eq!(id.identify(), 0);
    assert_eq!(store.owner(0), Some(lease));
    assert!(store.owner(1).is_none());
}

#[tokio::test(start_paused = true)]
async fn drop_stops_refreshing() {
    let store = Arc::new(MemoryStore::default());
    let id = ElectedIdentifier::elect(Arc::clone(&store), TTL).await.unwrap();
    drop(id);
    tokio::task::yield_now().await;

    let before = store.keep_alives();
    tokio::time::sleep(TTL * 3).await;
    assert_eq!(store.keep_alives(), before);
}
