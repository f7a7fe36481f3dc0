use core::time::Duration;
use std::sync::Arc;

use portable_atomic::{AtomicU64, Ordering};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{
    CoordinationStore, Error, Identifier, LeaseId, MAX_MACHINE, Result, args::parse_u64,
    split_key_values,
};

/// Default lifetime of the machine-id lease.
pub const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(10);

/// Prefix of the coordination keys that claim a machine id. The claimed index
/// is appended in decimal.
pub const MACHINE_KEY_PREFIX: &str = "/fyllo/machine/";

/// Parsed argument string of the `elected` provider:
/// `endpoints=h:p,h:p[;user=..][;pwd=..][;ttl=secs]`.
///
/// Unrecognized keys are ignored.
///
/// # Example
///
/// ```
/// use core::time::Duration;
/// use fyllo::ElectionArgs;
///
/// let args = ElectionArgs::parse("endpoints=10.0.0.1:2379,10.0.0.2:2379;ttl=30").unwrap();
/// assert_eq!(args.endpoints, ["10.0.0.1:2379", "10.0.0.2:2379"]);
/// assert_eq!(args.ttl, Duration::from_secs(30));
/// assert!(args.user.is_none());
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ElectionArgs {
    pub endpoints: Vec<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub ttl: Duration,
}

impl ElectionArgs {
    pub fn parse(args: &str) -> Result<Self> {
        let kvs = split_key_values(args, ';')?;

        let endpoints: Vec<String> = kvs
            .get("endpoints")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|e| !e.is_empty())
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default();
        if endpoints.is_empty() {
            return Err(Error::config(format!(
                "elected provider requires at least one endpoint, args [{args}]"
            )));
        }

        let ttl = match kvs.get("ttl") {
            Some(v) => match parse_u64("elected", "ttl", v)? {
                0 => return Err(Error::config("elected provider ttl should be at least 1s")),
                secs => Duration::from_secs(secs),
            },
            None => DEFAULT_LEASE_TTL,
        };

        let non_empty = |key: &str| kvs.get(key).filter(|v| !v.is_empty()).cloned();

        Ok(Self {
            endpoints,
            user: non_empty("user"),
            password: non_empty("pwd"),
            ttl,
        })
    }
}

/// A machine id claimed from a [`CoordinationStore`] and held by a lease.
///
/// Construction grants a lease and claims the first free key
/// `/fyllo/machine/i` for `i` in `[0, MAX_MACHINE)`. A background task keeps
/// the lease alive every `ttl / 3`. If the lease is lost anyway (a long pause,
/// a partition) the task grants a new lease and runs the election again, after
/// which [`Identifier::identify`] returns the newly claimed index. Refresh
/// failures are logged and retried on the next period; if none succeeds for
/// a whole `ttl` the lease is treated as lost.
///
/// Dropping the identifier stops the refresh task; the lease then expires on
/// its own and frees the slot.
#[derive(Debug)]
pub struct ElectedIdentifier {
    machine: Arc<AtomicU64>,
    cancel: CancellationToken,
}

impl ElectedIdentifier {
    /// Claims a machine id from `store` and spawns the lease refresh task.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Fails if the store is unreachable or all [`MAX_MACHINE`] slots are
    /// already claimed.
    pub async fn elect<S>(store: S, ttl: Duration) -> Result<Self>
    where
        S: CoordinationStore,
    {
        let store = Arc::new(store);
        let (lease, machine) = elect_once(&*store, ttl).await?;

        let machine = Arc::new(AtomicU64::new(machine));
        let cancel = CancellationToken::new();
        tokio::spawn(refresh(
            store,
            ttl,
            lease,
            Arc::clone(&machine),
            cancel.clone(),
        ));

        Ok(Self { machine, cancel })
    }

    /// Connects to etcd with the `elected` provider's argument string and
    /// runs the election.
    #[cfg(feature = "etcd")]
    pub async fn from_args(args: &str) -> Result<Self> {
        let args = ElectionArgs::parse(args)?;
        let store = crate::EtcdStore::connect(&args).await?;
        Self::elect(store, args.ttl).await
    }
}

impl Identifier for ElectedIdentifier {
    fn identify(&self) -> u64 {
        self.machine.load(Ordering::Acquire)
    }
}

impl Drop for ElectedIdentifier {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Grants a lease and claims the first free slot with it.
async fn elect_once<S>(store: &S, ttl: Duration) -> Result<(LeaseId, u64)>
where
    S: CoordinationStore + ?Sized,
{
    let lease = store.grant(ttl).await?;
    for machine in 0..MAX_MACHINE {
        let key = format!("{MACHINE_KEY_PREFIX}{machine}");
        if store.claim(&key, lease).await? {
            #[cfg(feature = "tracing")]
            tracing::info!(machine, lease, "claimed machine id");
            return Ok((lease, machine));
        }
    }
    Err(Error::Coordination {
        context: format!("all {MAX_MACHINE} machine ids are claimed"),
        source: None,
    })
}

async fn refresh<S>(
    store: Arc<S>,
    ttl: Duration,
    mut lease: LeaseId,
    machine: Arc<AtomicU64>,
    cancel: CancellationToken,
) where
    S: CoordinationStore,
{
    let period = (ttl / 3).max(Duration::from_millis(1));
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // Last time the store confirmed the lease. Once a whole ttl passes
    // without confirmation the lease must be assumed expired.
    let mut confirmed = Instant::now();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        match store.keep_alive(lease).await {
            Ok(true) => {
                confirmed = Instant::now();
                continue;
            }
            Ok(false) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(lease, "machine id lease lost, re-electing");
            }
            Err(err) => {
                report(&err);
                if confirmed.elapsed() < ttl {
                    continue;
                }
                #[cfg(feature = "tracing")]
                tracing::warn!(lease, "machine id lease unconfirmed for a full ttl, re-electing");
            }
        }

        match elect_once(&*store, ttl).await {
            Ok((new_lease, id)) => {
                lease = new_lease;
                confirmed = Instant::now();
                machine.store(id, Ordering::Release);
            }
            Err(err) => report(&err),
        }
    }
}

fn report(_err: &Error) {
    #[cfg(feature = "tracing")]
    tracing::warn!(error = %_err, "machine id lease refresh failed");
}
