use core::{fmt, time::Duration};
use std::sync::Arc;

use etcd_client::{
    Client, Compare, CompareOp, ConnectOptions, LeaseKeepAliveStream, LeaseKeeper, PutOptions,
    Txn, TxnOp,
};
use futures::{FutureExt, future::BoxFuture};
use tokio::sync::Mutex;

use crate::{CoordinationStore, ElectionArgs, Error, LeaseId, Result};

/// A [`CoordinationStore`] backed by etcd v3.
///
/// Claims are a single transaction that puts the key bound to the lease only
/// if its create revision is zero, i.e. the key does not exist.
///
/// Keep-alives reuse one bidirectional stream per lease. A lease etcd no
/// longer knows about is reported as lost (`Ok(false)`), not as an error.
#[derive(Clone)]
pub struct EtcdStore {
    client: Client,
    keeper: Arc<Mutex<Option<Keeper>>>,
}

struct Keeper {
    lease: LeaseId,
    keeper: LeaseKeeper,
    stream: LeaseKeepAliveStream,
}

impl EtcdStore {
    pub async fn connect(args: &ElectionArgs) -> Result<Self> {
        let options = match (&args.user, &args.password) {
            (Some(user), password) => Some(
                ConnectOptions::new().with_user(user.as_str(), password.as_deref().unwrap_or("")),
            ),
            (None, _) => None,
        };
        let client = Client::connect(&args.endpoints, options)
            .await
            .map_err(|e| {
                Error::coordination(
                    format!("failed to connect to etcd {:?}", args.endpoints),
                    e,
                )
            })?;
        Ok(Self::from_client(client))
    }

    pub fn from_client(client: Client) -> Self {
        Self {
            client,
            keeper: Arc::new(Mutex::new(None)),
        }
    }

    /// Opens a keep-alive stream for `lease`. etcd-client sends the first
    /// request and checks its response while opening.
    async fn open_keeper(&self, lease: LeaseId) -> Result<Option<Keeper>> {
        let mut client = self.client.clone();
        match client.lease_keep_alive(lease).await {
            Ok((keeper, stream)) => Ok(Some(Keeper {
                lease,
                keeper,
                stream,
            })),
            Err(err) => keep_alive_outcome(Err(err)).map(|_| None),
        }
    }
}

impl Keeper {
    async fn refresh(&mut self) -> Result<bool> {
        let sent = self.keeper.keep_alive().await;
        let response = match sent {
            Ok(()) => self.stream.message().await,
            Err(err) => Err(err),
        };
        keep_alive_outcome(response.map(|resp| resp.map(|r| r.ttl())))
    }
}

/// Interprets a keep-alive round trip, given the TTL etcd answered with.
///
/// A missing response or a non-positive TTL means the lease is gone, as does
/// etcd-client's `LeaseKeepAliveError`, which it raises for an unknown lease.
fn keep_alive_outcome(response: Result<Option<i64>, etcd_client::Error>) -> Result<bool> {
    match response {
        Ok(ttl) => Ok(ttl.is_some_and(|ttl| ttl > 0)),
        Err(etcd_client::Error::LeaseKeepAliveError(_)) => Ok(false),
        Err(err) => Err(err.into()),
    }
}

impl fmt::Debug for EtcdStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EtcdStore").finish_non_exhaustive()
    }
}

impl CoordinationStore for EtcdStore {
    fn grant(&self, ttl: Duration) -> BoxFuture<'_, Result<LeaseId>> {
        let mut client = self.client.clone();
        async move {
            let secs = ttl.as_secs().max(1) as i64;
            let resp = client.lease_grant(secs, None).await?;
            Ok(resp.id())
        }
        .boxed()
    }

    fn keep_alive(&self, lease: LeaseId) -> BoxFuture<'_, Result<bool>> {
        async move {
            let mut slot = self.keeper.lock().await;

            // An existing stream for this lease gets the first try; if it has
            // broken or reports the lease gone, a fresh stream settles it.
            if let Some(mut keeper) = slot.take().filter(|k| k.lease == lease) {
                if let Ok(true) = keeper.refresh().await {
                    *slot = Some(keeper);
                    return Ok(true);
                }
            }

            let opened = self.open_keeper(lease).await?;
            let alive = opened.is_some();
            *slot = opened;
            Ok(alive)
        }
        .boxed()
    }

    fn claim<'a>(&'a self, key: &'a str, lease: LeaseId) -> BoxFuture<'a, Result<bool>> {
        let mut client = self.client.clone();
        async move {
            let txn = Txn::new()
                .when([Compare::create_revision(key, CompareOp::Equal, 0)])
                .and_then([TxnOp::put(
                    key,
                    lease.to_string(),
                    Some(PutOptions::new().with_lease(lease)),
                )]);
            let resp = client.txn(txn).await?;
            Ok(resp.succeeded())
        }
        .boxed()
    }
}
