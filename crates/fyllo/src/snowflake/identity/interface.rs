use core::{fmt, time::Duration};
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::Result;

/// Supplies the machine id packed into every Snowflake ID.
///
/// `identify` is called on every generation, so implementations must be
/// cheap and infallible. The value must be in `[0, MAX_MACHINE)`; the
/// constructors of the built-in identifiers validate this once.
pub trait Identifier: Send + Sync + fmt::Debug {
    fn identify(&self) -> u64;
}

impl<I> Identifier for Arc<I>
where
    I: Identifier + ?Sized,
{
    fn identify(&self) -> u64 {
        (**self).identify()
    }
}

impl<I> Identifier for &I
where
    I: Identifier + ?Sized,
{
    fn identify(&self) -> u64 {
        (**self).identify()
    }
}

/// A lease id handed out by a [`CoordinationStore`].
pub type LeaseId = i64;

/// The narrow slice of a distributed key/value store needed to elect a
/// machine id.
///
/// Keys claimed through [`CoordinationStore::claim`] are bound to a lease and
/// disappear when the lease expires.
pub trait CoordinationStore: Send + Sync + 'static {
    /// Grants a new lease that expires after `ttl` unless kept alive.
    fn grant(&self, ttl: Duration) -> BoxFuture<'_, Result<LeaseId>>;

    /// Refreshes `lease`. Resolves to `false` if the lease has already
    /// expired.
    fn keep_alive(&self, lease: LeaseId) -> BoxFuture<'_, Result<bool>>;

    /// Atomically creates `key` bound to `lease` if the key is absent.
    /// Resolves to `false` if the key already exists.
    fn claim<'a>(&'a self, key: &'a str, lease: LeaseId) -> BoxFuture<'a, Result<bool>>;
}

impl<S> CoordinationStore for Arc<S>
where
    S: CoordinationStore + ?Sized,
{
    fn grant(&self, ttl: Duration) -> BoxFuture<'_, Result<LeaseId>> {
        (**self).grant(ttl)
    }

    fn keep_alive(&self, lease: LeaseId) -> BoxFuture<'_, Result<bool>> {
        (**self).keep_alive(lease)
    }

    fn claim<'a>(&'a self, key: &'a str, lease: LeaseId) -> BoxFuture<'a, Result<bool>> {
        (**self).claim(key, lease)
    }
}
