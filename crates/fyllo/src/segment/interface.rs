use std::sync::Arc;

use futures::future::BoxFuture;

use crate::Result;

/// A contiguous block of IDs `[low, high]` reserved for one tag.
///
/// The range is exhausted once `low > high`. Storage never hands out a range
/// whose `high` is `u64::MAX`, so `low` can always be incremented.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TagRange {
    pub tag: String,
    pub low: u64,
    pub high: u64,
    pub description: String,
}

impl TagRange {
    pub fn new(tag: impl Into<String>, low: u64, high: u64) -> Self {
        Self {
            tag: tag.into(),
            low,
            high,
            description: String::new(),
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub const fn is_exhausted(&self) -> bool {
        self.low > self.high
    }

    /// Number of values left in the range.
    pub const fn remaining(&self) -> u64 {
        if self.is_exhausted() {
            0
        } else {
            self.high - self.low + 1
        }
    }

    /// Hands out the lowest remaining value, or `None` if exhausted.
    pub fn take(&mut self) -> Option<u64> {
        if self.is_exhausted() {
            return None;
        }
        let value = self.low;
        self.low += 1;
        Some(value)
    }
}

/// Durable source of [`TagRange`]s.
///
/// Every successful [`SegmentStorage::obtain`] durably advances the tag's
/// cursor, so two calls (from any number of processes sharing the storage)
/// never return overlapping ranges.
pub trait SegmentStorage: Send + Sync + 'static {
    /// Lists every tag the storage knows about.
    fn list(&self) -> BoxFuture<'_, Result<Vec<String>>>;

    /// Reserves the next range for `tag`.
    ///
    /// Fails with [`Error::UnknownTag`](crate::Error::UnknownTag) if the tag
    /// does not exist.
    fn obtain<'a>(&'a self, tag: &'a str) -> BoxFuture<'a, Result<TagRange>>;
}

impl<S> SegmentStorage for Arc<S>
where
    S: SegmentStorage + ?Sized,
{
    fn list(&self) -> BoxFuture<'_, Result<Vec<String>>> {
        (**self).list()
    }

    fn obtain<'a>(&'a self, tag: &'a str) -> BoxFuture<'a, Result<TagRange>> {
        (**self).obtain(tag)
    }
}
