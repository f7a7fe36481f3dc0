use core::fmt;
use std::{collections::HashMap, sync::Arc};

use tokio::sync::Mutex;
#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{Error, IdResult, LABEL_TAG, Result, SegmentStorage, TagRange};

/// Serves sequential IDs per tag out of ranges reserved in a
/// [`SegmentStorage`].
///
/// Construction warms the cache with one range per known tag. A call that
/// finds its tag's range missing or exhausted refills it from storage while
/// holding the engine lock, so one refill stalls callers of every tag until it
/// completes. A failed refill leaves the cached range as it was.
///
/// # Example
///
/// ```
/// use fyllo::{MemStorage, SegmentEngine};
///
/// # tokio_test();
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn tokio_test() {
/// let storage = MemStorage::from_args("tag=order,step=2").unwrap();
/// let engine = SegmentEngine::new("mem", storage).await.unwrap();
///
/// assert_eq!(engine.next_value("order").await.unwrap(), 1);
/// assert_eq!(engine.next_value("order").await.unwrap(), 2);
/// // refilled transparently
/// assert_eq!(engine.next_value("order").await.unwrap(), 3);
/// # }
/// ```
pub struct SegmentEngine {
    name: String,
    storage: Arc<dyn SegmentStorage>,
    ranges: Mutex<HashMap<String, TagRange>>,
}

impl SegmentEngine {
    /// Builds the engine and reserves an initial range for every tag in
    /// `storage`.
    ///
    /// # Errors
    ///
    /// Fails if the storage cannot be listed or any initial range cannot be
    /// obtained or is empty. No engine is returned in that case.
    pub async fn new(name: impl Into<String>, storage: impl SegmentStorage) -> Result<Self> {
        let storage: Arc<dyn SegmentStorage> = Arc::new(storage);
        let tags = storage.list().await?;

        let mut ranges = HashMap::with_capacity(tags.len());
        for tag in tags {
            let range = obtain_checked(&*storage, &tag).await?;
            ranges.insert(tag, range);
        }

        #[cfg(feature = "tracing")]
        tracing::info!(tags = ranges.len(), "segment cache warmed");

        Ok(Self {
            name: name.into(),
            storage,
            ranges: Mutex::new(ranges),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the next value for `tag`, refilling from storage if needed.
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self)))]
    pub async fn next_value(&self, tag: &str) -> Result<u64> {
        let mut ranges = self.ranges.lock().await;
        if let Some(range) = ranges.get_mut(tag) {
            if let Some(value) = range.take() {
                return Ok(value);
            }
        }

        let mut fresh = obtain_checked(&*self.storage, tag).await?;
        let value = fresh.take().ok_or_else(|| invalid_range(&fresh))?;
        ranges.insert(tag.to_owned(), fresh);
        Ok(value)
    }

    /// Like [`SegmentEngine::next_value`], labelled with the tag.
    pub async fn next_id(&self, tag: &str) -> Result<IdResult> {
        let value = self.next_value(tag).await?;
        Ok(IdResult::new(&self.name, value).with_label(LABEL_TAG, tag))
    }

    /// Returns a copy of the cached range for `tag`.
    pub async fn cached(&self, tag: &str) -> Option<TagRange> {
        self.ranges.lock().await.get(tag).cloned()
    }
}

impl fmt::Debug for SegmentEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegmentEngine")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

async fn obtain_checked(storage: &dyn SegmentStorage, tag: &str) -> Result<TagRange> {
    let range = storage.obtain(tag).await?;
    if range.is_exhausted() {
        return Err(invalid_range(&range));
    }
    if range.high == u64::MAX {
        return Err(Error::Storage {
            context: format!("range of tag [{tag}] reaches u64::MAX"),
            source: None,
        });
    }

    #[cfg(feature = "tracing")]
    tracing::debug!(tag, low = range.low, high = range.high, "segment range obtained");
    Ok(range)
}

#[cold]
fn invalid_range(range: &TagRange) -> Error {
    Error::InvalidRange {
        tag: range.tag.clone(),
        low: range.low,
        high: range.high,
    }
}
