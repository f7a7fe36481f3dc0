use std::collections::BTreeMap;

use futures::{FutureExt, future::BoxFuture};
use parking_lot::Mutex;

use crate::{Error, Result, SegmentStorage, TagRange, args::parse_u64, split_key_values};

/// One durable counter: the highest value handed out so far and how far each
/// refill moves it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CounterRow {
    pub cursor: u64,
    pub step: u64,
    pub description: String,
}

impl CounterRow {
    pub fn new(step: u64) -> Self {
        Self {
            cursor: 0,
            step,
            description: String::new(),
        }
    }
}

/// Single-process [`SegmentStorage`] over an in-memory counter table.
///
/// Uses the same arithmetic as the SQL backend: each obtain advances the
/// cursor by `step` and returns `[cursor - step + 1, cursor]`. Nothing
/// survives a restart.
///
/// # Example
///
/// ```
/// use fyllo::MemStorage;
///
/// let storage = MemStorage::from_args("tag=order,step=100,max=500,desc=orders;tag=user,step=10")
///     .unwrap();
/// assert_eq!(storage.tags(), ["order", "user"]);
/// assert_eq!(storage.cursor("order"), Some(500));
/// ```
#[derive(Debug, Default)]
pub struct MemStorage {
    rows: Mutex<BTreeMap<String, CounterRow>>,
}

impl MemStorage {
    /// Parses the `mem` provider's argument string: `;`-separated entries of
    /// `tag=..,step=..[,max=..][,desc=..]`, where `max` is the starting cursor.
    pub fn from_args(args: &str) -> Result<Self> {
        if args.trim().is_empty() {
            return Err(Error::config("mem provider requires at least one tag"));
        }

        let storage = Self::default();
        for entry in args.split(';') {
            let (tag, row) = parse_entry(entry)?;
            storage.insert(tag, row)?;
        }
        Ok(storage)
    }

    /// Adds a counter row. Fails if the tag already exists or `step` is zero.
    pub fn insert(&self, tag: impl Into<String>, row: CounterRow) -> Result<()> {
        let tag = tag.into();
        if row.step == 0 {
            return Err(Error::config(format!("tag [{tag}] step should be at least 1")));
        }

        let mut rows = self.rows.lock();
        if rows.contains_key(&tag) {
            return Err(Error::config(format!("tag [{tag}] is duplicated")));
        }
        rows.insert(tag, row);
        Ok(())
    }

    pub fn tags(&self) -> Vec<String> {
        self.rows.lock().keys().cloned().collect()
    }

    pub fn cursor(&self, tag: &str) -> Option<u64> {
        self.rows.lock().get(tag).map(|row| row.cursor)
    }

    fn advance(&self, tag: &str) -> Result<TagRange> {
        let mut rows = self.rows.lock();
        let row = rows.get_mut(tag).ok_or_else(|| Error::UnknownTag {
            tag: tag.to_owned(),
        })?;

        let cursor = row
            .cursor
            .checked_add(row.step)
            .filter(|cursor| *cursor < u64::MAX)
            .ok_or_else(|| Error::Storage {
                context: format!("cursor of tag [{tag}] overflows"),
                source: None,
            })?;
        row.cursor = cursor;

        Ok(TagRange::new(tag, cursor - row.step + 1, cursor)
            .with_description(row.description.clone()))
    }
}

impl SegmentStorage for MemStorage {
    fn list(&self) -> BoxFuture<'_, Result<Vec<String>>> {
        futures::future::ready(Ok(self.tags())).boxed()
    }

    fn obtain<'a>(&'a self, tag: &'a str) -> BoxFuture<'a, Result<TagRange>> {
        futures::future::ready(self.advance(tag)).boxed()
    }
}

fn parse_entry(entry: &str) -> Result<(String, CounterRow)> {
    let kvs = split_key_values(entry, ',')?;

    let mut tag = None;
    let mut row = CounterRow::new(0);
    let mut has_step = false;
    for (key, value) in kvs {
        match key.as_str() {
            "tag" => tag = Some(value),
            "step" => {
                row.step = parse_u64("mem", &key, &value)?;
                has_step = true;
            }
            "max" => row.cursor = parse_u64("mem", &key, &value)?,
            "desc" => row.description = value,
            _ => {
                return Err(Error::config(format!(
                    "mem provider entry [{entry}] has unknown key [{key}]"
                )));
            }
        }
    }

    let Some(tag) = tag.filter(|t| !t.is_empty()) else {
        return Err(Error::config(format!("mem provider entry [{entry}] requires a tag")));
    };
    if !has_step {
        return Err(Error::config(format!("mem provider entry [{entry}] requires a step")));
    }
    Ok((tag, row))
}
