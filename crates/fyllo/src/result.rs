use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Label key for the tick an ID was generated in.
pub const LABEL_TIMESTAMP: &str = "timestamp";
/// Label key for the per-tick sequence number.
pub const LABEL_SEQUENCE: &str = "sequence";
/// Label key for the business tag.
pub const LABEL_TAG: &str = "tag";
/// Label key for the machine id.
pub const LABEL_MACHINE: &str = "machine";

/// The outcome of a successful `next` call on any provider family.
///
/// `labels` is an open set of diagnostic fields. Snowflake results carry
/// [`LABEL_TIMESTAMP`], [`LABEL_SEQUENCE`], [`LABEL_TAG`] and
/// [`LABEL_MACHINE`]; segment results carry [`LABEL_TAG`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdResult {
    /// Name of the provider that produced the value.
    pub name: String,
    /// The generated identifier.
    pub next: u64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl IdResult {
    pub fn new(name: impl Into<String>, next: u64) -> Self {
        Self {
            name: name.into(),
            next,
            labels: BTreeMap::new(),
        }
    }

    /// Adds a label, replacing any previous value for `key`.
    #[must_use]
    pub fn with_label(mut self, key: &str, value: impl ToString) -> Self {
        self.labels.insert(key.to_owned(), value.to_string());
        self
    }

    /// Returns the label stored under `key`, if any.
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }
}
