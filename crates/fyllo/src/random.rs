use core::hash::Hasher;

use fnv::FnvHasher;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A random identifier: a UUIDv4 and the 64-bit FNV-1a hash of its text.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RandomResult {
    /// Hyphenated lowercase UUIDv4.
    pub identify: String,
    pub next: u64,
}

/// Generates [`RandomResult`]s. Stateless; every call draws a fresh UUID.
///
/// # Example
///
/// ```
/// use fyllo::{RandomEngine, fnv1a_64};
///
/// let engine = RandomEngine::new("uuid");
/// let result = engine.next_id();
/// assert_eq!(result.identify.len(), 36);
/// assert_eq!(result.next, fnv1a_64(result.identify.as_bytes()));
/// ```
#[derive(Clone, Debug)]
pub struct RandomEngine {
    name: String,
}

impl RandomEngine {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn next_id(&self) -> RandomResult {
        let identify = Uuid::new_v4().to_string();
        let next = fnv1a_64(identify.as_bytes());
        RandomResult { identify, next }
    }
}

/// 64-bit FNV-1a.
pub fn fnv1a_64(bytes: &[u8]) -> u64 {
    let mut hasher = FnvHasher::default();
    hasher.write(bytes);
    hasher.finish()
}
