use crate::FYLLO_EPOCH;
use core::fmt;

/// Number of distinct machine ids (4 bits).
pub const MAX_MACHINE: u64 = 1 << 4;

/// Number of distinct business tags (8 bits).
pub const MAX_TAG: u64 = 1 << 8;

/// Number of sequence values per tick per tag (10 bits).
pub const MAX_SEQUENCE: u64 = 1 << 10;

/// A 64-bit tag-aware Snowflake ID.
///
/// - 1 bit reserved
/// - 41 bits timestamp (ms since [`FYLLO_EPOCH`])
/// - 4 bits machine ID
/// - 8 bits business tag
/// - 10 bits sequence
///
/// ```text
///  Bit Index:  63           63 62            22 21         18 17       10 9              0
///              +--------------+----------------+-------------+-----------+---------------+
///  Field:      | reserved (1) | timestamp (41) | machine (4) | tag (8)   | sequence (10) |
///              +--------------+----------------+-------------+-----------+---------------+
///              |<----------- MSB ------------- 64 bits ------------- LSB -------------->|
/// ```
///
/// Timestamps passed to [`SnowflakeId::from`] and returned by
/// [`SnowflakeId::timestamp`] are UNIX milliseconds; the epoch is subtracted
/// when packing and added back when unpacking. Every field is masked to its
/// width, so out-of-range inputs are truncated rather than rejected.
///
/// # Example
///
/// ```
/// use fyllo::{SnowflakeId, FYLLO_EPOCH};
///
/// let epoch = FYLLO_EPOCH.as_millis() as u64;
/// let id = SnowflakeId::from(epoch, 1, 0, 0);
/// assert_eq!(id.to_raw(), 0x0000_0000_0004_0000);
/// assert_eq!(id.timestamp(), epoch);
/// assert_eq!(id.machine_id(), 1);
/// ```
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct SnowflakeId {
    id: u64,
}

impl SnowflakeId {
    /// Bitmask for extracting the 41-bit timestamp field. Occupies bits 22
    /// through 62.
    pub const TIMESTAMP_MASK: u64 = (1 << 41) - 1;

    /// Bitmask for extracting the 4-bit machine ID field. Occupies bits 18
    /// through 21.
    pub const MACHINE_ID_MASK: u64 = MAX_MACHINE - 1;

    /// Bitmask for extracting the 8-bit tag field. Occupies bits 10 through
    /// 17.
    pub const TAG_MASK: u64 = MAX_TAG - 1;

    /// Bitmask for extracting the 10-bit sequence field. Occupies bits 0
    /// through 9.
    pub const SEQUENCE_MASK: u64 = MAX_SEQUENCE - 1;

    pub const TIMESTAMP_SHIFT: u64 = 22;
    pub const MACHINE_ID_SHIFT: u64 = 18;
    pub const TAG_SHIFT: u64 = 10;
    pub const SEQUENCE_SHIFT: u64 = 0;

    const EPOCH_MILLIS: u64 = FYLLO_EPOCH.as_millis() as u64;

    /// Packs the components into an ID. `timestamp` is in UNIX milliseconds.
    pub const fn from(timestamp: u64, machine_id: u64, tag: u64, sequence: u64) -> Self {
        let timestamp = (timestamp.wrapping_sub(Self::EPOCH_MILLIS) & Self::TIMESTAMP_MASK)
            << Self::TIMESTAMP_SHIFT;
        let machine_id = (machine_id & Self::MACHINE_ID_MASK) << Self::MACHINE_ID_SHIFT;
        let tag = (tag & Self::TAG_MASK) << Self::TAG_SHIFT;
        let sequence = (sequence & Self::SEQUENCE_MASK) << Self::SEQUENCE_SHIFT;
        Self {
            id: timestamp | machine_id | tag | sequence,
        }
    }

    /// Extracts the timestamp in UNIX milliseconds.
    pub const fn timestamp(&self) -> u64 {
        self.elapsed() + Self::EPOCH_MILLIS
    }

    /// Extracts the raw timestamp field: milliseconds since [`FYLLO_EPOCH`].
    pub const fn elapsed(&self) -> u64 {
        (self.id >> Self::TIMESTAMP_SHIFT) & Self::TIMESTAMP_MASK
    }

    pub const fn machine_id(&self) -> u64 {
        (self.id >> Self::MACHINE_ID_SHIFT) & Self::MACHINE_ID_MASK
    }

    pub const fn tag(&self) -> u64 {
        (self.id >> Self::TAG_SHIFT) & Self::TAG_MASK
    }

    pub const fn sequence(&self) -> u64 {
        (self.id >> Self::SEQUENCE_SHIFT) & Self::SEQUENCE_MASK
    }

    pub const fn to_raw(&self) -> u64 {
        self.id
    }

    pub const fn from_raw(raw: u64) -> Self {
        Self { id: raw }
    }
}

impl From<SnowflakeId> for u64 {
    fn from(id: SnowflakeId) -> Self {
        id.to_raw()
    }
}

impl fmt::Display for SnowflakeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl fmt::Debug for SnowflakeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnowflakeId")
            .field("id", &format_args!("{:#018x}", self.id))
            .field("timestamp", &self.timestamp())
            .field("machine_id", &self.machine_id())
            .field("tag", &self.tag())
            .field("sequence", &self.sequence())
            .finish()
    }
}
