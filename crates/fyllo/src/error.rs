use core::fmt;

/// A boxed error used as the optional cause of storage and coordination
/// failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A result type defaulting to the crate [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Stable numeric error codes.
///
/// Codes are part of the external contract: transports map them 1:1 onto their
/// own status space (see `fyllo-server`), so values must never be reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u32)]
#[non_exhaustive]
pub enum ErrorCode {
    /// A request parameter was missing or malformed.
    RequestParam = 10_000_001,
    /// Startup failed: bad provider arguments or an unreachable dependency.
    InitFailed = 30_000_001,
    /// The requested provider is not registered for its family.
    ProviderNotImplemented = 40_000_002,
    /// A sequence counter ran past its maximum.
    SequenceOutOfRange = 40_001_001,
    /// The tick source moved backwards.
    TimestampRewind = 40_001_002,
    /// The tick source did not advance within the configured spin budget.
    TickStalled = 40_001_003,
    /// Storage produced a range whose low bound is above its high bound.
    SegmentRangeFailed = 40_002_001,
    /// Segment storage could not be queried or updated.
    SegmentQueryFailed = 40_002_002,
    /// Internal server error.
    Internal = 99_999_998,
    /// Unexpected server error.
    Unknown = 99_999_999,
}

impl ErrorCode {
    /// Returns the raw numeric code.
    pub const fn as_u32(self) -> u32 {
        self as u32
    }

    /// Returns the short human-readable description of this code.
    pub const fn message(self) -> &'static str {
        match self {
            Self::RequestParam => "Request Param Error",
            Self::InitFailed => "Server Startup Failed",
            Self::ProviderNotImplemented => "Provider Not Implement",
            Self::SequenceOutOfRange => "Sequence Out Of Range",
            Self::TimestampRewind => "Current Timestamp Less Than Last",
            Self::TickStalled => "Timestamp Did Not Advance",
            Self::SegmentRangeFailed => "Current Min Value Bigger Than Max Value",
            Self::SegmentQueryFailed => "Query Storage Error",
            Self::Internal => "Internal Server Error",
            Self::Unknown => "Server Unknown Error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u32())
    }
}

/// All error variants that `fyllo` can emit.
///
/// Construction-time variants ([`Error::Configuration`],
/// [`Error::ProviderNotImplemented`], [`Error::Coordination`]) are fatal and
/// abort startup. Generation-time variants fail a single request and leave the
/// engine usable.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The caller supplied an invalid request parameter.
    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// Provider arguments were missing, malformed, or out of bounds.
    #[error("invalid configuration: {reason}")]
    Configuration { reason: String },

    /// No provider with this name is registered for the family.
    #[error("{family} provider `{name}` is not implemented, available: {available}")]
    ProviderNotImplemented {
        family: &'static str,
        name: String,
        available: String,
    },

    /// The sequence counter is outside `[0, max)`.
    ///
    /// Sequencers wait for the next tick instead of overflowing, so this only
    /// surfaces if that invariant is broken.
    #[error("sequence {sequence} should be in range [0, {max})")]
    SequenceExhausted { sequence: u64, max: u64 },

    /// The observed tick is behind the last tick handed out.
    #[error("current timestamp [{now}] less than last timestamp [{last}]")]
    ClockRewind { now: u64, last: u64 },

    /// The tick source did not move past `since` within the spin budget.
    #[error("timestamp did not advance past [{since}] within {budget_ms}ms")]
    TickStalled { since: u64, budget_ms: u64 },

    /// Storage handed back an empty range.
    #[error("min [{low}] bigger than max [{high}], tag [{tag}]")]
    InvalidRange { tag: String, low: u64, high: u64 },

    /// The segment tag does not exist in storage.
    #[error("segment tag [{tag}] doesn't exist")]
    UnknownTag { tag: String },

    /// Segment storage could not complete the operation.
    #[error("storage failure: {context}")]
    Storage {
        context: String,
        #[source]
        source: Option<BoxError>,
    },

    /// The coordination store used for machine-id election failed.
    #[error("coordination failure: {context}")]
    Coordination {
        context: String,
        #[source]
        source: Option<BoxError>,
    },
}

impl Error {
    /// Returns the stable numeric code for this error.
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidRequest { .. } => ErrorCode::RequestParam,
            Self::Configuration { .. } | Self::Coordination { .. } => ErrorCode::InitFailed,
            Self::ProviderNotImplemented { .. } => ErrorCode::ProviderNotImplemented,
            Self::SequenceExhausted { .. } => ErrorCode::SequenceOutOfRange,
            Self::ClockRewind { .. } => ErrorCode::TimestampRewind,
            Self::TickStalled { .. } => ErrorCode::TickStalled,
            Self::InvalidRange { .. } => ErrorCode::SegmentRangeFailed,
            Self::UnknownTag { .. } | Self::Storage { .. } => ErrorCode::SegmentQueryFailed,
        }
    }

    pub(crate) fn config(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    pub(crate) fn storage(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Storage {
            context: context.into(),
            source: Some(source.into()),
        }
    }

    pub(crate) fn coordination(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Coordination {
            context: context.into(),
            source: Some(source.into()),
        }
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Self::storage("query failed", err)
    }
}

#[cfg(feature = "etcd")]
impl From<etcd_client::Error> for Error {
    fn from(err: etcd_client::Error) -> Self {
        Self::coordination("etcd request failed", err)
    }
}
