//! Claim timestamps.

use std::{
    fmt,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

/// Microseconds since the Unix epoch.
///
/// Claims for one permanode are ordered by `(Timestamp, claim id)`.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(u64);

/// Error when parsing a [`Timestamp`] from RFC 3339 text.
#[derive(Debug, thiserror::Error)]
pub enum ParseTimestampError {
    /// Not valid RFC 3339.
    #[error("invalid RFC 3339 timestamp: {0}")]
    Format(#[from] time::error::Parse),
    /// Before the Unix epoch or too far in the future.
    #[error("timestamp out of range")]
    OutOfRange,
}

impl Timestamp {
    /// The Unix epoch.
    pub const EPOCH: Timestamp = Timestamp(0);
    /// The largest representable instant.
    pub const MAX: Timestamp = Timestamp(u64::MAX);

    /// The current system time.
    pub fn now() -> Self {
        Self::from_system_time(SystemTime::now())
    }

    /// Create from microseconds since the epoch.
    pub const fn from_micros(micros: u64) -> Self {
        Self(micros)
    }

    /// Microseconds since the epoch.
    pub const fn as_micros(&self) -> u64 {
        self.0
    }

    /// Convert a [`SystemTime`]. Times before the epoch clamp to it.
    pub fn from_system_time(t: SystemTime) -> Self {
        let micros = t
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros())
            .unwrap_or(0);
        Self(u64::try_from(micros).unwrap_or(u64::MAX))
    }

    /// Convert to a [`SystemTime`].
    pub fn to_system_time(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_micros(self.0)
    }

    /// Parse RFC 3339 text such as `2011-04-01T12:00:00Z`.
    pub fn parse_rfc3339(s: &str) -> Result<Self, ParseTimestampError> {
        let dt = OffsetDateTime::parse(s, &Rfc3339)?;
        let nanos = dt.unix_timestamp_nanos();
        if nanos < 0 {
            return Err(ParseTimestampError::OutOfRange);
        }
        u64::try_from(nanos / 1000)
            .map(Self)
            .map_err(|_| ParseTimestampError::OutOfRange)
    }

    /// Format as RFC 3339 in UTC. Falls back to the raw micros if the
    /// instant is outside what the calendar can represent.
    pub fn to_rfc3339(&self) -> String {
        OffsetDateTime::from_unix_timestamp_nanos(self.0 as i128 * 1000)
            .ok()
            .and_then(|dt| dt.format(&Rfc3339).ok())
            .unwrap_or_else(|| self.0.to_string())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_rfc3339())
    }
}

impl From<SystemTime> for Timestamp {
    fn from(value: SystemTime) -> Self {
        Self::from_system_time(value)
    }
}

impl Serialize for Timestamp {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_rfc3339())
        } else {
            serializer.serialize_u64(self.0)
        }
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            // instants past the calendar range are written as raw micros
            if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
                return s.parse().map(Self).map_err(de::Error::custom);
            }
            Self::parse_rfc3339(&s).map_err(de::Error::custom)
        } else {
            u64::deserialize(deserializer).map(Self)
        }
    }
}
