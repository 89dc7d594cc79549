//! Unix timestamps bounding an authorization's validity window.

use std::fmt::{Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::PaymentHeaderError;

/// Seconds since the Unix epoch.
///
/// Serialized as a stringified integer, as ERC-3009 fields travel in JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UnixTimestamp(u64);

impl UnixTimestamp {
    /// Creates a timestamp from raw seconds.
    #[must_use]
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    /// The current system time.
    ///
    /// # Errors
    ///
    /// Returns [`PaymentHeaderError::Clock`] if the system clock reads
    /// earlier than the Unix epoch.
    pub fn now() -> Result<Self, PaymentHeaderError> {
        Self::try_from(SystemTime::now())
    }

    /// Raw seconds since the epoch.
    #[must_use]
    pub const fn as_secs(self) -> u64 {
        self.0
    }

    /// `secs` earlier, clamped at the epoch.
    #[must_use]
    pub const fn saturating_sub(self, secs: u64) -> Self {
        Self(self.0.saturating_sub(secs))
    }

    /// `secs` later, clamped at `u64::MAX`.
    #[must_use]
    pub const fn saturating_add(self, secs: u64) -> Self {
        Self(self.0.saturating_add(secs))
    }
}

impl TryFrom<SystemTime> for UnixTimestamp {
    type Error = PaymentHeaderError;

    fn try_from(time: SystemTime) -> Result<Self, Self::Error> {
        time.duration_since(UNIX_EPOCH)
            .map(|elapsed| Self(elapsed.as_secs()))
            .map_err(|e| PaymentHeaderError::Clock(e.duration()))
    }
}

impl Display for UnixTimestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for UnixTimestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for UnixTimestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse::<u64>()
            .map(Self)
            .map_err(|_| serde::de::Error::custom("timestamp must be a non-negative integer"))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn clock_before_epoch_is_an_error() {
        let err = UnixTimestamp::try_from(UNIX_EPOCH - Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, PaymentHeaderError::Clock(d) if d == Duration::from_secs(5)));

        let ts = UnixTimestamp::try_from(UNIX_EPOCH + Duration::from_secs(1_700_000_000)).unwrap();
        assert_eq!(ts.as_secs(), 1_700_000_000);
        assert!(UnixTimestamp::now().unwrap() > ts);
    }

    #[test]
    fn window_arithmetic_saturates() {
        assert_eq!(UnixTimestamp::from_secs(5).saturating_sub(600).as_secs(), 0);
        assert_eq!(UnixTimestamp::from_secs(u64::MAX).saturating_add(1).as_secs(), u64::MAX);
    }

    #[test]
    fn travels_as_decimal_string() {
        let ts = UnixTimestamp::from_secs(1_699_999_999);
        assert_eq!(serde_json::to_value(ts).unwrap(), "1699999999");
        let back: UnixTimestamp = serde_json::from_str("\"1699999999\"").unwrap();
        assert_eq!(back, ts);
        assert!(serde_json::from_str::<UnixTimestamp>("\"-1\"").is_err());
    }
}
