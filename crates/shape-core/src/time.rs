//! Provider timestamp handling.
//!
//! Linode reports timestamps without a zone suffix (`2018-01-01T00:01:01`);
//! they are always UTC. These helpers accept that format as well as RFC 3339
//! and always emit the zone-less form the provider expects in filters.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serializer};

use crate::error::{CoreError, Result};

const PROVIDER_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Parse a provider timestamp.
///
/// # Errors
///
/// Returns `CoreError::InvalidTimestamp` when the value is in neither format.
pub fn parse(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, PROVIDER_FORMAT) {
        return Ok(naive.and_utc());
    }
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| CoreError::InvalidTimestamp(value.to_string()))
}

/// Format a timestamp the way the provider writes it.
#[must_use]
pub fn format(value: &DateTime<Utc>) -> String {
    value.format(PROVIDER_FORMAT).to_string()
}

/// Serde adapter for `DateTime<Utc>` fields.
pub mod provider {
    use super::{DateTime, Deserialize, Deserializer, Serializer, Utc};

    /// Serialize in the provider's zone-less format.
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    pub fn serialize<S: Serializer>(
        value: &DateTime<Utc>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format(value))
    }

    /// Deserialize from either the provider format or RFC 3339.
    ///
    /// # Errors
    ///
    /// Fails when the string is not a recognised timestamp.
    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Serde adapter for `Option<DateTime<Utc>>` fields.
pub mod provider_opt {
    use super::{DateTime, Deserialize, Deserializer, Serializer, Utc};

    /// Serialize an optional timestamp, `null` when absent.
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => serializer.serialize_str(&super::format(v)),
            None => serializer.serialize_none(),
        }
    }

    /// Deserialize an optional timestamp.
    ///
    /// # Errors
    ///
    /// Fails when a present string is not a recognised timestamp.
    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        raw.map(|s| super::parse(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_zoneless_provider_format() {
        let parsed = parse("2018-01-01T00:01:01").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2018, 1, 1, 0, 1, 1).unwrap());
    }

    #[test]
    fn parses_rfc3339() {
        let parsed = parse("2018-01-01T02:01:01+02:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2018, 1, 1, 0, 1, 1).unwrap());
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            parse("yesterday"),
            Err(CoreError::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn formats_without_zone() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 0).unwrap();
        assert_eq!(format(&ts), "2024-03-09T14:05:00");
    }
}
