//! Logical clock: normalizes heterogeneous timestamp representations.
//!
//! Remote documents carry server-assigned epoch milliseconds; snapshots written
//! by older clients carry ISO-8601 strings. `to_epoch_millis` collapses both
//! into one comparable value and treats anything absent or unparsable as `0`
//! ("oldest possible"), so a copy without a real timestamp always loses a
//! strict `>` comparison against one that has one.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// A logical timestamp as it appears in stored entities.
///
/// Untagged: an `i64` deserializes as epoch milliseconds, a string as an
/// ISO-8601 value. Unknown string formats are kept verbatim and normalize
/// to `0` at comparison time rather than failing deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Stamp {
    /// Unix epoch milliseconds (the server-assigned representation)
    Millis(i64),
    /// ISO-8601 date or datetime string (legacy local representation)
    Text(String),
}

impl Stamp {
    /// Current wall-clock time as epoch milliseconds.
    #[must_use]
    pub fn now() -> Self {
        Self::Millis(Utc::now().timestamp_millis())
    }

    /// Normalize to epoch milliseconds; `0` when unparsable.
    #[must_use]
    pub fn epoch_millis(&self) -> i64 {
        match self {
            Self::Millis(millis) => *millis,
            Self::Text(text) => parse_text_millis(text).unwrap_or(0),
        }
    }
}

/// Normalize a possibly-missing timestamp to epoch milliseconds.
///
/// Never fails: `None` and unparsable values map to `0`, so they lose any
/// strict "newer than" comparison against a real timestamp while still
/// outranking nothing at all.
#[must_use]
pub fn to_epoch_millis(stamp: Option<&Stamp>) -> i64 {
    stamp.map_or(0, Stamp::epoch_millis)
}

fn parse_text_millis(text: &str) -> Option<i64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.timestamp_millis());
    }
    if let Ok(parsed) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(parsed.and_utc().timestamp_millis());
    }
    if let Ok(parsed) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(
            parsed
                .and_hms_opt(0, 0, 0)?
                .and_utc()
                .timestamp_millis(),
        );
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_stamp_is_oldest_possible() {
        assert_eq!(to_epoch_millis(None), 0);
    }

    #[test]
    fn unparsable_text_is_oldest_possible() {
        assert_eq!(to_epoch_millis(Some(&Stamp::Text("not a date".into()))), 0);
        assert_eq!(to_epoch_millis(Some(&Stamp::Text("   ".into()))), 0);
    }

    #[test]
    fn valid_iso_string_is_positive() {
        let stamp = Stamp::Text("2024-02-01T10:30:00Z".into());
        assert!(to_epoch_millis(Some(&stamp)) > 0);
    }

    #[test]
    fn date_only_string_parses() {
        let earlier = Stamp::Text("2024-01-01".into());
        let later = Stamp::Text("2024-02-01".into());
        assert!(to_epoch_millis(Some(&later)) > to_epoch_millis(Some(&earlier)));
    }

    #[test]
    fn millis_pass_through() {
        assert_eq!(to_epoch_millis(Some(&Stamp::Millis(1_700_000_000_000))), 1_700_000_000_000);
    }

    #[test]
    fn untagged_serde_roundtrip() {
        let millis: Stamp = serde_json::from_str("1700000000000").unwrap();
        assert_eq!(millis, Stamp::Millis(1_700_000_000_000));

        let text: Stamp = serde_json::from_str("\"2024-02-01\"").unwrap();
        assert_eq!(text, Stamp::Text("2024-02-01".into()));
    }

    #[test]
    fn now_is_newer_than_fixed_past() {
        let past = Stamp::Text("2020-01-01".into());
        assert!(Stamp::now().epoch_millis() > past.epoch_millis());
    }
}
