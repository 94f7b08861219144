//! ISO 8601 durations (`P3D`, `PT1M`, `P1DT12H`) as used by refresh rules and
//! default time filters.

use chrono::Duration;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::DataSourceError;

/// A parsed ISO 8601 duration that remembers its textual form.
///
/// Calendar units are approximated (`Y` = 365 days, `M` = 30 days) since the
/// duration is only ever used as an elapsed-time threshold.
#[derive(Debug, Clone, Eq)]
pub struct IsoDuration {
    text: String,
    duration: Duration,
}

impl IsoDuration {
    pub fn as_duration(&self) -> Duration {
        self.duration
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn minutes(n: i64) -> Self {
        Self {
            text: format!("PT{}M", n),
            duration: Duration::minutes(n),
        }
    }

    pub fn days(n: i64) -> Self {
        Self {
            text: format!("P{}D", n),
            duration: Duration::days(n),
        }
    }
}

impl PartialEq for IsoDuration {
    fn eq(&self, other: &Self) -> bool {
        self.duration == other.duration
    }
}

impl fmt::Display for IsoDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl FromStr for IsoDuration {
    type Err = DataSourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DataSourceError::configuration(format!("invalid duration '{}'", s));

        let body = s.strip_prefix('P').ok_or_else(invalid)?;
        if body.is_empty() {
            return Err(invalid());
        }

        let mut total = Duration::zero();
        let mut in_time = false;
        let mut number = String::new();
        let mut saw_component = false;
        let mut saw_time_component = false;

        for c in body.chars() {
            match c {
                'T' => {
                    if in_time || !number.is_empty() {
                        return Err(invalid());
                    }
                    in_time = true;
                }
                '0'..='9' => number.push(c),
                unit => {
                    let n: i64 = number.parse().map_err(|_| invalid())?;
                    number.clear();
                    let part = match (in_time, unit) {
                        (false, 'Y') => n.checked_mul(365).and_then(Duration::try_days),
                        (false, 'M') => n.checked_mul(30).and_then(Duration::try_days),
                        (false, 'W') => Duration::try_weeks(n),
                        (false, 'D') => Duration::try_days(n),
                        (true, 'H') => Duration::try_hours(n),
                        (true, 'M') => Duration::try_minutes(n),
                        (true, 'S') => Duration::try_seconds(n),
                        _ => None,
                    };
                    total = part
                        .and_then(|part| total.checked_add(&part))
                        .ok_or_else(invalid)?;
                    saw_component = true;
                    saw_time_component |= in_time;
                }
            }
        }

        if !number.is_empty() || !saw_component || (in_time && !saw_time_component) {
            return Err(invalid());
        }

        Ok(Self {
            text: s.to_string(),
            duration: total,
        })
    }
}

impl Serialize for IsoDuration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.text)
    }
}

impl<'de> Deserialize<'de> for IsoDuration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}
