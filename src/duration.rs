//! Lease durations.
//!
//! Keys are issued for one of a fixed set of lease lengths. The canonical
//! persisted form is the number of days; the `{days}DAY` tag is what shows up
//! in key identifiers and history notes.
//!
//! Parsing is lenient about spelling because older clients send `"7DAY"`,
//! `"7"`, `7`, `"7d"` or `"7 days"` for the same lease.

use std::fmt;
use std::str::FromStr;

use chrono::Duration;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::{KeyError, KeyResult};

/// A supported lease length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LeaseDuration {
    OneDay,
    SevenDays,
    ThirtyDays,
    NinetyDays,
    OneYear,
}

impl LeaseDuration {
    /// Every supported lease, shortest first.
    pub const ALL: [LeaseDuration; 5] = [
        LeaseDuration::OneDay,
        LeaseDuration::SevenDays,
        LeaseDuration::ThirtyDays,
        LeaseDuration::NinetyDays,
        LeaseDuration::OneYear,
    ];

    /// Length of the lease in days.
    pub fn days(self) -> u32 {
        match self {
            LeaseDuration::OneDay => 1,
            LeaseDuration::SevenDays => 7,
            LeaseDuration::ThirtyDays => 30,
            LeaseDuration::NinetyDays => 90,
            LeaseDuration::OneYear => 365,
        }
    }

    /// Look up the lease for an exact day count.
    pub fn from_days(days: u64) -> KeyResult<Self> {
        Self::ALL
            .into_iter()
            .find(|d| u64::from(d.days()) == days)
            .ok_or_else(|| {
                KeyError::InvalidInput(format!(
                    "unsupported duration: {days} days (expected one of 1, 7, 30, 90, 365)"
                ))
            })
    }

    /// Tag used in key identifiers, e.g. `7DAY`.
    pub fn tag(self) -> String {
        format!("{}DAY", self.days())
    }

    /// The lease as a chrono duration.
    pub fn as_duration(self) -> Duration {
        Duration::days(i64::from(self.days()))
    }
}

impl fmt::Display for LeaseDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

impl FromStr for LeaseDuration {
    type Err = KeyError;

    fn from_str(s: &str) -> KeyResult<Self> {
        let upper = s.trim().to_ascii_uppercase();
        if upper.is_empty() {
            return Err(KeyError::InvalidInput("duration is required".to_string()));
        }

        let digits = ["DAYS", "DAY", "D"]
            .iter()
            .find_map(|suffix| upper.strip_suffix(suffix))
            .unwrap_or(&upper)
            .trim();

        let days: u64 = digits
            .parse()
            .map_err(|_| KeyError::InvalidInput(format!("unrecognized duration: '{}'", s.trim())))?;

        Self::from_days(days)
    }
}

impl Serialize for LeaseDuration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.days())
    }
}

impl<'de> Deserialize<'de> for LeaseDuration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Older documents stored the tag string instead of the day count.
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Days(u64),
            Text(String),
        }

        let parsed = match Raw::deserialize(deserializer)? {
            Raw::Days(days) => LeaseDuration::from_days(days),
            Raw::Text(text) => text.parse(),
        };
        parsed.map_err(de::Error::custom)
    }
}
