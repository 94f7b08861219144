use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::duration::IsoDuration;

/// How a data source's freshness ("max time") is determined
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "lowercase")]
pub enum RefreshRule {
    /// Data is always current; freshness is the wall clock at read time
    Realtime,
    /// Data is frozen at a configured instant
    Fixed { time: DateTime<Utc> },
    /// Freshness is checked against the source every `refresh`
    Query {
        #[serde(default = "RefreshRule::default_refresh")]
        refresh: IsoDuration,
    },
}

impl RefreshRule {
    pub fn default_refresh() -> IsoDuration {
        IsoDuration::minutes(1)
    }

    pub fn query() -> Self {
        RefreshRule::Query {
            refresh: Self::default_refresh(),
        }
    }

    pub fn fixed(time: DateTime<Utc>) -> Self {
        RefreshRule::Fixed { time }
    }

    pub fn is_query(&self) -> bool {
        matches!(self, RefreshRule::Query { .. })
    }

    /// Whether a max time check is due at `now`.
    ///
    /// Only the query rule ever checks: when nothing has been checked yet, or
    /// when the last check is at least one refresh interval old.
    pub fn should_query(&self, max_time: Option<&MaxTime>, now: DateTime<Utc>) -> bool {
        match self {
            RefreshRule::Realtime | RefreshRule::Fixed { .. } => false,
            RefreshRule::Query { refresh } => match max_time {
                None => true,
                Some(max_time) => now - max_time.updated >= refresh.as_duration(),
            },
        }
    }
}

impl Default for RefreshRule {
    fn default() -> Self {
        RefreshRule::query()
    }
}

/// Latest data timestamp observed by a freshness check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaxTime {
    /// The maximum value of the time attribute
    pub time: DateTime<Utc>,
    /// When the check that observed it ran
    pub updated: DateTime<Utc>,
}

impl MaxTime {
    pub fn new(time: DateTime<Utc>, updated: DateTime<Utc>) -> Self {
        Self { time, updated }
    }
}
