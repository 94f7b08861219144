//! The data source value object.
//!
//! A `DataSource` is an immutable snapshot: every change (attaching an executor,
//! narrowing the introspection policy, recording a new max time) produces a new
//! value that replaces the old one by name in the registry.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

use crate::duration::IsoDuration;
use crate::error::{DataSourceError, Result};
use crate::refresh_rule::{MaxTime, RefreshRule};
use crate::traits::Executor;
use crate::types::{AttributeInfo, EngineKind, IntrospectionPolicy};

pub const DEFAULT_TIMEZONE: &str = "Etc/UTC";
pub const DEFAULT_DURATION_DAYS: i64 = 3;
/// Time attribute assumed for cluster sources that do not name one
pub const DEFAULT_CLUSTER_TIME_ATTRIBUTE: &str = "time";

const OPTION_SKIP_INTROSPECTION: &str = "skipIntrospection";
const OPTION_DISABLE_AUTOFILL: &str = "disableAutofill";

/// Serializable form of a data source, as written in configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSourceConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub engine: String,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subset_filter: Option<Value>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub options: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub introspection: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_attribute: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_timezone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_rule: Option<RefreshRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_time: Option<MaxTime>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<AttributeInfo>,
}

impl DataSourceConfig {
    pub fn new(
        name: impl Into<String>,
        engine: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            title: None,
            engine: engine.into(),
            source: source.into(),
            subset_filter: None,
            options: Map::new(),
            introspection: None,
            time_attribute: None,
            default_timezone: None,
            default_duration: None,
            refresh_rule: None,
            max_time: None,
            attributes: Vec::new(),
        }
    }
}

/// A named binding between a logical dataset and a backing engine
#[derive(Clone)]
pub struct DataSource {
    pub name: String,
    pub title: String,
    pub engine: EngineKind,
    pub source: String,
    /// Engine-specific filter restricting the visible rows
    pub subset_filter: Option<Value>,
    pub options: Map<String, Value>,
    pub introspection: IntrospectionPolicy,
    pub time_attribute: Option<String>,
    pub default_timezone: String,
    pub default_duration: IsoDuration,
    pub refresh_rule: RefreshRule,
    pub max_time: Option<MaxTime>,
    pub attributes: Vec<AttributeInfo>,
    executor: Option<Arc<dyn Executor>>,
}

impl DataSource {
    pub fn new(name: impl Into<String>, engine: EngineKind, source: impl Into<String>) -> Self {
        let name = name.into();
        let time_attribute = match engine {
            EngineKind::Druid => Some(DEFAULT_CLUSTER_TIME_ATTRIBUTE.to_string()),
            EngineKind::Native => None,
        };

        Self {
            title: make_title(&name),
            name,
            engine,
            source: source.into(),
            subset_filter: None,
            options: Map::new(),
            introspection: IntrospectionPolicy::default(),
            time_attribute,
            default_timezone: DEFAULT_TIMEZONE.to_string(),
            default_duration: IsoDuration::days(DEFAULT_DURATION_DAYS),
            refresh_rule: RefreshRule::default(),
            max_time: None,
            attributes: Vec::new(),
            executor: None,
        }
    }

    /// Build a data source from its configuration form.
    ///
    /// Fails with `DataSourceError::Configuration` on an unknown engine, an
    /// invalid introspection value, or a malformed default duration.
    pub fn from_config(config: DataSourceConfig) -> Result<Self> {
        let DataSourceConfig {
            name,
            title,
            engine,
            source,
            subset_filter,
            mut options,
            introspection,
            time_attribute,
            default_timezone,
            default_duration,
            refresh_rule,
            max_time,
            attributes,
        } = config;

        if name.is_empty() {
            return Err(DataSourceError::configuration("data source must have a name"));
        }

        let engine: EngineKind = engine.parse()?;

        let mut introspection = introspection;
        for (option, implied) in [
            (OPTION_SKIP_INTROSPECTION, IntrospectionPolicy::None),
            (OPTION_DISABLE_AUTOFILL, IntrospectionPolicy::NoAutofill),
        ] {
            // Falsy values stay in the options untouched
            if options.get(option).is_some_and(is_truthy) {
                options.remove(option);
                introspection.get_or_insert_with(|| implied.to_string());
            }
        }
        let introspection = match introspection {
            Some(value) => value.parse()?,
            None => IntrospectionPolicy::default(),
        };

        let default_duration = match default_duration {
            Some(value) => value.parse()?,
            None => IsoDuration::days(DEFAULT_DURATION_DAYS),
        };

        let refresh_rule = refresh_rule.unwrap_or_default();
        let max_time = if refresh_rule.is_query() { max_time } else { None };

        let mut data_source = DataSource::new(name, engine, source);
        if let Some(title) = title {
            data_source.title = title;
        }
        if time_attribute.is_some() {
            data_source.time_attribute = time_attribute;
        }
        if let Some(timezone) = default_timezone {
            data_source.default_timezone = timezone;
        }
        data_source.subset_filter = subset_filter;
        data_source.options = options;
        data_source.introspection = introspection;
        data_source.default_duration = default_duration;
        data_source.refresh_rule = refresh_rule;
        data_source.max_time = max_time;
        data_source.attributes = attributes;

        Ok(data_source)
    }

    pub fn to_config(&self) -> DataSourceConfig {
        DataSourceConfig {
            name: self.name.clone(),
            title: Some(self.title.clone()),
            engine: self.engine.to_string(),
            source: self.source.clone(),
            subset_filter: self.subset_filter.clone(),
            options: self.options.clone(),
            introspection: Some(self.introspection.to_string()),
            time_attribute: self.time_attribute.clone(),
            default_timezone: Some(self.default_timezone.clone()),
            default_duration: Some(self.default_duration.to_string()),
            refresh_rule: Some(self.refresh_rule.clone()),
            max_time: self.max_time.clone(),
            attributes: self.attributes.clone(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_introspection(mut self, introspection: IntrospectionPolicy) -> Self {
        self.introspection = introspection;
        self
    }

    pub fn with_refresh_rule(mut self, refresh_rule: RefreshRule) -> Self {
        if !refresh_rule.is_query() {
            self.max_time = None;
        }
        self.refresh_rule = refresh_rule;
        self
    }

    pub fn with_time_attribute(mut self, time_attribute: impl Into<String>) -> Self {
        self.time_attribute = Some(time_attribute.into());
        self
    }

    pub fn with_subset_filter(mut self, filter: Value) -> Self {
        self.subset_filter = Some(filter);
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }

    /// Declare attributes up front, as configuration does
    pub fn with_attributes(mut self, attributes: Vec<AttributeInfo>) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn executor(&self) -> Option<&Arc<dyn Executor>> {
        self.executor.as_ref()
    }

    /// A source is queryable exactly when it has an executor
    pub fn is_queryable(&self) -> bool {
        self.executor.is_some()
    }

    /// Replace (never merge) the executor
    pub fn attach_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Record attributes discovered by introspection.
    ///
    /// With introspection `none` the configured schema is kept as is. Otherwise
    /// configured attributes win over discovered ones of the same name, new
    /// discovered attributes are appended, and any autofill policy narrows to
    /// `no-autofill`.
    pub fn add_attributes(mut self, discovered: Vec<AttributeInfo>) -> Self {
        if self.introspection == IntrospectionPolicy::None {
            return self;
        }

        for attribute in discovered {
            if !self.attributes.iter().any(|a| a.name == attribute.name) {
                self.attributes.push(attribute);
            }
        }
        self.introspection = self.introspection.narrowed();
        self
    }

    /// Record a freshly queried max time. Ignored unless the refresh rule is `query`.
    pub fn change_max_time(mut self, max_time: MaxTime) -> Self {
        if self.refresh_rule.is_query() {
            self.max_time = Some(max_time);
        }
        self
    }

    /// Due for a max time check: queryable, has a time attribute, and the
    /// refresh rule says so
    pub fn should_query_max_time(&self, now: DateTime<Utc>) -> bool {
        self.is_queryable()
            && self.time_attribute.is_some()
            && self.refresh_rule.should_query(self.max_time.as_ref(), now)
    }

    /// Latest data time as seen by clients
    pub fn max_time_date(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match &self.refresh_rule {
            RefreshRule::Realtime => Some(ceil_to(now, 60)),
            RefreshRule::Fixed { time } => Some(*time),
            RefreshRule::Query { .. } => self.max_time.as_ref().map(|m| ceil_to(m.time, 1)),
        }
    }

    /// Human readable freshness
    pub fn updated_text(&self, now: DateTime<Utc>) -> Option<String> {
        match &self.refresh_rule {
            RefreshRule::Realtime => Some("Updated: ~1 second ago".to_string()),
            RefreshRule::Fixed { time } => {
                Some(format!("Fixed to: {}", format_time_diff(now - *time)))
            }
            RefreshRule::Query { .. } => self
                .max_time
                .as_ref()
                .map(|m| format!("Updated: {} ago", format_time_diff(now - m.time))),
        }
    }

    /// Copy safe to hand to clients: no filter, no executor, no introspection
    pub fn to_client_data_source(&self) -> Self {
        let mut client = self.clone();
        client.subset_filter = None;
        client.introspection = IntrospectionPolicy::None;
        client.executor = None;
        client
    }
}

impl PartialEq for DataSource {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.title == other.title
            && self.engine == other.engine
            && self.source == other.source
            && self.subset_filter == other.subset_filter
            && self.options == other.options
            && self.introspection == other.introspection
            && self.time_attribute == other.time_attribute
            && self.default_timezone == other.default_timezone
            && self.default_duration == other.default_duration
            && self.refresh_rule == other.refresh_rule
    }
}

impl fmt::Debug for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataSource")
            .field("name", &self.name)
            .field("engine", &self.engine)
            .field("source", &self.source)
            .field("introspection", &self.introspection)
            .field("refresh_rule", &self.refresh_rule)
            .field("max_time", &self.max_time)
            .field("attributes", &self.attributes.len())
            .field("queryable", &self.is_queryable())
            .finish()
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[DataSource: {}]", self.name)
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// `wiki_edits` -> `Wiki Edits`
pub fn make_title(name: &str) -> String {
    name.split(|c| c == '_' || c == '-')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn format_time_diff(diff: Duration) -> String {
    let seconds = (diff.num_milliseconds().abs() as f64 / 1000.0).round() as i64;
    if seconds < 60 {
        return "less than 1 minute".to_string();
    }

    let minutes = seconds / 60;
    if minutes == 1 {
        return "1 minute".to_string();
    }
    if minutes < 60 {
        return format!("{} minutes", minutes);
    }

    let hours = minutes / 60;
    if hours == 1 {
        return "1 hour".to_string();
    }
    if hours <= 24 {
        return format!("{} hours", hours);
    }

    format!("{} days", hours / 24)
}

fn ceil_to(time: DateTime<Utc>, step_secs: i64) -> DateTime<Utc> {
    let secs = time.timestamp();
    let floored = secs.div_euclid(step_secs) * step_secs;
    if floored == secs && time.timestamp_subsec_nanos() == 0 {
        return time;
    }
    DateTime::from_timestamp(floored + step_secs, 0).unwrap_or(time)
}
