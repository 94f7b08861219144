use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::data_source::DataSource;
use crate::error::Result;
use crate::types::{AttributeInfo, EngineKind};

/// Query handle bound to a backing engine.
///
/// Attached to a data source by a successful introspection; its presence is
/// what makes a source queryable.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Engine this handle talks to
    fn engine(&self) -> EngineKind;

    /// Attributes the handle was bound with
    fn attributes(&self) -> &[AttributeInfo];

    /// Maximum observed value of the given time attribute.
    /// `None` when the dataset is empty or the value cannot be read as a time.
    async fn max_time(&self, time_attribute: &str) -> Result<Option<DateTime<Utc>>>;
}

/// Engine-specific schema discovery
#[async_trait]
pub trait Introspector: Send + Sync {
    /// Synchronous configuration check for a source this introspector would handle.
    /// Errors are always `DataSourceError::Configuration`.
    fn validate(&self, _data_source: &DataSource) -> Result<()> {
        Ok(())
    }

    /// Discover the source's schema and return a new snapshot with an executor
    /// attached. Must not have side effects on any registry.
    async fn introspect(&self, data_source: DataSource) -> Result<DataSource>;
}

/// Lists the source identifiers a backing cluster knows about
#[async_trait]
pub trait SourceLister: Send + Sync {
    /// Engine the listed identifiers belong to
    fn engine(&self) -> EngineKind;

    /// Fails with `DataSourceError::Discovery` when the cluster is unreachable
    /// or answers with something that is not a list of names
    async fn list_sources(&self) -> Result<Vec<String>>;
}
