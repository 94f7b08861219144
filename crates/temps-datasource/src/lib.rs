//! # temps-datasource
//!
//! Keeps an authoritative, always-available list of data sources for the
//! analytics front end.
//!
//! Sources come from two places: static configuration and, optionally,
//! discovery against an analytics cluster that reports its table names.
//! Every source starts as a stub and becomes queryable once an engine has
//! introspected it and attached an executor. Sources with a `query` refresh
//! rule get their max time checked periodically.
//!
//! ## Architecture
//!
//! - **DataSource**: immutable snapshot of one source's configuration and runtime state
//! - **SourceRegistry**: name-keyed store of snapshots with whole-entry replacement
//! - **Introspector**: engine-specific step that turns a stub into a queryable source
//! - **SourceLister**: cluster discovery
//! - **Executor**: engine handle attached to queryable sources
//! - **DataSourceManager**: startup sequencing, the read API and the refresh loops
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use temps_datasource::{
//!     DataSourceManager, DataSourceManagerOptions, EngineRouter, SourcesConfig,
//! };
//!
//! # async fn example(router: EngineRouter) -> temps_datasource::Result<()> {
//! let config = SourcesConfig::load("sources.yaml").await?;
//!
//! let manager = DataSourceManager::start(
//!     DataSourceManagerOptions::new(Arc::new(router))
//!         .with_data_sources(config.data_sources()?)
//!         .with_settings(config.settings.clone()),
//! )?;
//!
//! for data_source in manager.get_queryable_data_sources().await {
//!     let updated = data_source.updated_text(chrono::Utc::now()).unwrap_or_default();
//!     println!("{} {}", data_source.name, updated);
//! }
//!
//! manager.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! Engine crates:
//! - `temps-datasource-native` - in-process JSON / NDJSON files
//! - `temps-datasource-druid` - Druid brokers over HTTP

pub mod config;
pub mod data_source;
pub mod discovery;
pub mod duration;
pub mod error;
pub mod freshness;
pub mod manager;
pub mod refresh_rule;
pub mod registry;
pub mod router;
pub mod settle;
pub mod traits;
pub mod types;

#[cfg(test)]
mod testing;

// Re-export commonly used items
pub use config::{ManagerSettings, SourceListScan, SourcesConfig};
pub use data_source::{DataSource, DataSourceConfig};
pub use discovery::{default_stub_factory, StubFactory};
pub use duration::IsoDuration;
pub use error::{DataSourceError, Result};
pub use freshness::{check_after_introspection, update_max_time, FreshnessTracker};
pub use manager::{DataSourceManager, DataSourceManagerOptions};
pub use refresh_rule::{MaxTime, RefreshRule};
pub use registry::{SourceRegistry, Upsert};
pub use router::EngineRouter;
pub use settle::{settle_all, SettleSummary, Settled};
pub use traits::{Executor, Introspector, SourceLister};
pub use types::{AttributeInfo, DataRow, EngineKind, FieldType, IntrospectionPolicy};
