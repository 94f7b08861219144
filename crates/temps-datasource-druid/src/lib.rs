//! Druid engine for temps-datasource
//!
//! Talks to a Druid broker over HTTP:
//! - source listing via `GET /druid/v2/datasources` (implements `SourceLister`)
//! - schema introspection via a `segmentMetadata` query, or the datasource
//!   metadata endpoint when segment metadata is disabled
//! - max time checks via a `timeBoundary` query
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use temps_datasource::{DataSourceManager, DataSourceManagerOptions, EngineKind, EngineRouter};
//! use temps_datasource_druid::{DruidClient, DruidIntrospector};
//!
//! # async fn example() -> temps_datasource::Result<()> {
//! let client = Arc::new(DruidClient::new("http://localhost:8082")?);
//! let router = EngineRouter::new()
//!     .with_engine(EngineKind::Druid, Arc::new(DruidIntrospector::new(client.clone())));
//!
//! let manager = DataSourceManager::start(
//!     DataSourceManagerOptions::new(Arc::new(router)).with_source_lister(client),
//! )?;
//! let sources = manager.get_queryable_data_sources().await;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod introspector;

pub use client::{DruidClient, DEFAULT_TIMEOUT};
pub use introspector::{DruidExecutor, DruidIntrospector, DRUID_TIME_COLUMN};
