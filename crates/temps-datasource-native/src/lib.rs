//! File-backed engine for temps-datasource
//!
//! Sources name a JSON (`.json`, an array of objects) or newline-delimited JSON
//! (`.jsonl` / `.ndjson`) file, resolved against a configured directory. On
//! introspection the whole file is decoded into memory, the optional subset
//! filter is applied, and column types are inferred from the values.
//!
//! ## Example
//!
//! ```rust,no_run
//! use temps_datasource::{DataSource, EngineKind, Introspector};
//! use temps_datasource_native::NativeIntrospector;
//!
//! # async fn example() -> temps_datasource::Result<()> {
//! let introspector = NativeIntrospector::new("/var/lib/temps/data");
//! let wiki = DataSource::new("wiki", EngineKind::Native, "wikiticker.json");
//!
//! introspector.validate(&wiki)?;
//! let wiki = introspector.introspect(wiki).await?;
//! assert!(wiki.is_queryable());
//! # Ok(())
//! # }
//! ```

pub mod dataset;
pub mod introspector;

pub use dataset::{Dataset, FileFormat};
pub use introspector::{InMemoryExecutor, NativeIntrospector, DEFAULT_TIME_COLUMN};
