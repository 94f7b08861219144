use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use temps_datasource::{
    AttributeInfo, DataSource, DataSourceError, EngineKind, Executor, Introspector, Result,
};
use tracing::debug;

use crate::dataset::{Dataset, FileFormat};

/// Column used as the time attribute when a file source does not name one
pub const DEFAULT_TIME_COLUMN: &str = "time";

/// Executor answering queries from rows held in memory
pub struct InMemoryExecutor {
    dataset: Dataset,
}

impl InMemoryExecutor {
    pub fn new(dataset: Dataset) -> Self {
        Self { dataset }
    }
}

#[async_trait]
impl Executor for InMemoryExecutor {
    fn engine(&self) -> EngineKind {
        EngineKind::Native
    }

    fn attributes(&self) -> &[AttributeInfo] {
        self.dataset.attributes()
    }

    async fn max_time(&self, time_attribute: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self.dataset.max_time(time_attribute))
    }
}

/// Loads file-backed sources from a local directory
#[derive(Debug, Clone)]
pub struct NativeIntrospector {
    file_directory: Option<PathBuf>,
}

impl NativeIntrospector {
    pub fn new(file_directory: impl Into<PathBuf>) -> Self {
        Self {
            file_directory: Some(file_directory.into()),
        }
    }

    /// An introspector that only accepts absolute source paths
    pub fn without_directory() -> Self {
        Self {
            file_directory: None,
        }
    }

    /// Where the source's file lives
    pub fn resolve(&self, source: &str) -> Result<PathBuf> {
        let path = Path::new(source);
        if path.is_absolute() {
            return Ok(path.to_path_buf());
        }
        match &self.file_directory {
            Some(directory) => Ok(directory.join(path)),
            None => Err(DataSourceError::configuration("Must have a file directory")),
        }
    }

    /// Read, decode and filter the source's file
    pub async fn load(&self, data_source: &DataSource) -> Result<Dataset> {
        let path = self.resolve(&data_source.source)?;
        let format = FileFormat::from_path(&path).ok_or_else(|| unsupported_format(&path))?;

        let contents = tokio::fs::read_to_string(&path).await.map_err(|e| {
            DataSourceError::introspection(
                &data_source.name,
                format!("could not read '{}': {}", path.display(), e),
            )
        })?;

        let origin = path.display().to_string();
        let dataset = Dataset::parse(&origin, &contents, format)
            .map_err(|e| DataSourceError::introspection(&data_source.name, e))?;
        debug!("Loaded {} rows from '{}'", dataset.len(), origin);

        match &data_source.subset_filter {
            Some(filter) => dataset.filtered(filter),
            None => Ok(dataset),
        }
    }
}

fn unsupported_format(path: &Path) -> DataSourceError {
    DataSourceError::configuration(format!(
        "unsupported file format: '{}' (expected .json, .jsonl or .ndjson)",
        path.display()
    ))
}

#[async_trait]
impl Introspector for NativeIntrospector {
    fn validate(&self, data_source: &DataSource) -> Result<()> {
        if data_source.engine != EngineKind::Native {
            return Err(DataSourceError::configuration(format!(
                "Invalid engine: '{}' in '{}'",
                data_source.engine, data_source.name
            )));
        }

        let path = self.resolve(&data_source.source)?;
        if FileFormat::from_path(&path).is_none() {
            return Err(unsupported_format(&path));
        }

        if let Some(filter) = &data_source.subset_filter {
            if !filter.is_object() {
                return Err(DataSourceError::configuration(format!(
                    "subset filter of '{}' must be a JSON object",
                    data_source.name
                )));
            }
        }
        Ok(())
    }

    async fn introspect(&self, data_source: DataSource) -> Result<DataSource> {
        // File contents never change under a loaded source
        if data_source.is_queryable() {
            return Ok(data_source);
        }
        self.validate(&data_source)?;

        let mut dataset = self.load(&data_source).await?;

        let mut data_source = data_source;
        if data_source.time_attribute.is_none() && dataset.has_attribute(DEFAULT_TIME_COLUMN) {
            data_source = data_source.with_time_attribute(DEFAULT_TIME_COLUMN);
        }
        if let Some(time_column) = &data_source.time_attribute {
            dataset = dataset.with_time_column(time_column);
        }

        let attributes = dataset.attributes().to_vec();
        Ok(data_source
            .add_attributes(attributes)
            .attach_executor(Arc::new(InMemoryExecutor::new(dataset))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use temps_datasource::{FieldType, IntrospectionPolicy};

    const WIKI: &str = r##"[
        {"time": "2023-12-31T22:00:00Z", "channel": "#en.wikipedia", "added": 10},
        {"time": "2024-01-01T00:00:00Z", "channel": "#fr.wikipedia", "added": 3}
    ]"##;

    fn fixture() -> (tempfile::TempDir, NativeIntrospector) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("wiki.json"), WIKI).unwrap();
        let introspector = NativeIntrospector::new(dir.path());
        (dir, introspector)
    }

    #[tokio::test]
    async fn test_introspect_attaches_executor() {
        let (_dir, introspector) = fixture();
        let wiki = DataSource::new("wiki", EngineKind::Native, "wiki.json");

        let loaded = introspector.introspect(wiki).await.unwrap();
        assert!(loaded.is_queryable());
        assert_eq!(loaded.time_attribute.as_deref(), Some("time"));
        assert_eq!(loaded.introspection, IntrospectionPolicy::NoAutofill);
        assert!(loaded
            .attributes
            .contains(&AttributeInfo::new("time", FieldType::Timestamp)));

        let max_time = loaded.executor().unwrap().max_time("time").await.unwrap();
        assert_eq!(max_time, Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()));
    }

    #[tokio::test]
    async fn test_configured_attributes_win() {
        let (_dir, introspector) = fixture();
        let wiki = DataSource::new("wiki", EngineKind::Native, "wiki.json")
            .with_attributes(vec![AttributeInfo::new("added", FieldType::Float64)]);

        let loaded = introspector.introspect(wiki).await.unwrap();
        let added: Vec<_> = loaded.attributes.iter().filter(|a| a.name == "added").collect();
        assert_eq!(added, vec![&AttributeInfo::new("added", FieldType::Float64)]);
        assert_eq!(loaded.attributes.len(), 3);
    }

    #[tokio::test]
    async fn test_loaded_source_is_returned_unchanged() {
        let (dir, introspector) = fixture();
        let loaded = introspector
            .introspect(DataSource::new("wiki", EngineKind::Native, "wiki.json"))
            .await
            .unwrap();

        std::fs::remove_file(dir.path().join("wiki.json")).unwrap();
        let again = introspector.introspect(loaded.clone()).await.unwrap();
        assert_eq!(again, loaded);
        assert!(again.is_queryable());
    }

    #[tokio::test]
    async fn test_subset_filter_restricts_rows() {
        let (_dir, introspector) = fixture();
        let wiki = DataSource::new("wiki", EngineKind::Native, "wiki.json")
            .with_subset_filter(json!({"channel": "#en.wikipedia"}));

        let loaded = introspector.introspect(wiki).await.unwrap();
        let max_time = loaded.executor().unwrap().max_time("time").await.unwrap();
        assert_eq!(max_time, Some(Utc.with_ymd_and_hms(2023, 12, 31, 22, 0, 0).unwrap()));
    }

    #[tokio::test]
    async fn test_missing_file_is_introspection_error() {
        let (_dir, introspector) = fixture();
        let err = introspector
            .introspect(DataSource::new("gone", EngineKind::Native, "gone.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, DataSourceError::Introspection { ref name, .. } if name == "gone"));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_malformed_file_names_path() {
        let (dir, introspector) = fixture();
        std::fs::write(dir.path().join("bad.json"), "[{").unwrap();

        let err = introspector
            .introspect(DataSource::new("bad", EngineKind::Native, "bad.json"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("could not parse"));
        assert!(err.to_string().contains("bad.json"));
    }

    #[test]
    fn test_validate() {
        let relative = DataSource::new("wiki", EngineKind::Native, "wiki.json");
        let err = NativeIntrospector::without_directory().validate(&relative).unwrap_err();
        assert_eq!(err.to_string(), "Invalid configuration: Must have a file directory");

        let introspector = NativeIntrospector::new("/data");
        assert!(introspector.validate(&relative).is_ok());
        assert!(introspector
            .validate(&DataSource::new("wiki", EngineKind::Native, "wiki.csv"))
            .is_err());
        assert!(introspector
            .validate(&DataSource::new("wiki", EngineKind::Druid, "wiki"))
            .is_err());
        assert!(introspector
            .validate(&relative.clone().with_subset_filter(json!("channel = 'en'")))
            .is_err());
    }
}
