use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::data_source::DataSource;
use crate::error::{DataSourceError, Result};
use crate::traits::Introspector;
use crate::types::EngineKind;

/// Dispatches introspection to the introspector registered for each engine
#[derive(Clone, Default)]
pub struct EngineRouter {
    introspectors: HashMap<EngineKind, Arc<dyn Introspector>>,
}

impl EngineRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the introspector for an engine
    pub fn register(&mut self, engine: EngineKind, introspector: Arc<dyn Introspector>) {
        if self.introspectors.contains_key(&engine) {
            warn!("Overwriting existing introspector for engine: {}", engine);
        }
        self.introspectors.insert(engine, introspector);
        debug!("Registered introspector for engine: {}", engine);
    }

    pub fn with_engine(mut self, engine: EngineKind, introspector: Arc<dyn Introspector>) -> Self {
        self.register(engine, introspector);
        self
    }

    pub fn has_engine(&self, engine: EngineKind) -> bool {
        self.introspectors.contains_key(&engine)
    }

    fn introspector_for(&self, data_source: &DataSource) -> Result<&Arc<dyn Introspector>> {
        self.introspectors.get(&data_source.engine).ok_or_else(|| {
            DataSourceError::configuration(format!(
                "Invalid engine: '{}' in '{}'",
                data_source.engine, data_source.name
            ))
        })
    }
}

#[async_trait]
impl Introspector for EngineRouter {
    fn validate(&self, data_source: &DataSource) -> Result<()> {
        self.introspector_for(data_source)?.validate(data_source)
    }

    async fn introspect(&self, data_source: DataSource) -> Result<DataSource> {
        let introspector = self.introspector_for(&data_source)?.clone();
        introspector.validate(&data_source)?;
        introspector.introspect(data_source).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RetitleIntrospector;

    #[async_trait]
    impl Introspector for RetitleIntrospector {
        fn validate(&self, data_source: &DataSource) -> Result<()> {
            if data_source.source.is_empty() {
                return Err(DataSourceError::configuration("empty source"));
            }
            Ok(())
        }

        async fn introspect(&self, data_source: DataSource) -> Result<DataSource> {
            Ok(data_source.with_title("introspected"))
        }
    }

    #[tokio::test]
    async fn test_dispatches_by_engine() {
        let router = EngineRouter::new().with_engine(EngineKind::Native, Arc::new(RetitleIntrospector));
        assert!(router.has_engine(EngineKind::Native));

        let ds = DataSource::new("wiki", EngineKind::Native, "wiki.json");
        let out = router.introspect(ds).await.unwrap();
        assert_eq!(out.title, "introspected");
    }

    #[tokio::test]
    async fn test_unregistered_engine_is_configuration_error() {
        let router = EngineRouter::new().with_engine(EngineKind::Native, Arc::new(RetitleIntrospector));
        let ds = DataSource::new("wiki", EngineKind::Druid, "wiki");

        assert!(router.validate(&ds).unwrap_err().is_fatal());
        let err = router.introspect(ds).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid configuration: Invalid engine: 'druid' in 'wiki'"
        );
    }

    #[tokio::test]
    async fn test_validation_runs_before_introspection() {
        let router = EngineRouter::new().with_engine(EngineKind::Native, Arc::new(RetitleIntrospector));
        let ds = DataSource::new("wiki", EngineKind::Native, "");
        assert!(router.introspect(ds).await.unwrap_err().is_fatal());
    }
}
