use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use temps_datasource::{
    check_after_introspection, AttributeInfo, DataSource, DataSourceError, EngineKind, Executor,
    FieldType, IntrospectionPolicy, Introspector, Result,
};
use tracing::debug;

use crate::client::DruidClient;

/// Druid's own name for the row timestamp column
pub const DRUID_TIME_COLUMN: &str = "__time";

const OPTION_ATTRIBUTE_OVERRIDES: &str = "attributeOverrides";

#[derive(Debug, Deserialize)]
struct SegmentAnalysis {
    #[serde(default)]
    columns: BTreeMap<String, ColumnAnalysis>,
}

#[derive(Debug, Deserialize)]
struct ColumnAnalysis {
    #[serde(rename = "type")]
    column_type: String,
}

#[derive(Debug, Deserialize)]
struct DatasourceMetadata {
    #[serde(default)]
    dimensions: Vec<String>,
    #[serde(default)]
    metrics: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TimeBoundaryRow {
    result: TimeBoundaryResult,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TimeBoundaryResult {
    max_time: Option<DateTime<Utc>>,
}

/// Executor bound to one Druid datasource
pub struct DruidExecutor {
    client: Arc<DruidClient>,
    source: String,
    filter: Option<Value>,
    attributes: Vec<AttributeInfo>,
}

impl DruidExecutor {
    pub fn new(
        client: Arc<DruidClient>,
        source: impl Into<String>,
        filter: Option<Value>,
        attributes: Vec<AttributeInfo>,
    ) -> Self {
        Self {
            client,
            source: source.into(),
            filter,
            attributes,
        }
    }

    fn time_boundary_query(&self) -> Value {
        let mut query = json!({
            "queryType": "timeBoundary",
            "dataSource": self.source,
            "bound": "maxTime",
            "context": { "timeout": self.client.timeout().as_millis() as u64 },
        });
        if let (Some(filter), Value::Object(fields)) = (&self.filter, &mut query) {
            fields.insert("filter".to_string(), filter.clone());
        }
        query
    }
}

#[async_trait]
impl Executor for DruidExecutor {
    fn engine(&self) -> EngineKind {
        EngineKind::Druid
    }

    fn attributes(&self) -> &[AttributeInfo] {
        &self.attributes
    }

    /// Druid always bounds on its row timestamp, whatever the attribute is called
    async fn max_time(&self, _time_attribute: &str) -> Result<Option<DateTime<Utc>>> {
        let rows: Vec<TimeBoundaryRow> = self.client.query(&self.time_boundary_query()).await?;
        Ok(rows.into_iter().next().and_then(|row| row.result.max_time))
    }
}

/// Introspects Druid datasources through the broker
pub struct DruidIntrospector {
    client: Arc<DruidClient>,
    use_segment_metadata: bool,
}

impl DruidIntrospector {
    pub fn new(client: Arc<DruidClient>) -> Self {
        Self {
            client,
            use_segment_metadata: true,
        }
    }

    /// Read dimensions and metrics from the datasource endpoint instead of
    /// running a segment metadata query
    pub fn without_segment_metadata(mut self) -> Self {
        self.use_segment_metadata = false;
        self
    }

    async fn discover_attributes(&self, data_source: &DataSource) -> Result<Vec<AttributeInfo>> {
        let time_attribute = data_source
            .time_attribute
            .as_deref()
            .unwrap_or(temps_datasource::data_source::DEFAULT_CLUSTER_TIME_ATTRIBUTE);

        if self.use_segment_metadata {
            let query = json!({
                "queryType": "segmentMetadata",
                "dataSource": data_source.source,
                "merge": true,
                "analysisTypes": [],
                "lenientAggregatorMerge": true,
            });
            let analyses: Vec<SegmentAnalysis> = self.client.query(&query).await?;
            let analysis = analyses.into_iter().next().ok_or_else(|| {
                DataSourceError::QueryFailed(format!(
                    "no segments found for '{}'",
                    data_source.source
                ))
            })?;

            Ok(analysis
                .columns
                .iter()
                .map(|(column, info)| map_column(column, &info.column_type, time_attribute))
                .collect())
        } else {
            let metadata: DatasourceMetadata = self
                .client
                .get_json(&format!("/druid/v2/datasources/{}", data_source.source))
                .await?;

            let mut attributes = vec![AttributeInfo::new(time_attribute, FieldType::Timestamp)];
            attributes.extend(
                metadata
                    .dimensions
                    .into_iter()
                    .map(|d| AttributeInfo::new(d, FieldType::String)),
            );
            attributes.extend(
                metadata
                    .metrics
                    .into_iter()
                    .map(|m| AttributeInfo::new(m, FieldType::Float64)),
            );
            Ok(attributes)
        }
    }

    fn executor_for(&self, data_source: &DataSource) -> Arc<dyn Executor> {
        Arc::new(DruidExecutor::new(
            self.client.clone(),
            data_source.source.clone(),
            data_source.subset_filter.clone(),
            data_source.attributes.clone(),
        ))
    }
}

fn map_column(column: &str, column_type: &str, time_attribute: &str) -> AttributeInfo {
    if column == DRUID_TIME_COLUMN {
        return AttributeInfo::new(time_attribute, FieldType::Timestamp);
    }

    let field_type = match column_type {
        "STRING" => FieldType::String,
        "LONG" => FieldType::Int64,
        "FLOAT" | "DOUBLE" => FieldType::Float64,
        _ => FieldType::Json,
    };
    AttributeInfo::new(column, field_type)
}

/// Apply `options.attributeOverrides` (`[{"name": .., "type": ..}]`) on top of
/// the discovered attributes
fn apply_overrides(
    mut attributes: Vec<AttributeInfo>,
    options: &Map<String, Value>,
) -> Result<Vec<AttributeInfo>> {
    let Some(overrides) = options.get(OPTION_ATTRIBUTE_OVERRIDES) else {
        return Ok(attributes);
    };
    let overrides: Vec<AttributeInfo> = serde_json::from_value(overrides.clone())
        .map_err(|e| DataSourceError::configuration(format!("invalid attributeOverrides: {}", e)))?;

    for attribute in overrides {
        match attributes.iter_mut().find(|a| a.name == attribute.name) {
            Some(existing) => existing.field_type = attribute.field_type,
            None => attributes.push(attribute),
        }
    }
    Ok(attributes)
}

#[async_trait]
impl Introspector for DruidIntrospector {
    fn validate(&self, data_source: &DataSource) -> Result<()> {
        if data_source.engine != EngineKind::Druid {
            return Err(DataSourceError::configuration(format!(
                "Invalid engine: '{}' in '{}'",
                data_source.engine, data_source.name
            )));
        }
        if let Some(overrides) = data_source.options.get(OPTION_ATTRIBUTE_OVERRIDES) {
            serde_json::from_value::<Vec<AttributeInfo>>(overrides.clone()).map_err(|e| {
                DataSourceError::configuration(format!(
                    "invalid attributeOverrides in '{}': {}",
                    data_source.name, e
                ))
            })?;
        }
        Ok(())
    }

    async fn introspect(&self, data_source: DataSource) -> Result<DataSource> {
        let introspected = if data_source.introspection == IntrospectionPolicy::None {
            if data_source.is_queryable() {
                return Ok(data_source);
            }
            let executor = self.executor_for(&data_source);
            data_source.attach_executor(executor)
        } else {
            let discovered = self
                .discover_attributes(&data_source)
                .await
                .and_then(|attributes| apply_overrides(attributes, &data_source.options))
                .map_err(|e| match e {
                    DataSourceError::Configuration(_) => e,
                    other => DataSourceError::introspection(&data_source.name, other),
                })?;
            debug!(
                "Discovered {} attributes for '{}'",
                discovered.len(),
                data_source.name
            );

            let data_source = data_source.add_attributes(discovered);
            let executor = self.executor_for(&data_source);
            data_source.attach_executor(executor)
        };

        Ok(check_after_introspection(introspected).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mock_segment_metadata(mock_server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/druid/v2"))
            .and(body_partial_json(json!({"queryType": "segmentMetadata"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "id": "merged",
                "columns": {
                    "__time": {"type": "LONG"},
                    "channel": {"type": "STRING"},
                    "added": {"type": "LONG"},
                    "delta": {"type": "DOUBLE"},
                    "unique_users": {"type": "hyperUnique"}
                }
            }])))
            .mount(mock_server)
            .await;
    }

    async fn mock_time_boundary(mock_server: &MockServer, max_time: &str) {
        Mock::given(method("POST"))
            .and(path("/druid/v2"))
            .and(body_partial_json(json!({"queryType": "timeBoundary"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "timestamp": max_time,
                "result": {"maxTime": max_time}
            }])))
            .mount(mock_server)
            .await;
    }

    fn introspector(mock_server: &MockServer) -> DruidIntrospector {
        DruidIntrospector::new(Arc::new(DruidClient::new(mock_server.uri()).unwrap()))
    }

    fn type_of(data_source: &DataSource, name: &str) -> Option<FieldType> {
        data_source
            .attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.field_type)
    }

    #[tokio::test]
    async fn test_introspect_with_segment_metadata() {
        let mock_server = MockServer::start().await;
        mock_segment_metadata(&mock_server).await;
        mock_time_boundary(&mock_server, "2024-01-01T00:00:00.000Z").await;

        let wiki = DataSource::new("wiki", EngineKind::Druid, "wikipedia");
        let wiki = introspector(&mock_server).introspect(wiki).await.unwrap();

        assert!(wiki.is_queryable());
        assert_eq!(wiki.introspection, IntrospectionPolicy::NoAutofill);
        assert_eq!(type_of(&wiki, "time"), Some(FieldType::Timestamp));
        assert_eq!(type_of(&wiki, "__time"), None);
        assert_eq!(type_of(&wiki, "channel"), Some(FieldType::String));
        assert_eq!(type_of(&wiki, "added"), Some(FieldType::Int64));
        assert_eq!(type_of(&wiki, "delta"), Some(FieldType::Float64));
        assert_eq!(type_of(&wiki, "unique_users"), Some(FieldType::Json));

        // Checked right after introspection
        assert_eq!(
            wiki.max_time.map(|m| m.time),
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        );
    }

    #[tokio::test]
    async fn test_introspect_with_datasource_endpoint() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/druid/v2/datasources/wikipedia"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "dimensions": ["channel", "page"],
                "metrics": ["count", "added"]
            })))
            .expect(1)
            .mount(&mock_server)
            .await;
        mock_time_boundary(&mock_server, "2024-01-01T00:00:00.000Z").await;

        let wiki = DataSource::new("wiki", EngineKind::Druid, "wikipedia");
        let wiki = introspector(&mock_server)
            .without_segment_metadata()
            .introspect(wiki)
            .await
            .unwrap();

        assert_eq!(wiki.attributes.len(), 5);
        assert_eq!(type_of(&wiki, "time"), Some(FieldType::Timestamp));
        assert_eq!(type_of(&wiki, "page"), Some(FieldType::String));
        assert_eq!(type_of(&wiki, "count"), Some(FieldType::Float64));
    }

    #[tokio::test]
    async fn test_attribute_overrides() {
        let mock_server = MockServer::start().await;
        mock_segment_metadata(&mock_server).await;
        mock_time_boundary(&mock_server, "2024-01-01T00:00:00.000Z").await;

        let wiki = DataSource::new("wiki", EngineKind::Druid, "wikipedia").with_option(
            "attributeOverrides",
            json!([{"name": "added", "type": "float64"}, {"name": "is_new", "type": "boolean"}]),
        );
        let wiki = introspector(&mock_server).introspect(wiki).await.unwrap();

        assert_eq!(type_of(&wiki, "added"), Some(FieldType::Float64));
        assert_eq!(type_of(&wiki, "is_new"), Some(FieldType::Boolean));
    }

    #[tokio::test]
    async fn test_no_introspection_skips_metadata() {
        let mock_server = MockServer::start().await;
        mock_time_boundary(&mock_server, "2024-01-01T00:00:00.000Z").await;
        Mock::given(method("POST"))
            .and(path("/druid/v2"))
            .and(body_partial_json(json!({"queryType": "segmentMetadata"})))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&mock_server)
            .await;

        let declared = vec![AttributeInfo::new("time", FieldType::Timestamp)];
        let wiki = DataSource::new("wiki", EngineKind::Druid, "wikipedia")
            .with_introspection(IntrospectionPolicy::None)
            .with_attributes(declared.clone());

        let wiki = introspector(&mock_server).introspect(wiki).await.unwrap();
        assert!(wiki.is_queryable());
        assert_eq!(wiki.attributes, declared);
        assert_eq!(wiki.introspection, IntrospectionPolicy::None);
        assert_eq!(wiki.executor().unwrap().attributes(), declared.as_slice());
    }

    #[tokio::test]
    async fn test_metadata_failure_is_introspection_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/druid/v2"))
            .respond_with(ResponseTemplate::new(500).set_body_string("no broker"))
            .mount(&mock_server)
            .await;

        let err = introspector(&mock_server)
            .introspect(DataSource::new("wiki", EngineKind::Druid, "wikipedia"))
            .await
            .unwrap_err();
        assert!(matches!(err, DataSourceError::Introspection { ref name, .. } if name == "wiki"));
    }

    #[tokio::test]
    async fn test_failed_max_time_check_keeps_introspection() {
        let mock_server = MockServer::start().await;
        mock_segment_metadata(&mock_server).await;
        Mock::given(method("POST"))
            .and(path("/druid/v2"))
            .and(body_partial_json(json!({"queryType": "timeBoundary"})))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let wiki = introspector(&mock_server)
            .introspect(DataSource::new("wiki", EngineKind::Druid, "wikipedia"))
            .await
            .unwrap();
        assert!(wiki.is_queryable());
        assert!(wiki.max_time.is_none());
    }

    #[tokio::test]
    async fn test_time_boundary_carries_filter() {
        let mock_server = MockServer::start().await;
        let filter = json!({"type": "selector", "dimension": "channel", "value": "#en.wikipedia"});
        Mock::given(method("POST"))
            .and(path("/druid/v2"))
            .and(body_partial_json(json!({
                "queryType": "timeBoundary",
                "dataSource": "wikipedia",
                "filter": filter.clone(),
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&mock_server)
            .await;

        let executor = DruidExecutor::new(
            Arc::new(DruidClient::new(mock_server.uri()).unwrap()),
            "wikipedia",
            Some(filter),
            Vec::new(),
        );
        assert_eq!(executor.max_time("time").await.unwrap(), None);
    }

    #[test]
    fn test_validate() {
        let client = Arc::new(DruidClient::new("http://localhost:8082").unwrap());
        let introspector = DruidIntrospector::new(client);

        assert!(introspector
            .validate(&DataSource::new("wiki", EngineKind::Druid, "wikipedia"))
            .is_ok());
        assert!(introspector
            .validate(&DataSource::new("wiki", EngineKind::Native, "wiki.json"))
            .is_err());
        assert!(introspector
            .validate(
                &DataSource::new("wiki", EngineKind::Druid, "wikipedia")
                    .with_option("attributeOverrides", json!({"added": "float64"}))
            )
            .unwrap_err()
            .is_fatal());
    }
}
