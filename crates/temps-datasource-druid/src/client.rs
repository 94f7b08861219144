use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use temps_datasource::{DataSourceError, EngineKind, Result, SourceLister};
use tracing::debug;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(40);

const DATASOURCES_PATH: &str = "/druid/v2/datasources";
const QUERY_PATH: &str = "/druid/v2";

/// HTTP client for a Druid broker
#[derive(Debug, Clone)]
pub struct DruidClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl DruidClient {
    /// Create a client for the broker at `base_url` (e.g. `http://localhost:8082`)
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            DataSourceError::configuration(format!("Failed to create HTTP client: {}", e))
        })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// GET a JSON document relative to the broker root
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!("Druid request: GET {}", path);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        Self::read_json(response).await
    }

    /// POST a native query and decode the result
    pub async fn query<B: Serialize, T: DeserializeOwned>(&self, body: &B) -> Result<T> {
        let url = format!("{}{}", self.base_url, QUERY_PATH);
        debug!("Druid request: POST {}", QUERY_PATH);

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        Self::read_json(response).await
    }

    async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| DataSourceError::QueryFailed(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(DataSourceError::QueryFailed(format!(
                "Druid returned status {}: {}",
                status, body
            )));
        }

        serde_json::from_str(&body).map_err(|e| {
            DataSourceError::Serialization(format!(
                "Failed to parse response: {} - Body: {}",
                e, body
            ))
        })
    }

    fn transport_error(&self, e: reqwest::Error) -> DataSourceError {
        if e.is_timeout() {
            DataSourceError::QueryTimeout(self.timeout.as_millis() as u64)
        } else {
            DataSourceError::QueryFailed(format!("Druid request failed: {}", e))
        }
    }
}

#[async_trait]
impl SourceLister for DruidClient {
    fn engine(&self) -> EngineKind {
        EngineKind::Druid
    }

    async fn list_sources(&self) -> Result<Vec<String>> {
        let listed: Value = self
            .get_json(DATASOURCES_PATH)
            .await
            .map_err(|e| DataSourceError::discovery(e.to_string()))?;

        let Value::Array(items) = listed else {
            return Err(DataSourceError::discovery(format!(
                "invalid source list response: expected an array, got {}",
                listed
            )));
        };

        items
            .into_iter()
            .map(|item| match item {
                Value::String(name) => Ok(name),
                other => Err(DataSourceError::discovery(format!(
                    "invalid source name in list: {}",
                    other
                ))),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_list_sources() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/druid/v2/datasources"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!(["wikipedia", "koalas"])),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = DruidClient::new(format!("{}/", mock_server.uri())).unwrap();
        let sources = client.list_sources().await.unwrap();
        assert_eq!(sources, vec!["wikipedia", "koalas"]);
    }

    #[tokio::test]
    async fn test_list_sources_rejects_non_array() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/druid/v2/datasources"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"error": "nope"})),
            )
            .mount(&mock_server)
            .await;

        let client = DruidClient::new(mock_server.uri()).unwrap();
        let err = client.list_sources().await.unwrap_err();
        assert!(matches!(err, DataSourceError::Discovery(_)));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_list_sources_server_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/druid/v2/datasources"))
            .respond_with(ResponseTemplate::new(500).set_body_string("broker on fire"))
            .mount(&mock_server)
            .await;

        let client = DruidClient::new(mock_server.uri()).unwrap();
        let err = client.list_sources().await.unwrap_err();
        assert!(matches!(err, DataSourceError::Discovery(ref msg) if msg.contains("500")));
    }

    #[tokio::test]
    async fn test_timeout() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/druid/v2"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!([]))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&mock_server)
            .await;

        let client = DruidClient::with_timeout(mock_server.uri(), Duration::from_millis(50)).unwrap();
        let err = client
            .query::<_, Value>(&serde_json::json!({"queryType": "timeBoundary"}))
            .await
            .unwrap_err();
        assert!(matches!(err, DataSourceError::QueryTimeout(50)));
    }
}
