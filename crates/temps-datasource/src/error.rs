use thiserror::Error;

/// Unified error type for data source management
#[derive(Error, Debug)]
pub enum DataSourceError {
    /// Invalid configuration (bad introspection value, missing engine parameter, ...)
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Listing sources from the backing cluster failed
    #[error("Could not get source list: {0}")]
    Discovery(String),

    /// Schema discovery or file decode failed for one source
    #[error("Failed to introspect data source '{name}': {cause}")]
    Introspection { name: String, cause: String },

    /// Freshness check failed for one source
    #[error("Failed to get max time for '{name}': {cause}")]
    MaxTimeCheck { name: String, cause: String },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Query timeout
    #[error("Query timeout after {0}ms")]
    QueryTimeout(u64),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl DataSourceError {
    /// Create an invalid configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        DataSourceError::Configuration(msg.into())
    }

    /// Create a discovery error
    pub fn discovery(msg: impl Into<String>) -> Self {
        DataSourceError::Discovery(msg.into())
    }

    /// Create an introspection error for the named source
    pub fn introspection(name: impl Into<String>, cause: impl ToString) -> Self {
        DataSourceError::Introspection {
            name: name.into(),
            cause: cause.to_string(),
        }
    }

    /// Create a max time check error for the named source
    pub fn max_time_check(name: impl Into<String>, cause: impl ToString) -> Self {
        DataSourceError::MaxTimeCheck {
            name: name.into(),
            cause: cause.to_string(),
        }
    }

    /// Only configuration errors are allowed to reach callers as hard failures
    pub fn is_fatal(&self) -> bool {
        matches!(self, DataSourceError::Configuration(_))
    }
}

impl From<serde_json::Error> for DataSourceError {
    fn from(e: serde_json::Error) -> Self {
        DataSourceError::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for DataSourceError {
    fn from(e: serde_yaml::Error) -> Self {
        DataSourceError::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DataSourceError>;
