//! The `DataSource` collaborator — raw external data fetches.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Transport-level failure of a single fetch.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("data source request failed: {0}")]
pub struct DataSourceError(pub String);

/// A query against a data source: a resource name plus ordered parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceQuery {
    pub resource: String,
    pub params: Vec<(String, String)>,
}

impl SourceQuery {
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            params: Vec::new(),
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    /// Value of the first parameter named `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Status code and payload of a completed fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceResponse {
    pub status: u16,
    pub payload: Value,
}

impl SourceResponse {
    pub const OK: u16 = 200;

    pub fn is_success(&self) -> bool {
        self.status == Self::OK
    }
}

#[async_trait]
pub trait DataSource: Send + Sync {
    async fn fetch(&self, query: &SourceQuery) -> Result<SourceResponse, DataSourceError>;
}
