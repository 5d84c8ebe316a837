//! NOAA CO-OPS tide predictions.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, instrument};

use nodes::sailing::tide::TIDE_PREDICTIONS;
use nodes::{DataSource, DataSourceError, SourceQuery, SourceResponse};

use crate::ProviderError;

pub const DEFAULT_BASE_URL: &str = "https://api.tidesandcurrents.noaa.gov/api/prod/datagetter";

/// `DataSource` over the NOAA datagetter endpoint.
///
/// Query parameters are sent as given. A non-200 answer is returned as its
/// status with a `null` payload so the resolver can move to the next station.
#[derive(Debug, Clone)]
pub struct NoaaTides {
    client: Client,
    base_url: String,
}

impl NoaaTides {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl DataSource for NoaaTides {
    #[instrument(skip_all, fields(station = query.get("station").unwrap_or_default()))]
    async fn fetch(&self, query: &SourceQuery) -> Result<SourceResponse, DataSourceError> {
        if query.resource != TIDE_PREDICTIONS {
            return Err(DataSourceError(format!(
                "unsupported resource '{}'",
                query.resource
            )));
        }

        let response = self
            .client
            .get(&self.base_url)
            .query(&query.params)
            .send()
            .await
            .map_err(|e| DataSourceError(e.to_string()))?;

        let status = response.status().as_u16();
        if status != SourceResponse::OK {
            debug!(status, "tide request rejected");
            return Ok(SourceResponse {
                status,
                payload: Value::Null,
            });
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| DataSourceError(format!("invalid tide payload: {e}")))?;

        Ok(SourceResponse { status, payload })
    }
}
