//! HTTP catalogue client

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::CatalogueClient;
use crate::descriptor::ComponentId;
use crate::error::{PackageError, Result};

/// Timeout for the liveness probe
const ALIVE_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout for descriptor requests
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Catalogue client speaking the catalogue REST API
pub struct HttpCatalogueClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCatalogueClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("son-package/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| PackageError::Catalogue {
                url: base_url.to_string(),
                source: Box::new(e),
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn request_error(&self, source: impl std::error::Error + Send + Sync + 'static) -> PackageError {
        PackageError::Catalogue {
            url: self.base_url.clone(),
            source: Box::new(source),
        }
    }
}

#[async_trait]
impl CatalogueClient for HttpCatalogueClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn alive(&self) -> bool {
        let response = self
            .client
            .get(format!("{}/", self.base_url))
            .timeout(ALIVE_TIMEOUT)
            .send()
            .await;

        match response {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!("Liveness probe to {} failed: {}", self.base_url, e);
                false
            }
        }
    }

    async fn get_function(&self, id: &ComponentId) -> Result<Option<Value>> {
        let url = format!("{}/vnfs", self.base_url);
        debug!("Requesting {} from {}", id, url);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("vendor", id.vendor()),
                ("name", id.name()),
                ("version", id.version()),
            ])
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = response
            .error_for_status()
            .map_err(|e| self.request_error(e))?;

        let body = response.text().await.map_err(|e| self.request_error(e))?;
        parse_catalogue_response(&body).map_err(|e| self.request_error(e))
    }
}

/// Catalogue answers are a list of matching descriptors (JSON or YAML);
/// the first one wins. A bare mapping is accepted as a single answer.
fn parse_catalogue_response(body: &str) -> std::result::Result<Option<Value>, serde_yaml_ng::Error> {
    if body.trim().is_empty() {
        return Ok(None);
    }

    let value: Value = serde_yaml_ng::from_str(body)?;
    Ok(match value {
        Value::Array(items) => items.into_iter().find(Value::is_object),
        Value::Object(_) => Some(value),
        _ => None,
    })
}
