// Handles all interactions with the SwitchBoard gateway over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use tracing::debug;

use crate::error::SourceError;
use crate::source::{ConfigSource, StatusSource, ToggleRequester};
use crate::sync::model::{PanelConfig, ServiceStatusReport, ToggleRequest};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for the gateway's `/api/config`, `/api/status` and `/api/toggle`.
/// One instance serves as all three collaborators of the sync engine.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SourceError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

async fn ensure_ok(resp: Response) -> Result<Response, SourceError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(SourceError::Status {
        status: status.as_u16(),
        message: body.trim().to_string(),
    })
}

#[async_trait]
impl ConfigSource for HttpBackend {
    async fn fetch_config(&self) -> Result<PanelConfig, SourceError> {
        let resp = self.client.get(self.url("/api/config")).send().await?;
        let config = ensure_ok(resp).await?.json::<PanelConfig>().await?;
        debug!(services = config.services.len(), "fetched panel config");
        Ok(config)
    }
}

#[async_trait]
impl StatusSource for HttpBackend {
    async fn fetch_statuses(&self) -> Result<Vec<ServiceStatusReport>, SourceError> {
        let resp = self.client.get(self.url("/api/status")).send().await?;
        Ok(ensure_ok(resp)
            .await?
            .json::<Vec<ServiceStatusReport>>()
            .await?)
    }
}

#[async_trait]
impl ToggleRequester for HttpBackend {
    async fn request_toggle(&self, request: &ToggleRequest) -> Result<(), SourceError> {
        let resp = self
            .client
            .post(self.url("/api/toggle"))
            .json(request)
            .send()
            .await?;
        ensure_ok(resp).await?;
        Ok(())
    }
}
