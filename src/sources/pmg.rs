//! Proxmox Mail Gateway source client.
//!
//! PMG produces no `Resource` values — it monitors mail queues and spam
//! scores, which have
//! no counterpart in this crate's Resource model. The client still polls
//! and reports errors so the endpoint's health surface (consecutive
//! errors, last error, degraded flag) reflects real PMG reachability.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::instrument;

use super::{PollResult, SourceClient};

#[derive(Debug, Deserialize)]
struct PmgStatusResponse {
    #[allow(dead_code)]
    data: serde_json::Value,
}

pub struct PmgClient {
    endpoint_id: String,
    base_url: String,
    token_id: Option<String>,
    token_secret: Option<String>,
    client: reqwest::Client,
}

impl PmgClient {
    pub fn new(
        endpoint_id: String,
        base_url: String,
        token_id: Option<String>,
        token_secret: Option<String>,
        timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            endpoint_id,
            base_url,
            token_id,
            token_secret,
            client,
        }
    }

    fn auth_header(&self) -> Option<String> {
        match (&self.token_id, &self.token_secret) {
            (Some(id), Some(secret)) => Some(format!("PMGAPIToken={id}={secret}")),
            _ => None,
        }
    }
}

#[async_trait]
impl SourceClient for PmgClient {
    #[instrument(skip(self), fields(endpoint = %self.endpoint_id))]
    async fn connect(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    #[instrument(skip(self), fields(endpoint = %self.endpoint_id))]
    async fn poll(&mut self) -> PollResult {
        let url = format!("{}/api2/json/nodes", self.base_url);
        let mut request = self.client.get(&url);
        if let Some(auth) = self.auth_header() {
            request = request.header("Authorization", auth);
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            anyhow::bail!("PMG endpoint '{}' returned {}", self.endpoint_id, response.status());
        }
        let _parsed: PmgStatusResponse = response.json().await?;
        Ok(Vec::new())
    }

    async fn close(&mut self) {}
}
