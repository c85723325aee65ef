//! Firebase Realtime Database over its REST interface.
//!
//! Every node is addressable as `{base}/{path}.json`; `PUT` replaces the
//! node and `GET` returns it with its children, or `null` when absent.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde_json::Value;

use super::{split_path, DocumentStore, StoreError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct FirebaseStore {
    client: Client,
    base: Url,
}

impl FirebaseStore {
    pub fn new(base_url: &str) -> Result<Self> {
        let base = Url::parse(base_url).context("failed to parse database URL")?;
        if base.cannot_be_a_base() {
            anyhow::bail!("database URL cannot carry a path");
        }

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self { client, base })
    }

    fn node_url(&self, path: &str) -> Result<Url, StoreError> {
        let segments = split_path(path)?;
        let mut url = self.base.clone();
        {
            let mut parts = url
                .path_segments_mut()
                .map_err(|_| StoreError::InvalidPath(path.to_string()))?;
            parts.pop_if_empty();
            if let Some((last, parents)) = segments.split_last() {
                parts.extend(parents);
                parts.push(&format!("{last}.json"));
            }
        }
        Ok(url)
    }
}

fn transport_error(err: reqwest::Error) -> StoreError {
    if err.is_timeout() {
        StoreError::Timeout(REQUEST_TIMEOUT)
    } else {
        StoreError::Unavailable(err.to_string())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response.text().await.unwrap_or_default();
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        Err(StoreError::Unavailable(format!("{status}: {message}")))
    } else {
        Err(StoreError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl DocumentStore for FirebaseStore {
    fn name(&self) -> &'static str {
        "Firebase"
    }

    async fn put(&self, path: &str, value: Value) -> Result<(), StoreError> {
        let url = self.node_url(path)?;
        let response = self
            .client
            .put(url)
            .json(&value)
            .send()
            .await
            .map_err(transport_error)?;
        check_status(response).await?;
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let url = self.node_url(path)?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(transport_error)?;
        let body: Value = check_status(response)
            .await?
            .json()
            .await
            .map_err(transport_error)?;
        Ok((!body.is_null()).then_some(body))
    }
}
