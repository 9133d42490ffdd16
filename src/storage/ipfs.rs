use std::time::Duration;

use async_trait::async_trait;
use reqwest::{
    StatusCode,
    multipart::{Form, Part},
};
use serde::Deserialize;
use tracing::{debug, info};

use super::{ContentStore, ContentUri};
use crate::{
    config::StorageConfiguration,
    error::{DidHealthError, DidHealthResult, StorageErrorSource},
};

pub const USER_AGENT: &str = "did-resolver-health/0.1";

/// Uploads through a Kubo-compatible `/api/v0/add` endpoint and reads through an HTTP gateway.
#[derive(Clone)]
pub struct IpfsHttpStore {
    api_url: String,
    gateway_url: String,
    token: Option<String>,
    http_client: reqwest::Client,
}

/// one line of the `add` response stream
#[derive(Debug, Deserialize)]
struct AddEntry {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Hash")]
    hash: String,
}

impl IpfsHttpStore {
    pub fn new(config: &StorageConfiguration, timeout: Duration) -> DidHealthResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| {
                DidHealthError::BadConfiguration(format!("Failed to create HTTP client: {e}"))
            })?;

        Ok(Self {
            api_url: config.ipfs_api_url.trim_end_matches('/').to_string(),
            gateway_url: config.gateway_url.trim_end_matches('/').to_string(),
            token: config.ipfs_api_token.clone(),
            http_client,
        })
    }

    pub fn gateway_url(&self) -> &str {
        &self.gateway_url
    }
}

#[async_trait]
impl ContentStore for IpfsHttpStore {
    async fn store(&self, blob: Vec<u8>, name_hint: &str) -> DidHealthResult<ContentUri> {
        let name_hint = name_hint.trim_start_matches('/');
        let url = format!(
            "{}/api/v0/add?cid-version=1&wrap-with-directory=true&pin=true",
            self.api_url
        );
        let size = blob.len();

        let part = Part::bytes(blob)
            .file_name(name_hint.to_string())
            .mime_str("application/octet-stream")
            .map_err(StorageErrorSource::from)?;
        let form = Form::new().part("file", part);

        let mut request = self.http_client.post(&url).multipart(form);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(StorageErrorSource::from)?;
        if !response.status().is_success() {
            return Err(StorageErrorSource::Status {
                status: response.status().as_u16(),
                url,
            }
            .into());
        }
        let body = response.text().await.map_err(StorageErrorSource::from)?;

        let entries: Vec<AddEntry> = body
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(serde_json::from_str)
            .collect::<Result<_, _>>()
            .map_err(|e| StorageErrorSource::InvalidResponse(format!("add response: {e}")))?;

        // the wrapping directory is reported with an empty name, after its children
        let directory = entries
            .iter()
            .find(|e| e.name.is_empty())
            .or_else(|| entries.last())
            .ok_or_else(|| StorageErrorSource::InvalidResponse("empty add response".to_string()))?;

        let uri = ContentUri::new(directory.hash.clone(), Some(name_hint.to_string()));
        info!(uri = %uri, size, "stored blob");
        Ok(uri)
    }

    async fn fetch(&self, uri: &ContentUri) -> DidHealthResult<Vec<u8>> {
        let url = uri.to_gateway(&self.gateway_url);
        debug!(%url, "fetching blob");

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(StorageErrorSource::from)?;

        match response.status() {
            status if status.is_success() => {
                let bytes = response.bytes().await.map_err(StorageErrorSource::from)?;
                Ok(bytes.to_vec())
            }
            StatusCode::NOT_FOUND => Err(StorageErrorSource::NotFound(uri.to_native()).into()),
            status => Err(StorageErrorSource::Status {
                status: status.as_u16(),
                url,
            }
            .into()),
        }
    }
}
