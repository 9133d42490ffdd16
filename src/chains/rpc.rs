//! JSON-RPC 2.0 transport shared by the EVM and Solana adapters.
//!
//! Requests go out through ethers' [Http] client. [RpcTransport] puts a
//! deadline on every call and implements [JsonRpcClient], so the EVM adapter
//! drives it through a [Provider] while Solana issues raw calls.

use std::{fmt::Debug, str::FromStr, sync::Arc, time::Duration};

use async_trait::async_trait;
use ethers::providers::{
    Http, HttpClientError, JsonRpcClient, JsonRpcError, Provider, ProviderError, RpcError,
};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use thiserror::Error;
use tracing::trace;

use crate::error::{DidHealthError, DidHealthResult};

pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(30);

/// Untyped `method(params) -> result` backend behind an [RpcTransport].
#[async_trait]
pub trait JsonRpc: Debug + Send + Sync {
    async fn request_value(&self, method: &str, params: Value) -> Result<Value, RpcTransportError>;
}

#[async_trait]
impl JsonRpc for Http {
    async fn request_value(&self, method: &str, params: Value) -> Result<Value, RpcTransportError> {
        JsonRpcClient::request(self, method, params)
            .await
            .map_err(|e| match e {
                HttpClientError::JsonRpcError(e) => RpcTransportError::Node(e),
                other => RpcTransportError::Http(other),
            })
    }
}

#[derive(Error, Debug)]
pub enum RpcTransportError {
    #[error(transparent)]
    Http(HttpClientError),
    #[error("{0}")]
    Node(JsonRpcError),
    #[error("unexpected response shape: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

impl RpcTransportError {
    pub fn node(code: i64, message: &str) -> Self {
        RpcTransportError::Node(JsonRpcError {
            code,
            message: message.to_string(),
            data: None,
        })
    }
}

impl RpcError for RpcTransportError {
    fn as_error_response(&self) -> Option<&JsonRpcError> {
        match self {
            RpcTransportError::Node(e) => Some(e),
            RpcTransportError::Http(e) => e.as_error_response(),
            _ => None,
        }
    }

    fn as_serde_error(&self) -> Option<&serde_json::Error> {
        match self {
            RpcTransportError::SerdeJson(e) => Some(e),
            RpcTransportError::Http(e) => e.as_serde_error(),
            _ => None,
        }
    }
}

impl From<RpcTransportError> for ProviderError {
    fn from(error: RpcTransportError) -> Self {
        ProviderError::JsonRpcClientError(Box::new(error))
    }
}

impl From<RpcTransportError> for DidHealthError {
    fn from(error: RpcTransportError) -> Self {
        rpc_error(&error)
    }
}

#[derive(Debug, Clone)]
pub struct RpcTransport {
    backend: Arc<dyn JsonRpc>,
    timeout: Duration,
}

impl RpcTransport {
    pub fn new(backend: Arc<dyn JsonRpc>) -> Self {
        Self {
            backend,
            timeout: DEFAULT_RPC_TIMEOUT,
        }
    }

    pub fn http(url: &str, timeout: Duration) -> DidHealthResult<Self> {
        let http = Http::from_str(url)
            .map_err(|e| DidHealthError::BadConfiguration(format!("invalid RPC url {url}: {e}")))?;
        Ok(Self::new(Arc::new(http)).with_timeout(timeout))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn provider(&self) -> Provider<RpcTransport> {
        Provider::new(self.clone())
    }

    /// Call `method` and return its `result`. Node errors map to [DidHealthError::RpcError].
    pub async fn call(&self, method: &str, params: Value) -> DidHealthResult<Value> {
        Ok(self.send(method, params).await?)
    }

    async fn send(&self, method: &str, params: Value) -> Result<Value, RpcTransportError> {
        trace!(method, "json-rpc request");
        tokio::time::timeout(self.timeout, self.backend.request_value(method, params))
            .await
            .map_err(|_| RpcTransportError::Timeout(self.timeout))?
    }
}

#[async_trait]
impl JsonRpcClient for RpcTransport {
    type Error = RpcTransportError;

    async fn request<T, R>(&self, method: &str, params: T) -> Result<R, Self::Error>
    where
        T: Debug + Serialize + Send + Sync,
        R: DeserializeOwned + Send,
    {
        let params = serde_json::to_value(params)?;
        let result = self.send(method, params).await?;
        Ok(serde_json::from_value(result)?)
    }
}

/// Map a transport error onto the crate taxonomy, keeping node error objects intact.
pub fn rpc_error<E: RpcError + ?Sized>(error: &E) -> DidHealthError {
    if let Some(response) = error.as_error_response() {
        return DidHealthError::RpcError {
            code: response.code,
            message: response.message.clone(),
            data: response.data.as_ref().map(|d| match d {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            }),
        };
    }
    if let Some(serde) = error.as_serde_error() {
        return DidHealthError::InvalidResponse(serde.to_string());
    }
    DidHealthError::TransportError(error.to_string().into())
}

impl From<ProviderError> for DidHealthError {
    fn from(error: ProviderError) -> Self {
        match error {
            ProviderError::JsonRpcClientError(inner) => rpc_error(inner.as_ref()),
            ProviderError::SerdeJson(e) => DidHealthError::InvalidResponse(e.to_string()),
            other => DidHealthError::TransportError(Box::new(other)),
        }
    }
}
