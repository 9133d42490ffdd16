use thiserror::Error;

/// Failures of the content-addressed store.
#[derive(Error, Debug)]
pub enum StorageErrorSource {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },
    #[error("content not found: {0}")]
    NotFound(String),
    #[error("invalid content URI: {0}")]
    InvalidUri(String),
    #[error("unexpected storage response: {0}")]
    InvalidResponse(String),
}
