use thiserror::Error;

use self::parsing::ParsingErrorSource;

pub mod parsing;
pub mod storage;

pub use self::storage::StorageErrorSource;

pub type DidHealthResult<T> = Result<T, DidHealthError>;

#[derive(Error, Debug)]
pub enum DidHealthError {
    #[error("DID method not supported: {0}")]
    MethodNotSupported(String),
    #[error("Invalid DID: {0}")]
    InvalidDid(String),
    #[error("Chain not supported: {0}")]
    NetworkNotSupported(String),
    #[error("Bad configuration: {0}")]
    BadConfiguration(String),
    #[error("Transport error: {0}")]
    TransportError(Box<dyn std::error::Error + Send + Sync + 'static>),
    #[error("RPC error {code}: {message}")]
    RpcError {
        code: i64,
        message: String,
        data: Option<String>,
    },
    #[error("Non-success response from node: {0}")]
    NonSuccessResponse(Box<dyn std::error::Error + Send + Sync + 'static>),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("DID {did} is already registered to {owner}")]
    DidAlreadyRegistered { did: String, owner: String },
    #[error("DID not found: {0}")]
    DidNotFound(String),
    #[error("Invalid resource: {0}")]
    InvalidResource(String),
    #[error("Onboarding incomplete: {0}")]
    Incomplete(String),
    #[error("Wallet error: {0}")]
    Wallet(String),
    #[error("Transaction {tx} failed: {reason}")]
    TransactionFailed { tx: String, reason: String },
    #[error("Transaction {tx} not confirmed after {waited_secs}s")]
    ConfirmationTimeout { tx: String, waited_secs: u64 },
    #[error("{operation} is not supported on {chain}")]
    UnsupportedOperation { chain: String, operation: String },
    #[error("Storage error: {0}")]
    Storage(#[from] StorageErrorSource),
    #[error("Access control error: {0}")]
    AccessControl(#[from] AccessControlError),
    #[error("Parsing error: {0}")]
    ParsingError(ParsingErrorSource),
    #[error("Other error: {0}")]
    Other(Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl DidHealthError {
    /// True when a node rejected a call by reverting, which registries use to
    /// signal a missing entry.
    pub fn is_revert(&self) -> bool {
        match self {
            DidHealthError::RpcError { code, message, .. } => {
                *code == 3 || message.to_ascii_lowercase().contains("revert")
            }
            _ => false,
        }
    }
}

/// Failures of the condition-gated key network.
#[derive(Error, Debug)]
pub enum AccessControlError {
    #[error("invalid access control conditions: {0}")]
    InvalidConditions(String),
    #[error("access denied: {0}")]
    AccessDenied(String),
    #[error("invalid session: {0}")]
    InvalidSession(String),
    #[error("unsupported condition: {0}")]
    UnsupportedCondition(String),
    #[error("encryption failed: {0}")]
    Encryption(String),
    #[error("decryption failed: {0}")]
    Decryption(String),
}

impl From<reqwest::Error> for DidHealthError {
    fn from(error: reqwest::Error) -> Self {
        DidHealthError::TransportError(Box::new(error))
    }
}

impl From<tonic::transport::Error> for DidHealthError {
    fn from(error: tonic::transport::Error) -> Self {
        DidHealthError::TransportError(Box::new(error))
    }
}

impl From<tonic::Status> for DidHealthError {
    fn from(status: tonic::Status) -> Self {
        DidHealthError::NonSuccessResponse(Box::new(status))
    }
}

impl From<std::io::Error> for DidHealthError {
    fn from(error: std::io::Error) -> Self {
        DidHealthError::Other(Box::new(error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revert_detection_by_code_and_message() {
        let by_code = DidHealthError::RpcError {
            code: 3,
            message: "execution failed".into(),
            data: None,
        };
        let by_message = DidHealthError::RpcError {
            code: -32000,
            message: "Execution Reverted".into(),
            data: None,
        };
        let other = DidHealthError::RpcError {
            code: -32000,
            message: "header not found".into(),
            data: None,
        };
        assert!(by_code.is_revert());
        assert!(by_message.is_revert());
        assert!(!other.is_revert());
        assert!(!DidHealthError::TransportError("timeout".into()).is_revert());
    }
}
