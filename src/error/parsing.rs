use thiserror::Error;

use super::DidHealthError;

#[derive(Error, Debug)]
pub enum ParsingErrorSource {
    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Invalid URL: {0}")]
    UrlParsingError(url::ParseError),
    #[error("Invalid encoding: {0}")]
    Utf8Error(#[from] std::string::FromUtf8Error),
    #[error("Invalid encoding: {0}")]
    IntConversionError(#[from] std::num::TryFromIntError),
    #[error("Invalid hex: {0}")]
    HexError(#[from] hex::FromHexError),
    #[error("Invalid base58: {0}")]
    Base58Error(#[from] bs58::decode::Error),
    #[error("Invalid base64: {0}")]
    Base64Error(#[from] base64::DecodeError),
    #[error("Malformed ABI data: {0}")]
    AbiError(#[from] ethers::abi::AbiError),
}

impl From<serde_json::Error> for DidHealthError {
    fn from(error: serde_json::Error) -> Self {
        DidHealthError::ParsingError(ParsingErrorSource::JsonError(error))
    }
}

impl From<url::ParseError> for DidHealthError {
    fn from(error: url::ParseError) -> Self {
        DidHealthError::ParsingError(ParsingErrorSource::UrlParsingError(error))
    }
}

impl From<std::string::FromUtf8Error> for DidHealthError {
    fn from(error: std::string::FromUtf8Error) -> Self {
        DidHealthError::ParsingError(ParsingErrorSource::Utf8Error(error))
    }
}

impl From<std::num::TryFromIntError> for DidHealthError {
    fn from(error: std::num::TryFromIntError) -> Self {
        DidHealthError::ParsingError(ParsingErrorSource::IntConversionError(error))
    }
}

impl From<hex::FromHexError> for DidHealthError {
    fn from(error: hex::FromHexError) -> Self {
        DidHealthError::ParsingError(ParsingErrorSource::HexError(error))
    }
}

impl From<bs58::decode::Error> for DidHealthError {
    fn from(error: bs58::decode::Error) -> Self {
        DidHealthError::ParsingError(ParsingErrorSource::Base58Error(error))
    }
}

impl From<base64::DecodeError> for DidHealthError {
    fn from(error: base64::DecodeError) -> Self {
        DidHealthError::ParsingError(ParsingErrorSource::Base64Error(error))
    }
}

impl From<ethers::abi::AbiError> for DidHealthError {
    fn from(error: ethers::abi::AbiError) -> Self {
        DidHealthError::ParsingError(ParsingErrorSource::AbiError(error))
    }
}
