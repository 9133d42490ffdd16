//! This crate contains a resolver and registrar for DIDs of the `did:health` method.
//! A `did:health` DID names a FHIR resource (a patient, practitioner, organization
//! or device) anchored on one of several chains:
//!
//! - EVM chains, through a `HealthDIDRegistry` contract keyed by `<chainId>:<name>`
//! - Bitcoin, through Ordinals inscriptions
//! - Solana, through memo transactions
//! - Cosmos chains, through a CosmWasm registry contract queried over gRPC
//!
//! The registry points at an identity document on IPFS whose `#fhir` service
//! in turn points at the (optionally encrypted) FHIR resource.
//!
//! The Cosmos gRPC types and clients are generated with [tonic](https://github.com/hyperium/tonic)
//! and checked in under [`proto`], so building the crate needs no `protoc`.
//!
//! The crate exports the `DIDHealth` type which implements the
//! [`ssi_dids_core::DIDMethod`] and
//! [`ssi_dids_core::resolution::DIDMethodResolver`] traits.
//!
//! Quick example
//! -------------
//! ```
//! use did_resolver_health::DIDHealth;
//! use did_resolver_health::resolution::parser::DidHealthParser;
//! use ssi_dids_core::DIDMethod;
//!
//! assert_eq!(DIDHealth::DID_METHOD_NAME, "health");
//! let parsed = DidHealthParser::parse("did:health:11155111:alice#fhir").unwrap();
//! assert_eq!(parsed.lookup_key(), "11155111:alice");
//! ```
//!
//! Library features
//! ----------------
//! - Implements a `DIDMethodResolver` for the `did:health` DID method.
//! - Cross-chain lookup by wallet, by DID and availability checks ([`resolution::resolver`]).
//! - Registration and update of DIDs with their FHIR resource ([`workflow`]).
//! - Condition-gated encryption of resources ([`access`]).

use std::sync::Arc;

use serde_json::to_vec;
use ssi_dids_core::resolution::{
    DIDMethodResolver, Error, Metadata as ResolutionMetadata, Options, Output,
};
use ssi_dids_core::{DIDMethod, document, document::representation::MediaType};
use tracing::debug;

use crate::{
    chains::AnchorIndex,
    config::DidHealthResolverConfiguration,
    error::{DidHealthError, DidHealthResult},
    resolution::{parser::DID_HEALTH_PREFIX, resolver::CrossChainResolver, transformer::document_to_json},
};

pub mod access;
pub mod catalog;
pub mod chains;
pub mod config;
pub mod crypto;
pub mod error;
pub mod proto;
pub mod resolution;
pub mod state;
pub mod storage;
pub mod workflow;

pub struct DIDHealth {
    resolver: Arc<CrossChainResolver>,
}

impl DIDHealth {
    pub fn new(resolver: Arc<CrossChainResolver>) -> Self {
        Self { resolver }
    }

    /// Resolver over the configured catalog, with the anchor index loaded from disk when set.
    pub async fn from_configuration(configuration: &DidHealthResolverConfiguration) -> DidHealthResult<Self> {
        let anchors = match &configuration.anchor_index_path {
            Some(path) => AnchorIndex::open(path).await?,
            None => AnchorIndex::in_memory(),
        };
        let resolver = CrossChainResolver::from_configuration(configuration, Arc::new(anchors))?;
        Ok(Self::new(Arc::new(resolver)))
    }

    /// Resolver over the deployed testnet registries.
    pub fn testnet() -> DidHealthResult<Self> {
        let configuration = DidHealthResolverConfiguration::default();
        let resolver =
            CrossChainResolver::from_configuration(&configuration, Arc::new(AnchorIndex::in_memory()))?;
        Ok(Self::new(Arc::new(resolver)))
    }

    pub fn resolver(&self) -> &CrossChainResolver {
        &self.resolver
    }
}

impl DIDMethod for DIDHealth {
    const DID_METHOD_NAME: &'static str = "health";
}

impl DIDMethodResolver for DIDHealth {
    async fn resolve_method_representation<'a>(
        &'a self,
        method_specific_id: &'a str,
        options: Options,
    ) -> Result<Output<Vec<u8>>, Error> {
        let did = format!("{DID_HEALTH_PREFIX}{method_specific_id}");
        debug!(%did, "resolving");

        let resolved = match self.resolver.resolve_by_name(&did).await {
            Ok(Some(resolved)) => resolved,
            Ok(None) => return Err(Error::NotFound),
            Err(DidHealthError::InvalidDid(_) | DidHealthError::MethodNotSupported(_)) => {
                return Err(Error::InvalidMethodSpecificId(method_specific_id.to_string()));
            }
            Err(e) => return Err(Error::internal(format!("did:health resolver error: {e}"))),
        };

        let json_value = document_to_json(&resolved.document)
            .map_err(|e| Error::internal(format!("did:health transform error: {e}")))?;
        let json = to_vec(&json_value)
            .map_err(|e| Error::internal(format!("failed to serialize DID document: {e}")))?;

        let content_type = options.accept.unwrap_or(MediaType::JsonLd);

        Ok(Output::new(
            json,
            document::Metadata::default(),
            ResolutionMetadata::from_content_type(Some(content_type.to_string())),
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::chains::{
        ChainAdapter,
        evm::testing::{ChainState, SharedChain, fake_adapter},
    };

    const WALLET: &str = "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf";

    fn method() -> DIDHealth {
        let chain: SharedChain = Arc::new(Mutex::new(ChainState::default()));
        chain.lock().unwrap().records.insert(
            "11155111:alice".to_string(),
            (WALLET.to_string(), "ipfs://bafyalice/Patient/1.json".to_string(), Vec::new()),
        );
        let resolver = CrossChainResolver::new(vec![ChainAdapter::Evm(fake_adapter(chain, WALLET))]);
        DIDHealth::new(Arc::new(resolver))
    }

    #[tokio::test]
    async fn resolves_to_json_ld() {
        let output = method()
            .resolve_method_representation("11155111:alice", Options::default())
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&output.document).unwrap();
        assert_eq!(json["id"], "did:health:11155111:alice");
        assert_eq!(json["controller"], WALLET);
        assert_eq!(json["@context"][0], "https://www.w3.org/ns/did/v1");
        assert_eq!(json["service"][0]["serviceEndpoint"], "ipfs://bafyalice/Patient/1.json");
    }

    #[tokio::test]
    async fn resolution_errors() {
        let method = method();
        assert!(matches!(
            method.resolve_method_representation("11155111:bob", Options::default()).await,
            Err(Error::NotFound)
        ));
        assert!(matches!(
            method.resolve_method_representation("11155111:Not_Valid", Options::default()).await,
            Err(Error::InvalidMethodSpecificId(_))
        ));
        let unsupported = method
            .resolve_method_representation("84532:alice", Options::default())
            .await;
        assert!(unsupported.is_err_and(|e| e.to_string().contains("84532")));
    }
}
