use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    chains::{AnchorIndex, Availability, ChainAdapter, RegistryAdapter},
    config::DidHealthResolverConfiguration,
    error::{DidHealthError, DidHealthResult},
    resolution::{
        document::IdentityDocument,
        parser::{ChainSegment, DidHealthParsed, DidHealthParser},
        transformer::{RegistryRecord, build_document},
    },
    storage::{ContentStore, IpfsHttpStore},
};

/// A DID found on one of the configured chains.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedIdentity {
    pub document: IdentityDocument,
    /// catalog network the record was found on
    pub chain_name: String,
    pub segment: ChainSegment,
    pub record: RegistryRecord,
}

/// Resolves did:health identifiers across every chain in the catalog.
pub struct CrossChainResolver {
    adapters: Vec<ChainAdapter>,
    store: Option<Arc<dyn ContentStore>>,
}

impl CrossChainResolver {
    /// Assemble a resolver over `adapters`, queried in the given order.
    pub fn new(adapters: Vec<ChainAdapter>) -> Self {
        Self {
            adapters,
            store: None,
        }
    }

    /// Hydrate records with the identity document stored at their pointer.
    pub fn with_store(mut self, store: Arc<dyn ContentStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Read-only resolver for every catalog entry, reading content through the configured gateway.
    pub fn from_configuration(
        configuration: &DidHealthResolverConfiguration,
        anchors: Arc<AnchorIndex>,
    ) -> DidHealthResult<Self> {
        let adapters = configuration
            .networks
            .iter()
            .map(|entry| ChainAdapter::for_entry(entry, configuration, anchors.clone()))
            .collect::<DidHealthResult<Vec<_>>>()?;
        let store = IpfsHttpStore::new(&configuration.storage, configuration.request_timeout)?;
        Ok(Self::new(adapters).with_store(Arc::new(store)))
    }

    pub fn adapters(&self) -> &[ChainAdapter] {
        &self.adapters
    }

    pub fn adapter_for(&self, segment: &ChainSegment) -> Option<&ChainAdapter> {
        self.adapters.iter().find(|a| a.segment() == segment)
    }

    /// First chain, in catalog order, holding a record for `address`.
    ///
    /// Per-chain failures are logged and skipped; `None` means no chain knows the wallet.
    pub async fn resolve_by_wallet(&self, address: &str) -> DidHealthResult<Option<ResolvedIdentity>> {
        for adapter in &self.adapters {
            let network = &adapter.entry().network;
            match adapter.resolve_by_wallet(address).await {
                Ok(Some(record)) if !record.is_empty() => {
                    info!(%address, chain = %network, did = %record.did(), "wallet resolved");
                    return Ok(Some(self.finish(adapter, record).await));
                }
                Ok(_) => debug!(%address, chain = %network, "no record"),
                Err(e) => warn!(%address, chain = %network, error = %e, "lookup failed, skipping chain"),
            }
        }
        Ok(None)
    }

    /// Wallet lookup restricted to one chain. Errors are not skipped.
    pub async fn resolve_by_wallet_on(
        &self,
        address: &str,
        segment: &ChainSegment,
    ) -> DidHealthResult<Option<ResolvedIdentity>> {
        let adapter = self.require_adapter(segment)?;
        match adapter.resolve_by_wallet(address).await? {
            Some(record) if !record.is_empty() => Ok(Some(self.finish(adapter, record).await)),
            _ => Ok(None),
        }
    }

    pub async fn resolve_by_name(&self, did: &str) -> DidHealthResult<Option<ResolvedIdentity>> {
        let parsed = DidHealthParser::parse(did)?;
        self.resolve_parsed(&parsed).await
    }

    pub async fn resolve_parsed(&self, did: &DidHealthParsed) -> DidHealthResult<Option<ResolvedIdentity>> {
        let adapter = self.require_adapter(&did.segment)?;
        match adapter.resolve_by_name(did).await? {
            Some(record) if !record.is_empty() => Ok(Some(self.finish(adapter, record).await)),
            _ => {
                debug!(did = %did.did, "no record");
                Ok(None)
            }
        }
    }

    /// Availability of `did` on its own chain; chains missing from the catalog
    /// report [Availability::ChainUnsupported].
    pub async fn check_availability(&self, did: &str) -> DidHealthResult<Availability> {
        let parsed = DidHealthParser::parse(did)?;
        match self.adapter_for(&parsed.segment) {
            Some(adapter) => adapter.check_availability(&parsed).await,
            None => Ok(Availability::ChainUnsupported {
                segment: parsed.segment.to_string(),
            }),
        }
    }

    /// Availability of `name` on every configured chain, in catalog order.
    pub async fn search_available(&self, name: &str) -> Vec<(String, DidHealthResult<Availability>)> {
        let mut results = Vec::with_capacity(self.adapters.len());
        for adapter in &self.adapters {
            let network = adapter.entry().network.clone();
            let outcome = match DidHealthParser::build(adapter.segment(), name)
                .and_then(|did| DidHealthParser::parse(&did))
            {
                Ok(parsed) => adapter.check_availability(&parsed).await,
                Err(e) => Err(e),
            };
            results.push((network, outcome));
        }
        results
    }

    fn require_adapter(&self, segment: &ChainSegment) -> DidHealthResult<&ChainAdapter> {
        self.adapter_for(segment)
            .ok_or_else(|| DidHealthError::NetworkNotSupported(segment.to_string()))
    }

    async fn finish(&self, adapter: &ChainAdapter, record: RegistryRecord) -> ResolvedIdentity {
        let record = self.hydrate(record).await;
        let mut document = build_document(&record);
        if document.verification_method.is_empty() {
            let method = adapter.verification_method(&document.id, &document.controller);
            document.authentication.push(method.id.clone());
            document.verification_method.push(method);
        }
        ResolvedIdentity {
            document,
            chain_name: adapter.entry().network.clone(),
            segment: adapter.segment().clone(),
            record,
        }
    }

    /// Attach the identity document stored at the record's pointer. Best effort.
    async fn hydrate(&self, mut record: RegistryRecord) -> RegistryRecord {
        let Some(store) = &self.store else {
            return record;
        };
        if record.pointer_uri.is_empty() || record.stored_document.is_some() {
            return record;
        }
        let bytes = match store.fetch_str(&record.pointer_uri).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(uri = %record.pointer_uri, error = %e, "stored document unavailable, using on-chain shape");
                return record;
            }
        };
        match serde_json::from_slice::<IdentityDocument>(&bytes) {
            Ok(document) if document.id == record.did() => record.stored_document = Some(document),
            Ok(document) => {
                warn!(uri = %record.pointer_uri, stored = %document.id, expected = %record.did(), "stored document is for another DID");
            }
            Err(_) => debug!(uri = %record.pointer_uri, "pointer does not reference an identity document"),
        }
        record
    }
}
