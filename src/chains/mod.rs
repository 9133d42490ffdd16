//! Per-chain registry adapters behind one contract.
//!
//! Each supported chain family implements [RegistryAdapter]; [ChainAdapter] is
//! the closed set the resolver and registrar dispatch over.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;

use crate::{
    catalog::RegistryEntry,
    config::DidHealthResolverConfiguration,
    error::{DidHealthError, DidHealthResult},
    resolution::{
        document::{VerificationMethod, verification_method_for},
        parser::{ChainSegment, DidHealthParsed},
        transformer::RegistryRecord,
    },
};

pub mod anchor;
pub mod bitcoin;
pub mod cosmos;
pub mod evm;
pub mod rpc;
pub mod solana;

pub use self::{
    anchor::{AnchorIndex, AnchorRecord},
    bitcoin::BitcoinAdapter,
    cosmos::CosmosAdapter,
    evm::EvmAdapter,
    solana::SolanaAdapter,
};

/// Outcome of a pre-flight name check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Availability {
    Available,
    Taken { owner: String },
    ChainUnsupported { segment: String },
}

impl Availability {
    pub fn is_available(&self) -> bool {
        matches!(self, Availability::Available)
    }
}

/// A submitted, not yet confirmed, transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxHandle {
    /// catalog network the transaction was sent to
    pub network: String,
    /// transaction hash, signature or inscription id
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx: TxHandle,
    /// block height or slot the transaction landed in, when the chain reports one
    pub block: Option<u64>,
    pub confirmations: u64,
    pub explorer_url: Option<String>,
}

#[async_trait]
pub trait RegistryAdapter: Send + Sync {
    fn entry(&self) -> &RegistryEntry;

    async fn check_availability(&self, did: &DidHealthParsed) -> DidHealthResult<Availability>;

    async fn submit_registration(&self, did: &DidHealthParsed, pointer_uri: &str) -> DidHealthResult<TxHandle>;

    async fn submit_update(&self, did: &DidHealthParsed, pointer_uri: &str) -> DidHealthResult<TxHandle>;

    /// Anchor additional resource pointers next to the primary one.
    async fn submit_alt_data(&self, did: &DidHealthParsed, uris: &[String]) -> DidHealthResult<TxHandle>;

    /// Wait until the transaction reaches the entry's confirmation depth.
    async fn confirm(&self, tx: &TxHandle) -> DidHealthResult<TxReceipt>;

    async fn resolve_by_wallet(&self, address: &str) -> DidHealthResult<Option<RegistryRecord>>;

    async fn resolve_by_name(&self, did: &DidHealthParsed) -> DidHealthResult<Option<RegistryRecord>>;

    async fn register(&self, did: &DidHealthParsed, pointer_uri: &str) -> DidHealthResult<TxReceipt> {
        let tx = self.submit_registration(did, pointer_uri).await?;
        self.confirm(&tx).await
    }

    async fn update(&self, did: &DidHealthParsed, pointer_uri: &str) -> DidHealthResult<TxReceipt> {
        let tx = self.submit_update(did, pointer_uri).await?;
        self.confirm(&tx).await
    }

    fn verification_method(&self, did: &str, controller: &str) -> VerificationMethod {
        verification_method_for(&self.entry().segment, did, controller)
    }
}

pub enum ChainAdapter {
    Evm(EvmAdapter),
    Bitcoin(BitcoinAdapter),
    Solana(SolanaAdapter),
    Cosmos(CosmosAdapter),
}

impl ChainAdapter {
    /// Read-only adapter for a catalog entry. Attach a signer on the concrete
    /// adapter before building the enum to enable registration.
    pub fn for_entry(
        entry: &RegistryEntry,
        config: &DidHealthResolverConfiguration,
        anchors: Arc<AnchorIndex>,
    ) -> DidHealthResult<Self> {
        let timeout = config.request_timeout;
        let policy = config.confirmation;
        Ok(match entry.segment {
            ChainSegment::Evm(_) => ChainAdapter::Evm(EvmAdapter::connect(entry.clone(), timeout, policy)?),
            ChainSegment::Bitcoin => {
                ChainAdapter::Bitcoin(BitcoinAdapter::connect(entry.clone(), timeout, policy, anchors)?)
            }
            ChainSegment::Solana => {
                ChainAdapter::Solana(SolanaAdapter::connect(entry.clone(), timeout, policy, anchors)?)
            }
            ChainSegment::Cosmos(_) => ChainAdapter::Cosmos(CosmosAdapter::new(entry.clone(), policy)?),
        })
    }

    fn inner(&self) -> &dyn RegistryAdapter {
        match self {
            ChainAdapter::Evm(adapter) => adapter,
            ChainAdapter::Bitcoin(adapter) => adapter,
            ChainAdapter::Solana(adapter) => adapter,
            ChainAdapter::Cosmos(adapter) => adapter,
        }
    }

    pub fn segment(&self) -> &ChainSegment {
        &self.entry().segment
    }
}

#[async_trait]
impl RegistryAdapter for ChainAdapter {
    fn entry(&self) -> &RegistryEntry {
        self.inner().entry()
    }

    async fn check_availability(&self, did: &DidHealthParsed) -> DidHealthResult<Availability> {
        self.inner().check_availability(did).await
    }

    async fn submit_registration(&self, did: &DidHealthParsed, pointer_uri: &str) -> DidHealthResult<TxHandle> {
        self.inner().submit_registration(did, pointer_uri).await
    }

    async fn submit_update(&self, did: &DidHealthParsed, pointer_uri: &str) -> DidHealthResult<TxHandle> {
        self.inner().submit_update(did, pointer_uri).await
    }

    async fn submit_alt_data(&self, did: &DidHealthParsed, uris: &[String]) -> DidHealthResult<TxHandle> {
        self.inner().submit_alt_data(did, uris).await
    }

    async fn confirm(&self, tx: &TxHandle) -> DidHealthResult<TxReceipt> {
        self.inner().confirm(tx).await
    }

    async fn resolve_by_wallet(&self, address: &str) -> DidHealthResult<Option<RegistryRecord>> {
        self.inner().resolve_by_wallet(address).await
    }

    async fn resolve_by_name(&self, did: &DidHealthParsed) -> DidHealthResult<Option<RegistryRecord>> {
        self.inner().resolve_by_name(did).await
    }
}

/// Reject a DID addressed to a different chain than the adapter serves.
pub(crate) fn ensure_segment(entry: &RegistryEntry, did: &DidHealthParsed) -> DidHealthResult<()> {
    if entry.segment != did.segment {
        return Err(DidHealthError::NetworkNotSupported(format!(
            "{} is served by {}, not {}",
            did.did, did.segment, entry.network
        )));
    }
    Ok(())
}

/// Deadline-bounded polling shared by the confirmation loops.
pub(crate) struct Poller {
    interval: Duration,
    deadline: tokio::time::Instant,
    timeout: Duration,
}

impl Poller {
    pub(crate) fn new(policy: crate::config::ConfirmationPolicy) -> Self {
        Self {
            interval: policy.poll_interval,
            deadline: tokio::time::Instant::now() + policy.timeout,
            timeout: policy.timeout,
        }
    }

    /// Sleep one interval, or fail once the deadline has passed.
    pub(crate) async fn wait(&self, tx: &str) -> DidHealthResult<()> {
        if tokio::time::Instant::now() >= self.deadline {
            return Err(DidHealthError::ConfirmationTimeout {
                tx: tx.to_string(),
                waited_secs: self.timeout.as_secs(),
            });
        }
        tokio::time::sleep(self.interval).await;
        Ok(())
    }
}
