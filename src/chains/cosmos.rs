//! CosmWasm `health-did` contract access over Cosmos SDK gRPC.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tonic::{
    Code, Status,
    transport::{Channel, ClientTlsConfig, Endpoint},
};
use tracing::{debug, info, warn};

use super::{Availability, Poller, RegistryAdapter, TxHandle, TxReceipt, ensure_segment};
use crate::{
    catalog::RegistryEntry,
    config::ConfirmationPolicy,
    error::{DidHealthError, DidHealthResult},
    proto::{
        cosmos::{
            base::tendermint::v1beta1::{
                GetLatestBlockRequest, service_client::ServiceClient as TendermintClient,
            },
            tx::v1beta1::{GetTxRequest, service_client::ServiceClient as TxClient},
        },
        cosmwasm::wasm::v1::{
            QueryRawContractStateRequest, QuerySmartContractStateRequest,
            query_client::QueryClient as WasmQueryClient,
        },
    },
    resolution::{parser::DidHealthParsed, transformer::RegistryRecord},
};

/// storage namespace of the owner-address to record map
pub const ADDRESS_DID_MAPPING_NAMESPACE: &str = "address_did_mapping";

/// Record layout stored by the contract.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthDidState {
    pub owner: String,
    #[serde(default)]
    pub delegate_addresses: Vec<String>,
    pub health_did: String,
    pub ipfs_uri: String,
    #[serde(default)]
    pub alt_ipfs_uris: Vec<String>,
    pub reputation_score: u8,
    pub has_world_id: bool,
    pub has_polygon_id: bool,
    pub has_social_id: bool,
}

impl From<HealthDidState> for RegistryRecord {
    fn from(state: HealthDidState) -> Self {
        RegistryRecord {
            owner: state.owner,
            health_did: state.health_did,
            pointer_uri: state.ipfs_uri,
            alt_pointer_uris: state.alt_ipfs_uris,
            has_world_id: state.has_world_id,
            has_polygon_id: state.has_polygon_id,
            has_social_id: state.has_social_id,
            reputation_score: Some(u64::from(state.reputation_score)),
            stored_document: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ExecuteMsg {
    RegisterDID { health_did: String, uri: String },
    UpdateDIDData { health_did: String, uri: String },
    AddAltData { health_did: String, uris: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum QueryMsg {
    GetHealthDID { health_did: String },
}

/// Storage key of a single-key `cw-storage-plus` map entry:
/// big-endian u16 namespace length, namespace, then the key bytes.
pub fn map_key(namespace: &str, key: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + namespace.len() + key.len());
    out.extend_from_slice(&(namespace.len() as u16).to_be_bytes());
    out.extend_from_slice(namespace.as_bytes());
    out.extend_from_slice(key);
    out
}

/// Loose bech32 shape check: `<hrp>1<data>` in lower case.
pub fn is_bech32_address(address: &str) -> bool {
    match address.rsplit_once('1') {
        Some((hrp, data)) => {
            !hrp.is_empty()
                && data.len() >= 6
                && address
                    .bytes()
                    .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
        }
        None => false,
    }
}

/// Outcome of a transaction lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CosmosTxResult {
    pub height: u64,
    pub code: u32,
    pub raw_log: String,
}

/// The node queries the adapter needs.
#[async_trait]
pub trait CosmWasmQuerier: Send + Sync {
    /// JSON smart query; `None` when the contract reports the entry missing.
    async fn smart(&self, contract: &str, msg: &Value) -> DidHealthResult<Option<Vec<u8>>>;

    /// raw storage read; `None` for an absent key
    async fn raw(&self, contract: &str, key: &[u8]) -> DidHealthResult<Option<Vec<u8>>>;

    async fn tx(&self, hash: &str) -> DidHealthResult<Option<CosmosTxResult>>;

    async fn latest_height(&self) -> DidHealthResult<u64>;
}

/// Caller-supplied wallet that signs and broadcasts contract executions.
#[async_trait]
pub trait CosmosSigner: Send + Sync {
    async fn address(&self) -> DidHealthResult<String>;

    /// Broadcast `MsgExecuteContract` and return the transaction hash.
    async fn execute(&self, contract: &str, msg: &Value) -> DidHealthResult<String>;
}

#[derive(Clone)]
struct CosmosGrpcClient {
    wasm: WasmQueryClient<Channel>,
    tx: TxClient<Channel>,
    tendermint: TendermintClient<Channel>,
}

/// gRPC querier with a lazily connected channel.
pub struct GrpcQuerier {
    endpoint: Endpoint,
    client: Mutex<Option<CosmosGrpcClient>>,
}

impl GrpcQuerier {
    pub fn new(grpc_url: &str) -> DidHealthResult<Self> {
        let mut endpoint = Endpoint::new(grpc_url.to_string())
            .map_err(|_e| DidHealthError::BadConfiguration("Failed to parse GRPC url".to_string()))?;
        if grpc_url.starts_with("https://") {
            endpoint = endpoint
                .tls_config(ClientTlsConfig::new().with_webpki_roots())
                .map_err(|e| DidHealthError::TransportError(Box::new(e)))?;
        }
        Ok(Self {
            endpoint,
            client: Mutex::new(None),
        })
    }

    async fn client(&self) -> DidHealthResult<CosmosGrpcClient> {
        let mut lock = self.client.lock().await;
        if let Some(client) = lock.as_ref() {
            return Ok(client.clone());
        }

        let channel = self
            .endpoint
            .connect()
            .await
            .map_err(|e| DidHealthError::TransportError(Box::new(e)))?;
        let client = CosmosGrpcClient {
            wasm: WasmQueryClient::new(channel.clone()),
            tx: TxClient::new(channel.clone()),
            tendermint: TendermintClient::new(channel),
        };
        *lock = Some(client.clone());
        Ok(client)
    }
}

fn is_not_found(status: &Status) -> bool {
    status.code() == Code::NotFound || status.message().to_ascii_lowercase().contains("not found")
}

#[async_trait]
impl CosmWasmQuerier for GrpcQuerier {
    async fn smart(&self, contract: &str, msg: &Value) -> DidHealthResult<Option<Vec<u8>>> {
        let mut client = self.client().await?;
        let request = QuerySmartContractStateRequest {
            address: contract.to_string(),
            query_data: serde_json::to_vec(msg)?,
        };
        match client.wasm.smart_contract_state(request).await {
            Ok(response) => Ok(Some(response.into_inner().data)),
            Err(status) if is_not_found(&status) => Ok(None),
            Err(status) => Err(DidHealthError::NonSuccessResponse(Box::new(status))),
        }
    }

    async fn raw(&self, contract: &str, key: &[u8]) -> DidHealthResult<Option<Vec<u8>>> {
        let mut client = self.client().await?;
        let request = QueryRawContractStateRequest {
            address: contract.to_string(),
            query_data: key.to_vec(),
        };
        let data = client
            .wasm
            .raw_contract_state(request)
            .await
            .map_err(|e| DidHealthError::NonSuccessResponse(Box::new(e)))?
            .into_inner()
            .data;
        Ok((!data.is_empty()).then_some(data))
    }

    async fn tx(&self, hash: &str) -> DidHealthResult<Option<CosmosTxResult>> {
        let mut client = self.client().await?;
        let request = GetTxRequest {
            hash: hash.trim_start_matches("0x").to_ascii_uppercase(),
        };
        let response = match client.tx.get_tx(request).await {
            Ok(response) => response.into_inner(),
            Err(status) if is_not_found(&status) => return Ok(None),
            Err(status) => return Err(DidHealthError::NonSuccessResponse(Box::new(status))),
        };
        let Some(tx) = response.tx_response else {
            return Ok(None);
        };
        Ok(Some(CosmosTxResult {
            height: u64::try_from(tx.height)?,
            code: tx.code,
            raw_log: tx.raw_log,
        }))
    }

    async fn latest_height(&self) -> DidHealthResult<u64> {
        let mut client = self.client().await?;
        let response = client
            .tendermint
            .get_latest_block(GetLatestBlockRequest {})
            .await
            .map_err(|e| DidHealthError::NonSuccessResponse(Box::new(e)))?
            .into_inner();
        let height = response
            .block
            .and_then(|b| b.header)
            .map(|h| h.height)
            .ok_or_else(|| DidHealthError::InvalidResponse("latest block without header".to_string()))?;
        Ok(u64::try_from(height)?)
    }
}

pub struct CosmosAdapter {
    entry: RegistryEntry,
    querier: Arc<dyn CosmWasmQuerier>,
    signer: Option<Arc<dyn CosmosSigner>>,
    policy: ConfirmationPolicy,
}

impl CosmosAdapter {
    pub fn new(entry: RegistryEntry, policy: ConfirmationPolicy) -> DidHealthResult<Self> {
        let querier = GrpcQuerier::new(&entry.rpc_url)?;
        Self::with_querier(entry, Arc::new(querier), policy)
    }

    pub fn with_querier(
        entry: RegistryEntry,
        querier: Arc<dyn CosmWasmQuerier>,
        policy: ConfirmationPolicy,
    ) -> DidHealthResult<Self> {
        if entry.registry.address.is_empty() {
            return Err(DidHealthError::BadConfiguration(format!(
                "no contract address configured for {}",
                entry.network
            )));
        }
        Ok(Self {
            entry,
            querier,
            signer: None,
            policy,
        })
    }

    pub fn with_signer(mut self, signer: Arc<dyn CosmosSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    fn contract(&self) -> &str {
        &self.entry.registry.address
    }

    async fn query_health_did(&self, did: &str) -> DidHealthResult<Option<RegistryRecord>> {
        let msg = serde_json::to_value(QueryMsg::GetHealthDID {
            health_did: did.to_string(),
        })?;
        let Some(data) = self.querier.smart(self.contract(), &msg).await? else {
            return Ok(None);
        };
        let state: HealthDidState = serde_json::from_slice(&data)?;
        let record = RegistryRecord::from(state);
        Ok((!record.is_empty()).then_some(record))
    }

    async fn execute(&self, did: &DidHealthParsed, msg: ExecuteMsg) -> DidHealthResult<TxHandle> {
        ensure_segment(&self.entry, did)?;
        let signer = self.signer.as_ref().ok_or_else(|| {
            DidHealthError::Wallet(format!("no Cosmos signer attached for {}", self.entry.network))
        })?;
        let hash = signer
            .execute(self.contract(), &serde_json::to_value(&msg)?)
            .await?;
        info!(network = %self.entry.network, tx = %hash, "contract execution submitted");
        Ok(TxHandle {
            network: self.entry.network.clone(),
            id: hash,
        })
    }
}

#[async_trait]
impl RegistryAdapter for CosmosAdapter {
    fn entry(&self) -> &RegistryEntry {
        &self.entry
    }

    async fn check_availability(&self, did: &DidHealthParsed) -> DidHealthResult<Availability> {
        ensure_segment(&self.entry, did)?;
        Ok(match self.query_health_did(&did.lookup_key()).await? {
            Some(record) => Availability::Taken {
                owner: record.owner,
            },
            None => Availability::Available,
        })
    }

    async fn submit_registration(&self, did: &DidHealthParsed, pointer_uri: &str) -> DidHealthResult<TxHandle> {
        let msg = ExecuteMsg::RegisterDID {
            health_did: did.lookup_key(),
            uri: pointer_uri.to_string(),
        };
        self.execute(did, msg).await
    }

    async fn submit_update(&self, did: &DidHealthParsed, pointer_uri: &str) -> DidHealthResult<TxHandle> {
        let msg = ExecuteMsg::UpdateDIDData {
            health_did: did.lookup_key(),
            uri: pointer_uri.to_string(),
        };
        self.execute(did, msg).await
    }

    async fn submit_alt_data(&self, did: &DidHealthParsed, uris: &[String]) -> DidHealthResult<TxHandle> {
        let msg = ExecuteMsg::AddAltData {
            health_did: did.lookup_key(),
            uris: uris.to_vec(),
        };
        self.execute(did, msg).await
    }

    async fn confirm(&self, tx: &TxHandle) -> DidHealthResult<TxReceipt> {
        let poller = Poller::new(self.policy);
        let required = self.entry.confirmations.max(1);

        let included = loop {
            if let Some(result) = self.querier.tx(&tx.id).await? {
                break result;
            }
            poller.wait(&tx.id).await?;
        };
        if included.code != 0 {
            warn!(network = %self.entry.network, tx = %tx.id, code = included.code, "transaction failed");
            return Err(DidHealthError::TransactionFailed {
                tx: tx.id.clone(),
                reason: included.raw_log,
            });
        }

        loop {
            let head = self.querier.latest_height().await?;
            let confirmations = head.saturating_sub(included.height) + 1;
            if confirmations >= required {
                return Ok(TxReceipt {
                    tx: tx.clone(),
                    block: Some(included.height),
                    confirmations,
                    explorer_url: self.entry.explorer_url(&tx.id),
                });
            }
            debug!(tx = %tx.id, confirmations, required, "waiting for blocks");
            poller.wait(&tx.id).await?;
        }
    }

    async fn resolve_by_wallet(&self, address: &str) -> DidHealthResult<Option<RegistryRecord>> {
        if !is_bech32_address(address) {
            return Ok(None);
        }
        let key = map_key(ADDRESS_DID_MAPPING_NAMESPACE, address.as_bytes());
        let Some(data) = self.querier.raw(self.contract(), &key).await? else {
            return Ok(None);
        };
        let state: HealthDidState = serde_json::from_slice(&data)?;
        let record = RegistryRecord::from(state);
        Ok((!record.is_empty()).then_some(record))
    }

    async fn resolve_by_name(&self, did: &DidHealthParsed) -> DidHealthResult<Option<RegistryRecord>> {
        ensure_segment(&self.entry, did)?;
        self.query_health_did(&did.lookup_key()).await
    }
}
