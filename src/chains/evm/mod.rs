//! `HealthDIDRegistry` and `DidHealthDAO` access through an ethers provider.

use std::{str::FromStr, sync::Arc, time::Duration};

use async_trait::async_trait;
use ethers::{
    abi::{Abi, Detokenize, ParamType, Tokenize, parse_abi},
    contract::Contract,
    providers::{Middleware, Provider},
    types::{
        Address, BlockId, BlockNumber, Bytes, H256, TransactionRequest, U64, U256,
        transaction::eip2718::TypedTransaction,
    },
};
use tracing::{debug, info, warn};

use self::dao::{
    APPLY_FOR_MEMBERSHIP, DaoProfile, GET_PROFILE, IS_MEMBER, MembershipApplication, REGISTRATION_FEE,
    dao_abi,
};
use super::{
    Availability, Poller, RegistryAdapter, TxHandle, TxReceipt, ensure_segment,
    rpc::{JsonRpc, RpcTransport},
};
use crate::{
    catalog::RegistryEntry,
    config::ConfirmationPolicy,
    crypto::{format_address, parse_address},
    error::{DidHealthError, DidHealthResult},
    resolution::{parser::DidHealthParsed, transformer::RegistryRecord},
};

pub mod dao;

pub const REGISTER_DID: &str = "registerDID";
pub const UPDATE_DID_DATA: &str = "updateDIDData";
pub const ADD_ALT_DATA: &str = "addAltData";
pub const GET_HEALTH_DID: &str = "getHealthDID";
pub const ADDRESS_DID_MAPPING: &str = "addressDidMapping";
pub const REGISTRATION_FEE_WEI: &str = "REGISTRATION_FEE_WEI";

const REGISTRY_ABI: &[&str] = &[
    "struct HealthDID { address owner; string healthDid; string ipfsUri; string[] altIpfsUris; bool hasWorldId; bool hasPolygonId; bool hasSocialId; uint256 reputationScore; }",
    "function registerDID(string healthDid, string ipfsUri) payable",
    "function updateDIDData(string healthDid, string ipfsUri)",
    "function addAltData(string healthDid, string[] altIpfsUris)",
    "function getHealthDID(string healthDid) view returns (HealthDID)",
    "function addressDidMapping(address owner) view returns (address owner, string healthDid, string ipfsUri, bool hasWorldId, bool hasPolygonId, bool hasSocialId, uint256 reputationScore)",
    "function REGISTRATION_FEE_WEI() view returns (uint256)",
];

/// selector of Solidity's `Error(string)` revert payload
const ERROR_STRING_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

/// `getHealthDID` returns a single struct:
/// `(owner, healthDid, ipfsUri, altIpfsUris[], hasWorldId, hasPolygonId, hasSocialId, reputationScore)`
type HealthDidStruct = (Address, String, String, Vec<String>, bool, bool, bool, U256);

/// The public mapping getter flattens the struct and omits its array member.
type AddressMapping = (Address, String, String, bool, bool, bool, U256);

type ChainContract = Contract<Provider<RpcTransport>>;

pub fn registry_abi() -> DidHealthResult<Abi> {
    parse_abi(REGISTRY_ABI).map_err(|e| DidHealthError::BadConfiguration(format!("registry ABI: {e}")))
}

/// Caller-supplied wallet that signs and broadcasts transactions.
#[async_trait]
pub trait EvmSigner: Send + Sync {
    async fn address(&self) -> DidHealthResult<Address>;
    /// Sign and broadcast, returning the transaction hash.
    async fn send_transaction(&self, tx: TypedTransaction) -> DidHealthResult<H256>;
}

pub struct EvmAdapter {
    entry: RegistryEntry,
    chain_id: u64,
    provider: Arc<Provider<RpcTransport>>,
    registry: ChainContract,
    dao: Option<ChainContract>,
    signer: Option<Arc<dyn EvmSigner>>,
    policy: ConfirmationPolicy,
}

impl EvmAdapter {
    pub fn new(entry: RegistryEntry, rpc: Arc<dyn JsonRpc>, policy: ConfirmationPolicy) -> DidHealthResult<Self> {
        Self::with_transport(entry, RpcTransport::new(rpc), policy)
    }

    /// adapter speaking HTTP JSON-RPC to the entry's `rpc_url`
    pub fn connect(entry: RegistryEntry, timeout: Duration, policy: ConfirmationPolicy) -> DidHealthResult<Self> {
        let transport = RpcTransport::http(&entry.rpc_url, timeout)?;
        Self::with_transport(entry, transport, policy)
    }

    fn with_transport(entry: RegistryEntry, transport: RpcTransport, policy: ConfirmationPolicy) -> DidHealthResult<Self> {
        let chain_id = entry.segment.chain_id().ok_or_else(|| {
            DidHealthError::BadConfiguration(format!("{} is not an EVM network", entry.network))
        })?;
        let contract_address = |address: &str, what: &str| {
            Address::from_str(address).map_err(|_| {
                DidHealthError::BadConfiguration(format!(
                    "{what} address for {} is not an EVM address: {address}",
                    entry.network
                ))
            })
        };
        let provider = Arc::new(transport.provider());
        let registry = Contract::new(
            contract_address(&entry.registry.address, "registry")?,
            registry_abi()?,
            provider.clone(),
        );
        let dao = match &entry.dao {
            Some(dao) => Some(Contract::new(
                contract_address(&dao.address, "DAO")?,
                dao_abi()?,
                provider.clone(),
            )),
            None => None,
        };
        Ok(Self {
            entry,
            chain_id,
            provider,
            registry,
            dao,
            signer: None,
            policy,
        })
    }

    pub fn with_signer(mut self, signer: Arc<dyn EvmSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Run a view function. An empty return (no code at the address) yields `None`.
    async fn view<T: Tokenize, D: Detokenize>(
        &self,
        contract: &ChainContract,
        name: &str,
        args: T,
    ) -> DidHealthResult<Option<D>> {
        let call = contract.method::<T, D>(name, args)?;
        let output = self.provider.call(&call.tx, None).await?;
        if output.is_empty() {
            return Ok(None);
        }
        Ok(Some(contract.decode_output(name, output)?))
    }

    pub async fn get_health_did(&self, lookup_key: &str) -> DidHealthResult<RegistryRecord> {
        let record: Option<HealthDidStruct> = self
            .view(&self.registry, GET_HEALTH_DID, lookup_key.to_string())
            .await?;
        Ok(record.map(health_did_record).unwrap_or_default())
    }

    pub async fn address_did_mapping(&self, address: &str) -> DidHealthResult<RegistryRecord> {
        let address = parse_address(address)?;
        let record: Option<AddressMapping> = self.view(&self.registry, ADDRESS_DID_MAPPING, address).await?;
        Ok(record.map(address_mapping_record).unwrap_or_default())
    }

    pub async fn registration_fee(&self) -> DidHealthResult<U256> {
        let fee: Option<U256> = self.view(&self.registry, REGISTRATION_FEE_WEI, ()).await?;
        Ok(fee.unwrap_or_default())
    }

    fn dao(&self) -> DidHealthResult<&ChainContract> {
        self.dao.as_ref().ok_or_else(|| {
            DidHealthError::MethodNotSupported(format!("no DAO deployed on {}", self.entry.network))
        })
    }

    pub fn dao_address(&self) -> Option<&str> {
        self.entry.dao.as_ref().map(|dao| dao.address.as_str())
    }

    /// The member's self-declared profile, or `None` for an unknown address.
    pub async fn dao_profile(&self, address: &str) -> DidHealthResult<Option<DaoProfile>> {
        let profile: Option<(String, String, String)> =
            self.view(self.dao()?, GET_PROFILE, parse_address(address)?).await?;
        Ok(profile
            .filter(|(did, _, _)| !did.is_empty())
            .map(|(did, role, org_name)| DaoProfile { did, role, org_name }))
    }

    /// Whether `address` is an approved member.
    pub async fn is_member(&self, address: &str) -> DidHealthResult<bool> {
        let member: Option<bool> = self.view(self.dao()?, IS_MEMBER, parse_address(address)?).await?;
        Ok(member.unwrap_or(false))
    }

    pub async fn dao_registration_fee(&self) -> DidHealthResult<U256> {
        let fee: Option<U256> = self.view(self.dao()?, REGISTRATION_FEE, ()).await?;
        Ok(fee.unwrap_or_default())
    }

    /// Apply to the DAO, paying the fee the contract currently asks for.
    pub async fn apply_for_membership(&self, application: &MembershipApplication) -> DidHealthResult<TxHandle> {
        let dao = self.dao()?;
        let fee = self.dao_registration_fee().await?;
        debug!(network = %self.entry.network, did = %application.did, %fee, "applying for DAO membership");
        self.send(
            dao,
            APPLY_FOR_MEMBERSHIP,
            (
                application.did.clone(),
                application.role.clone(),
                application.org_name.clone(),
                application.ipfs_uri.clone(),
            ),
            fee,
        )
        .await
    }

    async fn send<T: Tokenize>(
        &self,
        contract: &ChainContract,
        name: &str,
        args: T,
        value: U256,
    ) -> DidHealthResult<TxHandle> {
        let signer = self.signer.as_ref().ok_or_else(|| {
            DidHealthError::Wallet(format!("no EVM signer attached for {}", self.entry.network))
        })?;
        let from = signer.address().await?;
        let mut tx = contract.method::<T, ()>(name, args)?.from(from).value(value).tx;
        tx.set_chain_id(self.chain_id);
        let hash = signer.send_transaction(tx).await?;
        let id = format!("{hash:#x}");
        info!(network = %self.entry.network, tx = %id, "transaction submitted");
        Ok(TxHandle {
            network: self.entry.network.clone(),
            id,
        })
    }

    /// Re-run a failed transaction as a call at its block to recover the revert reason.
    async fn revert_reason(&self, hash: H256, block: U64) -> Option<String> {
        let tx = self.provider.get_transaction(hash).await.ok()??;
        let mut replay = TransactionRequest::new().from(tx.from).data(tx.input).value(tx.value);
        if let Some(to) = tx.to {
            replay = replay.to(to);
        }
        let replay: TypedTransaction = replay.into();
        let at = BlockId::Number(BlockNumber::Number(block));
        match self.provider.call(&replay, Some(at)).await.map_err(DidHealthError::from) {
            Err(DidHealthError::RpcError { message, data, .. }) => data
                .as_deref()
                .and_then(decode_revert_reason)
                .or(Some(message)),
            _ => None,
        }
    }

    async fn block_number(&self) -> DidHealthResult<u64> {
        Ok(self.provider.get_block_number().await?.as_u64())
    }
}

fn health_did_record(
    (owner, health_did, pointer_uri, alt_pointer_uris, has_world_id, has_polygon_id, has_social_id, score): HealthDidStruct,
) -> RegistryRecord {
    RegistryRecord {
        owner: format_address(&owner),
        health_did,
        pointer_uri,
        alt_pointer_uris,
        has_world_id,
        has_polygon_id,
        has_social_id,
        reputation_score: Some(score.low_u64()),
        stored_document: None,
    }
}

fn address_mapping_record(
    (owner, health_did, pointer_uri, has_world_id, has_polygon_id, has_social_id, score): AddressMapping,
) -> RegistryRecord {
    RegistryRecord {
        owner: format_address(&owner),
        health_did,
        pointer_uri,
        alt_pointer_uris: Vec::new(),
        has_world_id,
        has_polygon_id,
        has_social_id,
        reputation_score: Some(score.low_u64()),
        stored_document: None,
    }
}

/// Decode an `Error(string)` revert payload given as `0x`-hex.
fn decode_revert_reason(data: &str) -> Option<String> {
    let bytes = Bytes::from_str(data).ok()?;
    let payload = bytes.strip_prefix(&ERROR_STRING_SELECTOR)?;
    ethers::abi::decode(&[ParamType::String], payload)
        .ok()?
        .pop()?
        .into_string()
}

fn is_evm_address(address: &str) -> bool {
    address.len() == 42
        && address.starts_with("0x")
        && address[2..].bytes().all(|b| b.is_ascii_hexdigit())
}

#[async_trait]
impl RegistryAdapter for EvmAdapter {
    fn entry(&self) -> &RegistryEntry {
        &self.entry
    }

    async fn check_availability(&self, did: &DidHealthParsed) -> DidHealthResult<Availability> {
        ensure_segment(&self.entry, did)?;
        match self.get_health_did(&did.lookup_key()).await {
            Ok(record) if record.is_empty() => Ok(Availability::Available),
            Ok(record) => Ok(Availability::Taken {
                owner: record.owner,
            }),
            Err(e) if e.is_revert() => {
                debug!(did = %did.did, "lookup reverted, treating as available");
                Ok(Availability::Available)
            }
            Err(e) => Err(e),
        }
    }

    async fn submit_registration(&self, did: &DidHealthParsed, pointer_uri: &str) -> DidHealthResult<TxHandle> {
        ensure_segment(&self.entry, did)?;
        let fee = self.registration_fee().await?;
        self.send(
            &self.registry,
            REGISTER_DID,
            (did.lookup_key(), pointer_uri.to_string()),
            fee,
        )
        .await
    }

    async fn submit_update(&self, did: &DidHealthParsed, pointer_uri: &str) -> DidHealthResult<TxHandle> {
        ensure_segment(&self.entry, did)?;
        self.send(
            &self.registry,
            UPDATE_DID_DATA,
            (did.lookup_key(), pointer_uri.to_string()),
            U256::zero(),
        )
        .await
    }

    async fn submit_alt_data(&self, did: &DidHealthParsed, uris: &[String]) -> DidHealthResult<TxHandle> {
        ensure_segment(&self.entry, did)?;
        self.send(
            &self.registry,
            ADD_ALT_DATA,
            (did.lookup_key(), uris.to_vec()),
            U256::zero(),
        )
        .await
    }

    async fn confirm(&self, tx: &TxHandle) -> DidHealthResult<TxReceipt> {
        let poller = Poller::new(self.policy);
        let required = self.entry.confirmations.max(1);
        let hash = H256::from_str(&tx.id)
            .map_err(|_| DidHealthError::InvalidResponse(format!("not a transaction hash: {}", tx.id)))?;

        let receipt = loop {
            if let Some(receipt) = self.provider.get_transaction_receipt(hash).await? {
                break receipt;
            }
            poller.wait(&tx.id).await?;
        };

        let block = receipt
            .block_number
            .ok_or_else(|| DidHealthError::InvalidResponse("receipt without blockNumber".to_string()))?;
        if receipt.status.is_some_and(|status| status.is_zero()) {
            let reason = self
                .revert_reason(hash, block)
                .await
                .unwrap_or_else(|| "transaction reverted".to_string());
            warn!(network = %self.entry.network, tx = %tx.id, %reason, "transaction failed");
            return Err(DidHealthError::TransactionFailed {
                tx: tx.id.clone(),
                reason,
            });
        }

        let block = block.as_u64();
        loop {
            let head = self.block_number().await?;
            let confirmations = head.saturating_sub(block) + 1;
            if confirmations >= required {
                info!(network = %self.entry.network, tx = %tx.id, block, confirmations, "transaction confirmed");
                return Ok(TxReceipt {
                    tx: tx.clone(),
                    block: Some(block),
                    confirmations,
                    explorer_url: self.entry.explorer_url(&tx.id),
                });
            }
            debug!(tx = %tx.id, confirmations, required, "waiting for confirmations");
            poller.wait(&tx.id).await?;
        }
    }

    async fn resolve_by_wallet(&self, address: &str) -> DidHealthResult<Option<RegistryRecord>> {
        if !is_evm_address(address) {
            return Ok(None);
        }
        let record = self.address_did_mapping(address).await?;
        Ok((!record.is_empty()).then_some(record))
    }

    async fn resolve_by_name(&self, did: &DidHealthParsed) -> DidHealthResult<Option<RegistryRecord>> {
        ensure_segment(&self.entry, did)?;
        match self.get_health_did(&did.lookup_key()).await {
            Ok(record) => Ok((!record.is_empty()).then_some(record)),
            Err(e) if e.is_revert() => Ok(None),
            Err(e) => Err(e),
        }
    }
}


#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use ethers::{abi::Token, contract::BaseContract};
    use serde_json::json;

    use super::{testing::*, *};
    use crate::{
        chains::rpc::{
            RpcTransportError,
            testing::{ScriptedRpc, revert, timed_out},
        },
        resolution::parser::DidHealthParser,
    };

    const WALLET: &str = "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf";

    fn empty_chain() -> SharedChain {
        Arc::new(Mutex::new(ChainState::default()))
    }

    #[tokio::test]
    async fn revert_means_available_but_timeout_is_an_error() {
        let did = DidHealthParser::parse("did:health:11155111:alice").unwrap();

        let reverting = ScriptedRpc::new(|_, _| Err(RpcTransportError::node(-32000, "execution reverted")));
        let adapter = EvmAdapter::new(sepolia_entry(), Arc::new(reverting), fast_policy()).unwrap();
        assert_eq!(adapter.check_availability(&did).await.unwrap(), Availability::Available);

        let code_three = ScriptedRpc::new(|_, _| Err(revert("no such DID")));
        let adapter = EvmAdapter::new(sepolia_entry(), Arc::new(code_three), fast_policy()).unwrap();
        assert!(adapter.resolve_by_name(&did).await.unwrap().is_none());

        let timing_out = ScriptedRpc::new(|_, _| Err(timed_out()));
        let adapter = EvmAdapter::new(sepolia_entry(), Arc::new(timing_out), fast_policy()).unwrap();
        let e = adapter.check_availability(&did).await.unwrap_err();
        assert!(matches!(e, DidHealthError::TransportError(_)));
    }

    #[tokio::test]
    async fn register_then_lookup() {
        let chain = empty_chain();
        let adapter = fake_adapter(chain.clone(), WALLET);
        let did = DidHealthParser::parse("did:health:11155111:alice").unwrap();

        assert!(adapter.check_availability(&did).await.unwrap().is_available());
        let receipt = adapter.register(&did, "ipfs://bafydoc/didDocument/1.json").await.unwrap();
        assert_eq!(receipt.block, Some(16));
        assert_eq!(receipt.confirmations, 17);
        assert_eq!(receipt.tx.id.len(), 66);
        assert!(receipt.explorer_url.unwrap().starts_with("https://sepolia.etherscan.io/tx/0x"));

        {
            let state = chain.lock().unwrap();
            let sent = &state.sent[0];
            assert_eq!(sent.chain_id(), Some(U64::from(11_155_111u64)));
            assert_eq!(
                sent.to_addr().copied(),
                Some(parse_address("0xA9160f458EEfF7667938Ad0fD0a49c813944f9d2").unwrap())
            );
            assert_eq!(sent.from().copied(), Some(parse_address(WALLET).unwrap()));
            let registry: BaseContract = registry_abi().unwrap().into();
            let (key, uri): (String, String) = registry.decode(REGISTER_DID, sent.data().unwrap()).unwrap();
            assert_eq!(key, "11155111:alice");
            assert_eq!(uri, "ipfs://bafydoc/didDocument/1.json");
        }

        assert_eq!(
            adapter.check_availability(&did).await.unwrap(),
            Availability::Taken { owner: WALLET.to_string() }
        );
        let by_name = adapter.resolve_by_name(&did).await.unwrap().unwrap();
        assert_eq!(by_name.health_did, "11155111:alice");
        assert_eq!(by_name.pointer_uri, "ipfs://bafydoc/didDocument/1.json");

        let by_wallet = adapter.resolve_by_wallet(&WALLET.to_uppercase().replace("0X", "0x")).await.unwrap().unwrap();
        assert_eq!(by_wallet.owner, WALLET);

        adapter.submit_alt_data(&did, &["ipfs://bafyalt/Patient/2.json".to_string()]).await.unwrap();
        let with_alt = adapter.resolve_by_name(&did).await.unwrap().unwrap();
        assert_eq!(with_alt.alt_pointer_uris, vec!["ipfs://bafyalt/Patient/2.json"]);
    }

    #[tokio::test]
    async fn unknown_wallet_and_foreign_address() {
        let adapter = fake_adapter(empty_chain(), WALLET);
        assert!(adapter.resolve_by_wallet(WALLET).await.unwrap().is_none());
        assert!(adapter
            .resolve_by_wallet("7EcDhSYGxXyscszYEp35KHN8vvw3svAuLKTzXwCFLtV")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn failed_receipt_carries_the_revert_reason() {
        let chain = Arc::new(Mutex::new(ChainState {
            fail_next: true,
            ..Default::default()
        }));
        let adapter = fake_adapter(chain, WALLET);
        let did = DidHealthParser::parse("did:health:11155111:bob").unwrap();
        match adapter.register(&did, "ipfs://x").await.unwrap_err() {
            DidHealthError::TransactionFailed { reason, .. } => assert_eq!(reason, "DID already registered"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn registration_without_signer_is_a_wallet_error() {
        let rpc = Arc::new(registry_rpc(empty_chain()));
        let adapter = EvmAdapter::new(sepolia_entry(), rpc, fast_policy()).unwrap();
        let did = DidHealthParser::parse("did:health:11155111:carol").unwrap();
        let e = adapter.submit_registration(&did, "ipfs://x").await.unwrap_err();
        assert!(matches!(e, DidHealthError::Wallet(_)));
    }

    #[tokio::test]
    async fn other_chain_dids_are_rejected() {
        let adapter = fake_adapter(empty_chain(), WALLET);
        let did = DidHealthParser::parse("did:health:84532:alice").unwrap();
        let e = adapter.resolve_by_name(&did).await.unwrap_err();
        assert!(matches!(e, DidHealthError::NetworkNotSupported(_)));
    }

    #[test]
    fn mapping_getter_layout() {
        let registry: BaseContract = registry_abi().unwrap().into();
        let tokens = vec![
            Token::Address(Address::repeat_byte(0x22)),
            Token::String("84532:dave".into()),
            Token::String("ipfs://d".into()),
            Token::Bool(true),
            Token::Bool(false),
            Token::Bool(true),
            Token::Uint(U256::from(9u64)),
        ];
        let decoded: AddressMapping = registry
            .decode_output(ADDRESS_DID_MAPPING, ethers::abi::encode(&tokens))
            .unwrap();
        let record = address_mapping_record(decoded);
        assert_eq!(record.health_did, "84532:dave");
        assert_eq!(record.owner, format!("0x{}", "22".repeat(20)));
        assert!(record.has_world_id && record.has_social_id && !record.has_polygon_id);
        assert_eq!(record.reputation_score, Some(9));

        let truncated = ethers::abi::encode(&tokens[..2]);
        assert!(registry
            .decode_output::<AddressMapping, _>(ADDRESS_DID_MAPPING, truncated)
            .is_err());
    }

    #[tokio::test]
    async fn oversized_offsets_are_rejected_not_followed() {
        // a single word pointing the struct offset at u64::MAX
        let mut word = [0u8; 32];
        word[24..].copy_from_slice(&u64::MAX.to_be_bytes());
        let hostile = format!("0x{}", hex::encode(word));
        let rpc = ScriptedRpc::new(move |_, _| Ok(json!(hostile)));
        let adapter = EvmAdapter::new(sepolia_entry(), Arc::new(rpc), fast_policy()).unwrap();

        let did = DidHealthParser::parse("did:health:11155111:alice").unwrap();
        let e = adapter.resolve_by_name(&did).await.unwrap_err();
        assert!(matches!(e, DidHealthError::ParsingError(_)));
        assert!(adapter.resolve_by_wallet(WALLET).await.is_err());
    }

    #[test]
    fn revert_payloads() {
        let mut data = ERROR_STRING_SELECTOR.to_vec();
        data.extend(ethers::abi::encode(&[Token::String("nope".into())]));
        assert_eq!(
            decode_revert_reason(&format!("0x{}", hex::encode(&data))).as_deref(),
            Some("nope")
        );
        assert!(decode_revert_reason("0xdeadbeef").is_none());
        assert!(decode_revert_reason("not hex").is_none());
    }

    #[tokio::test]
    async fn dao_membership_application_pays_the_contract_fee() {
        let chain = empty_chain();
        let adapter = fake_adapter(chain.clone(), WALLET);
        assert!(adapter.dao_profile(WALLET).await.unwrap().is_none());
        assert!(!adapter.is_member(WALLET).await.unwrap());
        assert_eq!(adapter.dao_registration_fee().await.unwrap(), U256::from(DAO_FEE));

        let application = MembershipApplication {
            did: "did:health:11155111:acme".into(),
            role: "Organization".into(),
            org_name: "Acme Clinic".into(),
            ipfs_uri: "ipfs://bafyorg/Organization/acme.json".into(),
        };
        let tx = adapter.apply_for_membership(&application).await.unwrap();
        let receipt = adapter.confirm(&tx).await.unwrap();
        assert_eq!(receipt.block, Some(16));

        {
            let state = chain.lock().unwrap();
            let sent = state.sent.last().unwrap();
            assert_eq!(sent.value().copied(), Some(U256::from(DAO_FEE)));
            let dao_address = adapter.dao_address().unwrap();
            assert_eq!(sent.to_addr().copied(), Some(parse_address(dao_address).unwrap()));
        }

        let profile = adapter.dao_profile(WALLET).await.unwrap().unwrap();
        assert_eq!(profile.org_name, "Acme Clinic");
        assert_eq!(profile.role, "Organization");
        // pending until approved
        assert!(!adapter.is_member(WALLET).await.unwrap());

        chain.lock().unwrap().members.get_mut(WALLET).unwrap().approved = true;
        assert!(adapter.is_member(WALLET).await.unwrap());
    }

    #[tokio::test]
    async fn chains_without_a_dao_say_so() {
        let mut entry = sepolia_entry();
        entry.dao = None;
        let adapter = EvmAdapter::new(entry, Arc::new(registry_rpc(empty_chain())), fast_policy()).unwrap();
        let e = adapter.is_member(WALLET).await.unwrap_err();
        assert!(matches!(e, DidHealthError::MethodNotSupported(_)));
    }
}
