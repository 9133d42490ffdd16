//! Static knowledge of where did:health registries live on each supported chain.

use crate::resolution::parser::ChainSegment;

pub const SEPOLIA_CHAIN_ID: u64 = 11155111;
pub const BASE_SEPOLIA_CHAIN_ID: u64 = 84532;
pub const ARBITRUM_SEPOLIA_CHAIN_ID: u64 = 421614;
pub const OPTIMISM_SEPOLIA_CHAIN_ID: u64 = 11155420;
pub const SCROLL_SEPOLIA_CHAIN_ID: u64 = 534351;
pub const ZKSYNC_SEPOLIA_CHAIN_ID: u64 = 300;

/// default Ordinals indexer used for Bitcoin anchored DIDs
pub const DEFAULT_ORD_URL: &str = "https://ordinals.com";
pub const DEFAULT_SOLANA_RPC: &str = "https://api.mainnet-beta.solana.com";
/// Solana SPL Memo program
pub const MEMO_PROGRAM_ID: &str = "MemoSq4gqABAXKb96qnH8TysNcWxMyWCqXgDLGmfcHr";
pub const DEFAULT_COSMOS_CHAIN: &str = "dhealth";

/// hosted subgraphs indexing DAO membership events, one per chain
pub const GRAPH_STUDIO_URL: &str = "https://api.studio.thegraph.com/query/114229";

pub const DEFAULT_EVM_CONFIRMATIONS: u64 = 10;
pub const DEFAULT_COSMOS_CONFIRMATIONS: u64 = 2;

/// Interface spoken by a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryAbi {
    /// Solidity `HealthDIDRegistry`
    HealthDidRegistry,
    /// CosmWasm `health-did` contract (JSON execute/query messages)
    CosmWasmHealthDid,
    /// JSON anchor records inscribed as Ordinals
    OrdinalsAnchor,
    /// JSON anchor records carried by Memo program transactions
    MemoAnchor,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryContract {
    /// contract address, memo program id, or empty for Ordinals
    pub address: String,
    pub abi: RegistryAbi,
}

/// `DidHealthDAO` membership contract deployed next to an EVM registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaoContract {
    pub address: String,
    /// GraphQL endpoint indexing the contract's application events
    pub graph_url: String,
}

/// One catalog entry: how to reach the registry of a single chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    /// catalog key, e.g. `baseSepolia`
    pub network: String,
    /// human-readable chain name
    pub display_name: String,
    pub segment: ChainSegment,
    pub registry: RegistryContract,
    /// JSON-RPC URL (EVM, Solana), indexer URL (Bitcoin) or gRPC URL (Cosmos)
    pub rpc_url: String,
    /// chain identifier used inside access-control conditions
    pub access_control_chain: String,
    /// blocks required before a transaction counts as final
    pub confirmations: u64,
    /// prefix of a transaction link on a block explorer
    pub explorer_tx_url: Option<String>,
    pub dao: Option<DaoContract>,
}

impl RegistryEntry {
    pub fn evm(
        network: &str,
        display_name: &str,
        chain_id: u64,
        registry_address: &str,
        rpc_url: &str,
        access_control_chain: &str,
    ) -> Self {
        Self {
            network: network.to_string(),
            display_name: display_name.to_string(),
            segment: ChainSegment::Evm(chain_id),
            registry: RegistryContract {
                address: registry_address.to_string(),
                abi: RegistryAbi::HealthDidRegistry,
            },
            rpc_url: rpc_url.to_string(),
            access_control_chain: access_control_chain.to_string(),
            confirmations: DEFAULT_EVM_CONFIRMATIONS,
            explorer_tx_url: evm_explorer(chain_id).map(|base| format!("{base}/tx/")),
            dao: None,
        }
    }

    pub fn bitcoin(ord_url: &str) -> Self {
        Self {
            network: "bitcoin".to_string(),
            display_name: "Bitcoin".to_string(),
            segment: ChainSegment::Bitcoin,
            registry: RegistryContract {
                address: String::new(),
                abi: RegistryAbi::OrdinalsAnchor,
            },
            rpc_url: ord_url.to_string(),
            access_control_chain: "bitcoin".to_string(),
            confirmations: 1,
            explorer_tx_url: Some("https://ordinals.com/inscription/".to_string()),
            dao: None,
        }
    }

    pub fn solana(rpc_url: &str) -> Self {
        Self {
            network: "solana".to_string(),
            display_name: "Solana".to_string(),
            segment: ChainSegment::Solana,
            registry: RegistryContract {
                address: MEMO_PROGRAM_ID.to_string(),
                abi: RegistryAbi::MemoAnchor,
            },
            rpc_url: rpc_url.to_string(),
            access_control_chain: "solana".to_string(),
            confirmations: 1,
            explorer_tx_url: Some("https://explorer.solana.com/tx/".to_string()),
            dao: None,
        }
    }

    pub fn cosmos(chain_name: &str, grpc_url: &str, contract_address: &str) -> Self {
        Self {
            network: chain_name.to_string(),
            display_name: chain_name.to_string(),
            segment: ChainSegment::Cosmos(chain_name.to_string()),
            registry: RegistryContract {
                address: contract_address.to_string(),
                abi: RegistryAbi::CosmWasmHealthDid,
            },
            rpc_url: grpc_url.to_string(),
            access_control_chain: chain_name.to_string(),
            confirmations: DEFAULT_COSMOS_CONFIRMATIONS,
            explorer_tx_url: None,
            dao: None,
        }
    }

    /// Attach the chain's DAO contract; its subgraph is keyed by the access-control chain name.
    pub fn with_dao(mut self, address: &str) -> Self {
        self.dao = Some(DaoContract {
            address: address.to_string(),
            graph_url: format!(
                "{GRAPH_STUDIO_URL}/{}/version/latest",
                self.access_control_chain
            ),
        });
        self
    }

    /// Link to a transaction on the chain's block explorer, when one is known.
    pub fn explorer_url(&self, tx_id: &str) -> Option<String> {
        self.explorer_tx_url
            .as_ref()
            .map(|prefix| format!("{prefix}{tx_id}"))
    }
}

fn evm_explorer(chain_id: u64) -> Option<&'static str> {
    match chain_id {
        1 => Some("https://etherscan.io"),
        SEPOLIA_CHAIN_ID => Some("https://sepolia.etherscan.io"),
        BASE_SEPOLIA_CHAIN_ID => Some("https://sepolia.basescan.org"),
        SCROLL_SEPOLIA_CHAIN_ID => Some("https://sepolia.scrollscan.com"),
        ARBITRUM_SEPOLIA_CHAIN_ID => Some("https://sepolia.arbiscan.io"),
        OPTIMISM_SEPOLIA_CHAIN_ID => Some("https://sepolia-optimism.etherscan.io"),
        ZKSYNC_SEPOLIA_CHAIN_ID => Some("https://sepolia.explorer.zksync.io"),
        _ => None,
    }
}

/// Ordered set of registry entries. Iteration order is the resolution order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChainCatalog {
    entries: Vec<RegistryEntry>,
}

impl ChainCatalog {
    pub fn new(entries: Vec<RegistryEntry>) -> Self {
        let mut catalog = Self::default();
        for entry in entries {
            catalog.insert(entry);
        }
        catalog
    }

    /// the deployed testnet registries plus Bitcoin and Solana anchoring
    pub fn testnet() -> Self {
        Self::new(vec![
            RegistryEntry::evm(
                "arbitrumSepolia",
                "Arbitrum Sepolia",
                ARBITRUM_SEPOLIA_CHAIN_ID,
                "0x43D885B44a7Ce01C56E464AC21FB3FE2577bf3A1",
                "https://sepolia-rollup.arbitrum.io/rpc",
                "arbitrum-sepolia",
            )
            .with_dao("0x2Fe1180A5F8C28912eE68Addf4f8D2bbF24dedD4"),
            RegistryEntry::evm(
                "baseSepolia",
                "Base Sepolia",
                BASE_SEPOLIA_CHAIN_ID,
                "0x28A74406700F54FFdf21B7c17866aA9dfE5A6D45",
                "https://sepolia.base.org",
                "base-sepolia",
            )
            .with_dao("0x459B34995BcB264cCd648b69EA28B41BeB798Fe8"),
            RegistryEntry::evm(
                "optimismSepolia",
                "Optimism Sepolia",
                OPTIMISM_SEPOLIA_CHAIN_ID,
                "0xdd847306c11E59970c6253f766F85f32062cC244",
                "https://sepolia.optimism.io",
                "optimism-sepolia",
            )
            .with_dao("0x43D885B44a7Ce01C56E464AC21FB3FE2577bf3A1"),
            RegistryEntry::evm(
                "scrollSepolia",
                "Scroll Sepolia",
                SCROLL_SEPOLIA_CHAIN_ID,
                "0x28A74406700F54FFdf21B7c17866aA9dfE5A6D45",
                "https://sepolia-rpc.scroll.io",
                "scroll-sepolia",
            )
            .with_dao("0x459B34995BcB264cCd648b69EA28B41BeB798Fe8"),
            RegistryEntry::evm(
                "sepolia",
                "Sepolia",
                SEPOLIA_CHAIN_ID,
                "0xA9160f458EEfF7667938Ad0fD0a49c813944f9d2",
                "https://ethereum-sepolia-rpc.publicnode.com",
                "sepolia",
            )
            .with_dao("0x125e3D2720f6Ea390068Bf66E3801FC8a8CF454f"),
            RegistryEntry::evm(
                "zksyncSepolia",
                "zkSync Sepolia",
                ZKSYNC_SEPOLIA_CHAIN_ID,
                "0x2Fe1180A5F8C28912eE68Addf4f8D2bbF24dedD4",
                "https://sepolia.era.zksync.dev",
                "zksync-sepolia",
            )
            .with_dao("0xBD21CFe33eb75fe878a3Cb3DceDdcd2fb93a0C44"),
            RegistryEntry::bitcoin(DEFAULT_ORD_URL),
            RegistryEntry::solana(DEFAULT_SOLANA_RPC),
        ])
    }

    /// Add an entry, replacing any entry for the same chain in place.
    pub fn insert(&mut self, entry: RegistryEntry) {
        match self.entries.iter_mut().find(|e| e.segment == entry.segment) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    pub fn remove(&mut self, segment: &ChainSegment) -> Option<RegistryEntry> {
        let index = self.entries.iter().position(|e| &e.segment == segment)?;
        Some(self.entries.remove(index))
    }

    /// Keep only the named networks, preserving catalog order.
    pub fn retain_networks(&mut self, networks: &[&str]) {
        self.entries
            .retain(|e| networks.iter().any(|n| n.eq_ignore_ascii_case(&e.network)));
    }

    pub fn get(&self, segment: &ChainSegment) -> Option<&RegistryEntry> {
        self.entries.iter().find(|e| &e.segment == segment)
    }

    pub fn get_mut(&mut self, segment: &ChainSegment) -> Option<&mut RegistryEntry> {
        self.entries.iter_mut().find(|e| &e.segment == segment)
    }

    pub fn by_chain_id(&self, chain_id: u64) -> Option<&RegistryEntry> {
        self.get(&ChainSegment::Evm(chain_id))
    }

    pub fn by_network(&self, network: &str) -> Option<&RegistryEntry> {
        self.entries
            .iter()
            .find(|e| e.network.eq_ignore_ascii_case(network))
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegistryEntry> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut RegistryEntry> {
        self.entries.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> IntoIterator for &'a ChainCatalog {
    type Item = &'a RegistryEntry;
    type IntoIter = std::slice::Iter<'a, RegistryEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn testnet_catalog_has_deployed_registries_in_order() {
        let catalog = ChainCatalog::testnet();
        let networks: Vec<&str> = catalog.iter().map(|e| e.network.as_str()).collect();
        assert_eq!(
            networks,
            vec![
                "arbitrumSepolia",
                "baseSepolia",
                "optimismSepolia",
                "scrollSepolia",
                "sepolia",
                "zksyncSepolia",
                "bitcoin",
                "solana"
            ]
        );
        let sepolia = catalog.by_chain_id(SEPOLIA_CHAIN_ID).unwrap();
        assert_eq!(
            sepolia.registry.address,
            "0xA9160f458EEfF7667938Ad0fD0a49c813944f9d2"
        );
        assert_eq!(sepolia.confirmations, DEFAULT_EVM_CONFIRMATIONS);
    }

    #[test]
    fn every_testnet_evm_chain_has_a_dao_and_subgraph() {
        let catalog = ChainCatalog::testnet();
        for entry in catalog.iter().filter(|e| e.segment.chain_id().is_some()) {
            let dao = entry.dao.as_ref().unwrap();
            assert!(dao.address.starts_with("0x") && dao.address.len() == 42);
            assert!(dao.graph_url.ends_with("/version/latest"));
        }
        let sepolia = catalog.by_chain_id(SEPOLIA_CHAIN_ID).unwrap().dao.as_ref().unwrap();
        assert_eq!(sepolia.address, "0x125e3D2720f6Ea390068Bf66E3801FC8a8CF454f");
        assert_eq!(
            sepolia.graph_url,
            "https://api.studio.thegraph.com/query/114229/sepolia/version/latest"
        );
        let base = catalog.by_network("baseSepolia").unwrap().dao.as_ref().unwrap();
        assert!(base.graph_url.contains("/base-sepolia/"));
        assert!(catalog.get(&ChainSegment::Solana).unwrap().dao.is_none());
    }

    #[test]
    fn unknown_chain_is_absent_not_an_error() {
        let catalog = ChainCatalog::testnet();
        assert!(catalog.get(&ChainSegment::Evm(999_999)).is_none());
        assert!(catalog.get(&ChainSegment::Cosmos("dhealth".into())).is_none());
    }

    #[test]
    fn insert_replaces_same_chain_in_place() {
        let mut catalog = ChainCatalog::testnet();
        let len = catalog.len();
        let mut entry = catalog.by_network("baseSepolia").unwrap().clone();
        entry.rpc_url = "http://localhost:8545".into();
        catalog.insert(entry);
        assert_eq!(catalog.len(), len);
        assert_eq!(catalog.iter().nth(1).unwrap().rpc_url, "http://localhost:8545");

        catalog.insert(RegistryEntry::cosmos("dhealth", "http://localhost:9090", "tdh01"));
        assert_eq!(catalog.len(), len + 1);
        assert!(catalog.get(&ChainSegment::Cosmos("dhealth".into())).is_some());
    }

    #[test]
    fn retain_networks_keeps_order() {
        let mut catalog = ChainCatalog::testnet();
        catalog.retain_networks(&["sepolia", "BASESEPOLIA"]);
        let networks: Vec<&str> = catalog.iter().map(|e| e.network.as_str()).collect();
        assert_eq!(networks, vec!["baseSepolia", "sepolia"]);
    }

    #[test]
    fn explorer_links() {
        let catalog = ChainCatalog::testnet();
        let base = catalog.by_chain_id(BASE_SEPOLIA_CHAIN_ID).unwrap();
        assert_eq!(
            base.explorer_url("0xabc").as_deref(),
            Some("https://sepolia.basescan.org/tx/0xabc")
        );
        let cosmos = RegistryEntry::cosmos("dhealth", "http://localhost:9090", "tdh01");
        assert!(cosmos.explorer_url("ABC").is_none());
    }
}
