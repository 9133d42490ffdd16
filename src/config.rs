//! Resolver configuration: the chain catalog plus storage and confirmation settings,
//! with an environment overlay for deployments.

use std::{env, path::PathBuf, time::Duration};

use tracing::debug;

use crate::{
    catalog::{ChainCatalog, DEFAULT_COSMOS_CHAIN, RegistryEntry},
    error::{DidHealthError, DidHealthResult},
    resolution::parser::ChainSegment,
};

/// default Kubo-compatible API for uploads
pub const DEFAULT_IPFS_API_URL: &str = "http://127.0.0.1:5001";
/// default HTTP gateway used to read content
pub const DEFAULT_IPFS_GATEWAY: &str = "https://w3s.link";

/// Where blobs are written and read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfiguration {
    pub ipfs_api_url: String,
    /// bearer token sent with uploads (pinning services)
    pub ipfs_api_token: Option<String>,
    pub gateway_url: String,
}

impl Default for StorageConfiguration {
    fn default() -> Self {
        Self {
            ipfs_api_url: DEFAULT_IPFS_API_URL.to_string(),
            ipfs_api_token: None,
            gateway_url: DEFAULT_IPFS_GATEWAY.to_string(),
        }
    }
}

/// How long to wait for a submitted transaction to reach its confirmation depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmationPolicy {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(4),
            timeout: Duration::from_secs(600),
        }
    }
}

/// Configuration for the [crate::resolution::resolver::CrossChainResolver] and registrars
#[derive(Debug, Clone)]
pub struct DidHealthResolverConfiguration {
    /// which chains are resolvable, in resolution order
    pub networks: ChainCatalog,
    pub storage: StorageConfiguration,
    pub confirmation: ConfirmationPolicy,
    /// per-request timeout for HTTP clients
    pub request_timeout: Duration,
    /// file backing the Bitcoin/Solana anchor index, in-memory when unset
    pub anchor_index_path: Option<PathBuf>,
}

impl Default for DidHealthResolverConfiguration {
    fn default() -> Self {
        Self {
            networks: ChainCatalog::testnet(),
            storage: StorageConfiguration::default(),
            confirmation: ConfirmationPolicy::default(),
            request_timeout: Duration::from_secs(10),
            anchor_index_path: None,
        }
    }
}

impl DidHealthResolverConfiguration {
    /// Defaults overlaid with `DID_HEALTH_*` variables, after loading `.env` if present.
    pub fn from_env() -> DidHealthResult<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Defaults overlaid with values returned by `lookup`.
    pub fn from_lookup<F>(lookup: F) -> DidHealthResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        for entry in config.networks.iter_mut() {
            if matches!(entry.segment, ChainSegment::Evm(_)) {
                let key = format!("DID_HEALTH_RPC_{}", env_key(&entry.network));
                if let Some(url) = lookup(&key) {
                    debug!(network = %entry.network, "rpc url overridden by {key}");
                    entry.rpc_url = url;
                }
            }
        }

        if let Some(value) = lookup("DID_HEALTH_CONFIRMATIONS") {
            let confirmations = parse_number("DID_HEALTH_CONFIRMATIONS", &value)?;
            for entry in config.networks.iter_mut() {
                if matches!(entry.segment, ChainSegment::Evm(_)) {
                    entry.confirmations = confirmations;
                }
            }
        }

        if let Some(url) = lookup("DID_HEALTH_ORD_URL") {
            if let Some(entry) = config.networks.get_mut(&ChainSegment::Bitcoin) {
                entry.rpc_url = url;
            }
        }
        if let Some(url) = lookup("DID_HEALTH_SOLANA_RPC_URL") {
            if let Some(entry) = config.networks.get_mut(&ChainSegment::Solana) {
                entry.rpc_url = url;
            }
        }

        match (
            lookup("DID_HEALTH_COSMOS_GRPC_URL"),
            lookup("DID_HEALTH_COSMOS_CONTRACT"),
        ) {
            (Some(grpc_url), Some(contract)) => {
                let chain =
                    lookup("DID_HEALTH_COSMOS_CHAIN").unwrap_or(DEFAULT_COSMOS_CHAIN.to_string());
                if !matches!(ChainSegment::parse(&chain), Ok(ChainSegment::Cosmos(_))) {
                    return Err(DidHealthError::BadConfiguration(format!(
                        "DID_HEALTH_COSMOS_CHAIN is not a valid chain name: {chain}"
                    )));
                }
                config
                    .networks
                    .insert(RegistryEntry::cosmos(&chain, &grpc_url, &contract));
            }
            (Some(_), None) => {
                return Err(DidHealthError::BadConfiguration(
                    "DID_HEALTH_COSMOS_GRPC_URL is set but DID_HEALTH_COSMOS_CONTRACT is not"
                        .to_string(),
                ));
            }
            (None, Some(_)) => {
                return Err(DidHealthError::BadConfiguration(
                    "DID_HEALTH_COSMOS_CONTRACT is set but DID_HEALTH_COSMOS_GRPC_URL is not"
                        .to_string(),
                ));
            }
            (None, None) => {}
        }

        if let Some(networks) = lookup("DID_HEALTH_NETWORKS") {
            let names: Vec<&str> = networks
                .split(',')
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .collect();
            config.networks.retain_networks(&names);
            if config.networks.is_empty() {
                return Err(DidHealthError::BadConfiguration(format!(
                    "DID_HEALTH_NETWORKS matches no known network: {networks}"
                )));
            }
        }

        if let Some(url) = lookup("DID_HEALTH_IPFS_API_URL") {
            config.storage.ipfs_api_url = url;
        }
        if let Some(token) = lookup("DID_HEALTH_IPFS_API_TOKEN") {
            config.storage.ipfs_api_token = Some(token);
        }
        if let Some(url) = lookup("DID_HEALTH_IPFS_GATEWAY") {
            config.storage.gateway_url = url;
        }

        if let Some(value) = lookup("DID_HEALTH_POLL_INTERVAL_SECS") {
            config.confirmation.poll_interval =
                Duration::from_secs(parse_number("DID_HEALTH_POLL_INTERVAL_SECS", &value)?);
        }
        if let Some(value) = lookup("DID_HEALTH_CONFIRMATION_TIMEOUT_SECS") {
            config.confirmation.timeout =
                Duration::from_secs(parse_number("DID_HEALTH_CONFIRMATION_TIMEOUT_SECS", &value)?);
        }
        if let Some(value) = lookup("DID_HEALTH_REQUEST_TIMEOUT_SECS") {
            config.request_timeout =
                Duration::from_secs(parse_number("DID_HEALTH_REQUEST_TIMEOUT_SECS", &value)?);
        }
        if let Some(path) = lookup("DID_HEALTH_ANCHOR_INDEX") {
            config.anchor_index_path = Some(PathBuf::from(path));
        }

        Ok(config)
    }
}

/// `baseSepolia` -> `BASE_SEPOLIA`
fn env_key(network: &str) -> String {
    let mut key = String::with_capacity(network.len() + 4);
    for (i, c) in network.chars().enumerate() {
        if c.is_ascii_uppercase() && i > 0 {
            key.push('_');
        }
        if c == '-' {
            key.push('_');
        } else {
            key.push(c.to_ascii_uppercase());
        }
    }
    key
}

fn parse_number(key: &str, value: &str) -> DidHealthResult<u64> {
    value.trim().parse().map_err(|_| {
        DidHealthError::BadConfiguration(format!("{key} must be a non-negative integer: {value}"))
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::catalog::BASE_SEPOLIA_CHAIN_ID;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_variables() {
        let config = DidHealthResolverConfiguration::from_lookup(|_| None).unwrap();
        assert_eq!(config.networks, ChainCatalog::testnet());
        assert_eq!(config.storage.gateway_url, DEFAULT_IPFS_GATEWAY);
        assert!(config.anchor_index_path.is_none());
    }

    #[test]
    fn rpc_and_confirmation_overrides() {
        let config = DidHealthResolverConfiguration::from_lookup(lookup_from(&[
            ("DID_HEALTH_RPC_BASE_SEPOLIA", "http://localhost:8545"),
            ("DID_HEALTH_CONFIRMATIONS", "3"),
            ("DID_HEALTH_IPFS_API_TOKEN", "secret"),
        ]))
        .unwrap();
        let base = config.networks.by_chain_id(BASE_SEPOLIA_CHAIN_ID).unwrap();
        assert_eq!(base.rpc_url, "http://localhost:8545");
        assert_eq!(base.confirmations, 3);
        assert_eq!(config.storage.ipfs_api_token.as_deref(), Some("secret"));
    }

    #[test]
    fn cosmos_requires_both_url_and_contract() {
        let e = DidHealthResolverConfiguration::from_lookup(lookup_from(&[(
            "DID_HEALTH_COSMOS_GRPC_URL",
            "http://localhost:9090",
        )]))
        .unwrap_err();
        assert!(matches!(e, DidHealthError::BadConfiguration(_)));

        let config = DidHealthResolverConfiguration::from_lookup(lookup_from(&[
            ("DID_HEALTH_COSMOS_GRPC_URL", "http://localhost:9090"),
            ("DID_HEALTH_COSMOS_CONTRACT", "tdh01contract"),
        ]))
        .unwrap();
        let cosmos = config
            .networks
            .get(&ChainSegment::Cosmos("dhealth".into()))
            .unwrap();
        assert_eq!(cosmos.registry.address, "tdh01contract");
    }

    #[test]
    fn malformed_number_is_bad_configuration() {
        let e = DidHealthResolverConfiguration::from_lookup(lookup_from(&[(
            "DID_HEALTH_CONFIRMATIONS",
            "ten",
        )]))
        .unwrap_err();
        assert!(e.to_string().contains("DID_HEALTH_CONFIRMATIONS"));
    }

    #[test]
    fn network_filter() {
        let config = DidHealthResolverConfiguration::from_lookup(lookup_from(&[(
            "DID_HEALTH_NETWORKS",
            "sepolia, solana",
        )]))
        .unwrap();
        assert_eq!(config.networks.len(), 2);

        let e = DidHealthResolverConfiguration::from_lookup(lookup_from(&[(
            "DID_HEALTH_NETWORKS",
            "mainnet",
        )]))
        .unwrap_err();
        assert!(matches!(e, DidHealthError::BadConfiguration(_)));
    }

    #[test]
    fn env_keys_from_network_names() {
        assert_eq!(env_key("baseSepolia"), "BASE_SEPOLIA");
        assert_eq!(env_key("sepolia"), "SEPOLIA");
        assert_eq!(env_key("zksyncSepolia"), "ZKSYNC_SEPOLIA");
    }
}
