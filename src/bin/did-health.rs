use std::sync::Arc;

use clap::{Parser, Subcommand};
use did_resolver_health::{
    chains::{
        AnchorIndex, Availability, EvmAdapter,
        evm::dao::{ApprovedMember, MemberDirectory},
    },
    config::DidHealthResolverConfiguration,
    error::{DidHealthError, DidHealthResult},
    resolution::{
        parser::{ChainSegment, DidHealthParser},
        resolver::{CrossChainResolver, ResolvedIdentity},
        transformer::document_to_json,
    },
    storage::{ContentStore, IpfsHttpStore},
};
use serde_json::{Value, json};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "did-health")]
#[command(about = "Resolve and inspect did:health identifiers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a DID and show its parts
    Parse { did: String },
    /// Resolve a DID to its identity document
    Resolve { did: String },
    /// Find the DID registered by a wallet
    ResolveWallet {
        address: String,
        /// Only look on this chain (e.g. `11155111`, `btc`, `solana`)
        #[arg(long)]
        chain: Option<String>,
    },
    /// Check whether a DID is still available, or a bare name on every chain
    Check { did: String },
    /// List the configured chains in resolution order
    Chains,
    /// Fetch a blob by `ipfs://` URI or gateway URL
    Fetch { uri: String },
    /// Search approved DAO members by organization name on every chain
    Members { search: String },
    /// Show an address's DAO membership and profile
    Membership {
        address: String,
        /// Catalog network, e.g. `sepolia`
        #[arg(long, default_value = "sepolia")]
        network: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "did_resolver_health=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = DidHealthResolverConfiguration::from_env()?;

    let output = match cli.command {
        Commands::Parse { did } => {
            let parsed = DidHealthParser::parse(&did)?;
            json!({
                "did": parsed.did,
                "chain": parsed.segment.to_string(),
                "family": parsed.segment.family(),
                "name": parsed.name,
                "fragment": parsed.fragment,
                "lookupKey": parsed.lookup_key(),
            })
        }
        Commands::Resolve { did } => match resolver(&config).await?.resolve_by_name(&did).await? {
            Some(resolved) => identity_json(&resolved)?,
            None => return Err(DidHealthError::DidNotFound(did).into()),
        },
        Commands::ResolveWallet { address, chain } => {
            let resolver = resolver(&config).await?;
            let found = match chain {
                Some(chain) => {
                    let segment = ChainSegment::parse(&chain)?;
                    resolver.resolve_by_wallet_on(&address, &segment).await?
                }
                None => resolver.resolve_by_wallet(&address).await?,
            };
            match found {
                Some(resolved) => identity_json(&resolved)?,
                None => return Err(DidHealthError::DidNotFound(address).into()),
            }
        }
        Commands::Check { did } => {
            let resolver = resolver(&config).await?;
            if did.starts_with("did:") {
                json!({ "did": did, "availability": availability_json(&resolver.check_availability(&did).await?) })
            } else {
                let results: Vec<Value> = resolver
                    .search_available(&did)
                    .await
                    .into_iter()
                    .map(|(network, outcome)| match outcome {
                        Ok(availability) => json!({ "network": network, "availability": availability_json(&availability) }),
                        Err(e) => json!({ "network": network, "error": e.to_string() }),
                    })
                    .collect();
                Value::Array(results)
            }
        }
        Commands::Chains => Value::Array(
            config
                .networks
                .iter()
                .map(|entry| {
                    json!({
                        "network": entry.network,
                        "name": entry.display_name,
                        "segment": entry.segment.to_string(),
                        "registry": entry.registry.address,
                        "rpcUrl": entry.rpc_url,
                        "confirmations": entry.confirmations,
                    })
                })
                .collect(),
        ),
        Commands::Fetch { uri } => {
            let store = IpfsHttpStore::new(&config.storage, config.request_timeout)?;
            let bytes = store.fetch_str(&uri).await?;
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        }
        Commands::Members { search } => {
            let directory = MemberDirectory::new(&config.networks, config.request_timeout)?;
            let members: Vec<ApprovedMember> = directory.search_approved(&search).await;
            serde_json::to_value(members)?
        }
        Commands::Membership { address, network } => {
            let entry = config
                .networks
                .by_network(&network)
                .cloned()
                .ok_or_else(|| DidHealthError::BadConfiguration(format!("unknown network {network}")))?;
            let adapter = EvmAdapter::connect(entry, config.request_timeout, config.confirmation)?;
            json!({
                "network": network,
                "dao": adapter.dao_address(),
                "isMember": adapter.is_member(&address).await?,
                "profile": adapter.dao_profile(&address).await?,
                "registrationFee": adapter.dao_registration_fee().await?.to_string(),
            })
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn resolver(config: &DidHealthResolverConfiguration) -> DidHealthResult<CrossChainResolver> {
    let anchors = match &config.anchor_index_path {
        Some(path) => AnchorIndex::open(path).await?,
        None => AnchorIndex::in_memory(),
    };
    CrossChainResolver::from_configuration(config, Arc::new(anchors))
}

fn identity_json(resolved: &ResolvedIdentity) -> DidHealthResult<Value> {
    Ok(json!({
        "chain": resolved.chain_name,
        "didDocument": document_to_json(&resolved.document)?,
    }))
}

fn availability_json(availability: &Availability) -> Value {
    match availability {
        Availability::Available => json!("available"),
        Availability::Taken { owner } => json!({ "taken": { "owner": owner } }),
        Availability::ChainUnsupported { segment } => json!({ "unsupported": segment }),
    }
}
