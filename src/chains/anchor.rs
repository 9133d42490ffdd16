//! Anchor records for chains without a registry contract.
//!
//! Bitcoin and Solana carry registrations as small JSON documents (an Ordinals
//! inscription or a memo). Resolution reads every anchor a wallet published and
//! folds them into a [RegistryRecord]. The [AnchorIndex] remembers which wallet
//! anchored a name so that name lookups do not need a chain-wide scan.

use std::{collections::BTreeMap, path::PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::{
    error::DidHealthResult,
    resolution::transformer::RegistryRecord,
};

/// protocol tag carried by every anchor
pub const ANCHOR_PROTOCOL: &str = "did:health";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnchorOp {
    Register,
    Update,
    Alt,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorRecord {
    pub p: String,
    pub op: AnchorOp,
    pub did: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uri: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alt: Vec<String>,
}

impl AnchorRecord {
    pub fn register(did: &str, uri: &str) -> Self {
        Self::new(AnchorOp::Register, did, uri, Vec::new())
    }

    pub fn update(did: &str, uri: &str) -> Self {
        Self::new(AnchorOp::Update, did, uri, Vec::new())
    }

    pub fn alt(did: &str, uris: &[String]) -> Self {
        Self::new(AnchorOp::Alt, did, "", uris.to_vec())
    }

    fn new(op: AnchorOp, did: &str, uri: &str, alt: Vec<String>) -> Self {
        Self {
            p: ANCHOR_PROTOCOL.to_string(),
            op,
            did: did.to_string(),
            uri: uri.to_string(),
            alt,
        }
    }

    pub fn encode(&self) -> DidHealthResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode an anchor body. Early inscriptions carry only a bare `ipfs://`
    /// URI; those count as a registration of `legacy_did` when one is given.
    pub fn decode(body: &str, legacy_did: Option<&str>) -> Option<Self> {
        let body = body.trim();
        if body.starts_with('{') {
            return serde_json::from_str::<AnchorRecord>(body)
                .ok()
                .filter(|record| record.p == ANCHOR_PROTOCOL);
        }
        if body.starts_with("ipfs://") && !body.contains(char::is_whitespace) {
            return legacy_did.map(|did| Self::register(did, body));
        }
        None
    }
}

/// Fold anchors (oldest first) published by `owner` into the record for `did`.
/// The first registration wins; later registrations of the same name are ignored.
pub fn fold_anchors<'a>(
    did: &str,
    owner: &str,
    anchors: impl IntoIterator<Item = &'a AnchorRecord>,
) -> Option<RegistryRecord> {
    let mut record: Option<RegistryRecord> = None;
    for anchor in anchors.into_iter().filter(|a| a.did == did) {
        match (anchor.op, record.as_mut()) {
            (AnchorOp::Register, None) => {
                record = Some(RegistryRecord {
                    owner: owner.to_string(),
                    health_did: anchor.did.clone(),
                    pointer_uri: anchor.uri.clone(),
                    ..Default::default()
                });
            }
            (AnchorOp::Register, Some(_)) => {
                debug!(%did, "ignoring repeated registration anchor");
            }
            (AnchorOp::Update, Some(current)) => current.pointer_uri = anchor.uri.clone(),
            (AnchorOp::Alt, Some(current)) => {
                for uri in &anchor.alt {
                    if !current.alt_pointer_uris.contains(uri) {
                        current.alt_pointer_uris.push(uri.clone());
                    }
                }
            }
            (_, None) => debug!(%did, op = ?anchor.op, "anchor before registration"),
        }
    }
    record
}

/// The first DID a wallet registered, if any.
pub fn first_registered(anchors: &[AnchorRecord]) -> Option<&str> {
    anchors
        .iter()
        .find(|a| a.op == AnchorOp::Register)
        .map(|a| a.did.as_str())
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorEntry {
    pub wallet: String,
    #[serde(default)]
    pub tx_ids: Vec<String>,
}

/// DID to anchoring wallet, optionally persisted as a JSON file.
#[derive(Debug, Default)]
pub struct AnchorIndex {
    path: Option<PathBuf>,
    entries: RwLock<BTreeMap<String, AnchorEntry>>,
}

impl AnchorIndex {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load the index at `path`; a missing file starts an empty index.
    pub async fn open(path: impl Into<PathBuf>) -> DidHealthResult<Self> {
        let path = path.into();
        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path: Some(path),
            entries: RwLock::new(entries),
        })
    }

    pub async fn get(&self, did: &str) -> Option<AnchorEntry> {
        self.entries.read().await.get(did).cloned()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Record that `wallet` anchored `did` in transaction `tx_id`.
    /// A DID already claimed by another wallet keeps its first claimant.
    /// The write lock is held until the file is replaced, so concurrent
    /// appends persist in the order they were applied.
    pub async fn append(&self, did: &str, wallet: &str, tx_id: &str) -> DidHealthResult<()> {
        let mut entries = self.entries.write().await;
        let entry = entries.entry(did.to_string()).or_insert_with(|| AnchorEntry {
            wallet: wallet.to_string(),
            tx_ids: Vec::new(),
        });
        if entry.wallet != wallet {
            warn!(%did, claimant = %entry.wallet, %wallet, "anchor from a different wallet ignored");
            return Ok(());
        }
        if entry.tx_ids.iter().any(|t| t == tx_id) {
            return Ok(());
        }
        entry.tx_ids.push(tx_id.to_string());
        self.persist(&entries).await
    }

    async fn persist(&self, entries: &BTreeMap<String, AnchorEntry>) -> DidHealthResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let bytes = serde_json::to_vec_pretty(entries)?;
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}
