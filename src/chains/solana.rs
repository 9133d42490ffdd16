//! Solana registrations carried as Memo program transactions.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use super::{
    Availability, Poller, RegistryAdapter, TxHandle, TxReceipt,
    anchor::{AnchorIndex, AnchorRecord, first_registered, fold_anchors},
    ensure_segment,
    rpc::{JsonRpc, RpcTransport},
};
use crate::{
    catalog::RegistryEntry,
    config::ConfirmationPolicy,
    error::{DidHealthError, DidHealthResult},
    resolution::{parser::DidHealthParsed, transformer::RegistryRecord},
};

const SIGNATURE_PAGE: u64 = 1000;

/// Caller-supplied wallet that signs and sends memo transactions.
#[async_trait]
pub trait SolanaSigner: Send + Sync {
    /// base58 public key
    async fn public_key(&self) -> DidHealthResult<String>;

    /// Send a transaction with a single Memo instruction and return its signature.
    async fn send_memo_transaction(&self, memo: &str) -> DidHealthResult<String>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignatureInfo {
    signature: String,
    #[serde(default)]
    err: Option<Value>,
    #[serde(default)]
    memo: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignatureStatus {
    slot: u64,
    #[serde(default)]
    confirmations: Option<u64>,
    #[serde(default)]
    err: Option<Value>,
    #[serde(default)]
    confirmation_status: Option<String>,
}

/// True for a base58 string decoding to a 32-byte public key.
pub fn is_public_key(value: &str) -> bool {
    bs58::decode(value)
        .into_vec()
        .map(|bytes| bytes.len() == 32)
        .unwrap_or(false)
}

/// The RPC reports memos as `[<len>] <text>`, joined with `; ` when a
/// transaction carries several.
pub fn memo_payloads(memo: &str) -> Vec<&str> {
    memo.split("; ")
        .map(|part| match part.strip_prefix('[').and_then(|p| p.split_once("] ")) {
            Some((len, text)) if len.bytes().all(|b| b.is_ascii_digit()) => text,
            _ => part,
        })
        .collect()
}

pub struct SolanaAdapter {
    entry: RegistryEntry,
    rpc: RpcTransport,
    signer: Option<Arc<dyn SolanaSigner>>,
    anchors: Arc<AnchorIndex>,
    policy: ConfirmationPolicy,
}

impl SolanaAdapter {
    pub fn new(
        entry: RegistryEntry,
        rpc: Arc<dyn JsonRpc>,
        policy: ConfirmationPolicy,
        anchors: Arc<AnchorIndex>,
    ) -> Self {
        Self {
            entry,
            rpc: RpcTransport::new(rpc),
            signer: None,
            anchors,
            policy,
        }
    }

    pub fn connect(
        entry: RegistryEntry,
        timeout: Duration,
        policy: ConfirmationPolicy,
        anchors: Arc<AnchorIndex>,
    ) -> DidHealthResult<Self> {
        let rpc = RpcTransport::http(&entry.rpc_url, timeout)?;
        Ok(Self {
            entry,
            rpc,
            signer: None,
            anchors,
            policy,
        })
    }

    pub fn with_signer(mut self, signer: Arc<dyn SolanaSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Successful memo transactions of `address`, oldest first. Pages back
    /// through the whole history, newest page first.
    async fn memo_history(&self, address: &str) -> DidHealthResult<Vec<SignatureInfo>> {
        let mut history = Vec::new();
        let mut before: Option<String> = None;
        loop {
            let mut options = json!({ "limit": SIGNATURE_PAGE });
            if let Some(before) = &before {
                options["before"] = json!(before);
            }
            let result = self
                .rpc
                .call("getSignaturesForAddress", json!([address, options]))
                .await?;
            let page: Vec<SignatureInfo> = serde_json::from_value(result)?;
            let exhausted = (page.len() as u64) < SIGNATURE_PAGE;
            before = page.last().map(|info| info.signature.clone());
            history.extend(page);
            if exhausted || before.is_none() {
                break;
            }
            debug!(%address, fetched = history.len(), "paging signature history");
        }
        history.retain(|info| info.err.is_none() && info.memo.is_some());
        history.reverse();
        Ok(history)
    }

    fn decode_history<'a>(
        history: impl IntoIterator<Item = &'a SignatureInfo>,
        legacy_did: Option<&str>,
    ) -> Vec<AnchorRecord> {
        history
            .into_iter()
            .filter_map(|info| info.memo.as_deref())
            .flat_map(memo_payloads)
            .filter_map(|payload| AnchorRecord::decode(payload, legacy_did))
            .collect()
    }

    async fn send_anchor(&self, did: &DidHealthParsed, anchor: AnchorRecord) -> DidHealthResult<TxHandle> {
        ensure_segment(&self.entry, did)?;
        let signer = self
            .signer
            .as_ref()
            .ok_or_else(|| DidHealthError::Wallet("no Solana signer attached".to_string()))?;
        let wallet = signer.public_key().await?;
        let signature = signer.send_memo_transaction(&anchor.encode()?).await?;
        self.anchors.append(&did.did, &wallet, &signature).await?;
        info!(did = %did.did, %signature, "memo anchor sent");
        Ok(TxHandle {
            network: self.entry.network.clone(),
            id: signature,
        })
    }
}

#[async_trait]
impl RegistryAdapter for SolanaAdapter {
    fn entry(&self) -> &RegistryEntry {
        &self.entry
    }

    async fn check_availability(&self, did: &DidHealthParsed) -> DidHealthResult<Availability> {
        Ok(match self.resolve_by_name(did).await? {
            Some(record) => Availability::Taken {
                owner: record.owner,
            },
            None => Availability::Available,
        })
    }

    async fn submit_registration(&self, did: &DidHealthParsed, pointer_uri: &str) -> DidHealthResult<TxHandle> {
        self.send_anchor(did, AnchorRecord::register(&did.did, pointer_uri)).await
    }

    async fn submit_update(&self, did: &DidHealthParsed, pointer_uri: &str) -> DidHealthResult<TxHandle> {
        self.send_anchor(did, AnchorRecord::update(&did.did, pointer_uri)).await
    }

    async fn submit_alt_data(&self, did: &DidHealthParsed, uris: &[String]) -> DidHealthResult<TxHandle> {
        self.send_anchor(did, AnchorRecord::alt(&did.did, uris)).await
    }

    async fn confirm(&self, tx: &TxHandle) -> DidHealthResult<TxReceipt> {
        let poller = Poller::new(self.policy);
        loop {
            let result = self
                .rpc
                .call(
                    "getSignatureStatuses",
                    json!([[tx.id], { "searchTransactionHistory": true }]),
                )
                .await?;
            let status = result
                .get("value")
                .and_then(|v| v.get(0))
                .filter(|s| !s.is_null())
                .cloned()
                .map(serde_json::from_value::<SignatureStatus>)
                .transpose()?;

            match status {
                Some(SignatureStatus { err: Some(err), .. }) => {
                    warn!(signature = %tx.id, %err, "transaction failed");
                    return Err(DidHealthError::TransactionFailed {
                        tx: tx.id.clone(),
                        reason: err.to_string(),
                    });
                }
                Some(status) if status.confirmation_status.as_deref() == Some("finalized") => {
                    return Ok(TxReceipt {
                        tx: tx.clone(),
                        block: Some(status.slot),
                        confirmations: status.confirmations.unwrap_or(self.entry.confirmations),
                        explorer_url: self.entry.explorer_url(&tx.id),
                    });
                }
                Some(status) => {
                    debug!(signature = %tx.id, status = ?status.confirmation_status, "not finalized yet");
                }
                None => debug!(signature = %tx.id, "signature not seen yet"),
            }
            poller.wait(&tx.id).await?;
        }
    }

    async fn resolve_by_wallet(&self, address: &str) -> DidHealthResult<Option<RegistryRecord>> {
        if !is_public_key(address) {
            return Ok(None);
        }
        let history = self.memo_history(address).await?;
        let anchors = Self::decode_history(&history, None);
        let Some(did) = first_registered(&anchors) else {
            return Ok(None);
        };
        Ok(fold_anchors(did, address, &anchors))
    }

    async fn resolve_by_name(&self, did: &DidHealthParsed) -> DidHealthResult<Option<RegistryRecord>> {
        ensure_segment(&self.entry, did)?;
        if let Some(entry) = self.anchors.get(&did.did).await {
            let history = self.memo_history(&entry.wallet).await?;
            let ours = history.iter().filter(|info| entry.tx_ids.contains(&info.signature));
            let anchors = Self::decode_history(ours, Some(&did.did));
            return Ok(fold_anchors(&did.did, &entry.wallet, &anchors));
        }
        if is_public_key(&did.name) {
            let history = self.memo_history(&did.name).await?;
            let anchors = Self::decode_history(&history, Some(&did.did));
            return Ok(fold_anchors(&did.did, &did.name, &anchors));
        }
        warn!(did = %did.did, "no local anchor index entry for this name");
        Ok(None)
    }
}
