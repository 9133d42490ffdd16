//! Bitcoin registrations carried as Ordinals inscriptions, read through an `ord` server.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::{StatusCode, header::ACCEPT};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{
    Availability, Poller, RegistryAdapter, TxHandle, TxReceipt,
    anchor::{AnchorIndex, AnchorRecord, first_registered, fold_anchors},
    ensure_segment,
};
use crate::{
    catalog::RegistryEntry,
    config::ConfirmationPolicy,
    error::{DidHealthError, DidHealthResult},
    resolution::{parser::DidHealthParsed, transformer::RegistryRecord},
    storage::ipfs::USER_AGENT,
};

pub const ANCHOR_CONTENT_TYPE: &str = "text/plain;charset=utf-8";

/// Read access to inscriptions.
#[async_trait]
pub trait OrdinalsApi: Send + Sync {
    /// Inscription ids owned by `address`, oldest first.
    async fn address_inscriptions(&self, address: &str) -> DidHealthResult<Vec<String>>;

    /// Body of an inscription, `None` while it is not indexed yet.
    async fn inscription_content(&self, id: &str) -> DidHealthResult<Option<String>>;
}

/// Caller-supplied wallet that creates inscriptions.
#[async_trait]
pub trait Inscriber: Send + Sync {
    async fn address(&self) -> DidHealthResult<String>;

    /// Inscribe `body` and return the reveal transaction id or inscription id.
    async fn inscribe(&self, content_type: &str, body: &[u8]) -> DidHealthResult<String>;
}

pub struct OrdHttpClient {
    base_url: String,
    http_client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct AddressResponse {
    #[serde(default)]
    inscriptions: Vec<String>,
}

impl OrdHttpClient {
    pub fn new(base_url: &str, timeout: Duration) -> DidHealthResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| {
                DidHealthError::BadConfiguration(format!("Failed to create HTTP client: {e}"))
            })?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client,
        })
    }
}

#[async_trait]
impl OrdinalsApi for OrdHttpClient {
    async fn address_inscriptions(&self, address: &str) -> DidHealthResult<Vec<String>> {
        let url = format!("{}/address/{address}", self.base_url);
        let response = self
            .http_client
            .get(&url)
            .header(ACCEPT, "application/json")
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            return Err(DidHealthError::NonSuccessResponse(
                format!("{url} returned HTTP {}", response.status()).into(),
            ));
        }
        let body: AddressResponse = response.json().await?;
        // ord lists newest first
        Ok(body.inscriptions.into_iter().rev().collect())
    }

    async fn inscription_content(&self, id: &str) -> DidHealthResult<Option<String>> {
        let url = format!("{}/content/{}", self.base_url, inscription_id(id));
        let response = self.http_client.get(&url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(DidHealthError::NonSuccessResponse(
                format!("{url} returned HTTP {}", response.status()).into(),
            ));
        }
        Ok(Some(response.text().await?))
    }
}

/// A bare reveal txid names its first inscription.
pub fn inscription_id(id: &str) -> String {
    if id.len() == 64 && id.bytes().all(|b| b.is_ascii_hexdigit()) {
        format!("{id}i0")
    } else {
        id.to_string()
    }
}

fn looks_like_address(name: &str) -> bool {
    name.len() >= 26 && name.bytes().all(|b| b.is_ascii_alphanumeric())
}

pub struct BitcoinAdapter {
    entry: RegistryEntry,
    ord: Arc<dyn OrdinalsApi>,
    inscriber: Option<Arc<dyn Inscriber>>,
    anchors: Arc<AnchorIndex>,
    policy: ConfirmationPolicy,
}

impl BitcoinAdapter {
    pub fn new(
        entry: RegistryEntry,
        ord: Arc<dyn OrdinalsApi>,
        policy: ConfirmationPolicy,
        anchors: Arc<AnchorIndex>,
    ) -> Self {
        Self {
            entry,
            ord,
            inscriber: None,
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
        let ord = OrdHttpClient::new(&entry.rpc_url, timeout)?;
        Ok(Self::new(entry, Arc::new(ord), policy, anchors))
    }

    pub fn with_inscriber(mut self, inscriber: Arc<dyn Inscriber>) -> Self {
        self.inscriber = Some(inscriber);
        self
    }

    /// Decode the given inscriptions, skipping missing or foreign ones.
    async fn read_anchors(&self, ids: &[String], legacy_did: Option<&str>) -> DidHealthResult<Vec<AnchorRecord>> {
        let mut anchors = Vec::with_capacity(ids.len());
        for id in ids {
            match self.ord.inscription_content(id).await? {
                Some(body) => match AnchorRecord::decode(&body, legacy_did) {
                    Some(anchor) => anchors.push(anchor),
                    None => debug!(inscription = %id, "not a did:health anchor"),
                },
                None => debug!(inscription = %id, "inscription not indexed"),
            }
        }
        Ok(anchors)
    }

    async fn inscribe(&self, did: &DidHealthParsed, anchor: AnchorRecord) -> DidHealthResult<TxHandle> {
        ensure_segment(&self.entry, did)?;
        let inscriber = self.inscriber.as_ref().ok_or_else(|| {
            DidHealthError::Wallet("no Bitcoin inscriber attached".to_string())
        })?;
        let wallet = inscriber.address().await?;
        let body = anchor.encode()?;
        let id = inscription_id(&inscriber.inscribe(ANCHOR_CONTENT_TYPE, body.as_bytes()).await?);
        self.anchors.append(&did.did, &wallet, &id).await?;
        info!(did = %did.did, inscription = %id, "anchor inscribed");
        Ok(TxHandle {
            network: self.entry.network.clone(),
            id,
        })
    }
}

#[async_trait]
impl RegistryAdapter for BitcoinAdapter {
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
        self.inscribe(did, AnchorRecord::register(&did.did, pointer_uri)).await
    }

    async fn submit_update(&self, did: &DidHealthParsed, pointer_uri: &str) -> DidHealthResult<TxHandle> {
        self.inscribe(did, AnchorRecord::update(&did.did, pointer_uri)).await
    }

    async fn submit_alt_data(&self, did: &DidHealthParsed, uris: &[String]) -> DidHealthResult<TxHandle> {
        self.inscribe(did, AnchorRecord::alt(&did.did, uris)).await
    }

    /// An inscription counts as confirmed once the indexer serves its content.
    async fn confirm(&self, tx: &TxHandle) -> DidHealthResult<TxReceipt> {
        let poller = Poller::new(self.policy);
        loop {
            if self.ord.inscription_content(&tx.id).await?.is_some() {
                return Ok(TxReceipt {
                    tx: tx.clone(),
                    block: None,
                    confirmations: 1,
                    explorer_url: self.entry.explorer_url(&tx.id),
                });
            }
            poller.wait(&tx.id).await?;
        }
    }

    async fn resolve_by_wallet(&self, address: &str) -> DidHealthResult<Option<RegistryRecord>> {
        if !looks_like_address(address) {
            return Ok(None);
        }
        let ids = self.ord.address_inscriptions(address).await?;
        let anchors = self.read_anchors(&ids, None).await?;
        let Some(did) = first_registered(&anchors) else {
            return Ok(None);
        };
        Ok(fold_anchors(did, address, &anchors))
    }

    async fn resolve_by_name(&self, did: &DidHealthParsed) -> DidHealthResult<Option<RegistryRecord>> {
        ensure_segment(&self.entry, did)?;
        if let Some(entry) = self.anchors.get(&did.did).await {
            let anchors = self.read_anchors(&entry.tx_ids, Some(&did.did)).await?;
            return Ok(fold_anchors(&did.did, &entry.wallet, &anchors));
        }
        if looks_like_address(&did.name) {
            let ids = self.ord.address_inscriptions(&did.name).await?;
            let anchors = self.read_anchors(&ids, Some(&did.did)).await?;
            return Ok(fold_anchors(&did.did, &did.name, &anchors));
        }
        warn!(did = %did.did, "no local anchor index entry for this name");
        Ok(None)
    }
}
