//! Condition-gated encryption of FHIR resources.
//!
//! Ciphertext is produced and opened by a [KeyNetwork]. Decryption requires a
//! session: a wallet signature over a [session::CapabilityChallenge] that the
//! [AccessControlAdapter] requests once and reuses until it expires.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{AccessControlError, DidHealthResult};

pub mod conditions;
pub mod local;
pub mod session;

pub use self::{
    conditions::{AccessControlConditions, ConditionEntry},
    local::{ContractReader, LocalKeyNetwork},
    session::{AuthSig, CapabilityChallenge, LocalWallet, SessionSignatures, SessionSigner},
};

pub const DEFAULT_SESSION_DOMAIN: &str = "did-health";

fn default_data_type() -> String {
    "string".to_string()
}

/// The JSON object stored in place of a protected resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedPayload {
    pub ciphertext: String,
    pub data_to_encrypt_hash: String,
    pub access_control_conditions: AccessControlConditions,
    pub chain: String,
    #[serde(default = "default_data_type")]
    pub data_type: String,
}

impl EncryptedPayload {
    /// hash of the plaintext, stable across re-encryptions of the same bytes
    pub fn content_hash(&self) -> &str {
        &self.data_to_encrypt_hash
    }

    /// `Some` when `bytes` look like an encrypted payload rather than a plain resource
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        serde_json::from_slice(bytes).ok()
    }
}

/// An encryption result ready for upload.
#[derive(Debug, Clone)]
pub struct EncryptedResource {
    pub payload: EncryptedPayload,
    pub json: Vec<u8>,
    pub content_hash: String,
}

/// The external service that holds decryption keys and enforces conditions.
#[async_trait]
pub trait KeyNetwork: Send + Sync {
    /// fresh nonce to embed in a capability challenge
    async fn challenge_nonce(&self) -> DidHealthResult<String>;

    async fn encrypt(
        &self,
        plaintext: &[u8],
        chain: &str,
        conditions: &AccessControlConditions,
    ) -> DidHealthResult<EncryptedPayload>;

    async fn decrypt(
        &self,
        payload: &EncryptedPayload,
        session: &SessionSignatures,
    ) -> DidHealthResult<Vec<u8>>;
}

pub struct AccessControlAdapter {
    network: Arc<dyn KeyNetwork>,
    domain: String,
    session_ttl: Duration,
    session: Mutex<Option<SessionSignatures>>,
}

impl AccessControlAdapter {
    pub fn new(network: Arc<dyn KeyNetwork>) -> Self {
        Self {
            network,
            domain: DEFAULT_SESSION_DOMAIN.to_string(),
            session_ttl: Duration::hours(24),
            session: Mutex::new(None),
        }
    }

    pub fn with_domain(mut self, domain: &str) -> Self {
        self.domain = domain.to_string();
        self
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    pub async fn encrypt(
        &self,
        blob: &[u8],
        chain: &str,
        conditions: &AccessControlConditions,
    ) -> DidHealthResult<EncryptedResource> {
        conditions.validate()?;
        let payload = self.network.encrypt(blob, chain, conditions).await?;
        let json = serde_json::to_vec_pretty(&payload)?;
        info!(chain, hash = %payload.data_to_encrypt_hash, "encrypted resource");
        Ok(EncryptedResource {
            content_hash: payload.data_to_encrypt_hash.clone(),
            payload,
            json,
        })
    }

    pub async fn decrypt(
        &self,
        payload: &EncryptedPayload,
        signer: &dyn SessionSigner,
    ) -> DidHealthResult<Vec<u8>> {
        payload.access_control_conditions.validate()?;
        let session = self.session_for(signer).await?;
        self.network.decrypt(payload, &session).await
    }

    /// Cached session for the signer's wallet, signing a new challenge when needed.
    pub async fn session_for(&self, signer: &dyn SessionSigner) -> DidHealthResult<SessionSignatures> {
        let address = signer.address().await?;
        let mut cached = self.session.lock().await;
        if let Some(session) = cached.as_ref() {
            if session.address().eq_ignore_ascii_case(&address) && session.is_valid_at(Utc::now()) {
                return Ok(session.clone());
            }
        }

        let nonce = self.network.challenge_nonce().await?;
        let challenge = CapabilityChallenge::new(&self.domain, &address, &nonce, self.session_ttl);
        let auth_sig = signer.sign_message(&challenge.to_message()).await?;
        if !auth_sig.address.eq_ignore_ascii_case(&address) {
            return Err(AccessControlError::InvalidSession(format!(
                "signer returned a signature for {} instead of {address}",
                auth_sig.address
            ))
            .into());
        }
        debug!(%address, expires = %challenge.expiration, "new access control session");

        let session = SessionSignatures {
            auth_sig,
            expiration: challenge.expiration,
        };
        *cached = Some(session.clone());
        Ok(session)
    }

    pub async fn clear_session(&self) {
        *self.session.lock().await = None;
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Wallet that counts how often it is asked to sign.
    pub struct CountingSigner {
        pub wallet: LocalWallet,
        pub signatures: AtomicUsize,
    }

    impl CountingSigner {
        pub fn new(secret: u8) -> Self {
            Self {
                wallet: LocalWallet::from_bytes(&[secret; 32]).unwrap(),
                signatures: AtomicUsize::new(0),
            }
        }

        pub fn count(&self) -> usize {
            self.signatures.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SessionSigner for CountingSigner {
        async fn address(&self) -> DidHealthResult<String> {
            Ok(self.wallet.address())
        }

        async fn sign_message(&self, message: &str) -> DidHealthResult<AuthSig> {
            self.signatures.fetch_add(1, Ordering::SeqCst);
            self.wallet.sign_message(message).await
        }
    }
}
