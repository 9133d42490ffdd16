use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use ethers::signers::{self, Signer};
use serde::{Deserialize, Serialize};

use crate::{
    crypto::format_address,
    error::{AccessControlError, DidHealthError, DidHealthResult},
};

/// resource granting decryption under any access control condition
pub const ACCESS_CONTROL_RESOURCE: &str = "lit-accesscontrolcondition://*";

/// A wallet signature over a capability challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSig {
    pub sig: String,
    pub derived_via: String,
    pub signed_message: String,
    pub address: String,
}

/// Caller-supplied wallet able to sign session challenges.
#[async_trait]
pub trait SessionSigner: Send + Sync {
    async fn address(&self) -> DidHealthResult<String>;
    async fn sign_message(&self, message: &str) -> DidHealthResult<AuthSig>;
}

/// Sign-in-with-Ethereum style challenge the key network asks wallets to sign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityChallenge {
    pub domain: String,
    pub uri: String,
    pub address: String,
    pub nonce: String,
    pub issued_at: DateTime<Utc>,
    pub expiration: DateTime<Utc>,
    pub resources: Vec<String>,
}

impl CapabilityChallenge {
    pub fn new(domain: &str, address: &str, nonce: &str, ttl: Duration) -> Self {
        let issued_at = Utc::now();
        Self {
            domain: domain.to_string(),
            uri: format!("lit:session:{address}"),
            address: address.to_string(),
            nonce: nonce.to_string(),
            issued_at,
            expiration: issued_at + ttl,
            resources: vec![ACCESS_CONTROL_RESOURCE.to_string()],
        }
    }

    pub fn to_message(&self) -> String {
        let mut message = format!(
            "{} wants you to sign in with your Ethereum account:\n{}\n\nAuthorize decryption of did:health resources.\n\nURI: {}\nVersion: 1\nChain ID: 1\nNonce: {}\nIssued At: {}\nExpiration Time: {}",
            self.domain,
            self.address,
            self.uri,
            self.nonce,
            self.issued_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.expiration.to_rfc3339_opts(SecondsFormat::Millis, true),
        );
        if !self.resources.is_empty() {
            message.push_str("\nResources:");
            for resource in &self.resources {
                message.push_str("\n- ");
                message.push_str(resource);
            }
        }
        message
    }

    /// Read back the fields a verifier needs from a signed message.
    pub fn parse_message(message: &str) -> DidHealthResult<Self> {
        let invalid = |reason: &str| -> DidHealthError {
            AccessControlError::InvalidSession(reason.to_string()).into()
        };

        let mut lines = message.lines();
        let domain = lines
            .next()
            .and_then(|l| l.strip_suffix(" wants you to sign in with your Ethereum account:"))
            .ok_or_else(|| invalid("missing preamble"))?
            .to_string();
        let address = lines
            .next()
            .ok_or_else(|| invalid("missing address"))?
            .trim()
            .to_string();

        let field = |name: &str| -> Option<String> {
            let prefix = format!("{name}: ");
            message
                .lines()
                .find_map(|l| l.strip_prefix(prefix.as_str()).map(str::to_string))
        };
        let timestamp = |name: &str| -> DidHealthResult<DateTime<Utc>> {
            let raw = field(name).ok_or_else(|| invalid(&format!("missing {name}")))?;
            DateTime::parse_from_rfc3339(&raw)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|_| invalid(&format!("malformed {name}")))
        };

        let resources = message
            .split_once("\nResources:")
            .map(|(_, rest)| {
                rest.lines()
                    .filter_map(|l| l.strip_prefix("- ").map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            domain,
            uri: field("URI").ok_or_else(|| invalid("missing URI"))?,
            address,
            nonce: field("Nonce").ok_or_else(|| invalid("missing Nonce"))?,
            issued_at: timestamp("Issued At")?,
            expiration: timestamp("Expiration Time")?,
            resources,
        })
    }
}

/// A signed challenge, reusable until it expires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSignatures {
    pub auth_sig: AuthSig,
    pub expiration: DateTime<Utc>,
}

impl SessionSignatures {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expiration
    }

    pub fn address(&self) -> &str {
        &self.auth_sig.address
    }
}

/// In-process secp256k1 wallet signing EIP-191 messages.
pub struct LocalWallet {
    inner: signers::LocalWallet,
}

impl LocalWallet {
    pub fn from_bytes(secret: &[u8]) -> DidHealthResult<Self> {
        let inner = signers::LocalWallet::from_bytes(secret)
            .map_err(|e| DidHealthError::Wallet(format!("invalid secp256k1 secret key: {e}")))?;
        Ok(Self { inner })
    }

    pub fn from_hex(secret: &str) -> DidHealthResult<Self> {
        Self::from_bytes(&hex::decode(secret.trim_start_matches("0x"))?)
    }

    pub fn address(&self) -> String {
        format_address(&self.inner.address())
    }
}

#[async_trait]
impl SessionSigner for LocalWallet {
    async fn address(&self) -> DidHealthResult<String> {
        Ok(LocalWallet::address(self))
    }

    async fn sign_message(&self, message: &str) -> DidHealthResult<AuthSig> {
        let signature = self
            .inner
            .sign_message(message)
            .await
            .map_err(|e| DidHealthError::Wallet(format!("signing failed: {e}")))?;
        Ok(AuthSig {
            sig: format!("0x{signature}"),
            derived_via: "web3.eth.personal.sign".to_string(),
            signed_message: message.to_string(),
            address: LocalWallet::address(self),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::recover_personal_signer;

    #[test]
    fn challenge_message_round_trips() {
        let challenge = CapabilityChallenge::new(
            "did-health.local",
            "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf",
            "abc123",
            Duration::hours(1),
        );
        let message = challenge.to_message();
        assert!(message.contains("Nonce: abc123"));
        let parsed = CapabilityChallenge::parse_message(&message).unwrap();
        assert_eq!(parsed.domain, challenge.domain);
        assert_eq!(parsed.address, challenge.address);
        assert_eq!(parsed.nonce, "abc123");
        assert_eq!(parsed.resources, vec![ACCESS_CONTROL_RESOURCE.to_string()]);
        assert_eq!(
            parsed.expiration.timestamp_millis(),
            challenge.expiration.timestamp_millis()
        );
    }

    #[test]
    fn garbage_message_is_invalid_session() {
        let e = CapabilityChallenge::parse_message("hello").unwrap_err();
        assert!(matches!(
            e,
            DidHealthError::AccessControl(AccessControlError::InvalidSession(_))
        ));
    }

    #[tokio::test]
    async fn local_wallet_signatures_recover() {
        let wallet = LocalWallet::from_bytes(&[9u8; 32]).unwrap();
        assert_eq!(
            LocalWallet::from_hex(&format!("0x{}", "09".repeat(32))).unwrap().address(),
            wallet.address()
        );
        let auth = wallet.sign_message("grant").await.unwrap();
        assert_eq!(auth.address, wallet.address());
        assert_eq!(
            recover_personal_signer(&auth.signed_message, &auth.sig).unwrap(),
            wallet.address()
        );
    }

    #[test]
    fn session_expiry() {
        let now = Utc::now();
        let session = SessionSignatures {
            auth_sig: AuthSig {
                sig: String::new(),
                derived_via: String::new(),
                signed_message: String::new(),
                address: "0x1".into(),
            },
            expiration: now + Duration::minutes(5),
        };
        assert!(session.is_valid_at(now));
        assert!(!session.is_valid_at(now + Duration::minutes(6)));
    }
}
