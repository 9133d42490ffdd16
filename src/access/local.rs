use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use chacha20poly1305::{
    Key, XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit},
};
use chrono::Utc;
use tracing::{debug, warn};

use super::{
    EncryptedPayload, KeyNetwork, SessionSignatures,
    conditions::{
        AccessControlCondition, AccessControlConditions, BooleanOperator, ConditionEntry,
        ReturnValueTest, USER_ADDRESS_PARAM,
    },
    session::CapabilityChallenge,
};
use crate::{
    crypto::{recover_personal_signer, sha256, sha256_hex},
    error::{AccessControlError, DidHealthResult},
};

const KEY_DERIVATION_LABEL: &[u8] = b"did-health/local-key-network/v1";
const NONCE_LEN: usize = 24;

/// On-chain reads behind contract conditions.
#[async_trait]
pub trait ContractReader: Send + Sync {
    /// Call `method` on `contract` and render the single return value as text.
    async fn read(&self, contract: &str, method: &str, parameters: &[String]) -> DidHealthResult<String>;
}

/// In-process key network: keys are derived from a master secret, the
/// conditions hash and the plaintext hash, so only the holder of the master
/// secret can decrypt, and only for sessions satisfying the conditions.
///
/// Contract conditions are answered by the [ContractReader] registered for
/// the condition's chain.
pub struct LocalKeyNetwork {
    master: [u8; 32],
    readers: HashMap<String, Arc<dyn ContractReader>>,
}

impl LocalKeyNetwork {
    pub fn new(master: [u8; 32]) -> Self {
        Self {
            master,
            readers: HashMap::new(),
        }
    }

    /// Answer contract conditions naming `chain` with `reader`.
    pub fn with_contract_reader(mut self, chain: &str, reader: Arc<dyn ContractReader>) -> Self {
        self.readers.insert(chain.to_string(), reader);
        self
    }

    pub fn generate() -> DidHealthResult<Self> {
        let mut master = [0u8; 32];
        random_bytes(&mut master)?;
        Ok(Self::new(master))
    }

    fn data_key(&self, conditions_hash: &str, data_hash: &str) -> [u8; 32] {
        let mut material = Vec::with_capacity(32 + KEY_DERIVATION_LABEL.len() + 128);
        material.extend_from_slice(&self.master);
        material.extend_from_slice(KEY_DERIVATION_LABEL);
        material.extend_from_slice(conditions_hash.as_bytes());
        material.extend_from_slice(data_hash.as_bytes());
        sha256(&material)
    }

    fn verify_session(&self, session: &SessionSignatures) -> DidHealthResult<String> {
        let auth = &session.auth_sig;
        let recovered = recover_personal_signer(&auth.signed_message, &auth.sig)?;
        if !recovered.eq_ignore_ascii_case(&auth.address) {
            return Err(AccessControlError::InvalidSession(
                "signature does not match the claimed address".to_string(),
            )
            .into());
        }
        let challenge = CapabilityChallenge::parse_message(&auth.signed_message)?;
        if !challenge.address.eq_ignore_ascii_case(&recovered) {
            return Err(AccessControlError::InvalidSession(
                "challenge was issued to a different address".to_string(),
            )
            .into());
        }
        if challenge.expiration <= Utc::now() {
            return Err(AccessControlError::InvalidSession("session expired".to_string()).into());
        }
        Ok(recovered)
    }
}

#[async_trait]
impl KeyNetwork for LocalKeyNetwork {
    async fn challenge_nonce(&self) -> DidHealthResult<String> {
        let mut nonce = [0u8; 16];
        random_bytes(&mut nonce)?;
        Ok(hex::encode(nonce))
    }

    async fn encrypt(
        &self,
        plaintext: &[u8],
        chain: &str,
        conditions: &AccessControlConditions,
    ) -> DidHealthResult<EncryptedPayload> {
        conditions.validate()?;
        let data_hash = sha256_hex(plaintext);
        let key = self.data_key(&conditions.conditions_hash()?, &data_hash);

        let mut nonce = [0u8; NONCE_LEN];
        random_bytes(&mut nonce)?;
        let cipher = XChaCha20Poly1305::new(Key::from_slice(&key));
        let sealed = cipher
            .encrypt(XNonce::from_slice(&nonce), plaintext)
            .map_err(|_| AccessControlError::Encryption("AEAD seal failed".to_string()))?;

        let mut blob = nonce.to_vec();
        blob.extend_from_slice(&sealed);

        Ok(EncryptedPayload {
            ciphertext: STANDARD.encode(blob),
            data_to_encrypt_hash: data_hash,
            access_control_conditions: conditions.clone(),
            chain: chain.to_string(),
            data_type: "string".to_string(),
        })
    }

    async fn decrypt(
        &self,
        payload: &EncryptedPayload,
        session: &SessionSignatures,
    ) -> DidHealthResult<Vec<u8>> {
        let user = self.verify_session(session)?;
        if !self.evaluate(&payload.access_control_conditions, &user).await? {
            warn!(%user, "access control conditions not satisfied");
            return Err(AccessControlError::AccessDenied(format!(
                "{user} does not satisfy the access control conditions"
            ))
            .into());
        }

        let blob = STANDARD.decode(&payload.ciphertext)?;
        if blob.len() <= NONCE_LEN {
            return Err(AccessControlError::Decryption("ciphertext too short".to_string()).into());
        }
        let (nonce, sealed) = blob.split_at(NONCE_LEN);
        let key = self.data_key(
            &payload.access_control_conditions.conditions_hash()?,
            &payload.data_to_encrypt_hash,
        );
        let cipher = XChaCha20Poly1305::new(Key::from_slice(&key));
        let plaintext = cipher
            .decrypt(XNonce::from_slice(nonce), sealed)
            .map_err(|_| AccessControlError::Decryption("AEAD open failed".to_string()))?;

        if sha256_hex(&plaintext) != payload.data_to_encrypt_hash {
            return Err(
                AccessControlError::Decryption("plaintext hash mismatch".to_string()).into(),
            );
        }
        Ok(plaintext)
    }
}

impl LocalKeyNetwork {
    /// Fold conditions left to right with their operators.
    async fn evaluate(&self, conditions: &AccessControlConditions, user: &str) -> DidHealthResult<bool> {
        conditions.validate()?;
        let mut result = false;
        let mut pending: Option<BooleanOperator> = None;
        for entry in conditions.entries() {
            match entry {
                ConditionEntry::Operator(op) => pending = Some(op.operator),
                ConditionEntry::Condition(condition) => {
                    let value = self.evaluate_condition(condition, user).await?;
                    result = match pending.take() {
                        None => value,
                        Some(BooleanOperator::And) => result && value,
                        Some(BooleanOperator::Or) => result || value,
                    };
                }
            }
        }
        Ok(result)
    }

    async fn evaluate_condition(&self, condition: &AccessControlCondition, user: &str) -> DidHealthResult<bool> {
        if condition.method.is_empty() && condition.contract_address.is_empty() {
            return compare_address(condition, user);
        }
        let reader = self.readers.get(&condition.chain).ok_or_else(|| {
            AccessControlError::UnsupportedCondition(format!(
                "contract calls on {} are not evaluated locally ({} on {})",
                condition.chain, condition.method, condition.contract_address
            ))
        })?;
        let parameters: Vec<String> = condition
            .parameters
            .iter()
            .map(|p| if p == USER_ADDRESS_PARAM { user.to_string() } else { p.clone() })
            .collect();
        let returned = reader
            .read(&condition.contract_address, &condition.method, &parameters)
            .await?;
        debug!(chain = %condition.chain, method = %condition.method, %returned, "contract condition read");
        compare_returned(&condition.return_value_test, &returned)
    }
}

fn compare_address(condition: &AccessControlCondition, user: &str) -> DidHealthResult<bool> {
    if condition.parameters.first().map(String::as_str) != Some(USER_ADDRESS_PARAM) {
        return Err(AccessControlError::UnsupportedCondition(format!(
            "only {USER_ADDRESS_PARAM} conditions are evaluated locally"
        ))
        .into());
    }

    let expected = &condition.return_value_test.value;
    match condition.return_value_test.comparator.as_str() {
        "=" => Ok(user.eq_ignore_ascii_case(expected)),
        "!=" => Ok(!user.eq_ignore_ascii_case(expected)),
        "contains" => Ok(expected
            .to_ascii_lowercase()
            .contains(&user.to_ascii_lowercase())),
        other => Err(AccessControlError::UnsupportedCondition(format!(
            "comparator {other} does not apply to addresses"
        ))
        .into()),
    }
}

/// Compare a contract's return value. Ordering comparators need integers on both sides.
fn compare_returned(test: &ReturnValueTest, returned: &str) -> DidHealthResult<bool> {
    let expected = test.value.as_str();
    let numbers = || -> DidHealthResult<(u128, u128)> {
        match (returned.parse::<u128>(), expected.parse::<u128>()) {
            (Ok(a), Ok(b)) => Ok((a, b)),
            _ => Err(AccessControlError::UnsupportedCondition(format!(
                "comparator {} needs integers, got {returned} and {expected}",
                test.comparator
            ))
            .into()),
        }
    };
    Ok(match test.comparator.as_str() {
        "=" => returned.eq_ignore_ascii_case(expected),
        "!=" => !returned.eq_ignore_ascii_case(expected),
        "contains" => returned.to_ascii_lowercase().contains(&expected.to_ascii_lowercase()),
        ">" => numbers().map(|(a, b)| a > b)?,
        ">=" => numbers().map(|(a, b)| a >= b)?,
        "<" => numbers().map(|(a, b)| a < b)?,
        "<=" => numbers().map(|(a, b)| a <= b)?,
        other => {
            return Err(AccessControlError::UnsupportedCondition(format!("unknown comparator {other}")).into());
        }
    })
}

fn random_bytes(buf: &mut [u8]) -> DidHealthResult<()> {
    getrandom::getrandom(buf)
        .map_err(|e| AccessControlError::Encryption(format!("no randomness available: {e}")).into())
}
