//! Hashing and EIP-191 helpers shared by the EVM adapter and the key network.

use std::str::FromStr;

use ethers::types::{Address, Signature};
use sha2::{Digest, Sha256};

use crate::error::{AccessControlError, DidHealthError, DidHealthResult};

pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// `0x`-prefixed lower-case form used for every address this crate hands out
pub fn format_address(address: &Address) -> String {
    format!("{address:#x}")
}

pub fn parse_address(address: &str) -> DidHealthResult<Address> {
    Address::from_str(address)
        .map_err(|_| DidHealthError::InvalidResponse(format!("not an EVM address: {address}")))
}

/// Recover the address that produced an EIP-191 signature over `message`.
pub fn recover_personal_signer(message: &str, signature_hex: &str) -> DidHealthResult<String> {
    let invalid = |reason: String| -> DidHealthError {
        AccessControlError::InvalidSession(format!("bad signature: {reason}")).into()
    };
    let signature = Signature::from_str(signature_hex).map_err(|e| invalid(e.to_string()))?;
    let signer = signature.recover(message).map_err(|e| invalid(e.to_string()))?;
    Ok(format_address(&signer))
}

#[cfg(test)]
mod tests {
    use ethers::{
        signers::{LocalWallet, Signer},
        utils::{hash_message, keccak256},
    };

    use super::*;

    #[test]
    fn keccak_of_empty_input() {
        assert_eq!(
            hex::encode(keccak256(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn known_private_key_address() {
        // private key 0x...01 controls this well-known address
        let mut raw = [0u8; 32];
        raw[31] = 1;
        let wallet = LocalWallet::from_bytes(&raw).unwrap();
        assert_eq!(
            format_address(&wallet.address()),
            "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf"
        );
        assert_eq!(
            parse_address("0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf").unwrap(),
            wallet.address()
        );
    }

    #[tokio::test]
    async fn personal_sign_recovers_signer() {
        let wallet = LocalWallet::from_bytes(&[7u8; 32]).unwrap();
        let signature = wallet.sign_message("hello health").await.unwrap();
        let hex = format!("0x{signature}");
        let recovered = recover_personal_signer("hello health", &hex).unwrap();
        assert_eq!(recovered, format_address(&wallet.address()));
        assert_eq!(
            signature.recover(hash_message("hello health")).unwrap(),
            wallet.address()
        );

        let other = recover_personal_signer("tampered", &hex).unwrap();
        assert_ne!(other, recovered);
    }

    #[test]
    fn malformed_signatures_are_rejected() {
        assert!(recover_personal_signer("m", "0x1234").is_err());
        assert!(recover_personal_signer("m", "zz").is_err());
        // 65 bytes but a recovery byte outside {0, 1, 27, 28}
        let bad_v = format!("0x{}05", "11".repeat(64));
        assert!(recover_personal_signer("m", &bad_v).is_err());
    }
}
