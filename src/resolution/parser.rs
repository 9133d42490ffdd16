use std::fmt;

use crate::error::{DidHealthError, DidHealthResult};

pub const DID_HEALTH_PREFIX: &str = "did:health:";
/// canonical chain segment for Bitcoin anchored DIDs
pub const BITCOIN_SEGMENT: &str = "btc";
pub const BITCOIN_SEGMENT_ALIAS: &str = "bitcoin";
/// canonical chain segment for Solana anchored DIDs
pub const SOLANA_SEGMENT: &str = "solana";
pub const SOLANA_SEGMENT_ALIAS: &str = "sol";

/// The chain a did:health identifier lives on, as named by its second segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChainSegment {
    /// EVM chain addressed by its decimal chain id
    Evm(u64),
    Bitcoin,
    Solana,
    /// CosmWasm chain addressed by its configured name (e.g. `dhealth`)
    Cosmos(String),
}

impl ChainSegment {
    pub fn parse(segment: &str) -> DidHealthResult<Self> {
        if segment.is_empty() {
            return Err(DidHealthError::InvalidDid("empty chain segment".to_string()));
        }

        if segment.bytes().all(|b| b.is_ascii_digit()) {
            let chain_id: u64 = segment.parse().map_err(|_| {
                DidHealthError::InvalidDid(format!("chain id out of range: {segment}"))
            })?;
            if chain_id == 0 {
                return Err(DidHealthError::InvalidDid(
                    "chain id 0 is not a valid EVM chain".to_string(),
                ));
            }
            return Ok(ChainSegment::Evm(chain_id));
        }

        match segment {
            BITCOIN_SEGMENT | BITCOIN_SEGMENT_ALIAS => Ok(ChainSegment::Bitcoin),
            SOLANA_SEGMENT | SOLANA_SEGMENT_ALIAS => Ok(ChainSegment::Solana),
            name if is_cosmos_chain_name(name) => Ok(ChainSegment::Cosmos(name.to_string())),
            other => Err(DidHealthError::InvalidDid(format!(
                "unrecognised chain segment: {other}"
            ))),
        }
    }

    /// short family label used in logs and errors
    pub fn family(&self) -> &'static str {
        match self {
            ChainSegment::Evm(_) => "evm",
            ChainSegment::Bitcoin => "bitcoin",
            ChainSegment::Solana => "solana",
            ChainSegment::Cosmos(_) => "cosmos",
        }
    }

    /// Reject segments whose rendering would parse back to a different chain,
    /// such as `Evm(0)` or a Cosmos chain named `btc`.
    pub fn ensure_canonical(&self) -> DidHealthResult<()> {
        match ChainSegment::parse(&self.to_string()) {
            Ok(parsed) if &parsed == self => Ok(()),
            _ => Err(DidHealthError::InvalidDid(format!(
                "{self:?} is not a canonical chain segment"
            ))),
        }
    }

    pub fn chain_id(&self) -> Option<u64> {
        match self {
            ChainSegment::Evm(id) => Some(*id),
            _ => None,
        }
    }
}

impl fmt::Display for ChainSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainSegment::Evm(id) => write!(f, "{id}"),
            ChainSegment::Bitcoin => f.write_str(BITCOIN_SEGMENT),
            ChainSegment::Solana => f.write_str(SOLANA_SEGMENT),
            ChainSegment::Cosmos(name) => f.write_str(name),
        }
    }
}

/// Parsed representation of a did:health DID or DID URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DidHealthParsed {
    /// The canonical DID string (e.g. `did:health:11155111:alice`)
    pub did: String,
    pub segment: ChainSegment,
    /// Human-readable name, or a wallet address for legacy Bitcoin/Solana DIDs
    pub name: String,
    /// Optional fragment (e.g. `fhir` for `did:health:1:alice#fhir`)
    pub fragment: Option<String>,
}

impl DidHealthParsed {
    /// Key under which the record is stored by the chain's registry.
    ///
    /// EVM registries key by `<chainId>:<name>`, every other family keys by the full DID.
    pub fn lookup_key(&self) -> String {
        match &self.segment {
            ChainSegment::Evm(chain_id) => format!("{chain_id}:{}", self.name),
            _ => self.did.clone(),
        }
    }

    /// everything after `did:health:`
    pub fn method_specific_id(&self) -> &str {
        &self.did[DID_HEALTH_PREFIX.len()..]
    }

    /// true when the name is a wallet address rather than a chosen slug
    pub fn is_address_named(&self) -> bool {
        !is_valid_name(&self.name)
    }
}

pub struct DidHealthParser;

impl DidHealthParser {
    /// Parse a DID or DID URL.
    ///
    /// Accepted forms:
    /// - `did:health:<chainId>:<name>`
    /// - `did:health:btc:<name>` (`bitcoin` accepted and normalised to `btc`)
    /// - `did:health:solana:<name>` (`sol` accepted and normalised to `solana`)
    /// - `did:health:<cosmosChain>:<name>`
    /// - any of the above followed by `#<fragment>`
    pub fn parse(input: &str) -> DidHealthResult<DidHealthParsed> {
        let input = input.trim();
        let Some(rest) = input.strip_prefix(DID_HEALTH_PREFIX) else {
            return Err(DidHealthError::MethodNotSupported(format!(
                "not a did:health string: {input}"
            )));
        };

        let (base, fragment) = match rest.split_once('#') {
            Some((b, f)) if !f.is_empty() => (b, Some(f.to_string())),
            Some((b, _)) => (b, None),
            None => (rest, None),
        };

        let (segment, name) = base.split_once(':').ok_or_else(|| {
            DidHealthError::InvalidDid(format!("expected did:health:<chain>:<name>, got {input}"))
        })?;

        if name.contains(':') || name.contains('/') || name.contains('?') {
            return Err(DidHealthError::InvalidDid(format!(
                "unexpected characters in name: {name}"
            )));
        }

        let segment = ChainSegment::parse(segment)?;
        validate_name(&segment, name)?;

        let did = format!("{DID_HEALTH_PREFIX}{segment}:{name}");
        Ok(DidHealthParsed {
            did,
            segment,
            name: name.to_string(),
            fragment,
        })
    }

    /// Build the canonical DID for a segment and name, validating both.
    pub fn build(segment: &ChainSegment, name: &str) -> DidHealthResult<String> {
        segment.ensure_canonical()?;
        validate_name(segment, name)?;
        Ok(format!("{DID_HEALTH_PREFIX}{segment}:{name}"))
    }
}

/// Names are slugs of lowercase letters, digits and hyphens.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
}

fn validate_name(segment: &ChainSegment, name: &str) -> DidHealthResult<()> {
    if is_valid_name(name) {
        return Ok(());
    }
    // Bitcoin and Solana DIDs may be named by the anchoring wallet
    let wallet_named = matches!(segment, ChainSegment::Bitcoin | ChainSegment::Solana)
        && is_wallet_address_like(name);
    if wallet_named {
        return Ok(());
    }
    if name.is_empty() {
        return Err(DidHealthError::InvalidDid("name must not be empty".to_string()));
    }
    Err(DidHealthError::InvalidDid(format!(
        "name may only contain lowercase letters, digits and '-': {name}"
    )))
}

fn is_wallet_address_like(name: &str) -> bool {
    name.len() >= 26 && name.bytes().all(|b| b.is_ascii_alphanumeric())
}

fn is_cosmos_chain_name(name: &str) -> bool {
    let mut bytes = name.bytes();
    matches!(bytes.next(), Some(b) if b.is_ascii_lowercase())
        && bytes.all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_evm_did() {
        let p = DidHealthParser::parse("did:health:11155111:alice").unwrap();
        assert_eq!(p.did, "did:health:11155111:alice");
        assert_eq!(p.segment, ChainSegment::Evm(11155111));
        assert_eq!(p.name, "alice");
        assert_eq!(p.lookup_key(), "11155111:alice");
        assert_eq!(p.method_specific_id(), "11155111:alice");
        assert!(p.fragment.is_none());
    }

    #[test]
    fn parse_bitcoin_alias_is_normalised() {
        let p = DidHealthParser::parse("did:health:bitcoin:alice").unwrap();
        assert_eq!(p.segment, ChainSegment::Bitcoin);
        assert_eq!(p.did, "did:health:btc:alice");
        assert_eq!(p.lookup_key(), "did:health:btc:alice");
    }

    #[test]
    fn parse_solana_wallet_named_did() {
        let wallet = "7EcDhSYGxXyscszYEp35KHN8vvw3svAuLKTzXwCFLtV";
        let p = DidHealthParser::parse(&format!("did:health:sol:{wallet}")).unwrap();
        assert_eq!(p.segment, ChainSegment::Solana);
        assert_eq!(p.did, format!("did:health:solana:{wallet}"));
        assert!(p.is_address_named());
    }

    #[test]
    fn parse_cosmos_did() {
        let p = DidHealthParser::parse("did:health:dhealth:clinic-7").unwrap();
        assert_eq!(p.segment, ChainSegment::Cosmos("dhealth".to_string()));
        assert_eq!(p.lookup_key(), "did:health:dhealth:clinic-7");
    }

    #[test]
    fn parse_with_fragment() {
        let p = DidHealthParser::parse("did:health:84532:bob#fhir").unwrap();
        assert_eq!(p.did, "did:health:84532:bob");
        assert_eq!(p.fragment.as_deref(), Some("fhir"));
    }

    #[test]
    fn parse_malformed_not_health() {
        let e = DidHealthParser::parse("did:web:example.com").unwrap_err();
        assert!(e.to_string().contains("not a did:health"));
    }

    #[test]
    fn parse_rejects_missing_name() {
        let e = DidHealthParser::parse("did:health:alice").unwrap_err();
        assert!(matches!(e, DidHealthError::InvalidDid(_)));
        let e = DidHealthParser::parse("did:health:1:").unwrap_err();
        assert!(matches!(e, DidHealthError::InvalidDid(_)));
    }

    #[test]
    fn parse_rejects_uppercase_on_evm() {
        let e = DidHealthParser::parse("did:health:1:Alice").unwrap_err();
        assert!(e.to_string().contains("lowercase"));
    }

    #[test]
    fn parse_rejects_zero_chain_id() {
        assert!(DidHealthParser::parse("did:health:0:alice").is_err());
    }

    #[test]
    fn build_round_trips_through_parse() {
        for (segment, name) in [
            (ChainSegment::Evm(421614), "clinic-9"),
            (ChainSegment::Bitcoin, "carol"),
            (ChainSegment::Solana, "dave"),
            (ChainSegment::Cosmos("dhealth".into()), "erin"),
        ] {
            let did = DidHealthParser::build(&segment, name).unwrap();
            let parsed = DidHealthParser::parse(&did).unwrap();
            assert_eq!(parsed.segment, segment);
            assert_eq!(parsed.name, name);
            assert_eq!(parsed.did, did);
        }
    }

    #[test]
    fn build_rejects_invalid_name() {
        assert!(DidHealthParser::build(&ChainSegment::Evm(1), "has space").is_err());
        assert!(DidHealthParser::build(&ChainSegment::Evm(1), "").is_err());
    }

    #[test]
    fn build_rejects_segments_that_parse_differently() {
        for segment in [
            ChainSegment::Evm(0),
            ChainSegment::Cosmos("btc".into()),
            ChainSegment::Cosmos("bitcoin".into()),
            ChainSegment::Cosmos("solana".into()),
            ChainSegment::Cosmos("sol".into()),
            ChainSegment::Cosmos("1234".into()),
            ChainSegment::Cosmos(String::new()),
            ChainSegment::Cosmos("Dhealth".into()),
        ] {
            let e = DidHealthParser::build(&segment, "alice").unwrap_err();
            assert!(matches!(e, DidHealthError::InvalidDid(_)), "{segment:?}");
        }
        assert!(ChainSegment::Cosmos("dhealth".into()).ensure_canonical().is_ok());
    }

    #[test]
    fn name_validation() {
        assert!(is_valid_name("abc-123"));
        assert!(!is_valid_name("abc_123"));
        assert!(!is_valid_name("ABC"));
        assert!(!is_valid_name(""));
    }
}
