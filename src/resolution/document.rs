//! Identity document types as stored on IPFS and returned by resolution.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::parser::ChainSegment;

pub const DID_CONTEXT: &str = "https://www.w3.org/ns/did/v1";
/// service type written for resources discovered only through registry pointers
pub const FHIR_RESOURCE_SERVICE_TYPE: &str = "FHIRResource";
pub const FHIR_FRAGMENT: &str = "fhir";

/// genesis block hash identifying Bitcoin mainnet in CAIP-2 account ids
const BIP122_MAINNET: &str = "000000000019d6689c085ae165831e93";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityDocument {
    #[serde(rename = "@context", default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<String>,
    pub id: String,
    pub controller: String,
    #[serde(default)]
    pub service: Vec<ServiceEndpoint>,
    #[serde(default)]
    pub verification_method: Vec<VerificationMethod>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authentication: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reputation_score: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Credentials>,
}

/// A `service[]` entry. Fields this crate does not know are kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceEndpoint {
    pub id: String,
    #[serde(rename = "type")]
    pub service_type: String,
    pub service_endpoint: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ServiceEndpoint {
    pub fn new(id: impl Into<String>, service_type: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            service_type: service_type.into(),
            service_endpoint: endpoint.into(),
            extra: Map::new(),
        }
    }

    /// fragment part of the id (`fhir` for `did:health:1:alice#fhir`)
    pub fn fragment(&self) -> Option<&str> {
        self.id.rsplit_once('#').map(|(_, f)| f)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationMethod {
    pub id: String,
    #[serde(rename = "type")]
    pub method_type: String,
    pub controller: String,
    /// key material, e.g. `ethereumAddress` or `publicKeyBase58`
    #[serde(flatten)]
    pub material: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub has_world_id: bool,
    pub has_polygon_id: bool,
    pub has_social_id: bool,
}

impl IdentityDocument {
    pub fn new(id: impl Into<String>, controller: impl Into<String>) -> Self {
        Self {
            context: vec![DID_CONTEXT.to_string()],
            id: id.into(),
            controller: controller.into(),
            service: Vec::new(),
            verification_method: Vec::new(),
            authentication: Vec::new(),
            reputation_score: None,
            credentials: None,
        }
    }

    pub fn with_service(mut self, service: ServiceEndpoint) -> Self {
        self.merge_service(service);
        self
    }

    pub fn with_verification_method(mut self, method: VerificationMethod) -> Self {
        self.verification_method.push(method);
        self
    }

    /// Replace the entry with the same id and type, or append.
    pub fn merge_service(&mut self, service: ServiceEndpoint) {
        match self
            .service
            .iter_mut()
            .find(|s| s.id == service.id && s.service_type == service.service_type)
        {
            Some(existing) => *existing = service,
            None => self.service.push(service),
        }
    }

    /// The primary FHIR entry: the `#fhir` service, else the first one.
    pub fn fhir_service(&self) -> Option<&ServiceEndpoint> {
        self.service_by_fragment(FHIR_FRAGMENT)
            .or_else(|| self.service.first())
    }

    pub fn service_by_fragment(&self, fragment: &str) -> Option<&ServiceEndpoint> {
        self.service.iter().find(|s| s.fragment() == Some(fragment))
    }

    pub fn service_by_type(&self, service_type: &str) -> Option<&ServiceEndpoint> {
        self.service.iter().find(|s| s.service_type == service_type)
    }
}

/// The controller verification method a chain family uses.
pub fn verification_method_for(segment: &ChainSegment, did: &str, controller: &str) -> VerificationMethod {
    let mut material = Map::new();
    let method_type = match segment {
        ChainSegment::Evm(_) => {
            material.insert(
                "ethereumAddress".to_string(),
                Value::String(controller.to_ascii_lowercase()),
            );
            "EcdsaSecp256k1RecoveryMethod2020"
        }
        ChainSegment::Bitcoin => {
            material.insert(
                "blockchainAccountId".to_string(),
                Value::String(format!("bip122:{BIP122_MAINNET}:{controller}")),
            );
            "BitcoinAddress2021"
        }
        ChainSegment::Solana => {
            material.insert(
                "publicKeyBase58".to_string(),
                Value::String(controller.to_string()),
            );
            "SolanaVerificationKey2021"
        }
        ChainSegment::Cosmos(chain) => {
            material.insert(
                "blockchainAccountId".to_string(),
                Value::String(format!("cosmos:{chain}:{controller}")),
            );
            "EcdsaSecp256k1VerificationKey2019"
        }
    };

    VerificationMethod {
        id: format!("{did}#controller"),
        method_type: method_type.to_string(),
        controller: did.to_string(),
        material,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn merge_service_replaces_matching_id_and_type() {
        let mut doc = IdentityDocument::new("did:health:1:alice", "0xabc")
            .with_service(ServiceEndpoint::new("did:health:1:alice#fhir", "Patient", "ipfs://a"));
        doc.merge_service(ServiceEndpoint::new("did:health:1:alice#fhir", "Patient", "ipfs://b"));
        assert_eq!(doc.service.len(), 1);
        assert_eq!(doc.service[0].service_endpoint, "ipfs://b");

        // same id, different type appends
        doc.merge_service(ServiceEndpoint::new("did:health:1:alice#fhir", "Organization", "ipfs://c"));
        assert_eq!(doc.service.len(), 2);
    }

    #[test]
    fn unknown_service_fields_survive_a_round_trip() {
        let raw = json!({
            "id": "did:health:1:alice",
            "controller": "0xabc",
            "service": [{
                "id": "did:health:1:alice#org",
                "type": "Organization",
                "serviceEndpoint": "ipfs://x/Organization/1.json",
                "description": "clinic",
                "priority": 2
            }],
            "verificationMethod": []
        });
        let doc: IdentityDocument = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(doc.service[0].extra.get("priority"), Some(&json!(2)));
        assert_eq!(
            serde_json::to_value(&doc.service[0]).unwrap(),
            raw["service"][0]
        );
    }

    #[test]
    fn fhir_service_prefers_fragment() {
        let doc = IdentityDocument::new("did:health:1:alice", "0xabc")
            .with_service(ServiceEndpoint::new("did:health:1:alice#org", "Organization", "ipfs://o"))
            .with_service(ServiceEndpoint::new("did:health:1:alice#fhir", "Patient", "ipfs://p"));
        assert_eq!(doc.fhir_service().unwrap().service_endpoint, "ipfs://p");
        assert_eq!(doc.service_by_type("Organization").unwrap().service_endpoint, "ipfs://o");

        let no_fragment = IdentityDocument::new("did:health:1:bob", "0xabc")
            .with_service(ServiceEndpoint::new("did:health:1:bob#org", "Organization", "ipfs://o"));
        assert_eq!(no_fragment.fhir_service().unwrap().service_endpoint, "ipfs://o");
    }

    #[test]
    fn verification_methods_per_family() {
        let evm = verification_method_for(&ChainSegment::Evm(1), "did:health:1:a", "0xABCDEF");
        assert_eq!(evm.method_type, "EcdsaSecp256k1RecoveryMethod2020");
        assert_eq!(evm.material.get("ethereumAddress"), Some(&json!("0xabcdef")));
        assert_eq!(evm.id, "did:health:1:a#controller");

        let sol = verification_method_for(&ChainSegment::Solana, "did:health:solana:a", "9xQe");
        assert_eq!(sol.method_type, "SolanaVerificationKey2021");
        assert_eq!(sol.material.get("publicKeyBase58"), Some(&json!("9xQe")));

        let btc = verification_method_for(&ChainSegment::Bitcoin, "did:health:btc:a", "bc1q");
        assert_eq!(
            btc.material.get("blockchainAccountId"),
            Some(&json!("bip122:000000000019d6689c085ae165831e93:bc1q"))
        );

        let cosmos = verification_method_for(
            &ChainSegment::Cosmos("dhealth".into()),
            "did:health:dhealth:a",
            "tdh1xyz",
        );
        assert_eq!(
            cosmos.material.get("blockchainAccountId"),
            Some(&json!("cosmos:dhealth:tdh1xyz"))
        );
    }
}
