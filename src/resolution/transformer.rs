use serde_json::Value;

use crate::{
    error::DidHealthResult,
    resolution::{
        document::{
            Credentials, DID_CONTEXT, FHIR_FRAGMENT, FHIR_RESOURCE_SERVICE_TYPE, IdentityDocument,
            ServiceEndpoint,
        },
        parser::DID_HEALTH_PREFIX,
    },
};

pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// A registry entry as read from a chain, before it is shaped into a document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegistryRecord {
    pub owner: String,
    /// the DID as stored on chain, with or without the `did:health:` prefix
    pub health_did: String,
    pub pointer_uri: String,
    pub alt_pointer_uris: Vec<String>,
    pub has_world_id: bool,
    pub has_polygon_id: bool,
    pub has_social_id: bool,
    /// only registries that track trust signals set this
    pub reputation_score: Option<u64>,
    /// identity document fetched from `pointer_uri`, when the resolver hydrated it
    pub stored_document: Option<IdentityDocument>,
}

impl RegistryRecord {
    /// Registries return zeroed structs for unknown keys; those are "not found".
    pub fn is_empty(&self) -> bool {
        self.owner.is_empty()
            || self.owner.eq_ignore_ascii_case(ZERO_ADDRESS)
            || self.health_did.is_empty()
            || self.health_did == DID_HEALTH_PREFIX
    }

    pub fn did(&self) -> String {
        if self.health_did.starts_with(DID_HEALTH_PREFIX) {
            self.health_did.clone()
        } else {
            format!("{DID_HEALTH_PREFIX}{}", self.health_did)
        }
    }
}

/// Shape a registry record into an identity document. Pure; performs no I/O.
pub fn build_document(record: &RegistryRecord) -> IdentityDocument {
    let did = record.did();
    let mut document = IdentityDocument::new(did.clone(), normalize_controller(&record.owner));

    match &record.stored_document {
        Some(stored) => {
            document.service = stored.service.clone();
            document.verification_method = stored.verification_method.clone();
            document.authentication = stored.authentication.clone();
        }
        None if !record.pointer_uri.is_empty() => {
            document.service.push(ServiceEndpoint::new(
                format!("{did}#{FHIR_FRAGMENT}"),
                FHIR_RESOURCE_SERVICE_TYPE,
                record.pointer_uri.clone(),
            ));
        }
        None => {}
    }

    for (index, uri) in record.alt_pointer_uris.iter().enumerate() {
        if document.service.iter().any(|s| &s.service_endpoint == uri) {
            continue;
        }
        document.service.push(ServiceEndpoint::new(
            format!("{did}#alt-{index}"),
            FHIR_RESOURCE_SERVICE_TYPE,
            uri.clone(),
        ));
    }

    if let Some(score) = record.reputation_score {
        document.reputation_score = Some(score);
        document.credentials = Some(Credentials {
            has_world_id: record.has_world_id,
            has_polygon_id: record.has_polygon_id,
            has_social_id: record.has_social_id,
        });
    }

    document
}

/// Serialize a document for ssi output, making sure the DID context is present.
pub fn document_to_json(document: &IdentityDocument) -> DidHealthResult<Value> {
    let mut document = document.clone();
    if !document
        .context
        .iter()
        .any(|c| c == DID_CONTEXT || c == "https://w3id.org/did/v1")
    {
        document.context.insert(0, DID_CONTEXT.to_string());
    }
    Ok(serde_json::to_value(document)?)
}

/// EVM hex addresses are compared and emitted lower-case; other addresses are case sensitive.
pub fn normalize_controller(owner: &str) -> String {
    let is_evm_hex = owner.len() == 42
        && (owner.starts_with("0x") || owner.starts_with("0X"))
        && owner[2..].bytes().all(|b| b.is_ascii_hexdigit());
    if is_evm_hex {
        owner.to_ascii_lowercase()
    } else {
        owner.to_string()
    }
}
