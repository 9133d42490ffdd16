use std::sync::Arc;

use tracing::debug;

use super::fhir::FhirResource;
use crate::{
    access::{AccessControlAdapter, AccessControlConditions, EncryptedPayload, SessionSigner},
    error::{AccessControlError, DidHealthError, DidHealthResult},
    resolution::document::IdentityDocument,
    storage::{ContentStore, ContentUri},
};

#[derive(Debug, Clone, PartialEq)]
pub enum LoadedResource {
    Plain(FhirResource),
    Decrypted {
        resource: FhirResource,
        conditions: AccessControlConditions,
    },
}

impl LoadedResource {
    pub fn resource(&self) -> &FhirResource {
        match self {
            LoadedResource::Plain(resource) => resource,
            LoadedResource::Decrypted { resource, .. } => resource,
        }
    }

    pub fn into_resource(self) -> FhirResource {
        match self {
            LoadedResource::Plain(resource) => resource,
            LoadedResource::Decrypted { resource, .. } => resource,
        }
    }

    pub fn was_encrypted(&self) -> bool {
        matches!(self, LoadedResource::Decrypted { .. })
    }
}

/// Reads the FHIR resource an identity document points at.
pub struct ResourceLoader {
    store: Arc<dyn ContentStore>,
    access: Option<Arc<AccessControlAdapter>>,
}

impl ResourceLoader {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self { store, access: None }
    }

    pub fn with_access(mut self, access: Arc<AccessControlAdapter>) -> Self {
        self.access = Some(access);
        self
    }

    /// Load the service entry named by `fragment`, or the primary FHIR entry.
    /// Encrypted resources need `signer`; a failed decryption is an error,
    /// never an empty result.
    pub async fn load(
        &self,
        document: &IdentityDocument,
        fragment: Option<&str>,
        signer: Option<&dyn SessionSigner>,
    ) -> DidHealthResult<LoadedResource> {
        let service = match fragment {
            Some(fragment) => document.service_by_fragment(fragment),
            None => document.fhir_service(),
        }
        .ok_or_else(|| {
            DidHealthError::InvalidResource(format!(
                "{} has no service entry {}",
                document.id,
                fragment.unwrap_or("for a FHIR resource")
            ))
        })?;

        let uri = ContentUri::parse(&service.service_endpoint)?;
        let bytes = self.store.fetch(&uri).await?;
        debug!(did = %document.id, %uri, size = bytes.len(), "fetched resource");

        let payload = match EncryptedPayload::sniff(&bytes) {
            Some(payload) => payload,
            None if uri.is_encrypted() => {
                return Err(AccessControlError::Decryption(format!(
                    "{uri} is not an encrypted payload"
                ))
                .into());
            }
            None => return Ok(LoadedResource::Plain(FhirResource::from_slice(&bytes)?)),
        };

        let access = self.access.as_ref().ok_or_else(|| {
            DidHealthError::BadConfiguration(
                "resource is encrypted but no access control adapter is configured".to_string(),
            )
        })?;
        let signer = signer.ok_or_else(|| {
            AccessControlError::InvalidSession("a wallet signer is required to open encrypted resources".to_string())
        })?;
        let plaintext = access.decrypt(&payload, signer).await?;
        Ok(LoadedResource::Decrypted {
            resource: FhirResource::from_slice(&plaintext)?,
            conditions: payload.access_control_conditions,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        access::{LocalKeyNetwork, testing::CountingSigner},
        resolution::document::ServiceEndpoint,
        storage::MemoryStore,
    };

    const DID: &str = "did:health:11155111:alice";

    fn document(endpoints: &[(&str, &str)]) -> IdentityDocument {
        endpoints.iter().fold(IdentityDocument::new(DID, "0xabc"), |doc, (fragment, uri)| {
            doc.with_service(ServiceEndpoint::new(format!("{DID}#{fragment}"), "Patient", *uri))
        })
    }

    #[tokio::test]
    async fn plain_resources_by_fragment() {
        let store = Arc::new(MemoryStore::new());
        let first = store
            .store(br#"{"resourceType":"Patient","id":"a"}"#.to_vec(), "Patient/a.json")
            .await
            .unwrap();
        let second = store
            .store(br#"{"resourceType":"Device","id":"b"}"#.to_vec(), "Device/b.json")
            .await
            .unwrap();
        let doc = document(&[("fhir", first.to_native().as_str()), ("pump", second.to_gateway("https://w3s.link").as_str())]);

        let loader = ResourceLoader::new(store);
        let primary = loader.load(&doc, None, None).await.unwrap();
        assert!(!primary.was_encrypted());
        assert_eq!(primary.resource().id(), Some("a"));
        let pump = loader.load(&doc, Some("pump"), None).await.unwrap();
        assert_eq!(pump.into_resource().resource_type(), Some("Device"));
        assert!(matches!(
            loader.load(&doc, Some("missing"), None).await,
            Err(DidHealthError::InvalidResource(_))
        ));
    }

    #[tokio::test]
    async fn encrypted_resources_need_a_signer() {
        let store = Arc::new(MemoryStore::new());
        let access = Arc::new(AccessControlAdapter::new(Arc::new(LocalKeyNetwork::new([1; 32]))));
        let owner = CountingSigner::new(3);
        let conditions = AccessControlConditions::self_only("sepolia", &owner.wallet.address());
        let sealed = access
            .encrypt(&serde_json::to_vec(&json!({ "resourceType": "Patient" })).unwrap(), "sepolia", &conditions)
            .await
            .unwrap();
        let uri = store.store(sealed.json, "Patient/x.enc").await.unwrap();
        let doc = document(&[("fhir", uri.to_native().as_str())]);

        let loader = ResourceLoader::new(store.clone()).with_access(access);
        let e = loader.load(&doc, None, None).await.unwrap_err();
        assert!(matches!(e, DidHealthError::AccessControl(AccessControlError::InvalidSession(_))));

        let loaded = loader.load(&doc, None, Some(&owner)).await.unwrap();
        assert_eq!(loaded, LoadedResource::Decrypted {
            resource: FhirResource::from_value(json!({ "resourceType": "Patient" })).unwrap(),
            conditions,
        });

        let garbage = store.store(b"not json".to_vec(), "Patient/y.lit").await.unwrap();
        let doc = document(&[("fhir", garbage.to_native().as_str())]);
        let e = loader.load(&doc, None, Some(&owner)).await.unwrap_err();
        assert!(matches!(e, DidHealthError::AccessControl(AccessControlError::Decryption(_))));
    }
}
