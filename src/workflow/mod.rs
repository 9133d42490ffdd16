//! Registration and update of a DID with its FHIR resource.
//!
//! A [Registrar] walks a fixed sequence of [RegistrationStep]s: validate,
//! protect the resource, upload it, build and upload the identity document,
//! then submit and confirm the registry transaction. Every step of a run is
//! published on that run's watch channel so a front end can render progress. The first failing step
//! moves the run to [RegistrationStep::Failed]; blobs uploaded before the
//! failure are left in storage.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::{
    access::{AccessControlAdapter, AccessControlConditions},
    chains::{Availability, RegistryAdapter, TxReceipt, ensure_segment},
    error::{DidHealthError, DidHealthResult},
    resolution::{
        document::{FHIR_FRAGMENT, IdentityDocument, ServiceEndpoint},
        parser::{DidHealthParsed, DidHealthParser},
        transformer::normalize_controller,
    },
    storage::{ContentStore, ContentUri},
};

pub mod fhir;
pub mod loader;

pub use self::{
    fhir::{FhirResource, ResourceKind},
    loader::{LoadedResource, ResourceLoader},
};

/// directory identity documents are uploaded under
pub const DOCUMENT_DIRECTORY: &str = "didDocument";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationStep {
    /// nothing has run yet
    Idle,
    Validating,
    Encrypting,
    SkippingEncryption,
    Uploading,
    DocumentBuilding,
    DocumentUploading,
    Submitting,
    Confirming,
    Done,
    Failed,
}

/// How a resource is stored.
#[derive(Debug, Clone, PartialEq)]
pub enum Protection {
    Plaintext,
    Encrypted { conditions: AccessControlConditions },
}

#[derive(Debug, Clone)]
pub struct RegistrationRequest {
    pub did: String,
    /// wallet that signs the registry transaction
    pub controller: String,
    pub resource: FhirResource,
    pub protection: Protection,
}

#[derive(Debug, Clone)]
pub struct UpdateRequest {
    pub did: String,
    pub current_document: IdentityDocument,
    pub resource: FhirResource,
    pub protection: Protection,
}

#[derive(Debug, Clone)]
pub struct AltDataRequest {
    pub did: String,
    pub resources: Vec<FhirResource>,
    pub protection: Protection,
}

#[derive(Debug, Clone)]
pub struct RegistrationReceipt {
    pub did: String,
    pub resource_uri: ContentUri,
    pub encrypted: bool,
    pub document: IdentityDocument,
    pub document_uri: ContentUri,
    pub transaction: TxReceipt,
    pub steps: Vec<RegistrationStep>,
}

#[derive(Debug, Clone)]
pub struct AltDataReceipt {
    pub did: String,
    pub uris: Vec<ContentUri>,
    pub transaction: TxReceipt,
    pub steps: Vec<RegistrationStep>,
}

/// A stored resource, before the document points at it.
struct Upload {
    uri: ContentUri,
    encrypted: bool,
}

struct StepLog<'a> {
    did: &'a str,
    sender: &'a watch::Sender<RegistrationStep>,
    steps: Vec<RegistrationStep>,
}

impl<'a> StepLog<'a> {
    fn new(did: &'a str, sender: &'a watch::Sender<RegistrationStep>) -> Self {
        Self {
            did,
            sender,
            steps: Vec::new(),
        }
    }

    fn enter(&mut self, step: RegistrationStep) {
        info!(did = %self.did, ?step, "registration step");
        self.sender.send_replace(step);
        self.steps.push(step);
    }

    fn fail(&mut self, error: &DidHealthError) {
        warn!(did = %self.did, %error, "registration failed");
        self.sender.send_replace(RegistrationStep::Failed);
        self.steps.push(RegistrationStep::Failed);
    }
}

pub struct Registrar {
    store: Arc<dyn ContentStore>,
    access: Option<Arc<AccessControlAdapter>>,
}

/// One registrar operation reporting its steps on a channel of its own.
pub struct RegistrarRun<'a> {
    registrar: &'a Registrar,
    progress: watch::Sender<RegistrationStep>,
}

impl Registrar {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self { store, access: None }
    }

    pub fn with_access(mut self, access: Arc<AccessControlAdapter>) -> Self {
        self.access = Some(access);
        self
    }

    /// Start a run whose steps are published only to the returned receiver.
    pub fn start(&self) -> (RegistrarRun<'_>, watch::Receiver<RegistrationStep>) {
        let (progress, receiver) = watch::channel(RegistrationStep::Idle);
        (
            RegistrarRun {
                registrar: self,
                progress,
            },
            receiver,
        )
    }

    pub async fn register(
        &self,
        adapter: &dyn RegistryAdapter,
        request: RegistrationRequest,
    ) -> DidHealthResult<RegistrationReceipt> {
        self.start().0.register(adapter, request).await
    }

    pub async fn update(
        &self,
        adapter: &dyn RegistryAdapter,
        request: UpdateRequest,
    ) -> DidHealthResult<RegistrationReceipt> {
        self.start().0.update(adapter, request).await
    }

    pub async fn add_alt_data(
        &self,
        adapter: &dyn RegistryAdapter,
        request: AltDataRequest,
    ) -> DidHealthResult<AltDataReceipt> {
        self.start().0.add_alt_data(adapter, request).await
    }
}

impl RegistrarRun<'_> {
    pub async fn register(
        self,
        adapter: &dyn RegistryAdapter,
        request: RegistrationRequest,
    ) -> DidHealthResult<RegistrationReceipt> {
        let did = request.did.clone();
        let mut log = StepLog::new(&did, &self.progress);
        match self.registrar.run_register(adapter, request, &mut log).await {
            Ok(receipt) => Ok(receipt),
            Err(e) => {
                log.fail(&e);
                Err(e)
            }
        }
    }

    pub async fn update(
        self,
        adapter: &dyn RegistryAdapter,
        request: UpdateRequest,
    ) -> DidHealthResult<RegistrationReceipt> {
        let did = request.did.clone();
        let mut log = StepLog::new(&did, &self.progress);
        match self.registrar.run_update(adapter, request, &mut log).await {
            Ok(receipt) => Ok(receipt),
            Err(e) => {
                log.fail(&e);
                Err(e)
            }
        }
    }

    /// Upload further resources and anchor their URIs next to the primary pointer.
    pub async fn add_alt_data(
        self,
        adapter: &dyn RegistryAdapter,
        request: AltDataRequest,
    ) -> DidHealthResult<AltDataReceipt> {
        let did = request.did.clone();
        let mut log = StepLog::new(&did, &self.progress);
        match self.registrar.run_alt_data(adapter, request, &mut log).await {
            Ok(receipt) => Ok(receipt),
            Err(e) => {
                log.fail(&e);
                Err(e)
            }
        }
    }
}

impl Registrar {
    async fn run_register(
        &self,
        adapter: &dyn RegistryAdapter,
        request: RegistrationRequest,
        log: &mut StepLog<'_>,
    ) -> DidHealthResult<RegistrationReceipt> {
        log.enter(RegistrationStep::Validating);
        let parsed = DidHealthParser::parse(&request.did)?;
        if parsed.is_address_named() {
            return Err(DidHealthError::InvalidDid(format!(
                "{} must be registered under a chosen name",
                parsed.did
            )));
        }
        ensure_segment(adapter.entry(), &parsed)?;
        let kind = request.resource.kind()?;
        match adapter.check_availability(&parsed).await? {
            Availability::Available => {}
            Availability::Taken { owner } => {
                return Err(DidHealthError::DidAlreadyRegistered {
                    did: parsed.did,
                    owner,
                });
            }
            Availability::ChainUnsupported { segment } => {
                return Err(DidHealthError::NetworkNotSupported(segment));
            }
        }

        let upload = self
            .upload_resource(adapter, &parsed, kind, request.resource, &request.protection, log)
            .await?;

        log.enter(RegistrationStep::DocumentBuilding);
        let method = adapter.verification_method(&parsed.did, &request.controller);
        let document = IdentityDocument::new(parsed.did.clone(), normalize_controller(&request.controller))
            .with_service(ServiceEndpoint::new(
                format!("{}#{FHIR_FRAGMENT}", parsed.did),
                kind.as_str(),
                upload.uri.to_native(),
            ));
        let mut document = document.with_verification_method(method.clone());
        document.authentication.push(method.id);

        let (document_uri, transaction) = self
            .publish(adapter, &parsed, &document, Submission::Register, log)
            .await?;

        Ok(RegistrationReceipt {
            did: parsed.did,
            resource_uri: upload.uri,
            encrypted: upload.encrypted,
            document,
            document_uri,
            transaction,
            steps: log.steps.clone(),
        })
    }

    async fn run_update(
        &self,
        adapter: &dyn RegistryAdapter,
        request: UpdateRequest,
        log: &mut StepLog<'_>,
    ) -> DidHealthResult<RegistrationReceipt> {
        log.enter(RegistrationStep::Validating);
        let parsed = DidHealthParser::parse(&request.did)?;
        ensure_segment(adapter.entry(), &parsed)?;
        if request.current_document.id != parsed.did {
            return Err(DidHealthError::InvalidResource(format!(
                "document {} does not belong to {}",
                request.current_document.id, parsed.did
            )));
        }
        let kind = request.resource.kind()?;
        if adapter.check_availability(&parsed).await?.is_available() {
            return Err(DidHealthError::DidNotFound(parsed.did));
        }

        let upload = self
            .upload_resource(adapter, &parsed, kind, request.resource, &request.protection, log)
            .await?;

        log.enter(RegistrationStep::DocumentBuilding);
        let mut document = request.current_document;
        let service = match document.service_by_type(kind.as_str()) {
            Some(existing) => {
                let mut service = existing.clone();
                service.service_endpoint = upload.uri.to_native();
                service
            }
            None => ServiceEndpoint::new(
                service_id_for(&document, &parsed.did, kind),
                kind.as_str(),
                upload.uri.to_native(),
            ),
        };
        document.merge_service(service);

        let (document_uri, transaction) = self
            .publish(adapter, &parsed, &document, Submission::Update, log)
            .await?;

        Ok(RegistrationReceipt {
            did: parsed.did,
            resource_uri: upload.uri,
            encrypted: upload.encrypted,
            document,
            document_uri,
            transaction,
            steps: log.steps.clone(),
        })
    }

    async fn run_alt_data(
        &self,
        adapter: &dyn RegistryAdapter,
        request: AltDataRequest,
        log: &mut StepLog<'_>,
    ) -> DidHealthResult<AltDataReceipt> {
        log.enter(RegistrationStep::Validating);
        let parsed = DidHealthParser::parse(&request.did)?;
        ensure_segment(adapter.entry(), &parsed)?;
        if request.resources.is_empty() {
            return Err(DidHealthError::InvalidResource("no resources to add".to_string()));
        }
        let kinds = request
            .resources
            .iter()
            .map(FhirResource::kind)
            .collect::<DidHealthResult<Vec<_>>>()?;
        if adapter.check_availability(&parsed).await?.is_available() {
            return Err(DidHealthError::DidNotFound(parsed.did));
        }

        let mut uris = Vec::with_capacity(kinds.len());
        for (resource, kind) in request.resources.into_iter().zip(kinds) {
            let upload = self
                .upload_resource(adapter, &parsed, kind, resource, &request.protection, log)
                .await?;
            uris.push(upload.uri);
        }

        log.enter(RegistrationStep::Submitting);
        let native: Vec<String> = uris.iter().map(ContentUri::to_native).collect();
        let tx = adapter.submit_alt_data(&parsed, &native).await?;
        log.enter(RegistrationStep::Confirming);
        let transaction = adapter.confirm(&tx).await?;
        log.enter(RegistrationStep::Done);

        Ok(AltDataReceipt {
            did: parsed.did,
            uris,
            transaction,
            steps: log.steps.clone(),
        })
    }

    /// Tag, optionally encrypt, and store one resource.
    async fn upload_resource(
        &self,
        adapter: &dyn RegistryAdapter,
        did: &DidHealthParsed,
        kind: ResourceKind,
        mut resource: FhirResource,
        protection: &Protection,
        log: &mut StepLog<'_>,
    ) -> DidHealthResult<Upload> {
        resource.with_did_identifier(&did.did);
        let id = resource.ensure_id();
        let plaintext = resource.to_vec()?;

        let conditions = match protection {
            Protection::Encrypted { conditions } if !kind.is_plaintext_eligible() => Some(conditions),
            _ => None,
        };

        let (blob, name_hint, encrypted) = match conditions {
            Some(conditions) => {
                log.enter(RegistrationStep::Encrypting);
                let access = self.access.as_ref().ok_or_else(|| {
                    DidHealthError::BadConfiguration(
                        "encryption requested but no access control adapter is configured".to_string(),
                    )
                })?;
                let sealed = access
                    .encrypt(&plaintext, &adapter.entry().access_control_chain, conditions)
                    .await?;
                (sealed.json, format!("{kind}/{}.enc", sealed.content_hash), true)
            }
            None => {
                log.enter(RegistrationStep::SkippingEncryption);
                (plaintext, format!("{kind}/{id}.json"), false)
            }
        };

        log.enter(RegistrationStep::Uploading);
        let uri = self.store.store(blob, &name_hint).await?;
        info!(did = %did.did, uri = %uri, encrypted, "resource uploaded");
        Ok(Upload { uri, encrypted })
    }

    /// Upload the document, then submit and confirm its pointer.
    async fn publish(
        &self,
        adapter: &dyn RegistryAdapter,
        did: &DidHealthParsed,
        document: &IdentityDocument,
        submission: Submission,
        log: &mut StepLog<'_>,
    ) -> DidHealthResult<(ContentUri, TxReceipt)> {
        log.enter(RegistrationStep::DocumentUploading);
        let name_hint = format!("{DOCUMENT_DIRECTORY}/{}.json", uuid::Uuid::new_v4());
        let document_uri = self
            .store
            .store(serde_json::to_vec_pretty(document)?, &name_hint)
            .await?;
        let pointer = document_uri.to_native();

        log.enter(RegistrationStep::Submitting);
        let tx = match submission {
            Submission::Register => adapter.submit_registration(did, &pointer).await?,
            Submission::Update => adapter.submit_update(did, &pointer).await?,
        };
        info!(did = %did.did, tx = %tx.id, chain = %tx.network, "transaction submitted");

        log.enter(RegistrationStep::Confirming);
        let receipt = adapter.confirm(&tx).await?;
        log.enter(RegistrationStep::Done);
        Ok((document_uri, receipt))
    }
}

enum Submission {
    Register,
    Update,
}

/// Id for a new service entry of `kind`: `#fhir` while it is free, else `#<kind>`.
fn service_id_for(document: &IdentityDocument, did: &str, kind: ResourceKind) -> String {
    if document.service_by_fragment(FHIR_FRAGMENT).is_none() {
        format!("{did}#{FHIR_FRAGMENT}")
    } else {
        format!("{did}#{}", kind.as_str().to_ascii_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::{
        access::{
            EncryptedPayload, KeyNetwork, LocalKeyNetwork, SessionSignatures, testing::CountingSigner,
        },
        chains::{
            ChainAdapter,
            evm::testing::{ChainState, SharedChain, fake_adapter},
        },
        resolution::resolver::CrossChainResolver,
        storage::MemoryStore,
    };

    const WALLET: &str = "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf";

    /// Local key network that counts encryptions.
    struct CountingNetwork {
        inner: LocalKeyNetwork,
        encrypts: AtomicUsize,
    }

    impl CountingNetwork {
        fn new() -> Self {
            Self {
                inner: LocalKeyNetwork::new([42; 32]),
                encrypts: AtomicUsize::new(0),
            }
        }

        fn encrypts(&self) -> usize {
            self.encrypts.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl KeyNetwork for CountingNetwork {
        async fn challenge_nonce(&self) -> DidHealthResult<String> {
            self.inner.challenge_nonce().await
        }

        async fn encrypt(
            &self,
            plaintext: &[u8],
            chain: &str,
            conditions: &AccessControlConditions,
        ) -> DidHealthResult<EncryptedPayload> {
            self.encrypts.fetch_add(1, Ordering::SeqCst);
            self.inner.encrypt(plaintext, chain, conditions).await
        }

        async fn decrypt(
            &self,
            payload: &EncryptedPayload,
            session: &SessionSignatures,
        ) -> DidHealthResult<Vec<u8>> {
            self.inner.decrypt(payload, session).await
        }
    }

    struct Fixture {
        chain: SharedChain,
        store: Arc<MemoryStore>,
        network: Arc<CountingNetwork>,
        access: Arc<AccessControlAdapter>,
        registrar: Registrar,
    }

    fn fixture() -> Fixture {
        let chain: SharedChain = Arc::new(Mutex::new(ChainState::default()));
        let store = Arc::new(MemoryStore::new());
        let network = Arc::new(CountingNetwork::new());
        let access = Arc::new(AccessControlAdapter::new(network.clone()));
        let registrar = Registrar::new(store.clone()).with_access(access.clone());
        Fixture {
            chain,
            store,
            network,
            access,
            registrar,
        }
    }

    fn organization() -> FhirResource {
        FhirResource::from_value(json!({
            "resourceType": "Organization",
            "id": "acme",
            "name": "Acme Clinic"
        }))
        .unwrap()
    }

    fn patient(family: &str) -> FhirResource {
        FhirResource::from_value(json!({
            "resourceType": "Patient",
            "name": [{ "family": family, "given": ["Alice"] }]
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn organization_is_stored_in_plaintext() {
        let f = fixture();
        let adapter = fake_adapter(f.chain.clone(), WALLET);
        let (run, progress) = f.registrar.start();
        let did = "did:health:11155111:acme-clinic";

        let receipt = run
            .register(
                &adapter,
                RegistrationRequest {
                    did: did.to_string(),
                    controller: WALLET.to_string(),
                    resource: organization(),
                    protection: Protection::Encrypted {
                        conditions: AccessControlConditions::self_only("sepolia", WALLET),
                    },
                },
            )
            .await
            .unwrap();

        assert_eq!(
            receipt.steps,
            vec![
                RegistrationStep::Validating,
                RegistrationStep::SkippingEncryption,
                RegistrationStep::Uploading,
                RegistrationStep::DocumentBuilding,
                RegistrationStep::DocumentUploading,
                RegistrationStep::Submitting,
                RegistrationStep::Confirming,
                RegistrationStep::Done,
            ]
        );
        assert_eq!(*progress.borrow(), RegistrationStep::Done);
        assert_eq!(f.network.encrypts(), 0);
        assert!(!receipt.encrypted);
        assert_eq!(f.store.write_count(), 2);
        assert_eq!(receipt.resource_uri.path.as_deref(), Some("Organization/acme.json"));

        let service = &receipt.document.service[0];
        assert_eq!(service.id, format!("{did}#fhir"));
        assert_eq!(service.service_type, "Organization");
        assert_eq!(service.service_endpoint, receipt.resource_uri.to_native());
        assert_eq!(receipt.document.verification_method.len(), 1);
        assert_eq!(receipt.document.authentication, vec![receipt.document.verification_method[0].id.clone()]);

        let stored = FhirResource::from_slice(&f.store.fetch(&receipt.resource_uri).await.unwrap()).unwrap();
        assert_eq!(stored.did_identifier(), Some(did));

        let state = f.chain.lock().unwrap();
        let (owner, uri, _) = &state.records["11155111:acme-clinic"];
        assert_eq!(owner, WALLET);
        assert_eq!(uri, &receipt.document_uri.to_native());
        assert!(receipt.document_uri.path.as_deref().unwrap().starts_with("didDocument/"));
    }

    #[tokio::test]
    async fn patient_is_encrypted_for_its_owner_only() {
        let f = fixture();
        let owner = CountingSigner::new(7);
        let address = owner.wallet.address();
        let adapter = fake_adapter(f.chain.clone(), &address);
        let conditions = AccessControlConditions::self_only("sepolia", &address);

        let receipt = f
            .registrar
            .register(
                &adapter,
                RegistrationRequest {
                    did: "did:health:11155111:alice".to_string(),
                    controller: address.clone(),
                    resource: patient("Smith"),
                    protection: Protection::Encrypted {
                        conditions: conditions.clone(),
                    },
                },
            )
            .await
            .unwrap();

        assert_eq!(receipt.steps[1], RegistrationStep::Encrypting);
        assert_eq!(receipt.steps[2], RegistrationStep::Uploading);
        assert_eq!(f.network.encrypts(), 1);
        assert!(receipt.encrypted);
        let path = receipt.resource_uri.path.as_deref().unwrap();
        assert!(path.starts_with("Patient/") && path.ends_with(".enc"));

        let blob = f.store.fetch(&receipt.resource_uri).await.unwrap();
        let payload = EncryptedPayload::sniff(&blob).unwrap();
        assert_eq!(payload.access_control_conditions, conditions);
        assert_eq!(payload.chain, "sepolia");

        let loader = ResourceLoader::new(f.store.clone()).with_access(f.access.clone());
        let loaded = loader.load(&receipt.document, None, Some(&owner)).await.unwrap();
        assert!(loaded.was_encrypted());
        assert_eq!(loaded.resource().did_identifier(), Some("did:health:11155111:alice"));

        let stranger = CountingSigner::new(8);
        f.access.clear_session().await;
        let denied = loader.load(&receipt.document, None, Some(&stranger)).await.unwrap_err();
        assert!(matches!(denied, DidHealthError::AccessControl(_)));
    }

    #[tokio::test]
    async fn registered_document_round_trips_through_resolution() {
        let f = fixture();
        let adapter = fake_adapter(f.chain.clone(), WALLET);
        let receipt = f
            .registrar
            .register(
                &adapter,
                RegistrationRequest {
                    did: "did:health:11155111:acme-clinic".to_string(),
                    controller: WALLET.to_string(),
                    resource: organization(),
                    protection: Protection::Plaintext,
                },
            )
            .await
            .unwrap();

        let resolver = CrossChainResolver::new(vec![ChainAdapter::Evm(fake_adapter(f.chain.clone(), WALLET))])
            .with_store(f.store.clone());
        let resolved = resolver.resolve_by_wallet(WALLET).await.unwrap().unwrap();
        assert_eq!(resolved.document.id, receipt.did);
        assert_eq!(resolved.document.service, receipt.document.service);

        let nobody = resolver
            .resolve_by_wallet("0x000000000000000000000000000000000000dead")
            .await
            .unwrap();
        assert!(nobody.is_none());
    }

    #[tokio::test]
    async fn update_replaces_only_the_matching_service() {
        let f = fixture();
        let adapter = fake_adapter(f.chain.clone(), WALLET);
        let did = "did:health:11155111:alice";
        let registered = f
            .registrar
            .register(
                &adapter,
                RegistrationRequest {
                    did: did.to_string(),
                    controller: WALLET.to_string(),
                    resource: patient("Smith"),
                    protection: Protection::Plaintext,
                },
            )
            .await
            .unwrap();

        let mut current = registered.document.clone();
        current.service.push(ServiceEndpoint::new(
            format!("{did}#org"),
            "Organization",
            "ipfs://bafyorg/Organization/acme.json",
        ));
        let untouched = serde_json::to_string(&current.service[1]).unwrap();

        let updated = f
            .registrar
            .update(
                &adapter,
                UpdateRequest {
                    did: did.to_string(),
                    current_document: current,
                    resource: patient("Jones"),
                    protection: Protection::Plaintext,
                },
            )
            .await
            .unwrap();

        let services = &updated.document.service;
        assert_eq!(services.len(), 2);
        assert_eq!(services[0].id, format!("{did}#fhir"));
        assert_eq!(services[0].service_endpoint, updated.resource_uri.to_native());
        assert_ne!(updated.resource_uri, registered.resource_uri);
        assert_eq!(serde_json::to_string(&services[1]).unwrap(), untouched);

        let state = f.chain.lock().unwrap();
        assert_eq!(state.records["11155111:alice"].1, updated.document_uri.to_native());
        assert_eq!(state.sent.len(), 2);
    }

    #[tokio::test]
    async fn taken_name_fails_before_any_upload() {
        let f = fixture();
        f.chain.lock().unwrap().records.insert(
            "11155111:alice".to_string(),
            ("0x1111111111111111111111111111111111111111".to_string(), "ipfs://bafyx".to_string(), Vec::new()),
        );
        let adapter = fake_adapter(f.chain.clone(), WALLET);
        let (run, progress) = f.registrar.start();

        let e = run
            .register(
                &adapter,
                RegistrationRequest {
                    did: "did:health:11155111:alice".to_string(),
                    controller: WALLET.to_string(),
                    resource: patient("Smith"),
                    protection: Protection::Plaintext,
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(e, DidHealthError::DidAlreadyRegistered { .. }));
        assert_eq!(*progress.borrow(), RegistrationStep::Failed);
        assert_eq!(f.store.write_count(), 0);
        assert!(f.chain.lock().unwrap().sent.is_empty());
    }

    #[tokio::test]
    async fn rejected_transaction_fails_after_uploads() {
        let f = fixture();
        f.chain.lock().unwrap().fail_next = true;
        let adapter = fake_adapter(f.chain.clone(), WALLET);
        let (run, progress) = f.registrar.start();

        let e = run
            .register(
                &adapter,
                RegistrationRequest {
                    did: "did:health:11155111:alice".to_string(),
                    controller: WALLET.to_string(),
                    resource: organization(),
                    protection: Protection::Plaintext,
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(e, DidHealthError::TransactionFailed { .. }));
        assert_eq!(*progress.borrow(), RegistrationStep::Failed);
        assert_eq!(f.store.write_count(), 2);
    }

    #[tokio::test]
    async fn invalid_requests_are_rejected_while_validating() {
        let f = fixture();
        let adapter = fake_adapter(f.chain.clone(), WALLET);
        let request = |did: &str, resource: FhirResource| RegistrationRequest {
            did: did.to_string(),
            controller: WALLET.to_string(),
            resource,
            protection: Protection::Plaintext,
        };

        let other_chain = f
            .registrar
            .register(&adapter, request("did:health:84532:alice", organization()))
            .await
            .unwrap_err();
        assert!(matches!(other_chain, DidHealthError::NetworkNotSupported(_)));

        let observation = FhirResource::from_value(json!({ "resourceType": "Observation" })).unwrap();
        let unsupported = f
            .registrar
            .register(&adapter, request("did:health:11155111:alice", observation))
            .await
            .unwrap_err();
        assert!(matches!(unsupported, DidHealthError::InvalidResource(_)));
        assert_eq!(f.store.write_count(), 0);

        let no_access = Registrar::new(f.store.clone());
        let e = no_access
            .register(
                &adapter,
                RegistrationRequest {
                    did: "did:health:11155111:alice".to_string(),
                    controller: WALLET.to_string(),
                    resource: patient("Smith"),
                    protection: Protection::Encrypted {
                        conditions: AccessControlConditions::self_only("sepolia", WALLET),
                    },
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(e, DidHealthError::BadConfiguration(_)));
    }

    #[tokio::test]
    async fn alt_data_is_anchored_for_registered_dids() {
        let f = fixture();
        let adapter = fake_adapter(f.chain.clone(), WALLET);
        let did = "did:health:11155111:alice";
        let alt = |family: &str| AltDataRequest {
            did: did.to_string(),
            resources: vec![patient(family), organization()],
            protection: Protection::Plaintext,
        };

        let missing = f.registrar.add_alt_data(&adapter, alt("Smith")).await.unwrap_err();
        assert!(matches!(missing, DidHealthError::DidNotFound(_)));

        f.registrar
            .register(
                &adapter,
                RegistrationRequest {
                    did: did.to_string(),
                    controller: WALLET.to_string(),
                    resource: patient("Smith"),
                    protection: Protection::Plaintext,
                },
            )
            .await
            .unwrap();
        let receipt = f.registrar.add_alt_data(&adapter, alt("Jones")).await.unwrap();

        assert_eq!(receipt.uris.len(), 2);
        let anchored: Vec<String> = receipt.uris.iter().map(ContentUri::to_native).collect();
        assert_eq!(f.chain.lock().unwrap().records["11155111:alice"].2, anchored);
        assert_eq!(receipt.steps.last(), Some(&RegistrationStep::Done));
    }

    #[tokio::test]
    async fn concurrent_runs_report_on_their_own_channels() {
        let f = fixture();
        f.chain.lock().unwrap().records.insert(
            "11155111:taken".to_string(),
            ("0x1111111111111111111111111111111111111111".to_string(), "ipfs://bafyx".to_string(), Vec::new()),
        );
        let adapter = fake_adapter(f.chain.clone(), WALLET);
        let request = |did: &str| RegistrationRequest {
            did: did.to_string(),
            controller: WALLET.to_string(),
            resource: organization(),
            protection: Protection::Plaintext,
        };

        let (first, first_progress) = f.registrar.start();
        let (second, second_progress) = f.registrar.start();
        assert_eq!(*first_progress.borrow(), RegistrationStep::Idle);

        let (ok, failed) = tokio::join!(
            first.register(&adapter, request("did:health:11155111:fresh")),
            second.register(&adapter, request("did:health:11155111:taken")),
        );
        assert!(ok.is_ok());
        assert!(matches!(failed, Err(DidHealthError::DidAlreadyRegistered { .. })));
        assert_eq!(*first_progress.borrow(), RegistrationStep::Done);
        assert_eq!(*second_progress.borrow(), RegistrationStep::Failed);
    }
}
