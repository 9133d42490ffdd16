//! Onboarding state shared between a front end and the registrar.
//!
//! Fields change only through the named actions below, so every transition is
//! visible in one place and dependent choices are cleared together.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use crate::{
    access::AccessControlConditions,
    config::StorageConfiguration,
    error::{DidHealthError, DidHealthResult},
    resolution::parser::{ChainSegment, DidHealthParser},
    storage::ContentUri,
    workflow::{FhirResource, Protection, RegistrationRequest},
};

pub type SharedOnboardingState = Arc<RwLock<OnboardingState>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectedWallet {
    pub address: String,
    pub segment: ChainSegment,
}

#[derive(Debug, Clone, Default)]
pub struct OnboardingState {
    wallet: Option<ConnectedWallet>,
    storage: Option<StorageConfiguration>,
    resource: Option<FhirResource>,
    did: Option<String>,
    protection: Option<Protection>,
    document_uri: Option<ContentUri>,
}

impl OnboardingState {
    pub fn shared() -> SharedOnboardingState {
        Arc::new(RwLock::new(Self::default()))
    }

    pub fn wallet(&self) -> Option<&ConnectedWallet> {
        self.wallet.as_ref()
    }

    pub fn storage(&self) -> Option<&StorageConfiguration> {
        self.storage.as_ref()
    }

    pub fn resource(&self) -> Option<&FhirResource> {
        self.resource.as_ref()
    }

    pub fn did(&self) -> Option<&str> {
        self.did.as_deref()
    }

    pub fn protection(&self) -> Option<&Protection> {
        self.protection.as_ref()
    }

    pub fn document_uri(&self) -> Option<&ContentUri> {
        self.document_uri.as_ref()
    }

    /// Switching wallets or chains drops the DID and conditions chosen for the previous one.
    pub fn connect_wallet(&mut self, address: &str, segment: ChainSegment) {
        let wallet = ConnectedWallet {
            address: address.to_string(),
            segment,
        };
        if self.wallet.as_ref() != Some(&wallet) {
            self.clear_wallet_choices();
        }
        debug!(address, segment = %wallet.segment, "wallet connected");
        self.wallet = Some(wallet);
    }

    pub fn disconnect_wallet(&mut self) {
        self.wallet = None;
        self.clear_wallet_choices();
    }

    pub fn set_storage(&mut self, storage: StorageConfiguration) {
        self.storage = Some(storage);
    }

    pub fn set_resource(&mut self, resource: FhirResource) -> DidHealthResult<()> {
        resource.kind()?;
        self.resource = Some(resource);
        self.document_uri = None;
        Ok(())
    }

    /// Choose the DID name on the connected wallet's chain and return the full DID.
    pub fn choose_did(&mut self, name: &str) -> DidHealthResult<String> {
        let wallet = self
            .wallet
            .as_ref()
            .ok_or_else(|| DidHealthError::Incomplete("connect a wallet before choosing a DID".to_string()))?;
        let did = DidHealthParser::build(&wallet.segment, name)?;
        self.did = Some(did.clone());
        self.document_uri = None;
        Ok(did)
    }

    pub fn set_access_conditions(&mut self, conditions: AccessControlConditions) -> DidHealthResult<()> {
        conditions.validate()?;
        self.protection = Some(Protection::Encrypted { conditions });
        Ok(())
    }

    pub fn skip_encryption(&mut self) {
        self.protection = Some(Protection::Plaintext);
    }

    pub fn record_document_uri(&mut self, uri: ContentUri) {
        self.document_uri = Some(uri);
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// The request for the registrar, or the first missing piece.
    pub fn registration_request(&self) -> DidHealthResult<RegistrationRequest> {
        let wallet = self
            .wallet
            .as_ref()
            .ok_or_else(|| DidHealthError::Incomplete("no wallet connected".to_string()))?;
        if self.storage.is_none() {
            return Err(DidHealthError::Incomplete("no storage provider chosen".to_string()));
        }
        let resource = self
            .resource
            .clone()
            .ok_or_else(|| DidHealthError::Incomplete("no FHIR resource provided".to_string()))?;
        let did = self
            .did
            .clone()
            .ok_or_else(|| DidHealthError::Incomplete("no DID chosen".to_string()))?;
        let protection = match &self.protection {
            Some(protection) => protection.clone(),
            None if resource.kind()?.is_plaintext_eligible() => Protection::Plaintext,
            None => {
                return Err(DidHealthError::Incomplete(
                    "choose access conditions or skip encryption".to_string(),
                ));
            }
        };
        Ok(RegistrationRequest {
            did,
            controller: wallet.address.clone(),
            resource,
            protection,
        })
    }

    fn clear_wallet_choices(&mut self) {
        self.did = None;
        self.protection = None;
        self.document_uri = None;
    }
}
