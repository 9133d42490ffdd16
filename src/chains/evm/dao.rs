//! `DidHealthDAO` membership: contract interface, profiles, and the subgraph
//! search over approved applications.

use std::time::Duration;

use async_trait::async_trait;
use ethers::abi::{Abi, parse_abi};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::EvmAdapter;
use crate::{
    access::ContractReader,
    catalog::ChainCatalog,
    chains::RegistryAdapter,
    error::{AccessControlError, DidHealthError, DidHealthResult},
    storage::ipfs::USER_AGENT,
};

pub const APPLY_FOR_MEMBERSHIP: &str = "applyForMembership";
pub const GET_PROFILE: &str = "getProfile";
pub const IS_MEMBER: &str = "isMember";
pub const REGISTRATION_FEE: &str = "registrationFee";

/// human-readable interface of the deployed membership contract
const DAO_ABI: &[&str] = &[
    "function applyForMembership(string did, string role, string orgName, string ipfsUri) payable",
    "function approveMembership(address applicant, string role, string orgName)",
    "function getProfile(address member) view returns (string did, string role, string orgName)",
    "function isMember(address member) view returns (bool)",
    "function members(address member) view returns (string did, string role, string orgName, bool approved)",
    "function owner() view returns (address)",
    "function registrationFee() view returns (uint256)",
    "function removeMember(address member)",
    "function setRegistrationFee(uint256 fee)",
    "function withdraw()",
    "event DaoRegistered(address indexed owner, string did, string ipfsUri)",
];

pub fn dao_abi() -> DidHealthResult<Abi> {
    parse_abi(DAO_ABI).map_err(|e| DidHealthError::BadConfiguration(format!("DAO ABI: {e}")))
}

/// What a member registered about themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DaoProfile {
    pub did: String,
    pub role: String,
    pub org_name: String,
}

/// A request to join the DAO, paid with the contract's registration fee.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipApplication {
    pub did: String,
    pub role: String,
    pub org_name: String,
    /// pointer to the applicant's FHIR resource
    pub ipfs_uri: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MemberResourceType {
    Organization,
    Practitioner,
}

impl MemberResourceType {
    fn from_role(role: &str) -> Self {
        if role.contains("Organization") {
            MemberResourceType::Organization
        } else {
            MemberResourceType::Practitioner
        }
    }
}

/// An approved application as indexed by a chain's subgraph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovedMember {
    pub network: String,
    pub id: String,
    pub did: String,
    pub org_name: String,
    pub role: String,
    pub resource_type: MemberResourceType,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApprovedEvent {
    id: String,
    did: String,
    org_name: String,
    role: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApprovedPage {
    dao_application_approveds: Vec<ApprovedEvent>,
}

const APPROVED_QUERY: &str = "query ApprovedMembers($search: String!) {
  daoApplicationApproveds(where: { orgName_contains_nocase: $search }) {
    id
    did
    orgName
    role
  }
}";

/// Membership conditions: `isMember(:userAddress)` on this chain's DAO.
#[async_trait]
impl ContractReader for EvmAdapter {
    async fn read(&self, contract: &str, method: &str, parameters: &[String]) -> DidHealthResult<String> {
        let network = &self.entry().network;
        match self.dao_address() {
            Some(dao) if dao.eq_ignore_ascii_case(contract) => {}
            _ => {
                return Err(AccessControlError::UnsupportedCondition(format!(
                    "{contract} is not the DAO contract on {network}"
                ))
                .into());
            }
        }
        match (method, parameters) {
            (IS_MEMBER, [member]) => Ok(self.is_member(member).await?.to_string()),
            _ => Err(AccessControlError::UnsupportedCondition(format!(
                "{method} with {} parameters is not a membership read",
                parameters.len()
            ))
            .into()),
        }
    }
}

/// Searches approved members across every chain that has a DAO subgraph.
#[derive(Clone)]
pub struct MemberDirectory {
    /// (network, GraphQL url)
    sources: Vec<(String, String)>,
    http_client: reqwest::Client,
}

impl MemberDirectory {
    pub fn new(catalog: &ChainCatalog, timeout: Duration) -> DidHealthResult<Self> {
        let sources = catalog
            .iter()
            .filter_map(|e| e.dao.as_ref().map(|dao| (e.network.clone(), dao.graph_url.clone())))
            .collect();
        Self::with_sources(sources, timeout)
    }

    pub fn with_sources(sources: Vec<(String, String)>, timeout: Duration) -> DidHealthResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| {
                DidHealthError::BadConfiguration(format!("Failed to create HTTP client: {e}"))
            })?;
        Ok(Self {
            sources,
            http_client,
        })
    }

    pub fn networks(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().map(|(network, _)| network.as_str())
    }

    /// Approved members whose organization name contains `search`, case-insensitively.
    /// A chain whose subgraph fails is skipped with a warning.
    pub async fn search_approved(&self, search: &str) -> Vec<ApprovedMember> {
        let mut found = Vec::new();
        for (network, url) in &self.sources {
            match self.query(network, url, search).await {
                Ok(members) => {
                    debug!(%network, count = members.len(), "approved members");
                    found.extend(members);
                }
                Err(e) => warn!(%network, error = %e, "member search failed"),
            }
        }
        found
    }

    async fn query(&self, network: &str, url: &str, search: &str) -> DidHealthResult<Vec<ApprovedMember>> {
        let response = self
            .http_client
            .post(url)
            .json(&search_request(search))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(DidHealthError::TransportError(
                format!("{url} returned HTTP {}", response.status()).into(),
            ));
        }
        parse_approved(network, response.json().await?)
    }
}

fn search_request(search: &str) -> Value {
    json!({
        "query": APPROVED_QUERY,
        "variables": { "search": search },
    })
}

/// Read a GraphQL response body into members of `network`.
fn parse_approved(network: &str, mut body: Value) -> DidHealthResult<Vec<ApprovedMember>> {
    if let Some(errors) = body.get("errors").filter(|e| !e.is_null()) {
        return Err(DidHealthError::InvalidResponse(format!("subgraph errors: {errors}")));
    }
    let data = body
        .get_mut("data")
        .map(Value::take)
        .ok_or_else(|| DidHealthError::InvalidResponse("GraphQL response without data".to_string()))?;
    let page: ApprovedPage = serde_json::from_value(data)?;
    Ok(page
        .dao_application_approveds
        .into_iter()
        .map(|event| ApprovedMember {
            network: network.to_string(),
            resource_type: MemberResourceType::from_role(&event.role),
            id: event.id,
            did: event.did,
            org_name: event.org_name,
            role: event.role,
        })
        .collect())
}
