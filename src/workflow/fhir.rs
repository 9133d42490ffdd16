//! Minimal FHIR resource handling: enough to type, identify and tag a resource
//! with its DID before upload.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::{DidHealthError, DidHealthResult};

/// identifier system under which a resource carries its DID
pub const DID_IDENTIFIER_SYSTEM: &str = "https://www.w3.org/ns/did";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Patient,
    Practitioner,
    Organization,
    Device,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Patient => "Patient",
            ResourceKind::Practitioner => "Practitioner",
            ResourceKind::Organization => "Organization",
            ResourceKind::Device => "Device",
        }
    }

    /// Directory entries for organizations and practitioners are public.
    pub fn is_plaintext_eligible(&self) -> bool {
        matches!(self, ResourceKind::Organization | ResourceKind::Practitioner)
    }
}

impl FromStr for ResourceKind {
    type Err = DidHealthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Patient" => Ok(ResourceKind::Patient),
            "Practitioner" => Ok(ResourceKind::Practitioner),
            "Organization" => Ok(ResourceKind::Organization),
            "Device" => Ok(ResourceKind::Device),
            other => Err(DidHealthError::InvalidResource(format!(
                "unsupported resourceType {other:?}"
            ))),
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A FHIR resource kept as a JSON object so unknown elements survive untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FhirResource(Map<String, Value>);

impl FhirResource {
    pub fn from_value(value: Value) -> DidHealthResult<Self> {
        match value {
            Value::Object(map) if map.get("resourceType").is_some_and(Value::is_string) => Ok(Self(map)),
            Value::Object(_) => Err(DidHealthError::InvalidResource(
                "resource has no resourceType".to_string(),
            )),
            _ => Err(DidHealthError::InvalidResource(
                "resource is not a JSON object".to_string(),
            )),
        }
    }

    pub fn from_slice(bytes: &[u8]) -> DidHealthResult<Self> {
        Self::from_value(serde_json::from_slice(bytes)?)
    }

    pub fn resource_type(&self) -> Option<&str> {
        self.0.get("resourceType").and_then(Value::as_str)
    }

    pub fn kind(&self) -> DidHealthResult<ResourceKind> {
        self.resource_type()
            .ok_or_else(|| DidHealthError::InvalidResource("resource has no resourceType".to_string()))?
            .parse()
    }

    pub fn id(&self) -> Option<&str> {
        self.0.get("id").and_then(Value::as_str).filter(|id| !id.is_empty())
    }

    /// The resource id, assigning a random one first when the resource has none.
    pub fn ensure_id(&mut self) -> String {
        if let Some(id) = self.id() {
            return id.to_string();
        }
        let id = uuid::Uuid::new_v4().to_string();
        self.0.insert("id".to_string(), Value::String(id.clone()));
        id
    }

    /// Put `did` first in `identifier[]`, dropping any DID identifier already present.
    pub fn with_did_identifier(&mut self, did: &str) {
        let entry = json!({ "system": DID_IDENTIFIER_SYSTEM, "value": did });
        let identifiers = self
            .0
            .entry("identifier")
            .or_insert_with(|| Value::Array(Vec::new()));
        match identifiers {
            Value::Array(list) => {
                list.retain(|i| i.get("system").and_then(Value::as_str) != Some(DID_IDENTIFIER_SYSTEM));
                list.insert(0, entry);
            }
            other => *other = Value::Array(vec![entry]),
        }
    }

    pub fn did_identifier(&self) -> Option<&str> {
        self.0
            .get("identifier")?
            .as_array()?
            .iter()
            .find(|i| i.get("system").and_then(Value::as_str) == Some(DID_IDENTIFIER_SYSTEM))?
            .get("value")?
            .as_str()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn to_vec(&self) -> DidHealthResult<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(&self.0)?)
    }
}
