//! # Shared Data Types for the WACI Exchange Service
//!
//! This module defines the data structures used across the agent pool,
//! the correlation engine and the REST API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::{DWN_ENDPOINT_NODES_KEY, DWN_SERVICE_TYPE};
use crate::error::ExchangeError;

// =============================================================================
// AGENT TYPE
// =============================================================================

/// Role an agent plays in a credential exchange
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AgentType {
    /// Issues verifiable credentials
    Issuer,
    /// Holds credentials and presents them on request
    Holder,
    /// Requests and verifies presentations
    Verifier,
}

impl AgentType {
    /// All agent types the service can manage
    pub const ALL: [AgentType; 3] = [AgentType::Issuer, AgentType::Holder, AgentType::Verifier];

    /// Lowercase name used as storage file prefix
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::Issuer => "issuer",
            AgentType::Holder => "holder",
            AgentType::Verifier => "verifier",
        }
    }
}

impl std::fmt::Display for AgentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AgentType {
    type Err = ExchangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "issuer" => Ok(AgentType::Issuer),
            "holder" => Ok(AgentType::Holder),
            "verifier" => Ok(AgentType::Verifier),
            other => Err(ExchangeError::InvalidRequest(format!(
                "unknown agent type: {other}"
            ))),
        }
    }
}

// =============================================================================
// AGENT IDENTITY STATE
// Persisted as `{agent_type}.json` under the storage root. The presence
// of an operational DID here is what makes provisioning idempotent.
// =============================================================================

/// Durable identity state of one agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentIdentity {
    /// The agent's operational DID, set once creation has been anchored
    #[serde(rename = "operationalDid")]
    pub operational_did: Option<String>,

    /// DID method the identifier was (or will be) created under
    #[serde(rename = "didMethod")]
    pub did_method: String,

    /// DWN endpoint registered in the DID Document
    #[serde(rename = "dwnUrl", skip_serializing_if = "Option::is_none")]
    pub dwn_url: Option<String>,

    /// Timestamp when the state was first written
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,

    /// Timestamp of last update
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl AgentIdentity {
    /// Create a fresh identity state with no operational DID yet
    pub fn new(did_method: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            operational_did: None,
            did_method: did_method.into(),
            dwn_url: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Record the anchored DID and the DWN endpoint it advertises
    pub fn with_did(mut self, did: impl Into<String>, dwn_url: impl Into<String>) -> Self {
        self.operational_did = Some(did.into());
        self.dwn_url = Some(dwn_url.into());
        self.updated_at = Utc::now();
        self
    }
}

// =============================================================================
// DID DOCUMENT (simplified representation)
// =============================================================================

/// Simplified DID Document representation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DidDocument {
    /// The DID
    pub id: String,

    /// Verification methods (public keys)
    #[serde(rename = "verificationMethod", default)]
    pub verification_method: Vec<VerificationMethod>,

    /// Authentication method references
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authentication: Option<Vec<String>>,

    /// Services (endpoints)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<Vec<ServiceEntry>>,
}

/// Verification method in a DID Document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationMethod {
    /// Method ID (e.g., "did:quarkid:matic:Ei...#key-1")
    pub id: String,

    /// Controller DID
    pub controller: String,

    /// Key type (e.g., "Ed25519VerificationKey2020")
    #[serde(rename = "type")]
    pub method_type: String,

    /// Public key in multibase format
    #[serde(rename = "publicKeyMultibase")]
    pub public_key_multibase: String,
}

/// Service endpoint in a DID Document
///
/// The endpoint is kept as a raw JSON value: DWN services publish an
/// object (`{"nodes": [...]}`), other services a plain URL string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceEntry {
    /// Service ID
    pub id: String,

    /// Service type
    #[serde(rename = "type")]
    pub service_type: String,

    /// Service endpoint (string or object)
    #[serde(rename = "serviceEndpoint")]
    pub service_endpoint: Value,
}

impl DidDocument {
    /// Extract the endpoint URLs of a service by type and endpoint-object key
    pub fn service_endpoints(&self, service_type: &str, key: &str) -> Vec<String> {
        let Some(services) = &self.service else {
            return Vec::new();
        };

        services
            .iter()
            .filter(|s| s.service_type == service_type)
            .flat_map(|s| match &s.service_endpoint {
                Value::String(url) => vec![url.clone()],
                Value::Object(map) => map
                    .get(key)
                    .and_then(Value::as_array)
                    .map(|nodes| {
                        nodes
                            .iter()
                            .filter_map(Value::as_str)
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default(),
                _ => Vec::new(),
            })
            .collect()
    }

    /// Get the first Decentralized Web Node endpoint, if the document has one
    pub fn dwn_endpoint(&self) -> Option<String> {
        self.service_endpoints(DWN_SERVICE_TYPE, DWN_ENDPOINT_NODES_KEY)
            .into_iter()
            .next()
    }
}

// =============================================================================
// API REQUEST/RESPONSE TYPES
// =============================================================================

/// An agent's resolved DID Document, tagged with its role
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDocument {
    /// Role of the agent
    #[serde(rename = "agentType")]
    pub agent_type: AgentType,

    /// The resolved DID Document
    #[serde(rename = "didDocument")]
    pub did_document: DidDocument,
}

/// Request to provision one or more agents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAgentsRequest {
    /// Agent roles to provision
    pub types: Vec<AgentType>,
}

/// Request to create an out-of-band invitation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateInvitationRequest {
    /// WACI goal code naming the flow ("streamlined-vc" or "streamlined-vp")
    #[serde(rename = "goalCode")]
    pub goal_code: String,

    /// DID the inviting agent is expected to operate under
    #[serde(rename = "senderDid")]
    pub sender_did: String,
}
