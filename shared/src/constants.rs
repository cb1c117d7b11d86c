//! # Constants for the WACI Exchange Service
//!
//! This module contains all constants used throughout the system:
//! DIDComm message type URIs, WACI goal codes, storage file layout
//! and default endpoints.

// =============================================================================
// DIDCOMM MESSAGE TYPE URIS
// =============================================================================

/// Out-of-band invitation (entry point for both flows)
pub const MSG_TYPE_OOB_INVITATION: &str = "https://didcomm.org/out-of-band/2.0/invitation";

/// Credential proposal sent by the holder (Issue Credential 3.0)
pub const MSG_TYPE_PROPOSE_CREDENTIAL: &str =
    "https://didcomm.org/issue-credential/3.0/propose-credential";

/// Credential offer sent by the issuer
pub const MSG_TYPE_OFFER_CREDENTIAL: &str =
    "https://didcomm.org/issue-credential/3.0/offer-credential";

/// Credential request sent by the holder
pub const MSG_TYPE_REQUEST_CREDENTIAL: &str =
    "https://didcomm.org/issue-credential/3.0/request-credential";

/// Issued credential sent by the issuer
pub const MSG_TYPE_ISSUE_CREDENTIAL: &str =
    "https://didcomm.org/issue-credential/3.0/issue-credential";

/// Acknowledgement closing the issuance flow
pub const MSG_TYPE_ISSUANCE_ACK: &str = "https://didcomm.org/issue-credential/3.0/ack";

/// Presentation proposal sent by the holder (Present Proof 3.0)
pub const MSG_TYPE_PROPOSE_PRESENTATION: &str =
    "https://didcomm.org/present-proof/3.0/propose-presentation";

/// Presentation request sent by the verifier
pub const MSG_TYPE_REQUEST_PRESENTATION: &str =
    "https://didcomm.org/present-proof/3.0/request-presentation";

/// Presentation (the proof itself) sent by the holder
pub const MSG_TYPE_PRESENTATION: &str = "https://didcomm.org/present-proof/3.0/presentation";

/// Acknowledgement closing the presentation flow
pub const MSG_TYPE_PRESENTATION_ACK: &str = "https://didcomm.org/present-proof/3.0/ack";

/// Problem report (either flow, either party)
pub const MSG_TYPE_PROBLEM_REPORT: &str = "https://didcomm.org/report-problem/2.0/problem-report";

// =============================================================================
// WACI GOAL CODES
// =============================================================================

/// Goal code for the streamlined credential issuance flow
pub const GOAL_CODE_ISSUANCE: &str = "streamlined-vc";

/// Goal code for the streamlined credential presentation flow
pub const GOAL_CODE_PRESENTATION: &str = "streamlined-vp";

/// Media type accepted in invitation bodies
pub const ACCEPT_DIDCOMM_V2: &str = "didcomm/v2";

/// URL prefix carrying an encoded out-of-band invitation
pub const OOB_URL_PREFIX: &str = "didcomm://?_oob=";

// =============================================================================
// STORAGE FILE LAYOUT
// Each agent owns up to four files under the storage root, all named
// after the agent type.
// =============================================================================

/// Suffix of the identity state file (`issuer.json`)
pub const IDENTITY_STORE_SUFFIX: &str = ".json";

/// Suffix of the key material file (`issuer_secure.json`)
pub const SECURE_STORE_SUFFIX: &str = "_secure.json";

/// Suffix of the credential store file (`holder_vc.json`)
pub const VC_STORE_SUFFIX: &str = "_vc.json";

/// Suffix of the DIDComm message log (`issuer-waci-storage.json`)
pub const MESSAGE_LOG_SUFFIX: &str = "-waci-storage.json";

/// Default storage root directory
pub const DEFAULT_STORAGE_ROOT: &str = "./storage";

// =============================================================================
// DID REGISTRY AND DWN ENDPOINTS
// =============================================================================

/// Default Sidetree-style DID registry endpoint
pub const DEFAULT_REGISTRY_URL: &str = "https://cadena.extrimian.com/cadena-proxy/";

/// Default Decentralized Web Node endpoint advertised in created DIDs
pub const DEFAULT_DWN_URL: &str = "https://cadena.extrimian.com/dwn/";

/// Default DID method for created identifiers
pub const DEFAULT_DID_METHOD: &str = "did:quarkid:matic";

/// Service type under which the DWN endpoint is published in DID Documents
pub const DWN_SERVICE_TYPE: &str = "DecentralizedWebNode";

/// Key inside the DWN service endpoint object holding the node URLs
pub const DWN_ENDPOINT_NODES_KEY: &str = "nodes";

/// Verification method type used in DID Documents
pub const VERIFICATION_KEY_TYPE: &str = "Ed25519VerificationKey2020";

/// Credential context (W3C Verifiable Credentials)
pub const CREDENTIAL_CONTEXT_VC: &str = "https://www.w3.org/2018/credentials/v1";

// =============================================================================
// API CONFIGURATION
// =============================================================================

/// Default exchange service API port
pub const EXCHANGE_SERVICE_PORT: u16 = 3000;

/// Default host to bind the API to
pub const DEFAULT_API_HOST: &str = "0.0.0.0";

// =============================================================================
// ENVIRONMENT VARIABLE NAMES
// =============================================================================

/// Environment variable for the storage root directory
pub const ENV_STORAGE_ROOT: &str = "WACI_STORAGE_ROOT";

/// Environment variable for the DID registry endpoint
pub const ENV_REGISTRY_URL: &str = "WACI_REGISTRY_URL";

/// Environment variable for the DWN endpoint
pub const ENV_DWN_URL: &str = "WACI_DWN_URL";

/// Environment variable for the DID method
pub const ENV_DID_METHOD: &str = "WACI_DID_METHOD";

/// Environment variable for the API port
pub const ENV_API_PORT: &str = "WACI_API_PORT";

/// Environment variable for the API host
pub const ENV_API_HOST: &str = "WACI_API_HOST";

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Build the identity state file name for an agent type
pub fn identity_store_file(agent_type: &str) -> String {
    format!("{agent_type}{IDENTITY_STORE_SUFFIX}")
}

/// Build the key material file name for an agent type
pub fn secure_store_file(agent_type: &str) -> String {
    format!("{agent_type}{SECURE_STORE_SUFFIX}")
}

/// Build the credential store file name for an agent type
pub fn vc_store_file(agent_type: &str) -> String {
    format!("{agent_type}{VC_STORE_SUFFIX}")
}

/// Build the message log file name for an agent type
pub fn message_log_file(agent_type: &str) -> String {
    format!("{agent_type}{MESSAGE_LOG_SUFFIX}")
}
