//! # WACI Message Model
//!
//! This module defines the DIDComm message record stored in agent message
//! logs, the catalog of WACI message kinds with their thread-addressing
//! rules, and the out-of-band invitation URL encoding.
//!
//! ## Log ownership
//!
//! Each message kind is persisted in exactly one agent's log. The
//! [`LOG_OWNERS`] table is the single source of truth for which agent's
//! log is searched for a given kind; asking the wrong log yields absent,
//! never an error.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::*;
use crate::error::{ExchangeError, ExchangeResult};
use crate::types::AgentType;

// =============================================================================
// CREDENTIAL FLOW
// =============================================================================

/// The two WACI flows the service orchestrates
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CredentialFlow {
    /// Issue Credential 3.0 (invite, propose, offer, request, issue, ack)
    Issuance,
    /// Present Proof 3.0 (invite, propose, request, present, ack)
    Presentation,
}

impl CredentialFlow {
    /// WACI goal code announcing this flow in an invitation body
    pub fn goal_code(&self) -> &'static str {
        match self {
            CredentialFlow::Issuance => GOAL_CODE_ISSUANCE,
            CredentialFlow::Presentation => GOAL_CODE_PRESENTATION,
        }
    }

    /// Flow announced by a goal code, if it is one the service knows
    pub fn from_goal_code(goal_code: &str) -> Option<Self> {
        match goal_code {
            GOAL_CODE_ISSUANCE => Some(CredentialFlow::Issuance),
            GOAL_CODE_PRESENTATION => Some(CredentialFlow::Presentation),
            _ => None,
        }
    }
}

impl std::fmt::Display for CredentialFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CredentialFlow::Issuance => write!(f, "issuance"),
            CredentialFlow::Presentation => write!(f, "presentation"),
        }
    }
}

// =============================================================================
// MESSAGE KINDS
// =============================================================================

/// Every DIDComm message kind the service produces or searches for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    OobInvitation,
    ProposeCredential,
    OfferCredential,
    RequestCredential,
    IssueCredential,
    IssuanceAck,
    ProposePresentation,
    RequestPresentation,
    Presentation,
    PresentationAck,
    ProblemReport,
}

impl MessageKind {
    /// The DIDComm message type URI for this kind
    pub fn uri(&self) -> &'static str {
        match self {
            MessageKind::OobInvitation => MSG_TYPE_OOB_INVITATION,
            MessageKind::ProposeCredential => MSG_TYPE_PROPOSE_CREDENTIAL,
            MessageKind::OfferCredential => MSG_TYPE_OFFER_CREDENTIAL,
            MessageKind::RequestCredential => MSG_TYPE_REQUEST_CREDENTIAL,
            MessageKind::IssueCredential => MSG_TYPE_ISSUE_CREDENTIAL,
            MessageKind::IssuanceAck => MSG_TYPE_ISSUANCE_ACK,
            MessageKind::ProposePresentation => MSG_TYPE_PROPOSE_PRESENTATION,
            MessageKind::RequestPresentation => MSG_TYPE_REQUEST_PRESENTATION,
            MessageKind::Presentation => MSG_TYPE_PRESENTATION,
            MessageKind::PresentationAck => MSG_TYPE_PRESENTATION_ACK,
            MessageKind::ProblemReport => MSG_TYPE_PROBLEM_REPORT,
        }
    }

    /// Parse a message type URI into a kind
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            MSG_TYPE_OOB_INVITATION => Some(MessageKind::OobInvitation),
            MSG_TYPE_PROPOSE_CREDENTIAL => Some(MessageKind::ProposeCredential),
            MSG_TYPE_OFFER_CREDENTIAL => Some(MessageKind::OfferCredential),
            MSG_TYPE_REQUEST_CREDENTIAL => Some(MessageKind::RequestCredential),
            MSG_TYPE_ISSUE_CREDENTIAL => Some(MessageKind::IssueCredential),
            MSG_TYPE_ISSUANCE_ACK => Some(MessageKind::IssuanceAck),
            MSG_TYPE_PROPOSE_PRESENTATION => Some(MessageKind::ProposePresentation),
            MSG_TYPE_REQUEST_PRESENTATION => Some(MessageKind::RequestPresentation),
            MSG_TYPE_PRESENTATION => Some(MessageKind::Presentation),
            MSG_TYPE_PRESENTATION_ACK => Some(MessageKind::PresentationAck),
            MSG_TYPE_PROBLEM_REPORT => Some(MessageKind::ProblemReport),
            _ => None,
        }
    }

    /// Proposals open a thread and are addressed by the parent-thread id
    /// (the invitation id) instead of a thread id
    pub fn is_proposal(&self) -> bool {
        matches!(
            self,
            MessageKind::ProposeCredential | MessageKind::ProposePresentation
        )
    }

    /// The agent whose message log holds this kind, per [`LOG_OWNERS`]
    ///
    /// Returns `None` for kinds that are never searched in a log
    /// (invitations travel out of band, problem reports are terminal).
    pub fn log_owner(&self) -> Option<AgentType> {
        LOG_OWNERS
            .iter()
            .find(|(_, kind, _)| kind == self)
            .map(|(_, _, owner)| *owner)
    }

    /// The flow this kind belongs to, if it is specific to one
    pub fn flow(&self) -> Option<CredentialFlow> {
        LOG_OWNERS
            .iter()
            .find(|(_, kind, _)| kind == self)
            .map(|(flow, _, _)| *flow)
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.uri())
    }
}

/// Which agent's message log each thread-searchable kind lives in.
///
/// Counterparty messages only appear in the log of the agent that ran the
/// exchange leg, so a proposal exists solely in the inviter's log and an
/// issuance ack solely in the holder's.
pub const LOG_OWNERS: &[(CredentialFlow, MessageKind, AgentType)] = &[
    (CredentialFlow::Issuance, MessageKind::ProposeCredential, AgentType::Issuer),
    (CredentialFlow::Issuance, MessageKind::OfferCredential, AgentType::Issuer),
    (CredentialFlow::Issuance, MessageKind::RequestCredential, AgentType::Issuer),
    (CredentialFlow::Issuance, MessageKind::IssueCredential, AgentType::Issuer),
    (CredentialFlow::Issuance, MessageKind::IssuanceAck, AgentType::Holder),
    (CredentialFlow::Presentation, MessageKind::ProposePresentation, AgentType::Verifier),
    (CredentialFlow::Presentation, MessageKind::RequestPresentation, AgentType::Verifier),
    (CredentialFlow::Presentation, MessageKind::Presentation, AgentType::Holder),
    (CredentialFlow::Presentation, MessageKind::PresentationAck, AgentType::Verifier),
];

// =============================================================================
// MESSAGE RECORD
// =============================================================================

/// A DIDComm message as persisted in an agent's message log.
///
/// The type is kept as a plain string so logs containing kinds this
/// service does not know about still parse; [`MessageKind`] is used for
/// comparisons.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WaciMessage {
    /// Message type URI
    #[serde(rename = "type")]
    pub message_type: String,

    /// Unique message id
    pub id: String,

    /// Thread id linking a reply to the message that opened the thread
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thid: Option<String>,

    /// Parent thread id; on proposals this is the invitation id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pthid: Option<String>,

    /// Sender DID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,

    /// Recipient DIDs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub to: Vec<String>,

    /// Message body (shape depends on the kind)
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub body: Value,

    /// Attachments (credentials and proofs travel here)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<Attachment>>,
}

/// A DIDComm attachment
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Attachment {
    /// Attachment id
    pub id: String,

    /// Media type of the attached data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,

    /// Attached data (`{"json": ...}` for inline JSON)
    pub data: Value,
}

impl WaciMessage {
    /// The parsed kind, if the type URI is one this service knows
    pub fn kind(&self) -> Option<MessageKind> {
        MessageKind::from_uri(&self.message_type)
    }

    /// Check the message type against an expected kind
    pub fn is_kind(&self, kind: MessageKind) -> bool {
        self.message_type == kind.uri()
    }

    /// First recipient DID, if any
    pub fn recipient(&self) -> Option<&str> {
        self.to.first().map(String::as_str)
    }

    /// Goal code from the body, if present
    pub fn goal_code(&self) -> Option<&str> {
        self.body.get("goal_code").and_then(Value::as_str)
    }
}

/// An agent's message log: thread key to ordered messages.
///
/// Thread keys keep the insertion order of the underlying JSON object,
/// which the proposal lookup relies on to find the newest thread.
pub type MessageLog = IndexMap<String, Vec<WaciMessage>>;

// =============================================================================
// OUT-OF-BAND INVITATION ENCODING
// =============================================================================

/// Encode an invitation message into its `didcomm://?_oob=` URL form
pub fn encode_invitation(invitation: &WaciMessage) -> ExchangeResult<String> {
    let json = serde_json::to_vec(invitation)?;
    Ok(format!("{OOB_URL_PREFIX}{}", URL_SAFE_NO_PAD.encode(json)))
}

/// Decode an invitation from its URL form.
///
/// Accepts either the full `didcomm://?_oob=...` URL or the bare
/// base64url payload.
pub fn decode_invitation(encoded: &str) -> ExchangeResult<WaciMessage> {
    let payload = match encoded.split_once("_oob=") {
        Some((_, payload)) => payload,
        None => encoded,
    };

    let json = URL_SAFE_NO_PAD
        .decode(payload.trim())
        .map_err(|_| ExchangeError::InvalidRequest("invitation is not valid base64url".into()))?;

    serde_json::from_slice(&json)
        .map_err(|_| ExchangeError::InvalidRequest("invitation payload is not a DIDComm message".into()))
}
