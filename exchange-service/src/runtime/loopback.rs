//! # Loopback Agent Runtime
//!
//! In-process [`AgentRuntime`] that plays both legs of each WACI exchange
//! against the shared storage directory, standing in for networked
//! DIDComm transport. A full flow completes as a side effect of the
//! holder processing an invitation: the runtime writes each party's
//! messages into that party's own log and fires the completion events a
//! remote agent would deliver.
//!
//! Every handle built by one runtime shares an event hub keyed by agent
//! type, so the leg that finishes an exchange can notify the counterparty
//! handle the caller subscribed on.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tokio::sync::oneshot;
use tracing::{debug, error, info};
use uuid::Uuid;

use shared::config::{ExchangeConfig, StorageConfig};
use shared::constants::*;
use shared::error::{ExchangeError, ExchangeResult};
use shared::types::{AgentIdentity, AgentType, DidDocument, ServiceEntry, VerificationMethod};
use shared::waci::{
    decode_invitation, encode_invitation, Attachment, CredentialFlow, MessageKind, MessageLog,
    WaciMessage,
};

use super::{
    AgentRuntime, CredentialArrivedEvent, DidCreatedEvent, IdentityAgent,
    PresentationVerifiedEvent, Signal,
};

// =============================================================================
// EVENT HUB
// =============================================================================

struct PerAgent<T> {
    issuer: T,
    holder: T,
    verifier: T,
}

impl<T> PerAgent<T> {
    fn get(&self, agent_type: AgentType) -> &T {
        match agent_type {
            AgentType::Issuer => &self.issuer,
            AgentType::Holder => &self.holder,
            AgentType::Verifier => &self.verifier,
        }
    }
}

impl<T: Default> Default for PerAgent<T> {
    fn default() -> Self {
        Self {
            issuer: T::default(),
            holder: T::default(),
            verifier: T::default(),
        }
    }
}

/// Completion events shared by all handles of one runtime, keyed by role
#[derive(Default)]
struct EventHub {
    did_created: PerAgent<Signal<DidCreatedEvent>>,
    credential_arrived: PerAgent<Signal<CredentialArrivedEvent>>,
    presentation_verified: PerAgent<Signal<PresentationVerifiedEvent>>,
}

// =============================================================================
// FLOW PROFILES
// =============================================================================

/// What the issuer leg puts into credentials
#[derive(Debug, Clone)]
pub struct CredentialProfile {
    /// W3C credential contexts
    pub context: Vec<String>,
    /// Credential type list
    pub credential_type: Vec<String>,
    /// Claims merged into the credential subject (JSON object)
    pub claims: Value,
    /// Validity period in days
    pub validity_days: i64,
}

/// What the verifier leg asks for in a presentation request
#[derive(Debug, Clone)]
pub struct PresentationProfile {
    /// Input descriptor id
    pub id: String,
    /// Human-readable name of the check
    pub name: String,
    /// Constraint field paths into the credential
    pub constraint_fields: Vec<String>,
}

/// Issuer and verifier behavior for the scripted exchanges
#[derive(Debug, Clone)]
pub struct FlowProfiles {
    pub credential: CredentialProfile,
    pub presentation: PresentationProfile,
}

impl Default for FlowProfiles {
    fn default() -> Self {
        Self {
            credential: CredentialProfile {
                context: vec![CREDENTIAL_CONTEXT_VC.into()],
                credential_type: vec!["VerifiableCredential".into(), "MembershipCredential".into()],
                claims: json!({ "memberName": "Alex Doe", "membershipLevel": "standard" }),
                validity_days: 365,
            },
            presentation: PresentationProfile {
                id: "membership-check".into(),
                name: "Membership credential check".into(),
                constraint_fields: vec!["$.credentialSubject.memberName".into()],
            },
        }
    }
}

// =============================================================================
// RUNTIME
// =============================================================================

/// Builds [`LoopbackAgent`] handles over one storage directory
pub struct LoopbackRuntime {
    storage: StorageConfig,
    did_method: String,
    profiles: Arc<FlowProfiles>,
    hub: Arc<EventHub>,
}

impl LoopbackRuntime {
    pub fn new(config: &ExchangeConfig) -> Self {
        Self::with_profiles(config, FlowProfiles::default())
    }

    pub fn with_profiles(config: &ExchangeConfig, profiles: FlowProfiles) -> Self {
        Self {
            storage: config.storage.clone(),
            did_method: config.registry.did_method.clone(),
            profiles: Arc::new(profiles),
            hub: Arc::new(EventHub::default()),
        }
    }
}

#[async_trait]
impl AgentRuntime for LoopbackRuntime {
    async fn build_agent(&self, agent_type: AgentType) -> ExchangeResult<Arc<dyn IdentityAgent>> {
        Ok(Arc::new(LoopbackAgent {
            agent_type,
            storage: self.storage.clone(),
            did_method: self.did_method.clone(),
            profiles: Arc::clone(&self.profiles),
            hub: Arc::clone(&self.hub),
            initialized: AtomicBool::new(false),
            identity: Arc::new(RwLock::new(None)),
        }))
    }
}

// =============================================================================
// AGENT
// =============================================================================

/// One agent role bound to the shared storage directory
pub struct LoopbackAgent {
    agent_type: AgentType,
    storage: StorageConfig,
    did_method: String,
    profiles: Arc<FlowProfiles>,
    hub: Arc<EventHub>,
    initialized: AtomicBool,
    identity: Arc<RwLock<Option<AgentIdentity>>>,
}

impl LoopbackAgent {
    fn require_did(&self) -> ExchangeResult<String> {
        self.operational_did().ok_or_else(|| {
            ExchangeError::Internal(format!(
                "{} agent has no operational identifier",
                self.agent_type
            ))
        })
    }

    /// Find which agent of this storage set an anchored DID belongs to
    async fn find_identity_by_did(
        &self,
        did: &str,
    ) -> ExchangeResult<Option<(AgentType, AgentIdentity)>> {
        for agent_type in AgentType::ALL {
            let path = self.storage.identity_store_path(agent_type);
            if let Some(identity) = read_json::<AgentIdentity>(&path).await? {
                if identity.operational_did.as_deref() == Some(did) {
                    return Ok(Some((agent_type, identity)));
                }
            }
        }
        Ok(None)
    }

    async fn append_to_log(
        &self,
        owner: AgentType,
        thread_id: &str,
        batch: Vec<WaciMessage>,
    ) -> ExchangeResult<()> {
        let path = self.storage.message_log_path(owner);
        let mut log: MessageLog = read_json(&path).await?.unwrap_or_default();
        log.entry(thread_id.to_string()).or_default().extend(batch);
        write_json(&path, &log).await
    }

    async fn stored_credentials(&self) -> ExchangeResult<Vec<Value>> {
        let path = self.storage.vc_store_path(self.agent_type);
        let store: Option<IndexMap<String, Value>> = read_json(&path).await?;
        Ok(store.map(|s| s.into_values().collect()).unwrap_or_default())
    }

    fn build_credential(&self, issuer_did: &str, subject_did: &str) -> Value {
        let profile = &self.profiles.credential;
        let now = Utc::now();

        let mut subject = serde_json::Map::new();
        subject.insert("id".into(), json!(subject_did));
        if let Value::Object(claims) = &profile.claims {
            for (claim, value) in claims {
                subject.insert(claim.clone(), value.clone());
            }
        }

        json!({
            "@context": profile.context,
            "id": format!("urn:uuid:{}", Uuid::new_v4()),
            "type": profile.credential_type,
            "issuer": issuer_did,
            "issuanceDate": now.to_rfc3339(),
            "expirationDate": (now + chrono::Duration::days(profile.validity_days)).to_rfc3339(),
            "credentialSubject": subject,
        })
    }

    /// Both legs of the issuance exchange, played out locally.
    ///
    /// The issuer's log receives the proposal and every message on its
    /// thread; the holder's log receives the replies plus the closing
    /// ack. The proposal never lands in the holder's log since each
    /// agent records only its own exchange leg.
    async fn run_issuance_exchange(&self, invitation: &WaciMessage) -> ExchangeResult<()> {
        let holder_did = self.require_did()?;
        let issuer_did = invitation
            .from
            .clone()
            .ok_or_else(|| ExchangeError::InvalidRequest("invitation has no sender".into()))?;
        let (issuer_type, _) = self
            .find_identity_by_did(&issuer_did)
            .await?
            .ok_or_else(|| ExchangeError::DidResolutionFailed {
                did: issuer_did.clone(),
                reason: "inviter is not an agent of this storage".into(),
            })?;

        let proposal = WaciMessage {
            message_type: MessageKind::ProposeCredential.uri().into(),
            id: Uuid::new_v4().to_string(),
            thid: None,
            pthid: Some(invitation.id.clone()),
            from: Some(holder_did.clone()),
            to: vec![issuer_did.clone()],
            body: Value::Null,
            attachments: None,
        };
        let thread_id = proposal.id.clone();

        let offer = WaciMessage {
            message_type: MessageKind::OfferCredential.uri().into(),
            id: Uuid::new_v4().to_string(),
            thid: Some(thread_id.clone()),
            pthid: None,
            from: Some(issuer_did.clone()),
            to: vec![holder_did.clone()],
            body: json!({ "credential_preview": self.profiles.credential.claims }),
            attachments: None,
        };

        let request = WaciMessage {
            message_type: MessageKind::RequestCredential.uri().into(),
            id: Uuid::new_v4().to_string(),
            thid: Some(thread_id.clone()),
            pthid: None,
            from: Some(holder_did.clone()),
            to: vec![issuer_did.clone()],
            body: Value::Null,
            attachments: None,
        };

        let credential = self.build_credential(&issuer_did, &holder_did);
        let issue = WaciMessage {
            message_type: MessageKind::IssueCredential.uri().into(),
            id: Uuid::new_v4().to_string(),
            thid: Some(thread_id.clone()),
            pthid: None,
            from: Some(issuer_did.clone()),
            to: vec![holder_did.clone()],
            body: Value::Null,
            attachments: Some(vec![Attachment {
                id: Uuid::new_v4().to_string(),
                media_type: Some("application/json".into()),
                data: json!({ "json": credential.clone() }),
            }]),
        };

        let ack = WaciMessage {
            message_type: MessageKind::IssuanceAck.uri().into(),
            id: Uuid::new_v4().to_string(),
            thid: Some(thread_id.clone()),
            pthid: None,
            from: Some(holder_did.clone()),
            to: vec![issuer_did.clone()],
            body: json!({ "status": "OK" }),
            attachments: None,
        };

        self.append_to_log(
            issuer_type,
            &thread_id,
            vec![proposal, offer.clone(), request.clone(), issue.clone()],
        )
        .await?;
        self.append_to_log(self.agent_type, &thread_id, vec![offer, request, issue, ack])
            .await?;

        info!(
            thread = %thread_id,
            issuer = %issuer_did,
            holder = %holder_did,
            "Issuance exchange completed"
        );

        self.hub
            .credential_arrived
            .get(self.agent_type)
            .fire(CredentialArrivedEvent {
                credential: Some(credential),
            });

        Ok(())
    }

    /// Both legs of the presentation exchange.
    ///
    /// The holder discloses every stored credential. The verifier's log
    /// receives the proposal, the request and the closing ack; the
    /// presentation itself stays in the holder's log.
    async fn run_presentation_exchange(&self, invitation: &WaciMessage) -> ExchangeResult<()> {
        let holder_did = self.require_did()?;
        let verifier_did = invitation
            .from
            .clone()
            .ok_or_else(|| ExchangeError::InvalidRequest("invitation has no sender".into()))?;
        let (verifier_type, _) = self
            .find_identity_by_did(&verifier_did)
            .await?
            .ok_or_else(|| ExchangeError::DidResolutionFailed {
                did: verifier_did.clone(),
                reason: "inviter is not an agent of this storage".into(),
            })?;

        let credentials = self.stored_credentials().await?;
        let verified = !credentials.is_empty();

        let proposal = WaciMessage {
            message_type: MessageKind::ProposePresentation.uri().into(),
            id: Uuid::new_v4().to_string(),
            thid: None,
            pthid: Some(invitation.id.clone()),
            from: Some(holder_did.clone()),
            to: vec![verifier_did.clone()],
            body: Value::Null,
            attachments: None,
        };
        let thread_id = proposal.id.clone();

        let profile = &self.profiles.presentation;
        let request = WaciMessage {
            message_type: MessageKind::RequestPresentation.uri().into(),
            id: Uuid::new_v4().to_string(),
            thid: Some(thread_id.clone()),
            pthid: None,
            from: Some(verifier_did.clone()),
            to: vec![holder_did.clone()],
            body: json!({
                "presentation_definition": {
                    "id": profile.id,
                    "name": profile.name,
                    "constraints": { "fields": profile.constraint_fields },
                }
            }),
            attachments: None,
        };

        let presentation = WaciMessage {
            message_type: MessageKind::Presentation.uri().into(),
            id: Uuid::new_v4().to_string(),
            thid: Some(thread_id.clone()),
            pthid: None,
            from: Some(holder_did.clone()),
            to: vec![verifier_did.clone()],
            body: Value::Null,
            attachments: Some(vec![Attachment {
                id: Uuid::new_v4().to_string(),
                media_type: Some("application/json".into()),
                data: json!({ "json": { "verifiableCredential": credentials } }),
            }]),
        };

        let ack = WaciMessage {
            message_type: MessageKind::PresentationAck.uri().into(),
            id: Uuid::new_v4().to_string(),
            thid: Some(thread_id.clone()),
            pthid: None,
            from: Some(verifier_did.clone()),
            to: vec![holder_did.clone()],
            body: json!({ "status": "OK" }),
            attachments: None,
        };

        self.append_to_log(
            verifier_type,
            &thread_id,
            vec![proposal, request.clone(), ack],
        )
        .await?;
        self.append_to_log(self.agent_type, &thread_id, vec![request, presentation])
            .await?;

        info!(
            thread = %thread_id,
            verifier = %verifier_did,
            holder = %holder_did,
            verified,
            "Presentation exchange completed"
        );

        self.hub
            .presentation_verified
            .get(verifier_type)
            .fire(PresentationVerifiedEvent {
                vc_verified: verified,
                presentation_verified: verified,
            });

        Ok(())
    }
}

#[async_trait]
impl IdentityAgent for LoopbackAgent {
    fn agent_type(&self) -> AgentType {
        self.agent_type
    }

    async fn initialize(&self) -> ExchangeResult<()> {
        tokio::fs::create_dir_all(&self.storage.root).await?;

        let path = self.storage.identity_store_path(self.agent_type);
        let identity = match read_json::<AgentIdentity>(&path).await? {
            Some(identity) => identity,
            None => {
                let identity = AgentIdentity::new(&self.did_method);
                write_json(&path, &identity).await?;
                identity
            }
        };

        let secure_path = self.storage.secure_store_path(self.agent_type);
        if !secure_path.exists() {
            let key_material = json!({
                "kid": format!("key-{}", Uuid::new_v4().simple()),
                "seed": URL_SAFE_NO_PAD.encode(Sha256::digest(Uuid::new_v4().as_bytes())),
            });
            write_json(&secure_path, &key_material).await?;
        }

        *self.identity.write() = Some(identity);
        self.initialized.store(true, Ordering::SeqCst);

        debug!(agent_type = %self.agent_type, "Agent state loaded");
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    fn operational_did(&self) -> Option<String> {
        self.identity
            .read()
            .as_ref()
            .and_then(|identity| identity.operational_did.clone())
    }

    async fn create_did(&self, dwn_url: &str) -> ExchangeResult<()> {
        if !self.is_initialized() {
            return Err(ExchangeError::AgentInitializationFailed(self.agent_type));
        }

        let agent_type = self.agent_type;
        let did_method = self.did_method.clone();
        let dwn_url = dwn_url.to_string();
        let path = self.storage.identity_store_path(agent_type);
        let identity_cell = Arc::clone(&self.identity);
        let hub = Arc::clone(&self.hub);

        // Anchoring runs off the request path; completion lands on the hub.
        tokio::spawn(async move {
            let did = generate_did(&did_method);

            let updated = match identity_cell.read().clone() {
                Some(identity) => identity.with_did(&did, &dwn_url),
                None => AgentIdentity::new(&did_method).with_did(&did, &dwn_url),
            };

            match write_json(&path, &updated).await {
                Ok(()) => {
                    *identity_cell.write() = Some(updated);
                    info!(agent_type = %agent_type, did = %did, "Identifier anchored");
                    hub.did_created
                        .get(agent_type)
                        .fire(DidCreatedEvent { did: Some(did) });
                }
                Err(err) => {
                    error!(agent_type = %agent_type, error = %err, "Failed to persist identifier");
                    hub.did_created.get(agent_type).fire(DidCreatedEvent { did: None });
                }
            }
        });

        Ok(())
    }

    fn on_did_created(&self) -> oneshot::Receiver<DidCreatedEvent> {
        self.hub.did_created.get(self.agent_type).subscribe()
    }

    async fn resolve(&self, did: &str) -> ExchangeResult<DidDocument> {
        let Some((_, identity)) = self.find_identity_by_did(did).await? else {
            return Err(ExchangeError::DidResolutionFailed {
                did: did.into(),
                reason: "identifier is not anchored in this storage".into(),
            });
        };

        let key_id = format!("{did}#key-1");
        let public_key_multibase = format!("z{}", URL_SAFE_NO_PAD.encode(Sha256::digest(did.as_bytes())));

        Ok(DidDocument {
            id: did.to_string(),
            verification_method: vec![VerificationMethod {
                id: key_id.clone(),
                controller: did.to_string(),
                method_type: VERIFICATION_KEY_TYPE.into(),
                public_key_multibase,
            }],
            authentication: Some(vec![key_id]),
            service: identity.dwn_url.map(|url| {
                vec![ServiceEntry {
                    id: format!("{did}#dwn"),
                    service_type: DWN_SERVICE_TYPE.into(),
                    service_endpoint: json!({ (DWN_ENDPOINT_NODES_KEY): [url] }),
                }]
            }),
        })
    }

    async fn create_invitation(&self, flow: CredentialFlow) -> ExchangeResult<String> {
        let from = self.require_did()?;

        let invitation = WaciMessage {
            message_type: MessageKind::OobInvitation.uri().into(),
            id: Uuid::new_v4().to_string(),
            thid: None,
            pthid: None,
            from: Some(from),
            to: vec![],
            body: json!({ "goal_code": flow.goal_code(), "accept": [ACCEPT_DIDCOMM_V2] }),
            attachments: None,
        };

        info!(
            agent_type = %self.agent_type,
            flow = %flow,
            invitation_id = %invitation.id,
            "Invitation created"
        );

        encode_invitation(&invitation)
    }

    async fn process_message(&self, encoded: &str) -> ExchangeResult<()> {
        let invitation = decode_invitation(encoded)?;

        if !invitation.is_kind(MessageKind::OobInvitation) {
            return Err(ExchangeError::InvalidRequest(format!(
                "expected an out-of-band invitation, got {}",
                invitation.message_type
            )));
        }
        if self.agent_type != AgentType::Holder {
            return Err(ExchangeError::InvalidRequest(format!(
                "{} agent does not accept invitations",
                self.agent_type
            )));
        }

        let flow = invitation
            .goal_code()
            .and_then(CredentialFlow::from_goal_code)
            .ok_or_else(|| {
                ExchangeError::InvalidRequest("invitation carries no known goal code".into())
            })?;

        match flow {
            CredentialFlow::Issuance => self.run_issuance_exchange(&invitation).await,
            CredentialFlow::Presentation => self.run_presentation_exchange(&invitation).await,
        }
    }

    fn on_credential_arrived(&self) -> oneshot::Receiver<CredentialArrivedEvent> {
        self.hub.credential_arrived.get(self.agent_type).subscribe()
    }

    fn on_presentation_verified(&self) -> oneshot::Receiver<PresentationVerifiedEvent> {
        self.hub
            .presentation_verified
            .get(self.agent_type)
            .subscribe()
    }

    async fn save_credential(&self, credential: Value) -> ExchangeResult<()> {
        let path = self.storage.vc_store_path(self.agent_type);
        let mut store: IndexMap<String, Value> = read_json(&path).await?.unwrap_or_default();

        let key = credential
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("urn:uuid:{}", Uuid::new_v4()));
        store.insert(key, credential);

        write_json(&path, &store).await?;
        debug!(agent_type = %self.agent_type, total = store.len(), "Credential stored");
        Ok(())
    }
}

// =============================================================================
// HELPERS
// =============================================================================

/// Sidetree-style identifier: method prefix plus base64url multihash of a
/// random seed
fn generate_did(method: &str) -> String {
    let digest = Sha256::digest(Uuid::new_v4().as_bytes());
    let mut multihash = Vec::with_capacity(2 + digest.len());
    multihash.extend_from_slice(&[0x12, 0x20]);
    multihash.extend_from_slice(&digest);
    format!("{method}:{}", URL_SAFE_NO_PAD.encode(multihash))
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> ExchangeResult<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = tokio::fs::read_to_string(path).await?;
    Ok(Some(serde_json::from_str(&raw)?))
}

async fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> ExchangeResult<()> {
    let json = serde_json::to_string_pretty(value)?;
    tokio::fs::write(path, json).await?;
    Ok(())
}
