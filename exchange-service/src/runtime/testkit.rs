//! Scripted in-memory agents for exercising pool and service logic
//! without touching storage.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::oneshot;
use uuid::Uuid;

use shared::constants::ACCEPT_DIDCOMM_V2;
use shared::error::{ExchangeError, ExchangeResult};
use shared::types::{AgentType, DidDocument};
use shared::waci::{encode_invitation, CredentialFlow, MessageKind, WaciMessage};

use super::{
    AgentRuntime, CredentialArrivedEvent, DidCreatedEvent, IdentityAgent,
    PresentationVerifiedEvent, Signal,
};

/// Agent whose behavior is scripted through setters
pub(crate) struct FakeAgent {
    agent_type: AgentType,
    initialized: AtomicBool,
    fail_initialize: AtomicBool,
    creation_yields_did: AtomicBool,
    create_calls: AtomicUsize,
    did: Mutex<Option<String>>,
    did_created: Signal<DidCreatedEvent>,
    credential_arrived: Signal<CredentialArrivedEvent>,
    presentation_verified: Signal<PresentationVerifiedEvent>,
    saved_credentials: Mutex<Vec<Value>>,
}

impl FakeAgent {
    fn new(agent_type: AgentType) -> Self {
        Self {
            agent_type,
            initialized: AtomicBool::new(false),
            fail_initialize: AtomicBool::new(false),
            creation_yields_did: AtomicBool::new(true),
            create_calls: AtomicUsize::new(0),
            did: Mutex::new(None),
            did_created: Signal::new(),
            credential_arrived: Signal::new(),
            presentation_verified: Signal::new(),
            saved_credentials: Mutex::new(Vec::new()),
        }
    }

    /// Pretend the agent already holds an anchored identifier
    pub(crate) fn set_did(&self, did: &str) {
        *self.did.lock() = Some(did.to_string());
    }

    pub(crate) fn set_fail_initialize(&self, fail: bool) {
        self.fail_initialize.store(fail, Ordering::SeqCst);
    }

    /// When false, creation completes with an empty event
    pub(crate) fn set_creation_yields_did(&self, yields: bool) {
        self.creation_yields_did.store(yields, Ordering::SeqCst);
    }

    pub(crate) fn create_call_count(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityAgent for FakeAgent {
    fn agent_type(&self) -> AgentType {
        self.agent_type
    }

    async fn initialize(&self) -> ExchangeResult<()> {
        if self.fail_initialize.load(Ordering::SeqCst) {
            return Err(ExchangeError::Internal(
                "scripted initialization failure".into(),
            ));
        }
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    fn operational_did(&self) -> Option<String> {
        self.did.lock().clone()
    }

    async fn create_did(&self, _dwn_url: &str) -> ExchangeResult<()> {
        let call = self.create_calls.fetch_add(1, Ordering::SeqCst) + 1;

        if self.creation_yields_did.load(Ordering::SeqCst) {
            let did = format!("did:fake:{}-{call}", self.agent_type);
            *self.did.lock() = Some(did.clone());
            self.did_created.fire(DidCreatedEvent { did: Some(did) });
        } else {
            self.did_created.fire(DidCreatedEvent { did: None });
        }
        Ok(())
    }

    fn on_did_created(&self) -> oneshot::Receiver<DidCreatedEvent> {
        self.did_created.subscribe()
    }

    async fn resolve(&self, did: &str) -> ExchangeResult<DidDocument> {
        Ok(DidDocument {
            id: did.to_string(),
            verification_method: vec![],
            authentication: None,
            service: None,
        })
    }

    async fn create_invitation(&self, flow: CredentialFlow) -> ExchangeResult<String> {
        let from = self.operational_did().ok_or_else(|| {
            ExchangeError::Internal(format!(
                "{} agent has no operational identifier",
                self.agent_type
            ))
        })?;

        encode_invitation(&WaciMessage {
            message_type: MessageKind::OobInvitation.uri().into(),
            id: Uuid::new_v4().to_string(),
            thid: None,
            pthid: None,
            from: Some(from),
            to: vec![],
            body: json!({ "goal_code": flow.goal_code(), "accept": [ACCEPT_DIDCOMM_V2] }),
            attachments: None,
        })
    }

    async fn process_message(&self, encoded: &str) -> ExchangeResult<()> {
        shared::waci::decode_invitation(encoded)?;
        Ok(())
    }

    fn on_credential_arrived(&self) -> oneshot::Receiver<CredentialArrivedEvent> {
        self.credential_arrived.subscribe()
    }

    fn on_presentation_verified(&self) -> oneshot::Receiver<PresentationVerifiedEvent> {
        self.presentation_verified.subscribe()
    }

    async fn save_credential(&self, credential: Value) -> ExchangeResult<()> {
        self.saved_credentials.lock().push(credential);
        Ok(())
    }
}

/// Runtime handing out one shared [`FakeAgent`] per role
#[derive(Default)]
pub(crate) struct FakeRuntime {
    agents: Mutex<HashMap<AgentType, Arc<FakeAgent>>>,
}

impl FakeRuntime {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// The scripted agent for a role, built on first access
    pub(crate) fn agent(&self, agent_type: AgentType) -> Arc<FakeAgent> {
        Arc::clone(
            self.agents
                .lock()
                .entry(agent_type)
                .or_insert_with(|| Arc::new(FakeAgent::new(agent_type))),
        )
    }
}

#[async_trait]
impl AgentRuntime for FakeRuntime {
    async fn build_agent(&self, agent_type: AgentType) -> ExchangeResult<Arc<dyn IdentityAgent>> {
        Ok(self.agent(agent_type))
    }
}
