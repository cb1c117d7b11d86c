//! # Agent Runtime Abstraction
//!
//! The exchange service drives identity agents through the
//! [`IdentityAgent`] trait: initialization, DID provisioning, invitation
//! creation and inbound message processing. An [`AgentRuntime`] builds
//! one handle per agent role.
//!
//! Long-running operations (DID anchoring, credential arrival,
//! presentation verification) complete asynchronously. Each completion
//! is reported exactly once through a one-shot [`Signal`]: callers
//! subscribe for a receiver, the runtime fires the event when the work
//! lands. A value fired before anyone subscribed is stashed and handed
//! to the next subscriber, so subscribing slightly late never loses the
//! event.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;

use shared::error::ExchangeResult;
use shared::types::{AgentType, DidDocument};
use shared::waci::CredentialFlow;

pub mod loopback;

#[cfg(test)]
pub(crate) mod testkit;

// =============================================================================
// EVENTS
// =============================================================================

/// Outcome of a DID creation, delivered once per creation
#[derive(Debug, Clone)]
pub struct DidCreatedEvent {
    /// The anchored DID, or `None` when creation finished without one
    pub did: Option<String>,
}

/// A credential reaching the holder at the end of an issuance exchange
#[derive(Debug, Clone)]
pub struct CredentialArrivedEvent {
    /// The credential as issued, or `None` when the exchange ended empty
    pub credential: Option<Value>,
}

/// A verifier's verdict on a received presentation
#[derive(Debug, Clone)]
pub struct PresentationVerifiedEvent {
    /// Whether the presented credentials verified
    pub vc_verified: bool,
    /// Whether the presentation envelope itself verified
    pub presentation_verified: bool,
}

impl PresentationVerifiedEvent {
    /// Both the credentials and the envelope checked out
    pub fn is_accepted(&self) -> bool {
        self.vc_verified && self.presentation_verified
    }
}

// =============================================================================
// ONE-SHOT SIGNAL
// =============================================================================

enum SignalState<T> {
    Idle,
    Waiting(oneshot::Sender<T>),
    Fired(T),
}

/// Single-consumer, single-delivery notification channel.
///
/// `fire` before `subscribe` stashes the value; `subscribe` before
/// `fire` parks a sender. Either order delivers the value exactly once.
/// A new subscription replaces any previous waiting receiver.
pub struct Signal<T> {
    state: Mutex<SignalState<T>>,
}

impl<T> Signal<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SignalState::Idle),
        }
    }

    /// Receiver for the next (or already stashed) event
    pub fn subscribe(&self) -> oneshot::Receiver<T> {
        let (tx, rx) = oneshot::channel();
        let mut state = self.state.lock();
        match std::mem::replace(&mut *state, SignalState::Idle) {
            SignalState::Fired(value) => {
                let _ = tx.send(value);
            }
            _ => {
                *state = SignalState::Waiting(tx);
            }
        }
        rx
    }

    /// Deliver an event to the subscriber, or stash it for the next one
    pub fn fire(&self, value: T) {
        let mut state = self.state.lock();
        match std::mem::replace(&mut *state, SignalState::Idle) {
            SignalState::Waiting(tx) => {
                if let Err(value) = tx.send(value) {
                    *state = SignalState::Fired(value);
                }
            }
            SignalState::Idle | SignalState::Fired(_) => {
                *state = SignalState::Fired(value);
            }
        }
    }
}

impl<T> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// AGENT TRAITS
// =============================================================================

/// Capabilities of one identity agent, as the exchange service uses them
#[async_trait]
pub trait IdentityAgent: Send + Sync {
    /// Role this agent plays
    fn agent_type(&self) -> AgentType;

    /// Load or create the agent's durable state
    async fn initialize(&self) -> ExchangeResult<()>;

    /// Whether initialization completed
    fn is_initialized(&self) -> bool;

    /// The agent's anchored DID, if storage holds one
    fn operational_did(&self) -> Option<String>;

    /// Start DID creation. The command returns once accepted; completion
    /// arrives through [`IdentityAgent::on_did_created`].
    async fn create_did(&self, dwn_url: &str) -> ExchangeResult<()>;

    /// Subscribe to the completion of a DID creation
    fn on_did_created(&self) -> oneshot::Receiver<DidCreatedEvent>;

    /// Resolve a DID into its document
    async fn resolve(&self, did: &str) -> ExchangeResult<DidDocument>;

    /// Create an encoded out-of-band invitation opening a flow
    async fn create_invitation(&self, flow: CredentialFlow) -> ExchangeResult<String>;

    /// Process an inbound encoded invitation, driving the exchange it
    /// announces to completion
    async fn process_message(&self, encoded: &str) -> ExchangeResult<()>;

    /// Subscribe to a credential arriving at this agent
    fn on_credential_arrived(&self) -> oneshot::Receiver<CredentialArrivedEvent>;

    /// Subscribe to this agent's verdict on a received presentation
    fn on_presentation_verified(&self) -> oneshot::Receiver<PresentationVerifiedEvent>;

    /// Persist a credential into this agent's credential store
    async fn save_credential(&self, credential: Value) -> ExchangeResult<()>;
}

/// Builds agent handles for the pool
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    /// Build a handle for one agent role
    async fn build_agent(&self, agent_type: AgentType) -> ExchangeResult<Arc<dyn IdentityAgent>>;
}
