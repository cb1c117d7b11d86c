//! # Presentation Flow Service
//!
//! Sequences the five WACI presentation steps (invite, propose,
//! request, present, acknowledge) between the verifier and holder
//! agents. The propose step additionally gates on the verifier's
//! verdict: a presentation whose credential or proof checks failed is
//! rejected before any message is returned.

use tracing::{debug, info};

use shared::error::{ExchangeError, ExchangeResult};
use shared::types::AgentType;
use shared::waci::{decode_invitation, encode_invitation, CredentialFlow, MessageKind, WaciMessage};

use crate::agent::{AgentExpectation, AgentPool};
use crate::correlation::MessageCorrelator;

/// Drives the presentation exchange between the verifier and holder agents
#[derive(Clone)]
pub struct PresentationService {
    pool: AgentPool,
    correlator: MessageCorrelator,
}

impl PresentationService {
    pub fn new(pool: AgentPool, correlator: MessageCorrelator) -> Self {
        Self { pool, correlator }
    }

    /// Step 1: the verifier creates an out-of-band invitation
    pub async fn create_invitation(&self, sender_did: &str) -> ExchangeResult<WaciMessage> {
        info!("Creating presentation invitation");

        let records = self
            .pool
            .verify_agents(&[AgentExpectation::with_did(AgentType::Verifier, sender_did)])
            .await?;
        let verifier = records.into_iter().next().ok_or_else(|| {
            ExchangeError::Internal("verifier record missing after verification".into())
        })?;

        let encoded = verifier
            .handle
            .create_invitation(CredentialFlow::Presentation)
            .await?;
        decode_invitation(&encoded)
    }

    /// Step 2: the holder processes the invitation and proposes.
    ///
    /// The verifier's verdict closes the exchange leg; a rejected
    /// presentation aborts the step before the proposal is fetched.
    pub async fn propose(&self, invitation: &WaciMessage) -> ExchangeResult<Option<WaciMessage>> {
        let verifier_did = invitation
            .from
            .clone()
            .ok_or_else(|| ExchangeError::InvalidRequest("invitation has no sender".into()))?;

        let records = self
            .pool
            .verify_agents(&[
                AgentExpectation::with_did(AgentType::Verifier, verifier_did),
                AgentExpectation::present(AgentType::Holder),
            ])
            .await?;

        let verifier = records
            .iter()
            .find(|record| record.agent_type == AgentType::Verifier)
            .ok_or_else(|| {
                ExchangeError::Internal("verifier record missing after verification".into())
            })?;
        let holder = records
            .iter()
            .find(|record| record.agent_type == AgentType::Holder)
            .ok_or_else(|| {
                ExchangeError::Internal("holder record missing after verification".into())
            })?;

        let verdict = verifier.handle.on_presentation_verified();
        holder
            .handle
            .process_message(&encode_invitation(invitation)?)
            .await?;

        let event = verdict.await.map_err(|_| {
            ExchangeError::Internal("presentation verdict channel closed".into())
        })?;
        if !event.is_accepted() {
            return Err(ExchangeError::PresentationInvalid);
        }
        info!("Presentation accepted by verifier agent");

        let proposal = self
            .correlator
            .find(MessageKind::ProposePresentation, &invitation.id)
            .await;
        if let Some(message) = &proposal {
            debug!(message_id = %message.id, "Presentation proposal found");
        }
        Ok(proposal)
    }

    /// Step 3: fetch the verifier's presentation request answering a proposal
    pub async fn request(&self, proposal: &WaciMessage) -> ExchangeResult<Option<WaciMessage>> {
        let verifier_did = proposal
            .recipient()
            .ok_or_else(|| ExchangeError::InvalidRequest("proposal names no recipient".into()))?;
        let holder_did = proposal
            .from
            .as_deref()
            .ok_or_else(|| ExchangeError::InvalidRequest("proposal has no sender".into()))?;

        self.pool
            .verify_agents(&[
                AgentExpectation::with_did(AgentType::Verifier, verifier_did),
                AgentExpectation::with_did(AgentType::Holder, holder_did),
            ])
            .await?;

        let request = self
            .correlator
            .find(MessageKind::RequestPresentation, &proposal.id)
            .await;
        if let Some(message) = &request {
            debug!(message_id = %message.id, "Presentation request found");
        }
        Ok(request)
    }

    /// Step 4: fetch the holder's proof answering a presentation request
    pub async fn present(&self, request: &WaciMessage) -> ExchangeResult<Option<WaciMessage>> {
        let verifier_did = request
            .from
            .as_deref()
            .ok_or_else(|| ExchangeError::InvalidRequest("request has no sender".into()))?;
        let holder_did = request
            .recipient()
            .ok_or_else(|| ExchangeError::InvalidRequest("request names no recipient".into()))?;

        self.pool
            .verify_agents(&[
                AgentExpectation::with_did(AgentType::Verifier, verifier_did),
                AgentExpectation::with_did(AgentType::Holder, holder_did),
            ])
            .await?;

        let Some(thread_id) = request.thid.as_deref() else {
            return Ok(None);
        };

        let proof = self
            .correlator
            .find(MessageKind::Presentation, thread_id)
            .await;
        if let Some(message) = &proof {
            debug!(message_id = %message.id, "Presentation proof found");
        }
        Ok(proof)
    }

    /// Step 5: fetch the verifier's acknowledgement closing the thread
    pub async fn acknowledge(&self, proof: &WaciMessage) -> ExchangeResult<Option<WaciMessage>> {
        let verifier_did = proof
            .recipient()
            .ok_or_else(|| ExchangeError::InvalidRequest("proof names no recipient".into()))?;
        let holder_did = proof
            .from
            .as_deref()
            .ok_or_else(|| ExchangeError::InvalidRequest("proof has no sender".into()))?;

        self.pool
            .verify_agents(&[
                AgentExpectation::with_did(AgentType::Verifier, verifier_did),
                AgentExpectation::with_did(AgentType::Holder, holder_did),
            ])
            .await?;

        let Some(thread_id) = proof.thid.as_deref() else {
            return Ok(None);
        };

        let ack = self
            .correlator
            .find(MessageKind::PresentationAck, thread_id)
            .await;
        if let Some(message) = &ack {
            debug!(message_id = %message.id, "Presentation acknowledgement found");
        }
        Ok(ack)
    }
}
