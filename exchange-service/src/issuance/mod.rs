//! # Issuance Flow Service
//!
//! Sequences the six WACI issuance steps (invite, propose, offer,
//! request, issue, acknowledge). The first step asks the issuer agent
//! for an invitation; every later step verifies the parties named by
//! the incoming message and then fetches the answering record the
//! agents already produced into their message logs.

use tracing::{debug, error, info};

use shared::error::{ExchangeError, ExchangeResult};
use shared::types::AgentType;
use shared::waci::{decode_invitation, encode_invitation, CredentialFlow, MessageKind, WaciMessage};

use crate::agent::{AgentExpectation, AgentPool};
use crate::correlation::MessageCorrelator;

/// Drives the issuance exchange between the issuer and holder agents
#[derive(Clone)]
pub struct IssuanceService {
    pool: AgentPool,
    correlator: MessageCorrelator,
}

impl IssuanceService {
    pub fn new(pool: AgentPool, correlator: MessageCorrelator) -> Self {
        Self { pool, correlator }
    }

    /// Step 1: the issuer creates an out-of-band invitation
    pub async fn create_invitation(&self, sender_did: &str) -> ExchangeResult<WaciMessage> {
        info!("Creating issuance invitation");

        let records = self
            .pool
            .verify_agents(&[AgentExpectation::with_did(AgentType::Issuer, sender_did)])
            .await?;
        let issuer = records.into_iter().next().ok_or_else(|| {
            ExchangeError::Internal("issuer record missing after verification".into())
        })?;

        let encoded = issuer
            .handle
            .create_invitation(CredentialFlow::Issuance)
            .await?;
        decode_invitation(&encoded)
    }

    /// Step 2: the holder processes the invitation and proposes.
    ///
    /// Processing runs the exchange on the agent side; once the arrived
    /// credential is saved, the proposal is read back from the issuer's
    /// log under the invitation id.
    pub async fn propose(&self, invitation: &WaciMessage) -> ExchangeResult<Option<WaciMessage>> {
        let issuer_did = invitation
            .from
            .clone()
            .ok_or_else(|| ExchangeError::InvalidRequest("invitation has no sender".into()))?;

        let records = self
            .pool
            .verify_agents(&[
                AgentExpectation::with_did(AgentType::Issuer, issuer_did),
                AgentExpectation::present(AgentType::Holder),
            ])
            .await?;
        let holder = records
            .into_iter()
            .find(|record| record.agent_type == AgentType::Holder)
            .ok_or_else(|| {
                ExchangeError::Internal("holder record missing after verification".into())
            })?;

        let arrived = holder.handle.on_credential_arrived();
        holder
            .handle
            .process_message(&encode_invitation(invitation)?)
            .await?;

        match arrived.await {
            Ok(event) => match event.credential {
                Some(credential) => {
                    info!("Credential arrived in holder agent");
                    holder.handle.save_credential(credential).await?;
                }
                None => error!("Credential did not arrive in holder agent"),
            },
            Err(_) => error!("Credential arrival channel closed"),
        }

        let proposal = self
            .correlator
            .find(MessageKind::ProposeCredential, &invitation.id)
            .await;
        if let Some(message) = &proposal {
            debug!(message_id = %message.id, "Credential proposal found");
        }
        Ok(proposal)
    }

    /// Step 3: fetch the issuer's offer answering a proposal
    pub async fn offer(&self, proposal: &WaciMessage) -> ExchangeResult<Option<WaciMessage>> {
        let issuer_did = proposal
            .recipient()
            .ok_or_else(|| ExchangeError::InvalidRequest("proposal names no recipient".into()))?;
        let holder_did = proposal
            .from
            .as_deref()
            .ok_or_else(|| ExchangeError::InvalidRequest("proposal has no sender".into()))?;

        self.pool
            .verify_agents(&[
                AgentExpectation::with_did(AgentType::Issuer, issuer_did),
                AgentExpectation::with_did(AgentType::Holder, holder_did),
            ])
            .await?;

        let offer = self
            .correlator
            .find(MessageKind::OfferCredential, &proposal.id)
            .await;
        if let Some(message) = &offer {
            debug!(message_id = %message.id, "Credential offer found");
        }
        Ok(offer)
    }

    /// Step 4: fetch the holder's credential request answering an offer
    pub async fn request(&self, offer: &WaciMessage) -> ExchangeResult<Option<WaciMessage>> {
        let issuer_did = offer
            .from
            .as_deref()
            .ok_or_else(|| ExchangeError::InvalidRequest("offer has no sender".into()))?;
        let holder_did = offer
            .recipient()
            .ok_or_else(|| ExchangeError::InvalidRequest("offer names no recipient".into()))?;

        self.pool
            .verify_agents(&[
                AgentExpectation::with_did(AgentType::Issuer, issuer_did),
                AgentExpectation::with_did(AgentType::Holder, holder_did),
            ])
            .await?;

        let Some(thread_id) = offer.thid.as_deref() else {
            return Ok(None);
        };

        let request = self
            .correlator
            .find(MessageKind::RequestCredential, thread_id)
            .await;
        if let Some(message) = &request {
            debug!(message_id = %message.id, "Credential request found");
        }
        Ok(request)
    }

    /// Step 5: fetch the issued credential answering a request
    pub async fn issue(&self, request: &WaciMessage) -> ExchangeResult<Option<WaciMessage>> {
        let issuer_did = request
            .recipient()
            .ok_or_else(|| ExchangeError::InvalidRequest("request names no recipient".into()))?;
        let holder_did = request
            .from
            .as_deref()
            .ok_or_else(|| ExchangeError::InvalidRequest("request has no sender".into()))?;

        self.pool
            .verify_agents(&[
                AgentExpectation::with_did(AgentType::Issuer, issuer_did),
                AgentExpectation::with_did(AgentType::Holder, holder_did),
            ])
            .await?;

        let Some(thread_id) = request.thid.as_deref() else {
            return Ok(None);
        };

        let credential = self
            .correlator
            .find(MessageKind::IssueCredential, thread_id)
            .await;
        if let Some(message) = &credential {
            debug!(message_id = %message.id, "Issued credential found");
        }
        Ok(credential)
    }

    /// Step 6: fetch the holder's acknowledgement closing the thread
    pub async fn acknowledge(&self, issue: &WaciMessage) -> ExchangeResult<Option<WaciMessage>> {
        let issuer_did = issue
            .from
            .as_deref()
            .ok_or_else(|| ExchangeError::InvalidRequest("credential has no sender".into()))?;
        let holder_did = issue
            .recipient()
            .ok_or_else(|| ExchangeError::InvalidRequest("credential names no recipient".into()))?;

        self.pool
            .verify_agents(&[
                AgentExpectation::with_did(AgentType::Issuer, issuer_did),
                AgentExpectation::with_did(AgentType::Holder, holder_did),
            ])
            .await?;

        let Some(thread_id) = issue.thid.as_deref() else {
            return Ok(None);
        };

        let ack = self
            .correlator
            .find(MessageKind::IssuanceAck, thread_id)
            .await;
        if let Some(message) = &ack {
            debug!(message_id = %message.id, "Credential acknowledgement found");
        }
        Ok(ack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentPool;
    use crate::runtime::loopback::LoopbackRuntime;
    use indexmap::IndexMap;
    use serde_json::Value;
    use shared::config::ExchangeConfig;
    use shared::constants::GOAL_CODE_ISSUANCE;
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::tempdir;

    async fn provisioned_service(root: &Path) -> (IssuanceService, ExchangeConfig, String) {
        let mut config = ExchangeConfig::default();
        config.storage.root = root.to_path_buf();

        let runtime = Arc::new(LoopbackRuntime::new(&config));
        let pool = AgentPool::new(runtime, &config);

        let documents = pool
            .create(&[AgentType::Issuer, AgentType::Holder])
            .await
            .unwrap();
        let issuer_did = documents
            .iter()
            .find(|d| d.agent_type == AgentType::Issuer)
            .unwrap()
            .did_document
            .id
            .clone();

        let correlator = MessageCorrelator::new(&config);
        let service = IssuanceService::new(pool, correlator);
        (service, config, issuer_did)
    }

    #[tokio::test]
    async fn test_issuance_flow_walks_all_six_steps() {
        let dir = tempdir().unwrap();
        let (service, config, issuer_did) = provisioned_service(dir.path()).await;

        let invitation = service.create_invitation(&issuer_did).await.unwrap();
        assert!(invitation.is_kind(MessageKind::OobInvitation));
        assert_eq!(invitation.goal_code(), Some(GOAL_CODE_ISSUANCE));
        assert_eq!(invitation.from.as_deref(), Some(issuer_did.as_str()));

        let proposal = service
            .propose(&invitation)
            .await
            .unwrap()
            .expect("proposal recorded");
        assert!(proposal.is_kind(MessageKind::ProposeCredential));
        assert_eq!(proposal.pthid.as_deref(), Some(invitation.id.as_str()));
        assert_eq!(proposal.recipient(), Some(issuer_did.as_str()));

        // The arrived credential lands in the holder's store.
        let raw = std::fs::read_to_string(config.storage.vc_store_path(AgentType::Holder)).unwrap();
        let store: IndexMap<String, Value> = serde_json::from_str(&raw).unwrap();
        assert_eq!(store.len(), 1);

        let offer = service.offer(&proposal).await.unwrap().expect("offer recorded");
        assert!(offer.is_kind(MessageKind::OfferCredential));
        assert_eq!(offer.thid.as_deref(), Some(proposal.id.as_str()));

        let request = service.request(&offer).await.unwrap().expect("request recorded");
        assert!(request.is_kind(MessageKind::RequestCredential));

        let credential = service.issue(&request).await.unwrap().expect("credential recorded");
        assert!(credential.is_kind(MessageKind::IssueCredential));
        assert!(credential.attachments.is_some());

        let ack = service
            .acknowledge(&credential)
            .await
            .unwrap()
            .expect("acknowledgement recorded");
        assert!(ack.is_kind(MessageKind::IssuanceAck));
        assert_eq!(ack.thid.as_deref(), Some(proposal.id.as_str()));
    }

    #[tokio::test]
    async fn test_invitation_requires_matching_issuer_did() {
        let dir = tempdir().unwrap();
        let (service, _, _) = provisioned_service(dir.path()).await;

        let err = service
            .create_invitation("did:quarkid:matic:EiSomeoneElse")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ExchangeError::IdentifierMismatch {
                agent_type: AgentType::Issuer
            }
        ));
    }

    #[tokio::test]
    async fn test_invitation_requires_provisioned_issuer() {
        let dir = tempdir().unwrap();
        let mut config = ExchangeConfig::default();
        config.storage.root = dir.path().to_path_buf();

        let runtime = Arc::new(LoopbackRuntime::new(&config));
        let pool = AgentPool::new(runtime, &config);
        let service = IssuanceService::new(pool, MessageCorrelator::new(&config));

        let err = service
            .create_invitation("did:quarkid:matic:EiNobody")
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::AgentNotFound(AgentType::Issuer)));
    }

    #[tokio::test]
    async fn test_propose_rejects_invitation_without_sender() {
        let dir = tempdir().unwrap();
        let (service, _, issuer_did) = provisioned_service(dir.path()).await;

        let mut invitation = service.create_invitation(&issuer_did).await.unwrap();
        invitation.from = None;

        let err = service.propose(&invitation).await.unwrap_err();
        assert!(matches!(err, ExchangeError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_offer_for_unknown_proposal_is_absent() {
        let dir = tempdir().unwrap();
        let (service, _, issuer_did) = provisioned_service(dir.path()).await;

        let invitation = service.create_invitation(&issuer_did).await.unwrap();
        let proposal = service.propose(&invitation).await.unwrap().unwrap();

        let mut unknown = proposal.clone();
        unknown.id = "t-unknown".into();

        assert!(service.offer(&unknown).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_request_without_thread_id_is_absent() {
        let dir = tempdir().unwrap();
        let (service, _, issuer_did) = provisioned_service(dir.path()).await;

        let invitation = service.create_invitation(&issuer_did).await.unwrap();
        let proposal = service.propose(&invitation).await.unwrap().unwrap();
        let mut offer = service.offer(&proposal).await.unwrap().unwrap();
        offer.thid = None;

        assert!(service.request(&offer).await.unwrap().is_none());
    }
}
