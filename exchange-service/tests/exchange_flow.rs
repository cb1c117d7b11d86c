//! End-to-End Exchange Tests
//!
//! Drives the service the way a deployment would: provision agents over a
//! storage root, run a credential issuance to completion, then present the
//! issued credential to a verifier backed by the same storage.

use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use tempfile::tempdir;

use exchange_service::runtime::loopback::LoopbackRuntime;
use exchange_service::AppState;
use shared::config::ExchangeConfig;
use shared::constants::{GOAL_CODE_ISSUANCE, GOAL_CODE_PRESENTATION};
use shared::error::ExchangeError;
use shared::types::AgentType;
use shared::waci::{MessageKind, WaciMessage};

fn state_over(root: &Path) -> AppState {
    let mut config = ExchangeConfig::default();
    config.storage.root = root.to_path_buf();

    let runtime = Arc::new(LoopbackRuntime::new(&config));
    AppState::new(config, runtime)
}

async fn did_of(state: &AppState, agent_type: AgentType) -> String {
    state
        .pool
        .find_by_type(agent_type)
        .await
        .unwrap()
        .did_document
        .id
        .clone()
}

fn attached_json(message: &WaciMessage) -> Value {
    let attachments = message.attachments.as_ref().expect("message has attachments");
    attachments.first().expect("attachment present").data["json"].clone()
}

#[tokio::test]
async fn test_issued_credential_backs_a_presentation() {
    let dir = tempdir().unwrap();
    let state = state_over(dir.path());

    state
        .pool
        .create(&[AgentType::Issuer, AgentType::Holder, AgentType::Verifier])
        .await
        .unwrap();
    let issuer_did = did_of(&state, AgentType::Issuer).await;
    let verifier_did = did_of(&state, AgentType::Verifier).await;

    // Issuance: invitation through acknowledgement
    let invitation = state.issuance.create_invitation(&issuer_did).await.unwrap();
    assert!(invitation.is_kind(MessageKind::OobInvitation));
    assert_eq!(invitation.goal_code(), Some(GOAL_CODE_ISSUANCE));
    assert_eq!(invitation.from.as_deref(), Some(issuer_did.as_str()));

    let proposal = state
        .issuance
        .propose(&invitation)
        .await
        .unwrap()
        .expect("proposal recorded");
    assert!(proposal.is_kind(MessageKind::ProposeCredential));
    assert_eq!(proposal.pthid.as_deref(), Some(invitation.id.as_str()));

    let offer = state
        .issuance
        .offer(&proposal)
        .await
        .unwrap()
        .expect("offer recorded");
    assert!(offer.is_kind(MessageKind::OfferCredential));
    assert_eq!(offer.thid.as_deref(), Some(proposal.id.as_str()));

    let request = state
        .issuance
        .request(&offer)
        .await
        .unwrap()
        .expect("request recorded");
    assert!(request.is_kind(MessageKind::RequestCredential));

    let issued = state
        .issuance
        .issue(&request)
        .await
        .unwrap()
        .expect("credential recorded");
    assert!(issued.is_kind(MessageKind::IssueCredential));
    let credential = attached_json(&issued);
    assert_eq!(credential["issuer"], Value::String(issuer_did.clone()));

    let ack = state
        .issuance
        .acknowledge(&issued)
        .await
        .unwrap()
        .expect("ack recorded");
    assert!(ack.is_kind(MessageKind::IssuanceAck));
    assert_eq!(ack.thid.as_deref(), Some(proposal.id.as_str()));

    // Presentation: the credential saved during issuance satisfies the verifier
    let invitation = state
        .presentation
        .create_invitation(&verifier_did)
        .await
        .unwrap();
    assert_eq!(invitation.goal_code(), Some(GOAL_CODE_PRESENTATION));

    let proposal = state
        .presentation
        .propose(&invitation)
        .await
        .unwrap()
        .expect("presentation proposal recorded");
    assert!(proposal.is_kind(MessageKind::ProposePresentation));

    let request = state
        .presentation
        .request(&proposal)
        .await
        .unwrap()
        .expect("presentation request recorded");
    assert!(request.is_kind(MessageKind::RequestPresentation));
    assert_eq!(request.from.as_deref(), Some(verifier_did.as_str()));

    let proof = state
        .presentation
        .present(&request)
        .await
        .unwrap()
        .expect("proof recorded");
    assert!(proof.is_kind(MessageKind::Presentation));

    // The presented credential is the one issued above
    let presented = attached_json(&proof);
    let presented_vcs = presented["verifiableCredential"]
        .as_array()
        .expect("proof carries credentials");
    assert_eq!(presented_vcs.len(), 1);
    assert_eq!(presented_vcs[0]["id"], credential["id"]);

    let ack = state
        .presentation
        .acknowledge(&proof)
        .await
        .unwrap()
        .expect("presentation ack recorded");
    assert!(ack.is_kind(MessageKind::PresentationAck));
}

#[tokio::test]
async fn test_presentation_without_prior_issuance_is_rejected() {
    let dir = tempdir().unwrap();
    let state = state_over(dir.path());

    state
        .pool
        .create(&[AgentType::Holder, AgentType::Verifier])
        .await
        .unwrap();
    let verifier_did = did_of(&state, AgentType::Verifier).await;

    let invitation = state
        .presentation
        .create_invitation(&verifier_did)
        .await
        .unwrap();
    let err = state.presentation.propose(&invitation).await.unwrap_err();
    assert!(matches!(err, ExchangeError::PresentationInvalid));
}

#[tokio::test]
async fn test_step_lookups_answer_from_disk_after_restart() {
    let dir = tempdir().unwrap();

    let state = state_over(dir.path());
    state
        .pool
        .create(&[AgentType::Issuer, AgentType::Holder])
        .await
        .unwrap();
    let issuer_did = did_of(&state, AgentType::Issuer).await;

    let invitation = state.issuance.create_invitation(&issuer_did).await.unwrap();
    let proposal = state
        .issuance
        .propose(&invitation)
        .await
        .unwrap()
        .expect("proposal recorded");
    let offer = state
        .issuance
        .offer(&proposal)
        .await
        .unwrap()
        .expect("offer recorded");
    drop(state);

    // A fresh service over the same root serves the stored exchange
    let state = state_over(dir.path());
    let offer_again = state
        .issuance
        .offer(&proposal)
        .await
        .unwrap()
        .expect("offer still recorded");
    assert_eq!(offer_again.id, offer.id);

    let request = state
        .issuance
        .request(&offer_again)
        .await
        .unwrap()
        .expect("request still recorded");
    let issued = state
        .issuance
        .issue(&request)
        .await
        .unwrap()
        .expect("credential still recorded");
    let ack = state
        .issuance
        .acknowledge(&issued)
        .await
        .unwrap()
        .expect("ack still recorded");
    assert_eq!(ack.thid.as_deref(), Some(proposal.id.as_str()));
}

#[tokio::test]
async fn test_agent_lifecycle_round_trip() {
    let dir = tempdir().unwrap();
    let state = state_over(dir.path());

    state
        .pool
        .create(&[AgentType::Issuer, AgentType::Holder])
        .await
        .unwrap();
    assert_eq!(state.pool.find_all().await.unwrap().len(), 2);

    state.pool.remove(AgentType::Issuer).await.unwrap();
    assert_eq!(state.pool.find_all().await.unwrap().len(), 1);
    let err = state.pool.find_by_type(AgentType::Issuer).await.unwrap_err();
    assert!(matches!(err, ExchangeError::AgentNotFound(AgentType::Issuer)));

    assert_eq!(state.pool.remove_all().await.unwrap(), 1);
    assert!(state.pool.find_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_provisioning_twice_keeps_the_same_identifier() {
    let dir = tempdir().unwrap();
    let state = state_over(dir.path());

    let first = state.pool.create(&[AgentType::Issuer]).await.unwrap();
    let second = state.pool.create(&[AgentType::Issuer]).await.unwrap();

    assert_eq!(first[0].did_document.id, second[0].did_document.id);
}
