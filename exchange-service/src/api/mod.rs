//! # REST API for the WACI Exchange Service
//!
//! Provides HTTP endpoints for:
//! - Agent lifecycle (provision, list, inspect, remove)
//! - Credential issuance steps
//! - Presentation steps
//!
//! ## Endpoints
//!
//! - `GET /health` - Service health
//! - `POST /agents` - Provision agents and return their DID documents
//! - `GET /agents` / `GET /agents/:agent_type` - Resolved documents
//! - `DELETE /agents` / `DELETE /agents/:agent_type` - Remove agent storage
//! - `POST /issuance/{invitation,proposal,offer,request,credential,ack}`
//! - `POST /presentation/{invitation,proposal,request,proof,ack}`
//!
//! Every flow-step body is a WACI message record; each endpoint checks
//! the message type before orchestrating and converts an absent answer
//! into 404.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use shared::constants::{GOAL_CODE_ISSUANCE, GOAL_CODE_PRESENTATION};
use shared::error::ExchangeError;
use shared::types::{AgentDocument, AgentType, CreateAgentsRequest, CreateInvitationRequest};
use shared::waci::{MessageKind, WaciMessage};

use crate::AppState;

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        // Health check
        .route("/health", get(health_check))
        // Agent lifecycle
        .route(
            "/agents",
            post(create_agents).get(list_agents).delete(remove_agents),
        )
        .route("/agents/:agent_type", get(get_agent).delete(remove_agent))
        // Issuance flow steps
        .route("/issuance/invitation", post(issuance_invitation))
        .route("/issuance/proposal", post(issuance_proposal))
        .route("/issuance/offer", post(issuance_offer))
        .route("/issuance/request", post(issuance_request))
        .route("/issuance/credential", post(issuance_credential))
        .route("/issuance/ack", post(issuance_ack))
        // Presentation flow steps
        .route("/presentation/invitation", post(presentation_invitation))
        .route("/presentation/proposal", post(presentation_proposal))
        .route("/presentation/request", post(presentation_request))
        .route("/presentation/proof", post(presentation_proof))
        .route("/presentation/ack", post(presentation_ack))
        .with_state(Arc::clone(&state));

    if state.config.api.enable_cors {
        router = router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    router
}

// =============================================================================
// AGENT HANDLERS
// =============================================================================

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": shared::VERSION,
    }))
}

/// Provision agents for the requested roles
async fn create_agents(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateAgentsRequest>,
) -> Result<Json<Vec<AgentDocument>>, ApiError> {
    if request.types.is_empty() {
        return Err(ApiError::BadRequest(
            "At least one agent type is required".into(),
        ));
    }

    info!(count = request.types.len(), "Agent provisioning request received");

    let documents = state
        .pool
        .create(&request.types)
        .await
        .map_err(ApiError::from)?;
    Ok(Json(documents))
}

/// List every provisioned agent's resolved document
async fn list_agents(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<AgentDocument>>, ApiError> {
    let documents = state.pool.find_all().await.map_err(ApiError::from)?;
    Ok(Json(documents))
}

/// Resolve one agent's document
async fn get_agent(
    State(state): State<Arc<AppState>>,
    Path(agent_type): Path<String>,
) -> Result<Json<AgentDocument>, ApiError> {
    let agent_type: AgentType = agent_type.parse().map_err(ApiError::from)?;

    let document = state
        .pool
        .find_by_type(agent_type)
        .await
        .map_err(ApiError::from)?;
    Ok(Json(document))
}

/// Remove one agent's storage
async fn remove_agent(
    State(state): State<Arc<AppState>>,
    Path(agent_type): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let agent_type: AgentType = agent_type.parse().map_err(ApiError::from)?;

    state.pool.remove(agent_type).await.map_err(ApiError::from)?;
    Ok(Json(serde_json::json!({ "removed": agent_type })))
}

/// Remove every provisioned agent
async fn remove_agents(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let removed = state.pool.remove_all().await.map_err(ApiError::from)?;
    Ok(Json(serde_json::json!({ "removed": removed })))
}

// =============================================================================
// ISSUANCE HANDLERS
// =============================================================================

/// Create an issuance out-of-band invitation
async fn issuance_invitation(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateInvitationRequest>,
) -> Result<Json<WaciMessage>, ApiError> {
    if request.goal_code != GOAL_CODE_ISSUANCE {
        return Err(ApiError::BadRequest("Goal code not supported".into()));
    }

    let invitation = state
        .issuance
        .create_invitation(&request.sender_did)
        .await
        .map_err(ApiError::from)?;
    Ok(Json(invitation))
}

/// Process an invitation on the holder and return the credential proposal
async fn issuance_proposal(
    State(state): State<Arc<AppState>>,
    Json(invitation): Json<WaciMessage>,
) -> Result<Json<WaciMessage>, ApiError> {
    expect_kind(&invitation, MessageKind::OobInvitation)?;

    let proposal = state
        .issuance
        .propose(&invitation)
        .await
        .map_err(ApiError::from)?;
    or_not_found("credential proposal", proposal)
}

/// Return the credential offer answering a proposal
async fn issuance_offer(
    State(state): State<Arc<AppState>>,
    Json(proposal): Json<WaciMessage>,
) -> Result<Json<WaciMessage>, ApiError> {
    expect_kind(&proposal, MessageKind::ProposeCredential)?;

    let offer = state
        .issuance
        .offer(&proposal)
        .await
        .map_err(ApiError::from)?;
    or_not_found("credential offer", offer)
}

/// Return the credential request answering an offer
async fn issuance_request(
    State(state): State<Arc<AppState>>,
    Json(offer): Json<WaciMessage>,
) -> Result<Json<WaciMessage>, ApiError> {
    expect_kind(&offer, MessageKind::OfferCredential)?;

    let request = state
        .issuance
        .request(&offer)
        .await
        .map_err(ApiError::from)?;
    or_not_found("credential request", request)
}

/// Return the issued credential answering a request
async fn issuance_credential(
    State(state): State<Arc<AppState>>,
    Json(request): Json<WaciMessage>,
) -> Result<Json<WaciMessage>, ApiError> {
    expect_kind(&request, MessageKind::RequestCredential)?;

    let credential = state
        .issuance
        .issue(&request)
        .await
        .map_err(ApiError::from)?;
    or_not_found("issued credential", credential)
}

/// Return the acknowledgement closing an issuance thread
async fn issuance_ack(
    State(state): State<Arc<AppState>>,
    Json(credential): Json<WaciMessage>,
) -> Result<Json<WaciMessage>, ApiError> {
    expect_kind(&credential, MessageKind::IssueCredential)?;

    let ack = state
        .issuance
        .acknowledge(&credential)
        .await
        .map_err(ApiError::from)?;
    or_not_found("credential acknowledgement", ack)
}

// =============================================================================
// PRESENTATION HANDLERS
// =============================================================================

/// Create a presentation out-of-band invitation
async fn presentation_invitation(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateInvitationRequest>,
) -> Result<Json<WaciMessage>, ApiError> {
    if request.goal_code != GOAL_CODE_PRESENTATION {
        return Err(ApiError::BadRequest("Goal code not supported".into()));
    }

    let invitation = state
        .presentation
        .create_invitation(&request.sender_did)
        .await
        .map_err(ApiError::from)?;
    Ok(Json(invitation))
}

/// Process an invitation on the holder and return the presentation proposal
async fn presentation_proposal(
    State(state): State<Arc<AppState>>,
    Json(invitation): Json<WaciMessage>,
) -> Result<Json<WaciMessage>, ApiError> {
    expect_kind(&invitation, MessageKind::OobInvitation)?;

    let proposal = state
        .presentation
        .propose(&invitation)
        .await
        .map_err(ApiError::from)?;
    or_not_found("presentation proposal", proposal)
}

/// Return the presentation request answering a proposal
async fn presentation_request(
    State(state): State<Arc<AppState>>,
    Json(proposal): Json<WaciMessage>,
) -> Result<Json<WaciMessage>, ApiError> {
    expect_kind(&proposal, MessageKind::ProposePresentation)?;

    let request = state
        .presentation
        .request(&proposal)
        .await
        .map_err(ApiError::from)?;
    or_not_found("presentation request", request)
}

/// Return the proof answering a presentation request
async fn presentation_proof(
    State(state): State<Arc<AppState>>,
    Json(request): Json<WaciMessage>,
) -> Result<Json<WaciMessage>, ApiError> {
    expect_kind(&request, MessageKind::RequestPresentation)?;

    let proof = state
        .presentation
        .present(&request)
        .await
        .map_err(ApiError::from)?;
    or_not_found("presentation proof", proof)
}

/// Return the acknowledgement closing a presentation thread
async fn presentation_ack(
    State(state): State<Arc<AppState>>,
    Json(proof): Json<WaciMessage>,
) -> Result<Json<WaciMessage>, ApiError> {
    expect_kind(&proof, MessageKind::Presentation)?;

    let ack = state
        .presentation
        .acknowledge(&proof)
        .await
        .map_err(ApiError::from)?;
    or_not_found("presentation acknowledgement", ack)
}

// =============================================================================
// HELPERS
// =============================================================================

fn expect_kind(message: &WaciMessage, kind: MessageKind) -> Result<(), ApiError> {
    if !message.is_kind(kind) {
        return Err(ApiError::BadRequest(format!(
            "Expected a {} message, got {}",
            kind, message.message_type
        )));
    }
    Ok(())
}

fn or_not_found(step: &str, message: Option<WaciMessage>) -> Result<Json<WaciMessage>, ApiError> {
    message
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("No {step} was recorded for this thread")))
}

// =============================================================================
// ERROR HANDLING
// =============================================================================

/// API error type
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Forbidden(String),
    Internal(String),
}

impl From<ExchangeError> for ApiError {
    fn from(err: ExchangeError) -> Self {
        match err {
            ExchangeError::AgentNotFound(_) => ApiError::NotFound(err.to_string()),

            ExchangeError::IdentifierMismatch { .. } | ExchangeError::InvalidRequest(_) => {
                ApiError::BadRequest(err.to_string())
            }

            ExchangeError::PresentationInvalid => ApiError::Forbidden(err.to_string()),

            _ => ApiError::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::Internal(msg) => {
                error!(error = %msg, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".into())
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
