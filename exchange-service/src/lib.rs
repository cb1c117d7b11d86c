//! # WACI Exchange Service
//!
//! This service provides:
//! - Issuer, holder and verifier agent provisioning with DIDs
//! - WACI credential issuance orchestration (propose through ack)
//! - WACI presentation orchestration (propose through ack)
//! - REST API over both flows
//!
//! ## Architecture
//!
//! Agents run in-process on a loopback runtime: one HTTP call to a flow
//! endpoint makes the holder play its exchange leg against the inviting
//! agent, and the resulting DIDComm messages land in each agent's message
//! log on disk. The step endpoints then answer by correlating the stored
//! messages by thread, so the API surface reads like a real multi-party
//! exchange while everything settles locally.

pub mod agent;
pub mod api;
pub mod correlation;
pub mod issuance;
pub mod presentation;
pub mod runtime;

use std::sync::Arc;

use shared::config::ExchangeConfig;

use agent::AgentPool;
use correlation::MessageCorrelator;
use issuance::IssuanceService;
use presentation::PresentationService;
use runtime::AgentRuntime;

/// Application state shared across handlers
pub struct AppState {
    /// Configuration
    pub config: ExchangeConfig,
    /// Agent lifecycle manager
    pub pool: AgentPool,
    /// Issuance flow orchestration
    pub issuance: IssuanceService,
    /// Presentation flow orchestration
    pub presentation: PresentationService,
}

impl AppState {
    /// Wire the pool, correlator and flow services onto one runtime
    pub fn new(config: ExchangeConfig, runtime: Arc<dyn AgentRuntime>) -> Self {
        let pool = AgentPool::new(runtime, &config);
        let correlator = MessageCorrelator::new(&config);
        let issuance = IssuanceService::new(pool.clone(), correlator.clone());
        let presentation = PresentationService::new(pool.clone(), correlator);

        Self {
            config,
            pool,
            issuance,
            presentation,
        }
    }
}
