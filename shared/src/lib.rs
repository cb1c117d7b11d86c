//! # Shared Module for the WACI Exchange Service
//!
//! This crate provides the common types, errors and configuration used
//! by the exchange service: the WACI/DIDComm message model, the agent
//! roles and their storage layout, and the error taxonomy.
//!
//! ## The exchange in one paragraph
//!
//! Three agents (issuer, holder, verifier) run WACI flows against each
//! other. Issuance walks invite, propose, offer, request, issue, ack;
//! presentation walks invite, propose, request, present, ack. Every
//! message an agent sends or receives lands in that agent's own message
//! log keyed by thread, so a given message kind is only ever found in
//! one agent's log (see [`waci::LOG_OWNERS`]).

pub mod config;
pub mod constants;
pub mod error;
pub mod types;
pub mod waci;

// Re-exports for convenience
pub use config::*;
pub use constants::*;
pub use error::*;
pub use types::*;
pub use waci::*;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
