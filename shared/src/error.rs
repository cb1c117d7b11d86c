//! # Error Types for the WACI Exchange Service
//!
//! This module defines all error types used throughout the system,
//! providing detailed error information for debugging and logging.

use thiserror::Error;

use crate::types::AgentType;

/// Main error type for the entire system
#[derive(Error, Debug)]
pub enum ExchangeError {
    // =========================================================================
    // AGENT LIFECYCLE ERRORS
    // =========================================================================

    /// The agent was never provisioned (no file with its prefix in storage)
    #[error("Agent not found: {0}")]
    AgentNotFound(AgentType),

    /// The agent reported an initialization failure
    #[error("Agent failed to initialize: {0}")]
    AgentInitializationFailed(AgentType),

    /// DID creation did not produce an identifier
    #[error("Failed to create identifier for {agent_type}: {reason}")]
    IdentifierCreationFailed {
        agent_type: AgentType,
        reason: String,
    },

    /// The agent's operational DID does not match the one named in the request
    #[error("Agent identifier mismatch for {agent_type}")]
    IdentifierMismatch { agent_type: AgentType },

    // =========================================================================
    // DID RESOLUTION ERRORS
    // =========================================================================

    /// Error resolving a DID into its document
    #[error("Failed to resolve DID '{did}': {reason}")]
    DidResolutionFailed { did: String, reason: String },

    // =========================================================================
    // MESSAGE STORAGE ERRORS
    // =========================================================================

    /// The agent's message log could not be read or parsed
    #[error("Message log unavailable for {agent_type}: {reason}")]
    StorageUnavailable {
        agent_type: AgentType,
        reason: String,
    },

    // =========================================================================
    // PRESENTATION ERRORS
    // =========================================================================

    /// Credential or proof verification failed during a presentation
    #[error("Presentation rejected: credential or proof verification failed")]
    PresentationInvalid,

    // =========================================================================
    // API ERRORS
    // =========================================================================

    /// Invalid request format
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // =========================================================================
    // CONFIGURATION ERRORS
    // =========================================================================

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    // =========================================================================
    // GENERIC ERRORS
    // =========================================================================

    /// Failed to read/write a file
    #[error("Storage I/O error: {0}")]
    StorageIo(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using ExchangeError
pub type ExchangeResult<T> = Result<T, ExchangeError>;

// =============================================================================
// ERROR CONVERSIONS
// =============================================================================

impl From<std::io::Error> for ExchangeError {
    fn from(err: std::io::Error) -> Self {
        ExchangeError::StorageIo(err.to_string())
    }
}

impl From<serde_json::Error> for ExchangeError {
    fn from(err: serde_json::Error) -> Self {
        ExchangeError::Serialization(err.to_string())
    }
}

// =============================================================================
// ERROR CATEGORIES (for logging)
// =============================================================================

impl ExchangeError {
    /// Get the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            ExchangeError::AgentNotFound(_)
            | ExchangeError::AgentInitializationFailed(_) => "agent",

            ExchangeError::IdentifierCreationFailed { .. }
            | ExchangeError::IdentifierMismatch { .. }
            | ExchangeError::DidResolutionFailed { .. } => "identifier",

            ExchangeError::StorageUnavailable { .. }
            | ExchangeError::StorageIo(_) => "storage",

            ExchangeError::PresentationInvalid => "presentation",

            ExchangeError::InvalidRequest(_) => "request",

            ExchangeError::ConfigurationError(_) => "config",

            ExchangeError::Serialization(_)
            | ExchangeError::Internal(_) => "internal",
        }
    }

    /// Check if the error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExchangeError::StorageUnavailable { .. }
                | ExchangeError::StorageIo(_)
                | ExchangeError::DidResolutionFailed { .. }
        )
    }
}
