//! # Configuration for the WACI Exchange Service
//!
//! This module handles configuration loading and validation,
//! supporting environment variables with sensible defaults.

use crate::constants::*;
use crate::error::{ExchangeError, ExchangeResult};
use crate::types::AgentType;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

// =============================================================================
// EXCHANGE SERVICE CONFIGURATION
// =============================================================================

/// Configuration for the exchange service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    /// DID registry and method settings
    pub registry: RegistryConfig,

    /// Decentralized Web Node endpoint registered in created DIDs
    pub dwn_url: String,

    /// Agent storage settings
    pub storage: StorageConfig,

    /// API server configuration
    pub api: ApiConfig,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            registry: RegistryConfig::default(),
            dwn_url: DEFAULT_DWN_URL.into(),
            storage: StorageConfig::default(),
            api: ApiConfig::default(),
        }
    }
}

impl ExchangeConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> ExchangeResult<Self> {
        let mut config = Self::default();

        if let Ok(root) = env::var(ENV_STORAGE_ROOT) {
            config.storage.root = PathBuf::from(root);
        }

        if let Ok(url) = env::var(ENV_REGISTRY_URL) {
            config.registry.url = url;
        }

        if let Ok(url) = env::var(ENV_DWN_URL) {
            config.dwn_url = url;
        }

        if let Ok(method) = env::var(ENV_DID_METHOD) {
            config.registry.did_method = method;
        }

        if let Ok(host) = env::var(ENV_API_HOST) {
            config.api.host = host;
        }

        if let Ok(port) = env::var(ENV_API_PORT) {
            config.api.port = port.parse().map_err(|_| {
                ExchangeError::ConfigurationError(format!("{ENV_API_PORT} is not a valid port"))
            })?;
        }

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> ExchangeResult<()> {
        self.registry.validate()?;

        if self.dwn_url.is_empty() {
            return Err(ExchangeError::ConfigurationError(
                "DWN endpoint must not be empty".into(),
            ));
        }

        self.storage.validate()?;

        Ok(())
    }
}

// =============================================================================
// REGISTRY CONFIGURATION
// =============================================================================

/// DID registry and method configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Sidetree-style registry endpoint used to anchor DIDs
    pub url: String,

    /// DID method for created identifiers (e.g., "did:quarkid:matic")
    pub did_method: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_REGISTRY_URL.into(),
            did_method: DEFAULT_DID_METHOD.into(),
        }
    }
}

impl RegistryConfig {
    /// Validate registry configuration
    pub fn validate(&self) -> ExchangeResult<()> {
        if self.url.is_empty() {
            return Err(ExchangeError::ConfigurationError(
                "registry endpoint must not be empty".into(),
            ));
        }

        if !self.did_method.starts_with("did:") {
            return Err(ExchangeError::ConfigurationError(format!(
                "DID method must start with 'did:', got '{}'",
                self.did_method
            )));
        }

        Ok(())
    }
}

// =============================================================================
// STORAGE CONFIGURATION
// =============================================================================

/// Agent storage configuration.
///
/// All agent state lives in flat JSON files under `root`, named by
/// agent type prefix. Presence of any file with an agent's prefix is
/// what marks the agent as provisioned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding all agent files
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_STORAGE_ROOT),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration
    pub fn validate(&self) -> ExchangeResult<()> {
        if self.root.as_os_str().is_empty() {
            return Err(ExchangeError::ConfigurationError(
                "storage root must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Path of an agent's identity state file
    pub fn identity_store_path(&self, agent_type: AgentType) -> PathBuf {
        self.root.join(identity_store_file(agent_type.as_str()))
    }

    /// Path of an agent's key material file
    pub fn secure_store_path(&self, agent_type: AgentType) -> PathBuf {
        self.root.join(secure_store_file(agent_type.as_str()))
    }

    /// Path of an agent's credential store file
    pub fn vc_store_path(&self, agent_type: AgentType) -> PathBuf {
        self.root.join(vc_store_file(agent_type.as_str()))
    }

    /// Path of an agent's DIDComm message log
    pub fn message_log_path(&self, agent_type: AgentType) -> PathBuf {
        self.root.join(message_log_file(agent_type.as_str()))
    }
}

// =============================================================================
// API CONFIGURATION
// =============================================================================

/// API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Enable CORS
    pub enable_cors: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_API_HOST.into(),
            port: EXCHANGE_SERVICE_PORT,
            enable_cors: true,
        }
    }
}

impl ApiConfig {
    /// Get the bind address
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ExchangeConfig::default();
        assert_eq!(config.registry.did_method, DEFAULT_DID_METHOD);
        assert_eq!(config.storage.root, PathBuf::from(DEFAULT_STORAGE_ROOT));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_api_bind_addr() {
        let config = ApiConfig::default();
        assert_eq!(config.bind_addr(), "0.0.0.0:3000");
    }

    #[test]
    fn test_validate_rejects_bad_did_method() {
        let mut config = ExchangeConfig::default();
        config.registry.did_method = "quarkid".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_registry() {
        let mut config = ExchangeConfig::default();
        config.registry.url = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_storage_paths_follow_agent_prefix() {
        let storage = StorageConfig {
            root: PathBuf::from("/tmp/agents"),
        };

        assert_eq!(
            storage.identity_store_path(AgentType::Issuer),
            PathBuf::from("/tmp/agents/issuer.json")
        );
        assert_eq!(
            storage.message_log_path(AgentType::Holder),
            PathBuf::from("/tmp/agents/holder-waci-storage.json")
        );
        assert_eq!(
            storage.vc_store_path(AgentType::Holder),
            PathBuf::from("/tmp/agents/holder_vc.json")
        );
        assert_eq!(
            storage.secure_store_path(AgentType::Verifier),
            PathBuf::from("/tmp/agents/verifier_secure.json")
        );
    }
}
