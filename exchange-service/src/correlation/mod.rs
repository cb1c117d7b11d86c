//! # Message Correlation
//!
//! Retrieval of individual exchange messages out of the per-agent
//! DIDComm logs. Each searchable message kind is recorded by exactly
//! one party, so a lookup first routes to the owning log and then
//! searches the thread the caller names.

use tracing::{error, warn};

use shared::config::{ExchangeConfig, StorageConfig};
use shared::error::{ExchangeError, ExchangeResult};
use shared::types::AgentType;
use shared::waci::{MessageKind, MessageLog, WaciMessage};

/// Looks up exchange messages in the per-agent logs
#[derive(Clone)]
pub struct MessageCorrelator {
    storage: StorageConfig,
}

impl MessageCorrelator {
    pub fn new(config: &ExchangeConfig) -> Self {
        Self {
            storage: config.storage.clone(),
        }
    }

    /// Look up one exchange message by kind and thread key.
    ///
    /// Proposals are addressed by the id of the invitation they answer
    /// (their `pthid`); every other kind by its thread id. An
    /// unavailable or unreadable log reads as absent.
    pub async fn find(&self, kind: MessageKind, thread_key: &str) -> Option<WaciMessage> {
        let Some(owner) = kind.log_owner() else {
            warn!(kind = %kind, "Message kind is not recorded in any agent log");
            return None;
        };

        self.find_in_log(owner, kind, thread_key).await
    }

    async fn find_in_log(
        &self,
        owner: AgentType,
        kind: MessageKind,
        thread_key: &str,
    ) -> Option<WaciMessage> {
        let log = match self.load_log(owner).await {
            Ok(log) => log,
            Err(err) => {
                error!(owner = %owner, error = %err, "Message log unavailable");
                return None;
            }
        };

        if kind.is_proposal() {
            // A proposal opens its own thread, so the invitation id it
            // answers is only searchable in the most recently recorded
            // thread.
            return log.values().last().and_then(|thread| {
                thread
                    .iter()
                    .filter(|m| m.is_kind(kind) && m.pthid.as_deref() == Some(thread_key))
                    .last()
                    .cloned()
            });
        }

        log.get(thread_key)
            .and_then(|thread| thread.iter().find(|m| m.is_kind(kind)).cloned())
    }

    async fn load_log(&self, owner: AgentType) -> ExchangeResult<MessageLog> {
        let path = self.storage.message_log_path(owner);
        if !path.exists() {
            return Ok(MessageLog::default());
        }

        let raw = tokio::fs::read_to_string(&path).await.map_err(|err| {
            ExchangeError::StorageUnavailable {
                agent_type: owner,
                reason: err.to_string(),
            }
        })?;

        serde_json::from_str(&raw).map_err(|err| ExchangeError::StorageUnavailable {
            agent_type: owner,
            reason: err.to_string(),
        })
    }
}
