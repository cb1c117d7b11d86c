//! # Agent Pool
//!
//! Provisioning and lookup of the exchange agents. The pool builds
//! handles through an [`AgentRuntime`], drives the idempotent
//! initialize-then-anchor lifecycle and answers presence questions from
//! the storage directory itself, so a restarted service picks up agents
//! provisioned by an earlier run.

use std::sync::Arc;

use futures::future::try_join_all;
use tracing::{error, info};

use shared::config::{ExchangeConfig, StorageConfig};
use shared::error::{ExchangeError, ExchangeResult};
use shared::types::{AgentDocument, AgentType};

use crate::runtime::{AgentRuntime, IdentityAgent};

// =============================================================================
// RECORDS
// =============================================================================

/// A built agent handle together with its anchored identifier, if any
#[derive(Clone)]
pub struct AgentRecord {
    pub agent_type: AgentType,
    pub handle: Arc<dyn IdentityAgent>,
    pub did: Option<String>,
}

impl std::fmt::Debug for AgentRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRecord")
            .field("agent_type", &self.agent_type)
            .field("did", &self.did)
            .finish_non_exhaustive()
    }
}

/// What a caller requires of an agent before an exchange step may run
pub struct AgentExpectation {
    pub agent_type: AgentType,
    pub expected_did: Option<String>,
}

impl AgentExpectation {
    /// Require only that the agent has been provisioned
    pub fn present(agent_type: AgentType) -> Self {
        Self {
            agent_type,
            expected_did: None,
        }
    }

    /// Require the agent to operate under a specific identifier
    pub fn with_did(agent_type: AgentType, did: impl Into<String>) -> Self {
        Self {
            agent_type,
            expected_did: Some(did.into()),
        }
    }
}

// =============================================================================
// POOL
// =============================================================================

/// Builds, registers and looks up the exchange agents.
///
/// The pool assumes it is the only writer of the storage root; per-agent
/// files are not locked across processes.
#[derive(Clone)]
pub struct AgentPool {
    runtime: Arc<dyn AgentRuntime>,
    storage: StorageConfig,
    dwn_url: String,
}

impl AgentPool {
    pub fn new(runtime: Arc<dyn AgentRuntime>, config: &ExchangeConfig) -> Self {
        Self {
            runtime,
            storage: config.storage.clone(),
            dwn_url: config.dwn_url.clone(),
        }
    }

    /// Build and initialize one handle per distinct requested role.
    ///
    /// Duplicate roles collapse to a single record; the first failure
    /// aborts the whole batch.
    pub async fn ensure_agents(&self, types: &[AgentType]) -> ExchangeResult<Vec<AgentRecord>> {
        let mut unique = Vec::new();
        for &agent_type in types {
            if !unique.contains(&agent_type) {
                unique.push(agent_type);
            }
        }

        try_join_all(unique.into_iter().map(|agent_type| async move {
            let handle = self.runtime.build_agent(agent_type).await?;

            handle.initialize().await.map_err(|err| {
                error!(agent_type = %agent_type, error = %err, "Agent initialization failed");
                ExchangeError::AgentInitializationFailed(agent_type)
            })?;

            if !handle.is_initialized() {
                return Err(ExchangeError::AgentInitializationFailed(agent_type));
            }

            Ok(AgentRecord {
                agent_type,
                did: handle.operational_did(),
                handle,
            })
        }))
        .await
    }

    /// Anchor an identifier for every record that does not hold one yet.
    ///
    /// Creation is asynchronous on the agent side, so each pending record
    /// subscribes to the completion event before requesting creation.
    /// Records that already carry an identifier pass through untouched,
    /// which is what makes repeated registration idempotent.
    pub async fn register_identifiers(
        &self,
        records: Vec<AgentRecord>,
    ) -> ExchangeResult<Vec<AgentRecord>> {
        try_join_all(records.into_iter().map(|record| async move {
            if record.did.is_some() {
                return Ok(record);
            }

            let created = record.handle.on_did_created();
            record.handle.create_did(&self.dwn_url).await?;

            let event = created
                .await
                .map_err(|_| ExchangeError::IdentifierCreationFailed {
                    agent_type: record.agent_type,
                    reason: "identifier creation channel closed".into(),
                })?;

            match event.did {
                Some(did) => {
                    info!(agent_type = %record.agent_type, did = %did, "Identifier registered");
                    Ok(AgentRecord {
                        did: Some(did),
                        ..record
                    })
                }
                None => Err(ExchangeError::IdentifierCreationFailed {
                    agent_type: record.agent_type,
                    reason: "agent reported no identifier".into(),
                }),
            }
        }))
        .await
    }

    /// Load agents for an exchange step, checking each caller expectation.
    ///
    /// Every expected agent must already be provisioned; where an
    /// expectation names an identifier, the agent must operate under
    /// exactly that identifier.
    pub async fn verify_agents(
        &self,
        expectations: &[AgentExpectation],
    ) -> ExchangeResult<Vec<AgentRecord>> {
        for expectation in expectations {
            if !self.is_agent_present(expectation.agent_type).await? {
                return Err(ExchangeError::AgentNotFound(expectation.agent_type));
            }
        }

        let types: Vec<AgentType> = expectations.iter().map(|e| e.agent_type).collect();
        let records = self.ensure_agents(&types).await?;

        for expectation in expectations {
            let Some(expected) = &expectation.expected_did else {
                continue;
            };

            let actual = records
                .iter()
                .find(|record| record.agent_type == expectation.agent_type)
                .and_then(|record| record.did.as_deref());

            if actual != Some(expected.as_str()) {
                return Err(ExchangeError::IdentifierMismatch {
                    agent_type: expectation.agent_type,
                });
            }
        }

        Ok(records)
    }

    /// Provision agents end to end and return their resolved documents
    pub async fn create(&self, types: &[AgentType]) -> ExchangeResult<Vec<AgentDocument>> {
        let records = self.ensure_agents(types).await?;
        let records = self.register_identifiers(records).await?;

        info!(count = records.len(), "Agents provisioned");
        self.resolve_documents(&records).await
    }

    /// Resolved documents of every provisioned agent.
    ///
    /// Agents present in storage but interrupted before anchoring get
    /// their registration finished here.
    pub async fn find_all(&self) -> ExchangeResult<Vec<AgentDocument>> {
        let mut present = Vec::new();
        for agent_type in AgentType::ALL {
            if self.is_agent_present(agent_type).await? {
                present.push(agent_type);
            }
        }

        if present.is_empty() {
            return Ok(Vec::new());
        }

        let records = self.ensure_agents(&present).await?;
        let records = self.register_identifiers(records).await?;
        self.resolve_documents(&records).await
    }

    /// Resolved document of one provisioned agent
    pub async fn find_by_type(&self, agent_type: AgentType) -> ExchangeResult<AgentDocument> {
        if !self.is_agent_present(agent_type).await? {
            return Err(ExchangeError::AgentNotFound(agent_type));
        }

        let records = self.ensure_agents(&[agent_type]).await?;
        let records = self.register_identifiers(records).await?;

        self.resolve_documents(&records)
            .await?
            .into_iter()
            .next()
            .ok_or(ExchangeError::AgentNotFound(agent_type))
    }

    /// Resolve the DID Document of every record holding an identifier
    pub async fn resolve_documents(
        &self,
        records: &[AgentRecord],
    ) -> ExchangeResult<Vec<AgentDocument>> {
        try_join_all(records.iter().filter_map(|record| {
            let did = record.did.clone()?;
            Some(async move {
                let did_document = record.handle.resolve(&did).await?;
                Ok(AgentDocument {
                    agent_type: record.agent_type,
                    did_document,
                })
            })
        }))
        .await
    }

    /// Whether any storage file carries this agent's prefix
    pub async fn is_agent_present(&self, agent_type: AgentType) -> ExchangeResult<bool> {
        let mut entries = match tokio::fs::read_dir(&self.storage.root).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(err) => return Err(err.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            if entry
                .file_name()
                .to_string_lossy()
                .starts_with(agent_type.as_str())
            {
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Delete every storage file of one agent
    pub async fn remove(&self, agent_type: AgentType) -> ExchangeResult<()> {
        if !self.is_agent_present(agent_type).await? {
            return Err(ExchangeError::AgentNotFound(agent_type));
        }

        let paths = [
            self.storage.identity_store_path(agent_type),
            self.storage.secure_store_path(agent_type),
            self.storage.vc_store_path(agent_type),
            self.storage.message_log_path(agent_type),
        ];

        for path in paths {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => {
                    error!(path = %path.display(), error = %err, "Failed to remove agent file");
                }
            }
        }

        info!(agent_type = %agent_type, "Agent removed");
        Ok(())
    }

    /// Delete every provisioned agent, returning how many were removed
    pub async fn remove_all(&self) -> ExchangeResult<usize> {
        let mut removed = 0;
        for agent_type in AgentType::ALL {
            if self.is_agent_present(agent_type).await? {
                self.remove(agent_type).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::testkit::FakeRuntime;
    use std::path::Path;
    use tempfile::tempdir;

    fn test_pool(root: &Path) -> (Arc<FakeRuntime>, AgentPool) {
        let mut config = ExchangeConfig::default();
        config.storage.root = root.to_path_buf();

        let runtime = Arc::new(FakeRuntime::new());
        let pool = AgentPool::new(Arc::clone(&runtime) as Arc<dyn AgentRuntime>, &config);
        (runtime, pool)
    }

    fn seed_agent_file(root: &Path, name: &str) {
        std::fs::write(root.join(name), "{}").unwrap();
    }

    #[tokio::test]
    async fn test_ensure_collapses_duplicate_roles() {
        let dir = tempdir().unwrap();
        let (_, pool) = test_pool(dir.path());

        let records = pool
            .ensure_agents(&[AgentType::Issuer, AgentType::Issuer, AgentType::Holder])
            .await
            .unwrap();

        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.handle.is_initialized()));
    }

    #[tokio::test]
    async fn test_ensure_maps_initialization_failure() {
        let dir = tempdir().unwrap();
        let (runtime, pool) = test_pool(dir.path());

        runtime.agent(AgentType::Verifier).set_fail_initialize(true);

        let err = pool.ensure_agents(&[AgentType::Verifier]).await.unwrap_err();
        assert!(matches!(
            err,
            ExchangeError::AgentInitializationFailed(AgentType::Verifier)
        ));
    }

    #[tokio::test]
    async fn test_register_creates_identifier_only_when_missing() {
        let dir = tempdir().unwrap();
        let (runtime, pool) = test_pool(dir.path());

        runtime.agent(AgentType::Issuer).set_did("did:fake:anchored");

        let records = pool
            .ensure_agents(&[AgentType::Issuer, AgentType::Holder])
            .await
            .unwrap();
        let records = pool.register_identifiers(records).await.unwrap();

        assert!(records.iter().all(|r| r.did.is_some()));
        assert_eq!(runtime.agent(AgentType::Issuer).create_call_count(), 0);
        assert_eq!(runtime.agent(AgentType::Holder).create_call_count(), 1);

        // A second pass finds both identifiers in place and creates nothing.
        let records = pool
            .ensure_agents(&[AgentType::Issuer, AgentType::Holder])
            .await
            .unwrap();
        pool.register_identifiers(records).await.unwrap();
        assert_eq!(runtime.agent(AgentType::Holder).create_call_count(), 1);
    }

    #[tokio::test]
    async fn test_register_fails_when_creation_yields_no_did() {
        let dir = tempdir().unwrap();
        let (runtime, pool) = test_pool(dir.path());

        runtime
            .agent(AgentType::Holder)
            .set_creation_yields_did(false);

        let records = pool.ensure_agents(&[AgentType::Holder]).await.unwrap();
        let err = pool.register_identifiers(records).await.unwrap_err();

        assert!(matches!(
            err,
            ExchangeError::IdentifierCreationFailed {
                agent_type: AgentType::Holder,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_verify_requires_presence() {
        let dir = tempdir().unwrap();
        let (_, pool) = test_pool(dir.path());

        let err = pool
            .verify_agents(&[AgentExpectation::present(AgentType::Issuer)])
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::AgentNotFound(AgentType::Issuer)));
    }

    #[tokio::test]
    async fn test_verify_checks_expected_identifier() {
        let dir = tempdir().unwrap();
        let (runtime, pool) = test_pool(dir.path());

        seed_agent_file(dir.path(), "issuer.json");
        seed_agent_file(dir.path(), "holder.json");
        runtime.agent(AgentType::Issuer).set_did("did:fake:issuer-a");

        let err = pool
            .verify_agents(&[AgentExpectation::with_did(
                AgentType::Issuer,
                "did:fake:issuer-b",
            )])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ExchangeError::IdentifierMismatch {
                agent_type: AgentType::Issuer
            }
        ));

        // Matching identifier passes; an expectation without one only
        // needs the agent to be present.
        let records = pool
            .verify_agents(&[
                AgentExpectation::with_did(AgentType::Issuer, "did:fake:issuer-a"),
                AgentExpectation::present(AgentType::Holder),
            ])
            .await
            .unwrap();
        assert_eq!(records.len(), 2);
    }

    #[tokio::test]
    async fn test_find_all_lists_only_present_agents() {
        let dir = tempdir().unwrap();
        let (_, pool) = test_pool(dir.path());

        assert!(pool.find_all().await.unwrap().is_empty());

        seed_agent_file(dir.path(), "issuer.json");
        seed_agent_file(dir.path(), "holder_vc.json");

        let documents = pool.find_all().await.unwrap();
        let types: Vec<_> = documents.iter().map(|d| d.agent_type).collect();
        assert_eq!(types, [AgentType::Issuer, AgentType::Holder]);
        assert!(documents.iter().all(|d| d.did_document.id.starts_with("did:fake:")));
    }

    #[tokio::test]
    async fn test_find_by_type_absent_agent_is_not_found() {
        let dir = tempdir().unwrap();
        let (_, pool) = test_pool(dir.path());

        let err = pool.find_by_type(AgentType::Verifier).await.unwrap_err();
        assert!(matches!(err, ExchangeError::AgentNotFound(AgentType::Verifier)));
    }

    #[tokio::test]
    async fn test_remove_clears_only_that_agents_files() {
        let dir = tempdir().unwrap();
        let (_, pool) = test_pool(dir.path());

        for name in [
            "issuer.json",
            "issuer_secure.json",
            "issuer_vc.json",
            "issuer-waci-storage.json",
            "holder.json",
        ] {
            seed_agent_file(dir.path(), name);
        }

        pool.remove(AgentType::Issuer).await.unwrap();

        assert!(!pool.is_agent_present(AgentType::Issuer).await.unwrap());
        assert!(pool.is_agent_present(AgentType::Holder).await.unwrap());
    }

    #[tokio::test]
    async fn test_remove_all_reports_count() {
        let dir = tempdir().unwrap();
        let (_, pool) = test_pool(dir.path());

        seed_agent_file(dir.path(), "issuer.json");
        seed_agent_file(dir.path(), "verifier.json");

        assert_eq!(pool.remove_all().await.unwrap(), 2);
        assert_eq!(pool.remove_all().await.unwrap(), 0);
    }
}
