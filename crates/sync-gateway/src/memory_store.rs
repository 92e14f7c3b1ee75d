//! In-memory sync store

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use sync_policy_core::prelude::*;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Default)]
struct State {
    documents: HashMap<String, StoredRevision>,
    access: HashMap<String, BTreeSet<Channel>>,
}

/// Store backed by process memory
///
/// A single lock covers documents and grants, so every commit is applied
/// as one unit.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents, tombstones included
    pub async fn len(&self) -> usize {
        self.state.read().await.documents.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.documents.is_empty()
    }
}

#[async_trait]
impl SyncStore for MemoryStore {
    async fn get(&self, doc_id: &str) -> Result<Option<StoredRevision>> {
        Ok(self.state.read().await.documents.get(doc_id).cloned())
    }

    async fn commit(&self, commit: Commit) -> Result<u64> {
        let mut state = self.state.write().await;

        let generation = state
            .documents
            .get(&commit.doc_id)
            .map_or(1, |current| current.generation + 1);

        for grant in &commit.grants {
            state
                .access
                .entry(grant.principal.clone())
                .or_default()
                .insert(grant.channel.clone());
        }

        debug!(
            doc_id = %commit.doc_id,
            generation,
            channels = commit.channels.len(),
            grants = commit.grants.len(),
            "Committed revision"
        );

        state.documents.insert(
            commit.doc_id,
            StoredRevision {
                generation,
                body: commit.body,
                channels: commit.channels,
            },
        );

        Ok(generation)
    }

    async fn channels_for(&self, principal: &str) -> Result<BTreeSet<Channel>> {
        Ok(self
            .state
            .read()
            .await
            .access
            .get(principal)
            .cloned()
            .unwrap_or_default())
    }

    fn name(&self) -> &'static str {
        "memory_store"
    }
}

#[async_trait]
impl HealthCheck for MemoryStore {
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    fn component_name(&self) -> &'static str {
        "memory_store"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_commit_bumps_generation_and_grants() {
        let store = MemoryStore::new();
        let channel = Channel::for_owner("u1");
        let commit = Commit {
            doc_id: "report::1".into(),
            body: Document::new().with("documentType", "report").with("createdBy", "u1"),
            channels: BTreeSet::from([channel.clone()]),
            grants: vec![AccessGrant::new("u1", channel.clone())],
        };

        assert_eq!(store.commit(commit.clone()).await.unwrap(), 1);
        assert_eq!(store.commit(commit).await.unwrap(), 2);

        let stored = store.get("report::1").await.unwrap().unwrap();
        assert_eq!(stored.generation, 2);
        assert!(!stored.is_deleted());
        assert_eq!(store.channels_for("u1").await.unwrap(), BTreeSet::from([channel]));
        assert!(store.channels_for("u2").await.unwrap().is_empty());
        assert!(store.get("report::2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_health_check_through_store_trait() {
        let store: Arc<dyn SyncStore> = Arc::new(MemoryStore::new());
        assert!(store.health_check().await.is_ok());
        assert_eq!(store.component_name(), "memory_store");
    }
}
