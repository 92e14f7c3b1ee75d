//! # Sync Gateway
//!
//! Write path of the expense reporting sync gateway. Every proposed revision
//! from a mobile client or replicator passes through here:
//!
//! 1. commits to the same document are serialized
//! 2. the previous revision is loaded from the store
//! 3. the sync policy evaluates the write
//! 4. accepted writes are stored together with their channels and grants;
//!    rejected writes are logged and returned to the writer with the reason
//!
//! ## Usage
//!
//! ```rust,ignore
//! let gateway = WriteGateway::new(Arc::new(MemoryStore::new()), &GatewayConfig::default());
//! let receipt = gateway.commit(WriteRequest::upsert("report::1", body)).await?;
//! ```

pub mod admin_api;
pub mod locks;
pub mod memory_store;
pub mod rejection_log;

pub use admin_api::*;
pub use locks::*;
pub use memory_store::*;
pub use rejection_log::*;

use futures::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use sync_policy_core::config::CommitConfig;
use sync_policy_core::prelude::*;
use sync_policy_core::{
    effective_type, fields, is_deletion, time_operation, DocumentFamily, ErrorContext,
    ErrorContextExt, GatewayMetrics, LatencyTimer, PolicyMetrics,
};
use tracing::{debug, info, warn};

/// Result of an accepted write
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommitReceipt {
    pub doc_id: String,
    pub generation: u64,
    pub decision: Decision,
}

/// Gateway statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GatewayStats {
    pub evaluated: u64,
    pub accepted: u64,
    pub rejected: u64,
    pub committed: u64,
}

/// Hosts the sync policy on the write path
pub struct WriteGateway {
    policy: Arc<dyn SyncPolicy>,
    store: Arc<dyn SyncStore>,
    locks: DocumentLocks,
    rejections: RejectionLog,
    config: CommitConfig,
    policy_metrics: PolicyMetrics,
    metrics: GatewayMetrics,
    evaluated: AtomicU64,
    accepted: AtomicU64,
    rejected: AtomicU64,
    committed: AtomicU64,
}

impl WriteGateway {
    /// Create a gateway running the expense policy
    pub fn new(store: Arc<dyn SyncStore>, config: &GatewayConfig) -> Self {
        Self::with_policy(Arc::new(ExpensePolicy::from_config(&config.policy)), store, config)
    }

    /// Create a gateway running an arbitrary policy
    pub fn with_policy(
        policy: Arc<dyn SyncPolicy>,
        store: Arc<dyn SyncStore>,
        config: &GatewayConfig,
    ) -> Self {
        let (policy_metrics, metrics) = if config.observability.metrics.enabled {
            (PolicyMetrics::new(policy.name()), GatewayMetrics::new("sync_gateway"))
        } else {
            (PolicyMetrics::disabled(), GatewayMetrics::disabled())
        };

        info!(policy = policy.name(), store = store.name(), "Write gateway created");

        Self {
            policy,
            store,
            locks: DocumentLocks::new(),
            rejections: RejectionLog::new(config.gateway.rejection_log_size),
            config: config.gateway.clone(),
            policy_metrics,
            metrics,
            evaluated: AtomicU64::new(0),
            accepted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            committed: AtomicU64::new(0),
        }
    }

    /// Commit one proposed revision
    ///
    /// Rejections come back as [`GatewayError::Forbidden`] carrying the
    /// policy's reason verbatim; nothing is stored for them.
    pub async fn commit(&self, request: WriteRequest) -> Result<CommitReceipt> {
        let doc_id = request.doc_id.clone();
        let _timer = LatencyTimer::start(|d| self.metrics.record_commit_latency(d));
        let limit = self.config.commit_timeout;

        let result = match tokio::time::timeout(limit, self.commit_serialized(request)).await {
            Ok(result) => result,
            Err(_) => {
                self.metrics.record_commit("timeout");
                Err(GatewayError::timeout(
                    format!("commit {doc_id}"),
                    limit.as_millis() as u64,
                ))
            }
        };

        result.with_context(ErrorContext::new("gateway", "commit").with_document(doc_id))
    }

    async fn commit_serialized(&self, request: WriteRequest) -> Result<CommitReceipt> {
        let _guard = self.locks.lock(&request.doc_id).await;

        let previous = self.store.get(&request.doc_id).await?;
        let is_delete = request.is_delete();
        let decision = self.evaluate(&request.body, previous.as_ref().map(|r| &r.body), is_delete);

        let (channels, grants) = match decision.clone().into_result() {
            Ok(parts) => parts,
            Err(forbidden) => {
                warn!(
                    doc_id = %request.doc_id,
                    request_id = %request.metadata.request_id,
                    source = %request.metadata.source,
                    reason = %forbidden,
                    "Write rejected"
                );
                self.rejections.record(&request, &forbidden).await;
                self.metrics.set_rejection_log_size(self.rejections.len().await);
                self.metrics.record_commit("rejected");
                return Err(forbidden.into());
            }
        };

        let WriteRequest { doc_id, mut body, .. } = request;
        if is_delete {
            body.insert(fields::DELETED, true);
        }

        let generation = match self
            .store
            .commit(Commit {
                doc_id: doc_id.clone(),
                body,
                channels,
                grants,
            })
            .await
        {
            Ok(generation) => generation,
            Err(e) => {
                self.metrics.record_commit("failed");
                return Err(e);
            }
        };

        self.committed.fetch_add(1, Ordering::Relaxed);
        self.metrics.record_commit("accepted");
        debug!(doc_id = %doc_id, generation, is_delete, "Write committed");

        Ok(CommitReceipt {
            doc_id,
            generation,
            decision,
        })
    }

    /// Commit many revisions, bulk-docs style
    ///
    /// Requests for the same document apply in submission order; distinct
    /// documents proceed concurrently. One result per request, in order.
    pub async fn commit_batch(
        &self,
        requests: Vec<WriteRequest>,
    ) -> Result<Vec<Result<CommitReceipt>>> {
        if requests.len() > self.config.max_batch_size {
            return Err(GatewayError::config(format!(
                "batch of {} exceeds max_batch_size {}",
                requests.len(),
                self.config.max_batch_size
            )));
        }

        let total = requests.len();
        let mut groups: Vec<Vec<(usize, WriteRequest)>> = Vec::new();
        let mut group_of: HashMap<String, usize> = HashMap::new();
        for (position, request) in requests.into_iter().enumerate() {
            let group = *group_of.entry(request.doc_id.clone()).or_insert_with(|| {
                groups.push(Vec::new());
                groups.len() - 1
            });
            groups[group].push((position, request));
        }

        let runs = groups.into_iter().map(|group| async move {
            let mut results = Vec::with_capacity(group.len());
            for (position, request) in group {
                results.push((position, self.commit(request).await));
            }
            results
        });

        let mut ordered: Vec<Option<Result<CommitReceipt>>> = (0..total).map(|_| None).collect();
        for (position, result) in join_all(runs).await.into_iter().flatten() {
            ordered[position] = Some(result);
        }

        Ok(ordered
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| Err(GatewayError::Internal("missing batch result".into())))
            })
            .collect())
    }

    /// Evaluate without storing anything
    pub fn dry_run(&self, proposed: &Document, previous: Option<&Document>, is_delete: bool) -> Decision {
        self.evaluate(proposed, previous, is_delete)
    }

    fn evaluate(&self, proposed: &Document, previous: Option<&Document>, is_delete: bool) -> Decision {
        let decision = time_operation!(
            self.policy_metrics,
            record_latency,
            self.policy.evaluate(proposed, previous, is_delete)
        );

        let family = self.family_label(proposed, previous, is_delete);

        self.evaluated.fetch_add(1, Ordering::Relaxed);
        self.policy_metrics.record_evaluation(family, decision.outcome());
        match decision.rejection() {
            Some(forbidden) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                self.policy_metrics.record_rejection(forbidden.field());
            }
            None => {
                self.accepted.fetch_add(1, Ordering::Relaxed);
            }
        }

        debug!(
            policy = self.policy.name(),
            family,
            is_delete,
            outcome = decision.outcome(),
            "Evaluated revision"
        );
        decision
    }

    /// Metrics label for the family the policy classified the write into
    fn family_label(&self, proposed: &Document, previous: Option<&Document>, is_delete: bool) -> &'static str {
        let is_delete = is_deletion(proposed, is_delete);
        match effective_type(proposed, previous, is_delete, self.policy.emptiness()) {
            Some(document_type) => match DocumentFamily::classify(&document_type) {
                DocumentFamily::Manager => "manager",
                DocumentFamily::User => "user",
                DocumentFamily::Owned(_) => "owned",
            },
            None => "untyped",
        }
    }

    /// Whether `principal` may read the current revision of `doc_id`
    pub async fn visible_to(&self, principal: &str, doc_id: &str) -> Result<bool> {
        let Some(revision) = self.store.get(doc_id).await? else {
            return Ok(false);
        };
        if revision.channels.iter().any(Channel::is_wildcard) {
            return Ok(true);
        }
        let granted = self.store.channels_for(principal).await?;
        Ok(revision.channels.iter().any(|c| granted.contains(c)))
    }

    /// Recently rejected writes, newest first
    pub async fn recent_rejections(&self, count: usize) -> Vec<RejectionEntry> {
        self.rejections.recent(count).await
    }

    /// Empty the rejection log, returning its entries oldest first
    pub async fn drain_rejections(&self) -> Vec<RejectionEntry> {
        let drained = self.rejections.drain().await;
        self.metrics.set_rejection_log_size(0);
        drained
    }

    /// Get statistics
    pub fn stats(&self) -> GatewayStats {
        GatewayStats {
            evaluated: self.evaluated.load(Ordering::Relaxed),
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            committed: self.committed.load(Ordering::Relaxed),
        }
    }

    /// Name of the hosted policy
    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }
}

#[async_trait::async_trait]
impl HealthCheck for WriteGateway {
    async fn health_check(&self) -> Result<()> {
        let limit = self.config.commit_timeout;
        match tokio::time::timeout(limit, self.store.health_check()).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::timeout(
                format!("{} health check", self.store.component_name()),
                limit.as_millis() as u64,
            )),
        }
    }

    fn component_name(&self) -> &'static str {
        "write_gateway"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn gateway() -> (WriteGateway, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (WriteGateway::new(store.clone(), &GatewayConfig::default()), store)
    }

    fn body(value: serde_json::Value) -> Document {
        Document::try_from(value).unwrap()
    }

    fn reason(result: Result<CommitReceipt>) -> String {
        match result {
            Err(GatewayError::Forbidden(forbidden)) => forbidden.reason,
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_report_create_then_reassign() {
        let (gateway, store) = gateway();

        let receipt = gateway
            .commit(WriteRequest::upsert(
                "report::1",
                body(json!({"documentType": "report", "createdBy": "u1"})),
            ))
            .await
            .unwrap();
        assert_eq!(receipt.generation, 1);
        assert_eq!(receipt.decision, Decision::owned_by("u1"));

        let result = gateway
            .commit(WriteRequest::upsert(
                "report::1",
                body(json!({"documentType": "report", "createdBy": "u2"})),
            ))
            .await;
        assert_eq!(reason(result), "createdBy is read-only.");

        // The rejected revision never reached the store
        let stored = store.get("report::1").await.unwrap().unwrap();
        assert_eq!(stored.generation, 1);
        assert_eq!(stored.body.get_str("createdBy"), Some("u1"));

        let rejections = gateway.recent_rejections(5).await;
        assert_eq!(rejections.len(), 1);
        assert_eq!(rejections[0].reason, "createdBy is read-only.");

        assert_eq!(
            gateway.stats(),
            GatewayStats {
                evaluated: 2,
                accepted: 1,
                rejected: 1,
                committed: 1
            }
        );
    }

    #[tokio::test]
    async fn test_grants_control_visibility() {
        let (gateway, _store) = gateway();

        gateway
            .commit(WriteRequest::upsert(
                "user::a",
                body(json!({"documentType": "user", "email": "a@x.com"})),
            ))
            .await
            .unwrap();
        gateway
            .commit(WriteRequest::upsert(
                "manager::1",
                body(json!({"documentType": "manager", "email": "boss@x.com"})),
            ))
            .await
            .unwrap();

        assert!(gateway.visible_to("a@x.com", "user::a").await.unwrap());
        assert!(!gateway.visible_to("b@x.com", "user::a").await.unwrap());
        assert!(gateway.visible_to("b@x.com", "manager::1").await.unwrap());
        assert!(!gateway.visible_to("a@x.com", "missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_then_recreate() {
        let (gateway, store) = gateway();

        gateway
            .commit(WriteRequest::upsert(
                "expense::1",
                body(json!({"documentType": "expense", "createdBy": "u1", "amount": 10.0})),
            ))
            .await
            .unwrap();

        let receipt = gateway.commit(WriteRequest::delete("expense::1")).await.unwrap();
        assert_eq!(receipt.generation, 2);
        assert_eq!(receipt.decision, Decision::pass_through());

        let tombstone = store.get("expense::1").await.unwrap().unwrap();
        assert!(tombstone.is_deleted());

        // A tombstone is no previous revision: a new owner may recreate the id
        let receipt = gateway
            .commit(WriteRequest::upsert(
                "expense::1",
                body(json!({"documentType": "expense", "createdBy": "u2"})),
            ))
            .await
            .unwrap();
        assert_eq!(receipt.generation, 3);
        assert_eq!(receipt.decision, Decision::owned_by("u2"));
    }

    #[tokio::test]
    async fn test_untyped_write_rejected() {
        let (gateway, store) = gateway();
        let result = gateway
            .commit(WriteRequest::upsert("x", body(json!({"createdBy": "u1"}))))
            .await;
        assert_eq!(reason(result), "documentType is not provided.");
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_batch_preserves_per_document_order() {
        let (gateway, _store) = gateway();

        let results = gateway
            .commit_batch(vec![
                WriteRequest::upsert("user::a", body(json!({"documentType": "user", "email": "a@x.com"}))),
                WriteRequest::upsert("report::1", body(json!({"documentType": "report", "createdBy": "a@x.com"}))),
                WriteRequest::upsert("user::a", body(json!({"documentType": "user", "email": "b@x.com"}))),
                WriteRequest::upsert("user::a", body(json!({"documentType": "user", "email": "a@x.com", "department": "Ops"}))),
            ])
            .await
            .unwrap();

        assert_eq!(results.len(), 4);
        assert_eq!(results[0].as_ref().unwrap().generation, 1);
        assert_eq!(results[1].as_ref().unwrap().doc_id, "report::1");
        assert!(matches!(results[2], Err(GatewayError::Forbidden(_))));
        assert_eq!(results[3].as_ref().unwrap().generation, 2);
    }

    #[tokio::test]
    async fn test_batch_size_limit() {
        let store = Arc::new(MemoryStore::new());
        let mut config = GatewayConfig::default();
        config.gateway.max_batch_size = 1;
        let gateway = WriteGateway::new(store, &config);

        let requests = vec![WriteRequest::delete("a"), WriteRequest::delete("b")];
        assert!(matches!(
            gateway.commit_batch(requests).await,
            Err(GatewayError::Configuration { .. })
        ));
    }

    #[tokio::test]
    async fn test_concurrent_writers_to_one_document() {
        let (gateway, store) = gateway();
        let gateway = Arc::new(gateway);

        gateway
            .commit(WriteRequest::upsert(
                "report::1",
                body(json!({"documentType": "report", "createdBy": "u1"})),
            ))
            .await
            .unwrap();

        let writers = (0..16).map(|i| {
            let gateway = gateway.clone();
            tokio::spawn(async move {
                let owner = if i % 2 == 0 { "u1" } else { "intruder" };
                gateway
                    .commit(WriteRequest::upsert(
                        "report::1",
                        body(json!({"documentType": "report", "createdBy": owner, "rev": i})),
                    ))
                    .await
            })
        });

        let mut accepted = 0;
        for result in join_all(writers).await {
            if result.unwrap().is_ok() {
                accepted += 1;
            }
        }

        assert_eq!(accepted, 8);
        let stored = store.get("report::1").await.unwrap().unwrap();
        assert_eq!(stored.generation, 9);
        assert_eq!(stored.body.get_str("createdBy"), Some("u1"));
    }

    #[tokio::test]
    async fn test_dry_run_stores_nothing() {
        let (gateway, store) = gateway();
        let manager = body(json!({"documentType": "manager"}));

        assert_eq!(gateway.dry_run(&manager, None, false), Decision::route(Channel::wildcard()));
        assert!(store.is_empty().await);
        assert_eq!(gateway.stats().evaluated, 1);
    }

    struct StalledStore;

    #[async_trait::async_trait]
    impl SyncStore for StalledStore {
        async fn get(&self, _doc_id: &str) -> Result<Option<StoredRevision>> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(None)
        }

        async fn commit(&self, _commit: Commit) -> Result<u64> {
            Err(GatewayError::store("unreachable"))
        }

        async fn channels_for(&self, _principal: &str) -> Result<std::collections::BTreeSet<Channel>> {
            Ok(Default::default())
        }

        fn name(&self) -> &'static str {
            "stalled_store"
        }
    }

    #[async_trait::async_trait]
    impl HealthCheck for StalledStore {
        async fn health_check(&self) -> Result<()> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }

        fn component_name(&self) -> &'static str {
            "stalled_store"
        }
    }

    #[tokio::test]
    async fn test_commit_timeout() {
        let mut config = GatewayConfig::default();
        config.gateway.commit_timeout = Duration::from_millis(20);
        let gateway = WriteGateway::new(Arc::new(StalledStore), &config);

        let err = gateway
            .commit(WriteRequest::upsert("report::1", body(json!({"documentType": "manager"}))))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Timeout { .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_readiness_follows_store_health() {
        let (gateway, _store) = gateway();
        assert!(gateway.health_check().await.is_ok());

        let mut config = GatewayConfig::default();
        config.gateway.commit_timeout = Duration::from_millis(20);
        let stalled = WriteGateway::new(Arc::new(StalledStore), &config);
        assert!(matches!(
            stalled.health_check().await,
            Err(GatewayError::Timeout { .. })
        ));
    }

    #[tokio::test]
    async fn test_deleted_marker_commits_as_delete() {
        let (gateway, store) = gateway();
        let marked = body(json!({"documentType": "user", "_deleted": true}));

        // Dry run and commit agree on a body carrying the marker
        assert_eq!(gateway.dry_run(&marked, None, false), Decision::pass_through());
        let receipt = gateway.commit(WriteRequest::upsert("user::z", marked)).await.unwrap();
        assert_eq!(receipt.decision, Decision::pass_through());
        assert!(store.get("user::z").await.unwrap().unwrap().is_deleted());
    }

    #[test]
    fn test_family_label_uses_policy_emptiness() {
        let numeric = body(json!({"documentType": 7, "createdBy": "u1"}));

        let (falsy, _store) = gateway();
        assert_eq!(falsy.family_label(&numeric, None, false), "owned");

        let mut config = GatewayConfig::default();
        config.policy.emptiness = sync_policy_core::EmptinessRule::Strict;
        let strict = WriteGateway::new(Arc::new(MemoryStore::new()), &config);
        assert_eq!(strict.family_label(&numeric, None, false), "untyped");
        assert_eq!(
            strict.dry_run(&numeric, None, false).rejection().map(Forbidden::reason),
            Some("documentType is not provided.")
        );
    }
}
