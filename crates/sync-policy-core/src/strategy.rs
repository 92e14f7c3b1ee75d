//! Strategy traits for the stores the gateway commits into
//!
//! The document store and the access registry are external collaborators;
//! the gateway only needs the operations below. Each trait can be backed by
//! an embedded database, a remote bucket, or memory for tests.
//!
//! ```text
//!  WriteRequest ──► SyncPolicy ──► Decision ──► SyncStore::commit
//!                       ▲                          (revision + channels
//!                       │                           + grants, atomically)
//!              SyncStore::get (previous revision)
//! ```

use crate::decision::{AccessGrant, Channel};
use crate::document::Document;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::BTreeSet;

/// A committed revision as held by the store
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRevision {
    /// Monotonic per-document generation, starting at 1
    pub generation: u64,
    /// Stored body; tombstones carry `_deleted: true`
    pub body: Document,
    /// Channels the revision was routed to
    pub channels: BTreeSet<Channel>,
}

impl StoredRevision {
    pub fn is_deleted(&self) -> bool {
        self.body.is_tombstone()
    }
}

/// Everything applied for one accepted write
#[derive(Debug, Clone, PartialEq)]
pub struct Commit {
    pub doc_id: String,
    pub body: Document,
    pub channels: BTreeSet<Channel>,
    pub grants: Vec<AccessGrant>,
}

// ============================================================================
// Store Strategy
// ============================================================================

/// Document and access store
///
/// Implementations:
/// - `MemoryStore`: in-process maps (tests, demo server)
///
/// Readiness of the gateway is the store's health.
#[async_trait]
pub trait SyncStore: HealthCheck {
    /// Current revision of a document, tombstones included
    async fn get(&self, doc_id: &str) -> Result<Option<StoredRevision>>;

    /// Store the revision, its channel assignment and its grants as one unit
    ///
    /// Returns the generation of the new revision.
    async fn commit(&self, commit: Commit) -> Result<u64>;

    /// Channels a principal has been granted
    async fn channels_for(&self, principal: &str) -> Result<BTreeSet<Channel>>;

    /// Get store name
    fn name(&self) -> &'static str;
}

/// Health check capability
#[async_trait]
pub trait HealthCheck: Send + Sync {
    /// Perform health check
    ///
    /// Returns Ok(()) if healthy, Err with details if not.
    async fn health_check(&self) -> Result<()>;

    /// Get component name for health reporting
    fn component_name(&self) -> &'static str;
}
