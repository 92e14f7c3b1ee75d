//! Bounded log of writes rejected by the sync policy

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use sync_policy_core::prelude::*;
use tokio::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

/// One rejected write
#[derive(Debug, Clone, Serialize)]
pub struct RejectionEntry {
    pub request_id: Uuid,
    pub doc_id: String,
    pub operation: DocumentOperation,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

/// In-memory rejection log; the oldest entry is dropped when full
pub struct RejectionLog {
    max_size: usize,
    entries: RwLock<VecDeque<RejectionEntry>>,
}

impl RejectionLog {
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            entries: RwLock::new(VecDeque::new()),
        }
    }

    pub async fn record(&self, request: &WriteRequest, forbidden: &Forbidden) {
        if self.max_size == 0 {
            return;
        }

        let mut entries = self.entries.write().await;
        if entries.len() >= self.max_size {
            warn!(max_size = self.max_size, "Rejection log full, dropping oldest entry");
            entries.pop_front();
        }

        entries.push_back(RejectionEntry {
            request_id: request.metadata.request_id,
            doc_id: request.doc_id.clone(),
            operation: request.operation,
            source: request.metadata.source.clone(),
            correlation_id: request.metadata.correlation_id.clone(),
            reason: forbidden.reason().to_string(),
            timestamp: Utc::now(),
        });
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Most recent entries, newest first
    pub async fn recent(&self, count: usize) -> Vec<RejectionEntry> {
        self.entries.read().await.iter().rev().take(count).cloned().collect()
    }

    pub async fn drain(&self) -> Vec<RejectionEntry> {
        self.entries.write().await.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(doc_id: &str) -> WriteRequest {
        WriteRequest::upsert(doc_id, Document::new().with("documentType", "report"))
    }

    #[tokio::test]
    async fn test_bounded_and_newest_first() {
        let log = RejectionLog::new(2);
        let forbidden = Forbidden::not_provided("createdBy");

        for id in ["r1", "r2", "r3"] {
            log.record(&request(id), &forbidden).await;
        }

        assert_eq!(log.len().await, 2);
        let recent = log.recent(10).await;
        assert_eq!(recent[0].doc_id, "r3");
        assert_eq!(recent[1].doc_id, "r2");
        assert_eq!(recent[0].reason, "createdBy is not provided.");
        assert_eq!(recent[0].correlation_id, None);

        assert_eq!(log.drain().await.len(), 2);
        assert!(log.is_empty().await);
    }

    #[tokio::test]
    async fn test_records_writer_metadata() {
        let log = RejectionLog::new(4);
        let request = request("r1").with_metadata(
            Metadata::new("android-device-7").with_correlation_id("sync-42"),
        );
        log.record(&request, &Forbidden::read_only("createdBy")).await;

        let entry = &log.recent(1).await[0];
        assert_eq!(entry.source, "android-device-7");
        assert_eq!(entry.correlation_id.as_deref(), Some("sync-42"));
        assert_eq!(entry.request_id, request.metadata.request_id);
    }

    #[tokio::test]
    async fn test_zero_capacity_keeps_nothing() {
        let log = RejectionLog::new(0);
        log.record(&request("r1"), &Forbidden::read_only("email")).await;
        assert!(log.is_empty().await);
    }
}
