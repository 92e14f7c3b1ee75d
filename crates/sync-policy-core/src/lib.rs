//! # Sync Policy Core
//!
//! Write-path policy for the expense reporting sync gateway.
//!
//! Every proposed document revision is evaluated before it is stored or
//! replicated. The evaluator either rejects the write with a reason, or
//! routes it to exactly one replication channel and grants the document's
//! owner read access to that channel.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ WriteRequest │────►│  SyncPolicy  │────►│   Decision   │
//! │  (document)  │     │ (evaluator)  │     │ channels and │
//! └──────────────┘     └──────┬───────┘     │    grants    │
//!                             │             └──────────────┘
//!                     ┌───────┴──────┐
//!                     │  previous    │
//!                     │  revision    │
//!                     └──────────────┘
//! ```

pub mod config;
pub mod decision;
pub mod document;
pub mod error;
pub mod family;
pub mod metrics;
pub mod policy;
pub mod strategy;

pub use self::config::*;
pub use decision::*;
pub use document::*;
pub use error::*;
pub use family::*;
pub use self::metrics::*;
pub use policy::*;
pub use strategy::*;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::GatewayConfig;
    pub use crate::decision::{AccessGrant, Channel, Decision};
    pub use crate::document::{Document, DocumentOperation, Metadata, WriteRequest};
    pub use crate::error::{Forbidden, GatewayError, Result};
    pub use crate::policy::{ExpensePolicy, SyncPolicy};
    pub use crate::strategy::{Commit, HealthCheck, StoredRevision, SyncStore};
}
