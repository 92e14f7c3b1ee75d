//! Error types for the sync policy evaluator and its hosting gateway
//!
//! Uses `thiserror` for ergonomic error handling with full context preservation.
//! The evaluator itself only ever produces [`Forbidden`]; everything else in
//! [`GatewayError`] belongs to the gateway that hosts it.

use std::fmt;
use thiserror::Error;

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

/// A write rejected by the sync policy.
///
/// Displays as the bare reason so it can be relayed verbatim to the writer.
#[derive(Error, Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[error("{reason}")]
pub struct Forbidden {
    /// Human-readable reason naming the failed field or invariant
    pub reason: String,
}

impl Forbidden {
    /// Create a rejection with an arbitrary reason
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// A required field was missing or empty
    pub fn not_provided(field: &str) -> Self {
        Self::new(format!("{field} is not provided."))
    }

    /// An immutable field changed value across an update
    pub fn read_only(field: &str) -> Self {
        Self::new(format!("{field} is read-only."))
    }

    /// The reason string
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Field named by the reason, used as a metrics label
    pub fn field(&self) -> &str {
        self.reason.split_whitespace().next().unwrap_or("unknown")
    }
}

/// Primary error type for gateway operations
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Write rejected by the sync policy
    #[error("Forbidden: {0}")]
    Forbidden(#[from] Forbidden),

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Document or access store failure
    #[error("Store error: {message}")]
    Store { message: String },

    /// Operation timeout
    #[error("Timeout: {operation} exceeded {duration_ms}ms")]
    Timeout { operation: String, duration_ms: u64 },

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Create a store error
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, duration_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration_ms,
        }
    }

    /// Check if error is a policy rejection
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Forbidden(_))
    }

    /// Check if error is retryable
    ///
    /// Rejections are terminal for the revision: the writer has to submit a
    /// corrected one.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store { .. } | Self::Timeout { .. })
    }
}

/// Error context for enhanced debugging
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub component: &'static str,
    pub operation: String,
    pub document_id: Option<String>,
}

impl ErrorContext {
    pub fn new(component: &'static str, operation: impl Into<String>) -> Self {
        Self {
            component,
            operation: operation.into(),
            document_id: None,
        }
    }

    pub fn with_document(mut self, doc_id: impl Into<String>) -> Self {
        self.document_id = Some(doc_id.into());
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}::{}]", self.component, self.operation)?;
        if let Some(ref id) = self.document_id {
            write!(f, " doc={}", id)?;
        }
        Ok(())
    }
}

/// Extension trait for adding context to errors
pub trait ErrorContextExt<T> {
    fn with_context(self, ctx: ErrorContext) -> Result<T>;
}

impl<T> ErrorContextExt<T> for Result<T> {
    fn with_context(self, ctx: ErrorContext) -> Result<T> {
        self.map_err(|e| {
            // Rejections are expected traffic, not failures
            if e.is_rejection() {
                tracing::debug!(error = %e, context = %ctx, "Write rejected");
            } else {
                tracing::error!(
                    error = %e,
                    component = ctx.component,
                    operation = %ctx.operation,
                    document_id = ?ctx.document_id,
                    "Operation failed"
                );
            }
            e
        })
    }
}
