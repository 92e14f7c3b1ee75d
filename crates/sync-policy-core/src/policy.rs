//! Sync policy for the expense reporting bucket
//!
//! Runs once per proposed document revision, before the revision is stored
//! or replicated, and decides:
//!
//! - whether the write is permitted at all
//! - which replication channel the revision belongs to
//! - which principal is granted read access to that channel
//!
//! ## Rules
//!
//! | `documentType` | channel              | grant                  | validation                      |
//! |----------------|----------------------|------------------------|---------------------------------|
//! | `manager`      | `!`                  | none                   | none                            |
//! | `user`         | `channel.<email>`    | `email` → channel      | `email` required, read-only     |
//! | anything else  | `channel.<createdBy>`| `createdBy` → channel  | `createdBy` required, read-only |
//!
//! Owner validation is skipped for deletes, and by default so is routing. The first violated rule rejects
//! the write; rejections carry the exact reason relayed to the writer.
//!
//! Evaluation is a pure function of its inputs, so replicas running it
//! redundantly always agree on the outcome.

use crate::decision::{Channel, Decision};
use crate::document::{fields, Document};
use crate::error::Forbidden;
use crate::family::DocumentFamily;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::borrow::Cow;

/// Core policy trait - one evaluation per proposed revision
pub trait SyncPolicy: Send + Sync {
    /// Evaluate a proposed revision against the revision it replaces
    ///
    /// `previous` is `None` when the document has never been stored.
    fn evaluate(&self, proposed: &Document, previous: Option<&Document>, is_delete: bool) -> Decision;

    /// Get policy name for debugging/metrics
    fn name(&self) -> &'static str;

    /// Rule used to read `documentType` and owner fields
    fn emptiness(&self) -> EmptinessRule {
        EmptinessRule::default()
    }
}

/// What counts as "not provided" for required fields
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptinessRule {
    /// Missing, `null`, `""`, `0` and `false` are not provided; other scalars
    /// are stringified. Matches the sync function deployed alongside the apps.
    #[default]
    Falsy,
    /// Only a non-empty string is provided
    Strict,
}

impl EmptinessRule {
    /// Text of a field usable as a type or owner key, `None` if not provided
    ///
    /// Arrays and objects are never usable keys.
    pub fn key(self, value: Option<&Value>) -> Option<Cow<'_, str>> {
        match (self, value?) {
            (_, Value::String(s)) if !s.is_empty() => Some(Cow::Borrowed(s.as_str())),
            (Self::Falsy, Value::Bool(true)) => Some(Cow::Borrowed("true")),
            (Self::Falsy, Value::Number(n)) if n.as_f64() != Some(0.0) => {
                Some(Cow::Owned(number_text(n)))
            }
            _ => None,
        }
    }

    /// Whether an owner field kept its value across an update
    ///
    /// `Falsy` follows JavaScript `==` for scalars, so `42` and `"42"` are the
    /// same owner while `true` and `"true"` are not. `Strict` requires
    /// identical values.
    pub fn same_value(self, value: Option<&Value>, previous: Option<&Value>) -> bool {
        match self {
            Self::Falsy => loosely_equal(value.unwrap_or(&Value::Null), previous.unwrap_or(&Value::Null)),
            Self::Strict => value == previous,
        }
    }
}

/// Number as JavaScript prints it: integral floats lose their `.0`
fn number_text(n: &Number) -> String {
    match n.as_f64() {
        Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 1e21 => format!("{f:.0}"),
        _ => n.to_string(),
    }
}

fn loosely_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::String(x), Value::String(y)) => x == y,
        // Parsed documents never share object identity
        (Value::Array(_) | Value::Object(_), _) | (_, Value::Array(_) | Value::Object(_)) => false,
        _ => match (to_number(a), to_number(b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
    }
}

fn to_number(value: &Value) -> Option<f64> {
    match value {
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Number(n) => n.as_f64(),
        Value::String(s) => match s.trim() {
            "" => Some(0.0),
            "Infinity" | "+Infinity" => Some(f64::INFINITY),
            "-Infinity" => Some(f64::NEG_INFINITY),
            // Rust also parses "inf" and "NaN", which are not numbers to JavaScript
            t if t.bytes().any(|c| c.is_ascii_alphabetic() && c != b'e' && c != b'E') => None,
            t => t.parse().ok(),
        },
        _ => None,
    }
}

/// How deletes of owner-scoped documents are routed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TombstoneRouting {
    /// Never route tombstones; the gateway's default handling applies
    #[default]
    PassThrough,
    /// Route the tombstone to the previous owner's channel so their replicas
    /// see the delete; pass through when no owner is known
    PreviousOwner,
}

/// The explicit delete flag and a `_deleted: true` body are the same signal
pub fn is_deletion(proposed: &Document, is_delete: bool) -> bool {
    is_delete || proposed.is_tombstone()
}

/// True when there is no usable previous revision and this is not a delete
pub fn is_create(previous: Option<&Document>, is_delete: bool) -> bool {
    !is_delete && previous.map_or(true, Document::is_tombstone)
}

/// The `documentType` that selects the rule for this write
///
/// Deletes are classified by the revision being deleted, falling back to the
/// proposed body when that revision is absent or untyped.
pub fn effective_type<'a>(
    proposed: &'a Document,
    previous: Option<&'a Document>,
    is_delete: bool,
    rule: EmptinessRule,
) -> Option<Cow<'a, str>> {
    let prior = if is_delete {
        previous.and_then(|p| rule.key(p.document_type()))
    } else {
        None
    };
    prior.or_else(|| rule.key(proposed.document_type()))
}

/// Require `field` to be provided, returning its key text
pub fn validate_not_empty<'a>(
    field: &str,
    value: Option<&'a Value>,
    rule: EmptinessRule,
) -> Result<Cow<'a, str>, Forbidden> {
    rule.key(value).ok_or_else(|| Forbidden::not_provided(field))
}

/// Require `value` to be unchanged from `previous`
pub fn validate_read_only(
    field: &str,
    value: Option<&Value>,
    previous: Option<&Value>,
    rule: EmptinessRule,
) -> Result<(), Forbidden> {
    if rule.same_value(value, previous) {
        Ok(())
    } else {
        Err(Forbidden::read_only(field))
    }
}

/// The expense reporting sync policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpensePolicy {
    emptiness: EmptinessRule,
    tombstones: TombstoneRouting,
}

impl ExpensePolicy {
    pub fn new(emptiness: EmptinessRule, tombstones: TombstoneRouting) -> Self {
        Self {
            emptiness,
            tombstones,
        }
    }

    pub fn from_config(config: &crate::config::PolicyConfig) -> Self {
        Self::new(config.emptiness, config.tombstone_routing)
    }

    fn decide(
        &self,
        proposed: &Document,
        previous: Option<&Document>,
        is_delete: bool,
    ) -> Result<Decision, Forbidden> {
        let is_delete = is_deletion(proposed, is_delete);
        let document_type = effective_type(proposed, previous, is_delete, self.emptiness)
            .ok_or_else(|| Forbidden::not_provided(fields::DOCUMENT_TYPE))?;

        let Some(owner_field) = DocumentFamily::classify(&document_type).owner_field() else {
            return Ok(Decision::route(Channel::wildcard()));
        };

        if is_delete {
            return Ok(self.route_tombstone(owner_field, previous));
        }

        let owner = validate_not_empty(owner_field, proposed.get(owner_field), self.emptiness)?;

        if !is_create(previous, is_delete) {
            let prior = previous.and_then(|p| p.get(owner_field));
            validate_read_only(owner_field, proposed.get(owner_field), prior, self.emptiness)?;
        }

        Ok(Decision::owned_by(&owner))
    }

    fn route_tombstone(&self, owner_field: &str, previous: Option<&Document>) -> Decision {
        if self.tombstones == TombstoneRouting::PassThrough {
            return Decision::pass_through();
        }
        match previous.and_then(|p| self.emptiness.key(p.get(owner_field))) {
            Some(owner) => Decision::route(Channel::for_owner(&owner)),
            None => Decision::pass_through(),
        }
    }
}

impl SyncPolicy for ExpensePolicy {
    fn evaluate(&self, proposed: &Document, previous: Option<&Document>, is_delete: bool) -> Decision {
        self.decide(proposed, previous, is_delete)
            .unwrap_or_else(Decision::Rejected)
    }

    fn name(&self) -> &'static str {
        "expense_policy"
    }

    fn emptiness(&self) -> EmptinessRule {
        self.emptiness
    }
}
