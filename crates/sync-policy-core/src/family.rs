//! Document families and their typed views
//!
//! Every document names its family in `documentType`. The policy only
//! distinguishes managers, user profiles and owner-scoped documents
//! (reports, expenses and any type added later); the typed structs mirror
//! what the expense app actually writes.

use crate::document::{fields, Document};
use serde::{Deserialize, Serialize};

pub const MANAGER: &str = "manager";
pub const USER: &str = "user";
pub const REPORT: &str = "report";
pub const EXPENSE: &str = "expense";

/// Policy family of a document type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentFamily<'a> {
    /// Globally readable reference data
    Manager,
    /// User profile, owned through `email`
    User,
    /// Any other type, owned through `createdBy`
    Owned(&'a str),
}

impl<'a> DocumentFamily<'a> {
    pub fn classify(document_type: &'a str) -> Self {
        match document_type {
            MANAGER => Self::Manager,
            USER => Self::User,
            other => Self::Owned(other),
        }
    }

    /// Field identifying the owner, if the family is owner-scoped
    pub fn owner_field(&self) -> Option<&'static str> {
        match self {
            Self::Manager => None,
            Self::User => Some(fields::EMAIL),
            Self::Owned(_) => Some(fields::CREATED_BY),
        }
    }

    pub fn as_str(&self) -> &'a str {
        match self {
            Self::Manager => MANAGER,
            Self::User => USER,
            Self::Owned(other) => other,
        }
    }
}

/// Approving manager, published to every user
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Manager {
    pub given_name: String,
    pub sur_name: String,
    pub email: String,
    pub title: String,
    pub department: String,
}

/// Profile of a signed-in user
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserProfile {
    pub email: String,
    pub given_name: String,
    pub sur_name: String,
    pub job_title: String,
    pub department: String,
}

/// Expense report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Report {
    pub report_id: String,
    pub name: String,
    pub description: String,
    pub is_complete: bool,
    /// Milliseconds since the epoch
    pub report_date: i64,
    pub amount: f64,
    pub status: String,
    pub department: String,
    pub created_by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_manager: Option<Manager>,
}

impl Default for Report {
    fn default() -> Self {
        Self {
            report_id: String::new(),
            name: String::new(),
            description: String::new(),
            is_complete: false,
            report_date: 0,
            amount: 0.0,
            status: "Draft".to_string(),
            department: String::new(),
            created_by: String::new(),
            approval_manager: None,
        }
    }
}

/// Single expense line of a report
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StandardExpense {
    pub expense_id: String,
    pub report_id: String,
    pub description: String,
    /// Milliseconds since the epoch
    pub date: i64,
    pub expense_type_category: String,
    pub expense_type: String,
    /// Owner; the sync policy requires it on every expense
    #[serde(skip_serializing_if = "String::is_empty")]
    pub created_by: String,
    pub amount: f64,
}

/// Typed views that know their `documentType`
pub trait TypedDocument: Serialize + for<'de> Deserialize<'de> {
    const DOCUMENT_TYPE: &'static str;

    /// Serialize into an untyped document, stamping `documentType`
    fn to_document(&self) -> Result<Document, serde_json::Error> {
        let mut doc = Document::try_from(serde_json::to_value(self)?)?;
        doc.insert(fields::DOCUMENT_TYPE, Self::DOCUMENT_TYPE);
        Ok(doc)
    }

    /// Read a typed view from an untyped document, ignoring unknown fields
    fn from_document(doc: &Document) -> Result<Self, serde_json::Error> {
        serde_json::from_value(doc.clone().into_value())
    }
}

impl TypedDocument for Manager {
    const DOCUMENT_TYPE: &'static str = MANAGER;
}

impl TypedDocument for UserProfile {
    const DOCUMENT_TYPE: &'static str = USER;
}

impl TypedDocument for Report {
    const DOCUMENT_TYPE: &'static str = REPORT;
}

impl TypedDocument for StandardExpense {
    const DOCUMENT_TYPE: &'static str = EXPENSE;
}
