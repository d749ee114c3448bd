//! Unified error model for the identity and mailbox stores.
//! Absence is never an error here: lookups return `Option`. Everything else a caller
//! can observe is one of the variants below, with a helper mapping to HTTP status.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a message could not be accepted for delivery.
/// Each cause stays distinct so a compose view can show the specific problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum ValidationReason {
    #[error("domain mismatch: email domain must be {expected}; got {got}")]
    DomainMismatch { expected: String, got: String },
    #[error("recipient does not exist: {0}")]
    RecipientDoesNotExist(String),
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    #[error("at least one recipient is required")]
    EmptyRecipients,
    #[error("duplicate recipient: {0}")]
    DuplicateRecipient(String),
}

impl ValidationReason {
    /// Short stable code, used by presentation layers and logs.
    pub fn code(&self) -> &'static str {
        match self {
            ValidationReason::DomainMismatch { .. } => "domain mismatch",
            ValidationReason::RecipientDoesNotExist(_) => "recipient does not exist",
            ValidationReason::InvalidAddress(_) => "invalid address",
            ValidationReason::EmptyRecipients => "empty recipients",
            ValidationReason::DuplicateRecipient(_) => "duplicate recipient",
        }
    }
}

/// Outcome of a batch delete. `failed` holds uids whose removal is known to have failed.
/// `aborted` is set when a non-transport error stopped the batch early.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteReport {
    pub deleted: Vec<String>,
    pub failed: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,
}

impl DeleteReport {
    pub fn is_complete(&self) -> bool { self.failed.is_empty() && self.aborted.is_none() }
}

/// Mailboxes a multi-recipient delivery left a copy in, and those it did not reach.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReport {
    pub delivered: Vec<String>,
    pub failed: Vec<String>,
}

#[derive(Debug, Error)]
pub enum XmailError {
    /// Only produced where a caller explicitly named something that must exist.
    #[error("not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Validation(#[from] ValidationReason),
    /// A unique index would be violated by the write.
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    /// Caller defect: use-after-close, undeclared attribute set, and the like.
    #[error("programming error: {0}")]
    Programming(String),
    #[error("batch delete incomplete: {} deleted, {} failed", .0.deleted.len(), .0.failed.len())]
    PartialDelete(DeleteReport),
    /// A delivery failed midway and some copies could not be withdrawn.
    #[error("delivery incomplete: {} mailboxes still hold the message, {} not reached", .0.delivered.len(), .0.failed.len())]
    PartialDeliver(DeliveryReport),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl XmailError {
    pub fn unavailable<S: Into<String>>(msg: S) -> Self { XmailError::StoreUnavailable(msg.into()) }
    pub fn programming<S: Into<String>>(msg: S) -> Self { XmailError::Programming(msg.into()) }
    pub fn conflict<S: Into<String>>(msg: S) -> Self { XmailError::Conflict(msg.into()) }
    pub fn not_found<S: Into<String>>(msg: S) -> Self { XmailError::NotFound(msg.into()) }

    pub fn code_str(&self) -> &'static str {
        match self {
            XmailError::NotFound(_) => "not_found",
            XmailError::Validation(_) => "validation",
            XmailError::Conflict(_) => "conflict",
            XmailError::StoreUnavailable(_) => "store_unavailable",
            XmailError::Programming(_) => "programming",
            XmailError::PartialDelete(_) => "partial_delete",
            XmailError::PartialDeliver(_) => "partial_deliver",
            XmailError::Serialization(_) => "serialization",
        }
    }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            XmailError::NotFound(_) => 404,
            XmailError::Validation(_) => 400,
            XmailError::Conflict(_) => 409,
            XmailError::StoreUnavailable(_) => 500,
            XmailError::Programming(_) => 500,
            XmailError::PartialDelete(_) => 500,
            XmailError::PartialDeliver(_) => 500,
            XmailError::Serialization(_) => 500,
        }
    }

    pub fn is_unavailable(&self) -> bool { matches!(self, XmailError::StoreUnavailable(_)) }
}

pub type XmailResult<T> = Result<T, XmailError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_mapping() {
        assert_eq!(XmailError::not_found("missing").http_status(), 404);
        assert_eq!(XmailError::from(ValidationReason::EmptyRecipients).http_status(), 400);
        assert_eq!(XmailError::conflict("dup").http_status(), 409);
        assert_eq!(XmailError::unavailable("down").http_status(), 500);
        assert_eq!(XmailError::programming("closed").http_status(), 500);
        assert_eq!(XmailError::PartialDelete(DeleteReport::default()).http_status(), 500);
    }

    #[test]
    fn validation_reasons_are_distinct() {
        let d = ValidationReason::DomainMismatch { expected: "xmail.com".into(), got: "wrong.domain".into() };
        let r = ValidationReason::RecipientDoesNotExist("nouser@xmail.com".into());
        assert_eq!(d.code(), "domain mismatch");
        assert_eq!(r.code(), "recipient does not exist");
        assert_ne!(d.to_string(), r.to_string());
        assert!(d.to_string().contains("wrong.domain"));
    }

    #[test]
    fn partial_delete_message_counts() {
        let rep = DeleteReport { deleted: vec!["a".into()], failed: vec!["b".into(), "c".into()], aborted: None };
        assert!(!rep.is_complete());
        let e = XmailError::PartialDelete(rep);
        assert_eq!(e.to_string(), "batch delete incomplete: 1 deleted, 2 failed");
        assert_eq!(e.code_str(), "partial_delete");
    }

    #[test]
    fn aborted_batch_is_incomplete() {
        let rep = DeleteReport { deleted: vec!["a".into()], aborted: Some("programming error: boom".into()), ..Default::default() };
        assert!(!rep.is_complete());
    }

    #[test]
    fn partial_deliver_message_counts() {
        let e = XmailError::PartialDeliver(DeliveryReport { delivered: vec!["bob".into()], failed: vec!["alice".into()] });
        assert_eq!(e.to_string(), "delivery incomplete: 1 mailboxes still hold the message, 1 not reached");
        assert_eq!(e.http_status(), 500);
        assert_eq!(e.code_str(), "partial_deliver");
    }
}
