//! Delivery boundary: target addressing and the Sender contract
//!
//! The dispatch engine never talks to a transport directly; it resolves and
//! delivers through the [`Sender`] trait. Targets are stored as strings in one
//! of three accepted forms and parsed lazily at delivery time:
//!
//! - numeric channel/group id (`"1001234"`)
//! - signed numeric private-chat id (`"-4471"`)
//! - `@username`, requiring an external lookup through [`Sender::resolve`]

pub mod validate;
pub mod webhook;

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::MessagePayload;

pub use validate::{AcceptAllValidator, ContentRejected, ContentValidator, WordListValidator};
pub use webhook::WebhookSender;

/// Errors produced by target resolution and delivery
#[derive(Error, Debug)]
pub enum SenderError {
    /// The target does not exist on the delivery side
    #[error("Target not found: {target}")]
    NotFound { target: String },

    /// The target identifier could not be resolved to an address
    #[error("Failed to resolve '{target}': {reason}")]
    Resolution { target: String, reason: String },

    /// The transport rejected the delivery
    #[error("Delivery failed: {reason}")]
    Delivery { reason: String },

    /// The transport did not answer within the caller-supplied timeout
    #[error("Delivery timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// The transport itself is unusable; aborts the whole sweep
    #[error("Sender unavailable: {reason}")]
    Unavailable { reason: String },
}

impl SenderError {
    /// Create a resolution error
    pub fn resolution(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Resolution {
            target: target.into(),
            reason: reason.into(),
        }
    }

    /// Create a delivery error
    pub fn delivery(reason: impl Into<String>) -> Self {
        Self::Delivery {
            reason: reason.into(),
        }
    }

    /// Create an unavailable error
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    /// Whether this error poisons the whole sweep instead of one target
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// A parsed target identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetAddress {
    /// Channel, group, or private chat addressed by numeric id
    Chat(i64),
    /// Username requiring an external lookup
    Username(String),
}

fn username_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^@[A-Za-z][A-Za-z0-9_]{4,31}$").unwrap())
}

impl TargetAddress {
    /// Parse a stored target identifier into one of the accepted forms
    pub fn parse(target: &str) -> Result<Self, SenderError> {
        let trimmed = target.trim();
        if trimmed.is_empty() {
            return Err(SenderError::resolution(target, "empty target identifier"));
        }

        if trimmed.starts_with('@') {
            if !username_pattern().is_match(trimmed) {
                return Err(SenderError::resolution(target, "malformed username"));
            }
            return Ok(Self::Username(trimmed.trim_start_matches('@').to_string()));
        }

        trimmed
            .parse::<i64>()
            .map(Self::Chat)
            .map_err(|_| SenderError::resolution(target, "not a numeric chat id"))
    }
}

impl std::fmt::Display for TargetAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Chat(id) => write!(f, "{id}"),
            Self::Username(name) => write!(f, "@{name}"),
        }
    }
}

/// A fully resolved delivery address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedTarget {
    pub chat_id: i64,
}

/// The external delivery transport
///
/// Implementations must be safe to share across concurrent sweeps. The engine
/// bounds every call with its configured timeout; implementations should also
/// carry their own transport-level timeout.
#[async_trait]
pub trait Sender: Send + Sync {
    /// Resolve a parsed target into a deliverable address
    async fn resolve(&self, target: &TargetAddress) -> Result<ResolvedTarget, SenderError>;

    /// Deliver the payload to a resolved address
    async fn deliver(
        &self,
        target: &ResolvedTarget,
        payload: &MessagePayload,
    ) -> Result<(), SenderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_numeric_chat_id() {
        assert_eq!(
            TargetAddress::parse("1001234").unwrap(),
            TargetAddress::Chat(1001234)
        );
    }

    #[test]
    fn test_parse_signed_private_chat_id() {
        assert_eq!(
            TargetAddress::parse("-4471").unwrap(),
            TargetAddress::Chat(-4471)
        );
    }

    #[test]
    fn test_parse_username() {
        assert_eq!(
            TargetAddress::parse("@dev_channel").unwrap(),
            TargetAddress::Username("dev_channel".to_string())
        );
    }

    #[test]
    fn test_parse_rejects_malformed_targets() {
        assert!(TargetAddress::parse("").is_err());
        assert!(TargetAddress::parse("   ").is_err());
        assert!(TargetAddress::parse("12a4").is_err());
        assert!(TargetAddress::parse("@ab").is_err());
        assert!(TargetAddress::parse("@1starts_with_digit").is_err());
    }

    #[test]
    fn test_display_round_trip() {
        assert_eq!(TargetAddress::Chat(-42).to_string(), "-42");
        assert_eq!(
            TargetAddress::Username("herald".to_string()).to_string(),
            "@herald"
        );
    }

    #[test]
    fn test_fatal_classification() {
        assert!(SenderError::unavailable("connection refused").is_fatal());
        assert!(!SenderError::delivery("bad request").is_fatal());
        assert!(!SenderError::Timeout { timeout_secs: 10 }.is_fatal());
        assert!(!SenderError::NotFound {
            target: "@gone".to_string()
        }
        .is_fatal());
    }
}
