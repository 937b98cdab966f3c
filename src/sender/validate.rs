//! Content validation hook, applied once at campaign creation

use thiserror::Error;

use crate::models::MessagePayload;

/// Rejection produced by a content validator
#[derive(Error, Debug, Clone)]
#[error("Content rejected: {reason}")]
pub struct ContentRejected {
    pub reason: String,
}

impl ContentRejected {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Validates campaign content before a record is created
///
/// Invoked exactly once per campaign at creation time, never during sweeps.
pub trait ContentValidator: Send + Sync {
    fn validate(&self, payload: &MessagePayload) -> Result<(), ContentRejected>;
}

/// Validator that accepts any non-empty payload
#[derive(Debug, Default)]
pub struct AcceptAllValidator;

impl ContentValidator for AcceptAllValidator {
    fn validate(&self, payload: &MessagePayload) -> Result<(), ContentRejected> {
        if payload.is_empty() {
            return Err(ContentRejected::new("payload content is empty"));
        }
        Ok(())
    }
}

/// Validator that rejects payloads containing any deny-listed word
#[derive(Debug, Default)]
pub struct WordListValidator {
    banned: Vec<String>,
}

impl WordListValidator {
    /// Create a validator from a deny list (matched case-insensitively)
    pub fn new(banned: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            banned: banned
                .into_iter()
                .map(|w| w.into().to_lowercase())
                .collect(),
        }
    }
}

impl ContentValidator for WordListValidator {
    fn validate(&self, payload: &MessagePayload) -> Result<(), ContentRejected> {
        if payload.is_empty() {
            return Err(ContentRejected::new("payload content is empty"));
        }

        let content = payload.content().to_lowercase();
        for word in &self.banned {
            if content.contains(word.as_str()) {
                return Err(ContentRejected::new(format!(
                    "contains banned word '{word}'"
                )));
            }
        }

        Ok(())
    }
}
