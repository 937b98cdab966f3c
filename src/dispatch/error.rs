//! Error types for the dispatch module

use thiserror::Error;
use uuid::Uuid;

use crate::models::CampaignStatus;

/// Result type for dispatch operations
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Dispatch-specific errors
///
/// Administrative operations return these synchronously. Per-target delivery
/// errors never surface here; they are absorbed into outcome logs and
/// counters inside the sweep.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// Bad input, rejected before any state change
    #[error("Validation failed: {reason}")]
    Validation { reason: String },

    /// Calendar expression cannot be parsed
    #[error("Invalid schedule expression '{expr}': {reason}")]
    InvalidSchedule { expr: String, reason: String },

    /// Operation not legal from the campaign's current lifecycle state
    #[error("Operation '{operation}' is not legal while campaign is {status}")]
    IllegalState {
        operation: String,
        status: CampaignStatus,
    },

    /// Unknown campaign id
    #[error("Campaign not found: {id}")]
    NotFound { id: Uuid },

    /// Delete blocked: the in-flight sweep did not acknowledge cancellation
    /// within the bounded wait
    #[error("Campaign {id} is still running; pause it or retry once the sweep stops")]
    StillRunning { id: Uuid },

    /// The sweep itself became unusable (transport or store down)
    #[error("Sweep aborted: {reason}")]
    FatalSweep { reason: String },

    /// Storage failure outside a sweep
    #[error("Storage error: {reason}")]
    Store { reason: String },
}

impl DispatchError {
    /// Create a validation error
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    /// Create an invalid schedule error
    pub fn invalid_schedule(expr: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSchedule {
            expr: expr.into(),
            reason: reason.into(),
        }
    }

    /// Create an illegal state error
    pub fn illegal_state(operation: impl Into<String>, status: CampaignStatus) -> Self {
        Self::IllegalState {
            operation: operation.into(),
            status,
        }
    }

    /// Create a fatal sweep error
    pub fn fatal_sweep(reason: impl Into<String>) -> Self {
        Self::FatalSweep {
            reason: reason.into(),
        }
    }

    /// Check if the error is recoverable by retrying the same operation
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::StillRunning { .. } | Self::Store { .. })
    }
}

impl From<anyhow::Error> for DispatchError {
    fn from(err: anyhow::Error) -> Self {
        Self::Store {
            reason: format!("{err:#}"),
        }
    }
}
