//! Unified error handling for the herald crate
//!
//! This module provides a unified error type that consolidates all
//! domain-specific errors into a single `Error` enum, while maintaining the
//! ability to use domain-specific errors when needed.
//!
//! # Architecture
//!
//! - [`ErrorCategory`] - Classification of errors for handling strategies
//! - [`Error`] - Unified error enum wrapping all domain-specific errors

use std::io;
use thiserror::Error;

pub use crate::dispatch::error::{DispatchError, DispatchResult};
pub use crate::sender::SenderError;

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Bad operator input
    Validation,
    /// Calendar expression problems
    Schedule,
    /// Lifecycle state-machine violations
    State,
    /// Storage and I/O errors
    Storage,
    /// Target resolution and delivery errors
    Delivery,
    /// Configuration errors
    Config,
    /// Other/unknown errors
    Other,
}

/// Unified error type for the herald crate
///
/// This enum wraps all domain-specific errors, providing a single error type
/// that can be used across module boundaries while preserving the detailed
/// error information.
#[derive(Error, Debug)]
pub enum Error {
    /// Dispatch engine errors (lifecycle, scheduling, sweeps)
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// Delivery transport errors
    #[error("Sender error: {0}")]
    Sender(#[from] SenderError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a generic error with context
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other {
            context: context.into(),
            source: None,
        }
    }

    /// Check if this error is recoverable (can be retried)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Dispatch(e) => e.is_recoverable(),
            // Per-target sender errors are retried on the next sweep; only an
            // unusable transport is final until an operator intervenes
            Self::Sender(e) => !e.is_fatal(),
            Self::Io(_) => true,
            Self::Json(_) => false,
            Self::Config(_) => false,
            Self::Other { .. } => false,
        }
    }

    /// Get the error category for handling strategies
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Dispatch(e) => match e {
                DispatchError::Validation { .. } => ErrorCategory::Validation,
                DispatchError::InvalidSchedule { .. } => ErrorCategory::Schedule,
                DispatchError::IllegalState { .. } | DispatchError::StillRunning { .. } => {
                    ErrorCategory::State
                }
                DispatchError::NotFound { .. } => ErrorCategory::Validation,
                DispatchError::FatalSweep { .. } => ErrorCategory::Delivery,
                DispatchError::Store { .. } => ErrorCategory::Storage,
            },
            Self::Sender(_) => ErrorCategory::Delivery,
            Self::Io(_) => ErrorCategory::Storage,
            Self::Json(_) => ErrorCategory::Storage,
            Self::Config(_) => ErrorCategory::Config,
            Self::Other { .. } => ErrorCategory::Other,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
