// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Error types for TreeBase operations.
//!
//! Provides structured error handling with detailed context for debugging.

use std::fmt;

/// Standard Result type for all TreeBase operations.
pub type TreeResult<T> = Result<T, TreeError>;

/// Error types for TreeBase operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    /// Operation submitted before a successful initialize.
    NotInitialized,

    /// Store file already exists on create.
    AlreadyExists { name: String },

    /// Store file not found on open or destroy.
    NotFound { name: String },

    /// I/O error during device operations.
    Io { operation: String, reason: String },

    /// On-disc corruption: bad magic, version, checksum, or impossible layout.
    Corruption { detail: String },

    /// Key or value encoding/decoding failed.
    Codec { reason: String },

    /// Encoded entry cannot fit in a single page.
    Capacity { needed: usize, limit: usize },

    /// Malformed configuration or inconsistent arguments.
    InvalidArgument { reason: String },

    /// Operation after close, or after a fatal error closed the store.
    Closed,

    /// Gateway reply timed out.
    Timeout {
        operation: String,
        request_id: String,
    },
}

impl fmt::Display for TreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotInitialized => {
                write!(f, "Store is not initialised")
            }
            Self::AlreadyExists { name } => {
                write!(f, "Store '{}' already exists", name)
            }
            Self::NotFound { name } => {
                write!(f, "Store '{}' not found", name)
            }
            Self::Io { operation, reason } => {
                write!(f, "I/O error during '{}': {}", operation, reason)
            }
            Self::Corruption { detail } => {
                write!(f, "Corruption detected: {}", detail)
            }
            Self::Codec { reason } => {
                write!(f, "Codec error: {}", reason)
            }
            Self::Capacity { needed, limit } => {
                write!(
                    f,
                    "Entry of {} bytes exceeds per-page limit of {} bytes",
                    needed, limit
                )
            }
            Self::InvalidArgument { reason } => {
                write!(f, "Invalid argument: {}", reason)
            }
            Self::Closed => {
                write!(f, "Store is closed")
            }
            Self::Timeout {
                operation,
                request_id,
            } => {
                write!(f, "Operation '{}' timed out (request {})", operation, request_id)
            }
        }
    }
}

impl std::error::Error for TreeError {}

// Convenience conversion from std::io::Error
impl From<std::io::Error> for TreeError {
    fn from(err: std::io::Error) -> Self {
        TreeError::Io {
            operation: "unknown".to_string(),
            reason: err.to_string(),
        }
    }
}
