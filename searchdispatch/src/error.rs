// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Errors reported on a search result
//!
//! Backend failures never propagate out of the dispatch layer. They are carried as
//! [`ErrorMessage`] values on the result so a caller fanning out to several nodes can still
//! assemble a result from the nodes that answered.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    BackendCommunicationError,
    Timeout,
    /// Internal server error family
    ProtocolError,
}

impl ErrorCode {
    pub fn code(self) -> u32 {
        match self {
            ErrorCode::BackendCommunicationError => 10,
            ErrorCode::Timeout => 12,
            ErrorCode::ProtocolError => 18,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            10 => Some(ErrorCode::BackendCommunicationError),
            12 => Some(ErrorCode::Timeout),
            18 => Some(ErrorCode::ProtocolError),
            _ => None,
        }
    }

    fn title(self) -> &'static str {
        match self {
            ErrorCode::BackendCommunicationError => "Backend communication error",
            ErrorCode::Timeout => "Timed out",
            ErrorCode::ProtocolError => "Internal server error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorMessage {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn backend_communication(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BackendCommunicationError, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Timeout, message)
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ProtocolError, message)
    }
}

impl fmt::Display for ErrorMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.code.title(), self.code.code(), self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        for code in [
            ErrorCode::BackendCommunicationError,
            ErrorCode::Timeout,
            ErrorCode::ProtocolError,
        ] {
            assert_eq!(ErrorCode::from_code(code.code()), Some(code));
        }
        assert_eq!(ErrorCode::from_code(1), None);
    }

    #[test]
    fn test_display() {
        let error = ErrorMessage::timeout("Timeout while waiting for search");
        assert_eq!(
            error.to_string(),
            "Timed out (12): Timeout while waiting for search"
        );
    }
}
