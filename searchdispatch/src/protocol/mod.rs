// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Wire formats spoken to content nodes
//!
//! Two formats are supported and carry the same sort and rank feature content:
//! - **Legacy**: typed packets in length-prefixed binary frames ([`legacy`])
//! - **RPC**: structured serde messages in length-prefixed bincode frames ([`rpc`])

pub mod error;
pub mod legacy;
pub mod map_encoder;
pub mod rpc;
pub(crate) mod wire;

pub use error::{CodecError, CodecResult};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Upper bound on one received frame
pub const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolKind {
    Legacy,
    Rpc,
}

impl Default for ProtocolKind {
    fn default() -> Self {
        ProtocolKind::Rpc
    }
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolKind::Legacy => write!(f, "legacy"),
            ProtocolKind::Rpc => write!(f, "rpc"),
        }
    }
}

/// Length of a document global id
pub const GLOBAL_ID_LENGTH: usize = 12;

/// Global document id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GlobalId(pub [u8; GLOBAL_ID_LENGTH]);

impl GlobalId {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; GLOBAL_ID_LENGTH]> for GlobalId {
    fn from(bytes: [u8; GLOBAL_ID_LENGTH]) -> Self {
        GlobalId(bytes)
    }
}

impl fmt::Display for GlobalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}
