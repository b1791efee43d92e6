// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Backend node references

use serde::{Deserialize, Serialize};
use std::fmt;

/// One content node partition. Supplied by cluster membership, never mutated here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeRef {
    /// Distribution key: the node's shard index within its cluster
    pub key: u32,
    pub host: String,
    pub port: u16,
    pub group: u32,
}

impl NodeRef {
    pub fn new(key: u32, host: impl Into<String>, port: u16, group: u32) -> Self {
        Self {
            key,
            host: host.into(),
            port,
            group,
        }
    }

    pub fn distribution_key(&self) -> u32 {
        self.key
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node {} ({}:{}, group {})", self.key, self.host, self.port, self.group)
    }
}
