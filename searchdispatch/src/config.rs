// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Dispatch configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::protocol::ProtocolKind;

/// Configuration of one backend searcher and its dispatch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Wire protocol spoken to the content nodes
    pub protocol: ProtocolKind,

    /// Id of this container, reported by the backend searcher and in its log lines
    pub server_id: u32,

    /// Name used in error messages and logs
    pub name: String,

    /// Summary class assigned to queries that do not ask for one
    pub default_docsum_class: String,

    /// Time allowed to establish a node connection
    pub connect_timeout: Duration,

    /// First-phase result cache
    pub cache: CacheConfig,
}

/// Result cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable/disable caching entirely
    pub enabled: bool,

    /// Maximum number of cached keys
    pub max_entries: usize,

    /// Entries older than this are dropped
    pub time_to_live: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 10_000,
            time_to_live: Duration::from_secs(300),
        }
    }
}

impl CacheConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.enabled && self.max_entries == 0 {
            return Err("Cache max_entries must be greater than 0".to_string());
        }
        if self.enabled && self.time_to_live.is_zero() {
            return Err("Cache time_to_live must be greater than 0".to_string());
        }
        Ok(())
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            protocol: ProtocolKind::default(),
            server_id: 0,
            name: "search".to_string(),
            default_docsum_class: "default".to_string(),
            connect_timeout: Duration::from_secs(1),
            cache: CacheConfig::default(),
        }
    }
}

impl DispatchConfig {
    /// Configuration without a result cache
    pub fn no_cache() -> Self {
        Self {
            cache: CacheConfig::disabled(),
            ..Default::default()
        }
    }

    /// Configuration for the legacy protocol
    pub fn legacy() -> Self {
        Self {
            protocol: ProtocolKind::Legacy,
            ..Default::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self, String> {
        let config: DispatchConfig =
            serde_json::from_str(json).map_err(|e| format!("Invalid dispatch config: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Dispatch name must not be empty".to_string());
        }
        if self.default_docsum_class.trim().is_empty() {
            return Err("Default docsum class must not be empty".to_string());
        }
        if self.connect_timeout.is_zero() {
            return Err("Connect timeout must be greater than 0".to_string());
        }
        self.cache.validate()
    }
}
