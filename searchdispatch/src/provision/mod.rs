// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Provisioning support used when wiring a dispatch cluster
//!
//! - [`flavor`]: the catalog of node flavors and the relations between them
//! - [`registry`]: the active applications of a tenant and their session ids

pub mod flavor;
pub mod registry;

pub use flavor::{Flavor, FlavorConfig, FlavorType, FlavorsConfig, NodeFlavors};
pub use registry::{
    ApplicationId, ApplicationStore, DirectoryApplicationStore, MemoryApplicationStore,
    ReloadHandler, TenantApplications, WorkerPool,
};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProvisionError {
    #[error("Unknown flavor '{name}'. Flavors are {known:?}")]
    UnknownFlavor { name: String, known: Vec<String> },

    #[error("Replaces for {flavor} pointing to a non existing flavor: {target}")]
    UnknownReplacement { flavor: String, target: String },

    #[error("Flavor '{0}' is retired, but has no replacement")]
    RetiredWithoutReplacement(String),

    #[error("Invalid application id '{0}'")]
    InvalidApplicationId(String),

    #[error("Application not found: {0}")]
    ApplicationNotFound(String),

    #[error("Unable to read the session id of {id}: {reason}")]
    InvalidSessionId { id: String, reason: String },

    #[error("Application registry of tenant {0} is closed")]
    Closed(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<std::io::Error> for ProvisionError {
    fn from(err: std::io::Error) -> Self {
        ProvisionError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for ProvisionError {
    fn from(err: serde_json::Error) -> Self {
        ProvisionError::ConfigError(err.to_string())
    }
}

pub type ProvisionResult<T> = Result<T, ProvisionError>;
