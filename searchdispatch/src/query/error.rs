// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Query construction errors

use thiserror::Error;

/// Errors raised while building query state. These are fatal for the query and are
/// reported before anything is dispatched to a backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArgumentError {
    #[error("Illegal attribute name '{name}' for sorting. Requires '{pattern}'")]
    IllegalAttributeName { name: String, pattern: String },

    #[error("No sort function specified")]
    MissingSortFunction,

    #[error("Unknown sort function '{0}'")]
    UnknownSortFunction(String),

    #[error("Unknown collation strength: '{0}'")]
    UnknownStrength(String),

    #[error("Invalid locale '{0}'")]
    InvalidLocale(String),

    #[error("Expected a tensor value of '{name}' but has {value}")]
    NotATensor { name: String, value: String },

    #[error("Invalid tensor: {0}")]
    InvalidTensor(String),
}

pub type ArgumentResult<T> = Result<T, ArgumentError>;
