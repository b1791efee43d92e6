// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! First-phase result cache
//!
//! This module provides:
//! - Cache keys derived from the query packet bytes
//! - Cached entries holding result windows and document summaries
//! - Per-key serialized insert-or-update with full-coverage admission

pub mod cache_control;
pub mod cache_key;
pub mod packet_wrapper;

pub use cache_control::{CacheControl, CacheOutcome, CacheStatistics};
pub use cache_key::CacheKey;
pub use packet_wrapper::{CachedDocument, CachedResult, PacketWrapper};
