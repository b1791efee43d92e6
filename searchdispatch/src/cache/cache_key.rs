// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Cache keys

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::protocol::legacy::QueryPacket;
use crate::query::Query;

/// Identifies a cacheable first-phase result.
///
/// The bytes are the legacy query packet with window and timeout zeroed, so every window of
/// the same query shares one key. The CRC32 of the bytes is computed once and used as hash.
#[derive(Clone)]
pub struct CacheKey {
    bytes: Arc<[u8]>,
    hash: u32,
}

impl CacheKey {
    pub fn new(bytes: Vec<u8>) -> Self {
        let hash = crc32fast::hash(&bytes);
        Self {
            bytes: bytes.into(),
            hash,
        }
    }

    /// Key of a prepared query
    pub fn from_query(query: &Query) -> Self {
        Self::from_packet(&QueryPacket::from_query(query))
    }

    pub fn from_packet(packet: &QueryPacket) -> Self {
        Self::new(packet.cache_key_bytes())
    }

    /// Key for the part of a fanned-out result that one node produced
    pub fn for_node(&self, distribution_key: u32) -> Self {
        let mut bytes = Vec::with_capacity(self.bytes.len() + 4);
        bytes.extend_from_slice(&self.bytes);
        bytes.extend_from_slice(&distribution_key.to_be_bytes());
        Self::new(bytes)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn crc(&self) -> u32 {
        self.hash
    }
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.bytes == other.bytes
    }
}

impl Eq for CacheKey {}

impl Hash for CacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u32(self.hash);
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CacheKey({:08x}, {} bytes)", self.hash, self.bytes.len())
    }
}
