// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Cached entries

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use super::cache_key::CacheKey;
use crate::coverage::Coverage;
use crate::protocol::legacy::{LegacyDocument, QueryResultPacket};
use crate::protocol::rpc::{RpcHit, SearchReply};
use crate::protocol::GlobalId;

/// One document of a first-phase reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedDocument {
    pub gid: GlobalId,
    pub relevance: f64,
    pub distribution_key: u32,
    pub sort_data: Option<Vec<u8>>,
}

impl From<&LegacyDocument> for CachedDocument {
    fn from(doc: &LegacyDocument) -> Self {
        Self {
            gid: doc.gid,
            relevance: doc.metric,
            distribution_key: doc.distribution_key,
            sort_data: doc.sort_data.clone(),
        }
    }
}

impl From<&RpcHit> for CachedDocument {
    fn from(hit: &RpcHit) -> Self {
        Self {
            gid: hit.gid,
            relevance: hit.relevance,
            distribution_key: hit.distribution_key,
            sort_data: if hit.sort_data.is_empty() {
                None
            } else {
                Some(hit.sort_data.clone())
            },
        }
    }
}

/// A first-phase reply for one result window, independent of the wire format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResult {
    pub offset: u32,
    pub total_hits: u64,
    pub max_rank: f64,
    /// `None` when the backend did not report coverage
    pub coverage: Option<Coverage>,
    pub documents: Vec<CachedDocument>,
}

impl CachedResult {
    pub fn from_legacy(packet: &QueryResultPacket) -> Self {
        Self {
            offset: packet.offset,
            total_hits: packet.total_hits,
            max_rank: packet.max_rank,
            coverage: packet.coverage.map(|block| block.to_coverage()),
            documents: packet.documents.iter().map(CachedDocument::from).collect(),
        }
    }

    pub fn from_rpc(reply: &SearchReply, offset: u32) -> Self {
        let coverage = Coverage::from_backend(
            reply.coverage_docs,
            reply.active_docs,
            reply.nodes_replied,
            reply.nodes_queried,
            reply.soon_active_docs,
            &reply.degraded_reasons,
        );
        let max_rank = reply
            .hits
            .iter()
            .map(|hit| hit.relevance)
            .fold(f64::NEG_INFINITY, f64::max);
        Self {
            offset,
            total_hits: reply.total_hits,
            max_rank: if reply.hits.is_empty() { 0.0 } else { max_rank },
            coverage: Some(coverage),
            documents: reply.hits.iter().map(CachedDocument::from).collect(),
        }
    }

    /// Whether this reply may enter the cache
    pub fn coverage_full(&self) -> bool {
        self.coverage.map_or(true, |coverage| coverage.full())
    }

    fn end(&self) -> u64 {
        self.offset as u64 + self.documents.len() as u64
    }
}

/// Everything cached for one [`CacheKey`]
#[derive(Debug, Clone)]
pub struct PacketWrapper {
    key: CacheKey,
    /// Result windows by offset
    results: BTreeMap<u32, CachedResult>,
    /// Summary payloads by (gid, summary class)
    docsums: HashMap<(GlobalId, String), Vec<u8>>,
    distribution_key: Option<u32>,
}

impl PacketWrapper {
    pub fn new(key: CacheKey, result: CachedResult, distribution_key: Option<u32>) -> Self {
        let mut wrapper = Self {
            key,
            results: BTreeMap::new(),
            docsums: HashMap::new(),
            distribution_key,
        };
        wrapper.add_result(result);
        wrapper
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn distribution_key(&self) -> Option<u32> {
        self.distribution_key
    }

    /// Adds a window, replacing any window at the same offset
    pub fn add_result(&mut self, result: CachedResult) {
        self.results.insert(result.offset, result);
    }

    pub fn result_count(&self) -> usize {
        self.results.len()
    }

    /// The hits `[offset, offset + hits)` if one cached window covers them.
    ///
    /// A window that reaches the total hit count covers any request past its end.
    pub fn window(&self, offset: u32, hits: u32) -> Option<CachedResult> {
        let (_, cached) = self.results.range(..=offset).next_back()?;
        let wanted_end = (offset as u64 + hits as u64).min(cached.total_hits);
        if cached.end() < wanted_end {
            return None;
        }
        let skip = (offset - cached.offset) as usize;
        Some(CachedResult {
            offset,
            total_hits: cached.total_hits,
            max_rank: cached.max_rank,
            coverage: cached.coverage,
            documents: cached
                .documents
                .iter()
                .skip(skip)
                .take(hits as usize)
                .cloned()
                .collect(),
        })
    }

    pub fn add_docsum(&mut self, gid: GlobalId, summary_class: &str, data: Vec<u8>) {
        self.docsums.insert((gid, summary_class.to_string()), data);
    }

    pub fn docsum(&self, gid: &GlobalId, summary_class: &str) -> Option<&[u8]> {
        self.docsums
            .get(&(*gid, summary_class.to_string()))
            .map(|data| data.as_slice())
    }

    pub fn docsum_count(&self) -> usize {
        self.docsums.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(n: u8) -> CachedDocument {
        CachedDocument {
            gid: GlobalId([n; 12]),
            relevance: 100.0 - n as f64,
            distribution_key: 0,
            sort_data: None,
        }
    }

    fn result(offset: u32, count: u8, total_hits: u64) -> CachedResult {
        CachedResult {
            offset,
            total_hits,
            max_rank: 100.0,
            coverage: Some(Coverage::with_nodes(10, 10, 1)),
            documents: (offset as u8..offset as u8 + count).map(doc).collect(),
        }
    }

    fn wrapper(result: CachedResult) -> PacketWrapper {
        PacketWrapper::new(CacheKey::new(vec![1, 2, 3]), result, Some(4))
    }

    #[test]
    fn test_window_inside_cached_result() {
        let wrapper = wrapper(result(0, 10, 100));
        let window = wrapper.window(2, 5).unwrap();
        assert_eq!(window.offset, 2);
        assert_eq!(window.documents.len(), 5);
        assert_eq!(window.documents[0].gid, GlobalId([2; 12]));

        assert!(wrapper.window(5, 10).is_none());
    }

    #[test]
    fn test_short_result_covers_the_tail() {
        let wrapper = wrapper(result(0, 3, 3));
        let window = wrapper.window(0, 10).unwrap();
        assert_eq!(window.documents.len(), 3);
        assert!(wrapper.window(5, 10).unwrap().documents.is_empty());
    }

    #[test]
    fn test_windows_merge_by_offset() {
        let mut wrapper = wrapper(result(0, 10, 100));
        wrapper.add_result(result(10, 10, 100));
        wrapper.add_result(result(10, 10, 100));
        assert_eq!(wrapper.result_count(), 2);
        assert_eq!(wrapper.window(12, 5).unwrap().documents[0].gid, GlobalId([12; 12]));
    }

    #[test]
    fn test_docsums_by_class() {
        let mut wrapper = wrapper(result(0, 1, 1));
        let gid = GlobalId([0; 12]);
        wrapper.add_docsum(gid, "default", b"{}".to_vec());
        assert!(wrapper.docsum(&gid, "default").is_some());
        assert!(wrapper.docsum(&gid, "short").is_none());
        assert_eq!(wrapper.docsum_count(), 1);
    }

    #[test]
    fn test_rpc_reply_conversion() {
        let reply = SearchReply {
            total_hits: 2,
            hits: vec![
                RpcHit {
                    gid: GlobalId([1; 12]),
                    relevance: 3.0,
                    sort_data: vec![],
                    distribution_key: 7,
                },
                RpcHit {
                    gid: GlobalId([2; 12]),
                    relevance: 5.0,
                    sort_data: vec![9],
                    distribution_key: 7,
                },
            ],
            coverage_docs: 10,
            active_docs: 20,
            nodes_queried: 1,
            nodes_replied: 1,
            ..Default::default()
        };
        let cached = CachedResult::from_rpc(&reply, 0);
        assert_eq!(cached.max_rank, 5.0);
        assert_eq!(cached.documents[0].sort_data, None);
        assert_eq!(cached.documents[1].sort_data, Some(vec![9]));
        assert!(!cached.coverage_full());
    }
}
