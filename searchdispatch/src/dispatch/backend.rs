// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Backend searcher: shared state of all invokers against one content cluster

use crate::cache::{CacheControl, CacheKey, CachedResult};
use crate::channel::Request;
use crate::config::DispatchConfig;
use crate::coverage::Coverage;
use crate::protocol::legacy::QueryPacket;
use crate::protocol::rpc::SearchRequest;
use crate::protocol::ProtocolKind;
use crate::query::Query;

use super::result::{Hit, SearchResult};

#[derive(Debug)]
pub struct BackendSearcher {
    name: String,
    server_id: u32,
    default_docsum_class: String,
    protocol: ProtocolKind,
    cache: CacheControl,
}

impl BackendSearcher {
    pub fn new(config: &DispatchConfig) -> Result<Self, String> {
        config.validate()?;
        Ok(Self {
            name: config.name.clone(),
            server_id: config.server_id,
            default_docsum_class: config.default_docsum_class.clone(),
            protocol: config.protocol,
            cache: CacheControl::new(config.cache.clone()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn server_id(&self) -> u32 {
        self.server_id
    }

    pub fn default_docsum_class(&self) -> &str {
        &self.default_docsum_class
    }

    pub fn protocol(&self) -> ProtocolKind {
        self.protocol
    }

    pub fn cache_control(&self) -> &CacheControl {
        &self.cache
    }

    /// Encodes `query` for this searcher's protocol. The query must be prepared.
    pub fn create_request(&self, query: &Query) -> Request {
        log::trace!(
            "{} encoding {} request for server {}",
            self.name,
            self.protocol,
            self.server_id
        );
        match self.protocol {
            ProtocolKind::Legacy => Request::Query(QueryPacket::from_query(query)),
            ProtocolKind::Rpc => Request::Search(SearchRequest::from_query(query)),
        }
    }

    pub fn cache_key(&self, query: &Query) -> CacheKey {
        CacheKey::from_query(query)
    }

    /// Summary class of `query`, or the default one
    pub fn summary_class<'a>(&'a self, query: &'a Query) -> &'a str {
        query.summary().unwrap_or(self.default_docsum_class.as_str())
    }

    /// Total hits and coverage from a first-phase reply
    pub fn add_meta_info(&self, reply: &CachedResult, result: &mut SearchResult) {
        result.total_hits = reply.total_hits;
        result.coverage = Some(reply.coverage.unwrap_or_else(|| {
            let docs = reply.documents.len() as u64;
            Coverage::new(docs, docs)
        }));
    }

    /// Adds the reply's documents as unfilled hits
    pub fn add_unfilled_hits(
        &self,
        reply: &CachedResult,
        result: &mut SearchResult,
        distribution_key: Option<u32>,
    ) {
        result.hits.extend(
            reply
                .documents
                .iter()
                .map(|doc| Hit::from_cached(doc, distribution_key)),
        );
    }

    /// Fills hits from summaries cached under `key`; returns how many were filled
    pub fn fill_from_cache(&self, result: &mut SearchResult, key: &CacheKey, query: &Query) -> usize {
        let Some(wrapper) = self.cache.lookup(key, query) else {
            return 0;
        };
        let summary_class = self.summary_class(query);
        let mut filled = 0;
        for hit in result.hits.iter_mut().filter(|hit| !hit.is_filled(summary_class)) {
            if let Some(summary) = wrapper.docsum(&hit.gid, summary_class) {
                match hit.fill(summary_class, summary) {
                    Ok(()) => filled += 1,
                    Err(e) => log::warn!("Ignoring cached summary of {}: {}", hit.gid, e),
                }
            }
        }
        if filled > 0 {
            log::debug!("{} filled {} hits from cache", self.name, filled);
        }
        filled
    }

    /// The query's window served from the cache, if one cached reply covers it
    pub fn cached_result(&self, query: &Query, key: &CacheKey) -> Option<SearchResult> {
        let wrapper = self.cache.lookup(key, query)?;
        let window = wrapper.window(query.offset(), query.hits())?;
        let mut result = SearchResult::new();
        self.add_meta_info(&window, &mut result);
        self.add_unfilled_hits(&window, &mut result, wrapper.distribution_key());
        self.fill_from_cache(&mut result, key, query);
        log::debug!(
            "{} served [{}, +{}) from cache",
            self.name,
            query.offset(),
            query.hits()
        );
        Some(result)
    }
}
