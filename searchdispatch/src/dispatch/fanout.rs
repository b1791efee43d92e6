// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Fan-out of one query over the partitions of a content cluster
//!
//! Every node is asked for the window `[0, offset + hits)` so the merged, ordered hits can
//! be cut to the caller's window. Replies are cached per node, and a node whose window is
//! already cached is not contacted.

use std::collections::BTreeSet;
use std::sync::Arc;

use rayon::prelude::*;

use crate::cache::CacheKey;
use crate::channel::{ConnectionPool, Request};
use crate::error::ErrorMessage;
use crate::node::NodeRef;
use crate::query::Query;

use super::backend::BackendSearcher;
use super::fill::FillInvoker;
use super::invoker::SearchInvoker;
use super::result::SearchResult;

pub struct FanOut {
    backend: Arc<BackendSearcher>,
    pool: Arc<dyn ConnectionPool>,
}

impl FanOut {
    pub fn new(backend: Arc<BackendSearcher>, pool: Arc<dyn ConnectionPool>) -> Self {
        Self { backend, pool }
    }

    pub fn backend(&self) -> &Arc<BackendSearcher> {
        &self.backend
    }

    /// First-phase search over `nodes`, merged and cut to the query's window
    pub fn search(&self, query: &Query, nodes: &[NodeRef]) -> SearchResult {
        let mut query = query.clone();
        query.prepare();
        let key = self.backend.cache_key(&query);

        let mut node_query = query.clone();
        node_query.set_window(0, query.offset().saturating_add(query.hits()));
        let request = Arc::new(self.backend.create_request(&node_query));

        log::debug!(
            "{} dispatching to {} nodes, window [{}, +{})",
            self.backend.name(),
            nodes.len(),
            query.offset(),
            query.hits()
        );

        let mut merged = nodes
            .par_iter()
            .map(|node| self.search_node(&node_query, node, &key.for_node(node.key), &request))
            .reduce(SearchResult::new, |mut total, partial| {
                total.merge(partial);
                total
            });

        merged.sort_first_phase(query.sorting().is_some());
        merged.trim(query.offset(), query.hits());
        if merged.has_errors() {
            log::debug!(
                "{} search finished with {} errors",
                self.backend.name(),
                merged.errors.len()
            );
        }
        merged
    }

    fn search_node(
        &self,
        query: &Query,
        node: &NodeRef,
        key: &CacheKey,
        request: &Arc<Request>,
    ) -> SearchResult {
        if let Some(cached) = self.backend.cached_result(query, key) {
            return cached;
        }
        let channel = match self.pool.get_channel(node) {
            Ok(channel) => channel,
            Err(e) => {
                log::warn!("No channel to {}: {}", node, e);
                return SearchResult::error(ErrorMessage::backend_communication(format!(
                    "Could not connect to {}: {}",
                    node, e
                )));
            }
        };
        let mut invoker = SearchInvoker::new(Arc::clone(&self.backend), channel, Some(node.clone()));
        invoker.send_search_request(query, Some(Arc::clone(request)));
        invoker.get_search_result(key)
    }

    /// Fetches summaries for the unfilled hits of `result`, one fill invoker per owning node.
    ///
    /// Hits are then re-sorted container-side when the query sorts. Returns the number of
    /// hits filled.
    pub fn fill(&self, result: &mut SearchResult, query: &Query, nodes: &[NodeRef]) -> usize {
        let mut query = query.clone();
        query.prepare();
        let key = self.backend.cache_key(&query);
        let summary_class = self.backend.summary_class(&query).to_string();

        let owners: BTreeSet<u32> = result
            .unfilled(&summary_class)
            .map(|hit| hit.distribution_key)
            .collect();

        let mut filled = 0;
        for distribution_key in owners {
            let Some(node) = nodes.iter().find(|node| node.key == distribution_key) else {
                result.add_error(ErrorMessage::backend_communication(format!(
                    "No node with distribution key {} to fetch summaries from",
                    distribution_key
                )));
                continue;
            };
            match self.pool.get_channel(node) {
                Ok(channel) => {
                    let mut invoker =
                        FillInvoker::new(Arc::clone(&self.backend), channel, Some(node.clone()));
                    filled += invoker.fill(result, &query, &key.for_node(distribution_key));
                }
                Err(e) => result.add_error(ErrorMessage::backend_communication(format!(
                    "Could not connect to {} for summaries: {}",
                    node, e
                ))),
            }
        }

        if let Some(sorting) = query.sorting() {
            result.sort_by(sorting);
        }
        filled
    }
}
