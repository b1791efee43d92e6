// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Summary fetching for hits a first-phase search left unfilled

use std::sync::Arc;

use crate::cache::CacheKey;
use crate::channel::{Channel, ChannelError, Request, Response};
use crate::error::{ErrorCode, ErrorMessage};
use crate::node::NodeRef;
use crate::protocol::rpc::DocsumRequest;
use crate::protocol::GlobalId;
use crate::query::Query;

use super::backend::BackendSearcher;
use super::result::SearchResult;

/// Fetches summaries from one node over its own channel
pub struct FillInvoker {
    backend: Arc<BackendSearcher>,
    channel: Option<Box<dyn Channel>>,
    node: Option<NodeRef>,
}

impl FillInvoker {
    pub fn new(
        backend: Arc<BackendSearcher>,
        channel: Box<dyn Channel>,
        node: Option<NodeRef>,
    ) -> Self {
        Self {
            backend,
            channel: Some(channel),
            node,
        }
    }

    /// Gids of `result` this invoker should fetch: unfilled and, when bound to a node, owned by it
    fn wanted(&self, result: &SearchResult, summary_class: &str) -> Vec<GlobalId> {
        let key = self.node.as_ref().map(|node| node.key);
        result
            .unfilled(summary_class)
            .filter(|hit| key.map_or(true, |key| hit.distribution_key == key))
            .map(|hit| hit.gid)
            .collect()
    }

    /// Fills the hits of `result` and stores the fetched summaries under `cache_key`.
    ///
    /// Returns the number of hits filled. Failures are added to the result's errors.
    pub fn fill(&mut self, result: &mut SearchResult, query: &Query, cache_key: &CacheKey) -> usize {
        let summary_class = self.backend.summary_class(query).to_string();
        let gids = self.wanted(result, &summary_class);
        if gids.is_empty() {
            return 0;
        }
        let name = self.backend.name().to_string();
        log::trace!("{} fetching {} summaries of class {}", name, gids.len(), summary_class);

        let Some(channel) = self.channel.as_mut() else {
            result.add_error(ErrorMessage::backend_communication(format!(
                "Illegal state in {}: fill channel released",
                name
            )));
            return 0;
        };

        let expected = gids.len();
        let request = Request::GetDocsums(DocsumRequest {
            summary_class: summary_class.clone(),
            ranking: query.ranking().to_string(),
            gids,
        });
        match channel.send(&request) {
            Ok(true) => {}
            Ok(false) => {
                result.add_error(ErrorMessage::backend_communication(format!(
                    "Could not reach '{}' for summaries",
                    name
                )));
                return 0;
            }
            Err(e) => {
                result.add_error(ErrorMessage::backend_communication(format!(
                    "Could not request summaries from {}: {}",
                    name, e
                )));
                return 0;
            }
        }

        let mut received: Vec<(GlobalId, Vec<u8>)> = Vec::with_capacity(expected);
        let mut done = false;
        while !done {
            let max = (expected + 1).saturating_sub(received.len()).max(1);
            let responses = match channel.receive(query.time_left(), max) {
                Ok(responses) => responses,
                Err(ChannelError::Timeout) => {
                    result.add_error(ErrorMessage::timeout(format!(
                        "Timed out waiting for summary data from {}. {} responses missing",
                        name,
                        expected.saturating_sub(received.len())
                    )));
                    break;
                }
                Err(e) => {
                    result.add_error(ErrorMessage::backend_communication(format!(
                        "Summary fetch from {} failed: {}",
                        name, e
                    )));
                    break;
                }
            };
            if responses.is_empty() {
                result.add_error(ErrorMessage::backend_communication(format!(
                    "{} got no summary packets back",
                    name
                )));
                break;
            }
            for response in responses {
                match response {
                    Response::Docsum { gid, data } => received.push((gid, data)),
                    Response::Eol => done = true,
                    Response::Error { code, message } => {
                        let code = ErrorCode::from_code(code)
                            .unwrap_or(ErrorCode::BackendCommunicationError);
                        result.add_error(ErrorMessage::new(code, format!("{}: {}", name, message)));
                    }
                    other => {
                        result.add_error(ErrorMessage::protocol(format!(
                            "{} expected a summary, got {}",
                            name,
                            other.kind()
                        )));
                        done = true;
                    }
                }
            }
        }

        let mut filled = 0;
        for (gid, data) in &received {
            let Some(hit) = result.hit_mut(gid) else {
                log::debug!("{} returned a summary for unknown hit {}", name, gid);
                continue;
            };
            match hit.fill(&summary_class, data) {
                Ok(()) => filled += 1,
                Err(e) => result.add_error(ErrorMessage::protocol(format!(
                    "Bad summary for {} from {}: {}",
                    gid, name, e
                ))),
            }
        }
        let stored = self.backend.cache_control().add_docsums(
            cache_key,
            query,
            &summary_class,
            received,
        );
        log::debug!("{} filled {} hits, cached {} summaries", name, filled, stored);
        filled
    }

    pub fn release(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            channel.close();
        }
    }
}

impl Drop for FillInvoker {
    fn drop(&mut self) {
        self.release();
    }
}
