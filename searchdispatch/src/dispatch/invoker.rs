// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Search invoker
//!
//! Drives one query against one node channel:
//!
//! ```text
//! Created -> Sent -> AwaitingResponse -> Completed | Failed
//! ```
//!
//! `Released` is reachable from every state and releasing twice is a no-op. Failures are
//! never returned as `Err`; they end up as errors on the returned [`SearchResult`].

use std::sync::Arc;

use crate::cache::{CacheKey, CacheOutcome, CachedResult};
use crate::channel::{Channel, ChannelError, Request, Response};
use crate::error::{ErrorCode, ErrorMessage};
use crate::node::NodeRef;
use crate::query::Query;

use super::backend::BackendSearcher;
use super::result::SearchResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvokerState {
    Created,
    Sent,
    AwaitingResponse,
    Completed,
    Failed,
    Released,
}

pub struct SearchInvoker {
    backend: Arc<BackendSearcher>,
    channel: Option<Box<dyn Channel>>,
    node: Option<NodeRef>,
    state: InvokerState,
    query: Option<Query>,
    pending_error: Option<ErrorMessage>,
}

impl SearchInvoker {
    pub fn new(
        backend: Arc<BackendSearcher>,
        channel: Box<dyn Channel>,
        node: Option<NodeRef>,
    ) -> Self {
        Self {
            backend,
            channel: Some(channel),
            node,
            state: InvokerState::Created,
            query: None,
            pending_error: None,
        }
    }

    pub fn state(&self) -> InvokerState {
        self.state
    }

    pub fn node(&self) -> Option<&NodeRef> {
        self.node.as_ref()
    }

    pub fn distribution_key(&self) -> Option<u32> {
        self.node.as_ref().map(|node| node.key)
    }

    fn name(&self) -> &str {
        self.backend.name()
    }

    /// Sends the query, encoding it unless a shared request is given.
    ///
    /// A channel that refuses the request is recorded and reported by
    /// [`get_search_result`](Self::get_search_result).
    pub fn send_search_request(&mut self, query: &Query, request: Option<Arc<Request>>) {
        log::trace!("{} sending query", self.name());
        self.query = Some(query.clone());

        if self.state != InvokerState::Created {
            self.pending_error = Some(ErrorMessage::backend_communication(format!(
                "Illegal state in {}: request already sent",
                self.name()
            )));
            return;
        }

        let request = request.unwrap_or_else(|| Arc::new(self.backend.create_request(query)));
        let sent = match self.channel.as_mut() {
            Some(channel) => channel.send(&request),
            None => Err(ChannelError::IllegalState("channel released".to_string())),
        };

        let name = self.name().to_string();
        self.pending_error = match sent {
            Ok(true) => None,
            Ok(false) => Some(ErrorMessage::backend_communication(format!(
                "Could not reach '{}'",
                name
            ))),
            Err(ChannelError::Invalid(_)) => Some(ErrorMessage::backend_communication(format!(
                "Invalid channel {}",
                name
            ))),
            Err(ChannelError::IllegalState(message)) => Some(
                ErrorMessage::backend_communication(format!(
                    "Illegal state in {}: {}",
                    name, message
                )),
            ),
            Err(e) => Some(ErrorMessage::backend_communication(format!(
                "Could not send to {}: {}",
                name, e
            ))),
        };
        self.state = InvokerState::Sent;
    }

    fn fail(&mut self, error: ErrorMessage) -> SearchResult {
        log::debug!("{} failed: {}", self.name(), error);
        self.state = InvokerState::Failed;
        SearchResult::error(error)
    }

    /// Waits for the reply within the query's remaining budget and builds the result
    pub fn get_search_result(&mut self, cache_key: &CacheKey) -> SearchResult {
        let Some(mut query) = self.query.take() else {
            return self.fail(ErrorMessage::protocol(format!(
                "No request was sent to {}",
                self.name()
            )));
        };
        if let Some(error) = self.pending_error.take() {
            return self.fail(error);
        }

        self.state = InvokerState::AwaitingResponse;
        let received = match self.channel.as_mut() {
            Some(channel) => channel.receive(query.time_left(), 1),
            None => Err(ChannelError::IllegalState("channel released".to_string())),
        };

        let name = self.name().to_string();
        let responses = match received {
            Ok(responses) => responses,
            Err(ChannelError::Timeout) => {
                return self.fail(ErrorMessage::timeout(format!(
                    "Timeout while waiting for {}",
                    name
                )))
            }
            Err(ChannelError::Invalid(_)) => {
                return self.fail(ErrorMessage::backend_communication(format!(
                    "Invalid channel for {}",
                    name
                )))
            }
            Err(e) => {
                return self.fail(ErrorMessage::backend_communication(format!(
                    "Receive from {} failed: {}",
                    name, e
                )))
            }
        };
        log::trace!("{} got {} responses", name, responses.len());

        let Some(first) = responses.into_iter().next() else {
            return self.fail(ErrorMessage::backend_communication(format!(
                "{} got no packets back",
                name
            )));
        };

        let (reply, backend_errors) = match first {
            Response::QueryResult(packet) => (CachedResult::from_legacy(&packet), Vec::new()),
            Response::SearchReply(reply) => {
                let errors = reply
                    .errors
                    .iter()
                    .map(|error| backend_error(&name, error.code, &error.message))
                    .collect();
                (CachedResult::from_rpc(&reply, query.offset()), errors)
            }
            Response::Error { code, message } => {
                return self.fail(backend_error(&name, code, &message));
            }
            other => {
                return self.fail(ErrorMessage::protocol(format!(
                    "{} expected a query result, got {}",
                    name,
                    other.kind()
                )));
            }
        };

        if query.summary().is_none() {
            query.set_summary(self.backend.default_docsum_class());
        }
        log::trace!("{} got query result, docsum class {:?}", name, query.summary());

        let mut result = SearchResult::new();
        result.errors = backend_errors;
        self.backend.add_meta_info(&reply, &mut result);
        self.backend
            .add_unfilled_hits(&reply, &mut result, self.distribution_key());

        match self.backend.cache_control().cache_or_update(
            cache_key,
            &query,
            reply,
            self.distribution_key(),
        ) {
            CacheOutcome::Inserted | CacheOutcome::Updated => {
                self.backend.fill_from_cache(&mut result, cache_key, &query);
            }
            CacheOutcome::RejectedIncomplete | CacheOutcome::Bypassed => {}
        }

        self.query = Some(query);
        self.state = InvokerState::Completed;
        result
    }

    /// Send and receive in one call
    pub fn search(&mut self, query: &Query, cache_key: &CacheKey) -> SearchResult {
        self.send_search_request(query, None);
        self.get_search_result(cache_key)
    }

    /// Closes the channel. Safe to call any number of times.
    pub fn release(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            channel.close();
            log::trace!("{} released channel", self.backend.name());
        }
        self.state = InvokerState::Released;
    }
}

impl Drop for SearchInvoker {
    fn drop(&mut self) {
        self.release();
    }
}

fn backend_error(name: &str, code: u32, message: &str) -> ErrorMessage {
    let code = ErrorCode::from_code(code).unwrap_or(ErrorCode::BackendCommunicationError);
    ErrorMessage::new(code, format!("{}: {}", name, message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DispatchConfig;
    use crate::protocol::legacy::{CoverageBlock, LegacyDocument, QueryResultPacket};
    use crate::protocol::GlobalId;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Replies from a fixed script and counts closes
    struct ScriptedChannel {
        send_result: Result<bool, ChannelError>,
        replies: Option<Result<Vec<Response>, ChannelError>>,
        closes: Arc<AtomicUsize>,
    }

    impl Channel for ScriptedChannel {
        fn send(&mut self, _request: &Request) -> Result<bool, ChannelError> {
            self.send_result.clone()
        }

        fn receive(&mut self, _timeout: Duration, _max: usize) -> Result<Vec<Response>, ChannelError> {
            self.replies.take().unwrap_or(Err(ChannelError::Timeout))
        }

        fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }

        fn is_valid(&self) -> bool {
            true
        }
    }

    fn packet(degraded: u32) -> QueryResultPacket {
        QueryResultPacket {
            offset: 0,
            total_hits: 1,
            max_rank: 1.0,
            coverage: Some(CoverageBlock {
                docs: 10,
                active: 10,
                soon_active: 10,
                degraded,
                nodes_queried: 1,
                nodes_replied: 1,
            }),
            documents: vec![LegacyDocument {
                gid: GlobalId([7; 12]),
                metric: 1.0,
                partition_id: 0,
                distribution_key: 0,
                sort_data: None,
            }],
        }
    }

    fn invoker(
        send_result: Result<bool, ChannelError>,
        replies: Result<Vec<Response>, ChannelError>,
    ) -> (SearchInvoker, Arc<AtomicUsize>) {
        let closes = Arc::new(AtomicUsize::new(0));
        let channel = ScriptedChannel {
            send_result,
            replies: Some(replies),
            closes: Arc::clone(&closes),
        };
        let backend = Arc::new(BackendSearcher::new(&DispatchConfig::legacy()).unwrap());
        let node = NodeRef::new(2, "localhost", 19100, 0);
        (
            SearchInvoker::new(backend, Box::new(channel), Some(node)),
            closes,
        )
    }

    fn run(invoker: &mut SearchInvoker) -> SearchResult {
        let query = Query::new("a");
        let key = CacheKey::from_query(&query);
        invoker.search(&query, &key)
    }

    #[test]
    fn test_successful_search_caches_reply() {
        let (mut invoker, closes) = invoker(Ok(true), Ok(vec![Response::QueryResult(packet(0))]));
        let result = run(&mut invoker);
        assert!(!result.has_errors());
        assert_eq!(result.hit_count(), 1);
        assert_eq!(result.hits[0].distribution_key, 2);
        assert_eq!(invoker.state(), InvokerState::Completed);
        assert_eq!(invoker.backend.cache_control().len(), 1);

        invoker.release();
        invoker.release();
        drop(invoker);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_degraded_reply_is_not_cached() {
        let (mut invoker, _) = invoker(Ok(true), Ok(vec![Response::QueryResult(packet(1))]));
        let result = run(&mut invoker);
        assert!(!result.has_errors());
        assert!(result.coverage.unwrap().is_degraded_by_match_phase());
        assert!(invoker.backend.cache_control().is_empty());
    }

    #[test]
    fn test_send_failures_become_errors() {
        for send_result in [
            Ok(false),
            Err(ChannelError::Invalid("x".into())),
            Err(ChannelError::IllegalState("closed".into())),
        ] {
            let (mut invoker, _) = invoker(send_result, Ok(vec![Response::QueryResult(packet(0))]));
            let result = run(&mut invoker);
            assert_eq!(result.errors.len(), 1);
            assert_eq!(result.errors[0].code, ErrorCode::BackendCommunicationError);
            assert_eq!(result.hit_count(), 0);
            assert_eq!(invoker.state(), InvokerState::Failed);
        }
    }

    #[test]
    fn test_receive_failures_become_errors() {
        let cases = [
            (Err(ChannelError::Timeout), ErrorCode::Timeout),
            (
                Err(ChannelError::Invalid("x".into())),
                ErrorCode::BackendCommunicationError,
            ),
            (Ok(vec![]), ErrorCode::BackendCommunicationError),
            (Ok(vec![Response::Eol]), ErrorCode::ProtocolError),
        ];
        for (replies, code) in cases {
            let (mut invoker, _) = invoker(Ok(true), replies);
            let result = run(&mut invoker);
            assert_eq!(result.errors[0].code, code);
            assert_eq!(invoker.state(), InvokerState::Failed);
        }
    }

    #[test]
    fn test_result_without_send_is_an_error() {
        let (mut invoker, _) = invoker(Ok(true), Ok(vec![]));
        let result = invoker.get_search_result(&CacheKey::new(vec![]));
        assert_eq!(result.errors[0].code, ErrorCode::ProtocolError);
    }

    #[test]
    fn test_released_invoker_reports_error() {
        let (mut invoker, closes) = invoker(Ok(true), Ok(vec![Response::QueryResult(packet(0))]));
        invoker.release();
        let result = run(&mut invoker);
        assert_eq!(result.errors[0].code, ErrorCode::BackendCommunicationError);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }
}
