// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Transport to content nodes
//!
//! A [`Channel`] carries one outstanding request at a time to one node. Replies are decoded
//! by an I/O owner and handed to the waiting caller through a single-slot queue.

pub mod codec;
pub mod connector;
pub mod stream;

pub use codec::{codec_for, LegacyCodec, RpcCodec, WireCodec};
pub use connector::TcpConnector;
pub use stream::StreamChannel;

use std::time::Duration;
use thiserror::Error;

use crate::node::NodeRef;
use crate::protocol::legacy::{QueryPacket, QueryResultPacket};
use crate::protocol::rpc::{DocsumRequest, SearchReply, SearchRequest};
use crate::protocol::{CodecError, GlobalId};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("Invalid channel: {0}")]
    Invalid(String),

    #[error("Illegal channel state: {0}")]
    IllegalState(String),

    #[error("Timed out waiting for a response")]
    Timeout,

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

impl From<std::io::Error> for ChannelError {
    fn from(err: std::io::Error) -> Self {
        ChannelError::Io(err.to_string())
    }
}

/// A request in the form of one wire protocol
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// Legacy first-phase query
    Query(QueryPacket),
    /// RPC first-phase query
    Search(SearchRequest),
    /// Summary fetch; each codec renders it in its own format
    GetDocsums(DocsumRequest),
}

impl Request {
    pub fn kind(&self) -> &'static str {
        match self {
            Request::Query(_) => "query packet",
            Request::Search(_) => "search request",
            Request::GetDocsums(_) => "docsum request",
        }
    }
}

/// One decoded response unit
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    QueryResult(QueryResultPacket),
    SearchReply(SearchReply),
    Docsum { gid: GlobalId, data: Vec<u8> },
    Error { code: u32, message: String },
    /// End of a multi-unit reply
    Eol,
    /// A message a backend should never send, by name
    Unexpected(String),
}

impl Response {
    pub fn kind(&self) -> &str {
        match self {
            Response::QueryResult(_) => "QueryResultPacket",
            Response::SearchReply(_) => "SearchReply",
            Response::Docsum { .. } => "Docsum",
            Response::Error { .. } => "Error",
            Response::Eol => "Eol",
            Response::Unexpected(name) => name.as_str(),
        }
    }
}

pub trait Channel: Send {
    /// Sends a request. `Ok(false)` means the channel could not take it.
    fn send(&mut self, request: &Request) -> Result<bool, ChannelError>;

    /// Waits at most `timeout` for the first response, then returns it together with any
    /// others already available, up to `max`
    fn receive(&mut self, timeout: Duration, max: usize) -> Result<Vec<Response>, ChannelError>;

    /// Closes the channel; later calls are no-ops
    fn close(&mut self);

    fn is_valid(&self) -> bool;
}

/// Hands out channels to nodes
pub trait ConnectionPool: Send + Sync {
    fn get_channel(&self, node: &NodeRef) -> Result<Box<dyn Channel>, ChannelError>;
}
