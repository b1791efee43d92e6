// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Structured RPC protocol
//!
//! Messages are serde structs framed as `u32 length | bincode body`.

use serde::{Deserialize, Serialize};

use super::error::{CodecError, CodecResult};
use super::GlobalId;
use super::MAX_FRAME_SIZE;
use crate::query::Query;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortField {
    pub field: String,
    pub ascending: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringProperty {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorProperty {
    pub name: String,
    /// Binary tensor format
    pub value: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub offset: u32,
    pub hits: u32,
    pub timeout_ms: u64,
    pub ranking: String,
    pub summary_class: String,
    pub sorting: Vec<SortField>,
    pub rank_features: Vec<StringProperty>,
    pub tensor_rank_features: Vec<TensorProperty>,
    pub rank_properties: Vec<StringProperty>,
    pub tensor_rank_properties: Vec<TensorProperty>,
    pub query_tree_blob: Vec<u8>,
}

impl SearchRequest {
    /// Builds the request for `query`; rank features must already be prepared
    pub fn from_query(query: &Query) -> Self {
        let mut request = SearchRequest {
            offset: query.offset(),
            hits: query.hits(),
            timeout_ms: query.time_left().as_millis() as u64,
            ranking: query.ranking().to_string(),
            summary_class: query.summary().unwrap_or_default().to_string(),
            sorting: query
                .sorting()
                .map(|sorting| sorting.to_sort_fields())
                .unwrap_or_default(),
            query_tree_blob: query.query_tree().as_bytes().to_vec(),
            ..Default::default()
        };
        query
            .rank_features()
            .add_to_request(&mut request, query.include_query_data());
        query.rank_properties().add_to_request(&mut request);
        request
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcHit {
    pub gid: GlobalId,
    pub relevance: f64,
    pub sort_data: Vec<u8>,
    pub distribution_key: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: u32,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchReply {
    pub total_hits: u64,
    pub hits: Vec<RpcHit>,
    pub coverage_docs: u64,
    pub active_docs: u64,
    pub soon_active_docs: u64,
    pub nodes_queried: u32,
    pub nodes_replied: u32,
    pub degraded_reasons: Vec<i32>,
    pub errors: Vec<RpcError>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocsumRequest {
    pub summary_class: String,
    pub ranking: String,
    pub gids: Vec<GlobalId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcDocsum {
    pub gid: GlobalId,
    /// JSON object with the summary fields
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocsumReply {
    pub docsums: Vec<RpcDocsum>,
    pub errors: Vec<RpcError>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RpcMessage {
    Search(SearchRequest),
    GetDocsums(DocsumRequest),
    SearchReply(SearchReply),
    DocsumReply(DocsumReply),
    Error(RpcError),
}

impl RpcMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            RpcMessage::Search(_) => "search request",
            RpcMessage::GetDocsums(_) => "docsum request",
            RpcMessage::SearchReply(_) => "search reply",
            RpcMessage::DocsumReply(_) => "docsum reply",
            RpcMessage::Error(_) => "error",
        }
    }

    /// Length-prefixed frame
    pub fn encode(&self) -> CodecResult<Vec<u8>> {
        let body = bincode::serialize(self)?;
        if body.len() > MAX_FRAME_SIZE {
            return Err(CodecError::FrameTooLarge {
                size: body.len(),
                limit: MAX_FRAME_SIZE,
            });
        }
        let mut frame = Vec::with_capacity(4 + body.len());
        frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
        frame.extend_from_slice(&body);
        Ok(frame)
    }

    /// Decodes a frame body, without its length prefix
    pub fn decode(body: &[u8]) -> CodecResult<Self> {
        Ok(bincode::deserialize(body)?)
    }
}
