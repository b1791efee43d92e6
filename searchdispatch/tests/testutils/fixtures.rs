//! Queries, backends and canned node replies

use std::sync::Arc;
use std::time::Duration;

use searchdispatch::protocol::legacy::{CoverageBlock, LegacyDocument, QueryResultPacket};
use searchdispatch::protocol::rpc::{RpcHit, SearchReply};
use searchdispatch::protocol::GlobalId;
use searchdispatch::{BackendSearcher, DispatchConfig, NodeRef, Query};

pub fn gid(n: u8) -> GlobalId {
    GlobalId([n; 12])
}

pub fn query(tree: &str) -> Query {
    let mut query = Query::new(tree);
    query.set_timeout(Duration::from_millis(500));
    query
}

pub fn rpc_backend() -> Arc<BackendSearcher> {
    Arc::new(BackendSearcher::new(&DispatchConfig::default()).expect("default config is valid"))
}

pub fn legacy_backend() -> Arc<BackendSearcher> {
    Arc::new(BackendSearcher::new(&DispatchConfig::legacy()).expect("legacy config is valid"))
}

pub fn nodes(keys: &[u32]) -> Vec<NodeRef> {
    keys.iter()
        .map(|&key| NodeRef::new(key, "localhost", 19100 + key as u16, 0))
        .collect()
}

/// A full-coverage legacy reply with `count` documents of falling rank
pub fn legacy_reply(count: u8, degraded: u32) -> QueryResultPacket {
    QueryResultPacket {
        offset: 0,
        total_hits: u64::from(count),
        max_rank: f64::from(count),
        coverage: Some(CoverageBlock {
            docs: 1000,
            active: 1000,
            soon_active: 1000,
            degraded,
            nodes_queried: 1,
            nodes_replied: 1,
        }),
        documents: (0..count)
            .map(|n| LegacyDocument {
                gid: gid(n),
                metric: f64::from(count - n),
                partition_id: 0,
                distribution_key: 0,
                sort_data: None,
            })
            .collect(),
    }
}

/// An RPC reply for `node`, with gids unique to the node
pub fn rpc_reply(node: &NodeRef, count: u8) -> SearchReply {
    SearchReply {
        total_hits: u64::from(count),
        hits: (0..count)
            .map(|n| RpcHit {
                gid: gid(node.key as u8 * 16 + n),
                relevance: f64::from(node.key) * 10.0 + f64::from(n),
                sort_data: Vec::new(),
                distribution_key: node.key,
            })
            .collect(),
        coverage_docs: 500,
        active_docs: 500,
        soon_active_docs: 500,
        nodes_queried: 1,
        nodes_replied: 1,
        ..Default::default()
    }
}
