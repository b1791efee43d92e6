//! Tests for fanning one query out over several node partitions
//!
//! Uses mock pools for merge and cache behavior, and a small TCP node speaking the RPC
//! protocol for one end-to-end search with summary fill.

#[path = "testutils/mod.rs"]
mod testutils;

use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use searchdispatch::channel::TcpConnector;
use searchdispatch::protocol::rpc::{DocsumReply, RpcDocsum, RpcMessage};
use searchdispatch::{
    ChannelError, ConnectionPool, ErrorCode, FanOut, NodeRef, ProtocolKind, Response, Sorting,
};
use testutils::fixtures::{nodes, query, rpc_backend, rpc_reply};
use testutils::mock_channel::{MockChannel, MockPool};

fn replying_pool(hits_per_node: u8) -> Arc<MockPool> {
    Arc::new(MockPool::new(move |node: &NodeRef| {
        Ok(MockChannel::replying(vec![Response::SearchReply(rpc_reply(
            node,
            hits_per_node,
        ))]))
    }))
}

#[test]
fn test_results_are_merged_by_relevance() {
    testutils::init_logging();
    let pool = replying_pool(4);
    let fanout = FanOut::new(rpc_backend(), Arc::clone(&pool) as Arc<dyn ConnectionPool>);

    let mut query = query("a");
    query.set_window(2, 4);
    let result = fanout.search(&query, &nodes(&[1, 2, 3]));

    assert!(!result.has_errors());
    assert_eq!(result.total_hits, 12);
    assert_eq!(result.hit_count(), 4);
    let relevance: Vec<f64> = result.hits.iter().map(|hit| hit.relevance).collect();
    assert_eq!(relevance, vec![31.0, 30.0, 23.0, 22.0]);
    assert_eq!(result.coverage.unwrap().docs(), 1500);
    assert_eq!(result.coverage.unwrap().nodes(), 3);
    assert!(pool.all_closed_once());
}

#[test]
fn test_every_node_is_asked_for_the_whole_prefix() {
    let pool = replying_pool(2);
    let fanout = FanOut::new(rpc_backend(), Arc::clone(&pool) as Arc<dyn ConnectionPool>);
    let mut query = query("a");
    query.set_window(5, 3);
    let result = fanout.search(&query, &nodes(&[1, 2]));
    // four hits in total, all before the window
    assert_eq!(result.hit_count(), 0);
    assert_eq!(result.total_hits, 4);
}

#[test]
fn test_cached_nodes_are_not_contacted_again() {
    let pool = replying_pool(3);
    let fanout = FanOut::new(rpc_backend(), Arc::clone(&pool) as Arc<dyn ConnectionPool>);
    let query = query("a");
    let all = nodes(&[1, 2]);

    let first = fanout.search(&query, &all);
    assert_eq!(pool.total_opened(), 2);
    let second = fanout.search(&query, &all);
    assert_eq!(pool.total_opened(), 2);
    assert_eq!(first.hits, second.hits);

    let mut uncached = query.clone();
    uncached.set_no_cache(true);
    fanout.search(&uncached, &all);
    assert_eq!(pool.total_opened(), 4);
}

#[test]
fn test_failing_nodes_leave_partial_result() {
    let pool = Arc::new(MockPool::new(|node: &NodeRef| match node.key {
        2 => Err(ChannelError::Io("connection refused".into())),
        3 => Ok(MockChannel::new().then(Err(ChannelError::Timeout))),
        _ => Ok(MockChannel::replying(vec![Response::SearchReply(rpc_reply(
            node, 2,
        ))])),
    }));
    let fanout = FanOut::new(rpc_backend(), Arc::clone(&pool) as Arc<dyn ConnectionPool>);
    let result = fanout.search(&query("a"), &nodes(&[1, 2, 3]));

    assert_eq!(result.hit_count(), 2);
    assert_eq!(result.errors.len(), 2);
    let codes: Vec<ErrorCode> = result.errors.iter().map(|error| error.code).collect();
    assert!(codes.contains(&ErrorCode::BackendCommunicationError));
    assert!(codes.contains(&ErrorCode::Timeout));
    assert!(pool.all_closed_once());
}

/// Serves one RPC search and one summary fetch per connection
fn serve_node(listener: TcpListener, node: NodeRef, connections: usize) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        for _ in 0..connections {
            let (mut stream, _) = listener.accept().unwrap();
            let mut length = [0u8; 4];
            stream.read_exact(&mut length).unwrap();
            let mut body = vec![0u8; u32::from_be_bytes(length) as usize];
            stream.read_exact(&mut body).unwrap();

            let reply = match RpcMessage::decode(&body).unwrap() {
                RpcMessage::Search(_) => RpcMessage::SearchReply(rpc_reply(&node, 2)),
                RpcMessage::GetDocsums(request) => RpcMessage::DocsumReply(DocsumReply {
                    docsums: request
                        .gids
                        .iter()
                        .map(|gid| RpcDocsum {
                            gid: *gid,
                            data: format!(r#"{{"title":"doc {}","node":{}}}"#, gid, node.key)
                                .into_bytes(),
                        })
                        .collect(),
                    errors: vec![],
                }),
                other => panic!("unexpected {}", other.kind()),
            };
            stream.write_all(&reply.encode().unwrap()).unwrap();
        }
    })
}

#[test]
fn test_search_and_fill_over_tcp() {
    testutils::init_logging();
    let mut all = Vec::new();
    let mut servers = Vec::new();
    for key in [1, 2] {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let node = NodeRef::new(key, "127.0.0.1", listener.local_addr().unwrap().port(), 0);
        servers.push(serve_node(listener, node.clone(), 2));
        all.push(node);
    }

    let connector = TcpConnector::new(ProtocolKind::Rpc, Duration::from_secs(1));
    let fanout = FanOut::new(rpc_backend(), Arc::new(connector));
    let mut query = query("a");
    query.set_timeout(Duration::from_secs(5));
    query.set_sorting(Sorting::parse("+title").unwrap());

    let mut result = fanout.search(&query, &all);
    assert!(!result.has_errors(), "{:?}", result.errors);
    assert_eq!(result.hit_count(), 4);

    let filled = fanout.fill(&mut result, &query, &all);
    assert!(!result.has_errors(), "{:?}", result.errors);
    assert_eq!(filled, 4);
    assert!(result.hits.iter().all(|hit| hit.is_filled("default")));

    for server in servers {
        server.join().unwrap();
    }
}
