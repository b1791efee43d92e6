// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! SearchDispatch - query dispatch for partitioned search backends
//!
//! SearchDispatch sits between a search container and its content nodes. It takes an
//! already-parsed [`Query`], encodes it for one of two wire protocols, sends it to one or
//! more node partitions, caches first-phase results and folds per-node coverage into a
//! single report.
//!
//! # Components
//!
//! - **Query state encoding**: sort specifications and rank features, serialized the same
//!   way for the legacy framed-binary protocol and the structured RPC protocol
//! - **Coverage**: degraded-reason bitmasks and coverage merging across nodes
//! - **Result cache**: per-key serialized insert-or-update of full-coverage replies
//! - **Search invoker**: the send/receive/release lifecycle against one node channel
//! - **Fan-out**: one invoker per partition, merged into one [`SearchResult`]
//!
//! # Usage
//!
//! ```ignore
//! let config = DispatchConfig::default();
//! let backend = Arc::new(BackendSearcher::new(&config)?);
//! let connector = TcpConnector::new(config.protocol, config.connect_timeout());
//! let fanout = FanOut::new(backend, Arc::new(connector));
//!
//! let mut query = Query::new("title:rust");
//! query.set_sorting(Sorting::parse("-year +uca(title,en_US,PRIMARY)")?);
//! let result = fanout.search(&query, &nodes);
//! ```

pub mod cache;
pub mod channel;
pub mod config;
pub mod coverage;
pub mod dispatch;
pub mod error;
pub mod node;
pub mod protocol;
pub mod provision;
pub mod query;

pub use cache::{CacheControl, CacheKey, PacketWrapper};
pub use channel::{Channel, ChannelError, ConnectionPool, Request, Response};
pub use config::DispatchConfig;
pub use coverage::{Coverage, DegradedReasons};
pub use dispatch::{
    BackendSearcher, FanOut, FillInvoker, Hit, InvokerState, SearchInvoker, SearchResult,
};
pub use error::{ErrorCode, ErrorMessage};
pub use node::NodeRef;
pub use protocol::ProtocolKind;
pub use query::{
    ArgumentError, AttributeSorter, FeatureValue, FieldOrder, Order, Query, RankFeatures,
    RankProperties, Sorting, Strength, Tensor,
};

/// SearchDispatch version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// SearchDispatch crate name
pub const CRATE_NAME: &str = env!("CARGO_PKG_NAME");
