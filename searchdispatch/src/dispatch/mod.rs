// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Query dispatch to content nodes
//!
//! [`SearchInvoker`] runs one first-phase query against one node, [`FillInvoker`] fetches
//! summaries, and [`FanOut`] drives both over a whole cluster.

pub mod backend;
pub mod fanout;
pub mod fill;
pub mod invoker;
pub mod result;

pub use backend::BackendSearcher;
pub use fanout::FanOut;
pub use fill::FillInvoker;
pub use invoker::{InvokerState, SearchInvoker};
pub use result::{Hit, SearchResult};
