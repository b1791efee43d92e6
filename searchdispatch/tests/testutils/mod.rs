//! Test utilities for SearchDispatch integration tests
//!
//! - `mock_channel`: scripted channels and pools standing in for content nodes
//! - `fixtures`: queries, backends and canned replies

#![allow(dead_code)]

pub mod fixtures;
pub mod mock_channel;

/// Routes `log` output through the test harness. Safe to call from every test.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
