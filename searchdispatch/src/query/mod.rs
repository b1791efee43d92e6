// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Query state carried to the content nodes
//!
//! The dispatch layer does not parse queries. A [`Query`] holds an already serialized query
//! tree together with the state that needs encoding: the result window, the time budget,
//! the sort specification and the rank features.

pub mod collation;
pub mod error;
pub mod ranking;
pub mod sorting;
pub mod tensor;

pub use collation::{Collator, Strength};
pub use error::{ArgumentError, ArgumentResult};
pub use ranking::{FeatureValue, RankFeatures, RankProperties};
pub use sorting::{AttributeSorter, FieldOrder, FieldValue, Order, SortableFields, Sorting};
pub use tensor::Tensor;

use std::time::{Duration, Instant};

/// Default time budget of a query
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default number of hits in the result window
pub const DEFAULT_HITS: u32 = 10;

#[derive(Debug, Clone)]
pub struct Query {
    query_tree: String,
    offset: u32,
    hits: u32,
    timeout: Duration,
    start: Instant,
    summary: Option<String>,
    sorting: Option<Sorting>,
    ranking: String,
    rank_features: RankFeatures,
    rank_properties: RankProperties,
    no_cache: bool,
    include_query_data: bool,
    prepared: bool,
}

impl Query {
    pub fn new(query_tree: impl Into<String>) -> Self {
        Self {
            query_tree: query_tree.into(),
            offset: 0,
            hits: DEFAULT_HITS,
            timeout: DEFAULT_TIMEOUT,
            start: Instant::now(),
            summary: None,
            sorting: None,
            ranking: "default".to_string(),
            rank_features: RankFeatures::new(),
            rank_properties: RankProperties::new(),
            no_cache: false,
            include_query_data: false,
            prepared: false,
        }
    }

    pub fn query_tree(&self) -> &str {
        &self.query_tree
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn hits(&self) -> u32 {
        self.hits
    }

    pub fn set_window(&mut self, offset: u32, hits: u32) {
        self.offset = offset;
        self.hits = hits;
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Sets the budget and restarts the clock
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
        self.start = Instant::now();
    }

    /// Remaining budget; zero once the timeout has elapsed
    pub fn time_left(&self) -> Duration {
        self.timeout.saturating_sub(self.start.elapsed())
    }

    pub fn is_timed_out(&self) -> bool {
        self.time_left().is_zero()
    }

    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    pub fn set_summary(&mut self, summary: impl Into<String>) {
        self.summary = Some(summary.into());
    }

    pub fn sorting(&self) -> Option<&Sorting> {
        self.sorting.as_ref()
    }

    /// An empty sort specification is stored as no sorting
    pub fn set_sorting(&mut self, sorting: Sorting) {
        self.sorting = if sorting.is_empty() {
            None
        } else {
            Some(sorting)
        };
    }

    pub fn ranking(&self) -> &str {
        &self.ranking
    }

    pub fn set_ranking(&mut self, profile: impl Into<String>) {
        self.ranking = profile.into();
    }

    pub fn rank_features(&self) -> &RankFeatures {
        &self.rank_features
    }

    pub fn rank_features_mut(&mut self) -> &mut RankFeatures {
        &mut self.rank_features
    }

    pub fn rank_properties(&self) -> &RankProperties {
        &self.rank_properties
    }

    pub fn rank_properties_mut(&mut self) -> &mut RankProperties {
        &mut self.rank_properties
    }

    /// Moves query features into the rank properties; see [`RankFeatures::prepare`].
    /// Only the first call has an effect.
    pub fn prepare(&mut self) {
        if self.prepared {
            return;
        }
        self.rank_features.prepare(&mut self.rank_properties);
        self.prepared = true;
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared
    }

    pub fn no_cache(&self) -> bool {
        self.no_cache
    }

    pub fn set_no_cache(&mut self, no_cache: bool) {
        self.no_cache = no_cache;
    }

    pub fn include_query_data(&self) -> bool {
        self.include_query_data
    }

    pub fn set_include_query_data(&mut self, include: bool) {
        self.include_query_data = include;
    }
}
