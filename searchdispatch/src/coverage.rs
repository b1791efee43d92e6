// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Coverage accounting for a result
//!
//! Each node reports how many documents it searched out of how many were active, and why
//! coverage may have been reduced. Coverage from several nodes is merged into one report.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Causes of reduced coverage; any subset may be set
    #[derive(Default, Serialize, Deserialize)]
    pub struct DegradedReasons: u32 {
        const MATCH_PHASE = 1;
        const TIMEOUT = 2;
        const ADAPTIVE_TIMEOUT = 4;
    }
}

/// Degraded reason codes as they appear in RPC replies
pub mod reason_code {
    pub const MATCH_PHASE: i32 = 1;
    pub const TIMEOUT: i32 = 2;
    pub const ADAPTIVE_TIMEOUT: i32 = 3;
}

impl DegradedReasons {
    /// Maps one RPC reason code; unknown codes map to no reason
    pub fn from_code(code: i32) -> Self {
        match code {
            reason_code::MATCH_PHASE => DegradedReasons::MATCH_PHASE,
            reason_code::TIMEOUT => DegradedReasons::TIMEOUT,
            reason_code::ADAPTIVE_TIMEOUT => DegradedReasons::ADAPTIVE_TIMEOUT,
            _ => DegradedReasons::empty(),
        }
    }

    pub fn to_codes(self) -> Vec<i32> {
        let mut codes = Vec::new();
        if self.contains(DegradedReasons::MATCH_PHASE) {
            codes.push(reason_code::MATCH_PHASE);
        }
        if self.contains(DegradedReasons::TIMEOUT) {
            codes.push(reason_code::TIMEOUT);
        }
        if self.contains(DegradedReasons::ADAPTIVE_TIMEOUT) {
            codes.push(reason_code::ADAPTIVE_TIMEOUT);
        }
        codes
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coverage {
    docs: u64,
    active: u64,
    soon_active: u64,
    nodes: u32,
    nodes_tried: u32,
    result_sets: u32,
    full_result_sets: u32,
    degraded: DegradedReasons,
}

impl Coverage {
    /// Coverage of a single result; one node and one result set when more than one document
    /// was searched
    pub fn new(docs: u64, active: u64) -> Self {
        let implicit = if docs > 1 { 1 } else { 0 };
        Self::with_result_sets(docs, active, implicit, implicit)
    }

    /// One result set from `nodes` nodes; nodes tried defaults to the nodes that replied
    pub fn with_nodes(docs: u64, active: u64, nodes: u32) -> Self {
        Self::with_result_sets(docs, active, nodes, 1)
    }

    pub fn with_result_sets(docs: u64, active: u64, nodes: u32, result_sets: u32) -> Self {
        let mut coverage = Self {
            docs,
            active,
            soon_active: active,
            nodes,
            nodes_tried: nodes,
            result_sets,
            full_result_sets: 0,
            degraded: DegradedReasons::empty(),
        };
        if coverage.full() {
            coverage.full_result_sets = result_sets;
        }
        coverage
    }

    /// Coverage as reported in an RPC reply
    pub fn from_backend(
        docs: u64,
        active: u64,
        nodes_replied: u32,
        nodes_tried: u32,
        soon_active: u64,
        degraded_reasons: &[i32],
    ) -> Self {
        let degraded = degraded_reasons
            .iter()
            .fold(DegradedReasons::empty(), |acc, code| {
                acc | DegradedReasons::from_code(*code)
            });
        Self::with_nodes(docs, active, nodes_replied)
            .set_nodes_tried(nodes_tried)
            .set_soon_active(soon_active)
            .set_degraded(degraded)
    }

    /// Coverage as reported in a legacy result packet; unknown bits are dropped
    pub fn from_bitmask(
        docs: u64,
        active: u64,
        soon_active: u64,
        nodes_replied: u32,
        nodes_tried: u32,
        bitmask: u32,
    ) -> Self {
        Self::with_nodes(docs, active, nodes_replied)
            .set_nodes_tried(nodes_tried)
            .set_soon_active(soon_active)
            .set_degraded(DegradedReasons::from_bits_truncate(bitmask))
    }

    pub fn set_nodes_tried(mut self, nodes_tried: u32) -> Self {
        self.nodes_tried = nodes_tried;
        self
    }

    pub fn set_soon_active(mut self, soon_active: u64) -> Self {
        self.soon_active = soon_active;
        self
    }

    pub fn set_degraded(mut self, degraded: DegradedReasons) -> Self {
        self.degraded = degraded;
        self.full_result_sets = if self.full() { self.result_sets } else { 0 };
        self
    }

    /// Adds another node's coverage to this one
    pub fn merge(&mut self, other: &Coverage) {
        self.docs += other.docs;
        self.active += other.active;
        self.soon_active += other.soon_active;
        self.nodes += other.nodes;
        self.nodes_tried += other.nodes_tried;
        self.result_sets += other.result_sets;
        self.full_result_sets += other.full_result_sets;
        self.degraded |= other.degraded;
    }

    pub fn docs(&self) -> u64 {
        self.docs
    }

    pub fn active(&self) -> u64 {
        self.active
    }

    pub fn soon_active(&self) -> u64 {
        self.soon_active
    }

    pub fn nodes(&self) -> u32 {
        self.nodes
    }

    pub fn nodes_tried(&self) -> u32 {
        self.nodes_tried
    }

    pub fn result_sets(&self) -> u32 {
        self.result_sets
    }

    pub fn full_result_sets(&self) -> u32 {
        self.full_result_sets
    }

    pub fn degraded(&self) -> DegradedReasons {
        self.degraded
    }

    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty()
    }

    pub fn is_degraded_by_match_phase(&self) -> bool {
        self.degraded.contains(DegradedReasons::MATCH_PHASE)
    }

    pub fn is_degraded_by_timeout(&self) -> bool {
        self.degraded.contains(DegradedReasons::TIMEOUT)
    }

    pub fn is_degraded_by_adaptive_timeout(&self) -> bool {
        self.degraded.contains(DegradedReasons::ADAPTIVE_TIMEOUT)
    }

    /// All active documents were searched and nothing degraded the result
    pub fn full(&self) -> bool {
        self.docs == self.active && !self.is_degraded()
    }

    /// Searched share of the active documents, 0 to 100
    pub fn result_percentage(&self) -> u32 {
        if self.result_sets == 0 {
            return 0;
        }
        if self.docs < self.active {
            ((self.docs as f64 * 100.0) / self.active as f64).round() as u32
        } else {
            100
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reasons_fold_into_bitmask() {
        let coverage = Coverage::from_backend(
            10,
            20,
            1,
            1,
            20,
            &[reason_code::TIMEOUT, reason_code::MATCH_PHASE],
        );
        assert_eq!(coverage.degraded().bits(), 3);
        assert!(coverage.is_degraded_by_timeout());
        assert!(coverage.is_degraded_by_match_phase());
        assert!(!coverage.is_degraded_by_adaptive_timeout());
    }

    #[test]
    fn test_unknown_reason_codes_are_ignored() {
        let coverage = Coverage::from_backend(5, 5, 1, 1, 5, &[0, 42, -1]);
        assert!(!coverage.is_degraded());
        assert!(coverage.full());

        let legacy = Coverage::from_bitmask(5, 5, 5, 1, 1, 0xF0 | 4);
        assert_eq!(legacy.degraded(), DegradedReasons::ADAPTIVE_TIMEOUT);
    }

    #[test]
    fn test_nodes_tried_defaults_to_nodes_replied() {
        let coverage = Coverage::with_nodes(100, 100, 3);
        assert_eq!(coverage.nodes_tried(), 3);
        assert_eq!(coverage.result_sets(), 1);
    }

    #[test]
    fn test_implicit_nodes_for_single_result() {
        let many = Coverage::new(2, 10);
        assert_eq!(many.nodes(), 1);
        assert_eq!(many.result_sets(), 1);

        let one = Coverage::new(1, 10);
        assert_eq!(one.nodes(), 0);
        assert_eq!(one.result_sets(), 0);
    }

    #[test]
    fn test_merge_sums_and_ors() {
        let mut total = Coverage::with_nodes(50, 100, 1).set_degraded(DegradedReasons::TIMEOUT);
        total.merge(&Coverage::with_nodes(100, 100, 1));
        assert_eq!(total.docs(), 150);
        assert_eq!(total.active(), 200);
        assert_eq!(total.nodes(), 2);
        assert_eq!(total.result_sets(), 2);
        assert_eq!(total.full_result_sets(), 1);
        assert!(total.is_degraded_by_timeout());
        assert_eq!(total.result_percentage(), 75);
    }

    #[test]
    fn test_result_percentage() {
        assert_eq!(Coverage::new(1, 10).result_percentage(), 0);
        assert_eq!(Coverage::with_nodes(1, 3, 1).result_percentage(), 33);
        assert_eq!(Coverage::with_nodes(12, 10, 1).result_percentage(), 100);
    }

    #[test]
    fn test_reason_codes_round_trip() {
        let reasons = DegradedReasons::MATCH_PHASE | DegradedReasons::ADAPTIVE_TIMEOUT;
        let codes = reasons.to_codes();
        let coverage = Coverage::from_backend(1, 1, 1, 1, 1, &codes);
        assert_eq!(coverage.degraded(), reasons);
    }
}
