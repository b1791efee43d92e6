// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Search results returned to callers

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use crate::cache::CachedDocument;
use crate::coverage::Coverage;
use crate::error::ErrorMessage;
use crate::protocol::{CodecError, CodecResult, GlobalId};
use crate::query::{FieldValue, SortableFields, Sorting};

#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub gid: GlobalId,
    pub relevance: f64,
    pub distribution_key: u32,
    /// Backend sort blob; hits from several nodes merge by comparing these bytes
    pub sort_data: Option<Vec<u8>>,
    fields: BTreeMap<String, FieldValue>,
    filled: HashSet<String>,
}

impl Hit {
    pub fn new(gid: GlobalId, relevance: f64, distribution_key: u32) -> Self {
        Self {
            gid,
            relevance,
            distribution_key,
            sort_data: None,
            fields: BTreeMap::new(),
            filled: HashSet::new(),
        }
    }

    pub fn from_cached(doc: &CachedDocument, fallback_distribution_key: Option<u32>) -> Self {
        let distribution_key = match (doc.distribution_key, fallback_distribution_key) {
            (0, Some(fallback)) => fallback,
            (key, _) => key,
        };
        Self {
            sort_data: doc.sort_data.clone(),
            ..Self::new(doc.gid, doc.relevance, distribution_key)
        }
    }

    pub fn is_filled(&self, summary_class: &str) -> bool {
        self.filled.contains(summary_class)
    }

    /// Sets the fields of a summary given as a JSON object
    pub fn fill(&mut self, summary_class: &str, summary: &[u8]) -> CodecResult<()> {
        let value: serde_json::Value = serde_json::from_slice(summary)?;
        let object = value
            .as_object()
            .ok_or_else(|| CodecError::Malformed(format!("summary of {}", self.gid)))?;
        for (name, value) in object {
            self.fields.insert(name.clone(), FieldValue::from(value));
        }
        self.filled.insert(summary_class.to_string());
        Ok(())
    }

    pub fn set_field(&mut self, name: &str, value: FieldValue) {
        self.fields.insert(name.to_string(), value);
    }

    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }
}

impl SortableFields for Hit {
    fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }
}

/// The outcome of one invoker, or of a merge of several
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResult {
    pub hits: Vec<Hit>,
    pub total_hits: u64,
    pub coverage: Option<Coverage>,
    pub errors: Vec<ErrorMessage>,
}

impl SearchResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(error: ErrorMessage) -> Self {
        Self {
            errors: vec![error],
            ..Default::default()
        }
    }

    pub fn add_error(&mut self, error: ErrorMessage) {
        self.errors.push(error);
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn hit_count(&self) -> usize {
        self.hits.len()
    }

    /// Hits not yet filled with `summary_class`
    pub fn unfilled(&self, summary_class: &str) -> impl Iterator<Item = &Hit> {
        let summary_class = summary_class.to_string();
        self.hits
            .iter()
            .filter(move |hit| !hit.is_filled(&summary_class))
    }

    pub fn hit_mut(&mut self, gid: &GlobalId) -> Option<&mut Hit> {
        self.hits.iter_mut().find(|hit| &hit.gid == gid)
    }

    /// Folds another node's result into this one; hits are appended unordered
    pub fn merge(&mut self, other: SearchResult) {
        self.hits.extend(other.hits);
        self.total_hits += other.total_hits;
        self.errors.extend(other.errors);
        match (&mut self.coverage, other.coverage) {
            (Some(coverage), Some(other)) => coverage.merge(&other),
            (None, Some(other)) => self.coverage = Some(other),
            _ => {}
        }
    }

    /// Orders hits as the backends do: by sort blob when sorting, else by relevance
    pub fn sort_first_phase(&mut self, sorted: bool) {
        if sorted {
            self.hits.sort_by(|a, b| match (&a.sort_data, &b.sort_data) {
                (Some(x), Some(y)) => x.cmp(y),
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (None, None) => b.relevance.total_cmp(&a.relevance),
            });
        } else {
            self.hits
                .sort_by(|a, b| b.relevance.total_cmp(&a.relevance));
        }
    }

    /// Re-sorts filled hits with the container-side comparators
    pub fn sort_by(&mut self, sorting: &Sorting) {
        sorting.sort(&mut self.hits);
    }

    /// Keeps `[offset, offset + hits)` of the ordered hits
    pub fn trim(&mut self, offset: u32, hits: u32) {
        let offset = (offset as usize).min(self.hits.len());
        self.hits.drain(..offset);
        self.hits.truncate(hits as usize);
    }
}
