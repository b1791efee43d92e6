// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Rank features and rank properties of a query

use std::fmt;

use super::error::ArgumentError;
use super::tensor::Tensor;
use crate::protocol::map_encoder::encode_map;
use crate::protocol::rpc::{SearchRequest, StringProperty, TensorProperty};

/// A rank feature or rank property value
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureValue {
    Scalar(String),
    Tensor(Tensor),
}

impl FeatureValue {
    pub fn is_tensor(&self) -> bool {
        matches!(self, FeatureValue::Tensor(_))
    }
}

impl fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureValue::Scalar(value) => write!(f, "{}", value),
            FeatureValue::Tensor(tensor) => write!(f, "{}", tensor),
        }
    }
}

impl From<&str> for FeatureValue {
    fn from(value: &str) -> Self {
        FeatureValue::Scalar(value.to_string())
    }
}

impl From<String> for FeatureValue {
    fn from(value: String) -> Self {
        FeatureValue::Scalar(value)
    }
}

impl From<Tensor> for FeatureValue {
    fn from(value: Tensor) -> Self {
        FeatureValue::Tensor(value)
    }
}

fn to_rpc_properties<'a, I>(entries: I) -> (Vec<StringProperty>, Vec<TensorProperty>)
where
    I: IntoIterator<Item = (&'a str, &'a FeatureValue)>,
{
    let mut strings = Vec::new();
    let mut tensors = Vec::new();
    for (name, value) in entries {
        match value {
            FeatureValue::Scalar(text) => strings.push(StringProperty {
                name: name.to_string(),
                value: text.clone(),
            }),
            FeatureValue::Tensor(tensor) => tensors.push(TensorProperty {
                name: name.to_string(),
                value: tensor.encode(),
            }),
        }
    }
    (strings, tensors)
}

/// Rank properties: named, possibly repeated values passed to the rank profile
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RankProperties {
    properties: Vec<(String, Vec<FeatureValue>)>,
}

impl RankProperties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a value; earlier values under the same name are kept
    pub fn put(&mut self, name: &str, value: impl Into<FeatureValue>) {
        let value = value.into();
        match self.properties.iter_mut().find(|(n, _)| n == name) {
            Some((_, values)) => values.push(value),
            None => self.properties.push((name.to_string(), vec![value])),
        }
    }

    pub fn get(&self, name: &str) -> Option<&[FeatureValue]> {
        self.properties
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, values)| values.as_slice())
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FeatureValue)> {
        self.properties
            .iter()
            .flat_map(|(name, values)| values.iter().map(move |v| (name.as_str(), v)))
    }

    /// Legacy encoding under the `rank` section
    pub fn encode(&self, buffer: &mut Vec<u8>) -> usize {
        encode_map("rank", self.iter(), buffer)
    }

    pub fn add_to_request(&self, request: &mut SearchRequest) {
        let (strings, tensors) = to_rpc_properties(self.iter());
        request.rank_properties.extend(strings);
        request.tensor_rank_properties.extend(tensors);
    }
}

/// The rank features of a query, in insertion order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RankFeatures {
    features: Vec<(String, FeatureValue)>,
}

impl RankFeatures {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a feature by full name, replacing any previous value
    pub fn put(&mut self, name: &str, value: impl Into<FeatureValue>) {
        let value = value.into();
        match self.features.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => *existing = value,
            None => self.features.push((name.to_string(), value)),
        }
    }

    /// Returns a feature as a string, or `None` if not set
    pub fn get(&self, name: &str) -> Option<String> {
        self.get_value(name).map(|value| value.to_string())
    }

    pub fn get_value(&self, name: &str) -> Option<&FeatureValue> {
        self.features
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, value)| value)
    }

    /// Returns a tensor feature; a scalar under this name is an error
    pub fn get_tensor(&self, name: &str) -> Result<Option<&Tensor>, ArgumentError> {
        match self.get_value(name) {
            None => Ok(None),
            Some(FeatureValue::Tensor(tensor)) => Ok(Some(tensor)),
            Some(other) => Err(ArgumentError::NotATensor {
                name: name.to_string(),
                value: other.to_string(),
            }),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<FeatureValue> {
        let position = self.features.iter().position(|(n, _)| n == name)?;
        Some(self.features.remove(position).1)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get_value(name).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FeatureValue)> {
        self.features.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Moves `query(x)` and `$x` features into the rank properties as `x`.
    ///
    /// Query features are read by the backend from rank properties; this keeps that detail
    /// out of the feature map callers see. Must run once, before encoding.
    pub fn prepare(&mut self, rank_properties: &mut RankProperties) {
        if self.is_empty() {
            return;
        }

        let mut kept = Vec::with_capacity(self.features.len());
        for (name, value) in self.features.drain(..) {
            match query_property_name(&name) {
                Some(stripped) => rank_properties.put(stripped, value),
                None => kept.push((name, value)),
            }
        }
        self.features = kept;
    }

    /// Legacy encoding under the `feature` section
    pub fn encode(&self, buffer: &mut Vec<u8>) -> usize {
        encode_map("feature", self.iter(), buffer)
    }

    pub fn add_to_request(&self, request: &mut SearchRequest, include_query_data: bool) {
        if !include_query_data {
            return;
        }
        let (strings, tensors) = to_rpc_properties(self.iter());
        request.rank_features.extend(strings);
        request.tensor_rank_features.extend(tensors);
    }
}

fn query_property_name(name: &str) -> Option<&str> {
    if let Some(inner) = name
        .strip_prefix("query(")
        .and_then(|rest| rest.strip_suffix(')'))
    {
        Some(inner)
    } else {
        name.strip_prefix('$')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_moves_query_features() {
        let mut features = RankFeatures::new();
        features.put("query(myfeature)", "1.0");
        features.put("$other", "2");
        features.put("fieldMatch(title)", "0.7");

        let mut properties = RankProperties::new();
        features.prepare(&mut properties);

        assert!(!features.contains("query(myfeature)"));
        assert!(!features.contains("$other"));
        assert_eq!(features.get("fieldMatch(title)"), Some("0.7".to_string()));
        assert_eq!(
            properties.get("myfeature"),
            Some(&[FeatureValue::Scalar("1.0".into())][..])
        );
        assert_eq!(
            properties.get("other"),
            Some(&[FeatureValue::Scalar("2".into())][..])
        );
    }

    #[test]
    fn test_prepare_only_strips_once() {
        let mut features = RankFeatures::new();
        features.put("query(query(x))", "1");
        features.put("$$y", "2");

        let mut properties = RankProperties::new();
        features.prepare(&mut properties);

        assert!(features.is_empty());
        assert!(properties.get("query(x)").is_some());
        assert!(properties.get("$y").is_some());
    }

    #[test]
    fn test_get_tensor_rejects_scalars() {
        let mut features = RankFeatures::new();
        features.put("scalar", "1.0");
        features.put("vector", Tensor::new("tensor(x{})").unwrap());

        assert!(features.get_tensor("vector").unwrap().is_some());
        assert!(features.get_tensor("missing").unwrap().is_none());
        assert!(matches!(
            features.get_tensor("scalar"),
            Err(ArgumentError::NotATensor { .. })
        ));
    }

    #[test]
    fn test_rpc_split_by_value_kind() {
        let mut features = RankFeatures::new();
        features.put("a", "1");
        features.put("t", Tensor::new("tensor(x{})").unwrap());

        let mut request = SearchRequest::default();
        features.add_to_request(&mut request, false);
        assert!(request.rank_features.is_empty());
        assert!(request.tensor_rank_features.is_empty());

        features.add_to_request(&mut request, true);
        assert_eq!(request.rank_features.len(), 1);
        assert_eq!(request.rank_features[0].name, "a");
        assert_eq!(request.tensor_rank_features.len(), 1);
        assert_eq!(request.tensor_rank_features[0].name, "t");
    }

    #[test]
    fn test_put_replaces_in_place() {
        let mut features = RankFeatures::new();
        features.put("a", "1");
        features.put("b", "2");
        features.put("a", "3");
        let names: Vec<&str> = features.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(features.get("a"), Some("3".to_string()));
    }
}
