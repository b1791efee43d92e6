// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Property map encoding for the legacy protocol
//!
//! Binary Format of one named map:
//! - Name (u32 length + UTF-8)
//! - Entry count (u32)
//! - Entries: key (u32 length + UTF-8), value (u32 length + bytes)
//!
//! Scalar values are written as UTF-8 text, tensor values in the binary tensor format.
//! An empty map is not written at all.

use super::error::CodecResult;
use super::wire::{WireReader, WireWrite};
use crate::query::FeatureValue;

/// Writes `entries` as a map named `name`; returns the number of bytes written
pub fn encode_map<'a, I>(name: &str, entries: I, buffer: &mut Vec<u8>) -> usize
where
    I: IntoIterator<Item = (&'a str, &'a FeatureValue)>,
{
    match EncodedMap::from_entries(name, entries) {
        Some(map) => map.write(buffer),
        None => 0,
    }
}

/// One named map with values in their wire form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedMap {
    pub name: String,
    pub entries: Vec<(String, Vec<u8>)>,
}

impl EncodedMap {
    /// Returns `None` for an empty map, which is never put on the wire
    pub fn from_entries<'a, I>(name: &str, entries: I) -> Option<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a FeatureValue)>,
    {
        let entries: Vec<(String, Vec<u8>)> = entries
            .into_iter()
            .map(|(key, value)| {
                let bytes = match value {
                    FeatureValue::Scalar(text) => text.as_bytes().to_vec(),
                    FeatureValue::Tensor(tensor) => tensor.encode(),
                };
                (key.to_string(), bytes)
            })
            .collect();
        if entries.is_empty() {
            return None;
        }
        Some(Self {
            name: name.to_string(),
            entries,
        })
    }

    pub fn write(&self, buffer: &mut Vec<u8>) -> usize {
        let start = buffer.len();
        buffer.put_str(&self.name);
        buffer.put_u32(self.entries.len() as u32);
        for (key, value) in &self.entries {
            buffer.put_str(key);
            buffer.put_bytes(value);
        }
        buffer.len() - start
    }

    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_slice())
    }
}

pub(crate) fn decode_map(reader: &mut WireReader<'_>) -> CodecResult<EncodedMap> {
    let name = reader.get_string("map name")?;
    let count = reader.get_u32()? as usize;
    let mut entries = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        let key = reader.get_string("map key")?;
        let value = reader.get_bytes()?.to_vec();
        entries.push((key, value));
    }
    Ok(EncodedMap { name, entries })
}
