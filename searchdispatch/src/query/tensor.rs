// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Tensor values for rank features
//!
//! Tensors travel opaquely to the content nodes. This module only needs a typed value that
//! can be validated, compared and written to the binary tensor format.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::ArgumentError;
use crate::protocol::error::{CodecError, CodecResult};
use crate::protocol::wire::{WireReader, WireWrite};

/// Format id of the sparse, typed binary tensor encoding
const SPARSE_BINARY_FORMAT: u8 = 1;

static TENSOR_TYPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^tensor(?:<(?:double|float)>)?\(((?:[a-zA-Z_]\w*(?:\{\}|\[\d+\]))(?:,[a-zA-Z_]\w*(?:\{\}|\[\d+\]))*)?\)$")
        .expect("tensor type pattern is a valid regex")
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorCell {
    /// One label per dimension, in type order
    pub address: Vec<String>,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    type_spec: String,
    dimensions: usize,
    cells: Vec<TensorCell>,
}

impl Tensor {
    /// Creates an empty tensor of the given type, e.g. `tensor(x{},y[3])`
    pub fn new(type_spec: &str) -> Result<Self, ArgumentError> {
        let captures = TENSOR_TYPE
            .captures(type_spec)
            .ok_or_else(|| ArgumentError::InvalidTensor(format!("bad type '{}'", type_spec)))?;
        let dimensions = captures
            .get(1)
            .map(|dims| dims.as_str().split(',').count())
            .unwrap_or(0);
        Ok(Self {
            type_spec: type_spec.to_string(),
            dimensions,
            cells: Vec::new(),
        })
    }

    pub fn with_cell(mut self, address: &[&str], value: f64) -> Result<Self, ArgumentError> {
        if address.len() != self.dimensions {
            return Err(ArgumentError::InvalidTensor(format!(
                "address of {} labels for {} dimensions",
                address.len(),
                self.dimensions
            )));
        }
        self.cells.push(TensorCell {
            address: address.iter().map(|label| label.to_string()).collect(),
            value,
        });
        Ok(self)
    }

    pub fn type_spec(&self) -> &str {
        &self.type_spec
    }

    pub fn cells(&self) -> &[TensorCell] {
        &self.cells
    }

    /// Binary tensor format: format id, type, cell count, then cells
    pub fn encode(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(16 + self.cells.len() * 16);
        buffer.put_u8(SPARSE_BINARY_FORMAT);
        buffer.put_str(&self.type_spec);
        buffer.put_u32(self.cells.len() as u32);
        for cell in &self.cells {
            for label in &cell.address {
                buffer.put_str(label);
            }
            buffer.put_f64(cell.value);
        }
        buffer
    }

    pub fn decode(data: &[u8]) -> Result<Self, ArgumentError> {
        Self::read(data).map_err(|e| ArgumentError::InvalidTensor(e.to_string()))
    }

    fn read(data: &[u8]) -> CodecResult<Self> {
        let mut reader = WireReader::new(data);
        let format = reader.get_u8()?;
        if format != SPARSE_BINARY_FORMAT {
            return Err(CodecError::Malformed(format!("tensor format {}", format)));
        }
        let type_spec = reader.get_string("tensor type")?;
        let mut tensor =
            Tensor::new(&type_spec).map_err(|e| CodecError::Malformed(e.to_string()))?;
        let count = reader.get_u32()? as usize;
        for _ in 0..count {
            let mut address = Vec::with_capacity(tensor.dimensions);
            for _ in 0..tensor.dimensions {
                address.push(reader.get_string("tensor label")?);
            }
            let value = reader.get_f64()?;
            tensor.cells.push(TensorCell { address, value });
        }
        Ok(tensor)
    }
}

impl fmt::Display for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{{", self.type_spec)?;
        for (i, cell) in self.cells.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{{{}}}:{}", cell.address.join(","), cell.value)?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_validation() {
        assert!(Tensor::new("tensor(x{})").is_ok());
        assert!(Tensor::new("tensor<float>(x[3],y{})").is_ok());
        assert!(Tensor::new("tensor()").is_ok());
        assert!(Tensor::new("tensor(x)").is_err());
        assert!(Tensor::new("matrix(x{})").is_err());
    }

    #[test]
    fn test_address_must_match_dimensions() {
        let tensor = Tensor::new("tensor(x{},y{})").unwrap();
        assert!(tensor.clone().with_cell(&["a"], 1.0).is_err());
        assert!(tensor.with_cell(&["a", "b"], 1.0).is_ok());
    }

    #[test]
    fn test_binary_format_decodes() {
        let tensor = Tensor::new("tensor(x{})")
            .unwrap()
            .with_cell(&["a"], 1.5)
            .unwrap()
            .with_cell(&["b"], -2.0)
            .unwrap();
        let decoded = Tensor::decode(&tensor.encode()).unwrap();
        assert_eq!(decoded, tensor);
        assert_eq!(decoded.to_string(), "tensor(x{}):{{a}:1.5,{b}:-2}");
    }
}
