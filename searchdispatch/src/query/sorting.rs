// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Sort specifications
//!
//! A sort specification is a whitespace separated list of sort criteria, e.g.
//! `-year +lowercase(title) +uca(author,nb_NO,SECONDARY)`. It is parsed once into a
//! [`Sorting`] and both wire encodings are derived from that parsed form.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use super::collation::{Collator, Strength, ROOT_LOCALE};
use super::error::ArgumentError;
use crate::protocol::rpc::SortField;

const LEGAL_ATTRIBUTE_NAME: &str = r"[\[]*[a-zA-Z_][\.a-zA-Z0-9_-]*[\]]*";

static ATTRIBUTE_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!("^{}$", LEGAL_ATTRIBUTE_NAME)).expect("attribute pattern is a valid regex")
});

const LOWERCASE: &str = "lowercase";
const RAW: &str = "raw";
const UCA: &str = "uca";

/// Sort direction of one field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Order {
    Ascending,
    Descending,
    /// No sign was given; kept as-is until a wire encoding needs a direction
    Undefined,
}

impl Order {
    /// Resolves the direction at a wire boundary. Only an explicit ascending order is
    /// ascending; an undefined order goes out descending.
    pub fn is_ascending(self) -> bool {
        matches!(self, Order::Ascending)
    }

    /// Sign sent to backends
    fn wire_sign(self) -> char {
        if self.is_ascending() {
            '+'
        } else {
            '-'
        }
    }

    /// Sign shown to callers; undefined displays as `+`
    fn display_sign(self) -> char {
        match self {
            Order::Descending => '-',
            Order::Ascending | Order::Undefined => '+',
        }
    }
}

/// A field value as seen by the container-side comparators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Long(i64),
    Double(f64),
    String(String),
}

static NULL_VALUE: FieldValue = FieldValue::Null;

impl FieldValue {
    fn type_rank(&self) -> u8 {
        match self {
            FieldValue::Null => 0,
            FieldValue::Bool(_) => 1,
            FieldValue::Long(_) | FieldValue::Double(_) => 2,
            FieldValue::String(_) => 3,
        }
    }

    /// Natural ordering of the value's type. Values of different types order by type.
    pub fn natural_cmp(&self, other: &FieldValue) -> Ordering {
        match (self, other) {
            (FieldValue::Bool(a), FieldValue::Bool(b)) => a.cmp(b),
            (FieldValue::Long(a), FieldValue::Long(b)) => a.cmp(b),
            (FieldValue::Double(a), FieldValue::Double(b)) => a.total_cmp(b),
            (FieldValue::Long(a), FieldValue::Double(b)) => (*a as f64).total_cmp(b),
            (FieldValue::Double(a), FieldValue::Long(b)) => a.total_cmp(&(*b as f64)),
            (FieldValue::String(a), FieldValue::String(b)) => a.cmp(b),
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }
}

impl From<&serde_json::Value> for FieldValue {
    fn from(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => FieldValue::Null,
            serde_json::Value::Bool(b) => FieldValue::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => FieldValue::Long(i),
                None => FieldValue::Double(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => FieldValue::String(s.clone()),
            other => FieldValue::String(other.to_string()),
        }
    }
}

/// Anything whose fields can be looked up by name for sorting
pub trait SortableFields {
    fn field(&self, name: &str) -> Option<&FieldValue>;
}

/// How one attribute is sorted
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AttributeSorter {
    Plain(String),
    Raw(String),
    LowerCase(String),
    LocaleAware { name: String, collator: Collator },
}

impl AttributeSorter {
    pub fn plain(name: &str) -> Result<Self, ArgumentError> {
        Ok(AttributeSorter::Plain(validate_name(name)?))
    }

    pub fn raw(name: &str) -> Result<Self, ArgumentError> {
        Ok(AttributeSorter::Raw(validate_name(name)?))
    }

    pub fn lowercase(name: &str) -> Result<Self, ArgumentError> {
        Ok(AttributeSorter::LowerCase(validate_name(name)?))
    }

    pub fn locale_aware(
        name: &str,
        locale: Option<&str>,
        strength: Strength,
    ) -> Result<Self, ArgumentError> {
        let name = validate_name(name)?;
        let collator = Collator::new(locale.unwrap_or(ROOT_LOCALE), strength)?;
        Ok(AttributeSorter::LocaleAware { name, collator })
    }

    /// The attribute this sorter reads
    pub fn name(&self) -> &str {
        match self {
            AttributeSorter::Plain(name)
            | AttributeSorter::Raw(name)
            | AttributeSorter::LowerCase(name) => name,
            AttributeSorter::LocaleAware { name, .. } => name,
        }
    }

    pub fn compare(&self, a: &FieldValue, b: &FieldValue) -> Ordering {
        match (self, a, b) {
            (AttributeSorter::LowerCase(_), FieldValue::String(x), FieldValue::String(y)) => x
                .chars()
                .flat_map(char::to_lowercase)
                .cmp(y.chars().flat_map(char::to_lowercase)),
            (
                AttributeSorter::LocaleAware { collator, .. },
                FieldValue::String(x),
                FieldValue::String(y),
            ) => collator.compare(x, y),
            _ => a.natural_cmp(b),
        }
    }
}

impl fmt::Display for AttributeSorter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeSorter::Plain(name) | AttributeSorter::Raw(name) => write!(f, "{}", name),
            AttributeSorter::LowerCase(name) => write!(f, "{}({})", LOWERCASE, name),
            AttributeSorter::LocaleAware { name, collator } => write!(
                f,
                "{}({},{},{})",
                UCA,
                name,
                collator.locale(),
                collator.strength().canonical_name()
            ),
        }
    }
}

fn validate_name(name: &str) -> Result<String, ArgumentError> {
    if ATTRIBUTE_NAME.is_match(name) {
        Ok(name.to_string())
    } else {
        Err(ArgumentError::IllegalAttributeName {
            name: name.to_string(),
            pattern: LEGAL_ATTRIBUTE_NAME.to_string(),
        })
    }
}

/// An attribute and how it should be sorted
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldOrder {
    sorter: AttributeSorter,
    order: Order,
}

impl FieldOrder {
    pub fn new(sorter: AttributeSorter, order: Order) -> Self {
        Self { sorter, order }
    }

    pub fn field_name(&self) -> &str {
        self.sorter.name()
    }

    pub fn sorter(&self) -> &AttributeSorter {
        &self.sorter
    }

    pub fn order(&self) -> Order {
        self.order
    }

    /// Returns a copy with an explicit direction
    pub fn with_ascending(&self, ascending: bool) -> Self {
        let order = if ascending {
            Order::Ascending
        } else {
            Order::Descending
        };
        Self::new(self.sorter.clone(), order)
    }

    fn write_wire(&self, buffer: &mut Vec<u8>) {
        buffer.push(self.order.wire_sign() as u8);
        buffer.extend_from_slice(self.sorter.to_string().as_bytes());
    }

    pub fn compare(&self, a: &FieldValue, b: &FieldValue) -> Ordering {
        let ordering = self.sorter.compare(a, b);
        if self.order.is_ascending() {
            ordering
        } else {
            ordering.reverse()
        }
    }
}

impl fmt::Display for FieldOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.order.display_sign(), self.sorter)
    }
}

/// An ordered list of field orders; the first is the primary sort key
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Sorting {
    field_orders: Vec<FieldOrder>,
}

impl Sorting {
    pub fn new(field_orders: Vec<FieldOrder>) -> Self {
        Self { field_orders }
    }

    /// Parses a sort specification. A spec without criteria gives an empty sorting.
    pub fn parse(spec: &str) -> Result<Self, ArgumentError> {
        let field_orders = spec
            .split_whitespace()
            .map(parse_criterion)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { field_orders })
    }

    /// Parses a sort specification, returning `None` when it holds no criteria
    pub fn from_spec(spec: &str) -> Result<Option<Self>, ArgumentError> {
        let sorting = Self::parse(spec)?;
        Ok(if sorting.is_empty() { None } else { Some(sorting) })
    }

    pub fn field_orders(&self) -> &[FieldOrder] {
        &self.field_orders
    }

    pub fn is_empty(&self) -> bool {
        self.field_orders.is_empty()
    }

    /// Writes the legacy sort spec (`+a -lowercase(b)`) and returns the bytes used
    pub fn encode(&self, buffer: &mut Vec<u8>) -> usize {
        let start = buffer.len();
        for (i, field_order) in self.field_orders.iter().enumerate() {
            if i > 0 {
                buffer.push(b' ');
            }
            field_order.write_wire(buffer);
        }
        buffer.len() - start
    }

    /// The legacy sort spec as a string, with every direction resolved
    pub fn to_wire_spec(&self) -> String {
        let mut buffer = Vec::new();
        self.encode(&mut buffer);
        String::from_utf8_lossy(&buffer).into_owned()
    }

    /// The structured form carried by the RPC protocol
    pub fn to_sort_fields(&self) -> Vec<SortField> {
        self.field_orders
            .iter()
            .map(|field_order| SortField {
                field: field_order.field_name().to_string(),
                ascending: field_order.order().is_ascending(),
            })
            .collect()
    }

    /// Compares two items key by key, falling through to the next key on ties
    pub fn compare<T: SortableFields>(&self, a: &T, b: &T) -> Ordering {
        for field_order in &self.field_orders {
            let name = field_order.field_name();
            let left = a.field(name).unwrap_or(&NULL_VALUE);
            let right = b.field(name).unwrap_or(&NULL_VALUE);
            let ordering = field_order.compare(left, right);
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }

    /// Stable in-place sort by this specification
    pub fn sort<T: SortableFields>(&self, items: &mut [T]) {
        items.sort_by(|a, b| self.compare(a, b));
    }
}

impl fmt::Display for Sorting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut buffer = Vec::new();
        self.encode(&mut buffer);
        write!(f, "{}", String::from_utf8_lossy(&buffer))
    }
}

fn parse_criterion(criterion: &str) -> Result<FieldOrder, ArgumentError> {
    let (order, body) = match criterion.chars().next() {
        Some('+') => (Order::Ascending, &criterion[1..]),
        Some('-') => (Order::Descending, &criterion[1..]),
        _ => (Order::Undefined, criterion),
    };

    let sorter = match (body.find('('), body.rfind(')')) {
        (Some(open), Some(close)) if close > open => {
            let function = &body[..open];
            let args = &body[open + 1..close];
            match function.to_ascii_lowercase().as_str() {
                "" => return Err(ArgumentError::MissingSortFunction),
                LOWERCASE => AttributeSorter::lowercase(args)?,
                RAW => AttributeSorter::raw(args)?,
                UCA => parse_uca(args)?,
                _ => return Err(ArgumentError::UnknownSortFunction(function.to_string())),
            }
        }
        _ => AttributeSorter::plain(body)?,
    };

    Ok(FieldOrder::new(sorter, order))
}

/// `uca(field[,locale[,strength]])`
fn parse_uca(args: &str) -> Result<AttributeSorter, ArgumentError> {
    let mut parts = args.splitn(3, ',');
    let field = parts.next().unwrap_or_default();
    let locale = parts.next();
    let strength = match parts.next() {
        Some(token) => token.parse::<Strength>()?,
        None => Strength::Undefined,
    };
    AttributeSorter::locale_aware(field, locale, strength)
}
