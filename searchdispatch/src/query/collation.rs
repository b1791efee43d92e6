// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Locale-aware string collation for `uca(...)` sorting
//!
//! The collator validates the locale identifier and implements the usual UCA strength
//! levels over Latin text: base letters first, then accents, then case, then code points.
//! Locale tailorings are left to the content nodes, which do the authoritative sort; the
//! container only needs a stable order when it re-sorts filled hits.

use once_cell::sync::Lazy;
use regex::Regex;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use super::error::ArgumentError;

/// Locale used when `uca(field)` names no locale
pub const ROOT_LOCALE: &str = "root";

static LOCALE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:root|[a-zA-Z]{2,3}(?:[_-][a-zA-Z]{4})?(?:[_-](?:[a-zA-Z]{2}|[0-9]{3}))?(?:[_-][a-zA-Z0-9]{5,8})*)$",
    )
    .expect("locale pattern is a valid regex")
});

/// Collation strength of a `uca` sorter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strength {
    Primary,
    Secondary,
    Tertiary,
    Quaternary,
    Identical,
    Undefined,
}

impl Strength {
    /// Comparison depth; an undefined strength collates as primary
    fn level(self) -> u8 {
        match self {
            Strength::Primary | Strength::Undefined => 1,
            Strength::Secondary => 2,
            Strength::Tertiary => 3,
            Strength::Quaternary => 4,
            Strength::Identical => 5,
        }
    }

    /// Name written into the canonical `uca(...)` form
    pub fn canonical_name(self) -> &'static str {
        match self {
            Strength::Primary | Strength::Undefined => "PRIMARY",
            Strength::Secondary => "SECONDARY",
            Strength::Tertiary => "TERTIARY",
            Strength::Quaternary => "QUATERNARY",
            Strength::Identical => "IDENTICAL",
        }
    }
}

impl fmt::Display for Strength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strength::Undefined => write!(f, "UNDEFINED"),
            other => write!(f, "{}", other.canonical_name()),
        }
    }
}

impl FromStr for Strength {
    type Err = ArgumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "primary" => Ok(Strength::Primary),
            "secondary" => Ok(Strength::Secondary),
            "tertiary" => Ok(Strength::Tertiary),
            "quaternary" => Ok(Strength::Quaternary),
            "identical" => Ok(Strength::Identical),
            _ => Err(ArgumentError::UnknownStrength(s.to_string())),
        }
    }
}

/// Returns whether `locale` is a usable locale identifier
pub fn is_valid_locale(locale: &str) -> bool {
    LOCALE_PATTERN.is_match(locale)
}

/// A collator bound to one locale and strength
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Collator {
    locale: String,
    strength: Strength,
}

/// One collation element: base letter, accent weight and case bit
#[derive(Debug, Clone, Copy)]
struct Element {
    base: char,
    accent: u8,
    upper: bool,
}

impl Collator {
    pub fn new(locale: &str, strength: Strength) -> Result<Self, ArgumentError> {
        if !is_valid_locale(locale) {
            return Err(ArgumentError::InvalidLocale(locale.to_string()));
        }
        Ok(Self {
            locale: locale.to_string(),
            strength,
        })
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    pub fn strength(&self) -> Strength {
        self.strength
    }

    pub fn compare(&self, a: &str, b: &str) -> Ordering {
        let left = elements(a);
        let right = elements(b);
        let level = self.strength.level();

        let primary = cmp_by(&left, &right, |e| e.base as u32);
        if primary != Ordering::Equal || level < 2 {
            return primary;
        }
        let secondary = cmp_by(&left, &right, |e| e.accent as u32);
        if secondary != Ordering::Equal || level < 3 {
            return secondary;
        }
        let tertiary = cmp_by(&left, &right, |e| e.upper as u32);
        if tertiary != Ordering::Equal || level < 5 {
            return tertiary;
        }
        a.cmp(b)
    }
}

fn cmp_by(left: &[Element], right: &[Element], key: impl Fn(&Element) -> u32) -> Ordering {
    left.iter().map(&key).cmp(right.iter().map(&key))
}

fn elements(s: &str) -> Vec<Element> {
    s.chars()
        .map(|c| {
            let lower = c.to_lowercase().next().unwrap_or(c);
            let (base, accent) = fold_accent(lower);
            Element {
                base,
                accent,
                upper: lower != c,
            }
        })
        .collect()
}

/// Splits a lowercase Latin letter into its base letter and an accent weight
fn fold_accent(c: char) -> (char, u8) {
    match c {
        'à' => ('a', 1),
        'á' => ('a', 2),
        'â' => ('a', 3),
        'ã' => ('a', 4),
        'ä' => ('a', 5),
        'å' => ('a', 6),
        'ā' | 'ă' | 'ą' => ('a', 7),
        'ç' | 'ć' | 'č' => ('c', 8),
        'ď' | 'đ' => ('d', 9),
        'è' => ('e', 1),
        'é' => ('e', 2),
        'ê' => ('e', 3),
        'ë' => ('e', 5),
        'ē' | 'ė' | 'ę' | 'ě' => ('e', 7),
        'ì' => ('i', 1),
        'í' => ('i', 2),
        'î' => ('i', 3),
        'ï' => ('i', 5),
        'ł' => ('l', 9),
        'ñ' | 'ń' | 'ň' => ('n', 4),
        'ò' => ('o', 1),
        'ó' => ('o', 2),
        'ô' => ('o', 3),
        'õ' => ('o', 4),
        'ö' => ('o', 5),
        'ø' => ('o', 9),
        'ř' => ('r', 8),
        'ś' | 'š' => ('s', 8),
        'ß' => ('s', 10),
        'ť' => ('t', 8),
        'ù' => ('u', 1),
        'ú' => ('u', 2),
        'û' => ('u', 3),
        'ü' => ('u', 5),
        'ů' => ('u', 6),
        'ý' => ('y', 2),
        'ÿ' => ('y', 5),
        'ź' | 'ż' | 'ž' => ('z', 8),
        'æ' => ('a', 11),
        'œ' => ('o', 11),
        other => (other, 0),
    }
}
