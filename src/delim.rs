//! Comma-delimited sequence types.
//!
//! Several API fields carry an ordered list encoded on the wire as a single
//! comma-joined JSON string, e.g. `"1,2,3"` for a list of ids. These types
//! hold the in-memory sequence and implement the wire form symmetrically
//! with the fuzzy decoder: a bare number token decodes to a one-element
//! sequence.
//!
//! Absence is modelled with `Option`: a `null` wire value decodes to `None`
//! and `None` encodes back to `null`. An empty sequence encodes to `""`,
//! and `""` decodes to the empty sequence, so `[] -> "" -> []` round-trips
//! exactly.

use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// An ordered list of strings, comma-joined on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DelimString(pub Vec<String>);

impl From<Vec<String>> for DelimString {
    fn from(items: Vec<String>) -> Self {
        Self(items)
    }
}

impl From<Vec<&str>> for DelimString {
    fn from(items: Vec<&str>) -> Self {
        Self(items.into_iter().map(str::to_string).collect())
    }
}

impl Serialize for DelimString {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.join(","))
    }
}

impl<'de> Deserialize<'de> for DelimString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(DelimStringVisitor)
    }
}

struct DelimStringVisitor;

impl Visitor<'_> for DelimStringVisitor {
    type Value = DelimString;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a comma-delimited string")
    }

    fn visit_str<E: de::Error>(self, text: &str) -> Result<Self::Value, E> {
        if text.is_empty() {
            return Ok(DelimString(Vec::new()));
        }
        Ok(DelimString(text.split(',').map(str::to_string).collect()))
    }

    // single bare number token: one-element sequence
    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Self::Value, E> {
        Ok(DelimString(vec![value.to_string()]))
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Self::Value, E> {
        Ok(DelimString(vec![value.to_string()]))
    }

    fn visit_f64<E: de::Error>(self, value: f64) -> Result<Self::Value, E> {
        Ok(DelimString(vec![value.to_string()]))
    }
}

/// An ordered list of 64-bit integers, comma-joined on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DelimInt64(pub Vec<i64>);

impl From<Vec<i64>> for DelimInt64 {
    fn from(items: Vec<i64>) -> Self {
        Self(items)
    }
}

impl Serialize for DelimInt64 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let joined = self
            .0
            .iter()
            .map(|n| n.to_string())
            .collect::<Vec<_>>()
            .join(",");
        serializer.serialize_str(&joined)
    }
}

impl<'de> Deserialize<'de> for DelimInt64 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(DelimInt64Visitor)
    }
}

struct DelimInt64Visitor;

impl Visitor<'_> for DelimInt64Visitor {
    type Value = DelimInt64;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a comma-delimited list of 64-bit integers")
    }

    fn visit_str<E: de::Error>(self, text: &str) -> Result<Self::Value, E> {
        if text.is_empty() {
            return Ok(DelimInt64(Vec::new()));
        }
        let mut items = Vec::new();
        for segment in text.split(',') {
            let parsed = segment.parse::<i64>().map_err(|_| {
                de::Error::custom(format_args!(
                    "cannot parse delimited segment {segment:?} as i64"
                ))
            })?;
            items.push(parsed);
        }
        Ok(DelimInt64(items))
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Self::Value, E> {
        Ok(DelimInt64(vec![value]))
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Self::Value, E> {
        i64::try_from(value)
            .map(|v| DelimInt64(vec![v]))
            .map_err(|_| de::Error::custom(format_args!("{value} does not fit in i64")))
    }
}
