//! Request-construction primitives for the executor.
//!
//! The Go runtime this replaces branched on runtime reflection to decide
//! how a body or query value should be serialized. Here each value kind is
//! an explicit tagged union resolved at the call site: [`Body`] for request
//! payloads and [`ParamValue`] for query parameters.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::error;
use url::Url;

/// Header identifying the SDK on every outbound call, token fetches
/// included. Attached by the transport layer, after caller headers, so it
/// cannot be overridden per request.
pub const APP_ID_HEADER: &str = "x-looker-appid";

/// Value of the [`APP_ID_HEADER`] header.
pub const APP_ID: &str = "rs-sdk";

/// A request body with its serialized text and content type.
///
/// Serialization happens at construction. [`Body::json`] is deliberately
/// lenient: a value that fails to serialize is logged and sent as an empty
/// payload rather than failing the call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    /// Sent verbatim with `Content-Type: text/plain`.
    Plain(String),
    /// Pre-serialized JSON, sent with `Content-Type: application/json`.
    Json(String),
}

impl Body {
    /// A plain-text body.
    pub fn plain(text: impl Into<String>) -> Self {
        Body::Plain(text.into())
    }

    /// A JSON body serialized from `value`.
    ///
    /// On serialization failure the error is logged and the body becomes
    /// empty; the request still goes out. This lenient path is part of the
    /// executor's contract, not an accident.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Self {
        match serde_json::to_string(value) {
            Ok(text) => Body::Json(text),
            Err(err) => {
                error!(error = %err, "error serializing body");
                Body::Json(String::new())
            }
        }
    }

    pub(crate) fn content_type(&self) -> &'static str {
        match self {
            Body::Plain(_) => "text/plain",
            Body::Json(_) => "application/json",
        }
    }

    pub(crate) fn into_text(self) -> String {
        match self {
            Body::Plain(text) | Body::Json(text) => text,
        }
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Body::Plain(text.to_string())
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Body::Plain(text)
    }
}

/// A single query-parameter value.
///
/// Strings are appended verbatim (URL-encoded, never JSON-quoted); any
/// other kind is appended as its JSON text, quotes and all. `Null` and the
/// empty string are skipped entirely.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// Absent value; the parameter is skipped.
    Null,
    /// A string value, appended verbatim.
    Str(String),
    /// Any other value, appended as JSON text.
    Json(serde_json::Value),
}

impl ParamValue {
    /// A structured value serialized to JSON.
    ///
    /// Lenient like [`Body::json`]: a serialization failure is logged and
    /// the parameter is omitted from the query string.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(value) => ParamValue::Json(value),
            Err(err) => {
                error!(error = %err, "error serializing parameter");
                ParamValue::Null
            }
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Str(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Str(value)
    }
}

impl From<&String> for ParamValue {
    fn from(value: &String) -> Self {
        ParamValue::Str(value.clone())
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Json(serde_json::Value::from(value))
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        ParamValue::Json(serde_json::Value::from(value))
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Json(serde_json::Value::from(value))
    }
}

impl From<u32> for ParamValue {
    fn from(value: u32) -> Self {
        ParamValue::Json(serde_json::Value::from(value))
    }
}

impl From<u64> for ParamValue {
    fn from(value: u64) -> Self {
        ParamValue::Json(serde_json::Value::from(value))
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Json(serde_json::Value::from(value))
    }
}

impl<T> From<Option<T>> for ParamValue
where
    T: Into<ParamValue>,
{
    fn from(value: Option<T>) -> Self {
        match value {
            Some(inner) => inner.into(),
            None => ParamValue::Null,
        }
    }
}

/// Query parameters for a single call.
///
/// A `BTreeMap` keeps encoding deterministic (sorted key order); the server
/// is order-insensitive.
pub type ApiParams = BTreeMap<String, ParamValue>;

/// Append `params` to `url` as an encoded query string.
///
/// Skips `Null` values and empty strings. A URL with nothing to append is
/// left untouched, query-less.
pub(crate) fn encode_query(url: &mut Url, params: &ApiParams) {
    let mut pairs: Vec<(&str, String)> = Vec::new();

    for (key, value) in params {
        match value {
            ParamValue::Null => continue,
            ParamValue::Str(text) if text.is_empty() => continue,
            ParamValue::Str(text) => pairs.push((key, text.clone())),
            ParamValue::Json(value) => match serde_json::to_string(value) {
                Ok(text) => pairs.push((key, text)),
                Err(err) => {
                    error!(param = %key, error = %err, "error serializing parameter");
                }
            },
        }
    }

    if pairs.is_empty() {
        return;
    }

    let mut writer = url.query_pairs_mut();
    for (key, value) in pairs {
        writer.append_pair(key, &value);
    }
}

/// Per-call overrides for the executor.
///
/// Fields left `None` fall back to the session's settings. A
/// `CancellationToken` here takes precedence over every timeout, the
/// session's cancellation handle included.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Timeout override in seconds.
    pub timeout: Option<u64>,
    /// `User-Agent` override.
    pub agent_tag: Option<String>,
    /// Extra headers; override session headers on key collision.
    pub headers: Option<HashMap<String, String>>,
    /// Explicit cancellation handle; replaces the deadline entirely.
    pub cancel: Option<CancellationToken>,
}

impl RequestOptions {
    /// Options with only a timeout override.
    pub fn with_timeout(seconds: u64) -> Self {
        Self {
            timeout: Some(seconds),
            ..Self::default()
        }
    }
}
