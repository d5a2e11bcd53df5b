// -------------------------------------------------------------------------------------------------
//  Copyright (C) 2015-2025 Nautech Systems Pty Ltd. All rights reserved.
//  https://nautechsystems.io
//
//  Licensed under the GNU Lesser General Public License Version 3.0 (the "License");
//  You may not use this file except in compliance with the License.
//  You may obtain a copy of the License at https://www.gnu.org/licenses/lgpl-3.0.en.html
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.
// -------------------------------------------------------------------------------------------------

//! Tagged JSON wire codec.
//!
//! Every frame and HTTP body exchanged between the explorer client and server is wrapped in an
//! envelope which carries the plain JSON body plus annotations for values that plain JSON cannot
//! represent faithfully:
//!
//! ```json
//! { "json": { "supply": "1000" }, "meta": { "values": { "supply": ["custom", "num"] } } }
//! ```
//!
//! Paths are dot-separated object keys and array indices, with a literal `.` inside a key escaped
//! as `\.`. When the whole body is a custom value, `meta.values` holds the annotation directly.
//!
//! Decoding is strict by default: an unknown tag or a value that fails validation is an error.
//! [`DecodeMode::Lenient`] replaces invalid values with the tag's fallback, and values under an
//! unknown tag with `null`, and logs a warning.

use std::{
    fmt::Debug,
    str::FromStr,
    sync::{Arc, LazyLock},
};

use ahash::AHashMap;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::{
    consts::{TAG_BIGINT, TAG_NUMERIC, TAG_NUMERIC_LEGACY},
    numeric::{NUMERIC_MARKER, Numeric},
};

const ENVELOPE_JSON: &str = "json";
const ENVELOPE_META: &str = "meta";
const META_VALUES: &str = "values";
const ANNOTATION_CUSTOM: &str = "custom";

static DEFAULT_CODEC: LazyLock<WireCodec> = LazyLock::new(WireCodec::default);

/// Errors raised while encoding or decoding wire envelopes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The text was not valid JSON or did not match the target type.
    #[error("JSON error: {0}")]
    Json(String),
    /// The envelope or its metadata had an unexpected shape.
    #[error("Invalid envelope: {0}")]
    Envelope(String),
    /// An annotated path does not exist in the body.
    #[error("Annotated path '{0}' not found in body")]
    Path(String),
    /// An annotation names a tag with no registered handler.
    #[error("Unknown tag '{tag}' at '{path}'")]
    UnknownTag { path: String, tag: String },
    /// A tagged value failed validation.
    #[error("Invalid '{tag}' value at '{path}': {reason}")]
    InvalidValue {
        path: String,
        tag: String,
        reason: String,
    },
}

impl From<serde_json::Error> for CodecError {
    fn from(error: serde_json::Error) -> Self {
        Self::Json(error.to_string())
    }
}

/// Result type alias for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// How decoding treats values that fail validation.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum DecodeMode {
    /// Fail the whole decode.
    #[default]
    Strict,
    /// Substitute the tag's fallback value and log a warning.
    Lenient,
}

/// Validation and normalization for a single tag.
#[derive(Clone, Copy)]
pub struct TagHandler {
    /// Validates a serialized value and returns its canonical JSON form.
    pub decode: fn(&Value) -> Result<Value, String>,
    /// Value substituted in lenient mode when validation fails.
    pub fallback: fn() -> Value,
}

impl Debug for TagHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(TagHandler)).finish_non_exhaustive()
    }
}

fn decode_numeric(value: &Value) -> Result<Value, String> {
    let parsed = match value {
        Value::String(s) => Numeric::from_str(s).map_err(|e| e.to_string())?,
        Value::Number(n) => Numeric::from_str(&n.to_string()).map_err(|e| e.to_string())?,
        other => return Err(format!("expected string, was {other}")),
    };
    Ok(Value::String(parsed.to_string()))
}

fn numeric_fallback() -> Value {
    Value::String(Numeric::zero().to_string())
}

const NUMERIC_HANDLER: TagHandler = TagHandler {
    decode: decode_numeric,
    fallback: numeric_fallback,
};

/// Registry of known value tags.
///
/// Custom tags are annotated as `["custom", <tag>]`; builtin tags as a bare string.
#[derive(Clone, Debug)]
pub struct TagRegistry {
    custom: AHashMap<String, TagHandler>,
    builtin: AHashMap<String, TagHandler>,
}

impl Default for TagRegistry {
    fn default() -> Self {
        let mut registry = Self {
            custom: AHashMap::new(),
            builtin: AHashMap::new(),
        };
        registry.register_custom(TAG_NUMERIC, NUMERIC_HANDLER);
        registry.register_custom(TAG_NUMERIC_LEGACY, NUMERIC_HANDLER);
        registry.builtin.insert(TAG_BIGINT.to_string(), NUMERIC_HANDLER);
        registry
    }
}

impl TagRegistry {
    /// Registers (or replaces) a custom tag handler.
    pub fn register_custom(&mut self, tag: &str, handler: TagHandler) {
        self.custom.insert(tag.to_string(), handler);
    }

    fn resolve(&self, path: &str, annotation: &Value) -> CodecResult<(String, Option<TagHandler>)> {
        match annotation {
            Value::String(tag) => Ok((tag.clone(), self.builtin.get(tag).copied())),
            Value::Array(parts) => match parts.as_slice() {
                [Value::String(kind), Value::String(tag)] if kind == ANNOTATION_CUSTOM => {
                    Ok((tag.clone(), self.custom.get(tag).copied()))
                }
                _ => Err(CodecError::Envelope(format!(
                    "unsupported annotation at '{path}': {annotation}"
                ))),
            },
            other => Err(CodecError::Envelope(format!(
                "unsupported annotation at '{path}': {other}"
            ))),
        }
    }
}

/// Encoder/decoder for tagged wire envelopes.
#[derive(Clone, Debug, Default)]
pub struct WireCodec {
    registry: Arc<TagRegistry>,
    mode: DecodeMode,
}

impl WireCodec {
    /// Creates a new [`WireCodec`] instance.
    #[must_use]
    pub fn new(registry: TagRegistry, mode: DecodeMode) -> Self {
        Self {
            registry: Arc::new(registry),
            mode,
        }
    }

    /// Creates a codec over the default registry which tolerates invalid tagged values.
    #[must_use]
    pub fn lenient() -> Self {
        Self::new(TagRegistry::default(), DecodeMode::Lenient)
    }

    /// Returns the decode mode.
    #[must_use]
    pub const fn mode(&self) -> DecodeMode {
        self.mode
    }

    /// Encodes `value` into an envelope value.
    ///
    /// # Errors
    ///
    /// Returns an error if `value` cannot be serialized.
    pub fn encode_value<T: Serialize + ?Sized>(&self, value: &T) -> CodecResult<Value> {
        let mut body = serde_json::to_value(value)?;
        let mut annotations = Map::new();
        let mut root = None;
        let mut path = Vec::new();
        collect_numerics(&mut body, &mut path, &mut annotations, &mut root);

        let mut envelope = Map::new();
        envelope.insert(ENVELOPE_JSON.to_string(), body);

        let values = match root {
            Some(annotation) => Some(annotation),
            None if annotations.is_empty() => None,
            None => Some(Value::Object(annotations)),
        };

        if let Some(values) = values {
            let mut meta = Map::new();
            meta.insert(META_VALUES.to_string(), values);
            envelope.insert(ENVELOPE_META.to_string(), Value::Object(meta));
        }

        Ok(Value::Object(envelope))
    }

    /// Encodes `value` into envelope text.
    ///
    /// # Errors
    ///
    /// Returns an error if `value` cannot be serialized.
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> CodecResult<String> {
        let envelope = self.encode_value(value)?;
        Ok(serde_json::to_string(&envelope)?)
    }

    /// Decodes envelope text into its plain JSON body with tagged values normalized.
    ///
    /// Text without a top-level `json` key is returned as plain JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not JSON or, in strict mode, if a tagged value is invalid.
    pub fn decode_value(&self, text: &str) -> CodecResult<Value> {
        let raw: Value = serde_json::from_str(text)?;
        self.unwrap_envelope(raw)
    }

    /// Decodes envelope text into `T`.
    ///
    /// # Errors
    ///
    /// Returns an error if decoding fails or the body does not match `T`.
    pub fn decode<T: DeserializeOwned>(&self, text: &str) -> CodecResult<T> {
        let body = self.decode_value(text)?;
        Ok(serde_json::from_value(body)?)
    }

    /// Unwraps an already parsed envelope value.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata is malformed or, in strict mode, a tagged value is invalid.
    pub fn unwrap_envelope(&self, raw: Value) -> CodecResult<Value> {
        let Value::Object(mut envelope) = raw else {
            return Ok(raw);
        };

        let Some(mut body) = envelope.remove(ENVELOPE_JSON) else {
            return Ok(Value::Object(envelope));
        };

        let values = match envelope.remove(ENVELOPE_META) {
            None | Some(Value::Null) => return Ok(body),
            Some(Value::Object(mut meta)) => meta.remove(META_VALUES),
            Some(other) => {
                return Err(CodecError::Envelope(format!(
                    "'meta' must be an object, was {other}"
                )));
            }
        };

        match values {
            None | Some(Value::Null) => {}
            Some(Value::Object(paths)) => {
                for (path, annotation) in &paths {
                    self.apply_annotation(&mut body, path, annotation)?;
                }
            }
            Some(annotation @ (Value::Array(_) | Value::String(_))) => {
                self.apply_annotation(&mut body, "", &annotation)?;
            }
            Some(other) => {
                return Err(CodecError::Envelope(format!(
                    "'meta.values' must be an object or annotation, was {other}"
                )));
            }
        }

        Ok(body)
    }

    fn apply_annotation(&self, body: &mut Value, path: &str, annotation: &Value) -> CodecResult<()> {
        let (tag, handler) = self.registry.resolve(path, annotation)?;

        let Some(handler) = handler else {
            let error = CodecError::UnknownTag {
                path: path.to_string(),
                tag,
            };
            self.tolerate(error)?;
            if let Some(target) = navigate_mut(body, &split_path(path)) {
                *target = Value::Null;
            }
            return Ok(());
        };

        let Some(target) = navigate_mut(body, &split_path(path)) else {
            return self.tolerate(CodecError::Path(path.to_string()));
        };

        match (handler.decode)(target) {
            Ok(normalized) => {
                *target = normalized;
                Ok(())
            }
            Err(reason) => {
                let error = CodecError::InvalidValue {
                    path: path.to_string(),
                    tag,
                    reason,
                };
                self.tolerate(error)?;
                *target = (handler.fallback)();
                Ok(())
            }
        }
    }

    fn tolerate(&self, error: CodecError) -> CodecResult<()> {
        match self.mode {
            DecodeMode::Strict => Err(error),
            DecodeMode::Lenient => {
                tracing::warn!("Tolerating wire decode error: {error}");
                Ok(())
            }
        }
    }
}

/// Encodes `value` with the default strict codec.
///
/// # Errors
///
/// Returns an error if `value` cannot be serialized.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> CodecResult<String> {
    DEFAULT_CODEC.encode(value)
}

/// Encodes `value` into an envelope value with the default strict codec.
///
/// # Errors
///
/// Returns an error if `value` cannot be serialized.
pub fn encode_value<T: Serialize + ?Sized>(value: &T) -> CodecResult<Value> {
    DEFAULT_CODEC.encode_value(value)
}

/// Decodes `text` with the default strict codec.
///
/// # Errors
///
/// Returns an error if decoding fails or the body does not match `T`.
pub fn decode<T: DeserializeOwned>(text: &str) -> CodecResult<T> {
    DEFAULT_CODEC.decode(text)
}

fn collect_numerics(
    value: &mut Value,
    path: &mut Vec<String>,
    annotations: &mut Map<String, Value>,
    root: &mut Option<Value>,
) {
    if let Some(digits) = numeric_marker(value) {
        *value = Value::String(digits);
        let annotation = Value::Array(vec![
            Value::String(ANNOTATION_CUSTOM.to_string()),
            Value::String(TAG_NUMERIC.to_string()),
        ]);
        if path.is_empty() {
            *root = Some(annotation);
        } else {
            annotations.insert(join_path(path), annotation);
        }
        return;
    }

    match value {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                path.push(key.clone());
                collect_numerics(child, path, annotations, root);
                path.pop();
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter_mut().enumerate() {
                path.push(index.to_string());
                collect_numerics(child, path, annotations, root);
                path.pop();
            }
        }
        _ => {}
    }
}

fn numeric_marker(value: &Value) -> Option<String> {
    let Value::Object(map) = value else {
        return None;
    };

    if map.len() != 1 {
        return None;
    }

    match map.get(NUMERIC_MARKER) {
        Some(Value::String(digits)) => Some(digits.clone()),
        _ => None,
    }
}

fn join_path(segments: &[String]) -> String {
    segments
        .iter()
        .map(|segment| segment.replace('.', "\\."))
        .collect::<Vec<_>>()
        .join(".")
}

fn split_path(path: &str) -> Vec<String> {
    if path.is_empty() {
        return Vec::new();
    }

    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = path.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'.') => {
                current.push('.');
                chars.next();
            }
            '.' => segments.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    segments.push(current);
    segments
}

fn navigate_mut<'a>(value: &'a mut Value, segments: &[String]) -> Option<&'a mut Value> {
    let mut current = value;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get_mut(segment)?,
            Value::Array(items) => items.get_mut(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}
