//! Param types and the value coercion table.
//!
//! Remote processes are loose about how they spell values: a boolean may
//! arrive as `true`, `1`, `"True"` or `"0"`, an int as `"5"` or `5.0`. Every
//! value is funnelled through [`ParamType::coerce`] so a [`Param`] only ever
//! stores the canonical form for its type.
//!
//! | type | canonical form |
//! |------|----------------|
//! | `s`  | [`ParamValue::Text`] |
//! | `b`  | [`ParamValue::Bool`], false iff `"false"`/`"0"` (any case) or numeric zero |
//! | `i`  | [`ParamValue::Int`], leading integer of the text, numbers truncate |
//! | `f`  | [`ParamValue::Float`], leading float of the text |
//! | `v`  | [`ParamValue::Int`], like `i` (triggers carry no real payload) |
//! | `g`  | [`ParamValue::Text`], base64 image data, untouched |
//!
//! Unparseable numbers become [`ParamValue::Nan`]. Callers that resubmit a
//! value are expected to clamp it with [`ParamValue::or_zero`] first.
//!
//! [`Param`]: crate::Param

use std::fmt;

use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The one-letter type tag used on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParamType {
    #[serde(rename = "s")]
    String,
    #[serde(rename = "i")]
    Int,
    #[serde(rename = "f")]
    Float,
    #[serde(rename = "b")]
    Bool,
    #[serde(rename = "v")]
    Void,
    #[serde(rename = "g")]
    Image,
}

impl ParamType {
    /// Parse a wire tag (`"s"`, `"i"`, ...).
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "s" => Some(ParamType::String),
            "i" => Some(ParamType::Int),
            "f" => Some(ParamType::Float),
            "b" => Some(ParamType::Bool),
            "v" => Some(ParamType::Void),
            "g" => Some(ParamType::Image),
            _ => None,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            ParamType::String => "s",
            ParamType::Int => "i",
            ParamType::Float => "f",
            ParamType::Bool => "b",
            ParamType::Void => "v",
            ParamType::Image => "g",
        }
    }

    /// Triggers are actions, not state.
    pub fn is_trigger(&self) -> bool {
        matches!(self, ParamType::Void)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ParamType::Int | ParamType::Float | ParamType::Void)
    }

    /// Value used when neither a value nor a default is known.
    pub fn zero(&self) -> ParamValue {
        match self {
            ParamType::String | ParamType::Image => ParamValue::Text(String::new()),
            ParamType::Int | ParamType::Void => ParamValue::Int(0),
            ParamType::Float => ParamValue::Float(0.0),
            ParamType::Bool => ParamValue::Bool(false),
        }
    }

    /// Convert any JSON value into the canonical form for this type.
    pub fn coerce(&self, value: &Value) -> ParamValue {
        match self {
            ParamType::String | ParamType::Image => ParamValue::Text(stringify(value)),
            ParamType::Bool => ParamValue::Bool(truthy(value)),
            ParamType::Int | ParamType::Void => parse_int(value),
            ParamType::Float => parse_float(value),
        }
    }

    /// Convert raw wire text into the canonical form for this type.
    pub fn coerce_str(&self, raw: &str) -> ParamValue {
        self.coerce(&Value::String(raw.to_string()))
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A canonical param value.
///
/// Serializes to plain JSON (`"text"`, `5`, `0.5`, `true`); [`ParamValue::Nan`]
/// serializes as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// A numeric value that failed to parse.
    Nan,
}

impl ParamValue {
    pub fn is_nan(&self) -> bool {
        matches!(self, ParamValue::Nan)
    }

    /// Replace a failed numeric parse with the type's zero.
    pub fn or_zero(self, ty: ParamType) -> ParamValue {
        match self {
            ParamValue::Nan => ty.zero(),
            other => other,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Float(f) => Some(*f),
            ParamValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Decode base64 image data (for `g` params).
    pub fn image_bytes(&self) -> Option<Vec<u8>> {
        let text = self.as_str()?;
        base64::engine::general_purpose::STANDARD
            .decode(text.trim())
            .ok()
    }

    pub fn to_json(&self) -> Value {
        match self {
            ParamValue::Bool(b) => Value::Bool(*b),
            ParamValue::Int(i) => Value::from(*i),
            ParamValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            ParamValue::Text(s) => Value::String(s.clone()),
            ParamValue::Nan => Value::Null,
        }
    }
}

/// Wire rendering: the text that follows `?value=`.
impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(b) => write!(f, "{}", b),
            ParamValue::Int(i) => write!(f, "{}", i),
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::Text(s) => f.write_str(s),
            ParamValue::Nan => f.write_str("NaN"),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Text(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::Text(v)
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => {
            let lowered = s.trim().to_lowercase();
            !(lowered == "false" || lowered == "0")
        }
        Value::Null => false,
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn parse_int(value: &Value) -> ParamValue {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                ParamValue::Int(i)
            } else {
                match n.as_f64() {
                    Some(f) if f.is_finite() => ParamValue::Int(f.trunc() as i64),
                    _ => ParamValue::Nan,
                }
            }
        }
        Value::String(s) => int_prefix(s).map(ParamValue::Int).unwrap_or(ParamValue::Nan),
        _ => ParamValue::Nan,
    }
}

fn parse_float(value: &Value) -> ParamValue {
    match value {
        Value::Number(n) => n.as_f64().map(ParamValue::Float).unwrap_or(ParamValue::Nan),
        Value::String(s) => float_prefix(s)
            .map(ParamValue::Float)
            .unwrap_or(ParamValue::Nan),
        _ => ParamValue::Nan,
    }
}

/// Leading `[+-]?digits` of `s`, ignoring leading whitespace. `"12px"` → 12.
fn int_prefix(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        end = 1;
    }
    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end == digits_start {
        return None;
    }
    s[..end].parse().ok()
}

/// Leading `[+-]?digits[.digits][e[+-]digits]` of `s`. `"0.5Hz"` → 0.5.
fn float_prefix(s: &str) -> Option<f64> {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        end = 1;
    }

    let mut mantissa_digits = 0;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
        mantissa_digits += 1;
    }
    if end < bytes.len() && bytes[end] == b'.' {
        let mut frac_end = end + 1;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
            mantissa_digits += 1;
        }
        end = frac_end;
    }
    if mantissa_digits == 0 {
        return None;
    }

    if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && (bytes[exp_end] == b'+' || bytes[exp_end] == b'-') {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            end = exp_end;
        }
    }

    s[..end].parse().ok()
}
