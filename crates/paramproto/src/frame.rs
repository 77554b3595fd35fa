//! Text frame protocol spoken over the WebSocket.
//!
//! ## Wire Format
//!
//! Every message is one UTF-8 text frame:
//!
//! ```text
//! GET schema.json                    client → remote   request the schema
//! POST schema.json?schema=<json>     remote → client   schema payload
//! POST <path>?value=<value>          both directions   set / report a value
//! confirm                            client → remote   confirm
//! disconnect                         client → remote   graceful close notice
//! ```
//!
//! Values are not escaped. An inbound value frame is split at the *first*
//! `?value=`, so a value that itself contains `?value=` or `&` survives
//! intact, but a path containing `?value=` cannot be represented.

use crate::schema::{Schema, SchemaError};
use crate::value::ParamValue;

pub const SCHEMA_REQUEST: &str = "GET schema.json";
pub const SCHEMA_RESPONSE_PREFIX: &str = "POST schema.json?schema=";
pub const VALUE_PREFIX: &str = "POST ";
pub const VALUE_SEPARATOR: &str = "?value=";
pub const CONFIRM: &str = "confirm";
pub const DISCONNECT: &str = "disconnect";

/// One decoded text frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    SchemaRequest,
    Schema(Schema),
    /// The value is kept as raw text; the receiving param coerces it.
    Value { path: String, value: String },
    Confirm,
    Disconnect,
}

/// Errors during frame parsing
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("Unrecognized frame: {0:?}")]
    Unrecognized(String),
    #[error("Value frame has no {VALUE_SEPARATOR} separator: {0:?}")]
    MissingValue(String),
    #[error("Value frame has an empty path")]
    EmptyPath,
    #[error("Bad schema payload: {0}")]
    Schema(#[from] SchemaError),
}

impl Frame {
    /// Build an outbound value frame from a canonical value.
    pub fn value(path: impl Into<String>, value: &ParamValue) -> Self {
        Frame::Value {
            path: path.into(),
            value: value.to_string(),
        }
    }

    /// Parse a received text frame.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        if let Some(json) = text.strip_prefix(SCHEMA_RESPONSE_PREFIX) {
            return Ok(Frame::Schema(Schema::from_json(json)?));
        }

        if let Some(rest) = text.strip_prefix(VALUE_PREFIX) {
            let (path, value) = rest
                .split_once(VALUE_SEPARATOR)
                .ok_or_else(|| FrameError::MissingValue(text.to_string()))?;
            if path.is_empty() {
                return Err(FrameError::EmptyPath);
            }
            return Ok(Frame::Value {
                path: path.to_string(),
                value: value.to_string(),
            });
        }

        match text.trim() {
            SCHEMA_REQUEST => Ok(Frame::SchemaRequest),
            CONFIRM => Ok(Frame::Confirm),
            DISCONNECT => Ok(Frame::Disconnect),
            _ => Err(FrameError::Unrecognized(text.to_string())),
        }
    }

    /// Encode for sending.
    pub fn to_text(&self) -> String {
        match self {
            Frame::SchemaRequest => SCHEMA_REQUEST.to_string(),
            Frame::Schema(schema) => format!("{}{}", SCHEMA_RESPONSE_PREFIX, schema.to_json()),
            Frame::Value { path, value } => {
                format!("{}{}{}{}", VALUE_PREFIX, path, VALUE_SEPARATOR, value)
            }
            Frame::Confirm => CONFIRM.to_string(),
            Frame::Disconnect => DISCONNECT.to_string(),
        }
    }

    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::SchemaRequest => "schema-request",
            Frame::Schema(_) => "schema",
            Frame::Value { .. } => "value",
            Frame::Confirm => "confirm",
            Frame::Disconnect => "disconnect",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ParamType;

    #[test]
    fn outbound_encodings() {
        assert_eq!(Frame::SchemaRequest.to_text(), "GET schema.json");
        assert_eq!(Frame::Confirm.to_text(), "confirm");
        assert_eq!(Frame::Disconnect.to_text(), "disconnect");
        assert_eq!(
            Frame::value("/osc/freq", &ParamValue::Float(440.5)).to_text(),
            "POST /osc/freq?value=440.5"
        );
        assert_eq!(
            Frame::value("/on", &ParamValue::Bool(true)).to_text(),
            "POST /on?value=true"
        );
    }

    #[test]
    fn parses_schema_response() {
        let frame =
            Frame::parse(r#"POST schema.json?schema=[{"path":"/a","type":"i","value":"5"}]"#)
                .unwrap();
        match frame {
            Frame::Schema(schema) => {
                assert_eq!(schema.len(), 1);
                assert_eq!(schema.descriptors()[0].path, "/a");
                assert_eq!(schema.descriptors()[0].ty, ParamType::Int);
            }
            other => panic!("expected schema, got {:?}", other),
        }
    }

    #[test]
    fn parses_value_frames() {
        assert_eq!(
            Frame::parse("POST /a?value=7").unwrap(),
            Frame::Value {
                path: "/a".into(),
                value: "7".into()
            }
        );
        // empty value is still a value
        assert_eq!(
            Frame::parse("POST /name?value=").unwrap(),
            Frame::Value {
                path: "/name".into(),
                value: String::new()
            }
        );
    }

    #[test]
    fn value_split_happens_at_first_separator() {
        assert_eq!(
            Frame::parse("POST /url?value=http://x/?value=1&b=2").unwrap(),
            Frame::Value {
                path: "/url".into(),
                value: "http://x/?value=1&b=2".into()
            }
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            Frame::parse("POST /a=7"),
            Err(FrameError::MissingValue(_))
        ));
        assert!(matches!(
            Frame::parse("POST ?value=7"),
            Err(FrameError::EmptyPath)
        ));
        assert!(matches!(
            Frame::parse("hello"),
            Err(FrameError::Unrecognized(_))
        ));
        assert!(matches!(
            Frame::parse("POST schema.json?schema={nope"),
            Err(FrameError::Schema(_))
        ));
    }

    #[test]
    fn control_frames_parse() {
        assert_eq!(Frame::parse("GET schema.json").unwrap(), Frame::SchemaRequest);
        assert_eq!(Frame::parse("disconnect").unwrap(), Frame::Disconnect);
        assert_eq!(Frame::parse("confirm").unwrap(), Frame::Confirm);
    }
}
