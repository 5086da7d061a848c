//! Structured log fields.
//!
//! A log entry's payload is an ordered list of [`Field`]s. Custom fields are
//! produced per request by [`FieldProvider`]s, which are plain closures over
//! the request head and the live response:
//!
//! ```rust
//! use tsu::{RequestHead, ResponseWriter};
//! use tsu::middleware::{fields, AccessLogConfig, Field};
//!
//! let config = AccessLogConfig::default()
//!     .custom_field(fields::string("app", "billing"))
//!     .custom_field(|req: &RequestHead, _: &ResponseWriter| {
//!         Field::string("trace_id", req.header("x-trace-id").unwrap_or(""))
//!     });
//! ```

use std::borrow::Cow;
use std::fmt;
use std::time::Duration;

use crate::request::RequestHead;
use crate::response::ResponseWriter;

/// A semantic field value. Sinks decide how each kind is encoded.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Str(String),
    Int(i64),
    Uint(u64),
    Float(f64),
    Bool(bool),
    Duration(Duration),
    Bytes(Vec<u8>),
    Error(String),
    /// Debug rendering of a value with no better representation.
    Any(String),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) | Self::Error(s) | Self::Any(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) | Self::Error(s) | Self::Any(s) => write_text(f, s),
            Self::Int(n) => write!(f, "{n}"),
            Self::Uint(n) => write!(f, "{n}"),
            Self::Float(n) => write!(f, "{n}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Duration(d) => write!(f, "{d:?}"),
            Self::Bytes(b) => write_text(f, &String::from_utf8_lossy(b)),
        }
    }
}

/// Bare when safe, quoted and escaped otherwise.
fn write_text(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    if !s.is_empty() && !s.contains(|c: char| c.is_whitespace() || c == '"' || c == '=') {
        f.write_str(s)
    } else {
        write!(f, "{s:?}")
    }
}

/// One key/value pair of a log entry.
#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    key: Cow<'static, str>,
    value: Value,
}

impl Field {
    pub fn new(key: impl Into<Cow<'static, str>>, value: Value) -> Self {
        Self { key: key.into(), value }
    }

    pub fn string(key: impl Into<Cow<'static, str>>, value: impl Into<String>) -> Self {
        Self::new(key, Value::Str(value.into()))
    }

    pub fn int(key: impl Into<Cow<'static, str>>, value: i64) -> Self {
        Self::new(key, Value::Int(value))
    }

    pub fn uint(key: impl Into<Cow<'static, str>>, value: u64) -> Self {
        Self::new(key, Value::Uint(value))
    }

    pub fn float(key: impl Into<Cow<'static, str>>, value: f64) -> Self {
        Self::new(key, Value::Float(value))
    }

    pub fn bool(key: impl Into<Cow<'static, str>>, value: bool) -> Self {
        Self::new(key, Value::Bool(value))
    }

    pub fn duration(key: impl Into<Cow<'static, str>>, value: Duration) -> Self {
        Self::new(key, Value::Duration(value))
    }

    pub fn bytes(key: impl Into<Cow<'static, str>>, value: impl Into<Vec<u8>>) -> Self {
        Self::new(key, Value::Bytes(value.into()))
    }

    /// An `error` field holding the error's display text.
    pub fn error(err: &(dyn std::error::Error + '_)) -> Self {
        Self::new("error", Value::Error(err.to_string()))
    }

    pub fn any(key: impl Into<Cow<'static, str>>, value: &impl fmt::Debug) -> Self {
        Self::new(key, Value::Any(format!("{value:?}")))
    }

    pub fn key(&self) -> &str { &self.key }
    pub fn value(&self) -> &Value { &self.value }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// Produces one field per request.
///
/// Implemented for every `Fn(&RequestHead, &ResponseWriter) -> Field`
/// closure. Providers run after the handler, so they see the final status.
pub trait FieldProvider: Send + Sync + 'static {
    fn field(&self, req: &RequestHead, res: &ResponseWriter) -> Field;
}

impl<F> FieldProvider for F
where
    F: Fn(&RequestHead, &ResponseWriter) -> Field + Send + Sync + 'static,
{
    fn field(&self, req: &RequestHead, res: &ResponseWriter) -> Field {
        self(req, res)
    }
}

/// A provider that always yields the same field.
#[derive(Clone, Debug)]
pub struct Fixed(Field);

impl FieldProvider for Fixed {
    fn field(&self, _req: &RequestHead, _res: &ResponseWriter) -> Field {
        self.0.clone()
    }
}

pub fn string(key: &'static str, value: impl Into<String>) -> Fixed {
    Fixed(Field::string(key, value))
}

pub fn int64(key: &'static str, value: i64) -> Fixed {
    Fixed(Field::int(key, value))
}

pub fn uint64(key: &'static str, value: u64) -> Fixed {
    Fixed(Field::uint(key, value))
}

pub fn float64(key: &'static str, value: f64) -> Fixed {
    Fixed(Field::float(key, value))
}

pub fn any(key: &'static str, value: &impl fmt::Debug) -> Fixed {
    Fixed(Field::any(key, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Request;

    #[test]
    fn renders_key_value_pairs() {
        assert_eq!(Field::uint("status", 404).to_string(), "status=404");
        assert_eq!(Field::string("path", "/a/b").to_string(), "path=/a/b");
        assert_eq!(Field::string("ua", "curl 8").to_string(), r#"ua="curl 8""#);
        assert_eq!(Field::string("query", "").to_string(), r#"query="""#);
        assert_eq!(
            Field::duration("latency", Duration::from_millis(3)).to_string(),
            "latency=3ms"
        );
    }

    #[test]
    fn fixed_and_closure_providers() {
        let req = Request::builder().uri("/x").header("x-trace-id", "t-1").build();
        let res = ResponseWriter::new();

        let fixed = int64("shard", 7);
        assert_eq!(fixed.field(req.head(), &res), Field::int("shard", 7));

        let dynamic = |req: &RequestHead, _: &ResponseWriter| {
            Field::string("trace", req.header("x-trace-id").unwrap_or(""))
        };
        assert_eq!(dynamic.field(req.head(), &res), Field::string("trace", "t-1"));
    }
}
