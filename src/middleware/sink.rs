//! Log sinks.
//!
//! The middlewares never format or write log lines themselves; they hand a
//! level, a message, and an ordered field list to a [`LogSink`]. The field
//! slice is a pooled buffer that is cleared right after `log` returns, so a
//! sink that keeps entries must copy them.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::Level;

use super::fields::{Field, Value};

/// Receives finished log entries. Shared by every in-flight request.
pub trait LogSink: Send + Sync + 'static {
    fn log(&self, level: Level, message: &str, fields: &[Field]);
}

impl<S: LogSink + ?Sized> LogSink for Arc<S> {
    fn log(&self, level: Level, message: &str, fields: &[Field]) {
        (**self).log(level, message, fields)
    }
}

/// Emits each entry as one `tracing` event under the `tsu::middleware` target.
///
/// `status` and `latency` become typed event fields (`status`, `latency_us`)
/// so subscribers can filter on them; everything else is rendered into
/// `fields` as `key=value` pairs.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, level: Level, message: &str, fields: &[Field]) {
        let mut status = None;
        let mut latency_us = None;
        for field in fields {
            match (field.key(), field.value()) {
                ("status", Value::Uint(code)) => status = Some(*code),
                ("latency", Value::Duration(d)) => {
                    latency_us = Some(u64::try_from(d.as_micros()).unwrap_or(u64::MAX));
                }
                _ => {}
            }
        }
        let fields = Rendered(fields);
        match level {
            Level::ERROR => {
                tracing::error!(target: "tsu::middleware", status, latency_us, %fields, "{message}")
            }
            Level::WARN => {
                tracing::warn!(target: "tsu::middleware", status, latency_us, %fields, "{message}")
            }
            _ => tracing::info!(target: "tsu::middleware", status, latency_us, %fields, "{message}"),
        }
    }
}

/// True for the fields [`TracingSink`] records as typed event fields.
fn lifted(field: &Field) -> bool {
    matches!(
        (field.key(), field.value()),
        ("status", Value::Uint(_)) | ("latency", Value::Duration(_))
    )
}

/// The remaining fields, space separated.
struct Rendered<'a>(&'a [Field]);

impl fmt::Display for Rendered<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for field in self.0.iter().filter(|field| !lifted(field)) {
            if !first {
                f.write_str(" ")?;
            }
            first = false;
            write!(f, "{field}")?;
        }
        Ok(())
    }
}

/// A recorded log entry.
#[derive(Clone, Debug)]
pub struct Entry {
    pub level: Level,
    pub message: String,
    pub fields: Vec<Field>,
}

impl Entry {
    /// Value of the first field named `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.iter().find(|f| f.key() == key).map(Field::value)
    }

    pub fn keys(&self) -> Vec<&str> {
        self.fields.iter().map(Field::key).collect()
    }
}

/// Keeps every entry in memory. Handy in tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: Mutex<Vec<Entry>>,
}

impl MemorySink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn entries(&self) -> Vec<Entry> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LogSink for MemorySink {
    fn log(&self, level: Level, message: &str, fields: &[Field]) {
        let entry = Entry { level, message: message.to_owned(), fields: fields.to_vec() };
        self.entries.lock().push(entry);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn memory_sink_copies_out_of_the_borrowed_buffer() {
        let sink = MemorySink::new();
        let mut buf = vec![Field::uint("status", 200), Field::string("path", "/")];
        sink.log(Level::INFO, "logging", &buf);
        buf.clear();

        let entries = sink.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].keys(), ["status", "path"]);
        assert_eq!(entries[0].get("status"), Some(&Value::Uint(200)));
    }

    #[test]
    fn rendered_fields_are_space_separated() {
        let fields = [Field::string("method", "GET"), Field::string("path", "/a")];
        assert_eq!(Rendered(&fields).to_string(), "method=GET path=/a");
    }

    #[test]
    fn typed_status_and_latency_are_left_out_of_rendering() {
        let fields = [
            Field::uint("status", 500),
            Field::string("method", "GET"),
            Field::new("latency", Value::Duration(Duration::from_millis(3))),
            Field::string("path", "/a"),
        ];
        assert!(lifted(&fields[0]));
        assert!(lifted(&fields[2]));
        assert_eq!(Rendered(&fields).to_string(), "method=GET path=/a");
    }

    #[test]
    fn mistyped_status_stays_rendered() {
        let fields = [Field::string("status", "teapot")];
        assert!(!lifted(&fields[0]));
        assert_eq!(Rendered(&fields).to_string(), "status=teapot");
    }
}
