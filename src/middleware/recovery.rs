//! Panic recovery.
//!
//! [`Recovery`] runs the rest of the chain inside an unwind boundary. A
//! panic anywhere downstream is caught here, logged once at `ERROR`, and
//! answered with a plain `500 panic`; the payload itself never reaches the
//! client.
//!
//! Panics caused by the peer going away (broken pipe, connection reset) are
//! operational noise rather than defects: they are logged with the request
//! dump but never with a stack trace.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::Cell;
use std::future::{poll_fn, Future};
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Once};

use futures_util::FutureExt;
use http::StatusCode;
use tracing::Level;

use super::fields::{Field, FieldProvider, Value};
use super::pool;
use super::sink::LogSink;
use super::{Middleware, Next};
use crate::handler::BoxFuture;
use crate::request::{Request, RequestHead};
use crate::response::ResponseWriter;

/// Catches downstream panics. Register it last so it wraps everything else.
pub struct Recovery {
    sink: Arc<dyn LogSink>,
    stack: bool,
    custom_fields: Vec<Arc<dyn FieldProvider>>,
}

impl Recovery {
    /// `stack` adds a `stack` field with the panicking thread's backtrace.
    ///
    /// Capturing it installs a process-wide panic hook, chained in front of
    /// the existing one, that records a backtrace on every panic.
    pub fn new(sink: impl LogSink, stack: bool) -> Self {
        if stack {
            install_backtrace_hook();
        }
        Self { sink: Arc::new(sink), stack, custom_fields: Vec::new() }
    }

    /// Appends a field provider, evaluated only when a panic is logged.
    pub fn custom_field(mut self, provider: impl FieldProvider) -> Self {
        self.custom_fields.push(Arc::new(provider));
        self
    }

    async fn run(&self, req: Request, res: &mut ResponseWriter, next: Next<'_>) {
        let head = req.snapshot();
        let mut inner = next.run(req, res);
        // A slot filled by an earlier, already-handled panic on this worker
        // must not be attributed to a payload that never went through the hook.
        let downstream = poll_fn(move |cx| {
            clear_backtrace();
            inner.as_mut().poll(cx)
        });
        let Err(payload) = AssertUnwindSafe(downstream).catch_unwind().await else {
            return;
        };
        let backtrace = take_backtrace();
        let dump = dump_request(&head);
        let panic_value = describe(&*payload);

        if let Some(kind) = broken_pipe(&*payload) {
            let mut fields = pool::acquire();
            fields.push(Field::new("error", Value::Any(panic_value.clone())));
            fields.push(Field::bytes("request", dump));
            self.sink.log(Level::ERROR, head.path(), &fields);
            fields.release();

            // The peer is gone; this write is for form's sake.
            res.reset();
            let _ = res.write_error(StatusCode::INTERNAL_SERVER_ERROR, io::Error::new(kind, panic_value));
            return;
        }

        let mut fields = pool::acquire();
        fields.push(Field::new("error", Value::Any(panic_value)));
        fields.push(Field::bytes("request", dump));
        if self.stack {
            if let Some(backtrace) = backtrace {
                fields.push(Field::string("stack", backtrace.to_string()));
            }
        }
        for provider in &self.custom_fields {
            fields.push(provider.field(&head, res));
        }
        self.sink.log(Level::ERROR, "recovery from panic", &fields);
        fields.release();

        res.reset();
        if let Err(e) = res.write_error_str(StatusCode::INTERNAL_SERVER_ERROR, "panic") {
            tracing::warn!("error response write failed: {e}");
        }
    }
}

impl Middleware for Recovery {
    fn handle<'a>(
        &'a self,
        req: Request,
        res: &'a mut ResponseWriter,
        next: Next<'a>,
    ) -> BoxFuture<'a, ()> {
        Box::pin(self.run(req, res, next))
    }
}

/// The error kind when the payload says the peer closed or reset the
/// connection.
fn broken_pipe(payload: &(dyn Any + Send)) -> Option<io::ErrorKind> {
    let closed = |kind: io::ErrorKind| {
        matches!(kind, io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset).then_some(kind)
    };
    if let Some(e) = payload.downcast_ref::<io::Error>() {
        return closed(e.kind());
    }
    if let Some(e) = payload.downcast_ref::<Arc<io::Error>>() {
        return closed(e.kind());
    }
    let text = payload.downcast_ref::<&str>().copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))?
        .to_ascii_lowercase();
    if text.contains("broken pipe") {
        Some(io::ErrorKind::BrokenPipe)
    } else if text.contains("connection reset by peer") {
        Some(io::ErrorKind::ConnectionReset)
    } else {
        None
    }
}

/// Best available text for a panic payload.
fn describe(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(e) = payload.downcast_ref::<io::Error>() {
        e.to_string()
    } else if let Some(e) = payload.downcast_ref::<Arc<io::Error>>() {
        e.to_string()
    } else if let Some(e) = payload.downcast_ref::<Box<dyn std::error::Error + Send + Sync>>() {
        e.to_string()
    } else {
        "Box<dyn Any>".to_owned()
    }
}

/// Request line and headers in wire format. The body is never included.
pub(crate) fn dump_request(head: &RequestHead) -> Vec<u8> {
    let mut out = Vec::with_capacity(256);
    out.extend_from_slice(head.method().as_str().as_bytes());
    out.push(b' ');
    out.extend_from_slice(head.path().as_bytes());
    if !head.query().is_empty() {
        out.push(b'?');
        out.extend_from_slice(head.query().as_bytes());
    }
    out.extend_from_slice(format!(" {:?}\r\n", head.version()).as_bytes());
    for (name, value) in head.headers() {
        out.extend_from_slice(name.as_str().as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"\r\n");
    out
}

thread_local! {
    static LAST_BACKTRACE: Cell<Option<Backtrace>> = const { Cell::new(None) };
}

static HOOK: Once = Once::new();

fn install_backtrace_hook() {
    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let backtrace = Backtrace::force_capture();
            let _ = LAST_BACKTRACE.try_with(|slot| slot.set(Some(backtrace)));
            previous(info);
        }));
    });
}

/// The backtrace of the last panic on this thread, if the hook saw one.
/// Unwinding does not switch threads, so this is the panic just caught.
fn take_backtrace() -> Option<Backtrace> {
    LAST_BACKTRACE.try_with(Cell::take).ok().flatten()
}

fn clear_backtrace() {
    let _ = take_backtrace();
}
