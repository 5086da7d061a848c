//! Access logging: one structured entry per request.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use futures_util::FutureExt;
use http::StatusCode;
use tracing::Level;

use super::fields::{Field, FieldProvider, Value};
use super::policy::{self, LevelFn, Predicate};
use super::pool;
use super::sink::LogSink;
use super::{Middleware, Next};
use crate::handler::BoxFuture;
use crate::request::{Request, RequestHead};
use crate::response::ResponseWriter;

const SKIP_REQUEST_BODY: &str = "skip request body";
const SKIP_RESPONSE_BODY: &str = "skip response body";
const LARGE_REQUEST_BODY: &str = "larger request body";
const LARGE_RESPONSE_BODY: &str = "larger response body";

/// Access log settings, fixed once the middleware is built.
///
/// ```rust
/// use std::sync::Arc;
/// use std::sync::atomic::AtomicBool;
/// use tsu::middleware::{fields, AccessLogConfig};
///
/// let capture = Arc::new(AtomicBool::new(false));
/// let config = AccessLogConfig::default()
///     .custom_field(fields::string("app", "example"))
///     .skip_logging(|req, _| req.path() == "/healthz")
///     .external_enable_body(Arc::clone(&capture))
///     .body_limit(4096);
/// ```
#[derive(Clone)]
pub struct AccessLogConfig {
    custom_fields: Vec<Arc<dyn FieldProvider>>,
    skip_logging: Predicate,
    skip_request_body: Predicate,
    skip_response_body: Predicate,
    level: LevelFn,
    enable_body: Arc<AtomicBool>,
    body_limit: usize,
}

impl Default for AccessLogConfig {
    fn default() -> Self {
        Self {
            custom_fields: Vec::new(),
            skip_logging: Arc::new(policy::never),
            skip_request_body: Arc::new(policy::never),
            skip_response_body: Arc::new(policy::never),
            level: Arc::new(policy::status_level),
            enable_body: Arc::new(AtomicBool::new(false)),
            body_limit: 0,
        }
    }
}

impl AccessLogConfig {
    /// Appends a field provider. Providers run in the order added, after
    /// the standard fields.
    pub fn custom_field(mut self, provider: impl FieldProvider) -> Self {
        self.custom_fields.push(Arc::new(provider));
        self
    }

    /// Requests for which `f` returns `true` produce no entry.
    pub fn skip_logging<F>(mut self, f: F) -> Self
    where
        F: Fn(&RequestHead, &ResponseWriter) -> bool + Send + Sync + 'static,
    {
        self.skip_logging = Arc::new(f);
        self
    }

    /// Exempts request bodies from capture. Multipart bodies are always exempt.
    pub fn skip_request_body<F>(mut self, f: F) -> Self
    where
        F: Fn(&RequestHead, &ResponseWriter) -> bool + Send + Sync + 'static,
    {
        self.skip_request_body = Arc::new(f);
        self
    }

    /// Exempts response bodies from the entry. Checked after the handler ran.
    pub fn skip_response_body<F>(mut self, f: F) -> Self
    where
        F: Fn(&RequestHead, &ResponseWriter) -> bool + Send + Sync + 'static,
    {
        self.skip_response_body = Arc::new(f);
        self
    }

    /// Replaces the status-based level policy
    /// ([`level_for_status`](policy::level_for_status)). A response carrying
    /// a terminal error is logged at `ERROR` regardless.
    pub fn use_level<F>(mut self, f: F) -> Self
    where
        F: Fn(&RequestHead, &ResponseWriter) -> Level + Send + Sync + 'static,
    {
        self.level = Arc::new(f);
        self
    }

    /// Turns body capture on or off.
    pub fn enable_body(self, on: bool) -> Self {
        self.enable_body.store(on, Ordering::Relaxed);
        self
    }

    /// Lets the caller flip body capture at runtime. Each request reads the
    /// flag once on entry; a flip only affects requests that arrive after it.
    pub fn external_enable_body(mut self, flag: Arc<AtomicBool>) -> Self {
        self.enable_body = flag;
        self
    }

    /// Bodies of `limit` bytes or more are logged as a marker. `0` means no limit.
    pub fn body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }
}

/// Logs one entry per request through a [`LogSink`].
///
/// Fields, in order: `title` (when a route matched), `status`, `method`,
/// `path`, `route`, `query`, `ip`, `user_agent`, `latency`; with body
/// capture on, `request_body` and `response_body`; then custom fields; then
/// `error` if the response carries one.
///
/// The entry is still emitted if downstream panics. The panic is then
/// resumed for [`Recovery`](super::Recovery) to handle, so register
/// `Recovery` outside this middleware.
pub struct AccessLog {
    sink: Arc<dyn LogSink>,
    config: AccessLogConfig,
}

impl AccessLog {
    pub fn new(sink: impl LogSink, config: AccessLogConfig) -> Self {
        Self { sink: Arc::new(sink), config }
    }

    async fn run(&self, mut req: Request, res: &mut ResponseWriter, next: Next<'_>) {
        let head = req.snapshot();
        let capture = self.config.enable_body.load(Ordering::Relaxed);
        let mut request_body = None;
        let mut start = Instant::now();

        if capture {
            res.capture_body();
            if !policy::is_multipart(&head) && !(self.config.skip_request_body)(&*head, &*res) {
                match req.bytes().await {
                    Ok(bytes) => request_body = Some(bytes),
                    Err(e) => {
                        tracing::debug!(path = head.path(), "request body read failed: {e}");
                        if let Err(e) = res.write_error(StatusCode::INTERNAL_SERVER_ERROR, e) {
                            tracing::warn!("error response write failed: {e}");
                        }
                        self.emit(&head, res, capture, request_body.as_ref(), start);
                        return;
                    }
                }
            }
        }

        start = Instant::now();
        let outcome = AssertUnwindSafe(next.run(req, res)).catch_unwind().await;
        self.emit(&head, res, capture, request_body.as_ref(), start);
        if let Err(payload) = outcome {
            panic::resume_unwind(payload);
        }
    }

    fn emit(
        &self,
        head: &RequestHead,
        res: &ResponseWriter,
        capture: bool,
        request_body: Option<&Bytes>,
        start: Instant,
    ) {
        if (self.config.skip_logging)(head, res) {
            return;
        }
        let level = match res.error() {
            Some(_) => Level::ERROR,
            None => (self.config.level)(head, res),
        };

        let mut fields = pool::acquire();
        let route = head.route();
        if let Some(route) = route {
            fields.push(Field::string("title", route.doc().unwrap_or("")));
        }
        fields.push(Field::uint("status", res.status().as_u16().into()));
        fields.push(Field::string("method", head.method().as_str()));
        fields.push(Field::string("path", head.path()));
        fields.push(Field::string("route", route.map_or("", |r| r.template())));
        fields.push(Field::string("query", head.query()));
        fields.push(Field::string("ip", head.remote_addr().map(|a| a.to_string()).unwrap_or_default()));
        fields.push(Field::string("user_agent", head.user_agent()));
        fields.push(Field::duration("latency", start.elapsed()));

        if capture {
            let limit = self.config.body_limit;
            let request_body = match request_body {
                Some(body) => policy::body_value(body, limit, LARGE_REQUEST_BODY),
                None => Value::Str(SKIP_REQUEST_BODY.to_owned()),
            };
            let response_body = match res.captured_body() {
                Some(body) if !(self.config.skip_response_body)(head, res) => {
                    policy::body_value(body, limit, LARGE_RESPONSE_BODY)
                }
                _ => Value::Str(SKIP_RESPONSE_BODY.to_owned()),
            };
            fields.push(Field::new("request_body", request_body));
            fields.push(Field::new("response_body", response_body));
        }

        for provider in &self.config.custom_fields {
            fields.push(provider.field(head, res));
        }
        if let Some(err) = res.error() {
            fields.push(Field::error(&**err));
        }

        self.sink.log(level, "logging", &fields);
    }
}

impl Middleware for AccessLog {
    fn handle<'a>(
        &'a self,
        req: Request,
        res: &'a mut ResponseWriter,
        next: Next<'a>,
    ) -> BoxFuture<'a, ()> {
        Box::pin(self.run(req, res, next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::MemorySink;
    use crate::{Method, Response, Router};

    async fn hello(_: Request) -> &'static str { "hello" }

    async fn echo(mut req: Request) -> Response {
        match req.bytes().await {
            Ok(body) => Response::json(body.to_vec()),
            Err(e) => Response::error(StatusCode::BAD_REQUEST, e),
        }
    }

    fn app(sink: &Arc<MemorySink>, config: AccessLogConfig) -> Router {
        Router::new()
            .on_with_doc(Method::Get, "/hello/{name}", "say hello", hello)
            .on(Method::Post, "/echo", echo)
            .wrap(AccessLog::new(Arc::clone(sink), config))
    }

    #[tokio::test]
    async fn standard_fields_in_order() {
        let sink = MemorySink::new();
        let req = Request::builder()
            .uri("/hello/bob?x=1")
            .header("user-agent", "test-agent")
            .remote_addr("10.0.0.9:5555".parse().unwrap())
            .build();
        app(&sink, AccessLogConfig::default()).handle(req).await;

        let entries = sink.entries();
        assert_eq!(entries.len(), 1);
        let e = &entries[0];
        assert_eq!(e.level, Level::INFO);
        assert_eq!(e.message, "logging");
        assert_eq!(
            e.keys(),
            ["title", "status", "method", "path", "route", "query", "ip", "user_agent", "latency"]
        );
        assert_eq!(e.get("title").and_then(Value::as_str), Some("say hello"));
        assert_eq!(e.get("status"), Some(&Value::Uint(200)));
        assert_eq!(e.get("route").and_then(Value::as_str), Some("/hello/{name}"));
        assert_eq!(e.get("query").and_then(Value::as_str), Some("x=1"));
        assert_eq!(e.get("ip").and_then(Value::as_str), Some("10.0.0.9:5555"));
        assert_eq!(e.get("user_agent").and_then(Value::as_str), Some("test-agent"));
        assert!(matches!(e.get("latency"), Some(Value::Duration(_))));
    }

    #[tokio::test]
    async fn unmatched_route_has_no_title_and_warns() {
        let sink = MemorySink::new();
        app(&sink, AccessLogConfig::default())
            .handle(Request::builder().uri("/nowhere").build())
            .await;
        let e = &sink.entries()[0];
        assert_eq!(e.level, Level::WARN);
        assert!(e.get("title").is_none());
        assert_eq!(e.get("route").and_then(Value::as_str), Some(""));
    }

    #[tokio::test]
    async fn captures_both_bodies() {
        let sink = MemorySink::new();
        let req = Request::builder().method(Method::Post).uri("/echo").body("{\"a\":1}").build();
        let res = app(&sink, AccessLogConfig::default().enable_body(true)).handle(req).await;

        assert_eq!(res.body(), b"{\"a\":1}");
        let e = &sink.entries()[0];
        assert_eq!(e.get("request_body").and_then(Value::as_str), Some("{\"a\":1}"));
        assert_eq!(e.get("response_body").and_then(Value::as_str), Some("{\"a\":1}"));
    }

    #[tokio::test]
    async fn oversized_bodies_become_markers() {
        let sink = MemorySink::new();
        let req = Request::builder().method(Method::Post).uri("/echo").body("0123456789").build();
        let config = AccessLogConfig::default().enable_body(true).body_limit(10);
        app(&sink, config).handle(req).await;

        let e = &sink.entries()[0];
        assert_eq!(e.get("request_body").and_then(Value::as_str), Some(LARGE_REQUEST_BODY));
        assert_eq!(e.get("response_body").and_then(Value::as_str), Some(LARGE_RESPONSE_BODY));
    }

    #[tokio::test]
    async fn multipart_and_skipped_bodies_use_placeholders() {
        let sink = MemorySink::new();
        let req = Request::builder()
            .method(Method::Post)
            .uri("/echo")
            .header("content-type", "multipart/form-data; boundary=zz")
            .body("--zz--")
            .build();
        let config = AccessLogConfig::default()
            .enable_body(true)
            .skip_response_body(|_, _| true);
        let res = app(&sink, config).handle(req).await;

        // the handler still read the untouched body
        assert_eq!(res.body(), b"--zz--");
        let e = &sink.entries()[0];
        assert_eq!(e.get("request_body").and_then(Value::as_str), Some(SKIP_REQUEST_BODY));
        assert_eq!(e.get("response_body").and_then(Value::as_str), Some(SKIP_RESPONSE_BODY));
    }

    #[tokio::test]
    async fn body_fields_absent_when_capture_off() {
        let sink = MemorySink::new();
        let req = Request::builder().method(Method::Post).uri("/echo").body("x").build();
        app(&sink, AccessLogConfig::default()).handle(req).await;
        let e = &sink.entries()[0];
        assert!(e.get("request_body").is_none());
        assert!(e.get("response_body").is_none());
    }

    #[tokio::test]
    async fn external_toggle_is_read_per_request() {
        let sink = MemorySink::new();
        let flag = Arc::new(AtomicBool::new(false));
        let app = app(&sink, AccessLogConfig::default().external_enable_body(Arc::clone(&flag)));

        app.handle(Request::builder().uri("/hello/a").build()).await;
        flag.store(true, Ordering::Relaxed);
        app.handle(Request::builder().uri("/hello/b").build()).await;

        let entries = sink.entries();
        assert!(entries[0].get("response_body").is_none());
        assert_eq!(entries[1].get("response_body").and_then(Value::as_str), Some("hello"));
    }

    #[tokio::test]
    async fn binary_bodies_round_trip_exactly() {
        let sink = MemorySink::new();
        let raw = vec![0xff, 0xfe, 0x00, 0x80];
        let req = Request::builder().method(Method::Post).uri("/echo").body(raw.clone()).build();
        let res = app(&sink, AccessLogConfig::default().enable_body(true)).handle(req).await;

        assert_eq!(res.body(), &raw[..]);
        let e = &sink.entries()[0];
        assert_eq!(e.get("request_body"), Some(&Value::Bytes(raw.clone())));
        assert_eq!(e.get("response_body"), Some(&Value::Bytes(raw)));
    }

    fn flipping_app(sink: &Arc<MemorySink>, flag: &Arc<AtomicBool>, to: bool) -> Router {
        let handler_flag = Arc::clone(flag);
        Router::new()
            .on(Method::Post, "/flip", move |mut req: Request| {
                let flag = Arc::clone(&handler_flag);
                async move {
                    flag.store(to, Ordering::Relaxed);
                    match req.bytes().await {
                        Ok(body) => Response::json(body.to_vec()),
                        Err(e) => Response::error(StatusCode::BAD_REQUEST, e),
                    }
                }
            })
            .wrap(AccessLog::new(
                Arc::clone(sink),
                AccessLogConfig::default().external_enable_body(Arc::clone(flag)),
            ))
    }

    #[tokio::test]
    async fn toggle_flipped_on_mid_request_does_not_apply() {
        let sink = MemorySink::new();
        let flag = Arc::new(AtomicBool::new(false));
        let req = Request::builder().method(Method::Post).uri("/flip").body("x").build();
        flipping_app(&sink, &flag, true).handle(req).await;

        assert!(flag.load(Ordering::Relaxed));
        let e = &sink.entries()[0];
        assert!(e.get("request_body").is_none());
        assert!(e.get("response_body").is_none());
    }

    #[tokio::test]
    async fn toggle_flipped_off_mid_request_keeps_capture() {
        let sink = MemorySink::new();
        let flag = Arc::new(AtomicBool::new(true));
        let req = Request::builder().method(Method::Post).uri("/flip").body("kept").build();
        flipping_app(&sink, &flag, false).handle(req).await;

        assert!(!flag.load(Ordering::Relaxed));
        let e = &sink.entries()[0];
        assert_eq!(e.get("request_body").and_then(Value::as_str), Some("kept"));
        assert_eq!(e.get("response_body").and_then(Value::as_str), Some("kept"));
    }

    #[tokio::test]
    async fn skip_logging_emits_nothing() {
        let sink = MemorySink::new();
        let config = AccessLogConfig::default().skip_logging(|req, _| req.path().starts_with("/hello"));
        let app = app(&sink, config);
        app.handle(Request::builder().uri("/hello/quiet").build()).await;
        assert!(sink.is_empty());
        app.handle(Request::builder().uri("/other").build()).await;
        assert_eq!(sink.len(), 1);
    }

    #[tokio::test]
    async fn terminal_error_forces_error_level() {
        async fn soft_fail(_: Request) -> Response {
            Response::error(StatusCode::OK, "an error happened")
        }
        let sink = MemorySink::new();
        let app = Router::new()
            .on(Method::Get, "/error", soft_fail)
            .wrap(AccessLog::new(Arc::clone(&sink), AccessLogConfig::default()));
        app.handle(Request::builder().uri("/error").build()).await;

        let e = &sink.entries()[0];
        assert_eq!(e.level, Level::ERROR);
        assert_eq!(e.get("status"), Some(&Value::Uint(200)));
        assert_eq!(e.get("error"), Some(&Value::Error("an error happened".into())));
        assert_eq!(e.keys().last(), Some(&"error"));
    }

    #[tokio::test]
    async fn custom_level_and_fields_in_order() {
        let sink = MemorySink::new();
        let config = AccessLogConfig::default()
            .use_level(|_, _| Level::WARN)
            .custom_field(crate::middleware::fields::string("app", "example"))
            .custom_field(|req: &RequestHead, _: &ResponseWriter| Field::string("seen", req.path()));
        app(&sink, config).handle(Request::builder().uri("/hello/z").build()).await;

        let e = &sink.entries()[0];
        assert_eq!(e.level, Level::WARN);
        let keys = e.keys();
        assert_eq!(&keys[keys.len() - 2..], ["app", "seen"]);
        assert_eq!(e.get("seen").and_then(Value::as_str), Some("/hello/z"));
    }

    #[tokio::test]
    async fn logs_path_as_seen_on_entry() {
        struct Rewrite;
        impl Middleware for Rewrite {
            fn handle<'a>(
                &'a self,
                mut req: Request,
                res: &'a mut ResponseWriter,
                next: Next<'a>,
            ) -> BoxFuture<'a, ()> {
                req.set_path("/hello/rewritten");
                req.set_query("");
                next.run(req, res)
            }
        }

        let sink = MemorySink::new();
        let app = Router::new()
            .on(Method::Get, "/v1/hello", hello)
            .wrap(Rewrite)
            .wrap(AccessLog::new(Arc::clone(&sink), AccessLogConfig::default()));
        app.handle(Request::builder().uri("/v1/hello?lang=en").build()).await;

        let e = &sink.entries()[0];
        assert_eq!(e.get("path").and_then(Value::as_str), Some("/v1/hello"));
        assert_eq!(e.get("query").and_then(Value::as_str), Some("lang=en"));
    }
}
