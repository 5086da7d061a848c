//! Outgoing HTTP response types.
//!
//! Handlers return a [`Response`] value. Middleware works on a
//! [`ResponseWriter`]: the live response for one in-flight request. When the
//! chain reaches the endpoint, the handler's `Response` is committed into the
//! writer, with its body bytes flowing through the writer's output sink.

use std::fmt;
use std::io;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::StatusCode;
use http_body_util::Full;

use crate::error::BoxError;
use crate::middleware::capture::BodyWriter;

/// A terminal application error attached to a response.
pub type ResponseError = Arc<dyn std::error::Error + Send + Sync + 'static>;

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

// ── ContentType ───────────────────────────────────────────────────────────────

/// Common content-type values for use with [`ResponseBuilder::bytes`].
pub enum ContentType {
    Csv,          // text/csv
    Html,         // text/html; charset=utf-8
    Json,         // application/json
    OctetStream,  // application/octet-stream
    Text,         // text/plain; charset=utf-8
    Xml,          // application/xml
}

impl ContentType {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Csv         => "text/csv",
            Self::Html        => "text/html; charset=utf-8",
            Self::Json        => "application/json",
            Self::OctetStream => "application/octet-stream",
            Self::Text        => TEXT_PLAIN,
            Self::Xml         => "application/xml",
        }
    }
}

// ── Response ─────────────────────────────────────────────────────────────────

/// An outgoing HTTP response.
///
/// ```rust
/// use http::StatusCode;
/// use tsu::Response;
///
/// Response::json(br#"{"id":1}"#.to_vec());
/// Response::text("hello");
/// Response::status(StatusCode::NO_CONTENT);
/// Response::builder()
///     .status(StatusCode::CREATED)
///     .header("location", "/users/42")
///     .json(br#"{"id":42}"#.to_vec());
/// ```
pub struct Response {
    pub(crate) status: StatusCode,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) body: Vec<u8>,
    pub(crate) error: Option<ResponseError>,
}

impl Response {
    /// `200 OK`, `application/json`.
    pub fn json(body: Vec<u8>) -> Self {
        Self::bytes_raw("application/json", body)
    }

    /// `200 OK`, `text/plain; charset=utf-8`.
    pub fn text(body: impl Into<String>) -> Self {
        Self::bytes_raw(TEXT_PLAIN, body.into().into_bytes())
    }

    /// Response with no body.
    pub fn status(code: StatusCode) -> Self {
        Self { status: code, headers: Vec::new(), body: Vec::new(), error: None }
    }

    /// A response carrying a terminal application error. The error's text
    /// becomes the body; access logging reports it at error level whatever
    /// `code` is.
    pub fn error(code: StatusCode, err: impl Into<BoxError>) -> Self {
        let err: ResponseError = Arc::from(err.into());
        Self {
            status: code,
            headers: vec![("content-type".to_owned(), TEXT_PLAIN.to_owned())],
            body: err.to_string().into_bytes(),
            error: Some(err),
        }
    }

    /// Builder for responses that need a custom status or extra headers.
    pub fn builder() -> ResponseBuilder {
        ResponseBuilder { headers: Vec::new(), status: StatusCode::OK }
    }

    fn bytes_raw(content_type: &str, body: Vec<u8>) -> Self {
        Self {
            status: StatusCode::OK,
            headers: vec![("content-type".to_owned(), content_type.to_owned())],
            body,
            error: None,
        }
    }

    pub fn status_code(&self) -> StatusCode { self.status }
    pub fn headers(&self) -> &[(String, String)] { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }
    pub fn error_ref(&self) -> Option<&ResponseError> { self.error.as_ref() }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Converts into the hyper response the server writes to the wire.
    /// Headers that are not valid HTTP are dropped with a warning.
    pub(crate) fn into_inner(self) -> http::Response<Full<Bytes>> {
        let mut res = http::Response::new(Full::new(Bytes::from(self.body)));
        *res.status_mut() = self.status;
        let headers = res.headers_mut();
        for (name, value) in self.headers {
            match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(&value)) {
                (Ok(name), Ok(value)) => {
                    headers.append(name, value);
                }
                _ => tracing::warn!(header = %name, "dropping invalid response header"),
            }
        }
        res
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body_len", &self.body.len())
            .field("error", &self.error)
            .finish()
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers.iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

// ── ResponseBuilder ───────────────────────────────────────────────────────────

/// Fluent builder for [`Response`].
///
/// Obtain via [`Response::builder()`]. Defaults to `200 OK`.
/// Terminated by a typed body method.
pub struct ResponseBuilder {
    headers: Vec<(String, String)>,
    status: StatusCode,
}

impl ResponseBuilder {
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code;
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    /// Terminate with a JSON body (`application/json`).
    pub fn json(self, body: Vec<u8>) -> Response {
        self.finish("application/json", body)
    }

    /// Terminate with a plain-text body (`text/plain; charset=utf-8`).
    pub fn text(self, body: impl Into<String>) -> Response {
        self.finish(TEXT_PLAIN, body.into().into_bytes())
    }

    /// Terminate with a typed body.
    pub fn bytes(self, content_type: ContentType, body: Vec<u8>) -> Response {
        self.finish(content_type.as_str(), body)
    }

    /// Terminate with no body.
    pub fn no_body(self) -> Response {
        Response { status: self.status, headers: self.headers, body: Vec::new(), error: None }
    }

    fn finish(self, content_type: &str, body: Vec<u8>) -> Response {
        let mut headers = vec![("content-type".to_owned(), content_type.to_owned())];
        headers.extend(self.headers);
        Response { status: self.status, headers, body, error: None }
    }
}

// ── IntoResponse ──────────────────────────────────────────────────────────────

/// Conversion into an HTTP [`Response`].
///
/// Implement on your own types to return them directly from handlers.
pub trait IntoResponse {
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response { self }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> Response { Response::text(self) }
}

impl IntoResponse for String {
    fn into_response(self) -> Response { Response::text(self) }
}

/// Return a status directly from a handler: `return StatusCode::NOT_FOUND`
impl IntoResponse for StatusCode {
    fn into_response(self) -> Response { Response::status(self) }
}

/// `Err` becomes a `500` carrying the error as the response's terminal error.
impl<T, E> IntoResponse for Result<T, E>
where
    T: IntoResponse,
    E: Into<BoxError>,
{
    fn into_response(self) -> Response {
        match self {
            Ok(v) => v.into_response(),
            Err(e) => Response::error(StatusCode::INTERNAL_SERVER_ERROR, e),
        }
    }
}

// ── ResponseWriter ────────────────────────────────────────────────────────────

/// Where body bytes go. `Capturing` is only installed by access logging with
/// body capture on; otherwise writes land in the buffer directly.
enum Sink {
    Direct(Vec<u8>),
    Capturing(BodyWriter<Vec<u8>>),
}

/// The live response for one in-flight request.
pub struct ResponseWriter {
    status: StatusCode,
    headers: Vec<(String, String)>,
    sink: Sink,
    error: Option<ResponseError>,
}

impl ResponseWriter {
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: Vec::new(),
            sink: Sink::Direct(Vec::new()),
            error: None,
        }
    }

    pub fn status(&self) -> StatusCode { self.status }
    pub fn set_status(&mut self, code: StatusCode) { self.status = code; }
    pub fn headers(&self) -> &[(String, String)] { &self.headers }
    pub fn header(&self, name: &str) -> Option<&str> { find_header(&self.headers, name) }

    /// Sets a header, replacing any existing value of the same name.
    pub fn insert_header(&mut self, name: &str, value: &str) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((name.to_owned(), value.to_owned()));
    }

    pub fn error(&self) -> Option<&ResponseError> { self.error.as_ref() }
    pub fn set_error(&mut self, err: ResponseError) { self.error = Some(err); }

    /// Body bytes written so far.
    pub fn body(&self) -> &[u8] {
        match &self.sink {
            Sink::Direct(buf) => buf,
            Sink::Capturing(w) => w.get_ref(),
        }
    }

    pub fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.sink {
            Sink::Direct(out) => {
                out.extend_from_slice(buf);
                Ok(buf.len())
            }
            Sink::Capturing(w) => io::Write::write(w, buf),
        }
    }

    pub fn write_str(&mut self, s: &str) -> io::Result<usize> {
        match &mut self.sink {
            Sink::Direct(out) => {
                out.extend_from_slice(s.as_bytes());
                Ok(s.len())
            }
            Sink::Capturing(w) => w.write_str(s),
        }
    }

    /// Sets `code`, writes the error text as the body, and records the
    /// error as this response's terminal error.
    pub fn write_error(&mut self, code: StatusCode, err: impl Into<BoxError>) -> io::Result<()> {
        let err: ResponseError = Arc::from(err.into());
        let text = err.to_string();
        self.error = Some(err);
        self.write_error_str(code, &text)
    }

    /// Sets `code` and writes `msg` as a plain-text body.
    pub fn write_error_str(&mut self, code: StatusCode, msg: &str) -> io::Result<()> {
        self.status = code;
        self.insert_header("content-type", TEXT_PLAIN);
        io::Write::write_all(self, msg.as_bytes())
    }

    /// Discards status, headers, error, and any body written so far.
    pub fn reset(&mut self) {
        self.status = StatusCode::OK;
        self.headers.clear();
        self.error = None;
        match &mut self.sink {
            Sink::Direct(out) => out.clear(),
            Sink::Capturing(w) => w.get_mut().clear(),
        }
    }

    /// Routes subsequent body writes through a [`BodyWriter`].
    pub(crate) fn capture_body(&mut self) {
        let sink = std::mem::replace(&mut self.sink, Sink::Direct(Vec::new()));
        self.sink = match sink {
            Sink::Direct(out) => Sink::Capturing(BodyWriter::new(out)),
            capturing => capturing,
        };
    }

    /// The duplicate of everything written since [`capture_body`](Self::capture_body).
    pub(crate) fn captured_body(&self) -> Option<&[u8]> {
        match &self.sink {
            Sink::Direct(_) => None,
            Sink::Capturing(w) => Some(w.captured()),
        }
    }

    /// Applies a handler's response: status, headers, error, then the body
    /// through the sink.
    pub(crate) fn commit(&mut self, res: Response) {
        self.status = res.status;
        self.headers.extend(res.headers);
        if res.error.is_some() {
            self.error = res.error;
        }
        if let Err(e) = io::Write::write_all(self, &res.body) {
            tracing::warn!("response body write failed: {e}");
        }
    }

    /// Finishes the request, yielding the value the server sends.
    pub fn into_response(self) -> Response {
        let body = match self.sink {
            Sink::Direct(out) => out,
            Sink::Capturing(w) => w.into_parts().0,
        };
        Response { status: self.status, headers: self.headers, body, error: self.error }
    }
}

impl Default for ResponseWriter {
    fn default() -> Self { Self::new() }
}

impl io::Write for ResponseWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        ResponseWriter::write(self, buf)
    }

    fn flush(&mut self) -> io::Result<()> { Ok(()) }
}

impl fmt::Debug for ResponseWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseWriter")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body_len", &self.body().len())
            .field("capturing", &matches!(self.sink, Sink::Capturing(_)))
            .field("error", &self.error)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_flows_body_through_capturing_sink() {
        let mut w = ResponseWriter::new();
        w.capture_body();
        w.commit(Response::builder().status(StatusCode::CREATED).text("made it"));
        assert_eq!(w.captured_body(), Some(&b"made it"[..]));
        let res = w.into_response();
        assert_eq!(res.status_code(), StatusCode::CREATED);
        assert_eq!(res.body(), b"made it");
        assert_eq!(res.header("Content-Type"), Some(TEXT_PLAIN));
    }

    #[test]
    fn direct_sink_has_no_capture() {
        let mut w = ResponseWriter::new();
        w.write_str("plain").unwrap();
        assert_eq!(w.captured_body(), None);
        assert_eq!(w.body(), b"plain");
    }

    #[test]
    fn write_error_records_terminal_error() {
        let mut w = ResponseWriter::new();
        w.write_error(StatusCode::BAD_GATEWAY, "upstream down").unwrap();
        assert_eq!(w.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(w.body(), b"upstream down");
        assert_eq!(w.error().map(ToString::to_string).as_deref(), Some("upstream down"));
    }

    #[test]
    fn reset_discards_partial_output() {
        let mut w = ResponseWriter::new();
        w.insert_header("x-secret", "1");
        w.write_str("half a resp").unwrap();
        w.reset();
        assert!(w.body().is_empty());
        assert!(w.headers().is_empty());
        assert_eq!(w.status(), StatusCode::OK);
    }

    #[test]
    fn result_err_maps_to_500_with_error() {
        let res: Result<&'static str, std::io::Error> =
            Err(std::io::Error::other("disk on fire"));
        let res = res.into_response();
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(res.error_ref().is_some());
    }

    #[test]
    fn into_inner_drops_invalid_headers() {
        let res = Response::builder()
            .header("x-ok", "yes")
            .header("bad header", "no")
            .no_body()
            .into_inner();
        assert_eq!(res.headers().get("x-ok").unwrap(), "yes");
        assert_eq!(res.headers().len(), 1);
    }
}
