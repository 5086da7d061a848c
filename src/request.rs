//! Incoming HTTP request type.
//!
//! A [`Request`] is split into a *head* (method, path, query, headers, peer
//! address, matched route) and a streaming [`Body`]. The head sits behind an
//! `Arc` and is copy-on-write: middleware that keeps a clone of it before
//! calling downstream holds a stable snapshot, even if a later stage rewrites
//! the path or query in place.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{HeaderMap, HeaderValue, IntoHeaderName, USER_AGENT};
use http::Version;

use crate::body::Body;
use crate::error::Error;
use crate::method::Method;
use crate::router::RouteInfo;

/// Everything about a request except its body.
#[derive(Clone, Debug)]
pub struct RequestHead {
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) query: String,
    pub(crate) version: Version,
    pub(crate) headers: HeaderMap,
    pub(crate) remote_addr: Option<SocketAddr>,
    pub(crate) route: Option<Arc<RouteInfo>>,
}

impl RequestHead {
    pub fn method(&self) -> &Method { &self.method }
    pub fn path(&self) -> &str { &self.path }
    /// Raw query string, without the leading `?`. Empty when absent.
    pub fn query(&self) -> &str { &self.query }
    pub fn version(&self) -> Version { self.version }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn remote_addr(&self) -> Option<SocketAddr> { self.remote_addr }

    /// The route this request was dispatched to, if any matched.
    pub fn route(&self) -> Option<&RouteInfo> { self.route.as_deref() }

    /// Case-insensitive header lookup. Non-UTF-8 values read as `None`.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// `User-Agent` header, or `""` when absent.
    pub fn user_agent(&self) -> &str {
        self.headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
    }
}

/// An incoming HTTP request.
#[derive(Debug)]
pub struct Request {
    pub(crate) head: Arc<RequestHead>,
    pub(crate) body: Body,
    pub(crate) params: HashMap<String, String>,
}

impl Request {
    /// Starts building a request by hand. The server does this for you;
    /// the builder exists for tests and for embedding tsu behind another
    /// transport.
    pub fn builder() -> RequestBuilder {
        RequestBuilder::new()
    }

    pub(crate) fn from_parts(head: RequestHead, body: Body) -> Self {
        Self { head: Arc::new(head), body, params: HashMap::new() }
    }

    pub fn head(&self) -> &RequestHead { &self.head }

    /// A cheap handle on the current head. Later in-place edits to this
    /// request do not show through it.
    pub fn snapshot(&self) -> Arc<RequestHead> { Arc::clone(&self.head) }

    pub fn method(&self) -> &Method { &self.head.method }
    pub fn path(&self) -> &str { &self.head.path }
    pub fn query(&self) -> &str { &self.head.query }
    pub fn headers(&self) -> &HeaderMap { &self.head.headers }
    pub fn header(&self, name: &str) -> Option<&str> { self.head.header(name) }
    pub fn remote_addr(&self) -> Option<SocketAddr> { self.head.remote_addr }
    pub fn user_agent(&self) -> &str { self.head.user_agent() }
    pub fn route(&self) -> Option<&RouteInfo> { self.head.route() }

    /// Rewrites the path in place.
    pub fn set_path(&mut self, path: impl Into<String>) {
        Arc::make_mut(&mut self.head).path = path.into();
    }

    /// Rewrites the raw query in place.
    pub fn set_query(&mut self, query: impl Into<String>) {
        Arc::make_mut(&mut self.head).query = query.into();
    }

    pub(crate) fn set_route(&mut self, route: Option<Arc<RouteInfo>>) {
        Arc::make_mut(&mut self.head).route = route;
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn body_mut(&mut self) -> &mut Body { &mut self.body }

    /// Takes the body, leaving an empty one in its place.
    pub fn take_body(&mut self) -> Body {
        std::mem::take(&mut self.body)
    }

    pub fn set_body(&mut self, body: impl Into<Body>) {
        self.body = body.into();
    }

    /// Reads the entire body into memory and puts back a replay body over
    /// the same bytes, so later stages can read it again.
    ///
    /// On failure the body is left empty.
    pub async fn bytes(&mut self) -> Result<Bytes, Error> {
        let bytes = self.take_body().collect().await?;
        self.body = Body::from(bytes.clone());
        Ok(bytes)
    }
}

/// Builder for [`Request`]. Obtain via [`Request::builder()`].
#[derive(Debug)]
pub struct RequestBuilder {
    head: RequestHead,
    body: Body,
}

impl RequestBuilder {
    fn new() -> Self {
        Self {
            head: RequestHead {
                method: Method::Get,
                path: "/".to_owned(),
                query: String::new(),
                version: Version::HTTP_11,
                headers: HeaderMap::new(),
                remote_addr: None,
                route: None,
            },
            body: Body::empty(),
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.head.method = method;
        self
    }

    /// Sets path and query from a request target such as `/users?page=2`.
    pub fn uri(mut self, target: &str) -> Self {
        let (path, query) = target.split_once('?').unwrap_or((target, ""));
        self.head.path = path.to_owned();
        self.head.query = query.to_owned();
        self
    }

    /// Appends a header. Values that are not valid header text are dropped.
    pub fn header<K: IntoHeaderName>(mut self, name: K, value: &str) -> Self {
        match HeaderValue::from_str(value) {
            Ok(value) => {
                self.head.headers.append(name, value);
            }
            Err(e) => tracing::warn!("dropping invalid header value: {e}"),
        }
        self
    }

    pub fn version(mut self, version: Version) -> Self {
        self.head.version = version;
        self
    }

    pub fn remote_addr(mut self, addr: SocketAddr) -> Self {
        self.head.remote_addr = Some(addr);
        self
    }

    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    pub fn build(self) -> Request {
        Request::from_parts(self.head, self.body)
    }
}
