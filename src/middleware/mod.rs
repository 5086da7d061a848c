//! Middleware layer.
//!
//! Middleware wraps request execution and is the place for cross-cutting
//! concerns. Each middleware receives the request, the live
//! [`ResponseWriter`], and a [`Next`] that runs the rest of the chain.
//!
//! Built in:
//! - [`AccessLog`]: one structured entry per request: status, method, path,
//!   route, latency, and optionally the request/response bodies
//! - [`Recovery`]: turns handler panics into a `500` plus a diagnostic entry
//!
//! Both log through a [`LogSink`] and build their field lists in buffers
//! borrowed from a process-wide pool ([`pool`]).
//!
//! ```rust,no_run
//! use tsu::{Method, Request, Router, Server};
//! use tsu::middleware::{AccessLog, AccessLogConfig, Recovery, TracingSink};
//!
//! # async fn ping(_: Request) -> &'static str { "pong" }
//! # async fn run() {
//! let app = Router::new()
//!     .on(Method::Get, "/ping", ping)
//!     .wrap(AccessLog::new(TracingSink, AccessLogConfig::default().enable_body(true)))
//!     .wrap(Recovery::new(TracingSink, true));
//!
//! Server::bind("0.0.0.0:3000").serve(app).await.unwrap();
//! # }
//! ```

use std::sync::Arc;

use crate::handler::{BoxFuture, BoxedHandler};
use crate::request::Request;
use crate::response::ResponseWriter;

mod access_log;
pub mod capture;
pub mod fields;
pub mod policy;
pub mod pool;
mod recovery;
mod sink;

pub use access_log::{AccessLog, AccessLogConfig};
pub use fields::{Field, FieldProvider, Value};
pub use recovery::Recovery;
pub use sink::{Entry, LogSink, MemorySink, TracingSink};

/// Wraps request execution.
///
/// Implementations call [`Next::run`] exactly once to continue downstream.
pub trait Middleware: Send + Sync + 'static {
    fn handle<'a>(
        &'a self,
        req: Request,
        res: &'a mut ResponseWriter,
        next: Next<'a>,
    ) -> BoxFuture<'a, ()>;
}

/// The remainder of the chain: the middleware not yet run, then the handler.
pub struct Next<'a> {
    chain: &'a [Arc<dyn Middleware>],
    endpoint: &'a BoxedHandler,
}

impl<'a> Next<'a> {
    pub(crate) fn new(chain: &'a [Arc<dyn Middleware>], endpoint: &'a BoxedHandler) -> Self {
        Self { chain, endpoint }
    }

    /// Runs the rest of the chain. The handler's response is committed into
    /// `res`, so body bytes pass through whatever sink `res` holds.
    pub fn run<'r>(self, req: Request, res: &'r mut ResponseWriter) -> BoxFuture<'r, ()>
    where
        'a: 'r,
    {
        match self.chain.split_last() {
            Some((outer, rest)) => outer.handle(req, res, Next { chain: rest, endpoint: self.endpoint }),
            None => {
                let fut = self.endpoint.call(req);
                Box::pin(async move { res.commit(fut.await) })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Method, Router};

    struct Tag(&'static str);

    impl Middleware for Tag {
        fn handle<'a>(
            &'a self,
            req: Request,
            res: &'a mut ResponseWriter,
            next: Next<'a>,
        ) -> BoxFuture<'a, ()> {
            Box::pin(async move {
                let _ = res.write_str(self.0);
                next.run(req, res).await;
                let _ = res.write_str(self.0);
            })
        }
    }

    async fn body(_: Request) -> &'static str { "|" }

    #[tokio::test]
    async fn last_wrapped_runs_outermost() {
        let app = Router::new()
            .on(Method::Get, "/", body)
            .wrap(Tag("in"))
            .wrap(Tag("out"));
        let res = app.handle(Request::builder().build()).await;
        assert_eq!(res.body(), b"outin|inout");
    }
}
