//! HTTP server and graceful shutdown.
//!
//! [`Server::serve`] accepts connections until the shutdown future resolves
//! (SIGTERM or Ctrl-C unless [`Server::with_shutdown`] supplies another),
//! then stops accepting and waits for every open connection to finish its
//! in-flight requests before returning.
//!
//! Under Kubernetes, keep `terminationGracePeriodSeconds` above the slowest
//! request you expect to drain.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::body::Body;
use crate::error::Error;
use crate::method::Method;
use crate::request::{Request, RequestHead};
use crate::router::Router;

type Shutdown = Pin<Box<dyn Future<Output = ()> + Send>>;

/// The HTTP server.
pub struct Server {
    addr: SocketAddr,
    shutdown: Option<Shutdown>,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called.
    ///
    /// # Panics
    ///
    /// Panics if `addr` is not a valid `host:port` string.
    ///
    /// ```rust,no_run
    /// use tsu::Server;
    /// let server = Server::bind("0.0.0.0:3000");
    /// ```
    pub fn bind(addr: &str) -> Self {
        let addr: SocketAddr = addr.parse().expect("invalid socket address");
        Self { addr, shutdown: None }
    }

    /// Replaces the OS signal trigger with `signal`.
    pub fn with_shutdown(mut self, signal: impl Future<Output = ()> + Send + 'static) -> Self {
        self.shutdown = Some(Box::pin(signal));
        self
    }

    /// Serves `router` until shutdown, then drains open connections.
    pub async fn serve(self, router: Router) -> Result<(), Error> {
        let listener = TcpListener::bind(self.addr).await?;
        let router = Arc::new(router);
        let shutdown = self.shutdown.unwrap_or_else(|| Box::pin(os_signal()));
        tokio::pin!(shutdown);

        info!(addr = %self.addr, "tsu listening");

        let mut connections = JoinSet::new();
        loop {
            tokio::select! {
                // Shutdown wins over a queued accept.
                biased;

                () = &mut shutdown => {
                    info!(open = connections.len(), "shutdown requested, draining connections");
                    break;
                }

                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };
                    let router = Arc::clone(&router);
                    connections.spawn(serve_connection(router, TokioIo::new(stream), peer));
                }

                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        while connections.join_next().await.is_some() {}

        info!("tsu stopped");
        Ok(())
    }
}

/// One connection, HTTP/1.1 or HTTP/2 as negotiated. The service closure
/// runs once per request.
async fn serve_connection(router: Arc<Router>, io: TokioIo<tokio::net::TcpStream>, peer: SocketAddr) {
    let svc = service_fn(move |req| dispatch(Arc::clone(&router), req, peer));
    if let Err(e) = ConnBuilder::new(TokioExecutor::new()).serve_connection(io, svc).await {
        error!(%peer, "connection error: {e}");
    }
}

/// Converts a hyper request into a [`Request`], runs it through the router,
/// and hands the response back. Every failure becomes a response.
async fn dispatch(
    router: Arc<Router>,
    req: hyper::Request<Incoming>,
    peer: SocketAddr,
) -> Result<http::Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();

    let head = RequestHead {
        method: Method::from(&parts.method),
        path: parts.uri.path().to_owned(),
        query: parts.uri.query().unwrap_or("").to_owned(),
        version: parts.version,
        headers: parts.headers,
        remote_addr: Some(peer),
        route: None,
    };

    let response = router.handle(Request::from_parts(head, Body::new(body))).await;
    Ok(response.into_inner())
}

/// SIGTERM (what Kubernetes sends) or Ctrl-C. Only Ctrl-C off Unix.
async fn os_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("cannot listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                error!("cannot listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = sigterm => {}
    }
}
