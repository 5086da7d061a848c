//! # tsu
//!
//! A minimal HTTP framework for Rust services behind a reverse proxy, with
//! the two middlewares every such service ends up writing: a structured
//! access log and panic recovery.
//!
//! ## The contract
//!
//! The proxy owns TLS, rate limiting, slow clients, and body-size limits.
//! tsu owns the part that changes between applications:
//!
//! - Radix-tree routing, O(path-length) lookup via [`matchit`]
//! - Async I/O on tokio and hyper, HTTP/1.1 and HTTP/2
//! - Graceful shutdown on SIGTERM / Ctrl-C, draining in-flight requests
//! - [`middleware::AccessLog`] and [`middleware::Recovery`], logging through
//!   `tracing` by default
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use http::StatusCode;
//! use tsu::{Method, Request, Response, Router, Server};
//! use tsu::middleware::{AccessLog, AccessLogConfig, Recovery, TracingSink};
//!
//! #[tokio::main]
//! async fn main() {
//!     let app = Router::new()
//!         .on_with_doc(Method::Get, "/users/{id}", "fetch a user", get_user)
//!         .on(Method::Post, "/users", create_user)
//!         .wrap(AccessLog::new(TracingSink, AccessLogConfig::default()))
//!         .wrap(Recovery::new(TracingSink, true));
//!
//!     Server::bind("0.0.0.0:3000").serve(app).await.unwrap();
//! }
//!
//! async fn get_user(req: Request) -> Response {
//!     let id = req.param("id").unwrap_or("unknown");
//!     Response::json(format!(r#"{{"id":"{id}"}}"#).into_bytes())
//! }
//!
//! async fn create_user(mut req: Request) -> Response {
//!     match req.bytes().await {
//!         Ok(body) if !body.is_empty() => Response::builder()
//!             .status(StatusCode::CREATED)
//!             .header("location", "/users/99")
//!             .json(body.to_vec()),
//!         Ok(_) => Response::status(StatusCode::BAD_REQUEST),
//!         Err(e) => Response::error(StatusCode::BAD_REQUEST, e),
//!     }
//! }
//! ```

mod body;
mod error;
mod handler;
mod method;
mod request;
mod response;
mod router;
mod server;

pub mod middleware;

pub use body::Body;
pub use error::{BoxError, Error};
pub use handler::{BoxFuture, Handler};
pub use method::{Method, UnknownMethod};
pub use request::{Request, RequestBuilder, RequestHead};
pub use response::{ContentType, IntoResponse, Response, ResponseBuilder, ResponseError, ResponseWriter};
pub use router::{RouteInfo, Router};
pub use server::Server;
