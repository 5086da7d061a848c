//! Access logging and panic recovery in front of a few JSON endpoints.
//!
//! Run with:
//!   cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/ping
//!   curl -X POST http://localhost:3000/echo -d '{"name":"alice"}'
//!   curl http://localhost:3000/error
//!   curl http://localhost:3000/panic
//!   curl http://localhost:3000/skiplogging
//!   curl -X POST http://localhost:3000/debug/body/off

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use http::StatusCode;
use tsu::middleware::{fields, AccessLog, AccessLogConfig, Field, Recovery, TracingSink};
use tsu::{Method, Request, RequestHead, Response, ResponseWriter, Router, Server};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    // Flipped at runtime by the /debug/body routes.
    let capture = Arc::new(AtomicBool::new(true));
    let on = Arc::clone(&capture);
    let off = Arc::clone(&capture);

    let access = AccessLogConfig::default()
        .custom_field(fields::string("app", "example"))
        .custom_field(|req: &RequestHead, _: &ResponseWriter| {
            Field::string("request_id", req.header("x-request-id").unwrap_or(""))
        })
        .skip_logging(|req, _| req.path() == "/skiplogging")
        .external_enable_body(capture)
        .body_limit(4096);

    let app = Router::new()
        .on_with_doc(Method::Get, "/ping", "liveness probe", ping)
        .on_with_doc(Method::Post, "/echo", "echo the request body", echo)
        .on(Method::Get, "/error", failing)
        .on(Method::Get, "/panic", boom)
        .on(Method::Get, "/skiplogging", ping)
        .on(Method::Post, "/debug/body/on", move |_: Request| {
            let flag = Arc::clone(&on);
            async move {
                flag.store(true, Ordering::Relaxed);
                StatusCode::NO_CONTENT
            }
        })
        .on(Method::Post, "/debug/body/off", move |_: Request| {
            let flag = Arc::clone(&off);
            async move {
                flag.store(false, Ordering::Relaxed);
                StatusCode::NO_CONTENT
            }
        })
        .wrap(AccessLog::new(TracingSink, access))
        .wrap(Recovery::new(TracingSink, true));

    Server::bind("0.0.0.0:3000")
        .serve(app)
        .await
        .expect("server error");
}

async fn ping(_req: Request) -> Response {
    Response::json(br#"{"message":"pong"}"#.to_vec())
}

async fn echo(mut req: Request) -> Response {
    match req.bytes().await {
        Ok(body) => Response::json(body.to_vec()),
        Err(e) => Response::error(StatusCode::BAD_REQUEST, e),
    }
}

async fn failing(_req: Request) -> Result<Response, std::io::Error> {
    Err(std::io::Error::other("upstream unavailable"))
}

async fn boom(_req: Request) -> Response {
    panic!("An unexpected error happen!")
}
