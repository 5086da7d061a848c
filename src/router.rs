//! Radix-tree request router.
//!
//! One tree per HTTP method. O(path-length) lookup. Every request, matched or
//! not, runs through the middleware registered with [`Router::wrap`] before
//! reaching its handler. Unmatched requests end at a `404` endpoint, or at a
//! `405` one when no route at all is registered for their method.

use std::collections::HashMap;
use std::sync::Arc;

use http::StatusCode;
use matchit::Router as MatchitRouter;

use crate::handler::{BoxedHandler, Handler};
use crate::method::Method;
use crate::middleware::{Middleware, Next};
use crate::request::Request;
use crate::response::{Response, ResponseWriter};

/// The route a request matched: its registered template and optional doc
/// string (reported as the `title` in access logs).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteInfo {
    template: String,
    doc: Option<String>,
}

impl RouteInfo {
    /// The path template as registered, e.g. `/users/{id}`.
    pub fn template(&self) -> &str { &self.template }
    pub fn doc(&self) -> Option<&str> { self.doc.as_deref() }
}

struct Endpoint {
    handler: BoxedHandler,
    info: Arc<RouteInfo>,
}

/// The application router.
///
/// Build it once at startup; pass it to [`Server::serve`](crate::Server::serve).
pub struct Router {
    routes: HashMap<Method, MatchitRouter<Endpoint>>,
    middleware: Vec<Arc<dyn Middleware>>,
    not_found: BoxedHandler,
}

impl Router {
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
            middleware: Vec::new(),
            not_found: not_found.into_boxed_handler(),
        }
    }

    /// Register a handler for a method + path pair. Returns `self` for chaining.
    ///
    /// Path parameters use `{name}` syntax; `req.param("name")` retrieves them:
    ///
    /// ```rust,no_run
    /// # use tsu::{Method, Request, Response, Router};
    /// # async fn get_user(_: Request) -> Response { Response::text("") }
    /// # async fn create_user(_: Request) -> Response { Response::text("") }
    /// Router::new()
    ///     .on(Method::Get,  "/users/{id}", get_user)
    ///     .on(Method::Post, "/users",      create_user);
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if `path` is not a valid route pattern or conflicts with one
    /// already registered for `method`.
    pub fn on(self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.add(method, path, None, handler)
    }

    /// Like [`on`](Router::on), with a human-readable description of the
    /// route that access logs report as its title.
    pub fn on_with_doc(self, method: Method, path: &str, doc: &str, handler: impl Handler) -> Self {
        self.add(method, path, Some(doc.to_owned()), handler)
    }

    /// Wrap every route in `middleware`. The last middleware added is the
    /// outermost, so add panic recovery last:
    ///
    /// ```rust,no_run
    /// # use tsu::Router;
    /// # use tsu::middleware::{AccessLog, AccessLogConfig, Recovery, TracingSink};
    /// let app = Router::new()
    ///     .wrap(AccessLog::new(TracingSink, AccessLogConfig::default()))
    ///     .wrap(Recovery::new(TracingSink, false));
    /// ```
    pub fn wrap(mut self, middleware: impl Middleware) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    fn add(mut self, method: Method, path: &str, doc: Option<String>, handler: impl Handler) -> Self {
        let endpoint = Endpoint {
            handler: handler.into_boxed_handler(),
            info: Arc::new(RouteInfo { template: path.to_owned(), doc }),
        };
        self.routes
            .entry(method)
            .or_default()
            .insert(path, endpoint)
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self
    }

    fn lookup(
        &self,
        method: &Method,
        path: &str,
    ) -> Option<(BoxedHandler, HashMap<String, String>, Arc<RouteInfo>)> {
        let tree = self.routes.get(method)?;
        let matched = tree.at(path).ok()?;
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((Arc::clone(&matched.value.handler), params, Arc::clone(&matched.value.info)))
    }

    /// Routes one request through the middleware chain and its handler.
    pub async fn handle(&self, mut req: Request) -> Response {
        let handler = match self.lookup(req.method(), req.path()) {
            Some((handler, params, info)) => {
                req.params = params;
                req.set_route(Some(info));
                handler
            }
            None if self.routes.contains_key(req.method()) => Arc::clone(&self.not_found),
            None => method_not_allowed(self.allowed_methods()),
        };

        let mut res = ResponseWriter::new();
        Next::new(&self.middleware, &handler).run(req, &mut res).await;
        res.into_response()
    }

    /// Registered methods as an `Allow` header value.
    fn allowed_methods(&self) -> String {
        let mut methods: Vec<&str> = self.routes.keys().map(Method::as_str).collect();
        methods.sort_unstable();
        methods.join(", ")
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

async fn not_found(_req: Request) -> Response {
    Response::status(StatusCode::NOT_FOUND)
}

fn method_not_allowed(allow: String) -> BoxedHandler {
    let handler = move |_req: Request| {
        let res = Response::builder()
            .status(StatusCode::METHOD_NOT_ALLOWED)
            .header("allow", &allow)
            .no_body();
        async move { res }
    };
    handler.into_boxed_handler()
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn echo_id(req: Request) -> String {
        format!("{}|{}", req.param("id").unwrap_or("-"), req.route().map_or("", |r| r.template()))
    }

    #[tokio::test]
    async fn matches_route_and_exposes_template() {
        let app = Router::new()
            .on_with_doc(Method::Get, "/users/{id}", "fetch a user", echo_id);
        let res = app.handle(Request::builder().uri("/users/42").build()).await;
        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(res.body(), b"42|/users/{id}");
    }

    #[tokio::test]
    async fn unmatched_path_is_404() {
        let app = Router::new().on(Method::Get, "/users/{id}", echo_id);
        let res = app.handle(Request::builder().uri("/teams/7").build()).await;
        assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn method_without_routes_is_405_with_allow() {
        let app = Router::new()
            .on(Method::Get, "/users/{id}", echo_id)
            .on(Method::Delete, "/users/{id}", echo_id);
        let res = app
            .handle(Request::builder().method(Method::Extension("BREW".into())).uri("/users/42").build())
            .await;
        assert_eq!(res.status_code(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(res.header("allow"), Some("DELETE, GET"));
    }

    #[tokio::test]
    async fn extension_methods_can_be_routed() {
        let app = Router::new().on(Method::Extension("BREW".into()), "/pot/{id}", echo_id);
        let res = app
            .handle(Request::builder().method(Method::Extension("BREW".into())).uri("/pot/1").build())
            .await;
        assert_eq!(res.body(), b"1|/pot/{id}");
    }
}
