//! Layered routing.
//!
//! A [`Router`] is an ordered stack of layers. A route layer matches a path pattern and holds
//! method-filtered handler chains; a mount layer matches every path at or below a prefix,
//! which may itself be a pattern such as `/orgs/{org}`. Dispatch
//! walks the layers in registration order, so routes registered before a catch-all mount at
//! the same path get the first chance to handle a request.

use crate::error::{ErrorHandler, JsonErrorHandler, error_body, write_error};
use crate::filter::{self, AllFilter, Filter};
use crate::handler::{BoxError, Flow, HandlerResult, RequestHandler};
use crate::{PathParams, RequestContext, ResponseBody, ResponseState};
use async_trait::async_trait;
use bytes::Bytes;
use http::{Method, Request, Response, StatusCode};
use std::sync::Arc;
use thiserror::Error;
use tracing::trace;

type InnerRouter = matchit::Router<()>;

#[derive(Error, Debug)]
pub enum RouterError {
    #[error("invalid route pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: matchit::InsertError,
    },
}

/// The frozen router, shared by every connection of a running server
pub struct Router {
    layers: Vec<Layer>,
    error_handler: Arc<dyn ErrorHandler>,
    fallback: Arc<dyn RequestHandler>,
}

enum Layer {
    Route(RouteLayer),
    Mount(MountLayer),
}

struct RouteLayer {
    matcher: InnerRouter,
    items: Vec<RouterItem>,
}

struct MountLayer {
    /// `None` mounts at the root and matches every path
    matcher: Option<InnerRouter>,
    handler: Arc<dyn RequestHandler>,
}

/// A router item containing a filter and the handler chain it guards
struct RouterItem {
    filter: AllFilter,
    chain: Vec<Arc<dyn RequestHandler>>,
}

impl Router {
    pub fn builder() -> RouterBuilder {
        RouterBuilder::new()
    }

    /// Runs one request through the layer stack and produces its response
    pub async fn dispatch(&self, request: Request<Bytes>) -> Response<ResponseBody> {
        let mut req = RequestContext::from(request);
        let mut resp = ResponseState::default();

        if let Err(error) = self.run(&mut req, &mut resp).await {
            self.error_handler.handle(error, &req, &mut resp);
        }

        resp.into_response()
    }

    async fn run(&self, req: &mut RequestContext, resp: &mut ResponseState) -> Result<(), BoxError> {
        let path = req.uri().path().to_owned();

        for layer in &self.layers {
            let flow = match layer {
                Layer::Route(route) => {
                    let Some(params) = route.matches(&path) else { continue };
                    req.set_path_params(params);

                    let Some(item) = route.items.iter().find(|item| item.filter.check(req)) else { continue };
                    item.run(req, resp).await?
                }
                Layer::Mount(mount) => {
                    let Some(params) = mount.matches(&path) else { continue };
                    req.set_path_params(params);
                    mount.handler.invoke(req, resp).await?
                }
            };

            if flow == Flow::Halt {
                return Ok(());
            }
        }

        trace!(path = %path, "no layer halted, falling back");
        req.set_path_params(PathParams::empty());
        self.fallback.invoke(req, resp).await?;
        Ok(())
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router").field("layers", &self.layers.len()).finish_non_exhaustive()
    }
}

impl RouteLayer {
    fn matches(&self, path: &str) -> Option<PathParams> {
        let matched = self.matcher.at(path).ok().or_else(|| {
            let trimmed = path.strip_suffix('/').filter(|trimmed| !trimmed.is_empty())?;
            self.matcher.at(trimmed).ok()
        })?;
        Some(matched.params.into())
    }
}

const MOUNT_REST: &str = "__mount_rest";

impl MountLayer {
    fn new(prefix: &str, handler: Arc<dyn RequestHandler>) -> Result<Self, RouterError> {
        if prefix.is_empty() {
            return Ok(Self { matcher: None, handler });
        }

        let mut matcher = InnerRouter::new();
        for pattern in [prefix.to_owned(), format!("{prefix}/{{*{MOUNT_REST}}}")] {
            matcher
                .insert(pattern.as_str(), ())
                .map_err(|source| RouterError::InvalidPattern { pattern: pattern.clone(), source })?;
        }
        Ok(Self { matcher: Some(matcher), handler })
    }

    fn matches(&self, path: &str) -> Option<PathParams> {
        let Some(matcher) = &self.matcher else {
            return Some(PathParams::empty());
        };
        let matched = matcher.at(path).ok().or_else(|| matcher.at(path.strip_suffix('/')?).ok())?;
        Some(matched.params.iter().filter(|(name, _)| *name != MOUNT_REST).collect())
    }
}

impl RouterItem {
    async fn run(&self, req: &mut RequestContext, resp: &mut ResponseState) -> HandlerResult {
        for handler in &self.chain {
            if handler.invoke(req, resp).await? == Flow::Halt {
                return Ok(Flow::Halt);
            }
        }
        Ok(Flow::Next)
    }
}

/// Produces a 404 `NotFound` response, used when no layer halts
#[derive(Debug, Default, Clone, Copy)]
pub struct NotFound;

#[async_trait]
impl RequestHandler for NotFound {
    async fn invoke(&self, _req: &mut RequestContext, resp: &mut ResponseState) -> HandlerResult {
        resp.set_status(StatusCode::NOT_FOUND);
        write_error(resp, &error_body(StatusCode::NOT_FOUND, "Page not found"));
        Ok(Flow::Halt)
    }
}

enum LayerBuilder {
    Route { pattern: String, items: Vec<RouterItemBuilder> },
    Mount { prefix: String, handler: Arc<dyn RequestHandler> },
}

/// Collects layers during the registration phase
pub struct RouterBuilder {
    layers: Vec<LayerBuilder>,
    error_handler: Arc<dyn ErrorHandler>,
    fallback: Arc<dyn RequestHandler>,
}

impl Default for RouterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RouterBuilder {
    fn new() -> Self {
        Self { layers: Vec::new(), error_handler: Arc::new(JsonErrorHandler), fallback: Arc::new(NotFound) }
    }

    /// Adds a method-filtered chain for `pattern`.
    ///
    /// Consecutive calls with the same pattern share one layer, the way a single
    /// route collects handlers for several methods.
    pub fn route(&mut self, pattern: impl Into<String>, item_builder: RouterItemBuilder) -> &mut Self {
        let pattern = pattern.into();
        match self.layers.last_mut() {
            Some(LayerBuilder::Route { pattern: last, items }) if *last == pattern => items.push(item_builder),
            _ => self.layers.push(LayerBuilder::Route { pattern, items: vec![item_builder] }),
        }
        self
    }

    /// Replaces every route layer for `pattern` with one holding `items`.
    ///
    /// The new layer takes the place of the first existing one, or goes last when `pattern` has
    /// no route yet. Mounts are left alone.
    pub fn set_route<I>(&mut self, pattern: impl Into<String>, items: I) -> &mut Self
    where
        I: IntoIterator<Item = RouterItemBuilder>,
    {
        let pattern = pattern.into();
        let mut items = Some(items.into_iter().collect::<Vec<_>>());

        self.layers.retain_mut(|layer| match layer {
            LayerBuilder::Route { pattern: existing, items: existing_items } if *existing == pattern => {
                let Some(replacement) = items.take() else { return false };
                *existing_items = replacement;
                true
            }
            _ => true,
        });

        if let Some(items) = items {
            self.layers.push(LayerBuilder::Route { pattern, items });
        }
        self
    }

    /// Mounts `handler` for every request whose path is `prefix` or below it.
    ///
    /// Named segments of `prefix` are visible to the handler as path parameters.
    pub fn mount(&mut self, prefix: impl AsRef<str>, handler: Arc<dyn RequestHandler>) -> &mut Self {
        let prefix = prefix.as_ref().trim_end_matches('/').to_owned();
        self.layers.push(LayerBuilder::Mount { prefix, handler });
        self
    }

    pub fn error_handler(&mut self, error_handler: Arc<dyn ErrorHandler>) -> &mut Self {
        self.error_handler = error_handler;
        self
    }

    pub fn fallback(&mut self, fallback: Arc<dyn RequestHandler>) -> &mut Self {
        self.fallback = fallback;
        self
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Freezes the accumulated layers into a [`Router`]
    pub fn build(self) -> Result<Router, RouterError> {
        let mut layers = Vec::with_capacity(self.layers.len());

        for layer in self.layers {
            match layer {
                LayerBuilder::Route { pattern, items } => {
                    let mut matcher = InnerRouter::new();
                    matcher
                        .insert(pattern.as_str(), ())
                        .map_err(|source| RouterError::InvalidPattern { pattern: pattern.clone(), source })?;
                    let items = items.into_iter().map(RouterItemBuilder::build).collect();
                    layers.push(Layer::Route(RouteLayer { matcher, items }));
                }
                LayerBuilder::Mount { prefix, handler } => {
                    layers.push(Layer::Mount(MountLayer::new(&prefix, handler)?));
                }
            }
        }

        Ok(Router { layers, error_handler: self.error_handler, fallback: self.fallback })
    }
}

impl std::fmt::Debug for RouterBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterBuilder").field("layers", &self.layers.len()).finish_non_exhaustive()
    }
}

/// Creates a [`RouterItemBuilder`] answering requests with `method`
pub fn on<H: RequestHandler + 'static>(method: Method, handler: H) -> RouterItemBuilder {
    let mut filters = AllFilter::default();
    filters.push(filter::method(method));
    RouterItemBuilder { filters, middleware: Vec::new(), handler: Arc::new(handler) }
}

macro_rules! method_router {
    ($fn_name:ident, $method:ident) => {
        pub fn $fn_name<H: RequestHandler + 'static>(handler: H) -> RouterItemBuilder {
            on(Method::$method, handler)
        }
    };
}

method_router!(get, GET);
method_router!(post, POST);
method_router!(put, PUT);
method_router!(patch, PATCH);
method_router!(delete, DELETE);

pub struct RouterItemBuilder {
    filters: AllFilter,
    middleware: Vec<Arc<dyn RequestHandler>>,
    handler: Arc<dyn RequestHandler>,
}

impl std::fmt::Debug for RouterItemBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterItemBuilder")
            .field("filters", &self.filters)
            .field("middleware", &self.middleware.len())
            .finish_non_exhaustive()
    }
}

impl RouterItemBuilder {
    pub fn with<F: Filter + 'static>(mut self, filter: F) -> Self {
        self.filters.push(filter);
        self
    }

    /// Runs `middleware` in order before the handler
    pub fn middleware<I>(mut self, middleware: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn RequestHandler>>,
    {
        self.middleware.extend(middleware);
        self
    }

    fn build(self) -> RouterItem {
        let mut chain = self.middleware;
        chain.push(self.handler);
        RouterItem { filter: self.filters, chain }
    }
}

#[cfg(test)]
mod tests {
    use super::{Router, RouterBuilder, get, on, post};
    use crate::filter::header;
    use crate::handler::{Flow, HandlerResult, RequestHandler, handler_fn};
    use crate::{RequestContext, ResponseState};
    use bytes::Bytes;
    use http::header::CONTENT_TYPE;
    use http::{HeaderValue, Method, Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::Value;
    use std::io;
    use std::sync::Arc;

    fn text(body: &'static str) -> impl RequestHandler + 'static {
        handler_fn(move |_req, resp| {
            resp.finish(body);
            Ok(Flow::Halt)
        })
    }

    fn tag(name: &'static str) -> Arc<dyn RequestHandler> {
        Arc::new(handler_fn(move |req, _resp| -> HandlerResult {
            match req.extensions_mut().get_mut::<Vec<&'static str>>() {
                Some(tags) => tags.push(name),
                None => {
                    req.extensions_mut().insert(vec![name]);
                }
            }
            Ok(Flow::Next)
        }))
    }

    fn trail(req: &RequestContext) -> String {
        req.extensions().get::<Vec<&'static str>>().map(|tags| tags.join(",")).unwrap_or_default()
    }

    async fn send(router: &Router, method: Method, uri: &str) -> (StatusCode, String) {
        let request = Request::builder().method(method).uri(uri).body(Bytes::new()).unwrap();
        let response = router.dispatch(request).await;
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    fn router() -> Router {
        let mut builder = Router::builder();
        builder
            .route("/", get(text("get")))
            .route(
                "/",
                post(text("form")).with(header(
                    CONTENT_TYPE,
                    HeaderValue::from_static("application/x-www-form-urlencoded"),
                )),
            )
            .route("/", post(text("post")))
            .route("/users/{id}", get(handler_fn(|req, resp| {
                resp.finish(format!("user {}", req.path_params().get("id").unwrap_or_default()));
                Ok(Flow::Halt)
            })));
        builder.build().unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_route_by_method() {
        let router = router();

        assert_eq!(send(&router, Method::GET, "/").await, (StatusCode::OK, "get".into()));
        assert_eq!(send(&router, Method::POST, "/").await, (StatusCode::OK, "post".into()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_route_by_header() {
        let router = router();
        let request = Request::builder()
            .method(Method::POST)
            .uri("/")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Bytes::new())
            .unwrap();

        let response = router.dispatch(request).await;
        assert_eq!(response.into_body().collect().await.unwrap().to_bytes(), "form");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_path_params() {
        let router = router();

        assert_eq!(send(&router, Method::GET, "/users/7").await.1, "user 7");
        assert_eq!(send(&router, Method::GET, "/users/7/").await.1, "user 7");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_fallback_is_not_found() {
        let router = router();

        let (status, body) = send(&router, Method::DELETE, "/").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let body: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(body["name"], "NotFound");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_layers_run_in_registration_order() {
        let mut builder = RouterBuilder::default();
        builder
            .mount("/", tag("global"))
            .route("/todos", on(Method::GET, handler_fn(|_req, _resp| Ok(Flow::Next))).middleware([tag("route")]))
            .mount("/todos", Arc::new(handler_fn(|req, resp| {
                resp.finish(format!("{},mount", trail(req)));
                Ok(Flow::Halt)
            })))
            .mount("/", Arc::new(handler_fn(|_req, resp| {
                resp.finish("root");
                Ok(Flow::Halt)
            })));
        let router = builder.build().unwrap();

        assert_eq!(send(&router, Method::GET, "/todos").await.1, "global,route,mount");
        assert_eq!(send(&router, Method::POST, "/todos/1").await.1, "global,mount");
        assert_eq!(send(&router, Method::GET, "/todosx").await.1, "root");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_mount_with_pattern() {
        let mut builder = RouterBuilder::default();
        builder.mount(
            "/orgs/{org}",
            Arc::new(handler_fn(|req, resp| {
                resp.finish(format!("org {}", req.path_params().get("org").unwrap_or_default()));
                Ok(Flow::Halt)
            })),
        );
        let router = builder.build().unwrap();

        assert_eq!(send(&router, Method::GET, "/orgs/acme").await.1, "org acme");
        assert_eq!(send(&router, Method::GET, "/orgs/acme/").await.1, "org acme");
        assert_eq!(send(&router, Method::PUT, "/orgs/acme/todos/1").await.1, "org acme");
        assert_eq!(send(&router, Method::GET, "/orgs").await.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_errors_reach_error_handler() {
        let mut builder = Router::builder();
        builder.route(
            "/fail",
            get(handler_fn(|_req: &mut RequestContext, resp: &mut ResponseState| -> HandlerResult {
                resp.set_status(StatusCode::METHOD_NOT_ALLOWED);
                Err(io::Error::other("nope").into())
            })),
        );
        let router = builder.build().unwrap();

        let (status, body) = send(&router, Method::GET, "/fail").await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(serde_json::from_str::<Value>(&body).unwrap()["message"], "nope");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_set_route_replaces_in_place() {
        let mut builder = Router::builder();
        builder
            .route("/todos", get(text("old")))
            .mount("/", tag("after"))
            .route("/todos", post(text("old post")))
            .set_route("/todos", [get(handler_fn(|req, resp| {
                resp.finish(format!("new,{}", trail(req)));
                Ok(Flow::Halt)
            }))])
            .set_route("/users", [get(text("users"))]);

        assert_eq!(builder.layer_count(), 3);
        let router = builder.build().unwrap();

        assert_eq!(send(&router, Method::GET, "/todos").await, (StatusCode::OK, "new,".into()));
        assert_eq!(send(&router, Method::POST, "/todos").await.0, StatusCode::NOT_FOUND);
        assert_eq!(send(&router, Method::GET, "/users").await, (StatusCode::OK, "users".into()));
    }

    #[test]
    fn test_invalid_pattern_fails_build() {
        let mut builder = Router::builder();
        builder.route("/files/{*rest}/meta", get(text("never")));

        assert!(builder.build().is_err());
    }
}
