//! The REST provider.
//!
//! Installing [`rest()`] on an application exposes every service registered afterwards at
//! `/{path}`:
//!
//! | verb     | service method                |
//! |----------|-------------------------------|
//! | `POST`   | `create(data, params)`        |
//! | `GET`    | `get(params)`                 |
//! | `PUT`    | `update(id, data, params)`    |
//! | `PATCH`  | `patch(id, data, params)`     |
//! | `DELETE` | `remove(params)`              |
//!
//! The verb routes only leave the service's result pending on the response. Serializing it is
//! the job of a catch-all handler mounted at the same path once
//! [`Application::configure_router_use`] runs, so register every service first.

mod wrappers;

pub use wrappers::{ID_PARAM, MethodWrapper, build_params, finalize, service_call};

use crate::Application;
use crate::error::{AppError, ServiceError};
use crate::provider::{Provider, ServiceOptions};
use crate::service::{BoundService, ServiceMethod};
use async_trait::async_trait;
use http::header::ACCEPT;
use http::{HeaderMap, StatusCode};
use quill_web::router::on;
use quill_web::{Flow, HandlerResult, RequestContext, RequestHandler, ResponseState, handler_fn};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// the setting gating the REST provider, disable it to register services without routes
pub const REST_FEATURE: &str = "quill rest";

/// the order verb routes are registered in
const VERBS: [ServiceMethod; 5] =
    [ServiceMethod::Create, ServiceMethod::Get, ServiceMethod::Update, ServiceMethod::Patch, ServiceMethod::Remove];

#[derive(Clone, Default)]
pub struct RestConfig {
    /// replaces [`JsonFormatter`] as the handler serializing results
    pub handler: Option<Arc<dyn RequestHandler>>,
}

impl fmt::Debug for RestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestConfig").field("handler", &self.handler.is_some()).finish()
    }
}

/// The REST plugin, install it with [`Application::configure`]
#[derive(Clone)]
pub struct Rest {
    handler: Arc<dyn RequestHandler>,
}

/// REST with results serialized as JSON
pub fn rest() -> Rest {
    rest_with_config(RestConfig::default())
}

/// REST with results serialized by `handler`
pub fn rest_with<H: RequestHandler + 'static>(handler: H) -> Rest {
    rest_with_config(RestConfig { handler: Some(Arc::new(handler)) })
}

pub fn rest_with_config(config: RestConfig) -> Rest {
    Rest { handler: config.handler.unwrap_or_else(|| Arc::new(JsonFormatter)) }
}

impl fmt::Debug for Rest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rest").finish_non_exhaustive()
    }
}

impl crate::Plugin for Rest {
    fn install(self, app: &mut Application) -> Result<(), AppError> {
        app.enable(REST_FEATURE);

        let init_context = handler_fn(|req, _resp| {
            req.init_context();
            Ok(Flow::Next)
        });
        app.use_middleware("/", Arc::new(init_context))?;

        app.add_provider(RestProvider { handler: self.handler });
        Ok(())
    }
}

struct RestProvider {
    handler: Arc<dyn RequestHandler>,
}

impl Provider for RestProvider {
    fn provide(
        &self,
        app: &mut Application,
        path: &str,
        service: &Arc<BoundService>,
        options: &ServiceOptions,
    ) -> Result<(), AppError> {
        if app.disabled(REST_FEATURE) {
            return Ok(());
        }

        let uri = if path.starts_with('/') { path.to_owned() } else { format!("/{path}") };
        debug!(uri = %uri, middleware = options.middleware.len(), "exposing service over rest");

        let items = VERBS.into_iter().map(|method| {
            on(method.http_method(), MethodWrapper::new(method, Arc::clone(service)))
                .middleware(options.middleware.iter().cloned())
        });
        app.router_mut()?.set_route(uri.as_str(), items);

        let handler = Arc::clone(&self.handler);
        app.defer_router_use(uri, move |app, uri| {
            app.router_mut()?.mount(uri, handler);
            Ok(())
        });
        Ok(())
    }
}

/// Serializes the pending result as JSON.
///
/// Requests that do not accept JSON fail with `NotAcceptable`. A 204 is sent without a body.
/// When nothing is pending the chain continues, which usually ends in a 404.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonFormatter;

#[async_trait]
impl RequestHandler for JsonFormatter {
    async fn invoke(&self, req: &mut RequestContext, resp: &mut ResponseState) -> HandlerResult {
        let Some(data) = resp.take_data() else {
            return Ok(Flow::Next);
        };

        if !accepts_json(req.headers()) {
            return Err(ServiceError::not_acceptable("only application/json responses are available").into());
        }

        if resp.status() == StatusCode::NO_CONTENT {
            resp.finish(());
        } else {
            resp.json(&data)?;
        }
        Ok(Flow::Halt)
    }
}

fn accepts_json(headers: &HeaderMap) -> bool {
    let mut accept_values = headers.get_all(ACCEPT).iter().peekable();
    if accept_values.peek().is_none() {
        return true;
    }

    accept_values
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|range| range.trim().parse::<mime::Mime>().ok())
        .any(|range| {
            let (type_, subtype) = (range.type_(), range.subtype());
            (type_ == mime::STAR && subtype == mime::STAR)
                || (type_ == mime::APPLICATION && (subtype == mime::STAR || subtype == mime::JSON))
        })
}

#[cfg(test)]
mod tests {
    use super::{REST_FEATURE, accepts_json, rest, rest_with};
    use crate::Application;
    use crate::service::{MethodSet, MockService, ServiceMethod};
    use bytes::Bytes;
    use http::header::{ACCEPT, CONTENT_TYPE};
    use http::{HeaderMap, HeaderValue, Method, Request, StatusCode};
    use http_body_util::BodyExt;
    use quill_web::{Flow, RequestHandler, Router, handler_fn};
    use serde_json::{Value, json};
    use std::sync::Arc;

    fn mock(methods: MethodSet) -> MockService {
        let mut service = MockService::new();
        service.expect_prepare().return_const(());
        service.expect_setup().return_const(());
        service.expect_methods().return_const(methods);
        service
    }

    fn router_for(location: &str, service: MockService) -> Router {
        let mut app = Application::new();
        app.configure(rest()).unwrap();
        app.add_service(location, service).unwrap();
        app.configure_router_use().unwrap();
        app.into_router().unwrap()
    }

    async fn send(router: &Router, method: Method, uri: &str, body: &'static str) -> (StatusCode, Bytes) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Bytes::from_static(body.as_bytes()))
            .unwrap();
        let response = router.dispatch(request).await;
        let status = response.status();
        (status, response.into_body().collect().await.unwrap().to_bytes())
    }

    fn json_of(bytes: &Bytes) -> Value {
        serde_json::from_slice(bytes).unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_create_is_201() {
        let mut service = mock(MethodSet::empty().with(ServiceMethod::Create));
        service.expect_create().times(1).returning(|data, _params| Ok(Some(data)));
        let router = router_for("todos", service);

        let (status, body) = send(&router, Method::POST, "/todos", r#"{"name":"x"}"#).await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body, Bytes::from_static(br#"{"name":"x"}"#));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_reregistered_path_serves_latest_service() {
        let mut old = mock(MethodSet::all());
        old.expect_create().never();
        let mut new = mock(MethodSet::empty().with(ServiceMethod::Create));
        new.expect_create().times(1).returning(|_data, _params| Ok(Some(json!({"from": "new"}))));

        let mut app = Application::new();
        app.configure(rest()).unwrap();
        app.add_service("todos", old).unwrap();
        app.add_service("/todos/", new).unwrap();
        app.configure_router_use().unwrap();
        let router = app.into_router().unwrap();

        let (status, body) = send(&router, Method::POST, "/todos", "{}").await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json_of(&body), json!({"from": "new"}));

        let (status, _body) = send(&router, Method::GET, "/todos", "").await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_empty_get_is_204() {
        let mut service = mock(MethodSet::empty().with(ServiceMethod::Get));
        service.expect_get().returning(|_params| Ok(None));
        let router = router_for("/todos/", service);

        let (status, body) = send(&router, Method::GET, "/todos", "").await;

        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(body.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_soft_errors_are_400() {
        let mut service = mock(MethodSet::empty().with(ServiceMethod::Get));
        service.expect_get().returning(|_params| Ok(Some(json!({"errors": ["bad"]}))));
        let router = router_for("todos", service);

        let (status, body) = send(&router, Method::GET, "/todos", "").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json_of(&body), json!({"errors": ["bad"]}));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_explicit_status_is_kept() {
        let mut service = mock(MethodSet::empty().with(ServiceMethod::Update));
        service
            .expect_update()
            .returning(|_id, _data, _params| Ok(Some(json!({"response": {"status": 207}, "data": [1, 2]}))));
        let router = router_for("todos", service);

        let (status, body) = send(&router, Method::PUT, "/todos", "[]").await;

        assert_eq!(status, StatusCode::MULTI_STATUS);
        assert_eq!(json_of(&body), json!({"data": [1, 2]}));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_missing_method_is_405() {
        let mut service = mock(MethodSet::empty().with(ServiceMethod::Get));
        service.expect_get().never();
        service.expect_patch().never();
        let router = router_for("todos", service);

        let (status, body) = send(&router, Method::PATCH, "/todos", "{}").await;

        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        let body = json_of(&body);
        assert_eq!(body["name"], "MethodNotAllowed");
        assert_eq!(body["message"], "Method `patch` is not supported by this endpoint.");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_service_error_reaches_client() {
        let mut service = mock(MethodSet::empty().with(ServiceMethod::Remove));
        service.expect_remove().returning(|_params| Err(crate::ServiceError::not_found("no such todo").into()));
        let router = router_for("todos", service);

        let (status, body) = send(&router, Method::DELETE, "/todos", "").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json_of(&body)["className"], "not-found");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_invalid_body_is_400() {
        let mut service = mock(MethodSet::empty().with(ServiceMethod::Create));
        service.expect_create().never();
        let router = router_for("todos", service);

        let (status, body) = send(&router, Method::POST, "/todos", "{name").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json_of(&body)["name"], "BadRequest");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_id_and_params_reach_service() {
        let mut service = mock(MethodSet::empty().with(ServiceMethod::Patch));
        service
            .expect_patch()
            .withf(|id, data, params| {
                id.as_deref() == Some("9")
                    && data == &json!({"done": true})
                    && params.get("org") == Some(&json!("acme"))
                    && params.get("id").is_none()
                    && params.query().and_then(|query| query.get("notify")) == Some(&json!("no"))
            })
            .times(1)
            .returning(|id, _data, _params| Ok(Some(json!({"id": id}))));
        let router = router_for("orgs/{org}/todos/{id}", service);

        let (status, body) = send(&router, Method::PATCH, "/orgs/acme/todos/9?notify=no", r#"{"done":true}"#).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_of(&body), json!({"id": "9"}));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_service_middleware_feeds_params() {
        let mut service = mock(MethodSet::empty().with(ServiceMethod::Get));
        service
            .expect_get()
            .withf(|params| params.get("user") == Some(&json!("ada")))
            .returning(|params| Ok(params.get("user").cloned()));

        let authenticate: Arc<dyn RequestHandler> = Arc::new(handler_fn(|req, _resp| {
            if let Some(context) = req.context_mut() {
                context.insert("user".into(), json!("ada"));
            }
            Ok(Flow::Next)
        }));

        let mut app = Application::new();
        app.configure(rest()).unwrap();
        app.use_service("todos", [authenticate], crate::ServiceNode::leaf(service)).unwrap();
        app.configure_router_use().unwrap();
        let router = app.into_router().unwrap();

        let (status, body) = send(&router, Method::GET, "/todos", "").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_of(&body), json!("ada"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_not_acceptable() {
        let mut service = mock(MethodSet::empty().with(ServiceMethod::Get));
        service.expect_get().returning(|_params| Ok(Some(json!([]))));
        let router = router_for("todos", service);

        let request = Request::builder()
            .uri("/todos")
            .header(ACCEPT, "text/html")
            .body(Bytes::new())
            .unwrap();
        let response = router.dispatch(request).await;

        assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_unconfigured_formatter_falls_through() {
        let mut service = mock(MethodSet::empty().with(ServiceMethod::Get));
        service.expect_get().times(1).returning(|_params| Ok(Some(json!([]))));

        let mut app = Application::new();
        app.configure(rest()).unwrap();
        app.add_service("todos", service).unwrap();
        let router = app.into_router().unwrap();

        let (status, _body) = send(&router, Method::GET, "/todos", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_disabled_rest_adds_no_routes() {
        let mut service = mock(MethodSet::empty().with(ServiceMethod::Get));
        service.expect_get().never();

        let mut app = Application::new();
        app.configure(rest()).unwrap();
        app.disable(REST_FEATURE);
        app.add_service("todos", service).unwrap();
        app.configure_router_use().unwrap();

        assert!(app.service("todos").is_some());
        let router = app.into_router().unwrap();
        assert_eq!(send(&router, Method::GET, "/todos", "").await.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_custom_handler() {
        let mut service = mock(MethodSet::empty().with(ServiceMethod::Get));
        service.expect_get().returning(|_params| Ok(Some(json!({"name": "x"}))));

        let mut app = Application::new();
        app.configure(rest_with(handler_fn(|_req, resp| {
            let name = resp.take_data().and_then(|data| data["name"].as_str().map(str::to_owned)).unwrap_or_default();
            resp.finish(format!("name={name}"));
            Ok(Flow::Halt)
        })))
        .unwrap();
        app.add_service("todos", service).unwrap();
        app.configure_router_use().unwrap();
        let router = app.into_router().unwrap();

        assert_eq!(send(&router, Method::GET, "/todos", "").await.1, Bytes::from_static(b"name=x"));
    }

    #[test]
    fn test_accepts_json() {
        let accept = |value: &'static str| {
            let mut headers = HeaderMap::new();
            headers.insert(ACCEPT, HeaderValue::from_static(value));
            accepts_json(&headers)
        };

        assert!(accepts_json(&HeaderMap::new()));
        assert!(accept("*/*"));
        assert!(accept("application/*"));
        assert!(accept("text/html, application/json;q=0.9"));
        assert!(!accept("text/html"));
        assert!(!accept("text/*"));
    }
}
