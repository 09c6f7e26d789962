//! Services and the builder the mixin pipeline works on.
//!
//! A [`Service`] is any type answering some of the five service methods. At registration the
//! application wraps it in a [`ServiceBuilder`] whose method slots start out delegating to the
//! service; every mixin may then add, override or wrap slots and attach lifecycle hooks. Once
//! the pipeline has run the builder is frozen into a [`BoundService`], the value providers and
//! request handlers see.

use crate::Application;
use crate::error::ServiceError;
use async_trait::async_trait;
use futures::future::BoxFuture;
use http::Method;
use quill_web::BoxError;
use serde_json::{Map, Value};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// What a service method completes with: a payload, no payload, or an error
pub type ServiceResult = Result<Option<Value>, BoxError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceMethod {
    Get,
    Create,
    Update,
    Patch,
    Remove,
}

impl ServiceMethod {
    /// every service method, in the order the application recognizes them
    pub const ALL: [ServiceMethod; 5] = [Self::Get, Self::Create, Self::Update, Self::Patch, Self::Remove];

    pub fn name(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Create => "create",
            Self::Update => "update",
            Self::Patch => "patch",
            Self::Remove => "remove",
        }
    }

    /// the HTTP verb a REST endpoint answers this method on
    pub fn http_method(self) -> Method {
        match self {
            Self::Get => Method::GET,
            Self::Create => Method::POST,
            Self::Update => Method::PUT,
            Self::Patch => Method::PATCH,
            Self::Remove => Method::DELETE,
        }
    }

    fn index(self) -> usize {
        match self {
            Self::Get => 0,
            Self::Create => 1,
            Self::Update => 2,
            Self::Patch => 3,
            Self::Remove => 4,
        }
    }
}

impl fmt::Display for ServiceMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A set of [`ServiceMethod`]s, used to declare what a service implements
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct MethodSet(u8);

impl MethodSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn all() -> Self {
        ServiceMethod::ALL.into_iter().collect()
    }

    #[must_use]
    pub fn with(mut self, method: ServiceMethod) -> Self {
        self.insert(method);
        self
    }

    pub fn insert(&mut self, method: ServiceMethod) {
        self.0 |= 1 << method.index();
    }

    pub fn remove(&mut self, method: ServiceMethod) {
        self.0 &= !(1 << method.index());
    }

    pub fn contains(self, method: ServiceMethod) -> bool {
        self.0 & (1 << method.index()) != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = ServiceMethod> {
        ServiceMethod::ALL.into_iter().filter(move |method| self.contains(*method))
    }
}

impl FromIterator<ServiceMethod> for MethodSet {
    fn from_iter<T: IntoIterator<Item = ServiceMethod>>(iter: T) -> Self {
        iter.into_iter().fold(Self::empty(), MethodSet::with)
    }
}

impl fmt::Debug for MethodSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// The parameters handed to every service method.
///
/// Over REST this holds the decoded query string under `query`, the route's path parameters
/// other than `id`, and whatever middleware put into the request's context bag.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params(Map<String, Value>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// the decoded query string, if one was recorded
    pub fn query(&self) -> Option<&Map<String, Value>> {
        self.0.get("query").and_then(Value::as_object)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Params {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

fn unsupported(method: ServiceMethod) -> BoxError {
    Box::new(ServiceError::method_not_allowed(format!("Method `{method}` is not supported by this endpoint.")))
}

/// A CRUD-like resource.
///
/// Implementors override the methods they support and list them in [`Service::methods`]; the
/// remaining methods keep their default body, which fails with `MethodNotAllowed`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Service: Send + Sync {
    /// the methods this service implements
    fn methods(&self) -> MethodSet;

    async fn get(&self, _params: Params) -> ServiceResult {
        Err(unsupported(ServiceMethod::Get))
    }

    async fn create(&self, _data: Value, _params: Params) -> ServiceResult {
        Err(unsupported(ServiceMethod::Create))
    }

    async fn update(&self, _id: Option<String>, _data: Value, _params: Params) -> ServiceResult {
        Err(unsupported(ServiceMethod::Update))
    }

    async fn patch(&self, _id: Option<String>, _data: Value, _params: Params) -> ServiceResult {
        Err(unsupported(ServiceMethod::Patch))
    }

    async fn remove(&self, _params: Params) -> ServiceResult {
        Err(unsupported(ServiceMethod::Remove))
    }

    /// Runs once the service knows its final path, before any provider sees it
    fn prepare(&self, _app: &Application, _path: &str) {}

    /// Runs when the application is set up, every service is registered by then
    fn setup(&self, _app: &Application, _path: &str) {}
}

/// The arguments of one service method call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceCall {
    /// the `id` path parameter, passed to `update` and `patch`
    pub id: Option<String>,
    /// the decoded request body, passed to `create`, `update` and `patch`
    pub data: Value,
    pub params: Params,
}

pub type MethodFuture = BoxFuture<'static, ServiceResult>;

/// One method slot of a service under construction
pub type MethodFn = Arc<dyn Fn(ServiceCall) -> MethodFuture + Send + Sync>;

type Hook = Arc<dyn Fn(&Application, &str) + Send + Sync>;

type Slots = [Option<MethodFn>; 5];

fn delegate(service: Arc<dyn Service>, method: ServiceMethod) -> MethodFn {
    Arc::new(move |call: ServiceCall| -> MethodFuture {
        let service = Arc::clone(&service);
        Box::pin(async move {
            let ServiceCall { id, data, params } = call;
            match method {
                ServiceMethod::Get => service.get(params).await,
                ServiceMethod::Create => service.create(data, params).await,
                ServiceMethod::Update => service.update(id, data, params).await,
                ServiceMethod::Patch => service.patch(id, data, params).await,
                ServiceMethod::Remove => service.remove(params).await,
            }
        })
    })
}

/// A service being augmented by the mixin pipeline.
///
/// The wrapped service itself is never touched: mixins only replace the slots and hooks
/// recorded here.
pub struct ServiceBuilder {
    inner: Arc<dyn Service>,
    slots: Slots,
    prepare_hooks: Vec<Hook>,
    setup_hooks: Vec<Hook>,
}

impl ServiceBuilder {
    pub fn new(service: Arc<dyn Service>) -> Self {
        let mut slots: Slots = Default::default();
        for method in service.methods().iter() {
            slots[method.index()] = Some(delegate(Arc::clone(&service), method));
        }
        Self { inner: service, slots, prepare_hooks: Vec::new(), setup_hooks: Vec::new() }
    }

    pub fn methods(&self) -> MethodSet {
        ServiceMethod::ALL.into_iter().filter(|method| self.slots[method.index()].is_some()).collect()
    }

    pub fn method(&self, method: ServiceMethod) -> Option<&MethodFn> {
        self.slots[method.index()].as_ref()
    }

    /// Adds `method`, replacing whatever the slot held before
    pub fn set_method<F, Fut>(&mut self, method: ServiceMethod, f: F) -> &mut Self
    where
        F: Fn(ServiceCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ServiceResult> + Send + 'static,
    {
        self.slots[method.index()] = Some(Arc::new(move |call| -> MethodFuture { Box::pin(f(call)) }));
        self
    }

    /// Wraps the current implementation of `method`.
    ///
    /// `f` receives the previous slot and the call. Returns `false` and leaves the builder
    /// untouched when the service does not offer `method`.
    pub fn wrap_method<F, Fut>(&mut self, method: ServiceMethod, f: F) -> bool
    where
        F: Fn(MethodFn, ServiceCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ServiceResult> + Send + 'static,
    {
        let Some(previous) = self.slots[method.index()].take() else {
            return false;
        };
        self.slots[method.index()] =
            Some(Arc::new(move |call| -> MethodFuture { Box::pin(f(Arc::clone(&previous), call)) }));
        true
    }

    pub fn remove_method(&mut self, method: ServiceMethod) -> &mut Self {
        self.slots[method.index()] = None;
        self
    }

    /// Runs `hook` with the application and the final path right after the mixins have run
    pub fn on_prepare<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&Application, &str) + Send + Sync + 'static,
    {
        self.prepare_hooks.push(Arc::new(hook));
        self
    }

    /// Runs `hook` during [`Application::setup`], after the service's own setup
    pub fn on_setup<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&Application, &str) + Send + Sync + 'static,
    {
        self.setup_hooks.push(Arc::new(hook));
        self
    }

    pub fn freeze(self) -> BoundService {
        BoundService {
            inner: self.inner,
            slots: self.slots,
            prepare_hooks: self.prepare_hooks,
            setup_hooks: self.setup_hooks,
        }
    }
}

impl fmt::Debug for ServiceBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceBuilder").field("methods", &self.methods()).finish_non_exhaustive()
    }
}

/// A registered service, as augmented by the mixins present at its registration
pub struct BoundService {
    inner: Arc<dyn Service>,
    slots: Slots,
    prepare_hooks: Vec<Hook>,
    setup_hooks: Vec<Hook>,
}

impl BoundService {
    pub fn supports(&self, method: ServiceMethod) -> bool {
        self.slots[method.index()].is_some()
    }

    pub fn methods(&self) -> MethodSet {
        ServiceMethod::ALL.into_iter().filter(|method| self.supports(*method)).collect()
    }

    /// Calls `method`, failing with `MethodNotAllowed` when the service does not offer it
    pub async fn call(&self, method: ServiceMethod, call: ServiceCall) -> ServiceResult {
        match &self.slots[method.index()] {
            Some(slot) => slot(call).await,
            None => Err(unsupported(method)),
        }
    }

    pub async fn get(&self, params: Params) -> ServiceResult {
        self.call(ServiceMethod::Get, ServiceCall { params, ..ServiceCall::default() }).await
    }

    pub async fn create(&self, data: Value, params: Params) -> ServiceResult {
        self.call(ServiceMethod::Create, ServiceCall { id: None, data, params }).await
    }

    pub async fn update(&self, id: Option<String>, data: Value, params: Params) -> ServiceResult {
        self.call(ServiceMethod::Update, ServiceCall { id, data, params }).await
    }

    pub async fn patch(&self, id: Option<String>, data: Value, params: Params) -> ServiceResult {
        self.call(ServiceMethod::Patch, ServiceCall { id, data, params }).await
    }

    pub async fn remove(&self, params: Params) -> ServiceResult {
        self.call(ServiceMethod::Remove, ServiceCall { params, ..ServiceCall::default() }).await
    }

    /// the service as it was registered, without any mixin applied
    pub fn inner(&self) -> &Arc<dyn Service> {
        &self.inner
    }

    pub(crate) fn prepare(&self, app: &Application, path: &str) {
        self.inner.prepare(app, path);
        for hook in &self.prepare_hooks {
            hook(app, path);
        }
    }

    pub(crate) fn setup(&self, app: &Application, path: &str) {
        self.inner.setup(app, path);
        for hook in &self.setup_hooks {
            hook(app, path);
        }
    }
}

impl fmt::Debug for BoundService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundService").field("methods", &self.methods()).finish_non_exhaustive()
    }
}
