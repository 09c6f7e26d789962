//! The service registry.
//!
//! An [`Application`] lives through two phases. During registration services, mixins,
//! providers and routes are added through `&mut self`; nothing is shared yet. [`listen`]
//! freezes the accumulated routes into a [`Router`], starts serving, and runs
//! [`setup`](Application::setup). After setup no service may be registered any more.
//!
//! [`listen`]: Application::listen

use crate::config::AppConfig;
use crate::error::{AppError, ServiceErrorHandler};
use crate::mixin::{self, EventMixin, Mixin, ServiceEvent};
use crate::node::{ServiceNode, normalize_path};
use crate::provider::{Provider, ServiceOptions};
use crate::service::{BoundService, MethodSet, Service, ServiceBuilder};
use indexmap::IndexMap;
use quill_web::router::{RouterBuilder, RouterItemBuilder};
use quill_web::{RequestHandler, Router, Server, ServerHandle};
use std::collections::HashSet;
use std::fmt;
use std::net::ToSocketAddrs;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

const EVENT_CAPACITY: usize = 1024;

/// A mount a provider asks for, run by [`Application::configure_router_use`]
pub type DeferredMount = Box<dyn FnOnce(&mut Application, &str) -> Result<(), AppError> + Send + Sync>;

/// Something installed through [`Application::configure`]
pub trait Plugin {
    fn install(self, app: &mut Application) -> Result<(), AppError>;
}

impl<F> Plugin for F
where
    F: FnOnce(&mut Application) -> Result<(), AppError>,
{
    fn install(self, app: &mut Application) -> Result<(), AppError> {
        self(app)
    }
}

/// The target of [`Application::mount`]
pub enum Mountable {
    Service(ServiceNode),
    Middleware(Arc<dyn RequestHandler>),
}

impl From<ServiceNode> for Mountable {
    fn from(node: ServiceNode) -> Self {
        Self::Service(node)
    }
}

impl From<Arc<dyn RequestHandler>> for Mountable {
    fn from(handler: Arc<dyn RequestHandler>) -> Self {
        Self::Middleware(handler)
    }
}

pub struct Application {
    mixins: Vec<Arc<dyn Mixin>>,
    services: IndexMap<String, Arc<BoundService>>,
    providers: Vec<Arc<dyn Provider>>,
    providers_router_use: IndexMap<String, DeferredMount>,
    router: Option<RouterBuilder>,
    settings: HashSet<String>,
    events: broadcast::Sender<ServiceEvent>,
    config: AppConfig,
    setup: bool,
}

impl Default for Application {
    fn default() -> Self {
        Self::new()
    }
}

impl Application {
    pub fn new() -> Self {
        Self::with_config(AppConfig::default())
    }

    pub fn with_config(config: AppConfig) -> Self {
        let mut router = RouterBuilder::default();
        router.error_handler(Arc::new(ServiceErrorHandler));

        Self {
            mixins: vec![Arc::new(EventMixin)],
            services: IndexMap::new(),
            providers: Vec::new(),
            providers_router_use: IndexMap::new(),
            router: Some(router),
            settings: HashSet::new(),
            events: mixin::channel(EVENT_CAPACITY),
            config,
            setup: false,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// the service methods the application recognizes
    pub fn methods(&self) -> MethodSet {
        MethodSet::all()
    }

    /// Looks up the service bound at `location`, leading and trailing slashes are ignored
    pub fn service(&self, location: &str) -> Option<&Arc<BoundService>> {
        self.services.get(&normalize_path(location))
    }

    /// every bound service with its path, in registration order
    pub fn services(&self) -> impl Iterator<Item = (&str, &Arc<BoundService>)> {
        self.services.iter().map(|(path, service)| (path.as_str(), service))
    }

    /// Registers a service, or every leaf of a service tree, at `location`.
    ///
    /// Each leaf runs through the mixins, its prepare hooks and then the providers, in that
    /// order. A service registered where another one already is replaces it.
    pub fn register(
        &mut self,
        location: &str,
        node: impl Into<ServiceNode>,
        options: ServiceOptions,
    ) -> Result<&mut Self, AppError> {
        let node: ServiceNode = node.into();
        for (path, service) in node.flatten(location) {
            self.bind(&path, service, &options)?;
        }
        Ok(self)
    }

    fn bind(&mut self, location: &str, service: Arc<dyn Service>, options: &ServiceOptions) -> Result<(), AppError> {
        if self.setup {
            return Err(AppError::SetupAlreadyCompleted { path: location.to_owned() });
        }

        let path = normalize_path(location);

        let mut builder = ServiceBuilder::new(service);
        for mixin in &self.mixins {
            mixin.apply(self, &mut builder);
        }

        let bound = Arc::new(builder.freeze());
        bound.prepare(self, &path);

        let providers = self.providers.clone();
        for provider in providers {
            provider.provide(self, &path, &bound, options)?;
        }

        debug!(path = %path, methods = ?bound.methods(), "service registered");
        if self.services.insert(path, bound).is_some() {
            debug!(location, "replaced a service registered at the same path");
        }
        Ok(())
    }

    pub fn add_service<S: Service + 'static>(&mut self, location: &str, service: S) -> Result<&mut Self, AppError> {
        self.register(location, ServiceNode::leaf(service), ServiceOptions::default())
    }

    /// Registers `node` with `middleware` running in front of every endpoint providers create
    pub fn use_service<I>(
        &mut self,
        location: &str,
        middleware: I,
        node: impl Into<ServiceNode>,
    ) -> Result<&mut Self, AppError>
    where
        I: IntoIterator<Item = Arc<dyn RequestHandler>>,
    {
        self.register(location, node, ServiceOptions::with_middleware(middleware))
    }

    /// Mounts a plain request handler for every path at or below `location`
    pub fn use_middleware(&mut self, location: &str, handler: Arc<dyn RequestHandler>) -> Result<&mut Self, AppError> {
        let prefix = format!("/{}", normalize_path(location));
        self.router_mut()?.mount(prefix, handler);
        Ok(self)
    }

    /// Mounts `target` at `location`.
    ///
    /// A [`Mountable::Middleware`] is mounted after `middleware`. A [`Mountable::Service`] is
    /// registered like [`use_service`](Application::use_service) and must offer at least one
    /// service method, otherwise this fails with [`AppError::NotAService`].
    pub fn mount<I>(
        &mut self,
        location: &str,
        middleware: I,
        target: impl Into<Mountable>,
    ) -> Result<&mut Self, AppError>
    where
        I: IntoIterator<Item = Arc<dyn RequestHandler>>,
    {
        let target: Mountable = target.into();
        match target {
            Mountable::Middleware(handler) => {
                for handler in middleware.into_iter().chain(std::iter::once(handler)) {
                    self.use_middleware(location, handler)?;
                }
                Ok(self)
            }
            Mountable::Service(node) if node.is_service() => self.use_service(location, middleware, node),
            Mountable::Service(_) => Err(AppError::NotAService { path: normalize_path(location) }),
        }
    }

    /// Adds a route to the underlying router
    pub fn route(&mut self, pattern: impl Into<String>, item: RouterItemBuilder) -> Result<&mut Self, AppError> {
        self.router_mut()?.route(pattern, item);
        Ok(self)
    }

    /// the router under construction, gone once the application started serving
    pub fn router_mut(&mut self) -> Result<&mut RouterBuilder, AppError> {
        self.router.as_mut().ok_or(AppError::RouterFrozen)
    }

    /// Records a mount for `uri` to run later, replacing one recorded earlier for the same uri
    pub fn defer_router_use<F>(&mut self, uri: impl Into<String>, mount: F) -> &mut Self
    where
        F: FnOnce(&mut Application, &str) -> Result<(), AppError> + Send + Sync + 'static,
    {
        self.providers_router_use.insert(uri.into(), Box::new(mount));
        self
    }

    pub fn configure<P: Plugin>(&mut self, plugin: P) -> Result<&mut Self, AppError> {
        plugin.install(self)?;
        Ok(self)
    }

    /// Runs the mounts providers deferred, in the order they were first recorded.
    ///
    /// Call it once every service is registered, so the routes of all services come before
    /// the catch-all handlers mounted here.
    pub fn configure_router_use(&mut self) -> Result<&mut Self, AppError> {
        let deferred = std::mem::take(&mut self.providers_router_use);
        for (uri, mount) in deferred {
            debug!(uri = %uri, "mounting deferred handler");
            mount(self, &uri)?;
        }
        Ok(self)
    }

    /// Runs the setup hook of every service in registration order and closes registration.
    ///
    /// Calling it twice runs every hook twice.
    pub fn setup(&mut self) -> &mut Self {
        let app: &Application = self;
        for (path, service) in &app.services {
            service.setup(app, path);
        }

        self.setup = true;
        self
    }

    pub fn is_setup(&self) -> bool {
        self.setup
    }

    pub fn enable(&mut self, setting: impl Into<String>) -> &mut Self {
        self.settings.insert(setting.into());
        self
    }

    pub fn disable(&mut self, setting: &str) -> &mut Self {
        self.settings.remove(setting);
        self
    }

    pub fn enabled(&self, setting: &str) -> bool {
        self.settings.contains(setting)
    }

    pub fn disabled(&self, setting: &str) -> bool {
        !self.enabled(setting)
    }

    /// Adds a mixin for every service registered from now on
    pub fn add_mixin<M: Mixin + 'static>(&mut self, mixin: M) -> &mut Self {
        self.mixins.push(Arc::new(mixin));
        self
    }

    /// Adds a provider for every service registered from now on
    pub fn add_provider<P: Provider + 'static>(&mut self, provider: P) -> &mut Self {
        self.providers.push(Arc::new(provider));
        self
    }

    /// Subscribes to the events published by [`EventMixin`]
    pub fn events(&self) -> broadcast::Receiver<ServiceEvent> {
        self.events.subscribe()
    }

    pub(crate) fn event_sender(&self) -> broadcast::Sender<ServiceEvent> {
        self.events.clone()
    }

    /// Freezes the routes registered so far, without serving them
    pub fn into_router(mut self) -> Result<Router, AppError> {
        self.take_router()
    }

    fn take_router(&mut self) -> Result<Router, AppError> {
        if !self.providers_router_use.is_empty() {
            warn!(
                uris = ?self.providers_router_use.keys().collect::<Vec<_>>(),
                "deferred handlers were never mounted, call configure_router_use first"
            );
        }
        let router = self.router.take().ok_or(AppError::RouterFrozen)?;
        Ok(router.build()?)
    }

    /// Starts serving on `address`, then runs [`setup`](Application::setup).
    ///
    /// The server may accept connections before setup has finished.
    pub async fn listen<A: ToSocketAddrs>(&mut self, address: A) -> Result<ServerHandle, AppError> {
        let router = self.take_router()?;
        let server = Server::builder()
            .router(router)
            .address(address)
            .max_body_size(self.config.max_body_size)
            .build()?;

        let handle = server.bind().await?;
        info!(local_addr = %handle.local_addr(), services = self.services.len(), "application listening");

        self.setup();
        Ok(handle)
    }

    /// [`listen`](Application::listen) on the configured address
    pub async fn listen_configured(&mut self) -> Result<ServerHandle, AppError> {
        let address = self.config.address.clone();
        self.listen(address).await
    }
}

impl fmt::Debug for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Application")
            .field("services", &self.services.keys().collect::<Vec<_>>())
            .field("mixins", &self.mixins.len())
            .field("providers", &self.providers.len())
            .field("deferred", &self.providers_router_use.keys().collect::<Vec<_>>())
            .field("setup", &self.setup)
            .finish_non_exhaustive()
    }
}
