use crate::Application;
use crate::error::AppError;
use crate::service::BoundService;
use quill_web::RequestHandler;
use std::fmt;
use std::sync::Arc;

/// Options passed along with a service registration
#[derive(Clone, Default)]
pub struct ServiceOptions {
    /// handlers a provider runs in front of every endpoint it creates for the service
    pub middleware: Vec<Arc<dyn RequestHandler>>,
}

impl ServiceOptions {
    pub fn with_middleware<I>(middleware: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn RequestHandler>>,
    {
        Self { middleware: middleware.into_iter().collect() }
    }
}

impl fmt::Debug for ServiceOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceOptions").field("middleware", &self.middleware.len()).finish()
    }
}

/// Exposes services over a transport.
///
/// A provider is invoked once for every service registered after it was added, with the
/// service's normalized path. Services registered earlier are not replayed.
pub trait Provider: Send + Sync {
    fn provide(
        &self,
        app: &mut Application,
        path: &str,
        service: &Arc<BoundService>,
        options: &ServiceOptions,
    ) -> Result<(), AppError>;
}

impl<F> Provider for F
where
    F: Fn(&mut Application, &str, &Arc<BoundService>, &ServiceOptions) -> Result<(), AppError> + Send + Sync,
{
    fn provide(
        &self,
        app: &mut Application,
        path: &str,
        service: &Arc<BoundService>,
        options: &ServiceOptions,
    ) -> Result<(), AppError> {
        (self)(app, path, service, options)
    }
}
