//! The mixin pipeline.
//!
//! Every service registered on an [`Application`] is wrapped in a [`ServiceBuilder`] and handed
//! to each mixin in the order the mixins were added. A mixin added later only affects services
//! registered after it.

mod events;

pub use events::{EventKind, EventMixin, ServiceEvent};
pub(crate) use events::channel;

use crate::Application;
use crate::service::ServiceBuilder;

pub trait Mixin: Send + Sync {
    fn apply(&self, app: &Application, service: &mut ServiceBuilder);
}

impl<F> Mixin for F
where
    F: Fn(&Application, &mut ServiceBuilder) + Send + Sync,
{
    fn apply(&self, app: &Application, service: &mut ServiceBuilder) {
        (self)(app, service);
    }
}
